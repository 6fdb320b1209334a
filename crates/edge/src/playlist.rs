use std::time::Duration;

use url::Url;

use crate::error::{EdgeError, EdgeResult};

const DEFAULT_TARGET_DURATION: Duration = Duration::from_secs(6);

/// A fetchable chunk listed by the playlist, either confirmed or announced ahead.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSegment {
    pub url: Url,
    /// `None` for prefetch announcements, which carry no confirmed duration.
    pub duration: Option<Duration>,
    /// Index among all segment entries (real and prefetch) of the document.
    pub ordinal: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaylistEntry {
    Segment(MediaSegment),
    PrefetchSegment(MediaSegment),
    DiscontinuityAdStart,
    DiscontinuityAdStartContinued,
    DiscontinuityAdEnd,
    EndOfStream,
}

impl PlaylistEntry {
    pub fn segment(&self) -> Option<&MediaSegment> {
        match self {
            Self::Segment(segment) | Self::PrefetchSegment(segment) => Some(segment),
            _ => None,
        }
    }

    pub fn is_prefetch(&self) -> bool {
        matches!(self, Self::PrefetchSegment(_))
    }
}

/// One parsed fetch of a live media playlist.
#[derive(Debug, Clone)]
pub struct MediaPlaylist {
    pub version: u8,
    pub target_duration: Duration,
    /// Media sequence number of the first segment entry.
    pub media_sequence: u64,
    /// Entries in document order.
    pub entries: Vec<PlaylistEntry>,
}

impl MediaPlaylist {
    /// Absolute sequence position of a segment of this document.
    pub fn position(&self, segment: &MediaSegment) -> u64 {
        self.media_sequence + segment.ordinal as u64
    }

    pub fn segments(&self) -> impl Iterator<Item = &MediaSegment> {
        self.entries.iter().filter_map(PlaylistEntry::segment)
    }

    pub fn is_ended(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e, PlaylistEntry::EndOfStream))
    }
}

enum PendingInf {
    Valid(Duration),
    // an unreadable #EXTINF swallows its URI line
    Invalid,
}

/// Parses the text of a live media playlist.
///
/// Unknown tags are ignored. Only a missing `#EXTM3U`, `#EXT-X-VERSION` or
/// `#EXT-X-MEDIA-SEQUENCE` header makes the document unusable.
pub fn parse_media_playlist(text: &str, playlist_url: &Url) -> EdgeResult<MediaPlaylist> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    if lines.next() != Some("#EXTM3U") {
        return Err(EdgeError::MalformedPlaylist(
            "missing #EXTM3U header".to_string(),
        ));
    }

    let mut version = None;
    let mut media_sequence = None;
    let mut target_duration = None;

    let mut entries = Vec::new();
    let mut ordinal = 0;
    let mut pending = None;
    let mut discontinuity = false;

    for line in lines {
        let Some(tag) = line.strip_prefix('#') else {
            match pending.take() {
                Some(PendingInf::Valid(duration)) => {
                    entries.push(PlaylistEntry::Segment(MediaSegment {
                        url: resolve(playlist_url, line)?,
                        duration: Some(duration),
                        ordinal,
                    }));
                    discontinuity = false;
                    ordinal += 1;
                }
                Some(PendingInf::Invalid) => {}
                None => tracing::trace!("Ignoring URI without #EXTINF: {line}"),
            }
            continue;
        };

        let (name, value) = match tag.split_once(':') {
            Some((name, value)) => (name, Some(value.trim())),
            None => (tag, None),
        };

        match name {
            "EXT-X-VERSION" => version = Some(parse_header::<u8>(name, value)?),
            "EXT-X-MEDIA-SEQUENCE" => media_sequence = Some(parse_header::<u64>(name, value)?),
            "EXT-X-TARGETDURATION" => {
                target_duration = value
                    .and_then(|v| v.parse::<f64>().ok())
                    .filter(|v| v.is_finite() && *v > 0.)
                    .map(Duration::from_secs_f64);
            }
            "EXT-X-STREAM-INF" => {
                return Err(EdgeError::MalformedPlaylist(
                    "expected a media playlist, found a master playlist".to_string(),
                ));
            }
            "EXTINF" => pending = Some(parse_extinf(value)),
            "EXT-X-DISCONTINUITY" => discontinuity = true,
            "EXT-X-SCTE35-OUT" => {
                if !discontinuity {
                    tracing::debug!("Ad start cue without a preceding discontinuity");
                }
                entries.push(PlaylistEntry::DiscontinuityAdStart);
            }
            "EXT-X-SCTE35-OUT-CONT" => entries.push(PlaylistEntry::DiscontinuityAdStartContinued),
            "EXT-X-SCTE35-IN" => {
                if !discontinuity {
                    tracing::debug!("Ad end cue without a preceding discontinuity");
                }
                entries.push(PlaylistEntry::DiscontinuityAdEnd);
            }
            "EXT-X-TWITCH-PREFETCH" => match value.filter(|v| !v.is_empty()) {
                Some(uri) => {
                    entries.push(PlaylistEntry::PrefetchSegment(MediaSegment {
                        url: resolve(playlist_url, uri)?,
                        duration: None,
                        ordinal,
                    }));
                    discontinuity = false;
                    ordinal += 1;
                }
                None => tracing::debug!("Ignoring prefetch tag without URI"),
            },
            "EXT-X-ENDLIST" => entries.push(PlaylistEntry::EndOfStream),
            _ => tracing::trace!("Ignoring tag #{name}"),
        }
    }

    let version = version.ok_or_else(|| {
        EdgeError::MalformedPlaylist("missing #EXT-X-VERSION header".to_string())
    })?;
    let media_sequence = media_sequence.ok_or_else(|| {
        EdgeError::MalformedPlaylist("missing #EXT-X-MEDIA-SEQUENCE header".to_string())
    })?;

    let target_duration = target_duration.unwrap_or_else(|| {
        entries
            .iter()
            .filter_map(|e| e.segment().and_then(|s| s.duration))
            .max()
            .unwrap_or(DEFAULT_TARGET_DURATION)
    });

    Ok(MediaPlaylist {
        version,
        target_duration,
        media_sequence,
        entries,
    })
}

fn parse_header<T: std::str::FromStr>(name: &str, value: Option<&str>) -> EdgeResult<T> {
    value
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| EdgeError::MalformedPlaylist(format!("invalid #{name} header: {value:?}")))
}

fn parse_extinf(value: Option<&str>) -> PendingInf {
    let Some(value) = value else {
        return PendingInf::Invalid;
    };
    // the title after the comma is not used
    let duration = value.split_once(',').map_or(value, |(duration, _)| duration);

    match duration.trim().parse::<f64>() {
        Ok(duration) if duration.is_finite() && duration >= 0. => {
            PendingInf::Valid(Duration::from_secs_f64(duration))
        }
        _ => {
            tracing::debug!("Ignoring segment with invalid #EXTINF: {value}");
            PendingInf::Invalid
        }
    }
}

fn resolve(playlist_url: &Url, uri: &str) -> EdgeResult<Url> {
    playlist_url
        .join(uri)
        .map_err(|e| EdgeError::MalformedPlaylist(format!("invalid URI {uri}: {e}")))
}
