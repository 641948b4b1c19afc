//! Track markers and the absolute start time anchor.
//!
//! DSDIFF marks track boundaries with `MARK` records stored inside the
//! `DIIN` container. Each marker carries a timecode relative to the `ABSS`
//! anchor of the property chunk; converting it to a sample offset and
//! pairing start markers with the next boundary yields the track list.

use crate::utils::errors::ReadError;
use crate::utils::reader::SliceReader;

/// Absolute start time of the first sample (`ABSS`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AbsoluteStartTime {
    pub hours: u16,
    pub minutes: u8,
    pub seconds: u8,
    pub samples: u32,
}

impl AbsoluteStartTime {
    pub fn parse(body: &[u8]) -> Result<Self, ReadError> {
        let mut reader = SliceReader::from_slice(body);
        Ok(Self {
            hours: reader.read_be()?,
            minutes: reader.read_u8()?,
            seconds: reader.read_u8()?,
            samples: reader.read_be()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkType {
    TrackStart,
    TrackStop,
    ProgramStart,
    Obsolete,
    Index,
    Reserved(u16),
}

impl From<u16> for MarkType {
    fn from(value: u16) -> Self {
        match value {
            0 => MarkType::TrackStart,
            1 => MarkType::TrackStop,
            2 => MarkType::ProgramStart,
            3 => MarkType::Obsolete,
            4 => MarkType::Index,
            other => MarkType::Reserved(other),
        }
    }
}

impl MarkType {
    /// Whether this marker opens or closes a track.
    #[inline]
    pub fn is_track_boundary(self) -> bool {
        matches!(self, MarkType::TrackStart | MarkType::TrackStop)
    }
}

/// One `MARK` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMarker {
    pub hours: u16,
    pub minutes: u8,
    pub seconds: u8,
    pub samples: u32,
    pub offset: i32,
    pub mark_type: MarkType,
    pub channel: u16,
    pub flags: u16,
    pub text: String,
}

impl TrackMarker {
    pub fn parse(body: &[u8]) -> Result<Self, ReadError> {
        let mut reader = SliceReader::from_slice(body);

        let hours = reader.read_be()?;
        let minutes = reader.read_u8()?;
        let seconds = reader.read_u8()?;
        let samples = reader.read_be()?;
        let offset = reader.read_be()?;
        let mark_type = MarkType::from(reader.read_be::<u16>()?);
        let channel = reader.read_be()?;
        let flags = reader.read_be()?;
        let count = reader.read_be::<u32>()? as usize;
        let text = reader.read_text(count)?;

        Ok(Self {
            hours,
            minutes,
            seconds,
            samples,
            offset,
            mark_type,
            channel,
            flags,
            text,
        })
    }

    /// Sample offset of this marker relative to the anchor, clamped at zero.
    pub fn position(&self, anchor: &AbsoluteStartTime, sampling_frequency: u32) -> u64 {
        let dh = self.hours as i64 - anchor.hours as i64;
        let dm = self.minutes as i64 - anchor.minutes as i64;
        let ds = self.seconds as i64 - anchor.seconds as i64;
        let dsamples = self.samples as i64 - anchor.samples as i64;

        let pos = (dh * 3600 + dm * 60 + ds) * sampling_frequency as i64
            + dsamples
            + self.offset as i64;

        pos.max(0) as u64
    }
}

/// Sample range of one logical track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackSpan {
    pub start: u64,
    pub end: u64,
}

/// Pairs every start marker with the next boundary marker.
///
/// A start opens a track; any following start or stop closes it one sample
/// before its own position. A track still open after the last marker is
/// dropped. Without any closed track the whole stream is a single track.
pub fn derive_tracks(
    markers: &[TrackMarker],
    anchor: &AbsoluteStartTime,
    sampling_frequency: u32,
    total_length: u64,
) -> Vec<TrackSpan> {
    let mut tracks = Vec::new();
    let mut open: Option<u64> = None;

    for marker in markers.iter().filter(|m| m.mark_type.is_track_boundary()) {
        let pos = marker.position(anchor, sampling_frequency);

        if let Some(start) = open.take() {
            tracks.push(TrackSpan {
                start,
                end: pos.saturating_sub(1),
            });
        }

        if marker.mark_type == MarkType::TrackStart {
            open = Some(pos);
        }
    }

    if tracks.is_empty() {
        tracks.push(TrackSpan {
            start: 0,
            end: total_length,
        });
    }

    tracks
}
