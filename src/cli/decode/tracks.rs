use dsd::process::dop::DOP_SAMPLES_PER_FRAME;
use dsd::source::SampleSource;
use dsd::structs::tags::TrackTags;

/// One track of the source in DSD samples, with the tags to embed.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTrack {
    pub start: u64,
    pub end: u64,
    pub tags: Option<TrackTags>,
}

/// Track list of `source`, or the whole stream as one track.
pub fn source_tracks<S: SampleSource + ?Sized>(source: &S, onefile: bool) -> Vec<SourceTrack> {
    if onefile || source.track_count() <= 1 {
        return vec![SourceTrack {
            start: 0,
            end: source.total_length(),
            tags: source.tags_for(0).cloned(),
        }];
    }

    let tracks = (0..source.track_count())
        .map(|n| SourceTrack {
            start: source.track_start(n),
            end: source.track_end(n),
            tags: source.tags_for(n).cloned(),
        })
        .collect();
    in_stream_order(tracks)
}

/// Sorts tracks by start so a single forward pass can render them all.
fn in_stream_order(mut tracks: Vec<SourceTrack>) -> Vec<SourceTrack> {
    if !tracks.is_sorted_by_key(|t| t.start) {
        log::warn!("Track markers are out of order, writing tracks sorted by start");
        tracks.sort_by_key(|t| t.start);
    }
    for pair in tracks.windows(2) {
        if pair[1].start <= pair[0].end {
            log::warn!(
                "Track starting at sample {} overlaps the previous track, its opening is cut",
                pair[1].start
            );
        }
    }
    tracks
}

/// Inclusive range of frame positions to render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub start: f64,
    pub end: f64,
}

impl Bounds {
    /// Frames rendered when positions advance by `step`.
    pub fn frames(&self, step: f64) -> u64 {
        if self.end < self.start {
            0
        } else {
            ((self.end - self.start) / step).floor() as u64 + 1
        }
    }
}

/// Output sample range of a track, kept inside the decimator's valid region.
pub fn pcm_bounds(track: &SourceTrack, ratio: u32, first_valid: f64, last_valid: f64) -> Bounds {
    let start = track.start as f64 / ratio as f64;
    let end = track.end as f64 / ratio as f64;

    let start = if start < first_valid {
        first_valid
    } else if start >= last_valid {
        last_valid - 1.0
    } else {
        start
    };
    let end = if end <= first_valid {
        first_valid + 1.0
    } else if end > last_valid {
        last_valid
    } else {
        end
    };
    Bounds { start, end }
}

/// DoP frame starts, in DSD samples, for every whole frame inside the track.
pub fn dop_bounds(track: &SourceTrack, total_length: u64) -> Bounds {
    let end = track.end.min(total_length);
    Bounds {
        start: track.start as f64,
        end: end as f64 - DOP_SAMPLES_PER_FRAME as f64,
    }
}
