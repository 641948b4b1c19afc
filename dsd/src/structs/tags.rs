//! Per-track tag records extracted from embedded ID3v2 blocks.

use std::io::Cursor;

use id3::{Tag, TagLike};

/// Size of an ID3v2 header or footer.
pub const ID3_HEADER_LEN: usize = 10;

/// The tag fields handed to the output encoder.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrackTags {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub track: Option<u32>,
    pub year: Option<i32>,
}

impl TrackTags {
    /// Parses a complete ID3v2 tag. Returns `None` when the bytes are not a tag.
    pub fn from_id3_bytes(data: &[u8]) -> Option<Self> {
        id3v2_tag_len(data)?;
        match Tag::read_from2(Cursor::new(data)) {
            Ok(tag) => Some(Self::from_tag(&tag)),
            Err(e) => {
                log::debug!("ID3 tag rejected: {e}");
                None
            }
        }
    }

    pub fn from_tag(tag: &Tag) -> Self {
        Self {
            artist: tag.artist().map(str::to_string),
            album: tag.album().map(str::to_string),
            title: tag.title().map(str::to_string),
            track: tag.track(),
            year: tag
                .year()
                .or_else(|| tag.date_recorded().map(|date| date.year)),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Non-empty fields as `(key, value)` pairs in a fixed order.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let mut entries = Vec::new();
        if let Some(artist) = &self.artist {
            entries.push(("artist", artist.clone()));
        }
        if let Some(album) = &self.album {
            entries.push(("album", album.clone()));
        }
        if let Some(title) = &self.title {
            entries.push(("title", title.clone()));
        }
        if let Some(track) = self.track {
            entries.push(("track number", track.to_string()));
        }
        if let Some(year) = self.year {
            entries.push(("year", year.to_string()));
        }
        entries
    }
}

/// Total length of the ID3v2 tag starting at `header`, including the
/// header and an optional footer. `None` unless the header is well formed.
pub fn id3v2_tag_len(header: &[u8]) -> Option<usize> {
    if header.len() < ID3_HEADER_LEN || &header[..3] != b"ID3" {
        return None;
    }
    let (major, revision, flags) = (header[3], header[4], header[5]);
    if major == 0xFF || revision == 0xFF {
        return None;
    }
    let size_bytes = &header[6..10];
    if size_bytes.iter().any(|&b| b & 0x80 != 0) {
        return None;
    }
    let size = size_bytes
        .iter()
        .fold(0usize, |acc, &b| (acc << 7) | b as usize);
    let footer = if flags & 0x10 != 0 { ID3_HEADER_LEN } else { 0 };

    Some(ID3_HEADER_LEN + size + footer)
}
