//! DSDIFF comments (`COMT`).

use crate::utils::errors::ReadError;
use crate::utils::reader::SliceReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentType {
    General,
    ChannelComment,
    SoundSource,
    FileHistory,
    Reserved(u16),
}

impl From<u16> for CommentType {
    fn from(value: u16) -> Self {
        match value {
            0 => CommentType::General,
            1 => CommentType::ChannelComment,
            2 => CommentType::SoundSource,
            3 => CommentType::FileHistory,
            other => CommentType::Reserved(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minutes: u8,
    pub comment_type: CommentType,
    pub reference: u16,
    pub text: String,
}

impl Comment {
    /// Parses every comment of a `COMT` body. Each text is padded to even length.
    pub fn parse_all(body: &[u8]) -> Result<Vec<Self>, ReadError> {
        let mut reader = SliceReader::from_slice(body);
        let count = reader.read_be::<u16>()?;
        let mut comments = Vec::with_capacity(count as usize);

        for _ in 0..count {
            let year = reader.read_be()?;
            let month = reader.read_u8()?;
            let day = reader.read_u8()?;
            let hour = reader.read_u8()?;
            let minutes = reader.read_u8()?;
            let comment_type = CommentType::from(reader.read_be::<u16>()?);
            let reference = reader.read_be()?;
            let len = reader.read_be::<u32>()? as usize;
            let text = reader.read_text(len)?;
            if len % 2 == 1 && reader.remaining()? > 0 {
                reader.skip(1)?;
            }

            comments.push(Comment {
                year,
                month,
                day,
                hour,
                minutes,
                comment_type,
                reference,
                text,
            });
        }

        Ok(comments)
    }

    /// Timestamp formatted as `YYYY-MM-DD HH:MM`.
    pub fn timestamp(&self) -> String {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minutes
        )
    }
}
