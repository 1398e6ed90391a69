use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::error::ResourceError;
use crate::reader::{decode_latin1, encode_latin1};

/// The archive-wide text blob, one byte per character.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TextBlob {
    pub declared_len: u32,
    pub text: String,
}

impl TextBlob {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            declared_len: text.chars().count() as u32,
            text,
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ResourceError> {
        let mut cursor = Cursor::new(bytes);
        let declared_len = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| ResourceError::Truncated("text length prefix"))?;
        let body = &bytes[cursor.position() as usize..];
        Ok(Self {
            declared_len,
            text: decode_latin1(body),
        })
    }

    /// Declared and actual byte counts when they disagree. Never fatal.
    pub fn length_mismatch(&self) -> Option<(u32, usize)> {
        let actual = self.text.chars().count();
        if actual != self.declared_len as usize {
            Some((self.declared_len, actual))
        } else {
            None
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), ResourceError> {
        let body = encode_latin1(&self.text).ok_or_else(|| {
            ResourceError::Invalid("text contains characters outside the single-byte range".into())
        })?;
        out.extend_from_slice(&self.declared_len.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_payload_is_kept_and_flagged() {
        let mut data = 3u32.to_le_bytes().to_vec();
        data.extend_from_slice(b"hello");
        let blob = TextBlob::decode(&data).unwrap();
        assert_eq!(blob.text, "hello");
        assert_eq!(blob.length_mismatch(), Some((3, 5)));

        let mut encoded = Vec::new();
        blob.encode(&mut encoded).unwrap();
        assert_eq!(encoded, data);
    }

    #[test]
    fn matching_length_reports_nothing() {
        assert_eq!(TextBlob::new("door").length_mismatch(), None);
        assert!(TextBlob::decode(&[1, 0]).is_err());
    }
}
