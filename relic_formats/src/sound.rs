use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::Bytes;

use crate::error::ResourceError;

const HEADER_SIZE: usize = 10;

/// PCM sample data with its playback format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sound {
    pub sample_rate: u32,
    pub bits_per_sample: u8,
    pub channels: u8,
    pub samples: Bytes,
}

impl Sound {
    pub fn decode(bytes: Bytes) -> Result<Self, ResourceError> {
        let mut cursor = Cursor::new(&bytes[..]);
        let truncated = |_| ResourceError::Truncated("sound header");
        let sample_rate = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let bits_per_sample = cursor.read_u8().map_err(truncated)?;
        let channels = cursor.read_u8().map_err(truncated)?;
        let data_len = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;

        if !matches!(bits_per_sample, 8 | 16) {
            return Err(ResourceError::Invalid(format!(
                "unsupported sample width {bits_per_sample}"
            )));
        }
        if !matches!(channels, 1 | 2) {
            return Err(ResourceError::Invalid(format!(
                "unsupported channel count {channels}"
            )));
        }
        let expected = HEADER_SIZE + data_len;
        if bytes.len() != expected {
            return Err(ResourceError::Length {
                expected,
                actual: bytes.len(),
            });
        }

        Ok(Sound {
            sample_rate,
            bits_per_sample,
            channels,
            samples: bytes.slice(HEADER_SIZE..),
        })
    }

    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), ResourceError> {
        let data_len = u32::try_from(self.samples.len())
            .map_err(|_| ResourceError::Invalid("sound data exceeds 4 GiB".into()))?;
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.push(self.bits_per_sample);
        out.push(self.channels);
        out.extend_from_slice(&data_len.to_le_bytes());
        out.extend_from_slice(&self.samples);
        Ok(())
    }

    pub fn frame_count(&self) -> usize {
        let frame_size = usize::from(self.bits_per_sample / 8) * usize::from(self.channels);
        if frame_size == 0 {
            0
        } else {
            self.samples.len() / frame_size
        }
    }
}
