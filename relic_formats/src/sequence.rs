use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::error::ResourceError;

const FRAME_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SequenceFrame {
    pub sprite: u16,
    pub delay: u16,
    pub dx: i16,
    pub dy: i16,
}

/// Animation: sprites shown in order with per-frame delay and offset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Sequence {
    pub frames: Vec<SequenceFrame>,
}

impl Sequence {
    pub fn decode(bytes: &[u8]) -> Result<Self, ResourceError> {
        let mut cursor = Cursor::new(bytes);
        let count = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| ResourceError::Truncated("sequence frame count"))?;
        let expected = 2 + usize::from(count) * FRAME_SIZE;
        if bytes.len() != expected {
            return Err(ResourceError::Length {
                expected,
                actual: bytes.len(),
            });
        }

        let mut frames = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            frames.push(SequenceFrame {
                sprite: cursor.read_u16::<LittleEndian>().map_err(|_| ResourceError::Truncated("sequence frame"))?,
                delay: cursor.read_u16::<LittleEndian>().map_err(|_| ResourceError::Truncated("sequence frame"))?,
                dx: cursor.read_i16::<LittleEndian>().map_err(|_| ResourceError::Truncated("sequence frame"))?,
                dy: cursor.read_i16::<LittleEndian>().map_err(|_| ResourceError::Truncated("sequence frame"))?,
            });
        }
        Ok(Sequence { frames })
    }

    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), ResourceError> {
        let count = u16::try_from(self.frames.len()).map_err(|_| {
            ResourceError::Invalid(format!("sequence has {} frames", self.frames.len()))
        })?;
        out.extend_from_slice(&count.to_le_bytes());
        for frame in &self.frames {
            out.extend_from_slice(&frame.sprite.to_le_bytes());
            out.extend_from_slice(&frame.delay.to_le_bytes());
            out.extend_from_slice(&frame.dx.to_le_bytes());
            out.extend_from_slice(&frame.dy.to_le_bytes());
        }
        Ok(())
    }

    /// Sum of frame delays.
    pub fn duration(&self) -> u32 {
        self.frames.iter().map(|frame| u32::from(frame.delay)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_frames_and_checks_length() {
        let sequence = Sequence {
            frames: vec![
                SequenceFrame { sprite: 4, delay: 6, dx: -2, dy: 0 },
                SequenceFrame { sprite: 5, delay: 10, dx: 3, dy: -1 },
            ],
        };
        let mut bytes = Vec::new();
        sequence.encode(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 2 + 16);
        assert_eq!(Sequence::decode(&bytes).unwrap(), sequence);
        assert_eq!(sequence.duration(), 16);

        bytes.push(0);
        assert!(matches!(
            Sequence::decode(&bytes),
            Err(ResourceError::Length { expected: 18, actual: 19 })
        ));
    }
}
