use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::error::ResourceError;

/// Pixel size of a room's scrolling backdrop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackdropSize {
    pub width: u16,
    pub height: u16,
}

impl BackdropSize {
    pub const SIZE: usize = 4;

    pub fn decode(bytes: &[u8]) -> Result<Self, ResourceError> {
        expect_len(bytes, Self::SIZE)?;
        let mut cursor = Cursor::new(bytes);
        Ok(Self {
            width: read_u16(&mut cursor)?,
            height: read_u16(&mut cursor)?,
        })
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
    }
}

/// Cross references that tie a room to its backdrop, palette, script and music.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoomInfo {
    pub backdrop: u16,
    pub palette: u16,
    pub program: u16,
    pub music: u16,
    pub flags: u16,
}

impl RoomInfo {
    pub const SIZE: usize = 10;

    pub fn decode(bytes: &[u8]) -> Result<Self, ResourceError> {
        expect_len(bytes, Self::SIZE)?;
        let mut cursor = Cursor::new(bytes);
        Ok(Self {
            backdrop: read_u16(&mut cursor)?,
            palette: read_u16(&mut cursor)?,
            program: read_u16(&mut cursor)?,
            music: read_u16(&mut cursor)?,
            flags: read_u16(&mut cursor)?,
        })
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        for value in [self.backdrop, self.palette, self.program, self.music, self.flags] {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

fn expect_len(bytes: &[u8], expected: usize) -> Result<(), ResourceError> {
    if bytes.len() != expected {
        return Err(ResourceError::Length {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn read_u16(cursor: &mut Cursor<&[u8]>) -> Result<u16, ResourceError> {
    cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| ResourceError::Truncated("room record"))
}
