use std::fmt;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::Bytes;
use serde::Serialize;

use crate::error::{ImageError, ResourceError};
use crate::lazy::LazyResource;
use crate::reader::remaining;

/// Size of the zero-filled history the LZ codec may copy from before any
/// output has been produced.
const WINDOW_SIZE: usize = 0x1000;
const SHORT_MAX_DISTANCE: usize = 0x100;
const SHORT_MAX_LEN: usize = 6;
const NIBBLE_MAX_LEN: usize = 18;
const EXTENDED_MAX_LEN: usize = 256;
const MIN_MATCH: usize = 3;

/// Which table an image came from. Sprites carry an extra frame rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    Sprite,
    Icon,
    RoomImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Compression {
    Raw = 0,
    Lz = 1,
}

impl Compression {
    pub fn from_u8(value: u8) -> Result<Self, ImageError> {
        match value {
            0 => Ok(Compression::Raw),
            1 => Ok(Compression::Lz),
            other => Err(ImageError::UnknownCompression(other)),
        }
    }

    pub fn codec(self) -> &'static dyn PixelCodec {
        match self {
            Compression::Raw => &RawCodec,
            Compression::Lz => &LzCodec,
        }
    }
}

/// Visible frame of a sprite; the rest of the sheet is padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpriteFrame {
    pub width: u16,
    pub height: u16,
}

/// Decodes a payload into a `width` x `height` grid of palette indices.
pub trait PixelCodec: Sync {
    fn decode(&self, payload: &[u8], width: u16, height: u16) -> Result<PixelGrid, ImageError>;
}

pub struct RawCodec;

impl PixelCodec for RawCodec {
    fn decode(&self, payload: &[u8], width: u16, height: u16) -> Result<PixelGrid, ImageError> {
        PixelGrid::from_raw(width, height, payload.to_vec())
    }
}

pub struct LzCodec;

impl PixelCodec for LzCodec {
    fn decode(&self, payload: &[u8], width: u16, height: u16) -> Result<PixelGrid, ImageError> {
        let expected = usize::from(width) * usize::from(height);
        let pixels = decompress_lz(payload, expected)?;
        PixelGrid::from_raw(width, height, pixels)
    }
}

/// Row-major palette indices in one flat buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    width: u16,
    height: u16,
    stride: usize,
    pixels: Vec<u8>,
}

impl PixelGrid {
    pub fn new(width: u16, height: u16) -> Self {
        let stride = usize::from(width);
        Self {
            width,
            height,
            stride,
            pixels: vec![0; stride * usize::from(height)],
        }
    }

    pub fn from_raw(width: u16, height: u16, pixels: Vec<u8>) -> Result<Self, ImageError> {
        let expected = usize::from(width) * usize::from(height);
        if pixels.len() != expected {
            return Err(ImageError::PayloadLength {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            stride: usize::from(width),
            pixels,
        })
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    fn index(&self, x: u16, y: u16) -> Option<usize> {
        if x < self.width && y < self.height {
            Some(usize::from(y) * self.stride + usize::from(x))
        } else {
            None
        }
    }

    pub fn get(&self, x: u16, y: u16) -> Option<u8> {
        self.index(x, y).map(|index| self.pixels[index])
    }

    pub fn set(&mut self, x: u16, y: u16, value: u8) -> bool {
        match self.index(x, y) {
            Some(index) => {
                self.pixels[index] = value;
                true
            }
            None => false,
        }
    }

    pub fn row(&self, y: u16) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = usize::from(y) * self.stride;
        Some(&self.pixels[start..start + usize::from(self.width)])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }
}

type DecodedPixels = Result<PixelGrid, ImageError>;

/// Sprite, icon, or room image. Pixels are decoded on first access.
pub struct ImageResource {
    pub width: u16,
    pub height: u16,
    pub sprite_frame: Option<SpriteFrame>,
    pub compression: Compression,
    payload: Bytes,
    pixels: LazyResource<DecodedPixels>,
}

impl ImageResource {
    /// Parses the sub-header eagerly and defers the pixel decode.
    pub fn decode(kind: ImageKind, bytes: Bytes) -> Result<Self, ResourceError> {
        let mut cursor = Cursor::new(&bytes[..]);
        let width = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| ImageError::TruncatedHeader)?;
        let height = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| ImageError::TruncatedHeader)?;
        let sprite_frame = match kind {
            ImageKind::Sprite => Some(SpriteFrame {
                width: cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| ImageError::TruncatedHeader)?,
                height: cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| ImageError::TruncatedHeader)?,
            }),
            ImageKind::Icon | ImageKind::RoomImage => None,
        };
        let compression = Compression::from_u8(
            cursor
                .read_u8()
                .map_err(|_| ImageError::TruncatedHeader)?,
        )?;

        check_header(kind, width, height, sprite_frame)?;

        let header_len = cursor.position() as usize;
        let payload_len = remaining(&cursor);
        let expected = usize::from(width) * usize::from(height);
        if compression == Compression::Raw && payload_len != expected {
            return Err(ImageError::PayloadLength {
                expected,
                actual: payload_len,
            }
            .into());
        }

        let payload = bytes.slice(header_len..);
        Ok(Self::deferred(
            width,
            height,
            sprite_frame,
            compression,
            payload,
        ))
    }

    /// Builds an uncompressed image from pixels an editor produced.
    pub fn from_pixels(grid: PixelGrid, sprite_frame: Option<SpriteFrame>) -> Self {
        Self {
            width: grid.width(),
            height: grid.height(),
            sprite_frame,
            compression: Compression::Raw,
            payload: Bytes::copy_from_slice(grid.as_bytes()),
            pixels: LazyResource::from_value(Ok(grid)),
        }
    }

    /// Builds an LZ-compressed image from pixels an editor produced.
    pub fn from_pixels_compressed(grid: PixelGrid, sprite_frame: Option<SpriteFrame>) -> Self {
        Self {
            width: grid.width(),
            height: grid.height(),
            sprite_frame,
            compression: Compression::Lz,
            payload: Bytes::from(compress_lz(grid.as_bytes())),
            pixels: LazyResource::from_value(Ok(grid)),
        }
    }

    fn deferred(
        width: u16,
        height: u16,
        sprite_frame: Option<SpriteFrame>,
        compression: Compression,
        payload: Bytes,
    ) -> Self {
        let source = payload.clone();
        Self {
            width,
            height,
            sprite_frame,
            compression,
            payload,
            pixels: LazyResource::new(move || compression.codec().decode(&source, width, height)),
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Decodes on first call; later calls return the cached grid.
    pub fn pixels(&self) -> Result<&PixelGrid, ImageError> {
        self.pixels.get().as_ref().map_err(Clone::clone)
    }

    pub fn is_decoded(&self) -> bool {
        self.pixels.is_initialized()
    }

    /// Writes the sub-header for `kind` and the payload. Fails when the
    /// model could not be read back from a `kind` table.
    pub fn encode(&self, kind: ImageKind, out: &mut Vec<u8>) -> Result<(), ImageError> {
        check_header(kind, self.width, self.height, self.sprite_frame)?;
        let expected = usize::from(self.width) * usize::from(self.height);
        if self.compression == Compression::Raw && self.payload.len() != expected {
            return Err(ImageError::PayloadLength {
                expected,
                actual: self.payload.len(),
            });
        }

        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        if let Some(frame) = self.sprite_frame {
            out.extend_from_slice(&frame.width.to_le_bytes());
            out.extend_from_slice(&frame.height.to_le_bytes());
        }
        out.push(self.compression as u8);
        out.extend_from_slice(&self.payload);
        Ok(())
    }
}

fn check_header(
    kind: ImageKind,
    width: u16,
    height: u16,
    sprite_frame: Option<SpriteFrame>,
) -> Result<(), ImageError> {
    if width == 0 || height == 0 {
        return Err(ImageError::ZeroSize);
    }
    match (kind, sprite_frame) {
        (ImageKind::Sprite, None) => Err(ImageError::MissingSpriteFrame),
        (ImageKind::Icon | ImageKind::RoomImage, Some(_)) => Err(ImageError::UnexpectedSpriteFrame),
        (_, Some(frame)) if frame.width > width || frame.height > height => {
            Err(ImageError::SpriteFrameOutOfBounds {
                width,
                height,
                frame_width: frame.width,
                frame_height: frame.height,
            })
        }
        _ => Ok(()),
    }
}

impl Clone for ImageResource {
    fn clone(&self) -> Self {
        match self.pixels.get_if_initialized() {
            Some(decoded) => Self {
                width: self.width,
                height: self.height,
                sprite_frame: self.sprite_frame,
                compression: self.compression,
                payload: self.payload.clone(),
                pixels: LazyResource::from_value(decoded.clone()),
            },
            None => Self::deferred(
                self.width,
                self.height,
                self.sprite_frame,
                self.compression,
                self.payload.clone(),
            ),
        }
    }
}

/// Equality is over the serialized form; cache state is not compared.
impl PartialEq for ImageResource {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.sprite_frame == other.sprite_frame
            && self.compression == other.compression
            && self.payload == other.payload
    }
}

impl fmt::Debug for ImageResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageResource")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sprite_frame", &self.sprite_frame)
            .field("compression", &self.compression)
            .field("payload_len", &self.payload.len())
            .field("decoded", &self.is_decoded())
            .finish()
    }
}

struct FlagStream<'a> {
    input: &'a [u8],
    flags: u16,
    available: u8,
}

impl<'a> FlagStream<'a> {
    fn new(input: &'a [u8]) -> Option<Self> {
        let mut stream = Self {
            input,
            flags: 0,
            available: 0,
        };
        stream.flags = stream.word()?;
        stream.available = 16;
        Some(stream)
    }

    fn byte(&mut self) -> Option<u8> {
        let (&value, rest) = self.input.split_first()?;
        self.input = rest;
        Some(value)
    }

    fn word(&mut self) -> Option<u16> {
        let lo = self.byte()?;
        let hi = self.byte()?;
        Some(u16::from_le_bytes([lo, hi]))
    }

    fn flag(&mut self) -> Option<bool> {
        if self.available == 0 {
            self.flags = self.word()?;
            self.available = 16;
        }
        let bit = self.flags & 1 == 1;
        self.flags >>= 1;
        self.available -= 1;
        Some(bit)
    }
}

/// Expands an LZ window stream into exactly `expected` bytes.
pub fn decompress_lz(input: &[u8], expected: usize) -> Result<Vec<u8>, ImageError> {
    let mut window = vec![0u8; WINDOW_SIZE + expected];
    let mut pos = WINDOW_SIZE;
    let end = WINDOW_SIZE + expected;
    let exhausted = |pos: usize| ImageError::StreamExhausted {
        produced: pos - WINDOW_SIZE,
        expected,
    };

    if expected == 0 {
        return Ok(Vec::new());
    }
    let mut stream = FlagStream::new(input).ok_or_else(|| exhausted(pos))?;

    while pos < end {
        if stream.flag().ok_or_else(|| exhausted(pos))? {
            window[pos] = stream.byte().ok_or_else(|| exhausted(pos))?;
            pos += 1;
            continue;
        }

        let (len, distance) = if !stream.flag().ok_or_else(|| exhausted(pos))? {
            let high = usize::from(stream.flag().ok_or_else(|| exhausted(pos))?);
            let low = usize::from(stream.flag().ok_or_else(|| exhausted(pos))?);
            let offset = stream.byte().ok_or_else(|| exhausted(pos))?;
            (high * 2 + low + MIN_MATCH, SHORT_MAX_DISTANCE - usize::from(offset))
        } else {
            let lo = usize::from(stream.byte().ok_or_else(|| exhausted(pos))?);
            let hi = usize::from(stream.byte().ok_or_else(|| exhausted(pos))?);
            let distance = WINDOW_SIZE - (lo | ((hi & 0xF0) << 4));
            let mut len = (hi & 0x0F) + MIN_MATCH;
            if len == MIN_MATCH {
                len = usize::from(stream.byte().ok_or_else(|| exhausted(pos))?) + 1;
                if len == 1 {
                    break;
                }
            }
            (len, distance)
        };

        // distance never exceeds WINDOW_SIZE, so the source stays inside the window.
        for _ in 0..len {
            if pos == end {
                break;
            }
            window[pos] = window[pos - distance];
            pos += 1;
        }
    }

    if pos < end {
        return Err(ImageError::ShortOutput {
            produced: pos - WINDOW_SIZE,
            expected,
        });
    }
    Ok(window.split_off(WINDOW_SIZE))
}

struct FlagWriter {
    out: Vec<u8>,
    slot: usize,
    used: u8,
}

impl FlagWriter {
    fn new() -> Self {
        Self {
            out: vec![0, 0],
            slot: 0,
            used: 0,
        }
    }

    fn flag(&mut self, bit: bool) {
        if self.used == 16 {
            self.slot = self.out.len();
            self.out.extend_from_slice(&[0, 0]);
            self.used = 0;
        }
        if bit {
            let mut word = u16::from_le_bytes([self.out[self.slot], self.out[self.slot + 1]]);
            word |= 1 << self.used;
            self.out[self.slot..self.slot + 2].copy_from_slice(&word.to_le_bytes());
        }
        self.used += 1;
    }

    fn byte(&mut self, value: u8) {
        self.out.push(value);
    }
}

fn longest_match(data: &[u8], pos: usize) -> (usize, usize) {
    let max_len = EXTENDED_MAX_LEN.min(data.len() - pos);
    let mut best = (0, 0);
    for distance in 1..=WINDOW_SIZE.min(pos) {
        let start = pos - distance;
        let mut len = 0;
        while len < max_len && data[start + len] == data[pos + len] {
            len += 1;
        }
        if len > best.0 {
            best = (len, distance);
            if len == max_len {
                break;
            }
        }
    }
    best
}

/// Greedy compressor producing streams [`decompress_lz`] accepts.
pub fn compress_lz(data: &[u8]) -> Vec<u8> {
    let mut writer = FlagWriter::new();
    let mut pos = 0;

    while pos < data.len() {
        let (len, distance) = longest_match(data, pos);
        if len < MIN_MATCH {
            writer.flag(true);
            writer.byte(data[pos]);
            pos += 1;
            continue;
        }

        writer.flag(false);
        if len <= SHORT_MAX_LEN && distance <= SHORT_MAX_DISTANCE {
            let code = len - MIN_MATCH;
            writer.flag(false);
            writer.flag(code & 2 != 0);
            writer.flag(code & 1 != 0);
            writer.byte((SHORT_MAX_DISTANCE - distance) as u8);
        } else {
            let value = WINDOW_SIZE - distance;
            writer.flag(true);
            writer.byte((value & 0xFF) as u8);
            if (MIN_MATCH + 1..=NIBBLE_MAX_LEN).contains(&len) {
                writer.byte((((value >> 8) & 0x0F) << 4 | (len - MIN_MATCH)) as u8);
            } else {
                writer.byte((((value >> 8) & 0x0F) << 4) as u8);
                writer.byte((len - 1) as u8);
            }
        }
        pos += len;
    }

    writer.out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sprite_bytes(width: u16, height: u16, frame: (u16, u16), compression: u8, payload: &[u8]) -> Bytes {
        let mut data = Vec::new();
        data.extend_from_slice(&width.to_le_bytes());
        data.extend_from_slice(&height.to_le_bytes());
        data.extend_from_slice(&frame.0.to_le_bytes());
        data.extend_from_slice(&frame.1.to_le_bytes());
        data.push(compression);
        data.extend_from_slice(payload);
        Bytes::from(data)
    }

    #[test]
    fn decodes_raw_sprite_lazily() {
        let bytes = sprite_bytes(2, 2, (1, 2), 0, &[1, 2, 3, 4]);
        let image = ImageResource::decode(ImageKind::Sprite, bytes.clone()).expect("header parses");
        assert_eq!(image.sprite_frame, Some(SpriteFrame { width: 1, height: 2 }));
        assert!(!image.is_decoded());

        let grid = image.pixels().expect("pixels decode");
        assert_eq!(grid.get(1, 0), Some(2));
        assert_eq!(grid.row(1), Some(&[3u8, 4][..]));
        assert_eq!(grid.get(2, 0), None);
        assert!(image.is_decoded());

        let mut encoded = Vec::new();
        image.encode(ImageKind::Sprite, &mut encoded).unwrap();
        assert_eq!(encoded, bytes.to_vec());
    }

    #[test]
    fn rejects_bad_sub_headers() {
        let short = ImageResource::decode(ImageKind::Icon, Bytes::from_static(&[1, 0, 1]));
        assert!(matches!(short, Err(ResourceError::Image(ImageError::TruncatedHeader))));

        let frame = ImageResource::decode(ImageKind::Sprite, sprite_bytes(2, 2, (3, 1), 0, &[0; 4]));
        assert!(matches!(
            frame,
            Err(ResourceError::Image(ImageError::SpriteFrameOutOfBounds { .. }))
        ));

        let codec = ImageResource::decode(ImageKind::Sprite, sprite_bytes(2, 2, (2, 2), 9, &[0; 4]));
        assert!(matches!(
            codec,
            Err(ResourceError::Image(ImageError::UnknownCompression(9)))
        ));

        let raw = ImageResource::decode(ImageKind::Sprite, sprite_bytes(2, 2, (2, 2), 0, &[0; 3]));
        assert!(matches!(
            raw,
            Err(ResourceError::Image(ImageError::PayloadLength { expected: 4, actual: 3 }))
        ));
    }

    #[test]
    fn encode_refuses_headers_the_table_cannot_read() {
        let sheet = || PixelGrid::new(4, 4);
        let frame = |width, height| Some(SpriteFrame { width, height });
        let encode = |image: ImageResource, kind| image.encode(kind, &mut Vec::new());

        assert_eq!(
            encode(ImageResource::from_pixels(sheet(), None), ImageKind::Sprite),
            Err(ImageError::MissingSpriteFrame)
        );
        assert_eq!(
            encode(ImageResource::from_pixels(sheet(), frame(2, 2)), ImageKind::Icon),
            Err(ImageError::UnexpectedSpriteFrame)
        );
        assert!(matches!(
            encode(ImageResource::from_pixels(sheet(), frame(5, 1)), ImageKind::Sprite),
            Err(ImageError::SpriteFrameOutOfBounds { frame_width: 5, .. })
        ));
        assert_eq!(
            encode(ImageResource::from_pixels(PixelGrid::new(0, 3), None), ImageKind::RoomImage),
            Err(ImageError::ZeroSize)
        );
        assert!(encode(ImageResource::from_pixels(sheet(), frame(4, 4)), ImageKind::Sprite).is_ok());
    }

    #[test]
    fn lz_round_trips_runs_and_noise() {
        let mut data = Vec::new();
        data.extend(std::iter::repeat(7u8).take(300));
        data.extend((0..200u32).map(|i| (i * 37 % 251) as u8));
        data.extend_from_slice(b"abcabcabcabcabcabcabcabcabcabcabcabc");
        data.extend(std::iter::repeat(0u8).take(40));

        let packed = compress_lz(&data);
        assert!(packed.len() < data.len());
        assert_eq!(decompress_lz(&packed, data.len()).unwrap(), data);
    }

    #[test]
    fn lz_reports_exhausted_stream() {
        // Flags say "literal" sixteen times but no literal bytes follow.
        let err = decompress_lz(&[0xFF, 0xFF], 4).unwrap_err();
        assert_eq!(
            err,
            ImageError::StreamExhausted {
                produced: 0,
                expected: 4
            }
        );
    }

    #[test]
    fn lz_image_decodes_on_demand() {
        let mut grid = PixelGrid::new(4, 3);
        for y in 0..3 {
            for x in 0..4 {
                grid.set(x, y, (x % 2) as u8);
            }
        }
        let image = ImageResource::from_pixels_compressed(grid.clone(), None);
        let mut encoded = Vec::new();
        image.encode(ImageKind::Icon, &mut encoded).unwrap();

        let reloaded = ImageResource::decode(ImageKind::Icon, Bytes::from(encoded)).unwrap();
        assert_eq!(reloaded, image);
        assert!(!reloaded.is_decoded());
        assert_eq!(reloaded.pixels().unwrap(), &grid);
    }
}
