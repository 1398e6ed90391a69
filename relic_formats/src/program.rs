//! Room and character scripts: an offset-indexed instruction stream plus the
//! geometry and dialogue tables the instructions refer to.
//!
//! Layout: `u32` code length, the code bytes, then each auxiliary section as a
//! `u16` count followed by fixed-stride records, and finally the string table
//! (`u16` count of `id u16, len u16, bytes`).

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{self, Cursor};

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::error::{InstructionError, ProgramError};
use crate::instruction::{self, Instruction};
use crate::opcode::OpcodeRegistry;
use crate::reader::{decode_latin1, encode_latin1, remaining, take};

/// Fixed-stride auxiliary record.
trait Record: Sized {
    const STRIDE: usize;

    fn read(cursor: &mut Cursor<&[u8]>) -> io::Result<Self>;
    fn write(&self, out: &mut Vec<u8>);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub left: i16,
    pub top: i16,
    pub right: i16,
    pub bottom: i16,
}

impl Rect {
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left && point.x < self.right && point.y >= self.top && point.y < self.bottom
    }
}

impl Record for Rect {
    const STRIDE: usize = 8;

    fn read(cursor: &mut Cursor<&[u8]>) -> io::Result<Self> {
        Ok(Rect {
            left: cursor.read_i16::<LittleEndian>()?,
            top: cursor.read_i16::<LittleEndian>()?,
            right: cursor.read_i16::<LittleEndian>()?,
            bottom: cursor.read_i16::<LittleEndian>()?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        for value in [self.left, self.top, self.right, self.bottom] {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Point {
    pub x: i16,
    pub y: i16,
}

impl Record for Point {
    const STRIDE: usize = 4;

    fn read(cursor: &mut Cursor<&[u8]>) -> io::Result<Self> {
        Ok(Point {
            x: cursor.read_i16::<LittleEndian>()?,
            y: cursor.read_i16::<LittleEndian>()?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.x.to_le_bytes());
        out.extend_from_slice(&self.y.to_le_bytes());
    }
}

/// Walkable connection between two points, clipped to a rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalkLink {
    pub from: Point,
    pub to: Point,
    pub clip: Rect,
    pub area_from: u16,
    pub area_to: u16,
}

impl Record for WalkLink {
    const STRIDE: usize = 20;

    fn read(cursor: &mut Cursor<&[u8]>) -> io::Result<Self> {
        Ok(WalkLink {
            from: Point::read(cursor)?,
            to: Point::read(cursor)?,
            clip: Rect::read(cursor)?,
            area_from: cursor.read_u16::<LittleEndian>()?,
            area_to: cursor.read_u16::<LittleEndian>()?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        self.from.write(out);
        self.to.write(out);
        self.clip.write(out);
        out.extend_from_slice(&self.area_from.to_le_bytes());
        out.extend_from_slice(&self.area_to.to_le_bytes());
    }
}

/// Animated region playing a sequence at a fixed position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Area {
    pub sequence: u16,
    pub x: i16,
    pub y: i16,
    pub flags: u16,
}

impl Record for Area {
    const STRIDE: usize = 8;

    fn read(cursor: &mut Cursor<&[u8]>) -> io::Result<Self> {
        Ok(Area {
            sequence: cursor.read_u16::<LittleEndian>()?,
            x: cursor.read_i16::<LittleEndian>()?,
            y: cursor.read_i16::<LittleEndian>()?,
            flags: cursor.read_u16::<LittleEndian>()?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.sequence.to_le_bytes());
        out.extend_from_slice(&self.x.to_le_bytes());
        out.extend_from_slice(&self.y.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
    }
}

/// Scaled blit of part of a room image. `scale` is in 1/256ths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Background {
    pub room_image: u16,
    pub source: Rect,
    pub dest: Rect,
    pub scale: u16,
}

impl Record for Background {
    const STRIDE: usize = 20;

    fn read(cursor: &mut Cursor<&[u8]>) -> io::Result<Self> {
        Ok(Background {
            room_image: cursor.read_u16::<LittleEndian>()?,
            source: Rect::read(cursor)?,
            dest: Rect::read(cursor)?,
            scale: cursor.read_u16::<LittleEndian>()?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.room_image.to_le_bytes());
        self.source.write(out);
        self.dest.write(out);
        out.extend_from_slice(&self.scale.to_le_bytes());
    }
}

pub const HITBOX_ACTIONS: usize = 8;

/// Clickable region with its default verb bindings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Hitbox {
    pub object: u16,
    pub actions: [u16; HITBOX_ACTIONS],
    pub bounds: Rect,
    pub approach: Rect,
}

impl Record for Hitbox {
    const STRIDE: usize = 34;

    fn read(cursor: &mut Cursor<&[u8]>) -> io::Result<Self> {
        let object = cursor.read_u16::<LittleEndian>()?;
        let mut actions = [0u16; HITBOX_ACTIONS];
        cursor.read_u16_into::<LittleEndian>(&mut actions)?;
        Ok(Hitbox {
            object,
            actions,
            bounds: Rect::read(cursor)?,
            approach: Rect::read(cursor)?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.object.to_le_bytes());
        for action in self.actions {
            out.extend_from_slice(&action.to_le_bytes());
        }
        self.bounds.write(out);
        self.approach.write(out);
    }
}

/// Entry point run when `object` is used on `target`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionScript {
    pub object: u16,
    pub target: u16,
    pub offset: u32,
}

impl Record for ActionScript {
    const STRIDE: usize = 8;

    fn read(cursor: &mut Cursor<&[u8]>) -> io::Result<Self> {
        Ok(ActionScript {
            object: cursor.read_u16::<LittleEndian>()?,
            target: cursor.read_u16::<LittleEndian>()?,
            offset: cursor.read_u32::<LittleEndian>()?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.object.to_le_bytes());
        out.extend_from_slice(&self.target.to_le_bytes());
        out.extend_from_slice(&self.offset.to_le_bytes());
    }
}

/// Dialogue choice: where its script starts and which line it shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Conversation {
    pub choice: u16,
    pub offset: u32,
    pub message: u16,
}

impl Record for Conversation {
    const STRIDE: usize = 8;

    fn read(cursor: &mut Cursor<&[u8]>) -> io::Result<Self> {
        Ok(Conversation {
            choice: cursor.read_u16::<LittleEndian>()?,
            offset: cursor.read_u32::<LittleEndian>()?,
            message: cursor.read_u16::<LittleEndian>()?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.choice.to_le_bytes());
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.message.to_le_bytes());
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CharacterScript {
    pub character: u16,
    pub offset: u32,
}

impl Record for CharacterScript {
    const STRIDE: usize = 6;

    fn read(cursor: &mut Cursor<&[u8]>) -> io::Result<Self> {
        Ok(CharacterScript {
            character: cursor.read_u16::<LittleEndian>()?,
            offset: cursor.read_u32::<LittleEndian>()?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.character.to_le_bytes());
        out.extend_from_slice(&self.offset.to_le_bytes());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Program {
    pub rects: Vec<Rect>,
    pub points: Vec<Point>,
    pub walk_links: Vec<WalkLink>,
    pub areas: Vec<Area>,
    pub backgrounds: Vec<Background>,
    pub hitboxes: Vec<Hitbox>,
    pub action_scripts: Vec<ActionScript>,
    pub conversations: Vec<Conversation>,
    pub character_scripts: Vec<CharacterScript>,
    pub strings: BTreeMap<u16, String>,
    pub instructions: BTreeMap<u32, Instruction>,
}

impl Program {
    pub fn decode(registry: &OpcodeRegistry, bytes: &[u8]) -> Result<Self, ProgramError> {
        let mut cursor = Cursor::new(bytes);
        let code_length = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| ProgramError::TruncatedHeader)?;
        let code = take(&mut cursor, code_length as usize).ok_or(ProgramError::CodeOverrun {
            declared: code_length,
            available: remaining(&cursor),
        })?;
        let instructions = decode_instructions(registry, code)?;

        let program = Program {
            rects: read_section(&mut cursor, "rects")?,
            points: read_section(&mut cursor, "points")?,
            walk_links: read_section(&mut cursor, "walk links")?,
            areas: read_section(&mut cursor, "areas")?,
            backgrounds: read_section(&mut cursor, "backgrounds")?,
            hitboxes: read_section(&mut cursor, "hitboxes")?,
            action_scripts: read_section(&mut cursor, "action scripts")?,
            conversations: read_section(&mut cursor, "conversations")?,
            character_scripts: read_section(&mut cursor, "character scripts")?,
            strings: read_strings(&mut cursor)?,
            instructions,
        };

        let trailing = remaining(&cursor);
        if trailing > 0 {
            return Err(ProgramError::TrailingBytes(trailing));
        }
        Ok(program)
    }

    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), ProgramError> {
        let code = encode_instructions(&self.instructions)?;
        let code_length =
            u32::try_from(code.len()).map_err(|_| ProgramError::CodeTooLarge(code.len()))?;
        out.extend_from_slice(&code_length.to_le_bytes());
        out.extend_from_slice(&code);

        write_section(out, "rects", &self.rects)?;
        write_section(out, "points", &self.points)?;
        write_section(out, "walk links", &self.walk_links)?;
        write_section(out, "areas", &self.areas)?;
        write_section(out, "backgrounds", &self.backgrounds)?;
        write_section(out, "hitboxes", &self.hitboxes)?;
        write_section(out, "action scripts", &self.action_scripts)?;
        write_section(out, "conversations", &self.conversations)?;
        write_section(out, "character scripts", &self.character_scripts)?;
        write_strings(out, &self.strings)
    }

    pub fn first_offset(&self) -> Option<u32> {
        self.instructions.keys().next().copied()
    }

    /// Size in bytes of the code section this program encodes to.
    pub fn code_length(&self) -> usize {
        self.instructions
            .values()
            .map(|instruction| 1 + instruction.width())
            .sum()
    }

    /// One line per instruction: offset, raw opcode, and operands.
    pub fn disassemble(&self) -> String {
        let mut listing = String::new();
        for (offset, instruction) in &self.instructions {
            let _ = writeln!(
                listing,
                "{offset:06x}  {opcode:02x}  {instruction}",
                opcode = instruction.opcode()
            );
        }
        listing
    }
}

/// Walks the code section, keying each instruction by its byte offset.
pub fn decode_instructions(
    registry: &OpcodeRegistry,
    code: &[u8],
) -> Result<BTreeMap<u32, Instruction>, ProgramError> {
    let mut cursor = Cursor::new(code);
    let mut instructions = BTreeMap::new();
    let code_length = code.len() as u32;

    while remaining(&cursor) > 0 {
        let offset = cursor.position() as u32;
        let opcode = cursor
            .read_u8()
            .map_err(|_| ProgramError::TruncatedHeader)?;
        let instruction = instruction::decode(registry, opcode, &mut cursor).map_err(
            |source| match source {
                InstructionError::TruncatedInstruction {
                    mnemonic, needed, ..
                } => ProgramError::MisalignedStream {
                    offset,
                    mnemonic,
                    width: needed,
                    code_length,
                },
                other => ProgramError::Instruction {
                    offset,
                    source: other,
                },
            },
        )?;
        instructions.insert(offset, instruction);
    }

    Ok(instructions)
}

/// Inverse of [`decode_instructions`]; keys must be contiguous from zero.
pub fn encode_instructions(
    instructions: &BTreeMap<u32, Instruction>,
) -> Result<Vec<u8>, ProgramError> {
    let mut code = Vec::new();
    for (&offset, instruction) in instructions {
        let expected = code.len() as u32;
        if offset != expected {
            return Err(ProgramError::OffsetGap {
                expected,
                found: offset,
            });
        }
        instruction.encode(&mut code);
    }
    Ok(code)
}

fn read_section<R: Record>(
    cursor: &mut Cursor<&[u8]>,
    section: &'static str,
) -> Result<Vec<R>, ProgramError> {
    let count = cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| ProgramError::Section {
            section,
            needed: 2,
            available: remaining(cursor),
        })?;
    let needed = usize::from(count) * R::STRIDE;
    let available = remaining(cursor);
    if available < needed {
        return Err(ProgramError::Section {
            section,
            needed,
            available,
        });
    }

    let mut records = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let record = R::read(cursor).map_err(|_| ProgramError::Section {
            section,
            needed,
            available,
        })?;
        records.push(record);
    }
    Ok(records)
}

fn write_section<R: Record>(
    out: &mut Vec<u8>,
    section: &'static str,
    records: &[R],
) -> Result<(), ProgramError> {
    let count = u16::try_from(records.len()).map_err(|_| ProgramError::SectionTooLarge {
        section,
        count: records.len(),
    })?;
    out.extend_from_slice(&count.to_le_bytes());
    for record in records {
        record.write(out);
    }
    Ok(())
}

fn read_strings(cursor: &mut Cursor<&[u8]>) -> Result<BTreeMap<u16, String>, ProgramError> {
    let truncated = |cursor: &Cursor<&[u8]>, needed| ProgramError::Section {
        section: "strings",
        needed,
        available: remaining(cursor),
    };
    let count = cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| truncated(cursor, 2))?;

    let mut strings = BTreeMap::new();
    for _ in 0..count {
        let id = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| truncated(cursor, 4))?;
        let len = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| truncated(cursor, 2))?;
        let bytes = take(cursor, usize::from(len)).ok_or_else(|| truncated(cursor, usize::from(len)))?;
        if strings.insert(id, decode_latin1(bytes)).is_some() {
            return Err(ProgramError::DuplicateString(id));
        }
    }
    Ok(strings)
}

fn write_strings(out: &mut Vec<u8>, strings: &BTreeMap<u16, String>) -> Result<(), ProgramError> {
    let count = u16::try_from(strings.len()).map_err(|_| ProgramError::SectionTooLarge {
        section: "strings",
        count: strings.len(),
    })?;
    out.extend_from_slice(&count.to_le_bytes());
    for (&id, text) in strings {
        let bytes = encode_latin1(text).ok_or(ProgramError::UnencodableText { id })?;
        let len = u16::try_from(bytes.len()).map_err(|_| ProgramError::StringTooLong {
            id,
            len: bytes.len(),
        })?;
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&bytes);
    }
    Ok(())
}
