//! Script bytecode: one variant per opcode, each with a fixed payload width.
//!
//! Payload fields are little-endian and are read and written in declaration
//! order, so `decode(encode(i)) == i` holds for every variant.

use std::fmt;
use std::io::{self, Cursor};

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::error::InstructionError;
use crate::opcode::{InstructionDescriptor, OpcodeRegistry};
use crate::reader::remaining;

/// A fixed-width payload field.
pub trait Operand: Sized + Copy {
    const WIDTH: usize;

    fn read(cursor: &mut Cursor<&[u8]>) -> io::Result<Self>;
    fn write(self, out: &mut Vec<u8>);
}

impl Operand for u8 {
    const WIDTH: usize = 1;

    fn read(cursor: &mut Cursor<&[u8]>) -> io::Result<Self> {
        cursor.read_u8()
    }

    fn write(self, out: &mut Vec<u8>) {
        out.push(self);
    }
}

macro_rules! le_operand {
    ($($ty:ty => $read:ident),* $(,)?) => {
        $(
            impl Operand for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                fn read(cursor: &mut Cursor<&[u8]>) -> io::Result<Self> {
                    cursor.$read::<LittleEndian>()
                }

                fn write(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

le_operand!(u16 => read_u16, i16 => read_i16, u32 => read_u32, i32 => read_i32);

macro_rules! instruction_set {
    (
        $(
            $(#[$meta:meta])*
            $opcode:literal => $name:ident $({ $($field:ident : $ty:ty),* $(,)? })?
        ),* $(,)?
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        #[serde(tag = "op")]
        pub enum Instruction {
            $(
                $(#[$meta])*
                $name $({ $($field: $ty),* })?,
            )*
        }

        impl Instruction {
            /// Every variant exactly once, in opcode order.
            pub const DESCRIPTORS: &'static [InstructionDescriptor] = &[
                $(
                    InstructionDescriptor {
                        name: stringify!($name),
                        opcode: $opcode,
                        width: 0 $($(+ <$ty as Operand>::WIDTH)*)?,
                    },
                )*
            ];

            pub fn opcode(&self) -> u8 {
                match self {
                    $( Instruction::$name { .. } => $opcode, )*
                }
            }

            pub fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name { .. } => stringify!($name), )*
                }
            }

            pub fn width(&self) -> usize {
                match self {
                    $( Instruction::$name { .. } => 0 $($(+ <$ty as Operand>::WIDTH)*)?, )*
                }
            }

            fn read_payload(
                descriptor: &InstructionDescriptor,
                cursor: &mut Cursor<&[u8]>,
            ) -> io::Result<Instruction> {
                match descriptor.opcode {
                    $(
                        $opcode => Ok(Instruction::$name $({
                            $($field: <$ty as Operand>::read(cursor)?),*
                        })?),
                    )*
                    other => Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("opcode {other:#04x} has no payload layout"),
                    )),
                }
            }

            /// Opcode byte followed by the payload fields.
            pub fn encode(&self, out: &mut Vec<u8>) {
                out.push(self.opcode());
                match *self {
                    $(
                        Instruction::$name $({ $($field),* })? => {
                            $($( Operand::write($field, out); )*)?
                        }
                    )*
                }
            }
        }

        impl fmt::Display for Instruction {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match *self {
                    $(
                        Instruction::$name $({ $($field),* })? => {
                            f.write_str(stringify!($name))?;
                            $($( write!(f, " {}={}", stringify!($field), $field)?; )*)?
                            Ok(())
                        }
                    )*
                }
            }
        }
    };
}

instruction_set! {
    0x00 => Noop,
    /// Ends the script, or returns to a pending jump target.
    0x01 => StopScript,
    0x02 => Jump { target: u16 },
    0x03 => JumpIfZero { target: u16 },
    0x04 => JumpIfNotZero { target: u16 },
    0x05 => Call { target: u16 },
    0x06 => PushByte { value: u8 },
    0x07 => PushWord { value: i16 },
    0x08 => PushLong { value: i32 },
    0x09 => PushVar { var: u16 },
    0x0A => PopVar { var: u16 },
    0x0B => Dup,
    0x0C => Discard,
    0x0D => Add,
    0x0E => Sub,
    0x0F => Mul,
    0x10 => Div,
    0x11 => Mod,
    0x12 => Neg,
    0x13 => And,
    0x14 => Or,
    0x15 => Not,
    0x16 => Equal,
    0x17 => NotEqual,
    0x18 => Less,
    0x19 => Greater,
    0x1A => LessEqual,
    0x1B => GreaterEqual,
    0x20 => PushFlag { flag: u16 },
    0x21 => SetFlag { flag: u16 },
    0x22 => ClearFlag { flag: u16 },
    /// Character speaks a message from the program's string table.
    0x30 => Say { character: u8, message: u16 },
    0x31 => WalkTo { point: u16 },
    0x32 => PlaySequence { area: u8, sequence: u16 },
    0x33 => PlaySound { sound: u16 },
    0x34 => ChangeRoom { room: u16, entry: u8 },
    0x35 => GiveItem { item: u16 },
    0x36 => TakeItem { item: u16 },
    0x37 => HasItem { item: u16 },
    0x38 => StartConversation { conversation: u16 },
    0x39 => AddChoice { choice: u8, message: u16 },
    0x3A => EnableHitbox { hitbox: u16 },
    0x3B => DisableHitbox { hitbox: u16 },
    0x3C => Wait { ticks: u16 },
    0x3D => SetCharacterScript { character: u8, offset: u16 },
    0x3E => Random { max: u16 },
    0x3F => FadePalette { palette: u16, steps: u8 },
    0x40 => SetBackground { background: u8 },
}

impl Instruction {
    /// Literal value for the fetch instructions, widened to a stack slot.
    pub fn literal(&self) -> Option<i32> {
        match *self {
            Instruction::PushByte { value } => Some(i32::from(value)),
            Instruction::PushWord { value } => Some(i32::from(value)),
            Instruction::PushLong { value } => Some(value),
            _ => None,
        }
    }
}

/// Decodes the payload for `opcode`, consuming exactly its declared width.
pub fn decode(
    registry: &OpcodeRegistry,
    opcode: u8,
    cursor: &mut Cursor<&[u8]>,
) -> Result<Instruction, InstructionError> {
    let descriptor = registry.lookup(opcode)?;
    let available = remaining(cursor);
    if available < descriptor.width {
        return Err(InstructionError::TruncatedInstruction {
            mnemonic: descriptor.name,
            needed: descriptor.width,
            available,
        });
    }
    Instruction::read_payload(descriptor, cursor).map_err(|_| InstructionError::TruncatedInstruction {
        mnemonic: descriptor.name,
        needed: descriptor.width,
        available,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(registry: &OpcodeRegistry, instruction: Instruction) -> Instruction {
        let mut bytes = Vec::new();
        instruction.encode(&mut bytes);
        assert_eq!(bytes.len(), 1 + instruction.width());
        let mut cursor = Cursor::new(&bytes[1..]);
        let decoded = decode(registry, bytes[0], &mut cursor).expect("decodes");
        assert_eq!(cursor.position() as usize, instruction.width());
        decoded
    }

    #[test]
    fn payload_widths_follow_field_types() {
        assert_eq!(Instruction::Noop.width(), 0);
        assert_eq!(Instruction::PushByte { value: 1 }.width(), 1);
        assert_eq!(Instruction::PushLong { value: 1 }.width(), 4);
        assert_eq!(Instruction::Say { character: 1, message: 2 }.width(), 3);
        for descriptor in Instruction::DESCRIPTORS {
            assert!(descriptor.width <= 4, "{} is unexpectedly wide", descriptor.name);
        }
    }

    #[test]
    fn encode_then_decode_is_identity() {
        let registry = OpcodeRegistry::standard().unwrap();
        let samples = [
            Instruction::Jump { target: 0xBEEF },
            Instruction::PushByte { value: 0xFF },
            Instruction::PushWord { value: -2 },
            Instruction::PushLong { value: i32::MIN },
            Instruction::Say { character: 3, message: 513 },
            Instruction::FadePalette { palette: 7, steps: 16 },
        ];
        for instruction in samples {
            assert_eq!(round_trip(&registry, instruction), instruction);
        }
    }

    #[test]
    fn every_registered_variant_round_trips() {
        let registry = OpcodeRegistry::standard().unwrap();
        for (index, descriptor) in Instruction::DESCRIPTORS.iter().enumerate() {
            let mut bytes = vec![descriptor.opcode];
            bytes.extend((0..descriptor.width).map(|i| 0x80 | (index + i) as u8));

            let mut cursor = Cursor::new(&bytes[1..]);
            let instruction = decode(&registry, descriptor.opcode, &mut cursor).unwrap();
            assert_eq!(instruction.mnemonic(), descriptor.name);
            assert_eq!(instruction.opcode(), descriptor.opcode);

            let mut encoded = Vec::new();
            instruction.encode(&mut encoded);
            assert_eq!(encoded, bytes, "{} re-encodes differently", descriptor.name);
            assert_eq!(round_trip(&registry, instruction), instruction);
        }
    }

    #[test]
    fn field_order_is_wire_order() {
        let mut bytes = Vec::new();
        Instruction::ChangeRoom { room: 0x0102, entry: 9 }.encode(&mut bytes);
        assert_eq!(bytes, vec![0x34, 0x02, 0x01, 9]);
    }

    #[test]
    fn short_payload_is_truncated_instruction() {
        let registry = OpcodeRegistry::standard().unwrap();
        let mut cursor = Cursor::new(&[0x01u8][..]);
        let err = decode(&registry, 0x08, &mut cursor).unwrap_err();
        assert_eq!(
            err,
            InstructionError::TruncatedInstruction {
                mnemonic: "PushLong",
                needed: 4,
                available: 1
            }
        );
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let registry = OpcodeRegistry::standard().unwrap();
        let mut cursor = Cursor::new(&[][..]);
        assert_eq!(
            decode(&registry, 0xEE, &mut cursor).unwrap_err(),
            InstructionError::UnknownOpcode { opcode: 0xEE }
        );
    }

    #[test]
    fn display_lists_fields() {
        let text = Instruction::PlaySequence { area: 1, sequence: 40 }.to_string();
        assert_eq!(text, "PlaySequence area=1 sequence=40");
        assert_eq!(Instruction::Dup.to_string(), "Dup");
    }

    #[test]
    fn literals_widen_without_sign_surprises() {
        assert_eq!(Instruction::PushByte { value: 200 }.literal(), Some(200));
        assert_eq!(Instruction::PushWord { value: -5 }.literal(), Some(-5));
        assert_eq!(Instruction::Add.literal(), None);
    }
}
