#![allow(dead_code)]

//! Byte-level builders for synthetic archives.

use relic_formats::{Instruction, Program};

pub const TEXT: u8 = 0;
pub const PROGRAM: u8 = 2;
pub const SPRITE: u8 = 3;
pub const ICON: u8 = 4;
pub const PALETTE: u8 = 6;
pub const ROOM_INFO: u8 = 7;
pub const SEQUENCE: u8 = 8;
pub const SOUND: u8 = 9;

pub type Table = (u8, Vec<(u16, Vec<u8>)>);

/// Canonical layout: directory in the given order, each table's index
/// followed by its payloads in entry order.
pub fn build_archive(tables: &[Table]) -> Vec<u8> {
    let directory_end = 12 + tables.len() * 12;

    let bodies: Vec<Vec<u8>> = tables
        .iter()
        .map(|(_, entries)| {
            let mut body = Vec::new();
            let mut offset = entries.len() * 10;
            for (id, payload) in entries {
                body.extend_from_slice(&id.to_le_bytes());
                body.extend_from_slice(&(offset as u32).to_le_bytes());
                body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
                offset += payload.len();
            }
            for (_, payload) in entries {
                body.extend_from_slice(payload);
            }
            body
        })
        .collect();

    let total = directory_end + bodies.iter().map(Vec::len).sum::<usize>();
    let mut out = b"RDAT".to_vec();
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&(tables.len() as u16).to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());

    let mut offset = directory_end;
    for ((kind, entries), body) in tables.iter().zip(&bodies) {
        out.push(*kind);
        out.push(0);
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&(offset as u32).to_le_bytes());
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        offset += body.len();
    }
    for body in bodies {
        out.extend_from_slice(&body);
    }
    out
}

pub fn text(body: &str) -> Vec<u8> {
    let mut out = (body.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(body.as_bytes());
    out
}

pub fn raw_sprite(width: u16, height: u16, frame: (u16, u16), fill: u8) -> Vec<u8> {
    let mut out = Vec::new();
    for value in [width, height, frame.0, frame.1] {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.push(0);
    out.extend(std::iter::repeat(fill).take(usize::from(width) * usize::from(height)));
    out
}

pub fn lz_icon(width: u16, height: u16, stream: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.push(1);
    out.extend_from_slice(stream);
    out
}

pub fn palette(colors: &[[u8; 3]]) -> Vec<u8> {
    colors.iter().flatten().copied().collect()
}

pub fn sequence(frames: &[(u16, u16, i16, i16)]) -> Vec<u8> {
    let mut out = (frames.len() as u16).to_le_bytes().to_vec();
    for &(sprite, delay, dx, dy) in frames {
        out.extend_from_slice(&sprite.to_le_bytes());
        out.extend_from_slice(&delay.to_le_bytes());
        out.extend_from_slice(&dx.to_le_bytes());
        out.extend_from_slice(&dy.to_le_bytes());
    }
    out
}

pub fn sound(sample_rate: u32, samples: &[u8]) -> Vec<u8> {
    let mut out = sample_rate.to_le_bytes().to_vec();
    out.push(8);
    out.push(1);
    out.extend_from_slice(&(samples.len() as u32).to_le_bytes());
    out.extend_from_slice(samples);
    out
}

pub fn room_info(backdrop: u16, palette: u16, program: u16) -> Vec<u8> {
    let mut out = Vec::new();
    for value in [backdrop, palette, program, 0, 0] {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Program bytes: the given code section, empty auxiliary sections, no strings.
pub fn program_with_code(code: &[u8]) -> Vec<u8> {
    let mut out = (code.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(code);
    out.extend(std::iter::repeat(0u8).take(2 * 10));
    out
}

pub fn noop_then_stop() -> Program {
    let mut program = Program::default();
    program.instructions.insert(0, Instruction::Noop);
    program.instructions.insert(1, Instruction::StopScript);
    program
}
