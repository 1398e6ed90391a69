use thiserror::Error;

use crate::database::ResourceKind;

/// Directory-level failures. Any of these aborts the whole load.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive is too small to contain a header ({len} bytes)")]
    TruncatedHeader { len: usize },
    #[error("archive missing RDAT signature")]
    BadMagic,
    #[error("unsupported archive version {0}")]
    UnsupportedVersion(u16),
    #[error("archive header declares {declared} bytes but {actual} were supplied")]
    LengthMismatch { declared: u32, actual: usize },
    #[error("directory of {tables} tables extends beyond the archive")]
    TruncatedDirectory { tables: u16 },
    #[error("directory entry {index} names unknown table kind {kind}")]
    UnknownTableKind { index: usize, kind: u8 },
    #[error("{0} table appears more than once in the directory")]
    DuplicateTable(ResourceKind),
    #[error("{kind} table at {offset}+{length} lies outside the archive")]
    TableOutOfBounds {
        kind: ResourceKind,
        offset: u32,
        length: u32,
    },
    #[error("{kind} table index of {entries} entries overruns the table")]
    TruncatedIndex { kind: ResourceKind, entries: u16 },
    #[error("{kind} table lists id {id} more than once")]
    DuplicateEntry { kind: ResourceKind, id: u16 },
    #[error("text table is malformed: {0}")]
    MalformedText(String),
}

/// Failures while serializing a database back into archive bytes.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("{kind} {id} cannot be encoded")]
    Resource {
        kind: ResourceKind,
        id: u16,
        #[source]
        source: ResourceError,
    },
    #[error("{kind} table holds {count} entries, more than a table index can address")]
    TooManyEntries { kind: ResourceKind, count: usize },
    #[error("archive would exceed the 4 GiB offset range")]
    TooLarge,
}

/// Per-resource decode/encode failures. These never escape their resource.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("entry at {offset}+{length} lies outside its {table_len}-byte table")]
    EntryOutOfBounds {
        offset: u32,
        length: u32,
        table_len: usize,
    },
    #[error("expected {expected} bytes, found {actual}")]
    Length { expected: usize, actual: usize },
    #[error("payload truncated while reading {0}")]
    Truncated(&'static str),
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Program(#[from] ProgramError),
}

/// Image sub-header and pixel decode failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("image sub-header truncated")]
    TruncatedHeader,
    #[error("image reports zero width or height")]
    ZeroSize,
    #[error("unknown image compression {0}")]
    UnknownCompression(u8),
    #[error("sprite frame {frame_width}x{frame_height} does not fit inside {width}x{height} sheet")]
    SpriteFrameOutOfBounds {
        width: u16,
        height: u16,
        frame_width: u16,
        frame_height: u16,
    },
    #[error("sprite sheet has no frame rectangle")]
    MissingSpriteFrame,
    #[error("only sprites carry a frame rectangle")]
    UnexpectedSpriteFrame,
    #[error("raw pixel payload holds {actual} bytes, expected {expected}")]
    PayloadLength { expected: usize, actual: usize },
    #[error("compressed stream exhausted after {produced} of {expected} pixels")]
    StreamExhausted { produced: usize, expected: usize },
    #[error("compressed stream ended after {produced} of {expected} pixels")]
    ShortOutput { produced: usize, expected: usize },
}

/// Failures decoding or encoding a single instruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstructionError {
    #[error("unknown opcode {opcode:#04x}")]
    UnknownOpcode { opcode: u8 },
    #[error("{mnemonic} needs {needed} payload bytes but only {available} remain")]
    TruncatedInstruction {
        mnemonic: &'static str,
        needed: usize,
        available: usize,
    },
}

/// A duplicate or mismatched registration makes the whole registry unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("opcode {opcode:#04x} is claimed by both {first} and {second}")]
    DuplicateOpcode {
        opcode: u8,
        first: &'static str,
        second: &'static str,
    },
    #[error("{name} at opcode {opcode:#04x} (width {width}) does not match the {expected} payload layout (width {expected_width})")]
    LayoutMismatch {
        opcode: u8,
        name: &'static str,
        width: usize,
        expected: &'static str,
        expected_width: usize,
    },
    #[error("{name} at opcode {opcode:#04x} has no payload layout")]
    NoPayloadLayout { opcode: u8, name: &'static str },
}

/// Anything wrong inside one program. Escalated to "the program failed".
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("program header truncated")]
    TruncatedHeader,
    #[error("code section declares {declared} bytes but only {available} remain")]
    CodeOverrun { declared: u32, available: usize },
    #[error("instruction at offset {offset} failed to decode")]
    Instruction {
        offset: u32,
        #[source]
        source: InstructionError,
    },
    #[error(
        "{mnemonic} at offset {offset} needs {width} payload bytes, crossing the {code_length}-byte code section"
    )]
    MisalignedStream {
        offset: u32,
        mnemonic: &'static str,
        width: usize,
        code_length: u32,
    },
    #[error("{section} section truncated: needs {needed} bytes, {available} remain")]
    Section {
        section: &'static str,
        needed: usize,
        available: usize,
    },
    #[error("{0} trailing bytes after the strings section")]
    TrailingBytes(usize),
    #[error("string {0} appears more than once")]
    DuplicateString(u16),
    #[error("instruction expected at offset {expected} but next key is {found}")]
    OffsetGap { expected: u32, found: u32 },
    #[error("{section} section holds {count} records, more than its u16 count can hold")]
    SectionTooLarge { section: &'static str, count: usize },
    #[error("string {id} contains characters outside the single-byte range")]
    UnencodableText { id: u16 },
    #[error("string {id} is {len} bytes, longer than a u16 length prefix")]
    StringTooLong { id: u16, len: usize },
    #[error("code section of {0} bytes exceeds the u32 length prefix")]
    CodeTooLarge(usize),
}
