pub mod archive;
pub mod database;
pub mod error;
pub mod image;
pub mod instruction;
pub mod lazy;
pub mod opcode;
pub mod palette;
pub mod program;
mod reader;
pub mod room;
pub mod sequence;
pub mod sound;
pub mod text;

pub use archive::{
    ArchiveCodec, ArchiveFile, DecodeOptions, LoadReport, LoadedArchive, ResourceFailure,
};
pub use database::{Database, ResourceKind, ResourceTable, TableSummary};
pub use error::{
    ArchiveError, EncodeError, ImageError, InstructionError, ProgramError, RegistryError,
    ResourceError,
};
pub use image::{Compression, ImageKind, ImageResource, PixelCodec, PixelGrid, SpriteFrame};
pub use instruction::Instruction;
pub use lazy::LazyResource;
pub use opcode::{InstructionDescriptor, OpcodeRegistry};
pub use palette::{Palette, Rgb};
pub use program::Program;
pub use room::{BackdropSize, RoomInfo};
pub use sequence::{Sequence, SequenceFrame};
pub use sound::Sound;
pub use text::TextBlob;
