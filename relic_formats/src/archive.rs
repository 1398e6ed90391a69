//! RDAT container: a header, a directory of typed tables, and per-table id
//! indexes pointing at the entry payloads.
//!
//! Structural damage (header, directory, indexes, text) aborts the load.
//! A bad entry only lands in its table's failed map.

use std::error::Error as StdError;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytes::Bytes;
use log::{debug, info, warn};
use memmap2::MmapOptions;
use rayon::prelude::*;
use serde::Serialize;

use crate::database::{Database, ResourceKind, ResourceTable};
use crate::error::{ArchiveError, EncodeError, ResourceError};
use crate::image::{ImageKind, ImageResource};
use crate::opcode::OpcodeRegistry;
use crate::palette::Palette;
use crate::program::Program;
use crate::room::{BackdropSize, RoomInfo};
use crate::sequence::Sequence;
use crate::sound::Sound;
use crate::text::TextBlob;

pub const MAGIC: &[u8; 4] = b"RDAT";
pub const VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 12;
pub const DIRECTORY_ENTRY_SIZE: usize = 12;
pub const INDEX_ENTRY_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Decode the entries of each table on the rayon pool.
    pub parallel: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self { parallel: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceFailure {
    pub kind: ResourceKind,
    pub id: u16,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Sorted by kind, then id.
    pub failures: Vec<ResourceFailure>,
    pub warnings: Vec<String>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.warnings.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct LoadedArchive {
    pub database: Database,
    pub report: LoadReport,
}

#[derive(Debug, Clone, Copy)]
struct TableSpan {
    kind: ResourceKind,
    entry_count: u16,
    offset: u32,
    length: u32,
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    id: u16,
    offset: u32,
    length: u32,
}

/// Loads and saves archives against one opcode registry.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveCodec<'r> {
    registry: &'r OpcodeRegistry,
    options: DecodeOptions,
}

impl<'r> ArchiveCodec<'r> {
    pub fn new(registry: &'r OpcodeRegistry) -> Self {
        Self {
            registry,
            options: DecodeOptions::default(),
        }
    }

    pub fn with_options(registry: &'r OpcodeRegistry, options: DecodeOptions) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &'r OpcodeRegistry {
        self.registry
    }

    pub fn options(&self) -> DecodeOptions {
        self.options
    }

    pub fn load(&self, bytes: &[u8]) -> Result<LoadedArchive, ArchiveError> {
        self.load_bytes(Bytes::copy_from_slice(bytes))
    }

    /// Like [`load`](Self::load), but decoded payloads share `bytes`.
    pub fn load_bytes(&self, bytes: Bytes) -> Result<LoadedArchive, ArchiveError> {
        let table_count = parse_header(&bytes)?;
        let spans = parse_directory(&bytes, table_count)?;

        let mut database = Database::default();
        let mut report = LoadReport::default();

        for span in spans {
            let start = span.offset as usize;
            let table = bytes.slice(start..start + span.length as usize);
            let index = parse_index(&table, span)?;

            match span.kind {
                ResourceKind::Text => {
                    database.text = Some(decode_text(&table, &index, &mut report)?);
                }
                ResourceKind::BackdropSize => self.decode_table(
                    span.kind,
                    &table,
                    &index,
                    &mut database.backdrop_sizes,
                    &mut report,
                    |bytes| BackdropSize::decode(&bytes),
                ),
                ResourceKind::Program => {
                    let registry = self.registry;
                    self.decode_table(
                        span.kind,
                        &table,
                        &index,
                        &mut database.programs,
                        &mut report,
                        |bytes| Ok(Program::decode(registry, &bytes)?),
                    )
                }
                ResourceKind::Sprite => self.decode_table(
                    span.kind,
                    &table,
                    &index,
                    &mut database.sprites,
                    &mut report,
                    |bytes| ImageResource::decode(ImageKind::Sprite, bytes),
                ),
                ResourceKind::Icon => self.decode_table(
                    span.kind,
                    &table,
                    &index,
                    &mut database.icons,
                    &mut report,
                    |bytes| ImageResource::decode(ImageKind::Icon, bytes),
                ),
                ResourceKind::RoomImage => self.decode_table(
                    span.kind,
                    &table,
                    &index,
                    &mut database.room_images,
                    &mut report,
                    |bytes| ImageResource::decode(ImageKind::RoomImage, bytes),
                ),
                ResourceKind::Palette => self.decode_table(
                    span.kind,
                    &table,
                    &index,
                    &mut database.palettes,
                    &mut report,
                    |bytes| Palette::decode(&bytes),
                ),
                ResourceKind::RoomInfo => self.decode_table(
                    span.kind,
                    &table,
                    &index,
                    &mut database.room_infos,
                    &mut report,
                    |bytes| RoomInfo::decode(&bytes),
                ),
                ResourceKind::Sequence => self.decode_table(
                    span.kind,
                    &table,
                    &index,
                    &mut database.sequences,
                    &mut report,
                    |bytes| Sequence::decode(&bytes),
                ),
                ResourceKind::Sound => self.decode_table(
                    span.kind,
                    &table,
                    &index,
                    &mut database.sounds,
                    &mut report,
                    Sound::decode,
                ),
            }
        }

        report.failures.sort_by_key(|failure| (failure.kind, failure.id));
        info!(
            "loaded archive: {} tables, {} failed entries, {} warnings",
            table_count,
            report.failures.len(),
            report.warnings.len()
        );
        Ok(LoadedArchive { database, report })
    }

    fn decode_table<T, F>(
        &self,
        kind: ResourceKind,
        table: &Bytes,
        index: &[IndexEntry],
        target: &mut ResourceTable<T>,
        report: &mut LoadReport,
        decode: F,
    ) where
        T: Send,
        F: Fn(Bytes) -> Result<T, ResourceError> + Sync,
    {
        let decode_entry = |entry: &IndexEntry| (entry.id, entry_bytes(table, entry).and_then(&decode));
        let results: Vec<(u16, Result<T, ResourceError>)> = if self.options.parallel {
            index.par_iter().map(decode_entry).collect()
        } else {
            index.iter().map(decode_entry).collect()
        };

        let mut failed = 0usize;
        for (id, result) in results {
            match result {
                Ok(value) => {
                    target.insert(id, value);
                }
                Err(err) => {
                    let message = error_chain(&err);
                    warn!("{kind} {id} failed to decode: {message}");
                    target.mark_failed(id, message.clone());
                    report.failures.push(ResourceFailure { kind, id, message });
                    failed += 1;
                }
            }
        }
        debug!("decoded {} {kind} entries ({failed} failed)", index.len());
    }

    pub fn save(&self, database: &Database) -> Result<Vec<u8>, EncodeError> {
        let mut tables: Vec<(ResourceKind, u16, Vec<u8>)> = Vec::new();

        if let Some(text) = &database.text {
            let mut payload = Vec::new();
            text.encode(&mut payload).map_err(|source| EncodeError::Resource {
                kind: ResourceKind::Text,
                id: 0,
                source,
            })?;
            tables.push((ResourceKind::Text, 1, build_table(vec![(0, payload)])?));
        }

        push_table(&mut tables, ResourceKind::BackdropSize, &database.backdrop_sizes, |value, out| {
            value.encode(out);
            Ok(())
        })?;
        push_table(&mut tables, ResourceKind::Program, &database.programs, |value, out| {
            Ok(value.encode(out)?)
        })?;
        for (kind, image_kind) in [
            (ResourceKind::Sprite, ImageKind::Sprite),
            (ResourceKind::Icon, ImageKind::Icon),
            (ResourceKind::RoomImage, ImageKind::RoomImage),
        ] {
            if let Some(images) = database.image_table(kind) {
                push_table(&mut tables, kind, images, |value, out| {
                    Ok(value.encode(image_kind, out)?)
                })?;
            }
        }
        push_table(&mut tables, ResourceKind::Palette, &database.palettes, Palette::encode)?;
        push_table(&mut tables, ResourceKind::RoomInfo, &database.room_infos, |value, out| {
            value.encode(out);
            Ok(())
        })?;
        push_table(&mut tables, ResourceKind::Sequence, &database.sequences, Sequence::encode)?;
        push_table(&mut tables, ResourceKind::Sound, &database.sounds, Sound::encode)?;

        assemble(tables)
    }
}

/// A memory-mapped archive that has been loaded from disk.
#[derive(Debug)]
pub struct ArchiveFile {
    path: PathBuf,
    loaded: LoadedArchive,
}

impl ArchiveFile {
    pub fn open<P: AsRef<Path>>(codec: &ArchiveCodec<'_>, path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let file = File::open(&path_buf)
            .with_context(|| format!("opening archive at {}", path_buf.display()))?;
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .with_context(|| format!("memory-mapping archive {}", path_buf.display()))?;

        let loaded = codec
            .load_bytes(Bytes::from_owner(mmap))
            .with_context(|| format!("parsing archive {}", path_buf.display()))?;

        Ok(ArchiveFile {
            path: path_buf,
            loaded,
        })
    }

    pub fn save_to_path<P: AsRef<Path>>(
        codec: &ArchiveCodec<'_>,
        database: &Database,
        path: P,
    ) -> Result<()> {
        let path = path.as_ref();
        let bytes = codec
            .save(database)
            .with_context(|| format!("encoding archive for {}", path.display()))?;
        let mut file =
            File::create(path).with_context(|| format!("creating {}", path.display()))?;
        file.write_all(&bytes)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn database(&self) -> &Database {
        &self.loaded.database
    }

    pub fn report(&self) -> &LoadReport {
        &self.loaded.report
    }

    pub fn into_loaded(self) -> LoadedArchive {
        self.loaded
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn parse_header(bytes: &[u8]) -> Result<u16, ArchiveError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ArchiveError::TruncatedHeader { len: bytes.len() });
    }
    if &bytes[0..4] != MAGIC {
        return Err(ArchiveError::BadMagic);
    }
    let version = read_u16(bytes, 4);
    if version != VERSION {
        return Err(ArchiveError::UnsupportedVersion(version));
    }
    let table_count = read_u16(bytes, 6);
    let declared = read_u32(bytes, 8);
    if declared as usize != bytes.len() {
        return Err(ArchiveError::LengthMismatch {
            declared,
            actual: bytes.len(),
        });
    }
    Ok(table_count)
}

fn parse_directory(bytes: &[u8], table_count: u16) -> Result<Vec<TableSpan>, ArchiveError> {
    let directory_end = HEADER_SIZE + usize::from(table_count) * DIRECTORY_ENTRY_SIZE;
    if directory_end > bytes.len() {
        return Err(ArchiveError::TruncatedDirectory {
            tables: table_count,
        });
    }

    let mut seen = [false; ResourceKind::ALL.len()];
    let mut spans = Vec::with_capacity(usize::from(table_count));
    for index in 0..usize::from(table_count) {
        let base = HEADER_SIZE + index * DIRECTORY_ENTRY_SIZE;
        let raw_kind = bytes[base];
        let kind = ResourceKind::from_u8(raw_kind).ok_or(ArchiveError::UnknownTableKind {
            index,
            kind: raw_kind,
        })?;
        if std::mem::replace(&mut seen[raw_kind as usize], true) {
            return Err(ArchiveError::DuplicateTable(kind));
        }

        let span = TableSpan {
            kind,
            entry_count: read_u16(bytes, base + 2),
            offset: read_u32(bytes, base + 4),
            length: read_u32(bytes, base + 8),
        };
        let end = u64::from(span.offset) + u64::from(span.length);
        if end > bytes.len() as u64 {
            return Err(ArchiveError::TableOutOfBounds {
                kind,
                offset: span.offset,
                length: span.length,
            });
        }
        spans.push(span);
    }
    Ok(spans)
}

fn parse_index(table: &[u8], span: TableSpan) -> Result<Vec<IndexEntry>, ArchiveError> {
    let index_len = usize::from(span.entry_count) * INDEX_ENTRY_SIZE;
    if index_len > table.len() {
        return Err(ArchiveError::TruncatedIndex {
            kind: span.kind,
            entries: span.entry_count,
        });
    }

    let mut ids = std::collections::BTreeSet::new();
    let mut entries = Vec::with_capacity(usize::from(span.entry_count));
    for slot in 0..usize::from(span.entry_count) {
        let base = slot * INDEX_ENTRY_SIZE;
        let entry = IndexEntry {
            id: read_u16(table, base),
            offset: read_u32(table, base + 2),
            length: read_u32(table, base + 6),
        };
        if !ids.insert(entry.id) {
            return Err(ArchiveError::DuplicateEntry {
                kind: span.kind,
                id: entry.id,
            });
        }
        entries.push(entry);
    }
    Ok(entries)
}

fn entry_bytes(table: &Bytes, entry: &IndexEntry) -> Result<Bytes, ResourceError> {
    let start = entry.offset as usize;
    let end = u64::from(entry.offset) + u64::from(entry.length);
    if end > table.len() as u64 {
        return Err(ResourceError::EntryOutOfBounds {
            offset: entry.offset,
            length: entry.length,
            table_len: table.len(),
        });
    }
    Ok(table.slice(start..end as usize))
}

fn decode_text(
    table: &Bytes,
    index: &[IndexEntry],
    report: &mut LoadReport,
) -> Result<TextBlob, ArchiveError> {
    let [entry] = index else {
        return Err(ArchiveError::MalformedText(format!(
            "expected exactly one entry, found {}",
            index.len()
        )));
    };
    let payload = entry_bytes(table, entry).map_err(|err| ArchiveError::MalformedText(err.to_string()))?;
    let text = TextBlob::decode(&payload).map_err(|err| ArchiveError::MalformedText(err.to_string()))?;

    if let Some((declared, actual)) = text.length_mismatch() {
        let warning = format!("text declares {declared} bytes but holds {actual}");
        warn!("{warning}");
        report.warnings.push(warning);
    }
    Ok(text)
}

/// `err` and each of its sources, joined with ": ".
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

fn push_table<T, F>(
    tables: &mut Vec<(ResourceKind, u16, Vec<u8>)>,
    kind: ResourceKind,
    table: &ResourceTable<T>,
    encode: F,
) -> Result<(), EncodeError>
where
    F: Fn(&T, &mut Vec<u8>) -> Result<(), ResourceError>,
{
    if table.is_empty() {
        return Ok(());
    }
    let count = u16::try_from(table.len()).map_err(|_| EncodeError::TooManyEntries {
        kind,
        count: table.len(),
    })?;

    let mut payloads = Vec::with_capacity(table.len());
    for (&id, value) in table {
        let mut payload = Vec::new();
        encode(value, &mut payload).map_err(|source| EncodeError::Resource { kind, id, source })?;
        payloads.push((id, payload));
    }
    tables.push((kind, count, build_table(payloads)?));
    Ok(())
}

/// Index followed by payloads, with offsets relative to the table start.
fn build_table(payloads: Vec<(u16, Vec<u8>)>) -> Result<Vec<u8>, EncodeError> {
    let index_len = payloads.len() * INDEX_ENTRY_SIZE;
    let body_len: usize = payloads.iter().map(|(_, payload)| payload.len()).sum();
    let mut table = Vec::with_capacity(index_len + body_len);

    let mut offset = index_len;
    for (id, payload) in &payloads {
        let start = u32::try_from(offset).map_err(|_| EncodeError::TooLarge)?;
        let length = u32::try_from(payload.len()).map_err(|_| EncodeError::TooLarge)?;
        table.extend_from_slice(&id.to_le_bytes());
        table.extend_from_slice(&start.to_le_bytes());
        table.extend_from_slice(&length.to_le_bytes());
        offset += payload.len();
    }
    for (_, payload) in payloads {
        table.extend_from_slice(&payload);
    }
    Ok(table)
}

fn assemble(tables: Vec<(ResourceKind, u16, Vec<u8>)>) -> Result<Vec<u8>, EncodeError> {
    let directory_len = tables.len() * DIRECTORY_ENTRY_SIZE;
    let total: usize =
        HEADER_SIZE + directory_len + tables.iter().map(|(_, _, table)| table.len()).sum::<usize>();
    let total_length = u32::try_from(total).map_err(|_| EncodeError::TooLarge)?;
    // At most one table per kind, so the count always fits.
    let table_count = tables.len() as u16;

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&table_count.to_le_bytes());
    out.extend_from_slice(&total_length.to_le_bytes());

    let mut offset = HEADER_SIZE + directory_len;
    for (kind, entry_count, table) in &tables {
        out.push(*kind as u8);
        out.push(0);
        out.extend_from_slice(&entry_count.to_le_bytes());
        out.extend_from_slice(&(offset as u32).to_le_bytes());
        out.extend_from_slice(&(table.len() as u32).to_le_bytes());
        offset += table.len();
    }
    for (_, _, table) in tables {
        out.extend_from_slice(&table);
    }
    debug_assert_eq!(out.len(), total);
    Ok(out)
}
