//! In-memory model of a whole archive.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

use serde::Serialize;

use crate::image::ImageResource;
use crate::palette::Palette;
use crate::program::Program;
use crate::room::{BackdropSize, RoomInfo};
use crate::sequence::Sequence;
use crate::sound::Sound;
use crate::text::TextBlob;

/// Table kinds, numbered as they appear in the archive directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ResourceKind {
    Text = 0,
    BackdropSize = 1,
    Program = 2,
    Sprite = 3,
    Icon = 4,
    RoomImage = 5,
    Palette = 6,
    RoomInfo = 7,
    Sequence = 8,
    Sound = 9,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 10] = [
        ResourceKind::Text,
        ResourceKind::BackdropSize,
        ResourceKind::Program,
        ResourceKind::Sprite,
        ResourceKind::Icon,
        ResourceKind::RoomImage,
        ResourceKind::Palette,
        ResourceKind::RoomInfo,
        ResourceKind::Sequence,
        ResourceKind::Sound,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Text => "text",
            ResourceKind::BackdropSize => "backdrop size",
            ResourceKind::Program => "program",
            ResourceKind::Sprite => "sprite",
            ResourceKind::Icon => "icon",
            ResourceKind::RoomImage => "room image",
            ResourceKind::Palette => "palette",
            ResourceKind::RoomInfo => "room info",
            ResourceKind::Sequence => "sequence",
            ResourceKind::Sound => "sound",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded resources of one kind, plus the ids that failed to decode.
///
/// An id lives in at most one of the two maps.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceTable<T> {
    loaded: BTreeMap<u16, T>,
    failed: BTreeMap<u16, String>,
}

impl<T> Default for ResourceTable<T> {
    fn default() -> Self {
        Self {
            loaded: BTreeMap::new(),
            failed: BTreeMap::new(),
        }
    }
}

impl<T> ResourceTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u16, value: T) -> Option<T> {
        self.failed.remove(&id);
        self.loaded.insert(id, value)
    }

    pub fn mark_failed(&mut self, id: u16, message: impl Into<String>) {
        self.loaded.remove(&id);
        self.failed.insert(id, message.into());
    }

    pub fn get(&self, id: u16) -> Option<&T> {
        self.loaded.get(&id)
    }

    pub fn get_mut(&mut self, id: u16) -> Option<&mut T> {
        self.loaded.get_mut(&id)
    }

    /// Drops the id from both maps.
    pub fn remove(&mut self, id: u16) -> Option<T> {
        self.failed.remove(&id);
        self.loaded.remove(&id)
    }

    pub fn contains(&self, id: u16) -> bool {
        self.loaded.contains_key(&id)
    }

    pub fn failure(&self, id: u16) -> Option<&str> {
        self.failed.get(&id).map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, u16, T> {
        self.loaded.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.loaded.keys().copied()
    }

    pub fn failures(&self) -> btree_map::Iter<'_, u16, String> {
        self.failed.iter()
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn failed_len(&self) -> usize {
        self.failed.len()
    }

    /// Agrees with [`len`](Self::len): failed ids are not counted.
    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }

    /// No entry was ever decoded or marked failed.
    pub fn is_untouched(&self) -> bool {
        self.loaded.is_empty() && self.failed.is_empty()
    }

    pub fn clear_failures(&mut self) {
        self.failed.clear();
    }
}

impl<'a, T> IntoIterator for &'a ResourceTable<T> {
    type Item = (&'a u16, &'a T);
    type IntoIter = btree_map::Iter<'a, u16, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Database {
    pub text: Option<TextBlob>,
    pub backdrop_sizes: ResourceTable<BackdropSize>,
    pub programs: ResourceTable<Program>,
    pub sprites: ResourceTable<ImageResource>,
    pub icons: ResourceTable<ImageResource>,
    pub room_images: ResourceTable<ImageResource>,
    pub palettes: ResourceTable<Palette>,
    pub room_infos: ResourceTable<RoomInfo>,
    pub sequences: ResourceTable<Sequence>,
    pub sounds: ResourceTable<Sound>,
}

/// Per-kind counts for listings and JSON summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub kind: ResourceKind,
    pub loaded: usize,
    pub failed: usize,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loaded and failed counts for `kind`. Text counts as one entry.
    pub fn counts(&self, kind: ResourceKind) -> (usize, usize) {
        fn pair<T>(table: &ResourceTable<T>) -> (usize, usize) {
            (table.len(), table.failed_len())
        }
        match kind {
            ResourceKind::Text => (usize::from(self.text.is_some()), 0),
            ResourceKind::BackdropSize => pair(&self.backdrop_sizes),
            ResourceKind::Program => pair(&self.programs),
            ResourceKind::Sprite => pair(&self.sprites),
            ResourceKind::Icon => pair(&self.icons),
            ResourceKind::RoomImage => pair(&self.room_images),
            ResourceKind::Palette => pair(&self.palettes),
            ResourceKind::RoomInfo => pair(&self.room_infos),
            ResourceKind::Sequence => pair(&self.sequences),
            ResourceKind::Sound => pair(&self.sounds),
        }
    }

    pub fn summary(&self) -> Vec<TableSummary> {
        ResourceKind::ALL
            .iter()
            .map(|&kind| {
                let (loaded, failed) = self.counts(kind);
                TableSummary {
                    kind,
                    loaded,
                    failed,
                }
            })
            .collect()
    }

    /// Forgets every failed id, leaving only what a save would write.
    pub fn clear_failures(&mut self) {
        self.backdrop_sizes.clear_failures();
        self.programs.clear_failures();
        self.sprites.clear_failures();
        self.icons.clear_failures();
        self.room_images.clear_failures();
        self.palettes.clear_failures();
        self.room_infos.clear_failures();
        self.sequences.clear_failures();
        self.sounds.clear_failures();
    }

    pub fn image_table(&self, kind: ResourceKind) -> Option<&ResourceTable<ImageResource>> {
        match kind {
            ResourceKind::Sprite => Some(&self.sprites),
            ResourceKind::Icon => Some(&self.icons),
            ResourceKind::RoomImage => Some(&self.room_images),
            _ => None,
        }
    }
}
