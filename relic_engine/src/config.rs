use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use relic_formats::DecodeOptions;
use serde::{Deserialize, Serialize};

use crate::interpreter::InterpreterConfig;

pub const DEFAULT_STACK_CAPACITY: usize = 32;
pub const DEFAULT_MAX_STEPS: usize = 10_000;

/// Palette indices with engine-defined meaning. Archives do not store these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaletteConventions {
    pub transparent_index: u8,
    pub ui_marker_indices: Vec<u8>,
}

impl Default for PaletteConventions {
    fn default() -> Self {
        Self {
            transparent_index: 0,
            ui_marker_indices: vec![254, 255],
        }
    }
}

impl PaletteConventions {
    pub fn is_transparent(&self, index: u8) -> bool {
        index == self.transparent_index
    }

    pub fn is_reserved(&self, index: u8) -> bool {
        self.is_transparent(index) || self.ui_marker_indices.contains(&index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub stack_capacity: usize,
    pub max_steps: usize,
    pub parallel_decode: bool,
    pub palette: PaletteConventions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stack_capacity: DEFAULT_STACK_CAPACITY,
            max_steps: DEFAULT_MAX_STEPS,
            parallel_decode: true,
            palette: PaletteConventions::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults, overlaid with the JSON file when one is given and exists.
    pub fn from_json_file(path: Option<&Path>) -> Result<Self> {
        let mut config = EngineConfig::default();
        if let Some(p) = path {
            if p.exists() {
                let raw = fs::read_to_string(p)
                    .with_context(|| format!("failed to read engine config: {}", p.display()))?;
                config = serde_json::from_str(&raw)
                    .with_context(|| format!("failed to parse engine config: {}", p.display()))?;
            }
        }
        Ok(config)
    }

    /// `RELIC_PARALLEL_DECODE=0|false|off|no` forces single-threaded decode.
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var("RELIC_PARALLEL_DECODE") {
            self.parallel_decode = parse_toggle(&value).unwrap_or(self.parallel_decode);
        }
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            parallel: self.parallel_decode,
        }
    }

    pub fn interpreter(&self) -> InterpreterConfig {
        InterpreterConfig {
            stack_capacity: self.stack_capacity,
        }
    }
}

fn parse_toggle(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
