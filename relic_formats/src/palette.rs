use serde::Serialize;

use crate::error::ResourceError;

pub const MAX_COLORS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Index-addressed colour table. Which indices are reserved for transparency
/// or UI markers is decided by the consumer, not stored here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Palette {
    pub colors: Vec<Rgb>,
}

impl Palette {
    pub fn decode(bytes: &[u8]) -> Result<Self, ResourceError> {
        if bytes.len() % 3 != 0 {
            return Err(ResourceError::Invalid(format!(
                "palette length {} is not a multiple of 3",
                bytes.len()
            )));
        }
        let count = bytes.len() / 3;
        if count > MAX_COLORS {
            return Err(ResourceError::Invalid(format!(
                "palette holds {count} colours, more than {MAX_COLORS}"
            )));
        }

        let colors = bytes
            .chunks_exact(3)
            .map(|chunk| Rgb {
                r: chunk[0],
                g: chunk[1],
                b: chunk[2],
            })
            .collect();
        Ok(Palette { colors })
    }

    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), ResourceError> {
        if self.colors.len() > MAX_COLORS {
            return Err(ResourceError::Invalid(format!(
                "palette holds {} colours, more than {MAX_COLORS}",
                self.colors.len()
            )));
        }
        for color in &self.colors {
            out.extend_from_slice(&[color.r, color.g, color.b]);
        }
        Ok(())
    }

    pub fn get(&self, index: u8) -> Option<Rgb> {
        self.colors.get(usize::from(index)).copied()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}
