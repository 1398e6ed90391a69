use serde::Serialize;

use crate::error::{InstructionError, RegistryError};
use crate::instruction::Instruction;

/// Static facts about one instruction variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InstructionDescriptor {
    pub name: &'static str,
    pub opcode: u8,
    pub width: usize,
}

/// Opcode → variant table. Built once from an explicit descriptor list and
/// passed to the codecs that need it. Every descriptor must name the variant
/// and width the instruction set decodes at that opcode.
#[derive(Debug, Clone)]
pub struct OpcodeRegistry {
    slots: Vec<Option<InstructionDescriptor>>,
}

impl OpcodeRegistry {
    pub fn new(descriptors: &[InstructionDescriptor]) -> Result<Self, RegistryError> {
        let mut slots: Vec<Option<InstructionDescriptor>> = vec![None; 256];
        for descriptor in descriptors {
            let slot = &mut slots[usize::from(descriptor.opcode)];
            if let Some(existing) = slot {
                return Err(RegistryError::DuplicateOpcode {
                    opcode: descriptor.opcode,
                    first: existing.name,
                    second: descriptor.name,
                });
            }
            check_layout(descriptor)?;
            *slot = Some(*descriptor);
        }
        Ok(Self { slots })
    }

    /// Registry over the full instruction set.
    pub fn standard() -> Result<Self, RegistryError> {
        Self::new(Instruction::DESCRIPTORS)
    }

    pub fn lookup(&self, opcode: u8) -> Result<&InstructionDescriptor, InstructionError> {
        self.slots[usize::from(opcode)]
            .as_ref()
            .ok_or(InstructionError::UnknownOpcode { opcode })
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &InstructionDescriptor> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.descriptors().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_layout(descriptor: &InstructionDescriptor) -> Result<(), RegistryError> {
    let builtin = Instruction::DESCRIPTORS
        .iter()
        .find(|known| known.opcode == descriptor.opcode);
    match builtin {
        Some(known) if known == descriptor => Ok(()),
        Some(known) => Err(RegistryError::LayoutMismatch {
            opcode: descriptor.opcode,
            name: descriptor.name,
            width: descriptor.width,
            expected: known.name,
            expected_width: known.width,
        }),
        None => Err(RegistryError::NoPayloadLayout {
            opcode: descriptor.opcode,
            name: descriptor.name,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_covers_every_variant() {
        let registry = OpcodeRegistry::standard().expect("opcodes are unique");
        assert_eq!(registry.len(), Instruction::DESCRIPTORS.len());

        let stop = registry.lookup(0x01).unwrap();
        assert_eq!(stop.name, "StopScript");
        assert_eq!(stop.width, 0);
        assert_eq!(registry.lookup(0x08).unwrap().width, 4);
        assert!(registry.lookup(0xFF).is_err());
    }

    #[test]
    fn descriptors_agree_with_instruction_values() {
        let registry = OpcodeRegistry::standard().unwrap();
        let sample = Instruction::SetCharacterScript { character: 2, offset: 40 };
        let descriptor = registry.lookup(sample.opcode()).unwrap();
        assert_eq!(descriptor.name, sample.mnemonic());
        assert_eq!(descriptor.width, sample.width());
    }

    #[test]
    fn duplicate_opcodes_are_rejected() {
        let descriptors = [
            InstructionDescriptor { name: "Noop", opcode: 0x00, width: 0 },
            InstructionDescriptor { name: "StopScript", opcode: 0x01, width: 0 },
            InstructionDescriptor { name: "Shadow", opcode: 0x00, width: 2 },
        ];
        let err = OpcodeRegistry::new(&descriptors).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateOpcode { opcode: 0x00, first: "Noop", second: "Shadow" }
        );
        assert!(err.to_string().contains("Noop"));
        assert!(err.to_string().contains("Shadow"));
    }

    #[test]
    fn unique_subset_is_accepted() {
        let descriptors = [
            InstructionDescriptor { name: "PushByte", opcode: 0x06, width: 1 },
            InstructionDescriptor { name: "Div", opcode: 0x10, width: 0 },
        ];
        let registry = OpcodeRegistry::new(&descriptors).unwrap();
        let names: Vec<_> = registry.descriptors().map(|d| d.name).collect();
        assert_eq!(names, vec!["PushByte", "Div"]);
        assert!(registry.lookup(0x07).is_err());
    }

    #[test]
    fn descriptors_must_match_the_decoded_layout() {
        let wide = [InstructionDescriptor { name: "PushByte", opcode: 0x06, width: 2 }];
        assert_eq!(
            OpcodeRegistry::new(&wide).unwrap_err(),
            RegistryError::LayoutMismatch {
                opcode: 0x06,
                name: "PushByte",
                width: 2,
                expected: "PushByte",
                expected_width: 1,
            }
        );

        let renamed = [InstructionDescriptor { name: "Halt", opcode: 0x01, width: 0 }];
        assert!(matches!(
            OpcodeRegistry::new(&renamed),
            Err(RegistryError::LayoutMismatch { expected: "StopScript", .. })
        ));

        let unbacked = [InstructionDescriptor { name: "Extra", opcode: 0xF0, width: 0 }];
        assert_eq!(
            OpcodeRegistry::new(&unbacked).unwrap_err(),
            RegistryError::NoPayloadLayout { opcode: 0xF0, name: "Extra" }
        );
    }
}
