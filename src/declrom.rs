use derivative::Derivative;
use serde::{Deserialize, Serialize};

use crate::error::NubusError;

/// Largest declaration ROM a slot can map: the top megabyte of slot space.
pub const DECLROM_MAX_SIZE: usize = 0x10_0000;

/// Card identity firmware, mapped read-only at the top of the slot space.
/// The contents are never interpreted here.
#[derive(Derivative, Serialize, Deserialize, Clone)]
#[derivative(Debug, PartialEq)]
pub struct DeclarationRom {
    pub name: String,
    #[derivative(Debug = "ignore")]
    data: Vec<u8>,
}

impl DeclarationRom {
    pub fn new(name: impl Into<String>, data: &[u8]) -> Result<Self, NubusError> {
        let name = name.into();
        if data.is_empty() {
            return Err(NubusError::InvalidRom(format!("{} is empty", name)));
        }
        if data.len() > DECLROM_MAX_SIZE {
            return Err(NubusError::InvalidRom(format!(
                "{} is {:#x} bytes, larger than {:#x}",
                name,
                data.len(),
                DECLROM_MAX_SIZE
            )));
        }

        Ok(Self {
            name,
            data: data.to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Window that ends on the last byte of the megabyte starting at `mb_base`.
    pub fn window_in(&self, mb_base: u32) -> (u32, u32) {
        let end = mb_base + (DECLROM_MAX_SIZE as u32 - 1);
        (end - (self.data.len() as u32 - 1), end)
    }

    pub fn read(&self, offset: u32) -> u8 {
        self.data.get(offset as usize).copied().unwrap_or(0xFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rom_sits_at_top_of_megabyte() {
        let rom = DeclarationRom::new("aenet1", &[0xA5; 0x4000]).unwrap();
        assert_eq!(rom.window_in(0xF9F0_0000), (0xF9FF_C000, 0xF9FF_FFFF));
        assert_eq!(rom.read(0x3FFF), 0xA5);
        assert_eq!(rom.read(0x4000), 0xFF);
    }

    #[test]
    fn test_rejects_bad_images() {
        assert!(matches!(
            DeclarationRom::new("empty", &[]),
            Err(NubusError::InvalidRom(_))
        ));
        assert!(DeclarationRom::new("huge", &vec![0; DECLROM_MAX_SIZE + 1]).is_err());
        assert!(DeclarationRom::new("full", &vec![0; DECLROM_MAX_SIZE]).is_ok());
    }
}
