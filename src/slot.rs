use std::{
    any::Any,
    cell::Cell,
    fmt::{self, Debug},
    rc::Rc,
};

use serde::{Deserialize, Serialize};

use crate::{error::NubusError, nubus::SlotContext};

/// Lowest and highest slot numbers a card can sit in.
pub const SLOT_MIN: u8 = 0x9;
pub const SLOT_MAX: u8 = 0xE;

/// Base of the 16MB "super slot" space of `slot`: `0xFs000000`.
pub fn slotspace(slot: u8) -> u32 {
    0xF000_0000 | ((slot as u32) << 24)
}

/// Offset of the 24-bit mode alias of a slot's windows. The 24-bit address
/// `0xsXXXXX` lands at `0xFssXXXXX` once translated.
pub fn mirror_offset(slot: u8) -> u32 {
    (slot as u32) << 20
}

pub fn check_slot(slot: u8) -> Result<(), NubusError> {
    if (SLOT_MIN..=SLOT_MAX).contains(&slot) {
        Ok(())
    } else {
        Err(NubusError::InvalidSlot { slot })
    }
}

/// Width of the handlers a card installs for a window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Width {
    /// 8-bit handlers, offset is a byte offset into the window.
    Byte,
    /// 32-bit handlers with a byte-lane mask, offset is a longword index.
    Long,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Region {
    /// A card-defined region, dispatched back to the card with `id`.
    Card { id: u8, width: Width },
    /// Declaration ROM, served by the bus itself.
    DeclRom,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Card { id, width } => write!(f, "region {} ({:?})", id, width),
            Region::DeclRom => write!(f, "declaration ROM"),
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Window {
    pub start: u32,
    pub end: u32,
    pub slot: u8,
    pub region: Region,
}

impl Window {
    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.start && addr <= self.end
    }

    pub fn overlaps(&self, start: u32, end: u32) -> bool {
        start <= self.end && end >= self.start
    }

    pub fn size(&self) -> u32 {
        self.end - self.start + 1
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:08X} - 0x{:08X} - {} - (slot {:X})",
            self.start, self.end, self.region, self.slot
        )
    }
}

/// Handle on one slot's interrupt line. Clones share the same line.
#[derive(Clone)]
pub struct SlotIrq {
    slot: u8,
    lines: Rc<Cell<u16>>,
}

impl SlotIrq {
    pub(crate) fn new(slot: u8, lines: Rc<Cell<u16>>) -> Self {
        Self { slot, lines }
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn raise(&self) {
        self.lines.set(self.lines.get() | (1 << self.slot));
    }

    pub fn lower(&self) {
        self.lines.set(self.lines.get() & !(1 << self.slot));
    }

    pub fn is_raised(&self) -> bool {
        self.lines.get() & (1 << self.slot) != 0
    }
}

impl Debug for SlotIrq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotIrq")
            .field("slot", &self.slot)
            .field("raised", &self.is_raised())
            .finish()
    }
}

/// A card plugged into a NuBus slot.
///
/// `start` is called once when the machine comes up and is where the card
/// claims its address windows. Accesses to those windows come back through
/// the `read*`/`write*` methods with the region id the card chose.
pub trait NubusCard: Debug {
    /// Short device name, used in diagnostics.
    fn name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn start(&mut self, ctx: &mut SlotContext<'_>) -> Result<(), NubusError>;

    fn reset(&mut self);

    fn read8(&mut self, region: u8, offset: u32) -> u8;

    fn write8(&mut self, region: u8, offset: u32, data: u8);

    fn read32(
        &mut self,
        region: u8,
        offset: u32,
        mask: u32,
        context: &str,
    ) -> Result<u32, NubusError>;

    fn write32(
        &mut self,
        region: u8,
        offset: u32,
        data: u32,
        mask: u32,
        context: &str,
    ) -> Result<(), NubusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_addressing() {
        assert_eq!(slotspace(0x9), 0xF900_0000);
        assert_eq!(slotspace(0xE), 0xFE00_0000);
        assert_eq!(mirror_offset(0x9), 0x0090_0000);
        assert_eq!(mirror_offset(0xC), 0x00C0_0000);

        assert!(check_slot(0x8).is_err());
        assert!(check_slot(0x9).is_ok());
        assert!(check_slot(0xE).is_ok());
        assert!(check_slot(0xF).is_err());
    }

    #[test]
    fn test_window_overlap() {
        let window = Window {
            start: 0xF90D_0000,
            end: 0xF90D_FFFF,
            slot: 9,
            region: Region::Card {
                id: 0,
                width: Width::Byte,
            },
        };

        assert_eq!(window.size(), 0x10000);
        assert!(window.contains(0xF90D_8000));
        assert!(!window.contains(0xF90E_0000));
        assert!(window.overlaps(0xF90D_FFFF, 0xF90E_003F));
        assert!(!window.overlaps(0xF90E_0000, 0xF90E_003F));
    }

    #[test]
    fn test_slot_irq_shared_line() {
        let lines = Rc::new(Cell::new(0));
        let irq = SlotIrq::new(0xA, lines.clone());
        let other = irq.clone();

        irq.raise();
        assert!(other.is_raised());
        assert_eq!(lines.get(), 1 << 0xA);

        other.lower();
        assert!(!irq.is_raised());
        assert_eq!(lines.get(), 0);
    }
}
