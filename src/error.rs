use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => write!(f, "read"),
            Access::Write => write!(f, "write"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NubusError {
    /// A card saw a byte-lane pattern its bus logic does not decode. Fatal.
    #[error(
        "{card}: {access}{} @ {offset:x} with unhandled mask {mask:08x} {context}",
        data_field(.data)
    )]
    UnhandledMask {
        card: String,
        access: Access,
        offset: u32,
        /// What was written; reads carry no data.
        data: Option<u32>,
        mask: u32,
        context: String,
    },

    #[error("bus error: no device at {addr:#010x}")]
    Unmapped { addr: u32 },

    #[error("emulation halted: {reason}")]
    Halted { reason: String },

    #[error("invalid NuBus slot {slot:#x}, expected 0x9..=0xE")]
    InvalidSlot { slot: u8 },

    #[error("slot {slot:#x} already holds {card}")]
    SlotOccupied { slot: u8, card: String },

    #[error("window {start:#010x}-{end:#010x} overlaps {other}")]
    WindowOverlap { start: u32, end: u32, other: String },

    #[error("invalid declaration ROM: {0}")]
    InvalidRom(String),
}

fn data_field(data: &Option<u32>) -> String {
    data.map(|data| format!(" {:08x}", data)).unwrap_or_default()
}

impl NubusError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, NubusError::UnhandledMask { .. })
    }
}
