#![allow(dead_code)]

use nubus_enet::{
    dp8390::{Dp8390, Dp8390Host},
    CardVariant, Nubus, NubusBuilder,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipCall {
    CsRead(u8),
    CsWrite(u8, u8),
    RemoteRead,
    RemoteWrite(u16),
    SetMac([u8; 6]),
    Reset,
}

/// Stand-in controller. Registers are plain storage except:
/// - 0x08/0x09 set the remote DMA address (low/high)
/// - 0x0F drives INT: nonzero raises, zero lowers
///
/// The remote port moves big-endian words to and from card RAM at the remote
/// DMA address, going through the host like the real chip does.
#[derive(Debug, Default)]
pub struct RecordingChip {
    pub regs: [u8; 16],
    pub calls: Vec<ChipCall>,
    pub mac: [u8; 6],
    pub reset_mac: Option<[u8; 6]>,
    pub rsar: u16,
}

impl RecordingChip {
    pub fn register_calls(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, ChipCall::CsRead(_) | ChipCall::CsWrite(..)))
            .count()
    }
}

impl Dp8390 for RecordingChip {
    fn cs_read(&mut self, _host: &mut dyn Dp8390Host, reg: u8) -> u8 {
        self.calls.push(ChipCall::CsRead(reg));
        self.regs[reg as usize]
    }

    fn cs_write(&mut self, host: &mut dyn Dp8390Host, reg: u8, data: u8) {
        self.calls.push(ChipCall::CsWrite(reg, data));
        self.regs[reg as usize] = data;
        match reg {
            0x08 => self.rsar = (self.rsar & 0xFF00) | data as u16,
            0x09 => self.rsar = (self.rsar & 0x00FF) | ((data as u16) << 8),
            0x0F => host.irq_w(data != 0),
            _ => {}
        }
    }

    fn remote_read(&mut self, host: &mut dyn Dp8390Host) -> u16 {
        self.calls.push(ChipCall::RemoteRead);
        let high = host.mem_read(self.rsar) as u16;
        let low = host.mem_read(self.rsar.wrapping_add(1)) as u16;
        self.rsar = self.rsar.wrapping_add(2);
        (high << 8) | low
    }

    fn remote_write(&mut self, host: &mut dyn Dp8390Host, data: u16) {
        self.calls.push(ChipCall::RemoteWrite(data));
        host.mem_write(self.rsar, (data >> 8) as u8);
        host.mem_write(self.rsar.wrapping_add(1), data as u8);
        self.rsar = self.rsar.wrapping_add(2);
    }

    fn set_mac(&mut self, mac: &[u8; 6]) {
        self.calls.push(ChipCall::SetMac(*mac));
        self.mac = *mac;
    }

    fn mac(&self) -> [u8; 6] {
        self.mac
    }

    fn reset(&mut self, host: &mut dyn Dp8390Host) {
        self.calls.push(ChipCall::Reset);
        self.regs = [0; 16];
        if let Some(mac) = self.reset_mac {
            self.mac = mac;
        }
        host.irq_w(false);
    }
}

/// Declaration ROM image whose bytes count up, so reads can be located.
pub fn test_rom() -> Vec<u8> {
    (0..0x4000).map(|i| i as u8).collect()
}

pub fn bus_with_card(slot: u8, variant: CardVariant, seed: u64) -> Nubus {
    NubusBuilder::new()
        .seed(seed)
        .ethernet(slot, variant, RecordingChip::default(), &test_rom())
        .unwrap()
        .build()
        .unwrap()
}

pub fn ram_base(slot: u8) -> u32 {
    0xF000_0000 | ((slot as u32) << 24) | 0xD0000
}

pub fn regs_base(slot: u8) -> u32 {
    0xF000_0000 | ((slot as u32) << 24) | 0xE0000
}

pub fn mirror(slot: u8) -> u32 {
    (slot as u32) << 20
}
