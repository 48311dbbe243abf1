//! Asante MC3NB and Apple NuBus Ethernet cards.
//!
//! Both cards put a DP8390-family controller behind two windows in the slot
//! space:
//!
//! ```text
//! FssD0000 - FssDFFFF  64K buffer RAM, also the chip's local DMA target
//! FssE0000 - FssE003F  controller registers, one per longword, reversed
//! ```
//!
//! and repeat both windows `slot << 20` higher for 24-bit mode.

use std::{any::Any, fmt, str::FromStr};

use derivative::Derivative;
use serde::{Deserialize, Serialize};

use crate::{
    declrom::{DeclarationRom, DECLROM_MAX_SIZE},
    dp8390::{Dp8390, Dp8390Host},
    error::{Access, NubusError},
    nubus::SlotContext,
    slot::{mirror_offset, NubusCard, SlotIrq, Width},
    utils::hexdump,
};

pub const RAM_SIZE: usize = 0x10000;
pub const PROM_SIZE: usize = 16;
pub const PROM_FILL: u8 = 0x57;

/// First three bytes of every synthesized station address.
pub const MAC_PREFIX: [u8; 3] = [0x00, 0x00, 0x1B];

pub const RAM_START: u32 = 0xD0000;
pub const RAM_END: u32 = 0xDFFFF;
pub const REGS_START: u32 = 0xE0000;
pub const REGS_END: u32 = 0xE003F;

/// The declaration ROM is repeated at the top of every megabyte, so it has
/// to end up above the register window.
pub const MAX_ROM_SIZE: usize = DECLROM_MAX_SIZE - (REGS_END as usize + 1);

pub const REGION_RAM: u8 = 0;
pub const REGION_REGS: u8 = 1;

/// Byte lane 0 only: an access to a controller register.
pub const MASK_REGISTER: u32 = 0xFF00_0000;
/// Upper half: a word through the remote DMA port.
pub const MASK_REMOTE: u32 = 0xFFFF_0000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CardVariant {
    #[serde(alias = "nb_amc3b")]
    AsanteMc3nb,
    #[serde(alias = "nb_aenet")]
    AppleEthernet,
}

impl CardVariant {
    pub fn shortname(&self) -> &'static str {
        match self {
            CardVariant::AsanteMc3nb => "nb_amc3b",
            CardVariant::AppleEthernet => "nb_aenet",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CardVariant::AsanteMc3nb => "Asante MC3NB Ethernet card",
            CardVariant::AppleEthernet => "Apple NuBus Ethernet card",
        }
    }

    /// File name of the declaration ROM image the card ships with.
    pub fn rom_name(&self) -> &'static str {
        match self {
            CardVariant::AsanteMc3nb => "asante_mc3b.bin",
            CardVariant::AppleEthernet => "aenet1",
        }
    }

    pub fn chip(&self) -> &'static str {
        match self {
            CardVariant::AsanteMc3nb => "DP83902",
            CardVariant::AppleEthernet => "DP8390",
        }
    }
}

impl fmt::Display for CardVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.chip())
    }
}

impl FromStr for CardVariant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nb_amc3b" | "asante_mc3nb" => Ok(CardVariant::AsanteMc3nb),
            "nb_aenet" | "apple_ethernet" => Ok(CardVariant::AppleEthernet),
            _ => anyhow::bail!("unknown Ethernet card {:?}", s),
        }
    }
}

/// Station address for one machine RNG draw: the fixed prefix followed by
/// the low 24 bits of `num`, big-endian.
pub fn synthesize_mac(num: u32) -> [u8; 6] {
    let [_, a, b, c] = num.to_be_bytes();
    [MAC_PREFIX[0], MAC_PREFIX[1], MAC_PREFIX[2], a, b, c]
}

/// The card's 64K buffer. The bus and the controller's local DMA both land
/// here, so there is exactly one copy of every byte.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct BufferRam {
    data: Vec<u8>,
}

impl Default for BufferRam {
    fn default() -> Self {
        Self {
            data: vec![0; RAM_SIZE],
        }
    }
}

impl fmt::Debug for BufferRam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferRam")
            .field("size", &self.data.len())
            .finish()
    }
}

impl TryFrom<Vec<u8>> for BufferRam {
    type Error = String;

    fn try_from(data: Vec<u8>) -> Result<Self, Self::Error> {
        if data.len() != RAM_SIZE {
            return Err(format!(
                "buffer RAM is {:#x} bytes, expected {:#x}",
                data.len(),
                RAM_SIZE
            ));
        }
        Ok(Self { data })
    }
}

impl From<BufferRam> for Vec<u8> {
    fn from(ram: BufferRam) -> Self {
        ram.data
    }
}

impl BufferRam {
    pub fn read(&self, offset: u16) -> u8 {
        self.data[offset as usize]
    }

    pub fn write(&mut self, offset: u16, data: u8) {
        self.data[offset as usize] = data;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

/// Follows the controller's INT pin onto the slot interrupt.
#[derive(Debug, Default)]
struct IrqRelay {
    line: Option<SlotIrq>,
}

impl IrqRelay {
    fn set(&self, state: bool) {
        match &self.line {
            Some(line) => {
                tracing::debug!(
                    "[MAC8390] Slot {:X} IRQ {}",
                    line.slot(),
                    if state { "raised" } else { "lowered" }
                );
                if state {
                    line.raise();
                } else {
                    line.lower();
                }
            }
            None => tracing::trace!("[MAC8390] IRQ {} before start, dropped", state),
        }
    }
}

/// What the controller sees of the card while it runs.
struct ChipPort<'a> {
    ram: &'a mut BufferRam,
    irq: &'a IrqRelay,
}

impl Dp8390Host for ChipPort<'_> {
    fn mem_read(&mut self, offset: u16) -> u8 {
        self.ram.read(offset)
    }

    fn mem_write(&mut self, offset: u16, data: u8) {
        self.ram.write(offset, data);
    }

    fn irq_w(&mut self, state: bool) {
        self.irq.set(state);
    }
}

/// Saved card state. The controller's own registers belong to the chip and
/// are not part of it.
#[derive(Derivative, Clone, Serialize, Deserialize, PartialEq)]
#[derivative(Debug)]
pub struct Mac8390State {
    pub variant: CardVariant,
    pub prom: [u8; PROM_SIZE],
    #[derivative(Debug = "ignore")]
    pub ram: BufferRam,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Mac8390Card<C: Dp8390> {
    variant: CardVariant,
    chip: C,
    #[derivative(Debug = "ignore")]
    ram: BufferRam,
    prom: [u8; PROM_SIZE],
    decl_rom: DeclarationRom,
    irq: IrqRelay,
    slot: Option<u8>,
}

impl<C: Dp8390> Mac8390Card<C> {
    pub fn new(variant: CardVariant, chip: C, rom: &[u8]) -> Result<Self, NubusError> {
        if rom.len() > MAX_ROM_SIZE {
            return Err(NubusError::InvalidRom(format!(
                "{} is {:#x} bytes, the card leaves room for {:#x}",
                variant.rom_name(),
                rom.len(),
                MAX_ROM_SIZE
            )));
        }

        Ok(Self {
            variant,
            chip,
            ram: BufferRam::default(),
            prom: [PROM_FILL; PROM_SIZE],
            decl_rom: DeclarationRom::new(variant.rom_name(), rom)?,
            irq: IrqRelay::default(),
            slot: None,
        })
    }

    pub fn variant(&self) -> CardVariant {
        self.variant
    }

    pub fn slot(&self) -> Option<u8> {
        self.slot
    }

    pub fn chip(&self) -> &C {
        &self.chip
    }

    pub fn chip_mut(&mut self) -> &mut C {
        &mut self.chip
    }

    pub fn prom(&self) -> &[u8; PROM_SIZE] {
        &self.prom
    }

    pub fn mac(&self) -> [u8; 6] {
        let mut mac = [0; 6];
        mac.copy_from_slice(&self.prom[..6]);
        mac
    }

    pub fn ram(&self) -> &[u8] {
        self.ram.as_slice()
    }

    pub fn ram_dump(&self, start: u16, end: u16) -> String {
        hexdump(self.ram.as_slice(), start as usize, end as usize)
    }

    fn port(&mut self) -> (&mut C, ChipPort<'_>) {
        (
            &mut self.chip,
            ChipPort {
                ram: &mut self.ram,
                irq: &self.irq,
            },
        )
    }

    /// Lend the controller, wired to this card's RAM and interrupt line, to
    /// code that drives it outside of a bus access (frame reception,
    /// transmit completion).
    pub fn drive_chip<R>(&mut self, f: impl FnOnce(&mut C, &mut dyn Dp8390Host) -> R) -> R {
        let (chip, mut port) = self.port();
        f(chip, &mut port)
    }

    pub fn ram_r(&self, offset: u16) -> u8 {
        let data = self.ram.read(offset);
        tracing::trace!("[MAC8390] CPU read {:02x} @ RAM {:x}", data, offset);
        data
    }

    pub fn ram_w(&mut self, offset: u16, data: u8) {
        tracing::trace!("[MAC8390] CPU wrote {:02x} to RAM @ {:x}", data, offset);
        self.ram.write(offset, data);
    }

    /// Register window read. `offset` is the longword index into the window.
    pub fn en_r(&mut self, offset: u32, mask: u32, context: &str) -> Result<u32, NubusError> {
        match mask {
            MASK_REGISTER => {
                let reg = register_index(offset);
                let (chip, mut port) = self.port();
                let data = chip.cs_read(&mut port, reg);
                tracing::trace!("[MAC8390] {} reg {:x} = {:02x}", self.variant.chip(), reg, data);
                Ok((data as u32) << 24)
            }
            MASK_REMOTE => {
                let (chip, mut port) = self.port();
                Ok((chip.remote_read(&mut port) as u32) << 16)
            }
            _ => Err(self.unhandled(Access::Read, offset, None, mask, context)),
        }
    }

    pub fn en_w(
        &mut self,
        offset: u32,
        data: u32,
        mask: u32,
        context: &str,
    ) -> Result<(), NubusError> {
        match mask {
            MASK_REGISTER => {
                let reg = register_index(offset);
                tracing::trace!(
                    "[MAC8390] {:02x} to {} @ {:x}",
                    data >> 24,
                    self.variant.chip(),
                    reg
                );
                let (chip, mut port) = self.port();
                chip.cs_write(&mut port, reg, (data >> 24) as u8);
                Ok(())
            }
            MASK_REMOTE => {
                let (chip, mut port) = self.port();
                chip.remote_write(&mut port, (data >> 16) as u16);
                Ok(())
            }
            _ => Err(self.unhandled(Access::Write, offset, Some(data), mask, context)),
        }
    }

    /// Controller INT pin.
    pub fn dp_irq_w(&mut self, state: bool) {
        self.irq.set(state);
    }

    fn unhandled(
        &self,
        access: Access,
        offset: u32,
        data: Option<u32>,
        mask: u32,
        context: &str,
    ) -> NubusError {
        let err = NubusError::UnhandledMask {
            card: self.variant.shortname().to_string(),
            access,
            offset,
            data,
            mask,
            context: context.to_string(),
        };
        tracing::error!("[MAC8390] {}", err);
        err
    }

    pub fn save_state(&self) -> Mac8390State {
        Mac8390State {
            variant: self.variant,
            prom: self.prom,
            ram: self.ram.clone(),
        }
    }

    pub fn load_state(&mut self, state: Mac8390State) -> anyhow::Result<()> {
        if state.variant != self.variant {
            anyhow::bail!(
                "state saved from {} cannot be loaded into {}",
                state.variant.shortname(),
                self.variant.shortname()
            );
        }

        self.prom = state.prom;
        self.ram = state.ram;
        Ok(())
    }
}

/// Registers are wired in reverse: longword 0 of the window is register 15.
fn register_index(offset: u32) -> u8 {
    0xF - (offset & 0xF) as u8
}

impl<C: Dp8390 + 'static> NubusCard for Mac8390Card<C> {
    fn name(&self) -> &str {
        self.variant.shortname()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn start(&mut self, ctx: &mut SlotContext<'_>) -> Result<(), NubusError> {
        let mac = synthesize_mac(ctx.rand());
        self.prom = [PROM_FILL; PROM_SIZE];
        self.prom[..6].copy_from_slice(&mac);
        self.chip.set_mac(&mac);

        ctx.install_declaration_rom(&self.decl_rom, true)?;

        let slotspace = ctx.slotspace();
        let ofs_24bit = mirror_offset(ctx.slotno());
        for base in [slotspace, slotspace + ofs_24bit] {
            ctx.install_device(base + RAM_START, base + RAM_END, REGION_RAM, Width::Byte)?;
            ctx.install_device(base + REGS_START, base + REGS_END, REGION_REGS, Width::Long)?;
        }

        self.irq = IrqRelay {
            line: Some(ctx.irq()),
        };
        self.slot = Some(ctx.slotno());

        tracing::info!(
            "[MAC8390] {} in slot {:X}, MAC {:02x?}",
            self.variant,
            ctx.slotno(),
            mac
        );
        Ok(())
    }

    fn reset(&mut self) {
        let (chip, mut port) = self.port();
        chip.reset(&mut port);

        let mac = self.chip.mac();
        self.prom[..6].copy_from_slice(&mac);
        tracing::info!("[MAC8390] Reset, MAC {:02x?}", mac);
    }

    fn read8(&mut self, region: u8, offset: u32) -> u8 {
        match region {
            REGION_RAM => self.ram_r(offset as u16),
            _ => {
                tracing::trace!("[MAC8390] 8-bit read of region {} @ {:x}", region, offset);
                0xFF
            }
        }
    }

    fn write8(&mut self, region: u8, offset: u32, data: u8) {
        match region {
            REGION_RAM => self.ram_w(offset as u16, data),
            _ => tracing::trace!("[MAC8390] 8-bit write of region {} @ {:x}", region, offset),
        }
    }

    fn read32(
        &mut self,
        region: u8,
        offset: u32,
        mask: u32,
        context: &str,
    ) -> Result<u32, NubusError> {
        match region {
            REGION_REGS => self.en_r(offset, mask, context),
            _ => {
                tracing::trace!("[MAC8390] 32-bit read of region {} @ {:x}", region, offset);
                Ok(0xFFFF_FFFF)
            }
        }
    }

    fn write32(
        &mut self,
        region: u8,
        offset: u32,
        data: u32,
        mask: u32,
        context: &str,
    ) -> Result<(), NubusError> {
        match region {
            REGION_REGS => self.en_w(offset, data, mask, context),
            _ => {
                tracing::trace!("[MAC8390] 32-bit write of region {} @ {:x}", region, offset);
                Ok(())
            }
        }
    }
}
