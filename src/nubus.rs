use std::{any::Any, cell::Cell, fmt::Write as _, rc::Rc};

use rand::{rngs::StdRng, RngCore, SeedableRng};

use crate::{
    declrom::{DeclarationRom, DECLROM_MAX_SIZE},
    error::NubusError,
    slot::{
        check_slot, slotspace, NubusCard, Region, SlotIrq, Width, Window,
        SLOT_MAX, SLOT_MIN,
    },
};

/// Seed used when the configuration does not pick one, so that runs (and the
/// MAC addresses cards derive from the machine RNG) are reproducible.
pub const DEFAULT_SEED: u64 = 0x0000_8390_5EED_0001;

const NO_CONTEXT: &str = "(no context)";

type Slots = [Option<Box<dyn NubusCard>>; 16];

/// What a card sees of the bus while it starts up.
pub struct SlotContext<'a> {
    slot: u8,
    windows: &'a mut Vec<Window>,
    rom: &'a mut Option<DeclarationRom>,
    irq_lines: &'a Rc<Cell<u16>>,
    rng: &'a mut StdRng,
}

impl<'a> SlotContext<'a> {
    pub fn slotno(&self) -> u8 {
        self.slot
    }

    pub fn slotspace(&self) -> u32 {
        slotspace(self.slot)
    }

    /// Claim `start..=end` for the card. `region` is handed back to the card
    /// on every access inside the window.
    pub fn install_device(
        &mut self,
        start: u32,
        end: u32,
        region: u8,
        width: Width,
    ) -> Result<(), NubusError> {
        insert_window(
            self.windows,
            Window {
                start,
                end,
                slot: self.slot,
                region: Region::Card { id: region, width },
            },
        )
    }

    /// Map `rom` at the top of the slot space. With `mirror_all_mb` it is
    /// repeated at the top of every megabyte of the slot space, which is
    /// where 24-bit mode looks for it.
    pub fn install_declaration_rom(
        &mut self,
        rom: &DeclarationRom,
        mirror_all_mb: bool,
    ) -> Result<(), NubusError> {
        let slotspace = self.slotspace();
        let bases: Vec<u32> = if mirror_all_mb {
            (0..16).map(|mb| slotspace + (mb << 20)).collect()
        } else {
            vec![slotspace + 0x0100_0000 - DECLROM_MAX_SIZE as u32]
        };

        for base in bases {
            let (start, end) = rom.window_in(base);
            insert_window(
                self.windows,
                Window {
                    start,
                    end,
                    slot: self.slot,
                    region: Region::DeclRom,
                },
            )?;
        }

        *self.rom = Some(rom.clone());
        Ok(())
    }

    pub fn irq(&self) -> SlotIrq {
        SlotIrq::new(self.slot, self.irq_lines.clone())
    }

    /// One draw from the machine RNG.
    pub fn rand(&mut self) -> u32 {
        self.rng.next_u32()
    }
}

fn insert_window(windows: &mut Vec<Window>, window: Window) -> Result<(), NubusError> {
    if window.end < window.start {
        return Err(NubusError::WindowOverlap {
            start: window.start,
            end: window.end,
            other: "itself (end before start)".to_string(),
        });
    }

    if let Some(other) = windows
        .iter()
        .find(|w| w.overlaps(window.start, window.end))
    {
        return Err(NubusError::WindowOverlap {
            start: window.start,
            end: window.end,
            other: other.to_string(),
        });
    }

    tracing::info!("[NUBUS] Installed {}", window);
    windows.push(window);
    Ok(())
}

/// Byte-lane mask and shift for a single byte at `addr` in a 32-bit transfer.
/// NuBus on the Mac is big-endian: byte 0 of a longword rides on bits 31..24.
fn byte_lane(addr: u32) -> (u32, u32) {
    let shift = 24 - 8 * (addr & 3);
    (0xFF << shift, shift)
}

fn word_lane(addr: u32) -> (u32, u32) {
    let shift = if addr & 2 == 0 { 16 } else { 0 };
    (0xFFFF << shift, shift)
}

fn card_mut<'a>(
    cards: &'a mut Slots,
    window: &Window,
    addr: u32,
) -> Result<&'a mut Box<dyn NubusCard>, NubusError> {
    cards[window.slot as usize]
        .as_mut()
        .ok_or(NubusError::Unmapped { addr })
}

/// A NuBus host: routes accesses in the `0xF9000000..0xFEFFFFFF` slot space
/// to the windows cards installed, and collects their interrupt lines.
#[derive(Debug)]
pub struct Nubus {
    cards: Slots,
    roms: [Option<DeclarationRom>; 16],
    windows: Vec<Window>,
    irq_lines: Rc<Cell<u16>>,
    rng: StdRng,
    context: String,
    halted: Option<String>,
    started: bool,
}

impl Default for Nubus {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl Nubus {
    pub fn new(seed: u64) -> Self {
        Self {
            cards: std::array::from_fn(|_| None),
            roms: std::array::from_fn(|_| None),
            windows: Vec::new(),
            irq_lines: Rc::new(Cell::new(0)),
            rng: StdRng::seed_from_u64(seed),
            context: NO_CONTEXT.to_string(),
            halted: None,
            started: false,
        }
    }

    pub fn install_card(&mut self, slot: u8, card: Box<dyn NubusCard>) -> Result<(), NubusError> {
        check_slot(slot)?;
        if let Some(existing) = &self.cards[slot as usize] {
            return Err(NubusError::SlotOccupied {
                slot,
                card: existing.name().to_string(),
            });
        }

        tracing::info!("[NUBUS] Slot {:X}: {}", slot, card.name());
        self.cards[slot as usize] = Some(card);

        if self.started {
            if let Err(err) = self.start_slot(slot) {
                self.cards[slot as usize] = None;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Take the card out of `slot`, unmapping its windows and ROM.
    pub fn remove_card(&mut self, slot: u8) -> Option<Box<dyn NubusCard>> {
        let card = self.cards.get_mut(slot as usize)?.take()?;
        self.unmap_slot(slot);
        tracing::info!("[NUBUS] Slot {:X}: removed {}", slot, card.name());
        Some(card)
    }

    /// Bring every installed card up. Cards claim their windows here. If a
    /// card fails, everything mapped so far is undone and the bus stays
    /// stopped, so the configuration can be fixed and `start` retried.
    pub fn start(&mut self) -> Result<(), NubusError> {
        if self.started {
            tracing::warn!("[NUBUS] start called twice, ignoring");
            return Ok(());
        }

        for slot in SLOT_MIN..=SLOT_MAX {
            if let Err(err) = self.start_slot(slot) {
                for started in SLOT_MIN..slot {
                    self.unmap_slot(started);
                }
                return Err(err);
            }
        }

        self.started = true;
        Ok(())
    }

    fn start_slot(&mut self, slot: u8) -> Result<(), NubusError> {
        let Self {
            cards,
            roms,
            windows,
            irq_lines,
            rng,
            ..
        } = self;

        if let Some(card) = cards[slot as usize].as_mut() {
            tracing::info!("[NUBUS] Starting {} in slot {:X}", card.name(), slot);
            let mut ctx = SlotContext {
                slot,
                windows,
                rom: &mut roms[slot as usize],
                irq_lines,
                rng,
            };
            if let Err(err) = card.start(&mut ctx) {
                tracing::error!(
                    "[NUBUS] {} in slot {:X} failed to start: {}",
                    card.name(),
                    slot,
                    err
                );
                self.unmap_slot(slot);
                return Err(err);
            }
        }
        Ok(())
    }

    fn unmap_slot(&mut self, slot: u8) {
        self.windows.retain(|w| w.slot != slot);
        self.roms[slot as usize] = None;
        SlotIrq::new(slot, self.irq_lines.clone()).lower();
    }

    /// Machine reset: resets every card and clears a fatal halt.
    pub fn reset(&mut self) {
        if let Some(reason) = self.halted.take() {
            tracing::info!("[NUBUS] Reset clears halt: {}", reason);
        }

        for card in self.cards.iter_mut().flatten() {
            tracing::info!("[NUBUS] Resetting {}", card.name());
            card.reset();
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn halted(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    /// Records what the CPU side was doing, for fatal diagnostics.
    pub fn set_context(&mut self, context: impl Into<String>) {
        self.context = context.into();
    }

    pub fn describe_context(&self) -> &str {
        &self.context
    }

    pub fn rand(&mut self) -> u32 {
        self.rng.next_u32()
    }

    pub fn irq_lines(&self) -> u16 {
        self.irq_lines.get()
    }

    pub fn irq_pending(&self, slot: u8) -> bool {
        slot < 16 && self.irq_lines.get() & (1 << slot) != 0
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn memory_map(&self) -> String {
        let mut windows = self.windows.clone();
        windows.sort_by_key(|w| w.start);

        let mut map = String::new();
        for window in &windows {
            let _ = writeln!(map, "{}", window);
        }
        map
    }

    pub fn card(&self, slot: u8) -> Option<&dyn NubusCard> {
        self.cards.get(slot as usize)?.as_deref()
    }

    pub fn card_as<T: Any>(&self, slot: u8) -> Option<&T> {
        let card: &dyn Any = self.cards.get(slot as usize)?.as_ref()?.as_any();
        card.downcast_ref::<T>()
    }

    pub fn card_as_mut<T: Any>(&mut self, slot: u8) -> Option<&mut T> {
        let card: &mut dyn Any = self.cards.get_mut(slot as usize)?.as_mut()?.as_any_mut();
        card.downcast_mut::<T>()
    }

    pub fn declaration_rom(&self, slot: u8) -> Option<&DeclarationRom> {
        self.roms.get(slot as usize)?.as_ref()
    }

    fn check_running(&self) -> Result<(), NubusError> {
        match &self.halted {
            Some(reason) => Err(NubusError::Halted {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn decode(&self, addr: u32) -> Result<Window, NubusError> {
        self.windows
            .iter()
            .find(|w| w.contains(addr))
            .copied()
            .ok_or(NubusError::Unmapped { addr })
    }

    fn fail(&mut self, err: NubusError) -> NubusError {
        if err.is_fatal() {
            tracing::error!("[NUBUS] Fatal: {}", err);
            self.halted = Some(err.to_string());
        }
        err
    }

    fn rom_byte(&self, window: &Window, addr: u32) -> Result<u8, NubusError> {
        let rom = self.roms[window.slot as usize]
            .as_ref()
            .ok_or(NubusError::Unmapped { addr })?;
        Ok(rom.read(addr - window.start))
    }

    pub fn read_byte(&mut self, addr: u32) -> Result<u8, NubusError> {
        self.check_running()?;
        let window = self.decode(addr)?;

        let value = match window.region {
            Region::DeclRom => self.rom_byte(&window, addr)?,
            Region::Card {
                id,
                width: Width::Byte,
            } => card_mut(&mut self.cards, &window, addr)?.read8(id, addr - window.start),
            Region::Card {
                id,
                width: Width::Long,
            } => {
                let (mask, shift) = byte_lane(addr);
                let offset = ((addr & !3) - window.start) >> 2;
                let card = card_mut(&mut self.cards, &window, addr)?;
                let result = card.read32(id, offset, mask, &self.context);
                (result.map_err(|e| self.fail(e))? >> shift) as u8
            }
        };

        tracing::trace!("[NUBUS] [RD] {:08X} = {:02X}", addr, value);
        Ok(value)
    }

    pub fn write_byte(&mut self, addr: u32, data: u8) -> Result<(), NubusError> {
        self.check_running()?;
        let window = self.decode(addr)?;
        tracing::trace!("[NUBUS] [WR] {:08X} = {:02X}", addr, data);

        match window.region {
            Region::DeclRom => {
                tracing::trace!("[NUBUS] Ignored write to declaration ROM {:08X}", addr);
            }
            Region::Card {
                id,
                width: Width::Byte,
            } => card_mut(&mut self.cards, &window, addr)?.write8(id, addr - window.start, data),
            Region::Card {
                id,
                width: Width::Long,
            } => {
                let (mask, shift) = byte_lane(addr);
                let offset = ((addr & !3) - window.start) >> 2;
                let card = card_mut(&mut self.cards, &window, addr)?;
                let result = card.write32(id, offset, (data as u32) << shift, mask, &self.context);
                result.map_err(|e| self.fail(e))?;
            }
        }
        Ok(())
    }

    pub fn read_word(&mut self, addr: u32) -> Result<u16, NubusError> {
        self.check_running()?;
        let window = self.decode(addr)?;

        match window.region {
            Region::Card {
                id,
                width: Width::Long,
            } => {
                let (mask, shift) = word_lane(addr);
                let offset = ((addr & !3) - window.start) >> 2;
                let card = card_mut(&mut self.cards, &window, addr)?;
                let result = card.read32(id, offset, mask, &self.context);
                Ok((result.map_err(|e| self.fail(e))? >> shift) as u16)
            }
            _ => {
                let high = self.read_byte(addr)? as u16;
                let low = self.read_byte(addr.wrapping_add(1))? as u16;
                Ok((high << 8) | low)
            }
        }
    }

    pub fn write_word(&mut self, addr: u32, data: u16) -> Result<(), NubusError> {
        self.check_running()?;
        let window = self.decode(addr)?;

        match window.region {
            Region::Card {
                id,
                width: Width::Long,
            } => {
                let (mask, shift) = word_lane(addr);
                let offset = ((addr & !3) - window.start) >> 2;
                let card = card_mut(&mut self.cards, &window, addr)?;
                let result = card.write32(id, offset, (data as u32) << shift, mask, &self.context);
                result.map_err(|e| self.fail(e))
            }
            _ => {
                self.write_byte(addr, (data >> 8) as u8)?;
                self.write_byte(addr.wrapping_add(1), data as u8)
            }
        }
    }

    /// 32-bit transfer with a byte-lane mask. `addr` is rounded down to a
    /// longword boundary.
    pub fn read_long(&mut self, addr: u32, mask: u32) -> Result<u32, NubusError> {
        self.check_running()?;
        let addr = addr & !3;
        let window = self.decode(addr)?;

        match window.region {
            Region::Card {
                id,
                width: Width::Long,
            } => {
                let offset = (addr - window.start) >> 2;
                let card = card_mut(&mut self.cards, &window, addr)?;
                let result = card.read32(id, offset, mask, &self.context);
                let value = result.map_err(|e| self.fail(e))?;
                tracing::trace!(
                    "[NUBUS] [RD] {:08X} & {:08X} = {:08X}",
                    addr,
                    mask,
                    value
                );
                Ok(value)
            }
            _ => {
                let mut value = 0;
                for lane in 0..4 {
                    let (lane_mask, shift) = byte_lane(lane);
                    if mask & lane_mask != 0 {
                        value |= (self.read_byte(addr + lane)? as u32) << shift;
                    }
                }
                Ok(value)
            }
        }
    }

    pub fn write_long(&mut self, addr: u32, data: u32, mask: u32) -> Result<(), NubusError> {
        self.check_running()?;
        let addr = addr & !3;
        let window = self.decode(addr)?;

        match window.region {
            Region::Card {
                id,
                width: Width::Long,
            } => {
                tracing::trace!("[NUBUS] [WR] {:08X} & {:08X} = {:08X}", addr, mask, data);
                let offset = (addr - window.start) >> 2;
                let card = card_mut(&mut self.cards, &window, addr)?;
                let result = card.write32(id, offset, data, mask, &self.context);
                result.map_err(|e| self.fail(e))
            }
            _ => {
                for lane in 0..4 {
                    let (lane_mask, shift) = byte_lane(lane);
                    if mask & lane_mask != 0 {
                        self.write_byte(addr + lane, (data >> shift) as u8)?;
                    }
                }
                Ok(())
            }
        }
    }
}
