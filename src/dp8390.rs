//! Seam between a NuBus card and a DP8390-family network controller.
//!
//! The controller itself (packet buffer management, remote DMA, framing)
//! lives outside this crate. A card owns a chip implementing [`Dp8390`] and
//! lends it a [`Dp8390Host`] on every call, so the chip can reach the card's
//! buffer RAM and interrupt line without holding a reference back into it.

use std::fmt::Debug;

/// Callbacks a DP8390 makes into the card that hosts it.
pub trait Dp8390Host {
    /// Local DMA read from the card's buffer RAM.
    fn mem_read(&mut self, offset: u16) -> u8;
    /// Local DMA write to the card's buffer RAM.
    fn mem_write(&mut self, offset: u16, data: u8);
    /// INT pin level.
    fn irq_w(&mut self, state: bool);
}

/// The register and remote-DMA interface of a DP8390 / DP83902.
pub trait Dp8390: Debug {
    /// Read register `reg` (0..=15) of the currently selected page.
    fn cs_read(&mut self, host: &mut dyn Dp8390Host, reg: u8) -> u8;
    fn cs_write(&mut self, host: &mut dyn Dp8390Host, reg: u8, data: u8);

    /// Remote DMA data port, word mode.
    fn remote_read(&mut self, host: &mut dyn Dp8390Host) -> u16;
    fn remote_write(&mut self, host: &mut dyn Dp8390Host, data: u16);

    fn set_mac(&mut self, mac: &[u8; 6]);
    fn mac(&self) -> [u8; 6];

    /// Hardware reset. The chip may pick its own station address here.
    fn reset(&mut self, host: &mut dyn Dp8390Host);
}

impl<C: Dp8390 + ?Sized> Dp8390 for Box<C> {
    fn cs_read(&mut self, host: &mut dyn Dp8390Host, reg: u8) -> u8 {
        (**self).cs_read(host, reg)
    }

    fn cs_write(&mut self, host: &mut dyn Dp8390Host, reg: u8, data: u8) {
        (**self).cs_write(host, reg, data)
    }

    fn remote_read(&mut self, host: &mut dyn Dp8390Host) -> u16 {
        (**self).remote_read(host)
    }

    fn remote_write(&mut self, host: &mut dyn Dp8390Host, data: u16) {
        (**self).remote_write(host, data)
    }

    fn set_mac(&mut self, mac: &[u8; 6]) {
        (**self).set_mac(mac)
    }

    fn mac(&self) -> [u8; 6] {
        (**self).mac()
    }

    fn reset(&mut self, host: &mut dyn Dp8390Host) {
        (**self).reset(host)
    }
}
