pub mod config;
pub mod declrom;
pub mod dp8390;
pub mod error;
pub mod mac8390;
pub mod nubus;
pub mod slot;
pub mod utils;

use std::fmt;

pub use config::{EthernetCardConfig, NubusBuilder, NubusConfig};
pub use dp8390::{Dp8390, Dp8390Host};
pub use error::NubusError;
pub use mac8390::{CardVariant, Mac8390Card};
pub use nubus::Nubus;
pub use utils::hexdump;

use once_cell::sync::OnceCell;
use wasm_bindgen::{prelude::*, JsCast};

static LOGGING: OnceCell<()> = OnceCell::new();

fn init_logging() {
    LOGGING.get_or_init(|| {
        console_error_panic_hook::set_once();
        tracing_wasm::set_as_global_default();
    });
}

/// A controller implemented in JavaScript. The object provides `csRead(reg)`,
/// `csWrite(reg, data)`, `remoteRead()`, `remoteWrite(data)` and optionally
/// `setMac(bytes)` and `reset()`; `reset` may return a 6-byte `Uint8Array`
/// with the address the chip settled on.
///
/// Callbacks cannot reenter the bus. Local DMA and interrupt changes are
/// delivered between accesses with `chipMemWrite` and `chipIrq`.
struct JsChip {
    callbacks: js_sys::Object,
    mac: [u8; 6],
}

impl fmt::Debug for JsChip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsChip").field("mac", &self.mac).finish()
    }
}

impl JsChip {
    fn call(&self, name: &str, args: &[JsValue]) -> JsValue {
        let func = js_sys::Reflect::get(&self.callbacks, &JsValue::from_str(name))
            .ok()
            .and_then(|f| f.dyn_into::<js_sys::Function>().ok());
        let Some(func) = func else {
            tracing::trace!("[JS] Chip has no {} callback", name);
            return JsValue::UNDEFINED;
        };

        let args: js_sys::Array = args.iter().collect();
        match func.apply(&self.callbacks, &args) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!("[JS] Chip {} threw {:?}", name, err);
                JsValue::UNDEFINED
            }
        }
    }
}

impl Dp8390 for JsChip {
    fn cs_read(&mut self, _host: &mut dyn Dp8390Host, reg: u8) -> u8 {
        self.call("csRead", &[reg.into()]).as_f64().unwrap_or(255.0) as u8
    }

    fn cs_write(&mut self, _host: &mut dyn Dp8390Host, reg: u8, data: u8) {
        self.call("csWrite", &[reg.into(), data.into()]);
    }

    fn remote_read(&mut self, _host: &mut dyn Dp8390Host) -> u16 {
        self.call("remoteRead", &[]).as_f64().unwrap_or(65535.0) as u16
    }

    fn remote_write(&mut self, _host: &mut dyn Dp8390Host, data: u16) {
        self.call("remoteWrite", &[data.into()]);
    }

    fn set_mac(&mut self, mac: &[u8; 6]) {
        self.mac = *mac;
        self.call("setMac", &[js_sys::Uint8Array::from(&mac[..]).into()]);
    }

    fn mac(&self) -> [u8; 6] {
        self.mac
    }

    fn reset(&mut self, _host: &mut dyn Dp8390Host) {
        let value = self.call("reset", &[]);
        if let Ok(mac) = value.dyn_into::<js_sys::Uint8Array>() {
            if mac.length() == 6 {
                mac.copy_to(&mut self.mac);
            }
        }
    }
}

fn js_err(err: impl fmt::Display) -> JsError {
    JsError::new(&err.to_string())
}

#[wasm_bindgen(js_name = Nubus)]
pub struct JsNubus {
    bus: Nubus,
    slot: u8,
}

impl JsNubus {
    fn card(&mut self) -> Result<&mut Mac8390Card<JsChip>, JsError> {
        self.bus
            .card_as_mut::<Mac8390Card<JsChip>>(self.slot)
            .ok_or_else(|| JsError::new("no Ethernet card installed"))
    }
}

#[wasm_bindgen(js_class = Nubus)]
impl JsNubus {
    /// A bus with a single Ethernet card in `slot`.
    #[wasm_bindgen(constructor)]
    pub fn new(
        slot: u8,
        variant: &str,
        rom: &[u8],
        chip: js_sys::Object,
    ) -> Result<JsNubus, JsError> {
        init_logging();

        let variant: CardVariant = variant.parse().map_err(js_err)?;
        let seed = (js_sys::Math::random() * u32::MAX as f64) as u64;
        let chip = JsChip {
            callbacks: chip,
            mac: [0; 6],
        };
        let bus = NubusBuilder::new()
            .seed(seed)
            .ethernet(slot, variant, chip, rom)?
            .build()?;

        Ok(Self { bus, slot })
    }

    pub fn read8(&mut self, addr: u32) -> Result<u8, JsError> {
        Ok(self.bus.read_byte(addr)?)
    }

    pub fn write8(&mut self, addr: u32, value: u8) -> Result<(), JsError> {
        Ok(self.bus.write_byte(addr, value)?)
    }

    pub fn read16(&mut self, addr: u32) -> Result<u16, JsError> {
        Ok(self.bus.read_word(addr)?)
    }

    pub fn write16(&mut self, addr: u32, value: u16) -> Result<(), JsError> {
        Ok(self.bus.write_word(addr, value)?)
    }

    pub fn read32(&mut self, addr: u32, mask: u32) -> Result<u32, JsError> {
        Ok(self.bus.read_long(addr, mask)?)
    }

    pub fn write32(&mut self, addr: u32, value: u32, mask: u32) -> Result<(), JsError> {
        Ok(self.bus.write_long(addr, value, mask)?)
    }

    pub fn reset(&mut self) {
        self.bus.reset();
    }

    #[wasm_bindgen(js_name = setContext)]
    pub fn set_context(&mut self, context: String) {
        self.bus.set_context(context);
    }

    #[wasm_bindgen(getter = irqPending)]
    pub fn irq_pending(&self) -> bool {
        self.bus.irq_pending(self.slot)
    }

    #[wasm_bindgen(getter)]
    pub fn halted(&self) -> Option<String> {
        self.bus.halted().map(str::to_string)
    }

    pub fn mac(&mut self) -> Result<Vec<u8>, JsError> {
        Ok(self.card()?.mac().to_vec())
    }

    #[wasm_bindgen(js_name = memoryMap)]
    pub fn memory_map(&self) -> String {
        self.bus.memory_map()
    }

    #[wasm_bindgen(js_name = chipMemRead)]
    pub fn chip_mem_read(&mut self, offset: u16) -> Result<u8, JsError> {
        Ok(self.card()?.drive_chip(|_, host| host.mem_read(offset)))
    }

    #[wasm_bindgen(js_name = chipMemWrite)]
    pub fn chip_mem_write(&mut self, offset: u16, value: u8) -> Result<(), JsError> {
        self.card()?.drive_chip(|_, host| host.mem_write(offset, value));
        Ok(())
    }

    #[wasm_bindgen(js_name = chipIrq)]
    pub fn chip_irq(&mut self, state: bool) -> Result<(), JsError> {
        self.card()?.dp_irq_w(state);
        Ok(())
    }
}
