use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{
    dp8390::Dp8390,
    error::NubusError,
    mac8390::{CardVariant, Mac8390Card},
    nubus::{Nubus, DEFAULT_SEED},
    slot::{check_slot, NubusCard},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EthernetCardConfig {
    pub slot: u8,
    pub variant: CardVariant,
}

/// Which Ethernet cards sit in which slots, and the machine RNG seed.
///
/// ```json
/// { "seed": 1234, "cards": [{ "slot": 9, "variant": "nb_amc3b" }] }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct NubusConfig {
    pub seed: Option<u64>,
    pub cards: Vec<EthernetCardConfig>,
}

impl NubusConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json).context("parsing NuBus configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), NubusError> {
        for (i, card) in self.cards.iter().enumerate() {
            check_slot(card.slot)?;
            if let Some(earlier) = self.cards[..i].iter().find(|c| c.slot == card.slot) {
                return Err(NubusError::SlotOccupied {
                    slot: card.slot,
                    card: earlier.variant.shortname().to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn seed(&self) -> u64 {
        self.seed.unwrap_or(DEFAULT_SEED)
    }

    /// Build and start a bus with the configured cards. `chip` makes the
    /// controller for each card, `rom` supplies the declaration ROM image
    /// for a variant.
    pub fn build<C, F, R>(&self, mut chip: F, mut rom: R) -> anyhow::Result<Nubus>
    where
        C: Dp8390 + 'static,
        F: FnMut(&EthernetCardConfig) -> C,
        R: FnMut(CardVariant) -> anyhow::Result<Vec<u8>>,
    {
        self.validate()?;

        let mut builder = NubusBuilder::new();
        builder.seed(self.seed());
        for card in &self.cards {
            let image = rom(card.variant)
                .with_context(|| format!("declaration ROM {}", card.variant.rom_name()))?;
            builder.ethernet(card.slot, card.variant, chip(card), &image)?;
        }

        Ok(builder.build()?)
    }
}

#[derive(Default)]
pub struct NubusBuilder {
    seed: Option<u64>,
    cards: Vec<(u8, Box<dyn NubusCard>)>,
}

impl NubusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = Some(seed);
        self
    }

    pub fn card(&mut self, slot: u8, card: Box<dyn NubusCard>) -> &mut Self {
        self.cards.push((slot, card));
        self
    }

    pub fn ethernet<C: Dp8390 + 'static>(
        &mut self,
        slot: u8,
        variant: CardVariant,
        chip: C,
        rom: &[u8],
    ) -> Result<&mut Self, NubusError> {
        let card = Mac8390Card::new(variant, chip, rom)?;
        Ok(self.card(slot, Box::new(card)))
    }

    /// Installs the cards and starts the bus.
    pub fn build(&mut self) -> Result<Nubus, NubusError> {
        let mut bus = Nubus::new(self.seed.unwrap_or(DEFAULT_SEED));
        for (slot, card) in std::mem::take(&mut self.cards) {
            bus.install_card(slot, card)?;
        }
        bus.start()?;
        Ok(bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let config = NubusConfig::from_json(
            r#"{ "seed": 7, "cards": [
                { "slot": 9, "variant": "nb_amc3b" },
                { "slot": 14, "variant": "apple_ethernet" }
            ] }"#,
        )
        .unwrap();

        assert_eq!(config.seed(), 7);
        assert_eq!(config.cards.len(), 2);
        assert_eq!(config.cards[0].variant, CardVariant::AsanteMc3nb);
        assert_eq!(config.cards[1].variant, CardVariant::AppleEthernet);
        assert_eq!(config.cards[1].slot, 0xE);
    }

    #[test]
    fn test_empty_config_uses_default_seed() {
        let config = NubusConfig::from_json("{}").unwrap();
        assert_eq!(config.seed(), DEFAULT_SEED);
        assert!(config.cards.is_empty());
    }

    #[test]
    fn test_rejects_bad_slots() {
        let err = NubusConfig::from_json(r#"{ "cards": [{ "slot": 3, "variant": "nb_aenet" }] }"#)
            .unwrap_err();
        assert!(err.to_string().contains("invalid NuBus slot"));

        let err = NubusConfig::from_json(
            r#"{ "cards": [
                { "slot": 10, "variant": "nb_aenet" },
                { "slot": 10, "variant": "nb_amc3b" }
            ] }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("already holds nb_aenet"));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(NubusConfig::from_json(r#"{ "sead": 1 }"#).is_err());
        assert!(NubusConfig::from_json(r#"{ "cards": [{ "slot": 9, "variant": "ne2000" }] }"#).is_err());
    }

    #[test]
    fn test_round_trip_json() {
        let config = NubusConfig {
            seed: Some(99),
            cards: vec![EthernetCardConfig {
                slot: 0xB,
                variant: CardVariant::AppleEthernet,
            }],
        };
        let json = config.to_json().unwrap();
        assert_eq!(NubusConfig::from_json(&json).unwrap(), config);
    }
}
