mod common;

use common::{ram_base, test_rom, RecordingChip};
use nubus_enet::{CardVariant, Mac8390Card, NubusConfig};

#[test]
fn test_build_from_json() {
    let config = NubusConfig::from_json(
        r#"{
            "seed": 77,
            "cards": [
                { "slot": 10, "variant": "nb_aenet" },
                { "slot": 13, "variant": "asante_mc3nb" }
            ]
        }"#,
    )
    .unwrap();

    let mut roms = Vec::new();
    let mut bus = config
        .build(
            |_| RecordingChip::default(),
            |variant| {
                roms.push(variant);
                Ok(test_rom())
            },
        )
        .unwrap();

    assert_eq!(roms, vec![CardVariant::AppleEthernet, CardVariant::AsanteMc3nb]);
    assert!(bus.is_started());

    let apple = bus.card_as::<Mac8390Card<RecordingChip>>(0xA).unwrap();
    assert_eq!(apple.variant(), CardVariant::AppleEthernet);
    assert_eq!(apple.slot(), Some(0xA));
    assert_eq!(bus.declaration_rom(0xD).unwrap().name, "asante_mc3b.bin");

    bus.write_byte(ram_base(0xD), 0x3C).unwrap();
    assert_eq!(bus.read_byte(ram_base(0xD)).unwrap(), 0x3C);
}

#[test]
fn test_same_seed_same_addresses() {
    let config =
        NubusConfig::from_json(r#"{ "seed": 5, "cards": [{ "slot": 9, "variant": "nb_amc3b" }] }"#)
            .unwrap();
    let build = || {
        config
            .build(|_| RecordingChip::default(), |_| Ok(test_rom()))
            .unwrap()
    };

    let a = build();
    let b = build();
    let mac = |bus: &nubus_enet::Nubus| {
        bus.card_as::<Mac8390Card<RecordingChip>>(0x9)
            .unwrap()
            .mac()
    };
    assert_eq!(mac(&a), mac(&b));
}

#[test]
fn test_missing_rom_is_reported() {
    let config =
        NubusConfig::from_json(r#"{ "cards": [{ "slot": 11, "variant": "nb_aenet" }] }"#).unwrap();

    let err = config
        .build(
            |_| RecordingChip::default(),
            |_| anyhow::bail!("file not found"),
        )
        .unwrap_err();
    assert!(format!("{:#}", err).contains("declaration ROM aenet1: file not found"));

    let err = config
        .build(|_| RecordingChip::default(), |_| Ok(Vec::new()))
        .unwrap_err();
    assert!(err.to_string().contains("aenet1 is empty"));
}
