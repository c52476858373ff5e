//! Advertising payloads, one pair per identity.

use nrf_softdevice::ble::advertisement_builder::{
    AdvertisementDataType, Flag, LegacyAdvertisementBuilder, LegacyAdvertisementPayload,
    ServiceList, ServiceUuid16,
};
use pageturn::config::{
    KEYBOARD_NAME, NOTIFIER_NAME, NOTIFIER_SERVICE_UUID_LE, SETUP_NAME, SETUP_SERVICE_UUID_LE,
};

pub static KEYBOARD_ADV: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new()
    .flags(&[Flag::GeneralDiscovery, Flag::LE_Only])
    .services_16(
        ServiceList::Incomplete,
        &[ServiceUuid16::BATTERY, ServiceUuid16::HUMAN_INTERFACE_DEVICE],
    )
    .full_name(KEYBOARD_NAME)
    // Keyboard icon on the host
    .raw(AdvertisementDataType::APPEARANCE, &[0xC1, 0x03])
    .build();

pub static KEYBOARD_SCAN: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new()
    .services_16(
        ServiceList::Complete,
        &[ServiceUuid16::BATTERY, ServiceUuid16::HUMAN_INTERFACE_DEVICE],
    )
    .build();

pub static SETUP_ADV: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new()
    .flags(&[Flag::GeneralDiscovery, Flag::LE_Only])
    .services_128(ServiceList::Complete, &[SETUP_SERVICE_UUID_LE])
    .build();

pub static SETUP_SCAN: LegacyAdvertisementPayload =
    LegacyAdvertisementBuilder::new().full_name(SETUP_NAME).build();

pub static NOTIFIER_ADV: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new()
    .flags(&[Flag::GeneralDiscovery, Flag::LE_Only])
    .services_128(ServiceList::Complete, &[NOTIFIER_SERVICE_UUID_LE])
    .build();

pub static NOTIFIER_SCAN: LegacyAdvertisementPayload =
    LegacyAdvertisementBuilder::new().full_name(NOTIFIER_NAME).build();
