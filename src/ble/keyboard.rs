//! HID-over-GATT keyboard with a battery service.

use defmt::{debug, error, info, Format};
use nrf_softdevice::ble::gatt_server::builder::ServiceBuilder;
use nrf_softdevice::ble::gatt_server::characteristic::{Attribute, Metadata, Properties};
use nrf_softdevice::ble::gatt_server::{self, RegisterError, Service, WriteOp};
use nrf_softdevice::ble::{Connection, SecurityMode, Uuid};
use nrf_softdevice::Softdevice;
use pageturn::error::{BleError, Error};
use pageturn::hid::keyboard::{KEYBOARD_REPORT_DESCRIPTOR, KEYBOARD_REPORT_SIZE};
use pageturn::hid::{Key, KeyboardEmulator, KeyboardReport};

use super::{current_link, BleCommand, BLE_COMMANDS};

const HID_SERVICE: Uuid = Uuid::new_16(0x1812);
const HID_INFO: Uuid = Uuid::new_16(0x2a4a);
const REPORT_MAP: Uuid = Uuid::new_16(0x2a4b);
const HID_CONTROL_POINT: Uuid = Uuid::new_16(0x2a4c);
const HID_REPORT: Uuid = Uuid::new_16(0x2a4d);
const REPORT_REFERENCE: Uuid = Uuid::new_16(0x2908);

/// Report reference type byte for input reports.
const REPORT_TYPE_INPUT: u8 = 1;
/// Report reference type byte for output reports.
const REPORT_TYPE_OUTPUT: u8 = 2;

#[nrf_softdevice::gatt_service(uuid = "180f")]
pub struct BatteryService {
    #[characteristic(uuid = "2a19", read, notify)]
    battery_level: u8,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, Format)]
pub struct HidService {
    hid_info: u16,
    report_map: u16,
    hid_control: u16,
    input_keyboard: u16,
    input_keyboard_cccd: u16,
    output_keyboard: u16,
}

impl HidService {
    pub fn new(sd: &mut Softdevice) -> Result<Self, RegisterError> {
        let mut service_builder = ServiceBuilder::new(sd, HID_SERVICE)?;

        let hid_info_handle = service_builder
            .add_characteristic(
                HID_INFO,
                Attribute::new([
                    0x11u8, 0x01u8, // HID version: 1.11
                    0x00u8, // Country Code
                    0x03u8, // Remote wake + Normally Connectable
                ])
                .security(SecurityMode::JustWorks),
                Metadata::new(Properties::new().read()),
            )?
            .build();

        let report_map_handle = service_builder
            .add_characteristic(
                REPORT_MAP,
                Attribute::new(KEYBOARD_REPORT_DESCRIPTOR).security(SecurityMode::JustWorks),
                Metadata::new(Properties::new().read()),
            )?
            .build();

        let hid_control_handle = service_builder
            .add_characteristic(
                HID_CONTROL_POINT,
                Attribute::new([0u8]).security(SecurityMode::JustWorks),
                Metadata::new(Properties::new().write_without_response()),
            )?
            .build();

        let mut input_keyboard = service_builder.add_characteristic(
            HID_REPORT,
            Attribute::new([0u8; KEYBOARD_REPORT_SIZE]).security(SecurityMode::JustWorks),
            Metadata::new(Properties::new().read().notify()),
        )?;
        // Report ID 0: the report map declares no IDs
        input_keyboard.add_descriptor(
            REPORT_REFERENCE,
            Attribute::new([0u8, REPORT_TYPE_INPUT]).security(SecurityMode::JustWorks),
        )?;
        let input_keyboard_handle = input_keyboard.build();

        let mut output_keyboard = service_builder.add_characteristic(
            HID_REPORT,
            Attribute::new([0u8; 1]).security(SecurityMode::JustWorks),
            Metadata::new(Properties::new().read().write().write_without_response()),
        )?;
        output_keyboard.add_descriptor(
            REPORT_REFERENCE,
            Attribute::new([0u8, REPORT_TYPE_OUTPUT]).security(SecurityMode::JustWorks),
        )?;
        let output_keyboard_handle = output_keyboard.build();

        let _service_handle = service_builder.build();

        Ok(HidService {
            hid_info: hid_info_handle.value_handle,
            report_map: report_map_handle.value_handle,
            hid_control: hid_control_handle.value_handle,
            input_keyboard: input_keyboard_handle.value_handle,
            input_keyboard_cccd: input_keyboard_handle.cccd_handle,
            output_keyboard: output_keyboard_handle.value_handle,
        })
    }
}

impl gatt_server::Service for HidService {
    type Event = HidServiceEvent;

    fn on_write(&self, handle: u16, data: &[u8]) -> Option<Self::Event> {
        if handle == self.input_keyboard_cccd {
            Some(HidServiceEvent::InputKeyboardCccdWrite)
        } else if handle == self.output_keyboard {
            // Host LED state; the remote has no LEDs
            debug!("HID output report: {:?}", data);
            Some(HidServiceEvent::OutputKeyboard)
        } else {
            None
        }
    }
}

#[derive(Debug, Format)]
pub enum HidServiceEvent {
    InputKeyboardCccdWrite,
    OutputKeyboard,
}

pub struct KeyboardServer {
    pub bas: BatteryService,
    pub hid: HidService,
}

impl KeyboardServer {
    pub fn new(sd: &mut Softdevice) -> Result<Self, RegisterError> {
        let bas = BatteryService::new(sd)?;
        let hid = HidService::new(sd)?;
        Ok(Self { bas, hid })
    }
}

impl gatt_server::Server for KeyboardServer {
    type Event = ();

    fn on_write(
        &self,
        _conn: &Connection,
        handle: u16,
        _op: WriteOp,
        _offset: usize,
        data: &[u8],
    ) -> Option<Self::Event> {
        if let Some(HidServiceEvent::InputKeyboardCccdWrite) = self.hid.on_write(handle, data) {
            info!("HID: host subscribed to keyboard reports");
        }
        self.bas.on_write(handle, data);
        None
    }
}

/// [`KeyboardEmulator`] backed by the GATT server and the link runner.
pub struct BleKeyboard<'a> {
    server: &'a KeyboardServer,
    report: KeyboardReport,
}

impl<'a> BleKeyboard<'a> {
    pub fn new(server: &'a KeyboardServer) -> Self {
        Self {
            server,
            report: KeyboardReport::empty(),
        }
    }

    fn send_report(&self) -> Result<(), Error> {
        let conn = current_link().ok_or(Error::NotConnected)?;
        let mut buf = [0u8; KEYBOARD_REPORT_SIZE];
        let len = self.report.serialize(&mut buf);
        gatt_server::notify_value(&conn, self.server.hid.input_keyboard, &buf[..len]).map_err(
            |e| {
                error!("HID: send keyboard report error: {:?}", e);
                match e {
                    gatt_server::NotifyValueError::Disconnected => Error::NotConnected,
                    gatt_server::NotifyValueError::Raw(raw) => BleError::Raw(raw as u32).into(),
                }
            },
        )
    }

    fn command(&self, command: BleCommand) -> Result<(), Error> {
        BLE_COMMANDS
            .try_send(command)
            .map_err(|_| Error::Ble(BleError::AdvertiseFailed))
    }
}

impl KeyboardEmulator for BleKeyboard<'_> {
    type Error = Error;

    fn begin(&mut self) -> Result<(), Error> {
        self.command(BleCommand::Advertise)
    }

    fn end(&mut self) -> Result<(), Error> {
        self.report.release_all();
        self.command(BleCommand::Shutdown)
    }

    fn is_connected(&self) -> bool {
        current_link().is_some()
    }

    fn press(&mut self, key: Key) -> Result<(), Error> {
        if self.report.press(key) {
            self.send_report()?;
        }
        Ok(())
    }

    fn release_all(&mut self) -> Result<(), Error> {
        self.report.release_all();
        self.send_report()
    }

    fn set_battery_level(&mut self, percent: u8, notify: bool) -> Result<(), Error> {
        self.server
            .bas
            .battery_level_set(&percent)
            .map_err(|_| BleError::SetValueFailed)?;

        if notify {
            let conn = current_link().ok_or(Error::NotConnected)?;
            self.server
                .bas
                .battery_level_notify(&conn, &percent)
                .map_err(|_| BleError::NotifyFailed)?;
        }
        Ok(())
    }
}
