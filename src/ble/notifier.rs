//! Companion-app service (`notifier` feature).
//!
//! Instead of keystrokes the remote notifies a button code (1 = NEXT,
//! 2 = PREV) and pushes its battery level; a desktop bridge turns
//! those into key presses.

use defmt::{info, warn};
use pageturn::error::{BleError, Error};
use pageturn::keymap::Slot;

use super::current_link;

#[nrf_softdevice::gatt_service(uuid = "12345678-1234-1234-1234-1234567890ab")]
pub struct RemoteService {
    #[characteristic(uuid = "12345678-1234-1234-1234-1234567890ac", read, notify)]
    button: u8,
    #[characteristic(uuid = "12345678-1234-1234-1234-1234567890ad", read, notify)]
    battery: u8,
}

#[nrf_softdevice::gatt_server]
pub struct NotifierServer {
    pub remote: RemoteService,
}

impl NotifierServer {
    /// Notify a button press to the connected host.
    pub fn notify_button(&self, slot: Slot) -> Result<(), Error> {
        let conn = current_link().ok_or(Error::NotConnected)?;
        let code = slot.event_code();
        self.remote
            .button_set(&code)
            .map_err(|_| BleError::SetValueFailed)?;
        self.remote
            .button_notify(&conn, &code)
            .map_err(|_| BleError::NotifyFailed)?;
        Ok(())
    }

    /// Update the battery characteristic, notifying when a host is up.
    pub fn push_battery(&self, percent: u8) -> Result<(), Error> {
        self.remote
            .battery_set(&percent)
            .map_err(|_| BleError::SetValueFailed)?;
        if let Some(conn) = current_link() {
            self.remote
                .battery_notify(&conn, &percent)
                .map_err(|_| BleError::NotifyFailed)?;
        }
        Ok(())
    }
}

/// Link runner callback for the notifier server.
pub fn on_event(event: NotifierServerEvent) {
    match event {
        NotifierServerEvent::Remote(RemoteServiceEvent::ButtonCccdWrite { notifications }) => {
            info!("NOTIFIER: button notifications {}", notifications);
        }
        NotifierServerEvent::Remote(RemoteServiceEvent::BatteryCccdWrite { notifications }) => {
            if !notifications {
                warn!("NOTIFIER: host unsubscribed from battery");
            }
        }
    }
}
