//! Configuration service for Configuration mode.
//!
//! A single write-only characteristic takes `N:<mod>:<code>` or
//! `P:<mod>:<code>`. Parsing happens in the session; this callback only
//! copies the bytes out of the SoftDevice context.

use defmt::debug;
use pageturn::session::{CommandBuf, SessionEvent};

use super::post;

#[nrf_softdevice::gatt_service(uuid = "4fafc201-1fb5-459e-8fcc-c5c9c331914b")]
pub struct SetupService {
    #[characteristic(uuid = "beb5483e-36e1-4688-b7f5-ea07361b26a8", write, write_without_response)]
    command: CommandBuf,
}

#[nrf_softdevice::gatt_server]
pub struct SetupServer {
    pub setup: SetupService,
}

/// Link runner callback for the setup server.
pub fn on_event(event: SetupServerEvent) {
    match event {
        SetupServerEvent::Setup(SetupServiceEvent::CommandWrite(raw)) => {
            debug!("SETUP: write of {} bytes", raw.len());
            post(SessionEvent::ConfigWrite(raw));
        }
    }
}
