//! Host-testable core of the pageturn remote.
//!
//! Everything that decides *what* the remote does lives here and runs
//! on the host: the session state machine, the sleep policy, the
//! configuration command parser, battery math and the flash record
//! formats. The embedded binary (`main.rs`, `#![no_std]` +
//! `#![no_main]`) wires these to the SoftDevice, GPIO, SAADC and flash.
//!
//! Usage: `cargo test --lib` or `cargo test`

#![cfg_attr(not(test), no_std)]

pub mod battery_logic;
pub mod bond;
pub mod command;
pub mod config;
pub mod error;
pub mod hid;
pub mod keymap;
pub mod mode;
pub mod power_logic;
pub mod session;
pub mod store;

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests - cross-module behaviour
// ═══════════════════════════════════════════════════════════════════════════
