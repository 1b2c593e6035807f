//! Broadcast Audio Scan Service (BASS) for LE Audio broadcast sinks.
//!
//! BASS lets a client (the *Broadcast Assistant*, typically a phone) tell a sink which broadcast
//! audio sources to synchronize to. This crate implements both sides:
//!
//! * [`BassServer`] runs on the sink. It owns a fixed number of receive states, executes the
//!   commands written to the control point, and drives periodic advertising (PA) and BIG
//!   synchronization through the host stack.
//! * [`BassClient`] runs on the assistant and talks to a remote server over GATT.
//!
//! # Using the server
//!
//! The crate does no I/O of its own. Like the rest of Rubble, it is runtime-agnostic: the
//! application implements [`Config`] to plug in the host stack services the server needs:
//! * A microsecond-precision [`Timer`].
//! * [`PeriodicSync`] and [`BigSync`], the controller's synchronization procedures.
//! * A [`GattServer`] that owns the attribute table and sends notifications.
//!
//! Host events (sync established, BIGInfo received, connection changes) are fed back in by calling
//! the matching `BassServer` methods, and `BassServer::poll` must be called when the deadline
//! returned by `BassServer::next_deadline` passes.
//!
//! [`BassServer`]: server/struct.BassServer.html
//! [`BassClient`]: client/struct.BassClient.html
//! [`Config`]: config/trait.Config.html
//! [`Timer`]: time/trait.Timer.html
//! [`PeriodicSync`]: host/trait.PeriodicSync.html
//! [`BigSync`]: host/trait.BigSync.html
//! [`GattServer`]: host/trait.GattServer.html

// We're `#[no_std]`, except when we're testing
#![cfg_attr(not(test), no_std)]
#![doc(test(attr(deny(unused_imports, unused_must_use))))]
#![warn(rust_2018_idioms)]
#![allow(clippy::trivially_copy_pass_by_ref)]

#[macro_use]
mod log;
#[macro_use]
mod utils;
pub mod address;
pub mod att;
pub mod bytes;
pub mod client;
pub mod config;
mod error;
pub mod features;
pub mod gatt;
pub mod host;
#[cfg(test)]
mod mock;
pub mod pdu;
pub mod server;
pub mod store;
pub mod sync;
pub mod time;
pub mod uuid;

pub use self::error::Error;

/// Number of receive state characteristics exposed by the server.
pub const RECV_STATE_COUNT: usize = 3;

/// Maximum number of subgroups per source.
pub const MAX_SUBGROUPS: usize = 4;

/// Maximum length of the metadata of a subgroup, in bytes.
pub const MAX_METADATA_LEN: usize = 32;
