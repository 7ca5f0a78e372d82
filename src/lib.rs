// chimera-ctl: control-plane SDK for a network-impairment emulator chassis
// Copyright (C) 2026 chimera-ctl contributors
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # chimera-ctl
//!
//! A control-plane SDK for a network-impairment emulator chassis: drop, misordering,
//! latency/jitter, duplication and corruption impairments, bandwidth policing/shaping, shadow
//! filter packet classification, resource reservation and a notification bus, fronted by a
//! [`MainController`] that tracks a persisted inventory of testers and connects to each lazily
//! through a pluggable [`controller::TransportFactory`].
//!
//! The actual engine (impairments, filters, reservation protocol, wire abstraction) lives in the
//! `chimera-core` and `chimera-transport` crates; this crate adds the parts that sit above one
//! chassis connection: credential storage, tester inventory, and the top-level entry point.

pub mod config;
pub mod controller;

pub use chimera_core::notify::{ChangeType, Message};
pub use config::{Credentials, PersistedStore, Product};
pub use controller::{ControllerError, MainController, MockTransportFactory, TesterInfo, TransportFactory};

/// Initialize logging the way the `chimera-demo` binary and integration tests expect: respects
/// `RUST_LOG`, defaults to `info`. Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = pretty_env_logger::try_init_timed();
}
