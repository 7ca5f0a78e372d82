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

//! The top-level entry point into the control plane: registers tester credentials, lazily
//! connects them, and hands out [`TesterManager`] handles.

use std::collections::HashMap;
use std::sync::Arc;

use chimera_core::notify::{ChangeType, Message, NotificationBus};
use chimera_core::tester::TesterManager;
use chimera_transport::{MockTransport, Transport, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_stream::Stream;

use crate::config::{Credentials, PersistedStore};

/// Errors the controller itself can raise, on top of whatever the engine or transport produce.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("persisted tester store error: {0}")]
    Store(String),

    #[error("no tester registered with id {0}")]
    UnknownTester(String),

    #[error("connecting to tester {tester_id}: {reason}")]
    Connect { tester_id: String, reason: String },

    #[error(transparent)]
    Core(#[from] chimera_core::CoreError),
}

/// Builds a live [`Transport`] for a tester's credentials. The wire protocol that actually talks
/// to a chassis is out of scope for this crate (see `chimera-transport`); production callers
/// supply their own factory, tests and the demo binary use [`MockTransportFactory`].
pub trait TransportFactory: Send + Sync {
    fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn Transport>, ControllerError>;
}

/// How many modules/ports [`MockTransportFactory`] pre-seeds as Chimera-capable and released, in
/// the absence of a real discovery layer.
const FIXTURE_MODULE_COUNT: u32 = 2;
const FIXTURE_PORTS_PER_MODULE: u32 = 4;

/// A [`TransportFactory`] that hands out a [`MockTransport`] pre-seeded with a small fixed-size
/// chassis (every module/port in range reports `kind = chimera` and `reservation = released`),
/// for tests and the demo binary. Module/port ids outside the fixture behave as if queried
/// against a resource the discovery layer never reported.
#[derive(Debug, Default)]
pub struct MockTransportFactory;

impl TransportFactory for MockTransportFactory {
    fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn Transport>, ControllerError> {
        Ok(Arc::new(mock_chassis_fixture(&credentials.tester_id())))
    }
}

fn mock_chassis_fixture(tester_path: &str) -> MockTransport {
    let mut entries = vec![(format!("{tester_path}/reservation"), Value::Str("released".into()))];
    for module in 0..FIXTURE_MODULE_COUNT {
        let module_path = format!("{tester_path}/module/{module}");
        entries.push((format!("{module_path}/kind"), Value::Str("chimera".into())));
        entries.push((format!("{module_path}/reservation"), Value::Str("released".into())));
        for port in 0..FIXTURE_PORTS_PER_MODULE {
            let port_path = format!("{module_path}/port/{port}");
            entries.push((format!("{port_path}/kind"), Value::Str("chimera".into())));
            entries.push((format!("{port_path}/reservation"), Value::Str("released".into())));
        }
    }
    MockTransport::seeded(entries)
}

/// A registered tester's public-facing summary, as returned by [`MainController::list_testers`].
#[derive(Debug, Clone)]
pub struct TesterInfo {
    pub tester_id: String,
    pub host: String,
    pub port: u16,
}

/// The inventory and connection cache of one control-plane process. Owns the persisted
/// tester store, a lazily populated map of live transports, and the process-wide notification
/// bus.
pub struct MainController {
    store: Mutex<PersistedStore>,
    transports: Mutex<HashMap<String, Arc<dyn Transport>>>,
    factory: Arc<dyn TransportFactory>,
    notifications: Arc<NotificationBus>,
}

/// Named pipe carrying resource lifecycle events (reservation changes, tester add/remove).
pub const PIPE_RESOURCES: &str = "resources";

impl MainController {
    /// Load the persisted tester store from `store_path` (falling back to
    /// [`PersistedStore::default_path`] semantics when the caller passes that value) and start
    /// with an empty transport cache.
    pub fn new(store_path: impl Into<std::path::PathBuf>, factory: Arc<dyn TransportFactory>) -> Result<Self, ControllerError> {
        let store = PersistedStore::load(store_path)?;
        Ok(MainController {
            store: Mutex::new(store),
            transports: Mutex::new(HashMap::new()),
            factory,
            notifications: Arc::new(NotificationBus::new()),
        })
    }

    /// Convenience constructor using the default store path and a [`MockTransportFactory`]; the
    /// shape the demo binary drives.
    pub fn new_with_mock_transport() -> Result<Self, ControllerError> {
        Self::new(PersistedStore::default_path(), Arc::new(MockTransportFactory))
    }

    pub async fn list_testers(&self) -> Vec<TesterInfo> {
        let store = self.store.lock().await;
        store
            .list()
            .into_iter()
            .map(|(tester_id, credentials)| TesterInfo { tester_id, host: credentials.host, port: credentials.port })
            .collect()
    }

    /// Register a tester's credentials in the persisted store. Does not connect; the transport is
    /// established lazily on the first [`Self::use_tester`].
    pub async fn add_tester(&self, credentials: Credentials) -> Result<String, ControllerError> {
        let tester_id = credentials.tester_id();
        let mut store = self.store.lock().await;
        store.add(credentials)?;
        drop(store);
        self.notifications.publish(PIPE_RESOURCES, ChangeType::Changed, format!("tester {tester_id} added"));
        Ok(tester_id)
    }

    /// Forget a tester: drop its cached transport (if any) and remove it from the persisted
    /// store.
    pub async fn remove_tester(&self, tester_id: &str) -> Result<(), ControllerError> {
        self.transports.lock().await.remove(tester_id);
        self.store.lock().await.remove(tester_id)?;
        self.notifications.publish(PIPE_RESOURCES, ChangeType::Removed, format!("tester {tester_id} removed"));
        Ok(())
    }

    async fn transport_for(&self, tester_id: &str) -> Result<Arc<dyn Transport>, ControllerError> {
        if let Some(transport) = self.transports.lock().await.get(tester_id) {
            return Ok(Arc::clone(transport));
        }
        let credentials = self
            .store
            .lock()
            .await
            .get(tester_id)
            .ok_or_else(|| ControllerError::UnknownTester(tester_id.to_owned()))?;
        let transport = self
            .factory
            .connect(&credentials)
            .map_err(|e| ControllerError::Connect { tester_id: tester_id.to_owned(), reason: e.to_string() })?;
        self.transports.lock().await.insert(tester_id.to_owned(), Arc::clone(&transport));
        Ok(transport)
    }

    /// Obtain a [`TesterManager`] for an already-added tester, optionally reserving it.
    /// `username` and `debug` are carried through to logging only; the transport seam has no
    /// session-identity concept of its own.
    pub async fn use_tester(
        &self,
        tester_id: &str,
        username: &str,
        reserve: bool,
        debug: bool,
    ) -> Result<TesterManager, ControllerError> {
        if debug {
            log::debug!("use_tester({tester_id}) by {username}, reserve={reserve}");
        }
        let transport = self.transport_for(tester_id).await?;
        let tester = TesterManager::new(transport, tester_id.to_owned());
        if reserve {
            tester.reservation.reserve().await?;
        }
        Ok(tester)
    }

    /// Subscribe to a named pipe on the notification bus.
    pub fn listen_changes(&self, pipe_name: &str, filter: Option<ChangeType>) -> impl Stream<Item = Message> {
        self.notifications.listen_changes(pipe_name, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Product;
    use tokio_stream::StreamExt;

    fn sample_credentials() -> Credentials {
        Credentials { product: Product::Chimera, host: "10.20.30.42".into(), port: 22606, password: "pw".into() }
    }

    fn temp_store_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("chimera-ctl-controller-test-{}-{name}", std::process::id()))
    }

    #[tokio::test]
    async fn add_then_list_then_remove() {
        let path = temp_store_path("a");
        let controller = MainController::new(&path, Arc::new(MockTransportFactory)).unwrap();
        let credentials = sample_credentials();
        let tester_id = controller.add_tester(credentials).await.unwrap();
        assert_eq!(controller.list_testers().await.len(), 1);
        controller.remove_tester(&tester_id).await.unwrap();
        assert!(controller.list_testers().await.is_empty());
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn use_tester_fails_for_unknown_id() {
        let path = temp_store_path("b");
        let controller = MainController::new(&path, Arc::new(MockTransportFactory)).unwrap();
        let err = controller.use_tester("nope", "tester", false, false).await.unwrap_err();
        assert!(matches!(err, ControllerError::UnknownTester(_)));
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn use_tester_reuses_the_cached_transport() {
        let path = temp_store_path("c");
        let controller = MainController::new(&path, Arc::new(MockTransportFactory)).unwrap();
        let tester_id = controller.add_tester(sample_credentials()).await.unwrap();
        let tester_a = controller.use_tester(&tester_id, "u", false, false).await.unwrap();
        tester_a.reservation.reserve().await.unwrap();
        let tester_b = controller.use_tester(&tester_id, "u", false, false).await.unwrap();
        // same cached transport backs both managers, so state set through one is visible via the other.
        assert_eq!(tester_b.reservation.status().await.unwrap(), tester_a.reservation.status().await.unwrap());
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn listen_changes_observes_add_and_remove() {
        let path = temp_store_path("d");
        let controller = MainController::new(&path, Arc::new(MockTransportFactory)).unwrap();
        let mut stream = Box::pin(controller.listen_changes(PIPE_RESOURCES, None));
        let tester_id = controller.add_tester(sample_credentials()).await.unwrap();
        let added = stream.next().await.unwrap();
        assert_eq!(added.change_type, ChangeType::Changed);
        controller.remove_tester(&tester_id).await.unwrap();
        let removed = stream.next().await.unwrap();
        assert_eq!(removed.change_type, ChangeType::Removed);
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn mock_transport_factory_fixture_supports_the_full_reserve_and_flow_path() {
        let path = temp_store_path("e");
        let controller = MainController::new(&path, Arc::new(MockTransportFactory)).unwrap();
        let tester_id = controller.add_tester(sample_credentials()).await.unwrap();
        let tester = controller.use_tester(&tester_id, "demo", true, false).await.unwrap();
        let port = tester.use_port(0, 0, true).await.unwrap();
        port.flows[0].set_comment("hello").await.unwrap();
        assert_eq!(port.flows[0].get_comment().await.unwrap(), "hello");
        std::fs::remove_file(&path).ok();
    }
}
