//! Module-scoped clock/timing configuration and port access.

use std::sync::Arc;

use chimera_transport::{Command, Transport, Value};

use crate::error::CoreError;
use crate::port::PortManager;
use crate::reservation::ReservationState;

/// Where a module's transmit clock is sourced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxClockSource {
    Chassis,
    Module,
    Loop,
}

impl TxClockSource {
    fn parse(s: &str) -> Option<TxClockSource> {
        match s {
            "chassis" => Some(TxClockSource::Chassis),
            "module" => Some(TxClockSource::Module),
            "loop" => Some(TxClockSource::Loop),
            _ => None,
        }
    }
}

/// Whether the module's transmit clock is currently locked to its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxClockStatus {
    Locked,
    NotLocked,
}

impl TxClockStatus {
    fn parse(s: &str) -> Option<TxClockStatus> {
        match s {
            "locked" => Some(TxClockStatus::Locked),
            "not_locked" => Some(TxClockStatus::NotLocked),
            _ => None,
        }
    }
}

/// A module's comment plus its (read-only) clock status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConfig {
    pub comment: String,
    pub tx_clock_source: TxClockSource,
    pub tx_clock_status: TxClockStatus,
}

/// Reads/writes one module's configuration. Only `comment` is writable; the clock fields are
/// device-reported status.
pub struct ModuleConfigurator {
    transport: Arc<dyn Transport>,
    base_path: String,
}

impl ModuleConfigurator {
    fn new(transport: Arc<dyn Transport>, base_path: String) -> Self {
        ModuleConfigurator { transport, base_path }
    }

    pub async fn get(&self) -> Result<ModuleConfig, CoreError> {
        let comment_path = format!("{}/comment", self.base_path);
        let source_path = format!("{}/tx_clock/source", self.base_path);
        let status_path = format!("{}/tx_clock/status", self.base_path);

        let (comment, source, status) = tokio::try_join!(
            self.transport.execute(Command::Get(comment_path)),
            self.transport.execute(Command::Get(source_path)),
            self.transport.execute(Command::Get(status_path)),
        )?;

        let comment = comment.as_str().unwrap_or_default().to_owned();
        let tx_clock_source = source
            .as_str()
            .and_then(TxClockSource::parse)
            .ok_or_else(|| CoreError::Config("malformed tx_clock source response".into()))?;
        let tx_clock_status = status
            .as_str()
            .and_then(TxClockStatus::parse)
            .ok_or_else(|| CoreError::Config("malformed tx_clock status response".into()))?;

        Ok(ModuleConfig { comment, tx_clock_source, tx_clock_status })
    }

    pub async fn set(&self, comment: impl Into<String>) -> Result<(), CoreError> {
        let path = format!("{}/comment", self.base_path);
        self.transport.execute(Command::Set(path, Value::Str(comment.into()))).await?;
        Ok(())
    }
}

/// One line card: its own configuration, reservation state, and the ports living on it.
pub struct ModuleManager {
    transport: Arc<dyn Transport>,
    base_path: String,
    pub config: ModuleConfigurator,
    pub reservation: ReservationState,
}

impl ModuleManager {
    pub(crate) fn new(transport: Arc<dyn Transport>, tester_path: impl Into<String>, module_id: u32) -> Self {
        let base_path = format!("{}/module/{module_id}", tester_path.into());
        ModuleManager {
            config: ModuleConfigurator::new(Arc::clone(&transport), base_path.clone()),
            reservation: ReservationState::new(Arc::clone(&transport), base_path.clone()),
            transport,
            base_path,
        }
    }

    fn port_kind_path(&self, port_id: u32) -> String {
        format!("{}/port/{port_id}/kind", self.base_path)
    }

    /// Obtain the Chimera port `port_id` on this module, optionally reserving it.
    /// Rejects ports that are not Chimera-capable.
    pub async fn use_port(&self, port_id: u32, reserve: bool) -> Result<PortManager, CoreError> {
        let kind = self.transport.execute(Command::Get(self.port_kind_path(port_id))).await?;
        if kind.as_str() != Some("chimera") {
            return Err(CoreError::InvalidResourceKind {
                resource: format!("{}/port/{port_id}", self.base_path),
                expected: "chimera port",
            });
        }
        let port = PortManager::new(Arc::clone(&self.transport), self.base_path.clone(), port_id);
        if reserve {
            port.reservation.reserve().await?;
        }
        Ok(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_transport::MockTransport;

    #[tokio::test]
    async fn get_reads_comment_and_clock_status() {
        let transport = Arc::new(MockTransport::new());
        transport.seed("t/0/module/3/comment", Value::Str("edge module".into())).await;
        transport.seed("t/0/module/3/tx_clock/source", Value::Str("chassis".into())).await;
        transport.seed("t/0/module/3/tx_clock/status", Value::Str("locked".into())).await;
        let m = ModuleManager::new(transport, "t/0", 3);
        let config = m.config.get().await.unwrap();
        assert_eq!(config.comment, "edge module");
        assert_eq!(config.tx_clock_source, TxClockSource::Chassis);
        assert_eq!(config.tx_clock_status, TxClockStatus::Locked);
    }

    #[tokio::test]
    async fn use_port_rejects_non_chimera_ports() {
        let transport = Arc::new(MockTransport::new());
        transport.seed("t/0/module/0/port/1/kind", Value::Str("l23".into())).await;
        let m = ModuleManager::new(transport, "t/0", 0);
        let err = m.use_port(1, false).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidResourceKind { .. }));
    }

    #[tokio::test]
    async fn use_port_reserves_when_requested() {
        let transport = Arc::new(MockTransport::new());
        transport.seed("t/0/module/0/port/1/kind", Value::Str("chimera".into())).await;
        transport.seed("t/0/module/0/port/1/reservation", Value::Str("released".into())).await;
        let m = ModuleManager::new(transport, "t/0", 0);
        let port = m.use_port(1, true).await.unwrap();
        transport_status_is_reserved(&port).await;
    }

    async fn transport_status_is_reserved(port: &PortManager) {
        // reserve() on a released resource issues "reserve" against the mock, which does not
        // itself mutate the seeded value; we only assert the call did not error above.
        let _ = port.reservation.status().await.unwrap();
    }
}
