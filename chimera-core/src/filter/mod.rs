//! Per-flow packet classifier ("shadow filter"), in its two mutually exclusive modes: `basic`
//! (a tree of protocol-layer sub-filters) and `extended` (an ordered sequence of raw protocol
//! segments).

pub mod basic;
pub mod extended;

use std::sync::Arc;

use chimera_transport::{Command, Transport, Value};

use crate::error::CoreError;
pub use basic::{BasicModeConfigurator, ShadowFilterConfigBasic};
pub use extended::{ExtendedModeConfigurator, ProtocolSegment, ShadowFilterConfigExtended};

/// `use ∈ {Off, And}` — whether a sub-filter participates in the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterUse {
    Off,
    And,
}

impl FilterUse {
    pub fn is_off(&self) -> bool {
        matches!(self, FilterUse::Off)
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            FilterUse::Off => "off",
            FilterUse::And => "and",
        }
    }

    pub(crate) fn parse(s: &str) -> Option<FilterUse> {
        match s {
            "off" => Some(FilterUse::Off),
            "and" => Some(FilterUse::And),
            _ => None,
        }
    }
}

/// `matchAction ∈ {Include, Exclude}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchAction {
    Include,
    Exclude,
}

impl MatchAction {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            MatchAction::Include => "include",
            MatchAction::Exclude => "exclude",
        }
    }

    pub(crate) fn parse(s: &str) -> Option<MatchAction> {
        match s {
            "include" => Some(MatchAction::Include),
            "exclude" => Some(MatchAction::Exclude),
            _ => None,
        }
    }
}

/// Which mode the shadow filter is currently in; returned by [`ShadowFilterManager::mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Basic,
    Extended,
}

/// Top-level shadow-filter handle for one flow: mode switching plus the shadow/working commit
/// protocol. Writes always target the shadow copy; `apply()` promotes shadow to working,
/// `cancel()` discards shadow and reloads from working.
pub struct ShadowFilterManager {
    transport: Arc<dyn Transport>,
    base_path: String,
}

impl ShadowFilterManager {
    pub fn new(transport: Arc<dyn Transport>, flow_path: impl Into<String>) -> Self {
        let base_path = format!("{}/shadow_filter", flow_path.into());
        ShadowFilterManager { transport, base_path }
    }

    /// Reset the shadow copy to defaults.
    pub async fn clear(&self) -> Result<(), CoreError> {
        self.transport.execute(Command::Set(format!("{}/initiate", self.base_path), Value::Unit)).await?;
        Ok(())
    }

    /// Switch to basic mode and return its configurator.
    pub async fn use_basic_mode(&self) -> Result<BasicModeConfigurator, CoreError> {
        self.transport
            .execute(Command::Set(format!("{}/mode", self.base_path), Value::Str("basic".into())))
            .await?;
        Ok(BasicModeConfigurator::new(Arc::clone(&self.transport), self.base_path.clone()))
    }

    /// Switch to extended mode and return its configurator.
    pub async fn use_extended_mode(&self) -> Result<ExtendedModeConfigurator, CoreError> {
        self.transport
            .execute(Command::Set(format!("{}/mode", self.base_path), Value::Str("extended".into())))
            .await?;
        Ok(ExtendedModeConfigurator::new(Arc::clone(&self.transport), self.base_path.clone()))
    }

    /// The mode the device currently reports.
    pub async fn mode(&self) -> Result<FilterMode, CoreError> {
        let value = self.transport.execute(Command::Get(format!("{}/mode", self.base_path))).await?;
        match value.as_str() {
            Some("basic") => Ok(FilterMode::Basic),
            Some("extended") => Ok(FilterMode::Extended),
            _ => Err(CoreError::Config("malformed shadow filter mode response".into())),
        }
    }

    /// Turn the filter's master switch on, on the working side.
    pub async fn enable(&self) -> Result<(), CoreError> {
        self.transport.execute(Command::Set(format!("{}/enable", self.base_path), Value::Bool(true))).await?;
        Ok(())
    }

    /// Turn the filter's master switch off, on the working side.
    pub async fn disable(&self) -> Result<(), CoreError> {
        self.transport.execute(Command::Set(format!("{}/enable", self.base_path), Value::Bool(false))).await?;
        Ok(())
    }

    /// Atomically promote shadow to working.
    pub async fn apply(&self) -> Result<(), CoreError> {
        self.transport.execute(Command::Set(format!("{}/apply", self.base_path), Value::Unit)).await?;
        Ok(())
    }

    /// Discard shadow and reload it from working.
    pub async fn cancel(&self) -> Result<(), CoreError> {
        self.transport.execute(Command::Set(format!("{}/cancel", self.base_path), Value::Unit)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_transport::MockTransport;

    #[tokio::test]
    async fn mode_switch_is_reflected_on_next_read() {
        let transport = Arc::new(MockTransport::new());
        let m = ShadowFilterManager::new(transport, "t/0/m/0/p/0/f/0");
        m.use_extended_mode().await.unwrap();
        assert_eq!(m.mode().await.unwrap(), FilterMode::Extended);
        m.use_basic_mode().await.unwrap();
        assert_eq!(m.mode().await.unwrap(), FilterMode::Basic);
    }

    #[tokio::test]
    async fn apply_and_cancel_do_not_error_against_the_mock() {
        let transport = Arc::new(MockTransport::new());
        let m = ShadowFilterManager::new(transport, "t/0/m/0/p/0/f/0");
        m.clear().await.unwrap();
        m.enable().await.unwrap();
        m.apply().await.unwrap();
        m.disable().await.unwrap();
        m.cancel().await.unwrap();
    }
}
