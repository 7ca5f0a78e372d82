//! Bandwidth-control impairments (`policer`, `shaper`): no distribution, no schedule.

use std::sync::Arc;

use chimera_transport::{Command, CommandToken, Transport, Value};

use crate::error::CoreError;

/// `L1` counts framing bytes toward the rate; `L2` does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateMode {
    L1,
    L2,
}

impl RateMode {
    fn as_str(&self) -> &'static str {
        match self {
            RateMode::L1 => "l1",
            RateMode::L2 => "l2",
        }
    }

    fn parse(s: &str) -> Option<RateMode> {
        match s {
            "l1" => Some(RateMode::L1),
            "l2" => Some(RateMode::L2),
            _ => None,
        }
    }
}

/// Common leaky-bucket parameters shared by the policer and the shaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicerShaperConfig {
    pub on_off: bool,
    pub mode: RateMode,
    /// Committed Information Rate, units of 100 kbps.
    pub cir: u32,
    /// Committed Burst Size, frames.
    pub cbs: u32,
    /// Shaper-only: `None` when this config belongs to a policer.
    pub buffer_size: Option<u32>,
}

/// Which of the two bandwidth-control impairments a [`PolicerShaperManager`] drives. Only the
/// shaper carries `bufferSize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandwidthControlKind {
    Policer,
    Shaper,
}

impl BandwidthControlKind {
    fn field_name(&self) -> &'static str {
        match self {
            BandwidthControlKind::Policer => "policer",
            BandwidthControlKind::Shaper => "shaper",
        }
    }

    fn has_buffer_size(&self) -> bool {
        matches!(self, BandwidthControlKind::Shaper)
    }
}

/// Drives `get`/`set`/`start`/`stop` for the policer or the shaper on one flow.
pub struct PolicerShaperManager {
    transport: Arc<dyn Transport>,
    base_path: String,
    kind: BandwidthControlKind,
}

impl PolicerShaperManager {
    pub fn new(transport: Arc<dyn Transport>, flow_path: impl Into<String>, kind: BandwidthControlKind) -> Self {
        let base_path = format!("{}/{}", flow_path.into(), kind.field_name());
        PolicerShaperManager { transport, base_path, kind }
    }

    /// Read the composite config record in one `get`. Wire layout is a flat list
    /// `[on_off, mode, cir, cbs]`, with a trailing `buffer_size` for the shaper only.
    pub async fn get(&self) -> Result<PolicerShaperConfig, CoreError> {
        let path = format!("{}/config", self.base_path);
        let value = self.transport.execute(Command::Get(path)).await?;
        let fields = value
            .as_list()
            .ok_or_else(|| CoreError::Config(format!("{}: expected a config record", self.base_path)))?;
        let expected = if self.kind.has_buffer_size() { 5 } else { 4 };
        if fields.len() != expected {
            return Err(CoreError::Config(format!("{}: expected {expected} fields", self.base_path)));
        }
        let on_off = fields[0].as_bool().ok_or_else(|| CoreError::Config("bad on_off".into()))?;
        let mode = fields[1]
            .as_str()
            .and_then(RateMode::parse)
            .ok_or_else(|| CoreError::Config("bad mode".into()))?;
        let cir = fields[2].as_u32().ok_or_else(|| CoreError::Config("bad cir".into()))?;
        let cbs = fields[3].as_u32().ok_or_else(|| CoreError::Config("bad cbs".into()))?;
        let buffer_size = if self.kind.has_buffer_size() {
            Some(fields[4].as_u32().ok_or_else(|| CoreError::Config("bad buffer_size".into()))?)
        } else {
            None
        };
        Ok(PolicerShaperConfig { on_off, mode, cir, cbs, buffer_size })
    }

    fn config_tokens(&self, config: &PolicerShaperConfig) -> Vec<CommandToken> {
        let mut fields = vec![
            Value::Bool(config.on_off),
            Value::Str(config.mode.as_str().into()),
            Value::U32(config.cir),
            Value::U32(config.cbs),
        ];
        if self.kind.has_buffer_size() {
            fields.push(Value::U32(config.buffer_size.unwrap_or_default()));
        }
        vec![CommandToken::set("config", format!("{}/config", self.base_path), Value::List(fields))]
    }

    /// Write the composite config record back.
    pub async fn set(&self, config: &PolicerShaperConfig) -> Result<(), CoreError> {
        self.transport.apply(self.config_tokens(config)).await?;
        Ok(())
    }

    async fn set_on_off(&self, on_off: bool) -> Result<(), CoreError> {
        let mut current = self.get().await?;
        current.on_off = on_off;
        self.set(&current).await
    }

    /// Commit all parameters, then set `onOff := On`.
    pub async fn start(&self, config: &PolicerShaperConfig) -> Result<(), CoreError> {
        self.set(config).await?;
        self.set_on_off(true).await
    }

    /// Set `onOff := Off`, leaving the other parameters intact on-device.
    pub async fn stop(&self) -> Result<(), CoreError> {
        self.set_on_off(false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_transport::MockTransport;

    fn policer(transport: Arc<MockTransport>) -> PolicerShaperManager {
        PolicerShaperManager::new(transport, "t/0/m/0/p/0/f/0", BandwidthControlKind::Policer)
    }

    fn shaper(transport: Arc<MockTransport>) -> PolicerShaperManager {
        PolicerShaperManager::new(transport, "t/0/m/0/p/0/f/0", BandwidthControlKind::Shaper)
    }

    #[tokio::test]
    async fn policer_set_then_get_round_trips() {
        let transport = Arc::new(MockTransport::new());
        let m = policer(transport);
        let config = PolicerShaperConfig { on_off: false, mode: RateMode::L1, cir: 1000, cbs: 32, buffer_size: None };
        m.set(&config).await.unwrap();
        assert_eq!(m.get().await.unwrap(), config);
    }

    #[tokio::test]
    async fn shaper_round_trips_buffer_size() {
        let transport = Arc::new(MockTransport::new());
        let m = shaper(transport);
        let config =
            PolicerShaperConfig { on_off: true, mode: RateMode::L2, cir: 500, cbs: 16, buffer_size: Some(2048) };
        m.set(&config).await.unwrap();
        assert_eq!(m.get().await.unwrap(), config);
    }

    #[tokio::test]
    async fn start_sets_on_off_after_committing_params() {
        let transport = Arc::new(MockTransport::new());
        let m = shaper(transport);
        let config =
            PolicerShaperConfig { on_off: false, mode: RateMode::L1, cir: 10, cbs: 1, buffer_size: Some(1) };
        m.start(&config).await.unwrap();
        assert!(m.get().await.unwrap().on_off);
        m.stop().await.unwrap();
        assert!(!m.get().await.unwrap().on_off);
    }
}
