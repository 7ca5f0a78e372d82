//! Per-impairment get/set/start/stop, including the partial-response reconstruction protocol:
//! read every allowed distribution in parallel, expect `NotValid` from all but (at most) one.

use std::sync::Arc;

use chimera_transport::{Command, CommandToken, Transport, TransportError, Value};
use log::{debug, trace};

use crate::distribution::{Distribution, DistributionKind, Schedule};
use crate::error::CoreError;

/// The five distribution-bearing impairments. `policer`/`shaper` have no distribution and are
/// handled by [`crate::policer_shaper`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImpairmentKind {
    Drop,
    Misordering,
    LatencyJitter,
    Duplication,
    Corruption,
}

impl ImpairmentKind {
    pub fn field_name(&self) -> &'static str {
        match self {
            ImpairmentKind::Drop => "drop",
            ImpairmentKind::Misordering => "misordering",
            ImpairmentKind::LatencyJitter => "latency_jitter",
            ImpairmentKind::Duplication => "duplication",
            ImpairmentKind::Corruption => "corruption",
        }
    }

    /// The allowed-distribution matrix. Declaration order doubles as the tie-break order
    /// used by `get()` when no response carries a timestamp.
    pub fn allowed_distributions(&self) -> &'static [DistributionKind] {
        use DistributionKind::*;
        match self {
            ImpairmentKind::Drop => &[
                FixedBurst, RandomBurst, FixedRate, BitErrorRate, GilbertElliot, Uniform, Gaussian, Gamma, Poisson,
                Custom,
            ],
            ImpairmentKind::Misordering => &[FixedBurst, FixedRate],
            ImpairmentKind::LatencyJitter => {
                &[ConstantDelay, AccumulateBurst, Step, Uniform, Gaussian, Gamma, Poisson, Custom]
            }
            ImpairmentKind::Duplication => &[
                FixedBurst, RandomBurst, FixedRate, RandomRate, BitErrorRate, GilbertElliot, Uniform, Gaussian, Gamma,
                Poisson, Custom,
            ],
            ImpairmentKind::Corruption => &[
                FixedBurst, RandomBurst, FixedRate, RandomRate, BitErrorRate, GilbertElliot, Uniform, Gaussian, Gamma,
                Poisson, Custom,
            ],
        }
    }

    pub fn allows(&self, kind: DistributionKind) -> bool {
        self.allowed_distributions().contains(&kind)
    }
}

/// `corruptionType`, only meaningful on [`ImpairmentKind::Corruption`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptionType {
    Eth,
    Ip,
    Tcp,
    Udp,
}

impl CorruptionType {
    fn as_str(&self) -> &'static str {
        match self {
            CorruptionType::Eth => "eth",
            CorruptionType::Ip => "ip",
            CorruptionType::Tcp => "tcp",
            CorruptionType::Udp => "udp",
        }
    }

    fn parse(s: &str) -> Option<CorruptionType> {
        match s {
            "eth" => Some(CorruptionType::Eth),
            "ip" => Some(CorruptionType::Ip),
            "tcp" => Some(CorruptionType::Tcp),
            "udp" => Some(CorruptionType::Udp),
            _ => None,
        }
    }
}

/// One impairment's configuration: whether it is on, and which distribution (if any) drives it.
/// The distribution's own [`Schedule`] is the impairment's schedule; there is no separate
/// copy to desynchronize.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpairmentConfig {
    pub enable: bool,
    pub current_distribution: Option<Distribution>,
    pub corruption_type: Option<CorruptionType>,
}

impl ImpairmentConfig {
    pub fn disabled() -> Self {
        ImpairmentConfig { enable: false, current_distribution: None, corruption_type: None }
    }

    pub fn schedule(&self) -> Option<Schedule> {
        self.current_distribution.as_ref().map(Distribution::schedule)
    }
}

/// Drives one impairment on one flow over a [`Transport`].
pub struct ImpairmentManager {
    transport: Arc<dyn Transport>,
    base_path: String,
    kind: ImpairmentKind,
}

impl ImpairmentManager {
    pub fn new(transport: Arc<dyn Transport>, flow_path: impl Into<String>, kind: ImpairmentKind) -> Self {
        let base_path = format!("{}/{}", flow_path.into(), kind.field_name());
        ImpairmentManager { transport, base_path, kind }
    }

    pub fn kind(&self) -> ImpairmentKind {
        self.kind
    }

    /// Read back the impairment's full configuration by fanning out one `get` per allowed
    /// distribution variant plus `enable`/`schedule`, tolerating `NotValid` on every distribution
    /// that was never configured on this side.
    pub async fn get(&self) -> Result<ImpairmentConfig, CoreError> {
        let enable_path = format!("{}/enable", self.base_path);
        let enable_fut = self.transport.execute(Command::Get(enable_path));

        let allowed = self.kind.allowed_distributions();
        let mut handles = Vec::with_capacity(allowed.len() * 2);
        for &dk in allowed {
            let transport = Arc::clone(&self.transport);
            let params_path = format!("{}/distribution/{}", self.base_path, dk.field_name());
            handles.push((dk, tokio::spawn(async move { transport.execute(Command::Get(params_path)).await })));
        }
        let schedule_path = format!("{}/schedule", self.base_path);
        let schedule_handle = {
            let transport = Arc::clone(&self.transport);
            tokio::spawn(async move { transport.execute(Command::Get(schedule_path)).await })
        };

        let enable = enable_fut.await?.as_bool().unwrap_or(false);

        let mut surviving: Vec<(DistributionKind, Value)> = Vec::new();
        for (dk, handle) in handles {
            match handle.await.expect("distribution read task panicked") {
                Ok(value) => surviving.push((dk, value)),
                Err(TransportError::NotValid) => {
                    trace!("{}: distribution {:?} not set", self.base_path, dk)
                }
                Err(e) => return Err(e.into()),
            }
        }

        let schedule_response = match schedule_handle.await.expect("schedule read task panicked") {
            Ok(v) => Some(v),
            Err(TransportError::NotValid) => None,
            Err(e) => return Err(e.into()),
        };

        let corruption_type = if self.kind == ImpairmentKind::Corruption {
            let path = format!("{}/corruption_type", self.base_path);
            match self.transport.execute(Command::Get(path)).await {
                Ok(v) => v.as_str().and_then(CorruptionType::parse),
                Err(TransportError::NotValid) => None,
                Err(e) => return Err(e.into()),
            }
        } else {
            None
        };

        let current_distribution = if surviving.is_empty() {
            None
        } else if surviving.len() == 1 {
            let (dk, params) = &surviving[0];
            Some(Distribution::load_from_response(*dk, params, schedule_response.as_ref())?)
        } else {
            debug!(
                "{}: {} distributions responded, no timestamp to break the tie; taking allowed-set order",
                self.base_path,
                surviving.len()
            );
            let (dk, params) = allowed
                .iter()
                .find_map(|dk| surviving.iter().find(|(k, _)| k == dk).map(|(_, p)| (*dk, p)))
                .expect("surviving is non-empty and drawn from allowed");
            Some(Distribution::load_from_response(dk, params, schedule_response.as_ref())?)
        };

        Ok(ImpairmentConfig { enable, current_distribution, corruption_type })
    }

    /// Apply `config`'s distribution as one atomic batch. Does not touch `enable`.
    pub async fn set(&self, config: &ImpairmentConfig) -> Result<(), CoreError> {
        let distribution = config
            .current_distribution
            .as_ref()
            .ok_or(CoreError::DistributionNotSet(self.kind))?;

        if !self.kind.allows(distribution.kind()) {
            return Err(CoreError::InvalidDistribution {
                impairment: self.kind,
                distribution: distribution.kind(),
                allowed: self.kind.allowed_distributions(),
            });
        }

        let tokens: Vec<CommandToken> = distribution.emit_apply(&self.base_path);
        self.transport.apply(tokens).await?;
        Ok(())
    }

    async fn set_enable(&self, enable: bool) -> Result<(), CoreError> {
        let path = format!("{}/enable", self.base_path);
        self.transport.execute(Command::Set(path, Value::Bool(enable))).await?;
        Ok(())
    }

    /// Apply `config` (if given) then enable. Distribution is written before `enable`.
    pub async fn start(&self, config: Option<&ImpairmentConfig>) -> Result<(), CoreError> {
        if let Some(config) = config {
            self.set(config).await?;
        }
        self.set_enable(true).await
    }

    /// Disable, leaving the on-device distribution untouched.
    pub async fn stop(&self) -> Result<(), CoreError> {
        self.set_enable(false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_transport::MockTransport;

    fn manager(transport: Arc<MockTransport>) -> ImpairmentManager {
        ImpairmentManager::new(transport, "tester/0/module/0/port/0/flow/0", ImpairmentKind::Drop)
    }

    #[tokio::test]
    async fn get_skips_not_valid_and_returns_none_when_nothing_set() {
        let transport = Arc::new(MockTransport::new());
        let m = manager(transport);
        let config = m.get().await.unwrap();
        assert!(config.current_distribution.is_none());
        assert!(!config.enable);
    }

    #[tokio::test]
    async fn set_rejects_distribution_outside_allowed_set() {
        let transport = Arc::new(MockTransport::new());
        let m = manager(transport);
        let mut config = ImpairmentConfig::disabled();
        config.current_distribution =
            Some(Distribution::Gaussian { mean: 1, std_dev: 1, schedule: Schedule { duration: 1, period: 0 } });
        // Gaussian is allowed on Drop; rebuild with Misordering which disallows it.
        let m2 = ImpairmentManager::new(m.transport.clone(), "t/0/m/0/p/0/f/0", ImpairmentKind::Misordering);
        let err = m2.set(&config).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidDistribution { .. }));
    }

    #[tokio::test]
    async fn set_then_get_round_trips_single_distribution() {
        let transport = Arc::new(MockTransport::new());
        let m = manager(transport);
        let mut config = ImpairmentConfig::disabled();
        config.current_distribution =
            Some(Distribution::FixedBurst { burst_size: 5, schedule: Schedule { duration: 1, period: 5 } });
        m.set(&config).await.unwrap();
        let read_back = m.get().await.unwrap();
        assert_eq!(read_back.current_distribution, config.current_distribution);
    }

    #[tokio::test]
    async fn start_then_stop_toggles_enable_without_clearing_distribution() {
        let transport = Arc::new(MockTransport::new());
        let m = manager(transport);
        let mut config = ImpairmentConfig::disabled();
        config.current_distribution =
            Some(Distribution::FixedRate { probability_ppm: 10_000, schedule: Schedule { duration: 1, period: 0 } });
        m.start(Some(&config)).await.unwrap();
        assert!(m.get().await.unwrap().enable);
        m.stop().await.unwrap();
        let after_stop = m.get().await.unwrap();
        assert!(!after_stop.enable);
        assert_eq!(after_stop.current_distribution, config.current_distribution);
    }
}
