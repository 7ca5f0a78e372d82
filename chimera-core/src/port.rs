//! Port-scoped configuration, the flow array, and custom distribution tables.

use std::sync::Arc;

use chimera_transport::{Command, CommandToken, Transport, Value};

use crate::custom_distribution::CustomDistributionManager;
use crate::error::CoreError;
use crate::flow::{FlowManagerContainer, FLOWS_PER_PORT};
use crate::reservation::ReservationState;

/// Link-flap injection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkFlapConfig {
    pub enable: bool,
    pub duration: u32,
    pub period: u32,
    pub repetition: u32,
}

/// PMA error-pulse injection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmaErrorPulseConfig {
    pub enable: bool,
    pub duration: u32,
    pub period: u32,
    pub repetition: u32,
    pub coeff: u32,
    pub exp: u32,
}

/// Whether the port emulates impairments at all (master switch, distinct from any one flow's
/// `enable`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmulateAction {
    On,
    Off,
}

impl EmulateAction {
    fn as_str(&self) -> &'static str {
        match self {
            EmulateAction::On => "on",
            EmulateAction::Off => "off",
        }
    }

    fn parse(s: &str) -> Option<EmulateAction> {
        match s {
            "on" => Some(EmulateAction::On),
            "off" => Some(EmulateAction::Off),
            _ => None,
        }
    }
}

/// Autonegotiation master switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutonegSelection {
    On,
    Off,
}

impl AutonegSelection {
    fn as_str(&self) -> &'static str {
        match self {
            AutonegSelection::On => "on",
            AutonegSelection::Off => "off",
        }
    }

    fn parse(s: &str) -> Option<AutonegSelection> {
        match s {
            "on" => Some(AutonegSelection::On),
            "off" => Some(AutonegSelection::Off),
            _ => None,
        }
    }
}

/// Which TPLD identification mode the port's flows classify against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpldMode {
    Normal,
    Extended,
}

impl TpldMode {
    fn as_str(&self) -> &'static str {
        match self {
            TpldMode::Normal => "normal",
            TpldMode::Extended => "extended",
        }
    }

    fn parse(s: &str) -> Option<TpldMode> {
        match s {
            "normal" => Some(TpldMode::Normal),
            "extended" => Some(TpldMode::Extended),
            _ => None,
        }
    }
}

/// A port's whole configuration, excluding the flows and custom distributions which are
/// addressed independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfigFields {
    pub enable_tx: bool,
    pub autoneg_selection: AutonegSelection,
    pub emulate: EmulateAction,
    pub tpld_mode: TpldMode,
    pub fcs_error_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConfig {
    pub comment: String,
    pub fields: PortConfigFields,
    pub link_flap: LinkFlapConfig,
    pub pma_error_pulse: PmaErrorPulseConfig,
}

/// Reads/writes `PortConfig`. `set()` rejects `link_flap` and `pma_error_pulse` both being
/// enabled at once, checked before any command is sent.
pub struct PortConfigurator {
    transport: Arc<dyn Transport>,
    base_path: String,
}

impl PortConfigurator {
    fn new(transport: Arc<dyn Transport>, base_path: String) -> Self {
        PortConfigurator { transport, base_path }
    }

    fn comment_path(&self) -> String {
        format!("{}/comment", self.base_path)
    }

    fn tx_enable_path(&self) -> String {
        format!("{}/tx_enable", self.base_path)
    }

    fn autoneg_selection_path(&self) -> String {
        format!("{}/autoneg_selection", self.base_path)
    }

    fn link_flap_enable_path(&self) -> String {
        format!("{}/pcs_pma/link_flap/enable", self.base_path)
    }

    fn link_flap_params_path(&self) -> String {
        format!("{}/pcs_pma/link_flap/params", self.base_path)
    }

    fn pma_error_pulse_enable_path(&self) -> String {
        format!("{}/pcs_pma/pma_pulse_err_inj/enable", self.base_path)
    }

    fn pma_error_pulse_params_path(&self) -> String {
        format!("{}/pcs_pma/pma_pulse_err_inj/params", self.base_path)
    }

    fn emulate_path(&self) -> String {
        format!("{}/emulate", self.base_path)
    }

    fn tpld_mode_path(&self) -> String {
        format!("{}/emulation/tpld_mode", self.base_path)
    }

    fn fcs_error_mode_path(&self) -> String {
        format!("{}/emulation/drop_fcs_errors", self.base_path)
    }

    /// Fan out one read per field, reconstructing the config from all of them at once.
    pub async fn get(&self) -> Result<PortConfig, CoreError> {
        let (
            comment,
            enable_tx,
            autoneg_selection,
            link_flap_enable,
            link_flap_params,
            pulse_enable,
            pulse_params,
            emulate,
            tpld_mode,
            fcs_error_mode,
        ) = tokio::try_join!(
            self.transport.execute(Command::Get(self.comment_path())),
            self.transport.execute(Command::Get(self.tx_enable_path())),
            self.transport.execute(Command::Get(self.autoneg_selection_path())),
            self.transport.execute(Command::Get(self.link_flap_enable_path())),
            self.transport.execute(Command::Get(self.link_flap_params_path())),
            self.transport.execute(Command::Get(self.pma_error_pulse_enable_path())),
            self.transport.execute(Command::Get(self.pma_error_pulse_params_path())),
            self.transport.execute(Command::Get(self.emulate_path())),
            self.transport.execute(Command::Get(self.tpld_mode_path())),
            self.transport.execute(Command::Get(self.fcs_error_mode_path())),
        )?;

        let link_flap_fields = link_flap_params
            .as_list()
            .ok_or_else(|| CoreError::Config("malformed link_flap params response".into()))?;
        let [duration, period, repetition] = link_flap_fields else {
            return Err(CoreError::Config("expected 3 link_flap params".into()));
        };
        let link_flap = LinkFlapConfig {
            enable: link_flap_enable.as_bool().unwrap_or(false),
            duration: duration.as_u32().ok_or_else(|| CoreError::Config("bad link_flap duration".into()))?,
            period: period.as_u32().ok_or_else(|| CoreError::Config("bad link_flap period".into()))?,
            repetition: repetition.as_u32().ok_or_else(|| CoreError::Config("bad link_flap repetition".into()))?,
        };

        let pulse_fields = pulse_params
            .as_list()
            .ok_or_else(|| CoreError::Config("malformed pma_error_pulse params response".into()))?;
        let [duration, period, repetition, coeff, exp] = pulse_fields else {
            return Err(CoreError::Config("expected 5 pma_error_pulse params".into()));
        };
        let pma_error_pulse = PmaErrorPulseConfig {
            enable: pulse_enable.as_bool().unwrap_or(false),
            duration: duration.as_u32().ok_or_else(|| CoreError::Config("bad pulse duration".into()))?,
            period: period.as_u32().ok_or_else(|| CoreError::Config("bad pulse period".into()))?,
            repetition: repetition.as_u32().ok_or_else(|| CoreError::Config("bad pulse repetition".into()))?,
            coeff: coeff.as_u32().ok_or_else(|| CoreError::Config("bad pulse coeff".into()))?,
            exp: exp.as_u32().ok_or_else(|| CoreError::Config("bad pulse exp".into()))?,
        };

        let fields = PortConfigFields {
            enable_tx: enable_tx.as_bool().unwrap_or(false),
            autoneg_selection: autoneg_selection
                .as_str()
                .and_then(AutonegSelection::parse)
                .ok_or_else(|| CoreError::Config("bad autoneg_selection".into()))?,
            emulate: emulate.as_str().and_then(EmulateAction::parse).ok_or_else(|| CoreError::Config("bad emulate".into()))?,
            tpld_mode: tpld_mode
                .as_str()
                .and_then(TpldMode::parse)
                .ok_or_else(|| CoreError::Config("bad tpld_mode".into()))?,
            fcs_error_mode: fcs_error_mode.as_bool().unwrap_or(false),
        };

        Ok(PortConfig { comment: comment.as_str().unwrap_or_default().to_owned(), fields, link_flap, pma_error_pulse })
    }

    /// Write the whole config as one atomic batch. Rejects a config with both `link_flap`
    /// and `pma_error_pulse` enabled before issuing any command.
    pub async fn set(&self, config: &PortConfig) -> Result<(), CoreError> {
        if config.link_flap.enable && config.pma_error_pulse.enable {
            return Err(CoreError::LinkFlapAndPmaErrorPulseConflict);
        }

        let tokens = vec![
            CommandToken::set("comment", self.comment_path(), Value::Str(config.comment.clone())),
            CommandToken::set("tx_enable", self.tx_enable_path(), Value::Bool(config.fields.enable_tx)),
            CommandToken::set(
                "autoneg_selection",
                self.autoneg_selection_path(),
                Value::Str(config.fields.autoneg_selection.as_str().into()),
            ),
            CommandToken::set("link_flap.enable", self.link_flap_enable_path(), Value::Bool(config.link_flap.enable)),
            CommandToken::set(
                "link_flap.params",
                self.link_flap_params_path(),
                Value::List(vec![
                    Value::U32(config.link_flap.duration),
                    Value::U32(config.link_flap.period),
                    Value::U32(config.link_flap.repetition),
                ]),
            ),
            CommandToken::set(
                "pma_error_pulse.enable",
                self.pma_error_pulse_enable_path(),
                Value::Bool(config.pma_error_pulse.enable),
            ),
            CommandToken::set(
                "pma_error_pulse.params",
                self.pma_error_pulse_params_path(),
                Value::List(vec![
                    Value::U32(config.pma_error_pulse.duration),
                    Value::U32(config.pma_error_pulse.period),
                    Value::U32(config.pma_error_pulse.repetition),
                    Value::U32(config.pma_error_pulse.coeff),
                    Value::U32(config.pma_error_pulse.exp),
                ]),
            ),
            CommandToken::set("emulate", self.emulate_path(), Value::Str(config.fields.emulate.as_str().into())),
            CommandToken::set("tpld_mode", self.tpld_mode_path(), Value::Str(config.fields.tpld_mode.as_str().into())),
            CommandToken::set("fcs_error_mode", self.fcs_error_mode_path(), Value::Bool(config.fields.fcs_error_mode)),
        ];
        self.transport.apply(tokens).await?;
        Ok(())
    }
}

/// One port: its configuration, reservation state, custom distribution tables, and 8 flows.
pub struct PortManager {
    pub config: PortConfigurator,
    pub reservation: ReservationState,
    pub custom_distributions: CustomDistributionManager,
    pub flows: FlowManagerContainer,
}

impl PortManager {
    pub(crate) fn new(transport: Arc<dyn Transport>, module_path: impl Into<String>, port_id: u32) -> Self {
        let base_path = format!("{}/port/{port_id}", module_path.into());
        PortManager {
            config: PortConfigurator::new(Arc::clone(&transport), base_path.clone()),
            reservation: ReservationState::new(Arc::clone(&transport), base_path.clone()),
            custom_distributions: CustomDistributionManager::new(Arc::clone(&transport), base_path.clone()),
            flows: FlowManagerContainer::new(transport, base_path),
        }
    }

    pub fn flow_count(&self) -> usize {
        FLOWS_PER_PORT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_transport::MockTransport;

    fn sample_config() -> PortConfig {
        PortConfig {
            comment: "uplink".into(),
            fields: PortConfigFields {
                enable_tx: true,
                autoneg_selection: AutonegSelection::On,
                emulate: EmulateAction::On,
                tpld_mode: TpldMode::Normal,
                fcs_error_mode: false,
            },
            link_flap: LinkFlapConfig { enable: false, duration: 0, period: 0, repetition: 0 },
            pma_error_pulse: PmaErrorPulseConfig { enable: false, duration: 0, period: 0, repetition: 0, coeff: 0, exp: 0 },
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let transport = Arc::new(MockTransport::new());
        let port = PortManager::new(transport, "t/0/module/0", 1);
        let config = sample_config();
        port.config.set(&config).await.unwrap();
        assert_eq!(port.config.get().await.unwrap(), config);
    }

    #[tokio::test]
    async fn set_rejects_link_flap_and_pma_pulse_both_enabled() {
        let transport = Arc::new(MockTransport::new());
        let port = PortManager::new(transport, "t/0/module/0", 1);
        let mut config = sample_config();
        config.link_flap.enable = true;
        config.pma_error_pulse.enable = true;
        let err = port.config.set(&config).await.unwrap_err();
        assert!(matches!(err, CoreError::LinkFlapAndPmaErrorPulseConflict));
    }

    #[tokio::test]
    async fn exposes_eight_independently_addressable_flows() {
        let transport = Arc::new(MockTransport::new());
        let port = PortManager::new(transport, "t/0/module/0", 1);
        assert_eq!(port.flow_count(), 8);
        port.flows[2].set_comment("vlan20").await.unwrap();
        assert_eq!(port.flows[2].get_comment().await.unwrap(), "vlan20");
    }
}
