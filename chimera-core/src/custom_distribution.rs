//! Port-scoped custom distribution tables, index 1..40.

use std::sync::Arc;

use chimera_transport::{Command, CommandToken, Transport, Value};

use crate::error::CoreError;

/// Which table a custom distribution entry is shaped for; fixes `entry_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomDistributionType {
    PacketSpacing,
    Latency,
}

impl CustomDistributionType {
    pub fn entry_count(&self) -> u32 {
        match self {
            CustomDistributionType::PacketSpacing => 512,
            CustomDistributionType::Latency => 1024,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            CustomDistributionType::PacketSpacing => "packet_spacing",
            CustomDistributionType::Latency => "latency",
        }
    }

    fn parse(s: &str) -> Option<CustomDistributionType> {
        match s {
            "packet_spacing" => Some(CustomDistributionType::PacketSpacing),
            "latency" => Some(CustomDistributionType::Latency),
            _ => None,
        }
    }
}

/// One user-defined distribution table.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomDistribution {
    pub index: u8,
    pub distribution_type: CustomDistributionType,
    pub linear: bool,
    pub symmetric: bool,
    pub data_x: Vec<u32>,
    pub comment: String,
}

impl CustomDistribution {
    /// Derived from `distribution_type` rather than stored independently: the device computes
    /// it the same way and this keeps the two from drifting apart.
    pub fn entry_count(&self) -> u32 {
        self.distribution_type.entry_count()
    }
}

/// Owns the 1..40 custom distribution slots on one port.
pub struct CustomDistributionManager {
    transport: Arc<dyn Transport>,
    port_path: String,
}

impl CustomDistributionManager {
    pub const MIN_INDEX: u8 = 1;
    pub const MAX_INDEX: u8 = 40;

    pub fn new(transport: Arc<dyn Transport>, port_path: impl Into<String>) -> Self {
        CustomDistributionManager { transport, port_path: port_path.into() }
    }

    fn check_index(index: u8) -> Result<(), CoreError> {
        if (Self::MIN_INDEX..=Self::MAX_INDEX).contains(&index) {
            Ok(())
        } else {
            Err(CoreError::Config(format!("custom distribution index {index} out of range 1..40")))
        }
    }

    fn base_path(&self, index: u8) -> String {
        format!("{}/custom_distribution/{index}", self.port_path)
    }

    pub async fn get(&self, index: u8) -> Result<CustomDistribution, CoreError> {
        Self::check_index(index)?;
        let path = self.base_path(index);
        let value = self.transport.execute(Command::Get(path.clone())).await?;
        let fields = value.as_list().ok_or_else(|| CoreError::Config(format!("{path}: expected a record")))?;
        let [kind, linear, symmetric, data_x, comment] = fields else {
            return Err(CoreError::Config(format!("{path}: expected 5 fields")));
        };
        let distribution_type =
            kind.as_str().and_then(CustomDistributionType::parse).ok_or_else(|| CoreError::Config("bad type".into()))?;
        let linear = linear.as_bool().ok_or_else(|| CoreError::Config("bad linear".into()))?;
        let symmetric = symmetric.as_bool().ok_or_else(|| CoreError::Config("bad symmetric".into()))?;
        let data_x = data_x
            .as_list()
            .ok_or_else(|| CoreError::Config("bad data_x".into()))?
            .iter()
            .map(|v| v.as_u32().ok_or_else(|| CoreError::Config("bad data_x entry".into())))
            .collect::<Result<Vec<_>, _>>()?;
        let comment = comment.as_str().unwrap_or_default().to_owned();
        Ok(CustomDistribution { index, distribution_type, linear, symmetric, data_x, comment })
    }

    pub async fn set(&self, entry: &CustomDistribution) -> Result<(), CoreError> {
        Self::check_index(entry.index)?;
        let expected = entry.entry_count() as usize;
        if entry.data_x.len() != expected {
            return Err(CoreError::Config(format!(
                "custom distribution {}: expected {expected} data points for {:?}, got {}",
                entry.index,
                entry.distribution_type,
                entry.data_x.len()
            )));
        }
        let path = self.base_path(entry.index);
        let record = Value::List(vec![
            Value::Str(entry.distribution_type.as_str().into()),
            Value::Bool(entry.linear),
            Value::Bool(entry.symmetric),
            Value::List(entry.data_x.iter().copied().map(Value::U32).collect()),
            Value::Str(entry.comment.clone()),
        ]);
        self.transport.apply(vec![CommandToken::set("custom_distribution", path, record)]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_transport::MockTransport;

    #[tokio::test]
    async fn set_rejects_index_out_of_range() {
        let transport = Arc::new(MockTransport::new());
        let m = CustomDistributionManager::new(transport, "t/0/m/0/p/0");
        let entry = CustomDistribution {
            index: 41,
            distribution_type: CustomDistributionType::Latency,
            linear: true,
            symmetric: false,
            data_x: vec![0; 1024],
            comment: String::new(),
        };
        assert!(matches!(m.set(&entry).await, Err(CoreError::Config(_))));
    }

    #[tokio::test]
    async fn set_rejects_wrong_entry_count() {
        let transport = Arc::new(MockTransport::new());
        let m = CustomDistributionManager::new(transport, "t/0/m/0/p/0");
        let entry = CustomDistribution {
            index: 1,
            distribution_type: CustomDistributionType::PacketSpacing,
            linear: true,
            symmetric: false,
            data_x: vec![0; 10],
            comment: String::new(),
        };
        assert!(m.set(&entry).await.is_err());
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let transport = Arc::new(MockTransport::new());
        let m = CustomDistributionManager::new(transport, "t/0/m/0/p/0");
        let entry = CustomDistribution {
            index: 12,
            distribution_type: CustomDistributionType::Latency,
            linear: false,
            symmetric: true,
            data_x: vec![1; 1024],
            comment: "burst test".into(),
        };
        m.set(&entry).await.unwrap();
        let got = m.get(12).await.unwrap();
        assert_eq!(got, entry);
    }
}
