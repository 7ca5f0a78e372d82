//! Aggregates one shadow filter and the eight named impairments for one flow, all built from
//! the same resource handle.

use std::sync::Arc;

use chimera_transport::{Command, Transport, Value};

use crate::error::CoreError;
use crate::filter::ShadowFilterManager;
use crate::impairment::{ImpairmentKind, ImpairmentManager};
use crate::policer_shaper::{BandwidthControlKind, PolicerShaperManager};

/// Index of a flow within its owning port: 0..7.
pub const FLOWS_PER_PORT: usize = 8;

/// One of a port's eight classification+impairment pipelines. Bundles the shadow
/// filter and all eight impairments; its own `get`/`set` only touch the flow comment.
pub struct FlowManager {
    transport: Arc<dyn Transport>,
    base_path: String,
    pub shadow_filter: ShadowFilterManager,
    pub drop: ImpairmentManager,
    pub misordering: ImpairmentManager,
    pub latency_jitter: ImpairmentManager,
    pub duplication: ImpairmentManager,
    pub corruption: ImpairmentManager,
    pub policer: PolicerShaperManager,
    pub shaper: PolicerShaperManager,
}

impl FlowManager {
    pub fn new(transport: Arc<dyn Transport>, port_path: impl Into<String>, flow_index: usize) -> Self {
        let base_path = format!("{}/flow/{flow_index}", port_path.into());
        FlowManager {
            shadow_filter: ShadowFilterManager::new(Arc::clone(&transport), base_path.clone()),
            drop: ImpairmentManager::new(Arc::clone(&transport), base_path.clone(), ImpairmentKind::Drop),
            misordering: ImpairmentManager::new(Arc::clone(&transport), base_path.clone(), ImpairmentKind::Misordering),
            latency_jitter: ImpairmentManager::new(Arc::clone(&transport), base_path.clone(), ImpairmentKind::LatencyJitter),
            duplication: ImpairmentManager::new(Arc::clone(&transport), base_path.clone(), ImpairmentKind::Duplication),
            corruption: ImpairmentManager::new(Arc::clone(&transport), base_path.clone(), ImpairmentKind::Corruption),
            policer: PolicerShaperManager::new(Arc::clone(&transport), base_path.clone(), BandwidthControlKind::Policer),
            shaper: PolicerShaperManager::new(Arc::clone(&transport), base_path.clone(), BandwidthControlKind::Shaper),
            transport,
            base_path,
        }
    }

    fn comment_path(&self) -> String {
        format!("{}/comment", self.base_path)
    }

    /// The flow's own comment; `get`/`set` operate only on this.
    pub async fn get_comment(&self) -> Result<String, CoreError> {
        let value = self.transport.execute(Command::Get(self.comment_path())).await?;
        Ok(value.as_str().unwrap_or_default().to_owned())
    }

    pub async fn set_comment(&self, comment: impl Into<String>) -> Result<(), CoreError> {
        self.transport.execute(Command::Set(self.comment_path(), Value::Str(comment.into()))).await?;
        Ok(())
    }
}

/// Fixed-size container for the eight flows owned by one port.
pub struct FlowManagerContainer {
    flows: Vec<FlowManager>,
}

impl FlowManagerContainer {
    pub(crate) fn new(transport: Arc<dyn Transport>, port_path: impl Into<String>) -> Self {
        let port_path = port_path.into();
        let flows = (0..FLOWS_PER_PORT).map(|i| FlowManager::new(Arc::clone(&transport), port_path.clone(), i)).collect();
        FlowManagerContainer { flows }
    }

    pub fn get(&self, index: usize) -> Option<&FlowManager> {
        self.flows.get(index)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlowManager> {
        self.flows.iter()
    }
}

impl std::ops::Index<usize> for FlowManagerContainer {
    type Output = FlowManager;

    fn index(&self, index: usize) -> &FlowManager {
        &self.flows[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_transport::MockTransport;

    #[tokio::test]
    async fn comment_round_trips() {
        let transport = Arc::new(MockTransport::new());
        let flow = FlowManager::new(transport, "t/0/m/0/p/0", 3);
        flow.set_comment("test flow").await.unwrap();
        assert_eq!(flow.get_comment().await.unwrap(), "test flow");
    }

    #[tokio::test]
    async fn container_exposes_eight_independent_flows() {
        let transport = Arc::new(MockTransport::new());
        let flows = FlowManagerContainer::new(transport, "t/0/m/0/p/0");
        assert_eq!(flows.len(), FLOWS_PER_PORT);
        flows[0].set_comment("a").await.unwrap();
        flows[1].set_comment("b").await.unwrap();
        assert_eq!(flows[0].get_comment().await.unwrap(), "a");
        assert_eq!(flows[1].get_comment().await.unwrap(), "b");
    }
}
