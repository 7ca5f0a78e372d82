//! Chassis-level entry point: obtains modules and ports by id, validating the resource kind
//! before handing out a manager.

use std::sync::Arc;

use chimera_transport::{Command, Transport};

use crate::error::CoreError;
use crate::module::ModuleManager;
use crate::port::PortManager;
use crate::reservation::ReservationState;

/// One chassis. `use_module`/`use_port` are the only way callers reach module/port managers;
/// both optionally reserve the resource before returning it.
pub struct TesterManager {
    transport: Arc<dyn Transport>,
    base_path: String,
    pub reservation: ReservationState,
}

impl TesterManager {
    pub fn new(transport: Arc<dyn Transport>, tester_path: impl Into<String>) -> Self {
        let base_path = tester_path.into();
        TesterManager { reservation: ReservationState::new(Arc::clone(&transport), base_path.clone()), transport, base_path }
    }

    fn module_kind_path(&self, module_id: u32) -> String {
        format!("{}/module/{module_id}/kind", self.base_path)
    }

    /// Obtain the Chimera module `module_id`, optionally reserving it. Rejects modules that are
    /// not Chimera-capable.
    pub async fn use_module(&self, module_id: u32, reserve: bool) -> Result<ModuleManager, CoreError> {
        let kind = self.transport.execute(Command::Get(self.module_kind_path(module_id))).await?;
        if kind.as_str() != Some("chimera") {
            return Err(CoreError::InvalidResourceKind {
                resource: format!("{}/module/{module_id}", self.base_path),
                expected: "chimera module",
            });
        }
        let module = ModuleManager::new(Arc::clone(&self.transport), self.base_path.clone(), module_id);
        if reserve {
            module.reservation.reserve().await?;
        }
        Ok(module)
    }

    /// Obtain a port through its owning module in one call.
    pub async fn use_port(&self, module_id: u32, port_id: u32, reserve: bool) -> Result<PortManager, CoreError> {
        let module = self.use_module(module_id, false).await?;
        module.use_port(port_id, reserve).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_transport::{MockTransport, Value};

    #[tokio::test]
    async fn use_module_rejects_non_chimera_modules() {
        let transport = Arc::new(MockTransport::new());
        transport.seed("t/0/module/5/kind", Value::Str("l23".into())).await;
        let tester = TesterManager::new(transport, "t/0");
        let err = tester.use_module(5, false).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidResourceKind { .. }));
    }

    #[tokio::test]
    async fn use_port_reaches_through_the_owning_module() {
        let transport = Arc::new(MockTransport::new());
        transport.seed("t/0/module/2/kind", Value::Str("chimera".into())).await;
        transport.seed("t/0/module/2/port/4/kind", Value::Str("chimera".into())).await;
        let tester = TesterManager::new(transport, "t/0");
        let port = tester.use_port(2, 4, false).await.unwrap();
        port.flows[0].set_comment("hello").await.unwrap();
        assert_eq!(port.flows[0].get_comment().await.unwrap(), "hello");
    }
}
