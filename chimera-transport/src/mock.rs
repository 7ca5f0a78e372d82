use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{Command, Transport, TransportError, Value};

/// An in-memory stand-in for a chassis connection.
///
/// `get` on a path that was never `set` returns [`TransportError::NotValid`] — the same sentinel
/// the real chassis uses for an unconfigured distribution field — so tests exercise the
/// partial-response fan-out the way production code will. `set` always overwrites; there is no
/// separate shadow/working distinction at this layer, that state lives in `chimera-core`.
#[derive(Debug, Default)]
pub struct MockTransport {
    values: Mutex<HashMap<String, Value>>,
    faults: Mutex<HashMap<String, TransportError>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a transport pre-populated with `entries`, as if a chassis connection had already
    /// reported this state — for callers (e.g. a demo binary) that have no real discovery layer
    /// to populate identity/reservation fields before the engine reads them.
    pub fn seeded(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        MockTransport { values: Mutex::new(entries.into_iter().collect()), faults: Mutex::new(HashMap::new()) }
    }

    /// Seed a field as if the device had previously been configured with this value.
    pub async fn seed(&self, path: impl Into<String>, value: Value) {
        self.values.lock().await.insert(path.into(), value);
    }

    /// Make the next `execute` touching this exact path fail with a scripted error, instead of
    /// resolving normally. Consumed after one use.
    pub async fn fault_once(&self, path: impl Into<String>, err: TransportError) {
        self.faults.lock().await.insert(path.into(), err);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, command: Command) -> Result<Value, TransportError> {
        let path = command.path().to_owned();
        if let Some(err) = self.faults.lock().await.remove(&path) {
            return Err(err);
        }
        match command {
            Command::Get(path) => {
                self.values.lock().await.get(&path).map(Clone::clone).ok_or(TransportError::NotValid)
            }
            Command::Set(path, value) => {
                self.values.lock().await.insert(path, value.clone());
                Ok(value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unset_field_is_not_valid() {
        let t = MockTransport::new();
        let err = t.execute(Command::Get("x".into())).await.unwrap_err();
        assert!(err.is_not_valid());
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let t = MockTransport::new();
        t.execute(Command::Set("x".into(), Value::U32(5))).await.unwrap();
        let got = t.execute(Command::Get("x".into())).await.unwrap();
        assert_eq!(got, Value::U32(5));
    }

    #[tokio::test]
    async fn scripted_fault_fires_once() {
        let t = MockTransport::new();
        t.fault_once("x", TransportError::Connection("down".into())).await;
        assert!(t.execute(Command::Get("x".into())).await.is_err());
        // second call is not affected, still NotValid since nothing was ever set
        assert!(t.execute(Command::Get("x".into())).await.unwrap_err().is_not_valid());
    }
}
