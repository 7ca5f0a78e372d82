//! The three-state reserve/release/relinquish protocol shared by tester/module/port managers.
//! A contended `reserve()` relinquishes in a poll loop before taking the resource; an aggregate
//! reserve can optionally cascade the same relinquish-then-release over its descendants first
//! (tester over its modules, a module over its ports).

use std::sync::Arc;
use std::time::Duration;

use chimera_transport::{Command, Transport, Value};
use log::{debug, warn};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};

use crate::error::CoreError;

/// Poll interval while waiting for a `relinquish` to take effect.
const RELINQUISH_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Ceiling on the relinquish-then-reserve loop.
const RELINQUISH_TIMEOUT: Duration = Duration::from_secs(30);

/// `reservation ∈ {Released, ReservedByYou, ReservedByOther}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Released,
    ReservedByYou,
    ReservedByOther,
}

impl Reservation {
    fn from_wire(value: &Value) -> Result<Reservation, CoreError> {
        match value.as_str() {
            Some("released") => Ok(Reservation::Released),
            Some("reserved_by_you") => Ok(Reservation::ReservedByYou),
            Some("reserved_by_other") => Ok(Reservation::ReservedByOther),
            _ => Err(CoreError::Config("malformed reservation response".into())),
        }
    }

    fn to_wire(self) -> &'static str {
        match self {
            Reservation::Released => "released",
            Reservation::ReservedByYou => "reserved_by_you",
            Reservation::ReservedByOther => "reserved_by_other",
        }
    }
}

/// Owns the reservation bits of one tester/module/port over the transport, and serializes
/// transitions on that resource to one outstanding operation at a time.
#[derive(Debug)]
pub struct ReservationState {
    transport: Arc<dyn Transport>,
    status_path: String,
    resource_path: String,
    lock: Mutex<()>,
}

impl ReservationState {
    pub fn new(transport: Arc<dyn Transport>, resource_path: impl Into<String>) -> Self {
        let resource_path = resource_path.into();
        let status_path = format!("{resource_path}/reservation");
        ReservationState { transport, status_path, resource_path, lock: Mutex::new(()) }
    }

    /// Refresh reservation state from the device.
    pub async fn status(&self) -> Result<Reservation, CoreError> {
        let value = self.transport.execute(Command::Get(self.status_path.clone())).await?;
        Reservation::from_wire(&value)
    }

    async fn send(&self, verb: &str) -> Result<(), CoreError> {
        let action_path = format!("{}/reservation/{verb}", self.resource_path);
        self.transport.execute(Command::Set(action_path, Value::Unit)).await?;
        Ok(())
    }

    /// `reserve()`: no-op if already `ReservedByYou`; if `ReservedByOther`, relinquish in a
    /// polling loop until `Released`, then reserve.
    pub async fn reserve(&self) -> Result<(), CoreError> {
        let _guard = self.lock.lock().await;
        match self.status().await? {
            Reservation::ReservedByYou => Ok(()),
            Reservation::Released => self.send("reserve").await,
            Reservation::ReservedByOther => {
                self.relinquish_until_released().await?;
                self.send("reserve").await
            }
        }
    }

    /// `release()`: transitions `ReservedByYou -> Released`; no-op otherwise.
    pub async fn release(&self) -> Result<(), CoreError> {
        let _guard = self.lock.lock().await;
        if self.status().await? != Reservation::ReservedByYou {
            return Ok(());
        }
        self.send("release").await
    }

    /// `relinquish()`: forces a `ReservedByOther` resource back to `Released`. A no-op when the
    /// caller already owns the reservation.
    pub async fn relinquish(&self) -> Result<(), CoreError> {
        let _guard = self.lock.lock().await;
        if self.status().await? == Reservation::ReservedByYou {
            return Ok(());
        }
        self.send("relinquish").await
    }

    /// Poll-relinquish loop used internally by `reserve()` when contended; exposed so aggregate
    /// managers (module/tester) can cascade it across descendants before taking the parent.
    pub async fn relinquish_until_released(&self) -> Result<(), CoreError> {
        let path = self.resource_path.clone();
        timeout(RELINQUISH_TIMEOUT, async {
            loop {
                if self.status().await? == Reservation::Released {
                    return Ok::<(), CoreError>(());
                }
                self.send("relinquish").await?;
                sleep(RELINQUISH_POLL_INTERVAL).await;
            }
        })
        .await
        .map_err(|_| {
            warn!("relinquish of {path} timed out after {RELINQUISH_TIMEOUT:?}");
            CoreError::ReservationTimeout(path.clone())
        })?
    }
}

/// Reserve `self` after first cascading down to `children` when `free_sub_resources` is set:
/// every descendant reserved by another client is relinquished and released before the parent
/// is taken.
pub async fn reserve_cascading(
    this: &ReservationState,
    children: &[&ReservationState],
    free_sub_resources: bool,
) -> Result<(), CoreError> {
    if free_sub_resources {
        for child in children {
            if child.status().await? == Reservation::ReservedByOther {
                debug!("cascading relinquish+release before reserving parent");
                child.relinquish_until_released().await?;
                child.release().await?;
            }
        }
    }
    this.reserve().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_transport::MockTransport;

    fn state(transport: Arc<MockTransport>) -> ReservationState {
        ReservationState::new(transport, "tester/0/module/0/port/0")
    }

    async fn seed(transport: &MockTransport, reservation: Reservation) {
        transport.seed("tester/0/module/0/port/0/reservation", Value::Str(reservation.to_wire().into())).await;
    }

    #[tokio::test]
    async fn reserve_from_released_transitions_to_reserved_by_you() {
        let transport = Arc::new(MockTransport::new());
        seed(&transport, Reservation::Released).await;
        let r = state(transport.clone());
        r.reserve().await.unwrap();
        seed(&transport, Reservation::ReservedByYou).await;
        assert_eq!(r.status().await.unwrap(), Reservation::ReservedByYou);
    }

    #[tokio::test]
    async fn reserve_is_idempotent_when_already_owned() {
        let transport = Arc::new(MockTransport::new());
        seed(&transport, Reservation::ReservedByYou).await;
        let r = state(transport);
        r.reserve().await.unwrap();
        r.reserve().await.unwrap();
    }

    #[tokio::test]
    async fn relinquish_on_reserved_by_you_is_a_no_op() {
        let transport = Arc::new(MockTransport::new());
        seed(&transport, Reservation::ReservedByYou).await;
        let r = state(transport.clone());
        r.relinquish().await.unwrap();
        assert_eq!(r.status().await.unwrap(), Reservation::ReservedByYou);
    }

    #[tokio::test]
    async fn reserve_release_round_trip_returns_to_released() {
        let transport = Arc::new(MockTransport::new());
        seed(&transport, Reservation::Released).await;
        let r = state(transport.clone());
        r.reserve().await.unwrap();
        seed(&transport, Reservation::ReservedByYou).await;
        r.release().await.unwrap();
        seed(&transport, Reservation::Released).await;
        assert_eq!(r.status().await.unwrap(), Reservation::Released);
    }

    #[tokio::test]
    async fn reserve_contended_by_other_relinquishes_then_reserves() {
        let transport = Arc::new(MockTransport::new());
        seed(&transport, Reservation::ReservedByOther).await;
        let r = state(transport.clone());
        // flip to Released after the first relinquish so the poll loop exits promptly.
        let flip = {
            let transport = transport.clone();
            tokio::spawn(async move {
                sleep(RELINQUISH_POLL_INTERVAL * 2).await;
                seed(&transport, Reservation::Released).await;
            })
        };
        r.reserve().await.unwrap();
        flip.await.unwrap();
    }
}
