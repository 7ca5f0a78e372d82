use chimera_transport::TransportError;
use thiserror::Error;

use crate::distribution::{DistributionError, DistributionKind};
use crate::impairment::ImpairmentKind;

/// Crate-wide error type. Configuration errors are returned before any I/O, transport errors
/// propagate as-is, and reservation contention is retried internally rather than surfaced
/// (see [`crate::reservation`]).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error("{distribution:?} is not allowed on {impairment:?}; allowed: {allowed:?}")]
    InvalidDistribution { impairment: ImpairmentKind, distribution: DistributionKind, allowed: &'static [DistributionKind] },

    #[error("{0:?} has no distribution configured; call set() before start()")]
    DistributionNotSet(ImpairmentKind),

    #[error("link flap and PMA error pulse cannot both be enabled on the same port")]
    LinkFlapAndPmaErrorPulseConflict,

    #[error("resource {resource} is not a {expected} (InvalidResourceKind)")]
    InvalidResourceKind { resource: String, expected: &'static str },

    #[error("reservation of {0} timed out waiting for the current holder to release")]
    ReservationTimeout(String),

    #[error("{0} is reserved by another client")]
    ReservedByOther(String),

    #[error("shadow filter is not in {0} mode")]
    WrongFilterMode(&'static str),

    #[error("config store error: {0}")]
    Config(String),
}
