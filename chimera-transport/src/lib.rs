//! The seam between the impairment engine and the chassis wire protocol.
//!
//! The binary protocol that actually talks to a Xena/Valkyrie/Chimera chassis is out of scope:
//! this crate only defines the [`Transport`] trait the engine drives, the [`Command`]/
//! [`CommandToken`] types it drives it with, and a [`mock::MockTransport`] so the engine's own
//! tests never need real hardware.

mod error;
mod mock;
mod token;
mod value;

pub use error::TransportError;
pub use mock::MockTransport;
pub use token::{Command, CommandToken, FieldPath};
pub use value::Value;

use async_trait::async_trait;

/// A single connection to one tester's command interface.
///
/// Implementations own whatever I/O (socket, SSH session, in-memory fixture) sits behind
/// `execute`. The engine is responsible for fanning commands out concurrently and for
/// distinguishing [`TransportError::NotValid`] from a genuine failure; this trait only needs to
/// execute one command at a time correctly.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, command: Command) -> Result<Value, TransportError>;

    /// Apply a batch of commands as one atomic, ordered unit: aborts and returns the first error
    /// encountered, leaving later tokens unissued. Used where partial application would leave the
    /// device in an incoherent state (e.g. writing a shadow filter's conditional sub-blocks).
    async fn apply(&self, tokens: Vec<CommandToken>) -> Result<Vec<(String, Value)>, TransportError> {
        let mut results = Vec::with_capacity(tokens.len());
        for token in tokens {
            let value = self.execute(token.command).await?;
            results.push((token.label, value));
        }
        Ok(results)
    }
}
