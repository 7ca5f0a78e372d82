use std::fmt;

use crate::Value;

/// One addressable field on a resource, e.g. `"tester/0/module/2/port/1/flow/3/drop/enable"`.
///
/// The engine builds paths by joining resource indices and field names; the transport treats
/// them as opaque keys. Real wire encodings would map a path to a distinct typed command; here
/// the path *is* the command identity.
pub type FieldPath = String;

/// A single unit of work against the transport: either a read or a write, dispatched by variant
/// and carried in batches.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Get(FieldPath),
    Set(FieldPath, Value),
}

impl Command {
    pub fn path(&self) -> &str {
        match self {
            Command::Get(p) => p,
            Command::Set(p, _) => p,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Get(path) => write!(f, "get {path}"),
            Command::Set(path, value) => write!(f, "set {path} = {value:?}"),
        }
    }
}

/// A `Command` plus the label under which the caller wants to recover its result. Used by
/// fan-out reads that zip a response back to the field it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandToken {
    pub label: String,
    pub command: Command,
}

impl CommandToken {
    pub fn get(label: impl Into<String>, path: impl Into<String>) -> Self {
        CommandToken { label: label.into(), command: Command::Get(path.into()) }
    }

    pub fn set(label: impl Into<String>, path: impl Into<String>, value: impl Into<Value>) -> Self {
        CommandToken { label: label.into(), command: Command::Set(path.into(), value.into()) }
    }
}
