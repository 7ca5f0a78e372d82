// chimera-ctl: control-plane SDK for a network-impairment emulator chassis
// Copyright (C) 2026 chimera-ctl contributors
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Tester credentials and the on-disk cache that survives process restarts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ControllerError;

/// Environment variable used to override the on-disk store path.
pub const STORE_PATH_ENV_VAR: &str = "CHIMERA_CTL_STORE_PATH";

/// Which product family a tester's credentials address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Product {
    Valkyrie,
    Chimera,
}

/// Login credentials for one tester. `password` is never logged or included in `Debug`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub product: Product,
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl Credentials {
    /// The id a tester is keyed by: host and port uniquely identify one chassis connection.
    pub fn tester_id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("product", &self.product)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One table's worth of on-disk state for a tester.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTester {
    credentials: Credentials,
}

/// TOML-backed cache of known testers. Loaded once at construction, rewritten in full on every
/// mutation; the only contractual guarantee is that the set of added testers survives restarts.
#[derive(Debug)]
pub struct PersistedStore {
    path: PathBuf,
    testers: HashMap<String, StoredTester>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    tester: HashMap<String, StoredTester>,
}

impl PersistedStore {
    /// Resolve the store path: `CHIMERA_CTL_STORE_PATH` if set, otherwise
    /// `$HOME/.config/chimera-ctl/testers.toml`.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(STORE_PATH_ENV_VAR) {
            return PathBuf::from(path);
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        Path::new(&home).join(".config").join("chimera-ctl").join("testers.toml")
    }

    /// Load the store from `path`, treating a missing file as an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ControllerError> {
        let path = path.into();
        let testers = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let file: StoreFile = toml::from_str(&contents)
                    .map_err(|e| ControllerError::Store(format!("{}: {e}", path.display())))?;
                file.tester
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(ControllerError::Store(format!("{}: {e}", path.display()))),
        };
        Ok(PersistedStore { path, testers })
    }

    fn persist(&self) -> Result<(), ControllerError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ControllerError::Store(format!("{}: {e}", parent.display())))?;
        }
        let file = StoreFile { tester: self.testers.clone() };
        let contents = toml::to_string_pretty(&file)
            .map_err(|e| ControllerError::Store(format!("serializing store: {e}")))?;
        std::fs::write(&self.path, contents)
            .map_err(|e| ControllerError::Store(format!("{}: {e}", self.path.display())))
    }

    pub fn list(&self) -> Vec<(String, Credentials)> {
        self.testers.iter().map(|(id, t)| (id.clone(), t.credentials.clone())).collect()
    }

    pub fn get(&self, tester_id: &str) -> Option<Credentials> {
        self.testers.get(tester_id).map(|t| t.credentials.clone())
    }

    /// Insert or overwrite a tester's credentials, returning whether it was newly added.
    pub fn add(&mut self, credentials: Credentials) -> Result<bool, ControllerError> {
        let id = credentials.tester_id();
        let is_new = !self.testers.contains_key(&id);
        self.testers.insert(id, StoredTester { credentials });
        self.persist()?;
        Ok(is_new)
    }

    pub fn remove(&mut self, tester_id: &str) -> Result<(), ControllerError> {
        self.testers.remove(tester_id);
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Credentials {
        Credentials { product: Product::Chimera, host: "10.20.30.42".into(), port: 22606, password: "secret".into() }
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = std::env::temp_dir().join(format!("chimera-ctl-test-{}", std::process::id()));
        let store = PersistedStore::load(dir.join("does-not-exist.toml")).unwrap();
        assert!(store.list().is_empty());
    }

    #[test]
    fn add_then_reload_round_trips() {
        let dir = std::env::temp_dir().join(format!("chimera-ctl-test-{}-b", std::process::id()));
        let path = dir.join("testers.toml");
        let mut store = PersistedStore::load(&path).unwrap();
        let creds = sample();
        let id = creds.tester_id();
        assert!(store.add(creds.clone()).unwrap());
        let reloaded = PersistedStore::load(&path).unwrap();
        let got = reloaded.get(&id).unwrap();
        assert_eq!(got.host, creds.host);
        assert_eq!(got.port, creds.port);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn remove_drops_the_tester() {
        let dir = std::env::temp_dir().join(format!("chimera-ctl-test-{}-c", std::process::id()));
        let path = dir.join("testers.toml");
        let mut store = PersistedStore::load(&path).unwrap();
        let creds = sample();
        let id = creds.tester_id();
        store.add(creds).unwrap();
        store.remove(&id).unwrap();
        assert!(store.get(&id).is_none());
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn re_adding_the_same_tester_is_not_new() {
        let dir = std::env::temp_dir().join(format!("chimera-ctl-test-{}-d", std::process::id()));
        let path = dir.join("testers.toml");
        let mut store = PersistedStore::load(&path).unwrap();
        let creds = sample();
        assert!(store.add(creds.clone()).unwrap());
        assert!(!store.add(creds).unwrap());
        std::fs::remove_dir_all(dir).ok();
    }
}
