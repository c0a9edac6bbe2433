//! In-memory store backend.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::StoreError;
use crate::store::{parse_output_target, Missing, Store};

#[derive(Default)]
struct Inner {
    valid: BTreeSet<String>,
    /// Derivation path -> output name -> output path.
    derivations: BTreeMap<String, BTreeMap<String, String>>,
    failing: BTreeSet<String>,
    builds: Vec<BTreeSet<String>>,
}

/// A store backend held entirely in memory.
///
/// Building a derivation output marks its output path valid. Every build
/// request is recorded so callers can check what was asked for.
///
/// # Example
///
/// ```rust
/// use std::collections::BTreeSet;
/// use ioexec_host::{MemoryStore, Store};
///
/// let store = MemoryStore::new();
/// store.add_derivation("/store/abc-lib.drv", &[("out", "/store/abc-lib")]);
///
/// assert!(!store.is_valid_path("/store/abc-lib").unwrap());
/// let targets = BTreeSet::from(["/store/abc-lib.drv!out".to_string()]);
/// store.build_paths(&targets).unwrap();
/// assert!(store.is_valid_path("/store/abc-lib").unwrap());
/// ```
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a path that already exists.
    pub fn add_path(&self, path: impl Into<String>) {
        self.lock().valid.insert(path.into());
    }

    /// Register a derivation. The derivation itself becomes valid; its
    /// outputs become valid once built.
    pub fn add_derivation(&self, drv_path: impl Into<String>, outputs: &[(&str, &str)]) {
        let drv_path = drv_path.into();
        let mut inner = self.lock();
        inner.valid.insert(drv_path.clone());
        inner.derivations.insert(
            drv_path,
            outputs
                .iter()
                .map(|(name, path)| (name.to_string(), path.to_string()))
                .collect(),
        );
    }

    /// Make every build request that includes `drv_path` fail.
    pub fn fail_builds_of(&self, drv_path: impl Into<String>) {
        self.lock().failing.insert(drv_path.into());
    }

    /// All build requests received so far, in order.
    pub fn build_requests(&self) -> Vec<BTreeSet<String>> {
        self.lock().builds.clone()
    }
}

impl Store for MemoryStore {
    fn is_valid_path(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.lock().valid.contains(path))
    }

    fn query_missing(&self, paths: &BTreeSet<String>) -> Result<Missing, StoreError> {
        let inner = self.lock();
        let mut missing = Missing::default();
        for target in paths {
            let output = parse_output_target(target).and_then(|(drv, output)| {
                inner
                    .derivations
                    .get(drv)
                    .map(|outputs| (drv, outputs.get(output)))
            });
            match output {
                Some((drv, Some(out_path))) => {
                    if !inner.valid.contains(out_path) {
                        missing.will_build.insert(drv.to_string());
                    }
                }
                _ => {
                    missing.unknown.insert(target.clone());
                }
            }
        }
        Ok(missing)
    }

    fn build_paths(&self, paths: &BTreeSet<String>) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.builds.push(paths.clone());

        let mut outputs = Vec::new();
        for target in paths {
            let (drv, output) =
                parse_output_target(target).unwrap_or((target.as_str(), "out"));
            if inner.failing.contains(drv) {
                return Err(StoreError::BuildFailed {
                    path: drv.to_string(),
                    message: "builder failed with exit code 1".to_string(),
                });
            }
            let out_path = inner
                .derivations
                .get(drv)
                .and_then(|outputs| outputs.get(output))
                .ok_or_else(|| StoreError::Other {
                    message: format!("don't know how to build `{}'", target),
                })?;
            outputs.push(out_path.clone());
        }

        inner.valid.extend(outputs);
        Ok(())
    }
}
