//! Store backend over the local filesystem.

use std::collections::BTreeSet;
use std::path::Path;

use crate::error::StoreError;
use crate::store::{Missing, Store};

/// A store where a path is valid when it exists on disk.
///
/// There is no builder behind this store: requests to build derivation
/// outputs fail. Programs that only refer to existing files never need one.
#[derive(Debug, Default, Clone)]
pub struct LocalStore;

impl LocalStore {
    pub fn new() -> Self {
        Self
    }
}

impl Store for LocalStore {
    fn is_valid_path(&self, path: &str) -> Result<bool, StoreError> {
        let valid = Path::new(path).exists();
        tracing::debug!(path, valid, "checked local path");
        Ok(valid)
    }

    fn query_missing(&self, paths: &BTreeSet<String>) -> Result<Missing, StoreError> {
        Ok(Missing {
            unknown: paths.clone(),
            ..Missing::default()
        })
    }

    fn build_paths(&self, paths: &BTreeSet<String>) -> Result<(), StoreError> {
        match paths.iter().next() {
            None => Ok(()),
            Some(first) => Err(StoreError::BuildFailed {
                path: first.clone(),
                message: "the local store has no builder".to_string(),
            }),
        }
    }
}
