//! The content-addressed store backend interface.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::StoreError;

/// What a build request would do, as reported by `Store::query_missing`.
///
/// Advisory only: the realizer uses it to batch work, never to decide
/// correctness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Missing {
    pub will_build: BTreeSet<String>,
    pub will_substitute: BTreeSet<String>,
    pub unknown: BTreeSet<String>,
    pub download_size: u64,
    pub nar_size: u64,
}

/// The build/store backend consumed by context realization.
///
/// Paths passed to `query_missing` and `build_paths` name derivation
/// outputs as `DRV_PATH!OUTPUT`.
///
/// # Object Safety
///
/// This trait is object-safe: the evaluator holds an `Arc<dyn Store>`.
pub trait Store: Send + Sync {
    /// Whether `path` exists in the store.
    fn is_valid_path(&self, path: &str) -> Result<bool, StoreError>;

    /// Probe what building `paths` would involve.
    fn query_missing(&self, paths: &BTreeSet<String>) -> Result<Missing, StoreError>;

    /// Build or substitute all of `paths`. All-or-nothing.
    fn build_paths(&self, paths: &BTreeSet<String>) -> Result<(), StoreError>;
}

// Blanket implementations for smart pointers

impl<T: Store + ?Sized> Store for Arc<T> {
    fn is_valid_path(&self, path: &str) -> Result<bool, StoreError> {
        self.as_ref().is_valid_path(path)
    }

    fn query_missing(&self, paths: &BTreeSet<String>) -> Result<Missing, StoreError> {
        self.as_ref().query_missing(paths)
    }

    fn build_paths(&self, paths: &BTreeSet<String>) -> Result<(), StoreError> {
        self.as_ref().build_paths(paths)
    }
}

impl<T: Store + ?Sized> Store for Box<T> {
    fn is_valid_path(&self, path: &str) -> Result<bool, StoreError> {
        self.as_ref().is_valid_path(path)
    }

    fn query_missing(&self, paths: &BTreeSet<String>) -> Result<Missing, StoreError> {
        self.as_ref().query_missing(paths)
    }

    fn build_paths(&self, paths: &BTreeSet<String>) -> Result<(), StoreError> {
        self.as_ref().build_paths(paths)
    }
}

/// Split a `DRV_PATH!OUTPUT` build target.
pub fn parse_output_target(target: &str) -> Option<(&str, &str)> {
    target.split_once('!')
}
