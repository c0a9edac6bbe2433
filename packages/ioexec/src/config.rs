//! Runner configuration and installation metadata.

use std::path::{Path, PathBuf};

/// Configuration for a `Runner`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Annotate errors with the `map`/`join` frames they passed through.
    pub show_trace: bool,
}

/// Build-time installation prefix.
const DEFAULT_PREFIX: &str = match option_env!("IOEXEC_PREFIX") {
    Some(prefix) => prefix,
    None => "/usr/local",
};

/// Where ioexec's data files and bundled native extensions live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    pub prefix: PathBuf,
    pub data_dir: PathBuf,
    pub plugin_dir: PathBuf,
}

impl Installation {
    /// The standard layout under `prefix`.
    pub fn from_prefix(prefix: impl Into<PathBuf>) -> Self {
        let prefix = prefix.into();
        Self {
            data_dir: prefix.join("share").join("ioexec"),
            plugin_dir: prefix.join("lib").join("ioexec"),
            prefix,
        }
    }

    /// The build-time layout, overridden by `IOEXEC_PREFIX`,
    /// `IOEXEC_DATA_DIR` and `IOEXEC_PLUGIN_DIR`.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var_os(name).map(PathBuf::from))
    }

    /// Like `from_env`, reading variables through `lookup`.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<PathBuf>) -> Self {
        let prefix = lookup("IOEXEC_PREFIX").unwrap_or_else(|| PathBuf::from(DEFAULT_PREFIX));
        let mut installation = Self::from_prefix(prefix);
        if let Some(dir) = lookup("IOEXEC_DATA_DIR") {
            installation.data_dir = dir;
        }
        if let Some(dir) = lookup("IOEXEC_PLUGIN_DIR") {
            installation.plugin_dir = dir;
        }
        installation
    }

    /// Path of the bundled extension `name`, e.g. `libioexec_reexec.so`.
    pub fn plugin(&self, name: &str) -> PathBuf {
        self.plugin_dir.join(format!(
            "{}{}{}",
            std::env::consts::DLL_PREFIX,
            name,
            std::env::consts::DLL_SUFFIX
        ))
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }
}

impl Default for Installation {
    fn default() -> Self {
        Self::from_prefix(DEFAULT_PREFIX)
    }
}

/// A `major.minor.patchlevel` version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patchlevel: u32,
}

impl Version {
    /// Parse `MAJOR[.MINOR[.PATCH]]`, ignoring any `-pre`/`+build` suffix.
    pub fn parse(text: &str) -> Option<Self> {
        let core = text
            .split(|c| c == '-' || c == '+')
            .next()
            .unwrap_or_default();
        let mut parts = core.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(part) => part.parse().ok()?,
            None => 0,
        };
        let patchlevel = match parts.next() {
            Some(part) => part.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            major,
            minor,
            patchlevel,
        })
    }

    /// The version of this crate.
    pub fn current() -> Self {
        Self::parse(env!("CARGO_PKG_VERSION")).unwrap_or_default()
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patchlevel)
    }
}
