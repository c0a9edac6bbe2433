//! Context realisation.
//!
//! A string coerced from a host value carries the store references it was
//! built from. Before such a string is handed to the OS as a path, every
//! reference must be valid and every derivation output it names must be
//! built.

use std::collections::BTreeSet;

use ioexec_host::{Context, Error, Result, Store};

/// Split a context reference into the store path to validate and, for
/// `!OUTPUT!DRV` references, the build target `DRV!OUTPUT`.
fn decode_reference(reference: &str) -> (&str, Option<String>) {
    match reference
        .strip_prefix('!')
        .and_then(|rest| rest.split_once('!'))
    {
        Some((output, drv)) => (drv, Some(format!("{}!{}", drv, output))),
        None => (reference, None),
    }
}

/// Validate every reference in `context` and build the derivation outputs
/// it names.
///
/// Fails with `Error::InvalidPath` naming the first invalid reference, in
/// which case nothing is built. Build failures propagate unchanged.
pub fn realise_context(store: &dyn Store, context: &Context) -> Result<()> {
    let mut targets = BTreeSet::new();
    for reference in context {
        let (path, target) = decode_reference(reference);
        if !store.is_valid_path(path)? {
            return Err(Error::InvalidPath {
                path: path.to_string(),
                message: format!("path `{}' is not valid", path),
            });
        }
        targets.extend(target);
    }

    if targets.is_empty() {
        return Ok(());
    }

    let missing = store.query_missing(&targets)?;
    tracing::debug!(
        will_build = missing.will_build.len(),
        will_substitute = missing.will_substitute.len(),
        unknown = missing.unknown.len(),
        download_size = missing.download_size,
        nar_size = missing.nar_size,
        "probed context"
    );

    tracing::debug!(targets = ?targets, "building context");
    store.build_paths(&targets)?;
    Ok(())
}
