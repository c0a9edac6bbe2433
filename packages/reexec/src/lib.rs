//! Process replacement for ioexec programs.
//!
//! Built as a native extension and reached through `builtins.reexec`:
//!
//! ```text
//! dlopen "<plugindir>/libioexec_reexec.so" "reexec" [ path ]
//! ```
//!
//! Running the action replaces the current process with the executable at
//! `path`, keeping the argument vector. If `path` is the running executable
//! the action yields `null` instead.

use std::path::Path;

use ioexec::realise_context;
use ioexec_host::{Error, EvalState, LazyValue, Pos, Result, Value};

/// Whether `path` resolves to the executable this process is running.
fn is_current_executable(path: &str) -> bool {
    match (
        std::fs::canonicalize(path),
        std::env::current_exe().and_then(std::fs::canonicalize),
    ) {
        (Ok(target), Ok(current)) => target == current,
        _ => false,
    }
}

/// Entry point: `reexec [ path ]`.
///
/// Never returns on success. Fails if evaluation was not started by a
/// program launcher, if the path's context is invalid, or if the OS refuses
/// to execute it.
#[no_mangle]
pub fn reexec(state: &EvalState, pos: &Pos, args: &[LazyValue]) -> Result<LazyValue> {
    let argv = state
        .argv()
        .ok_or_else(|| Error::eval("cannot reexec within unsafe-perform-io"))?;
    let target = args
        .first()
        .ok_or_else(|| Error::eval(format!("reexec expects one argument, at {}", pos)))?;

    let (path, context) = state.coerce_to_string(target, pos)?;
    let argv0 = argv.first().map(String::as_str).unwrap_or_default();
    if path == argv0 {
        tracing::debug!(path = %path, "already running target executable");
        return Ok(Value::Null.into());
    }

    realise_context(state.store(), &context).map_err(|e| match e {
        Error::InvalidPath { path: reference, .. } => Error::InvalidPath {
            message: format!(
                "cannot exec `{}', since path `{}' is not valid, at {}",
                path, reference, pos
            ),
            path: reference,
        },
        other => other,
    })?;

    // The path may only be inspected once its context is realised.
    if is_current_executable(&path) {
        tracing::debug!(path = %path, "already running target executable");
        return Ok(Value::Null.into());
    }

    tracing::debug!(path = %path, "replacing process image");
    Err(Error::process_replacement(
        format!("executing `{}'", path),
        exec(Path::new(&path), argv.get(1..).unwrap_or_default()),
    ))
}

#[cfg(unix)]
fn exec(path: &Path, args: &[String]) -> std::io::Error {
    use std::os::unix::process::CommandExt;

    std::process::Command::new(path).args(args).exec()
}

#[cfg(not(unix))]
fn exec(_path: &Path, _args: &[String]) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "process replacement is only supported on unix",
    )
}
