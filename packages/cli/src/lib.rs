//! ioexec-cli: launch native ioexec programs
//!
//! A program is a native module exporting `ioexec_main` with the host's
//! native calling convention. It is called with one record,
//! `{ args = [ PROGRAM ARGS... ]; lib = ...; }`, and must return an IO
//! action, which is then run to completion.

use std::path::PathBuf;
use std::sync::Arc;

use collection_literals::btree;
use ioexec::{setup_lib, Installation, ModuleLoader, Runner, RunnerConfig};
use ioexec_host::{to_json, Error, EvalState, LazyValue, LocalStore, Pos, Result, Store, Value};

/// Symbol every program module exports.
pub const ENTRY_POINT: &str = "ioexec_main";

/// What to run and how.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub show_trace: bool,
    pub json: bool,
    /// Overrides the installation's plugin directory.
    pub plugin_dir: Option<PathBuf>,
}

#[cfg(unix)]
fn platform_loader() -> impl ModuleLoader {
    ioexec::DlLoader::new()
}

#[cfg(not(unix))]
fn platform_loader() -> impl ModuleLoader {
    ioexec::StaticLoader::new()
}

/// Run a program with the platform loader over the local filesystem.
///
/// `argv` is the process argument vector, kept for process replacement.
/// Returns the rendered result, or `None` when the program yields `null`.
pub fn run(options: &Options, argv: Vec<String>) -> Result<Option<String>> {
    run_with(options, argv, platform_loader(), Arc::new(LocalStore::new()))
}

/// Run a program with an explicit loader and store backend.
pub fn run_with(
    options: &Options,
    argv: Vec<String>,
    loader: impl ModuleLoader + 'static,
    store: Arc<dyn Store>,
) -> Result<Option<String>> {
    let shown = options.program.display().to_string();
    let program = std::fs::canonicalize(&options.program)
        .map_err(|e| Error::Usage(format!("cannot find program `{}': {}", shown, e)))?
        .display()
        .to_string();

    let mut installation = Installation::from_env();
    if let Some(dir) = &options.plugin_dir {
        installation.plugin_dir = dir.clone();
    }

    let runner = Arc::new(Runner::new(
        loader,
        RunnerConfig {
            show_trace: options.show_trace,
        },
    ));
    let state = EvalState::new(store).with_argv(argv);
    let top = Pos::new(shown.as_str(), 1, 1);

    let module = runner.modules().open(&program)?;
    let main = runner
        .modules()
        .resolve(module.as_ref(), &program, ENTRY_POINT)?;

    let args = std::iter::once(shown.clone())
        .chain(options.args.iter().cloned())
        .map(|arg| LazyValue::new(Value::from(arg)))
        .collect();
    let input = LazyValue::new(Value::Attrs(btree! {
        "args".to_string() => LazyValue::new(Value::List(args)),
        "lib".to_string() => setup_lib(&runner, &installation),
    }));

    tracing::debug!(program = %program, "running program");
    let action = main(&state, &top, &[input])?;
    let result = runner.run(&state, &action, &top)?;
    render(&state, &result, options.json)
}

/// Render a program's result for printing.
///
/// Strings print without quotes and `null` prints nothing, unless `json`
/// is set.
pub fn render(state: &EvalState, value: &LazyValue, json: bool) -> Result<Option<String>> {
    if json {
        return Ok(Some(to_json(state, value)?.to_string()));
    }
    match state.force(value)? {
        Value::Null => Ok(None),
        Value::String { text, .. } => Ok(Some(text.clone())),
        other => Ok(Some(other.to_string())),
    }
}
