//! ioexec: sequenced effects for a lazy evaluator
//!
//! Programs describe effects as `IoAction` values built with `unit`, `map`,
//! `join` and native calls. Building an action does nothing; a `Runner`
//! executes it, loading native extensions and realising store context as
//! it goes.
//!
//! # Architecture
//!
//! - `action`: the action algebra and its constructors
//! - `runner`: the trampoline interpreter
//! - `loader`: native module loading (`DlLoader`, `StaticLoader`) and the
//!   per-runner module cache
//! - `context`: validation and building of string context before a path is
//!   used
//! - `library`: the `lib` record programs receive
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ioexec::{action, Runner, RunnerConfig, StaticLoader};
//! use ioexec_host::{EvalState, MemoryStore, Pos, Value};
//!
//! let state = EvalState::new(Arc::new(MemoryStore::new()));
//! let runner = Runner::new(StaticLoader::new(), RunnerConfig::default());
//!
//! let shout = Value::lambda(None, Pos::none(), |state, s| {
//!     let (text, _) = state.coerce_to_string(&s, &Pos::none())?;
//!     Ok(Value::from(format!("{}!", text)).into())
//! });
//! let program = action::map(shout, action::unit(Value::from("hello")));
//!
//! let result = runner.run(&state, &program, &Pos::none()).unwrap();
//! assert_eq!(state.force(&result).unwrap().as_str(), Some("hello!"));
//! ```

pub mod action;
mod config;
mod context;
mod library;
mod loader;
mod runner;

pub use action::{force_io, IoAction};
pub use config::{Installation, RunnerConfig, Version};
pub use context::realise_context;
pub use library::{setup_lib, REEXEC_PLUGIN};
#[cfg(unix)]
pub use loader::DlLoader;
pub use loader::{Library, ModuleCache, ModuleLoader, StaticLoader};
pub use runner::Runner;
