//! ioexec-host: the host evaluator surface
//!
//! The IO runner executes actions that live inside a lazy value graph. This
//! crate is the part of the host evaluator the runner depends on:
//!
//! - `LazyValue`: a shared, forced-on-demand value
//! - `Value`: evaluated values, including `External` values such as IO actions
//! - `EvalState`: forcing, function application and string coercion with context
//! - `Store`: the build/store backend, with an in-memory `MemoryStore`
//! - `Error`: the error type shared by host code, native extensions and the runner
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ioexec_host::{EvalState, LazyValue, MemoryStore, Pos, Value};
//!
//! let state = EvalState::new(Arc::new(MemoryStore::new()));
//! let shout = LazyValue::new(Value::lambda(None, Pos::none(), |state, s| {
//!     let (text, _) = state.coerce_to_string(&s, &Pos::none())?;
//!     Ok(Value::from(text.to_uppercase()).into())
//! }));
//!
//! let result = state.call_function(&shout, Value::from("hi").into(), &Pos::none()).unwrap();
//! assert_eq!(state.force(&result).unwrap().as_str(), Some("HI"));
//! ```

mod error;
mod json;
mod local_store;
mod memory_store;
mod pos;
mod state;
mod store;
mod thunk;
mod value;

pub use error::{Error, LoaderError, Result, StoreError};
pub use json::to_json;
pub use local_store::LocalStore;
pub use memory_store::MemoryStore;
pub use pos::Pos;
pub use state::EvalState;
pub use store::{parse_output_target, Missing, Store};
pub use thunk::LazyValue;
pub use value::{Context, ExternalValue, Function, Lambda, NativeFn, PrimOp, Value};
