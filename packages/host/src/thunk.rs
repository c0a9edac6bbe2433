//! LazyValue - a shared, forced-on-demand value.
//!
//! A `LazyValue` is either already evaluated or holds a suspended
//! computation. Forcing runs the computation at most once and caches the
//! outcome, including failures.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::error::{Error, Result};
use crate::state::EvalState;
use crate::value::Value;

type Suspended = Box<dyn FnOnce(&EvalState) -> Result<Value> + Send>;

struct Thunk {
    /// The outcome, populated on first force.
    outcome: OnceLock<Result<Value>>,
    /// The suspended computation. Taken when forcing starts.
    suspended: Mutex<Option<Suspended>>,
}

/// A value owned by the host value graph, evaluated on demand.
///
/// Cloning a `LazyValue` shares the underlying cell: forcing any clone
/// forces them all.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use ioexec_host::{EvalState, LazyValue, MemoryStore, Value};
///
/// let state = EvalState::new(Arc::new(MemoryStore::new()));
/// let lazy = LazyValue::thunk(|_| Ok(Value::Int(6 * 7)));
///
/// assert!(!lazy.is_forced());
/// assert_eq!(state.force(&lazy).unwrap().as_int(), Some(42));
/// assert!(lazy.is_forced());
/// ```
#[derive(Clone)]
pub struct LazyValue(Arc<Thunk>);

impl LazyValue {
    /// Wrap an already evaluated value.
    pub fn new(value: Value) -> Self {
        let outcome = OnceLock::new();
        let _ = outcome.set(Ok(value));
        Self(Arc::new(Thunk {
            outcome,
            suspended: Mutex::new(None),
        }))
    }

    /// Suspend a computation. It runs the first time the value is forced.
    pub fn thunk(compute: impl FnOnce(&EvalState) -> Result<Value> + Send + 'static) -> Self {
        Self(Arc::new(Thunk {
            outcome: OnceLock::new(),
            suspended: Mutex::new(Some(Box::new(compute))),
        }))
    }

    /// Force the value, evaluating the suspended computation if necessary.
    ///
    /// Forcing a value from inside its own computation fails with
    /// `infinite recursion encountered`.
    pub fn force(&self, state: &EvalState) -> Result<&Value> {
        if let Some(outcome) = self.0.outcome.get() {
            return outcome.as_ref().map_err(Clone::clone);
        }

        let suspended = self
            .0
            .suspended
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let compute = suspended.ok_or_else(|| Error::eval("infinite recursion encountered"))?;

        let outcome = compute(state);
        self.0
            .outcome
            .get_or_init(move || outcome)
            .as_ref()
            .map_err(Clone::clone)
    }

    /// The value if already forced successfully, without forcing.
    pub fn peek(&self) -> Option<&Value> {
        match self.0.outcome.get() {
            Some(Ok(value)) => Some(value),
            _ => None,
        }
    }

    /// Whether forcing has completed (successfully or not).
    pub fn is_forced(&self) -> bool {
        self.0.outcome.get().is_some()
    }

    /// Whether two handles share the same cell.
    pub fn ptr_eq(&self, other: &LazyValue) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for LazyValue {
    fn default() -> Self {
        LazyValue::new(Value::Null)
    }
}

impl From<Value> for LazyValue {
    fn from(value: Value) -> Self {
        LazyValue::new(value)
    }
}

// Value graphs built by the runner's callers can be arbitrarily deep (a long
// chain of joins, a long list of lists). Dropping them recursively would
// overflow the native stack, so uniquely-owned children are moved onto a
// work list and released one at a time.
impl Drop for Thunk {
    fn drop(&mut self) {
        let mut work = Vec::new();
        if let Some(Ok(mut value)) = self.outcome.take() {
            value.drain_children(&mut work);
        }
        while let Some(child) = work.pop() {
            if let Some(mut thunk) = Arc::into_inner(child.0) {
                if let Some(Ok(mut value)) = thunk.outcome.take() {
                    value.drain_children(&mut work);
                }
            }
        }
    }
}

impl fmt::Display for LazyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.outcome.get() {
            Some(Ok(value)) => write!(f, "{}", value),
            Some(Err(_)) => write!(f, "<ERROR>"),
            None => write!(f, "<CODE>"),
        }
    }
}

impl fmt::Debug for LazyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyValue")
            .field("is_forced", &self.is_forced())
            .field("value", &format_args!("{}", self))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn state() -> EvalState {
        EvalState::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn thunk_runs_once() {
        let state = state();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let lazy = LazyValue::thunk(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Int(1))
        });
        let shared = lazy.clone();

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(lazy.force(&state).unwrap().as_int(), Some(1));
        assert_eq!(shared.force(&state).unwrap().as_int(), Some(1));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_is_cached() {
        let state = state();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let lazy = LazyValue::thunk(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(Error::eval("nope"))
        });

        assert!(lazy.force(&state).is_err());
        let err = lazy.force(&state).unwrap_err();
        assert_eq!(err.to_string(), "nope");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(lazy.is_forced());
        assert!(lazy.peek().is_none());
    }

    #[test]
    fn self_reference_is_infinite_recursion() {
        let state = state();
        let slot: Arc<Mutex<Option<LazyValue>>> = Arc::new(Mutex::new(None));
        let inner_slot = Arc::clone(&slot);
        let lazy = LazyValue::thunk(move |state| {
            let me = inner_slot.lock().unwrap().clone().unwrap();
            me.force(state).cloned()
        });
        *slot.lock().unwrap() = Some(lazy.clone());

        let err = lazy.force(&state).unwrap_err();
        assert!(err.to_string().contains("infinite recursion"));

        // Break the reference cycle.
        slot.lock().unwrap().take();
    }

    #[test]
    fn display_does_not_force() {
        let lazy = LazyValue::thunk(|_| Ok(Value::Int(3)));
        assert_eq!(lazy.to_string(), "<CODE>");
        assert!(!lazy.is_forced());
        lazy.force(&state()).unwrap();
        assert_eq!(lazy.to_string(), "3");
    }

    #[test]
    fn deep_list_drops_iteratively() {
        let mut value = LazyValue::new(Value::Null);
        for _ in 0..200_000 {
            value = LazyValue::new(Value::List(vec![value]));
        }
        drop(value);
    }
}
