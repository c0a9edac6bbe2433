//! The IO action algebra.
//!
//! An `IoAction` is a description of an effect. Building one never forces
//! any of its parts and never runs anything; only `Runner::run` has effects.

use std::any::Any;
use std::fmt;

use ioexec_host::{Error, EvalState, ExternalValue, LazyValue, Pos, Result, Value};

/// A suspended effectful computation.
///
/// Actions live in the host value graph as external values and are shared,
/// never copied.
#[derive(Debug)]
pub enum IoAction {
    /// Yield `value` without any effect.
    Unit { value: LazyValue },

    /// Run `action`, then yield `function` applied to its result.
    Map {
        function: LazyValue,
        action: LazyValue,
        pos: Pos,
    },

    /// Run `action`, which yields another action, then run that one.
    Join { action: LazyValue, pos: Pos },

    /// Call `symbol` from the native module at `library` with `args`.
    ///
    /// The entry point's return value is yielded as-is.
    NativeCall {
        library: LazyValue,
        symbol: LazyValue,
        args: LazyValue,
        pos: Pos,
    },
}

impl IoAction {
    /// Wrap this action as a host value.
    pub fn into_value(self) -> LazyValue {
        LazyValue::new(Value::external(self))
    }

    /// Short operation name, as shown in traces.
    pub fn name(&self) -> &'static str {
        match self {
            IoAction::Unit { .. } => "unit",
            IoAction::Map { .. } => "map",
            IoAction::Join { .. } => "join",
            IoAction::NativeCall { .. } => "dlopen",
        }
    }
}

/// `unit v`: an action yielding `v`.
pub fn unit(value: impl Into<LazyValue>) -> LazyValue {
    IoAction::Unit {
        value: value.into(),
    }
    .into_value()
}

/// `map f ma`: an action yielding `f` applied to the result of `ma`.
pub fn map(function: impl Into<LazyValue>, action: impl Into<LazyValue>) -> LazyValue {
    IoAction::Map {
        function: function.into(),
        action: action.into(),
        pos: Pos::none(),
    }
    .into_value()
}

/// `join mma`: an action running `mma` and then the action it yields.
pub fn join(action: impl Into<LazyValue>) -> LazyValue {
    IoAction::Join {
        action: action.into(),
        pos: Pos::none(),
    }
    .into_value()
}

/// An action calling `symbol` from the module at `library` with `args`.
pub fn native_call(
    library: impl Into<LazyValue>,
    symbol: impl Into<LazyValue>,
    args: Vec<LazyValue>,
) -> LazyValue {
    IoAction::NativeCall {
        library: library.into(),
        symbol: symbol.into(),
        args: LazyValue::new(Value::List(args)),
        pos: Pos::none(),
    }
    .into_value()
}

/// Force `value` and require it to be an IO action.
pub fn force_io<'v>(state: &EvalState, value: &'v LazyValue, pos: &Pos) -> Result<&'v IoAction> {
    let forced = state.force(value)?;
    forced
        .as_external::<IoAction>()
        .ok_or_else(|| Error::unexpected_type(forced.type_name(), "an IO action", pos))
}

/// Render `value` as an action if it has already been forced to one.
///
/// Never forces anything.
pub(crate) fn describe(value: &LazyValue) -> String {
    match value.peek().and_then(|v| v.as_external::<IoAction>()) {
        Some(action) => action.to_string(),
        None => value.to_string(),
    }
}

impl fmt::Display for IoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoAction::Unit { value } => write!(f, "ioexec.unit ({})", value),
            IoAction::Map {
                function, action, ..
            } => write!(f, "ioexec.map ({}) ({})", function, action),
            IoAction::Join { action, .. } => write!(f, "ioexec.join ({})", action),
            IoAction::NativeCall {
                library,
                symbol,
                args,
                ..
            } => write!(f, "ioexec.dlopen ({}) ({}) ({})", library, symbol, args),
        }
    }
}

impl ExternalValue for IoAction {
    fn show_type(&self) -> &'static str {
        "an IO action"
    }

    fn type_of(&self) -> &'static str {
        "ioexec-io"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn drain_children(&mut self, out: &mut Vec<LazyValue>) {
        match self {
            IoAction::Unit { value } => out.push(std::mem::take(value)),
            IoAction::Map {
                function, action, ..
            } => {
                out.push(std::mem::take(function));
                out.push(std::mem::take(action));
            }
            IoAction::Join { action, .. } => out.push(std::mem::take(action)),
            IoAction::NativeCall {
                library,
                symbol,
                args,
                ..
            } => {
                out.push(std::mem::take(library));
                out.push(std::mem::take(symbol));
                out.push(std::mem::take(args));
            }
        }
    }
}
