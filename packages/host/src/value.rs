//! The Value type - the host language's evaluated values.
//!
//! Containers hold `LazyValue`s, so a list or record can be built without
//! evaluating its elements.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;
use crate::pos::Pos;
use crate::state::EvalState;
use crate::thunk::LazyValue;

/// Store references a string depends on.
///
/// Each entry is either a bare store path or `!OUTPUT!DRV_PATH`.
pub type Context = BTreeSet<String>;

/// Native calling convention for primops and loaded extensions.
///
/// Arguments arrive unforced; the callee decides what to force.
pub type NativeFn = fn(&EvalState, &Pos, &[LazyValue]) -> Result<LazyValue>;

type LambdaBody = dyn Fn(&EvalState, LazyValue) -> Result<LazyValue> + Send + Sync;
type PrimOpBody = dyn Fn(&EvalState, &Pos, &[LazyValue]) -> Result<LazyValue> + Send + Sync;

/// Values the host does not know the shape of, such as IO actions.
///
/// Consumers recover the concrete type through `as_any`.
pub trait ExternalValue: fmt::Display + Send + Sync + 'static {
    /// Human readable type, used in error messages ("an IO action").
    fn show_type(&self) -> &'static str;

    /// Machine readable type tag.
    fn type_of(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    /// Move every `LazyValue` this value owns into `out`.
    ///
    /// Called only when the value is being dropped and is uniquely owned.
    fn drain_children(&mut self, _out: &mut Vec<LazyValue>) {}
}

/// A lambda written in the host language.
pub struct Lambda {
    pub name: Option<String>,
    pub pos: Pos,
    body: Box<LambdaBody>,
}

impl Lambda {
    /// Name and position for diagnostics.
    pub fn show_name_pos(&self) -> String {
        match &self.name {
            Some(name) => format!("`{}' at {}", name, self.pos),
            None => format!("anonymous function at {}", self.pos),
        }
    }

    pub(crate) fn call(&self, state: &EvalState, arg: LazyValue) -> Result<LazyValue> {
        (self.body)(state, arg)
    }
}

/// A built-in function of fixed arity.
pub struct PrimOp {
    pub name: String,
    pub arity: usize,
    body: Box<PrimOpBody>,
}

impl PrimOp {
    pub(crate) fn call(&self, state: &EvalState, pos: &Pos, args: &[LazyValue]) -> Result<LazyValue> {
        (self.body)(state, pos, args)
    }
}

/// A callable value.
#[derive(Clone)]
pub enum Function {
    Lambda(Arc<Lambda>),
    PrimOp(Arc<PrimOp>),
    /// A primop applied to fewer arguments than its arity.
    PrimOpApp { op: Arc<PrimOp>, args: Vec<LazyValue> },
}

impl Function {
    /// The primop underneath a (partial) primop application.
    pub fn primop(&self) -> Option<&PrimOp> {
        match self {
            Function::Lambda(_) => None,
            Function::PrimOp(op) | Function::PrimOpApp { op, .. } => Some(op),
        }
    }
}

/// An evaluated host value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// A string together with the store references it was built from.
    String { text: String, context: Context },
    Path(PathBuf),
    List(Vec<LazyValue>),
    /// A record ("attribute set") with deterministic key order.
    Attrs(BTreeMap<String, LazyValue>),
    Function(Function),
    External(Arc<dyn ExternalValue>),
}

impl Value {
    /// A string without context.
    pub fn string(text: impl Into<String>) -> Self {
        Value::String {
            text: text.into(),
            context: Context::new(),
        }
    }

    /// A string carrying store references.
    pub fn string_with_context<I, S>(text: impl Into<String>, context: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::String {
            text: text.into(),
            context: context.into_iter().map(Into::into).collect(),
        }
    }

    /// A list of already evaluated values.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().map(LazyValue::new).collect())
    }

    /// A record of already evaluated values.
    pub fn attrs<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Attrs(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), LazyValue::new(v)))
                .collect(),
        )
    }

    /// A host lambda.
    pub fn lambda(
        name: Option<&str>,
        pos: Pos,
        body: impl Fn(&EvalState, LazyValue) -> Result<LazyValue> + Send + Sync + 'static,
    ) -> Self {
        Value::Function(Function::Lambda(Arc::new(Lambda {
            name: name.map(str::to_string),
            pos,
            body: Box::new(body),
        })))
    }

    /// A primop of the given arity.
    pub fn primop(
        name: impl Into<String>,
        arity: usize,
        body: impl Fn(&EvalState, &Pos, &[LazyValue]) -> Result<LazyValue> + Send + Sync + 'static,
    ) -> Self {
        Value::Function(Function::PrimOp(Arc::new(PrimOp {
            name: name.into(),
            arity,
            body: Box::new(body),
        })))
    }

    /// A primop backed by a native entry point.
    pub fn native(name: impl Into<String>, arity: usize, entry: NativeFn) -> Self {
        Value::primop(name, arity, entry)
    }

    pub fn external(value: impl ExternalValue) -> Self {
        Value::External(Arc::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The text of a string, ignoring its context.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Downcast an external value.
    pub fn as_external<T: ExternalValue>(&self) -> Option<&T> {
        match self {
            Value::External(ext) => ext.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// The host's name for this value's type, as used in type errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "a boolean",
            Value::Int(_) => "an integer",
            Value::Float(_) => "a float",
            Value::String { .. } => "a string",
            Value::Path(_) => "a path",
            Value::List(_) => "a list",
            Value::Attrs(_) => "a set",
            Value::Function(_) => "a function",
            Value::External(ext) => ext.show_type(),
        }
    }

    pub(crate) fn drain_children(&mut self, out: &mut Vec<LazyValue>) {
        match self {
            Value::List(items) => out.append(items),
            Value::Attrs(attrs) => out.extend(std::mem::take(attrs).into_values()),
            Value::Function(Function::PrimOpApp { args, .. }) => out.append(args),
            Value::External(ext) => {
                if let Some(ext) = Arc::get_mut(ext) {
                    ext.drain_children(out);
                }
            }
            _ => {}
        }
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in text.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '$' => write!(f, "\\$")?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "\"")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String { text, .. } => write_escaped(f, text),
            Value::Path(p) => write!(f, "{}", p.display()),
            Value::List(items) => {
                write!(f, "[ ")?;
                for item in items {
                    write!(f, "{} ", item)?;
                }
                write!(f, "]")
            }
            Value::Attrs(attrs) => {
                write!(f, "{{ ")?;
                for (name, value) in attrs {
                    write!(f, "{} = {}; ", name, value)?;
                }
                write!(f, "}}")
            }
            Value::Function(Function::Lambda(_)) => write!(f, "<LAMBDA>"),
            Value::Function(Function::PrimOp(_)) => write!(f, "<PRIMOP>"),
            Value::Function(Function::PrimOpApp { .. }) => write!(f, "<PRIMOP-APP>"),
            // Nested externals are shown by type only; rendering them fully
            // could walk an unbounded chain.
            Value::External(ext) => write!(f, "<{}>", ext.show_type()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::string(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::string(v)
    }
}

impl From<PathBuf> for Value {
    fn from(v: PathBuf) -> Self {
        Value::Path(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collection_literals::btree;

    struct Marker;

    impl fmt::Display for Marker {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "marker")
        }
    }

    impl ExternalValue for Marker {
        fn show_type(&self) -> &'static str {
            "a marker"
        }

        fn type_of(&self) -> &'static str {
            "marker"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn display_nested() {
        let value = Value::Attrs(btree! {
            "name".to_string() => LazyValue::new(Value::from("hi \"there\"")),
            "items".to_string() => LazyValue::new(Value::list([Value::Int(1), Value::Null])),
        });
        assert_eq!(
            value.to_string(),
            "{ items = [ 1 null ]; name = \"hi \\\"there\\\"\"; }"
        );
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::from(1).type_name(), "an integer");
        assert_eq!(Value::from("s").type_name(), "a string");
        assert_eq!(Value::external(Marker).type_name(), "a marker");
    }

    #[test]
    fn external_downcast() {
        let value = Value::external(Marker);
        assert!(value.as_external::<Marker>().is_some());
        assert!(Value::Null.as_external::<Marker>().is_none());
        assert_eq!(value.to_string(), "<a marker>");
    }

    #[test]
    fn lambda_name_pos() {
        let Value::Function(Function::Lambda(named)) =
            Value::lambda(Some("greet"), Pos::new("a.nix", 1, 2), |_, v| Ok(v))
        else {
            unreachable!()
        };
        assert_eq!(named.show_name_pos(), "`greet' at a.nix:1:2");

        let Value::Function(Function::Lambda(anon)) =
            Value::lambda(None, Pos::new("a.nix", 3, 4), |_, v| Ok(v))
        else {
            unreachable!()
        };
        assert_eq!(anon.show_name_pos(), "anonymous function at a.nix:3:4");
    }
}
