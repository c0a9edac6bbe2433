//! The evaluator handle passed to primops and native extensions.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::pos::Pos;
use crate::store::Store;
use crate::thunk::LazyValue;
use crate::value::{Context, Function, Value};

/// Evaluator state: the store backend and the program's argument vector.
///
/// All operations take `&self`; an `EvalState` is shared by reference with
/// every primop and native extension for the duration of a run.
pub struct EvalState {
    store: Arc<dyn Store>,
    argv: Option<Vec<String>>,
}

impl EvalState {
    /// Create a state over the given backend, with no argument vector.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, argv: None }
    }

    /// Record the argument vector the program was started with.
    pub fn with_argv(mut self, argv: Vec<String>) -> Self {
        self.argv = Some(argv);
        self
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// The argument vector, if this evaluation was started by a program
    /// launcher.
    pub fn argv(&self) -> Option<&[String]> {
        self.argv.as_deref()
    }

    /// Force a value.
    pub fn force<'v>(&self, value: &'v LazyValue) -> Result<&'v Value> {
        value.force(self)
    }

    pub fn force_function<'v>(&self, value: &'v LazyValue, pos: &Pos) -> Result<&'v Function> {
        match self.force(value)? {
            Value::Function(f) => Ok(f),
            other => Err(Error::unexpected_type(other.type_name(), "a function", pos)),
        }
    }

    pub fn force_list<'v>(&self, value: &'v LazyValue, pos: &Pos) -> Result<&'v [LazyValue]> {
        match self.force(value)? {
            Value::List(items) => Ok(items),
            other => Err(Error::unexpected_type(other.type_name(), "a list", pos)),
        }
    }

    pub fn force_attrs<'v>(
        &self,
        value: &'v LazyValue,
        pos: &Pos,
    ) -> Result<&'v BTreeMap<String, LazyValue>> {
        match self.force(value)? {
            Value::Attrs(attrs) => Ok(attrs),
            other => Err(Error::unexpected_type(other.type_name(), "a set", pos)),
        }
    }

    pub fn force_int(&self, value: &LazyValue, pos: &Pos) -> Result<i64> {
        match self.force(value)? {
            Value::Int(i) => Ok(*i),
            other => Err(Error::unexpected_type(other.type_name(), "an integer", pos)),
        }
    }

    pub fn force_bool(&self, value: &LazyValue, pos: &Pos) -> Result<bool> {
        match self.force(value)? {
            Value::Bool(b) => Ok(*b),
            other => Err(Error::unexpected_type(other.type_name(), "a boolean", pos)),
        }
    }

    /// Force a string that must not refer to any store path.
    pub fn force_string_no_context(&self, value: &LazyValue, pos: &Pos) -> Result<String> {
        match self.force(value)? {
            Value::String { text, context } => match context.iter().next() {
                None => Ok(text.clone()),
                Some(reference) => Err(Error::eval(format!(
                    "the string `{}' is not allowed to refer to a store path (such as `{}'), at {}",
                    text, reference, pos
                ))),
            },
            other => Err(Error::unexpected_type(other.type_name(), "a string", pos)),
        }
    }

    /// Look up a required attribute.
    pub fn require_attr<'v>(
        &self,
        attrs: &'v BTreeMap<String, LazyValue>,
        name: &str,
        pos: &Pos,
    ) -> Result<&'v LazyValue> {
        attrs.get(name).ok_or_else(|| Error::MissingAttribute {
            name: name.to_string(),
            pos: pos.clone(),
        })
    }

    /// Apply a function to one argument.
    ///
    /// Primops collect arguments until their arity is reached; until then
    /// the result is a partial application.
    pub fn call_function(&self, fun: &LazyValue, arg: LazyValue, pos: &Pos) -> Result<LazyValue> {
        let fun = match self.force(fun)? {
            Value::Function(f) => f,
            other => {
                return Err(Error::type_error(format!(
                    "attempt to call something which is not a function but {}, at {}",
                    other.type_name(),
                    pos
                )))
            }
        };

        match fun {
            Function::Lambda(lambda) => lambda.call(self, arg),
            Function::PrimOp(op) => {
                if op.arity <= 1 {
                    op.call(self, pos, &[arg])
                } else {
                    Ok(LazyValue::new(Value::Function(Function::PrimOpApp {
                        op: Arc::clone(op),
                        args: vec![arg],
                    })))
                }
            }
            Function::PrimOpApp { op, args } => {
                let mut args = args.clone();
                args.push(arg);
                if args.len() >= op.arity {
                    op.call(self, pos, &args)
                } else {
                    Ok(LazyValue::new(Value::Function(Function::PrimOpApp {
                        op: Arc::clone(op),
                        args,
                    })))
                }
            }
        }
    }

    /// Apply a function to several arguments, one at a time.
    pub fn call_function_n(
        &self,
        fun: &LazyValue,
        args: impl IntoIterator<Item = LazyValue>,
        pos: &Pos,
    ) -> Result<LazyValue> {
        let mut result = fun.clone();
        for arg in args {
            result = self.call_function(&result, arg, pos)?;
        }
        Ok(result)
    }

    /// Coerce a value to text, collecting the store references it carries.
    ///
    /// Strings keep their context. Paths render as-is and are not copied
    /// anywhere. Records coerce through their `outPath` attribute.
    pub fn coerce_to_string(&self, value: &LazyValue, pos: &Pos) -> Result<(String, Context)> {
        let mut current = value.clone();
        loop {
            let next = match self.force(&current)? {
                Value::String { text, context } => return Ok((text.clone(), context.clone())),
                Value::Path(path) => return Ok((path.display().to_string(), Context::new())),
                Value::Attrs(attrs) => attrs.get("outPath").cloned().ok_or_else(|| {
                    Error::type_error(format!("cannot coerce a set to a string, at {}", pos))
                })?,
                other => {
                    return Err(Error::type_error(format!(
                        "cannot coerce {} to a string, at {}",
                        other.type_name(),
                        pos
                    )))
                }
            };
            current = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use collection_literals::btree;
    use std::path::PathBuf;

    fn state() -> EvalState {
        EvalState::new(Arc::new(MemoryStore::new()))
    }

    fn add_primop() -> LazyValue {
        LazyValue::new(Value::primop("add", 2, |state, pos, args| {
            let a = state.force_int(&args[0], pos)?;
            let b = state.force_int(&args[1], pos)?;
            Ok(LazyValue::new(Value::Int(a + b)))
        }))
    }

    #[test]
    fn lambda_application() {
        let state = state();
        let double = LazyValue::new(Value::lambda(None, Pos::none(), |state, x| {
            let n = state.force_int(&x, &Pos::none())?;
            Ok(LazyValue::new(Value::Int(n * 2)))
        }));
        let result = state
            .call_function(&double, Value::Int(21).into(), &Pos::none())
            .unwrap();
        assert_eq!(state.force(&result).unwrap().as_int(), Some(42));
    }

    #[test]
    fn primop_partial_application() {
        let state = state();
        let add = add_primop();
        let partial = state
            .call_function(&add, Value::Int(3).into(), &Pos::none())
            .unwrap();
        assert!(matches!(
            state.force(&partial).unwrap(),
            Value::Function(Function::PrimOpApp { .. })
        ));
        let result = state
            .call_function(&partial, Value::Int(4).into(), &Pos::none())
            .unwrap();
        assert_eq!(state.force(&result).unwrap().as_int(), Some(7));

        let result = state
            .call_function_n(
                &add,
                [LazyValue::from(Value::Int(1)), LazyValue::from(Value::Int(2))],
                &Pos::none(),
            )
            .unwrap();
        assert_eq!(state.force(&result).unwrap().as_int(), Some(3));
    }

    #[test]
    fn calling_non_function_fails() {
        let state = state();
        let err = state
            .call_function(&Value::Int(1).into(), Value::Null.into(), &Pos::new("f", 1, 1))
            .unwrap_err();
        assert!(matches!(err, Error::Type { .. }));
        assert!(err.to_string().contains("not a function but an integer"));
    }

    #[test]
    fn coerce_keeps_context() {
        let state = state();
        let value: LazyValue =
            Value::string_with_context("/store/abc-lib/lib.so", ["/store/abc-lib"]).into();
        let (text, context) = state.coerce_to_string(&value, &Pos::none()).unwrap();
        assert_eq!(text, "/store/abc-lib/lib.so");
        assert!(context.contains("/store/abc-lib"));
    }

    #[test]
    fn coerce_path_and_out_path() {
        let state = state();
        let path: LazyValue = Value::Path(PathBuf::from("/tmp/x")).into();
        let (text, context) = state.coerce_to_string(&path, &Pos::none()).unwrap();
        assert_eq!(text, "/tmp/x");
        assert!(context.is_empty());

        let drv: LazyValue = Value::Attrs(btree! {
            "outPath".to_string() => LazyValue::new(
                Value::string_with_context("/store/out", ["!out!/store/x.drv"])
            ),
        })
        .into();
        let (text, context) = state.coerce_to_string(&drv, &Pos::none()).unwrap();
        assert_eq!(text, "/store/out");
        assert!(context.contains("!out!/store/x.drv"));
    }

    #[test]
    fn coerce_rejects_integers() {
        let state = state();
        let err = state
            .coerce_to_string(&Value::Int(1).into(), &Pos::none())
            .unwrap_err();
        assert!(err.to_string().contains("cannot coerce an integer"));
    }

    #[test]
    fn string_no_context_rejects_context() {
        let state = state();
        let value: LazyValue = Value::string_with_context("x", ["/store/y"]).into();
        let err = state
            .force_string_no_context(&value, &Pos::none())
            .unwrap_err();
        assert!(err.to_string().contains("/store/y"));
    }

    #[test]
    fn missing_attribute() {
        let state = state();
        let attrs = BTreeMap::new();
        let err = state
            .require_attr(&attrs, "url", &Pos::new("f", 2, 3))
            .unwrap_err();
        assert_eq!(err.to_string(), "attribute `url' missing, at f:2:3");
    }
}
