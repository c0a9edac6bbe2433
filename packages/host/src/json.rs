//! Conversion of forced values to JSON.

use serde_json::{Map, Number, Value as JsonValue};

use crate::error::{Error, Result};
use crate::state::EvalState;
use crate::thunk::LazyValue;
use crate::value::Value;

/// Deeply force `value` and convert it to JSON.
///
/// Strings lose their context. Functions and external values have no JSON
/// form and fail with a type error.
pub fn to_json(state: &EvalState, value: &LazyValue) -> Result<JsonValue> {
    match state.force(value)? {
        Value::Null => Ok(JsonValue::Null),
        Value::Bool(b) => Ok(JsonValue::Bool(*b)),
        Value::Int(i) => Ok(JsonValue::from(*i)),
        Value::Float(f) => Number::from_f64(*f)
            .map(JsonValue::Number)
            .ok_or_else(|| Error::type_error(format!("cannot convert float {} to JSON", f))),
        Value::String { text, .. } => Ok(JsonValue::String(text.clone())),
        Value::Path(p) => Ok(JsonValue::String(p.display().to_string())),
        Value::List(items) => items
            .iter()
            .map(|item| to_json(state, item))
            .collect::<Result<Vec<_>>>()
            .map(JsonValue::Array),
        Value::Attrs(attrs) => {
            let mut object = Map::new();
            for (name, item) in attrs {
                object.insert(name.clone(), to_json(state, item)?);
            }
            Ok(JsonValue::Object(object))
        }
        other => Err(Error::type_error(format!(
            "cannot convert {} to JSON",
            other.type_name()
        ))),
    }
}
