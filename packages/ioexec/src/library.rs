//! The `lib` record handed to programs.

use std::sync::Arc;

use collection_literals::btree;
use ioexec_host::{LazyValue, Value};

use crate::action::IoAction;
use crate::config::{Installation, Version};
use crate::runner::Runner;

/// Name of the bundled process replacement extension.
pub const REEXEC_PLUGIN: &str = "ioexec_reexec";

/// Build the `lib` record:
///
/// - `unit`, `map`, `join`, `dlopen`: the action constructors
/// - `configuration`: `{ prefix, datadir, plugindir, version }`
/// - `builtins`: `{ unsafe-perform-io, reexec }`
pub fn setup_lib(runner: &Arc<Runner>, installation: &Installation) -> LazyValue {
    LazyValue::new(Value::Attrs(btree! {
        "unit".to_string() => LazyValue::new(Value::primop("unit", 1, |_, _, args| {
            Ok(IoAction::Unit { value: args[0].clone() }.into_value())
        })),
        "map".to_string() => LazyValue::new(Value::primop("map", 2, |_, pos, args| {
            Ok(IoAction::Map {
                function: args[0].clone(),
                action: args[1].clone(),
                pos: pos.clone(),
            }
            .into_value())
        })),
        "join".to_string() => LazyValue::new(Value::primop("join", 1, |_, pos, args| {
            Ok(IoAction::Join {
                action: args[0].clone(),
                pos: pos.clone(),
            }
            .into_value())
        })),
        "dlopen".to_string() => LazyValue::new(Value::primop("dlopen", 3, |_, pos, args| {
            Ok(IoAction::NativeCall {
                library: args[0].clone(),
                symbol: args[1].clone(),
                args: args[2].clone(),
                pos: pos.clone(),
            }
            .into_value())
        })),
        "configuration".to_string() => configuration(installation),
        "builtins".to_string() => builtins(runner, installation),
    }))
}

fn configuration(installation: &Installation) -> LazyValue {
    let version = Version::current();
    LazyValue::new(Value::attrs([
        ("prefix", Value::Path(installation.prefix.clone())),
        ("datadir", Value::Path(installation.data_dir.clone())),
        ("plugindir", Value::Path(installation.plugin_dir.clone())),
        (
            "version",
            Value::attrs([
                ("major", Value::Int(version.major.into())),
                ("minor", Value::Int(version.minor.into())),
                ("patchlevel", Value::Int(version.patchlevel.into())),
            ]),
        ),
    ]))
}

fn builtins(runner: &Arc<Runner>, installation: &Installation) -> LazyValue {
    let runner = Arc::clone(runner);
    let reexec_plugin = installation.plugin(REEXEC_PLUGIN);

    LazyValue::new(Value::Attrs(btree! {
        "unsafe-perform-io".to_string() => LazyValue::new(Value::primop(
            "unsafe-perform-io",
            1,
            move |state, pos, args| runner.run(state, &args[0], pos),
        )),
        "reexec".to_string() => LazyValue::new(Value::primop("reexec", 1, move |_, pos, args| {
            Ok(IoAction::NativeCall {
                library: Value::Path(reexec_plugin.clone()).into(),
                symbol: Value::from("reexec").into(),
                args: Value::List(vec![args[0].clone()]).into(),
                pos: pos.clone(),
            }
            .into_value())
        })),
    }))
}
