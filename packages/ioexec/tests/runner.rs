use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ioexec::action::{join, map, native_call, unit};
use ioexec::{IoAction, Runner, RunnerConfig, StaticLoader};
use ioexec_host::{
    Error, EvalState, ExternalValue, LazyValue, LoaderError, MemoryStore, Pos, Result, Value,
};
use proptest::prelude::*;

const STUB: &str = "/lib/libstub.so";

fn add(state: &EvalState, pos: &Pos, args: &[LazyValue]) -> Result<LazyValue> {
    let a = state.force_int(&args[0], pos)?;
    let b = state.force_int(&args[1], pos)?;
    Ok(Value::Int(a + b).into())
}

static TICKS: AtomicUsize = AtomicUsize::new(0);

fn tick(_: &EvalState, _: &Pos, _: &[LazyValue]) -> Result<LazyValue> {
    let n = TICKS.fetch_add(1, Ordering::SeqCst) + 1;
    Ok(Value::Int(n as i64).into())
}

fn deferred(_: &EvalState, _: &Pos, args: &[LazyValue]) -> Result<LazyValue> {
    Ok(unit(args[0].clone()))
}

fn state() -> EvalState {
    EvalState::new(Arc::new(MemoryStore::new()))
}

fn runner_with(config: RunnerConfig) -> Runner {
    let loader = StaticLoader::new().with_module(
        STUB,
        &[("add", add), ("tick", tick), ("deferred", deferred)],
    );
    Runner::new(loader, config)
}

fn runner() -> Runner {
    runner_with(RunnerConfig::default())
}

fn traced_runner() -> Runner {
    runner_with(RunnerConfig { show_trace: true })
}

fn int(state: &EvalState, value: &LazyValue) -> i64 {
    state.force_int(value, &Pos::none()).unwrap()
}

fn add_n(n: i64) -> Value {
    Value::lambda(Some("add_n"), Pos::none(), move |state, x| {
        let x = state.force_int(&x, &Pos::none())?;
        Ok(Value::Int(x + n).into())
    })
}

fn append(suffix: &'static str) -> Value {
    Value::lambda(None, Pos::none(), move |state, s| {
        let (text, _) = state.coerce_to_string(&s, &Pos::none())?;
        Ok(Value::from(format!("{}{}", text, suffix)).into())
    })
}

#[test]
fn map_over_unit() {
    let state = state();
    let program = map(append("!"), unit(Value::from("hello")));
    let result = runner().run(&state, &program, &Pos::none()).unwrap();
    assert_eq!(state.force(&result).unwrap().as_str(), Some("hello!"));
}

#[test]
fn join_flattens_one_level() {
    let state = state();
    let program = join(unit(unit(Value::Int(42))));
    let result = runner().run(&state, &program, &Pos::none()).unwrap();
    assert_eq!(int(&state, &result), 42);
}

#[test]
fn maps_apply_innermost_first() {
    let state = state();
    let program = map(append("f"), map(append("g"), unit(Value::from("x"))));
    let result = runner().run(&state, &program, &Pos::none()).unwrap();
    assert_eq!(state.force(&result).unwrap().as_str(), Some("xgf"));
}

#[test]
fn map_over_join_sees_flattened_value() {
    let state = state();
    let program = map(add_n(1), join(unit(unit(Value::Int(1)))));
    let result = runner().run(&state, &program, &Pos::none()).unwrap();
    assert_eq!(int(&state, &result), 2);
}

#[test]
fn join_resumes_pending_maps() {
    let state = state();
    let next = Value::lambda(None, Pos::none(), |state, x| {
        let x = state.force_int(&x, &Pos::none())?;
        Ok(map(add_n(10), unit(Value::Int(x * 2))))
    });
    let program = map(add_n(1), join(map(next, unit(Value::Int(5)))));
    let result = runner().run(&state, &program, &Pos::none()).unwrap();
    assert_eq!(int(&state, &result), 21);
}

#[test]
fn native_call_result() {
    let state = state();
    let program = native_call(
        Value::from(STUB),
        Value::from("add"),
        vec![Value::Int(3).into(), Value::Int(4).into()],
    );
    let result = runner().run(&state, &program, &Pos::none()).unwrap();
    assert_eq!(int(&state, &result), 7);
}

#[test]
fn native_call_missing_symbol() {
    let state = state();
    let program = native_call(Value::from(STUB), Value::from("sub"), Vec::new());
    let err = runner().run(&state, &program, &Pos::none()).unwrap_err();
    assert!(matches!(err, Error::Loader(LoaderError::Symbol { .. })));
    let message = err.to_string();
    assert!(message.contains("`sub'"));
    assert!(message.contains(STUB));
}

#[test]
fn native_results_are_not_wrapped() {
    let state = state();
    let call = native_call(
        Value::from(STUB),
        Value::from("deferred"),
        vec![Value::Int(9).into()],
    );

    let result = runner().run(&state, &call, &Pos::none()).unwrap();
    assert!(state
        .force(&result)
        .unwrap()
        .as_external::<IoAction>()
        .is_some());

    let result = runner().run(&state, &join(call), &Pos::none()).unwrap();
    assert_eq!(int(&state, &result), 9);
}

#[test]
fn native_call_runs_once_under_maps() {
    let state = state();
    let before = TICKS.load(Ordering::SeqCst);

    let mut program = native_call(Value::from(STUB), Value::from("tick"), Vec::new());
    for _ in 0..5 {
        program = map(add_n(0), program);
    }
    runner().run(&state, &program, &Pos::none()).unwrap();

    assert_eq!(TICKS.load(Ordering::SeqCst), before + 1);
}

#[test]
fn deep_join_chain() {
    let state = state();
    let mut program = unit(Value::Int(7));
    for _ in 0..100_000 {
        program = join(unit(program));
    }
    let result = runner().run(&state, &program, &Pos::none()).unwrap();
    assert_eq!(int(&state, &result), 7);
}

#[test]
fn deep_map_chain() {
    let state = state();
    let mut program = unit(Value::Int(0));
    for _ in 0..100_000 {
        program = map(add_n(1), program);
    }
    let result = runner().run(&state, &program, &Pos::none()).unwrap();
    assert_eq!(int(&state, &result), 100_000);
}

#[test]
fn deep_join_of_maps() {
    let state = state();
    let mut program = unit(Value::Int(0));
    for _ in 0..50_000 {
        program = join(map(
            Value::lambda(None, Pos::none(), |state, x| {
                let x = state.force_int(&x, &Pos::none())?;
                Ok(unit(Value::Int(x + 1)))
            }),
            program,
        ));
    }
    let result = runner().run(&state, &program, &Pos::none()).unwrap();
    assert_eq!(int(&state, &result), 50_000);
}

#[test]
fn non_action_is_a_type_error() {
    let state = state();
    let err = runner()
        .run(&state, &Value::Int(3).into(), &Pos::new("prog", 1, 1))
        .unwrap_err();
    assert!(matches!(err, Error::Type { .. }));
    assert_eq!(
        err.to_string(),
        "value is an integer while an IO action was expected, at prog:1:1"
    );
}

#[test]
fn joining_a_plain_value_is_a_type_error() {
    let state = state();
    let err = runner()
        .run(&state, &join(unit(Value::Int(5))), &Pos::none())
        .unwrap_err();
    assert!(matches!(err, Error::Type { .. }));
}

#[test]
fn mapping_a_non_function_is_a_type_error() {
    let state = state();
    let err = runner()
        .run(&state, &map(Value::Int(1), unit(Value::Null)), &Pos::none())
        .unwrap_err();
    assert!(err.to_string().contains("while a function was expected"));
}

#[test]
fn unit_payload_is_forced() {
    let state = state();
    let payload = LazyValue::thunk(|_| Err(Error::eval("payload failed")));
    let err = runner()
        .run(&state, &unit(payload), &Pos::none())
        .unwrap_err();
    assert_eq!(err.to_string(), "payload failed");
}

fn failing(name: &str) -> Value {
    Value::lambda(Some(name), Pos::new("prog", 3, 1), |_, _| {
        Err(Error::eval("boom"))
    })
}

#[test]
fn failures_are_not_annotated_without_trace() {
    let state = state();
    let program = join(map(failing("explode"), unit(Value::Int(1))));
    let err = runner().run(&state, &program, &Pos::none()).unwrap_err();
    assert!(err.frames().is_empty());
    assert_eq!(err.to_string(), "boom");
}

#[test]
fn trace_names_each_pending_frame() {
    let state = state();
    let program = join(map(failing("explode"), unit(Value::Int(1))));
    let err = traced_runner()
        .run(&state, &program, &Pos::none())
        .unwrap_err();

    assert_eq!(
        err.frames(),
        vec![
            "while joining ioexec.map (<LAMBDA>) (<an IO action>), at undefined position:",
            "while mapping `explode' at prog:3:1 over ioexec.unit (1), at undefined position:",
        ]
    );
    assert!(matches!(err.root(), Error::Eval { .. }));
    assert!(err.to_string().ends_with("\nboom"));
}

#[test]
fn trace_names_primops() {
    let state = state();
    let add = LazyValue::new(Value::primop("add", 2, add));
    let add_one = state
        .call_function(&add, Value::Int(1).into(), &Pos::none())
        .unwrap();

    let program = map(add_one, unit(Value::from("x")));
    let err = traced_runner()
        .run(&state, &program, &Pos::none())
        .unwrap_err();
    assert_eq!(
        err.frames(),
        vec!["while mapping primop add over ioexec.unit (\"x\"), at undefined position:"]
    );
}

#[test]
fn trace_covers_native_failures() {
    let state = state();
    let program = map(
        add_n(1),
        native_call(Value::from("/lib/libnothere.so"), Value::from("add"), Vec::new()),
    );
    let err = traced_runner()
        .run(&state, &program, &Pos::none())
        .unwrap_err();
    assert_eq!(err.frames().len(), 1);
    assert!(err.frames()[0].starts_with("while mapping `add_n' at undefined position over"));
    assert!(matches!(err.root(), Error::Loader(LoaderError::Open { .. })));
}

#[test]
fn trace_covers_the_action_a_join_yields() {
    let state = state();
    let failing_call = native_call(Value::from("/lib/libnothere.so"), Value::from("f"), Vec::new());
    let program = join(unit(failing_call));
    let err = traced_runner()
        .run(&state, &program, &Pos::none())
        .unwrap_err();
    assert_eq!(
        err.frames(),
        vec!["while joining ioexec.unit (<an IO action>), at undefined position:"]
    );
    assert!(matches!(err.root(), Error::Loader(LoaderError::Open { .. })));
}

#[test]
fn trace_orders_running_joins_between_pending_maps() {
    let state = state();
    let inner = map(failing("explode"), unit(Value::Int(1)));
    let program = map(add_n(1), join(unit(inner)));
    let err = traced_runner()
        .run(&state, &program, &Pos::none())
        .unwrap_err();
    assert_eq!(
        err.frames(),
        vec![
            "while mapping `add_n' at undefined position over ioexec.join (<an IO action>), at undefined position:",
            "while joining ioexec.unit (<an IO action>), at undefined position:",
            "while mapping `explode' at prog:3:1 over ioexec.unit (1), at undefined position:",
        ]
    );
}

#[test]
fn finished_joins_are_not_in_the_trace() {
    let state = state();
    let program = map(failing("explode"), join(unit(unit(Value::Int(1)))));
    let err = traced_runner()
        .run(&state, &program, &Pos::none())
        .unwrap_err();
    assert_eq!(err.frames().len(), 1);
    assert!(err.frames()[0].starts_with("while mapping `explode'"));
}

#[test]
fn deep_trace_renders_and_drops() {
    let state = state();
    let id = LazyValue::new(Value::lambda(Some("id"), Pos::none(), |_, x| Ok(x)));
    let mut program = unit(LazyValue::thunk(|_| Err(Error::eval("boom"))));
    for _ in 0..100_000 {
        program = map(id.clone(), program);
    }

    let err = traced_runner()
        .run(&state, &program, &Pos::none())
        .unwrap_err();
    drop(program);
    assert_eq!(err.frames().len(), 100_000);

    let rendered = err.to_string();
    assert!(rendered.ends_with("\nboom"));
    assert_eq!(rendered.lines().count(), 100_001);
    drop(err);
}

/// A payload that counts how often it is rendered.
struct Rendered(Arc<AtomicUsize>);

impl std::fmt::Display for Rendered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fetch_add(1, Ordering::SeqCst);
        write!(f, "rendered")
    }
}

impl ExternalValue for Rendered {
    fn show_type(&self) -> &'static str {
        self.0.fetch_add(1, Ordering::SeqCst);
        "a rendered value"
    }

    fn type_of(&self) -> &'static str {
        "rendered"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[test]
fn trace_text_is_only_built_when_enabled() {
    let state = state();
    let renders = Arc::new(AtomicUsize::new(0));
    let payload = Value::external(Rendered(Arc::clone(&renders)));
    let program = map(add_n(1), map(failing("explode"), unit(payload)));

    let err = runner().run(&state, &program, &Pos::none()).unwrap_err();
    assert_eq!(err.to_string(), "boom");
    assert_eq!(renders.load(Ordering::SeqCst), 0);

    let err = traced_runner()
        .run(&state, &program, &Pos::none())
        .unwrap_err();
    assert!(err.frames()[1].contains("<a rendered value>"));
    assert!(renders.load(Ordering::SeqCst) > 0);
}

fn run_int(runner: &Runner, state: &EvalState, program: &LazyValue) -> i64 {
    let result = runner.run(state, program, &Pos::none()).unwrap();
    int(state, &result)
}

fn combine(a: i64, b: i64) -> i64 {
    a * 31 + b
}

proptest! {
    #[test]
    fn left_identity(x in -1_000_000i64..1_000_000, n in -1_000i64..1_000) {
        let state = state();
        let runner = runner();

        let mapped = map(add_n(n), unit(Value::Int(x)));
        let applied = state
            .call_function(&add_n(n).into(), Value::Int(x).into(), &Pos::none())
            .unwrap();

        prop_assert_eq!(
            run_int(&runner, &state, &mapped),
            run_int(&runner, &state, &unit(applied))
        );
    }

    #[test]
    fn join_is_associative(a in -1_000i64..1_000, b in -1_000i64..1_000) {
        let state = state();
        let runner = runner();
        let ma = unit(Value::Int(a));
        let mb = unit(Value::Int(b));

        let inner_mb = mb.clone();
        let left = join(map(
            Value::lambda(None, Pos::none(), move |state, a| {
                let a = state.force_int(&a, &Pos::none())?;
                Ok(join(map(
                    Value::lambda(None, Pos::none(), move |state, b| {
                        let b = state.force_int(&b, &Pos::none())?;
                        Ok(unit(Value::Int(combine(a, b))))
                    }),
                    inner_mb.clone(),
                )))
            }),
            ma.clone(),
        ));

        let right = join(join(map(
            Value::lambda(None, Pos::none(), move |state, a| {
                let a = state.force_int(&a, &Pos::none())?;
                Ok(map(
                    Value::lambda(None, Pos::none(), move |state, b| {
                        let b = state.force_int(&b, &Pos::none())?;
                        Ok(unit(Value::Int(combine(a, b))))
                    }),
                    mb.clone(),
                ))
            }),
            ma,
        )));

        let expected = combine(a, b);
        prop_assert_eq!(run_int(&runner, &state, &left), expected);
        prop_assert_eq!(run_int(&runner, &state, &right), expected);
    }
}
