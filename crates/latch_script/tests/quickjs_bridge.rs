//! QuickJS adapter driven through the engine-agnostic runtime.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use latch_interop::{from_dynamic, InteropError, ManagedHandle, NativeArray, NativeObject};
use latch_script::{
    EngineKind, RuntimeConfig, RuntimeState, ScriptError, ScriptRuntime, ScriptValue,
};
use serde_json::json;

fn runtime() -> ScriptRuntime {
    ScriptRuntime::with_kind(EngineKind::QuickJs, &RuntimeConfig::default()).unwrap()
}

fn eval(runtime: &mut ScriptRuntime, source: &str) -> serde_json::Value {
    runtime.evaluate(source).unwrap().into_dynamic().unwrap()
}

struct Counter {
    value: i64,
    drops: Arc<AtomicUsize>,
}

impl Drop for Counter {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn evaluates_primitive_results() {
    let mut runtime = runtime();
    assert_eq!(eval(&mut runtime, "1 + 2"), json!(3));
    assert_eq!(eval(&mut runtime, "0.5 * 3"), json!(1.5));
    assert_eq!(eval(&mut runtime, "2 ** 40"), json!(1_099_511_627_776i64));
    assert_eq!(eval(&mut runtime, "'a' + 'b'"), json!("ab"));
    assert_eq!(eval(&mut runtime, "!0"), json!(true));
    assert_eq!(eval(&mut runtime, "undefined"), json!(null));
    assert_eq!(eval(&mut runtime, "null"), json!(null));
}

#[test]
fn evaluates_structured_results() {
    let mut runtime = runtime();
    let value = eval(
        &mut runtime,
        "({ name: 'latch', tags: [1, 'two', false, null], nested: { ok: true } })",
    );
    assert_eq!(
        value,
        json!({ "name": "latch", "tags": [1, "two", false, null], "nested": { "ok": true } })
    );
}

#[test]
fn globals_persist_between_evaluations() {
    let mut runtime = runtime();
    runtime.evaluate("var total = 10;").unwrap();
    assert_eq!(eval(&mut runtime, "total += 5; total"), json!(15));
}

#[test]
fn script_exception_is_structured_and_runtime_stays_ready() {
    let mut runtime = runtime();
    let err = runtime.evaluate("throw new Error('boom')").unwrap_err();
    match err {
        ScriptError::ScriptException { message, stack } => {
            assert_eq!(message, "boom");
            assert!(stack.is_some());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(runtime.state(), RuntimeState::Ready);
    assert_eq!(eval(&mut runtime, "40 + 2"), json!(42));
}

#[test]
fn thrown_non_error_values_are_described() {
    let mut runtime = runtime();
    let err = runtime.evaluate("throw 'plain'").unwrap_err();
    assert!(matches!(err, ScriptError::ScriptException { ref message, .. } if message == "plain"));
}

#[test]
fn syntax_error_is_script_exception() {
    let mut runtime = runtime();
    let err = runtime.evaluate("function (").unwrap_err();
    assert!(matches!(err, ScriptError::ScriptException { .. }));
    assert_eq!(runtime.state(), RuntimeState::Ready);
}

#[test]
fn invoke_passes_dynamic_arguments() {
    let mut runtime = runtime();
    runtime
        .evaluate(
            "function describe(n, s, list, obj) {
                return { sum: n + list.length, text: s.toUpperCase(), key: obj.key };
            }",
        )
        .unwrap();

    let result = runtime
        .invoke(
            "describe",
            vec![
                json!(3).into(),
                json!("abc").into(),
                json!([1, 2]).into(),
                json!({ "key": [true] }).into(),
            ],
        )
        .unwrap();
    assert_eq!(result, ScriptValue::Value(json!({ "sum": 5, "text": "ABC", "key": [true] })));
}

#[test]
fn native_array_crosses_into_script() {
    let mut runtime = runtime();
    runtime.evaluate("function first(xs) { return xs[0]; }").unwrap();

    let mut array = NativeArray::new();
    array.push(1i32);
    array.push("a");
    array.push(true);
    let arg = ScriptValue::from_native(&NativeObject::from(array)).unwrap();

    let result = runtime.invoke("first", vec![arg]).unwrap();
    assert!(result.to_native().deep_eq(&from_dynamic(&json!(1))));
}

#[test]
fn invoking_missing_function_fails() {
    let mut runtime = runtime();
    runtime.evaluate("var notAFunction = 1;").unwrap();
    assert!(matches!(
        runtime.invoke("missing", vec![]),
        Err(ScriptError::FunctionNotFound(ref name)) if name == "missing"
    ));
    assert!(matches!(
        runtime.invoke("notAFunction", vec![]),
        Err(ScriptError::FunctionNotFound(_))
    ));
    assert_eq!(runtime.state(), RuntimeState::Ready);
}

#[test]
fn exception_inside_invoke_is_caught() {
    let mut runtime = runtime();
    runtime.evaluate("function fail(reason) { throw new TypeError(reason); }").unwrap();
    let err = runtime.invoke("fail", vec![json!("bad input").into()]).unwrap_err();
    assert!(matches!(
        err,
        ScriptError::ScriptException { ref message, .. } if message == "bad input"
    ));
    assert_eq!(runtime.state(), RuntimeState::Ready);
}

#[test]
fn unsafe_integers_are_rejected() {
    let mut runtime = runtime();
    runtime.evaluate("function id(x) { return x; }").unwrap();

    let err = runtime
        .invoke("id", vec![json!([1, 9_007_199_254_740_993i64]).into()])
        .unwrap_err();
    match err {
        ScriptError::Conversion(InteropError::ConversionMismatch { path, .. }) => {
            assert_eq!(path, "/1")
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let safe = runtime.invoke("id", vec![json!(9_007_199_254_740_991i64).into()]).unwrap();
    assert_eq!(safe, ScriptValue::Value(json!(9_007_199_254_740_991i64)));
}

#[test]
fn functions_have_no_dynamic_form() {
    let mut runtime = runtime();
    let err = runtime.evaluate("({ callback: function () {} })").unwrap_err();
    match err {
        ScriptError::Conversion(InteropError::UnsupportedType { path, .. }) => {
            assert_eq!(path, "/callback")
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(runtime.state(), RuntimeState::Ready);
}

#[test]
fn handles_round_trip_through_script() {
    let mut runtime = runtime();
    runtime
        .evaluate(
            "var kept;
             function keep(x) { kept = x; return x; }
             function recall() { return kept; }",
        )
        .unwrap();

    let handle = ManagedHandle::wrap(String::from("opaque"));
    let returned = runtime.invoke("keep", vec![handle.clone().into()]).unwrap();
    assert!(returned.as_handle().unwrap().ptr_eq(&handle));

    let recalled = runtime.invoke("recall", vec![]).unwrap();
    assert_eq!(recalled.as_handle().unwrap().void_pointer(), handle.void_pointer());
}

#[test]
fn native_function_receives_handles_and_values() {
    let mut runtime = runtime();
    runtime
        .register_function("counterValue", |args| {
            let handle = args
                .first()
                .and_then(ScriptValue::as_handle)
                .ok_or_else(|| ScriptError::exception("expected a counter handle"))?;
            let counter = handle.unwrap::<Counter>()?;
            Ok(json!(counter.value).into())
        })
        .unwrap();
    runtime
        .evaluate(
            "var last;
             function bump(counter, by) { last = counter; return counterValue(counter) + by; }",
        )
        .unwrap();

    let drops = Arc::new(AtomicUsize::new(0));
    let handle = ManagedHandle::wrap(Counter {
        value: 5,
        drops: Arc::clone(&drops),
    });

    let first = runtime.invoke("bump", vec![handle.clone().into(), json!(1).into()]).unwrap();
    let second = runtime.invoke("bump", vec![handle.clone().into(), json!(2).into()]).unwrap();
    assert_eq!(first, ScriptValue::Value(json!(6)));
    assert_eq!(second, ScriptValue::Value(json!(7)));

    // The script still references the handle through `last`.
    drop(handle);
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    runtime.dispose();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn native_function_errors_become_catchable_exceptions() {
    let mut runtime = runtime();
    runtime
        .register_function("fail", |_| Err(ScriptError::Engine("native failure".into())))
        .unwrap();

    let message = eval(&mut runtime, "try { fail(); 'unreachable' } catch (e) { e.message }");
    assert!(message.as_str().unwrap().contains("native failure"));

    let err = runtime.evaluate("fail()").unwrap_err();
    assert!(matches!(
        err,
        ScriptError::ScriptException { ref message, .. } if message.contains("native failure")
    ));
}

#[test]
fn native_function_returns_structured_values() {
    let mut runtime = runtime();
    runtime
        .register_function("sum", |args| {
            let mut total = 0.0;
            for arg in &args {
                total += arg.as_dynamic().and_then(|v| v.as_f64()).unwrap_or_default();
            }
            Ok(json!({ "total": total, "count": args.len() }).into())
        })
        .unwrap();

    assert_eq!(eval(&mut runtime, "sum(1, 2, 3.5)"), json!({ "total": 6.5, "count": 3 }));
    assert_eq!(eval(&mut runtime, "sum(2, 3).total"), json!(5));
}

#[test]
fn cyclic_values_fail_without_crashing() {
    let mut runtime = runtime();
    let err = runtime.evaluate("var a = {}; a.self = a; a").unwrap_err();
    match err {
        ScriptError::Conversion(InteropError::UnsupportedType { type_name, path }) => {
            assert_eq!(type_name, "cyclic object");
            assert_eq!(path, "/self");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = runtime.evaluate("var b = [1]; b.push({ inner: b }); b").unwrap_err();
    assert_eq!(err.to_string(), InteropError::unsupported("cyclic object", "/1/inner").to_string());
    assert_eq!(runtime.state(), RuntimeState::Ready);

    // Shared but acyclic references still convert.
    let shared = eval(&mut runtime, "var x = { v: 1 }; ({ a: x, b: [x] })");
    assert_eq!(shared, json!({ "a": { "v": 1 }, "b": [{ "v": 1 }] }));
}

#[test]
fn deep_nesting_fails_without_crashing() {
    let mut runtime = runtime();
    let err = runtime
        .evaluate("var deep = []; for (let i = 0; i < 100000; i++) { deep = [deep]; } deep")
        .unwrap_err();
    assert!(matches!(err, ScriptError::Conversion(InteropError::UnsupportedType { .. })));
    assert_eq!(eval(&mut runtime, "[[[[1]]]]"), json!([[[[1]]]]));
}

#[test]
fn objects_with_behavior_are_rejected() {
    let mut runtime = runtime();
    let cases = [
        ("new Map([['a', 1], ['b', 2]])", "Map"),
        ("new Set([1])", "Set"),
        ("new Date(0)", "Date"),
        ("Promise.resolve(5)", "Promise"),
        ("new Uint8Array(4)", "Uint8Array"),
        ("class Point { constructor() { this.x = 1; } }; new Point()", "Point"),
    ];
    for (source, class) in cases {
        match runtime.evaluate(source).unwrap_err() {
            ScriptError::Conversion(InteropError::UnsupportedType { type_name, path }) => {
                assert_eq!(type_name, class, "{source}");
                assert_eq!(path, "");
            }
            other => panic!("unexpected error for {source}: {other:?}"),
        }
    }

    let err = runtime.evaluate("({ when: new Date(0) })").unwrap_err();
    assert!(matches!(
        err,
        ScriptError::Conversion(InteropError::UnsupportedType { ref path, .. }) if path == "/when"
    ));

    // Prototype-less records are still plain data.
    assert_eq!(
        eval(&mut runtime, "var o = Object.create(null); o.k = 'v'; o"),
        json!({ "k": "v" })
    );
}

#[test]
fn handle_shaped_data_stays_data() {
    let mut runtime = runtime();
    runtime.evaluate("function id(x) { return x; }").unwrap();

    let pinned = ManagedHandle::wrap(1u8);
    runtime.invoke("id", vec![pinned.into()]).unwrap();

    let data = json!({ "__latch_handle": 1 });
    let echoed = runtime.invoke("id", vec![data.clone().into()]).unwrap();
    assert_eq!(echoed, ScriptValue::Value(data));

    let forged = runtime.evaluate("({ __latch_handle: 1 })").unwrap();
    assert!(forged.as_handle().is_none());
    assert_eq!(forged, ScriptValue::Value(json!({ "__latch_handle": 1 })));
}

#[test]
fn handles_dropped_by_scripts_are_released() {
    let mut runtime = runtime();
    runtime.evaluate("function ignore(x) { return null; }").unwrap();

    let drops = Arc::new(AtomicUsize::new(0));
    for value in 0..1000 {
        let handle = ManagedHandle::wrap(Counter {
            value,
            drops: Arc::clone(&drops),
        });
        runtime.invoke("ignore", vec![handle.into()]).unwrap();
    }
    assert_eq!(drops.load(Ordering::SeqCst), 1000);
}

#[test]
fn handles_held_by_scripts_outlive_host_clones() {
    let mut runtime = runtime();
    runtime.evaluate("var held = []; function hold(x) { held.push(x); }").unwrap();

    let drops = Arc::new(AtomicUsize::new(0));
    let handle = ManagedHandle::wrap(Counter {
        value: 1,
        drops: Arc::clone(&drops),
    });
    runtime.invoke("hold", vec![handle.clone().into()]).unwrap();
    drop(handle);
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    runtime.evaluate("held.length = 0;").unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn calls_after_dispose_fail() {
    let mut runtime = runtime();
    runtime.evaluate("function f() { return 1; }").unwrap();
    runtime.dispose();

    assert_eq!(runtime.state(), RuntimeState::Disposed);
    assert!(matches!(runtime.evaluate("1"), Err(ScriptError::RuntimeDisposed)));
    assert!(matches!(runtime.invoke("f", vec![]), Err(ScriptError::RuntimeDisposed)));
    assert!(matches!(
        runtime.register_function("g", |_| Ok(ScriptValue::null())),
        Err(ScriptError::RuntimeDisposed)
    ));
}

#[test]
fn runtimes_are_isolated() {
    let mut first = runtime();
    let mut second = runtime();
    first.evaluate("var shared = 'first';").unwrap();
    assert_eq!(eval(&mut second, "typeof shared"), json!("undefined"));
}

#[test]
fn evaluates_files() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "var fromFile = [1, 2, 3];").unwrap();
    writeln!(file, "fromFile.map(x => x * 2)").unwrap();

    let mut runtime = runtime();
    let value = runtime.evaluate_file(file.path()).unwrap();
    assert_eq!(value, ScriptValue::Value(json!([2, 4, 6])));

    let missing = runtime.evaluate_file(std::path::Path::new("/definitely/not/here.js"));
    assert!(matches!(missing, Err(ScriptError::Io(_))));
}

#[test]
fn memory_limit_is_enforced() {
    let config = RuntimeConfig {
        memory_limit: Some(2 * 1024 * 1024),
        ..RuntimeConfig::default()
    };
    let mut runtime = ScriptRuntime::with_kind(EngineKind::QuickJs, &config).unwrap();
    let result = runtime
        .evaluate("let xs = []; for (let i = 0; i < 1e7; i++) { xs.push('item' + i); } xs.length");
    assert!(result.is_err());
    assert_eq!(runtime.state(), RuntimeState::Ready);
}
