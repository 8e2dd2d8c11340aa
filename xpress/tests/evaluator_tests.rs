//! End-to-end evaluation through the public API: parse a template, evaluate
//! it against a namespace of host values, and compare the result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use xpress::template::{
    parse, Callable, CancelHandle, EvalError, Evaluator, Kind, Namespace, Options, Output,
    RecordType, ReturnKind, Signature, Value,
};

// ── Fixture ───────────────────────────────────────────────────────────────────

fn deep_object() -> Value {
    Value::map([(
        "deep",
        Value::map([(
            "object",
            Value::map([("with", Value::map([("values", Value::list([3i64, 2, 1]))]))]),
        )]),
    )])
}

fn unary_math(name: &'static str, f: fn(f64) -> f64) -> (&'static str, Value) {
    let c = Callable::func(name, Signature::new([Kind::Float]), move |args| {
        Value::Float(f(args[0].as_f64().unwrap_or_default()))
    });
    (name, c.into())
}

fn binary_math(name: &'static str, f: fn(f64, f64) -> f64) -> (&'static str, Value) {
    let c = Callable::func(name, Signature::new([Kind::Float, Kind::Float]), move |args| {
        let a = args[0].as_f64().unwrap_or_default();
        let b = args[1].as_f64().unwrap_or_default();
        Value::Float(f(a, b))
    });
    (name, c.into())
}

struct Account {
    owner: String,
    balance: i64,
}

fn members() -> Namespace {
    let mut ns = Namespace::new();

    ns.insert(
        "math".into(),
        Value::map([
            unary_math("abs", f64::abs),
            unary_math("ceil", f64::ceil),
            unary_math("floor", f64::floor),
            unary_math("sqrt", f64::sqrt),
            binary_math("pow", f64::powf),
            binary_math("max", f64::max),
            binary_math("min", f64::min),
        ]),
    );

    ns.insert(
        "concat".into(),
        Callable::contextual("concat", Signature::new([]).variadic(Kind::Str), |_, args| {
            Ok(args.iter().filter_map(Value::as_str).collect::<String>().into())
        })
        .into(),
    );

    ns.insert(
        "getDeepObject".into(),
        Callable::contextual("getDeepObject", Signature::new([]).variadic(Kind::Any), |_, _| {
            Ok(deep_object())
        })
        .into(),
    );
    ns.insert("deepObject".into(), deep_object());

    ns.insert(
        "waitMs".into(),
        Callable::func("waitMs", Signature::new([Kind::Int]), |args| {
            if let Value::Int(ms) = args[0] {
                std::thread::sleep(Duration::from_millis(ms as u64));
            }
            Value::Bool(true)
        })
        .into(),
    );

    ns.insert(
        "longLoopWithContext".into(),
        Callable::contextual("longLoopWithContext", Signature::new([]), |ctx, _| {
            let started = Instant::now();
            while started.elapsed() < Duration::from_secs(2) {
                if ctx.is_cancelled() {
                    return Err("context cancelled".into());
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            Ok(Value::Bool(true))
        })
        .into(),
    );

    ns.insert(
        "funcable".into(),
        Callable::func("funcable", Signature::new([]), |_| {
            Callable::with_context("hosted", Signature::new([Kind::Str]), |_, args| {
                vec![Output::value(format!("a function with {}", args[0]))]
            })
            .into()
        })
        .into(),
    );

    ns.insert(
        "someObject".into(),
        Value::map([
            ("key", Value::from("value")),
            ("nested", Value::map([("key1", "value2")])),
        ]),
    );

    ns.insert(
        "threeReturns".into(),
        Callable::new(
            "threeReturns",
            Signature::new([]).returns([
                ReturnKind::Value(Kind::Any),
                ReturnKind::Value(Kind::Any),
                ReturnKind::Value(Kind::Any),
            ]),
            |_| vec![Output::value(1i64), Output::value(2i64), Output::value(3i64)],
        )
        .into(),
    );
    ns.insert(
        "notErrorSecond".into(),
        Callable::new(
            "notErrorSecond",
            Signature::new([])
                .returns([ReturnKind::Value(Kind::Any), ReturnKind::Value(Kind::Str)]),
            |_| vec![Output::value(1i64), Output::value("oops")],
        )
        .into(),
    );
    ns.insert(
        "failing".into(),
        Callable::fallible("failing", Signature::new([]), |_| Err("host said no".into())).into(),
    );

    let account = RecordType::<Account>::builder("Account")
        .field("owner", |a| a.owner.clone().into())
        .field("balance", |a| a.balance.into())
        .method("describe", |a| {
            Callable::func("describe", Signature::new([]), move |_| {
                format!("{} has {}", a.owner, a.balance).into()
            })
        })
        .ref_method("deposit", |a| {
            Callable::func("deposit", Signature::new([Kind::Int]), move |args| match args[0] {
                Value::Int(n) => Value::Int(a.balance + n),
                _ => Value::Nil,
            })
        })
        .build();
    ns.insert(
        "account".into(),
        account
            .instance(Account {
                owner: "ada".into(),
                balance: 10,
            })
            .into(),
    );
    ns.insert(
        "accountRef".into(),
        account
            .reference(Arc::new(Account {
                owner: "grace".into(),
                balance: 20,
            }))
            .into(),
    );

    ns
}

fn evaluator(timeout: Duration) -> Evaluator {
    Evaluator::with_members(members())
        .with_options(Options::default().with_timeout(timeout))
}

async fn eval(src: &str) -> Result<Value, EvalError> {
    evaluator(Duration::from_secs(2))
        .evaluate(Arc::new(parse(src)))
        .await
}

// ── Success table ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn success_cases() {
    let cases: Vec<(&str, Value)> = vec![
        ("Just raw text", "Just raw text".into()),
        ("@{{ 123 * (45.67) }}", Value::Float(123.0 * 45.67)),
        ("@{{-123 * (45.67) }} juxtaposed", "-5617.41 juxtaposed".into()),
        ("@{{-123 * (45.67) }} ", "-5617.41 ".into()),
        ("@{{-123 * (45.67) }}", Value::Float(-5617.41)),
        (
            r#"@{{ 3 * 3 }} with text in-between @{{ true ? "changed" : "not changed" }}"#,
            "9 with text in-between changed".into(),
        ),
        (
            r#"@{{'@{{'}} 3 * 3 }} escaped template with template after @{{ true ? "yes" : "no" }}"#,
            "@{{ 3 * 3 }} escaped template with template after yes".into(),
        ),
        ("@{{ true ? 1 : 2 }}", Value::Float(1.0)),
        ("@{{ false ? 1 : 2 }}", Value::Float(2.0)),
        ("@{{ 4 * 4 }}", Value::Float(16.0)),
        ("@{{ 4 + 4 }}", Value::Float(8.0)),
        ("@{{ 4 + -4 }}", Value::Float(0.0)),
        ("@{{ 10 - 4 }}", Value::Float(6.0)),
        ("@{{ 8 / 4 }}", Value::Float(2.0)),
        ("@{{ 5 > 4 }}", true.into()),
        ("@{{ 3 > 4 }}", false.into()),
        ("@{{ 5 < 4 }}", false.into()),
        ("@{{ 4 < 5 }}", true.into()),
        ("@{{ 5 == 5 }}", true.into()),
        ("@{{ 5 == 4 }}", false.into()),
        ("@{{ 5 != 5 }}", false.into()),
        ("@{{ 5 != 6 }}", true.into()),
        ("@{{ 5 >= 4 }}", true.into()),
        ("@{{ 5 >= 5 }}", true.into()),
        ("@{{ 5 >= 6 }}", false.into()),
        ("@{{ 5 <= 4 }}", false.into()),
        ("@{{ 5 <= 5 }}", true.into()),
        ("@{{ math.abs(-5) }}", Value::Float(5.0)),
        ("@{{ math.pow(2, 3) + 56 / 4 * 6 }}", Value::Float(92.0)),
        ("@{{ 'a' <= 'b' }}", true.into()),
        ("@{{ 'b' <= 'b' }}", true.into()),
        ("@{{ 'c' <= 'a' }}", false.into()),
        ("@{{ 'a' >= 'b' }}", false.into()),
        ("@{{ 'b' >= 'b' }}", true.into()),
        ("@{{ 'c' >= 'a' }}", true.into()),
        ("@{{ 'a' < 'b' }}", true.into()),
        ("@{{ 'b' < 'b' }}", false.into()),
        ("@{{ 'c' > 'b' }}", true.into()),
        ("@{{ true }}", true.into()),
        ("@{{ !true }}", false.into()),
        ("@{{ !false }}", true.into()),
        ("@{{ !nil }}", true.into()),
        ("@{{ !0 }}", false.into()),
        ("@{{ true && true}}", true.into()),
        ("@{{ true && false}}", false.into()),
        ("@{{ false || false}}", false.into()),
        ("@{{ true or false }}", true.into()),
        ("@{{ true and false }}", false.into()),
        ("@{{ 4 > 5 && 5 == 5 }}", false.into()),
        ("@{{ 4 > 5 || 5 == 5 }}", true.into()),
        ("@{{ (4 > 5 || 5) }}", true.into()),
        ("@{{ (4 > 5 && 5) }}", false.into()),
        ("@{{ (4 > 5 || 5) == true}}", true.into()),
        ("@{{ (4 > 5 && 5) == true}}", false.into()),
        ("@{{ true && false && true}}", false.into()),
        (r#"@{{ "a string" == "a string"}}"#, true.into()),
        (r#"@{{ "a string" != "a different string"}}"#, true.into()),
        (r#"@{{ "a string" == "a different string"}}"#, false.into()),
        (
            r#"@{{[1, 2, true, "a"]}}"#,
            Value::list([Value::Float(1.0), Value::Float(2.0), true.into(), "a".into()]),
        ),
        (r#"@{{[1, 2, true, "a"]}} "#, "[1 2 true a] ".into()),
        (r#"@{{ "a string" + " " + "Joined" }}"#, "a string Joined".into()),
        (
            r#"@{{ concat("string", "joined by", "another") }}"#,
            "stringjoined byanother".into(),
        ),
        (
            r#"@{{ concat("string", " ", concat("with another", concat(" ", "recursive"))) }}"#,
            "string with another recursive".into(),
        ),
        ("@{{ concat() }}", "".into()),
        (
            "@{{ getDeepObject().deep.object.with.values }}",
            Value::list([3i64, 2, 1]),
        ),
        ("@{{ getDeepObject().deep.object.with.values[0] }}", Value::Int(3)),
        ("@{{ deepObject.deep.object.with.values.length }}", Value::Int(3)),
        ("@{{ funcable()('host') }}", "a function with host".into()),
        ("@{{ someObject.key }}", "value".into()),
        ("@{{ someObject['key'] }}", "value".into()),
        ("@{{ someObject.nested.key1 }}", "value2".into()),
        ("@{{ someObject['nested'].key1 }}", "value2".into()),
        ("@{{ someObject.nested['key1'] }}", "value2".into()),
        ("@{{ someObject['nested']['key1'] }}", "value2".into()),
        ("@{{ someObject.missing }}", Value::Nil),
        ("@{{ 7 % 3 }}", Value::Float(1.0)),
        ("@{{ 0x10 + 0b11 }}", Value::Float(19.0)),
        (r#"@{{ "tab\there" }}"#, "tab\there".into()),
        ("@{{ {a: 1}.a }}", Value::Float(1.0)),
        ("@{{ account.owner }}", "ada".into()),
        ("@{{ account.describe() }}", "ada has 10".into()),
        ("@{{ account.deposit(5) }}", Value::Int(15)),
        ("@{{ account['balance'] }}", Value::Int(10)),
        ("@{{ account.balance == 10 }}", true.into()),
        ("@{{ deepObject.deep.object.with.values.length == 3 }}", true.into()),
    ];

    let ev = evaluator(Duration::from_secs(2));
    for (src, expected) in cases {
        let got = ev.evaluate(Arc::new(parse(src))).await;
        match got {
            Ok(v) => assert_eq!(v, expected, "template: {src}"),
            Err(e) => panic!("template {src:?} failed: {e}"),
        }
    }
}

// ── Error table ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn error_cases() {
    let cases = [
        ("@{{ 5 > }}", "parse error: Error at position 8. Expect expression. got }}"),
        (
            "@{{ 5 ",
            "parse error: Error at position 6. Expect '}}' after expression. got unclosed action",
        ),
        ("@{{ 5 6 }}", "parse error: Error at position 6. Expect '}}' after expression. got 6"),
        (
            "@{{ nonexistentFunction() }}",
            "cannot call non-function 'nonexistentFunction' of type <nil>",
        ),
        ("@{{ 'abc }}", "parse error: Error at position 4. unterminated string"),
        ("@{{ 1 / 0 }}", "division by zero"),
        ("@{{ math.abs('x') }}", "function 'abs': argument 1 (\"x\") cannot be used as float"),
        ("@{{ math.pow(2) }}", "function 'pow' expects 2 arguments, got 1"),
        ("@{{ failing() }}", "function 'failing' failed: host said no"),
        ("@{{ account.nope }}", "unknown property 'nope' on Account"),
    ];

    let ev = evaluator(Duration::from_secs(2));
    for (src, msg) in cases {
        let err = ev.evaluate(Arc::new(parse(src))).await.unwrap_err();
        assert_eq!(err.to_string(), msg, "template: {src}");
        assert!(!err.is_cancellation());
    }
}

#[tokio::test]
async fn out_of_range_index_is_always_an_error() {
    for idx in ["3", "-1"] {
        let src = format!("@{{{{ deepObject.deep.object.with.values[{idx}] }}}}");
        let err = eval(&src).await.unwrap_err();
        assert!(matches!(err, EvalError::IndexOutOfRange { .. }), "{err}");
        assert!(err.to_string().contains(&format!("index {idx} ")), "{err}");
    }
}

#[tokio::test]
async fn return_shape_violations_name_the_function() {
    let err = eval("@{{ threeReturns() }}").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "function 'threeReturns': must return 1 or 2 values, declared 3"
    );

    let err = eval("@{{ notErrorSecond() }}").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "function 'notErrorSecond': second return value must be an error, declared string"
    );
}

// ── Optional chaining ─────────────────────────────────────────────────────────

#[tokio::test]
async fn optional_chain_resolves() {
    let v = eval("@{{ getDeepObject?.()?.deep?.object?.with?.values?.[0] }}")
        .await
        .unwrap();
    assert_eq!(v, Value::Int(3));
}

#[tokio::test]
async fn optional_chain_hits_nil() {
    let v = eval("@{{ someObject.nonexistent?.deply['nonexistent'].path }}")
        .await
        .unwrap();
    assert_eq!(v, Value::Nil);

    let v = eval("value: @{{ undefinedThing?.a.b.c }}").await.unwrap();
    assert_eq!(v, Value::from("value: <nil>"));
}

#[tokio::test]
async fn coalesce_skips_right_side() {
    assert_eq!(eval("@{{ 5 ?? dsfsd.fsdf.f }}").await.unwrap(), Value::Float(5.0));
    assert_eq!(
        eval("@{{ someObject?.nested?.missing ?? 'default' }}").await.unwrap(),
        Value::from("default")
    );
}

// ── Timeout and cancellation ──────────────────────────────────────────────────

#[tokio::test]
async fn blocking_host_call_times_out() {
    let ev = evaluator(Duration::from_millis(5));
    let started = Instant::now();
    let err = ev.evaluate(Arc::new(parse("@{{ waitMs(100) }}"))).await.unwrap_err();
    assert_eq!(err.to_string(), "evaluation timed out after 5ms");
    assert!(err.is_cancellation());
    assert!(started.elapsed() < Duration::from_millis(90));
}

#[tokio::test]
async fn context_aware_host_call_times_out() {
    let ev = evaluator(Duration::from_millis(5));
    let err = ev
        .evaluate(Arc::new(parse("@{{ longLoopWithContext() }}")))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "evaluation timed out after 5ms");
}

#[tokio::test]
async fn caller_cancellation() {
    let ev = evaluator(Duration::from_secs(30));
    let handle = CancelHandle::new();
    handle.cancel();
    let err = ev
        .evaluate_with_cancel(Arc::new(parse("@{{ longLoopWithContext() }}")), handle)
        .await
        .unwrap_err();
    assert!(matches!(err, EvalError::Cancelled), "{err}");
}

// ── Concurrency ───────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_ast_many_concurrent_evaluations() {
    let ev = evaluator(Duration::from_secs(5));
    let ast = Arc::new(parse("@{{ n * 2 }}"));
    ev.add_member("n", 21i64).await;

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let ev = ev.clone();
        let ast = Arc::clone(&ast);
        tasks.push(tokio::spawn(async move { ev.evaluate(ast).await }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), Value::Float(42.0));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn writers_wait_for_readers() {
    let ev = evaluator(Duration::from_secs(5));
    ev.add_member("v", 1i64).await;

    let reader = {
        let ev = ev.clone();
        let ast = Arc::new(parse("@{{ waitMs(80) ? v : v }}"));
        tokio::spawn(async move { ev.evaluate(ast).await })
    };
    tokio::time::sleep(Duration::from_millis(15)).await;
    let write_started = Instant::now();
    ev.add_member("v", 2i64).await;

    // The write could only land once the reader released its lock.
    assert!(write_started.elapsed() >= Duration::from_millis(40));
    assert_eq!(reader.await.unwrap().unwrap(), Value::Int(1));
    assert_eq!(eval_with(&ev, "@{{ v }}").await, Value::Int(2));
}

// ── Records ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn addressable_record_resolves_both_receivers() {
    let ev = evaluator(Duration::from_secs(2));
    // Declared for the reference receiver: exact match.
    assert_eq!(eval_with(&ev, "@{{ accountRef.deposit(1) }}").await, Value::Int(21));
    // Declared for the value receiver: reached through the fallback.
    assert_eq!(
        eval_with(&ev, "@{{ accountRef.describe() }}").await,
        Value::from("grace has 20")
    );
    assert_eq!(eval_with(&ev, "@{{ accountRef.owner }}").await, Value::from("grace"));
    assert_eq!(eval_with(&ev, "@{{ accountRef['balance'] }}").await, Value::Int(20));
    assert_eq!(
        eval_with(&ev, "@{{ accountRef }}").await.to_string(),
        "Account{owner:grace balance:20}"
    );
}

#[tokio::test]
async fn records_compare_by_identity() {
    let ev = evaluator(Duration::from_secs(2));
    assert_eq!(eval_with(&ev, "@{{ accountRef == accountRef }}").await, Value::Bool(true));
    assert_eq!(eval_with(&ev, "@{{ account == accountRef }}").await, Value::Bool(false));
}

#[tokio::test]
async fn record_method_missing_on_both_receivers() {
    let err = eval("@{{ accountRef.withdraw(1) }}").await.unwrap_err();
    assert_eq!(err.to_string(), "unknown property 'withdraw' on Account");
    assert_eq!(eval("@{{ accountRef?.withdraw }}").await.unwrap(), Value::Nil);
}

// ── Nesting ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn deep_nesting_fails_without_crashing() {
    let src = format!("@{{{{ {}1 }}}}", "(".repeat(100_000));
    let err = eval(&src).await.unwrap_err();
    assert!(matches!(err, EvalError::Parse { .. }), "{err}");
    assert!(err.to_string().contains("nested too deeply"), "{err}");

    let src = format!("@{{{{ {}1{} }}}}", "(".repeat(60), ")".repeat(60));
    assert_eq!(eval(&src).await.unwrap(), Value::Float(1.0));
}

async fn eval_with(ev: &Evaluator, src: &str) -> Value {
    ev.evaluate(Arc::new(parse(src))).await.unwrap()
}
