//! End-to-end scenarios exercising the loader, linker and interpreter together.

use assert_matches::assert_matches;
use wasm_engine::{
    decode_and_validate, invoke_export, Config, Environment, Error, NopExternals, RuntimeValue, TrapKind,
};

fn wasm(source: &str) -> Vec<u8> {
    wat::parse_str(source).expect("failed to parse wat")
}

#[test]
fn linking_rejects_import_signature_mismatch() {
    let definer = wasm(
        r#"
        (module
            (func (export "call") (result i64)
                i64.const 0
            )
        )
        "#,
    );
    let importer = wasm(
        r#"
        (module
            (import "Mf" "call" (func (result i32)))
        )
        "#,
    );

    let mut env = Environment::new();
    let definer = decode_and_validate(&definer).unwrap();
    env.instantiate(&definer, Some("Mf")).unwrap();

    let mark_before_attempt = env.mark();
    let importer = decode_and_validate(&importer).unwrap();
    let err = env.instantiate(&importer, None).unwrap_err();
    let msg = assert_matches!(err, Error::Unlinkable(msg) => msg);
    assert_eq!(msg, "import signature mismatch");

    // A failed link leaves no trace in the Environment's arenas.
    assert_eq!(format!("{:?}", env.mark()), format!("{:?}", mark_before_attempt));
}

#[test]
fn validation_rejects_out_of_bounds_element_segment() {
    let module = wasm(
        r#"
        (module
            (func $f)
            (table 10 funcref)
            (elem (i32.const 10) $f)
        )
        "#,
    );
    let err = decode_and_validate(&module).unwrap_err();
    let msg = assert_matches!(err, Error::Invalid(msg) => msg);
    assert_eq!(msg, "elem segment offset is out of bounds: 10 >= max value 10");
}

#[test]
fn validation_rejects_out_of_bounds_data_segment() {
    let module = wasm(
        r#"
        (module
            (memory 1)
            (data (i32.const 65536) "x")
        )
        "#,
    );
    let err = decode_and_validate(&module).unwrap_err();
    let msg = assert_matches!(err, Error::Invalid(msg) => msg);
    assert_eq!(msg, "data segment is out of bounds: [65536, 65537) >= max value 65536");
}

#[test]
fn validation_rejects_stack_underflow_at_return() {
    let module = wasm(
        r#"
        (module
            (func (result i32)
                return
            )
        )
        "#,
    );
    let err = decode_and_validate(&module).unwrap_err();
    let msg = assert_matches!(err, Error::Invalid(msg) => msg);
    assert_eq!(msg, "type stack size too small at return. got 0, expected at least 1");
}

#[test]
fn division_of_canonical_nan_stays_canonical() {
    let module = wasm(
        r#"
        (module
            (func (export "nan_div") (result f32)
                f32.const nan
                f32.const 1
                f32.div
            )
        )
        "#,
    );
    let validated = decode_and_validate(&module).unwrap();
    let mut env = Environment::new();
    let module_index = env.instantiate(&validated, None).unwrap();
    let result = invoke_export(&mut env, module_index, "nan_div", &[], &mut NopExternals, Config::default())
        .unwrap();
    match result {
        Some(RuntimeValue::F32(value)) => assert!(value.is_canonical_nan()),
        other => panic!("expected a canonical NaN f32, got {:?}", other),
    }
}

#[test]
fn unbounded_recursion_traps_on_call_stack_exhaustion() {
    let module = wasm(
        r#"
        (module
            (func $loop (export "loop")
                call $loop
            )
        )
        "#,
    );
    let validated = decode_and_validate(&module).unwrap();
    let mut env = Environment::new();
    let module_index = env.instantiate(&validated, None).unwrap();
    let config = Config {
        call_stack_size: 64,
        ..Config::default()
    };
    let err = invoke_export(&mut env, module_index, "loop", &[], &mut NopExternals, config).unwrap_err();
    let trap = assert_matches!(err, Error::Trap(trap) => trap);
    assert_matches!(trap.kind(), TrapKind::CallStackExhausted);

    // The environment itself is unharmed: a later, well-behaved export still runs.
    let harmless = wasm(
        r#"
        (module
            (func (export "answer") (result i32)
                i32.const 42
            )
        )
        "#,
    );
    let validated = decode_and_validate(&harmless).unwrap();
    let module_index = env.instantiate(&validated, None).unwrap();
    let result = invoke_export(
        &mut env,
        module_index,
        "answer",
        &[],
        &mut NopExternals,
        Config::default(),
    )
    .unwrap();
    assert_eq!(result, Some(RuntimeValue::I32(42)));
}
