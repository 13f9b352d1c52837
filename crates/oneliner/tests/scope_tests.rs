//! Binding-resolution behavior observed through the public API: declaration
//! ordering, capture boxing, comprehension isolation.

use oneliner::{convert_source, Config, ConvertError, ExprWrapper, Unparser};

fn convert(code: &str) -> Result<String, ConvertError> {
    let config = Config {
        unparser: Unparser::Precision,
        expr_wrapper: ExprWrapper::PlainSequence,
        ..Config::default()
    };
    convert_source(code, &config)
}

fn scope_err(code: &str) -> ConvertError {
    match convert(code) {
        Err(err @ ConvertError::Scope { .. }) => err,
        other => panic!("expected a scope error, got {other:?}"),
    }
}

#[test]
fn global_declared_after_assignment_is_an_error() {
    let err = scope_err("def f():\n    g = 1\n    global g");
    assert_eq!(err.message(), "name 'g' is assigned to before global declaration");
}

#[test]
fn global_declared_after_use_is_an_error() {
    let err = scope_err("def f():\n    print(g)\n    global g");
    assert_eq!(err.message(), "name 'g' is used prior to global declaration");
}

#[test]
fn a_parameter_cannot_be_global() {
    let err = scope_err("def f(g):\n    global g");
    assert_eq!(err.message(), "name 'g' is parameter and global");
}

#[test]
fn a_name_cannot_be_both_global_and_nonlocal() {
    let err = scope_err("def f():\n    def g():\n        global x\n        nonlocal x");
    assert_eq!(err.message(), "name 'x' is nonlocal and global");
}

#[test]
fn nonlocal_at_module_level_is_an_error() {
    let err = scope_err("nonlocal x");
    assert_eq!(err.message(), "nonlocal declaration not allowed at module level");
}

#[test]
fn nonlocal_without_an_enclosing_binding_is_an_error() {
    let err = scope_err("def f():\n    def g():\n        nonlocal x\n        x = 1\n    g()");
    assert_eq!(err.message(), "no binding for nonlocal 'x' found");
}

#[test]
fn nonlocal_never_resolves_to_module_scope() {
    let err = scope_err("x = 1\ndef f():\n    nonlocal x");
    assert_eq!(err.message(), "no binding for nonlocal 'x' found");
}

#[test]
fn global_after_declaration_in_order_is_fine() {
    assert!(convert("def f():\n    global g\n    g = 1").is_ok());
}

#[test]
fn comprehension_target_cannot_be_rebound_by_walrus() {
    let err = scope_err("[i := 1 for i in r]");
    assert_eq!(
        err.message(),
        "assignment expression cannot rebind comprehension iteration variable 'i'"
    );
}

#[test]
fn comprehension_walrus_cannot_escape_into_a_class_body() {
    let err = scope_err("class A:\n    ys = [y := i for i in r]");
    assert_eq!(
        err.message(),
        "assignment expression within a comprehension cannot be used in a class body"
    );
}

#[test]
fn class_scopes_are_invisible_to_nested_functions() {
    // x inside the method resolves past the class body to the module.
    let out = convert("x = 1\nclass A:\n    x = 2\n    def m(self):\n        return x").unwrap();
    assert!(out.contains(":=x]"), "method should read the module x: {out}");
}

#[test]
fn class_body_reads_enclosing_function_locals() {
    let out = convert("def f():\n    v = 1\n    class A:\n        w = v\n    return A").unwrap();
    // A mere read from the class body leaves v a plain local of f; the
    // loader lambda closes over it directly.
    assert!(out.contains("v:=1"), "{out}");
    assert!(out.contains(".__setitem__('w',v)"), "{out}");
    assert!(!out.contains("__setitem__('v'"), "{out}");
}

#[test]
fn sibling_closures_share_one_box() {
    let out = convert(
        "def f():\n    x = 0\n    def a():\n        nonlocal x\n        x = 1\n    def b():\n        return x\n    return a, b",
    )
    .unwrap();
    let box_name = "__ol_nonlocal_2";
    assert!(out.contains(&format!("{box_name}.__setitem__('x',0)")), "{out}");
    assert!(out.contains(&format!("{box_name}.__setitem__('x',1)")), "{out}");
    assert!(out.contains(&format!("{box_name}['x']")), "{out}");
}

#[test]
fn lambda_parameters_shadow_without_boxing() {
    let out = convert("x = 1\nf = lambda x: x + 1").unwrap();
    assert_eq!(out, "[x:=1,f:=lambda x:x+1]");
}

#[test]
fn async_constructs_are_rejected_during_resolution() {
    let err = convert("async def f():\n    pass");
    assert!(matches!(err, Err(ConvertError::Unsupported { .. })));
}
