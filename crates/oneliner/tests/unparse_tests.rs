//! Every converted program must itself be a valid Python expression. These
//! tests feed the serializer's output back through ruff's parser, across all
//! option combinations, and pin down a few precedence-sensitive renderings.

use oneliner::{convert_source, Config, ExprWrapper, IfStyle, Unparser};

const PROGRAMS: &[&str] = &[
    "pass",
    "a = 1",
    "a = 1\nb = a + 2\nprint(a, b)",
    "a, (b, c) = 1, (2, 3)",
    "a, *b, c = xs",
    "x += y * 2",
    "d[k] //= 3",
    "o.attr @= m",
    "if x:\n    a = 1\nelif y:\n    a = 2\nelse:\n    a = 3",
    "while x > 0:\n    x -= 1",
    "while x:\n    if x == 3:\n        break\n    x -= 1\nelse:\n    print('done')",
    "for i in range(10):\n    if i % 2:\n        continue\n    print(i)",
    "for i in r:\n    if i > 5:\n        break\nelse:\n    print('no break')",
    "def f(a, b=1, *rest, k, **kw):\n    return a + b",
    "def outer():\n    x = 0\n    def inner():\n        nonlocal x\n        x += 1\n        return x\n    return inner",
    "@deco\ndef f():\n    pass",
    "class A(B, metaclass=M):\n    x = 1\n    def m(self):\n        return self.x",
    "class A:\n    def __init__(self, v):\n        self.v = v\na = A(3)",
    "import itertools\nimport os.path\nfrom json import dumps as dj",
    "g = 1\ndef f():\n    global g\n    g += 1",
    "ys = [i * i for i in range(5) if i != 2]",
    "d = {k: v for k, v in pairs}",
    "s = {frozenset(x) for x in xs}",
    "gen = (c.upper() for c in 'abc')",
    "t = lambda a, /, b, *, c=1: (a, b, c)",
    "v = a if p else b if q else c",
    "msg = f\"{name!r:>{width}} has {count} items\"",
    "b = b'\\x00bytes'\ns = 'it\\'s'",
    "n = -2 ** -3\nm = (a - b) - c\np = a - (b - c)",
    "chain = 1 < x < 10 or not (y and z)",
    "sl = xs[1:-1:2] + xs[::-1] + xs[:]",
    "u = ~x | y & z ^ w << 2 >> 1",
    "star = f(*args, **kw, key=1)",
    "y = x = 0",
    "d = {k: (x := 1)}",
    "xs = [(y := 2), y]",
];

fn all_configs() -> Vec<Config> {
    let mut configs = vec![];
    for unparser in [Unparser::General, Unparser::Precision] {
        for expr_wrapper in [ExprWrapper::PlainSequence, ExprWrapper::ChainedCall] {
            for if_style in [IfStyle::ConditionalExpr, IfStyle::ShortCircuit] {
                configs.push(Config {
                    unparser,
                    expr_wrapper,
                    if_style,
                });
            }
        }
    }
    configs
}

#[test]
fn every_output_reparses_as_one_expression() {
    for config in all_configs() {
        for program in PROGRAMS {
            let out = convert_source(program, &config).unwrap_or_else(|err| {
                panic!("conversion failed for {program:?} with {config:?}: {err}")
            });
            ruff_python_parser::parse_expression(&out).unwrap_or_else(|err| {
                panic!("output for {program:?} with {config:?} is not a valid expression:\n{out}\n{err}")
            });
        }
    }
}

#[test]
fn precision_mode_keeps_forced_grouping() {
    let config = Config {
        unparser: Unparser::Precision,
        expr_wrapper: ExprWrapper::PlainSequence,
        ..Config::default()
    };
    assert_eq!(convert_source("a - (b - c)", &config).unwrap(), "a-(b-c)");
    assert_eq!(convert_source("a - b - c", &config).unwrap(), "a-b-c");
    assert_eq!(convert_source("(a - b) * c", &config).unwrap(), "(a-b)*c");
    assert_eq!(convert_source("-(2 ** 3)", &config).unwrap(), "-2**3");
    assert_eq!(convert_source("(-2) ** 3", &config).unwrap(), "(-2)**3");
}

#[test]
fn general_mode_wraps_every_composite_subterm() {
    let config = Config {
        unparser: Unparser::General,
        expr_wrapper: ExprWrapper::PlainSequence,
        ..Config::default()
    };
    assert_eq!(convert_source("f(a + b)", &config).unwrap(), "f((a+b))");
    assert_eq!(convert_source("a - b - c", &config).unwrap(), "((a-b)-c)");
    assert_eq!(convert_source("x.y", &config).unwrap(), "x.y");
}

#[test]
fn string_quotes_alternate_with_nesting_depth() {
    let config = Config {
        unparser: Unparser::Precision,
        expr_wrapper: ExprWrapper::PlainSequence,
        ..Config::default()
    };
    let out = convert_source("s = f\"a {f'b {c}'} d\"", &config).unwrap();
    ruff_python_parser::parse_expression(&out).unwrap();
    assert_eq!(out, "(s:=f'a {f\"b {c}\"} d')");
}

#[test]
fn dict_values_keep_walrus_parentheses() {
    let config = Config {
        unparser: Unparser::Precision,
        expr_wrapper: ExprWrapper::PlainSequence,
        ..Config::default()
    };
    // A keyed dict value is an `expression`, so a bare walrus there would be
    // a syntax error; list elements admit one unparenthesized.
    assert_eq!(
        convert_source("d = {1: (x := 2)}", &config).unwrap(),
        "(d:={1:(x:=2)})"
    );
    assert_eq!(
        convert_source("xs = [(y := 2), y]", &config).unwrap(),
        "(xs:=[y:=2,y])"
    );
}

#[test]
fn debug_interpolations_expand_to_text_and_repr() {
    let config = Config {
        unparser: Unparser::Precision,
        expr_wrapper: ExprWrapper::PlainSequence,
        ..Config::default()
    };
    assert_eq!(convert_source("s = f'{x=}'", &config).unwrap(), "(s:=f'x={x!r}')");
    // An explicit format spec switches the value back to str formatting.
    assert_eq!(
        convert_source("s = f'{x=:>4}'", &config).unwrap(),
        "(s:=f'x={x:>4}')"
    );
    assert_eq!(
        convert_source("s = f'{x = }'", &config).unwrap(),
        "(s:=f'x = {x!r}')"
    );
}

#[test]
fn reparsed_outputs_stay_single_line() {
    for config in all_configs() {
        for program in PROGRAMS {
            let out = convert_source(program, &config).unwrap();
            assert!(!out.contains('\n'), "multi-line output for {program:?}:\n{out}");
        }
    }
}
