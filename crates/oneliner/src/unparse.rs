//! Expression serialization.
//!
//! The tree renders through an explicit task stack instead of native
//! recursion, so output depth is bounded by memory rather than the host call
//! stack. Every operand position carries a slot precedence: the loosest
//! intrinsic precedence a child may have there without parentheses. A child
//! whose intrinsic precedence exceeds its slot gets wrapped.
//!
//! Lower numbers bind tighter. Slots come from the Python grammar, one per
//! grammar rule that restricts its operands.

use std::fmt::Write as _;

use crate::{
    config::{Config, Unparser},
    error::ConvertError,
    expressions::{
        BoolOperator, Comprehension, Expr, FStringPart, LambdaParams, Literal, Operator,
        UnaryOperator,
    },
};

const NAME: u8 = 0;
const ATTR: u8 = 1;
const AWAIT: u8 = 2;
const POW: u8 = 3;
const UNARY: u8 = 4;
const MULT: u8 = 5;
const ADD: u8 = 6;
const SHIFT: u8 = 7;
const BITAND: u8 = 8;
const BITXOR: u8 = 9;
const BITOR: u8 = 10;
const COMP_ARGS: u8 = 11;
const COMPARE: u8 = 12;
const NOT: u8 = 13;
const AND: u8 = 14;
const OR: u8 = 15;
const IFEXP_LEFT: u8 = 16;
const IFEXP: u8 = 17;
const FORMAT_EXPR: u8 = 18;
const LAMBDA: u8 = 19;
const EXPR: u8 = 20;
const NAMEDEXPR: u8 = 21;
const CALLARGS: u8 = 22;
const GENEXPR: u8 = 23;
const ONECALLARG: u8 = 24;
const YIELD: u8 = 25;
/// Positions the grammar leaves unbounded, like a subscript index.
const INF: u8 = u8::MAX;

enum Task<'a> {
    Render {
        expr: &'a Expr,
        slot: u8,
        quotes: usize,
    },
    /// Children are rendered; assemble `expr` from `results[mark..]`.
    Finish {
        expr: &'a Expr,
        slot: u8,
        quotes: usize,
        mark: usize,
    },
}

/// Renders the finished expression tree as one line of source text.
pub fn unparse(expr: &Expr, config: &Config) -> Result<String, ConvertError> {
    let mut results: Vec<String> = vec![];
    let mut tasks = vec![Task::Render {
        expr,
        slot: EXPR,
        quotes: 0,
    }];
    while let Some(task) = tasks.pop() {
        match task {
            Task::Render { expr, slot, quotes } => {
                if let Some(leaf) = render_leaf(expr, quotes)? {
                    results.push(finalize(expr, leaf, slot, config));
                    continue;
                }
                tasks.push(Task::Finish {
                    expr,
                    slot,
                    quotes,
                    mark: results.len(),
                });
                push_children(expr, quotes, &mut tasks);
            }
            Task::Finish {
                expr,
                slot,
                quotes,
                mark,
            } => {
                let children = Children(results.split_off(mark).into_iter());
                let text = assemble(expr, children, quotes)?;
                results.push(finalize(expr, text, slot, config));
            }
        }
    }
    match results.pop() {
        Some(text) if results.is_empty() => Ok(text),
        _ => Err(ConvertError::internal("serializer finished off balance")),
    }
}

struct Children(std::vec::IntoIter<String>);

impl Children {
    fn next(&mut self) -> Result<String, ConvertError> {
        self.0
            .next()
            .ok_or_else(|| ConvertError::internal("serializer child count mismatch"))
    }

    fn rest(self) -> Vec<String> {
        self.0.collect()
    }
}

fn bool_token(op: BoolOperator) -> &'static str {
    match op {
        BoolOperator::And => " and ",
        BoolOperator::Or => " or ",
    }
}

fn binop_precedence(op: Operator) -> u8 {
    match op {
        Operator::Pow => POW,
        Operator::Mult
        | Operator::MatMult
        | Operator::Div
        | Operator::FloorDiv
        | Operator::Mod => MULT,
        Operator::Add | Operator::Sub => ADD,
        Operator::LShift | Operator::RShift => SHIFT,
        Operator::BitAnd => BITAND,
        Operator::BitXor => BITXOR,
        Operator::BitOr => BITOR,
    }
}

fn intrinsic(expr: &Expr) -> u8 {
    match expr {
        Expr::Literal(_)
        | Expr::Name(_)
        | Expr::Tuple(_)
        | Expr::List(_)
        | Expr::Set(_)
        | Expr::Dict { .. }
        | Expr::ListComp { .. }
        | Expr::SetComp { .. }
        | Expr::DictComp { .. }
        | Expr::FString(_)
        // Starred and slice forms only parse in positions that admit them
        // bare, so they never need wrapping.
        | Expr::Starred(_)
        | Expr::Slice { .. } => NAME,
        Expr::Attribute { .. } | Expr::Subscript { .. } | Expr::Call { .. } => ATTR,
        Expr::Await(_) => AWAIT,
        Expr::BinOp { op, .. } => binop_precedence(*op),
        Expr::UnaryOp { op, .. } => match op {
            UnaryOperator::Not => NOT,
            _ => UNARY,
        },
        Expr::Compare { .. } => COMPARE,
        Expr::BoolOp { op, .. } => match op {
            BoolOperator::And => AND,
            BoolOperator::Or => OR,
        },
        Expr::IfExp { .. } => IFEXP,
        Expr::Lambda { .. } => LAMBDA,
        Expr::Named { .. } => NAMEDEXPR,
        Expr::Generator { .. } => GENEXPR,
        Expr::Yield(_) | Expr::YieldFrom(_) => YIELD,
        Expr::Interrupt(_) => INF,
    }
}

fn finalize(expr: &Expr, text: String, slot: u8, config: &Config) -> String {
    let wrap = match config.unparser {
        Unparser::Precision => intrinsic(expr) > slot,
        // Wrap every composite form, except where the grammar cannot care.
        Unparser::General => slot != INF && intrinsic(expr) > ATTR,
    };
    if wrap {
        format!("({text})")
    } else {
        text
    }
}

/// Renders atoms that have no expression children.
fn render_leaf(expr: &Expr, quotes: usize) -> Result<Option<String>, ConvertError> {
    Ok(Some(match expr {
        Expr::Name(name) => name.clone(),
        Expr::Literal(literal) => render_literal(literal, quotes),
        Expr::Tuple(elts) if elts.is_empty() => "()".to_owned(),
        Expr::Dict { keys, .. } if keys.is_empty() => "{}".to_owned(),
        Expr::Yield(None) => "yield".to_owned(),
        Expr::Interrupt(_) => {
            return Err(ConvertError::internal(
                "unresolved interrupt reached the serializer",
            ));
        }
        _ => return Ok(None),
    }))
}

fn render_literal(literal: &Literal, quotes: usize) -> String {
    match literal {
        Literal::None => "None".to_owned(),
        Literal::Bool(true) => "True".to_owned(),
        Literal::Bool(false) => "False".to_owned(),
        Literal::Ellipsis => "...".to_owned(),
        Literal::Int(digits) => digits.to_string(),
        Literal::Float(value) => ryu::Buffer::new().format(*value).to_owned(),
        Literal::Complex(imag) => format!("{}j", ryu::Buffer::new().format(*imag)),
        Literal::Str(text) => {
            let quote = quote_char(quotes);
            let mut out = String::with_capacity(text.len() + 2);
            out.push(quote);
            escape_str(text, quote, &mut out);
            out.push(quote);
            out
        }
        Literal::Bytes(bytes) => {
            let quote = quote_char(quotes);
            let mut out = String::with_capacity(bytes.len() + 3);
            out.push('b');
            out.push(quote);
            escape_bytes(bytes, quote, &mut out);
            out.push(quote);
            out
        }
    }
}

/// Nested string literals alternate quote style per nesting level so the
/// inner literal never terminates the outer one.
fn quote_char(quotes: usize) -> char {
    if quotes % 2 == 0 { '\'' } else { '"' }
}

fn escape_str(text: &str, quote: char, out: &mut String) {
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
}

fn escape_bytes(bytes: &[u8], quote: char, out: &mut String) {
    for &byte in bytes {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            byte if byte == quote as u8 => {
                out.push('\\');
                out.push(byte as char);
            }
            0x20..=0x7e => out.push(byte as char),
            byte => {
                let _ = write!(out, "\\x{byte:02x}");
            }
        }
    }
}

/// Queues render tasks for every child, rightmost first so the left-to-right
/// results land in order.
fn push_children<'a>(expr: &'a Expr, quotes: usize, tasks: &mut Vec<Task<'a>>) {
    let mut queued: Vec<(&'a Expr, u8, usize)> = vec![];
    let mut queue = |expr: &'a Expr, slot: u8| queued.push((expr, slot, quotes));
    match expr {
        Expr::Literal(_) | Expr::Name(_) | Expr::Yield(None) | Expr::Interrupt(_) => {}
        Expr::Tuple(elts) | Expr::List(elts) | Expr::Set(elts) => {
            for element in elts {
                queue(element, NAMEDEXPR);
            }
        }
        Expr::Dict { keys, values } => {
            for (key, value) in keys.iter().zip(values) {
                if let Some(key) = key {
                    queue(key, EXPR);
                    // A keyed value is `expression` in the grammar; an
                    // inline assignment must keep its parentheses there.
                    queue(value, EXPR);
                } else {
                    // `**` unpacking admits at most a bitwise-or chain.
                    queue(value, BITOR);
                }
            }
        }
        Expr::Starred(value) => queue(value, BITOR),
        Expr::Attribute { value, .. } => queue(value, ATTR),
        Expr::Subscript { value, index } => {
            queue(value, ATTR);
            queue(index, INF);
        }
        Expr::Slice { lower, upper, step } => {
            for part in [lower, upper, step].into_iter().flatten() {
                queue(part, IFEXP);
            }
        }
        Expr::Call {
            func,
            args,
            keywords,
        } => {
            queue(func, ATTR);
            let arg_slot = if args.len() == 1 && keywords.is_empty() {
                ONECALLARG
            } else {
                CALLARGS
            };
            for arg in args {
                queue(arg, arg_slot);
            }
            for keyword in keywords {
                let slot = if keyword.arg.is_some() { LAMBDA } else { EXPR };
                queue(&keyword.value, slot);
            }
        }
        Expr::BinOp { left, op, right } => {
            let precedence = binop_precedence(*op);
            // Power is right-associative; everything else associates left.
            let (left_slot, right_slot) = if *op == Operator::Pow {
                (precedence - 1, precedence)
            } else {
                (precedence, precedence - 1)
            };
            queue(left, left_slot);
            queue(right, right_slot);
        }
        Expr::BoolOp { op, values } => {
            let slot = match op {
                BoolOperator::And => AND - 1,
                BoolOperator::Or => OR - 1,
            };
            for value in values {
                queue(value, slot);
            }
        }
        Expr::UnaryOp { op, operand } => {
            let slot = match op {
                UnaryOperator::Not => NOT,
                _ => UNARY,
            };
            queue(operand, slot);
        }
        Expr::Compare {
            left, comparators, ..
        } => {
            queue(left, COMP_ARGS);
            for comparator in comparators {
                queue(comparator, COMP_ARGS);
            }
        }
        Expr::IfExp { test, body, orelse } => {
            queue(body, IFEXP_LEFT);
            queue(test, IFEXP_LEFT);
            queue(orelse, EXPR);
        }
        Expr::Named { value, .. } => queue(value, EXPR),
        Expr::Lambda { params, body } => {
            for param in params.posonly.iter().chain(&params.args).chain(&params.kwonly) {
                if let Some(default) = &param.default {
                    queue(default, IFEXP);
                }
            }
            queue(body, LAMBDA);
        }
        Expr::ListComp { elt, generators }
        | Expr::SetComp { elt, generators }
        | Expr::Generator { elt, generators } => {
            queue(elt, NAMEDEXPR);
            queue_generators(generators, &mut queue);
        }
        Expr::DictComp {
            key,
            value,
            generators,
        } => {
            queue(key, EXPR);
            queue(value, EXPR);
            queue_generators(generators, &mut queue);
        }
        Expr::FString(parts) => {
            let mut exprs = vec![];
            collect_fstring_exprs(parts, &mut exprs);
            for expr in exprs {
                queued.push((expr, FORMAT_EXPR, quotes + 1));
            }
        }
        Expr::Yield(Some(value)) => queue(value, EXPR),
        Expr::YieldFrom(value) => queue(value, EXPR),
        Expr::Await(value) => queue(value, AWAIT),
    }
    for (expr, slot, quotes) in queued.into_iter().rev() {
        tasks.push(Task::Render { expr, slot, quotes });
    }
}

fn queue_generators<'a>(
    generators: &'a [Comprehension],
    queue: &mut impl FnMut(&'a Expr, u8),
) {
    for generator in generators {
        queue(&generator.target, EXPR);
        queue(&generator.iter, OR);
        for condition in &generator.ifs {
            queue(condition, OR);
        }
    }
}

fn collect_fstring_exprs<'a>(parts: &'a [FStringPart], out: &mut Vec<&'a Expr>) {
    for part in parts {
        if let FStringPart::Interpolation {
            value, format_spec, ..
        } = part
        {
            out.push(value);
            if let Some(spec) = format_spec {
                collect_fstring_exprs(spec, out);
            }
        }
    }
}

fn assemble(expr: &Expr, mut children: Children, quotes: usize) -> Result<String, ConvertError> {
    Ok(match expr {
        Expr::Tuple(elts) => {
            let rendered = children.rest();
            // The separator makes the tuple, not the parentheses.
            if rendered.len() == 1 {
                format!("({},)", rendered[0])
            } else {
                format!("({})", rendered.join(","))
            }
        }
        Expr::List(_) => format!("[{}]", children.rest().join(",")),
        Expr::Set(_) => format!("{{{}}}", children.rest().join(",")),
        Expr::Dict { keys, .. } => {
            let mut items = vec![];
            for key in keys {
                items.push(match key {
                    Some(_) => {
                        let key = children.next()?;
                        let value = children.next()?;
                        format!("{key}:{value}")
                    }
                    None => format!("**{}", children.next()?),
                });
            }
            format!("{{{}}}", items.join(","))
        }
        Expr::Starred(_) => format!("*{}", children.next()?),
        Expr::Attribute { value, attr } => {
            let mut base = children.next()?;
            // `1.x` would lex the dot into the number.
            if matches!(
                value.as_ref(),
                Expr::Literal(Literal::Int(_) | Literal::Float(_) | Literal::Complex(_))
            ) {
                base = format!("({base})");
            }
            format!("{base}.{attr}")
        }
        Expr::Subscript { .. } => {
            let value = children.next()?;
            let index = children.next()?;
            format!("{value}[{index}]")
        }
        Expr::Slice { lower, upper, step } => {
            let mut out = String::new();
            if lower.is_some() {
                out.push_str(&children.next()?);
            }
            out.push(':');
            if upper.is_some() {
                out.push_str(&children.next()?);
            }
            if step.is_some() {
                out.push(':');
                out.push_str(&children.next()?);
            }
            out
        }
        Expr::Call { keywords, .. } => {
            let func = children.next()?;
            let rest = children.rest();
            let positional = rest.len().saturating_sub(keywords.len());
            let mut rest = rest.into_iter();
            let mut pieces: Vec<String> = rest.by_ref().take(positional).collect();
            for keyword in keywords {
                let value = rest
                    .next()
                    .ok_or_else(|| ConvertError::internal("serializer child count mismatch"))?;
                pieces.push(match &keyword.arg {
                    Some(name) => format!("{name}={value}"),
                    None => format!("**{value}"),
                });
            }
            format!("{func}({})", pieces.join(","))
        }
        Expr::BinOp { op, .. } => {
            let left = children.next()?;
            let right = children.next()?;
            format!("{left}{}{right}", op.token())
        }
        Expr::BoolOp { op, .. } => children.rest().join(bool_token(*op)),
        Expr::UnaryOp { op, .. } => format!("{}{}", op.token(), children.next()?),
        Expr::Compare { ops, .. } => {
            let mut out = children.next()?;
            for op in ops {
                out.push_str(op.token());
                out.push_str(&children.next()?);
            }
            out
        }
        Expr::IfExp { .. } => {
            let body = children.next()?;
            let test = children.next()?;
            let orelse = children.next()?;
            format!("{body} if {test} else {orelse}")
        }
        Expr::Named { target, .. } => format!("{target}:={}", children.next()?),
        Expr::Lambda { params, .. } => assemble_lambda(params, &mut children)?,
        Expr::ListComp { generators, .. } => {
            let elt = children.next()?;
            format!("[{elt}{}]", assemble_generators(generators, &mut children)?)
        }
        Expr::SetComp { generators, .. } => {
            let elt = children.next()?;
            format!("{{{elt}{}}}", assemble_generators(generators, &mut children)?)
        }
        Expr::Generator { generators, .. } => {
            let elt = children.next()?;
            format!("{elt}{}", assemble_generators(generators, &mut children)?)
        }
        Expr::DictComp { generators, .. } => {
            let key = children.next()?;
            let value = children.next()?;
            format!(
                "{{{key}:{value}{}}}",
                assemble_generators(generators, &mut children)?
            )
        }
        Expr::FString(parts) => {
            let quote = quote_char(quotes);
            let mut out = String::new();
            out.push('f');
            out.push(quote);
            assemble_fstring(parts, quote, &mut children, &mut out)?;
            out.push(quote);
            out
        }
        Expr::Yield(Some(_)) => format!("yield {}", children.next()?),
        Expr::YieldFrom(_) => format!("yield from {}", children.next()?),
        Expr::Await(_) => format!("await {}", children.next()?),
        Expr::Literal(_) | Expr::Name(_) | Expr::Yield(None) | Expr::Interrupt(_) => {
            return Err(ConvertError::internal("leaf expression reached assembly"));
        }
    })
}

fn assemble_lambda(
    params: &LambdaParams,
    children: &mut Children,
) -> Result<String, ConvertError> {
    let mut pieces = vec![];
    let mut render_param = |param: &crate::expressions::Param,
                            children: &mut Children|
     -> Result<String, ConvertError> {
        Ok(match &param.default {
            Some(_) => format!("{}={}", param.name, children.next()?),
            None => param.name.clone(),
        })
    };
    for param in &params.posonly {
        let rendered = render_param(param, children)?;
        pieces.push(rendered);
    }
    if !params.posonly.is_empty() {
        pieces.push("/".to_owned());
    }
    for param in &params.args {
        let rendered = render_param(param, children)?;
        pieces.push(rendered);
    }
    if let Some(vararg) = &params.vararg {
        pieces.push(format!("*{vararg}"));
    } else if !params.kwonly.is_empty() {
        pieces.push("*".to_owned());
    }
    for param in &params.kwonly {
        let rendered = render_param(param, children)?;
        pieces.push(rendered);
    }
    if let Some(kwarg) = &params.kwarg {
        pieces.push(format!("**{kwarg}"));
    }
    let body = children.next()?;
    Ok(if pieces.is_empty() {
        format!("lambda:{body}")
    } else {
        format!("lambda {}:{body}", pieces.join(","))
    })
}

fn assemble_generators(
    generators: &[Comprehension],
    children: &mut Children,
) -> Result<String, ConvertError> {
    let mut out = String::new();
    for generator in generators {
        let target = children.next()?;
        let iter = children.next()?;
        let _ = write!(out, " for {target} in {iter}");
        for _ in &generator.ifs {
            let condition = children.next()?;
            let _ = write!(out, " if {condition}");
        }
    }
    Ok(out)
}

fn assemble_fstring(
    parts: &[FStringPart],
    quote: char,
    children: &mut Children,
    out: &mut String,
) -> Result<(), ConvertError> {
    for part in parts {
        match part {
            FStringPart::Literal(text) => escape_fstring_literal(text, quote, out),
            FStringPart::Interpolation {
                conversion,
                format_spec,
                ..
            } => {
                let mut inner = children.next()?;
                // A leading `{` would read as an escaped brace.
                if inner.starts_with('{') {
                    inner.insert(0, ' ');
                }
                if let Some(conversion) = conversion {
                    let _ = write!(inner, "!{conversion}");
                }
                if let Some(spec) = format_spec {
                    inner.push(':');
                    assemble_fstring(spec, quote, children, &mut inner)?;
                }
                // A trailing `}` would pair with the closing brace.
                if inner.ends_with('}') {
                    inner.push(' ');
                }
                out.push('{');
                out.push_str(&inner);
                out.push('}');
            }
        }
    }
    Ok(())
}

fn escape_fstring_literal(text: &str, quote: char, out: &mut String) {
    let mut escaped = String::with_capacity(text.len());
    escape_str(text, quote, &mut escaped);
    for c in escaped.chars() {
        match c {
            '{' => out.push_str("{{"),
            '}' => out.push_str("}}"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExprWrapper, IfStyle};
    use pretty_assertions::assert_eq;

    fn precision(expr: &Expr) -> String {
        let config = Config {
            unparser: Unparser::Precision,
            expr_wrapper: ExprWrapper::PlainSequence,
            if_style: IfStyle::ConditionalExpr,
        };
        unparse(expr, &config).unwrap()
    }

    fn general(expr: &Expr) -> String {
        unparse(expr, &Config::default()).unwrap()
    }

    fn sub(left: Expr, right: Expr) -> Expr {
        Expr::BinOp {
            left: Box::new(left),
            op: Operator::Sub,
            right: Box::new(right),
        }
    }

    #[test]
    fn left_associative_chains_drop_parentheses() {
        let chain = sub(sub(Expr::name("a"), Expr::name("b")), Expr::name("c"));
        assert_eq!(precision(&chain), "a-b-c");
    }

    #[test]
    fn right_nested_subtraction_keeps_parentheses() {
        let nested = sub(Expr::name("a"), sub(Expr::name("b"), Expr::name("c")));
        assert_eq!(precision(&nested), "a-(b-c)");
    }

    #[test]
    fn power_associates_to_the_right() {
        let pow = |left, right| Expr::BinOp {
            left: Box::new(left),
            op: Operator::Pow,
            right: Box::new(right),
        };
        assert_eq!(
            precision(&pow(Expr::name("a"), pow(Expr::name("b"), Expr::name("c")))),
            "a**b**c"
        );
        assert_eq!(
            precision(&pow(pow(Expr::name("a"), Expr::name("b")), Expr::name("c"))),
            "(a**b)**c"
        );
    }

    #[test]
    fn named_expression_is_parenthesized_at_the_root() {
        let named = Expr::named("a", Expr::Literal(Literal::Int("1".into())));
        assert_eq!(precision(&named), "(a:=1)");
        assert_eq!(general(&named), "(a:=1)");
    }

    #[test]
    fn list_elements_admit_named_expressions_bare() {
        let list = Expr::List(vec![
            Expr::named("a", Expr::Literal(Literal::Int("1".into()))),
            Expr::named("b", Expr::Literal(Literal::Int("2".into()))),
        ]);
        assert_eq!(precision(&list), "[a:=1,b:=2]");
    }

    #[test]
    fn general_mode_wraps_every_composite() {
        let add = Expr::BinOp {
            left: Box::new(Expr::name("a")),
            op: Operator::Add,
            right: Box::new(Expr::name("b")),
        };
        assert_eq!(general(&add), "(a+b)");
        let call = Expr::call(Expr::name("f"), vec![add]);
        assert_eq!(general(&call), "f((a+b))");
    }

    #[test]
    fn single_element_tuple_keeps_the_trailing_comma() {
        assert_eq!(precision(&Expr::Tuple(vec![Expr::name("a")])), "(a,)");
        assert_eq!(precision(&Expr::Tuple(vec![])), "()");
    }

    #[test]
    fn numeric_literal_attribute_access_is_parenthesized() {
        let expr = Expr::call(
            Expr::attr(Expr::Literal(Literal::Int("1".into())), "bit_length"),
            vec![],
        );
        assert_eq!(precision(&expr), "(1).bit_length()");
    }

    #[test]
    fn nested_strings_alternate_quotes() {
        let fstring = Expr::FString(vec![
            FStringPart::Literal("hi ".to_owned()),
            FStringPart::Interpolation {
                value: Box::new(Expr::str_literal("a")),
                conversion: None,
                format_spec: None,
            },
        ]);
        assert_eq!(precision(&fstring), "f'hi {\"a\"}'");
    }

    #[test]
    fn fstring_braces_get_defensive_spaces() {
        let fstring = Expr::FString(vec![FStringPart::Interpolation {
            value: Box::new(Expr::Dict {
                keys: vec![Some(Expr::Literal(Literal::Int("1".into())))],
                values: vec![Expr::Literal(Literal::Int("2".into()))],
            }),
            conversion: None,
            format_spec: None,
        }]);
        assert_eq!(precision(&fstring), "f'{ {1:2} }'");
    }

    #[test]
    fn conversion_and_format_spec_render_in_order() {
        let fstring = Expr::FString(vec![FStringPart::Interpolation {
            value: Box::new(Expr::name("x")),
            conversion: Some('r'),
            format_spec: Some(vec![FStringPart::Literal(">8".to_owned())]),
        }]);
        assert_eq!(precision(&fstring), "f'{x!r:>8}'");
    }

    #[test]
    fn lambda_signatures_render_compactly() {
        let lambda = Expr::lambda(
            LambdaParams {
                args: vec![
                    crate::expressions::Param::plain("x"),
                    crate::expressions::Param {
                        name: "y".to_owned(),
                        default: Some(Expr::Literal(Literal::Int("1".into()))),
                    },
                ],
                vararg: Some("rest".to_owned()),
                ..LambdaParams::default()
            },
            Expr::name("x"),
        );
        assert_eq!(precision(&lambda), "lambda x,y=1,*rest:x");
        assert_eq!(
            precision(&Expr::lambda(LambdaParams::default(), Expr::none())),
            "lambda:None"
        );
    }

    #[test]
    fn conditional_operands_are_fenced() {
        let inner = Expr::if_exp(Expr::name("t"), Expr::name("a"), Expr::name("b"));
        let outer = Expr::if_exp(Expr::name("u"), inner.clone(), inner);
        assert_eq!(
            precision(&outer),
            "(a if t else b) if u else a if t else b"
        );
    }

    #[test]
    fn comprehension_clauses_guard_loose_operands() {
        let comp = Expr::ListComp {
            elt: Box::new(Expr::name("x")),
            generators: vec![Comprehension {
                target: Expr::name("x"),
                iter: Expr::if_exp(Expr::name("t"), Expr::name("a"), Expr::name("b")),
                ifs: vec![Expr::not(Expr::name("x"))],
                is_async: false,
            }],
        };
        assert_eq!(precision(&comp), "[x for x in (a if t else b) if not x]");
    }

    #[test]
    fn chained_comparisons_stay_flat() {
        let compare = Expr::Compare {
            left: Box::new(Expr::Literal(Literal::Int("1".into()))),
            ops: vec![
                crate::expressions::CmpOperator::Lt,
                crate::expressions::CmpOperator::Lt,
            ],
            comparators: vec![Expr::name("x"), Expr::Literal(Literal::Int("10".into()))],
        };
        assert_eq!(precision(&compare), "1<x<10");
    }

    #[test]
    fn slices_render_only_present_parts() {
        let slice = Expr::subscript(
            Expr::name("xs"),
            Expr::Slice {
                lower: Some(Box::new(Expr::Literal(Literal::Int("1".into())))),
                upper: None,
                step: Some(Box::new(Expr::Literal(Literal::Int("-1".into())))),
            },
        );
        assert_eq!(precision(&slice), "xs[1::-1]");
    }

    #[test]
    fn unresolved_interrupts_are_an_internal_fault() {
        let expr = Expr::Interrupt(crate::expressions::InterruptId(0));
        assert!(matches!(
            unparse(&expr, &Config::default()),
            Err(ConvertError::Internal { .. })
        ));
    }

    #[test]
    fn string_escapes_cover_the_control_set() {
        let literal = Expr::str_literal("a'b\\c\nd");
        assert_eq!(precision(&literal), "'a\\'b\\\\c\\nd'");
        let bytes = Expr::Literal(Literal::Bytes(vec![b'h', b'i', 0, 0xff]));
        assert_eq!(precision(&bytes), "b'hi\\x00\\xff'");
    }
}
