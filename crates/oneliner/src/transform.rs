//! Expression rewriting.
//!
//! Converts ruff expressions into the output tree, routing every name
//! through the namespace strategies. Lambdas and comprehensions in the
//! source stay lambdas and comprehensions in the output, so while one is
//! being rewritten its scope sits on an overlay stack: names bound there
//! resolve to bare identifiers, everything else falls through to the
//! enclosing namespace.

use ruff_python_ast::{
    self as ast, BoolOp, CmpOp, ConversionFlag, Expr as AstExpr, ExprContext,
    InterpolatedStringElement, Operator as AstOperator, UnaryOp,
};
use ruff_text_size::{Ranged, TextRange};

use crate::{
    error::ConvertError,
    expressions::{
        BoolOperator, CmpOperator, Comprehension, Expr, FStringPart, Keyword, LambdaParams, Literal,
        Operator, Param, UnaryOperator,
    },
    namespace::{NamespaceId, Namespaces},
    parse::SourceMap,
    scope::{ScopeId, ScopeKind, ScopeTree, SymbolFlags},
};

/// Maximum expression nesting depth. Prevents stack overflow on inputs
/// like `((((x,),),),)` long before the recursion limit is interesting.
#[cfg(not(debug_assertions))]
pub const MAX_NESTING_DEPTH: u16 = 200;
/// Debug stack frames are much larger, so the guard trips earlier.
#[cfg(debug_assertions)]
pub const MAX_NESTING_DEPTH: u16 = 35;

/// Rewrites expressions within one namespace.
pub struct Transformer<'a> {
    tree: &'a ScopeTree,
    namespaces: &'a Namespaces,
    ns: NamespaceId,
    map: &'a SourceMap,
    /// Lambda and comprehension scopes currently being rewritten,
    /// innermost last.
    overlays: Vec<ScopeId>,
    depth_remaining: u16,
}

impl<'a> Transformer<'a> {
    #[must_use]
    pub fn new(
        tree: &'a ScopeTree,
        namespaces: &'a Namespaces,
        ns: NamespaceId,
        map: &'a SourceMap,
    ) -> Self {
        Self {
            tree,
            namespaces,
            ns,
            map,
            overlays: vec![],
            depth_remaining: MAX_NESTING_DEPTH,
        }
    }

    fn unsupported(&self, msg: impl Into<std::borrow::Cow<'static, str>>, range: TextRange) -> ConvertError {
        ConvertError::unsupported(msg, self.map.convert_range(range))
    }

    /// The expression that reads `name` at the current position.
    pub fn load_name(&self, name: &str) -> Result<Expr, ConvertError> {
        for &overlay in self.overlays.iter().rev() {
            if let Some(expr) = self.overlay_load(overlay, name)? {
                return Ok(expr);
            }
        }
        self.namespaces.load(self.tree, self.ns, name)
    }

    fn overlay_load(&self, overlay: ScopeId, name: &str) -> Result<Option<Expr>, ConvertError> {
        let scope = self.tree.scope(overlay);
        let Some(flags) = scope.flags(name) else {
            return Ok(None);
        };
        match scope.kind {
            ScopeKind::Lambda => {
                if flags.intersects(
                    SymbolFlags::PARAMETER | SymbolFlags::LOCAL | SymbolFlags::REFERENCED_GLOBAL,
                ) {
                    return Ok(Some(Expr::name(name)));
                }
                if flags.contains(SymbolFlags::FREE) {
                    let owner = scope.captures.get(name).ok_or_else(|| {
                        ConvertError::internal("free name with no capture edge")
                    })?;
                    if let Some(owner_box) = self.namespaces.owner_box(self.tree, *owner, name)? {
                        return Ok(Some(Expr::subscript(owner_box, Expr::str_literal(name))));
                    }
                    return Ok(Some(Expr::name(name)));
                }
                Ok(None)
            }
            ScopeKind::Comprehension => {
                if flags.contains(SymbolFlags::COMPREHENSION_TARGET) {
                    return Ok(Some(Expr::name(name)));
                }
                // References and escaped inline assignments resolve in the
                // scope the comprehension lookup falls out to; the overlay
                // walk reaches it naturally.
                Ok(None)
            }
            ScopeKind::Module | ScopeKind::Function | ScopeKind::Class => {
                Err(ConvertError::internal("statement scope on the overlay stack"))
            }
        }
    }

    /// The expression that binds `name` to `value` at the current position.
    pub fn store_name(&self, name: &str, value: Expr) -> Result<Expr, ConvertError> {
        for &overlay in self.overlays.iter().rev() {
            let scope = self.tree.scope(overlay);
            let Some(flags) = scope.flags(name) else {
                continue;
            };
            match scope.kind {
                ScopeKind::Lambda => {
                    if flags.intersects(SymbolFlags::PARAMETER | SymbolFlags::LOCAL) {
                        return Ok(Expr::named(name, value));
                    }
                    return Err(ConvertError::internal(
                        "inline assignment to a non-local lambda name",
                    ));
                }
                ScopeKind::Comprehension => {
                    if flags.contains(SymbolFlags::COMPREHENSION_ASSIGNMENT) {
                        // Escapes past the comprehension scope.
                        continue;
                    }
                    return Err(ConvertError::internal(
                        "inline assignment rebinds a comprehension target",
                    ));
                }
                ScopeKind::Module | ScopeKind::Function | ScopeKind::Class => {
                    return Err(ConvertError::internal("statement scope on the overlay stack"));
                }
            }
        }
        self.namespaces.store(self.tree, self.ns, name, value)
    }

    /// Rewrites one source expression.
    pub fn expr(&mut self, expr: &AstExpr) -> Result<Expr, ConvertError> {
        let Some(remaining) = self.depth_remaining.checked_sub(1) else {
            return Err(self.unsupported("expression is nested too deeply", expr.range()));
        };
        self.depth_remaining = remaining;
        let result = self.expr_inner(expr);
        self.depth_remaining += 1;
        result
    }

    fn expr_inner(&mut self, expr: &AstExpr) -> Result<Expr, ConvertError> {
        match expr {
            AstExpr::Name(name) => match name.ctx {
                ExprContext::Load => self.load_name(name.id.as_str()),
                ExprContext::Store | ExprContext::Del | ExprContext::Invalid => {
                    Err(ConvertError::internal("store-context name in expression position"))
                }
            },
            AstExpr::Named(named) => {
                let AstExpr::Name(target) = &*named.target else {
                    return Err(ConvertError::internal(
                        "inline assignment target is not a plain name",
                    ));
                };
                let value = self.expr(&named.value)?;
                let stored = self.store_name(target.id.as_str(), value)?;
                if matches!(stored, Expr::Named { .. }) {
                    Ok(stored)
                } else {
                    // The store form does not evaluate to the stored value,
                    // so the result is read back explicitly.
                    let load = self.load_name(target.id.as_str())?;
                    Ok(Expr::last_item(Expr::List(vec![stored, load])))
                }
            }
            AstExpr::Lambda(lambda) => {
                let params = match &lambda.parameters {
                    Some(parameters) => self.lambda_params(parameters)?,
                    None => LambdaParams::default(),
                };
                let scope = self.tree.scope_for_node(lambda.range)?;
                self.overlays.push(scope);
                let body = self.expr(&lambda.body);
                self.overlays.pop();
                Ok(Expr::lambda(params, body?))
            }
            AstExpr::ListComp(comp) => {
                let scope = self.tree.scope_for_node(comp.range)?;
                self.overlays.push(scope);
                let result = self
                    .generators(&comp.generators)
                    .and_then(|generators| Ok((generators, self.expr(&comp.elt)?)));
                self.overlays.pop();
                let (generators, elt) = result?;
                Ok(Expr::ListComp {
                    elt: Box::new(elt),
                    generators,
                })
            }
            AstExpr::SetComp(comp) => {
                let scope = self.tree.scope_for_node(comp.range)?;
                self.overlays.push(scope);
                let result = self
                    .generators(&comp.generators)
                    .and_then(|generators| Ok((generators, self.expr(&comp.elt)?)));
                self.overlays.pop();
                let (generators, elt) = result?;
                Ok(Expr::SetComp {
                    elt: Box::new(elt),
                    generators,
                })
            }
            AstExpr::DictComp(comp) => {
                let scope = self.tree.scope_for_node(comp.range)?;
                self.overlays.push(scope);
                let result = self.generators(&comp.generators).and_then(|generators| {
                    let key = comp.key.as_deref().ok_or_else(|| {
                        ConvertError::internal("dict comprehension without a key")
                    })?;
                    Ok((generators, self.expr(key)?, self.expr(&comp.value)?))
                });
                self.overlays.pop();
                let (generators, key, value) = result?;
                Ok(Expr::DictComp {
                    key: Box::new(key),
                    value: Box::new(value),
                    generators,
                })
            }
            AstExpr::Generator(comp) => {
                let scope = self.tree.scope_for_node(comp.range)?;
                self.overlays.push(scope);
                let result = self
                    .generators(&comp.generators)
                    .and_then(|generators| Ok((generators, self.expr(&comp.elt)?)));
                self.overlays.pop();
                let (generators, elt) = result?;
                Ok(Expr::Generator {
                    elt: Box::new(elt),
                    generators,
                })
            }
            AstExpr::BoolOp(e) => Ok(Expr::BoolOp {
                op: match e.op {
                    BoolOp::And => BoolOperator::And,
                    BoolOp::Or => BoolOperator::Or,
                },
                values: e.values.iter().map(|value| self.expr(value)).collect::<Result<_, _>>()?,
            }),
            AstExpr::BinOp(e) => Ok(Expr::BinOp {
                left: Box::new(self.expr(&e.left)?),
                op: convert_operator(e.op),
                right: Box::new(self.expr(&e.right)?),
            }),
            AstExpr::UnaryOp(e) => Ok(Expr::UnaryOp {
                op: match e.op {
                    UnaryOp::Not => UnaryOperator::Not,
                    UnaryOp::Invert => UnaryOperator::Invert,
                    UnaryOp::UAdd => UnaryOperator::UAdd,
                    UnaryOp::USub => UnaryOperator::USub,
                },
                operand: Box::new(self.expr(&e.operand)?),
            }),
            AstExpr::Compare(e) => Ok(Expr::Compare {
                left: Box::new(self.expr(&e.left)?),
                ops: e.ops.iter().map(|op| convert_cmp_op(*op)).collect(),
                comparators: e
                    .comparators
                    .iter()
                    .map(|comparator| self.expr(comparator))
                    .collect::<Result<_, _>>()?,
            }),
            AstExpr::If(e) => Ok(Expr::if_exp(
                self.expr(&e.test)?,
                self.expr(&e.body)?,
                self.expr(&e.orelse)?,
            )),
            AstExpr::Call(e) => {
                let func = self.expr(&e.func)?;
                let args = e
                    .arguments
                    .args
                    .iter()
                    .map(|arg| self.expr(arg))
                    .collect::<Result<_, _>>()?;
                let keywords = e
                    .arguments
                    .keywords
                    .iter()
                    .map(|keyword| {
                        Ok(Keyword {
                            arg: keyword.arg.as_ref().map(|arg| arg.id.to_string()),
                            value: self.expr(&keyword.value)?,
                        })
                    })
                    .collect::<Result<_, ConvertError>>()?;
                Ok(Expr::Call {
                    func: Box::new(func),
                    args,
                    keywords,
                })
            }
            AstExpr::Attribute(e) => Ok(Expr::attr(self.expr(&e.value)?, e.attr.id.as_str())),
            AstExpr::Subscript(e) => Ok(Expr::subscript(self.expr(&e.value)?, self.expr(&e.slice)?)),
            AstExpr::Slice(e) => {
                let mut part = |side: &Option<Box<AstExpr>>| -> Result<Option<Box<Expr>>, ConvertError> {
                    side.as_deref().map(|side| self.expr(side).map(Box::new)).transpose()
                };
                let lower = part(&e.lower)?;
                let upper = part(&e.upper)?;
                let step = part(&e.step)?;
                Ok(Expr::Slice { lower, upper, step })
            }
            AstExpr::Starred(e) => Ok(Expr::Starred(Box::new(self.expr(&e.value)?))),
            AstExpr::Tuple(e) => Ok(Expr::Tuple(
                e.elts.iter().map(|elt| self.expr(elt)).collect::<Result<_, _>>()?,
            )),
            AstExpr::List(e) => Ok(Expr::List(
                e.elts.iter().map(|elt| self.expr(elt)).collect::<Result<_, _>>()?,
            )),
            AstExpr::Set(e) => Ok(Expr::Set(
                e.elts.iter().map(|elt| self.expr(elt)).collect::<Result<_, _>>()?,
            )),
            AstExpr::Dict(e) => {
                let mut keys = Vec::with_capacity(e.items.len());
                let mut values = Vec::with_capacity(e.items.len());
                for item in &e.items {
                    keys.push(item.key.as_ref().map(|key| self.expr(key)).transpose()?);
                    values.push(self.expr(&item.value)?);
                }
                Ok(Expr::Dict { keys, values })
            }
            AstExpr::FString(e) => {
                let mut parts = Vec::new();
                for fstring_part in &e.value {
                    match fstring_part {
                        ast::FStringPart::Literal(lit) => {
                            let text = lit.value.to_string();
                            if !text.is_empty() {
                                parts.push(FStringPart::Literal(text));
                            }
                        }
                        ast::FStringPart::FString(fstring) => {
                            for element in &fstring.elements {
                                self.fstring_element(element, &mut parts)?;
                            }
                        }
                    }
                }
                Ok(Expr::FString(parts))
            }
            AstExpr::Yield(e) => Ok(Expr::Yield(
                e.value.as_deref().map(|value| self.expr(value).map(Box::new)).transpose()?,
            )),
            AstExpr::YieldFrom(e) => Ok(Expr::YieldFrom(Box::new(self.expr(&e.value)?))),
            AstExpr::Await(e) => Ok(Expr::Await(Box::new(self.expr(&e.value)?))),
            AstExpr::StringLiteral(e) => Ok(Expr::Literal(Literal::Str(e.value.to_string().into()))),
            AstExpr::BytesLiteral(e) => {
                let bytes: std::borrow::Cow<'_, [u8]> = std::borrow::Cow::from(&e.value);
                Ok(Expr::Literal(Literal::Bytes(bytes.into_owned())))
            }
            AstExpr::NumberLiteral(e) => Ok(Expr::Literal(match &e.value {
                // Digits are kept verbatim; radix prefixes and underscores
                // re-serialize as written.
                ast::Number::Int(i) => Literal::Int(i.to_string().into()),
                ast::Number::Float(f) => Literal::Float(*f),
                ast::Number::Complex { imag, .. } => Literal::Complex(*imag),
            })),
            AstExpr::BooleanLiteral(e) => Ok(Expr::bool_literal(e.value)),
            AstExpr::NoneLiteral(_) => Ok(Expr::none()),
            AstExpr::EllipsisLiteral(_) => Ok(Expr::ellipsis()),
            other => Err(self.unsupported("this expression form is not convertible", other.range())),
        }
    }

    fn fstring_element(
        &mut self,
        element: &InterpolatedStringElement,
        parts: &mut Vec<FStringPart>,
    ) -> Result<(), ConvertError> {
        match element {
            InterpolatedStringElement::Literal(lit) => {
                parts.push(FStringPart::Literal(lit.value.to_string()));
            }
            InterpolatedStringElement::Interpolation(interp) => {
                let value = self.expr(&interp.expression)?;
                let mut conversion = match interp.conversion {
                    ConversionFlag::None => None,
                    ConversionFlag::Str => Some('s'),
                    ConversionFlag::Repr => Some('r'),
                    ConversionFlag::Ascii => Some('a'),
                };
                let format_spec = match &interp.format_spec {
                    Some(spec) => {
                        let mut spec_parts = Vec::new();
                        for element in &spec.elements {
                            self.fstring_element(element, &mut spec_parts)?;
                        }
                        Some(spec_parts)
                    }
                    None => None,
                };
                // A `=` specifier (`f'{a=}'`) prepends the expression source
                // as literal text; without an explicit conversion or spec the
                // value itself formats through repr.
                if let Some(debug) = &interp.debug_text {
                    let expr_text = self.map.slice(interp.expression.range());
                    parts.push(FStringPart::Literal(format!(
                        "{}{expr_text}{}",
                        debug.leading(), debug.trailing()
                    )));
                    if conversion.is_none() && format_spec.is_none() {
                        conversion = Some('r');
                    }
                }
                parts.push(FStringPart::Interpolation {
                    value: Box::new(value),
                    conversion,
                    format_spec,
                });
            }
        }
        Ok(())
    }

    /// Converts a parameter list, rewriting defaults in the current context.
    pub fn lambda_params(&mut self, parameters: &ast::Parameters) -> Result<LambdaParams, ConvertError> {
        let mut convert = |params: &[ast::ParameterWithDefault]| -> Result<Vec<Param>, ConvertError> {
            params
                .iter()
                .map(|param| {
                    Ok(Param {
                        name: param.parameter.name.id.to_string(),
                        default: param.default.as_deref().map(|default| self.expr(default)).transpose()?,
                    })
                })
                .collect()
        };
        let posonly = convert(&parameters.posonlyargs)?;
        let args = convert(&parameters.args)?;
        let kwonly = convert(&parameters.kwonlyargs)?;
        Ok(LambdaParams {
            posonly,
            args,
            vararg: parameters.vararg.as_ref().map(|param| param.name.id.to_string()),
            kwonly,
            kwarg: parameters.kwarg.as_ref().map(|param| param.name.id.to_string()),
        })
    }

    fn generators(&mut self, generators: &[ast::Comprehension]) -> Result<Vec<Comprehension>, ConvertError> {
        generators
            .iter()
            .map(|generator| {
                if generator.is_async {
                    return Err(self.unsupported(
                        "'async' comprehension clauses are not convertible",
                        generator.range,
                    ));
                }
                Ok(Comprehension {
                    target: self.comp_target(&generator.target)?,
                    iter: self.expr(&generator.iter)?,
                    ifs: generator
                        .ifs
                        .iter()
                        .map(|guard| self.expr(guard))
                        .collect::<Result<_, _>>()?,
                    is_async: false,
                })
            })
            .collect()
    }

    /// Comprehension loop targets are real bindings in the output too, so
    /// they stay bare names. `for` statements lower to comprehensions and
    /// reuse this for their targets.
    pub(crate) fn comp_target(&mut self, target: &AstExpr) -> Result<Expr, ConvertError> {
        match target {
            AstExpr::Name(name) => Ok(Expr::name(name.id.as_str())),
            AstExpr::Tuple(tuple) => Ok(Expr::Tuple(
                tuple
                    .elts
                    .iter()
                    .map(|elt| self.comp_target(elt))
                    .collect::<Result<_, _>>()?,
            )),
            AstExpr::List(list) => Ok(Expr::List(
                list.elts
                    .iter()
                    .map(|elt| self.comp_target(elt))
                    .collect::<Result<_, _>>()?,
            )),
            AstExpr::Starred(starred) => Ok(Expr::Starred(Box::new(self.comp_target(&starred.value)?))),
            other => Err(self.unsupported("this loop target form is not convertible", other.range())),
        }
    }
}

pub(crate) fn convert_operator(op: AstOperator) -> Operator {
    match op {
        AstOperator::Add => Operator::Add,
        AstOperator::Sub => Operator::Sub,
        AstOperator::Mult => Operator::Mult,
        AstOperator::MatMult => Operator::MatMult,
        AstOperator::Div => Operator::Div,
        AstOperator::Mod => Operator::Mod,
        AstOperator::Pow => Operator::Pow,
        AstOperator::LShift => Operator::LShift,
        AstOperator::RShift => Operator::RShift,
        AstOperator::BitOr => Operator::BitOr,
        AstOperator::BitXor => Operator::BitXor,
        AstOperator::BitAnd => Operator::BitAnd,
        AstOperator::FloorDiv => Operator::FloorDiv,
    }
}

fn convert_cmp_op(op: CmpOp) -> CmpOperator {
    match op {
        CmpOp::Eq => CmpOperator::Eq,
        CmpOp::NotEq => CmpOperator::NotEq,
        CmpOp::Lt => CmpOperator::Lt,
        CmpOp::LtE => CmpOperator::LtE,
        CmpOp::Gt => CmpOperator::Gt,
        CmpOp::GtE => CmpOperator::GtE,
        CmpOp::Is => CmpOperator::Is,
        CmpOp::IsNot => CmpOperator::IsNot,
        CmpOp::In => CmpOperator::In,
        CmpOp::NotIn => CmpOperator::NotIn,
    }
}
