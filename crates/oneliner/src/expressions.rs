//! The output expression tree.
//!
//! Produced by the lowering engine, consumed only by the serializer. This is
//! deliberately smaller than ruff's AST: statements cannot exist here, names
//! are plain strings and all position information is gone.

/// Literal constant forms.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Ellipsis,
    /// Integer literals keep their decimal digits; no arithmetic happens
    /// on them so there is no reason to re-encode arbitrary precision.
    Int(Box<str>),
    Float(f64),
    /// The imaginary component of a complex literal such as `2j`.
    Complex(f64),
    Str(Box<str>),
    Bytes(Vec<u8>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mult,
    MatMult,
    Div,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
    FloorDiv,
}

impl Operator {
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mult => "*",
            Self::MatMult => "@",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::LShift => "<<",
            Self::RShift => ">>",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::BitAnd => "&",
            Self::FloorDiv => "//",
        }
    }

    /// The in-place operator-overload hook, for augmented assignment.
    #[must_use]
    pub fn inplace_dunder(self) -> &'static str {
        match self {
            Self::Add => "__iadd__",
            Self::Sub => "__isub__",
            Self::Mult => "__imul__",
            Self::MatMult => "__imatmul__",
            Self::Div => "__itruediv__",
            Self::Mod => "__imod__",
            Self::Pow => "__ipow__",
            Self::LShift => "__ilshift__",
            Self::RShift => "__irshift__",
            Self::BitOr => "__ior__",
            Self::BitXor => "__ixor__",
            Self::BitAnd => "__iand__",
            Self::FloorDiv => "__ifloordiv__",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Invert,
    UAdd,
    USub,
}

impl UnaryOperator {
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Self::Not => "not ",
            Self::Invert => "~",
            Self::UAdd => "+",
            Self::USub => "-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOperator {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

impl CmpOperator {
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtE => "<=",
            Self::Gt => ">",
            Self::GtE => ">=",
            Self::Is => " is ",
            Self::IsNot => " is not ",
            Self::In => " in ",
            Self::NotIn => " not in ",
        }
    }
}

/// A `name=value` (or `**value` when `arg` is `None`) call argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub arg: Option<String>,
    pub value: Expr,
}

/// One `for target in iter if cond...` clause of a comprehension.
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
    pub is_async: bool,
}

/// One parameter of a lambda, default already rewritten.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

impl Param {
    #[must_use]
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }
}

/// A lambda signature. Annotations never survive lowering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LambdaParams {
    pub posonly: Vec<Param>,
    pub args: Vec<Param>,
    pub vararg: Option<String>,
    pub kwonly: Vec<Param>,
    pub kwarg: Option<String>,
}

/// A piece of an interpolated string literal.
#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Literal(String),
    Interpolation {
        value: Box<Expr>,
        /// `r`, `s` or `a`, if an explicit conversion was given.
        conversion: Option<char>,
        format_spec: Option<Vec<FStringPart>>,
    },
}

/// Arena handle for a not-yet-finalized interrupt body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptId(pub u32);

/// An expression in the output program.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Name(String),
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Set(Vec<Expr>),
    /// A `None` key marks a `**mapping` unpacking entry.
    Dict {
        keys: Vec<Option<Expr>>,
        values: Vec<Expr>,
    },
    Starred(Box<Expr>),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    BinOp {
        left: Box<Expr>,
        op: Operator,
        right: Box<Expr>,
    },
    BoolOp {
        op: BoolOperator,
        values: Vec<Expr>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<CmpOperator>,
        comparators: Vec<Expr>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    /// Inline assignment, `target := value`.
    Named {
        target: String,
        value: Box<Expr>,
    },
    Lambda {
        params: LambdaParams,
        body: Box<Expr>,
    },
    ListComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    SetComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    Generator {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    FString(Vec<FStringPart>),
    Yield(Option<Box<Expr>>),
    YieldFrom(Box<Expr>),
    Await(Box<Expr>),
    /// Placeholder for a pending interrupt body; resolved into a list
    /// display before serialization, must never reach the serializer.
    Interrupt(InterruptId),
}

impl Expr {
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    #[must_use]
    pub fn str_literal(value: impl Into<Box<str>>) -> Self {
        Self::Literal(Literal::Str(value.into()))
    }

    #[must_use]
    pub fn none() -> Self {
        Self::Literal(Literal::None)
    }

    #[must_use]
    pub fn bool_literal(value: bool) -> Self {
        Self::Literal(Literal::Bool(value))
    }

    #[must_use]
    pub fn ellipsis() -> Self {
        Self::Literal(Literal::Ellipsis)
    }

    #[must_use]
    pub fn named(target: impl Into<String>, value: Self) -> Self {
        Self::Named {
            target: target.into(),
            value: Box::new(value),
        }
    }

    #[must_use]
    pub fn attr(value: Self, attr: impl Into<String>) -> Self {
        Self::Attribute {
            value: Box::new(value),
            attr: attr.into(),
        }
    }

    #[must_use]
    pub fn subscript(value: Self, index: Self) -> Self {
        Self::Subscript {
            value: Box::new(value),
            index: Box::new(index),
        }
    }

    #[must_use]
    pub fn call(func: Self, args: Vec<Self>) -> Self {
        Self::Call {
            func: Box::new(func),
            args,
            keywords: vec![],
        }
    }

    /// `value[-1]`, the tail pick at the end of every lowered body list.
    #[must_use]
    pub fn last_item(value: Self) -> Self {
        Self::subscript(
            value,
            Self::UnaryOp {
                op: UnaryOperator::USub,
                operand: Box::new(Self::Literal(Literal::Int("1".into()))),
            },
        )
    }

    /// `obj.__setitem__(key, value)`
    #[must_use]
    pub fn setitem(obj: Self, key: Self, value: Self) -> Self {
        Self::call(Self::attr(obj, "__setitem__"), vec![key, value])
    }

    /// `not operand`
    #[must_use]
    pub fn not(operand: Self) -> Self {
        Self::UnaryOp {
            op: UnaryOperator::Not,
            operand: Box::new(operand),
        }
    }

    /// `lambda params: body`
    #[must_use]
    pub fn lambda(params: LambdaParams, body: Self) -> Self {
        Self::Lambda {
            params,
            body: Box::new(body),
        }
    }

    /// `body if test else orelse`
    #[must_use]
    pub fn if_exp(test: Self, body: Self, orelse: Self) -> Self {
        Self::IfExp {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
        }
    }
}
