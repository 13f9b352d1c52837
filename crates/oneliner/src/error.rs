use std::{borrow::Cow, fmt};

/// A line/column position in the source file, both 0-indexed.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub struct CodeLoc {
    pub line: usize,
    pub column: usize,
}

impl CodeLoc {
    #[must_use]
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for CodeLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 1-indexed for humans
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

/// Source code location information for error reporting.
#[derive(Clone, Copy, Default, Eq, PartialEq, Hash)]
pub struct CodeRange {
    start: CodeLoc,
    end: CodeLoc,
}

/// Custom Debug implementation to make displaying ranges much less verbose.
impl fmt::Debug for CodeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodeRange{{start: {:?}, end: {:?}}}", self.start, self.end)
    }
}

impl CodeRange {
    #[must_use]
    pub const fn new(start: CodeLoc, end: CodeLoc) -> Self {
        Self { start, end }
    }

    /// Returns the start position.
    #[must_use]
    pub fn start(&self) -> CodeLoc {
        self.start
    }

    /// Returns the end position.
    #[must_use]
    pub fn end(&self) -> CodeLoc {
        self.end
    }
}

/// Errors that can occur while converting a program to a single expression.
#[derive(Debug, Clone)]
pub enum ConvertError {
    /// The source text did not parse.
    Syntax {
        msg: Cow<'static, str>,
        position: Option<CodeRange>,
    },
    /// Semantic/binding error found during scope resolution
    /// (declaration ordering, missing nonlocal binding, and so on).
    Scope {
        msg: Cow<'static, str>,
        position: CodeRange,
    },
    /// A statement or expression kind with no lowering rule.
    Unsupported {
        msg: Cow<'static, str>,
        position: CodeRange,
    },
    /// Unknown configuration option name or value.
    Config { msg: Cow<'static, str> },
    /// Internal invariant violation. Always a bug, never caused by user input.
    Internal { msg: Cow<'static, str> },
}

impl ConvertError {
    #[must_use]
    pub(crate) fn syntax(msg: impl Into<Cow<'static, str>>, position: Option<CodeRange>) -> Self {
        Self::Syntax {
            msg: msg.into(),
            position,
        }
    }

    #[must_use]
    pub(crate) fn scope(msg: impl Into<Cow<'static, str>>, position: CodeRange) -> Self {
        Self::Scope {
            msg: msg.into(),
            position,
        }
    }

    #[must_use]
    pub(crate) fn unsupported(msg: impl Into<Cow<'static, str>>, position: CodeRange) -> Self {
        Self::Unsupported {
            msg: msg.into(),
            position,
        }
    }

    #[must_use]
    pub(crate) fn config(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Config { msg: msg.into() }
    }

    #[must_use]
    pub(crate) fn internal(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Internal { msg: msg.into() }
    }

    /// The error message without position information.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Syntax { msg, .. }
            | Self::Scope { msg, .. }
            | Self::Unsupported { msg, .. }
            | Self::Config { msg }
            | Self::Internal { msg } => msg,
        }
    }

    /// The source position the error points at, if it has one.
    #[must_use]
    pub fn position(&self) -> Option<CodeRange> {
        match self {
            Self::Syntax { position, .. } => *position,
            Self::Scope { position, .. } | Self::Unsupported { position, .. } => Some(*position),
            Self::Config { .. } | Self::Internal { .. } => None,
        }
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Syntax { .. } => "syntax error",
            Self::Scope { .. } => "scope error",
            Self::Unsupported { .. } => "unsupported",
            Self::Config { .. } => "config error",
            Self::Internal { .. } => "internal error",
        };
        match self.position() {
            Some(position) => write!(f, "{kind} at {}: {}", position.start(), self.message()),
            None => write!(f, "{kind}: {}", self.message()),
        }
    }
}

impl std::error::Error for ConvertError {}
