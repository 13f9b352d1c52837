use std::str::FromStr;

use crate::error::ConvertError;

/// How the serializer decides where parentheses go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Unparser {
    /// Parenthesize every composite subexpression. Verbose but simple to audit.
    #[default]
    General,
    /// Minimal parentheses via exact slot precedences.
    Precision,
}

impl FromStr for Unparser {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(Self::General),
            "precision" => Ok(Self::Precision),
            _ => Err(ConvertError::config(format!(
                "unknown unparser {s:?}, expected one of: general, precision"
            ))),
        }
    }
}

/// How the top-level sequence of expressions is joined into one expression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExprWrapper {
    /// A list display evaluating elements left to right.
    PlainSequence,
    /// A self-returning lambda applied once per expression.
    #[default]
    ChainedCall,
}

impl FromStr for ExprWrapper {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain_sequence" => Ok(Self::PlainSequence),
            "chained_call" => Ok(Self::ChainedCall),
            _ => Err(ConvertError::config(format!(
                "unknown expr_wrapper {s:?}, expected one of: plain_sequence, chained_call"
            ))),
        }
    }
}

/// Which expression form lowered conditionals take.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IfStyle {
    /// `body if test else orelse`
    #[default]
    ConditionalExpr,
    /// `test and body or orelse`
    ShortCircuit,
}

impl FromStr for IfStyle {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conditional_expr" => Ok(Self::ConditionalExpr),
            "short_circuit" => Ok(Self::ShortCircuit),
            _ => Err(ConvertError::config(format!(
                "unknown if_style {s:?}, expected one of: conditional_expr, short_circuit"
            ))),
        }
    }
}

/// Conversion options. Each field swaps exactly one leaf codegen choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    pub unparser: Unparser,
    pub expr_wrapper: ExprWrapper,
    pub if_style: IfStyle,
}

impl Config {
    /// Sets one option by name, as the CLI front door sees them.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ConvertError> {
        match name {
            "unparser" => self.unparser = value.parse()?,
            "expr_wrapper" => self.expr_wrapper = value.parse()?,
            "if_style" => self.if_style = value.parse()?,
            _ => {
                return Err(ConvertError::config(format!(
                    "unknown option {name:?}, expected one of: unparser, expr_wrapper, if_style"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_behavior() {
        let config = Config::default();
        assert_eq!(config.unparser, Unparser::General);
        assert_eq!(config.expr_wrapper, ExprWrapper::ChainedCall);
        assert_eq!(config.if_style, IfStyle::ConditionalExpr);
    }

    #[test]
    fn set_rejects_unknown_names_and_values() {
        let mut config = Config::default();
        assert!(config.set("unparser", "precision").is_ok());
        assert!(matches!(
            config.set("unparser", "fast"),
            Err(ConvertError::Config { .. })
        ));
        assert!(matches!(
            config.set("wrapper", "chained_call"),
            Err(ConvertError::Config { .. })
        ));
    }
}
