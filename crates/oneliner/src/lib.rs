#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "arena handles fit in u32")]
#![expect(clippy::cast_possible_wrap, reason = "destructuring indices stay small")]

mod config;
mod error;
mod expressions;
mod lower;
mod names;
mod namespace;
mod parse;
mod presets;
mod scope;
mod transform;
mod unparse;

pub use crate::{
    config::{Config, ExprWrapper, IfStyle, Unparser},
    error::{CodeLoc, CodeRange, ConvertError},
};

/// Compiles a whole Python program into one semantically equivalent
/// expression.
///
/// The returned text is a single line; evaluating it performs the same side
/// effects and leaves the same module-level bindings as running the input top
/// to bottom.
///
/// ```
/// use oneliner::{convert_source, Config};
///
/// let expr = convert_source("a = 1", &Config::default()).unwrap();
/// assert_eq!(expr, "(a:=1)");
/// ```
pub fn convert_source(code: &str, config: &Config) -> Result<String, ConvertError> {
    let map = parse::SourceMap::new(code);
    let module = parse::parse_program(code, &map)?;
    let mut tree = scope::resolve_program(&module, &map)?;
    let expr = lower::lower_program(&module, &mut tree, config, &map)?;
    unparse::unparse(&expr, config)
}
