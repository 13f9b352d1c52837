use ruff_python_ast::ModModule;
use ruff_python_parser::parse_module;
use ruff_text_size::{Ranged, TextRange};

use crate::error::{CodeLoc, CodeRange, ConvertError};

/// Maps byte offsets from ruff's AST ranges to line/column positions and
/// hands out source slices for ranges the AST does not carry verbatim.
#[derive(Debug)]
pub struct SourceMap {
    code: Box<str>,
    /// Byte index of every `\n` in the source.
    line_ends: Vec<usize>,
}

impl SourceMap {
    #[must_use]
    pub fn new(code: &str) -> Self {
        let mut line_ends = vec![];
        for (i, c) in code.char_indices() {
            if c == '\n' {
                line_ends.push(i);
            }
        }
        Self {
            code: code.into(),
            line_ends,
        }
    }

    #[must_use]
    pub fn slice(&self, range: TextRange) -> &str {
        &self.code[usize::from(range.start())..usize::from(range.end())]
    }

    #[must_use]
    pub fn convert_range(&self, range: TextRange) -> CodeRange {
        let start = range.start().into();
        let (start_line_no, start_line_start) = self.index_to_position(start);
        let start = CodeLoc::new(start_line_no, start - start_line_start);

        let end = range.end().into();
        let (end_line_no, end_line_start) = self.index_to_position(end);
        let end = CodeLoc::new(end_line_no, end - end_line_start);

        CodeRange::new(start, end)
    }

    fn index_to_position(&self, index: usize) -> (usize, usize) {
        let mut line_start = 0;
        for (line_no, line_end) in self.line_ends.iter().enumerate() {
            if index <= *line_end {
                return (line_no, line_start);
            }
            line_start = *line_end + 1;
        }
        // Content after the last newline (file without trailing newline)
        (self.line_ends.len(), line_start)
    }
}

/// Parses a whole program, mapping parse failures into [`ConvertError::Syntax`].
pub fn parse_program(code: &str, map: &SourceMap) -> Result<ModModule, ConvertError> {
    let parsed = parse_module(code)
        .map_err(|e| ConvertError::syntax(e.to_string(), Some(map.convert_range(e.range()))))?;
    Ok(parsed.into_syntax())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_span_lines() {
        let map = SourceMap::new("a = 1\nbb = 2\n");
        let range = TextRange::new(6.into(), 8.into());
        let converted = map.convert_range(range);
        assert_eq!(converted.start(), CodeLoc::new(1, 0));
        assert_eq!(converted.end(), CodeLoc::new(1, 2));
    }

    #[test]
    fn position_after_last_newline() {
        let map = SourceMap::new("a = 1\nb");
        let converted = map.convert_range(TextRange::new(6.into(), 7.into()));
        assert_eq!(converted.start(), CodeLoc::new(1, 0));
    }

    #[test]
    fn parse_failure_is_positioned() {
        let code = "a = ((";
        let map = SourceMap::new(code);
        let err = parse_program(code, &map).unwrap_err();
        assert!(matches!(err, ConvertError::Syntax { .. }));
    }
}
