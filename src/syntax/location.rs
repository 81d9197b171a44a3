//! Source positions for diagnostics.

use std::fmt;

use rustpython_parser::text_size::{TextRange, TextSize};

/// Source position of a node: 1-based line, 0-based column (in characters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    /// Line number, starting at 1.
    pub line: usize,
    /// Column offset in characters, starting at 0.
    pub column: usize,
}

impl Location {
    /// Create a location.
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column + 1)
    }
}

/// Turns byte offsets reported by the parser into [`Location`]s.
#[derive(Debug, Clone, Copy)]
pub struct Locator<'a> {
    source: &'a str,
}

impl<'a> Locator<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source }
    }

    pub fn locate(&self, offset: TextSize) -> Location {
        let mut end = (u32::from(offset) as usize).min(self.source.len());
        while !self.source.is_char_boundary(end) {
            end -= 1;
        }
        let before = &self.source[..end];
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        Location::new(
            before.matches('\n').count() + 1,
            before[line_start..].chars().count(),
        )
    }

    /// The source text a node was parsed from.
    pub fn text(&self, range: TextRange) -> &'a str {
        self.source
            .get(usize::from(range.start())..usize::from(range.end()))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_counts_lines_and_characters() {
        let locator = Locator::new("x = 1\ny = 'é' + z\n");
        assert_eq!(locator.locate(TextSize::from(0)), Location::new(1, 0));
        assert_eq!(locator.locate(TextSize::from(6)), Location::new(2, 0));
        // 'é' is two bytes but one column.
        assert_eq!(locator.locate(TextSize::from(15)), Location::new(2, 8));
        assert_eq!(locator.locate(TextSize::from(400)), Location::new(3, 0));
    }

    #[test]
    fn test_text_slices_by_range() {
        let locator = Locator::new("a + bc");
        let range = TextRange::new(TextSize::from(4), TextSize::from(6));
        assert_eq!(locator.text(range), "bc");
        let past_end = TextRange::new(TextSize::from(4), TextSize::from(60));
        assert_eq!(locator.text(past_end), "");
    }

    #[test]
    fn test_display_is_one_based() {
        assert_eq!(Location::new(2, 0).to_string(), "line 2, column 1");
    }
}
