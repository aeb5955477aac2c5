//! Source unit tracking for multi-file compilation
//!
//! This library stores the named source units a compilation operates on,
//! keyed by file path, together with a content checksum per unit and
//! efficient line/column calculation from byte offsets. Checksums are what
//! downstream debug tooling uses to correlate positions against the text
//! that was actually compiled, so they can be pinned independently of the
//! current text (see [`SourceUnit::with_checksum`]).

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

/// Content checksum of a source unit's text.
///
/// Two units with identical text always have equal checksums. The stored
/// checksum of a unit can be forced to a different value than the natural
/// hash of its text; debug tables written from the stored checksum then
/// keep referring to the original text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum(u64);

impl Checksum {
    /// Compute the natural checksum of a piece of source text.
    pub fn of(text: &str) -> Self {
        Checksum(fxhash::hash64(text.as_bytes()))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Represents a position in source code (1-based line and column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
    pub byte_offset: usize,
}

impl SourcePosition {
    pub fn new(line: usize, column: usize, byte_offset: usize) -> Self {
        Self { line, column, byte_offset }
    }
}

/// A span of source code inside one named unit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceSpan {
    pub path: String,
    pub start: SourcePosition,
    pub end: SourcePosition,
}

impl SourceSpan {
    pub fn new(path: impl Into<String>, start: SourcePosition, end: SourcePosition) -> Self {
        Self { path: path.into(), start, end }
    }
}

/// One named unit of source text plus its content checksum.
///
/// Units are identified by path: two units with the same path are the same
/// slot across program snapshots, even when their text differs.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    path: String,
    text: Arc<str>,
    checksum: Checksum,
    line_starts: Vec<usize>,
}

impl SourceUnit {
    /// Create a unit with the natural checksum of its text.
    pub fn new(path: impl Into<String>, text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        let checksum = Checksum::of(&text);
        let line_starts = compute_line_starts(&text);
        Self {
            path: path.into(),
            text,
            checksum,
            line_starts,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The stored checksum. Equal to `Checksum::of(self.text())` unless it
    /// was pinned via [`SourceUnit::with_checksum`].
    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    /// Replacement text at the same path; the checksum is recomputed.
    pub fn with_text(&self, text: impl Into<Arc<str>>) -> Self {
        SourceUnit::new(self.path.clone(), text)
    }

    /// Force the stored checksum, leaving the text untouched.
    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = checksum;
        self
    }

    /// Get a specific line (1-based line numbers)
    pub fn line(&self, line_number: usize) -> Option<&str> {
        if line_number == 0 || line_number > self.line_starts.len() {
            return None;
        }

        let start = self.line_starts[line_number - 1];
        let end = if line_number < self.line_starts.len() {
            self.line_starts[line_number]
        } else {
            self.text.len()
        };

        Some(self.text[start..end].trim_end_matches(['\n', '\r']))
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Convert a byte offset to line and column (1-based)
    pub fn offset_to_line_col(&self, offset: usize) -> (usize, usize) {
        let line_index = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };

        let line_start = self.line_starts.get(line_index).copied().unwrap_or(0);
        let column = offset - line_start + 1;
        let line = line_index + 1;

        (line, column)
    }

    pub fn offset_to_position(&self, offset: usize) -> SourcePosition {
        let (line, column) = self.offset_to_line_col(offset);
        SourcePosition::new(line, column, offset)
    }

    /// Create a span from byte offsets within this unit
    pub fn span(&self, start: usize, end: usize) -> SourceSpan {
        SourceSpan::new(
            self.path.clone(),
            self.offset_to_position(start),
            self.offset_to_position(end),
        )
    }
}

/// Path-keyed collection of source units, in insertion order.
///
/// Replacing a unit at an existing path keeps its position; the path is the
/// slot identity.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    units: IndexMap<String, SourceUnit>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the unit at its path.
    pub fn insert(&mut self, unit: SourceUnit) {
        self.units.insert(unit.path().to_string(), unit);
    }

    /// Remove the unit at a path, if present.
    pub fn remove(&mut self, path: &str) -> Option<SourceUnit> {
        self.units.shift_remove(path)
    }

    pub fn unit(&self, path: &str) -> Option<&SourceUnit> {
        self.units.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.units.contains_key(path)
    }

    pub fn units(&self) -> impl Iterator<Item = &SourceUnit> {
        self.units.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(|p| p.as_str())
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Compute line start offsets for a source text
fn compute_line_starts(source: &str) -> Vec<usize> {
    let mut line_starts = vec![0];

    for (i, ch) in source.char_indices() {
        if ch == '\n' {
            line_starts.push(i + 1);
        }
    }

    line_starts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_tracks_text() {
        let a = Checksum::of("class Main {}");
        let b = Checksum::of("class Main {}");
        let c = Checksum::of("class Main { }");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_unit_natural_checksum() {
        let unit = SourceUnit::new("Main.qz", "class Main {}");
        assert_eq!(unit.checksum(), Checksum::of("class Main {}"));
    }

    #[test]
    fn test_with_text_recomputes_checksum() {
        let unit = SourceUnit::new("Main.qz", "before");
        let rewritten = unit.with_text("after");

        assert_eq!(rewritten.path(), "Main.qz");
        assert_eq!(rewritten.text(), "after");
        assert_eq!(rewritten.checksum(), Checksum::of("after"));
        assert_ne!(rewritten.checksum(), unit.checksum());
    }

    #[test]
    fn test_with_checksum_pins_stored_value() {
        let original = SourceUnit::new("Main.qz", "before");
        let pinned = original
            .with_text("after")
            .with_checksum(original.checksum());

        assert_eq!(pinned.text(), "after");
        assert_eq!(pinned.checksum(), original.checksum());
        assert_ne!(pinned.checksum(), Checksum::of("after"));
    }

    #[test]
    fn test_line_lookup() {
        let unit = SourceUnit::new("test.qz", "line 1\nline 2\nline 3");

        assert_eq!(unit.line(1), Some("line 1"));
        assert_eq!(unit.line(2), Some("line 2"));
        assert_eq!(unit.line(3), Some("line 3"));
        assert_eq!(unit.line(4), None);
        assert_eq!(unit.line_count(), 3);
    }

    #[test]
    fn test_offset_to_line_col() {
        let unit = SourceUnit::new("test.qz", "hello\nworld\ntest");

        assert_eq!(unit.offset_to_line_col(0), (1, 1)); // 'h'
        assert_eq!(unit.offset_to_line_col(4), (1, 5)); // 'o'
        assert_eq!(unit.offset_to_line_col(6), (2, 1)); // 'w'
        assert_eq!(unit.offset_to_line_col(10), (2, 5)); // 'd'
        assert_eq!(unit.offset_to_line_col(12), (3, 1)); // 't'
    }

    #[test]
    fn test_source_map_replacement_keeps_slot_order() {
        let mut map = SourceMap::new();
        map.insert(SourceUnit::new("a.qz", "a"));
        map.insert(SourceUnit::new("b.qz", "b"));
        map.insert(SourceUnit::new("a.qz", "rewritten"));

        let paths: Vec<_> = map.paths().collect();
        assert_eq!(paths, vec!["a.qz", "b.qz"]);
        assert_eq!(map.unit("a.qz").unwrap().text(), "rewritten");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_span_from_offsets() {
        let unit = SourceUnit::new("test.qz", "hello\nworld");
        let span = unit.span(6, 11);

        assert_eq!(span.path, "test.qz");
        assert_eq!(span.start.line, 2);
        assert_eq!(span.start.column, 1);
        assert_eq!(span.end.column, 6);
    }
}
