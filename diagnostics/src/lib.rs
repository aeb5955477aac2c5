//! Diagnostics library for rich error reporting
//!
//! This library provides compiler diagnostics with:
//! - Multiple severity levels (Error, Warning, Info, Hint)
//! - Stable error codes
//! - Optional source locations with snippet rendering
//! - Notes and help text
//! - Colored terminal output
//!
//! Diagnostics produced by build-time plugins attach at no source location,
//! so the span is optional here.

use std::fmt;

// Re-export source mapping types from the source_map crate
pub use source_map::{Checksum, SourceMap, SourcePosition, SourceSpan, SourceUnit};

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Info,
    Hint,
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticSeverity::Error => write!(f, "error"),
            DiagnosticSeverity::Warning => write!(f, "warning"),
            DiagnosticSeverity::Info => write!(f, "info"),
            DiagnosticSeverity::Hint => write!(f, "hint"),
        }
    }
}

/// A diagnostic message with severity, code, and optional location
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub code: Option<String>,
    pub message: String,
    pub span: Option<SourceSpan>,
    pub notes: Vec<String>,
    pub help: Vec<String>,
}

/// Ordered, append-only collection of diagnostics
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub diagnostics: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.diagnostics.extend(other.diagnostics);
    }

    /// Drop all accumulated diagnostics (each pipeline phase starts clean).
    pub fn clear(&mut self) {
        self.diagnostics.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == DiagnosticSeverity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == DiagnosticSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == DiagnosticSeverity::Warning)
    }
}

/// Builder for creating diagnostics
pub struct DiagnosticBuilder {
    severity: DiagnosticSeverity,
    code: Option<String>,
    message: String,
    span: Option<SourceSpan>,
    notes: Vec<String>,
    help: Vec<String>,
}

impl DiagnosticBuilder {
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_severity(DiagnosticSeverity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_severity(DiagnosticSeverity::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::with_severity(DiagnosticSeverity::Info, message)
    }

    pub fn hint(message: impl Into<String>) -> Self {
        Self::with_severity(DiagnosticSeverity::Hint, message)
    }

    fn with_severity(severity: DiagnosticSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: None,
            message: message.into(),
            span: None,
            notes: vec![],
            help: vec![],
        }
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn help(mut self, help_msg: impl Into<String>) -> Self {
        self.help.push(help_msg.into());
        self
    }

    pub fn build(self) -> Diagnostic {
        Diagnostic {
            severity: self.severity,
            code: self.code,
            message: self.message,
            span: self.span,
            notes: self.notes,
            help: self.help,
        }
    }
}

/// Formatter for displaying diagnostics
pub struct ErrorFormatter {
    use_colors: bool,
}

impl ErrorFormatter {
    pub fn new() -> Self {
        Self { use_colors: false }
    }

    pub fn with_colors() -> Self {
        Self { use_colors: true }
    }

    pub fn format_diagnostics(&self, diagnostics: &Diagnostics, sources: &SourceMap) -> String {
        let mut output = String::new();

        for (i, diagnostic) in diagnostics.diagnostics.iter().enumerate() {
            if i > 0 {
                output.push('\n');
            }
            output.push_str(&self.format_diagnostic(diagnostic, sources));
        }

        output
    }

    pub fn format_diagnostic(&self, diagnostic: &Diagnostic, sources: &SourceMap) -> String {
        let mut output = String::new();

        // Header
        if self.use_colors {
            let color = match diagnostic.severity {
                DiagnosticSeverity::Error => "\x1b[31m",
                DiagnosticSeverity::Warning => "\x1b[33m",
                DiagnosticSeverity::Info => "\x1b[36m",
                DiagnosticSeverity::Hint => "\x1b[32m",
            };
            output.push_str(color);
            output.push_str(&format!("{}", diagnostic.severity));

            if let Some(code) = &diagnostic.code {
                output.push_str(&format!("[{}]", code));
            }

            output.push_str("\x1b[0m: \x1b[1;97m");
            output.push_str(&diagnostic.message);
            output.push_str("\x1b[0m\n");
        } else {
            output.push_str(&format!("{}", diagnostic.severity));

            if let Some(code) = &diagnostic.code {
                output.push_str(&format!("[{}]", code));
            }

            output.push_str(&format!(": {}\n", diagnostic.message));
        }

        // Source location and snippet, when the diagnostic has one
        if let Some(span) = &diagnostic.span {
            let arrow = if self.use_colors { "  \x1b[96m-->\x1b[0m" } else { "  -->" };
            output.push_str(&format!(
                "{} {}:{}:{}\n",
                arrow, span.path, span.start.line, span.start.column
            ));

            if let Some(unit) = sources.unit(&span.path)
                && let Some(line) = unit.line(span.start.line)
            {
                let line_num = span.start.line;
                let line_num_width = line_num.to_string().len();

                output.push_str(&format!("{:width$} |\n", "", width = line_num_width));
                output.push_str(&format!("{} | {}\n", line_num, line));

                let padding = " ".repeat(span.start.column.saturating_sub(1));
                let underline_len = if span.start.line == span.end.line {
                    span.end.column.saturating_sub(span.start.column).max(1)
                } else {
                    line.len().saturating_sub(span.start.column - 1).max(1)
                };

                let underline = if self.use_colors {
                    format!("\x1b[31m{}\x1b[0m", "^".repeat(underline_len))
                } else {
                    "^".repeat(underline_len)
                };

                output.push_str(&format!(
                    "{:width$} | {}{}\n",
                    "",
                    padding,
                    underline,
                    width = line_num_width
                ));
            }
        }

        // Help messages
        for help_msg in &diagnostic.help {
            if self.use_colors {
                output.push_str("     \x1b[32mhelp\x1b[0m: \x1b[33m");
                output.push_str(help_msg);
                output.push_str("\x1b[0m\n");
            } else {
                output.push_str("     help: ");
                output.push_str(help_msg);
                output.push('\n');
            }
        }

        // Notes
        for note in &diagnostic.notes {
            if self.use_colors {
                output.push_str("\x1b[34mnote\x1b[0m: ");
            } else {
                output.push_str("note: ");
            }
            output.push_str(note);
            output.push('\n');
        }

        output
    }
}

impl Default for ErrorFormatter {
    fn default() -> Self {
        Self::new()
    }
}
