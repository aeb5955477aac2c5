//! Error code registry for the quartz compiler
//!
//! Error codes are organized by range to avoid conflicts between phases:
//!
//! - E5000-E5999: Artifact emission errors
//! - E7000-E7999: Build-time extension (plugin) errors
//!
//! Each code is a fixed identity: diagnostics constructed from the same
//! code render the same `E{code}` tag regardless of the message text.

use std::fmt;

/// Error code with its numeric identity and human-readable description
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// The numeric error code (e.g., 7401)
    pub code: u16,
    /// Human-readable error category
    pub category: &'static str,
    /// Brief description of what this error means
    pub description: &'static str,
    /// Optional help text with suggestions for fixing the error
    pub help: Option<&'static str>,
}

impl ErrorCode {
    pub const fn new(
        code: u16,
        category: &'static str,
        description: &'static str,
        help: Option<&'static str>,
    ) -> Self {
        Self {
            code,
            category,
            description,
            help,
        }
    }

    /// Format the error code as "E{code:04}" (e.g., "E7401")
    pub fn format_code(&self) -> String {
        format!("E{:04}", self.code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: {}",
            self.format_code(),
            self.category,
            self.description
        )
    }
}

/// Writing the binary or symbol artifact failed.
pub const ARTIFACT_EMISSION_FAILED: ErrorCode = ErrorCode::new(
    5001,
    "emit",
    "Artifact emission failed",
    Some("check that the output location is writable"),
);

/// A plugin factory or hook reported an error. One fixed identity for every
/// plugin-surfaced failure, tagged with the plugin's name in the message.
pub const PLUGIN_EXECUTION_EXCEPTION: ErrorCode = ErrorCode::new(
    7401,
    "plugin",
    "Plugin execution exception",
    Some("the plugin's error text is embedded in the message"),
);

/// A referenced plugin module could not be loaded from disk.
pub const PLUGIN_MODULE_LOAD_FAILED: ErrorCode = ErrorCode::new(
    7402,
    "plugin",
    "Plugin module load failed",
    Some("check the module path declared in the project manifest"),
);

const CODES: &[&ErrorCode] = &[
    &ARTIFACT_EMISSION_FAILED,
    &PLUGIN_EXECUTION_EXCEPTION,
    &PLUGIN_MODULE_LOAD_FAILED,
];

/// Look up a registered error code by its numeric identity.
pub fn lookup(code: u16) -> Option<&'static ErrorCode> {
    CODES.iter().copied().find(|c| c.code == code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_code() {
        assert_eq!(PLUGIN_EXECUTION_EXCEPTION.format_code(), "E7401");
        assert_eq!(ARTIFACT_EMISSION_FAILED.format_code(), "E5001");
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup(7401), Some(&PLUGIN_EXECUTION_EXCEPTION));
        assert_eq!(lookup(1), None);
    }

    #[test]
    fn test_codes_are_unique() {
        for (i, a) in CODES.iter().enumerate() {
            for b in &CODES[i + 1..] {
                assert_ne!(a.code, b.code, "duplicate error code {}", a.code);
            }
        }
    }
}
