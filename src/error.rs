use crate::definition::{ExprRange, MacroIden};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_DUPLICATE_MACRO: &str = "M-ERR-DUPLICATE";
pub const ERR_IMPORT_ORDER: &str = "M-ERR-IMPORT-ORDER";
pub const ERR_UNKNOWN_SPECIFIER: &str = "M-ERR-SPECIFIER";
pub const ERR_IMPORT_FORM: &str = "M-ERR-IMPORT-FORM";
pub const ERR_CONFLICTING_BINDING: &str = "M-ERR-BINDING";
pub const ERR_MALFORMED_RANGE: &str = "M-ERR-RANGE";
pub const ERR_RANGE_OVERLAPS_IMPORT: &str = "M-ERR-RANGE-IMPORT";
pub const ERR_OVERLAP: &str = "M-ERR-OVERLAP";
pub const ERR_OUT_OF_BOUNDS: &str = "M-ERR-BOUNDS";
pub const ERR_RANGE_FN: &str = "M-ERR-RANGE-FN";
pub const ERR_REPLACE_FN: &str = "M-ERR-REPLACE-FN";
pub const ERR_HOOK: &str = "M-ERR-HOOK";
pub const ERR_PARSE: &str = "M-ERR-PARSE";
pub const ERR_TASK: &str = "M-ERR-TASK";
pub const ERR_TIMEOUT: &str = "M-ERR-TIMEOUT";
pub const ERR_CONFIG: &str = "M-ERR-CONFIG";

/// Which side of the run a hook belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    Pre,
    Post,
}

impl std::fmt::Display for HookPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookPhase::Pre => f.write_str("pre"),
            HookPhase::Post => f.write_str("post"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MACRO ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// Every way a run can fail. All of them abort the whole run.
#[derive(Debug, thiserror::Error)]
pub enum MacroError {
    #[error("Duplicate macro \"{source_name}\" at indices {first} and {second}")]
    DuplicateMacro {
        source_name: String,
        first: usize,
        second: usize,
    },

    #[error("Import statement at {span} found after an identifier")]
    ImportAfterIdentifier { span: ExprRange },

    #[error("Import specifier {specifier} is not part of {source_name}")]
    UnknownSpecifier {
        source_name: String,
        specifier: String,
    },

    #[error("Namespace import \"{local}\" of macro {source_name} is not supported")]
    UnsupportedImport { source_name: String, local: String },

    #[error("Identifier \"{identifier}\" is already bound to {existing}, cannot rebind to {requested}")]
    ConflictingBinding {
        identifier: String,
        existing: MacroIden,
        requested: MacroIden,
    },

    #[error("Malformed range {range} for {macro_iden}: {reason}")]
    MalformedRange {
        macro_iden: MacroIden,
        range: ExprRange,
        reason: String,
    },

    #[error("Range {range} for {macro_iden} overlaps the import prologue ending at {prologue_end}")]
    RangeOverlapsImport {
        macro_iden: MacroIden,
        range: ExprRange,
        prologue_end: u32,
    },

    #[error("Macro ranges {first} and {second} overlap")]
    Overlap { first: ExprRange, second: ExprRange },

    #[error("Range {range} is outside the source text of {len} bytes")]
    OutOfBounds { range: ExprRange, len: usize },

    #[error("Range function for {macro_iden} failed")]
    RangeFailed {
        macro_iden: MacroIden,
        #[source]
        source: BoxError,
    },

    #[error("Macro eval for {macro_iden} at {range} failed:\n{snippet}")]
    ReplaceFailed {
        macro_iden: MacroIden,
        range: ExprRange,
        snippet: String,
        #[source]
        source: BoxError,
    },

    #[error("The {phase} hook of {source_name} failed")]
    HookFailed {
        source_name: String,
        phase: HookPhase,
        #[source]
        source: BoxError,
    },

    #[error("Failed to parse module: {message}")]
    Parse { message: String },

    #[error("Replacement task for {range} did not complete: {message}")]
    TaskFailed { range: ExprRange, message: String },

    #[error("Macro replacement did not finish within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Invalid macro configuration: {message}")]
    Config { message: String },
}

impl MacroError {
    /// Stable code for tooling that matches on failures.
    pub fn code(&self) -> &'static str {
        match self {
            MacroError::DuplicateMacro { .. } => ERR_DUPLICATE_MACRO,
            MacroError::ImportAfterIdentifier { .. } => ERR_IMPORT_ORDER,
            MacroError::UnknownSpecifier { .. } => ERR_UNKNOWN_SPECIFIER,
            MacroError::UnsupportedImport { .. } => ERR_IMPORT_FORM,
            MacroError::ConflictingBinding { .. } => ERR_CONFLICTING_BINDING,
            MacroError::MalformedRange { .. } => ERR_MALFORMED_RANGE,
            MacroError::RangeOverlapsImport { .. } => ERR_RANGE_OVERLAPS_IMPORT,
            MacroError::Overlap { .. } => ERR_OVERLAP,
            MacroError::OutOfBounds { .. } => ERR_OUT_OF_BOUNDS,
            MacroError::RangeFailed { .. } => ERR_RANGE_FN,
            MacroError::ReplaceFailed { .. } => ERR_REPLACE_FN,
            MacroError::HookFailed { .. } => ERR_HOOK,
            MacroError::Parse { .. } => ERR_PARSE,
            MacroError::TaskFailed { .. } => ERR_TASK,
            MacroError::Timeout { .. } => ERR_TIMEOUT,
            MacroError::Config { .. } => ERR_CONFIG,
        }
    }

    pub(crate) fn range_failed(macro_iden: &MacroIden, err: anyhow::Error) -> Self {
        MacroError::RangeFailed {
            macro_iden: macro_iden.clone(),
            source: err.into(),
        }
    }

    pub(crate) fn replace_failed(
        macro_iden: &MacroIden,
        range: ExprRange,
        snippet: &str,
        err: anyhow::Error,
    ) -> Self {
        MacroError::ReplaceFailed {
            macro_iden: macro_iden.clone(),
            range,
            snippet: snippet.to_string(),
            source: err.into(),
        }
    }

    pub(crate) fn hook_failed(source_name: &str, phase: HookPhase, err: anyhow::Error) -> Self {
        MacroError::HookFailed {
            source_name: source_name.to_string(),
            phase,
            source: err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let err = MacroError::Overlap {
            first: ExprRange::new(0, 4),
            second: ExprRange::new(2, 6),
        };
        assert_eq!(err.code(), "M-ERR-OVERLAP");
        assert_eq!(err.to_string(), "Macro ranges [0,4) and [2,6) overlap");
    }

    #[test]
    fn test_plugin_error_is_kept_as_source() {
        let iden = MacroIden::new("x", "m.macro", "x");
        let err = MacroError::replace_failed(
            &iden,
            ExprRange::new(3, 7),
            "x(1)",
            anyhow::anyhow!("boom"),
        );
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("boom"));
        assert!(err.to_string().contains("x(1)"));
    }
}
