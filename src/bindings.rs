use std::collections::HashMap;

use crate::definition::MacroIden;
use crate::error::MacroError;

// ═══════════════════════════════════════════════════════════════════════════════
// IMPORT BINDINGS
// ═══════════════════════════════════════════════════════════════════════════════

/// Two-way map between local identifiers and the macro they were imported as.
///
/// ```text
/// "style.macro" -> { "css": ["css", "c2"] }
/// "c2"          -> { identifier: "c2", source: "style.macro", specifier: "css" }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ImportBindings {
    locals_by_macro: HashMap<String, HashMap<String, Vec<String>>>,
    macro_by_local: HashMap<String, MacroIden>,
}

impl ImportBindings {
    pub fn new() -> Self {
        ImportBindings::default()
    }

    /// Register `identifier` as a local for `source`/`specifier`.
    /// Returns `false` when the binding already existed.
    pub fn bind(
        &mut self,
        identifier: &str,
        source: &str,
        specifier: &str,
    ) -> Result<bool, MacroError> {
        let requested = MacroIden::new(identifier, source, specifier);
        if let Some(existing) = self.macro_by_local.get(identifier) {
            if existing.same_macro(&requested) {
                return Ok(false);
            }
            return Err(MacroError::ConflictingBinding {
                identifier: identifier.to_string(),
                existing: existing.clone(),
                requested,
            });
        }

        self.locals_by_macro
            .entry(source.to_string())
            .or_default()
            .entry(specifier.to_string())
            .or_default()
            .push(identifier.to_string());
        self.macro_by_local.insert(identifier.to_string(), requested);
        Ok(true)
    }

    pub fn lookup(&self, identifier: &str) -> Option<&MacroIden> {
        self.macro_by_local.get(identifier)
    }

    /// Locals imported under `source`/`specifier`, in import order.
    pub fn locals(&self, source: &str, specifier: &str) -> &[String] {
        self.locals_by_macro
            .get(source)
            .and_then(|specifiers| specifiers.get(specifier))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.macro_by_local.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_lookup() {
        let mut bindings = ImportBindings::new();
        assert!(bindings.bind("css", "style.macro", "css").unwrap());
        assert!(bindings.bind("c2", "style.macro", "css").unwrap());

        assert_eq!(bindings.locals("style.macro", "css"), ["css", "c2"]);
        let iden = bindings.lookup("c2").unwrap();
        assert_eq!(iden.specifier, "css");
        assert_eq!(iden.identifier, "c2");
        assert!(bindings.lookup("injectGlobal").is_none());
    }

    #[test]
    fn test_rebinding_same_macro_is_noop() {
        let mut bindings = ImportBindings::new();
        assert!(bindings.bind("ms", "ms.macro", "ms").unwrap());
        assert!(!bindings.bind("ms", "ms.macro", "ms").unwrap());
        assert_eq!(bindings.locals("ms.macro", "ms").len(), 1);
    }

    #[test]
    fn test_rebinding_other_macro_fails() {
        let mut bindings = ImportBindings::new();
        bindings.bind("x", "ms.macro", "ms").unwrap();
        let err = bindings.bind("x", "style.macro", "css").unwrap_err();
        assert_eq!(err.code(), "M-ERR-BINDING");
        assert_eq!(bindings.lookup("x").unwrap().source, "ms.macro");
    }
}
