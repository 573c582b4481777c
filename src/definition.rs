//! Plugin contract: what a macro has to provide to take part in a run.
//!
//! A macro is keyed by its import source (`"ms.macro"`) and exposes one
//! [`MacroSpecifier`] per importable name. The range function decides which
//! text an invocation owns; the replace function turns that text, with all
//! nested invocations already substituted, into the replacement code.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use oxc_ast::AstKind;
use oxc_span::{GetSpan, Span};
use serde::Serialize;

use crate::error::{HookPhase, MacroError};

// ═══════════════════════════════════════════════════════════════════════════════
// RANGES AND IDENTITY
// ═══════════════════════════════════════════════════════════════════════════════

/// Half-open byte range `[start, end)` into the original source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ExprRange {
    pub start: u32,
    pub end: u32,
}

impl ExprRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Strict nesting: `other` starts after `self` and ends no later.
    pub fn strictly_contains(&self, other: &ExprRange) -> bool {
        other.start > self.start && other.end <= self.end
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn as_usize(&self) -> std::ops::Range<usize> {
        self.start as usize..self.end as usize
    }
}

impl From<Span> for ExprRange {
    fn from(span: Span) -> Self {
        Self::new(span.start, span.end)
    }
}

impl std::fmt::Display for ExprRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{})", self.start, self.end)
    }
}

/// Identifies a macro through the local identifier it was imported as.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MacroIden {
    pub identifier: String,
    pub source: String,
    pub specifier: String,
}

impl MacroIden {
    pub fn new(identifier: &str, source: &str, specifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            source: source.to_string(),
            specifier: specifier.to_string(),
        }
    }

    /// Same macro, possibly under a different local name.
    pub fn same_macro(&self, other: &MacroIden) -> bool {
        self.source == other.source && self.specifier == other.specifier
    }
}

impl std::fmt::Display for MacroIden {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.identifier == self.specifier {
            write!(f, "{}:{}", self.source, self.specifier)
        } else {
            write!(f, "{}:{} (as {})", self.source, self.specifier, self.identifier)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RANGE CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// What a range function gets to look at for one identifier occurrence.
#[derive(Debug, Clone, Copy)]
pub struct RangeContext<'s, 'a> {
    /// Span of the matched identifier itself.
    pub identifier: ExprRange,
    /// AST nodes from the `Program` down to, not including, the identifier.
    pub ancestors: &'s [AstKind<'a>],
}

impl<'s, 'a> RangeContext<'s, 'a> {
    pub fn new(identifier: ExprRange, ancestors: &'s [AstKind<'a>]) -> Self {
        Self {
            identifier,
            ancestors,
        }
    }

    pub fn parent(&self) -> Option<&AstKind<'a>> {
        self.ancestors.last()
    }

    /// The call or tagged template whose callee/tag is the identifier.
    pub fn invocation(&self) -> Option<ExprRange> {
        match self.parent()? {
            AstKind::CallExpression(call)
                if ExprRange::from(call.callee.span()) == self.identifier =>
            {
                Some(call.span.into())
            }
            AstKind::TaggedTemplateExpression(tagged)
                if ExprRange::from(tagged.tag.span()) == self.identifier =>
            {
                Some(tagged.span.into())
            }
            _ => None,
        }
    }

    /// Outermost member expression chain rooted at the identifier
    /// (`colours.text.dark`), or `None` when the parent is not a member access.
    pub fn member_chain(&self) -> Option<ExprRange> {
        let mut current = self.identifier;
        for kind in self.ancestors.iter().rev() {
            let (object, span) = match kind {
                AstKind::StaticMemberExpression(member) => (member.object.span(), member.span),
                AstKind::ComputedMemberExpression(member) => (member.object.span(), member.span),
                _ => break,
            };
            if ExprRange::from(object) != current {
                break;
            }
            current = span.into();
        }
        (current != self.identifier).then_some(current)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SPECIFIERS AND DEFINITIONS
// ═══════════════════════════════════════════════════════════════════════════════

pub type ReplaceFuture = Pin<Box<dyn Future<Output = anyhow::Result<String>>>>;
pub type RangeFn = Rc<dyn Fn(&MacroIden, &RangeContext<'_, '_>) -> anyhow::Result<ExprRange>>;
pub type ReplaceFn = Rc<dyn Fn(MacroIden, String) -> ReplaceFuture>;
type HookFn = Box<dyn FnMut(&str) -> anyhow::Result<()>>;

/// Range and replace functions for one importable name.
#[derive(Clone)]
pub struct MacroSpecifier {
    pub(crate) range: RangeFn,
    pub(crate) replace: ReplaceFn,
}

impl MacroSpecifier {
    /// Specifier with a synchronous replace function.
    pub fn new<R, P>(range: R, replace: P) -> Self
    where
        R: Fn(&MacroIden, &RangeContext<'_, '_>) -> anyhow::Result<ExprRange> + 'static,
        P: Fn(&MacroIden, &str) -> anyhow::Result<String> + 'static,
    {
        let replace: ReplaceFn = Rc::new(move |iden: MacroIden, expr: String| -> ReplaceFuture {
            Box::pin(std::future::ready(replace(&iden, &expr)))
        });
        Self {
            range: Rc::new(range),
            replace,
        }
    }

    /// Specifier whose replacement does its own asynchronous work.
    pub fn new_async<R, P, F>(range: R, replace: P) -> Self
    where
        R: Fn(&MacroIden, &RangeContext<'_, '_>) -> anyhow::Result<ExprRange> + 'static,
        P: Fn(MacroIden, String) -> F + 'static,
        F: Future<Output = anyhow::Result<String>> + 'static,
    {
        let replace: ReplaceFn = Rc::new(move |iden: MacroIden, expr: String| -> ReplaceFuture {
            Box::pin(replace(iden, expr))
        });
        Self {
            range: Rc::new(range),
            replace,
        }
    }
}

/// A registered macro. Built fresh for every run so that state captured by
/// its closures never leaks between runs.
pub struct MacroDefinition {
    import_source: String,
    import_specifiers: HashMap<String, MacroSpecifier>,
    hook_pre: Option<HookFn>,
    hook_post: Option<HookFn>,
}

impl MacroDefinition {
    pub fn new(import_source: &str) -> Self {
        Self {
            import_source: import_source.to_string(),
            import_specifiers: HashMap::new(),
            hook_pre: None,
            hook_post: None,
        }
    }

    pub fn specifier(mut self, name: &str, specifier: MacroSpecifier) -> Self {
        self.import_specifiers.insert(name.to_string(), specifier);
        self
    }

    /// Called with the pristine source once, before the walk.
    pub fn hook_pre<H>(mut self, hook: H) -> Self
    where
        H: FnMut(&str) -> anyhow::Result<()> + 'static,
    {
        self.hook_pre = Some(Box::new(hook));
        self
    }

    /// Called with the final text once, after assembly.
    pub fn hook_post<H>(mut self, hook: H) -> Self
    where
        H: FnMut(&str) -> anyhow::Result<()> + 'static,
    {
        self.hook_post = Some(Box::new(hook));
        self
    }

    pub fn import_source(&self) -> &str {
        &self.import_source
    }

    pub fn has_specifier(&self, name: &str) -> bool {
        self.import_specifiers.contains_key(name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// The macros of one run, keyed by import source.
pub struct MacroRegistry {
    macros: Vec<MacroDefinition>,
    by_source: HashMap<String, usize>,
}

impl MacroRegistry {
    pub fn new(macros: Vec<MacroDefinition>) -> Result<Self, MacroError> {
        let mut by_source = HashMap::new();
        for (i, definition) in macros.iter().enumerate() {
            let name = definition.import_source.clone();
            if let Some(&first) = by_source.get(&name) {
                return Err(MacroError::DuplicateMacro {
                    source_name: name,
                    first,
                    second: i,
                });
            }
            by_source.insert(name, i);
        }
        Ok(Self { macros, by_source })
    }

    pub fn get(&self, source: &str) -> Option<&MacroDefinition> {
        self.by_source.get(source).map(|&i| &self.macros[i])
    }

    pub fn specifier(&self, iden: &MacroIden) -> Option<&MacroSpecifier> {
        self.get(&iden.source)?.import_specifiers.get(&iden.specifier)
    }

    pub fn run_pre_hooks(&mut self, code: &str) -> Result<(), MacroError> {
        for definition in &mut self.macros {
            if let Some(hook) = definition.hook_pre.as_mut() {
                hook(code).map_err(|err| {
                    MacroError::hook_failed(&definition.import_source, HookPhase::Pre, err)
                })?;
            }
        }
        Ok(())
    }

    pub fn run_post_hooks(&mut self, code: &str) -> Result<(), MacroError> {
        for definition in &mut self.macros {
            if let Some(hook) = definition.hook_post.as_mut() {
                hook(code).map_err(|err| {
                    MacroError::hook_failed(&definition.import_source, HookPhase::Post, err)
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> MacroSpecifier {
        MacroSpecifier::new(
            |_, ctx| Ok(ctx.identifier),
            |_, expr| Ok(expr.to_string()),
        )
    }

    #[test]
    fn test_strict_containment() {
        let outer = ExprRange::new(10, 20);
        assert!(outer.strictly_contains(&ExprRange::new(11, 20)));
        assert!(!outer.strictly_contains(&ExprRange::new(10, 15)));
        assert!(!outer.strictly_contains(&ExprRange::new(15, 21)));
    }

    #[test]
    fn test_duplicate_sources_rejected() {
        let macros = vec![
            MacroDefinition::new("a.macro").specifier("a", noop()),
            MacroDefinition::new("b.macro"),
            MacroDefinition::new("a.macro"),
        ];
        match MacroRegistry::new(macros) {
            Err(MacroError::DuplicateMacro {
                source_name,
                first,
                second,
            }) => {
                assert_eq!(source_name, "a.macro");
                assert_eq!((first, second), (0, 2));
            }
            _ => panic!("expected duplicate macro error"),
        }
    }

    #[test]
    fn test_specifier_lookup() {
        let registry =
            MacroRegistry::new(vec![MacroDefinition::new("a.macro").specifier("a", noop())])
                .unwrap();
        assert!(registry.specifier(&MacroIden::new("z", "a.macro", "a")).is_some());
        assert!(registry.specifier(&MacroIden::new("a", "a.macro", "b")).is_none());
        assert!(registry.get("c.macro").is_none());
    }

    #[test]
    fn test_hooks_run_in_registration_order() {
        let seen = Rc::new(std::cell::RefCell::new(Vec::new()));
        let (first, second) = (Rc::clone(&seen), Rc::clone(&seen));
        let mut registry = MacroRegistry::new(vec![
            MacroDefinition::new("a.macro").hook_pre(move |code| {
                first.borrow_mut().push(format!("a:{}", code));
                Ok(())
            }),
            MacroDefinition::new("b.macro").hook_pre(move |code| {
                second.borrow_mut().push(format!("b:{}", code));
                Ok(())
            }),
        ])
        .unwrap();
        registry.run_pre_hooks("src").unwrap();
        registry.run_post_hooks("out").unwrap();
        assert_eq!(*seen.borrow(), vec!["a:src".to_string(), "b:src".to_string()]);
    }

    #[test]
    fn test_failing_hook_reports_phase() {
        let mut registry = MacroRegistry::new(vec![MacroDefinition::new("a.macro")
            .hook_post(|_| Err(anyhow::anyhow!("disk full")))])
        .unwrap();
        let err = registry.run_post_hooks("out").unwrap_err();
        assert_eq!(err.code(), "M-ERR-HOOK");
        assert_eq!(err.to_string(), "The post hook of a.macro failed");
    }
}
