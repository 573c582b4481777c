use std::collections::HashSet;
use std::rc::Rc;

use oxc_ast::ast::{
    ArrowFunctionExpression, BindingIdentifier, Class, Function, IdentifierReference,
    ImportDeclaration, ImportDeclarationSpecifier, ModuleExportName,
};
use oxc_ast::AstKind;
use oxc_ast_visit::{walk, Visit};
use oxc_span::GetSpan;
use oxc_syntax::scope::ScopeFlags;
use regex::Regex;
use tracing::{debug, trace};

use crate::bindings::ImportBindings;
use crate::definition::{ExprRange, MacroIden, MacroRegistry, RangeContext};
use crate::error::MacroError;
use crate::nesting::{OpenPatch, PatchStack, Schedule};
use crate::patch::ClosedPatch;

/// Single source-order walk over a program.
///
/// Import declarations fill the binding table and the import prologue;
/// every later identifier reference bound to a macro is resolved to a range
/// and pushed onto the patch stack. `Visit` cannot fail, so the first error
/// is kept and all further work is skipped.
///
/// Names declared inside a function (parameters and body bindings) shadow
/// the macro import of the same name for that function.
pub(crate) struct MacroVisitor<'r, 'a, S: Schedule> {
    registry: &'r MacroRegistry,
    import_pattern: &'r Regex,
    code: &'r str,
    bindings: ImportBindings,
    stack: PatchStack<S>,
    ancestors: Vec<AstKind<'a>>,
    shadowed: Vec<HashSet<String>>,
    seen_identifier: bool,
    prologue_end: u32,
    error: Option<MacroError>,
}

impl<'r, 'a, S: Schedule> MacroVisitor<'r, 'a, S> {
    pub fn new(
        registry: &'r MacroRegistry,
        import_pattern: &'r Regex,
        code: &'r str,
        stack: PatchStack<S>,
    ) -> Self {
        MacroVisitor {
            registry,
            import_pattern,
            code,
            bindings: ImportBindings::new(),
            stack,
            ancestors: Vec::new(),
            shadowed: Vec::new(),
            seen_identifier: false,
            prologue_end: 0,
            error: None,
        }
    }

    /// Close whatever is still open and hand back the top-level patches.
    pub fn finish(self) -> Result<Vec<ClosedPatch>, MacroError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.stack.finish()
    }

    fn record(&mut self, result: Result<(), MacroError>) {
        if let Err(err) = result {
            self.error.get_or_insert(err);
        }
    }

    fn import_declaration(&mut self, decl: &ImportDeclaration<'a>) -> Result<(), MacroError> {
        let span = ExprRange::from(decl.span);
        if self.seen_identifier {
            return Err(MacroError::ImportAfterIdentifier { span });
        }

        let source = decl.source.value.as_str();
        debug!("Found import statement {} {}", span, source);
        if !self.import_pattern.is_match(source) {
            return Ok(());
        }
        let registry = self.registry;
        let Some(definition) = registry.get(source) else {
            debug!("Skipping unknown macro \"{}\"", source);
            return Ok(());
        };

        for specifier in decl.specifiers.iter().flatten() {
            let (imported, local) = match specifier {
                ImportDeclarationSpecifier::ImportSpecifier(s) => {
                    (module_export_name(&s.imported), s.local.name.as_str())
                }
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                    ("default".to_string(), s.local.name.as_str())
                }
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                    return Err(MacroError::UnsupportedImport {
                        source_name: source.to_string(),
                        local: s.local.name.to_string(),
                    });
                }
            };
            if !definition.has_specifier(&imported) {
                return Err(MacroError::UnknownSpecifier {
                    source_name: source.to_string(),
                    specifier: imported,
                });
            }
            if !self.bindings.bind(local, source, &imported)? {
                trace!("{} already bound to {}:{}", local, source, imported);
            }
        }

        self.prologue_end = self.prologue_end.max(span.end);
        self.stack.push_ready(span)
    }

    fn identifier_reference(&mut self, ident: &IdentifierReference<'a>) -> Result<(), MacroError> {
        self.seen_identifier = true;
        let name = ident.name.as_str();
        if self.shadowed.iter().any(|scope| scope.contains(name)) {
            trace!("{} is shadowed by a local binding", name);
            return Ok(());
        }
        let Some(iden) = self.bindings.lookup(name).cloned() else {
            return Ok(());
        };
        let registry = self.registry;
        let Some(specifier) = registry.specifier(&iden) else {
            return Ok(());
        };

        debug!("Identifier matches {}", iden);
        for (depth, kind) in self.ancestors.iter().enumerate() {
            trace!(
                "  - {}{:?} {}",
                "  ".repeat(depth),
                kind.ty(),
                ExprRange::from(kind.span())
            );
        }

        let context = RangeContext::new(ident.span.into(), &self.ancestors);
        let range =
            (specifier.range)(&iden, &context).map_err(|err| MacroError::range_failed(&iden, err))?;
        self.check_range(&iden, range)?;
        self.stack
            .push(OpenPatch::new(iden, range, Rc::clone(&specifier.replace)))
    }

    fn check_range(&self, iden: &MacroIden, range: ExprRange) -> Result<(), MacroError> {
        let malformed = |reason: &str| MacroError::MalformedRange {
            macro_iden: iden.clone(),
            range,
            reason: reason.to_string(),
        };
        if range.end < range.start {
            return Err(malformed("range end before start"));
        }
        if range.end as usize > self.code.len() {
            return Err(malformed("range ends past the source text"));
        }
        if !self.code.is_char_boundary(range.start as usize)
            || !self.code.is_char_boundary(range.end as usize)
        {
            return Err(malformed("range splits a character"));
        }
        if range.start < self.prologue_end {
            return Err(MacroError::RangeOverlapsImport {
                macro_iden: iden.clone(),
                range,
                prologue_end: self.prologue_end,
            });
        }
        Ok(())
    }
}

impl<'a, S: Schedule> Visit<'a> for MacroVisitor<'_, 'a, S> {
    fn enter_node(&mut self, kind: AstKind<'a>) {
        self.ancestors.push(kind);
    }

    fn leave_node(&mut self, _kind: AstKind<'a>) {
        self.ancestors.pop();
    }

    fn visit_import_declaration(&mut self, decl: &ImportDeclaration<'a>) {
        if self.error.is_none() {
            let result = self.import_declaration(decl);
            self.record(result);
        }
    }

    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        if self.error.is_none() {
            let result = self.identifier_reference(ident);
            self.record(result);
        }
    }

    fn visit_binding_identifier(&mut self, _ident: &BindingIdentifier<'a>) {
        self.seen_identifier = true;
    }

    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        let mut locals = HashSet::new();
        let mut collector = LocalCollector {
            symbols: &mut locals,
        };
        collector.visit_formal_parameters(&func.params);
        if let Some(body) = &func.body {
            collector.visit_function_body(body);
        }
        // A named function expression can refer to itself.
        if let (Some(id), true) = (&func.id, func.is_expression()) {
            locals.insert(id.name.to_string());
        }

        self.shadowed.push(locals);
        walk::walk_function(self, func, flags);
        self.shadowed.pop();
    }

    fn visit_arrow_function_expression(&mut self, func: &ArrowFunctionExpression<'a>) {
        let mut locals = HashSet::new();
        let mut collector = LocalCollector {
            symbols: &mut locals,
        };
        collector.visit_formal_parameters(&func.params);
        collector.visit_function_body(&func.body);

        self.shadowed.push(locals);
        walk::walk_arrow_function_expression(self, func);
        self.shadowed.pop();
    }
}

/// Names bound directly in one function scope; nested functions are left
/// to their own visit.
struct LocalCollector<'s> {
    symbols: &'s mut HashSet<String>,
}

impl<'a> Visit<'a> for LocalCollector<'_> {
    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        self.symbols.insert(ident.name.to_string());
    }

    fn visit_function(&mut self, func: &Function<'a>, _flags: ScopeFlags) {
        if let (Some(id), false) = (&func.id, func.is_expression()) {
            self.symbols.insert(id.name.to_string());
        }
    }

    fn visit_arrow_function_expression(&mut self, _func: &ArrowFunctionExpression<'a>) {}

    fn visit_class(&mut self, class: &Class<'a>) {
        if let Some(id) = &class.id {
            self.symbols.insert(id.name.to_string());
        }
    }
}

fn module_export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(s) => s.value.to_string(),
    }
}
