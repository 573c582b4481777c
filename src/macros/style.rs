//! `style.macro`: CSS-in-JS that is extracted at build time.
//!
//! - ``css`...` `` adds a hashed class rule to the sheet and becomes the
//!   class name string.
//! - ``injectGlobal`...` `` adds its text verbatim and disappears.
//! - Import objects are design tokens: `colours.text.dark` is replaced by the
//!   JS code stored at that path in [`StyleOptions::import_objects`].
//!
//! The sheet is written to [`StyleOptions::out_file`] once the run finishes.

use std::cell::RefCell;
use std::collections::HashSet;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{anyhow, bail, Context};
use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::Expression;
use oxc_parser::Parser;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{parse_invocation, tagged_range, Invocation};
use crate::definition::{ExprRange, MacroDefinition, MacroIden, MacroSpecifier, RangeContext};
use crate::eval::{source_type, to_js_string, Constants, StaticEvaluator};

pub const STYLE_SOURCE: &str = "style.macro";

lazy_static! {
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StyleOptions {
    /// Token trees; every string leaf is JS code.
    pub import_objects: Map<String, Value>,
    pub out_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct SheetState {
    css: String,
    classes: HashSet<String>,
}

/// Shared handle to the stylesheet collected during a run.
#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    state: Rc<RefCell<SheetState>>,
}

impl StyleSheet {
    pub fn contents(&self) -> String {
        self.state.borrow().css.clone()
    }

    /// Add a class rule, once per distinct body. Returns the class name.
    fn add_class(&self, body: &str) -> String {
        let class = format!("css-{}", short_hash(body));
        let mut state = self.state.borrow_mut();
        if state.classes.insert(class.clone()) {
            state.css.push_str(&format!(".{}{{{}}}\n", class, body));
        }
        class
    }

    fn add_global(&self, text: &str) {
        let mut state = self.state.borrow_mut();
        state.css.push_str(text);
        state.css.push('\n');
    }

    fn clear(&self) {
        let mut state = self.state.borrow_mut();
        state.css.clear();
        state.classes.clear();
    }
}

pub fn style_macro(options: StyleOptions) -> (MacroDefinition, StyleSheet) {
    let sheet = StyleSheet::default();

    let css_sheet = sheet.clone();
    let global_sheet = sheet.clone();
    let mut definition = MacroDefinition::new(STYLE_SOURCE)
        .specifier(
            "css",
            MacroSpecifier::new(tagged_range, move |_, expr| {
                let body = template_text(expr)?;
                Ok(format!("\"{}\"", css_sheet.add_class(&body)))
            }),
        )
        .specifier(
            "injectGlobal",
            MacroSpecifier::new(tagged_range, move |_, expr| {
                global_sheet.add_global(&template_text(expr)?);
                Ok(String::new())
            }),
        );

    let objects = Rc::new(options.import_objects);
    for name in objects.keys() {
        let tree = Rc::clone(&objects);
        definition = definition.specifier(
            name,
            MacroSpecifier::new(member_range, move |iden, expr| {
                lookup_token(&tree, iden, expr)
            }),
        );
    }

    let pre_sheet = sheet.clone();
    let post_sheet = sheet.clone();
    let out_file = options.out_file;
    let definition = definition
        .hook_pre(move |_| {
            pre_sheet.clear();
            Ok(())
        })
        .hook_post(move |_| {
            let Some(path) = &out_file else {
                return Ok(());
            };
            std::fs::write(path, post_sheet.contents())
                .with_context(|| format!("Failed to write CSS to {}", path.display()))?;
            debug!("CSS written to {}", path.display());
            Ok(())
        });

    (definition, sheet)
}

fn template_text(expr: &str) -> anyhow::Result<String> {
    match parse_invocation(expr, &Constants::new())? {
        Invocation::Tagged(text) => Ok(WHITESPACE_RE.replace_all(&text, "").into_owned()),
        Invocation::Call(_) => bail!("Expected a tagged template, found `{}`", expr),
    }
}

fn short_hash(body: &str) -> String {
    Sha256::digest(body.as_bytes())
        .iter()
        .take(4)
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

fn member_range(iden: &MacroIden, ctx: &RangeContext<'_, '_>) -> anyhow::Result<ExprRange> {
    ctx.member_chain().ok_or_else(|| {
        anyhow!(
            "Import object {} must be accessed as an object: {}.x.y.z",
            iden.specifier,
            iden.identifier
        )
    })
}

fn lookup_token(objects: &Map<String, Value>, iden: &MacroIden, expr: &str) -> anyhow::Result<String> {
    let path = member_path(expr)?;
    let mut node = objects
        .get(&iden.specifier)
        .ok_or_else(|| anyhow!("Unknown import object {}", iden.specifier))?;
    for key in &path {
        node = match node {
            Value::Object(children) => children.get(key),
            _ => None,
        }
        .ok_or_else(|| anyhow!("`{}` is not defined in import object {}", expr, iden.specifier))?;
    }
    match node {
        Value::String(code) => Ok(code.clone()),
        _ => bail!("`{}` does not name a value in import object {}", expr, iden.specifier),
    }
}

/// Property names of a member chain, outermost object first.
fn member_path(code: &str) -> anyhow::Result<Vec<String>> {
    let allocator = Allocator::default();
    let expr = Parser::new(&allocator, code, source_type())
        .parse_expression()
        .map_err(|errors| anyhow!("Invalid member expression `{}`: {:?}", code, errors))?;
    let constants = Constants::new();
    let evaluator = StaticEvaluator::new(&constants);

    let mut path = Vec::new();
    let mut current = &expr;
    loop {
        match current {
            Expression::StaticMemberExpression(member) => {
                path.push(member.property.name.to_string());
                current = &member.object;
            }
            Expression::ComputedMemberExpression(member) => {
                path.push(to_js_string(&evaluator.eval(&member.expression)?));
                current = &member.object;
            }
            Expression::Identifier(_) => break,
            _ => bail!("`{}` is not a property access", code),
        }
    }
    path.reverse();
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_path() {
        assert_eq!(member_path("c.text.dark").unwrap(), vec!["text", "dark"]);
        assert_eq!(member_path("c['size'][2]").unwrap(), vec!["size", "2"]);
        assert!(member_path("c().x").is_err());
    }

    #[test]
    fn test_template_text_strips_whitespace() {
        assert_eq!(
            template_text("css`\n  color: red;\n  margin: ${4 * 2}px;\n`").unwrap(),
            "color:red;margin:8px;"
        );
    }

    #[test]
    fn test_class_added_once() {
        let sheet = StyleSheet::default();
        let first = sheet.add_class("color:red;");
        let second = sheet.add_class("color:red;");
        assert_eq!(first, second);
        assert_eq!(first.len(), "css-".len() + 8);
        assert_eq!(sheet.contents(), format!(".{}{{color:red;}}\n", first));
    }
}
