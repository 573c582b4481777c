//! Built-in macros. Each one is an ordinary [`MacroDefinition`] built only
//! from the public plugin contract.
//!
//! [`MacroDefinition`]: crate::MacroDefinition

pub mod ms;
pub mod preval;
pub mod style;

pub use ms::ms_macro;
pub use preval::{preval_macro, PrevalOptions};
pub use style::{style_macro, StyleOptions, StyleSheet};

use anyhow::{anyhow, bail};
use oxc_allocator::Allocator;
use oxc_ast::ast::Expression;
use oxc_ast::AstKind;
use oxc_parser::Parser;
use serde_json::Value;

use crate::definition::{ExprRange, MacroIden, RangeContext};
use crate::eval::{source_type, Constants, StaticEvaluator};

/// What an invocation passed to its macro, after static evaluation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Invocation {
    /// `f(expr)`: the single argument's value.
    Call(Value),
    /// ``f`text ${expr}` ``: the template with substitutions interpolated.
    Tagged(String),
}

/// Range of a call or tagged template whose callee is the macro.
pub(crate) fn invocation_range(
    iden: &MacroIden,
    ctx: &RangeContext<'_, '_>,
) -> anyhow::Result<ExprRange> {
    ctx.invocation().ok_or_else(|| {
        let found = ctx
            .parent()
            .map_or_else(|| "Program".to_string(), |kind| format!("{:?}", kind.ty()));
        anyhow!(
            "Macro {} must be called as either a function or a tagged template expression not {}",
            iden.identifier,
            found
        )
    })
}

/// Range of a tagged template whose tag is the macro.
pub(crate) fn tagged_range(
    iden: &MacroIden,
    ctx: &RangeContext<'_, '_>,
) -> anyhow::Result<ExprRange> {
    let tagged = matches!(ctx.parent(), Some(AstKind::TaggedTemplateExpression(_)));
    match ctx.invocation() {
        Some(range) if tagged => Ok(range),
        _ => bail!(
            "Macro {} must be called as a tag template function",
            iden.identifier
        ),
    }
}

/// Parse the assembled invocation text and evaluate what was passed in.
pub(crate) fn parse_invocation(code: &str, constants: &Constants) -> anyhow::Result<Invocation> {
    let allocator = Allocator::default();
    let expr = Parser::new(&allocator, code, source_type())
        .parse_expression()
        .map_err(|errors| anyhow!("Invalid macro invocation `{}`: {:?}", code, errors))?;
    let evaluator = StaticEvaluator::new(constants);

    match unwrap_parens(&expr) {
        Expression::CallExpression(call) => {
            if call.arguments.len() != 1 {
                bail!(
                    "Expected exactly one argument, found {}",
                    call.arguments.len()
                );
            }
            match call.arguments[0].as_expression() {
                Some(arg) => Ok(Invocation::Call(evaluator.eval(arg)?)),
                None => bail!("Spread arguments cannot be evaluated at compile time"),
            }
        }
        Expression::TaggedTemplateExpression(tagged) => {
            Ok(Invocation::Tagged(evaluator.template(&tagged.quasi)?))
        }
        _ => bail!("`{}` is not a call or a tagged template", code),
    }
}

/// The invocation's single argument as a string.
pub(crate) fn static_string(code: &str) -> anyhow::Result<String> {
    match parse_invocation(code, &Constants::new())? {
        Invocation::Tagged(text) | Invocation::Call(Value::String(text)) => Ok(text),
        Invocation::Call(other) => bail!("Expected a string argument, found {}", other),
    }
}

fn unwrap_parens<'e, 'a>(mut expr: &'e Expression<'a>) -> &'e Expression<'a> {
    while let Expression::ParenthesizedExpression(paren) = expr {
        expr = &paren.expression;
    }
    expr
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_call_and_tagged() {
        let constants = Constants::new();
        assert_eq!(
            parse_invocation("f(1 + 1)", &constants).unwrap(),
            Invocation::Call(json!(2))
        );
        assert_eq!(
            parse_invocation("f`a ${'b'} c`", &constants).unwrap(),
            Invocation::Tagged("a b c".to_string())
        );
    }

    #[test]
    fn test_static_string() {
        assert_eq!(static_string("ms('2 days')").unwrap(), "2 days");
        assert_eq!(static_string("ms`1h`").unwrap(), "1h");
        assert!(static_string("ms(1)").is_err());
        assert!(static_string("ms('a', 'b')").is_err());
    }
}
