//! Compile-time evaluation of a small, side-effect free subset of JavaScript.
//!
//! Built-in macros use it to read the arguments of an invocation after nested
//! macros have been substituted. Values are JSON values: anything that cannot
//! be written back as JSON (`undefined`, `NaN`, functions) is an error.

use std::collections::HashMap;

use anyhow::{anyhow, bail};
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ArrayExpressionElement, Expression, ObjectPropertyKind, PropertyKey, PropertyKind,
    Statement, TemplateLiteral, VariableDeclarationKind,
};
use oxc_parser::{ParseOptions, Parser};
use oxc_span::SourceType;
use oxc_syntax::operator::{BinaryOperator, LogicalOperator, UnaryOperator};
use serde_json::{Map, Value};

/// Identifiers an expression may refer to.
pub type Constants = HashMap<String, Value>;

/// Largest integer a JS number holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

pub(crate) fn source_type() -> SourceType {
    SourceType::default()
        .with_module(true)
        .with_typescript(true)
}

/// Parse `code` as a single expression and evaluate it.
pub fn eval_code(code: &str, constants: &Constants) -> anyhow::Result<Value> {
    let allocator = Allocator::default();
    let expr = Parser::new(&allocator, code, source_type())
        .parse_expression()
        .map_err(|errors| anyhow!("Invalid expression `{}`: {:?}", code, errors))?;
    StaticEvaluator::new(constants).eval(&expr)
}

/// Evaluate `code` as a function body: `const`/`let` bindings followed by a
/// `return`. Bindings shadow `constants` for the rest of the body.
pub fn eval_body(code: &str, constants: &Constants) -> anyhow::Result<Value> {
    let allocator = Allocator::default();
    let options = ParseOptions {
        allow_return_outside_function: true,
        ..ParseOptions::default()
    };
    let ret = Parser::new(&allocator, code, source_type())
        .with_options(options)
        .parse();
    if let Some(error) = ret.errors.first() {
        bail!("Invalid body `{}`: {:?}", code, error);
    }

    let mut locals = constants.clone();
    for statement in &ret.program.body {
        match statement {
            Statement::VariableDeclaration(decl) => {
                if !matches!(
                    decl.kind,
                    VariableDeclarationKind::Const | VariableDeclarationKind::Let
                ) {
                    bail!("Only `const` and `let` declarations can be evaluated");
                }
                for declarator in &decl.declarations {
                    let Some(ident) = declarator.id.get_binding_identifier() else {
                        bail!("Destructuring cannot be evaluated at compile time");
                    };
                    let value = match &declarator.init {
                        Some(init) => StaticEvaluator::new(&locals).eval(init)?,
                        None => bail!("`{}` must be initialized", ident.name),
                    };
                    locals.insert(ident.name.to_string(), value);
                }
            }
            Statement::ReturnStatement(stmt) => {
                return match &stmt.argument {
                    Some(argument) => StaticEvaluator::new(&locals).eval(argument),
                    None => bail!("`return` needs a value"),
                };
            }
            Statement::EmptyStatement(_) => {}
            _ => bail!("Only `const`, `let` and `return` statements can be evaluated"),
        }
    }
    bail!("Body does not return a value")
}

pub struct StaticEvaluator<'c> {
    constants: &'c Constants,
}

impl<'c> StaticEvaluator<'c> {
    pub fn new(constants: &'c Constants) -> Self {
        Self { constants }
    }

    pub fn eval(&self, expr: &Expression<'_>) -> anyhow::Result<Value> {
        match expr {
            Expression::NullLiteral(_) => Ok(Value::Null),
            Expression::BooleanLiteral(lit) => Ok(Value::Bool(lit.value)),
            Expression::NumericLiteral(lit) => js_number(lit.value),
            Expression::StringLiteral(lit) => Ok(Value::String(lit.value.to_string())),
            Expression::TemplateLiteral(tpl) => Ok(Value::String(self.template(tpl)?)),
            Expression::Identifier(ident) => match ident.name.as_str() {
                "undefined" | "NaN" | "Infinity" => {
                    bail!("`{}` cannot be represented as JSON", ident.name)
                }
                name => self
                    .constants
                    .get(name)
                    .cloned()
                    .ok_or_else(|| anyhow!("Unknown identifier `{}`", name)),
            },
            Expression::ParenthesizedExpression(paren) => self.eval(&paren.expression),
            Expression::TSAsExpression(cast) => self.eval(&cast.expression),
            Expression::TSSatisfiesExpression(cast) => self.eval(&cast.expression),
            Expression::ArrayExpression(array) => {
                let mut items = Vec::with_capacity(array.elements.len());
                for element in &array.elements {
                    match element {
                        ArrayExpressionElement::SpreadElement(spread) => {
                            match self.eval(&spread.argument)? {
                                Value::Array(inner) => items.extend(inner),
                                other => bail!("Cannot spread {} into an array", type_of(&other)),
                            }
                        }
                        ArrayExpressionElement::Elision(_) => items.push(Value::Null),
                        _ => match element.as_expression() {
                            Some(expr) => items.push(self.eval(expr)?),
                            None => bail!("Unsupported array element"),
                        },
                    }
                }
                Ok(Value::Array(items))
            }
            Expression::ObjectExpression(object) => {
                let mut map = Map::new();
                for property in &object.properties {
                    match property {
                        ObjectPropertyKind::ObjectProperty(prop) => {
                            if prop.method || !matches!(prop.kind, PropertyKind::Init) {
                                bail!("Methods and accessors cannot be evaluated statically");
                            }
                            let key = self.property_key(&prop.key)?;
                            map.insert(key, self.eval(&prop.value)?);
                        }
                        ObjectPropertyKind::SpreadProperty(spread) => {
                            match self.eval(&spread.argument)? {
                                Value::Object(inner) => map.extend(inner),
                                Value::Null => {}
                                other => bail!("Cannot spread {} into an object", type_of(&other)),
                            }
                        }
                    }
                }
                Ok(Value::Object(map))
            }
            Expression::StaticMemberExpression(member) => {
                let object = self.eval(&member.object)?;
                member_of(&object, member.property.name.as_str())
            }
            Expression::ComputedMemberExpression(member) => {
                let object = self.eval(&member.object)?;
                let key = to_js_string(&self.eval(&member.expression)?);
                member_of(&object, &key)
            }
            Expression::UnaryExpression(unary) => {
                let value = self.eval(&unary.argument)?;
                match unary.operator {
                    UnaryOperator::UnaryNegation => js_number(-to_number(&value)?),
                    UnaryOperator::UnaryPlus => js_number(to_number(&value)?),
                    UnaryOperator::LogicalNot => Ok(Value::Bool(!truthy(&value))),
                    UnaryOperator::Typeof => Ok(Value::String(type_of(&value).to_string())),
                    op => bail!("Unsupported operator `{}`", op.as_str()),
                }
            }
            Expression::BinaryExpression(binary) => {
                let left = self.eval(&binary.left)?;
                let right = self.eval(&binary.right)?;
                binary_op(binary.operator, &left, &right)
            }
            Expression::LogicalExpression(logical) => {
                let left = self.eval(&logical.left)?;
                match logical.operator {
                    LogicalOperator::And if !truthy(&left) => Ok(left),
                    LogicalOperator::Or if truthy(&left) => Ok(left),
                    LogicalOperator::Coalesce if !left.is_null() => Ok(left),
                    _ => self.eval(&logical.right),
                }
            }
            Expression::ConditionalExpression(cond) => {
                if truthy(&self.eval(&cond.test)?) {
                    self.eval(&cond.consequent)
                } else {
                    self.eval(&cond.alternate)
                }
            }
            _ => bail!("Expression cannot be evaluated at compile time"),
        }
    }

    /// Cooked template text with every substitution converted to a string.
    pub fn template(&self, tpl: &TemplateLiteral<'_>) -> anyhow::Result<String> {
        let mut out = String::new();
        for (i, quasi) in tpl.quasis.iter().enumerate() {
            match &quasi.value.cooked {
                Some(cooked) => out.push_str(cooked.as_str()),
                None => bail!("Invalid escape sequence in template `{}`", quasi.value.raw),
            }
            if let Some(expr) = tpl.expressions.get(i) {
                out.push_str(&to_js_string(&self.eval(expr)?));
            }
        }
        Ok(out)
    }

    fn property_key(&self, key: &PropertyKey<'_>) -> anyhow::Result<String> {
        match key {
            PropertyKey::StaticIdentifier(ident) => Ok(ident.name.to_string()),
            PropertyKey::PrivateIdentifier(_) => bail!("Private fields cannot be evaluated"),
            _ => match key.as_expression() {
                Some(expr) => Ok(to_js_string(&self.eval(expr)?)),
                None => bail!("Unsupported property key"),
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JS VALUE SEMANTICS
// ═══════════════════════════════════════════════════════════════════════════════

fn binary_op(op: BinaryOperator, left: &Value, right: &Value) -> anyhow::Result<Value> {
    let numbers = || -> anyhow::Result<(f64, f64)> { Ok((to_number(left)?, to_number(right)?)) };
    match op {
        BinaryOperator::Addition => {
            if is_primitive_number_like(left) && is_primitive_number_like(right) {
                let (a, b) = numbers()?;
                js_number(a + b)
            } else {
                Ok(Value::String(to_js_string(left) + &to_js_string(right)))
            }
        }
        BinaryOperator::Subtraction => numbers().and_then(|(a, b)| js_number(a - b)),
        BinaryOperator::Multiplication => numbers().and_then(|(a, b)| js_number(a * b)),
        BinaryOperator::Division => numbers().and_then(|(a, b)| js_number(a / b)),
        BinaryOperator::Remainder => numbers().and_then(|(a, b)| js_number(a % b)),
        BinaryOperator::Exponential => numbers().and_then(|(a, b)| js_number(a.powf(b))),
        BinaryOperator::StrictEquality | BinaryOperator::Equality => {
            Ok(Value::Bool(strict_equals(left, right)))
        }
        BinaryOperator::StrictInequality | BinaryOperator::Inequality => {
            Ok(Value::Bool(!strict_equals(left, right)))
        }
        BinaryOperator::LessThan
        | BinaryOperator::LessEqualThan
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterEqualThan => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => a.partial_cmp(b),
                _ => {
                    let (a, b) = numbers()?;
                    a.partial_cmp(&b)
                }
            };
            let result = match ordering {
                None => false,
                Some(ordering) => match op {
                    BinaryOperator::LessThan => ordering.is_lt(),
                    BinaryOperator::LessEqualThan => ordering.is_le(),
                    BinaryOperator::GreaterThan => ordering.is_gt(),
                    _ => ordering.is_ge(),
                },
            };
            Ok(Value::Bool(result))
        }
        op => bail!("Unsupported operator `{}`", op.as_str()),
    }
}

fn is_primitive_number_like(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Bool(_) | Value::Number(_))
}

fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(_), _) | (Value::Object(_), _) => false,
        _ => left == right,
    }
}

fn member_of(object: &Value, key: &str) -> anyhow::Result<Value> {
    let found = match object {
        Value::Object(map) => map.get(key).cloned(),
        Value::Array(items) if key == "length" => Some(Value::from(items.len())),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
        Value::String(s) if key == "length" => Some(Value::from(s.encode_utf16().count())),
        _ => None,
    };
    found.ok_or_else(|| anyhow!("Property `{}` not found on {}", key, type_of(object)))
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => "object",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
    }
}

fn to_number(value: &Value) -> anyhow::Result<f64> {
    match value {
        Value::Null => Ok(0.0),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64().ok_or_else(|| anyhow!("Invalid number {}", n)),
        Value::String(s) if s.trim().is_empty() => Ok(0.0),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| anyhow!("\"{}\" is not a number", s)),
        other => bail!("Cannot convert {} to a number", type_of(other)),
    }
}

/// `String(value)` as JavaScript would print it.
pub fn to_js_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.as_f64().map(js_number_text).unwrap_or_else(|| n.to_string()),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => to_js_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Number formatted the way JavaScript prints it for common values.
pub fn js_number_text(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// A JSON number for `n`, integral when `n` is.
pub fn js_number(n: f64) -> anyhow::Result<Value> {
    if !n.is_finite() {
        bail!("{} cannot be represented as JSON", n);
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Ok(Value::from(n as i64));
    }
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| anyhow!("{} cannot be represented as JSON", n))
}
