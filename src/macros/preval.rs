//! `preval.macro`: evaluate code at build time and inline the result as JSON.
//!
//! ```js
//! preval(1 + 1);                                  // -> 2
//! preval`const a = 2; return { a, b: a * 2 };`;   // -> {"a":2,"b":4}
//! ```
//!
//! The call form takes one expression, the tagged form a function body.
//! Only side-effect free code is accepted (see [`crate::eval`]); free
//! identifiers resolve against [`PrevalOptions::constants`].

use serde::Deserialize;

use super::{invocation_range, parse_invocation, Invocation};
use crate::definition::{MacroDefinition, MacroSpecifier};
use crate::eval::{eval_body, Constants};

pub const PREVAL_SOURCE: &str = "preval.macro";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrevalOptions {
    pub constants: Constants,
}

pub fn preval_macro(options: PrevalOptions) -> MacroDefinition {
    let constants = options.constants;
    MacroDefinition::new(PREVAL_SOURCE).specifier(
        "preval",
        MacroSpecifier::new(invocation_range, move |_, expr| {
            let value = match parse_invocation(expr, &constants)? {
                Invocation::Call(value) => value,
                Invocation::Tagged(code) => eval_body(&code, &constants)?,
            };
            Ok(serde_json::to_string(&value)?)
        }),
    )
}
