//! # Macro Preprocessor Ground Truth
//!
//! Source-to-source expansion of compile-time macros in JS/TS modules.
//! A macro is an ordinary import (`import { ms } from 'ms.macro'`); every
//! use of the imported identifier is replaced by text the macro computes.
//!
//! ## Span Invariants
//!
//! 1. **Original Offsets**: every span is a byte range into the text that was
//!    passed in. Replacements never shift the offsets of other spans.
//!
//! 2. **Strict Nesting**: two spans are either disjoint or one strictly
//!    contains the other (`inner.start > outer.start && inner.end <= outer.end`).
//!    Anything else is a compile error (M-ERR-OVERLAP).
//!
//! 3. **Children First**: a macro's replace function receives its span with
//!    every nested invocation already substituted.
//!
//! 4. **Import Prologue**: macro imports come before every other binding
//!    (M-ERR-IMPORT-ORDER). Their declarations are deleted from the output and
//!    no macro span may reach into them (M-ERR-RANGE-IMPORT).
//!
//! 5. **Fail Fast**: the first error aborts the run. There is no partial output.
//!
//! ## Execution Model
//!
//! One walk discovers all spans; closing a span spawns a local task on a
//! single thread. Nothing awaits until the walk is done.

#[cfg(feature = "napi")]
mod native;

mod bindings;
mod config;
mod definition;
mod engine;
mod error;
pub mod eval;
pub mod macros;
mod nesting;
mod patch;
mod scheduler;
mod visitor;

#[cfg(test)]
mod engine_tests;

#[cfg(feature = "napi")]
pub use native::{replace_macros_native, NativeResult};

pub use bindings::ImportBindings;
pub use config::{MacroConfig, DEFAULT_IMPORT_PATTERN};
pub use definition::{
    ExprRange, MacroDefinition, MacroIden, MacroSpecifier, RangeContext, RangeFn, ReplaceFn,
    ReplaceFuture,
};
pub use engine::{replace_macros, replace_macros_with};
pub use error::{HookPhase, MacroError};
pub use macros::{ms_macro, preval_macro, style_macro, PrevalOptions, StyleOptions, StyleSheet};
