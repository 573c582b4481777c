//! End-to-end tests for the replacement engine
//!
//! These drive `replace_macros_with` over real source text:
//! - import prologue deletion and original-offset substitution
//! - nesting, ordering and async completion
//! - every fail-fast error path

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use anyhow::anyhow;
    use oxc_allocator::Allocator;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    use crate::{
        replace_macros, replace_macros_with, ExprRange, MacroConfig, MacroDefinition, MacroError,
        MacroIden, MacroSpecifier, RangeContext,
    };

    fn invocation(_: &MacroIden, ctx: &RangeContext<'_, '_>) -> anyhow::Result<ExprRange> {
        ctx.invocation().ok_or_else(|| anyhow!("not called"))
    }

    fn call<F>(replace: F) -> MacroSpecifier
    where
        F: Fn(&MacroIden, &str) -> anyhow::Result<String> + 'static,
    {
        MacroSpecifier::new(invocation, replace)
    }

    async fn run(code: &str, macros: Vec<MacroDefinition>) -> Result<String, MacroError> {
        replace_macros_with(&MacroConfig::any_source(), code, macros, None).await
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // OUTPUT SHAPE
    // ═══════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_import_deleted_and_call_replaced() {
        let macros = vec![MacroDefinition::new("m").specifier("x", call(|_, _| Ok("2".to_string())))];
        let out = run("import { x } from 'm'; x(1+1);", macros).await.unwrap();
        assert_eq!(out, " 2;");
    }

    #[tokio::test]
    async fn test_flat_spans_replaced_in_order() {
        let macros = vec![MacroDefinition::new("m")
            .specifier("x", call(|_, expr| Ok(format!("[{}]", expr))))];
        let code = "import { x } from 'm';\nconst a = x(1);\nconst b = x(22);\n";
        let out = run(code, macros).await.unwrap();
        assert_eq!(out, "\nconst a = [x(1)];\nconst b = [x(22)];\n");
    }

    #[tokio::test]
    async fn test_parent_receives_substituted_children() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (g_log, f_log) = (Rc::clone(&seen), Rc::clone(&seen));
        let macros = vec![MacroDefinition::new("m")
            .specifier(
                "g",
                call(move |_, expr| {
                    g_log.borrow_mut().push(expr.to_string());
                    Ok(format!("R{}", &expr[2..3]))
                }),
            )
            .specifier(
                "f",
                call(move |_, expr| {
                    f_log.borrow_mut().push(expr.to_string());
                    Ok("done".to_string())
                }),
            )];

        let out = run("import { f, g } from 'm';\nf(g(1), g(2));", macros)
            .await
            .unwrap();

        assert_eq!(out, "\ndone;");
        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen.last().map(String::as_str), Some("f(R1, R2)"));
    }

    #[tokio::test]
    async fn test_no_macros_is_identity() {
        let code = "import React from 'react';\nconst el = React.createElement('div');\n";
        assert_eq!(replace_macros(code, vec![], None).await.unwrap(), code);
    }

    #[tokio::test]
    async fn test_non_macro_imports_left_intact() {
        let macros = vec![
            MacroDefinition::new("m").specifier("x", call(|_, _| Ok("1".to_string()))),
            MacroDefinition::new("a.macro").specifier("y", call(|_, _| Ok("2".to_string()))),
        ];
        let code = "import { x } from 'm';\nimport { z } from 'b.macro';\nimport { y } from 'a.macro';\nx(); y(); z();";
        let out = replace_macros(code, macros, None).await.unwrap();
        assert_eq!(
            out,
            "import { x } from 'm';\nimport { z } from 'b.macro';\n\nx(); 2; z();"
        );
    }

    #[tokio::test]
    async fn test_aliased_and_default_imports() {
        let macros = vec![MacroDefinition::new("m")
            .specifier("x", call(|iden, _| Ok(format!("'{}'", iden.identifier))))
            .specifier("default", call(|iden, _| Ok(format!("'{}'", iden.specifier))))];
        let code = "import d, { x as y } from 'm';\ny(); d();";
        let out = run(code, macros).await.unwrap();
        assert_eq!(out, "\n'y'; 'default';");
    }

    #[tokio::test]
    async fn test_provided_program_is_used() {
        let code = "import { x } from 'm';\nlet n: number = x();";
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, code, SourceType::ts()).parse();
        assert!(ret.errors.is_empty());

        let macros = vec![MacroDefinition::new("m").specifier("x", call(|_, _| Ok("7".to_string())))];
        let out = replace_macros_with(&MacroConfig::any_source(), code, macros, Some(&ret.program))
            .await
            .unwrap();
        assert_eq!(out, "\nlet n: number = 7;");
    }

    #[tokio::test]
    async fn test_hooks_see_source_and_output() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (pre, post) = (Rc::clone(&seen), Rc::clone(&seen));
        let macros = vec![MacroDefinition::new("m")
            .specifier("x", call(|_, _| Ok("1".to_string())))
            .hook_pre(move |code| {
                pre.borrow_mut().push(format!("pre:{}", code));
                Ok(())
            })
            .hook_post(move |code| {
                post.borrow_mut().push(format!("post:{}", code));
                Ok(())
            })];

        run("import { x } from 'm';x();", macros).await.unwrap();
        assert_eq!(
            *seen.borrow(),
            vec!["pre:import { x } from 'm';x();".to_string(), "post:1;".to_string()]
        );
    }

    #[tokio::test]
    async fn test_async_replacements_complete_out_of_order() {
        let finished = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&finished);
        let specifier = MacroSpecifier::new_async(invocation, move |_: MacroIden, expr: String| {
            let log = Rc::clone(&log);
            async move {
                let delay = if expr.contains('1') { 40 } else { 1 };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                log.borrow_mut().push(expr.clone());
                Ok::<_, anyhow::Error>(format!("<{}>", expr))
            }
        });
        let macros = vec![MacroDefinition::new("m").specifier("x", specifier)];

        let out = run("import { x } from 'm';\nx(1); x(2);", macros).await.unwrap();
        assert_eq!(out, "\n<x(1)>; <x(2)>;");
        assert_eq!(*finished.borrow(), vec!["x(2)".to_string(), "x(1)".to_string()]);
    }

    #[tokio::test]
    async fn test_shadowed_locals_are_not_macros() {
        let macros = vec![MacroDefinition::new("m")
            .specifier("x", call(|_, expr| Ok(format!("[{}]", expr))))];
        let code = "import { x } from 'm';\nfunction shadow(x) { return x + 10; }\nconst f = () => { const x = 1; return x; };\nx(1);";
        let out = run(code, macros).await.unwrap();
        assert_eq!(
            out,
            "\nfunction shadow(x) { return x + 10; }\nconst f = () => { const x = 1; return x; };\n[x(1)];"
        );
    }

    #[tokio::test]
    async fn test_shadowing_ends_with_function() {
        let macros = vec![MacroDefinition::new("m")
            .specifier("x", call(|_, expr| Ok(format!("[{}]", expr))))];
        let code = "import { x } from 'm';\nfunction outer() { function x() {} return x(); }\nfunction inner() { const g = (x) => x; return x(2); }";
        let out = run(code, macros).await.unwrap();
        assert_eq!(
            out,
            "\nfunction outer() { function x() {} return x(); }\nfunction inner() { const g = (x) => x; return [x(2)]; }"
        );
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // FAILURES
    // ═══════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_partial_overlap_fails() {
        let specifier = MacroSpecifier::new(
            |_, ctx| Ok(ExprRange::new(ctx.identifier.start, ctx.identifier.start + 6)),
            |_, expr| Ok(expr.to_string()),
        );
        let macros = vec![MacroDefinition::new("m").specifier("x", specifier)];
        let err = run("import { x } from 'm';\nx(1)+x(2);\nvoid 0;\n", macros)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "M-ERR-OVERLAP");
    }

    #[tokio::test]
    async fn test_malformed_range_fails_before_any_replace() {
        let replaced = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&replaced);
        let macros = vec![
            MacroDefinition::new("m")
                .specifier("ok", call(move |_, _| {
                    *flag.borrow_mut() = true;
                    Ok(String::new())
                }))
                .specifier(
                    "x",
                    MacroSpecifier::new(|_, _| Ok(ExprRange::new(5, 2)), |_, _| Ok(String::new())),
                ),
        ];
        let err = run("import { ok, x } from 'm';\nok();\nx();", macros)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "M-ERR-RANGE");
        assert!(err.to_string().contains("range end before start"));
        assert!(!*replaced.borrow());
    }

    #[tokio::test]
    async fn test_range_past_end_of_text_fails() {
        let specifier =
            MacroSpecifier::new(|_, ctx| Ok(ExprRange::new(ctx.identifier.start, 999)), |_, _| {
                Ok(String::new())
            });
        let macros = vec![MacroDefinition::new("m").specifier("x", specifier)];
        let err = run("import { x } from 'm';\nx();", macros).await.unwrap_err();
        assert_eq!(err.code(), "M-ERR-RANGE");
    }

    #[tokio::test]
    async fn test_range_splitting_character_fails() {
        let specifier = MacroSpecifier::new(
            |_, ctx| Ok(ExprRange::new(ctx.identifier.start, ctx.identifier.start + 4)),
            |_, _| Ok(String::new()),
        );
        let macros = vec![MacroDefinition::new("m").specifier("x", specifier)];
        let err = run("import { x } from 'm';\nx('\u{e9}');", macros)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "M-ERR-RANGE");
        assert!(err.to_string().contains("range splits a character"));
    }

    #[tokio::test]
    async fn test_panicking_replace_is_task_failure() {
        let macros = vec![MacroDefinition::new("m")
            .specifier("x", call(|_, _| -> anyhow::Result<String> { panic!("replace blew up") }))];
        let err = run("import { x } from 'm';\nx();", macros).await.unwrap_err();
        match err {
            MacroError::TaskFailed { range, .. } => assert_eq!(range, ExprRange::new(23, 26)),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_range_into_import_prologue_fails() {
        let specifier = MacroSpecifier::new(
            |_, ctx| Ok(ExprRange::new(0, ctx.identifier.end)),
            |_, _| Ok(String::new()),
        );
        let macros = vec![MacroDefinition::new("m").specifier("x", specifier)];
        let err = run("import { x } from 'm';\nx();", macros).await.unwrap_err();
        assert_eq!(err.code(), "M-ERR-RANGE-IMPORT");
    }

    #[tokio::test]
    async fn test_import_after_identifier_fails() {
        let macros = vec![MacroDefinition::new("m").specifier("x", call(|_, _| Ok(String::new())))];
        let err = run("const a = 1;\nimport { x } from 'm';\nx();", macros)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "M-ERR-IMPORT-ORDER");
    }

    #[tokio::test]
    async fn test_unknown_specifier_fails() {
        let macros = vec![MacroDefinition::new("m").specifier("x", call(|_, _| Ok(String::new())))];
        let err = run("import { y } from 'm';\ny();", macros).await.unwrap_err();
        match err {
            MacroError::UnknownSpecifier {
                source_name,
                specifier,
            } => {
                assert_eq!(source_name, "m");
                assert_eq!(specifier, "y");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_namespace_import_fails() {
        let macros = vec![MacroDefinition::new("m").specifier("x", call(|_, _| Ok(String::new())))];
        let err = run("import * as m from 'm';\nm.x();", macros).await.unwrap_err();
        assert_eq!(err.code(), "M-ERR-IMPORT-FORM");
    }

    #[tokio::test]
    async fn test_duplicate_macro_fails() {
        let macros = vec![MacroDefinition::new("m"), MacroDefinition::new("m")];
        let err = run("x();", macros).await.unwrap_err();
        assert_eq!(err.code(), "M-ERR-DUPLICATE");
    }

    #[tokio::test]
    async fn test_range_fn_error_is_wrapped() {
        let macros = vec![MacroDefinition::new("m").specifier("x", call(|_, _| Ok(String::new())))];
        let err = run("import { x } from 'm';\nconst f = x;", macros)
            .await
            .unwrap_err();
        match err {
            MacroError::RangeFailed { macro_iden, source } => {
                assert_eq!(macro_iden.identifier, "x");
                assert_eq!(source.to_string(), "not called");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_replace_error_carries_snippet() {
        let macros = vec![MacroDefinition::new("m")
            .specifier("x", call(|_, _| Err(anyhow!("cannot expand"))))];
        let err = run("import { x } from 'm';\nx(42);", macros).await.unwrap_err();
        match err {
            MacroError::ReplaceFailed { range, snippet, .. } => {
                assert_eq!(range, ExprRange::new(23, 28));
                assert_eq!(snippet, "x(42)");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_parse_error() {
        let err = run("import { x } from 'm'; x(", vec![]).await.unwrap_err();
        assert_eq!(err.code(), "M-ERR-PARSE");
    }

    #[tokio::test]
    async fn test_timeout() {
        let specifier = MacroSpecifier::new_async(invocation, |_: MacroIden, _: String| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, anyhow::Error>(String::new())
        });
        let macros = vec![MacroDefinition::new("m").specifier("x", specifier)];
        let config = MacroConfig {
            timeout_ms: Some(20),
            ..MacroConfig::any_source()
        };
        let err = replace_macros_with(&config, "import { x } from 'm';\nx();", macros, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "M-ERR-TIMEOUT");
    }
}
