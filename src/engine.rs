use std::rc::Rc;
use std::time::Duration;

use oxc_allocator::Allocator;
use oxc_ast::ast::Program;
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use regex::Regex;
use tokio::task::LocalSet;
use tracing::{debug, warn};

use crate::config::MacroConfig;
use crate::definition::{ExprRange, MacroDefinition, MacroRegistry};
use crate::error::MacroError;
use crate::nesting::PatchStack;
use crate::patch::{apply_patches, ClosedPatch};
use crate::scheduler::TaskScheduler;
use crate::visitor::MacroVisitor;

/// Replace every macro invocation in `code` using the default configuration.
///
/// `program` may be a tree already parsed from `code`; when absent the text
/// is parsed as an ES module.
pub async fn replace_macros(
    code: &str,
    macros: Vec<MacroDefinition>,
    program: Option<&Program<'_>>,
) -> Result<String, MacroError> {
    replace_macros_with(&MacroConfig::default(), code, macros, program).await
}

pub async fn replace_macros_with(
    config: &MacroConfig,
    code: &str,
    macros: Vec<MacroDefinition>,
    program: Option<&Program<'_>>,
) -> Result<String, MacroError> {
    let mut registry = MacroRegistry::new(macros)?;
    let import_pattern = config.import_regex()?;

    let local = LocalSet::new();
    let work = local.run_until(run(config, &mut registry, &import_pattern, code, program));
    match config.timeout_ms {
        Some(timeout_ms) => tokio::time::timeout(Duration::from_millis(timeout_ms), work)
            .await
            .map_err(|_| {
                warn!("Macro replacement timed out after {}ms", timeout_ms);
                MacroError::Timeout { timeout_ms }
            })?,
        None => work.await,
    }
}

async fn run(
    config: &MacroConfig,
    registry: &mut MacroRegistry,
    import_pattern: &Regex,
    code: &str,
    program: Option<&Program<'_>>,
) -> Result<String, MacroError> {
    let source: Rc<str> = Rc::from(code);

    let (base, patches) = match program {
        Some(program) => {
            registry.run_pre_hooks(code)?;
            collect_patches(program, registry, import_pattern, &source)?
        }
        None => {
            let allocator = Allocator::default();
            let ret = Parser::new(&allocator, code, config.source_type()).parse();
            if let Some(error) = ret.errors.first() {
                return Err(MacroError::Parse {
                    message: format!("{:?}", error),
                });
            }
            registry.run_pre_hooks(code)?;
            collect_patches(&ret.program, registry, import_pattern, &source)?
        }
    };

    debug!("Walk done, {} top-level patches", patches.len());
    let replaced = apply_patches(&source, base, patches).await?;
    registry.run_post_hooks(&replaced)?;
    Ok(replaced)
}

/// Walk the program, spawning a task for every patch as it closes.
fn collect_patches(
    program: &Program<'_>,
    registry: &MacroRegistry,
    import_pattern: &Regex,
    source: &Rc<str>,
) -> Result<(ExprRange, Vec<ClosedPatch>), MacroError> {
    let stack = PatchStack::new(TaskScheduler::new(Rc::clone(source)));
    let mut visitor = MacroVisitor::new(registry, import_pattern, source, stack);
    visitor.visit_program(program);
    Ok((program.span.into(), visitor.finish()?))
}
