use std::rc::Rc;

use tokio::task::JoinHandle;
use tracing::trace;

use crate::definition::{ExprRange, MacroIden, ReplaceFn};
use crate::error::MacroError;
use crate::nesting::{OpenPatch, Schedule};
use crate::patch::{apply_patches, ClosedPatch};

/// Spawns one local task per closed patch.
///
/// Must be used from inside a `LocalSet`. Spawning never blocks the walk;
/// tasks first run once the walk is done and the engine starts awaiting.
pub(crate) struct TaskScheduler {
    code: Rc<str>,
    spawned: usize,
}

impl TaskScheduler {
    pub fn new(code: Rc<str>) -> Self {
        TaskScheduler { code, spawned: 0 }
    }
}

impl Schedule for TaskScheduler {
    fn schedule(&mut self, patch: OpenPatch) -> ClosedPatch {
        self.spawned += 1;
        let range = patch.range;
        trace!("Spawn task #{} for {} {}", self.spawned, patch.iden, range);
        let handle: JoinHandle<Result<String, MacroError>> =
            tokio::task::spawn_local(run_patch(Rc::clone(&self.code), patch));
        ClosedPatch::pending(range, handle)
    }
}

/// Wait for the children, assemble the invocation text, run the macro.
async fn run_patch(code: Rc<str>, patch: OpenPatch) -> Result<String, MacroError> {
    let OpenPatch {
        iden,
        range,
        replace,
        nested,
    } = patch;

    let expr = apply_patches(&code, range, nested).await?;
    trace!("Eval {} {}: {}", iden, range, expr);
    evaluate(&iden, range, &replace, expr).await
}

async fn evaluate(
    iden: &MacroIden,
    range: ExprRange,
    replace: &ReplaceFn,
    expr: String,
) -> Result<String, MacroError> {
    match replace(iden.clone(), expr.clone()).await {
        Ok(text) => {
            trace!("Resolved {} {} -> {:?}", iden, range, text);
            Ok(text)
        }
        Err(err) => Err(MacroError::replace_failed(iden, range, &expr, err)),
    }
}
