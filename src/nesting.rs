//! Open stack → closed list.
//!
//! Spans arrive in source order from a single walk. Each one either nests
//! inside the span on top of the open stack or forces that span (and possibly
//! more below it) to close. A closed span is final: its nested set cannot
//! grow, so it is handed to the scheduler right away and attached to its
//! parent, or to the closed list when it has none.
//!
//! Invariants:
//! 1. Every open stack entry strictly contains all entries above it.
//! 2. Starts are non-decreasing from the bottom of the stack to the top.
//! 3. Siblings (nested lists and the closed list) are ascending and disjoint.

use tracing::debug;

use crate::definition::{ExprRange, MacroIden, ReplaceFn};
use crate::error::MacroError;
use crate::patch::ClosedPatch;

/// A span whose nested set may still grow.
pub(crate) struct OpenPatch {
    pub iden: MacroIden,
    pub range: ExprRange,
    pub replace: ReplaceFn,
    pub nested: Vec<ClosedPatch>,
}

impl OpenPatch {
    pub fn new(iden: MacroIden, range: ExprRange, replace: ReplaceFn) -> Self {
        OpenPatch {
            iden,
            range,
            replace,
            nested: Vec::new(),
        }
    }
}

/// Receives patches as they close.
pub(crate) trait Schedule {
    fn schedule(&mut self, patch: OpenPatch) -> ClosedPatch;
}

pub(crate) struct PatchStack<S: Schedule> {
    open: Vec<OpenPatch>,
    closed: Vec<ClosedPatch>,
    scheduler: S,
}

impl<S: Schedule> PatchStack<S> {
    pub fn new(scheduler: S) -> Self {
        PatchStack {
            open: Vec::new(),
            closed: Vec::new(),
            scheduler,
        }
    }

    /// A span that is deleted rather than replaced (an import declaration).
    pub fn push_ready(&mut self, range: ExprRange) -> Result<(), MacroError> {
        self.close_until(range)?;
        append_sibling(&mut self.closed, ClosedPatch::ready(range, ""))
    }

    pub fn push(&mut self, patch: OpenPatch) -> Result<(), MacroError> {
        self.close_until(patch.range)?;
        debug!(
            "Open {} {} at depth {}",
            patch.iden,
            patch.range,
            self.open.len()
        );
        self.open.push(patch);
        Ok(())
    }

    /// Close every open patch; returns the top-level closed list.
    pub fn finish(mut self) -> Result<Vec<ClosedPatch>, MacroError> {
        while let Some(patch) = self.open.pop() {
            self.close(patch)?;
        }
        Ok(self.closed)
    }

    /// Pop until the stack is empty or its top strictly contains `next`.
    fn close_until(&mut self, next: ExprRange) -> Result<(), MacroError> {
        while let Some(top) = self.open.last() {
            if top.range.strictly_contains(&next) {
                break;
            }
            if next.start < top.range.end {
                return Err(MacroError::Overlap {
                    first: top.range,
                    second: next,
                });
            }
            if let Some(patch) = self.open.pop() {
                self.close(patch)?;
            }
        }
        Ok(())
    }

    fn close(&mut self, patch: OpenPatch) -> Result<(), MacroError> {
        debug!("Close {} {} ({} nested)", patch.iden, patch.range, patch.nested.len());
        let closed = self.scheduler.schedule(patch);
        match self.open.last_mut() {
            Some(parent) => append_sibling(&mut parent.nested, closed),
            None => append_sibling(&mut self.closed, closed),
        }
    }
}

fn append_sibling(list: &mut Vec<ClosedPatch>, patch: ClosedPatch) -> Result<(), MacroError> {
    if let Some(previous) = list.last() {
        if patch.range.start < previous.range.end {
            return Err(MacroError::Overlap {
                first: previous.range,
                second: patch.range,
            });
        }
    }
    list.push(patch);
    Ok(())
}
