//! Patches and the applier that stitches resolved replacements back into text.

use tokio::task::JoinHandle;

use crate::definition::ExprRange;
use crate::error::MacroError;

/// Resolution state of a closed patch.
#[derive(Debug)]
pub(crate) enum Replacement {
    /// Known up front, e.g. the empty string for a deleted import.
    Ready(String),
    /// Produced by a scheduled task.
    Pending(JoinHandle<Result<String, MacroError>>),
}

/// A span whose nested patches are final and whose replacement is scheduled.
#[derive(Debug)]
pub(crate) struct ClosedPatch {
    pub range: ExprRange,
    pub replacement: Replacement,
}

impl ClosedPatch {
    pub fn ready(range: ExprRange, text: &str) -> Self {
        ClosedPatch {
            range,
            replacement: Replacement::Ready(text.to_string()),
        }
    }

    pub fn pending(range: ExprRange, handle: JoinHandle<Result<String, MacroError>>) -> Self {
        ClosedPatch {
            range,
            replacement: Replacement::Pending(handle),
        }
    }

    /// Wait for the replacement text.
    pub async fn resolve(self) -> Result<(ExprRange, String), MacroError> {
        let text = match self.replacement {
            Replacement::Ready(text) => text,
            Replacement::Pending(handle) => handle.await.map_err(|e| MacroError::TaskFailed {
                range: self.range,
                message: e.to_string(),
            })??,
        };
        Ok((self.range, text))
    }
}

/// Text of `base` with every patch replaced by its resolved value.
///
/// Patches must be ascending and non-overlapping. They are awaited in order,
/// which does not serialize them: every task was spawned before this runs.
pub(crate) async fn apply_patches(
    code: &str,
    base: ExprRange,
    patches: Vec<ClosedPatch>,
) -> Result<String, MacroError> {
    let mut resolved = Vec::with_capacity(patches.len());
    for patch in patches {
        resolved.push(patch.resolve().await?);
    }
    substitute(code, base, &resolved)
}

/// Offsets always refer to the original `code`, never to the output built
/// so far.
pub(crate) fn substitute(
    code: &str,
    base: ExprRange,
    replacements: &[(ExprRange, String)],
) -> Result<String, MacroError> {
    let outside = |range: ExprRange| MacroError::OutOfBounds {
        range,
        len: code.len(),
    };

    if code.get(base.as_usize()).is_none() {
        return Err(outside(base));
    }

    let mut out = String::with_capacity(base.len() as usize);
    let mut cursor = base.start;
    for (range, text) in replacements {
        if range.start < cursor || range.end > base.end {
            let previous = if cursor == base.start {
                base
            } else {
                ExprRange::new(base.start, cursor)
            };
            return Err(MacroError::Overlap {
                first: previous,
                second: *range,
            });
        }
        let between = ExprRange::new(cursor, range.start);
        out.push_str(code.get(between.as_usize()).ok_or_else(|| outside(between))?);
        out.push_str(text);
        cursor = range.end;
    }
    let tail = ExprRange::new(cursor, base.end);
    out.push_str(code.get(tail.as_usize()).ok_or_else(|| outside(tail))?);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(start: u32, end: u32, text: &str) -> (ExprRange, String) {
        (ExprRange::new(start, end), text.to_string())
    }

    #[test]
    fn test_substitute_uses_original_offsets() {
        let code = "a + bb + ccc";
        let out = substitute(
            code,
            ExprRange::new(0, 12),
            &[r(0, 1, "one"), r(4, 6, "2"), r(9, 12, "three")],
        )
        .unwrap();
        assert_eq!(out, "one + 2 + three");
    }

    #[test]
    fn test_substitute_inside_sub_interval() {
        let code = "f(g(1), g(2));";
        let out = substitute(
            code,
            ExprRange::new(0, 13),
            &[r(2, 6, "R1"), r(8, 12, "R2")],
        )
        .unwrap();
        assert_eq!(out, "f(R1, R2)");
    }

    #[test]
    fn test_substitute_without_patches_is_identity() {
        let code = "const a = 1;";
        assert_eq!(substitute(code, ExprRange::new(6, 11), &[]).unwrap(), "a = 1");
    }

    #[test]
    fn test_substitute_rejects_overlap() {
        let err = substitute("abcdef", ExprRange::new(0, 6), &[r(0, 3, "x"), r(2, 4, "y")])
            .unwrap_err();
        assert_eq!(err.code(), "M-ERR-OVERLAP");
    }

    #[test]
    fn test_substitute_rejects_patch_outside_base() {
        let err = substitute("abcdef", ExprRange::new(1, 4), &[r(3, 5, "x")]).unwrap_err();
        assert_eq!(err.code(), "M-ERR-OVERLAP");
    }

    #[test]
    fn test_substitute_rejects_base_outside_text() {
        let err = substitute("abc", ExprRange::new(1, 5), &[]).unwrap_err();
        assert_eq!(err.code(), "M-ERR-BOUNDS");
        assert_eq!(
            err.to_string(),
            "Range [1,5) is outside the source text of 3 bytes"
        );
    }

    #[test]
    fn test_substitute_rejects_split_character() {
        let err = substitute("x('é')", ExprRange::new(0, 4), &[]).unwrap_err();
        assert_eq!(err.code(), "M-ERR-BOUNDS");
    }

    #[tokio::test]
    async fn test_apply_patches_awaits_tasks() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let handle = tokio::task::spawn_local(async { Ok("2".to_string()) });
                let patches = vec![
                    ClosedPatch::ready(ExprRange::new(0, 7), ""),
                    ClosedPatch::pending(ExprRange::new(8, 14), handle),
                ];
                let out = apply_patches("import; x(1+1);", ExprRange::new(0, 15), patches)
                    .await
                    .unwrap();
                assert_eq!(out, " 2;");
            })
            .await;
    }
}
