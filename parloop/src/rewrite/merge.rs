//! Merging the suggested fixes of one file into a single applicable edit
//! list, and splicing that list against the original source buffer.
//!
//! Nested loops produce textually conflicting fixes: the outer loop's body
//! replacement swallows the inner loop wholesale. The resolution is to drop
//! the enclosing fix — its edit starts earlier and spans the other — and
//! keep the inner one; a later run over the rewritten file can pick the
//! outer loop up again. Pagewide edits (imports) never conflict textually
//! and are deduplicated by their bytes instead.

use super::{SuggestedFix, TextEdit};

/// One flattened edit, remembering which fix it belongs to so the whole fix
/// can be withdrawn on conflict.
#[derive(Clone, Debug)]
struct Positioned {
    edit: TextEdit,
    fix: usize,
}

/// Resolve conflicts and return the surviving edits in application order.
/// Deterministic for a given input ordering.
pub fn merge_fixes(fixes: &[SuggestedFix]) -> Vec<TextEdit> {
    merge_with_survivors(fixes).0
}

/// [`merge_fixes`], also reporting which input fixes survived (by index,
/// ascending) so callers can report per-loop outcomes.
pub fn merge_with_survivors(fixes: &[SuggestedFix]) -> (Vec<TextEdit>, Vec<usize>) {
    let mut items: Vec<Positioned> = Vec::new();
    for (fix_index, fix) in fixes.iter().enumerate() {
        for edit in &fix.edits {
            // Pagewide duplicates collapse to the first occurrence.
            if edit.is_pagewide()
                && items
                    .iter()
                    .any(|it| it.edit.is_pagewide() && it.edit.text == edit.text)
            {
                continue;
            }
            items.push(Positioned {
                edit: edit.clone(),
                fix: fix_index,
            });
        }
    }

    // Stable: equal offsets keep fix order, so application is reproducible.
    items.sort_by_key(|it| it.edit.sort_key());

    let mut i = 0;
    'scan: while i < items.len() {
        for j in i + 1..items.len() {
            if items[i].edit.overlaps(&items[j].edit) {
                // The earlier-starting edit belongs to the enclosing fix;
                // withdraw that fix entirely and resume from the last edit
                // that is already known good.
                let dropped = items[i].fix;
                let survivors_before = items[..i].iter().filter(|it| it.fix != dropped).count();
                items.retain(|it| it.fix != dropped);
                i = survivors_before.saturating_sub(1);
                continue 'scan;
            }
        }
        i += 1;
    }

    let mut survivors: Vec<usize> = items.iter().map(|it| it.fix).collect();
    survivors.sort_unstable();
    survivors.dedup();
    (items.into_iter().map(|it| it.edit).collect(), survivors)
}

/// Apply sorted, non-overlapping edits to `src`. Pagewide edits insert at
/// `import_offset`.
pub fn apply_edits(src: &[u8], edits: &[TextEdit], import_offset: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len() + 256);
    let mut cursor = 0usize;
    for edit in edits {
        let start = edit.start.unwrap_or(import_offset) as usize;
        let end = edit.end.map(|e| e as usize).unwrap_or(start);
        if cursor < start {
            out.extend_from_slice(&src[cursor..start]);
        }
        out.extend_from_slice(&edit.text);
        cursor = cursor.max(end);
    }
    if cursor < src.len() {
        out.extend_from_slice(&src[cursor..]);
    }
    out
}
