//! Join-point merging
//!
//! At a branch join the touched structure is walked and every BVT recorded
//! by the joining fork is collapsed into a single value, in place: readers
//! holding the slot's id observe the union from then on.
//!
//! Meet-over-paths discipline:
//! - a branch that wrote contributes its written value
//! - a branch that did not write contributes the pre-branch base
//! - a branch that terminated (return/throw) contributes nothing; its
//!   writes are unreachable on the fall-through path
//!
//! None of these operations fail; malformed or absent BVT structure leaves
//! the value unmodified.

use rustc_hash::FxHashSet;

use crate::config::InterpreterConfig;
use crate::features::value_store::{BvtData, VKind, ValueArena, ValueId};

use super::super::domain::state::ExecState;

/// Union of alternatives (dedup + cap); thin facade over the arena so the
/// interpreter and the merge walk share one rule set.
pub fn union_values(
    arena: &mut ValueArena,
    members: Vec<ValueId>,
    config: &InterpreterConfig,
) -> ValueId {
    arena.union_of(members, config)
}

/// Collapse the most recent fork of `parent_state` across everything
/// reachable from `roots`.
///
/// `children` are the forked states as they ended; a child whose exit is
/// terminal is excluded from the union (its writes cannot be observed on
/// the fall-through path).
pub fn merge_forked_values(
    arena: &mut ValueArena,
    roots: &[ValueId],
    parent_state: &mut ExecState,
    children: &[ExecState],
    config: &InterpreterConfig,
) {
    let record = match parent_state.binfo.pop() {
        Some(r) => r,
        None => return, // no fork to join; degrade silently
    };
    let arity = record.arity;
    let excluded: Vec<bool> = (0..arity)
        .map(|i| {
            children
                .get(i)
                .map(|c| c.einfo.kind.is_terminal())
                .unwrap_or(false)
        })
        .collect();

    let bvts = collect_reachable_bvts(arena, roots, config.merge_walk_depth);
    for bvt in bvts {
        collapse_bvt(arena, bvt, &record.prefix, arity, &excluded, config);
    }
}

/// Visited-set + depth guarded walk over the shared (cyclic) value graph
fn collect_reachable_bvts(
    arena: &ValueArena,
    roots: &[ValueId],
    depth_cap: usize,
) -> Vec<ValueId> {
    let mut visited: FxHashSet<ValueId> = FxHashSet::default();
    let mut bvts = Vec::new();
    let mut stack: Vec<(ValueId, usize)> = roots.iter().map(|&r| (r, 0)).collect();

    while let Some((id, depth)) = stack.pop() {
        if depth > depth_cap || !visited.insert(id) {
            continue;
        }
        let v = arena.val(id);
        if v.is_bvt() {
            bvts.push(id);
        }
        for &child in v.fields.values() {
            stack.push((child, depth + 1));
        }
        for &child in &v.elements {
            stack.push((child, depth + 1));
        }
        match &v.kind {
            VKind::Union(members) => {
                for &m in members {
                    stack.push((m, depth + 1));
                }
            }
            VKind::BVT(data) => {
                for &(_, c) in &data.children {
                    stack.push((c, depth + 1));
                }
                if let Some(base) = data.base {
                    stack.push((base, depth + 1));
                }
            }
            _ => {}
        }
    }
    bvts
}

/// Collapse one BVT's entries belonging to the fork `(prefix, arity)`.
///
/// Entries belonging to other (outer, still-open) forks survive; when the
/// join happens at the root path and nothing else remains, the union takes
/// the BVT's place entirely so readers holding the slot id observe it.
fn collapse_bvt(
    arena: &mut ValueArena,
    bvt_id: ValueId,
    prefix: &str,
    arity: usize,
    excluded: &[bool],
    config: &InterpreterConfig,
) {
    let data = match &arena.val(bvt_id).kind {
        VKind::BVT(d) => d.clone(),
        _ => return,
    };

    let mut mine: Vec<Option<ValueId>> = vec![None; arity];
    let mut others: Vec<(String, ValueId)> = Vec::new();
    for (key, value) in data.children {
        let claimed = key.len() == prefix.len() + 1
            && key.starts_with(prefix)
            && key
                .chars()
                .last()
                .and_then(|marker| (0..arity).find(|&i| ExecState::marker(i) == marker))
                .map(|i| {
                    mine[i] = Some(value);
                })
                .is_some();
        if !claimed {
            others.push((key, value));
        }
    }

    if mine.iter().all(Option::is_none) {
        return; // this fork never touched the slot
    }

    let base = data.base;
    let mut members: Vec<ValueId> = Vec::with_capacity(arity);
    let mut any_live = false;
    for i in 0..arity {
        if excluded.get(i).copied().unwrap_or(false) {
            continue;
        }
        any_live = true;
        members.push(mine[i].or(base).unwrap_or_else(|| arena.undefined()));
    }
    if !any_live {
        // Every branch terminated; the fall-through observer keeps the
        // pre-branch value.
        members.push(base.unwrap_or_else(|| arena.undefined()));
    }

    let merged = arena.union_of(members, config);

    if others.is_empty() && prefix.is_empty() {
        replace_in_place(arena, bvt_id, merged);
    } else {
        let mut remaining = BvtData {
            children: others,
            base,
        };
        if prefix.is_empty() {
            remaining.base = Some(merged);
        } else {
            remaining.record(prefix, merged);
        }
        let tainted = arena.val(merged).has_tag_rec;
        let merged_trace = arena.val(merged).trace.clone();
        let slot = arena.val_mut(bvt_id);
        slot.kind = VKind::BVT(remaining);
        if tainted && !slot.has_tag_rec {
            slot.has_tag_rec = true;
            if slot.trace.is_empty() {
                slot.trace = merged_trace;
            }
        }
    }
}

/// Overwrite the slot's content with `source`'s, keeping the slot's binding
/// identity (id, sid, qid, parent) so existing references observe the merge.
fn replace_in_place(arena: &mut ValueArena, slot: ValueId, source: ValueId) {
    if slot == source {
        return;
    }
    let src = arena.val(source).clone();
    let dst = arena.val_mut(slot);
    dst.kind = src.kind;
    dst.prim = src.prim;
    dst.fields = src.fields;
    dst.elements = src.elements;
    dst.tags = src.tags;
    dst.has_tag_rec = src.has_tag_rec;
    if !src.trace.is_empty() {
        dst.trace = src.trace;
    }
    if dst.ast.is_none() {
        dst.ast = src.ast;
    }
}
