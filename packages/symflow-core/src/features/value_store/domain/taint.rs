//! Taint markers and provenance traces
//!
//! A tag marks a value as possibly carrying externally-controlled data. The
//! trace is the ordered evidence chain checkers report to their result sink:
//! one step per operation that moved the taint.
//!
//! Invariant maintained here: whenever `has_tag_rec` is set, `trace` is
//! non-empty.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::shared::models::Loc;

use super::arena::ValueArena;
use super::value::{VKind, ValueId};

/// One provenance step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStep {
    /// Source file
    pub file: String,
    /// Line number
    pub line: u32,
    /// What happened at this step (node description)
    pub desc: String,
    /// Tag that moved, when one specific tag is responsible
    #[serde(default)]
    pub tag: Option<String>,
}

impl TraceStep {
    pub fn new(loc: Option<&Loc>, desc: impl Into<String>) -> Self {
        Self {
            file: loc.map(|l| l.file().to_string()).unwrap_or_else(|| "<unknown>".into()),
            line: loc.map(|l| l.start.line).unwrap_or(0),
            desc: desc.into(),
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Stamp a tag directly onto a value (taint source marking)
pub fn stamp_taint(arena: &mut ValueArena, id: ValueId, tag: impl Into<String>, step: TraceStep) {
    let tag = tag.into();
    let v = arena.val_mut(id);
    if !v.tags.contains(&tag) {
        v.tags.push(tag.clone());
    }
    v.has_tag_rec = true;
    v.trace.push(step.with_tag(tag));
}

/// Carry taint from `from` onto `to`, appending one step at the move site.
/// No-op when the source carries nothing.
pub fn propagate_taint(arena: &mut ValueArena, from: ValueId, to: ValueId, step: TraceStep) {
    if from == to || !arena.val(from).has_tag_rec {
        return;
    }
    let (src_tags, src_trace) = {
        let src = arena.val(from);
        (src.tags.clone(), src.trace.clone())
    };
    let dst = arena.val_mut(to);
    for tag in src_tags {
        if !dst.tags.contains(&tag) {
            dst.tags.push(tag);
        }
    }
    if dst.trace.is_empty() {
        dst.trace = src_trace;
    }
    dst.trace.push(step);
    dst.has_tag_rec = true;
}

/// Recursive taint check over the reachable structure.
///
/// The per-value `has_tag_rec` flag is maintained eagerly on the common
/// paths; this walk is the authoritative answer for checkers probing deep
/// structures, and is visited-set guarded because the graph is cyclic.
pub fn has_tag_rec(arena: &ValueArena, id: ValueId) -> bool {
    let mut visited: FxHashSet<ValueId> = FxHashSet::default();
    has_tag_walk(arena, id, &mut visited)
}

fn has_tag_walk(arena: &ValueArena, id: ValueId, visited: &mut FxHashSet<ValueId>) -> bool {
    if !visited.insert(id) {
        return false;
    }
    let v = arena.val(id);
    if v.has_tag_rec || !v.tags.is_empty() {
        return true;
    }
    if v.fields.values().any(|&f| has_tag_walk(arena, f, visited)) {
        return true;
    }
    if v.elements.iter().any(|&e| has_tag_walk(arena, e, visited)) {
        return true;
    }
    match &v.kind {
        VKind::Union(members) => members.iter().any(|&m| has_tag_walk(arena, m, visited)),
        VKind::BVT(bvt) => {
            bvt.children.iter().any(|&(_, c)| has_tag_walk(arena, c, visited))
                || bvt.base.map(|b| has_tag_walk(arena, b, visited)).unwrap_or(false)
        }
        _ => false,
    }
}

/// Concatenated trace of the tainted members, in member order
pub(crate) fn merge_traces(arena: &ValueArena, ids: &[ValueId]) -> Vec<TraceStep> {
    let mut merged = Vec::new();
    for &id in ids {
        let v = arena.val(id);
        if v.has_tag_rec {
            for step in &v.trace {
                if !merged.contains(step) {
                    merged.push(step.clone());
                }
            }
        }
    }
    merged
}
