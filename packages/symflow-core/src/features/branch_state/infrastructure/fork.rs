//! Forking and branch-divergent writes
//!
//! None of these operations fail: absent or malformed BVT structure degrades
//! to returning the value unmodified. The engine must never crash on partial
//! state.

use crate::features::value_store::{BvtData, VKind, ValueArena, ValueId};

use super::super::domain::state::{ExecState, ForkRecord};

/// Upper bound on BVT hops during a read; malformed self-referential
/// structure degrades instead of looping
const BVT_WALK_LIMIT: usize = 32;

/// Fork `state` into `n` children.
///
/// Each child's branch path is extended with a single marker character and
/// its path condition is copied. The parent records the fork site so the
/// join can collapse exactly the BVT entries the children create.
pub fn fork_states(state: &mut ExecState, n: usize) -> Vec<ExecState> {
    state.binfo.push(ForkRecord {
        prefix: state.brs.clone(),
        arity: n,
    });
    (0..n)
        .map(|i| {
            let mut child = state.clone();
            child.parent = Some(Box::new(state.clone()));
            child.brs.push(ExecState::marker(i));
            child
        })
        .collect()
}

/// Write `value` under `key` in `owner`'s field map, honoring the branch
/// discipline: outside any branch this is a plain binding write; under an
/// open branch the write attaches a BVT node at just this field, keeping the
/// pre-branch value visible to sibling branches.
pub fn write_value(
    arena: &mut ValueArena,
    owner: ValueId,
    key: &str,
    value: ValueId,
    state: &ExecState,
) {
    if !state.in_branch() {
        arena.bind(owner, key, value);
        return;
    }

    match arena.binding(owner, key) {
        Some(existing) => {
            if let VKind::BVT(_) = arena.val(existing).kind {
                if let VKind::BVT(data) = &mut arena.val_mut(existing).kind {
                    data.record(&state.brs, value);
                }
            } else {
                let mut data = BvtData::default();
                data.base = Some(existing);
                data.record(&state.brs, value);
                let bvt = arena.alloc(VKind::BVT(data));
                // The BVT node takes over the binding slot; identity of the
                // pre-branch value is preserved as its base.
                let qid = arena.val(existing).qid.clone();
                let sid = arena.val(existing).sid.clone();
                let v = arena.val_mut(bvt);
                v.qid = qid;
                v.sid = sid;
                v.parent = Some(owner);
                arena.val_mut(owner).fields.insert(key.to_string(), bvt);
            }
        }
        None => {
            let mut data = BvtData::default();
            data.record(&state.brs, value);
            let bvt = arena.alloc(VKind::BVT(data));
            arena.bind(owner, key, bvt);
        }
    }
}

/// Resolve a possibly branch-divergent value for a reader on `state.brs`.
///
/// Walks BVT nodes down to the most specific entry recorded on a prefix of
/// the reader's branch path. A reader that has not diverged as far as any
/// recorded write observes the nearest pre-branch value - paths not taken
/// are assumed equal to the pre-divergence value.
pub fn load_forked_value(arena: &ValueArena, id: ValueId, state: &ExecState) -> ValueId {
    let mut current = id;
    for _ in 0..BVT_WALK_LIMIT {
        match &arena.val(current).kind {
            VKind::BVT(data) => {
                if let Some(child) = data.lookup(&state.brs) {
                    if child == current {
                        return current; // malformed self-reference; degrade
                    }
                    current = child;
                } else if let Some(base) = data.base {
                    if base == current {
                        return current;
                    }
                    current = base;
                } else {
                    return arena.undefined();
                }
            }
            _ => return current,
        }
    }
    current
}
