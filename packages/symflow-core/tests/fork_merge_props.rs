//! Property tests for the fork/merge algebra
//!
//! The meet-over-paths discipline has algebraic obligations that hold for
//! arbitrary written values: the join must contain exactly the branch
//! outcomes (order-independent) and re-merging must be idempotent.

use proptest::prelude::*;

use symflow_core::features::branch_state::{
    fork_states, load_forked_value, merge_forked_values, union_values, write_value, ExecState,
};
use symflow_core::features::value_store::ScopeKind;
use symflow_core::{InterpreterConfig, Prim, ValueArena, ValueId};

fn observed_prims(arena: &ValueArena, id: ValueId) -> Vec<i64> {
    let mut out: Vec<i64> = match arena.val(id).union_members() {
        Some(members) => members
            .iter()
            .filter_map(|&m| match arena.val(m).prim {
                Some(Prim::Int(v)) => Some(v),
                _ => None,
            })
            .collect(),
        None => match arena.val(id).prim {
            Some(Prim::Int(v)) => vec![v],
            _ => vec![],
        },
    };
    out.sort_unstable();
    out.dedup();
    out
}

proptest! {
    /// Writing v1/v2 on the two arms and merging yields exactly {v1, v2}
    #[test]
    fn merge_contains_exactly_branch_outcomes(v1 in -1000i64..1000, v2 in -1000i64..1000) {
        let config = InterpreterConfig::default();
        let mut arena = ValueArena::new();
        let scope = arena.scope(ScopeKind::Top, None);
        let mut state = ExecState::new();

        let children = fork_states(&mut state, 2);
        let a = arena.prim(Prim::Int(v1), None);
        let b = arena.prim(Prim::Int(v2), None);
        write_value(&mut arena, scope, "x", a, &children[0]);
        write_value(&mut arena, scope, "x", b, &children[1]);
        merge_forked_values(&mut arena, &[scope], &mut state, &children, &config);

        let slot = arena.binding(scope, "x").unwrap();
        let merged = load_forked_value(&arena, slot, &state);

        let mut expected = vec![v1, v2];
        expected.sort_unstable();
        expected.dedup();
        prop_assert_eq!(observed_prims(&arena, merged), expected);
    }

    /// The member set does not depend on which branch wrote first
    #[test]
    fn merge_is_order_independent(v1 in -1000i64..1000, v2 in -1000i64..1000) {
        let config = InterpreterConfig::default();

        let run = |first_left: bool| {
            let mut arena = ValueArena::new();
            let scope = arena.scope(ScopeKind::Top, None);
            let mut state = ExecState::new();
            let children = fork_states(&mut state, 2);
            let a = arena.prim(Prim::Int(v1), None);
            let b = arena.prim(Prim::Int(v2), None);
            if first_left {
                write_value(&mut arena, scope, "x", a, &children[0]);
                write_value(&mut arena, scope, "x", b, &children[1]);
            } else {
                write_value(&mut arena, scope, "x", b, &children[1]);
                write_value(&mut arena, scope, "x", a, &children[0]);
            }
            merge_forked_values(&mut arena, &[scope], &mut state, &children, &config);
            let slot = arena.binding(scope, "x").unwrap();
            let merged = load_forked_value(&arena, slot, &state);
            observed_prims(&arena, merged)
        };

        prop_assert_eq!(run(true), run(false));
    }

    /// Re-merging an already-merged union adds nothing
    #[test]
    fn remerge_is_idempotent(values in proptest::collection::vec(-100i64..100, 1..8)) {
        let config = InterpreterConfig::default();
        let mut arena = ValueArena::new();

        let members: Vec<ValueId> = values
            .iter()
            .map(|&v| arena.prim(Prim::Int(v), None))
            .collect();
        let merged = union_values(&mut arena, members.clone(), &config);
        let first = observed_prims(&arena, merged);

        let mut again = vec![merged];
        again.extend(members);
        let remerged = union_values(&mut arena, again, &config);
        prop_assert_eq!(observed_prims(&arena, remerged), first);
    }

    /// A write under one branch stays invisible to the sibling until merge
    #[test]
    fn branch_isolation_holds(pre in -1000i64..1000, written in -1000i64..1000) {
        let config = InterpreterConfig::default();
        let mut arena = ValueArena::new();
        let scope = arena.scope(ScopeKind::Top, None);

        let root = ExecState::new();
        let before = arena.prim(Prim::Int(pre), None);
        write_value(&mut arena, scope, "x", before, &root);

        let mut state = ExecState::new();
        let children = fork_states(&mut state, 2);
        let v = arena.prim(Prim::Int(written), None);
        write_value(&mut arena, scope, "x", v, &children[0]);

        let slot = arena.binding(scope, "x").unwrap();
        // Sibling still observes the pre-branch value
        let sibling_view = load_forked_value(&arena, slot, &children[1]);
        prop_assert_eq!(observed_prims(&arena, sibling_view), vec![pre]);

        merge_forked_values(&mut arena, &[scope], &mut state, &children, &config);
        let after = load_forked_value(&arena, arena.binding(scope, "x").unwrap(), &state);
        let mut expected = vec![pre, written];
        expected.sort_unstable();
        expected.dedup();
        prop_assert_eq!(observed_prims(&arena, after), expected);
    }
}
