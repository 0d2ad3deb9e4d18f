//! Reference resolution and the symmetric write path
//!
//! Read path: `member_value` / `member_value_no_create`
//! Write path: `save_var_in_scope` / `save_var_in_current_scope`
//!
//! Both dispatch on the node kind, distribute automatically over union-typed
//! scopes and objects, and resolve through BVT-stored values against the
//! reader's branch path.

use std::rc::Rc;
use tracing::debug;

use crate::features::branch_state::{load_forked_value, write_value, ExecState};
use crate::features::value_store::{Prim, ScopeKind, VKind, ValueId};
use crate::shared::models::{AstKind, AstNode, LitValue};

use super::super::ports::SubEvaluator;

/// Walk parent links to the scope whose declaration map contains `name`.
///
/// Bounded by `scope_hop_limit` and visited-set guarded against cycles.
/// Falls back to the nearest persistent scope (function/unit/call/top -
/// transient block scopes are skipped) when no declaration is found:
/// implicit-binding semantics, an undeclared name is never an error, and
/// sibling branches writing the same undeclared name must land on one slot.
pub fn def_scope(ev: &dyn SubEvaluator, start: ValueId, name: &str) -> ValueId {
    let hop_limit = ev.interp_config().scope_hop_limit;
    let arena = ev.arena();
    let mut visited: Vec<ValueId> = Vec::with_capacity(8);
    let mut current = start;
    for _ in 0..hop_limit {
        if visited.contains(&current) {
            break;
        }
        visited.push(current);
        if arena.val(current).fields.contains_key(name) {
            return current;
        }
        match arena.val(current).parent {
            Some(p) => current = p,
            None => break,
        }
    }
    implicit_binding_scope(ev, start)
}

/// The scope an undeclared name binds into: nearest non-block scope
fn implicit_binding_scope(ev: &dyn SubEvaluator, start: ValueId) -> ValueId {
    let arena = ev.arena();
    let mut current = start;
    for _ in 0..ev.interp_config().scope_hop_limit {
        match arena.val(current).kind {
            VKind::Scope(ScopeKind::Block) => match arena.val(current).parent {
                Some(p) => current = p,
                None => break,
            },
            _ => break,
        }
    }
    current
}

/// Normalize a dynamic member-access chain (`A[x][y]`) into one keyed by
/// resolved sub-values. Returns the node unchanged when already static or
/// when a computed key stays symbolic.
pub fn resolve_indices(
    ev: &mut dyn SubEvaluator,
    scope: ValueId,
    node: &Rc<AstNode>,
    state: &mut ExecState,
) -> Rc<AstNode> {
    let AstKind::MemberAccess {
        object,
        property,
        computed,
    } = &node.kind
    else {
        return Rc::clone(node);
    };

    let resolved_object = resolve_indices(ev, scope, object, state);
    let mut resolved_property = Rc::clone(property);
    let mut still_computed = *computed;

    if *computed && !matches!(property.kind, AstKind::Literal { .. }) {
        let key = ev.eval_sub(scope, property, state);
        let key = load_forked_value(ev.arena(), key, state);
        if let Some(prim) = &ev.arena().val(key).prim {
            let value = match prim {
                Prim::Str(s) => LitValue::Str(s.clone()),
                Prim::Int(i) => LitValue::Int(*i),
                Prim::Float(f) => LitValue::Float(*f),
                Prim::Bool(b) => LitValue::Bool(*b),
                Prim::Null => LitValue::Null,
            };
            resolved_property = Rc::new(AstNode {
                kind: AstKind::Literal { value },
                loc: property.loc.clone(),
            });
            still_computed = false;
        }
    }

    if Rc::ptr_eq(&resolved_object, object)
        && Rc::ptr_eq(&resolved_property, property)
        && still_computed == *computed
    {
        return Rc::clone(node);
    }
    Rc::new(AstNode {
        kind: AstKind::MemberAccess {
            object: resolved_object,
            property: resolved_property,
            computed: still_computed,
        },
        loc: node.loc.clone(),
    })
}

/// Textual key for one member property, evaluating computed keys through
/// the interpreter. `None` when the key stays symbolic.
fn member_key(
    ev: &mut dyn SubEvaluator,
    scope: ValueId,
    property: &Rc<AstNode>,
    computed: bool,
    state: &mut ExecState,
) -> Option<String> {
    if !computed {
        return Some(property.ref_text());
    }
    match &property.kind {
        AstKind::Literal { value } => Some(match value {
            LitValue::Str(s) => s.clone(),
            LitValue::Int(i) => i.to_string(),
            LitValue::Float(f) => f.to_string(),
            LitValue::Bool(b) => b.to_string(),
            LitValue::Null => "null".to_string(),
        }),
        _ => {
            let key = ev.eval_sub(scope, property, state);
            let key = load_forked_value(ev.arena(), key, state);
            ev.arena().val(key).prim.as_ref().map(|p| match p {
                Prim::Str(s) => s.clone(),
                Prim::Int(i) => i.to_string(),
                Prim::Float(f) => f.to_string(),
                Prim::Bool(b) => b.to_string(),
                Prim::Null => "null".to_string(),
            })
        }
    }
}

/// Resolve a reference expression to a value, lazily creating bindings
pub fn member_value(
    ev: &mut dyn SubEvaluator,
    scope: ValueId,
    node: &Rc<AstNode>,
    state: &mut ExecState,
) -> ValueId {
    resolve_reference(ev, scope, node, state, true)
}

/// Resolve without creating; an unknown reference yields Undefined
pub fn member_value_no_create(
    ev: &mut dyn SubEvaluator,
    scope: ValueId,
    node: &Rc<AstNode>,
    state: &mut ExecState,
) -> ValueId {
    resolve_reference(ev, scope, node, state, false)
}

fn resolve_reference(
    ev: &mut dyn SubEvaluator,
    scope: ValueId,
    node: &Rc<AstNode>,
    state: &mut ExecState,
    create: bool,
) -> ValueId {
    // A union-typed scope distributes resolution over every member
    if let VKind::Union(members) = &ev.arena().val(scope).kind {
        let members = members.clone();
        let resolved: Vec<ValueId> = members
            .iter()
            .map(|&m| resolve_reference(ev, m, node, state, create))
            .collect();
        let config = ev.interp_config().clone();
        return ev.arena_mut().union_of(resolved, &config);
    }

    match &node.kind {
        AstKind::Identifier { name } => {
            let name = name.clone();
            lookup_name(ev, scope, &name, node, state, create)
        }
        AstKind::This => lookup_name(ev, scope, "this", node, state, false),
        AstKind::Super => lookup_name(ev, scope, "super", node, state, false),
        AstKind::Literal { .. } => ev.eval_sub(scope, node, state),
        AstKind::MemberAccess {
            object,
            property,
            computed,
        } => {
            let object = Rc::clone(object);
            let property = Rc::clone(property);
            let computed = *computed;
            let obj = resolve_reference(ev, scope, &object, state, create);
            let obj = load_forked_value(ev.arena(), obj, state);
            read_member(ev, scope, obj, &property, computed, node, state, create)
        }
        AstKind::Tuple { elements } => {
            let elements = elements.clone();
            let resolved: Vec<ValueId> = elements
                .iter()
                .map(|e| resolve_reference(ev, scope, e, state, create))
                .collect();
            ev.arena_mut().list(resolved, Some(Rc::clone(node)))
        }
        // Anything else is a plain expression; hand it to the interpreter
        _ => ev.eval_sub(scope, node, state),
    }
}

fn lookup_name(
    ev: &mut dyn SubEvaluator,
    scope: ValueId,
    name: &str,
    node: &Rc<AstNode>,
    state: &mut ExecState,
    create: bool,
) -> ValueId {
    let owner = def_scope(ev, scope, name);
    if let Some(bound) = ev.arena().binding(owner, name) {
        return load_forked_value(ev.arena(), bound, state);
    }
    if !create {
        return ev.arena().undefined();
    }
    // Auto-vivify: an undeclared name becomes a scope-addressed symbol in
    // the starting scope.
    let qid = {
        let scope_qid = &ev.arena().val(owner).qid;
        if scope_qid.is_empty() {
            name.to_string()
        } else {
            format!("{scope_qid}.{name}")
        }
    };
    let sym = ev.arena_mut().symbol(qid, Some(Rc::clone(node)));
    ev.arena_mut().bind(owner, name, sym);
    sym
}

#[allow(clippy::too_many_arguments)]
fn read_member(
    ev: &mut dyn SubEvaluator,
    scope: ValueId,
    obj: ValueId,
    property: &Rc<AstNode>,
    computed: bool,
    node: &Rc<AstNode>,
    state: &mut ExecState,
    create: bool,
) -> ValueId {
    // Distribute over a union-valued object
    if let VKind::Union(members) = &ev.arena().val(obj).kind {
        let members = members.clone();
        let resolved: Vec<ValueId> = members
            .iter()
            .map(|&m| {
                let m = load_forked_value(ev.arena(), m, state);
                read_member(ev, scope, m, property, computed, node, state, create)
            })
            .collect();
        let config = ev.interp_config().clone();
        return ev.arena_mut().union_of(resolved, &config);
    }

    let Some(key) = member_key(ev, scope, property, computed, state) else {
        // Symbolic key: any element. Model as an opaque member symbol.
        let qid = format!("{}[?]", ev.arena().val(obj).qid);
        return ev.arena_mut().symbol(qid, Some(Rc::clone(node)));
    };

    if let Some(bound) = ev.arena().binding(obj, &key) {
        return load_forked_value(ev.arena(), bound, state);
    }
    if !create {
        return ev.arena().undefined();
    }
    let qid = {
        let owner_qid = &ev.arena().val(obj).qid;
        if owner_qid.is_empty() {
            key.clone()
        } else {
            format!("{owner_qid}.{key}")
        }
    };
    let sym = ev.arena_mut().symbol(qid, Some(Rc::clone(node)));
    ev.arena_mut().bind(obj, &key, sym);
    sym
}

/// Persist `value` for the reference `node`, writing to the owning scope.
///
/// MemberAccess recurses into the object (creating it when absent) then
/// writes its property; Identifier/Parameter writes go through the
/// state-aware writer that delegates to the BVT writer under open branches.
pub fn save_var_in_scope(
    ev: &mut dyn SubEvaluator,
    scope: ValueId,
    node: &Rc<AstNode>,
    value: ValueId,
    state: &mut ExecState,
) {
    save_reference(ev, scope, node, value, state, false)
}

/// Persist `value` directly in `scope` (declarations), skipping the
/// defining-scope walk
pub fn save_var_in_current_scope(
    ev: &mut dyn SubEvaluator,
    scope: ValueId,
    node: &Rc<AstNode>,
    value: ValueId,
    state: &mut ExecState,
) {
    save_reference(ev, scope, node, value, state, true)
}

fn save_reference(
    ev: &mut dyn SubEvaluator,
    scope: ValueId,
    node: &Rc<AstNode>,
    value: ValueId,
    state: &mut ExecState,
    current_only: bool,
) {
    // A union-typed scope receives the write on every member
    if let VKind::Union(members) = &ev.arena().val(scope).kind {
        let members = members.clone();
        for m in members {
            save_reference(ev, m, node, value, state, current_only);
        }
        return;
    }

    match &node.kind {
        AstKind::Identifier { name } => {
            let name = name.clone();
            let owner = if current_only {
                scope
            } else {
                def_scope(ev, scope, &name)
            };
            write_value(ev.arena_mut(), owner, &name, value, state);
        }
        AstKind::Parameter { name, .. } => {
            let name = name.clone();
            write_value(ev.arena_mut(), scope, &name, value, state);
        }
        AstKind::This => {
            write_value(ev.arena_mut(), scope, "this", value, state);
        }
        AstKind::MemberAccess {
            object,
            property,
            computed,
        } => {
            let object = Rc::clone(object);
            let property = Rc::clone(property);
            let computed = *computed;
            let obj = resolve_reference(ev, scope, &object, state, true);
            let obj = load_forked_value(ev.arena(), obj, state);
            write_member(ev, scope, obj, &property, computed, value, state);
        }
        AstKind::Tuple { elements } => {
            // Destructuring: zip against the value's elements, or fan the
            // same value out when the right side is not a concrete pack.
            let elements = elements.clone();
            let parts = ev.arena().val(value).elements.clone();
            for (i, target) in elements.iter().enumerate() {
                let part = parts.get(i).copied().unwrap_or(value);
                save_reference(ev, scope, target, part, state, current_only);
            }
        }
        other => {
            debug!(node = node.tag(), "unsupported write target; dropping");
            let _ = other;
        }
    }
}

fn write_member(
    ev: &mut dyn SubEvaluator,
    scope: ValueId,
    obj: ValueId,
    property: &Rc<AstNode>,
    computed: bool,
    value: ValueId,
    state: &mut ExecState,
) {
    if let VKind::Union(members) = &ev.arena().val(obj).kind {
        let members = members.clone();
        for m in members {
            let m = load_forked_value(ev.arena(), m, state);
            write_member(ev, scope, m, property, computed, value, state);
        }
        return;
    }
    match member_key(ev, scope, property, computed, state) {
        Some(key) => write_value(ev.arena_mut(), obj, &key, value, state),
        None => {
            // Symbolic key: the write lands nowhere precise; record it on a
            // wildcard slot so taint stays observable.
            write_value(ev.arena_mut(), obj, "[?]", value, state);
        }
    }
}
