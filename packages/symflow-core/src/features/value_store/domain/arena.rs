//! Value arena
//!
//! All values of one analysis run live in a single arena. IDs are never
//! recycled, so a `ValueId` held by a forked state or a checker stays valid
//! for the whole run. Slot 0 is the shared Undefined singleton, which also
//! serves as the degraded result for any out-of-range access - the arena has
//! no panicking lookup path.

use rustc_hash::FxHashMap;
use std::rc::Rc;
use tracing::debug;

use crate::config::{InterpreterConfig, UnionMergeLevel};
use crate::shared::models::AstNode;

use super::taint::merge_traces;
use super::value::{ClassData, ClosureData, Prim, ScopeKind, VKind, Value, ValueId};

/// Arena of symbolic values
#[derive(Debug, Clone)]
pub struct ValueArena {
    values: Vec<Value>,
    /// Monotonic counter for synthesized short ids
    next_sid: u64,
}

impl ValueArena {
    /// Shared Undefined singleton
    pub const UNDEFINED: ValueId = ValueId(0);

    pub fn new() -> Self {
        let mut arena = Self {
            values: Vec::with_capacity(256),
            next_sid: 0,
        };
        // Slot 0: the Undefined singleton / degraded-access fallback
        arena.alloc(VKind::Undefined);
        arena
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Allocate a fresh value of the given kind
    pub fn alloc(&mut self, kind: VKind) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(Value::new(id, kind));
        id
    }

    /// Read access; out-of-range degrades to the Undefined singleton
    pub fn val(&self, id: ValueId) -> &Value {
        self.values.get(id.0 as usize).unwrap_or(&self.values[0])
    }

    /// Write access; out-of-range degrades to the Undefined singleton slot
    pub fn val_mut(&mut self, id: ValueId) -> &mut Value {
        let idx = id.0 as usize;
        if idx < self.values.len() {
            &mut self.values[idx]
        } else {
            &mut self.values[0]
        }
    }

    fn fresh_sid(&mut self, prefix: &str) -> String {
        self.next_sid += 1;
        format!("{}#{}", prefix, self.next_sid)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Constructors
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// The shared Undefined value
    pub fn undefined(&self) -> ValueId {
        Self::UNDEFINED
    }

    /// A distinct Undefined value that can be stamped independently
    pub fn fresh_undefined(&mut self, ast: Option<Rc<AstNode>>) -> ValueId {
        let id = self.alloc(VKind::Undefined);
        self.val_mut(id).ast = ast;
        id
    }

    /// Declared-but-never-written marker
    pub fn uninitialized(&mut self, ast: Option<Rc<AstNode>>) -> ValueId {
        let id = self.alloc(VKind::Uninitialized);
        self.val_mut(id).ast = ast;
        id
    }

    /// Opaque symbolic value standing in for an unknown quantity
    pub fn symbol(&mut self, desc: impl Into<String>, ast: Option<Rc<AstNode>>) -> ValueId {
        let id = self.alloc(VKind::Symbol);
        let sid = self.fresh_sid("sym");
        let v = self.val_mut(id);
        v.sid = sid;
        v.qid = desc.into();
        v.ast = ast;
        id
    }

    /// Concrete primitive
    pub fn prim(&mut self, prim: Prim, ast: Option<Rc<AstNode>>) -> ValueId {
        let id = self.alloc(VKind::Primitive);
        let v = self.val_mut(id);
        v.prim = Some(prim);
        v.ast = ast;
        id
    }

    /// Empty structured object
    pub fn object(&mut self, ast: Option<Rc<AstNode>>) -> ValueId {
        let id = self.alloc(VKind::Object);
        let sid = self.fresh_sid("obj");
        let v = self.val_mut(id);
        v.sid = sid;
        v.ast = ast;
        id
    }

    /// Ordered collection
    pub fn list(&mut self, elements: Vec<ValueId>, ast: Option<Rc<AstNode>>) -> ValueId {
        let tainted = elements.iter().any(|&e| self.val(e).has_tag_rec);
        let id = self.alloc(VKind::Object);
        let sid = self.fresh_sid("list");
        let trace = if tainted {
            merge_traces(self, &elements)
        } else {
            Vec::new()
        };
        let v = self.val_mut(id);
        v.sid = sid;
        v.elements = elements;
        v.ast = ast;
        v.has_tag_rec = tainted;
        v.trace = trace;
        id
    }

    /// New scope chained under `parent`
    pub fn scope(&mut self, kind: ScopeKind, parent: Option<ValueId>) -> ValueId {
        let id = self.alloc(VKind::Scope(kind));
        let parent_qid = parent.map(|p| self.val(p).qid.clone());
        let sid = self.fresh_sid("scope");
        let v = self.val_mut(id);
        v.sid = sid.clone();
        v.qid = match parent_qid {
            Some(pq) if !pq.is_empty() => format!("{pq}.{sid}"),
            _ => sid,
        };
        v.parent = parent;
        id
    }

    pub fn closure(&mut self, data: ClosureData, ast: Option<Rc<AstNode>>) -> ValueId {
        let name = data.name.clone();
        let id = self.alloc(VKind::Closure(Box::new(data)));
        let v = self.val_mut(id);
        v.sid = name.clone();
        v.qid = name;
        v.ast = ast;
        id
    }

    pub fn class(&mut self, data: ClassData, ast: Option<Rc<AstNode>>) -> ValueId {
        let name = data.name.clone();
        let id = self.alloc(VKind::Class(Box::new(data)));
        let v = self.val_mut(id);
        v.sid = name.clone();
        v.qid = name;
        v.ast = ast;
        id
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Binding
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Bind `name → value` in `scope`, assigning scope-local identity on
    /// first binding. Rebinding a name keeps the value's original identity.
    pub fn bind(&mut self, scope: ValueId, name: &str, value: ValueId) {
        let scope_qid = self.val(scope).qid.clone();
        {
            let v = self.val_mut(value);
            if v.sid.is_empty() {
                v.sid = name.to_string();
            }
            if v.qid.is_empty() {
                v.qid = if scope_qid.is_empty() {
                    name.to_string()
                } else {
                    format!("{scope_qid}.{name}")
                };
            }
            if v.parent.is_none() {
                v.parent = Some(scope);
            }
        }
        self.val_mut(scope).fields.insert(name.to_string(), value);
    }

    /// Look up a binding in exactly this scope (no chain walk)
    pub fn binding(&self, scope: ValueId, name: &str) -> Option<ValueId> {
        self.val(scope).fields.get(name).copied()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Union construction
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Union of alternatives: flattens nested unions, deduplicates, caps.
    ///
    /// Dedup rule (tunable heuristic): same arena identity, or both concrete
    /// primitives with equal kind+payload. `Coarse` merge level additionally
    /// collapses primitives of the same kind into the first representative.
    pub fn union_of(&mut self, members: Vec<ValueId>, config: &InterpreterConfig) -> ValueId {
        let mut flat: Vec<ValueId> = Vec::with_capacity(members.len());
        for m in members {
            match &self.val(m).kind {
                VKind::Union(inner) => flat.extend(inner.iter().copied()),
                _ => flat.push(m),
            }
        }

        let mut kept: Vec<ValueId> = Vec::with_capacity(flat.len());
        for candidate in flat {
            let duplicate = kept.iter().any(|&k| self.same_union_member(k, candidate, config));
            if !duplicate {
                kept.push(candidate);
            }
        }

        if kept.len() > config.union_limit {
            debug!(
                members = kept.len(),
                limit = config.union_limit,
                "union size cap reached; truncating"
            );
            kept.truncate(config.union_limit);
        }

        match kept.len() {
            0 => self.undefined(),
            1 => kept[0],
            _ => {
                let tainted = kept.iter().any(|&m| self.val(m).has_tag_rec);
                let trace = if tainted {
                    merge_traces(self, &kept)
                } else {
                    Vec::new()
                };
                let id = self.alloc(VKind::Union(kept));
                let sid = self.fresh_sid("union");
                let v = self.val_mut(id);
                v.sid = sid;
                v.has_tag_rec = tainted;
                v.trace = trace;
                id
            }
        }
    }

    fn same_union_member(&self, a: ValueId, b: ValueId, config: &InterpreterConfig) -> bool {
        if a == b {
            return true;
        }
        let va = self.val(a);
        let vb = self.val(b);
        match (&va.kind, &vb.kind) {
            (VKind::Primitive, VKind::Primitive) => match config.union_merge_level {
                UnionMergeLevel::Precise => va.prim == vb.prim,
                UnionMergeLevel::Coarse => match (&va.prim, &vb.prim) {
                    (Some(pa), Some(pb)) => pa.kind_name() == pb.kind_name(),
                    _ => false,
                },
            },
            (VKind::Undefined, VKind::Undefined) => true,
            (VKind::Uninitialized, VKind::Uninitialized) => true,
            _ => false,
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Bounded clone (prototype instantiation)
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Bounded-depth structural clone. Fields are cloned recursively up to
    /// `depth_limit`; deeper structure is shared with the original. A copy
    /// map preserves internal sharing and terminates cycles.
    pub fn clone_value(&mut self, id: ValueId, depth_limit: usize) -> ValueId {
        let mut copies: FxHashMap<ValueId, ValueId> = FxHashMap::default();
        self.clone_rec(id, depth_limit, &mut copies)
    }

    fn clone_rec(
        &mut self,
        id: ValueId,
        depth: usize,
        copies: &mut FxHashMap<ValueId, ValueId>,
    ) -> ValueId {
        if let Some(&copy) = copies.get(&id) {
            return copy;
        }
        if depth == 0 {
            return id;
        }
        // Closures, classes and scopes are shared, not cloned: method values
        // keep their captured scope, and scope chains stay intact.
        match self.val(id).kind {
            VKind::Closure(_) | VKind::Class(_) | VKind::Scope(_) => return id,
            _ => {}
        }

        let copy = self.alloc(VKind::Undefined);
        copies.insert(id, copy);

        let source = self.val(id).clone();
        let field_entries: Vec<(String, ValueId)> = source
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        let element_entries: Vec<ValueId> = source.elements.clone();

        let mut cloned_fields = FxHashMap::default();
        for (name, child) in field_entries {
            let child_copy = self.clone_rec(child, depth - 1, copies);
            cloned_fields.insert(name, child_copy);
        }
        let cloned_elements: Vec<ValueId> = element_entries
            .into_iter()
            .map(|child| self.clone_rec(child, depth - 1, copies))
            .collect();

        let target = self.val_mut(copy);
        target.kind = source.kind;
        target.sid = source.sid;
        target.qid = source.qid;
        target.prim = source.prim;
        target.fields = cloned_fields;
        target.elements = cloned_elements;
        target.ast = source.ast;
        target.tags = source.tags;
        target.has_tag_rec = source.has_tag_rec;
        target.trace = source.trace;
        // parent intentionally left unset; the construction site re-parents
        copy
    }
}
