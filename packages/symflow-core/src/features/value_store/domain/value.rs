//! Symbolic value representation
//!
//! A [`Value`] approximates one runtime quantity. Instead of a flat byte
//! model, the store is a collection of tagged records addressed by opaque
//! IDs, which keeps forking cheap and makes aliasing explicit: two states
//! that share a `ValueId` observe the same mutations.
//!
//! Invariants:
//! - `has_tag_rec == true` implies a non-empty `trace`
//! - `qid` is unique within the defining scope
//! - `parent` is a relation, never exclusive ownership; cycles are expected

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

use crate::shared::models::AstNode;

use super::taint::TraceStep;

/// Opaque arena index of a value
///
/// All structural links (`parent`, fields, union members, BVT children) are
/// `ValueId`s rather than references so that bounded traversal over cyclic
/// graphs stays safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Primitive scalar payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Prim {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

impl Prim {
    /// Discriminant name, used by union dedup and coarse merging
    pub fn kind_name(&self) -> &'static str {
        match self {
            Prim::Int(_) => "int",
            Prim::Float(_) => "float",
            Prim::Str(_) => "str",
            Prim::Bool(_) => "bool",
            Prim::Null => "null",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Prim::Int(v) => *v != 0,
            Prim::Float(v) => *v != 0.0,
            Prim::Str(s) => !s.is_empty(),
            Prim::Bool(b) => *b,
            Prim::Null => false,
        }
    }
}

/// Scope flavors along one scope chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeKind {
    /// The single root scope of an analysis run
    Top,
    /// One compile unit (module)
    Unit,
    /// Class body scope
    Class,
    /// Function declaration scope (closure capture target)
    Function,
    /// Lexical block scope
    Block,
    /// Per-call activation record; discarded after the call returns
    Call,
}

/// Closure payload
#[derive(Debug, Clone)]
pub struct ClosureData {
    /// Declared name ("" for anonymous)
    pub name: String,
    /// Parameter nodes (`AstKind::Parameter`)
    pub params: Vec<Rc<AstNode>>,
    /// Body block; `None` for signature-only / library closures
    pub body: Option<Rc<AstNode>>,
    /// Decorator expressions in declaration order
    pub decorators: Vec<Rc<AstNode>>,
    /// Scope captured at definition time
    pub captured_scope: ValueId,
    /// Registered builtin thunk name, when this closure is engine-native
    pub native: Option<String>,
}

/// Class payload
#[derive(Debug, Clone)]
pub struct ClassData {
    pub name: String,
    /// Constructor overloads (closure values), declaration order
    pub constructors: Vec<ValueId>,
    /// Declared supertype expressions; resolved lazily at construction
    pub supers: Vec<Rc<AstNode>>,
    pub decorators: Vec<Rc<AstNode>>,
    /// Scope the class body was processed in; methods capture it and the
    /// synthetic `super` binding lands here at construction
    pub member_scope: ValueId,
}

/// Branch Value Tree payload
///
/// Records writes that are visible only on some branch paths. `children` is
/// keyed by the full branch path active at write time; `base` is the
/// pre-divergence value observed by paths that have not written.
#[derive(Debug, Clone, Default)]
pub struct BvtData {
    pub children: Vec<(String, ValueId)>,
    pub base: Option<ValueId>,
}

impl BvtData {
    /// Most specific child for a reader on `brs`: the longest recorded path
    /// that is a prefix of the reader's path.
    pub fn lookup(&self, brs: &str) -> Option<ValueId> {
        self.children
            .iter()
            .filter(|(path, _)| brs.starts_with(path.as_str()))
            .max_by_key(|(path, _)| path.len())
            .map(|(_, id)| *id)
    }

    /// Insert or overwrite the entry for one branch path
    pub fn record(&mut self, brs: &str, value: ValueId) {
        if let Some(slot) = self.children.iter_mut().find(|(path, _)| path == brs) {
            slot.1 = value;
        } else {
            self.children.push((brs.to_string(), value));
        }
    }
}

/// Value kind discriminant + kind-specific payload
#[derive(Debug, Clone)]
pub enum VKind {
    /// Concrete scalar; payload in [`Value::prim`]
    Primitive,
    /// Structured object with a property map
    Object,
    /// Opaque symbolic value standing in for anything unknown
    Symbol,
    Closure(Box<ClosureData>),
    Scope(ScopeKind),
    /// Set of alternative values one binding may hold
    Union(Vec<ValueId>),
    Undefined,
    /// Declared but never written
    Uninitialized,
    /// Branch-divergent write record, collapsed at the join
    BVT(BvtData),
    Class(Box<ClassData>),
}

impl VKind {
    pub fn tag(&self) -> &'static str {
        match self {
            VKind::Primitive => "primitive",
            VKind::Object => "object",
            VKind::Symbol => "symbol",
            VKind::Closure(_) => "closure",
            VKind::Scope(_) => "scope",
            VKind::Union(_) => "union",
            VKind::Undefined => "undefined",
            VKind::Uninitialized => "uninitialized",
            VKind::BVT(_) => "BVT",
            VKind::Class(_) => "class",
        }
    }
}

/// One symbolic value
#[derive(Debug, Clone)]
pub struct Value {
    /// Arena identity
    pub id: ValueId,
    /// Scope-local identity (binding name, or a synthesized short id)
    pub sid: String,
    /// Fully-qualified identity, unique within the defining scope
    pub qid: String,
    /// Kind + kind-specific payload
    pub kind: VKind,
    /// Scalar payload for `Primitive`
    pub prim: Option<Prim>,
    /// Ordered payload for collections and argument packs
    pub elements: Vec<ValueId>,
    /// Property map (object fields, scope bindings)
    pub fields: FxHashMap<String, ValueId>,
    /// Enclosing scope / owning object back-reference (relation only)
    pub parent: Option<ValueId>,
    /// Originating AST node
    pub ast: Option<Rc<AstNode>>,
    /// Taint markers on this value itself
    pub tags: Vec<String>,
    /// True when this value or anything reachable from it carries a tag
    pub has_tag_rec: bool,
    /// Ordered provenance evidencing how taint reached this value
    pub trace: Vec<TraceStep>,
}

impl Value {
    pub fn new(id: ValueId, kind: VKind) -> Self {
        Self {
            id,
            sid: String::new(),
            qid: String::new(),
            kind,
            prim: None,
            elements: Vec::new(),
            fields: FxHashMap::default(),
            parent: None,
            ast: None,
            tags: Vec::new(),
            has_tag_rec: false,
            trace: Vec::new(),
        }
    }

    pub fn is_scope(&self) -> bool {
        matches!(self.kind, VKind::Scope(_))
    }

    pub fn is_union(&self) -> bool {
        matches!(self.kind, VKind::Union(_))
    }

    pub fn is_closure(&self) -> bool {
        matches!(self.kind, VKind::Closure(_))
    }

    pub fn is_bvt(&self) -> bool {
        matches!(self.kind, VKind::BVT(_))
    }

    pub fn union_members(&self) -> Option<&[ValueId]> {
        match &self.kind {
            VKind::Union(members) => Some(members),
            _ => None,
        }
    }

    pub fn closure(&self) -> Option<&ClosureData> {
        match &self.kind {
            VKind::Closure(data) => Some(data),
            _ => None,
        }
    }

    pub fn class(&self) -> Option<&ClassData> {
        match &self.kind {
            VKind::Class(data) => Some(data),
            _ => None,
        }
    }

    /// Best-effort truthiness; `None` when the value is not concrete enough
    pub fn truthiness(&self) -> Option<bool> {
        match &self.kind {
            VKind::Primitive => self.prim.as_ref().map(Prim::is_truthy),
            VKind::Undefined | VKind::Uninitialized => Some(false),
            VKind::Object | VKind::Closure(_) | VKind::Class(_) => Some(true),
            _ => None,
        }
    }
}
