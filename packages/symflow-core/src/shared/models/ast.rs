//! Unified AST - the front-end input contract
//!
//! Per-source-language front-ends lower their concrete syntax into this
//! shape and hand it over as JSON (or construct it directly). Every node
//! carries a `type` tag used for interpreter dispatch, an optional `loc`,
//! and type-specific children.
//!
//! Design notes:
//! - Nodes are shared via `Rc`: the same node ends up referenced from the
//!   Values it produced (provenance) and from closure bodies.
//! - Unknown `type` tags deserialize to [`AstKind::Unknown`]; the interpreter
//!   degrades them to opaque symbolic values instead of failing. Front-ends
//!   are allowed to be incomplete.

use serde::{Deserialize, Serialize};
use std::rc::Rc;

use super::span::Loc;

/// Ordered child list
pub type NodeList = Vec<Rc<AstNode>>;

/// One node of the unified AST
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AstNode {
    /// Node kind + type-specific children (tagged by `type` on the wire)
    #[serde(flatten)]
    pub kind: AstKind,

    /// Source location (optional; synthesized nodes omit it)
    #[serde(default)]
    pub loc: Option<Loc>,
}

/// Literal scalar payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LitValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Null,
}

/// Node kinds, discriminated by the wire-level `type` tag
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AstKind {
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Structure
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    /// One source file lowered by a front-end
    CompileUnit {
        #[serde(default)]
        body: NodeList,
    },
    /// Lexical block
    Block {
        #[serde(default)]
        body: NodeList,
    },
    /// Statement wrapper around a bare expression
    ExprStatement { expression: Rc<AstNode> },

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // References and literals
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    Identifier {
        name: String,
    },
    Literal {
        value: LitValue,
    },
    /// Ordered collection literal
    ListExpr {
        #[serde(default)]
        elements: NodeList,
    },
    /// Keyed collection literal (entries are `Property` nodes)
    MapExpr {
        #[serde(default)]
        entries: NodeList,
    },
    Property {
        key: Rc<AstNode>,
        value: Rc<AstNode>,
    },
    /// `object.property` / `object[property]`
    MemberAccess {
        object: Rc<AstNode>,
        property: Rc<AstNode>,
        #[serde(default)]
        computed: bool,
    },
    This,
    Super,
    /// `(a, b, c)` tuple expression
    Tuple {
        #[serde(default)]
        elements: NodeList,
    },
    /// Comma sequence; evaluates to the last expression
    Sequence {
        #[serde(default)]
        expressions: NodeList,
    },

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Bindings and definitions
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    Assignment {
        left: Rc<AstNode>,
        right: Rc<AstNode>,
        #[serde(default)]
        operator: Option<String>,
    },
    VarDecl {
        id: Rc<AstNode>,
        #[serde(default)]
        init: Option<Rc<AstNode>>,
    },
    FunctionDef {
        #[serde(default)]
        id: Option<Rc<AstNode>>,
        #[serde(default)]
        params: NodeList,
        body: Rc<AstNode>,
        #[serde(default)]
        decorators: NodeList,
    },
    Parameter {
        name: String,
        /// Variadic rest parameter collecting trailing arguments
        #[serde(default)]
        rest: bool,
        #[serde(default)]
        default_value: Option<Rc<AstNode>>,
        /// Structural type descriptor used for overload resolution
        #[serde(default)]
        type_hint: Option<String>,
    },
    ClassDef {
        #[serde(default)]
        id: Option<Rc<AstNode>>,
        /// Declared supertypes (multiple supported)
        #[serde(default)]
        supers: NodeList,
        #[serde(default)]
        body: NodeList,
        #[serde(default)]
        decorators: NodeList,
    },

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Control flow
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    If {
        condition: Rc<AstNode>,
        consequent: Rc<AstNode>,
        #[serde(default)]
        alternate: Option<Rc<AstNode>>,
    },
    /// Ternary expression
    Conditional {
        condition: Rc<AstNode>,
        consequent: Rc<AstNode>,
        alternate: Rc<AstNode>,
    },
    Switch {
        discriminant: Rc<AstNode>,
        #[serde(default)]
        cases: NodeList,
    },
    Case {
        #[serde(default)]
        test: Option<Rc<AstNode>>,
        #[serde(default)]
        body: NodeList,
    },
    While {
        condition: Rc<AstNode>,
        body: Rc<AstNode>,
    },
    For {
        #[serde(default)]
        init: Option<Rc<AstNode>>,
        #[serde(default)]
        condition: Option<Rc<AstNode>>,
        #[serde(default)]
        update: Option<Rc<AstNode>>,
        body: Rc<AstNode>,
    },
    /// Range / for-each iteration over a collection
    ForEach {
        #[serde(default)]
        key: Option<Rc<AstNode>>,
        value: Rc<AstNode>,
        iterable: Rc<AstNode>,
        body: Rc<AstNode>,
    },
    Return {
        #[serde(default)]
        argument: Option<Rc<AstNode>>,
    },
    Throw {
        #[serde(default)]
        argument: Option<Rc<AstNode>>,
    },
    Break,
    Continue,
    Try {
        block: Rc<AstNode>,
        #[serde(default)]
        handler: Option<Rc<AstNode>>,
        #[serde(default)]
        finalizer: Option<Rc<AstNode>>,
    },
    CatchClause {
        #[serde(default)]
        param: Option<Rc<AstNode>>,
        body: Rc<AstNode>,
    },

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Operations
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    Call {
        callee: Rc<AstNode>,
        #[serde(default)]
        arguments: NodeList,
    },
    New {
        callee: Rc<AstNode>,
        #[serde(default)]
        arguments: NodeList,
    },
    Binary {
        operator: String,
        left: Rc<AstNode>,
        right: Rc<AstNode>,
    },
    Unary {
        operator: String,
        argument: Rc<AstNode>,
    },

    /// Any type tag this engine does not know; degrades to a symbol
    #[serde(other)]
    Unknown,
}

impl AstNode {
    /// The wire-level type tag, for logging and degradation messages
    pub fn tag(&self) -> &'static str {
        match &self.kind {
            AstKind::CompileUnit { .. } => "CompileUnit",
            AstKind::Block { .. } => "Block",
            AstKind::ExprStatement { .. } => "ExprStatement",
            AstKind::Identifier { .. } => "Identifier",
            AstKind::Literal { .. } => "Literal",
            AstKind::ListExpr { .. } => "ListExpr",
            AstKind::MapExpr { .. } => "MapExpr",
            AstKind::Property { .. } => "Property",
            AstKind::MemberAccess { .. } => "MemberAccess",
            AstKind::This => "This",
            AstKind::Super => "Super",
            AstKind::Tuple { .. } => "Tuple",
            AstKind::Sequence { .. } => "Sequence",
            AstKind::Assignment { .. } => "Assignment",
            AstKind::VarDecl { .. } => "VarDecl",
            AstKind::FunctionDef { .. } => "FunctionDef",
            AstKind::Parameter { .. } => "Parameter",
            AstKind::ClassDef { .. } => "ClassDef",
            AstKind::If { .. } => "If",
            AstKind::Conditional { .. } => "Conditional",
            AstKind::Switch { .. } => "Switch",
            AstKind::Case { .. } => "Case",
            AstKind::While { .. } => "While",
            AstKind::For { .. } => "For",
            AstKind::ForEach { .. } => "ForEach",
            AstKind::Return { .. } => "Return",
            AstKind::Throw { .. } => "Throw",
            AstKind::Break => "Break",
            AstKind::Continue => "Continue",
            AstKind::Try { .. } => "Try",
            AstKind::CatchClause { .. } => "CatchClause",
            AstKind::Call { .. } => "Call",
            AstKind::New { .. } => "New",
            AstKind::Binary { .. } => "Binary",
            AstKind::Unary { .. } => "Unary",
            AstKind::Unknown => "Unknown",
        }
    }

    /// Identifier name when this node is an `Identifier`
    pub fn ident_name(&self) -> Option<&str> {
        match &self.kind {
            AstKind::Identifier { name } => Some(name),
            _ => None,
        }
    }

    /// Best-effort textual form of a reference expression, for qids and logs
    pub fn ref_text(&self) -> String {
        match &self.kind {
            AstKind::Identifier { name } => name.clone(),
            AstKind::Literal { value } => match value {
                LitValue::Str(s) => s.clone(),
                LitValue::Int(i) => i.to_string(),
                LitValue::Float(f) => f.to_string(),
                LitValue::Bool(b) => b.to_string(),
                LitValue::Null => "null".to_string(),
            },
            AstKind::MemberAccess {
                object, property, ..
            } => format!("{}.{}", object.ref_text(), property.ref_text()),
            AstKind::This => "this".to_string(),
            AstKind::Super => "super".to_string(),
            AstKind::Call { callee, .. } => format!("{}()", callee.ref_text()),
            _ => format!("<{}>", self.tag()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Node Builder - used by tests and by front-ends constructing ASTs in-process
// ═══════════════════════════════════════════════════════════════════════════

impl AstNode {
    pub fn new(kind: AstKind) -> Rc<Self> {
        Rc::new(Self { kind, loc: None })
    }

    pub fn with_loc(kind: AstKind, loc: Loc) -> Rc<Self> {
        Rc::new(Self {
            kind,
            loc: Some(loc),
        })
    }

    pub fn ident(name: impl Into<String>) -> Rc<Self> {
        Self::new(AstKind::Identifier { name: name.into() })
    }

    pub fn lit_int(v: i64) -> Rc<Self> {
        Self::new(AstKind::Literal {
            value: LitValue::Int(v),
        })
    }

    pub fn lit_str(v: impl Into<String>) -> Rc<Self> {
        Self::new(AstKind::Literal {
            value: LitValue::Str(v.into()),
        })
    }

    pub fn lit_bool(v: bool) -> Rc<Self> {
        Self::new(AstKind::Literal {
            value: LitValue::Bool(v),
        })
    }

    pub fn member(object: Rc<AstNode>, property: Rc<AstNode>) -> Rc<Self> {
        Self::new(AstKind::MemberAccess {
            object,
            property,
            computed: false,
        })
    }

    pub fn member_computed(object: Rc<AstNode>, property: Rc<AstNode>) -> Rc<Self> {
        Self::new(AstKind::MemberAccess {
            object,
            property,
            computed: true,
        })
    }

    pub fn assign(left: Rc<AstNode>, right: Rc<AstNode>) -> Rc<Self> {
        Self::new(AstKind::Assignment {
            left,
            right,
            operator: None,
        })
    }

    pub fn call(callee: Rc<AstNode>, arguments: NodeList) -> Rc<Self> {
        Self::new(AstKind::Call { callee, arguments })
    }

    pub fn block(body: NodeList) -> Rc<Self> {
        Self::new(AstKind::Block { body })
    }

    pub fn param(name: impl Into<String>) -> Rc<Self> {
        Self::new(AstKind::Parameter {
            name: name.into(),
            rest: false,
            default_value: None,
            type_hint: None,
        })
    }

    pub fn func(name: &str, params: NodeList, body: Rc<AstNode>) -> Rc<Self> {
        Self::new(AstKind::FunctionDef {
            id: Some(Self::ident(name)),
            params,
            body,
            decorators: Vec::new(),
        })
    }

    pub fn ret(argument: Option<Rc<AstNode>>) -> Rc<Self> {
        Self::new(AstKind::Return { argument })
    }

    pub fn if_stmt(
        condition: Rc<AstNode>,
        consequent: Rc<AstNode>,
        alternate: Option<Rc<AstNode>>,
    ) -> Rc<Self> {
        Self::new(AstKind::If {
            condition,
            consequent,
            alternate,
        })
    }

    pub fn compile_unit(body: NodeList) -> Rc<Self> {
        Self::new(AstKind::CompileUnit { body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_tagged_node() {
        let json = r#"{
            "type": "MemberAccess",
            "object": {"type": "Identifier", "name": "req"},
            "property": {"type": "Identifier", "name": "params"},
            "loc": {"start": {"line": 4, "column": 2}}
        }"#;
        let node: AstNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.tag(), "MemberAccess");
        assert_eq!(node.ref_text(), "req.params");
        assert_eq!(node.loc.unwrap().start.line, 4);
    }

    #[test]
    fn test_unknown_tag_degrades() {
        let json = r#"{"type": "JsxSpreadChild"}"#;
        let node: AstNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.tag(), "Unknown");
    }

    #[test]
    fn test_literal_payloads() {
        let json = r#"{"type": "Literal", "value": "hello"}"#;
        let node: AstNode = serde_json::from_str(json).unwrap();
        match &node.kind {
            AstKind::Literal { value } => assert_eq!(*value, LitValue::Str("hello".into())),
            _ => panic!("expected literal"),
        }

        let json = r#"{"type": "Literal", "value": 42}"#;
        let node: AstNode = serde_json::from_str(json).unwrap();
        match &node.kind {
            AstKind::Literal { value } => assert_eq!(*value, LitValue::Int(42)),
            _ => panic!("expected literal"),
        }
    }
}
