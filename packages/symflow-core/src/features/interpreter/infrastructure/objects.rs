//! Class definition and object construction
//!
//! Construction clones the class prototype's field values (bounded-depth),
//! merges inherited fields from every declared supertype, wires a synthetic
//! `super` binding, and runs the matching constructor overload against the
//! fresh object.

use std::rc::Rc;
use tracing::debug;

use crate::errors::Result;
use crate::features::branch_state::ExecState;
use crate::features::hooks::NewInfo;
use crate::features::scoping::{self};
use crate::features::value_store::{propagate_taint, ClassData, ClosureData, ScopeKind, VKind, ValueId};
use crate::shared::models::{AstKind, AstNode};

use super::dispatch::Interpreter;

impl Interpreter {
    pub(crate) fn eval_class_def(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        self.define_class(scope, node, state)
    }

    /// Process a class declaration: methods become closures capturing the
    /// class member scope, field declarations evaluate once, constructor
    /// overloads collect in declaration order.
    pub(crate) fn define_class(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let AstKind::ClassDef {
            id,
            supers,
            body,
            decorators,
        } = &node.kind
        else {
            return Ok(self.arena.undefined());
        };
        let name = id
            .as_ref()
            .and_then(|n| n.ident_name())
            .unwrap_or("<anonymous class>")
            .to_string();
        let supers = supers.clone();
        let body = body.clone();
        let decorators = decorators.clone();

        // Declared in the declare phase already? Reuse the binding.
        if let Some(existing) = self.arena.binding(scope, &name) {
            let declared = self
                .arena
                .val(existing)
                .ast
                .as_ref()
                .map(|a| Rc::ptr_eq(a, node))
                .unwrap_or(false);
            if declared {
                return Ok(existing);
            }
        }

        let member_scope = self.arena.scope(ScopeKind::Class, Some(scope));
        let class_v = self.arena.class(
            ClassData {
                name: name.clone(),
                constructors: Vec::new(),
                supers,
                decorators,
                member_scope,
            },
            Some(Rc::clone(node)),
        );

        let mut constructors = Vec::new();
        for member in &body {
            match &member.kind {
                AstKind::FunctionDef {
                    id: Some(mid),
                    params,
                    body: mbody,
                    decorators: mdecs,
                } => {
                    let Some(mname) = mid.ident_name().map(str::to_string) else {
                        continue;
                    };
                    let closure = self.arena.closure(
                        ClosureData {
                            name: format!("{name}.{mname}"),
                            params: params.clone(),
                            body: Some(Rc::clone(mbody)),
                            decorators: mdecs.clone(),
                            captured_scope: member_scope,
                            native: None,
                        },
                        Some(Rc::clone(member)),
                    );
                    if mname == "constructor" || mname == name {
                        constructors.push(closure);
                    } else {
                        self.arena.bind(class_v, &mname, closure);
                        self.arena.bind(member_scope, &mname, closure);
                    }
                }
                AstKind::VarDecl { id, init } => {
                    let id = Rc::clone(id);
                    let value = match init {
                        Some(expr) => {
                            let expr = Rc::clone(expr);
                            self.process_instruction(member_scope, &expr, state)
                        }
                        None => self.arena.uninitialized(Some(Rc::clone(member))),
                    };
                    if let Some(fname) = id.ident_name() {
                        self.arena.bind(class_v, fname, value);
                    }
                }
                _ => {
                    debug!(node = member.tag(), "unhandled class member; skipping");
                }
            }
        }

        if let VKind::Class(data) = &mut self.arena.val_mut(class_v).kind {
            data.constructors = constructors;
        }

        self.arena.bind(scope, &name, class_v);

        let hooks = Rc::clone(&self.hooks);
        hooks.check_at_class_def(self, scope, node, state, class_v);
        Ok(class_v)
    }

    pub(crate) fn eval_new(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let AstKind::New { callee, arguments } = &node.kind else {
            return Ok(self.arena.undefined());
        };
        let callee = Rc::clone(callee);
        let arguments = arguments.clone();

        let args: Vec<ValueId> = arguments
            .iter()
            .map(|a| self.process_instruction(scope, a, state))
            .collect();
        let class_v = scoping::member_value(self, scope, &callee, state);

        let info = NewInfo {
            class: class_v,
            argvalues: args.clone(),
        };
        let hooks = Rc::clone(&self.hooks);
        hooks.check_at_new_expr_before(self, scope, node, state, &info);

        let obj = self.construct_object(class_v, &args, node, scope, state)?;

        hooks.check_at_new_expr_after(self, scope, node, state, obj);
        Ok(obj)
    }

    /// Instantiate: prototype clone → supertype merge → `super` wiring →
    /// object hook → matching constructor overload.
    pub(crate) fn construct_object(
        &mut self,
        class_v: ValueId,
        args: &[ValueId],
        call_node: &Rc<AstNode>,
        scope: ValueId,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let kind = self.arena.val(class_v).kind.clone();
        let data = match kind {
            VKind::Class(data) => *data,
            // Factory-style construction through a plain closure
            VKind::Closure(_) => {
                return self.execute_call(class_v, None, args, call_node, scope, state);
            }
            _ => {
                // Unknown class: opaque instance; constructor arguments may
                // carry taint into it.
                let obj = self.arena.object(Some(Rc::clone(call_node)));
                let qid = call_node.ref_text();
                self.arena.val_mut(obj).qid = qid;
                for &arg in args {
                    let step = self.step_at(call_node, "constructed from tainted argument");
                    propagate_taint(&mut self.arena, arg, obj, step);
                }
                let hooks = Rc::clone(&self.hooks);
                hooks.check_at_new_expr_object(self, scope, call_node, state, obj);
                return Ok(obj);
            }
        };

        let obj = self.arena.object(Some(Rc::clone(call_node)));
        {
            let sid = self.arena.val(obj).sid.clone();
            self.arena.val_mut(obj).qid = format!("{}.{sid}", data.name);
        }

        // Prototype clone, bounded depth; closures and nested classes are
        // shared by the clone so methods keep their captured scope.
        let proto_fields: Vec<(String, ValueId)> = self
            .arena
            .val(class_v)
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        let depth = self.config.clone_depth_limit;
        for (fname, fid) in proto_fields {
            let copy = self.arena.clone_value(fid, depth);
            self.arena.bind(obj, &fname, copy);
        }

        // Multi-supertype inheritance: merge fields/declarations not
        // already present, first declaration wins.
        let mut super_classes: Vec<ValueId> = Vec::new();
        for sup in &data.supers {
            let sv = scoping::member_value(self, scope, sup, state);
            if self.arena.val(sv).class().is_none() {
                continue;
            }
            let inherited: Vec<(String, ValueId)> = self
                .arena
                .val(sv)
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect();
            for (fname, fid) in inherited {
                if self.arena.binding(obj, &fname).is_none() {
                    let copy = self.arena.clone_value(fid, depth);
                    self.arena.bind(obj, &fname, copy);
                }
            }
            super_classes.push(sv);
        }

        // Synthetic `super`: methods resolve it through the class member
        // scope, the constructor additionally gets it as a local binding.
        let super_binding = match super_classes.len() {
            0 => None,
            1 => Some(super_classes[0]),
            _ => {
                let config = self.config.clone();
                Some(self.arena.union_of(super_classes.clone(), &config))
            }
        };
        if let Some(sv) = super_binding {
            self.arena.bind(data.member_scope, "super", sv);
        }

        let hooks = Rc::clone(&self.hooks);
        hooks.check_at_new_expr_object(self, scope, call_node, state, obj);

        // Constructor overloads; inherited when the class declares none
        let mut ctors = data.constructors.clone();
        if ctors.is_empty() {
            for &sv in &super_classes {
                if let Some(sd) = self.arena.val(sv).class() {
                    if !sd.constructors.is_empty() {
                        ctors = sd.constructors.clone();
                        break;
                    }
                }
            }
        }
        if !ctors.is_empty() {
            let ctor = self.select_overload(&ctors, args);
            if let Some(cd) = self.arena.val(ctor).closure().cloned() {
                let extra: Vec<(&str, ValueId)> = super_binding
                    .map(|sv| vec![("super", sv)])
                    .unwrap_or_default();
                self.invoke_closure(ctor, &cd, Some(obj), args, &extra, call_node, state)?;
            }
        }

        Ok(obj)
    }
}
