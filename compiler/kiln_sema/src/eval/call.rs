//! Property calls: dispatch, argument checking, dynamic variable scoping and
//! memoization around the body.

use std::rc::Rc;

use kiln_ir::{Entity, NodeId, PropertyId};

use super::expr::Frame;
use super::memo::{MemoEntry, MemoKey};
use super::{Analysis, DynVars, PropertyError, PropertyErrorKind};
use crate::language::{Body, Dispatch, PropertyInfo};
use crate::stack::ensure_sufficient_stack;
use crate::{Value, ValueType};

/// Calling convention seen by external property bodies.
#[derive(Debug)]
pub struct ExternalCall<'a> {
    pub entity: &'a Entity,
    pub prop: PropertyId,
    pub args: &'a [Value],
    /// Only the dynamic variables the property declares.
    pub dynvars: &'a DynVars,
}

impl ExternalCall<'_> {
    pub fn node(&self) -> NodeId {
        self.entity.node
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }
}

impl Analysis {
    /// Call `prop` on a node, seen without context.
    pub fn call(
        &mut self,
        node: NodeId,
        prop: PropertyId,
        args: &[Value],
        dynvars: &DynVars,
    ) -> Result<Value, PropertyError> {
        self.call_entity(&Entity::bare(node), prop, args, dynvars)
    }

    /// Call `prop` on `entity`, dispatching on the runtime kind of its node.
    ///
    /// `dynvars` may bind more variables than the property declares; only
    /// the declared ones are visible to the body and take part in the memo
    /// key.
    #[tracing::instrument(level = "trace", skip_all, fields(node = %entity.node, prop = %prop))]
    pub fn call_entity(
        &mut self,
        entity: &Entity,
        prop: PropertyId,
        args: &[Value],
        dynvars: &DynVars,
    ) -> Result<Value, PropertyError> {
        self.call_unchecked(entity, prop, args, dynvars)
            .map_err(|err| err.at(entity.node, prop))
    }

    fn call_unchecked(
        &mut self,
        entity: &Entity,
        prop: PropertyId,
        args: &[Value],
        dynvars: &DynVars,
    ) -> Result<Value, PropertyError> {
        let lang = Rc::clone(&self.lang);
        let kind = self.tree.get(entity.node)?.kind;
        let Some(info) = lang.property(prop) else {
            return Err(self.dispatch_error(kind, prop));
        };

        self.check_args(info, args)?;
        let scoped = dynvars.restrict(&info.dynamic_vars).map_err(|var| {
            let name = lang.dynvar(var).map_or_else(|| var.to_string(), |d| d.name.clone());
            PropertyError::new(PropertyErrorKind::MissingDynVar(name))
        })?;

        let index = match lang.dispatch(kind, prop) {
            Some(Dispatch::Impl(index)) => index,
            Some(Dispatch::Missing) | None => return Err(self.dispatch_error(kind, prop)),
        };

        let key = (self.config.memoize && info.memoized).then(|| MemoKey {
            prop,
            entity: entity.clone(),
            args: args.to_vec(),
            dynvars: scoped.clone(),
        });
        if let Some(key) = &key {
            match self.memo.get(key).cloned() {
                Some(MemoEntry::Done(value)) => {
                    tracing::debug!(prop = %prop, "memo hit");
                    return Ok(value);
                }
                Some(MemoEntry::InProgress) => {
                    return Err(PropertyError::new(PropertyErrorKind::InfiniteRecursion(
                        info.name.clone(),
                    )));
                }
                None => self.memo.start(key.clone()),
            }
        }

        let result = self.enter(|this| this.run_body(entity, prop, index, args, &scoped));
        let result = result.and_then(|value| {
            if self.conforms(&value, &info.returns) {
                Ok(value)
            } else {
                Err(PropertyError::type_mismatch(info.returns.to_string(), value.type_name()))
            }
        });

        if let Some(key) = key {
            match &result {
                Ok(value) => self.memo.finish(key, value.clone()),
                Err(_) => self.memo.abandon(&key),
            }
        }
        result
    }

    /// Run `f` one call level deeper.
    fn enter(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<Value, PropertyError>,
    ) -> Result<Value, PropertyError> {
        let limit = self.config.max_call_depth;
        if limit != 0 && self.depth >= limit {
            return Err(PropertyError::new(PropertyErrorKind::DepthExceeded(limit)));
        }
        self.depth += 1;
        let result = ensure_sufficient_stack(|| f(self));
        self.depth -= 1;
        result
    }

    fn run_body(
        &mut self,
        entity: &Entity,
        prop: PropertyId,
        index: usize,
        args: &[Value],
        dynvars: &DynVars,
    ) -> Result<Value, PropertyError> {
        let lang = Rc::clone(&self.lang);
        let Some(imp) = lang.implementation(index) else {
            let kind = self.tree.get(entity.node)?.kind;
            return Err(self.dispatch_error(kind, prop));
        };
        match &imp.body {
            Body::Expr(expr) => {
                let mut frame =
                    Frame::new(entity.clone(), args.to_vec(), dynvars.clone(), imp.frame_size);
                self.eval(expr, &mut frame)
            }
            Body::External(f) => {
                let call = ExternalCall {
                    entity,
                    prop,
                    args,
                    dynvars,
                };
                f(self, &call)
            }
            Body::Abstract { .. } | Body::Pending => {
                let kind = self.tree.get(entity.node)?.kind;
                Err(self.dispatch_error(kind, prop))
            }
        }
    }

    fn check_args(&self, info: &PropertyInfo, args: &[Value]) -> Result<(), PropertyError> {
        if args.len() != info.params.len() {
            return Err(PropertyError::raised(format!(
                "{} expects {} arguments, got {}",
                info.name,
                info.params.len(),
                args.len()
            )));
        }
        for (arg, (_, ty)) in args.iter().zip(&info.params) {
            if !self.conforms(arg, ty) {
                return Err(PropertyError::type_mismatch(ty.to_string(), arg.type_name()));
            }
        }
        Ok(())
    }

    /// Whether `value` is an instance of `ty`. Null is an entity of any kind.
    pub(crate) fn conforms(&self, value: &Value, ty: &ValueType) -> bool {
        match (ty, value) {
            (ValueType::Any, _)
            | (ValueType::Unit, Value::Unit)
            | (ValueType::Bool, Value::Bool(_))
            | (ValueType::Int, Value::Int(_))
            | (ValueType::Symbol, Value::Symbol(_))
            | (ValueType::Env, Value::Env(_))
            | (ValueType::LogicVar, Value::LogicVar(_))
            | (ValueType::Equation, Value::Equation(_))
            | (ValueType::Entity(_), Value::Null) => true,
            (ValueType::Entity(kind), Value::Entity(entity)) => self
                .tree
                .get(entity.node)
                .is_ok_and(|node| self.lang.is_subkind(node.kind, *kind)),
            (ValueType::Array(element), Value::Array(values)) => {
                values.iter().all(|v| self.conforms(v, element))
            }
            _ => false,
        }
    }

    pub(crate) fn dispatch_error(&self, kind: kiln_ir::KindId, prop: PropertyId) -> PropertyError {
        PropertyError::new(PropertyErrorKind::Dispatch {
            kind: self.kind_name(kind),
            prop: self.property_name(prop),
        })
    }
}
