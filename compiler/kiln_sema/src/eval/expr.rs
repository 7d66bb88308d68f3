//! Tree-walking interpreter for property bodies and env spec expressions.

use std::rc::Rc;

use kiln_ir::{Entity, KindId, LogicVarId, Metadata, Symbol};
use kiln_logic::Equation;

use super::{Analysis, DynVars, PropertyError, PropertyErrorKind};
use crate::expr::{BinaryOp, Expr, MatchArm};
use crate::language::pred_of;
use crate::stack::ensure_sufficient_stack;
use crate::{EnvValue, EquationValue, Value};

/// Evaluation state of one property body.
#[derive(Debug)]
pub(crate) struct Frame {
    pub entity: Entity,
    pub args: Vec<Value>,
    pub dynvars: DynVars,
    pub locals: Vec<Value>,
}

impl Frame {
    pub fn new(entity: Entity, args: Vec<Value>, dynvars: DynVars, frame_size: usize) -> Self {
        Frame {
            entity,
            args,
            dynvars,
            locals: vec![Value::Null; frame_size],
        }
    }

    fn set_local(&mut self, slot: usize, value: Value) {
        if slot >= self.locals.len() {
            self.locals.resize(slot + 1, Value::Null);
        }
        self.locals[slot] = value;
    }
}

impl Analysis {
    pub(crate) fn eval(&mut self, expr: &Expr, frame: &mut Frame) -> Result<Value, PropertyError> {
        ensure_sufficient_stack(|| self.eval_inner(expr, frame))
    }

    #[expect(clippy::too_many_lines, reason = "one arm per expression variant")]
    fn eval_inner(&mut self, expr: &Expr, frame: &mut Frame) -> Result<Value, PropertyError> {
        match expr {
            Expr::Lit(value) => Ok(value.clone()),
            Expr::SelfEntity => Ok(Value::Entity(frame.entity.clone())),
            Expr::Arg(index) => frame
                .args
                .get(*index)
                .cloned()
                .ok_or_else(|| PropertyError::raised(format!("no argument {index}"))),
            Expr::Local(slot) => Ok(frame.locals.get(*slot).cloned().unwrap_or_default()),
            Expr::Let { slot, value, body } => {
                let value = self.eval(value, frame)?;
                frame.set_local(*slot, value);
                self.eval(body, frame)
            }

            Expr::DynVar(var) => frame.dynvars.get(*var).cloned().ok_or_else(|| {
                let name = self
                    .lang
                    .dynvar(*var)
                    .map_or_else(|| var.to_string(), |d| d.name.clone());
                PropertyError::new(PropertyErrorKind::MissingDynVar(name))
            }),
            Expr::BindDynVar { var, value, body } => {
                let value = self.eval(value, frame)?;
                let saved = frame.dynvars.clone();
                frame.dynvars.set(*var, value);
                let result = self.eval(body, frame);
                frame.dynvars = saved;
                result
            }

            Expr::Child { node, index } => {
                let entity = self.eval_entity(node, frame)?;
                let child = self.tree.get(entity.node)?.children.get(*index).copied();
                Ok(child.map_or(Value::Null, |child| Value::Entity(entity.sibling(child))))
            }
            Expr::Children(node) => {
                let entity = self.eval_entity(node, frame)?;
                let children = self.tree.get(entity.node)?.children.clone();
                Ok(Value::array(
                    children.into_iter().map(|c| Value::Entity(entity.sibling(c))),
                ))
            }
            Expr::Parent(node) => {
                let entity = self.eval_entity(node, frame)?;
                let parent = self.tree.get(entity.node)?.parent;
                Ok(parent.map_or(Value::Null, |p| Value::Entity(entity.sibling(p))))
            }
            Expr::Text(node) => {
                let entity = self.eval_entity(node, frame)?;
                Ok(Value::Symbol(self.tree.get(entity.node)?.text))
            }
            Expr::MetadataFlag { entity, field } => {
                let entity = self.eval_entity(entity, frame)?;
                Ok(Value::Bool(entity.info.metadata.field(*field)))
            }

            Expr::Call {
                receiver,
                prop,
                args,
            } => {
                let receiver = self.eval_entity(receiver, frame)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, frame))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call_entity(&receiver, *prop, &args, &frame.dynvars)
            }

            Expr::NodeEnv(node) => {
                let entity = self.eval_entity(node, frame)?;
                let envs = self.node_envs(entity.node)?;
                Ok(Value::Env(EnvValue {
                    env: envs.node_env,
                    rebindings: entity.info.rebindings.clone(),
                    metadata: Metadata::EMPTY,
                }))
            }
            Expr::ChildrenEnv(node) => {
                let entity = self.eval_entity(node, frame)?;
                let envs = self.node_envs(entity.node)?;
                Ok(Value::Env(EnvValue {
                    env: envs.children_env,
                    rebindings: entity.info.rebindings.clone(),
                    metadata: Metadata::EMPTY,
                }))
            }
            Expr::EnvGet {
                env,
                symbol,
                first,
                require,
            } => {
                let env = match self.eval(env, frame)? {
                    Value::Env(env) => env,
                    Value::Null => EnvValue::EMPTY,
                    other => return Err(PropertyError::type_mismatch("env", other.type_name())),
                };
                let symbol = self.eval_symbol(symbol, frame)?;
                if *first {
                    let found = self.lookup_first(&env, symbol, *require)?;
                    Ok(found.map_or(Value::Null, Value::Entity))
                } else {
                    let found = self.lookup(&env, symbol, *require)?;
                    Ok(Value::array(found.into_iter().map(Value::Entity)))
                }
            }

            Expr::Cast {
                value,
                kind,
                or_raise,
            } => match self.eval(value, frame)? {
                Value::Null => Ok(Value::Null),
                Value::Entity(entity) => {
                    if self.entity_is(&entity, *kind)? {
                        Ok(Value::Entity(entity))
                    } else if *or_raise {
                        Err(PropertyError::type_mismatch(self.kind_name(*kind), "entity"))
                    } else {
                        Ok(Value::Null)
                    }
                }
                other => Err(PropertyError::type_mismatch(
                    self.kind_name(*kind),
                    other.type_name(),
                )),
            },
            Expr::Match { value, arms } => {
                let value = self.eval(value, frame)?;
                self.eval_match(value, arms, frame)
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                if self.eval_bool(cond, frame)? {
                    self.eval(then, frame)
                } else {
                    self.eval(otherwise, frame)
                }
            }
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, frame),
            Expr::Not(operand) => Ok(Value::Bool(!self.eval_bool(operand, frame)?)),
            Expr::IsNull(operand) => Ok(Value::Bool(self.eval(operand, frame)?.is_null())),
            Expr::Raise(message) => Err(PropertyError::raised(message.clone())),
            Expr::MakeArray(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item, frame))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::array(values))
            }
            Expr::Map { array, slot, body } => {
                let items = self.eval_array(array, frame)?;
                let mut out = Vec::with_capacity(items.len());
                for item in items.iter() {
                    frame.set_local(*slot, item.clone());
                    out.push(self.eval(body, frame)?);
                }
                Ok(Value::array(out))
            }
            Expr::Len(array) => {
                let items = self.eval_array(array, frame)?;
                let len = i64::try_from(items.len())
                    .map_err(|_| PropertyError::raised("array too long"))?;
                Ok(Value::Int(len))
            }

            Expr::LogicVar { node, index } => {
                let entity = self.eval_entity(node, frame)?;
                let var = self.tree.get(entity.node)?.logic_vars.get(*index).copied();
                var.map(Value::LogicVar)
                    .ok_or_else(|| PropertyError::raised(format!("no logic variable {index}")))
            }
            Expr::Domain {
                var,
                values,
                origin,
            } => {
                let var = self.eval_logic_var(var, frame)?;
                let values = self.eval_array(values, frame)?;
                let mut candidates = Vec::with_capacity(values.len());
                for value in values.iter() {
                    match value {
                        Value::Entity(entity) => candidates.push(entity.clone()),
                        Value::Null => {}
                        other => {
                            return Err(PropertyError::type_mismatch("entity", other.type_name()))
                        }
                    }
                }
                Ok(Value::equation(Equation::Domain {
                    var,
                    values: candidates.into(),
                    origin: Some(*origin),
                }))
            }
            Expr::Bind { a, b, eq, origin } => {
                let a = self.eval_logic_var(a, frame)?;
                let b = self.eval_logic_var(b, frame)?;
                Ok(Value::equation(Equation::Bind {
                    a,
                    b,
                    eq: eq.map(pred_of),
                    origin: Some(*origin),
                }))
            }
            Expr::Predicate { var, prop, origin } => {
                let var = self.eval_logic_var(var, frame)?;
                Ok(Value::equation(Equation::Predicate {
                    var,
                    pred: pred_of(*prop),
                    origin: Some(*origin),
                }))
            }
            Expr::All(items) => {
                let operands = self.eval_equations(items, frame)?;
                Ok(Value::equation(Equation::all(operands)))
            }
            Expr::Any(items) => {
                let operands = self.eval_equations(items, frame)?;
                Ok(Value::equation(Equation::any(operands)))
            }
            Expr::Solve(equation) => {
                let equation = match self.eval(equation, frame)? {
                    Value::Equation(EquationValue(equation)) => equation,
                    other => {
                        return Err(PropertyError::type_mismatch("equation", other.type_name()))
                    }
                };
                let dynvars = frame.dynvars.clone();
                Ok(Value::Bool(self.solve(&equation, &dynvars)?))
            }
            Expr::LogicValue(var) => {
                let var = self.eval_logic_var(var, frame)?;
                Ok(Value::Entity(self.logic_value(var)?))
            }
        }
    }

    /// First arm whose kind matches the runtime kind of `value`.
    ///
    /// Null only matches catch-all arms. A bare arm sees the node without
    /// its metadata and rebindings.
    fn eval_match(
        &mut self,
        value: Value,
        arms: &[MatchArm],
        frame: &mut Frame,
    ) -> Result<Value, PropertyError> {
        for arm in arms {
            let matched = match (&value, arm.kind) {
                (_, None) => true,
                (Value::Entity(entity), Some(kind)) => self.entity_is(entity, kind)?,
                _ => false,
            };
            if !matched {
                continue;
            }
            let bound = match (&value, arm.bare) {
                (Value::Entity(entity), true) => Value::Entity(entity.to_bare()),
                _ => value.clone(),
            };
            frame.set_local(arm.slot, bound);
            return self.eval(&arm.body, frame);
        }
        let kind = match &value {
            Value::Entity(entity) => self.kind_name(self.tree.get(entity.node)?.kind),
            other => other.type_name().to_owned(),
        };
        Err(PropertyError::new(PropertyErrorKind::Dispatch {
            kind,
            prop: "match".to_owned(),
        }))
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        frame: &mut Frame,
    ) -> Result<Value, PropertyError> {
        match op {
            BinaryOp::And => {
                Ok(Value::Bool(self.eval_bool(lhs, frame)? && self.eval_bool(rhs, frame)?))
            }
            BinaryOp::Or => {
                Ok(Value::Bool(self.eval_bool(lhs, frame)? || self.eval_bool(rhs, frame)?))
            }
            BinaryOp::Eq => Ok(Value::Bool(self.eval(lhs, frame)? == self.eval(rhs, frame)?)),
            BinaryOp::Ne => Ok(Value::Bool(self.eval(lhs, frame)? != self.eval(rhs, frame)?)),
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Lt | BinaryOp::Le => {
                let a = self.eval_int(lhs, frame)?;
                let b = self.eval_int(rhs, frame)?;
                let checked = match op {
                    BinaryOp::Add => a.checked_add(b).map(Value::Int),
                    BinaryOp::Sub => a.checked_sub(b).map(Value::Int),
                    BinaryOp::Mul => a.checked_mul(b).map(Value::Int),
                    BinaryOp::Lt => Some(Value::Bool(a < b)),
                    _ => Some(Value::Bool(a <= b)),
                };
                checked.ok_or_else(|| PropertyError::raised("integer overflow"))
            }
        }
    }

    /// Equations from `items`, flattening arrays of equations.
    fn eval_equations(
        &mut self,
        items: &[Expr],
        frame: &mut Frame,
    ) -> Result<Vec<Equation<Entity>>, PropertyError> {
        fn push(out: &mut Vec<Equation<Entity>>, value: &Value) -> Result<(), PropertyError> {
            match value {
                Value::Equation(EquationValue(eq)) => out.push(Equation::clone(eq)),
                Value::Bool(true) => out.push(Equation::True),
                Value::Bool(false) => out.push(Equation::False),
                Value::Array(values) => {
                    for value in values.iter() {
                        push(out, value)?;
                    }
                }
                other => return Err(PropertyError::type_mismatch("equation", other.type_name())),
            }
            Ok(())
        }

        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let value = self.eval(item, frame)?;
            push(&mut out, &value)?;
        }
        Ok(out)
    }

    fn entity_is(&self, entity: &Entity, kind: KindId) -> Result<bool, PropertyError> {
        let actual = self.tree.get(entity.node)?.kind;
        Ok(self.lang.is_subkind(actual, kind))
    }

    pub(crate) fn eval_entity(
        &mut self,
        expr: &Expr,
        frame: &mut Frame,
    ) -> Result<Entity, PropertyError> {
        match self.eval(expr, frame)? {
            Value::Entity(entity) => Ok(entity),
            Value::Null => Err(PropertyError::new(PropertyErrorKind::NullReceiver)),
            other => Err(PropertyError::type_mismatch("entity", other.type_name())),
        }
    }

    fn eval_bool(&mut self, expr: &Expr, frame: &mut Frame) -> Result<bool, PropertyError> {
        match self.eval(expr, frame)? {
            Value::Bool(b) => Ok(b),
            other => Err(PropertyError::type_mismatch("bool", other.type_name())),
        }
    }

    fn eval_int(&mut self, expr: &Expr, frame: &mut Frame) -> Result<i64, PropertyError> {
        match self.eval(expr, frame)? {
            Value::Int(n) => Ok(n),
            other => Err(PropertyError::type_mismatch("int", other.type_name())),
        }
    }

    fn eval_symbol(&mut self, expr: &Expr, frame: &mut Frame) -> Result<Symbol, PropertyError> {
        match self.eval(expr, frame)? {
            Value::Symbol(symbol) => Ok(symbol),
            other => Err(PropertyError::type_mismatch("symbol", other.type_name())),
        }
    }

    fn eval_array(&mut self, expr: &Expr, frame: &mut Frame) -> Result<Rc<[Value]>, PropertyError> {
        match self.eval(expr, frame)? {
            Value::Array(values) => Ok(values),
            Value::Null => Ok(Rc::from(Vec::new())),
            other => Err(PropertyError::type_mismatch("array", other.type_name())),
        }
    }

    fn eval_logic_var(
        &mut self,
        expr: &Expr,
        frame: &mut Frame,
    ) -> Result<LogicVarId, PropertyError> {
        match self.eval(expr, frame)? {
            Value::LogicVar(var) => Ok(var),
            other => Err(PropertyError::type_mismatch("logic var", other.type_name())),
        }
    }
}
