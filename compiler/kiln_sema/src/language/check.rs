//! Whole-definition checks run by `LanguageBuilder::build`.
//!
//! Every property body and env spec is walked once with its scope: the
//! parameters of the property, the local slots bound so far, and the
//! dynamic variables in scope (declared ones first, then those bound by
//! enclosing `BindDynVar` expressions). All findings are non-blocking so a
//! single build reports every mistake.

use kiln_diagnostic::{DefinitionDiagnostics, DefinitionError, ErrorCode, Severity};
use kiln_ir::{DynVarId, KindId, PropertyId, SourceLocation};
use rustc_hash::{FxHashMap, FxHashSet};

use super::{Body, Language};
use crate::env::EnvAction;
use crate::stack::ensure_sufficient_stack;
use crate::{Expr, Value, ValueType};

/// Why `eq` cannot compare the values of a `Bind`, if it cannot.
pub(crate) fn eq_prop_problem(
    lang: &Language,
    eq: PropertyId,
    available: &[DynVarId],
) -> Option<String> {
    let Some(prop) = lang.property(eq) else {
        return Some(format!("unknown property {eq}"));
    };
    let takes_owner = matches!(
        prop.params.as_slice(),
        [(_, ValueType::Entity(kind))] if *kind == prop.owner
    );
    if !takes_owner || prop.returns != ValueType::Bool {
        return Some(format!(
            "{} cannot be used as an equality predicate: it must take exactly one \
             argument of its own kind and return a boolean",
            prop.name
        ));
    }
    missing_dynvar(lang, &prop.dynamic_vars, available).map(|name| {
        format!(
            "equality predicate {} requires dynamic variable {name}, which is not bound here",
            prop.name
        )
    })
}

/// Why `prop` cannot filter a logic variable, if it cannot.
pub(crate) fn predicate_problem(
    lang: &Language,
    prop: PropertyId,
    available: &[DynVarId],
) -> Option<String> {
    let Some(info) = lang.property(prop) else {
        return Some(format!("unknown property {prop}"));
    };
    if !info.params.is_empty() || info.returns != ValueType::Bool {
        return Some(format!(
            "{} cannot be used as a predicate: it must take no argument and return a boolean",
            info.name
        ));
    }
    missing_dynvar(lang, &info.dynamic_vars, available).map(|name| {
        format!(
            "predicate {} requires dynamic variable {name}, which is not bound here",
            info.name
        )
    })
}

fn missing_dynvar(
    lang: &Language,
    required: &[DynVarId],
    available: &[DynVarId],
) -> Option<String> {
    required
        .iter()
        .find(|var| !available.contains(var))
        .map(|&var| dynvar_name(lang, var))
}

fn dynvar_name(lang: &Language, var: DynVarId) -> String {
    lang.dynvar(var)
        .map_or_else(|| var.to_string(), |d| d.name.clone())
}

/// Scope of the expression being checked.
struct Scope {
    owner: KindId,
    params: usize,
    locals: Vec<bool>,
    /// Declared dynamic variables, then locally bound ones.
    dynvars: Vec<DynVarId>,
    declared: usize,
    /// Declared dynamic variables actually needed.
    used: FxHashSet<DynVarId>,
    name: String,
}

impl Scope {
    fn has_dynvar(&self, var: DynVarId) -> bool {
        self.dynvars.contains(&var)
    }

    /// Record that `var` is needed, attributing it to the declaration only
    /// when no local binding shadows it.
    fn need(&mut self, var: DynVarId) {
        match self.dynvars.iter().rposition(|v| *v == var) {
            Some(pos) if pos < self.declared => {
                self.used.insert(var);
            }
            _ => {}
        }
    }

    fn bind_local(&mut self, slot: usize) -> bool {
        if slot >= self.locals.len() {
            self.locals.resize(slot + 1, false);
        }
        std::mem::replace(&mut self.locals[slot], true)
    }

    fn restore_local(&mut self, slot: usize, previous: bool) {
        if let Some(bound) = self.locals.get_mut(slot) {
            *bound = previous;
        }
    }
}

pub(super) struct Checker<'a> {
    lang: &'a Language,
    diagnostics: &'a mut DefinitionDiagnostics,
}

impl<'a> Checker<'a> {
    pub(super) fn new(lang: &'a Language, diagnostics: &'a mut DefinitionDiagnostics) -> Self {
        Checker { lang, diagnostics }
    }

    pub(super) fn run(mut self) -> Result<(), DefinitionError> {
        let lang = self.lang;
        let mut used: FxHashMap<PropertyId, FxHashSet<DynVarId>> = FxHashMap::default();

        for imp in &lang.impls {
            let Body::Expr(body) = &imp.body else {
                continue;
            };
            let Some(prop) = lang.property(imp.prop) else {
                continue;
            };
            let owner_name = self.kind_name(imp.owner);
            let mut scope = Scope {
                owner: imp.owner,
                params: prop.params.len(),
                locals: vec![false; imp.frame_size],
                dynvars: prop.dynamic_vars.clone(),
                declared: prop.dynamic_vars.len(),
                used: FxHashSet::default(),
                name: format!("{owner_name}.{}", prop.name),
            };
            self.diagnostics.context_mut().push(
                format!("in property {}", scope.name),
                Some(imp.location),
                Some("property"),
            );
            let result = self.expr(body, &mut scope);
            self.diagnostics.context_mut().pop();
            result?;
            used.entry(imp.prop).or_default().extend(scope.used);
        }

        for spec in &lang.env_specs {
            let name = self.kind_name(spec.kind);
            self.diagnostics.context_mut().push(
                format!("in env spec of {name}"),
                Some(spec.spec.location),
                Some("env_spec"),
            );
            let result = self.env_spec(spec.kind, &spec.spec.actions, spec.frame_size, &name);
            self.diagnostics.context_mut().pop();
            result?;
        }

        self.unused_dynvars(&used)
    }

    fn kind_name(&self, kind: KindId) -> String {
        self.lang
            .kind(kind)
            .map_or_else(|| kind.to_string(), |k| k.name.clone())
    }

    #[track_caller]
    fn report(
        &mut self,
        ok: bool,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Result<(), DefinitionError> {
        self.diagnostics
            .check(ok, code, message, Severity::NonBlockingError)
    }

    /// Report against an explicit location rather than the enclosing frame.
    fn report_at(
        &mut self,
        location: SourceLocation,
        code: ErrorCode,
        message: String,
    ) -> Result<(), DefinitionError> {
        let context = self.diagnostics.context_mut();
        context.push("in equation", Some(location), Some("equation"));
        let result = self
            .diagnostics
            .check(false, code, message, Severity::NonBlockingError);
        self.diagnostics.context_mut().pop();
        result
    }

    fn env_spec(
        &mut self,
        kind: KindId,
        actions: &[EnvAction],
        frame_size: usize,
        name: &str,
    ) -> Result<(), DefinitionError> {
        let mut scope = Scope {
            owner: kind,
            params: 0,
            locals: vec![false; frame_size],
            dynvars: Vec::new(),
            declared: 0,
            used: FxHashSet::default(),
            name: format!("env spec of {name}"),
        };

        for action in actions {
            match action {
                EnvAction::SetInitialEnv(env) => self.expr(env, &mut scope)?,
                EnvAction::AddToEnv {
                    key, value, dest, ..
                } => {
                    let key_ok =
                        !matches!(self.static_type(key), Some(ty) if ty != ValueType::Symbol);
                    self.report(key_ok, ErrorCode::K1001, "environment keys must be symbols")?;
                    self.expr(key, &mut scope)?;
                    self.expr(value, &mut scope)?;
                    if let Some(dest) = dest {
                        self.expr(dest, &mut scope)?;
                    }
                }
                EnvAction::Reference {
                    nodes,
                    through,
                    transform,
                } => {
                    self.expr(nodes, &mut scope)?;
                    if let Some((old, new)) = &transform.rebind {
                        self.expr(old, &mut scope)?;
                        self.expr(new, &mut scope)?;
                    }
                    match self.lang.property(*through) {
                        Some(prop) => {
                            let shape_ok = prop.params.is_empty() && prop.returns == ValueType::Env;
                            let message = format!(
                                "referenced environments must come from a property without \
                                 arguments returning an env, {} does not",
                                prop.name
                            );
                            self.report(shape_ok, ErrorCode::K1001, message)?;
                            let dynvars_ok = prop.dynamic_vars.is_empty();
                            let message = format!(
                                "{} requires dynamic variables, which env specs cannot bind",
                                prop.name
                            );
                            self.report(dynvars_ok, ErrorCode::K1004, message)?;
                        }
                        None => {
                            let message = format!("unknown property {through}");
                            self.report(false, ErrorCode::K1009, message)?;
                        }
                    }
                }
                EnvAction::AddEnv | EnvAction::ReferenceUnit { .. } => {}
            }
        }
        Ok(())
    }

    /// Type of an expression when it is obvious without evaluation.
    fn static_type(&self, expr: &Expr) -> Option<ValueType> {
        match expr {
            Expr::Lit(Value::Symbol(_)) | Expr::Text(_) => Some(ValueType::Symbol),
            Expr::Lit(Value::Null) => None,
            Expr::Lit(Value::Bool(_)) => Some(ValueType::Bool),
            Expr::Lit(Value::Int(_)) => Some(ValueType::Int),
            Expr::Lit(Value::Unit) => Some(ValueType::Unit),
            Expr::Call { prop, .. } => self.lang.property(*prop).map(|p| p.returns.clone()),
            Expr::NodeEnv(_) | Expr::ChildrenEnv(_) => Some(ValueType::Env),
            _ => None,
        }
    }

    fn expr(&mut self, expr: &Expr, scope: &mut Scope) -> Result<(), DefinitionError> {
        ensure_sufficient_stack(|| self.expr_inner(expr, scope))
    }

    fn expr_inner(&mut self, expr: &Expr, scope: &mut Scope) -> Result<(), DefinitionError> {
        match expr {
            Expr::Arg(index) => {
                let message = format!(
                    "argument {index} is out of range, {} takes {}",
                    scope.name, scope.params
                );
                self.report(*index < scope.params, ErrorCode::K1009, message)
            }
            Expr::Local(slot) => {
                let bound = scope.locals.get(*slot).copied().unwrap_or(false);
                self.report(bound, ErrorCode::K1009, format!("local {slot} is not bound"))
            }
            Expr::Let { slot, value, body } => {
                self.expr(value, scope)?;
                let previous = scope.bind_local(*slot);
                let result = self.expr(body, scope);
                scope.restore_local(*slot, previous);
                result
            }
            Expr::Map { array, slot, body } => {
                self.expr(array, scope)?;
                let previous = scope.bind_local(*slot);
                let result = self.expr(body, scope);
                scope.restore_local(*slot, previous);
                result
            }
            Expr::Match { value, arms } => {
                self.expr(value, scope)?;
                for arm in arms {
                    if let Some(kind) = arm.kind {
                        let known = self.lang.kind(kind).is_some();
                        let message = format!("unknown kind {kind} in match");
                        self.report(known, ErrorCode::K1009, message)?;
                    }
                    let previous = scope.bind_local(arm.slot);
                    let result = self.expr(&arm.body, scope);
                    scope.restore_local(arm.slot, previous);
                    result?;
                }
                Ok(())
            }

            Expr::DynVar(var) => {
                let message = format!(
                    "dynamic variable {} is not available in {}",
                    dynvar_name(self.lang, *var),
                    scope.name
                );
                self.report(scope.has_dynvar(*var), ErrorCode::K1003, message)?;
                scope.need(*var);
                Ok(())
            }
            Expr::BindDynVar { var, value, body } => {
                self.expr(value, scope)?;
                let known = self.lang.dynvar(*var).is_some();
                self.report(known, ErrorCode::K1009, format!("unknown dynamic variable {var}"))?;
                scope.dynvars.push(*var);
                let result = self.expr(body, scope);
                scope.dynvars.pop();
                result
            }

            Expr::Call {
                receiver,
                prop,
                args,
            } => {
                self.expr(receiver, scope)?;
                for arg in args {
                    self.expr(arg, scope)?;
                }
                let Some(callee) = self.lang.property(*prop) else {
                    return self.report(false, ErrorCode::K1009, format!("unknown property {prop}"));
                };
                let message = format!(
                    "{} takes {} arguments, {} given",
                    callee.name,
                    callee.params.len(),
                    args.len()
                );
                self.report(callee.params.len() == args.len(), ErrorCode::K1009, message)?;
                for &var in &callee.dynamic_vars {
                    let message = format!(
                        "{} requires dynamic variable {}, which is not available in {}",
                        callee.name,
                        dynvar_name(self.lang, var),
                        scope.name
                    );
                    self.report(scope.has_dynvar(var), ErrorCode::K1004, message)?;
                    scope.need(var);
                }
                Ok(())
            }

            Expr::Child { node, index } => {
                self.expr(node, scope)?;
                if matches!(**node, Expr::SelfEntity) {
                    if let Some(owner) = self.lang.kind(scope.owner) {
                        let ok = owner.is_list || *index < owner.fields.len();
                        let message = format!("{} has no field {index}", owner.name);
                        self.report(ok, ErrorCode::K1009, message)?;
                    }
                }
                Ok(())
            }
            Expr::LogicVar { node, index } => {
                self.expr(node, scope)?;
                if matches!(**node, Expr::SelfEntity) {
                    if let Some(owner) = self.lang.kind(scope.owner) {
                        let ok = *index < owner.logic_vars.len();
                        let message = format!("{} has no logic variable {index}", owner.name);
                        self.report(ok, ErrorCode::K1009, message)?;
                    }
                }
                Ok(())
            }
            Expr::MetadataFlag { entity, field } => {
                self.expr(entity, scope)?;
                let fields = self.lang.metadata().map_or(0, |m| m.fields.len());
                self.report(
                    *field < fields,
                    ErrorCode::K1005,
                    format!("metadata field {field} is not declared"),
                )
            }
            Expr::EnvGet {
                env,
                symbol,
                require,
                ..
            } => {
                self.expr(env, scope)?;
                self.expr(symbol, scope)?;
                let fields = self.lang.metadata().map_or(0, |m| m.fields.len());
                let declared = (0..fields).fold(kiln_ir::Metadata::EMPTY, |md, i| md.with_field(i));
                self.report(
                    declared.contains(*require),
                    ErrorCode::K1005,
                    "lookup requires metadata fields that are not declared",
                )
            }
            Expr::Cast { value, kind, .. } => {
                self.expr(value, scope)?;
                let known = self.lang.kind(*kind).is_some();
                self.report(known, ErrorCode::K1009, format!("unknown kind {kind} in cast"))
            }

            Expr::Bind { a, b, eq, origin } => {
                self.expr(a, scope)?;
                self.expr(b, scope)?;
                let Some(eq) = eq else {
                    return Ok(());
                };
                if let Some(problem) = eq_prop_problem(self.lang, *eq, &scope.dynvars) {
                    self.report_at(*origin, ErrorCode::K1002, problem)?;
                }
                if let Some(prop) = self.lang.property(*eq) {
                    for &var in &prop.dynamic_vars {
                        scope.need(var);
                    }
                }
                Ok(())
            }
            Expr::Predicate { var, prop, origin } => {
                self.expr(var, scope)?;
                if let Some(problem) = predicate_problem(self.lang, *prop, &scope.dynvars) {
                    self.report_at(*origin, ErrorCode::K1012, problem)?;
                }
                if let Some(info) = self.lang.property(*prop) {
                    for &var in &info.dynamic_vars {
                        scope.need(var);
                    }
                }
                Ok(())
            }

            _ => {
                for child in expr.children() {
                    self.expr(child, scope)?;
                }
                Ok(())
            }
        }
    }

    /// Warn about declared dynamic variables no body needs.
    fn unused_dynvars(
        &mut self,
        used: &FxHashMap<PropertyId, FxHashSet<DynVarId>>,
    ) -> Result<(), DefinitionError> {
        let lang = self.lang;
        for prop in &lang.properties {
            let all_exprs = prop.impls.iter().all(|&i| {
                lang.implementation(i)
                    .is_some_and(|imp| matches!(imp.body, Body::Expr(_)))
            });
            if !all_exprs || prop.dynamic_vars.is_empty() {
                continue;
            }
            let needed = used.get(&prop.id);
            for &var in &prop.dynamic_vars {
                if needed.is_some_and(|set| set.contains(&var)) {
                    continue;
                }
                self.diagnostics.context_mut().push(
                    format!("in property {}", prop.name),
                    Some(prop.location),
                    Some("property"),
                );
                let result = self.diagnostics.check(
                    false,
                    ErrorCode::K1010,
                    format!(
                        "{} declares dynamic variable {} but never needs it",
                        prop.name,
                        dynvar_name(lang, var)
                    ),
                    Severity::Warning,
                );
                self.diagnostics.context_mut().pop();
                result?;
            }
        }
        Ok(())
    }
}
