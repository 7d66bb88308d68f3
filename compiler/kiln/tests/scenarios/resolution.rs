use kiln::{DynVars, EnvValue, Entity, ErrorCode, Metadata, PropertyErrorKind, Value};
use pretty_assertions::assert_eq;

use crate::common::{decl, mini, reference};

#[test]
fn declaration_then_reference() {
    let m = mini();
    let mut ctx = m.context();
    let a = ctx.analysis_mut();
    let unit = a.new_unit("main");
    let x = decl(a, unit, m.k, "x", "1").unwrap();
    let r = reference(a, unit, m.k, "x").unwrap();
    let module = a.new_node(unit, m.k.module, vec![x, r]).unwrap();
    ctx.populate(unit, module).unwrap();

    let a = ctx.analysis_mut();
    let env = a.node_envs(r).unwrap().node_env;
    let name = a.intern("x");
    let found = a.lookup(&EnvValue::plain(env), name, Metadata::EMPTY).unwrap();
    assert_eq!(found, vec![Entity::bare(x)]);

    let value = ctx.call_public(r, "eval", &[], &DynVars::new()).unwrap();
    assert_eq!(value, Value::Int(1));
    let direct = ctx.analysis_mut().call(r, m.p.eval, &[], &DynVars::new());
    assert_eq!(direct, Ok(value));
    assert!(ctx.diagnostics().is_empty());
}

#[test]
fn only_public_properties_are_callable() {
    let m = mini();
    let mut ctx = m.context();
    let a = ctx.analysis_mut();
    let unit = a.new_unit("main");
    let r = reference(a, unit, m.k, "x").unwrap();
    let module = a.new_node(unit, m.k.module, vec![r]).unwrap();
    ctx.populate(unit, module).unwrap();

    let err = ctx.call_public(r, "is_decl", &[], &DynVars::new()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::K3008);
    let err = err.as_property().unwrap();
    assert_eq!((err.node, err.prop), (Some(r), Some(m.p.is_decl)));

    let err = ctx.call_public(r, "missing", &[], &DynVars::new()).unwrap_err();
    assert!(matches!(
        err.as_property().map(|e| &e.kind),
        Some(PropertyErrorKind::Dispatch { .. })
    ));
}

#[test]
fn inner_scope_shadows_outer_declaration() {
    let m = mini();
    let mut ctx = m.context();
    let a = ctx.analysis_mut();
    let unit = a.new_unit("main");
    let outer = decl(a, unit, m.k, "x", "1").unwrap();
    let inner = decl(a, unit, m.k, "x", "2").unwrap();
    let r = reference(a, unit, m.k, "x").unwrap();
    let block = a.new_node(unit, m.k.block, vec![inner, r]).unwrap();
    let module = a.new_node(unit, m.k.module, vec![outer, block]).unwrap();
    ctx.populate(unit, module).unwrap();

    let none = DynVars::new();
    assert_eq!(ctx.call_public(r, "eval", &[], &none), Ok(Value::Int(2)));
    let resolved = ctx.call_public(r, "resolve", &[], &none).unwrap();
    assert_eq!(resolved, Value::Entity(Entity::bare(inner)));
    let again = ctx.analysis_mut().call(r, m.p.resolve, &[], &none);
    assert_eq!(again, Ok(resolved));

    let var = ctx.analysis().tree().get(r).unwrap().logic_vars[0];
    assert_eq!(ctx.analysis().logic_value(var), Ok(Entity::bare(inner)));
}

#[test]
fn memoization_ignores_undeclared_dynvars() {
    let m = mini();
    let mut ctx = m.context();
    let a = ctx.analysis_mut();
    let unit = a.new_unit("main");
    let x = decl(a, unit, m.k, "x", "5").unwrap();
    let r = reference(a, unit, m.k, "x").unwrap();
    let module = a.new_node(unit, m.k.module, vec![x, r]).unwrap();
    ctx.populate(unit, module).unwrap();

    let three = DynVars::new().with(m.p.factor, Value::Int(3));
    let loud = three.clone().with(m.p.verbose, Value::Bool(true));
    assert_eq!(ctx.call_public(r, "scaled", &[], &three), Ok(Value::Int(15)));
    assert_eq!(ctx.call_public(r, "scaled", &[], &loud), Ok(Value::Int(15)));
    assert_eq!(ctx.analysis().memo_stats().hits, 1);

    let four = DynVars::new().with(m.p.factor, Value::Int(4));
    assert_eq!(ctx.call_public(r, "scaled", &[], &four), Ok(Value::Int(20)));
    assert_eq!(ctx.analysis().memo_stats().entries, 2);

    let err = ctx.call_public(r, "scaled", &[], &DynVars::new()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::K3003);
}

#[test]
fn failed_resolution_is_scoped_to_its_query() {
    let m = mini();
    let mut ctx = m.context();
    let a = ctx.analysis_mut();
    let unit = a.new_unit("main");
    let x = decl(a, unit, m.k, "x", "1").unwrap();
    let unknown = reference(a, unit, m.k, "y").unwrap();
    let known = reference(a, unit, m.k, "x").unwrap();
    let module = a.new_node(unit, m.k.module, vec![x, unknown, known]).unwrap();
    ctx.populate(unit, module).unwrap();

    let none = DynVars::new();
    assert_eq!(ctx.call_public(unknown, "resolve", &[], &none), Ok(Value::Null));
    assert_eq!(ctx.diagnostics().count_by_code(ErrorCode::K4001), 1);
    assert!(ctx.has_errors());

    let err = ctx.call_public(unknown, "eval", &[], &none).unwrap_err();
    assert_eq!(err.code(), ErrorCode::K3004);

    assert_eq!(ctx.call_public(known, "resolve", &[], &none), Ok(Value::Entity(Entity::bare(x))));
    assert_eq!(ctx.call_public(known, "eval", &[], &none), Ok(Value::Int(1)));
}

#[test]
fn population_is_rejected_twice() {
    let m = mini();
    let mut ctx = m.context();
    let a = ctx.analysis_mut();
    let unit = a.new_unit("main");
    let x = decl(a, unit, m.k, "x", "1").unwrap();
    let module = a.new_node(unit, m.k.module, vec![x]).unwrap();
    ctx.populate(unit, module).unwrap();

    let err = ctx.analysis_mut().populate(module).unwrap_err();
    assert_eq!(err.code(), ErrorCode::K2003);
    assert_eq!(ctx.diagnostics().count_by_code(ErrorCode::K2003), 1);

    let name = ctx.analysis().intern("x");
    let env = ctx.unit_env("main").unwrap();
    assert_eq!(ctx.analysis().envs().bindings(env, name).len(), 1);
}
