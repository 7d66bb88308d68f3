use kiln::{
    Analysis, AnalysisContext, DynVars, EnvValue, ErrorCode, Metadata, NodeBuildError, NodeId,
    PropertyErrorKind, UnitId, Value,
};
use pretty_assertions::assert_eq;

use crate::common::{decl, mini, prelude, reference, use_prelude, Mini};

/// `Module[UsePrelude, <decls>, Ref(name)]` in unit `main`, populated.
fn main_unit(m: &Mini, ctx: &mut AnalysisContext, decls: &[(&str, &str)], name: &str) -> NodeId {
    let a = ctx.analysis_mut();
    let unit = a.new_unit("main");
    let mut children = vec![use_prelude(a, unit, m.k).unwrap()];
    for (decl_name, value) in decls {
        children.push(decl(a, unit, m.k, decl_name, value).unwrap());
    }
    let r = reference(a, unit, m.k, name).unwrap();
    children.push(r);
    let module = a.new_node(unit, m.k.module, children).unwrap();
    ctx.populate(unit, module).unwrap();
    r
}

#[test]
fn referenced_unit_loads_on_first_lookup() {
    let m = mini();
    let mut ctx = m.context();
    ctx.register_unit("prelude", prelude(m.k, &[("x", "5")]));
    let r = main_unit(&m, &mut ctx, &[], "x");
    assert_eq!(ctx.unit_env("prelude"), None);

    let value = ctx.call_public(r, "eval", &[], &DynVars::new()).unwrap();
    assert_eq!(value, Value::Int(5));
    assert!(ctx.unit_env("prelude").is_some());
    assert!(ctx.diagnostics().is_empty());
}

#[test]
fn local_declarations_come_before_imported_ones() {
    let m = mini();
    let mut ctx = m.context();
    ctx.register_unit("prelude", prelude(m.k, &[("x", "5")]));
    let r = main_unit(&m, &mut ctx, &[("x", "1")], "x");

    assert_eq!(ctx.call_public(r, "eval", &[], &DynVars::new()), Ok(Value::Int(1)));

    let a = ctx.analysis_mut();
    let env = a.node_envs(r).unwrap().node_env;
    let name = a.intern("x");
    let found = a.lookup(&EnvValue::plain(env), name, Metadata::EMPTY).unwrap();
    let units: Vec<String> = found
        .iter()
        .map(|e| {
            let unit = a.tree().get(e.node).unwrap().unit;
            let name = a.tree().unit(unit).unwrap().name;
            a.symbols().lookup(name).to_owned()
        })
        .collect();
    assert_eq!(units, vec!["main".to_owned(), "prelude".to_owned()]);
}

#[test]
fn unit_is_built_once() {
    let m = mini();
    let mut ctx = m.context();
    ctx.register_unit("prelude", prelude(m.k, &[("x", "5"), ("y", "6")]));
    let r = main_unit(&m, &mut ctx, &[], "x");

    let none = DynVars::new();
    assert_eq!(ctx.call_public(r, "eval", &[], &none), Ok(Value::Int(5)));
    let nodes = ctx.analysis().tree().len();
    let loaded = ctx.load_unit("prelude").unwrap();
    assert_eq!(ctx.load_unit("prelude").unwrap(), loaded);
    assert_eq!(ctx.call_public(r, "eval", &[], &none), Ok(Value::Int(5)));
    assert_eq!(ctx.analysis().tree().len(), nodes);
    assert_eq!(ctx.analysis().tree().units().count(), 2);
}

#[test]
fn missing_provider_fails_the_lookup() {
    let m = mini();
    let mut ctx = m.context();
    let r = main_unit(&m, &mut ctx, &[], "x");
    assert!(!ctx.has_provider("prelude"));

    let err = ctx.call_public(r, "eval", &[], &DynVars::new()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::K3009);

    // A provider registered later is picked up by the next lookup.
    ctx.register_unit("prelude", prelude(m.k, &[("x", "8")]));
    assert_eq!(ctx.call_public(r, "eval", &[], &DynVars::new()), Ok(Value::Int(8)));
}

#[test]
fn provider_errors_name_the_unit() {
    let m = mini();
    let mut ctx = m.context();
    let k = m.k;
    let missing_value = move |a: &mut Analysis, unit: UnitId| -> Result<NodeId, NodeBuildError> {
        let x = a.new_token(unit, k.ident, "x")?;
        a.new_node(unit, k.decl, vec![x])
    };
    ctx.register_unit("prelude", missing_value);

    let err = ctx.load_unit("prelude").unwrap_err();
    let kind = &err.as_property().unwrap().kind;
    match kind {
        PropertyErrorKind::UnitLoad(message) => assert!(message.starts_with("prelude: ")),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(ctx.unit_env("prelude"), None);
}

#[test]
fn providers_can_be_replaced_before_loading() {
    let m = mini();
    let mut ctx = m.context();
    ctx.register_unit("prelude", prelude(m.k, &[("x", "1")]));
    ctx.register_unit("prelude", prelude(m.k, &[("x", "2")]));
    let r = main_unit(&m, &mut ctx, &[], "x");
    assert_eq!(ctx.call_public(r, "eval", &[], &DynVars::new()), Ok(Value::Int(2)));
}
