use std::rc::Rc;

use kiln::{
    Analysis, AnalysisError, BinaryOp, DynVars, Entity, ErrorCode, Expr, KindDecl, NodeId,
    PropertyDecl, Value, ValueType,
};
use pretty_assertions::assert_eq;

use crate::common::{decl, mini_builder, reference, Mini};

#[test]
fn eq_prop_outside_its_dynvar_scope_is_rejected() {
    let (mut b, k, p) = mini_builder();
    let same_scaled = b
        .property(
            PropertyDecl::new(k.reference, "same_scaled")
                .param("other", ValueType::Entity(k.reference))
                .returns(ValueType::Bool)
                .dynamic_vars([p.factor])
                .body(Expr::binary(
                    BinaryOp::Eq,
                    Expr::self_call(p.scaled),
                    Expr::call(Expr::Arg(0), p.scaled, Vec::new()),
                )),
        )
        .unwrap();
    let var = Expr::logic_var(Expr::SelfEntity, 0);
    b.property(
        PropertyDecl::new(k.reference, "unscoped")
            .returns(ValueType::Equation)
            .body(Expr::bind(var.clone(), var, Some(same_scaled))),
    )
    .unwrap();

    let err = b.build().unwrap_err();
    assert!(err.has_code(ErrorCode::K1002));
    let rejected: Vec<_> = err
        .diagnostics()
        .filter(|d| d.code == ErrorCode::K1002)
        .collect();
    assert_eq!(rejected.len(), 1);
    assert!(rejected[0].message.contains("factor"));
    assert!(matches!(AnalysisError::from(err), AnalysisError::Definition(_)));
}

#[test]
fn host_equations_check_binds_and_solve_through_properties() {
    let (mut b, k, p) = mini_builder();
    let same_scaled = b
        .property(
            PropertyDecl::new(k.reference, "same_scaled")
                .param("other", ValueType::Entity(k.reference))
                .returns(ValueType::Bool)
                .dynamic_vars([p.factor])
                .body(Expr::binary(
                    BinaryOp::Eq,
                    Expr::self_call(p.scaled),
                    Expr::call(Expr::Arg(0), p.scaled, Vec::new()),
                )),
        )
        .unwrap();
    let m = Mini {
        lang: Rc::new(b.build().unwrap()),
        k,
        p,
    };
    let mut ctx = m.context();
    let a = ctx.analysis_mut();
    let unit = a.new_unit("main");
    let x = decl(a, unit, k, "x", "2").unwrap();
    let y = decl(a, unit, k, "y", "3").unwrap();
    let first = reference(a, unit, k, "x").unwrap();
    let other = reference(a, unit, k, "y").unwrap();
    let again = reference(a, unit, k, "x").unwrap();
    let module = a.new_node(unit, k.module, vec![x, y, first, other, again]).unwrap();
    ctx.populate(unit, module).unwrap();

    let a = ctx.analysis_mut();
    let lv = |a: &Analysis, node: NodeId| a.tree().get(node).unwrap().logic_vars[0];
    let (va, vb) = (lv(a, first), lv(a, other));
    let lang = Rc::clone(a.language());

    // Without `factor` in scope the bind is refused and nothing is added.
    let mut unscoped = lang.equation_builder([]);
    let err = unscoped.bind(va, vb, Some(same_scaled)).unwrap_err();
    assert_eq!(AnalysisError::from(err).code(), ErrorCode::K1002);
    assert!(unscoped.is_empty());

    let mut scoped = lang.equation_builder([p.factor]);
    scoped.domain(va, [Entity::bare(first)]);
    scoped.domain(vb, [Entity::bare(other), Entity::bare(again)]);
    scoped.bind(va, vb, Some(same_scaled)).unwrap();
    let equation = scoped.finish();

    let dynvars = DynVars::new().with(p.factor, Value::Int(10));
    assert_eq!(a.solve(&equation, &dynvars), Ok(true));
    assert_eq!(a.logic_value(va), Ok(Entity::bare(first)));
    assert_eq!(a.logic_value(vb), Ok(Entity::bare(again)));
}

#[test]
fn missing_override_surfaces_as_definition_error() {
    let (mut b, k, _) = mini_builder();
    b.kind(KindDecl::new("Hole").parent(k.expr)).unwrap();

    let err = AnalysisError::from(b.build().unwrap_err());
    assert_eq!(err.code(), ErrorCode::K1006);
    match err {
        AnalysisError::Definition(err) => assert!(err.primary.message.contains("Hole")),
        other => panic!("unexpected error {other:?}"),
    }
}
