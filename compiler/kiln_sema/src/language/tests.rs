#![allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]

use kiln_diagnostic::{ErrorCode, Severity};
use kiln_ir::{LogicVarId, Metadata};
use pretty_assertions::assert_eq;

use super::*;
use crate::env::EnvSpec;
use crate::BinaryOp;

/// `FooNode` with a `BarNode` sibling kind, both deriving from `Root`.
struct Fixture {
    b: LanguageBuilder,
    root: KindId,
    foo: KindId,
    bar: KindId,
}

fn fixture() -> Fixture {
    let mut b = LanguageBuilder::default();
    let root = b.kind(KindDecl::new("Root").abstract_kind()).unwrap();
    let foo = b
        .kind(KindDecl::new("FooNode").parent(root).fields(["name"]).logic_vars(["ref_var"]))
        .unwrap();
    let bar = b.kind(KindDecl::new("BarNode").parent(root)).unwrap();
    Fixture { b, root, foo, bar }
}

fn bool_prop(owner: KindId, name: &str) -> PropertyDecl {
    PropertyDecl::new(owner, name)
        .returns(ValueType::Bool)
        .body(Expr::lit(true))
}

#[test]
fn kinds_inherit_fields_and_ancestors() {
    let Fixture { mut b, foo, root, .. } = fixture();
    let derived = b
        .kind(KindDecl::new("Derived").parent(foo).fields(["value"]))
        .unwrap();
    assert_eq!(b.field_index(derived, "name"), Some(0));
    assert_eq!(b.field_index(derived, "value"), Some(1));
    assert_eq!(b.logic_var_index(derived, "ref_var"), Some(0));

    let lang = b.build().unwrap();
    assert!(lang.is_subkind(derived, root));
    assert!(!lang.is_subkind(root, derived));
    assert_eq!(lang.kind(derived).unwrap().ancestors, vec![derived, foo, root]);
}

#[test]
fn kind_declaration_mistakes() {
    let Fixture { mut b, root, .. } = fixture();
    let err = b.kind(KindDecl::new("FooNode")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::K1008);

    let err = b.kind(KindDecl::new("Items").list().fields(["x"])).unwrap_err();
    assert_eq!(err.code(), ErrorCode::K1011);

    let items = b.kind(KindDecl::new("Items").parent(root).list()).unwrap();
    let err = b.kind(KindDecl::new("MoreItems").parent(items)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::K1011);

    let err = b
        .kind(KindDecl::new("Orphan").parent(KindId::from_raw(99)))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::K1009);
}

#[test]
fn errors_point_at_the_declaration() {
    let Fixture { mut b, .. } = fixture();
    let line = line!() + 1;
    let err = b.kind(KindDecl::new("FooNode")).unwrap_err();
    match err.primary.location {
        kiln_diagnostic::Location::Definition(loc) => assert_eq!(loc.line, line),
        other => panic!("unexpected location {other:?}"),
    }
    assert_eq!(err.context[0].0, "in kind FooNode");
    assert!(b.diagnostics().context().is_empty());
}

#[test]
fn sibling_overrides_dispatch_by_runtime_kind() {
    let Fixture { mut b, root, foo, bar } = fixture();
    let describe = b
        .property(
            PropertyDecl::new(root, "describe")
                .returns(ValueType::Int)
                .abstract_property(),
        )
        .unwrap();
    let foo_id = b
        .property(PropertyDecl::new(foo, "describe").returns(ValueType::Int).body(Expr::lit(1_i64)))
        .unwrap();
    let bar_id = b
        .property(PropertyDecl::new(bar, "describe").returns(ValueType::Int).body(Expr::lit(2_i64)))
        .unwrap();
    assert_eq!(foo_id, describe);
    assert_eq!(bar_id, describe);

    let lang = b.build().unwrap();
    let Some(Dispatch::Impl(foo_impl)) = lang.dispatch(foo, describe) else {
        panic!("FooNode.describe unresolved");
    };
    let Some(Dispatch::Impl(bar_impl)) = lang.dispatch(bar, describe) else {
        panic!("BarNode.describe unresolved");
    };
    assert_eq!(lang.implementation(foo_impl).unwrap().owner, foo);
    assert_eq!(lang.implementation(bar_impl).unwrap().owner, bar);
    assert_eq!(lang.dispatch(root, describe), None);
}

#[test]
fn override_signature_must_match() {
    let Fixture { mut b, root, foo, .. } = fixture();
    b.property(PropertyDecl::new(root, "size").returns(ValueType::Int).abstract_property())
        .unwrap();
    let err = b
        .property(PropertyDecl::new(foo, "size").returns(ValueType::Bool).body(Expr::lit(true)))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::K1007);

    let err = b
        .property(PropertyDecl::new(root, "size").returns(ValueType::Int).abstract_property())
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::K1008);
}

#[test]
fn base_declared_after_override_is_rejected() {
    let Fixture { mut b, root, foo, .. } = fixture();
    b.property(bool_prop(foo, "flag")).unwrap();
    let err = b.property(bool_prop(root, "flag")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::K1008);
}

#[test]
fn missing_override_is_reported_at_build() {
    let Fixture { mut b, root, foo, .. } = fixture();
    b.property(PropertyDecl::new(root, "checked").returns(ValueType::Int).runtime_check())
        .unwrap();
    b.property(PropertyDecl::new(root, "unchecked").returns(ValueType::Int).abstract_property())
        .unwrap();
    b.property(PropertyDecl::new(foo, "unchecked").returns(ValueType::Int).body(Expr::lit(0_i64)))
        .unwrap();

    let err = b.build().unwrap_err();
    assert_eq!(err.code(), ErrorCode::K1006);
    assert!(err.primary.message.contains("BarNode"));
    assert!(err.related.is_empty());
}

#[test]
fn runtime_checked_abstract_resolves_to_missing() {
    let Fixture { mut b, root, foo, .. } = fixture();
    let checked = b
        .property(PropertyDecl::new(root, "checked").returns(ValueType::Int).runtime_check())
        .unwrap();
    let lang = b.build().unwrap();
    assert_eq!(lang.dispatch(foo, checked), Some(Dispatch::Missing));
}

#[test]
fn pending_body_must_be_supplied() {
    let Fixture { mut b, foo, .. } = fixture();
    let count = b
        .property(PropertyDecl::new(foo, "count").returns(ValueType::Int))
        .unwrap();
    let err = b.build().unwrap_err();
    assert_eq!(err.code(), ErrorCode::K1013);

    let Fixture { mut b, foo, .. } = fixture();
    let count2 = b
        .property(PropertyDecl::new(foo, "count").returns(ValueType::Int))
        .unwrap();
    b.set_body(
        count2,
        foo,
        Expr::binary(BinaryOp::Add, Expr::lit(1_i64), Expr::lit(1_i64)),
    )
    .unwrap();
    assert!(b.build().is_ok());
    assert_eq!(count, count2);
}

/// Mirrors the classic invalid equality-predicate cases: only `prop_a` and
/// `prop_b` are valid comparisons.
#[test]
fn invalid_eq_props_are_rejected() {
    let Fixture { mut b, foo, bar, .. } = fixture();
    let env_var = b.dynamic_var("env", ValueType::Env).unwrap();
    let dyn_node = b.dynamic_var("dyn_node", ValueType::Entity(foo)).unwrap();

    let no_params_int = b
        .property(PropertyDecl::new(foo, "prop").returns(ValueType::Int).body(Expr::lit(1_i64)))
        .unwrap();
    let no_params_bool = b.property(bool_prop(foo, "prop2")).unwrap();
    let other_kind = b
        .property(bool_prop(foo, "prop3").param("other", ValueType::Entity(bar)))
        .unwrap();
    let needs_dyn_node = b
        .property(
            bool_prop(foo, "prop4")
                .param("other", ValueType::Entity(foo))
                .dynamic_vars([dyn_node]),
        )
        .unwrap();
    let prop_a = b
        .property(bool_prop(foo, "prop_a").param("other", ValueType::Entity(foo)))
        .unwrap();
    let prop_b = b
        .property(
            bool_prop(foo, "prop_b")
                .param("other", ValueType::Entity(foo))
                .dynamic_vars([env_var]),
        )
        .unwrap();

    let var = |i| Expr::logic_var(Expr::SelfEntity, i);
    let bind = |eq| Expr::bind(var(0), var(0), Some(eq));

    // Valid binds only.
    let ok_body = Expr::bind_dynvar(
        env_var,
        Expr::node_env(Expr::SelfEntity),
        Expr::All(vec![bind(prop_a), bind(prop_b)]),
    );
    b.property(
        PropertyDecl::new(foo, "resolve")
            .returns(ValueType::Equation)
            .body(ok_body),
    )
    .unwrap();

    let bad_body = Expr::bind_dynvar(
        env_var,
        Expr::node_env(Expr::SelfEntity),
        Expr::All(vec![
            bind(no_params_int),
            bind(no_params_bool),
            bind(other_kind),
            bind(needs_dyn_node),
        ]),
    );
    b.property(
        PropertyDecl::new(foo, "resolve_bad")
            .returns(ValueType::Equation)
            .body(bad_body),
    )
    .unwrap();

    let err = b.build().unwrap_err();
    let eq_errors: Vec<_> = err
        .diagnostics()
        .filter(|d| d.code == ErrorCode::K1002)
        .collect();
    assert_eq!(eq_errors.len(), 4);
    assert!(eq_errors[0].message.contains("prop "));
    assert!(eq_errors[3].message.contains("dyn_node"));
}

#[test]
fn dynamic_variables_must_be_in_scope() {
    let Fixture { mut b, foo, .. } = fixture();
    let env_var = b.dynamic_var("Env", ValueType::Env).unwrap();

    let implicit = b
        .property(
            PropertyDecl::new(foo, "implicit_prop")
                .returns(ValueType::Env)
                .dynamic_vars([env_var])
                .body(Expr::DynVar(env_var)),
        )
        .unwrap();

    // Reading without declaring, and calling a property that needs it.
    b.property(PropertyDecl::new(foo, "reads").returns(ValueType::Env).body(Expr::DynVar(env_var)))
        .unwrap();
    b.property(
        PropertyDecl::new(foo, "calls")
            .returns(ValueType::Env)
            .body(Expr::self_call(implicit)),
    )
    .unwrap();

    // Binding first is fine in both forms.
    b.property(
        PropertyDecl::new(foo, "binds_read")
            .returns(ValueType::Env)
            .body(Expr::bind_dynvar(
                env_var,
                Expr::node_env(Expr::SelfEntity),
                Expr::DynVar(env_var),
            )),
    )
    .unwrap();
    b.property(
        PropertyDecl::new(foo, "binds_call")
            .returns(ValueType::Env)
            .body(Expr::bind_dynvar(
                env_var,
                Expr::node_env(Expr::SelfEntity),
                Expr::self_call(implicit),
            )),
    )
    .unwrap();

    let err = b.build().unwrap_err();
    let codes: Vec<ErrorCode> = err.diagnostics().map(|d| d.code).collect();
    assert_eq!(codes, vec![ErrorCode::K1003, ErrorCode::K1004]);
}

#[test]
fn unused_dynamic_variable_warns() {
    let Fixture { mut b, foo, .. } = fixture();
    let env_var = b.dynamic_var("env", ValueType::Env).unwrap();
    b.property(
        PropertyDecl::new(foo, "ignores")
            .returns(ValueType::Int)
            .dynamic_vars([env_var])
            .body(Expr::lit(3_i64)),
    )
    .unwrap();

    let lang = b.build().unwrap();
    assert_eq!(lang.warnings().len(), 1);
    assert_eq!(lang.warnings()[0].code, ErrorCode::K1010);
    assert_eq!(lang.warnings()[0].severity, Severity::Warning);
}

#[test]
fn argument_and_local_indices_are_checked() {
    let Fixture { mut b, foo, .. } = fixture();
    b.property(PropertyDecl::new(foo, "bad_arg").returns(ValueType::Int).body(Expr::Arg(0)))
        .unwrap();
    b.property(PropertyDecl::new(foo, "bad_local").returns(ValueType::Int).body(Expr::Local(2)))
        .unwrap();
    b.property(
        PropertyDecl::new(foo, "good")
            .param("n", ValueType::Int)
            .returns(ValueType::Int)
            .body(Expr::let_in(0, Expr::Arg(0), Expr::Local(0))),
    )
    .unwrap();

    let err = b.build().unwrap_err();
    let codes: Vec<ErrorCode> = err.diagnostics().map(|d| d.code).collect();
    assert_eq!(codes, vec![ErrorCode::K1009, ErrorCode::K1009]);
}

#[test]
fn rejected_metadata_registers_nothing() {
    let Fixture { mut b, .. } = fixture();

    let err = b
        .env_metadata(MetadataDecl::new("Md").field("inherited", ValueType::Bool))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::K1005);

    let err = b
        .env_metadata(MetadataDecl::new("Metadata").field("count", ValueType::Int))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::K1005);

    let too_many = (0..=Metadata::MAX_FIELDS).fold(MetadataDecl::new("Metadata"), |decl, i| {
        decl.field(format!("f{i}"), ValueType::Bool)
    });
    assert_eq!(b.env_metadata(too_many).unwrap_err().code(), ErrorCode::K1005);
    assert_eq!(b.metadata_flag("inherited"), None);

    b.env_metadata(
        MetadataDecl::new("Metadata")
            .field("inherited", ValueType::Bool)
            .field("visible", ValueType::Bool),
    )
    .unwrap();
    assert_eq!(b.metadata_flag("visible"), Some(Metadata::EMPTY.with_field(1)));

    let err = b
        .env_metadata(MetadataDecl::new("Metadata").field("other", ValueType::Bool))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::K1005);
    assert_eq!(b.metadata_flag("other"), None);
}

#[test]
fn env_keys_must_be_symbols() {
    let Fixture { mut b, foo, .. } = fixture();
    b.env_spec(foo, EnvSpec::new().add_to_env(Expr::lit(3_i64)))
        .unwrap();
    let err = b.build().unwrap_err();
    assert_eq!(err.code(), ErrorCode::K1001);
}

#[test]
fn env_spec_is_inherited() {
    let Fixture { mut b, root, foo, .. } = fixture();
    b.env_spec(root, EnvSpec::new().add_env()).unwrap();
    let err = b.env_spec(root, EnvSpec::new()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::K1008);

    let lang = b.build().unwrap();
    assert_eq!(lang.env_spec(foo).unwrap().kind, root);
}

#[test]
fn introspection_lists_visible_properties() {
    let Fixture { mut b, root, foo, bar } = fixture();
    let env_var = b.dynamic_var("env", ValueType::Env).unwrap();
    b.property(
        PropertyDecl::new(root, "name_of")
            .returns(ValueType::Symbol)
            .public()
            .memoized()
            .abstract_property(),
    )
    .unwrap();
    b.property(
        PropertyDecl::new(foo, "name_of")
            .returns(ValueType::Symbol)
            .body(Expr::text(Expr::child(Expr::SelfEntity, 0))),
    )
    .unwrap();
    let bar_name = b.intern("bar");
    b.property(
        PropertyDecl::new(bar, "name_of")
            .returns(ValueType::Symbol)
            .body(Expr::lit(bar_name)),
    )
    .unwrap();
    let lookup = b
        .property(
            PropertyDecl::new(foo, "lookup")
                .param("key", ValueType::Symbol)
                .returns(ValueType::array_of(ValueType::Entity(root)))
                .dynamic_vars([env_var])
                .body(Expr::env_get(Expr::DynVar(env_var), Expr::Arg(0))),
        )
        .unwrap();

    let lang = b.build().unwrap();
    let names: Vec<&str> = lang.properties_of(foo).iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["name_of", "lookup"]);
    assert_eq!(lang.properties_of(root).len(), 1);
    assert_eq!(lang.properties_of(bar).len(), 1);

    let info = lang.property_info(lookup).unwrap();
    assert_eq!(
        info,
        PropertyDescription {
            name: "lookup".into(),
            owner: "FooNode".into(),
            params: vec![("key".into(), "symbol".into())],
            returns: format!("array<entity<{root}>>"),
            dynamic_vars: vec!["env".into()],
            public: false,
            memoized: false,
            external: false,
            is_abstract: false,
            overrides: 0,
        }
    );

    let name_of = lang.property_by_name(foo, "name_of").unwrap();
    let info = lang.property_info(name_of).unwrap();
    assert!(info.public && info.memoized && info.is_abstract);
    assert_eq!(info.overrides, 2);
}

#[test]
fn equation_builder_rejects_without_registering() {
    let Fixture { mut b, foo, .. } = fixture();
    let env_var = b.dynamic_var("env", ValueType::Env).unwrap();
    let needs_env = b
        .property(
            bool_prop(foo, "same")
                .param("other", ValueType::Entity(foo))
                .dynamic_vars([env_var]),
        )
        .unwrap();
    let lang = b.build().unwrap();
    let (x, y) = (LogicVarId::from_raw(0), LogicVarId::from_raw(1));

    let mut eq = lang.equation_builder([]);
    eq.bind(x, y, None).unwrap();
    let err = eq.bind(x, y, Some(needs_env)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::K1002);
    assert_eq!(eq.len(), 1);

    let mut eq = lang.equation_builder([env_var]);
    eq.bind(x, y, Some(needs_env)).unwrap();
    let err = eq.predicate(x, needs_env).unwrap_err();
    assert_eq!(err.code(), ErrorCode::K1012);
    assert_eq!(eq.len(), 1);
}
