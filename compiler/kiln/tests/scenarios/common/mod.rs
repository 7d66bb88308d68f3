//! A small block-structured language shared by the scenarios.
//!
//! ```text
//! Module[ UsePrelude, Decl(x, 1), Block[ Decl(x, 2), Ref(x) ] ]
//! ```
//!
//! `Module` roots a unit and binds into the unit environment, `Block`
//! opens a nested scope and `UsePrelude` references the unit named
//! `prelude`.

use std::rc::Rc;

use kiln::{
    Analysis, AnalysisConfig, AnalysisContext, BinaryOp, DynVarId, EnvSpec, Expr, ExternalCall,
    KindDecl, KindId, Language, LanguageBuilder, NodeBuildError, NodeId, PropertyDecl,
    PropertyError, PropertyId, UnitId, UnitProvider, Value, ValueType,
};

#[derive(Copy, Clone, Debug)]
pub struct Kinds {
    pub node: KindId,
    pub expr: KindId,
    pub module: KindId,
    pub block: KindId,
    pub decl: KindId,
    pub use_prelude: KindId,
    pub reference: KindId,
    pub lit: KindId,
    pub ident: KindId,
}

#[derive(Copy, Clone, Debug)]
pub struct Props {
    pub eval: PropertyId,
    pub is_decl: PropertyId,
    pub resolve: PropertyId,
    pub scaled: PropertyId,
    pub factor: DynVarId,
    pub verbose: DynVarId,
}

pub struct Mini {
    pub lang: Rc<Language>,
    pub k: Kinds,
    pub p: Props,
}

pub fn name_of(node: Expr) -> Expr {
    Expr::text(Expr::child(node, 0))
}

fn declare_kinds(b: &mut LanguageBuilder) -> Kinds {
    let node = b.kind(KindDecl::new("Node").abstract_kind()).unwrap();
    let expr = b.kind(KindDecl::new("Expr").parent(node).abstract_kind()).unwrap();
    let module = b.kind(KindDecl::new("Module").parent(node).list()).unwrap();
    let block = b.kind(KindDecl::new("Block").parent(node).list()).unwrap();
    let decl = b
        .kind(KindDecl::new("Decl").parent(node).fields(["name", "value"]))
        .unwrap();
    let use_prelude = b.kind(KindDecl::new("UsePrelude").parent(node)).unwrap();
    let reference = b
        .kind(
            KindDecl::new("Ref")
                .parent(expr)
                .fields(["name"])
                .logic_vars(["target"]),
        )
        .unwrap();
    let lit = b.kind(KindDecl::new("Lit").parent(expr).token()).unwrap();
    let ident = b.kind(KindDecl::new("Ident").parent(node).token()).unwrap();
    Kinds {
        node,
        expr,
        module,
        block,
        decl,
        use_prelude,
        reference,
        lit,
        ident,
    }
}

fn parse_lit(analysis: &mut Analysis, call: &ExternalCall<'_>) -> Result<Value, PropertyError> {
    let text = analysis.tree().get(call.node())?.text;
    analysis
        .symbols()
        .lookup(text)
        .parse::<i64>()
        .map(Value::Int)
        .map_err(|err| PropertyError::raised(err.to_string()))
}

/// The language definition, not yet built.
pub fn mini_builder() -> (LanguageBuilder, Kinds, Props) {
    let mut b = LanguageBuilder::default();
    let k = declare_kinds(&mut b);
    let factor = b.dynamic_var("factor", ValueType::Int).unwrap();
    let verbose = b.dynamic_var("verbose", ValueType::Bool).unwrap();

    let eval = b
        .property(
            PropertyDecl::new(k.expr, "eval")
                .returns(ValueType::Int)
                .public()
                .abstract_property(),
        )
        .unwrap();
    b.property(PropertyDecl::new(k.lit, "eval").returns(ValueType::Int).external(parse_lit))
        .unwrap();
    let target = Expr::Cast {
        value: Box::new(Expr::env_get_first(
            Expr::node_env(Expr::SelfEntity),
            name_of(Expr::SelfEntity),
        )),
        kind: k.decl,
        or_raise: true,
    };
    b.property(
        PropertyDecl::new(k.reference, "eval")
            .returns(ValueType::Int)
            .body(Expr::call(Expr::child(target, 1), eval, Vec::new())),
    )
    .unwrap();

    let is_decl = b
        .property(
            PropertyDecl::new(k.node, "is_decl")
                .returns(ValueType::Bool)
                .body(Expr::lit(false)),
        )
        .unwrap();
    b.property(
        PropertyDecl::new(k.decl, "is_decl")
            .returns(ValueType::Bool)
            .body(Expr::lit(true)),
    )
    .unwrap();

    let var = Expr::logic_var(Expr::SelfEntity, 0);
    let candidates = Expr::env_get(Expr::node_env(Expr::SelfEntity), name_of(Expr::SelfEntity));
    let resolve = b
        .property(
            PropertyDecl::new(k.reference, "resolve")
                .returns(ValueType::Entity(k.decl))
                .public()
                .memoized()
                .body(Expr::if_else(
                    Expr::solve(Expr::All(vec![
                        Expr::domain(var.clone(), candidates),
                        Expr::predicate(var.clone(), is_decl),
                    ])),
                    Expr::logic_value(var),
                    Expr::Lit(Value::Null),
                )),
        )
        .unwrap();

    let scaled = b
        .property(
            PropertyDecl::new(k.reference, "scaled")
                .returns(ValueType::Int)
                .public()
                .memoized()
                .dynamic_vars([factor])
                .body(Expr::binary(
                    BinaryOp::Mul,
                    Expr::self_call(eval),
                    Expr::DynVar(factor),
                )),
        )
        .unwrap();

    b.env_spec(k.block, EnvSpec::new().add_env()).unwrap();
    b.env_spec(k.decl, EnvSpec::new().add_to_env(name_of(Expr::SelfEntity)))
        .unwrap();
    let prelude = b.intern("prelude");
    b.env_spec(k.use_prelude, EnvSpec::new().reference_unit(prelude))
        .unwrap();

    let p = Props {
        eval,
        is_decl,
        resolve,
        scaled,
        factor,
        verbose,
    };
    (b, k, p)
}

pub fn mini() -> Mini {
    let (b, k, p) = mini_builder();
    Mini {
        lang: Rc::new(b.build().unwrap()),
        k,
        p,
    }
}

impl Mini {
    pub fn context(&self) -> AnalysisContext {
        AnalysisContext::new(Rc::clone(&self.lang), AnalysisConfig::unlimited())
    }
}

pub fn decl(
    a: &mut Analysis,
    unit: UnitId,
    k: Kinds,
    name: &str,
    value: &str,
) -> Result<NodeId, NodeBuildError> {
    let ident = a.new_token(unit, k.ident, name)?;
    let lit = a.new_token(unit, k.lit, value)?;
    a.new_node(unit, k.decl, vec![ident, lit])
}

pub fn reference(
    a: &mut Analysis,
    unit: UnitId,
    k: Kinds,
    name: &str,
) -> Result<NodeId, NodeBuildError> {
    let ident = a.new_token(unit, k.ident, name)?;
    a.new_node(unit, k.reference, vec![ident])
}

pub fn use_prelude(a: &mut Analysis, unit: UnitId, k: Kinds) -> Result<NodeId, NodeBuildError> {
    a.new_node(unit, k.use_prelude, Vec::new())
}

/// A prelude unit declaring `decls` at top level.
pub fn prelude(k: Kinds, decls: &'static [(&'static str, &'static str)]) -> impl UnitProvider {
    move |a: &mut Analysis, unit: UnitId| -> Result<NodeId, NodeBuildError> {
        let mut children = Vec::with_capacity(decls.len());
        for (name, value) in decls {
            children.push(decl(a, unit, k, name, value)?);
        }
        a.new_node(unit, k.module, children)
    }
}
