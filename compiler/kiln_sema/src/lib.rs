//! Kiln semantic analysis runtime.
//!
//! Three tightly coupled engines over one AST:
//! - **Lexical environments** ([`env`]): scopes populated once per node
//!   from declarative env specs, with lazily resolved referenced
//!   environments and rebinding-aware lookup
//! - **Property evaluation** ([`eval`]): dispatch on the runtime node kind,
//!   explicit dynamic variable threading and memoization
//! - **Equation solving**: name resolution phrased as `kiln_logic`
//!   equations whose predicates are property calls
//!
//! A [`Language`] is defined once with a [`LanguageBuilder`], which checks
//! the whole property graph before anything runs. An [`Analysis`] then
//! holds the tree, environments, memo table and diagnostics of one
//! session.
//!
//! # Example
//!
//! ```ignore
//! let mut builder = LanguageBuilder::new(symbols);
//! let decl = builder.kind(KindDecl::new("Decl").fields(["name"]))?;
//! let name = Expr::text(Expr::child(Expr::SelfEntity, 0));
//! builder.env_spec(decl, EnvSpec::new().add_to_env(name))?;
//! let lang = Rc::new(builder.build()?);
//!
//! let mut analysis = Analysis::new(lang);
//! // build nodes, set the unit root, then:
//! analysis.populate(root)?;
//! ```

pub mod env;
pub mod eval;
mod expr;
pub mod language;
mod stack;
mod value;

pub use env::{EnvAction, EnvSpec, LexicalEnvs, RefTransform};
pub use eval::{
    Analysis, DynVars, EvalConfig, ExternalCall, MemoStats, NodeBuildError, PopulateError,
    PropertyError, PropertyErrorKind, UnitLoader,
};
pub use expr::{BinaryOp, Expr, MatchArm};
pub use language::{
    Body, Dispatch, EquationBuilder, KindDecl, KindInfo, Language, LanguageBuilder, MetadataDecl,
    PropertyDecl, PropertyDescription, PropertyInfo,
};
pub use stack::ensure_sufficient_stack;
pub use value::{EnvValue, EquationValue, Value, ValueType};
