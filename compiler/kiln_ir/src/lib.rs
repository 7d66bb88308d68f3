//! Kiln IR - core data types for the semantic analysis runtime.
//!
//! This crate contains the data the runtime operates on:
//! - Symbols for environment keys and token text
//! - The AST arena built by the parser collaborator
//! - Entities: nodes paired with metadata and rebindings
//! - Definition-site locations used by diagnostics
//!
//! # Design Philosophy
//!
//! - **Intern Everything**: strings become `Symbol(u32)`
//! - **Flatten Everything**: nodes, envs and logic vars are `u32` handles
//!   into arenas, never boxed graphs

/// Compile-time assertion that a type has a specific size.
///
/// Used to prevent accidental size regressions in frequently-copied types.
#[macro_export]
macro_rules! static_assert_size {
    ($ty:ty, $size:expr) => {
        const _: [(); $size] = [(); ::std::mem::size_of::<$ty>()];
    };
}

mod entity;
mod ids;
mod location;
mod span;
mod symbol;
mod tree;

pub use entity::{Entity, EntityInfo, Metadata, Rebindings};
pub use ids::{DynVarId, EnvId, KindId, LogicVarId, NodeId, PropertyId, UnitId};
pub use location::SourceLocation;
pub use span::Span;
pub use symbol::{Canonicalizer, SharedSymbols, Symbol, SymbolError, SymbolTable};
pub use tree::{NewNode, Node, NodeEnvs, Tree, TreeError, Unit};

#[cfg(target_pointer_width = "64")]
mod size_asserts {
    use super::{EnvId, Metadata, NodeId, Span, Symbol};
    crate::static_assert_size!(Symbol, 4);
    crate::static_assert_size!(NodeId, 4);
    crate::static_assert_size!(EnvId, 4);
    crate::static_assert_size!(Metadata, 4);
    crate::static_assert_size!(Span, 8);
}
