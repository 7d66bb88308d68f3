//! Index handles into the runtime's arenas.
//!
//! All handles are `u32` newtypes. They are only meaningful for the arena
//! (tree, environment store, language) that produced them.

use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub const fn from_raw(raw: u32) -> Self {
                $name(raw)
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            /// Handle for the next slot of an arena currently holding `len` items.
            ///
            /// # Panics
            /// Panics if the arena outgrows `u32` indices.
            #[inline]
            pub fn from_len(len: usize) -> Self {
                $name(u32::try_from(len).unwrap_or_else(|_| {
                    panic!(concat!(stringify!($name), " arena exceeded u32 capacity"))
                }))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// AST node handle.
    NodeId,
    "node#"
);
define_id!(
    /// Node kind handle in a language definition.
    KindId,
    "kind#"
);
define_id!(
    /// Lexical environment handle.
    EnvId,
    "env#"
);
define_id!(
    /// Analysis unit handle.
    UnitId,
    "unit#"
);
define_id!(
    /// Logic (unification) variable handle.
    LogicVarId,
    "var#"
);
define_id!(
    /// Property handle in a language definition.
    PropertyId,
    "prop#"
);
define_id!(
    /// Dynamic variable handle in a language definition.
    DynVarId,
    "dynvar#"
);

impl EnvId {
    /// The permanently empty environment, slot 0 of every store.
    pub const EMPTY: EnvId = EnvId(0);
}
