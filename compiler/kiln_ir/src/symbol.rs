//! Interned symbols for environment keys and token text.
//!
//! Symbols are compact 32-bit handles. Equality is O(1), which matters
//! because every environment lookup is keyed by a symbol.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Interned identifier.
///
/// `Symbol::EMPTY` is the null symbol. It is pre-interned at index 0 and is
/// never a valid environment key.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
#[repr(transparent)]
pub struct Symbol(u32);

impl Symbol {
    /// The null/empty symbol.
    pub const EMPTY: Symbol = Symbol(0);

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

/// Error when interning a symbol fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// More than `u32::MAX` distinct symbols.
    #[error("symbol table exceeded capacity: {count} symbols")]
    Overflow { count: usize },
}

/// Function applied to symbol text before interning.
///
/// Languages with case-insensitive identifiers install a case-folding
/// canonicalizer so that `Foo` and `foo` intern to the same symbol.
pub type Canonicalizer = fn(&str) -> Cow<'_, str>;

struct SymbolStore {
    map: FxHashMap<&'static str, u32>,
    strings: Vec<&'static str>,
}

/// Symbol table with interior locking.
///
/// Strings are leaked on first interning so lookups can hand out
/// `&'static str` without holding the lock.
pub struct SymbolTable {
    store: RwLock<SymbolStore>,
    canonicalizer: Option<Canonicalizer>,
}

impl SymbolTable {
    /// Create a table that interns text as-is.
    pub fn new() -> Self {
        let empty: &'static str = "";
        let mut map = FxHashMap::default();
        map.insert(empty, 0);
        SymbolTable {
            store: RwLock::new(SymbolStore {
                map,
                strings: vec![empty],
            }),
            canonicalizer: None,
        }
    }

    /// Create a table that canonicalizes text before interning.
    pub fn with_canonicalizer(canonicalizer: Canonicalizer) -> Self {
        SymbolTable {
            canonicalizer: Some(canonicalizer),
            ..Self::new()
        }
    }

    /// Try to intern `text`, returning an error on overflow.
    pub fn try_intern(&self, text: &str) -> Result<Symbol, SymbolError> {
        let canonical = match self.canonicalizer {
            Some(canonicalize) => canonicalize(text),
            None => Cow::Borrowed(text),
        };
        let text = canonical.as_ref();

        if let Some(&idx) = self.store.read().map.get(text) {
            return Ok(Symbol(idx));
        }

        let mut store = self.store.write();
        // Another writer may have won the race between the two locks.
        if let Some(&idx) = store.map.get(text) {
            return Ok(Symbol(idx));
        }

        let idx = u32::try_from(store.strings.len()).map_err(|_| SymbolError::Overflow {
            count: store.strings.len(),
        })?;
        let leaked: &'static str = Box::leak(text.to_owned().into_boxed_str());
        store.strings.push(leaked);
        store.map.insert(leaked, idx);
        Ok(Symbol(idx))
    }

    /// Intern `text`.
    ///
    /// # Panics
    /// Panics if the table exceeds `u32::MAX` symbols. Use `try_intern` for
    /// fallible interning.
    pub fn intern(&self, text: &str) -> Symbol {
        self.try_intern(text).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Look up the text of a symbol. Unknown symbols resolve to `""`.
    pub fn lookup(&self, symbol: Symbol) -> &'static str {
        self.store
            .read()
            .strings
            .get(symbol.0 as usize)
            .copied()
            .unwrap_or("")
    }

    /// Number of interned symbols, including the empty symbol.
    pub fn len(&self) -> usize {
        self.store.read().strings.len()
    }

    /// Whether only the empty symbol is interned.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolTable")
            .field("len", &self.len())
            .field("canonicalizing", &self.canonicalizer.is_some())
            .finish()
    }
}

/// Symbol table shared between the language definition and analysis
/// contexts.
#[derive(Clone, Debug, Default)]
pub struct SharedSymbols(Arc<SymbolTable>);

impl SharedSymbols {
    pub fn new(table: SymbolTable) -> Self {
        SharedSymbols(Arc::new(table))
    }
}

impl std::ops::Deref for SharedSymbols {
    type Target = SymbolTable;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests;
