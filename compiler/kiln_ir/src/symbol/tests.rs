use super::*;

#[test]
fn intern_and_lookup() {
    let table = SymbolTable::new();

    let x = table.intern("x");
    let y = table.intern("y");
    let x2 = table.intern("x");

    assert_eq!(x, x2);
    assert_ne!(x, y);
    assert_eq!(table.lookup(x), "x");
    assert_eq!(table.lookup(y), "y");
}

#[test]
fn empty_string_is_null_symbol() {
    let table = SymbolTable::new();
    assert_eq!(table.intern(""), Symbol::EMPTY);
    assert!(Symbol::EMPTY.is_empty());
    assert!(table.is_empty());
}

#[test]
fn canonicalizer_folds_case() {
    fn fold(text: &str) -> Cow<'_, str> {
        if text.chars().any(char::is_uppercase) {
            Cow::Owned(text.to_lowercase())
        } else {
            Cow::Borrowed(text)
        }
    }

    let table = SymbolTable::with_canonicalizer(fold);
    let upper = table.intern("Foo");
    let lower = table.intern("foo");

    assert_eq!(upper, lower);
    assert_eq!(table.lookup(upper), "foo");
}

#[test]
fn shared_symbols_see_same_table() {
    let shared = SharedSymbols::default();
    let clone = shared.clone();

    assert_eq!(shared.intern("shared"), clone.intern("shared"));
    assert_eq!(clone.len(), 2);
}

#[test]
fn unknown_symbol_resolves_to_empty_text() {
    let table = SymbolTable::new();
    assert_eq!(table.lookup(Symbol(42)), "");
}
