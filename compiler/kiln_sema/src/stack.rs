//! Stack growth for recursive population and evaluation.
//!
//! Property calls recurse through environment lookups and other property
//! calls, and population recurses over the tree, so both run under
//! [`ensure_sufficient_stack`].

/// Run `f`, growing the stack first if it is close to exhausted.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    /// Grow when less than this remains.
    const RED_ZONE: usize = 100 * 1024;

    /// Size of each new stack segment.
    const STACK_PER_RECURSION: usize = 1024 * 1024;

    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// WASM manages its own stack.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
