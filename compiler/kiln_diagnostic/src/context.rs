//! Context stack for definition-time diagnostics.
//!
//! Each frame says what is being defined and where. When a diagnostic is
//! about to be reported, the stack is folded into a structured context:
//! frames without a location are dropped and, per category, only the
//! innermost (most specific) frame is kept.

use kiln_ir::SourceLocation;
use rustc_hash::FxHashSet;

/// One frame of definition context.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContextFrame {
    pub message: String,
    pub location: Option<SourceLocation>,
    /// Frames sharing a category shadow each other; `None` never shadows.
    pub category: Option<&'static str>,
}

/// Explicit stack of context frames, owned by one definition job.
#[derive(Clone, Debug, Default)]
pub struct ContextStack {
    frames: Vec<ContextFrame>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        message: impl Into<String>,
        location: Option<SourceLocation>,
        category: Option<&'static str>,
    ) {
        self.frames.push(ContextFrame {
            message: message.into(),
            location,
            category,
        });
    }

    pub fn pop(&mut self) -> Option<ContextFrame> {
        self.frames.pop()
    }

    /// Run `f` with a frame pushed, popping it afterwards.
    pub fn with<R>(
        &mut self,
        message: impl Into<String>,
        location: Option<SourceLocation>,
        category: Option<&'static str>,
        f: impl FnOnce(&mut ContextStack) -> R,
    ) -> R {
        let depth = self.frames.len();
        self.push(message, location, category);
        let result = f(self);
        self.frames.truncate(depth);
        result
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Located frames, innermost first, one per category.
    pub fn structured(&self) -> Vec<(String, SourceLocation)> {
        let mut seen = FxHashSet::default();
        self.frames
            .iter()
            .rev()
            .filter_map(|frame| {
                let location = frame.location?;
                match frame.category {
                    Some(category) if !seen.insert(category) => None,
                    _ => Some((frame.message.clone(), location)),
                }
            })
            .collect()
    }

    /// Innermost located frame.
    pub fn location(&self) -> Option<SourceLocation> {
        self.frames.iter().rev().find_map(|frame| frame.location)
    }
}
