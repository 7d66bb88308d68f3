//! Subscriber installation for debug output.

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Layout of trace output.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum TraceFormat {
    /// One line per event.
    #[default]
    Flat,
    /// Indented by span nesting, which follows property call chains.
    Tree,
}

/// Initialize tracing for debug output.
///
/// Safe to call multiple times; the first call decides the format.
/// Nothing is installed unless `RUST_LOG` is set, e.g.
/// `RUST_LOG=kiln_sema=debug`.
pub fn init_tracing(format: TraceFormat) {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_err() {
            return;
        }
        let filter = EnvFilter::from_default_env();
        // A host may already have installed its own subscriber.
        let _ = match format {
            TraceFormat::Flat => tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .try_init(),
            TraceFormat::Tree => tracing_subscriber::registry()
                .with(
                    tracing_tree::HierarchicalLayer::new(2)
                        .with_targets(true)
                        .with_bracketed_fields(true),
                )
                .with(filter)
                .try_init(),
        };
    });
}
