//! The host-facing analysis session.

use std::rc::Rc;

use kiln_diagnostic::DiagnosticBag;
use kiln_ir::{EnvId, NodeId, UnitId};
use kiln_sema::{Analysis, DynVars, Language, PropertyError, PropertyErrorKind, Value};

use crate::registry::{UnitProvider, UnitRegistry};
use crate::{init_tracing, AnalysisConfig, AnalysisError};

/// One analysis session: an [`Analysis`] wired to a registry of unit
/// providers, with public-property entry points.
///
/// # Example
///
/// ```ignore
/// let mut ctx = AnalysisContext::new(lang, AnalysisConfig::default());
/// ctx.register_unit("prelude", build_prelude);
/// let main = ctx.analysis_mut().new_unit("main");
/// // build nodes, then:
/// ctx.populate(main, root)?;
/// let value = ctx.call_public(node, "resolve", &[], &DynVars::new())?;
/// ```
pub struct AnalysisContext {
    analysis: Analysis,
    registry: UnitRegistry,
    config: AnalysisConfig,
}

impl AnalysisContext {
    pub fn new(lang: Rc<Language>, config: AnalysisConfig) -> Self {
        if let Some(format) = config.trace {
            init_tracing(format);
        }
        let mut analysis =
            Analysis::with_config(lang, config.eval_config(), config.diagnostics.clone());
        let registry = UnitRegistry::default();
        analysis.set_loader(Box::new(registry.clone()));
        AnalysisContext {
            analysis,
            registry,
            config,
        }
    }

    pub fn language(&self) -> &Rc<Language> {
        self.analysis.language()
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    pub fn analysis_mut(&mut self) -> &mut Analysis {
        &mut self.analysis
    }

    pub fn diagnostics(&self) -> &DiagnosticBag {
        self.analysis.diagnostics()
    }

    pub fn has_errors(&self) -> bool {
        self.analysis.diagnostics().has_errors()
    }

    /// Register the provider building unit `name`, replacing an earlier one.
    pub fn register_unit(&mut self, name: &str, provider: impl UnitProvider + 'static) {
        let symbol = self.analysis.intern(name);
        if self.registry.register(symbol, Rc::new(provider)) {
            tracing::debug!(unit = name, "unit provider replaced");
        }
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.registry.contains(self.analysis.intern(name))
    }

    /// Find unit `name`, building and populating it first if needed.
    pub fn load_unit(&mut self, name: &str) -> Result<UnitId, AnalysisError> {
        let symbol = self.analysis.intern(name);
        Ok(self.analysis.load_unit(symbol)?)
    }

    /// Top-level environment of unit `name`, if it is populated.
    pub fn unit_env(&self, name: &str) -> Option<EnvId> {
        let unit = self.analysis.unit_by_name(self.analysis.intern(name))?;
        self.analysis.unit_env(unit)
    }

    /// Make `root` the root of `unit` and populate its environments.
    pub fn populate(&mut self, unit: UnitId, root: NodeId) -> Result<(), AnalysisError> {
        self.analysis.set_root(unit, root)?;
        self.analysis.populate(root)?;
        Ok(())
    }

    /// Call the public property `name` on `node`.
    ///
    /// Private properties are internal to the language and fail with
    /// [`PropertyErrorKind::PrivateProperty`].
    #[tracing::instrument(level = "debug", skip(self, args, dynvars))]
    pub fn call_public(
        &mut self,
        node: NodeId,
        name: &str,
        args: &[Value],
        dynvars: &DynVars,
    ) -> Result<Value, AnalysisError> {
        let prop = {
            let kind = self.analysis.tree().get(node)?.kind;
            let lang = self.analysis.language();
            let Some(prop) = lang.property_by_name(kind, name) else {
                let kind = lang.kind(kind).map_or_else(|| kind.to_string(), |k| k.name.clone());
                return Err(PropertyError::new(PropertyErrorKind::Dispatch {
                    kind,
                    prop: name.to_owned(),
                })
                .into());
            };
            if !lang.property(prop).is_some_and(|info| info.public) {
                return Err(PropertyError::new(PropertyErrorKind::PrivateProperty(name.to_owned()))
                    .at(node, prop)
                    .into());
            }
            prop
        };
        Ok(self.analysis.call(node, prop, args, dynvars)?)
    }
}

impl std::fmt::Debug for AnalysisContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisContext")
            .field("analysis", &self.analysis)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
