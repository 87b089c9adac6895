//! Explicit registration of launchable modules.
//!
//! Modules are registered once at startup by id and constructor. Launching
//! consults the [`LicenseGate`], so an unlicensed module is never built.

use crate::gate::LicenseGate;
use fos_types::{ErrorKind, TrustFailure, TrustResult};
use std::collections::BTreeMap;
use tracing::{debug, warn};

type Factory<M> = Box<dyn Fn() -> M + Send + Sync>;

/// One registered module.
pub struct ModuleDescriptor<M> {
    pub id: String,
    pub name: String,
    /// Feature that must also be enabled, on top of the module itself.
    pub required_feature: Option<String>,
    factory: Factory<M>,
}

impl<M> ModuleDescriptor<M> {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        factory: impl Fn() -> M + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            required_feature: None,
            factory: Box::new(factory),
        }
    }

    #[must_use]
    pub fn requires_feature(mut self, feature: impl Into<String>) -> Self {
        self.required_feature = Some(feature.into());
        self
    }

    fn feature_enabled(&self, gate: &LicenseGate) -> bool {
        self.required_feature
            .as_deref()
            .is_none_or(|feature| gate.is_feature_enabled(feature))
    }
}

/// Builder for [`ModuleRegistry`].
pub struct ModuleRegistryBuilder<M> {
    modules: BTreeMap<String, ModuleDescriptor<M>>,
}

impl<M> ModuleRegistryBuilder<M> {
    /// Adds a module. A later registration with the same id replaces the
    /// earlier one.
    #[must_use]
    pub fn register(mut self, descriptor: ModuleDescriptor<M>) -> Self {
        if let Some(previous) = self.modules.insert(descriptor.id.clone(), descriptor) {
            warn!(module_id = %previous.id, "Module registered twice, keeping the later one");
        }
        self
    }

    #[must_use]
    pub fn build(self) -> ModuleRegistry<M> {
        debug!(modules = self.modules.len(), "Module registry built");
        ModuleRegistry {
            modules: self.modules,
        }
    }
}

/// Every module the application can launch, keyed by id.
pub struct ModuleRegistry<M> {
    modules: BTreeMap<String, ModuleDescriptor<M>>,
}

impl<M> ModuleRegistry<M> {
    #[must_use]
    pub fn builder() -> ModuleRegistryBuilder<M> {
        ModuleRegistryBuilder {
            modules: BTreeMap::new(),
        }
    }

    /// Constructs module `id` if the gate authorizes it. The decision is audited.
    ///
    /// # Errors
    ///
    /// `ModuleNotLicensed` if the module is unknown, not licensed, or its
    /// required feature is disabled.
    pub fn launch(&self, id: &str, gate: &LicenseGate) -> TrustResult<M> {
        let Some(descriptor) = self.modules.get(id) else {
            return Err(
                TrustFailure::new(ErrorKind::ModuleNotLicensed, "module is not registered")
                    .with_detail("moduleId", id),
            );
        };
        gate.authorize_module(id)?;
        if !descriptor.feature_enabled(gate) {
            return Err(
                TrustFailure::new(ErrorKind::ModuleNotLicensed, "required feature is not enabled")
                    .with_detail("moduleId", id)
                    .with_detail("feature", descriptor.required_feature.clone().unwrap_or_default()),
            );
        }
        debug!(module_id = id, "Launching module");
        Ok((descriptor.factory)())
    }

    /// Ids of the modules the gate currently allows, in id order.
    #[must_use]
    pub fn launchable(&self, gate: &LicenseGate) -> Vec<&str> {
        self.modules
            .values()
            .filter(|d| gate.is_module_licensed(&d.id) && d.feature_enabled(gate))
            .map(|d| d.id.as_str())
            .collect()
    }

    pub fn descriptor(&self, id: &str) -> Option<&ModuleDescriptor<M>> {
        self.modules.get(id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
