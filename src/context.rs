//! Engine and template registry.
//!
//! A `Context` maps engine identifiers to factories for matchers,
//! supervisors, interpretation methods and mutators, and keeps every
//! template constructed against it. Engines are registered through
//! `&mut self` before the context is shared; templates register themselves
//! through `&self` at load time, after which the registry is only read.

use crate::interpretation::{CheckboxMethod, InterpretationMethod};
use crate::matching::{Matcher, ZnccMatcher};
use crate::mutator::{BinarizationMutator, BoxBlurMutator, InvertMutator, Mutator, RotateMutator};
use crate::supervision::{CombinatorialSupervisor, LeastSquaresSupervisor, Supervisor};
use crate::template::Template;
use crate::util::{ErrorKind, OfficialEyeError, OfficialEyeResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Builds a matcher from its engine options.
pub type MatcherFactory = Arc<dyn Fn(&Value) -> OfficialEyeResult<Box<dyn Matcher>> + Send + Sync>;
/// Builds a supervisor from its engine options.
pub type SupervisorFactory =
    Arc<dyn Fn(&Value) -> OfficialEyeResult<Box<dyn Supervisor>> + Send + Sync>;
/// Builds an interpretation method from its options.
pub type InterpretationFactory =
    Arc<dyn Fn(&Value) -> OfficialEyeResult<Arc<dyn InterpretationMethod>> + Send + Sync>;
/// Builds a mutator from its options.
pub type MutatorFactory = Arc<dyn Fn(&Value) -> OfficialEyeResult<Box<dyn Mutator>> + Send + Sync>;

fn unknown_engine(role: &str, id: &str) -> OfficialEyeError {
    OfficialEyeError::new(
        ErrorKind::InvalidIdentifier,
        format!("while resolving the '{id}' {role}"),
        format!("No {role} is registered under the identifier '{id}'."),
    )
}

/// Registry of engines and loaded templates.
pub struct Context {
    matchers: HashMap<String, MatcherFactory>,
    supervisors: HashMap<String, SupervisorFactory>,
    interpretations: HashMap<String, InterpretationFactory>,
    mutators: HashMap<String, MutatorFactory>,
    templates: RwLock<HashMap<String, Arc<Template>>>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates a context with every built-in engine registered.
    pub fn new() -> Self {
        let mut ctx = Self::empty();

        ctx.register_matcher(ZnccMatcher::ID, |cfg| {
            Ok(Box::new(ZnccMatcher::from_config(cfg)?) as Box<dyn Matcher>)
        });

        ctx.register_supervisor(LeastSquaresSupervisor::ID, |cfg| {
            Ok(Box::new(LeastSquaresSupervisor::from_config(cfg)?) as Box<dyn Supervisor>)
        });
        ctx.register_supervisor(CombinatorialSupervisor::ID, |cfg| {
            Ok(Box::new(CombinatorialSupervisor::from_config(cfg)?) as Box<dyn Supervisor>)
        });

        ctx.register_interpretation(CheckboxMethod::ID, |cfg| {
            Ok(Arc::new(CheckboxMethod::from_config(cfg)?) as Arc<dyn InterpretationMethod>)
        });
        #[cfg(feature = "image-io")]
        ctx.register_interpretation(crate::interpretation::FileMethod::ID, |cfg| {
            Ok(Arc::new(crate::interpretation::FileMethod::from_config(cfg)?)
                as Arc<dyn InterpretationMethod>)
        });
        #[cfg(feature = "tesseract")]
        ctx.register_interpretation(crate::interpretation::TesseractMethod::ID, |cfg| {
            Ok(Arc::new(crate::interpretation::TesseractMethod::from_config(cfg)?)
                as Arc<dyn InterpretationMethod>)
        });

        ctx.register_mutator(BinarizationMutator::ID, |cfg| {
            Ok(Box::new(BinarizationMutator::from_config(cfg)?) as Box<dyn Mutator>)
        });
        ctx.register_mutator(InvertMutator::ID, |cfg| {
            Ok(Box::new(InvertMutator::from_config(cfg)?) as Box<dyn Mutator>)
        });
        ctx.register_mutator(BoxBlurMutator::ID, |cfg| {
            Ok(Box::new(BoxBlurMutator::from_config(cfg)?) as Box<dyn Mutator>)
        });
        ctx.register_mutator(RotateMutator::ID, |cfg| {
            Ok(Box::new(RotateMutator::from_config(cfg)?) as Box<dyn Mutator>)
        });

        ctx
    }

    /// Creates a context without any engines.
    pub fn empty() -> Self {
        Self {
            matchers: HashMap::new(),
            supervisors: HashMap::new(),
            interpretations: HashMap::new(),
            mutators: HashMap::new(),
            templates: RwLock::new(HashMap::new()),
        }
    }

    /// Registers (or replaces) a matcher engine.
    pub fn register_matcher<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> OfficialEyeResult<Box<dyn Matcher>> + Send + Sync + 'static,
    {
        self.matchers.insert(id.into(), Arc::new(factory));
    }

    /// Registers (or replaces) a supervisor engine.
    pub fn register_supervisor<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> OfficialEyeResult<Box<dyn Supervisor>> + Send + Sync + 'static,
    {
        self.supervisors.insert(id.into(), Arc::new(factory));
    }

    /// Registers (or replaces) an interpretation method.
    pub fn register_interpretation<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> OfficialEyeResult<Arc<dyn InterpretationMethod>> + Send + Sync + 'static,
    {
        self.interpretations.insert(id.into(), Arc::new(factory));
    }

    /// Registers (or replaces) a mutator.
    pub fn register_mutator<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> OfficialEyeResult<Box<dyn Mutator>> + Send + Sync + 'static,
    {
        self.mutators.insert(id.into(), Arc::new(factory));
    }

    /// Instantiates the matcher registered as `id`.
    pub fn matcher(&self, id: &str, config: &Value) -> OfficialEyeResult<Box<dyn Matcher>> {
        let factory = self
            .matchers
            .get(id)
            .ok_or_else(|| unknown_engine("matcher", id))?;
        factory(config)
    }

    /// Instantiates the supervisor registered as `id`.
    pub fn supervisor(&self, id: &str, config: &Value) -> OfficialEyeResult<Box<dyn Supervisor>> {
        let factory = self
            .supervisors
            .get(id)
            .ok_or_else(|| unknown_engine("supervisor", id))?;
        factory(config)
    }

    /// Instantiates the interpretation method registered as `id`.
    pub fn interpretation_method(
        &self,
        id: &str,
        config: &Value,
    ) -> OfficialEyeResult<Arc<dyn InterpretationMethod>> {
        let factory = self
            .interpretations
            .get(id)
            .ok_or_else(|| unknown_engine("interpretation method", id))?;
        factory(config)
    }

    /// Instantiates the mutator registered as `id`.
    pub fn mutator(&self, id: &str, config: &Value) -> OfficialEyeResult<Box<dyn Mutator>> {
        let factory = self
            .mutators
            .get(id)
            .ok_or_else(|| unknown_engine("mutator", id))?;
        factory(config)
    }

    pub(crate) fn add_template(&self, template: Arc<Template>) -> OfficialEyeResult<()> {
        let mut templates = self
            .templates
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let id = template.identifier().to_string();
        if templates.contains_key(&id) {
            return Err(OfficialEyeError::new(
                ErrorKind::InvalidTemplate,
                format!("while registering template '{id}'"),
                format!("A template with the identifier '{id}' has already been loaded."),
            ));
        }
        templates.insert(id, template);
        Ok(())
    }

    /// Returns a registered template.
    pub fn template(&self, id: &str) -> Option<Arc<Template>> {
        self.templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Returns the identifiers of all registered templates, sorted.
    pub fn template_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}
