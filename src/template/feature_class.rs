//! Feature classes group features and define how they are interpreted.
//!
//! A class may inherit from another class. Inheritance is resolved once at
//! load time: `meta` entries are merged from the root down (children
//! override), while `interpretation`, `min_width` and `min_height` come from
//! the nearest class in the chain that declares them.

use crate::context::Context;
use crate::interpretation::{InterpretationDescription, InterpretationMethod};
use crate::template::description::{Declarations, FeatureClassDescription};
use crate::template::region::Feature;
use crate::util::{ErrorKind, OfficialEyeError, OfficialEyeResult};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// A fully resolved feature class.
#[derive(Debug)]
pub struct FeatureClass {
    identifier: String,
    parent: Option<String>,
    is_abstract: bool,
    meta: Map<String, Value>,
    interpretation: Option<Arc<dyn InterpretationMethod>>,
    min_width: Option<usize>,
    min_height: Option<usize>,
}

impl FeatureClass {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Merged metadata of the class and its ancestors.
    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    /// Interpretation method, if the class or an ancestor declares one.
    pub fn interpretation(&self) -> Option<&Arc<dyn InterpretationMethod>> {
        self.interpretation.as_ref()
    }

    fn check(&self, template_id: &str, feature: &Feature) -> OfficialEyeResult<()> {
        let fail = |problem: String| {
            OfficialEyeError::new(
                ErrorKind::InvalidFeature,
                format!(
                    "while validating feature '{}' of template '{template_id}'",
                    feature.identifier()
                ),
                problem,
            )
        };
        if self.is_abstract {
            return Err(fail(format!(
                "the feature class '{}' is abstract and cannot be used by a feature",
                self.identifier
            )));
        }
        let region = feature.region();
        if let Some(min) = self.min_width.filter(|&min| region.w() < min) {
            return Err(fail(format!(
                "the feature is {} pixels wide, class '{}' requires at least {min}",
                region.w(),
                self.identifier
            )));
        }
        if let Some(min) = self.min_height.filter(|&min| region.h() < min) {
            return Err(fail(format!(
                "the feature is {} pixels high, class '{}' requires at least {min}",
                region.h(),
                self.identifier
            )));
        }
        Ok(())
    }
}

/// All feature classes of one template.
#[derive(Debug, Default)]
pub struct FeatureClassManager {
    classes: Vec<FeatureClass>,
}

impl FeatureClassManager {
    /// Resolves inheritance and instantiates interpretation methods.
    pub fn load(
        ctx: &Context,
        template_id: &str,
        declarations: &Declarations<FeatureClassDescription>,
    ) -> OfficialEyeResult<Self> {
        let mut seen = HashSet::new();
        for (id, _) in declarations {
            if !seen.insert(id.as_str()) {
                return Err(OfficialEyeError::new(
                    ErrorKind::InvalidFeatureClass,
                    format!("while loading feature class '{id}' of template '{template_id}'"),
                    format!("There is already a feature class with the identifier '{id}'."),
                ));
            }
        }

        let mut classes = Vec::with_capacity(declarations.len());
        for (id, desc) in declarations {
            let chain = Self::chain(template_id, id, declarations)?;
            classes.push(Self::resolve(ctx, template_id, id, desc, &chain)?);
        }
        Ok(Self { classes })
    }

    /// Returns the inheritance chain of `id`, from the class itself up to
    /// the root.
    fn chain<'a>(
        template_id: &str,
        id: &str,
        declarations: &'a Declarations<FeatureClassDescription>,
    ) -> OfficialEyeResult<Vec<&'a FeatureClassDescription>> {
        let lookup = |class_id: &str| {
            declarations
                .iter()
                .find(|(candidate, _)| candidate == class_id)
                .map(|(_, desc)| desc)
        };
        let fail = |problem: String| {
            OfficialEyeError::new(
                ErrorKind::InvalidFeatureClass,
                format!("while resolving feature class '{id}' of template '{template_id}'"),
                problem,
            )
        };

        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = id.to_string();
        loop {
            if !visited.insert(current.clone()) {
                return Err(fail(format!(
                    "the inheritance chain loops back to '{current}'"
                )));
            }
            let desc = lookup(&current)
                .ok_or_else(|| fail(format!("the parent class '{current}' is not declared")))?;
            chain.push(desc);
            match &desc.inherits {
                Some(parent) => current = parent.clone(),
                None => break,
            }
        }
        Ok(chain)
    }

    fn resolve(
        ctx: &Context,
        template_id: &str,
        id: &str,
        desc: &FeatureClassDescription,
        chain: &[&FeatureClassDescription],
    ) -> OfficialEyeResult<FeatureClass> {
        let mut meta = Map::new();
        for ancestor in chain.iter().rev() {
            for (key, value) in &ancestor.meta {
                meta.insert(key.clone(), value.clone());
            }
        }

        let interpretation: Option<&InterpretationDescription> =
            chain.iter().find_map(|c| c.interpretation.as_ref());
        let interpretation = match interpretation {
            Some(d) => Some(ctx.interpretation_method(&d.method, &d.config).map_err(|err| {
                OfficialEyeError::new(
                    err.kind(),
                    format!("while loading feature class '{id}' of template '{template_id}'"),
                    format!("{} {}", err.while_text(), err.problem()),
                )
                .with_cause(err)
            })?),
            None => None,
        };

        Ok(FeatureClass {
            identifier: id.to_string(),
            parent: desc.inherits.clone(),
            is_abstract: desc.is_abstract,
            meta,
            interpretation,
            min_width: chain.iter().find_map(|c| c.min_width),
            min_height: chain.iter().find_map(|c| c.min_height),
        })
    }

    /// Looks a class up by identifier.
    pub fn get(&self, id: &str) -> Option<&FeatureClass> {
        self.classes.iter().find(|c| c.identifier == id)
    }

    /// Iterates classes in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &FeatureClass> {
        self.classes.iter()
    }

    /// Checks that every feature references a usable class it conforms to.
    pub fn validate<'a>(
        &self,
        template_id: &str,
        features: impl IntoIterator<Item = &'a Feature>,
    ) -> OfficialEyeResult<()> {
        for feature in features {
            let class = self.get(feature.feature_class()).ok_or_else(|| {
                OfficialEyeError::new(
                    ErrorKind::InvalidFeature,
                    format!(
                        "while validating feature '{}' of template '{template_id}'",
                        feature.identifier()
                    ),
                    format!(
                        "The feature class '{}' is not declared.",
                        feature.feature_class()
                    ),
                )
            })?;
            class.check(template_id, feature)?;
        }
        Ok(())
    }
}
