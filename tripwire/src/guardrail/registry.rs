//! The per-stage catalog of registered checks.

use crate::error::RegistryError;

use super::{CheckSpec, Stage, input, output};

/// Ordered, per-stage collection of guardrail checks.
///
/// Order only affects diagnostic output; the pipeline verdict is an OR over
/// all checks and does not depend on it.
#[derive(Debug, Clone, Default)]
pub struct CheckRegistry {
    input: Vec<CheckSpec>,
    output: Vec<CheckSpec>,
}

impl CheckRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The canonical configuration: two input checks and seven output checks.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateCheck`] if the standard catalog
    /// contains a name twice within a stage.
    pub fn standard() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for check in input::standard() {
            registry.register(check, Stage::Input)?;
        }
        for check in output::standard() {
            registry.register(check, Stage::Output)?;
        }
        Ok(registry)
    }

    /// Add a check to the end of a stage.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateCheck`] if the stage already holds a
    /// check with the same name.
    pub fn register(&mut self, check: CheckSpec, stage: Stage) -> Result<(), RegistryError> {
        let checks = self.stage_mut(stage);
        if checks.iter().any(|c| c.name() == check.name()) {
            return Err(RegistryError::duplicate(stage, check.name()));
        }
        checks.push(check);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn with(mut self, check: CheckSpec, stage: Stage) -> Result<Self, RegistryError> {
        self.register(check, stage)?;
        Ok(self)
    }

    /// Checks registered for a stage, in registration order.
    #[must_use]
    pub fn list(&self, stage: Stage) -> &[CheckSpec] {
        match stage {
            Stage::Input => &self.input,
            Stage::Output => &self.output,
        }
    }

    /// Look up a check by stage and name.
    #[must_use]
    pub fn get(&self, stage: Stage, name: &str) -> Option<&CheckSpec> {
        self.list(stage).iter().find(|c| c.name() == name)
    }

    /// Total number of checks across both stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.input.len() + self.output.len()
    }

    /// Returns `true` if no checks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.input.is_empty() && self.output.is_empty()
    }

    /// A copy of this registry with the named checks removed from both stages.
    ///
    /// A name may be qualified with its stage (`output:verbosity`) to remove it
    /// from one stage only.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownCheck`] if a name matches no check.
    pub fn without<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, RegistryError> {
        let mut subset = self.clone();
        for name in names {
            let name = name.as_ref();
            let (stages, bare): (&[Stage], &str) = match name.split_once(':') {
                Some(("input", bare)) => (&[Stage::Input], bare),
                Some(("output", bare)) => (&[Stage::Output], bare),
                _ => (&Stage::ALL, name),
            };

            let mut removed = false;
            for &stage in stages {
                let checks = subset.stage_mut(stage);
                let before = checks.len();
                checks.retain(|c| c.name() != bare);
                removed |= checks.len() != before;
            }
            if !removed {
                return Err(RegistryError::UnknownCheck(name.to_owned()));
            }
        }
        Ok(subset)
    }

    fn stage_mut(&mut self, stage: Stage) -> &mut Vec<CheckSpec> {
        match stage {
            Stage::Input => &mut self.input,
            Stage::Output => &mut self.output,
        }
    }
}
