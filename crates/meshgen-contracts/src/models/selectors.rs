use super::registry::{ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    pub fn select(
        &self,
        requested: Option<&str>,
        capability: &str,
    ) -> Result<ModelSelection, String> {
        self.select_among(requested, capability, |_| true)
    }

    /// Picks the requested model when it supports `capability` and its
    /// backend is `usable`; otherwise the first usable model in registry
    /// order, with the reason recorded.
    pub fn select_among(
        &self,
        requested: Option<&str>,
        capability: &str,
        usable: impl Fn(&ModelSpec) -> bool,
    ) -> Result<ModelSelection, String> {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        let fallback_reason = match requested {
            Some(name) => match self.registry.ensure(name, capability) {
                Some(model) if usable(&model) => {
                    return Ok(ModelSelection {
                        model,
                        requested: Some(name.to_string()),
                        fallback_reason: None,
                    });
                }
                Some(model) => format!(
                    "Requested model '{name}' needs backend '{}', which is not configured.",
                    model.backend
                ),
                None => format!(
                    "Requested model '{name}' unavailable for capability '{capability}'."
                ),
            },
            None => "No model specified; using default.".to_string(),
        };

        let model = self
            .registry
            .by_capability(capability)
            .into_iter()
            .find(|model| usable(model))
            .ok_or_else(|| format!("No models available for capability '{capability}'."))?;
        Ok(ModelSelection {
            model,
            requested: requested.map(str::to_string),
            fallback_reason: Some(fallback_reason),
        })
    }
}
