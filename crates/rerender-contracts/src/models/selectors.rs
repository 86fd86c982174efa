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
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        let (fallback_reason, requested_text) = if let Some(requested_value) = requested {
            if let Some(model) = self.registry.ensure(requested_value, capability) {
                return Ok(ModelSelection {
                    model,
                    requested: Some(requested_value.to_string()),
                    fallback_reason: None,
                });
            }
            (
                Some(format!(
                    "Requested model '{requested_value}' unavailable for capability '{capability}'."
                )),
                Some(requested_value.to_string()),
            )
        } else {
            (None, None)
        };

        let candidates = self.registry.by_capability(capability);
        let Some(model) = candidates.first().cloned() else {
            return Err(format!(
                "No models available for capability '{capability}'."
            ));
        };
        Ok(ModelSelection {
            model,
            requested: requested_text,
            fallback_reason,
        })
    }

    /// Like `select`, but restricted to one provider's models.
    pub fn select_for_provider(
        &self,
        requested: Option<&str>,
        capability: &str,
        provider: &str,
    ) -> Result<ModelSelection, String> {
        let selection = self.select(requested, capability)?;
        if selection.model.provider == provider {
            return Ok(selection);
        }
        let Some(model) = self
            .registry
            .by_capability(capability)
            .into_iter()
            .find(|model| model.provider == provider)
        else {
            return Err(format!(
                "No '{provider}' models available for capability '{capability}'."
            ));
        };
        let reason = match selection.requested.as_deref() {
            Some(requested) => format!(
                "Requested model '{requested}' is not a '{provider}' model for capability '{capability}'."
            ),
            None => format!("Using default '{provider}' model for capability '{capability}'."),
        };
        Ok(ModelSelection {
            model,
            requested: selection.requested,
            fallback_reason: Some(reason),
        })
    }
}
