use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use rerender_contracts::models::{
    ModelSelection, ModelSelector, CAPABILITY_DECODE, CAPABILITY_EDIT, CAPABILITY_GENERATE,
};
use tracing::{info, warn};

use crate::dryrun::DryrunService;
use crate::gemini::GeminiService;
use crate::service::StyleService;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_VARS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];

/// Collaborator settings. The credential is the only value read from the
/// environment; everything else is set by the caller.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub decode_model: Option<String>,
    pub image_model: Option<String>,
    pub request_timeout: Duration,
    pub transport_retries: usize,
    pub retry_backoff: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            decode_model: None,
            image_model: None,
            request_timeout: Duration::from_secs(120),
            transport_retries: 0,
            retry_backoff: Duration::from_millis(1200),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: api_key_from_env(),
            ..Self::default()
        }
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        let trimmed = api_base.trim().trim_end_matches('/');
        if !trimmed.is_empty() {
            self.api_base = trimmed.to_string();
        }
        self
    }

    pub fn with_models(mut self, decode_model: Option<String>, image_model: Option<String>) -> Self {
        self.decode_model = decode_model;
        self.image_model = image_model;
        self
    }

    pub fn with_request_timeout_secs(mut self, seconds: f64) -> Self {
        let seconds = if seconds.is_finite() { seconds } else { 120.0 };
        self.request_timeout = Duration::from_secs_f64(seconds.clamp(15.0, 600.0));
        self
    }

    pub fn with_transport_retries(mut self, retries: usize) -> Self {
        self.transport_retries = retries.min(4);
        self
    }
}

pub fn api_key_from_env() -> Option<String> {
    API_KEY_VARS.iter().find_map(|key| non_empty_env(key))
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Models chosen for each collaborator call, all from one provider.
#[derive(Debug, Clone)]
pub struct ResolvedModels {
    pub provider: String,
    pub decode: ModelSelection,
    pub generate: ModelSelection,
    pub edit: ModelSelection,
}

pub fn resolve_models(config: &ServiceConfig, selector: &ModelSelector) -> Result<ResolvedModels> {
    let requested_provider = |requested: Option<&str>| -> Option<String> {
        let name = requested.map(str::trim).filter(|value| !value.is_empty())?;
        selector
            .registry
            .get(name)
            .map(|model| model.provider.clone())
    };
    let image_provider = requested_provider(config.image_model.as_deref());
    let decode_provider = requested_provider(config.decode_model.as_deref());
    if let (Some(image), Some(decode)) = (&image_provider, &decode_provider) {
        if image != decode {
            bail!(
                "decode model provider '{decode}' does not match image model provider '{image}'"
            );
        }
    }

    let provider = match image_provider.or(decode_provider) {
        Some(provider) => provider,
        None => selector
            .select(None, CAPABILITY_GENERATE)
            .map_err(anyhow::Error::msg)?
            .model
            .provider,
    };

    let pick = |requested: Option<&str>, capability: &str| -> Result<ModelSelection> {
        let selection = selector
            .select_for_provider(requested, capability, &provider)
            .map_err(anyhow::Error::msg)?;
        if let Some(reason) = selection.fallback_reason.as_deref() {
            warn!(capability, model = %selection.model.name, "{reason}");
        }
        Ok(selection)
    };

    let decode = pick(config.decode_model.as_deref(), CAPABILITY_DECODE)?;
    let generate = pick(config.image_model.as_deref(), CAPABILITY_GENERATE)?;
    let edit = pick(config.image_model.as_deref(), CAPABILITY_EDIT)?;

    Ok(ResolvedModels {
        provider,
        decode,
        generate,
        edit,
    })
}

/// Picks the collaborator implementation for the resolved provider.
pub fn build_service(config: &ServiceConfig) -> Result<(Arc<dyn StyleService>, ResolvedModels)> {
    let resolved = resolve_models(config, &ModelSelector::new(None))?;
    info!(
        provider = %resolved.provider,
        decode_model = %resolved.decode.model.name,
        image_model = %resolved.generate.model.name,
        "collaborator selected"
    );
    let service: Arc<dyn StyleService> = match resolved.provider.as_str() {
        "gemini" => Arc::new(GeminiService::new(config.clone(), &resolved)?),
        "dryrun" => Arc::new(DryrunService::new(
            resolved.decode.model.name.clone(),
            resolved.generate.model.name.clone(),
        )),
        other => bail!("unsupported provider '{other}'"),
    };
    Ok((service, resolved))
}
