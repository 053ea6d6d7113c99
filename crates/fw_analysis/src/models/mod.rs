use std::sync::Arc;

use fw_core::{Error, Result, Settings, TextGenerator};
use tracing::{info, warn};

pub mod dummy;
pub mod gemini;

pub use dummy::DummyModel;
pub use gemini::GeminiModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// AI Studio, keyed by `GOOGLE_API_KEY`.
    Studio,
    /// Vertex AI, needs `GOOGLE_PROJECT_ID` and `GOOGLE_ACCESS_TOKEN`.
    Vertex,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    /// Name recorded on results.
    pub key: &'static str,
    pub kind: ModelKind,
    /// Model id sent to the API, when it differs from `key`.
    pub name_override: Option<&'static str>,
}

impl ModelSpec {
    pub fn model_name(&self) -> &'static str {
        self.name_override.unwrap_or(self.key)
    }
}

/// Tried in this order.
pub const GEMINI_MODELS: &[ModelSpec] = &[
    ModelSpec {
        key: "gemini-2.5-flash-exp",
        kind: ModelKind::Vertex,
        name_override: Some("gemini-2.5-flash-preview-04-17"),
    },
    ModelSpec {
        key: "gemini-2.5-flash-latest-studio",
        kind: ModelKind::Studio,
        name_override: Some("gemini-2.5-flash-preview-04-17"),
    },
    ModelSpec {
        key: "gemini-2.0-flash-latest-studio",
        kind: ModelKind::Studio,
        name_override: Some("gemini-2.0-flash-latest"),
    },
];

fn build(spec: &ModelSpec, settings: &Settings) -> Result<Option<Arc<dyn TextGenerator>>> {
    let model: Arc<dyn TextGenerator> = match spec.kind {
        ModelKind::Studio => match settings.google_api_key.as_deref() {
            Some(api_key) => Arc::new(GeminiModel::studio(spec.key, spec.model_name(), api_key)?),
            None => return Ok(None),
        },
        ModelKind::Vertex => match (
            settings.google_project_id.as_deref(),
            settings.google_access_token.as_deref(),
        ) {
            (Some(project), Some(token)) => Arc::new(GeminiModel::vertex(
                spec.key,
                spec.model_name(),
                project,
                &settings.google_region,
                token,
            )?),
            _ => return Ok(None),
        },
    };
    Ok(Some(model))
}

/// Every spec whose credentials are present, in order. Fails when none are.
pub fn create_models(specs: &[ModelSpec], settings: &Settings) -> Result<Vec<Arc<dyn TextGenerator>>> {
    let mut models = Vec::new();
    for spec in specs {
        match build(spec, settings)? {
            Some(model) => {
                info!(model = spec.key, "Configured LLM model");
                models.push(model);
            }
            None => warn!(model = spec.key, kind = ?spec.kind, "Credentials missing, skipping model"),
        }
    }
    if models.is_empty() {
        return Err(Error::Config(
            "no LLM model could be configured; set GOOGLE_API_KEY or GOOGLE_PROJECT_ID and GOOGLE_ACCESS_TOKEN"
                .to_string(),
        ));
    }
    Ok(models)
}

/// Ordered models; the first one that answers wins.
#[derive(Clone)]
pub struct FallbackChain {
    models: Vec<Arc<dyn TextGenerator>>,
}

impl FallbackChain {
    pub fn new(models: Vec<Arc<dyn TextGenerator>>) -> Self {
        Self { models }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(create_models(GEMINI_MODELS, settings)?))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Returns the answering model's name and its text.
    pub async fn generate(&self, prompt: &str) -> Result<(String, String)> {
        let mut failures = Vec::new();
        for model in &self.models {
            match model.generate(prompt).await {
                Ok(text) => {
                    info!(model = model.name(), "Query answered");
                    return Ok((model.name().to_string(), text));
                }
                Err(e) => {
                    warn!(model = model.name(), "Model failed, trying next: {}", e);
                    failures.push(format!("{}: {}", model.name(), e));
                }
            }
        }
        Err(Error::Inference(if failures.is_empty() {
            "no models configured".to_string()
        } else {
            format!("all models failed ({})", failures.join("; "))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let pairs: Vec<(String, String)> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|key| pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())).unwrap()
    }

    #[test]
    fn test_create_models_skips_missing_credentials() {
        let models = create_models(GEMINI_MODELS, &settings(&[("GOOGLE_API_KEY", "k")])).unwrap();
        let names: Vec<_> = models.iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names, vec!["gemini-2.5-flash-latest-studio", "gemini-2.0-flash-latest-studio"]);

        let models = create_models(
            GEMINI_MODELS,
            &settings(&[("GOOGLE_PROJECT_ID", "p"), ("GOOGLE_ACCESS_TOKEN", "t")]),
        )
        .unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name(), "gemini-2.5-flash-exp");

        assert!(matches!(create_models(GEMINI_MODELS, &settings(&[])), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_fallback_uses_first_success() {
        let chain = FallbackChain::new(vec![
            Arc::new(DummyModel::failing("primary", "quota exceeded")),
            Arc::new(DummyModel::answering("secondary", "ok")),
            Arc::new(DummyModel::answering("tertiary", "unused")),
        ]);
        let (model, text) = chain.generate("prompt").await.unwrap();
        assert_eq!(model, "secondary");
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn test_fallback_reports_every_failure() {
        let chain = FallbackChain::new(vec![
            Arc::new(DummyModel::failing("a", "quota")),
            Arc::new(DummyModel::failing("b", "auth")),
        ]);
        let err = chain.generate("prompt").await.unwrap_err().to_string();
        assert!(err.contains("a: ") && err.contains("b: "));
        assert!(FallbackChain::new(Vec::new()).generate("p").await.is_err());
    }
}
