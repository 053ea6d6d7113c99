//! Gemini `generateContent` over REST, through either AI Studio (API key)
//! or Vertex AI (project, region and an OAuth access token).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use fw_core::{Error, Result, TextGenerator};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const STUDIO_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

enum Endpoint {
    Studio { api_key: String },
    Vertex { url: String, access_token: String },
}

pub struct GeminiModel {
    key: String,
    model: String,
    client: Client,
    endpoint: Endpoint,
}

impl fmt::Debug for GeminiModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.endpoint {
            Endpoint::Studio { .. } => "studio",
            Endpoint::Vertex { .. } => "vertex",
        };
        f.debug_struct("GeminiModel")
            .field("key", &self.key)
            .field("model", &self.model)
            .field("endpoint", &kind)
            .field("credentials", &"<redacted>")
            .finish()
    }
}

fn client() -> Result<Client> {
    Ok(Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

impl GeminiModel {
    pub fn studio(key: &str, model: &str, api_key: &str) -> Result<Self> {
        Ok(Self {
            key: key.to_string(),
            model: model.to_string(),
            client: client()?,
            endpoint: Endpoint::Studio {
                api_key: api_key.to_string(),
            },
        })
    }

    pub fn vertex(key: &str, model: &str, project: &str, region: &str, access_token: &str) -> Result<Self> {
        let url = format!(
            "https://{region}-aiplatform.googleapis.com/v1/projects/{project}/locations/{region}/publishers/google/models/{model}:generateContent",
            region = region,
            project = project,
            model = model
        );
        Ok(Self {
            key: key.to_string(),
            model: model.to_string(),
            client: client()?,
            endpoint: Endpoint::Vertex {
                url,
                access_token: access_token.to_string(),
            },
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Concatenated text of every candidate part, or why there is none.
fn response_text(model: &str, response: GenerateResponse) -> Result<String> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(Error::Inference(format!("query blocked for {}: {}", model, reason)));
    }

    let finish_reason = response
        .candidates
        .first()
        .and_then(|c| c.finish_reason.clone());
    let text: String = response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.text)
        .collect();

    if text.trim().is_empty() {
        return Err(Error::Inference(format!(
            "{} returned an empty response (finish reason: {})",
            model,
            finish_reason.as_deref().unwrap_or("unknown")
        )));
    }
    Ok(text)
}

#[async_trait]
impl TextGenerator for GeminiModel {
    fn name(&self) -> &str {
        &self.key
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let request = match &self.endpoint {
            Endpoint::Studio { api_key } => self
                .client
                .post(format!("{}/models/{}:generateContent", STUDIO_BASE, self.model))
                .query(&[("key", api_key.as_str())]),
            Endpoint::Vertex { url, access_token } => self.client.post(url).bearer_auth(access_token),
        };

        debug!(model = %self.model, key = %self.key, "Sending generateContent request");
        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("{} request failed: {}", self.key, e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "{} returned HTTP {}: {}",
                self.key,
                status.as_u16(),
                detail.chars().take(300).collect::<String>()
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("{} sent an unreadable response: {}", self.key, e.without_url())))?;
        response_text(&self.model, parsed)
    }
}
