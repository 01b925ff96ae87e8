//! Gemini client implementing [`ReadingGenerator`].
//!
//! Transport goes through rig-core's Gemini provider; this module only adds
//! the response schema and decodes the JSON answer.

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::{CompletionError, CompletionModel};
use rig::message::AssistantContent;
use rig::providers::gemini;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::GenerationError;

use super::prompts::{extract_json_object, full_reading_prompt, teaser_prompt};
use super::{FullReading, ReadingGenerator, SeekerProfile, Teaser};

const PROVIDER: &str = "gemini";

/// Default REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Configuration for the Gemini client.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// `None` runs in fallback mode: every call fails fast.
    pub api_key: Option<SecretString>,
    pub model: String,
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Reading generator backed by a rig Gemini completion model.
pub struct GeminiGenerator {
    model: Option<gemini::completion::CompletionModel>,
    model_name: String,
}

impl GeminiGenerator {
    pub fn new(config: GeminiConfig) -> Result<Self, GenerationError> {
        let Some(api_key) = config.api_key.as_ref() else {
            warn!("Gemini API key is missing - readings will use fallback content");
            return Ok(Self {
                model: None,
                model_name: config.model,
            });
        };

        let client: rig::client::Client<gemini::client::GeminiExt> = gemini::Client::builder()
            .api_key(api_key.expose_secret())
            .base_url(&config.base_url)
            .build()
            .map_err(|e| GenerationError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to create Gemini client: {}", e),
            })?;

        let model = client.completion_model(&config.model);
        info!("Using Gemini (model: {})", config.model);
        Ok(Self {
            model: Some(model),
            model_name: config.model,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Send one prompt with a JSON response schema and decode the answer.
    async fn generate_json<T: DeserializeOwned>(
        &self,
        prompt: String,
        schema: Value,
    ) -> Result<T, GenerationError> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| GenerationError::NotConfigured {
                provider: PROVIDER.to_string(),
            })?;

        let response = model
            .completion_request(prompt)
            .additional_params(json!({
                "generationConfig": {
                    "responseMimeType": "application/json",
                    "responseSchema": schema,
                }
            }))
            .send()
            .await
            .map_err(completion_error)?;

        let text: String = response
            .choice
            .iter()
            .filter_map(|content| match content {
                AssistantContent::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect();
        if text.trim().is_empty() {
            return Err(GenerationError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "response has no text".to_string(),
            });
        }
        debug!(chars = text.len(), "Gemini response received");

        Ok(serde_json::from_str(extract_json_object(&text))?)
    }
}

fn completion_error(err: CompletionError) -> GenerationError {
    match err {
        CompletionError::ResponseError(reason) => GenerationError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason,
        },
        other => GenerationError::RequestFailed {
            provider: PROVIDER.to_string(),
            reason: other.to_string(),
        },
    }
}

fn teaser_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "teaser": { "type": "STRING", "description": "The cryptic psychic teaser." },
            "energySignature": { "type": "STRING", "description": "Their energetic frequency." },
        },
        "required": ["teaser", "energySignature"],
    })
}

fn full_reading_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "paragraph1": { "type": "STRING", "description": "Energy analysis." },
            "paragraph2": { "type": "STRING", "description": "Direct answer." },
            "paragraph3": { "type": "STRING", "description": "Future path and blessing." },
        },
        "required": ["paragraph1", "paragraph2", "paragraph3"],
    })
}

#[async_trait]
impl ReadingGenerator for GeminiGenerator {
    async fn teaser(&self, profile: &SeekerProfile) -> Result<Teaser, GenerationError> {
        self.generate_json(teaser_prompt(profile), teaser_schema())
            .await
    }

    async fn full_reading(&self, profile: &SeekerProfile) -> Result<FullReading, GenerationError> {
        self.generate_json(full_reading_prompt(profile), full_reading_schema())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::Router;
    use axum::extract::Json;
    use axum::http::StatusCode;
    use axum::routing::post;
    use tokio::net::TcpListener;

    fn gemini_reply(inner: &str) -> Value {
        json!({
            "responseId": "stub-response",
            "modelVersion": DEFAULT_MODEL,
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": inner }] },
                "finishReason": "STOP",
                "index": 0
            }],
            "usageMetadata": {
                "promptTokenCount": 10,
                "candidatesTokenCount": 20,
                "totalTokenCount": 30
            }
        })
    }

    /// Stub endpoint: answers the teaser or the full reading depending on
    /// which shape the prompt asks for.
    async fn stub_generate(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        if body.to_string().contains("paragraph1") {
            (
                StatusCode::OK,
                Json(gemini_reply(
                    "```json\n{\"paragraph1\": \"one\", \"paragraph2\": \"two\", \"paragraph3\": \"three\"}\n```",
                )),
            )
        } else {
            (
                StatusCode::OK,
                Json(gemini_reply(r#"{"teaser": "Stars align", "energySignature": "Violet"}"#)),
            )
        }
    }

    async fn start_stub(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://127.0.0.1:{port}")
    }

    fn config(base_url: String, with_key: bool) -> GeminiConfig {
        GeminiConfig {
            api_key: with_key.then(|| SecretString::from("test-key")),
            base_url,
            ..Default::default()
        }
    }

    fn profile() -> SeekerProfile {
        SeekerProfile {
            name: "Alex".to_string(),
            question: "Will I succeed?".to_string(),
            ..Default::default()
        }
    }

    fn stub_route() -> String {
        format!("/v1beta/models/{DEFAULT_MODEL}:generateContent")
    }

    #[tokio::test]
    async fn teaser_and_full_reading_from_stub() {
        let app = Router::new().route(&stub_route(), post(stub_generate));
        let base = start_stub(app).await;
        let generator = GeminiGenerator::new(config(base, true)).unwrap();

        let teaser = generator.teaser(&profile()).await.unwrap();
        assert_eq!(teaser.teaser, "Stars align");
        assert_eq!(teaser.energy_signature, "Violet");

        let full = generator.full_reading(&profile()).await.unwrap();
        assert_eq!(full.paragraph3, "three");
    }

    #[tokio::test]
    async fn stub_backed_generator_fills_reading_without_fallback() {
        let app = Router::new().route(&stub_route(), post(stub_generate));
        let base = start_stub(app).await;
        let generator = GeminiGenerator::new(config(base, true)).unwrap();

        let reading = crate::reading::generate_reading(
            &generator,
            &profile(),
            std::time::Duration::from_secs(5),
        )
        .await;
        assert!(!reading.is_degraded());
        assert_eq!(reading.full_reading.paragraph1, "one");
    }

    #[tokio::test]
    async fn http_error_is_request_failed() {
        let app = Router::new().route(
            &stub_route(),
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let base = start_stub(app).await;
        let generator = GeminiGenerator::new(config(base, true)).unwrap();

        let err = generator.teaser(&profile()).await.unwrap_err();
        assert!(matches!(err, GenerationError::RequestFailed { .. }));
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let generator =
            GeminiGenerator::new(config("http://127.0.0.1:9".to_string(), false)).unwrap();
        let err = generator.full_reading(&profile()).await.unwrap_err();
        assert!(matches!(err, GenerationError::NotConfigured { .. }));
    }

    #[test]
    fn any_key_constructs_client() {
        let generator = GeminiGenerator::new(GeminiConfig {
            api_key: Some(SecretString::from("test-key")),
            model: "gemini-2.0-flash".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(generator.model_name(), "gemini-2.0-flash");
    }
}
