//! OpenAI-compatible backend implementation
//!
//! Works with any server that implements the OpenAI chat completions API:
//! - OpenAI (https://api.openai.com/v1)
//! - DeepSeek, Moonshot and other hosted gateways
//! - vLLM (http://localhost:8000/v1)
//! - LocalAI / llama-server (http://localhost:8080/v1)
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_API_BASE`: API base URL including the version path
//! - `AI_API_KEY`: Bearer token
//! - `AI_MODEL`: Text model (default: gpt-4o-mini)
//! - `AI_VISION_MODEL`: Receipt model (default: `AI_MODEL`, then gpt-4o)
//! - `AI_TIMEOUT_SECS`: Request timeout in seconds (default: 60)

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::Category;
use crate::prompts::{PromptId, PromptLibrary};

use super::normalize::excerpt;
use super::{category_list, extract_content, image_data_url, AIBackend};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Sampling settings for one kind of call
#[derive(Debug, Clone, Copy)]
struct Sampling {
    temperature: f32,
    max_tokens: u32,
}

/// Parsing wants near-deterministic output
const PARSE_SAMPLING: Sampling = Sampling {
    temperature: 0.1,
    max_tokens: 1000,
};

const ANALYSIS_SAMPLING: Sampling = Sampling {
    temperature: 0.7,
    max_tokens: 1500,
};

/// OpenAI-compatible backend
///
/// Sends a system message and a user message to `{base}/chat/completions`
/// and hands back the assistant's text.
///
/// # Example
///
/// ```rust,ignore
/// // OpenAI
/// export AI_API_KEY="sk-..."
///
/// // DeepSeek
/// export AI_API_BASE="https://api.deepseek.com/v1"
/// export AI_API_KEY="sk-..."
/// export AI_MODEL="deepseek-chat"
///
/// // vLLM on the LAN
/// export AI_API_BASE="http://192.168.1.100:8000/v1"
/// export AI_MODEL="Qwen/Qwen2.5-7B-Instruct"
/// ```
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    vision_model: String,
    api_key: Option<String>,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: build_client(DEFAULT_TIMEOUT_SECS),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            vision_model: model.to_string(),
            api_key: None,
            prompts: Arc::new(RwLock::new(PromptLibrary::new())),
        }
    }

    /// Create with an API key
    pub fn with_api_key(base_url: &str, model: &str, api_key: &str) -> Self {
        let mut backend = Self::new(base_url, model);
        backend.api_key = Some(api_key.to_string());
        backend
    }

    /// Use a different model for receipt images
    pub fn with_vision_model(mut self, model: &str) -> Self {
        self.vision_model = model.to_string();
        self
    }

    /// Replace the request timeout
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.http_client = build_client(secs);
        self
    }

    /// Use a specific prompt library (e.g. embedded-only in tests)
    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = Arc::new(RwLock::new(prompts));
        self
    }

    /// Create a new instance with a different text model
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }

    /// Create from environment variables
    ///
    /// Returns None unless `AI_API_KEY` or `AI_API_BASE` is set.
    pub fn from_env() -> Option<Self> {
        let api_key = non_empty_var("AI_API_KEY");
        let base = non_empty_var("AI_API_BASE");
        if api_key.is_none() && base.is_none() {
            return None;
        }

        let base = base.unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let model = non_empty_var("AI_MODEL");
        let vision_model = non_empty_var("AI_VISION_MODEL")
            .or_else(|| model.clone())
            .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string());
        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let timeout = non_empty_var("AI_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let mut backend = Self::new(&base, &model)
            .with_vision_model(&vision_model)
            .with_timeout(timeout);
        backend.api_key = api_key;
        Some(backend)
    }

    /// Render a prompt's system and user sections
    fn render(&self, id: PromptId, vars: &HashMap<&str, &str>) -> Result<(String, String)> {
        let mut prompts = self
            .prompts
            .write()
            .map_err(|_| Error::InvalidData("Failed to acquire prompt library lock".into()))?;
        let template = prompts.get(id)?;
        Ok((template.render_system(vars), template.render_user(vars)))
    }

    /// Make a chat completion request and return the assistant text
    async fn chat_completion(
        &self,
        model: &str,
        system: String,
        user: ChatContent,
        sampling: Sampling,
    ) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if !system.trim().is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: ChatContent::Text(system),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: user,
        });

        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages,
            temperature: Some(sampling.temperature),
            max_tokens: Some(sampling.max_tokens),
            stream: false,
        };

        let mut req_builder = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.bearer_auth(api_key);
        }

        let response = req_builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "AI API error {}: {}",
                status,
                excerpt(&body)
            )));
        }

        let body = response.text().await?;
        let value: Value =
            serde_json::from_str(&body).unwrap_or_else(|_| Value::String(body.clone()));

        match extract_content(&value) {
            Some((extractor, content)) => {
                debug!(extractor, model, "Extracted model reply");
                Ok(content)
            }
            None => Err(Error::Upstream(format!(
                "AI API returned no message content: {}",
                excerpt(&body)
            ))),
        }
    }
}

fn build_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

/// Chat message
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: ChatContent,
}

/// Chat message content (text or multimodal)
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// Content part for multimodal messages
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

/// Image URL for vision requests
#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[async_trait]
impl AIBackend for OpenAICompatibleBackend {
    async fn parse_text(
        &self,
        text: &str,
        categories: &[Category],
        today: NaiveDate,
    ) -> Result<String> {
        let categories = category_list(categories);
        let today = today.format("%Y-%m-%d").to_string();
        let (system, user) = {
            let mut vars = HashMap::new();
            vars.insert("categories", categories.as_str());
            vars.insert("today", today.as_str());
            vars.insert("text", text);
            self.render(PromptId::ParseText, &vars)?
        };

        let reply = self
            .chat_completion(&self.model, system, ChatContent::Text(user), PARSE_SAMPLING)
            .await?;
        debug!("Parse reply: {}", excerpt(&reply));
        Ok(reply)
    }

    async fn parse_receipt(
        &self,
        image: &str,
        categories: &[Category],
        today: NaiveDate,
    ) -> Result<String> {
        let categories = category_list(categories);
        let today = today.format("%Y-%m-%d").to_string();
        let (system, user) = {
            let mut vars = HashMap::new();
            vars.insert("categories", categories.as_str());
            vars.insert("today", today.as_str());
            self.render(PromptId::ParseReceipt, &vars)?
        };

        let content = ChatContent::Parts(vec![
            ContentPart::Text { text: user },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image_data_url(image),
                },
            },
        ]);

        let reply = self
            .chat_completion(&self.vision_model, system, content, PARSE_SAMPLING)
            .await?;
        debug!("Receipt reply: {}", excerpt(&reply));
        Ok(reply)
    }

    async fn analyze(&self, data_summary: &str) -> Result<String> {
        let (system, user) = {
            let mut vars = HashMap::new();
            vars.insert("summary", data_summary);
            self.render(PromptId::AnalyzeFinances, &vars)?
        };

        self.chat_completion(&self.model, system, ChatContent::Text(user), ANALYSIS_SAMPLING)
            .await
    }

    async fn health_check(&self) -> bool {
        let mut req_builder = self.http_client.get(format!("{}/models", self.base_url));
        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.bearer_auth(api_key);
        }

        match req_builder.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
