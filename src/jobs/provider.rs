// src/jobs/provider.rs
//! Artifact generation backends.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::{JobType, Session, Signal};

/// Everything a generator gets to see about a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub session: Session,
    pub signals: Vec<Signal>,
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &'static str;
    /// Returns the raw artifact JSON; the worker validates it.
    async fn generate(&self, job_type: JobType, ctx: &SessionContext) -> Result<serde_json::Value>;
}

/// Always fails, so jobs end up FAILED instead of carrying invented content.
pub struct DisabledGenerator;

#[async_trait]
impl GenerationProvider for DisabledGenerator {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn generate(&self, _job_type: JobType, _ctx: &SessionContext) -> Result<serde_json::Value> {
        bail!("artifact generation is disabled")
    }
}

/// OpenAI Chat Completions backend asking for a JSON artifact.
pub struct OpenAiGenerator {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiGenerator {
    pub fn new(api_key: String, model: Option<&str>) -> Result<Self> {
        if api_key.trim().is_empty() {
            bail!("OpenAI generator needs an api key");
        }
        let http = reqwest::Client::builder()
            .user_agent("signal-digest/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(60))
            .build()
            .context("building generation http client")?;
        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or("gpt-4o-mini").to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".into(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

fn instructions(job_type: JobType) -> &'static str {
    match job_type {
        JobType::InsightCard => {
            "Summarize the learning session as JSON: {\"type\":\"INSIGHT_CARD\",\"headline\":string,\"bullets\":[string]}. At most 12 bullets. Output JSON only."
        }
        JobType::EvidencePack => {
            "Extract claims with supporting evidence as JSON: {\"type\":\"EVIDENCE_PACK\",\"items\":[{\"signalId\":string|null,\"claim\":string,\"evidence\":string}]}. At most 20 items. Output JSON only."
        }
    }
}

#[async_trait]
impl GenerationProvider for OpenAiGenerator {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, job_type: JobType, ctx: &SessionContext) -> Result<serde_json::Value> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct ResponseFormat {
            #[serde(rename = "type")]
            kind: &'static str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            response_format: ResponseFormat,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let user = serde_json::to_string(ctx).context("serializing session context")?;
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: instructions(job_type),
                },
                Msg {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: 0.2,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("calling generation provider")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("generation provider returned HTTP {status}");
        }
        let body: Resp = resp.json().await.context("decoding provider response")?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("generation provider returned no content"))?;
        serde_json::from_str(content.trim()).context("provider content is not JSON")
    }
}

/// Replays one fixed result; for tests and local runs without credentials.
pub struct StaticGenerator {
    result: std::result::Result<serde_json::Value, String>,
    delay: Option<Duration>,
}

impl StaticGenerator {
    pub fn ok(artifact: serde_json::Value) -> Self {
        Self {
            result: Ok(artifact),
            delay: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl GenerationProvider for StaticGenerator {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn generate(&self, _job_type: JobType, _ctx: &SessionContext) -> Result<serde_json::Value> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.result.clone().map_err(|m| anyhow!(m))
    }
}
