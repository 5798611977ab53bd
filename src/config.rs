//! Process-wide configuration: loads [`orchestra_config::OrchestraConfig`]
//! once at startup and wires up the Reasoner/Embedder HTTP clients it
//! describes. Threaded through component constructors as `Arc<Config>`; no
//! ambient global lookup.

use crate::error::ControlPlaneError;
use crate::planner::Reasoner;
use crate::plan_cache::Embedder;
use orchestra_config::OrchestraConfig;
use std::sync::Arc;

pub struct Config {
    pub raw: OrchestraConfig,
}

impl Config {
    pub fn load() -> Result<Arc<Self>, ControlPlaneError> {
        let raw = orchestra_config::load_config()
            .map_err(|e| ControlPlaneError::Internal { message: e.to_string() })?;
        Ok(Arc::new(Self { raw }))
    }
}

/// Reasoner backed by an OpenAI-compatible chat-completions endpoint.
pub struct HttpReasoner {
    client: reqwest::Client,
    base_url: String,
    model_id: String,
    api_key: String,
}

impl HttpReasoner {
    pub fn new(base_url: String, model_id: String, api_key: String) -> Self {
        Self { client: reqwest::Client::new(), base_url, model_id, api_key }
    }
}

#[async_trait::async_trait]
impl Reasoner for HttpReasoner {
    async fn propose_plan(
        &self,
        action: &str,
        action_fields: &[String],
        workers: &[crate::domain::Worker],
        feedback: Option<&str>,
    ) -> Result<crate::domain::Plan, ControlPlaneError> {
        let catalog: Vec<_> = workers
            .iter()
            .map(|w| {
                serde_json::json!({
                    "name": w.name,
                    "description": w.description,
                    "input_schema": w.input_schema,
                    "output_schema": w.output_schema,
                })
            })
            .collect();

        let prompt = serde_json::json!({
            "model": self.model_id,
            "action": action,
            "action_fields": action_fields,
            "workers": catalog,
            "feedback": feedback,
        });

        let response = self
            .client
            .post(format!("{}/plan", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&prompt)
            .send()
            .await?;

        let plan: crate::domain::Plan = response.json().await?;
        Ok(plan)
    }
}

/// Embedder backed by an OpenAI-compatible embeddings endpoint.
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model_id: String,
    api_key: String,
}

impl HttpEmbedder {
    pub fn new(base_url: String, model_id: String, api_key: String) -> Self {
        Self { client: reqwest::Client::new(), base_url, model_id, api_key }
    }
}

#[async_trait::async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ControlPlaneError> {
        #[derive(serde::Deserialize)]
        struct EmbeddingResponse {
            embedding: Vec<f32>,
        }

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({"model": self.model_id, "input": text}))
            .send()
            .await?;

        let parsed: EmbeddingResponse = response.json().await?;
        Ok(parsed.embedding)
    }
}
