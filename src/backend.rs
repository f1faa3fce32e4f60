//! Access to the hosted database and object storage holding scenes and tasks.

use std::future::Future;

use anyhow::Context;
use log::debug;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;

use crate::task::{AnswerSource, Scene, TaskRecord, TaskUpdate};

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub url: String,
    pub api_key: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:54321".to_string(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub image_bucket: String,
    pub video_bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            image_bucket: "birdeye-images".to_string(),
            video_bucket: "scannet-videos".to_string(),
        }
    }
}

pub trait Backend: Send + Sync {
    fn random_scene(&self) -> impl Future<Output = anyhow::Result<Scene>> + Send;

    fn random_tasks(
        &self,
        scene_id: &str,
        source: AnswerSource,
    ) -> impl Future<Output = anyhow::Result<Vec<TaskRecord>>> + Send;

    /// `None` when no task of that source has been scored yet.
    fn average_score(
        &self,
        source: AnswerSource,
    ) -> impl Future<Output = anyhow::Result<Option<f64>>> + Send;

    fn update_task(&self, record: &TaskRecord) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Stores an automatically assigned LLM score for a task and marks it as machine-tested.
    fn record_llm_score(
        &self,
        task_id: i64,
        score: f64,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// Public URLs of the media shown for a scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneMedia {
    pub image_url: String,
    pub video_url: String,
}

impl SceneMedia {
    pub fn locate(backend: &impl Backend, storage: &StorageConfig, scene_id: &str) -> Self {
        Self {
            image_url: backend.public_url(&storage.image_bucket, &format!("{scene_id}_bird.png")),
            video_url: backend.public_url(&storage.video_bucket, &format!("{scene_id}.mp4")),
        }
    }
}

/// Submits every record, logging failures instead of stopping at the first one. Returns how
/// many updates succeeded.
pub async fn submit_updates(backend: &impl Backend, records: &[TaskRecord]) -> usize {
    let mut submitted = 0;
    for record in records {
        match backend.update_task(record).await {
            Ok(()) => submitted += 1,
            Err(err) => log::error!("Failed to update task {}: {err:?}", record.id),
        }
    }
    submitted
}

/// [`Backend`] speaking PostgREST over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &BackendConfig) -> Self {
        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn rpc(&self, function: &str, params: &impl Serialize) -> RequestBuilder {
        let url = format!("{}/rest/v1/rpc/{function}", self.base_url);
        debug!("Calling remote procedure {function}");
        self.authorize(self.client.post(url)).json(params)
    }

    async fn patch_task(&self, task_id: i64, body: &impl Serialize) -> anyhow::Result<()> {
        let url = format!("{}/rest/v1/sqa_tasks?id=eq.{task_id}", self.base_url);
        debug!("Updating task {task_id}");
        self.authorize(self.client.patch(url))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send update for task {task_id}"))?
            .error_for_status()
            .with_context(|| format!("Backend rejected update for task {task_id}"))?;
        Ok(())
    }

    async fn parse<T: DeserializeOwned>(response: Response, what: &str) -> anyhow::Result<T> {
        let response = response
            .error_for_status()
            .with_context(|| format!("Backend rejected {what}"))?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response to {what}"))
    }
}

impl Backend for HttpBackend {
    async fn random_scene(&self) -> anyhow::Result<Scene> {
        let response = self
            .rpc("get_random_scene", &json!({}))
            .header(header::ACCEPT, SINGLE_OBJECT)
            .send()
            .await
            .context("Failed to request a random scene")?;
        Self::parse(response, "get_random_scene").await
    }

    async fn random_tasks(
        &self,
        scene_id: &str,
        source: AnswerSource,
    ) -> anyhow::Result<Vec<TaskRecord>> {
        let params = json!({
            "scene_id_param": scene_id,
            "source_param": source.as_param(),
        });
        let response = self
            .rpc("get_random_sqa_tasks", &params)
            .send()
            .await
            .with_context(|| format!("Failed to request {source} tasks for {scene_id}"))?;
        Self::parse(response, "get_random_sqa_tasks").await
    }

    async fn average_score(&self, source: AnswerSource) -> anyhow::Result<Option<f64>> {
        let params = json!({ "source_param": source.as_param() });
        let response = self
            .rpc("calculate_average_score", &params)
            .send()
            .await
            .with_context(|| format!("Failed to request the average {source} score"))?;
        Self::parse(response, "calculate_average_score").await
    }

    async fn update_task(&self, record: &TaskRecord) -> anyhow::Result<()> {
        self.patch_task(record.id, &TaskUpdate::from(record)).await
    }

    async fn record_llm_score(&self, task_id: i64, score: f64) -> anyhow::Result<()> {
        let body = json!({
            "gemini_score": score,
            "gemini_tested": true,
        });
        self.patch_task(task_id, &body).await
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{path}", self.base_url)
    }
}
