//! HTTP implementation of [`PlatformClient`] against the platform's queue
//! and index services.

use crate::client::{PlatformClient, TaskState, TaskStatus};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use kindling_core::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

/// Maximum number of status lookups dispatched concurrently per page.
const STATUS_PAGE_SIZE: usize = 100;

pub struct HttpPlatformClient {
    root_url: Url,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpPlatformClient {
    pub fn new(root_url: &str, retry: RetryPolicy) -> Result<Self> {
        let root_url = Url::parse(root_url)
            .map_err(|err| Error::platform(root_url, format!("bad root url: {err}")))?;
        let client = reqwest::Client::builder()
            .timeout(retry.request_timeout)
            .build()
            .map_err(|err| Error::platform(root_url.as_str(), err.to_string()))?;
        Ok(HttpPlatformClient {
            root_url,
            client,
            retry,
        })
    }

    fn api_url(&self, service: &str, version: &str, path: &str) -> Result<Url> {
        let joined = format!("api/{service}/{version}/{path}");
        self.root_url
            .join(&joined)
            .map_err(|err| Error::platform(&joined, err.to_string()))
    }

    async fn get_json(&self, url: Url) -> Result<Option<Value>> {
        let endpoint = url.path().to_string();
        self.retry
            .run(&endpoint, || {
                let client = self.client.clone();
                let url = url.clone();
                let endpoint = endpoint.clone();
                async move {
                    let response = client
                        .get(url)
                        .send()
                        .await
                        .map_err(|err| Error::platform(&endpoint, err.to_string()))?;
                    if response.status() == reqwest::StatusCode::NOT_FOUND {
                        return Ok(None);
                    }
                    let response = response
                        .error_for_status()
                        .map_err(|err| Error::platform(&endpoint, err.to_string()))?;
                    let body = response
                        .json::<Value>()
                        .await
                        .map_err(|err| Error::platform(&endpoint, err.to_string()))?;
                    Ok(Some(body))
                }
            })
            .await
    }

    async fn status_of(&self, task_id: &str) -> Result<Option<(String, TaskStatus)>> {
        let url = self.api_url("queue", "v1", &format!("task/{task_id}/status"))?;
        let Some(body) = self.get_json(url).await? else {
            return Ok(None);
        };
        let state = match body["status"]["state"].as_str() {
            Some("unscheduled") => TaskState::Unscheduled,
            Some("pending") => TaskState::Pending,
            Some("running") => TaskState::Running,
            Some("completed") => TaskState::Completed,
            Some("failed") => TaskState::Failed,
            Some("exception") => TaskState::Exception,
            other => {
                return Err(Error::platform(
                    format!("task/{task_id}/status"),
                    format!("unrecognized task state {other:?}"),
                ))
            }
        };
        let expires = body["status"]["expires"]
            .as_str()
            .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
            .map(|parsed| parsed.with_timezone(&Utc));
        Ok(Some((task_id.to_string(), TaskStatus { state, expires })))
    }
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    async fn find_task_by_index(&self, index_path: &str) -> Result<Option<String>> {
        let url = self.api_url("index", "v1", &format!("task/{index_path}"))?;
        let Some(body) = self.get_json(url).await? else {
            return Ok(None);
        };
        Ok(body["taskId"].as_str().map(str::to_string))
    }

    async fn get_task_statuses(
        &self,
        task_ids: &[String],
    ) -> Result<BTreeMap<String, TaskStatus>> {
        let mut statuses = BTreeMap::new();
        for page in task_ids.chunks(STATUS_PAGE_SIZE) {
            debug!(count = page.len(), "fetching task status page");
            let fetched =
                try_join_all(page.iter().map(|task_id| self.status_of(task_id))).await?;
            statuses.extend(fetched.into_iter().flatten());
        }
        Ok(statuses)
    }

    async fn get_artifact(&self, task_id: &str, name: &str) -> Result<Vec<u8>> {
        let url = self.api_url("queue", "v1", &format!("task/{task_id}/artifacts/{name}"))?;
        let endpoint = url.path().to_string();
        self.retry
            .run(&endpoint, || {
                let client = self.client.clone();
                let url = url.clone();
                let endpoint = endpoint.clone();
                async move {
                    let response = client
                        .get(url)
                        .send()
                        .await
                        .and_then(reqwest::Response::error_for_status)
                        .map_err(|err| Error::platform(&endpoint, err.to_string()))?;
                    let bytes = response
                        .bytes()
                        .await
                        .map_err(|err| Error::platform(&endpoint, err.to_string()))?;
                    Ok(bytes.to_vec())
                }
            })
            .await
    }

    async fn create_tasks(&self, tasks: &[(String, Value)], root_task_id: &str) -> Result<()> {
        debug!(count = tasks.len(), root_task_id, "submitting task batch");
        for (task_id, definition) in tasks {
            let url = self.api_url("queue", "v1", &format!("task/{task_id}"))?;
            let endpoint = url.path().to_string();
            self.retry
                .run(&endpoint, || {
                    let client = self.client.clone();
                    let url = url.clone();
                    let endpoint = endpoint.clone();
                    let definition = definition.clone();
                    async move {
                        client
                            .put(url)
                            .json(&definition)
                            .send()
                            .await
                            .and_then(reqwest::Response::error_for_status)
                            .map_err(|err| Error::platform(&endpoint, err.to_string()))?;
                        Ok(())
                    }
                })
                .await?;
        }
        Ok(())
    }
}
