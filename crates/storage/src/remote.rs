//! PostgREST-style remote store and unload beacon.
//!
//! Writes go through the `update_video_progress` procedure so the server owns
//! percentage and completion; reads select the single row for a user/task.

use std::env;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use onboard_core::Clock;
use onboard_core::model::{ProgressRecord, ProgressUpdate, TaskId, UserId, watch_percentage};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::beacon::{BeaconPayload, UnloadBeacon};
use crate::repository::{StorageError, VideoProgressRepository};

/// PostgREST error code for "JSON object requested, multiple (or no) rows returned".
pub const NO_ROWS_CODE: &str = "PGRST116";

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const BEACON_CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: String,
    /// Bearer token for the signed-in user; falls back to `api_key`.
    pub access_token: Option<String>,
    /// Where unload beacons are posted; defaults to `{base_url}/api/video-progress`.
    pub beacon_url: Option<String>,
}

impl RemoteConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            access_token: None,
            beacon_url: None,
        }
    }

    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("ONBOARD_REMOTE_URL").ok()?;
        let api_key = env::var("ONBOARD_REMOTE_KEY").ok()?;
        if base_url.trim().is_empty() || api_key.trim().is_empty() {
            return None;
        }
        Some(Self {
            base_url,
            api_key,
            access_token: env::var("ONBOARD_REMOTE_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            beacon_url: env::var("ONBOARD_BEACON_URL")
                .ok()
                .filter(|u| !u.trim().is_empty()),
        })
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    fn rpc_url(&self, procedure: &str) -> String {
        format!("{}/rest/v1/rpc/{procedure}", self.base())
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base())
    }

    #[must_use]
    pub fn resolved_beacon_url(&self) -> String {
        self.beacon_url
            .clone()
            .unwrap_or_else(|| format!("{}/api/video-progress", self.base()))
    }
}

/// Remote store speaking the PostgREST dialect.
#[derive(Clone)]
pub struct RemoteStore {
    client: Client,
    config: RemoteConfig,
    clock: Clock,
}

impl RemoteStore {
    #[must_use]
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            clock: Clock::default(),
        }
    }

    /// Build the matching fire-and-forget beacon, sharing the HTTP client.
    #[must_use]
    pub fn beacon(&self) -> HttpBeacon {
        HttpBeacon {
            client: self.client.clone(),
            url: self.config.resolved_beacon_url(),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .config
            .access_token
            .as_deref()
            .unwrap_or(&self.config.api_key);
        request.header("apikey", &self.config.api_key).bearer_auth(token)
    }

    fn into_record(&self, row: ProgressRow) -> Result<ProgressRecord, StorageError> {
        let watch_percentage = row
            .watch_percentage
            .unwrap_or_else(|| watch_percentage(row.current_position, row.duration));
        Ok(ProgressRecord::from_persisted(
            row.user_id,
            row.task_id,
            row.current_position,
            row.duration,
            watch_percentage,
            row.completed.unwrap_or(false),
            row.video_url,
            row.last_watched_at.unwrap_or_else(|| self.clock.now()),
        )?)
    }
}

async fn error_from_response(response: Response) -> StorageError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<PostgrestError>(&body) {
        Ok(err) if err.code.as_deref() == Some(NO_ROWS_CODE) => StorageError::NotFound,
        Ok(err) => StorageError::Remote {
            code: err.code.unwrap_or_else(|| status.as_u16().to_string()),
            message: err.message.unwrap_or(body),
        },
        Err(_) => StorageError::Remote {
            code: status.as_u16().to_string(),
            message: body,
        },
    }
}

fn connection(err: reqwest::Error) -> StorageError {
    StorageError::Connection(err.to_string())
}

#[async_trait]
impl VideoProgressRepository for RemoteStore {
    async fn update_video_progress(
        &self,
        update: &ProgressUpdate,
    ) -> Result<ProgressRecord, StorageError> {
        let params = UpdateParams {
            p_user_id: update.user_id,
            p_task_id: &update.task_id,
            p_current_position: update.current_position,
            p_duration: update.duration,
            p_video_url: update.source_url.as_deref(),
        };

        let response = self
            .authorized(self.client.post(self.config.rpc_url("update_video_progress")))
            .json(&params)
            .send()
            .await
            .map_err(connection)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: RpcBody = response
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let row = match body {
            RpcBody::One(row) => row,
            RpcBody::Many(rows) => rows.into_iter().next().ok_or(StorageError::NotFound)?,
        };
        self.into_record(row)
    }

    async fn get_video_progress(
        &self,
        user_id: UserId,
        task_id: &TaskId,
    ) -> Result<ProgressRecord, StorageError> {
        let response = self
            .authorized(self.client.get(self.config.table_url("video_progress")))
            .header(ACCEPT, SINGLE_OBJECT)
            .query(&[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{user_id}")),
                ("task_id", format!("eq.{task_id}")),
            ])
            .send()
            .await
            .map_err(connection)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let row: ProgressRow = response
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.into_record(row)
    }

    async fn list_video_progress(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let response = self
            .authorized(self.client.get(self.config.table_url("video_progress")))
            .query(&[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{user_id}")),
                ("order", "task_id.asc".to_string()),
            ])
            .send()
            .await
            .map_err(connection)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let rows: Vec<ProgressRow> = response
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        rows.into_iter().map(|row| self.into_record(row)).collect()
    }
}

/// Unload beacon that posts JSON text on a detached task.
///
/// The caller never awaits the request; a missing tokio runtime means the
/// beacon cannot be queued and `send` reports `false`.
#[derive(Clone)]
pub struct HttpBeacon {
    client: Client,
    url: String,
}

impl HttpBeacon {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

impl UnloadBeacon for HttpBeacon {
    fn send(&self, payload: &BeaconPayload) -> bool {
        let body = match payload.to_text() {
            Ok(body) => body,
            Err(err) => {
                warn!("cannot encode unload beacon: {err}");
                return false;
            }
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime available for unload beacon");
            return false;
        };

        let request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, BEACON_CONTENT_TYPE)
            .body(body);
        let task_id = payload.task_id.clone();
        runtime.spawn(async move {
            match request.send().await {
                Ok(response) => debug!(
                    "unload beacon for task {task_id} answered {}",
                    response.status()
                ),
                Err(err) => debug!("unload beacon for task {task_id} failed: {err}"),
            }
        });
        true
    }
}

#[derive(Debug, Serialize)]
struct UpdateParams<'a> {
    p_user_id: UserId,
    p_task_id: &'a TaskId,
    p_current_position: f64,
    p_duration: f64,
    p_video_url: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ProgressRow {
    user_id: UserId,
    task_id: TaskId,
    current_position: f64,
    duration: f64,
    watch_percentage: Option<f64>,
    completed: Option<bool>,
    video_url: Option<String>,
    #[serde(alias = "updated_at")]
    last_watched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RpcBody {
    One(ProgressRow),
    Many(Vec<ProgressRow>),
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_tolerate_trailing_slash() {
        let config = RemoteConfig::new("https://db.example.test/", "anon");
        assert_eq!(
            config.rpc_url("update_video_progress"),
            "https://db.example.test/rest/v1/rpc/update_video_progress"
        );
        assert_eq!(
            config.table_url("video_progress"),
            "https://db.example.test/rest/v1/video_progress"
        );
        assert_eq!(
            config.resolved_beacon_url(),
            "https://db.example.test/api/video-progress"
        );
    }

    #[test]
    fn explicit_beacon_url_wins() {
        let mut config = RemoteConfig::new("https://db.example.test", "anon");
        config.beacon_url = Some("https://app.example.test/beacon".into());
        assert_eq!(config.resolved_beacon_url(), "https://app.example.test/beacon");
    }

    #[test]
    fn rpc_body_accepts_object_or_array() {
        let row = r#"{"user_id":"00000000-0000-0000-0000-000000000000","task_id":"welcome_video",
            "current_position":12.0,"duration":48.0,"watch_percentage":25.0,"completed":false}"#;
        assert!(matches!(
            serde_json::from_str::<RpcBody>(row).unwrap(),
            RpcBody::One(_)
        ));
        assert!(matches!(
            serde_json::from_str::<RpcBody>(&format!("[{row}]")).unwrap(),
            RpcBody::Many(rows) if rows.len() == 1
        ));
    }

    #[test]
    fn beacon_without_runtime_is_not_queued() {
        let beacon = HttpBeacon::new("http://127.0.0.1:9/api/video-progress");
        let payload = BeaconPayload {
            user_id: UserId::random(),
            task_id: TaskId::new("intro_video"),
            current_position: 3.0,
            duration: 9.0,
        };
        assert!(!beacon.send(&payload));
    }
}
