//! REST client for the coordinator service (SPEC_FULL §6).
//!
//! `CoordinatorClient` is a trait so `EventStrategies`/`EventProcessor` never
//! depend on `reqwest` directly; `ReqwestCoordinatorClient` is the concrete,
//! compiled implementation. Grounded on `protocol/traits.rs`'s
//! trait-boundary-over-transport style.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RemoteError;

/// Recognized `errcode` values (SPEC_FULL §6).
pub const ERRCODE_LICENSE_ACCESS: &str = "LICENSE_ACCESS";
pub const ERRCODE_COLLABORATION_ACCESS: &str = "COLLABORATION_ACCESS";
pub const ERRCODE_FS_SYNC: &str = "FS_SYNC";
pub const ERRCODE_FS_SYNC_PARENT_NOT_FOUND: &str = "FS_SYNC_PARENT_NOT_FOUND";
pub const ERRCODE_FS_SYNC_NOT_FOUND: &str = "FS_SYNC_NOT_FOUND";
pub const ERRCODE_FILE_NOT_CHANGED: &str = "FILE_NOT_CHANGED";
pub const ERRCODE_WRONG_DATA: &str = "WRONG_DATA";
pub const ERRCODE_FS_SYNC_COLLABORATION_MOVE: &str = "FS_SYNC_COLLABORATION_MOVE";
pub const ERRCODE_LOCAL_COLLABORATION_DELETE: &str = "LOCAL_COLLABORATION_DELETE";

/// Common request fields shared by every `*_event_*` call.
#[derive(Clone, Debug, Serialize)]
pub struct EventRegistration {
	pub event_uuid: Uuid,
	pub file_uuid: Option<Uuid>,
	pub folder_uuid: Option<Uuid>,
	pub previous_server_event_id: i64,
	pub file_name: String,
	pub file_size: u64,
	pub file_hash: Option<String>,
	pub diff_file_uuid: Option<Uuid>,
	pub rev_diff_file_uuid: Option<Uuid>,
}

/// Envelope every coordinator response is wrapped in.
#[derive(Clone, Debug, Deserialize)]
pub struct CoordinatorResponse {
	pub result: String,
	pub errcode: Option<String>,
	pub info: Option<String>,
	pub data: Option<serde_json::Value>,
	pub error_data: Option<serde_json::Value>,
}

impl CoordinatorResponse {
	pub fn is_success(&self) -> bool {
		self.result == "success"
	}

	/// Turn an error envelope into a `RemoteError::ErrorCode`; panics (via
	/// `Option::unwrap`-style misuse) if called on a success envelope, so
	/// callers must check `is_success()` first.
	pub fn into_error(self) -> RemoteError {
		RemoteError::ErrorCode { code: self.errcode.unwrap_or_default(), info: self.info }
	}
}

/// Outcome of a registration call: the assigned `server_event_id` on
/// success, or the coordinator's error envelope.
pub type RegisterResult = Result<i64, RemoteError>;

/// Client-side contract of the coordinator REST API (SPEC_FULL §6).
/// `EventStrategies`' `register()` step depends only on this trait.
#[async_trait]
pub trait CoordinatorClient: Send + Sync {
	async fn file_event_create(&self, req: &EventRegistration) -> RegisterResult;
	async fn file_event_update(&self, req: &EventRegistration) -> RegisterResult;
	async fn file_event_delete(&self, req: &EventRegistration) -> RegisterResult;
	async fn file_event_move(&self, req: &EventRegistration) -> RegisterResult;
	async fn folder_event_create(&self, req: &EventRegistration) -> RegisterResult;
	async fn folder_event_update(&self, req: &EventRegistration) -> RegisterResult;
	async fn folder_event_delete(&self, req: &EventRegistration) -> RegisterResult;
	async fn folder_event_move(&self, req: &EventRegistration) -> RegisterResult;
}

/// `reqwest`-backed implementation, one HTTP endpoint per event kind under
/// a configured base URL.
pub struct ReqwestCoordinatorClient {
	client: reqwest::Client,
	base_url: String,
}

impl ReqwestCoordinatorClient {
	pub fn new(base_url: impl Into<String>) -> Self {
		ReqwestCoordinatorClient { client: reqwest::Client::new(), base_url: base_url.into() }
	}

	async fn post(&self, path: &str, req: &EventRegistration) -> RegisterResult {
		let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
		let resp = self
			.client
			.post(&url)
			.json(req)
			.send()
			.await
			.map_err(|e| RemoteError::Transport { source: Box::new(e) })?;
		let body: CoordinatorResponse = resp
			.json()
			.await
			.map_err(|e| RemoteError::BadResponse { message: e.to_string() })?;
		if !body.is_success() {
			return Err(body.into_error());
		}
		let server_event_id = body
			.data
			.as_ref()
			.and_then(|d| d.get("server_event_id"))
			.and_then(|v| v.as_i64())
			.ok_or_else(|| RemoteError::BadResponse { message: "missing server_event_id".into() })?;
		Ok(server_event_id)
	}
}

#[async_trait]
impl CoordinatorClient for ReqwestCoordinatorClient {
	async fn file_event_create(&self, req: &EventRegistration) -> RegisterResult {
		self.post("file_event_create", req).await
	}
	async fn file_event_update(&self, req: &EventRegistration) -> RegisterResult {
		self.post("file_event_update", req).await
	}
	async fn file_event_delete(&self, req: &EventRegistration) -> RegisterResult {
		self.post("file_event_delete", req).await
	}
	async fn file_event_move(&self, req: &EventRegistration) -> RegisterResult {
		self.post("file_event_move", req).await
	}
	async fn folder_event_create(&self, req: &EventRegistration) -> RegisterResult {
		self.post("folder_event_create", req).await
	}
	async fn folder_event_update(&self, req: &EventRegistration) -> RegisterResult {
		self.post("folder_event_update", req).await
	}
	async fn folder_event_delete(&self, req: &EventRegistration) -> RegisterResult {
		self.post("folder_event_delete", req).await
	}
	async fn folder_event_move(&self, req: &EventRegistration) -> RegisterResult {
		self.post("folder_event_move", req).await
	}
}


// vim: ts=4
