//! Discussion interactor: the use-case boundary through which the view-model
//! reaches the remote discussion service.
//!
//! `HttpDiscussionInteractor` talks to the Open edX style REST API
//! (`/api/discussion/v1/comments/...`). Calls are instrumented and log ids,
//! pages, statuses and sizes, never bodies in full.
//!
//! NOTE: We never log the access token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::config::ApiConfig;
use crate::domain::{Comment, ResponsesPage};
use crate::util::trunc_for_log;

const MERGE_PATCH_JSON: &str = "application/merge-patch+json";
const USER_AGENT_VALUE: &str = "discussion-responses/0.1";

/// Failure of an interactor call.
///
/// Connectivity is a property of the error, not a separate type: callers ask
/// `is_connectivity()` to pick the user-facing message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractorError {
  message: String,
  connectivity: bool,
}

impl InteractorError {
  pub fn connectivity(message: impl Into<String>) -> Self {
    Self { message: message.into(), connectivity: true }
  }

  pub fn other(message: impl Into<String>) -> Self {
    Self { message: message.into(), connectivity: false }
  }

  pub fn is_connectivity(&self) -> bool { self.connectivity }

  #[cfg(test)]
  pub fn message(&self) -> &str { &self.message }
}

impl std::fmt::Display for InteractorError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    if self.connectivity {
      write!(f, "connectivity: {}", self.message)
    } else {
      write!(f, "{}", self.message)
    }
  }
}

impl std::error::Error for InteractorError {}

impl From<reqwest::Error> for InteractorError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_connect() || e.is_timeout() {
      InteractorError::connectivity(e.to_string())
    } else {
      InteractorError::other(e.to_string())
    }
  }
}

#[async_trait]
pub trait DiscussionInteractor: Send + Sync {
  /// One page (1-based) of responses to `comment_id`.
  async fn get_comment_responses(&self, comment_id: &str, page: u32) -> Result<ResponsesPage, InteractorError>;

  async fn set_comment_voted(&self, comment_id: &str, voted: bool) -> Result<Comment, InteractorError>;

  async fn set_comment_flagged(&self, comment_id: &str, flagged: bool) -> Result<Comment, InteractorError>;

  /// Create a comment in `thread_id`, optionally as a reply to `parent_id`.
  async fn create_comment(&self, thread_id: &str, body: &str, parent_id: Option<&str>) -> Result<Comment, InteractorError>;
}

#[derive(Clone)]
pub struct HttpDiscussionInteractor {
  pub client: reqwest::Client,
  pub base_url: String,
  access_token: Option<String>,
}

impl HttpDiscussionInteractor {
  pub fn from_config(cfg: &ApiConfig) -> Result<Self, InteractorError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(cfg.timeout_secs))
      .build()?;
    Ok(Self {
      client,
      base_url: cfg.base_url.trim_end_matches('/').to_string(),
      access_token: cfg.access_token.clone().filter(|t| !t.trim().is_empty()),
    })
  }

  fn comments_url(&self) -> String {
    format!("{}/api/discussion/v1/comments/", self.base_url)
  }

  fn comment_url(&self, comment_id: &str) -> String {
    format!("{}/api/discussion/v1/comments/{}/", self.base_url, comment_id)
  }

  fn request(&self, method: Method, url: &str) -> RequestBuilder {
    let req = self.client.request(method, url)
      .header(USER_AGENT, USER_AGENT_VALUE)
      .header(ACCEPT, "application/json");
    match &self.access_token {
      Some(token) => req.header(AUTHORIZATION, format!("Bearer {}", token)),
      None => req,
    }
  }

  /// Send and decode; non-2xx statuses become unclassified errors.
  async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, InteractorError> {
    let res = req.send().await?;
    let status = res.status();
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      let msg = extract_api_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      error!(target: "discussion", %status, error = %msg, "Discussion API request failed");
      return Err(InteractorError::other(format!("Discussion API HTTP {}: {}", status, msg)));
    }
    let text = res.text().await?;
    debug!(target: "discussion", %status, body_len = text.len(), "Discussion API response");
    serde_json::from_str::<T>(&text).map_err(|e| InteractorError::other(format!("JSON parse error: {}", e)))
  }

  async fn patch_comment(&self, comment_id: &str, patch: &CommentPatchBody) -> Result<Comment, InteractorError> {
    let body = serde_json::to_vec(patch).map_err(|e| InteractorError::other(e.to_string()))?;
    let req = self.request(Method::PATCH, &self.comment_url(comment_id))
      .header(CONTENT_TYPE, MERGE_PATCH_JSON)
      .body(body);
    self.send_json(req).await
  }
}

#[async_trait]
impl DiscussionInteractor for HttpDiscussionInteractor {
  #[instrument(level = "info", skip(self))]
  async fn get_comment_responses(&self, comment_id: &str, page: u32) -> Result<ResponsesPage, InteractorError> {
    let req = self.request(Method::GET, &self.comment_url(comment_id))
      .query(&[("page", page.to_string()), ("requested_fields", "profile_image".to_string())]);
    self.send_json(req).await
  }

  #[instrument(level = "info", skip(self))]
  async fn set_comment_voted(&self, comment_id: &str, voted: bool) -> Result<Comment, InteractorError> {
    self.patch_comment(comment_id, &CommentPatchBody { voted: Some(voted), abuse_flagged: None }).await
  }

  #[instrument(level = "info", skip(self))]
  async fn set_comment_flagged(&self, comment_id: &str, flagged: bool) -> Result<Comment, InteractorError> {
    self.patch_comment(comment_id, &CommentPatchBody { voted: None, abuse_flagged: Some(flagged) }).await
  }

  #[instrument(level = "info", skip(self, body), fields(body_len = body.len()))]
  async fn create_comment(&self, thread_id: &str, body: &str, parent_id: Option<&str>) -> Result<Comment, InteractorError> {
    let payload = CreateCommentBody {
      thread_id: thread_id.to_string(),
      raw_body: body.to_string(),
      parent_id: parent_id.map(str::to_string),
    };
    let req = self.request(Method::POST, &self.comments_url())
      .query(&[("requested_fields", "profile_image")])
      .json(&payload);
    self.send_json(req).await
  }
}

// --- Request DTOs ---

#[derive(Serialize)]
struct CommentPatchBody {
  #[serde(skip_serializing_if = "Option::is_none")]
  voted: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  abuse_flagged: Option<bool>,
}

#[derive(Serialize)]
struct CreateCommentBody {
  thread_id: String,
  raw_body: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  parent_id: Option<String>,
}

/// Try to extract a readable message from a discussion API error body.
fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EObj {
    #[serde(default)] developer_message: Option<String>,
    #[serde(default)] detail: Option<String>,
  }
  let e = serde_json::from_str::<EObj>(body).ok()?;
  e.developer_message.or(e.detail)
}

#[cfg(test)]
mod tests {
  use super::*;

  use axum::extract::{Path, Query};
  use axum::http::{HeaderMap, StatusCode};
  use axum::routing::{get, post};
  use axum::{Json, Router};
  use serde_json::{json, Value};
  use std::collections::HashMap;

  fn api(base_url: &str) -> HttpDiscussionInteractor {
    HttpDiscussionInteractor::from_config(&ApiConfig {
      base_url: base_url.to_string(),
      access_token: Some("tok".into()),
      timeout_secs: 5,
    })
    .expect("client")
  }

  async fn get_responses(
    Path(id): Path<String>,
    Query(q): Query<HashMap<String, String>>,
    headers: HeaderMap,
  ) -> (StatusCode, Json<Value>) {
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer tok") {
      return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "no token"})));
    }
    if id == "missing" {
      return (StatusCode::NOT_FOUND, Json(json!({"developer_message": "Comment not found"})));
    }
    let page = q.get("page").cloned().unwrap_or_default();
    let next = if page == "1" { json!("http://x/?page=2") } else { Value::Null };
    (StatusCode::OK, Json(json!({
      "results": [{"id": format!("{id}-r{page}"), "thread_id": "t1", "parent_id": id}],
      "pagination": {"next": next, "previous": null, "count": 2, "num_pages": 2}
    })))
  }

  async fn patch_comment(Path(id): Path<String>, headers: HeaderMap, body: String) -> Json<Value> {
    assert_eq!(headers.get("content-type").and_then(|v| v.to_str().ok()), Some(MERGE_PATCH_JSON));
    let patch: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    let voted = patch.get("voted").and_then(Value::as_bool).unwrap_or(false);
    let flagged = patch.get("abuse_flagged").and_then(Value::as_bool).unwrap_or(false);
    Json(json!({"id": id, "voted": voted, "vote_count": if voted { 1 } else { 0 }, "abuse_flagged": flagged}))
  }

  async fn create(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
      "id": "new",
      "thread_id": body["thread_id"],
      "parent_id": body["parent_id"],
      "raw_body": body["raw_body"],
    }))
  }

  async fn serve() -> String {
    let app = Router::new()
      .route("/api/discussion/v1/comments/", post(create))
      .route("/api/discussion/v1/comments/:id/", get(get_responses).patch(patch_comment));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
      let _ = axum::serve(listener, app).await;
    });
    format!("http://{}/", addr)
  }

  #[tokio::test]
  async fn fetches_pages_and_reads_next_link() {
    let api = api(&serve().await);
    let p1 = api.get_comment_responses("c1", 1).await.expect("page 1");
    assert_eq!(p1.results[0].id, "c1-r1");
    assert!(p1.has_next());
    let p2 = api.get_comment_responses("c1", 2).await.expect("page 2");
    assert_eq!(p2.results[0].id, "c1-r2");
    assert!(!p2.has_next());
  }

  #[tokio::test]
  async fn vote_flag_and_create_round_trip() {
    let api = api(&serve().await);
    let voted = api.set_comment_voted("c2", true).await.expect("vote");
    assert!(voted.voted);
    assert_eq!(voted.vote_count, 1);

    let flagged = api.set_comment_flagged("c2", true).await.expect("flag");
    assert!(flagged.abuse_flagged);
    assert!(!flagged.voted);

    let created = api.create_comment("t1", "hi", Some("c1")).await.expect("create");
    assert_eq!(created.thread_id, "t1");
    assert_eq!(created.parent_id.as_deref(), Some("c1"));
    assert_eq!(created.raw_body, "hi");
  }

  #[tokio::test]
  async fn http_status_errors_are_unclassified() {
    let api = api(&serve().await);
    let err = api.get_comment_responses("missing", 1).await.expect_err("404");
    assert!(!err.is_connectivity());
    assert!(err.message().contains("Comment not found"), "{}", err);
  }

  #[tokio::test]
  async fn refused_connection_is_connectivity() {
    // Bind then drop to get a local port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let err = api(&format!("http://{}", addr)).get_comment_responses("c1", 1).await.expect_err("refused");
    assert!(err.is_connectivity(), "{}", err);
  }

  #[test]
  fn api_error_body_extraction() {
    assert_eq!(extract_api_error(r#"{"developer_message":"boom"}"#).as_deref(), Some("boom"));
    assert_eq!(extract_api_error(r#"{"detail":"nope"}"#).as_deref(), Some("nope"));
    assert_eq!(extract_api_error("<html>"), None);
  }
}
