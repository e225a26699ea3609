//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve service and clients independently.

use serde::{Deserialize, Serialize};

use crate::analytics::{AnalyticsConfig, AnalyticsSource};
use crate::domain::Comment;
use crate::responses::{ResponsesUiState, UiMessage};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    /// Bind this connection to the responses of `comment`. Must come first.
    Open {
        comment: Comment,
    },
    Refresh,
    LoadMore,
    SetVote {
        #[serde(rename = "commentId")]
        comment_id: String,
        voted: bool,
    },
    SetFlag {
        #[serde(rename = "commentId")]
        comment_id: String,
        flagged: bool,
    },
    CreateComment {
        #[serde(rename = "threadId")]
        thread_id: String,
        body: String,
        #[serde(rename = "parentId", default)]
        parent_id: Option<String>,
    },
}

/// Messages the server pushes over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    UiState {
        state: ResponsesUiState,
    },
    CanLoadMore {
        value: bool,
    },
    Updating {
        value: bool,
    },
    Message {
        message: UiMessage,
    },
    CommentUpdated {
        comment: Comment,
    },
    Error {
        message: String,
    },
}

//
// HTTP response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub open_views: usize,
}

#[derive(Serialize)]
pub struct AnalyticsOut {
    pub enabled: bool,
    pub source: AnalyticsSource,
    pub segment_write_key: String,
    pub segment_enabled: bool,
}

impl From<&AnalyticsConfig> for AnalyticsOut {
    fn from(cfg: &AnalyticsConfig) -> Self {
        Self {
            enabled: cfg.enabled,
            source: cfg.source,
            segment_write_key: cfg.segment_write_key.clone(),
            segment_enabled: cfg.is_segment_enabled(),
        }
    }
}
