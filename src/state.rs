//! Application state: interactor, notifier bus, session profile, user-facing
//! strings, analytics routing, and the registry of open responses views.
//!
//! Built once at startup from `AppConfig`; every WebSocket connection borrows
//! it to create its own `ResponsesViewModel`.

use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::analytics::AnalyticsConfig;
use crate::config::{AppConfig, Messages};
use crate::domain::Comment;
use crate::interactor::{DiscussionInteractor, HttpDiscussionInteractor, InteractorError};
use crate::notifier::DiscussionNotifier;
use crate::responses::ResponsesViewModel;
use crate::session::{ConfiguredSession, SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub interactor: Arc<dyn DiscussionInteractor>,
    pub notifier: DiscussionNotifier,
    pub session: Arc<dyn SessionStore>,
    pub messages: Messages,
    pub analytics: AnalyticsConfig,
    /// Open views: connection id -> comment id.
    pub open_views: Arc<RwLock<HashMap<Uuid, String>>>,
}

impl AppState {
    /// Build state from config: HTTP interactor, session profile, strings.
    #[instrument(level = "info", skip_all)]
    pub fn from_config(cfg: &AppConfig) -> Result<Self, InteractorError> {
        let interactor = HttpDiscussionInteractor::from_config(&cfg.api)?;
        info!(
            target: "discussion_responses",
            base_url = %interactor.base_url,
            authenticated = cfg.api.access_token.is_some(),
            timeout_secs = cfg.api.timeout_secs,
            "Discussion API client ready"
        );
        if cfg.analytics.is_segment_enabled() {
            info!(target: "discussion_responses", "Analytics routed to Segment");
        } else {
            info!(target: "discussion_responses", source = ?cfg.analytics.source, enabled = cfg.analytics.enabled, "Segment analytics disabled");
        }
        Ok(Self::from_parts(
            Arc::new(interactor),
            Arc::new(ConfiguredSession::from_config(&cfg.profile)),
            cfg.messages.clone(),
            cfg.analytics.clone(),
        ))
    }

    pub fn from_parts(
        interactor: Arc<dyn DiscussionInteractor>,
        session: Arc<dyn SessionStore>,
        messages: Messages,
        analytics: AnalyticsConfig,
    ) -> Self {
        Self {
            interactor,
            notifier: DiscussionNotifier::new(),
            session,
            messages,
            analytics,
            open_views: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// New view-model for `comment`, tracked under `view_id` until `close_responses`.
    #[instrument(level = "info", skip(self, comment), fields(comment_id = %comment.id))]
    pub async fn open_responses(&self, view_id: Uuid, comment: Comment) -> Arc<ResponsesViewModel> {
        self.open_views.write().await.insert(view_id, comment.id.clone());
        ResponsesViewModel::new(
            comment,
            self.interactor.clone(),
            self.notifier.clone(),
            self.session.clone(),
            self.messages.clone(),
        )
    }

    pub async fn close_responses(&self, view_id: Uuid, vm: &ResponsesViewModel) {
        vm.close();
        self.open_views.write().await.remove(&view_id);
    }

    pub async fn open_view_count(&self) -> usize {
        self.open_views.read().await.len()
    }
}
