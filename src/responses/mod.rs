//! Responses view-model: paginates the replies to one comment, applies
//! vote/flag/create results, and republishes an immutable snapshot after every
//! change.
//!
//! Outputs:
//!   - `ui_state`: one current `ResponsesUiState` (watch)
//!   - `can_load_more` / `is_updating`: current flags (watch)
//!   - transient `UiMessage`s: delivered once, never replayed (mpsc)
//!   - `DiscussionEvent::CommentUpdated` on the notifier bus when the parent changes
//!
//! All state lives behind one lock that is never held across an interactor
//! call; apply + publish happen in the same critical section. `close()` (or
//! drop) cancels every in-flight call and nothing is published afterwards.

pub mod pagination;
pub mod reconcile;

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::Messages;
use crate::domain::{Comment, CommentPatch};
use crate::interactor::{DiscussionInteractor, InteractorError};
use crate::notifier::{DiscussionEvent, DiscussionNotifier};
use crate::session::SessionStore;

use pagination::{FetchOutcome, FetchTicket, ResponsesState};
use reconcile::PatchTarget;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResponsesUiState {
    Loading,
    Success { comment: Comment, responses: Vec<Comment> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Error,
    Info,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UiMessage {
    pub kind: MessageKind,
    pub text: String,
}

pub struct ResponsesViewModel {
    comment_id: String,
    interactor: Arc<dyn DiscussionInteractor>,
    notifier: DiscussionNotifier,
    session: Arc<dyn SessionStore>,
    messages: Messages,

    state: Mutex<ResponsesState>,
    ui_state: watch::Sender<ResponsesUiState>,
    can_load_more: watch::Sender<bool>,
    is_updating: watch::Sender<bool>,
    message_tx: mpsc::UnboundedSender<UiMessage>,
    message_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<UiMessage>>>,
    cancel: CancellationToken,
}

impl ResponsesViewModel {
    /// Build the view-model for `comment` and start loading page 1 right away.
    /// Must be called inside a tokio runtime.
    pub fn new(
        comment: Comment,
        interactor: Arc<dyn DiscussionInteractor>,
        notifier: DiscussionNotifier,
        session: Arc<dyn SessionStore>,
        messages: Messages,
    ) -> Arc<Self> {
        let (ui_state, _) = watch::channel(ResponsesUiState::Loading);
        let (can_load_more, _) = watch::channel(true);
        let (is_updating, _) = watch::channel(false);
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        let vm = Arc::new(Self {
            comment_id: comment.id.clone(),
            interactor,
            notifier,
            session,
            messages,
            state: Mutex::new(ResponsesState::new(comment)),
            ui_state,
            can_load_more,
            is_updating,
            message_tx,
            message_rx: std::sync::Mutex::new(Some(message_rx)),
            cancel: CancellationToken::new(),
        });

        let this = vm.clone();
        tokio::spawn(async move { this.load_initial().await });
        vm
    }

    pub fn comment_id(&self) -> &str {
        &self.comment_id
    }

    #[cfg(test)]
    pub fn ui_state(&self) -> ResponsesUiState {
        self.ui_state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ResponsesUiState> {
        self.ui_state.subscribe()
    }

    pub fn subscribe_can_load_more(&self) -> watch::Receiver<bool> {
        self.can_load_more.subscribe()
    }

    pub fn subscribe_updating(&self) -> watch::Receiver<bool> {
        self.is_updating.subscribe()
    }

    /// The message queue has a single consumer; later calls get `None`.
    pub fn take_messages(&self) -> Option<mpsc::UnboundedReceiver<UiMessage>> {
        self.message_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    /// Tear down: cancel in-flight calls and stop publishing.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            info!(target: "discussion", comment_id = %self.comment_id, "Responses view-model closed");
        }
        self.cancel.cancel();
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fires once this view-model is closed or dropped. Cancelling the
    /// returned token does not close the view-model.
    pub fn closed_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    async fn load_initial(&self) {
        let ticket = self.state.lock().await.begin_initial();
        self.run_fetch(ticket).await;
    }

    /// Start over from page 1, discarding what is loaded.
    #[instrument(level = "info", skip(self), fields(comment_id = %self.comment_id))]
    pub async fn refresh(&self) {
        let ticket = {
            let mut state = self.state.lock().await;
            if self.cancel.is_cancelled() {
                return;
            }
            let ticket = state.begin_refresh();
            self.is_updating.send_replace(true);
            self.can_load_more.send_replace(true);
            ticket
        };
        self.run_fetch(ticket).await;
    }

    /// Load the next page; a no-op while a fetch is running or after the last page.
    #[instrument(level = "info", skip(self), fields(comment_id = %self.comment_id))]
    pub async fn fetch_more(&self) {
        let ticket = {
            let mut state = self.state.lock().await;
            if self.cancel.is_cancelled() {
                return;
            }
            state.begin_load_more()
        };
        match ticket {
            Some(ticket) => self.run_fetch(ticket).await,
            None => debug!(target: "discussion", comment_id = %self.comment_id, "fetch_more skipped (busy or no more pages)"),
        }
    }

    async fn run_fetch(&self, ticket: FetchTicket) {
        let call = self.interactor.get_comment_responses(&self.comment_id, ticket.page);
        let Some(result) = self.cancellable(call).await else { return };

        let mut state = self.state.lock().await;
        if self.cancel.is_cancelled() {
            return;
        }
        match state.finish_fetch(ticket, result) {
            FetchOutcome::Applied { can_load_more } => {
                debug!(target: "discussion", comment_id = %self.comment_id, page = ticket.page, loaded = state.responses.len(), can_load_more, "Page applied");
                self.can_load_more.send_replace(can_load_more);
                self.is_updating.send_replace(false);
                self.publish(&state);
            }
            FetchOutcome::Failed(e) => {
                self.is_updating.send_replace(false);
                self.report(&e);
            }
            FetchOutcome::Stale => {
                debug!(target: "discussion", comment_id = %self.comment_id, page = ticket.page, "Discarding stale page");
            }
        }
    }

    #[instrument(level = "info", skip(self))]
    pub async fn set_comment_vote(&self, comment_id: &str, voted: bool) {
        let Some(result) = self.cancellable(self.interactor.set_comment_voted(comment_id, voted)).await else { return };
        match result {
            Ok(echo) => self.apply_patch(comment_id, CommentPatch::vote_from(&echo)).await,
            Err(e) => self.report(&e),
        }
    }

    #[instrument(level = "info", skip(self))]
    pub async fn set_comment_flagged(&self, comment_id: &str, flagged: bool) {
        let Some(result) = self.cancellable(self.interactor.set_comment_flagged(comment_id, flagged)).await else { return };
        match result {
            Ok(echo) => self.apply_patch(comment_id, CommentPatch::flag_from(&echo)).await,
            Err(e) => self.report(&e),
        }
    }

    /// Post a reply. The parent's child count always goes up by one; the reply
    /// itself only becomes visible here once every page is loaded.
    #[instrument(level = "info", skip(self, body), fields(body_len = body.len()))]
    pub async fn create_comment(&self, thread_id: &str, body: &str, parent_id: Option<&str>) {
        let call = self.interactor.create_comment(thread_id, body, parent_id);
        let Some(result) = self.cancellable(call).await else { return };
        let created = match result {
            Ok(c) => c,
            Err(e) => return self.report(&e),
        };

        let mut state = self.state.lock().await;
        if self.cancel.is_cancelled() {
            return;
        }
        let author = self.session.current_profile();
        let appended = reconcile::apply_created(&mut state, created, author);
        info!(target: "discussion", comment_id = %self.comment_id, appended, child_count = state.comment.child_count, "Comment created");
        self.notifier.send(DiscussionEvent::CommentUpdated(state.comment.clone()));
        if !appended {
            self.push_message(MessageKind::Info, self.messages.comment_added.clone());
        }
        self.publish(&state);
    }

    async fn apply_patch(&self, target_id: &str, patch: CommentPatch) {
        let mut state = self.state.lock().await;
        if self.cancel.is_cancelled() {
            return;
        }
        match reconcile::apply_patch(&mut state, target_id, &patch) {
            PatchTarget::Response(index) => {
                debug!(target: "discussion", %target_id, index, ?patch, "Response updated");
                self.publish(&state);
            }
            PatchTarget::Parent => {
                debug!(target: "discussion", %target_id, ?patch, "Parent comment updated");
                self.notifier.send(DiscussionEvent::CommentUpdated(state.comment.clone()));
                self.publish(&state);
            }
            PatchTarget::Missing => {
                debug!(target: "discussion", %target_id, "Mutation target no longer loaded; dropping result");
            }
        }
    }

    fn publish(&self, state: &ResponsesState) {
        self.ui_state.send_replace(ResponsesUiState::Success {
            comment: state.comment.clone(),
            responses: state.responses.clone(),
        });
    }

    fn report(&self, e: &InteractorError) {
        if self.cancel.is_cancelled() {
            return;
        }
        warn!(target: "discussion", comment_id = %self.comment_id, error = %e, connectivity = e.is_connectivity(), "Discussion call failed");
        let text = if e.is_connectivity() {
            self.messages.no_connection.clone()
        } else {
            self.messages.unknown_error.clone()
        };
        self.push_message(MessageKind::Error, text);
    }

    fn push_message(&self, kind: MessageKind, text: String) {
        // Receiver gone means nobody is showing messages anymore.
        let _ = self.message_tx.send(UiMessage { kind, text });
    }

    /// `None` when the view-model was closed before `fut` finished.
    async fn cancellable<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }
}

impl Drop for ResponsesViewModel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
