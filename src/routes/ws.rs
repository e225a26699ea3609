//! WebSocket upgrade + session loop. A connection hosts at most one responses
//! view-model; the view-model's outputs are forwarded as JSON messages and
//! client commands are dispatched to it. Disconnect closes the view-model.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::notifier::DiscussionEvent;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::responses::ResponsesViewModel;
use crate::state::AppState;
use crate::util::trunc_for_log;

type Outbox = mpsc::UnboundedSender<ServerWsMessage>;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "discussion_responses", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state), fields(view_id = %view_id))]
async fn run_session(mut socket: WebSocket, state: Arc<AppState>, view_id: Uuid) {
  let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerWsMessage>();
  let mut vm: Option<Arc<ResponsesViewModel>> = None;

  loop {
    tokio::select! {
      incoming = socket.recv() => match incoming {
        Some(Ok(Message::Text(txt))) => {
          let reply = match serde_json::from_str::<ClientWsMessage>(&txt) {
            Ok(msg) => {
              debug!(target: "discussion_responses", "WS received: {:?}", &msg);
              handle_client_ws(msg, &state, view_id, &mut vm, &out_tx).await
            }
            Err(e) => {
              warn!(target: "discussion_responses", error = %e, raw = %trunc_for_log(&txt, 200), "WS invalid JSON");
              Some(ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) })
            }
          };
          if let Some(reply) = reply {
            let _ = out_tx.send(reply);
          }
        }
        Some(Ok(Message::Ping(payload))) => { let _ = socket.send(Message::Pong(payload)).await; }
        Some(Ok(Message::Close(_))) | None => break,
        Some(Err(e)) => {
          error!(target: "discussion_responses", error = %e, "WS receive error");
          break;
        }
        Some(Ok(_)) => {}
      },
      Some(out) = out_rx.recv() => {
        let text = serde_json::to_string(&out).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });
        if let Err(e) = socket.send(Message::Text(text)).await {
          error!(target: "discussion_responses", error = %e, "WS send error");
          break;
        }
      }
    }
  }

  if let Some(vm) = vm.take() {
    state.close_responses(view_id, &vm).await;
  }
}

async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
  let view_id = Uuid::new_v4();
  info!(target: "discussion_responses", %view_id, "WebSocket connected");
  run_session(socket, state, view_id).await;
  info!(target: "discussion_responses", %view_id, "WebSocket disconnected");
}

async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &AppState,
  view_id: Uuid,
  vm: &mut Option<Arc<ResponsesViewModel>>,
  out: &Outbox,
) -> Option<ServerWsMessage> {
  if let ClientWsMessage::Ping = msg {
    return Some(ServerWsMessage::Pong);
  }
  if let ClientWsMessage::Open { comment } = msg {
    if let Some(old) = vm.take() {
      state.close_responses(view_id, &old).await;
    }
    info!(target: "discussion_responses", %view_id, comment_id = %comment.id, "WS open responses");
    let opened = state.open_responses(view_id, comment).await;
    spawn_forwarders(&opened, state, out);
    *vm = Some(opened);
    return None;
  }

  let Some(current) = vm.clone() else {
    return Some(ServerWsMessage::Error { message: "Send an `open` message first.".into() });
  };
  // Commands run concurrently so a slow request never blocks the socket.
  tokio::spawn(async move {
    match msg {
      ClientWsMessage::Refresh => current.refresh().await,
      ClientWsMessage::LoadMore => current.fetch_more().await,
      ClientWsMessage::SetVote { comment_id, voted } => current.set_comment_vote(&comment_id, voted).await,
      ClientWsMessage::SetFlag { comment_id, flagged } => current.set_comment_flagged(&comment_id, flagged).await,
      ClientWsMessage::CreateComment { thread_id, body, parent_id } => {
        current.create_comment(&thread_id, &body, parent_id.as_deref()).await
      }
      ClientWsMessage::Ping | ClientWsMessage::Open { .. } => {}
    }
  });
  None
}

/// Pipe every view-model output into the connection's outbox. Tasks stop once
/// the view-model is closed (re-`open` or disconnect) or the outbox is gone.
fn spawn_forwarders(vm: &Arc<ResponsesViewModel>, state: &AppState, out: &Outbox) {
  forward_watch(vm.subscribe_state(), out.clone(), vm.closed_token(), |s| ServerWsMessage::UiState { state: s });
  forward_watch(vm.subscribe_can_load_more(), out.clone(), vm.closed_token(), |value| ServerWsMessage::CanLoadMore { value });
  forward_watch(vm.subscribe_updating(), out.clone(), vm.closed_token(), |value| ServerWsMessage::Updating { value });

  if let Some(mut messages) = vm.take_messages() {
    let out = out.clone();
    let closed = vm.closed_token();
    tokio::spawn(async move {
      loop {
        tokio::select! {
          biased;
          _ = closed.cancelled() => break,
          _ = out.closed() => break,
          msg = messages.recv() => match msg {
            Some(message) => { let _ = out.send(ServerWsMessage::Message { message }); }
            None => break,
          },
        }
      }
    });
  }

  let mut events = state.notifier.subscribe();
  let comment_id = vm.comment_id().to_string();
  let out = out.clone();
  let closed = vm.closed_token();
  tokio::spawn(async move {
    loop {
      tokio::select! {
        biased;
        _ = closed.cancelled() => break,
        _ = out.closed() => break,
        ev = events.recv() => match ev {
          Ok(DiscussionEvent::CommentUpdated(comment)) => {
            if comment.id == comment_id {
              let _ = out.send(ServerWsMessage::CommentUpdated { comment });
            }
          }
          Err(broadcast::error::RecvError::Lagged(n)) => {
            warn!(target: "discussion_responses", skipped = n, "Notifier subscriber lagged");
          }
          Err(broadcast::error::RecvError::Closed) => break,
        },
      }
    }
    debug!(target: "discussion_responses", %comment_id, "Notifier forwarder stopped");
  });
}

fn forward_watch<T, F>(mut rx: watch::Receiver<T>, out: Outbox, closed: CancellationToken, to_msg: F)
where
  T: Clone + Send + Sync + 'static,
  F: Fn(T) -> ServerWsMessage + Send + 'static,
{
  tokio::spawn(async move {
    loop {
      if closed.is_cancelled() {
        break;
      }
      let value = rx.borrow_and_update().clone();
      if out.send(to_msg(value)).is_err() {
        break;
      }
      tokio::select! {
        biased;
        _ = closed.cancelled() => break,
        _ = out.closed() => break,
        changed = rx.changed() => if changed.is_err() { break },
      }
    }
  });
}

#[cfg(test)]
mod tests {
  use super::*;

  use std::sync::atomic::{AtomicU32, Ordering};
  use std::time::Duration;

  use async_trait::async_trait;

  use crate::analytics::AnalyticsConfig;
  use crate::config::Messages;
  use crate::domain::{Comment, Pagination, ResponsesPage};
  use crate::interactor::{DiscussionInteractor, InteractorError};
  use crate::responses::ResponsesUiState;
  use crate::session::ConfiguredSession;

  /// Every fetch returns a single reply `{comment}-{n}` (n counts fetches) and no
  /// next page. Votes echo back; flags fail offline; creation fails.
  #[derive(Default)]
  struct Scripted {
    fetches: AtomicU32,
  }

  #[async_trait]
  impl DiscussionInteractor for Scripted {
    async fn get_comment_responses(&self, comment_id: &str, _page: u32) -> Result<ResponsesPage, InteractorError> {
      let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
      Ok(ResponsesPage { results: vec![comment(&format!("{comment_id}-{n}"))], pagination: Pagination::default() })
    }
    async fn set_comment_voted(&self, comment_id: &str, voted: bool) -> Result<Comment, InteractorError> {
      Ok(Comment { voted, vote_count: 1, ..comment(comment_id) })
    }
    async fn set_comment_flagged(&self, _: &str, _: bool) -> Result<Comment, InteractorError> {
      Err(InteractorError::connectivity("offline"))
    }
    async fn create_comment(&self, _: &str, _: &str, _: Option<&str>) -> Result<Comment, InteractorError> {
      Err(InteractorError::other("500"))
    }
  }

  fn comment(id: &str) -> Comment {
    Comment { id: id.into(), thread_id: "t1".into(), ..Default::default() }
  }

  fn app_state() -> AppState {
    AppState::from_parts(
      Arc::new(Scripted::default()),
      Arc::new(ConfiguredSession::default()),
      Messages::default(),
      AnalyticsConfig::default(),
    )
  }

  fn open(id: &str) -> ClientWsMessage {
    ClientWsMessage::Open { comment: comment(id) }
  }

  fn loaded_ids(msg: &ServerWsMessage) -> Option<Vec<String>> {
    match msg {
      ServerWsMessage::UiState { state: ResponsesUiState::Success { responses, .. } } => {
        Some(responses.iter().map(|c| c.id.clone()).collect())
      }
      _ => None,
    }
  }

  async fn next_matching(
    rx: &mut mpsc::UnboundedReceiver<ServerWsMessage>,
    pred: impl Fn(&ServerWsMessage) -> bool,
  ) -> ServerWsMessage {
    tokio::time::timeout(Duration::from_secs(2), async {
      loop {
        let msg = rx.recv().await.expect("outbox open");
        if pred(&msg) {
          return msg;
        }
      }
    })
    .await
    .expect("frame in time")
  }

  /// Let spawned forwarders run, then count what reached the outbox.
  async fn drain_comment_updates(rx: &mut mpsc::UnboundedReceiver<ServerWsMessage>) -> usize {
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut n = 0;
    while let Ok(msg) = rx.try_recv() {
      if matches!(msg, ServerWsMessage::CommentUpdated { .. }) {
        n += 1;
      }
    }
    n
  }

  #[tokio::test]
  async fn commands_before_open_are_rejected() {
    let state = app_state();
    let (out, mut rx) = mpsc::unbounded_channel();
    let mut vm = None;
    let view_id = Uuid::new_v4();

    let reply = handle_client_ws(ClientWsMessage::LoadMore, &state, view_id, &mut vm, &out).await;
    assert!(matches!(reply, Some(ServerWsMessage::Error { message }) if message.contains("`open`")));
    let reply = handle_client_ws(ClientWsMessage::Ping, &state, view_id, &mut vm, &out).await;
    assert!(matches!(reply, Some(ServerWsMessage::Pong)));

    assert!(vm.is_none());
    assert!(rx.try_recv().is_err());
    assert_eq!(state.open_view_count().await, 0);
  }

  #[tokio::test]
  async fn commands_are_dispatched_and_outputs_forwarded() {
    let state = app_state();
    let (out, mut rx) = mpsc::unbounded_channel();
    let mut vm = None;
    let view_id = Uuid::new_v4();

    assert!(handle_client_ws(open("p"), &state, view_id, &mut vm, &out).await.is_none());
    assert_eq!(state.open_view_count().await, 1);
    next_matching(&mut rx, |m| loaded_ids(m) == Some(vec!["p-1".to_string()])).await;
    assert!(!*vm.as_ref().expect("open").subscribe_can_load_more().borrow());

    let vote = ClientWsMessage::SetVote { comment_id: "p-1".into(), voted: true };
    assert!(handle_client_ws(vote, &state, view_id, &mut vm, &out).await.is_none());
    next_matching(&mut rx, |m| {
      matches!(m, ServerWsMessage::UiState { state: ResponsesUiState::Success { responses, .. } } if responses[0].voted)
    })
    .await;

    assert!(handle_client_ws(ClientWsMessage::Refresh, &state, view_id, &mut vm, &out).await.is_none());
    next_matching(&mut rx, |m| loaded_ids(m) == Some(vec!["p-2".to_string()])).await;

    let flag = ClientWsMessage::SetFlag { comment_id: "p".into(), flagged: true };
    assert!(handle_client_ws(flag, &state, view_id, &mut vm, &out).await.is_none());
    let no_connection = Messages::default().no_connection;
    next_matching(&mut rx, |m| matches!(m, ServerWsMessage::Message { message } if message.text == no_connection)).await;
  }

  #[tokio::test]
  async fn reopen_forwards_each_event_once() {
    let state = app_state();
    let (out, mut rx) = mpsc::unbounded_channel();
    let mut vm = None;
    let view_id = Uuid::new_v4();

    let mut opened = Vec::new();
    for _ in 0..3 {
      handle_client_ws(open("p"), &state, view_id, &mut vm, &out).await;
      opened.push(vm.clone().expect("open"));
    }
    assert!(opened[0].is_closed() && opened[1].is_closed());
    assert!(!opened[2].is_closed());
    assert_eq!(state.open_view_count().await, 1);

    state.notifier.send(DiscussionEvent::CommentUpdated(comment("p")));
    next_matching(&mut rx, |m| matches!(m, ServerWsMessage::CommentUpdated { comment } if comment.id == "p")).await;
    assert_eq!(drain_comment_updates(&mut rx).await, 0);
  }

  #[tokio::test]
  async fn closed_view_stops_forwarding() {
    let state = app_state();
    let (out, mut rx) = mpsc::unbounded_channel();
    let mut vm = None;
    let view_id = Uuid::new_v4();

    handle_client_ws(open("p"), &state, view_id, &mut vm, &out).await;
    next_matching(&mut rx, |m| loaded_ids(m).is_some()).await;

    let current = vm.take().expect("open");
    state.close_responses(view_id, &current).await;
    assert!(current.is_closed());
    assert_eq!(state.open_view_count().await, 0);

    state.notifier.send(DiscussionEvent::CommentUpdated(comment("p")));
    assert_eq!(drain_comment_updates(&mut rx).await, 0);
  }
}
