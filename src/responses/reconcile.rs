//! Applying server-confirmed mutations to the loaded responses.

use crate::domain::{Comment, CommentPatch, DiscussionProfile};

use super::pagination::ResponsesState;

/// Where a vote/flag result landed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchTarget {
    Response(usize),
    Parent,
    /// Neither loaded nor the parent, e.g. discarded by a refresh in between.
    Missing,
}

/// Loaded responses are searched first; anything else is the parent.
pub fn apply_patch(state: &mut ResponsesState, target_id: &str, patch: &CommentPatch) -> PatchTarget {
    if let Some(i) = state.responses.iter().position(|c| c.id == target_id) {
        state.responses[i] = patch.apply(&state.responses[i]);
        PatchTarget::Response(i)
    } else if state.comment.id == target_id {
        state.comment = patch.apply(&state.comment);
        PatchTarget::Parent
    } else {
        PatchTarget::Missing
    }
}

/// Count a new reply on the parent and, once every page is loaded, show it.
/// Returns whether the reply was appended to the visible list.
pub fn apply_created(state: &mut ResponsesState, created: Comment, author: Option<(String, DiscussionProfile)>) -> bool {
    let created = with_author(created, author);
    state.comment = state.comment.with_child_added();
    if state.cursor.is_end() {
        state.responses.push(created);
        true
    } else {
        false
    }
}

fn with_author(mut created: Comment, author: Option<(String, DiscussionProfile)>) -> Comment {
    if let Some((username, profile)) = author {
        created.users.entry(username).or_insert(profile);
    }
    created
}
