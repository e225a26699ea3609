//! Domain models used by the discussion client: comments, author profiles,
//! response pages and the server-confirmed patches applied to comments.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Avatar urls as returned by the discussion API (`requested_fields=profile_image`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileImage {
  #[serde(default)] pub has_image: bool,
  #[serde(default)] pub image_url_full: String,
  #[serde(default)] pub image_url_large: String,
  #[serde(default)] pub image_url_medium: String,
  #[serde(default)] pub image_url_small: String,
}

impl ProfileImage {
  /// Same url for every size; used for the locally configured user.
  pub fn single(url: &str) -> Self {
    Self {
      has_image: !url.trim().is_empty(),
      image_url_full: url.to_string(),
      image_url_large: url.to_string(),
      image_url_medium: url.to_string(),
      image_url_small: url.to_string(),
    }
  }
}

/// Display profile of a participant, keyed by username in `Comment::users`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionProfile {
  #[serde(default)] pub image: Option<ProfileImage>,
}

/// A single comment (or response) snapshot.
///
/// Published snapshots are never edited in place: every change goes through a
/// copy (`Clone` + struct update) so observers holding an older snapshot keep
/// seeing exactly what they were given.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
  pub id: String,
  #[serde(default)] pub thread_id: String,
  #[serde(default)] pub parent_id: Option<String>,
  #[serde(default)] pub author: String,
  #[serde(default)] pub raw_body: String,
  #[serde(default)] pub rendered_body: String,
  #[serde(default)] pub created_at: String,
  #[serde(default)] pub voted: bool,
  #[serde(default)] pub vote_count: i64,
  #[serde(default)] pub abuse_flagged: bool,
  #[serde(default)] pub endorsed: bool,
  #[serde(default)] pub child_count: i64,
  #[serde(default)] pub users: HashMap<String, DiscussionProfile>,
}

impl Comment {
  /// Copy with one more child response.
  pub fn with_child_added(&self) -> Self {
    Self { child_count: self.child_count + 1, ..self.clone() }
  }
}

/// Pagination block of a paged discussion response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
  #[serde(default)] pub next: Option<String>,
  #[serde(default)] pub previous: Option<String>,
  #[serde(default)] pub count: u32,
  #[serde(default)] pub num_pages: u32,
}

/// One page of responses to a comment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsesPage {
  #[serde(default)] pub results: Vec<Comment>,
  #[serde(default)] pub pagination: Pagination,
}

impl ResponsesPage {
  /// True when the server points at a following page.
  pub fn has_next(&self) -> bool {
    self.pagination.next.as_deref().map_or(false, |n| !n.trim().is_empty())
  }
}

/// Fields confirmed by the server after a vote or flag request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommentPatch {
  Vote { voted: bool, vote_count: i64 },
  Flag { abuse_flagged: bool },
}

impl CommentPatch {
  pub fn vote_from(echo: &Comment) -> Self {
    CommentPatch::Vote { voted: echo.voted, vote_count: echo.vote_count }
  }

  pub fn flag_from(echo: &Comment) -> Self {
    CommentPatch::Flag { abuse_flagged: echo.abuse_flagged }
  }

  /// Copy of `c` carrying only the patched fields.
  pub fn apply(&self, c: &Comment) -> Comment {
    match *self {
      CommentPatch::Vote { voted, vote_count } => Comment { voted, vote_count, ..c.clone() },
      CommentPatch::Flag { abuse_flagged } => Comment { abuse_flagged, ..c.clone() },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn comment_parses_api_payload_and_ignores_unknown_fields() {
    let json = r#"{
      "id": "c1",
      "thread_id": "t1",
      "parent_id": null,
      "author": "edx",
      "author_label": "Staff",
      "raw_body": "hello",
      "rendered_body": "<p>hello</p>",
      "created_at": "2024-01-01T00:00:00Z",
      "voted": true,
      "vote_count": 3,
      "abuse_flagged": false,
      "editable_fields": ["voted"],
      "child_count": 2,
      "children": [],
      "users": {"edx": {"profile": {}, "image": {"has_image": true, "image_url_full": "http://x/full.png"}}}
    }"#;
    let c: Comment = serde_json::from_str(json).expect("comment");
    assert_eq!(c.id, "c1");
    assert!(c.voted);
    assert_eq!(c.vote_count, 3);
    assert_eq!(c.child_count, 2);
    let img = c.users["edx"].image.as_ref().expect("image");
    assert!(img.has_image);
    assert_eq!(img.image_url_full, "http://x/full.png");
  }

  #[test]
  fn page_has_next_only_for_non_empty_link() {
    let mut page = ResponsesPage::default();
    assert!(!page.has_next());
    page.pagination.next = Some("".into());
    assert!(!page.has_next());
    page.pagination.next = Some("https://host/api/discussion/v1/comments/c1/?page=2".into());
    assert!(page.has_next());
  }

  #[test]
  fn patch_touches_only_its_fields() {
    let base = Comment { id: "c2".into(), raw_body: "body".into(), vote_count: 4, ..Default::default() };
    let voted = CommentPatch::Vote { voted: true, vote_count: 5 }.apply(&base);
    assert_eq!(voted, Comment { voted: true, vote_count: 5, ..base.clone() });

    let flagged = CommentPatch::Flag { abuse_flagged: true }.apply(&base);
    assert_eq!(flagged, Comment { abuse_flagged: true, ..base.clone() });
  }
}
