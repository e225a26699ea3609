//! Signed-in user lookup. Comments echoed back by the server after creation
//! may omit the author's profile, so the view-model fills it in from here.

use crate::config::ProfileConfig;
use crate::domain::{DiscussionProfile, ProfileImage};

pub trait SessionStore: Send + Sync {
    /// Username and display profile of the signed-in user, if any.
    fn current_profile(&self) -> Option<(String, DiscussionProfile)>;
}

/// Session backed by the `[profile]` config section.
#[derive(Clone, Debug, Default)]
pub struct ConfiguredSession {
    username: String,
    image_url: String,
}

impl ConfiguredSession {
    pub fn new(username: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self { username: username.into(), image_url: image_url.into() }
    }

    pub fn from_config(cfg: &ProfileConfig) -> Self {
        Self::new(cfg.username.clone(), cfg.image_url.clone())
    }
}

impl SessionStore for ConfiguredSession {
    fn current_profile(&self) -> Option<(String, DiscussionProfile)> {
        if self.username.trim().is_empty() {
            return None;
        }
        let image = if self.image_url.trim().is_empty() { None } else { Some(ProfileImage::single(&self.image_url)) };
        Some((self.username.clone(), DiscussionProfile { image }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_session_has_no_profile() {
        assert!(ConfiguredSession::default().current_profile().is_none());
    }

    #[test]
    fn configured_session_exposes_avatar() {
        let (name, profile) = ConfiguredSession::new("learner", "https://cdn/a.png")
            .current_profile()
            .expect("profile");
        assert_eq!(name, "learner");
        let img = profile.image.expect("image");
        assert!(img.has_image);
        assert_eq!(img.image_url_small, "https://cdn/a.png");
    }
}
