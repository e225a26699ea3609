//! Analytics routing configuration.
//!
//! Passive record read from the `[analytics]` TOML section. The only behavior
//! is deciding whether events should be forwarded to the Segment SDK.

use serde::{Deserialize, Serialize};

/// Which third-party SDK receives analytics events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsSource {
  Segment,
  #[default]
  None,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
  #[serde(default)] pub enabled: bool,
  #[serde(default)] pub source: AnalyticsSource,
  #[serde(default)] pub segment_write_key: String,
}

impl AnalyticsConfig {
  /// Events go to Segment only when switched on, routed there, and keyed.
  pub fn is_segment_enabled(&self) -> bool {
    self.enabled && self.source == AnalyticsSource::Segment && !self.segment_write_key.trim().is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn segment_requires_flag_source_and_key() {
    let mut cfg = AnalyticsConfig {
      enabled: true,
      source: AnalyticsSource::Segment,
      segment_write_key: "wk_123".into(),
    };
    assert!(cfg.is_segment_enabled());

    cfg.segment_write_key = "   ".into();
    assert!(!cfg.is_segment_enabled());

    cfg.segment_write_key = "wk_123".into();
    cfg.source = AnalyticsSource::None;
    assert!(!cfg.is_segment_enabled());

    cfg.source = AnalyticsSource::Segment;
    cfg.enabled = false;
    assert!(!cfg.is_segment_enabled());
  }

  #[test]
  fn default_is_disabled() {
    assert!(!AnalyticsConfig::default().is_segment_enabled());
  }
}
