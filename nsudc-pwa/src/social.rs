//! Social follower counts for the header badges.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformStats {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub followers: Option<f64>,
    /// Preformatted suffix, e.g. `"k+"`; when present the count is shown as is.
    #[serde(default)]
    pub unit: Option<String>,
}

/// `social.json`: platform key → stats.
pub type SocialStats = BTreeMap<String, PlatformStats>;

pub fn parse(json: &str) -> Result<SocialStats, serde_json::Error> {
    serde_json::from_str(json)
}

/// Format a follower count: `unit` wins, then one-decimal thousands.
pub fn format_followers(value: Option<f64>, unit: Option<&str>) -> String {
    let Some(value) = value else {
        return "0".to_string();
    };
    if let Some(unit) = unit.filter(|u| !u.is_empty()) {
        return format!("{}{unit}", number(value));
    }
    if value >= 1000.0 {
        return format!("{:.1}k", value / 1000.0);
    }
    number(value)
}

fn number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Two upper-case letters from the first word of the label (or the
/// platform key).
pub fn short_label(platform: &str, label: Option<&str>) -> String {
    let source = label.filter(|l| !l.is_empty()).unwrap_or(platform);
    source
        .split(' ')
        .next()
        .unwrap_or_default()
        .chars()
        .take(2)
        .collect::<String>()
        .to_uppercase()
}

impl PlatformStats {
    /// Badge text, e.g. `"IN 1.2k"`.
    pub fn badge(&self, platform: &str) -> String {
        format!(
            "{} {}",
            short_label(platform, self.label.as_deref()),
            format_followers(self.followers, self.unit.as_deref())
        )
    }
}
