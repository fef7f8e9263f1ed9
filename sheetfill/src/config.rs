use crate::errors::FillError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;
use std::time::Duration;

/// How option labels are compared with the requested value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Trimmed, case-insensitive equality
    #[default]
    CaseInsensitive,
    /// Trimmed, exact equality
    CaseSensitive,
}

impl MatchPolicy {
    pub fn matches(&self, option_text: &str, desired: &str) -> bool {
        let (option_text, desired) = (option_text.trim(), desired.trim());
        match self {
            MatchPolicy::CaseInsensitive => option_text.to_lowercase() == desired.to_lowercase(),
            MatchPolicy::CaseSensitive => option_text == desired,
        }
    }
}

/// Timing and matching knobs for a fill cycle
///
/// Durations are written as milliseconds in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillerConfig {
    /// Upper bound on one `fillForm` round trip
    #[serde(rename = "fill_timeout_ms", with = "millis")]
    pub fill_timeout: Duration,
    /// Pause between installing the operator and re-probing it
    #[serde(rename = "injection_settle_ms", with = "millis")]
    pub injection_settle: Duration,
    /// Reply window for liveness probes
    #[serde(rename = "ping_timeout_ms", with = "millis")]
    pub ping_timeout: Duration,
    /// Applied to every dropdown that does not override it
    pub match_policy: MatchPolicy,
}

impl Default for FillerConfig {
    fn default() -> Self {
        Self {
            fill_timeout: Duration::from_millis(5000),
            injection_settle: Duration::from_millis(100),
            ping_timeout: Duration::from_millis(1000),
            match_policy: MatchPolicy::CaseInsensitive,
        }
    }
}

impl FillerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, FillError> {
        serde_json::from_str(json).map_err(|e| FillError::Config(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, FillError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| FillError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }
}

pub(crate) mod millis {
    use super::*;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_policies() {
        assert!(MatchPolicy::CaseInsensitive.matches("  Foreign\n", "foreign"));
        assert!(!MatchPolicy::CaseSensitive.matches("Foreign", "foreign"));
        assert!(MatchPolicy::CaseSensitive.matches(" Foreign ", "Foreign"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = FillerConfig::from_json_str(r#"{"fill_timeout_ms": 8000}"#).unwrap();
        assert_eq!(config.fill_timeout, Duration::from_secs(8));
        assert_eq!(config.injection_settle, Duration::from_millis(100));
        assert_eq!(config.match_policy, MatchPolicy::CaseInsensitive);
    }

    #[test]
    fn rejects_unknown_policy() {
        let err = FillerConfig::from_json_str(r#"{"match_policy": "fuzzy"}"#).unwrap_err();
        assert!(matches!(err, FillError::Config(_)));
    }
}
