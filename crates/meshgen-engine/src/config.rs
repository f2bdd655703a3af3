use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::poller::PollPolicy;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const MAX_POLL_ATTEMPTS: u32 = 10_000;

/// Runtime settings for a [`Studio`](crate::Studio).
///
/// Numeric values are read as seconds (fractions allowed) and clamped into
/// a sane range; unparsable values fall back to the default.
#[derive(Debug, Clone, PartialEq)]
pub struct StudioConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub poll: PollPolicy,
    pub request_timeout: Duration,
    /// Status checks the dryrun backend reports as pending before finishing.
    pub dryrun_pending_checks: u32,
    pub receipts_dir: Option<PathBuf>,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            poll: PollPolicy::default(),
            request_timeout: Duration::from_secs(120),
            dryrun_pending_checks: 2,
            receipts_dir: None,
        }
    }
}

impl StudioConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let api_key = lookup("GEMINI_API_KEY").or_else(|| lookup("GOOGLE_API_KEY"));
        let api_base = lookup("MESHGEN_API_BASE")
            .or_else(|| lookup("GEMINI_API_BASE"))
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or(defaults.api_base);

        let seconds = |key: &str, default: Duration, min: f64, max: f64| {
            Duration::from_secs_f64(value_as_f64(
                lookup(key).as_deref(),
                default.as_secs_f64(),
                min,
                max,
            ))
        };
        let poll = PollPolicy {
            interval: seconds("MESHGEN_POLL_INTERVAL", defaults.poll.interval, 0.1, 60.0),
            max_wait: seconds("MESHGEN_MAX_WAIT", defaults.poll.max_wait, 1.0, 3600.0),
            max_attempts: value_as_f64(
                lookup("MESHGEN_MAX_ATTEMPTS").as_deref(),
                f64::from(defaults.poll.max_attempts),
                1.0,
                f64::from(MAX_POLL_ATTEMPTS),
            ) as u32,
        };

        Self {
            api_key,
            api_base,
            poll,
            request_timeout: seconds(
                "MESHGEN_REQUEST_TIMEOUT",
                defaults.request_timeout,
                1.0,
                600.0,
            ),
            dryrun_pending_checks: value_as_f64(
                lookup("MESHGEN_DRYRUN_CHECKS").as_deref(),
                f64::from(defaults.dryrun_pending_checks),
                0.0,
                50.0,
            ) as u32,
            receipts_dir: lookup("MESHGEN_RECEIPTS_DIR").map(PathBuf::from),
        }
    }

    /// Applies command-line poll settings on top of the environment. Values
    /// are clamped to the same ranges as their environment counterparts and
    /// non-finite numbers are ignored.
    pub fn with_poll_overrides(
        mut self,
        interval_s: Option<f64>,
        max_wait_s: Option<f64>,
        max_attempts: Option<u32>,
    ) -> Self {
        if let Some(interval) = interval_s.filter(|value| value.is_finite()) {
            self.poll.interval = Duration::from_secs_f64(interval.clamp(0.0, 60.0));
        }
        if let Some(max_wait) = max_wait_s.filter(|value| value.is_finite()) {
            self.poll.max_wait = Duration::from_secs_f64(max_wait.clamp(0.0, 3600.0));
        }
        if let Some(max_attempts) = max_attempts {
            self.poll.max_attempts = max_attempts.clamp(1, MAX_POLL_ATTEMPTS);
        }
        self
    }
}

fn value_as_f64(value: Option<&str>, default: f64, min: f64, max: f64) -> f64 {
    value
        .and_then(|text| text.trim().parse::<f64>().ok())
        .filter(|parsed| parsed.is_finite())
        .unwrap_or(default)
        .clamp(min, max)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::{StudioConfig, DEFAULT_API_BASE};

    fn config(pairs: &[(&str, &str)]) -> StudioConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        StudioConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_environment() {
        let cfg = config(&[]);
        assert_eq!(cfg, StudioConfig::default());
        assert_eq!(cfg.api_base, DEFAULT_API_BASE);
        assert_eq!(cfg.poll.interval, Duration::from_secs(5));
        assert_eq!(cfg.poll.max_attempts, 120);
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn reads_and_clamps_values() {
        let cfg = config(&[
            ("GOOGLE_API_KEY", "g-key"),
            ("MESHGEN_API_BASE", "http://localhost:9000/v1beta/"),
            ("MESHGEN_POLL_INTERVAL", "0.5"),
            ("MESHGEN_MAX_WAIT", "99999"),
            ("MESHGEN_MAX_ATTEMPTS", "not-a-number"),
        ]);
        assert_eq!(cfg.api_key.as_deref(), Some("g-key"));
        assert_eq!(cfg.api_base, "http://localhost:9000/v1beta");
        assert_eq!(cfg.poll.interval, Duration::from_millis(500));
        assert_eq!(cfg.poll.max_wait, Duration::from_secs(3600));
        assert_eq!(cfg.poll.max_attempts, 120);
    }

    #[test]
    fn gemini_key_wins_over_google_key() {
        let cfg = config(&[("GEMINI_API_KEY", "primary"), ("GOOGLE_API_KEY", "secondary")]);
        assert_eq!(cfg.api_key.as_deref(), Some("primary"));
    }

    #[test]
    fn flag_overrides_replace_env_values() {
        let cfg = config(&[("MESHGEN_MAX_ATTEMPTS", "7")])
            .with_poll_overrides(Some(0.0), None, Some(3));
        assert_eq!(cfg.poll.interval, Duration::ZERO);
        assert_eq!(cfg.poll.max_attempts, 3);
        assert_eq!(cfg.poll.max_wait, Duration::from_secs(600));
    }

    #[test]
    fn non_finite_flags_keep_existing_values() {
        let cfg = StudioConfig::default().with_poll_overrides(
            Some(f64::NAN),
            Some(f64::INFINITY),
            None,
        );
        assert_eq!(cfg.poll, StudioConfig::default().poll);
    }

    #[test]
    fn attempt_flag_is_clamped_like_the_environment() {
        let zero = StudioConfig::default().with_poll_overrides(None, None, Some(0));
        assert_eq!(zero.poll.max_attempts, 1);
        let huge = StudioConfig::default().with_poll_overrides(None, None, Some(u32::MAX));
        assert_eq!(huge.poll.max_attempts, 10_000);
        let env = config(&[("MESHGEN_MAX_ATTEMPTS", "0")]);
        assert_eq!(env.poll.max_attempts, zero.poll.max_attempts);
    }
}
