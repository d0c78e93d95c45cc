//! Provider-level configuration.
//!
//! The host hands the provider one configuration object when it starts.
//! Everything transport-related in it (credentials, endpoints) belongs to
//! the [`crate::client::ServiceClient`] implementation; this module keeps
//! only what the core itself consumes: the session identity expectations,
//! the preview-feature allow-list, and the retry/poll tuning knobs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::ServiceError;
use crate::retry::{Backoff, RetryPolicy};
use crate::schema::Diagnostic;

/// Core configuration for one provider instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Expected organization name; checked against the live session when
    /// set.
    pub organization: Option<String>,
    /// Expected account name within the organization.
    pub account: Option<String>,
    /// Preview-gated resource types the operator has opted into.
    pub preview_features: Vec<String>,
    /// Override for the transient-retry attempt bound.
    pub transient_retries: Option<u32>,
    /// Override for the seconds between transient retries.
    pub transient_interval_secs: Option<u64>,
    /// Override for the state-poll attempt bound.
    pub poll_attempts: Option<u32>,
    /// Override for the seconds between state polls.
    pub poll_interval_secs: Option<u64>,
}

impl ProviderConfig {
    /// Parse a configuration object. Unknown fields are rejected so typos
    /// surface at configure time rather than as silently-ignored knobs.
    pub fn from_value(value: &Value) -> Result<Self, ServiceError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone()).map_err(|err| {
            ServiceError::InvalidArgument(format!("invalid provider configuration: {err}"))
        })
    }

    /// Sanity-check the parsed configuration. Returns warnings for
    /// suspicious-but-legal settings and errors for unusable ones.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        if let Some(0) = self.transient_retries {
            diagnostics.push(
                Diagnostic::error("transient_retries must be at least 1")
                    .with_attribute("transient_retries"),
            );
        }
        if let Some(0) = self.poll_attempts {
            diagnostics.push(
                Diagnostic::error("poll_attempts must be at least 1")
                    .with_attribute("poll_attempts"),
            );
        }
        if self.account.is_some() && self.organization.is_none() {
            diagnostics.push(
                Diagnostic::warning("account is set without organization")
                    .with_detail("the session identity check compares both parts")
                    .with_attribute("account"),
            );
        }
        if let Some(attempts) = self.transient_retries {
            if attempts > 10 {
                diagnostics.push(
                    Diagnostic::warning(format!(
                        "transient_retries = {attempts} will mask sustained outages"
                    ))
                    .with_attribute("transient_retries"),
                );
            }
        }
        diagnostics
    }

    /// The transient-retry policy, with overrides applied.
    pub fn transient_policy(&self) -> RetryPolicy {
        let base = RetryPolicy::transient();
        RetryPolicy {
            attempts: self.transient_retries.unwrap_or(base.attempts),
            interval: self
                .transient_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(base.interval),
            backoff: Backoff::Fixed,
        }
    }

    /// The state-poll policy, with overrides applied.
    pub fn poll_policy(&self) -> RetryPolicy {
        let base = RetryPolicy::state_poll();
        RetryPolicy {
            attempts: self.poll_attempts.unwrap_or(base.attempts),
            interval: self
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(base.interval),
            backoff: Backoff::Fixed,
        }
    }

    /// The expected session identity, when both parts are configured.
    pub fn expected_session(&self) -> Option<(&str, &str)> {
        match (&self.organization, &self.account) {
            (Some(org), Some(account)) => Some((org, account)),
            _ => None,
        }
    }
}
