//! Per-user disclaimer gate.
//!
//! A disclaimer is shown before a question is forwarded to the provider,
//! either on every search or once per configured number of hours.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{IntegrationError, Result};
use crate::models::Options;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisclaimerPolicy {
    Disabled,
    Always,
    EveryHours(u32),
}

impl DisclaimerPolicy {
    /// Parse an interval setting: `"all"` or a positive number of hours.
    pub fn parse_interval(raw: Option<&str>) -> Result<Self> {
        let raw = raw.map(str::trim).unwrap_or("all");
        if raw.eq_ignore_ascii_case("all") || raw.is_empty() {
            return Ok(Self::Always);
        }
        match raw.parse::<u32>() {
            Ok(0) => Ok(Self::Always),
            Ok(hours) => Ok(Self::EveryHours(hours)),
            Err(_) => Err(IntegrationError::Validation(format!(
                "Invalid disclaimer interval '{raw}': expected 'all' or a number of hours"
            ))),
        }
    }

    pub fn from_options(options: &Options) -> Result<Self> {
        if !options.show_disclaimer {
            return Ok(Self::Disabled);
        }
        Self::parse_interval(options.disclaimer_interval.as_deref())
    }
}

/// Last time the disclaimer was shown, keyed by user id.
#[derive(Debug, Default)]
pub struct DisclaimerRecord {
    shown: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl DisclaimerRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_shown(&self, user_id: &str) -> Option<DateTime<Utc>> {
        self.lock().get(user_id).copied()
    }

    pub fn stamp(&self, user_id: &str, now: DateTime<Utc>) {
        self.lock().insert(user_id.to_string(), now);
    }

    pub fn clear(&self, user_id: &str) -> bool {
        self.lock().remove(user_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evaluate the gate and, when it fires, stamp the user in the same critical section.
    pub fn check_and_stamp(
        &self,
        policy: DisclaimerPolicy,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let mut shown = self.lock();
        let show = should_show_disclaimer(policy, shown.get(user_id).copied(), now);
        if show {
            shown.insert(user_id.to_string(), now);
        }
        show
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.shown.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub fn should_show_disclaimer(
    policy: DisclaimerPolicy,
    last_shown: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let hours = match policy {
        DisclaimerPolicy::Disabled => return false,
        DisclaimerPolicy::Always => return true,
        DisclaimerPolicy::EveryHours(hours) => hours,
    };

    let Some(last_shown) = last_shown else {
        return true;
    };

    let elapsed_hours = hours_between(last_shown, now);
    tracing::trace!(elapsed_hours, "Hours since last disclaimer");
    elapsed_hours >= f64::from(hours)
}

fn hours_between(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    (b - a).num_milliseconds().unsigned_abs() as f64 / (1000.0 * 60.0 * 60.0)
}
