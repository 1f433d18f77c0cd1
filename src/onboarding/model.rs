//! Onboarding submission model and validation.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Country recorded when none could be detected.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// Furthest any civil time zone runs ahead of UTC (UTC+14).
const MAX_UTC_OFFSET_HOURS: i64 = 14;

static MODULE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 _-]{0,63}$").expect("module id pattern"));

/// Raw onboarding form as sent by the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingSubmission {
    /// ISO-8601 calendar date.
    #[serde(default)]
    pub dob: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub selected_modules: Vec<String>,
}

/// A submission that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOnboarding {
    pub dob: NaiveDate,
    pub age: u32,
    pub country: String,
    pub selected_modules: BTreeSet<String>,
}

/// Whole years between `dob` and `today`.
///
/// Year difference, minus one if this year's birthday has not happened
/// yet. Zero for a `dob` after `today`.
pub fn compute_age(dob: NaiveDate, today: NaiveDate) -> u32 {
    let mut years = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        years -= 1;
    }
    u32::try_from(years).unwrap_or(0)
}

/// The latest calendar date in effect anywhere at `now`.
///
/// Used as "today" for submissions, since the caller's zone is unknown: a
/// date of birth that is today for the caller is never rejected as future.
pub fn latest_calendar_date(now: DateTime<Utc>) -> NaiveDate {
    (now + TimeDelta::hours(MAX_UTC_OFFSET_HOURS)).date_naive()
}

/// Check a submission against `today`. Touches nothing outside its inputs.
pub fn validate(
    submission: &OnboardingSubmission,
    today: NaiveDate,
) -> Result<ValidatedOnboarding, ValidationError> {
    let raw_dob = submission
        .dob
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ValidationError::MissingField("dob"))?;
    let dob = NaiveDate::parse_from_str(raw_dob, "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(raw_dob.to_string()))?;
    if dob > today {
        return Err(ValidationError::DateInFuture(raw_dob.to_string()));
    }

    let mut selected_modules = BTreeSet::new();
    for raw in &submission.selected_modules {
        let id = raw.trim();
        if id.is_empty() {
            continue;
        }
        if !MODULE_ID.is_match(id) {
            return Err(ValidationError::InvalidModule(raw.clone()));
        }
        selected_modules.insert(id.to_string());
    }
    if selected_modules.is_empty() {
        return Err(ValidationError::NoModulesSelected);
    }

    let country = submission
        .country
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_COUNTRY)
        .to_string();

    Ok(ValidatedOnboarding {
        dob,
        age: compute_age(dob, today),
        country,
        selected_modules,
    })
}
