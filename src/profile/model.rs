//! Profile document model.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::SubjectId;

/// Role granted to a profile. An unset role is `None` on the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One profile record per identity, keyed by subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub subject: SubjectId,
    pub role: Option<Role>,
    pub onboarded: bool,
    pub selected_modules: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboarding_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields to create-or-merge into a profile. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    pub onboarded: Option<bool>,
    pub selected_modules: Option<BTreeSet<String>>,
    pub age: Option<u32>,
    pub country: Option<String>,
    /// Only recorded if the profile has no completion time yet.
    pub onboarding_completed_at: Option<DateTime<Utc>>,
}

/// A committed write, fanned out to profile subscribers.
#[derive(Debug, Clone)]
pub struct ProfileChange {
    pub subject: SubjectId,
    pub profile: Profile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::User, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
            assert_eq!(
                serde_json::to_string(&role).unwrap(),
                format!("\"{}\"", role.as_str())
            );
        }
        assert_eq!(Role::parse("owner"), None);
    }

    #[test]
    fn profile_document_shape() {
        let now = Utc::now();
        let profile = Profile {
            subject: SubjectId::new("uid-1").unwrap(),
            role: None,
            onboarded: true,
            selected_modules: ["sermons".to_string(), "devotions".to_string()].into(),
            age: Some(24),
            country: Some("Kenya".to_string()),
            onboarding_completed_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert!(json["role"].is_null());
        assert_eq!(json["onboarded"], true);
        assert_eq!(json["selectedModules"], serde_json::json!(["devotions", "sermons"]));
        assert_eq!(json["age"], 24);
        assert_eq!(json["country"], "Kenya");
        assert!(json["onboardingCompletedAt"].is_string());
    }
}
