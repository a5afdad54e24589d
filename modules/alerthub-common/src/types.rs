//! Domain types shared across the alert pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Organization marker for public-feed alerts. Doubles as the user-directory
/// role for public subscribers.
pub const PUBLIC_SCOPE: &str = "public";

// --- Alerts ---

/// A single normalized alert, the unit flowing through the pipeline.
///
/// Produced once per language/category variant of an inbound document (or per
/// entry of an HTTP submission), persisted by the dedup store, and carried as
/// the JSON message body between services. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedAlert {
    /// Source-assigned identifier, unique per upstream alert instance.
    /// Organization submissions carry none.
    #[serde(default)]
    pub identifier: Option<String>,
    /// Owning organization; `None` (or the public marker) means public feed.
    #[serde(default)]
    pub organization_name: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    /// Classification tag, e.g. "flood", "wind".
    pub category: String,
    /// Geographic zone name.
    #[serde(default)]
    pub area: Option<String>,
    pub headline: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub effective_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub effective_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub urgency: Option<String>,
    #[serde(default)]
    pub certainty: Option<String>,
}

impl NormalizedAlert {
    /// Trim free-text fields and drop the blank ones. Blank and absent are
    /// the same thing everywhere downstream.
    pub fn normalized(mut self) -> Self {
        self.identifier = norm_text(self.identifier);
        self.organization_name = norm_text(self.organization_name);
        self.language = norm_text(self.language);
        self.category = self.category.trim().to_string();
        self.area = norm_text(self.area);
        self.headline = self.headline.trim().to_string();
        self.description = norm_text(self.description);
        self.instruction = norm_text(self.instruction);
        self.severity = norm_text(self.severity);
        self.urgency = norm_text(self.urgency);
        self.certainty = norm_text(self.certainty);
        self
    }

    /// Structural checks that hold for every alert regardless of scope.
    pub fn validate(&self) -> Result<(), crate::AlertHubError> {
        if self.headline.is_empty() {
            return Err(crate::AlertHubError::Validation(
                "headline must not be empty".into(),
            ));
        }
        if self.category.is_empty() {
            return Err(crate::AlertHubError::Validation(
                "category must not be empty".into(),
            ));
        }
        if let (Some(from), Some(until)) = (self.effective_from, self.effective_until) {
            if until < from {
                return Err(crate::AlertHubError::Validation(format!(
                    "effective_until {until} precedes effective_from {from}"
                )));
            }
        }
        Ok(())
    }

    pub fn scope(&self) -> AlertScope {
        match self.organization_name.as_deref() {
            None => AlertScope::Public,
            Some(PUBLIC_SCOPE) => AlertScope::Public,
            Some(org) => AlertScope::Organization(org.to_string()),
        }
    }
}

fn norm_text(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertScope {
    Public,
    Organization(String),
}

impl std::fmt::Display for AlertScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertScope::Public => write!(f, "{PUBLIC_SCOPE}"),
            AlertScope::Organization(name) => write!(f, "{name}"),
        }
    }
}

// --- Upsert outcome ---

/// What the dedup store did with one alert. Only `Inserted` and `Updated`
/// are candidates for publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeClass {
    Inserted,
    Updated,
    DuplicateNoChange,
}

impl std::fmt::Display for ChangeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeClass::Inserted => write!(f, "inserted"),
            ChangeClass::Updated => write!(f, "updated"),
            ChangeClass::DuplicateNoChange => write!(f, "duplicate_no_change"),
        }
    }
}

/// Publication gate: a new or changed alert still stays local when its
/// validity window has already closed at processing time.
pub fn publish_worthy(
    class: ChangeClass,
    effective_until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let changed = matches!(class, ChangeClass::Inserted | ChangeClass::Updated);
    changed && effective_until.is_some_and(|until| until >= now)
}

// --- Recipients ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientGroup {
    Oncall,
    Regular,
}

impl std::fmt::Display for RecipientGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipientGroup::Oncall => write!(f, "oncall"),
            RecipientGroup::Regular => write!(f, "regular"),
        }
    }
}

/// One resolved notification target. Within a single resolution an email
/// appears at most once; the first matching path fixes the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub group: RecipientGroup,
}

// --- On-call ---

/// A time-bounded assignment of a responder to severity levels and areas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnCallEntry {
    pub responder_email: String,
    pub active_from: DateTime<Utc>,
    pub active_until: DateTime<Utc>,
    pub levels: Vec<String>,
    pub areas: Vec<String>,
}

impl OnCallEntry {
    /// True when this entry covers the given severity and area at `now`.
    pub fn matches(&self, severity: &str, area: &str, now: DateTime<Utc>) -> bool {
        self.active_from <= now
            && now <= self.active_until
            && self.levels.iter().any(|l| l == severity)
            && self.areas.iter().any(|a| a == area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn alert() -> NormalizedAlert {
        NormalizedAlert {
            identifier: None,
            organization_name: Some("ACME".into()),
            language: None,
            category: "flood".into(),
            area: Some("north".into()),
            headline: "Flood warning".into(),
            description: None,
            instruction: None,
            effective_from: None,
            effective_until: None,
            severity: Some("high".into()),
            urgency: None,
            certainty: None,
        }
    }

    #[test]
    fn blank_fields_normalize_to_absent() {
        let a = NormalizedAlert {
            description: Some("   ".into()),
            instruction: Some("".into()),
            severity: Some(" high ".into()),
            ..alert()
        }
        .normalized();

        assert_eq!(a.description, None);
        assert_eq!(a.instruction, None);
        assert_eq!(a.severity.as_deref(), Some("high"));
    }

    #[test]
    fn inverted_window_fails_validation() {
        let now = Utc::now();
        let a = NormalizedAlert {
            effective_from: Some(now),
            effective_until: Some(now - Duration::hours(1)),
            ..alert()
        };
        assert!(a.validate().is_err());
    }

    #[test]
    fn open_window_passes_validation() {
        let a = NormalizedAlert {
            effective_from: Some(Utc::now()),
            effective_until: None,
            ..alert()
        };
        assert!(a.validate().is_ok());
    }

    #[test]
    fn public_marker_and_missing_org_are_both_public() {
        let a = NormalizedAlert {
            organization_name: None,
            ..alert()
        };
        assert_eq!(a.scope(), AlertScope::Public);

        let b = NormalizedAlert {
            organization_name: Some(PUBLIC_SCOPE.into()),
            ..alert()
        };
        assert_eq!(b.scope(), AlertScope::Public);

        assert_eq!(alert().scope(), AlertScope::Organization("ACME".into()));
    }

    #[test]
    fn stale_alert_is_not_publish_worthy() {
        let now = Utc::now();
        let past = now - Duration::hours(1);
        let future = now + Duration::hours(1);

        assert!(publish_worthy(ChangeClass::Inserted, Some(future), now));
        assert!(publish_worthy(ChangeClass::Updated, Some(future), now));
        assert!(!publish_worthy(ChangeClass::Inserted, Some(past), now));
        assert!(!publish_worthy(ChangeClass::Inserted, None, now));
        assert!(!publish_worthy(
            ChangeClass::DuplicateNoChange,
            Some(future),
            now
        ));
    }

    #[test]
    fn message_body_tolerates_unknown_fields() {
        let json = r#"{
            "category": "wind",
            "headline": "Gale warning / coast",
            "area": "coast",
            "severity": "moderate",
            "some_future_field": {"nested": true}
        }"#;
        let a: NormalizedAlert = serde_json::from_str(json).unwrap();
        assert_eq!(a.category, "wind");
        assert_eq!(a.area.as_deref(), Some("coast"));
    }

    #[test]
    fn oncall_entry_matching() {
        let now = Utc::now();
        let entry = OnCallEntry {
            responder_email: "r@x.com".into(),
            active_from: now - Duration::hours(1),
            active_until: now + Duration::hours(1),
            levels: vec!["high".into()],
            areas: vec!["north".into()],
        };

        assert!(entry.matches("high", "north", now));
        assert!(!entry.matches("extreme", "north", now));
        assert!(!entry.matches("high", "south", now));
        assert!(!entry.matches("high", "north", now + Duration::hours(2)));
    }

    #[test]
    fn change_class_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ChangeClass::DuplicateNoChange).unwrap(),
            "\"duplicate_no_change\""
        );
        assert_eq!(ChangeClass::Inserted.to_string(), "inserted");
    }
}
