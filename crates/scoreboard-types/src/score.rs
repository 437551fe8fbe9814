//! Score, aggregate, category and leaderboard types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category used when a score is assigned without one
pub const DEFAULT_CATEGORY: &str = "general";

/// Categories created for every new organization
pub const PREDEFINED_CATEGORIES: &[(&str, &str)] = &[
    ("general", "General contributions"),
    ("academic", "Academic performance"),
    ("participation", "Event and activity participation"),
    ("leadership", "Leadership and initiative"),
    ("teamwork", "Collaboration and teamwork"),
    ("volunteering", "Community service and volunteering"),
];

/// The entity a score or aggregate belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScoreTarget {
    User(String),
    Group(String),
}

impl ScoreTarget {
    /// Builds a target from optional ids; exactly one must be set
    pub fn from_ids(user_id: Option<String>, group_id: Option<String>) -> Option<Self> {
        match (user_id, group_id) {
            (Some(user_id), None) => Some(ScoreTarget::User(user_id)),
            (None, Some(group_id)) => Some(ScoreTarget::Group(group_id)),
            _ => None,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ScoreTarget::User(id) | ScoreTarget::Group(id) => id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            ScoreTarget::User(_) => EntityKind::User,
            ScoreTarget::Group(_) => EntityKind::Group,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            ScoreTarget::User(id) => Some(id),
            ScoreTarget::Group(_) => None,
        }
    }

    pub fn group_id(&self) -> Option<&str> {
        match self {
            ScoreTarget::Group(id) => Some(id),
            ScoreTarget::User(_) => None,
        }
    }
}

/// Kind of leaderboard participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Group,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Group => "group",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a score was assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignedVia {
    Manual,
    QrScan,
}

impl AssignedVia {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignedVia::Manual => "manual",
            AssignedVia::QrScan => "qr_scan",
        }
    }
}

/// A single score entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    pub id: String,
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    pub score_value: i64,
    pub category: String,
    pub description: Option<String>,
    pub organization_id: String,
    pub assigned_by: String,
    pub assigned_via: AssignedVia,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Score {
    pub fn target(&self) -> Option<ScoreTarget> {
        ScoreTarget::from_ids(self.user_id.clone(), self.group_id.clone())
    }
}

/// Running totals for one (entity, category, organization)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreAggregate {
    pub id: String,
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    pub category: String,
    pub total_score: i64,
    pub score_count: i64,
    pub average_score: f64,
    pub organization_id: String,
    pub last_updated: DateTime<Utc>,
}

/// Named score category of an organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreCategory {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_predefined: bool,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Who a leaderboard row is about
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Participant {
    User {
        user_id: String,
        username: String,
        first_name: String,
        last_name: String,
    },
    Group {
        group_id: String,
        group_name: String,
        description: Option<String>,
    },
}

/// One ranked row of a leaderboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    #[serde(flatten)]
    pub participant: Participant,
    pub total_score: i64,
    pub score_count: i64,
    pub average_score: f64,
    pub last_updated: DateTime<Utc>,
}

/// A ranked list for one organization, entity kind and category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaderboard {
    pub organization_id: String,
    pub entity_type: EntityKind,
    pub category: String,
    pub entries: Vec<LeaderboardEntry>,
    pub generated_at: DateTime<Utc>,
}

impl Leaderboard {
    /// Copy holding at most the first `limit` entries
    pub fn truncated(&self, limit: usize) -> Leaderboard {
        Leaderboard {
            organization_id: self.organization_id.clone(),
            entity_type: self.entity_type,
            category: self.category.clone(),
            entries: self.entries.iter().take(limit).cloned().collect(),
            generated_at: self.generated_at,
        }
    }
}

/// Position of one entity within a leaderboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankInfo {
    pub entity_id: String,
    pub entity_type: EntityKind,
    pub category: String,
    pub rank: i64,
    pub total_score: i64,
    pub score_count: i64,
    pub total_participants: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_requires_exactly_one_id() {
        assert_eq!(
            ScoreTarget::from_ids(Some("u".into()), None),
            Some(ScoreTarget::User("u".into()))
        );
        assert_eq!(
            ScoreTarget::from_ids(None, Some("g".into())),
            Some(ScoreTarget::Group("g".into()))
        );
        assert_eq!(ScoreTarget::from_ids(None, None), None);
        assert_eq!(ScoreTarget::from_ids(Some("u".into()), Some("g".into())), None);
    }

    #[test]
    fn leaderboard_entry_flattens_participant() {
        let entry = LeaderboardEntry {
            rank: 1,
            participant: Participant::Group {
                group_id: "g1".to_string(),
                group_name: "Blue".to_string(),
                description: None,
            },
            total_score: 40,
            score_count: 2,
            average_score: 20.0,
            last_updated: Utc::now(),
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["group_name"], "Blue");
        assert_eq!(json["rank"], 1);

        let back: LeaderboardEntry = serde_json::from_value(json).unwrap();
        assert!(matches!(back.participant, Participant::Group { .. }));
    }

    #[test]
    fn predefined_categories_include_default() {
        assert!(PREDEFINED_CATEGORIES
            .iter()
            .any(|(name, _)| *name == DEFAULT_CATEGORY));
    }
}
