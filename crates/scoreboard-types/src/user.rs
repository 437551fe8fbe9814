//! User types

use crate::MembershipSummary;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// User account with its public profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_picture_url: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub phone_number: Option<String>,
    pub bio: Option<String>,
    pub gender: Option<String>,
    pub school_year: Option<String>,
    pub student_id: Option<String>,
    pub major: Option<String>,
    pub gpa: Option<f64>,
    pub graduation_year: Option<i32>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
    pub personal_website: Option<String>,
    pub timezone: String,
    pub language: String,
    pub notification_preferences: serde_json::Value,
    pub is_active: bool,
    pub is_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub has_qr_code: bool,
    /// Address and emergency contact, only shown to the user themselves
    #[serde(skip)]
    pub contact: ContactInfo,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }
}

/// Sensitive profile fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub emergency_contact_relationship: Option<String>,
}

/// Minimal user reference embedded in other payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// User payload returned by login, verify and profile endpoints
#[derive(Debug, Clone, Serialize)]
pub struct UserDetails {
    #[serde(flatten)]
    pub user: User,
    #[serde(flatten)]
    pub contact: Option<ContactInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizations: Option<Vec<MembershipSummary>>,
}

impl UserDetails {
    pub fn public(user: User) -> Self {
        Self {
            user,
            contact: None,
            organizations: None,
        }
    }

    /// Includes the sensitive contact fields
    pub fn private(user: User) -> Self {
        let contact = Some(user.contact.clone());
        Self {
            user,
            contact,
            organizations: None,
        }
    }

    pub fn with_organizations(mut self, organizations: Vec<MembershipSummary>) -> Self {
        self.organizations = Some(organizations);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        let now = Utc::now();
        User {
            id: "u1".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Smith".to_string(),
            profile_picture_url: None,
            birthdate: NaiveDate::from_ymd_opt(2001, 4, 9),
            phone_number: None,
            bio: None,
            gender: None,
            school_year: None,
            student_id: None,
            major: None,
            gpa: None,
            graduation_year: None,
            linkedin_url: None,
            github_url: None,
            personal_website: None,
            timezone: "UTC".to_string(),
            language: "en".to_string(),
            notification_preferences: serde_json::json!({}),
            is_active: true,
            is_verified: false,
            last_login_at: None,
            created_at: now,
            updated_at: now,
            has_qr_code: false,
            contact: ContactInfo {
                city: Some("Lisbon".to_string()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn public_details_hide_contact() {
        let json = serde_json::to_value(UserDetails::public(sample_user())).unwrap();
        assert_eq!(json["username"], "alice");
        assert_eq!(json["birthdate"], "2001-04-09");
        assert!(json.get("city").is_none());
        assert!(json.get("organizations").is_none());
    }

    #[test]
    fn private_details_include_contact() {
        let json = serde_json::to_value(UserDetails::private(sample_user())).unwrap();
        assert_eq!(json["city"], "Lisbon");
        assert!(json["address_line1"].is_null());
    }

    #[test]
    fn full_name_trims_missing_parts() {
        let mut user = sample_user();
        user.last_name = String::new();
        assert_eq!(user.full_name(), "Alice");
    }
}
