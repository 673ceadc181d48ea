use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rating::RatingSummary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub profile_picture: Option<String>,
    pub rating_stats: Option<RatingSummary>,
    pub created_at: DateTime<Utc>,
}

/// Display fields used when expanding user ids in responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub profile_picture: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            profile_picture: user.profile_picture.clone(),
        }
    }
}

impl UserSummary {
    /// Placeholder for ids the directory no longer knows about.
    pub fn unknown(id: Uuid) -> Self {
        UserSummary {
            id,
            name: String::new(),
            email: String::new(),
            profile_picture: None,
        }
    }
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        User {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            profile_picture: None,
            rating_stats: None,
            created_at: Utc::now(),
        }
    }
}
