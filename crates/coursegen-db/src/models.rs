use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Generate a fresh record identifier (32 lowercase hex chars).
///
/// Record ids are opaque strings so that ids assigned by other systems can be
/// stored unchanged.
pub fn new_record_id() -> String {
    Uuid::new_v4().simple().to_string()
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Secondary keys a user record can be looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserField {
    /// The auth-provider identifier carried in caller tokens.
    Uid,
    Email,
}

impl UserField {
    /// Column backing this field. Only these fixed names are ever spliced
    /// into SQL.
    pub fn column(self) -> &'static str {
        match self {
            Self::Uid => "uid",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for UserField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for UserField {
    type Err = UserFieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uid" => Ok(Self::Uid),
            "email" => Ok(Self::Email),
            other => Err(UserFieldParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`UserField`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid user field: {0:?} (expected uid or email)")]
pub struct UserFieldParseError(pub String);

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    /// Auth identifier. Course ownership is expressed in terms of this value.
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A course. Only `creator_id` matters to plan generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub id: String,
    /// Auth uid of the user who created the course.
    pub creator_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// A course plan: the seed direction and, once generated, the curriculum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CoursePlan {
    pub id: String,
    pub course_id: String,
    /// Free-text seed the generator starts from.
    pub direction: Option<String>,
    /// Curriculum JSON, stored as an encoded string.
    pub generated_json: Option<String>,
    /// Stage outputs joined with [`TRANSCRIPT_SEPARATOR`].
    pub transcript: Option<String>,
    pub last_generated_at: Option<DateTime<Utc>>,
    /// Bumped by every committed generation; used for optimistic concurrency.
    pub revision: i64,
    pub created_at: DateTime<Utc>,
}

/// Separator between stage outputs in [`CoursePlan::transcript`].
pub const TRANSCRIPT_SEPARATOR: &str = "\n\n---\n\n";

/// An in-flight generation claim on a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct GenerationLease {
    pub plan_id: String,
    pub token: Uuid,
    pub acquired_at: DateTime<Utc>,
}
