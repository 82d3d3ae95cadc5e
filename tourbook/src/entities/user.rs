//! Users, roles and credential bookkeeping

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::PasswordHasher;
use crate::error::Result;
use crate::model::{EntityDescriptor, FieldSchema, Record, SaveHook, Schema};
use crate::store::{format_timestamp, parse_timestamp, Document, Filter, Op};

use super::USER;

/// Access level of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Regular customer
    User,
    /// Tour guide
    Guide,
    /// Lead guide
    LeadGuide,
    /// Administrator
    Admin,
}

impl Role {
    /// Every role, lowest access first
    pub const ALL: [Role; 4] = [Role::User, Role::Guide, Role::LeadGuide, Role::Admin];

    /// Stored name
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("Unknown role: {}", s))
    }
}

/// Role of a stored user document; unknown or missing roles count as `user`
pub fn role_of(doc: &Document) -> Role {
    doc.get("role")
        .and_then(Value::as_str)
        .and_then(|r| r.parse().ok())
        .unwrap_or(Role::User)
}

/// Whether the password changed after a token issued at `issued_at` (seconds)
pub fn changed_password_after(doc: &Document, issued_at: i64) -> bool {
    doc.get("passwordChangedAt")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .map(|changed| issued_at < changed.timestamp())
        .unwrap_or(false)
}

fn matches_password(confirm: &Value, doc: &Document) -> bool {
    doc.get("password") == Some(confirm)
}

/// Hashes the password when it changes and stamps `passwordChangedAt`
///
/// The stamp is backdated one second so a token issued right after the
/// change stays valid.
#[derive(Debug, Clone)]
pub struct HashPassword {
    hasher: PasswordHasher,
}

impl HashPassword {
    /// Hash with `hasher`
    pub fn new(hasher: PasswordHasher) -> Self {
        Self { hasher }
    }
}

#[async_trait]
impl SaveHook for HashPassword {
    async fn before_save(&self, record: &mut Record) -> Result<()> {
        if !record.is_modified("password") {
            return Ok(());
        }
        let Some(plain) = record.get_str("password").map(str::to_string) else {
            return Ok(());
        };
        let hash = self.hasher.hash_blocking(plain).await?;
        record.set("password", hash);
        record.unset("passwordConfirm");
        if !record.is_new() {
            record.set(
                "passwordChangedAt",
                format_timestamp(Utc::now() - Duration::seconds(1)),
            );
        }
        Ok(())
    }
}

pub(crate) fn schema(min_password_length: usize) -> Schema {
    let roles: Vec<&str> = Role::ALL.iter().map(Role::as_str).collect();
    Schema::new()
        .field("name", FieldSchema::string().required("Please tell us your name"))
        .field(
            "email",
            FieldSchema::string()
                .required("Please provide your email")
                .unique()
                .trim()
                .lowercase()
                .email("Please provide a valid email"),
        )
        .field("photo", FieldSchema::string().default_value("default.jpg"))
        .field(
            "role",
            FieldSchema::string()
                .default_value(Role::User.as_str())
                .one_of(&roles, "Role is either: user, guide, lead-guide, admin"),
        )
        .field(
            "password",
            FieldSchema::string()
                .required("Please provide a password")
                .min_length(
                    min_password_length,
                    format!("Password must be at least {} characters", min_password_length),
                )
                .hidden(),
        )
        .field(
            "passwordConfirm",
            FieldSchema::string()
                .required("Please confirm your password")
                .validate(matches_password, "Passwords are not the same!"),
        )
        .field("passwordChangedAt", FieldSchema::date())
        .field("passwordResetToken", FieldSchema::string().hidden())
        .field("passwordResetExpires", FieldSchema::date().hidden())
        .field("active", FieldSchema::boolean().default_value(true).hidden())
}

/// User descriptor: inactive users hidden, passwords hashed on save
pub fn descriptor(hasher: PasswordHasher) -> EntityDescriptor {
    let min_length = hasher.min_length();
    EntityDescriptor::new(USER, "users", schema(min_length))
        .visible_when(Filter::new().and("active", Op::Ne(Value::Bool(false))))
        .on_pre_save(HashPassword::new(hasher))
}
