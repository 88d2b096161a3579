use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::Date;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_verifier: Vec<u8>,
    pub salt: Vec<u8>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub birth_date: Option<Date>,
    pub enabled: bool,
    pub confirmation_code: String,
}

impl User {
    pub fn profile(&self) -> Profile {
        Profile {
            name: self.name.clone(),
            bio: self.bio.clone(),
            avatar: self.avatar.clone(),
            birth_date: self.birth_date,
        }
    }
}

/// Columns written on insert; id and `created_at` come from storage.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_verifier: Vec<u8>,
    pub salt: Vec<u8>,
    pub confirmation_code: String,
}

/// Public projection of a user, also the cached representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    #[serde(with = "iso_date::option")]
    pub birth_date: Option<Date>,
}

/// Unique columns a user can be looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupField {
    Email,
    ConfirmationCode,
}

impl LookupField {
    pub fn column(self) -> &'static str {
        match self {
            LookupField::Email => "email",
            LookupField::ConfirmationCode => "confirmation_code",
        }
    }
}
