use lazy_static::lazy_static;
use regex::Regex;
use time::{macros::format_description, Date, OffsetDateTime};

use crate::error::AccountError;

pub const MAX_NAME_LEN: usize = 128;
pub const MAX_EMAIL_LEN: usize = 128;
pub const MAX_BIO_LEN: usize = 512;
const PASSWORD_LEN: std::ops::RangeInclusive<usize> = 6..=64;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.chars().count() <= MAX_EMAIL_LEN && EMAIL_RE.is_match(email)
}

pub(crate) fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

pub(crate) fn is_valid_name(name: &str) -> bool {
    !is_blank(name) && name.chars().count() <= MAX_NAME_LEN
}

/// 6 to 64 characters with at least one upper-case letter, one lower-case
/// letter, one digit and one symbol.
pub(crate) fn is_strong_password(password: &str) -> bool {
    if !PASSWORD_LEN.contains(&password.chars().count()) || is_blank(password) {
        return false;
    }
    let (mut upper, mut lower, mut digit, mut symbol) = (false, false, false, false);
    for c in password.chars() {
        if c.is_uppercase() {
            upper = true;
        } else if c.is_numeric() {
            digit = true;
        } else if c.is_alphabetic() {
            lower = true;
        } else if !c.is_whitespace() {
            symbol = true;
        }
    }
    upper && lower && digit && symbol
}

/// Parses an ISO `YYYY-MM-DD` birth date that is not in the future.
pub(crate) fn parse_birth_date(raw: &str) -> Result<Date, AccountError> {
    let date = Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map_err(|_| AccountError::Unprocessable("birth_date must be YYYY-MM-DD".into()))?;
    if date > OffsetDateTime::now_utc().date() {
        return Err(AccountError::Unprocessable(
            "birth_date is in the future".into(),
        ));
    }
    Ok(date)
}
