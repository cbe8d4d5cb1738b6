//! Checks applied to account fields before they reach the repository
//!
//! Every check returns the message shown to the client as a 400 body.

use regex::Regex;
use std::sync::LazyLock;

const USERNAME_LEN: (usize, usize) = (3, 32);
const PASSWORD_LEN: (usize, usize) = (8, 128);
/// RFC 5321 limit for a forward path
const EMAIL_MAX_LEN: usize = 254;
const NAME_MAX_LEN: usize = 150;
const BIO_MAX_LEN: usize = 500;

static USERNAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("username pattern"));

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email pattern")
});

/// Character classes a password has to mix, with the hint for the missing one
const PASSWORD_CLASSES: [(fn(&char) -> bool, &str); 4] = [
    (char::is_ascii_uppercase, "an uppercase letter"),
    (char::is_ascii_lowercase, "a lowercase letter"),
    (char::is_ascii_digit, "a digit"),
    (|c| !c.is_alphanumeric(), "a symbol"),
];

fn check_length(field: &str, value: &str, (min, max): (usize, usize)) -> Result<(), String> {
    let len = value.chars().count();
    if len == 0 {
        Err(format!("{} is required", field))
    } else if len < min || len > max {
        Err(format!("{} needs between {} and {} characters", field, min, max))
    } else {
        Ok(())
    }
}

fn check_max(field: &str, value: &str, max: usize) -> Result<(), String> {
    if value.chars().count() > max {
        return Err(format!("{} cannot exceed {} characters", field, max));
    }
    Ok(())
}

/// Letters, digits and underscores only
pub fn validate_username(username: &str) -> Result<(), String> {
    check_length("Username", username, USERNAME_LEN)?;
    if !USERNAME_PATTERN.is_match(username) {
        return Err("Usernames may use letters, digits and underscores".to_string());
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    check_max("Email", email, EMAIL_MAX_LEN)?;
    if !EMAIL_PATTERN.is_match(email) {
        return Err(format!("'{}' is not a valid email address", email));
    }
    Ok(())
}

/// Length limits plus one character from each class in [`PASSWORD_CLASSES`]
pub fn validate_password(password: &str) -> Result<(), String> {
    check_length("Password", password, PASSWORD_LEN)?;

    let missing: Vec<&str> = PASSWORD_CLASSES
        .iter()
        .filter(|(matches, _)| !password.chars().any(|c| matches(&c)))
        .map(|(_, hint)| *hint)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("Password is missing {}", missing.join(", ")))
    }
}

/// First and last names are optional; only their length is bounded
pub fn validate_name(field: &str, value: &str) -> Result<(), String> {
    check_max(field, value, NAME_MAX_LEN)
}

pub fn validate_bio(bio: &str) -> Result<(), String> {
    check_max("Bio", bio, BIO_MAX_LEN)
}
