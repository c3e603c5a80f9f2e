use crate::error::ValidationError;
use regex::Regex;
use std::net::IpAddr;
use std::sync::LazyLock;

/// Usernames follow the login rules of the host application: letters, digits,
/// spaces and `_ . - @`.
static USERNAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9 _.\-@]+$").expect("Invalid username regex pattern")
});

const MAX_USERNAME_LENGTH: usize = 60;

/// Parses an IP address and returns it in canonical form.
///
/// # Examples
///
/// ```rust
/// use lockdown_core::validation::validate_ip;
///
/// assert_eq!(validate_ip("127.0.0.1").unwrap().to_string(), "127.0.0.1");
/// assert_eq!(validate_ip("0:0::1").unwrap().to_string(), "::1");
/// assert!(validate_ip("localhost").is_err());
/// ```
pub fn validate_ip(ip: &str) -> Result<IpAddr, ValidationError> {
    let trimmed = ip.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(
            "IP address is required".to_string(),
        ));
    }

    trimmed
        .parse::<IpAddr>()
        .map_err(|_| ValidationError::InvalidIp(ip.to_string()))
}

/// Validates the username a lockdown is recorded against
///
/// # Examples
///
/// ```rust
/// use lockdown_core::validation::validate_username;
///
/// assert!(validate_username("admin").is_ok());
/// assert!(validate_username("   ").is_err());
/// ```
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(
            "Username is required".to_string(),
        ));
    }

    if trimmed.chars().count() > MAX_USERNAME_LENGTH {
        return Err(ValidationError::InvalidUsername(
            "Username is too long".to_string(),
        ));
    }

    if USERNAME_REGEX.is_match(trimmed) {
        Ok(())
    } else {
        Err(ValidationError::InvalidUsername(format!(
            "Username contains invalid characters: {username}"
        )))
    }
}
