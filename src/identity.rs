//! Identifying fields of a user record and their validation.
//!
//! The set of fields is fixed; configuration only chooses which of them are
//! enabled.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Minimum password length.
pub const MIN_PASSWORD_LEN: usize = 9;

/// Maximum username length.
pub const MAX_USERNAME_LEN: usize = 64;

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(8\d{10}|\+7\d{10})").expect("valid phone regex"));

/// A field that can identify a user. Declared in lookup priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum IdentityField {
    Username,
    Email,
    Phone,
}

impl IdentityField {
    pub const ALL: [IdentityField; 3] = [
        IdentityField::Username,
        IdentityField::Email,
        IdentityField::Phone,
    ];

    /// Column name in the users table.
    pub fn column(&self) -> &'static str {
        match self {
            IdentityField::Username => "username",
            IdentityField::Email => "email",
            IdentityField::Phone => "phone",
        }
    }
}

/// Which identifying fields this deployment accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityFields {
    enabled: Vec<IdentityField>,
}

impl IdentityFields {
    pub fn new(fields: &[IdentityField]) -> Self {
        let enabled = IdentityField::ALL
            .into_iter()
            .filter(|f| fields.contains(f))
            .collect();
        Self { enabled }
    }

    pub fn all() -> Self {
        Self::new(&IdentityField::ALL)
    }

    pub fn is_enabled(&self, field: IdentityField) -> bool {
        self.enabled.contains(&field)
    }

    pub fn enabled(&self) -> &[IdentityField] {
        &self.enabled
    }
}

impl Default for IdentityFields {
    fn default() -> Self {
        Self::new(&[IdentityField::Username])
    }
}

/// The identifying fields of a user, all optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl UserIdentity {
    pub fn get(&self, field: IdentityField) -> Option<&str> {
        let value = match field {
            IdentityField::Username => self.username.as_deref(),
            IdentityField::Email => self.email.as_deref(),
            IdentityField::Phone => self.phone.as_deref(),
        };
        value.filter(|v| !v.is_empty())
    }

    /// First non-empty field in priority order.
    pub fn primary(&self) -> Option<(IdentityField, &str)> {
        IdentityField::ALL
            .into_iter()
            .find_map(|field| self.get(field).map(|value| (field, value)))
    }

    fn present(&self) -> impl Iterator<Item = IdentityField> + '_ {
        IdentityField::ALL
            .into_iter()
            .filter(|field| self.get(*field).is_some())
    }

    /// Validate that exactly one enabled field is present, and normalise it.
    /// Returns the field and its normalised value.
    pub fn single(&self, allowed: &IdentityFields) -> Result<(IdentityField, String), String> {
        let (field, value) = self.single_raw(allowed)?;
        Ok((field, normalize(field, value)?))
    }

    /// Like `single`, but returns the trimmed value without format checks.
    /// Used for substring search.
    pub fn single_raw(&self, allowed: &IdentityFields) -> Result<(IdentityField, &str), String> {
        let present: Vec<IdentityField> = self.present().collect();
        if let Some(field) = present.iter().find(|f| !allowed.is_enabled(**f)) {
            return Err(format!("Field '{}' is not enabled", field.column()));
        }
        match present.as_slice() {
            [field] => Ok((*field, self.get(*field).unwrap_or_default().trim())),
            [] => Err(one_of_message(allowed)),
            _ => Err(format!("Exactly {}", one_of_message(allowed).to_lowercase())),
        }
    }

    /// Keep only the given field.
    pub fn only(field: IdentityField, value: String) -> Self {
        let mut identity = UserIdentity::default();
        match field {
            IdentityField::Username => identity.username = Some(value),
            IdentityField::Email => identity.email = Some(value),
            IdentityField::Phone => identity.phone = Some(value),
        }
        identity
    }

    /// Validate every present field for an update. At least one enabled
    /// field may be supplied; disabled ones are rejected.
    pub fn normalized(&self, allowed: &IdentityFields) -> Result<UserIdentity, String> {
        let mut out = UserIdentity::default();
        for field in self.present() {
            if !allowed.is_enabled(field) {
                return Err(format!("Field '{}' is not enabled", field.column()));
            }
            let value = normalize(field, self.get(field).unwrap_or_default())?;
            match field {
                IdentityField::Username => out.username = Some(value),
                IdentityField::Email => out.email = Some(value),
                IdentityField::Phone => out.phone = Some(value),
            }
        }
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.primary().is_none()
    }
}

fn one_of_message(allowed: &IdentityFields) -> String {
    let names: Vec<&str> = allowed.enabled().iter().map(|f| f.column()).collect();
    format!("One of {} must be provided", names.join(", "))
}

/// Normalise and validate a single identifying value.
pub fn normalize(field: IdentityField, value: &str) -> Result<String, String> {
    let value = value.trim();
    match field {
        IdentityField::Username => {
            if value.is_empty() || value.chars().count() > MAX_USERNAME_LEN {
                return Err(format!(
                    "Username must be between 1 and {} characters",
                    MAX_USERNAME_LEN
                ));
            }
            Ok(value.to_string())
        }
        IdentityField::Email => {
            if is_valid_email(value) {
                Ok(value.to_string())
            } else {
                Err("Invalid email address".to_string())
            }
        }
        IdentityField::Phone => PHONE_RE
            .find(value)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| "Invalid phone number".to_string()),
    }
}

fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty() && !host.starts_with('.'),
        None => false,
    }
}

/// Check the password policy: length, a digit, an uppercase and a lowercase letter.
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password should be at least {} characters long",
            MIN_PASSWORD_LEN
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password should have at least one numeral".to_string());
    }
    if !password.chars().any(char::is_uppercase) {
        return Err("Password should have at least one uppercase letter".to_string());
    }
    if !password.chars().any(char::is_lowercase) {
        return Err("Password should have at least one lowercase letter".to_string());
    }
    Ok(())
}
