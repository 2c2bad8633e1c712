//! The forms submitted by the browser, and their validation rules.
//!
//! Field errors are collected rather than returned on the first failure,
//! so that every invalid field can be flagged when the form is re-rendered.
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;

pub const FIELD_REQUIRED: &str = "This field is required.";
pub const INVALID_EMAIL: &str = "Invalid email address.";
pub const TITLE_TOO_LONG: &str = "Field cannot be longer than 100 characters.";
pub const CSRF_TOKEN_INVALID: &str = "The CSRF token is missing or invalid.";

/// The maximum length of a post title, in characters.
pub const MAX_TITLE_LENGTH: usize = 100;

/// The validation errors for a submitted form, grouped by field name.
///
/// Every field of the form has an entry, possibly empty, so that templates
/// can look up the errors of any field.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<&'static str>>);

impl FieldErrors {
    /// No errors yet for `fields` and for the CSRF token.
    pub fn new(fields: &[&'static str]) -> Self {
        let errors = fields
            .iter()
            .chain(std::iter::once(&"csrf_token"))
            .map(|field| (*field, Vec::new()))
            .collect();
        Self(errors)
    }

    pub fn add(&mut self, field: &'static str, message: &'static str) {
        self.0.entry(field).or_default().push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    /// The errors reported for `field`, if any.
    pub fn get(&self, field: &str) -> &[&'static str] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }
}

/// A form protected by a CSRF token.
pub trait Form {
    /// The names of the fields shown to the user.
    const FIELDS: &'static [&'static str];

    /// Check every field, except for the CSRF token.
    fn validate(&self) -> FieldErrors;

    fn csrf_token(&self) -> &str;
}

#[derive(Debug, Default, Clone, serde::Deserialize, serde::Serialize)]
pub struct PostForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing)]
    pub csrf_token: String,
}

impl Form for PostForm {
    const FIELDS: &'static [&'static str] = &["title", "content"];

    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new(Self::FIELDS);
        if is_blank(&self.title) {
            errors.add("title", FIELD_REQUIRED);
        } else if self.title.chars().count() > MAX_TITLE_LENGTH {
            errors.add("title", TITLE_TOO_LONG);
        }
        if is_blank(&self.content) {
            errors.add("content", FIELD_REQUIRED);
        }
        errors
    }

    fn csrf_token(&self) -> &str {
        &self.csrf_token
    }
}

#[derive(Debug, Default, Clone, serde::Deserialize)]
pub struct SignUpForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: SecretString,
    #[serde(default)]
    pub csrf_token: String,
}

impl Form for SignUpForm {
    const FIELDS: &'static [&'static str] = CREDENTIALS_FIELDS;

    fn validate(&self) -> FieldErrors {
        validate_credentials_fields(&self.email, &self.password)
    }

    fn csrf_token(&self) -> &str {
        &self.csrf_token
    }
}

#[derive(Debug, Default, Clone, serde::Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: SecretString,
    #[serde(default)]
    pub csrf_token: String,
}

impl Form for LoginForm {
    const FIELDS: &'static [&'static str] = CREDENTIALS_FIELDS;

    fn validate(&self) -> FieldErrors {
        validate_credentials_fields(&self.email, &self.password)
    }

    fn csrf_token(&self) -> &str {
        &self.csrf_token
    }
}

/// A form with no fields of its own, e.g. a delete button.
#[derive(Debug, Default, Clone, serde::Deserialize)]
pub struct CsrfForm {
    #[serde(default)]
    pub csrf_token: String,
}

impl Form for CsrfForm {
    const FIELDS: &'static [&'static str] = &[];

    fn validate(&self) -> FieldErrors {
        FieldErrors::new(Self::FIELDS)
    }

    fn csrf_token(&self) -> &str {
        &self.csrf_token
    }
}

const CREDENTIALS_FIELDS: &[&str] = &["email", "password"];

fn validate_credentials_fields(email: &str, password: &SecretString) -> FieldErrors {
    let mut errors = FieldErrors::new(CREDENTIALS_FIELDS);
    if is_blank(email) {
        errors.add("email", FIELD_REQUIRED);
    } else if !is_valid_email(email.trim()) {
        errors.add("email", INVALID_EMAIL);
    }
    if is_blank(password.expose_secret()) {
        errors.add("password", FIELD_REQUIRED);
    }
    errors
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// A structural check: `local@domain.tld`, no whitespace, a single `@`,
/// and a domain made of non-empty dot-separated labels.
fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        })
}
