//! Field and file checks for the public submission form.
//!
//! Everything here is pure so it can run on every keystroke through
//! `POST /api/public/validate` as well as on the final submission.

use crate::dto::candidate_dto::{CandidateForm, NamedFile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use validator::Validate;

pub const DEFAULT_MAX_FILE_BYTES: usize = 5 * 1024 * 1024;
pub const MIN_AGE: u8 = 16;
pub const MAX_AGE: u8 = 100;

/// Field name → first error message, ordered by field name.
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FormField {
    Name,
    Age,
    Phone,
    NationalId,
}

impl FormField {
    pub const ALL: [FormField; 4] = [
        FormField::Name,
        FormField::Age,
        FormField::Phone,
        FormField::NationalId,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormField::Name => "name",
            FormField::Age => "age",
            FormField::Phone => "phone",
            FormField::NationalId => "nationalId",
        }
    }
}

impl FromStr for FormField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FormField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("Unknown field: {}", s))
    }
}

/// Returns the message to show next to `field`, or `None` when `raw` is acceptable.
pub fn validate_field(field: FormField, raw: &str) -> Option<String> {
    match field {
        FormField::Name => {
            if raw.trim().is_empty() {
                Some("Name is required".to_string())
            } else {
                None
            }
        }
        FormField::Age => match raw.trim().parse::<i64>() {
            Err(_) => Some("Age must be a whole number".to_string()),
            Ok(age) if age < MIN_AGE as i64 || age > MAX_AGE as i64 => Some(format!(
                "Age must be between {} and {}",
                MIN_AGE, MAX_AGE
            )),
            Ok(_) => None,
        },
        FormField::Phone => {
            if is_valid_phone(raw) {
                None
            } else {
                Some("Phone must look like (11) 98888-7777".to_string())
            }
        }
        FormField::NationalId => national_id_error(raw),
    }
}

pub fn validate_form(form: &CandidateForm) -> FieldErrors {
    let mut errors = FieldErrors::new();
    for (field, raw) in [
        (FormField::Name, form.name.as_str()),
        (FormField::Age, form.age.as_str()),
        (FormField::Phone, form.phone.as_str()),
        (FormField::NationalId, form.national_id.as_str()),
    ] {
        if let Some(message) = validate_field(field, raw) {
            errors.insert(field.as_str().to_string(), message);
        }
    }
    errors
}

/// `(DD) DDDD-DDDD` or `(DD) DDDDD-DDDD`.
pub fn is_valid_phone(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let digits = |s: &[u8]| !s.is_empty() && s.iter().all(u8::is_ascii_digit);
    if bytes.len() != 14 && bytes.len() != 15 {
        return false;
    }
    let local_len = bytes.len() - 10;
    bytes[0] == b'('
        && digits(&bytes[1..3])
        && bytes[3] == b')'
        && bytes[4] == b' '
        && digits(&bytes[5..5 + local_len])
        && bytes[5 + local_len] == b'-'
        && digits(&bytes[6 + local_len..])
}

fn national_id_error(raw: &str) -> Option<String> {
    let Some(digits) = raw
        .chars()
        .filter(|c| !matches!(c, '.' | '-' | ' '))
        .map(|c| c.to_digit(10))
        .collect::<Option<Vec<u32>>>()
    else {
        return Some("National ID may only contain digits, dots and a dash".to_string());
    };
    if digits.len() != 11 {
        return Some("National ID must have 11 digits".to_string());
    }
    if digits.iter().all(|d| *d == digits[0]) {
        return Some("National ID is invalid".to_string());
    }
    if check_digit(&digits[..9]) != digits[9] || check_digit(&digits[..10]) != digits[10] {
        return Some("National ID check digits do not match".to_string());
    }
    None
}

/// Mod-11 check digit over `digits`, weights running from `len + 1` down to 2.
fn check_digit(digits: &[u32]) -> u32 {
    let weight_start = digits.len() as u32 + 1;
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| d * (weight_start - i as u32))
        .sum();
    let remainder = (sum * 10) % 11;
    if remainder == 10 {
        0
    } else {
        remainder
    }
}

pub fn is_valid_national_id(raw: &str) -> bool {
    validate_field(FormField::NationalId, raw).is_none()
}

/// Upload limits applied to every document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLimits {
    pub max_bytes: usize,
    pub allowed_types: Vec<String>,
}

impl Default for FileLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_FILE_BYTES,
            allowed_types: vec!["image/jpeg".to_string(), "image/png".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRejection {
    Missing,
    Empty,
    TooLarge { size: usize, max_bytes: usize },
    UnsupportedType(String),
    ContentMismatch(String),
}

impl fmt::Display for FileRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileRejection::Missing => write!(f, "File is required"),
            FileRejection::Empty => write!(f, "File is empty"),
            FileRejection::TooLarge { max_bytes, .. } => write!(
                f,
                "File must be at most {} MB",
                *max_bytes as f64 / (1024.0 * 1024.0)
            ),
            FileRejection::UnsupportedType(ct) => {
                write!(f, "File type {} is not allowed; use JPEG or PNG", ct)
            }
            FileRejection::ContentMismatch(ct) => {
                write!(f, "File content is not a valid {}", ct)
            }
        }
    }
}

impl std::error::Error for FileRejection {}

pub fn validate_file(file: &NamedFile, limits: &FileLimits) -> Result<(), FileRejection> {
    let size = file.bytes.len();
    if size == 0 {
        return Err(FileRejection::Empty);
    }
    if size > limits.max_bytes {
        return Err(FileRejection::TooLarge {
            size,
            max_bytes: limits.max_bytes,
        });
    }
    let content_type = file.content_type.to_ascii_lowercase();
    if !limits
        .allowed_types
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&content_type))
    {
        return Err(FileRejection::UnsupportedType(file.content_type.clone()));
    }
    let magic_ok = match content_type.as_str() {
        "image/jpeg" => file.bytes.starts_with(&[0xFF, 0xD8]),
        "image/png" => file.bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]),
        _ => true,
    };
    if !magic_ok {
        return Err(FileRejection::ContentMismatch(file.content_type.clone()));
    }
    Ok(())
}

/// File extension used in storage paths for an accepted content type.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpeg",
        "image/png" => "png",
        _ => "bin",
    }
}

pub fn validate<T: Validate>(val: &T) -> Result<(), validator::ValidationErrors> {
    val.validate()
}
