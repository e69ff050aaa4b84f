use std::collections::TryReserveError;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InvalidField;

pub const MAX_NAME_LEN: usize = 99;
pub const MIN_AGE: i32 = 1;
pub const MAX_AGE: i32 = 120;

/// Inserted between history entries on append.
pub const HISTORY_SEPARATOR: &str = "; ";

/// Unix timestamp in seconds.
pub type Timestamp = i64;

pub fn now() -> Timestamp {
    chrono::Utc::now().timestamp()
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "O")]
    Other,
}

impl Gender {
    /// Single-byte code used on disk and at the prompt.
    pub fn code(self) -> u8 {
        match self {
            Gender::Male => b'M',
            Gender::Female => b'F',
            Gender::Other => b'O',
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

impl TryFrom<char> for Gender {
    type Error = InvalidField;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c.to_ascii_uppercase() {
            'M' => Ok(Gender::Male),
            'F' => Ok(Gender::Female),
            'O' => Ok(Gender::Other),
            _ => Err(InvalidField::Gender(c)),
        }
    }
}

impl TryFrom<u8> for Gender {
    type Error = InvalidField;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            b'M' => Ok(Gender::Male),
            b'F' => Ok(Gender::Female),
            b'O' => Ok(Gender::Other),
            other => Err(InvalidField::Gender(char::from(other))),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Append-only free text. An append either lands completely or leaves the
/// previous content untouched.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct MedicalHistory(String);

impl MedicalHistory {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn append(&mut self, entry: &str) -> Result<(), TryReserveError> {
        let sep = if self.0.is_empty() { "" } else { HISTORY_SEPARATOR };
        self.0.try_reserve(sep.len() + entry.len())?;
        self.0.push_str(sep);
        self.0.push_str(entry);
        Ok(())
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.split(HISTORY_SEPARATOR).filter(|e| !e.is_empty())
    }
}

impl fmt::Display for MedicalHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One patient under (or formerly under) care.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PatientRecord {
    pub id: i32,
    pub name: String,
    pub age: u8,
    pub gender: Gender,
    pub medical_history: MedicalHistory,

    /// Set once when the record is created
    pub admission_timestamp: Timestamp,

    /// `None` while the patient is active
    pub discharge_timestamp: Option<Timestamp>,

    pub is_discharged: bool,
}

impl PatientRecord {
    pub fn is_active(&self) -> bool {
        !self.is_discharged
    }
}

pub fn validate_id(id: i32) -> Result<i32, InvalidField> {
    if id <= 0 {
        return Err(InvalidField::NonPositiveId(id));
    }
    Ok(id)
}

pub fn validate_age(age: i32) -> Result<u8, InvalidField> {
    if !(MIN_AGE..=MAX_AGE).contains(&age) {
        return Err(InvalidField::AgeOutOfRange(age));
    }
    // Range above guarantees the value fits.
    Ok(age as u8)
}

pub fn validate_name(name: &str) -> Result<&str, InvalidField> {
    let name = name.trim();
    if name.is_empty() {
        return Err(InvalidField::EmptyName);
    }
    let chars = name.chars().count();
    if chars > MAX_NAME_LEN {
        return Err(InvalidField::NameTooLong(chars));
    }
    Ok(name)
}
