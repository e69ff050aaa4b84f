use std::collections::TryReserveError;
use std::io;
use thiserror::Error;

/// Why a field was rejected before it reached the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidField {
    #[error("patient id must be positive (got {0})")]
    NonPositiveId(i32),
    #[error("age must be between 1 and 120 (got {0})")]
    AgeOutOfRange(i32),
    #[error("gender must be one of M, F, O (got {0:?})")]
    Gender(char),
    #[error("name must not be empty")]
    EmptyName,
    #[error("name is {0} characters long (max {})", crate::model::MAX_NAME_LEN)]
    NameTooLong(usize),
    #[error("medical history entry must not be empty")]
    EmptyHistoryEntry,
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid input: {0}")]
    Validation(#[from] InvalidField),

    #[error("patient id {0} is already in use")]
    DuplicateId(i32),

    #[error("no patient found with id {0}")]
    NotFound(i32),

    #[error("patient {0} is already discharged")]
    AlreadyDischarged(i32),

    #[error("store is full (maximum {max} patients)")]
    CapacityExceeded { max: usize },

    #[error("out of memory: {0}")]
    Allocation(#[from] TryReserveError),

    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt data at byte {offset}: {reason}")]
    CorruptData { offset: usize, reason: String },
}

impl RecordError {
    pub(crate) fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        RecordError::CorruptData { offset, reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, RecordError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_reason() {
        let err = RecordError::from(InvalidField::AgeOutOfRange(130));
        assert_eq!(err.to_string(), "invalid input: age must be between 1 and 120 (got 130)");

        let err = RecordError::from(InvalidField::NameTooLong(120));
        assert_eq!(err.to_string(), "invalid input: name is 120 characters long (max 99)");

        let err = RecordError::CapacityExceeded { max: 50 };
        assert_eq!(err.to_string(), "store is full (maximum 50 patients)");

        let err = RecordError::corrupt(12, "name length exceeds stream");
        assert_eq!(err.to_string(), "corrupt data at byte 12: name length exceeds stream");
    }

    #[test]
    fn io_errors_convert() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: RecordError = io_err.into();
        assert!(matches!(err, RecordError::Io(ref e) if e.kind() == io::ErrorKind::PermissionDenied));
    }
}
