//! Stateless validation errors and field checks.

use thiserror::Error;

use super::asset::{Asset, Symbol};
use super::authority::Authority;
use super::constants::{MAX_PERMLINK_LENGTH, MIN_PERMLINK_LENGTH};
use super::types::AccountName;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid account name in {field}: '{name}'")]
    InvalidAccountName { field: &'static str, name: String },

    #[error("Invalid permlink '{permlink}': {reason}")]
    InvalidPermlink { permlink: String, reason: String },

    #[error("Invalid amount in {field}: {amount} ({reason})")]
    InvalidAmount {
        field: &'static str,
        amount: String,
        reason: &'static str,
    },

    #[error("Wrong symbol in {field}: expected {expected}")]
    WrongSymbol {
        field: &'static str,
        expected: &'static str,
    },

    #[error("{field} too long: {len} > {max}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Invalid authority in {field}: {reason}")]
    InvalidAuthority { field: &'static str, reason: String },

    #[error("Invalid JSON in {field}: {reason}")]
    InvalidJson { field: &'static str, reason: String },

    #[error("Transaction has no operations")]
    EmptyTransaction,

    #[error("{op}: {reason}")]
    Invalid { op: &'static str, reason: String },
}

pub type ValidationResult<T> = Result<T, ValidationError>;

pub fn invalid(op: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError::Invalid {
        op,
        reason: reason.into(),
    }
}

pub fn account_name(field: &'static str, name: &AccountName) -> ValidationResult<()> {
    if AccountName::is_valid(name.as_str()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidAccountName {
            field,
            name: name.to_string(),
        })
    }
}

/// Lowercase letters, digits and dashes, bounded length.
pub fn permlink(permlink: &str) -> ValidationResult<()> {
    let len = permlink.len();
    if len < MIN_PERMLINK_LENGTH || len >= MAX_PERMLINK_LENGTH {
        return Err(ValidationError::InvalidPermlink {
            permlink: permlink.to_string(),
            reason: "permlink is not a valid size".into(),
        });
    }
    if let Some(c) = permlink
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return Err(ValidationError::InvalidPermlink {
            permlink: permlink.to_string(),
            reason: format!("invalid permlink character: {c}"),
        });
    }
    Ok(())
}

pub fn symbol(field: &'static str, asset: &Asset, expected: Symbol) -> ValidationResult<()> {
    if asset.symbol == expected {
        Ok(())
    } else {
        Err(ValidationError::WrongSymbol {
            field,
            expected: expected.name(),
        })
    }
}

pub fn positive(field: &'static str, asset: &Asset) -> ValidationResult<()> {
    if asset.amount > 0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidAmount {
            field,
            amount: asset.to_string(),
            reason: "must be positive",
        })
    }
}

pub fn non_negative(field: &'static str, asset: &Asset) -> ValidationResult<()> {
    if asset.amount >= 0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidAmount {
            field,
            amount: asset.to_string(),
            reason: "cannot be negative",
        })
    }
}

pub fn max_len(field: &'static str, value: &str, max: usize) -> ValidationResult<()> {
    if value.len() <= max {
        Ok(())
    } else {
        Err(ValidationError::TooLong {
            field,
            len: value.len(),
            max,
        })
    }
}

pub fn authority(field: &'static str, auth: &Authority) -> ValidationResult<()> {
    auth.validate()
        .map_err(|reason| ValidationError::InvalidAuthority { field, reason })
}

/// Empty metadata is allowed; anything else must parse as JSON.
pub fn json(field: &'static str, value: &str) -> ValidationResult<()> {
    if value.is_empty() {
        return Ok(());
    }
    serde_json::from_str::<serde_json::Value>(value)
        .map(|_| ())
        .map_err(|e| ValidationError::InvalidJson {
            field,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permlink_charset() {
        assert!(permlink("hello-world-1").is_ok());
        assert!(permlink("").is_ok());
        assert!(permlink("Hello").is_err());
        assert!(permlink(&"a".repeat(MAX_PERMLINK_LENGTH)).is_err());
    }

    #[test]
    fn test_json_metadata() {
        assert!(json("json_metadata", "").is_ok());
        assert!(json("json_metadata", "{\"app\":\"x\"}").is_ok());
        assert!(json("json_metadata", "{not json").is_err());
    }
}
