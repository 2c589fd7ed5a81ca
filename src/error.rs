// ⚠️ Lookup Errors - typed failures at the registry boundary
//
// Everything the matcher can recover from is a LookupError. Callers that
// only care about "usable or not" go through the try_* helpers, which turn
// these into None.

use std::fmt;
use thiserror::Error;

/// Which catalog a lookup went to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    Province,
    County,
    Municipality,
    Settlement,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Province => "province",
            UnitKind::County => "county",
            UnitKind::Municipality => "municipality",
            UnitKind::Settlement => "settlement",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("{kind} not found: {key:?}")]
    NotFound { kind: UnitKind, key: String },

    /// Non-permissive lookup of a name without the unit prefix.
    /// Means "not this kind of unit", not a data error.
    #[error("{name:?} does not name a {kind}")]
    MissingPrefix { kind: UnitKind, name: String },

    #[error("ambiguous {kind} name {name:?}: {count} candidates")]
    Ambiguous {
        kind: UnitKind,
        name: String,
        count: usize,
    },

    #[error("malformed {kind} code: {code:?}")]
    BadCode { kind: UnitKind, code: String },
}

impl LookupError {
    pub fn not_found(kind: UnitKind, key: impl Into<String>) -> Self {
        LookupError::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// Errors worth telling a human about when downgraded to None
    pub fn is_noteworthy(&self) -> bool {
        matches!(
            self,
            LookupError::Ambiguous { .. } | LookupError::BadCode { .. }
        )
    }
}
