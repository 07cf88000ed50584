use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::errors::Error;

/// Identifier of a stored document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Ulid);

impl DocumentId {
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Parses a textual id, failing with [`Error::InvalidId`] when it is not a ULID.
    pub fn parse(value: &str) -> Result<Self, Error> {
        Ulid::from_string(value)
            .map(Self)
            .map_err(|_| Error::invalid_id(value))
    }
}

impl FromStr for DocumentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn parses_its_own_display() {
        let id = DocumentId::generate();

        assert_eq!(DocumentId::parse(&id.to_string()).ok(), Some(id));
    }

    #[test]
    fn rejects_malformed_ids() {
        let err = DocumentId::parse("not-an-id").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidId);
        assert_eq!(err.to_string(), "Invalid identifier: not-an-id");
    }
}
