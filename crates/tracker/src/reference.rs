//! Opaque references to remote metadata objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of identifier a [`Reference`] carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    /// A business code assigned in the target platform.
    Code,
    /// An externally assigned identifier attribute.
    Identifier,
    /// The platform's internal object id.
    Id,
}

impl ReferenceKind {
    /// Convert to the wire format string.
    pub fn to_wire(self) -> &'static str {
        match self {
            ReferenceKind::Code => "code",
            ReferenceKind::Identifier => "identifier",
            ReferenceKind::Id => "id",
        }
    }

    /// Parse from the wire format string.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "code" => Some(ReferenceKind::Code),
            "identifier" => Some(ReferenceKind::Identifier),
            "id" => Some(ReferenceKind::Id),
            _ => None,
        }
    }
}

/// An opaque identifier for a remote metadata object.
///
/// Immutable value type; equality and hashing are by `(kind, value)`, so a
/// code reference and an id reference to the same remote object are
/// distinct keys. The cache stores records under every reference kind a
/// record exposes, which is what makes lookups through different kinds of
/// the same object agree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    kind: ReferenceKind,
    value: String,
}

impl Reference {
    /// Create a reference of the given kind.
    pub fn new(kind: ReferenceKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    /// Create a code reference.
    pub fn code(value: impl Into<String>) -> Self {
        Self::new(ReferenceKind::Code, value)
    }

    /// Create an identifier reference.
    pub fn identifier(value: impl Into<String>) -> Self {
        Self::new(ReferenceKind::Identifier, value)
    }

    /// Create an internal-id reference.
    pub fn id(value: impl Into<String>) -> Self {
        Self::new(ReferenceKind::Id, value)
    }

    /// The kind of identifier this reference carries.
    pub fn kind(&self) -> ReferenceKind {
        self.kind
    }

    /// The identifier value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.to_wire(), self.value)
    }
}

impl FromStr for Reference {
    type Err = String;

    /// Parses the `kind:value` display form, e.g. `code:OU_1234`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| format!("expected kind:value, got '{}'", s))?;
        let kind = ReferenceKind::from_wire(kind)
            .ok_or_else(|| format!("unknown reference kind: '{}'", kind))?;
        if value.is_empty() {
            return Err("reference value cannot be empty".into());
        }
        Ok(Reference::new(kind, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equality_is_by_kind_and_value() {
        assert_eq!(Reference::code("OU_1"), Reference::code("OU_1"));
        assert_ne!(Reference::code("OU_1"), Reference::id("OU_1"));
        assert_ne!(Reference::code("OU_1"), Reference::code("OU_2"));
    }

    #[test]
    fn distinct_kinds_are_distinct_map_keys() {
        let mut set = HashSet::new();
        set.insert(Reference::code("X"));
        set.insert(Reference::identifier("X"));
        set.insert(Reference::id("X"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn display_and_parse_round_trip() {
        let reference = Reference::identifier("ABC-123");
        assert_eq!(reference.to_string(), "identifier:ABC-123");
        assert_eq!(reference.to_string().parse::<Reference>().unwrap(), reference);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!("no-colon".parse::<Reference>().is_err());
        assert!("badge:X".parse::<Reference>().is_err());
        assert!("code:".parse::<Reference>().is_err());
    }

    #[test]
    fn value_with_colons_parses_whole_tail() {
        let reference = "id:a:b".parse::<Reference>().unwrap();
        assert_eq!(reference.kind(), ReferenceKind::Id);
        assert_eq!(reference.value(), "a:b");
    }
}
