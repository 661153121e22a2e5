//! Request methods for outgoing writes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The closed set of write methods the platform accepts.
///
/// The variants differ in what they are allowed to do when the remote
/// object does or does not exist, which in turn decides whether a dispatch
/// may be retried after a transport failure with unknown outcome:
///
/// - `Create` must fail rather than silently update an existing object, so
///   a blind retry risks duplicate creation and is forbidden.
/// - `Update` sets fields on an object that is known to exist and may
///   always be retried.
/// - `CreateOrUpdate` is the idempotent upsert: correct whether or not the
///   object exists, and therefore the only method that stays correct under
///   races where existence cannot be proven at selection time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestMethod {
    /// Create a new remote object; fails if it already exists.
    Create,
    /// Update an existing remote object.
    Update,
    /// Idempotent create-or-update.
    CreateOrUpdate,
}

impl RequestMethod {
    /// True when the operation is permitted to create a new remote object.
    pub fn is_create(self) -> bool {
        matches!(self, RequestMethod::Create | RequestMethod::CreateOrUpdate)
    }

    /// True when the operation must fail if the object already exists.
    pub fn is_create_only(self) -> bool {
        matches!(self, RequestMethod::Create)
    }

    /// True when an unchanged dispatch may be repeated after an ambiguous
    /// transport failure.
    pub fn is_blind_retry_safe(self) -> bool {
        !self.is_create_only()
    }

    /// Selects the method for one synchronization attempt.
    ///
    /// `resolved` is whether a prior successful resolution exists for the
    /// target reference; `upsert_required` is whether the target system
    /// contract demands idempotent upsert for unresolved targets.
    pub fn resolve(resolved: bool, upsert_required: bool) -> RequestMethod {
        if resolved {
            RequestMethod::Update
        } else if upsert_required {
            RequestMethod::CreateOrUpdate
        } else {
            RequestMethod::Create
        }
    }

    /// Convert to the wire format string.
    pub fn to_wire(self) -> &'static str {
        match self {
            RequestMethod::Create => "CREATE",
            RequestMethod::Update => "UPDATE",
            RequestMethod::CreateOrUpdate => "CREATE_OR_UPDATE",
        }
    }

    /// Parse from the wire format string.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "CREATE" => Some(RequestMethod::Create),
            "UPDATE" => Some(RequestMethod::Update),
            "CREATE_OR_UPDATE" => Some(RequestMethod::CreateOrUpdate),
            _ => None,
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_wire())
    }
}

impl Serialize for RequestMethod {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_wire())
    }
}

impl<'de> Deserialize<'de> for RequestMethod {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RequestMethod::from_wire(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown request method: '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_predicates() {
        assert!(RequestMethod::Create.is_create());
        assert!(RequestMethod::Create.is_create_only());

        assert!(!RequestMethod::Update.is_create());
        assert!(!RequestMethod::Update.is_create_only());

        assert!(RequestMethod::CreateOrUpdate.is_create());
        assert!(!RequestMethod::CreateOrUpdate.is_create_only());
    }

    #[test]
    fn only_create_forbids_blind_retry() {
        assert!(!RequestMethod::Create.is_blind_retry_safe());
        assert!(RequestMethod::Update.is_blind_retry_safe());
        assert!(RequestMethod::CreateOrUpdate.is_blind_retry_safe());
    }

    #[test]
    fn resolution_policy() {
        // prior resolution always wins
        assert_eq!(RequestMethod::resolve(true, false), RequestMethod::Update);
        assert_eq!(RequestMethod::resolve(true, true), RequestMethod::Update);
        // unresolved: plain create unless the contract demands upsert
        assert_eq!(RequestMethod::resolve(false, false), RequestMethod::Create);
        assert_eq!(
            RequestMethod::resolve(false, true),
            RequestMethod::CreateOrUpdate
        );
    }

    #[test]
    fn wire_strings_round_trip() {
        for method in [
            RequestMethod::Create,
            RequestMethod::Update,
            RequestMethod::CreateOrUpdate,
        ] {
            assert_eq!(RequestMethod::from_wire(method.to_wire()), Some(method));
        }
        assert_eq!(RequestMethod::from_wire("PATCH"), None);
    }
}
