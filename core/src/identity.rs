//! Identity and versioning types for multi-tenant event-sourced aggregates.
//!
//! An event in this system belongs to one aggregate instance, which is
//! addressed by the triple `(instance_id, aggregate_type, aggregate_id)`
//! rather than a single opaque stream id: every tenant ("instance") owns its
//! own namespace of aggregates, and aggregates of different types never
//! collide even if they happen to reuse the same id.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when parsing an identifier from an untrusted string fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid identifier: {0}")]
pub struct ParseIdError(String);

macro_rules! string_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Construct from application-controlled, already-trusted input.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the identifier, returning the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.is_empty() {
                    return Err(ParseIdError(format!(
                        "{} cannot be empty",
                        stringify!($name)
                    )));
                }
                Ok(Self(s.to_string()))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(InstanceId, "Identifies a tenant (IAM instance).");
string_id!(
    AggregateId,
    "Identifies one aggregate instance within its type and instance namespace."
);

/// Fully qualifies one aggregate instance: which tenant it belongs to, what
/// kind of aggregate it is, and its id within that (instance, type) pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateRef {
    /// The tenant this aggregate belongs to.
    pub instance_id: InstanceId,
    /// The aggregate type name, e.g. `"user"`, `"organization"`, `"project"`.
    pub aggregate_type: String,
    /// The aggregate's id within `(instance_id, aggregate_type)`.
    pub aggregate_id: AggregateId,
}

impl AggregateRef {
    /// Construct a reference to an aggregate instance.
    #[must_use]
    pub fn new(
        instance_id: impl Into<InstanceId>,
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<AggregateId>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
        }
    }
}

impl fmt::Display for AggregateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.instance_id, self.aggregate_type, self.aggregate_id
        )
    }
}

/// Per-aggregate event version, used for optimistic concurrency control.
///
/// Versions are 1-based: the first event appended to a fresh aggregate has
/// version 1. A version of 0 means "the aggregate does not exist yet" and is
/// the expected-version value passed when creating a new aggregate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AggregateVersion(u64);

impl AggregateVersion {
    /// The version of an aggregate that has not yet been created.
    pub const NONE: Self = Self(0);

    /// Construct a version with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The underlying version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The version after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Whether this aggregate has not had any events appended to it yet.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for AggregateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for AggregateVersion {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<AggregateVersion> for u64 {
    fn from(version: AggregateVersion) -> Self {
        version.0
    }
}

/// A total order over all events in an instance's log, independent of which
/// aggregate produced them.
///
/// `position` alone is not guaranteed unique when events are appended in the
/// same transaction (a command may append more than one event atomically);
/// `in_position_order` breaks ties between events sharing a `position`, and
/// `(position, in_position_order)` together form a strict total order
/// matching append order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalPosition {
    position: i64,
    in_position_order: i32,
}

impl GlobalPosition {
    /// The position before the first event ever appended.
    pub const BEGINNING: Self = Self {
        position: 0,
        in_position_order: 0,
    };

    /// Construct a global position.
    #[must_use]
    pub const fn new(position: i64, in_position_order: i32) -> Self {
        Self {
            position,
            in_position_order,
        }
    }

    /// The coarse position component (shared by events appended together).
    #[must_use]
    pub const fn position(self) -> i64 {
        self.position
    }

    /// The tie-breaker ordering events that share a `position`.
    #[must_use]
    pub const fn in_position_order(self) -> i32 {
        self.in_position_order
    }
}

impl fmt::Display for GlobalPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.position, self.in_position_order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod instance_id_tests {
        use super::*;

        #[test]
        fn new_and_as_str() {
            let id = InstanceId::new("acme-corp");
            assert_eq!(id.as_str(), "acme-corp");
        }

        #[test]
        fn parse_empty_string_fails() {
            assert!("".parse::<InstanceId>().is_err());
        }

        #[test]
        #[allow(clippy::expect_used)]
        fn parse_from_str() {
            let id: InstanceId = "acme-corp".parse().expect("parse should succeed");
            assert_eq!(id, InstanceId::new("acme-corp"));
        }
    }

    mod aggregate_ref_tests {
        use super::*;

        #[test]
        fn display_includes_all_three_parts() {
            let r = AggregateRef::new("acme-corp", "user", "user-1");
            assert_eq!(format!("{r}"), "acme-corp/user/user-1");
        }

        #[test]
        fn distinct_types_are_not_equal_even_with_same_id() {
            let a = AggregateRef::new("acme-corp", "user", "42");
            let b = AggregateRef::new("acme-corp", "project", "42");
            assert_ne!(a, b);
        }
    }

    mod aggregate_version_tests {
        use super::*;

        #[test]
        fn none_is_zero() {
            assert_eq!(AggregateVersion::NONE, AggregateVersion::new(0));
            assert!(AggregateVersion::NONE.is_none());
        }

        #[test]
        fn next_increments() {
            let v1 = AggregateVersion::NONE.next();
            let v2 = v1.next();
            assert_eq!(v1, AggregateVersion::new(1));
            assert_eq!(v2, AggregateVersion::new(2));
        }

        #[test]
        fn ordering() {
            assert!(AggregateVersion::new(1) < AggregateVersion::new(2));
        }
    }

    mod global_position_tests {
        use super::*;

        #[test]
        fn beginning_is_before_any_real_position() {
            let first = GlobalPosition::new(1, 0);
            assert!(GlobalPosition::BEGINNING < first);
        }

        #[test]
        fn ties_broken_by_in_position_order() {
            let a = GlobalPosition::new(5, 0);
            let b = GlobalPosition::new(5, 1);
            assert!(a < b);
        }

        #[test]
        fn display_format() {
            let p = GlobalPosition::new(5, 1);
            assert_eq!(format!("{p}"), "5.1");
        }
    }
}
