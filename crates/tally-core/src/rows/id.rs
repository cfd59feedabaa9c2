//! Row identifiers.
//!
//! A grid row lives in exactly one of four identifier spaces:
//!
//! | space       | text form           | JSON form          |
//! |-------------|---------------------|--------------------|
//! | model       | `7`                 | `7`                |
//! | placeholder | `placeholder-x9f2`  | `"placeholder-x9f2"` |
//! | group       | `group-3`           | `"group-3"`        |
//! | markup      | `markup-2`          | `"markup-2"`       |
//!
//! The spaces never overlap, so a raw id value alone determines the row's
//! category. The row's `rowType` tag is still the primary discriminant; the
//! id space is only cross-checked when a row is parsed.

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::RowType;

/// Server-assigned primary key of a model row.
pub type ModelId = u64;

const PLACEHOLDER_PREFIX: &str = "placeholder-";
const GROUP_PREFIX: &str = "group-";
const MARKUP_PREFIX: &str = "markup-";

/// Length of the random suffix of generated placeholder ids.
const PLACEHOLDER_SUFFIX_LEN: usize = 12;

/// Error returned when a value is not a valid row identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowIdError {
    #[error("row id must not be empty")]
    Empty,

    #[error("model ids must be positive integers, got {raw}")]
    NonPositiveModel { raw: i64 },

    #[error("invalid row id '{raw}': expected an integer, placeholder-<token>, group-<n> or markup-<n>")]
    Malformed { raw: String },
}

// ---------------------------------------------------------------------------
// Typed ids
// ---------------------------------------------------------------------------

/// Identifier of a row that has not been confirmed by the server yet.
///
/// Holds only the random token; the `placeholder-` prefix is added on
/// display and serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaceholderId(String);

impl PlaceholderId {
    /// Build a placeholder id from its token (the part after `placeholder-`).
    ///
    /// # Errors
    ///
    /// Returns [`RowIdError::Malformed`] if the token is empty or contains
    /// characters outside `[A-Za-z0-9_-]`.
    pub fn new(token: impl Into<String>) -> Result<Self, RowIdError> {
        let token = token.into();
        let valid = !token.is_empty()
            && token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(Self(token))
        } else {
            Err(RowIdError::Malformed {
                raw: format!("{PLACEHOLDER_PREFIX}{token}"),
            })
        }
    }

    /// Generate a fresh random placeholder id.
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        let token = (0..PLACEHOLDER_SUFFIX_LEN)
            .map(|_| char::from(rng.sample(Alphanumeric)))
            .collect();
        Self(token)
    }

    /// The random token without the `placeholder-` prefix.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaceholderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PLACEHOLDER_PREFIX}{}", self.0)
    }
}

impl FromStr for PlaceholderId {
    type Err = RowIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(PLACEHOLDER_PREFIX)
            .ok_or_else(|| RowIdError::Malformed { raw: s.to_string() })
            .and_then(Self::new)
    }
}

/// Identifier of a group aggregate row (`group-<n>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u64);

/// Identifier of a markup aggregate row (`markup-<n>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkupId(pub u64);

macro_rules! prefixed_id {
    ($ty:ident, $prefix:expr) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }

        impl FromStr for $ty {
            type Err = RowIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.strip_prefix($prefix)
                    .and_then(|n| n.parse::<u64>().ok())
                    .map(Self)
                    .ok_or_else(|| RowIdError::Malformed { raw: s.to_string() })
            }
        }
    };
}

prefixed_id!(GroupId, GROUP_PREFIX);
prefixed_id!(MarkupId, MARKUP_PREFIX);

// Placeholder/group/markup ids travel as their prefixed string form.
macro_rules! string_serde {
    ($ty:ident) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

string_serde!(PlaceholderId);
string_serde!(GroupId);
string_serde!(MarkupId);

// ---------------------------------------------------------------------------
// RowId
// ---------------------------------------------------------------------------

/// Identifier of any row in a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowId {
    Model(ModelId),
    Placeholder(PlaceholderId),
    Group(GroupId),
    Markup(MarkupId),
}

impl RowId {
    /// The row category implied by the identifier space.
    #[must_use]
    pub const fn row_type(&self) -> RowType {
        match self {
            Self::Model(_) => RowType::Model,
            Self::Placeholder(_) => RowType::Placeholder,
            Self::Group(_) => RowType::Group,
            Self::Markup(_) => RowType::Markup,
        }
    }

    #[must_use]
    pub const fn as_model(&self) -> Option<ModelId> {
        match self {
            Self::Model(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Model(id) => write!(f, "{id}"),
            Self::Placeholder(id) => id.fmt(f),
            Self::Group(id) => id.fmt(f),
            Self::Markup(id) => id.fmt(f),
        }
    }
}

impl FromStr for RowId {
    type Err = RowIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(RowIdError::Empty);
        }
        if s.starts_with(PLACEHOLDER_PREFIX) {
            return s.parse().map(Self::Placeholder);
        }
        if s.starts_with(GROUP_PREFIX) {
            return s.parse().map(Self::Group);
        }
        if s.starts_with(MARKUP_PREFIX) {
            return s.parse().map(Self::Markup);
        }
        match s.parse::<u64>() {
            Ok(0) => Err(RowIdError::NonPositiveModel { raw: 0 }),
            Ok(id) => Ok(Self::Model(id)),
            Err(_) => Err(RowIdError::Malformed { raw: s.to_string() }),
        }
    }
}

impl From<ModelId> for RowId {
    fn from(id: ModelId) -> Self {
        Self::Model(id)
    }
}

impl From<PlaceholderId> for RowId {
    fn from(id: PlaceholderId) -> Self {
        Self::Placeholder(id)
    }
}

impl From<GroupId> for RowId {
    fn from(id: GroupId) -> Self {
        Self::Group(id)
    }
}

impl From<MarkupId> for RowId {
    fn from(id: MarkupId) -> Self {
        Self::Markup(id)
    }
}

impl Serialize for RowId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Model(id) => serializer.serialize_u64(*id),
            other => serializer.collect_str(other),
        }
    }
}

impl<'de> Deserialize<'de> for RowId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowIdVisitor;

        impl Visitor<'_> for RowIdVisitor {
            type Value = RowId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a positive integer or a prefixed row id string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<RowId, E> {
                if v == 0 {
                    return Err(E::custom(RowIdError::NonPositiveModel { raw: 0 }));
                }
                Ok(RowId::Model(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<RowId, E> {
                u64::try_from(v)
                    .ok()
                    .filter(|v| *v > 0)
                    .map(RowId::Model)
                    .ok_or_else(|| E::custom(RowIdError::NonPositiveModel { raw: v }))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<RowId, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(RowIdVisitor)
    }
}
