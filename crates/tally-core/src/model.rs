//! Server-side entity shapes.
//!
//! These are the payloads the budgeting API returns. They are converted
//! into grid [`Row`](crate::rows::Row)s by the reducer and
//! [`RowCollection::from_response`](crate::rows::RowCollection::from_response).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::rows::{ModelId, RowData};

/// How a fringe or markup rate is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Unit {
    /// Rate is an absolute amount.
    Flat,
    /// Rate is a fraction of the base value (0.1 = 10%).
    Percent,
}

impl Unit {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "FLAT",
            Self::Percent => "PERCENT",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FLAT" => Ok(Self::Flat),
            "PERCENT" => Ok(Self::Percent),
            other => Err(format!("unknown unit '{other}': expected FLAT or PERCENT")),
        }
    }
}

/// A persisted row entity (account, sub-account, detail line).
///
/// Everything other than `id` and `children` is kept as opaque cell data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerModel {
    pub id: ModelId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ModelId>,
    #[serde(flatten)]
    pub fields: RowData,
}

/// A persisted group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub children: Vec<ModelId>,
}

/// A persisted markup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Markup {
    pub id: u64,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub unit: Option<Unit>,
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub children: Vec<ModelId>,
}

/// A fringe: a per-row cost derived from the row's nominal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fringe {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub unit: Option<Unit>,
    /// Upper bound on the base a PERCENT fringe is applied to.
    #[serde(default)]
    pub cutoff: Option<f64>,
}

/// Bulk table response: everything needed to build a grid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableResponse {
    #[serde(default)]
    pub models: Vec<ServerModel>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub markups: Vec<Markup>,
}
