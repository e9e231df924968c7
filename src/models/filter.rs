//! Search filters passed to providers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a three-way checkbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    Checked,
    Unchecked,
    Disabled,
}

impl TriState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checked => "checked",
            Self::Unchecked => "unchecked",
            Self::Disabled => "disabled",
        }
    }
}

/// Typed value of a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FilterValue {
    String(String),
    Number(f64),
    Integer(i64),
    Toggle(bool),
    Date(DateTime<Utc>),
    TriState(TriState),
}

/// A search filter, identified by a provider-defined id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogFilter {
    pub id: String,
    pub value: FilterValue,
}

impl CatalogFilter {
    /// Id of the free-text filter.
    pub const QUERY: &'static str = "query";
    /// Id of the page filter.
    pub const PAGE: &'static str = "page";

    pub fn new(id: impl Into<String>, value: FilterValue) -> Self {
        Self {
            id: id.into(),
            value,
        }
    }

    pub fn query(text: impl Into<String>) -> Self {
        Self::new(Self::QUERY, FilterValue::String(text.into()))
    }

    pub fn page(page: u32) -> Self {
        Self::new(Self::PAGE, FilterValue::Integer(i64::from(page)))
    }
}
