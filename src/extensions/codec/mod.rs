//! Value codec between [`GuestValue`] and the domain records in
//! [`crate::models`].
//!
//! Decoding is lenient: scalars are coerced where a guest could reasonably
//! have meant them (numeric ids, numeric strings), nulls are filtered from
//! sequences, and only structurally required fields fail a record. Batch
//! decoders drop a failing record and keep the rest.

mod comment;
pub mod dates;
mod filter;
mod media;
mod tracking;
mod video;

use std::collections::BTreeMap;

use thiserror::Error;

use super::value::GuestValue;
use crate::models::{LoginScreen, SearchResults};

pub use tracking::decode_tracking;

/// Failure to decode one record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{record} is missing required field '{field}'")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },

    #[error("{record} field '{field}' should be a {expected}, found {found}")]
    UnexpectedKind {
        record: &'static str,
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{record} should be a {expected}, found {found}")]
    InvalidRecord {
        record: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

/// Conversion of a host value into a guest value.
pub trait ToGuest {
    fn to_guest(&self) -> GuestValue;
}

/// Conversion of a guest value into a host value.
pub trait FromGuest: Sized {
    fn from_guest(value: &GuestValue) -> Result<Self, DecodeError>;
}

impl<T: ToGuest> ToGuest for [T] {
    fn to_guest(&self) -> GuestValue {
        GuestValue::Sequence(self.iter().map(ToGuest::to_guest).collect())
    }
}

impl<T: ToGuest> ToGuest for Vec<T> {
    fn to_guest(&self) -> GuestValue {
        self.as_slice().to_guest()
    }
}

impl<T: ToGuest> ToGuest for Option<T> {
    fn to_guest(&self) -> GuestValue {
        self.as_ref().map_or(GuestValue::Null, ToGuest::to_guest)
    }
}

impl ToGuest for BTreeMap<String, String> {
    fn to_guest(&self) -> GuestValue {
        GuestValue::Mapping(
            self.iter()
                .map(|(key, value)| (key.clone(), GuestValue::from(value)))
                .collect(),
        )
    }
}

impl FromGuest for LoginScreen {
    fn from_guest(value: &GuestValue) -> Result<Self, DecodeError> {
        let map = expect_mapping(value, "login screen")?;
        Ok(map
            .iter()
            .filter_map(|(key, value)| value.to_scalar_string().map(|v| (key.clone(), v)))
            .collect())
    }
}

impl<T: FromGuest> FromGuest for SearchResults<T> {
    fn from_guest(value: &GuestValue) -> Result<Self, DecodeError> {
        let (items, has_next_page) = match value {
            GuestValue::Sequence(_) => (value, false),
            GuestValue::Mapping(_) => (
                value.get("items"),
                opt_bool(value.get("hasNextPage")).unwrap_or(false),
            ),
            GuestValue::Null => (value, false),
            other => {
                return Err(DecodeError::InvalidRecord {
                    record: "search results",
                    expected: "mapping",
                    found: other.kind(),
                })
            }
        };

        Ok(SearchResults {
            items: decode_list(items, "search results")?,
            has_next_page,
        })
    }
}

/// Decode a collection response.
///
/// Accepts a sequence, a mapping wrapping it under `items`, or nothing at
/// all (an empty collection). Undecodable elements are dropped.
pub fn decode_list<T: FromGuest>(
    value: &GuestValue,
    record: &'static str,
) -> Result<Vec<T>, DecodeError> {
    match value {
        GuestValue::Null => Ok(Vec::new()),
        GuestValue::Sequence(_) => Ok(decode_batch(value)),
        GuestValue::Mapping(_) if value.get("items").as_sequence().is_some() => {
            Ok(decode_batch(value.get("items")))
        }
        other => Err(DecodeError::InvalidRecord {
            record,
            expected: "sequence",
            found: other.kind(),
        }),
    }
}

/// Decode every non-null element of a sequence, dropping the ones that fail.
pub fn decode_batch<T: FromGuest>(value: &GuestValue) -> Vec<T> {
    sequence_items(value)
        .enumerate()
        .filter_map(|(index, item)| match T::from_guest(item) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!(index, error = %e, "Dropping undecodable record");
                None
            }
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Field helpers
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn expect_mapping<'a>(
    value: &'a GuestValue,
    record: &'static str,
) -> Result<&'a BTreeMap<String, GuestValue>, DecodeError> {
    value.as_mapping().ok_or(DecodeError::InvalidRecord {
        record,
        expected: "mapping",
        found: value.kind(),
    })
}

/// Non-null elements of a sequence; anything else yields nothing.
pub(crate) fn sequence_items(value: &GuestValue) -> impl Iterator<Item = &GuestValue> {
    value
        .as_sequence()
        .unwrap_or_default()
        .iter()
        .filter(|item| !item.is_null())
}

/// A scalar rendered as text; blank strings count as absent.
pub(crate) fn opt_string(value: &GuestValue) -> Option<String> {
    value
        .to_scalar_string()
        .filter(|text| !text.trim().is_empty())
}

pub(crate) fn required_string(
    value: &GuestValue,
    record: &'static str,
    field: &'static str,
) -> Result<String, DecodeError> {
    match value {
        GuestValue::Sequence(_) | GuestValue::Mapping(_) => Err(DecodeError::UnexpectedKind {
            record,
            field,
            expected: "string",
            found: value.kind(),
        }),
        _ => opt_string(value).ok_or(DecodeError::MissingField { record, field }),
    }
}

pub(crate) fn opt_f64(value: &GuestValue) -> Option<f64> {
    match value {
        GuestValue::Number(n) if n.is_finite() => Some(*n),
        GuestValue::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

pub(crate) fn opt_f32(value: &GuestValue) -> Option<f32> {
    opt_f64(value).map(|n| n as f32)
}

pub(crate) fn opt_i64(value: &GuestValue) -> Option<i64> {
    opt_f64(value).map(|n| n.trunc() as i64)
}

pub(crate) fn opt_u32(value: &GuestValue) -> Option<u32> {
    opt_i64(value).and_then(|n| u32::try_from(n).ok())
}

pub(crate) fn opt_bool(value: &GuestValue) -> Option<bool> {
    match value {
        GuestValue::Bool(b) => Some(*b),
        GuestValue::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        GuestValue::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

/// Strings from a sequence, or a lone scalar promoted to a one-element list.
pub(crate) fn string_list(value: &GuestValue) -> Vec<String> {
    match value {
        GuestValue::Sequence(_) => sequence_items(value).filter_map(opt_string).collect(),
        other => opt_string(other).into_iter().collect(),
    }
}
