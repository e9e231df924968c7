use super::dates::encode_date;
use super::ToGuest;
use crate::extensions::value::GuestValue;
use crate::models::{CatalogFilter, FilterValue};

impl ToGuest for FilterValue {
    fn to_guest(&self) -> GuestValue {
        match self {
            FilterValue::String(text) => GuestValue::from(text),
            FilterValue::Number(n) => GuestValue::Number(*n),
            FilterValue::Integer(n) => GuestValue::from(*n),
            FilterValue::Toggle(b) => GuestValue::Bool(*b),
            FilterValue::Date(date) => encode_date(date),
            FilterValue::TriState(state) => GuestValue::from(state.as_str()),
        }
    }
}

impl ToGuest for CatalogFilter {
    fn to_guest(&self) -> GuestValue {
        GuestValue::mapping()
            .with("id", self.id.as_str())
            .with("value", self.value.to_guest())
    }
}
