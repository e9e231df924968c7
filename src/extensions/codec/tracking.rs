use super::dates::{decode_date, encode_date};
use super::{
    expect_mapping, opt_bool, opt_f32, opt_string, sequence_items, string_list, DecodeError,
    FromGuest, ToGuest,
};
use crate::extensions::value::GuestValue;
use crate::models::{CatalogList, TrackingFeatures, TrackingOptions};

impl ToGuest for TrackingOptions {
    /// Writes only the fields the tracker supports.
    fn to_guest(&self) -> GuestValue {
        let mut value = GuestValue::mapping()
            .with("id", self.id.as_ref())
            .with("features", self.features.to_names());

        if self.supports(TrackingFeatures::PROGRESS) {
            value.insert("progress", self.progress);
        }
        if self.supports(TrackingFeatures::SCORE) {
            value.insert("score", self.score);
        }
        if self.supports(TrackingFeatures::PRIVATE) {
            value.insert("isPrivate", self.is_private);
        }
        if self.supports(TrackingFeatures::LISTS) {
            let lists: Vec<GuestValue> = self
                .lists
                .iter()
                .map(|list| {
                    GuestValue::mapping()
                        .with("id", list.id.as_str())
                        .with("title", list.title.as_str())
                })
                .collect();
            value.insert("lists", lists);
            value.insert("currentLists", self.current_lists.clone());
        }
        if self.supports(TrackingFeatures::DATE_START) {
            value.insert("startDate", self.start_date.as_ref().map(encode_date));
        }
        if self.supports(TrackingFeatures::DATE_END) {
            value.insert("endDate", self.end_date.as_ref().map(encode_date));
        }

        value
    }
}

impl FromGuest for TrackingOptions {
    fn from_guest(value: &GuestValue) -> Result<Self, DecodeError> {
        decode_tracking(value, None)
    }
}

/// Decode tracking options, reading only supported fields.
///
/// With a `requested` mask, a response can narrow it through its own
/// `features` list but never widen it. Without one, the response's list is
/// taken as is.
pub fn decode_tracking(
    value: &GuestValue,
    requested: Option<TrackingFeatures>,
) -> Result<TrackingOptions, DecodeError> {
    expect_mapping(value, "tracking options")?;

    let declared = value.has("features").then(|| {
        string_list(value.get("features"))
            .iter()
            .filter_map(|name| TrackingFeatures::from_guest_name(name))
            .fold(TrackingFeatures::empty(), |acc, flag| acc | flag)
    });
    let features = match (requested, declared) {
        (Some(mask), Some(declared)) => mask & declared,
        (Some(mask), None) => mask,
        (None, declared) => declared.unwrap_or_default(),
    };

    let mut options = TrackingOptions::new(features);
    options.id = opt_string(value.get("id"));

    if features.contains(TrackingFeatures::PROGRESS) {
        options.progress = opt_f32(value.get("progress"));
    }
    if features.contains(TrackingFeatures::SCORE) {
        options.score = opt_f32(value.get("score"));
    }
    if features.contains(TrackingFeatures::PRIVATE) {
        options.is_private = opt_bool(value.get("isPrivate"));
    }
    if features.contains(TrackingFeatures::LISTS) {
        options.lists = sequence_items(value.get("lists"))
            .filter_map(|list| {
                Some(CatalogList {
                    id: opt_string(list.get("id"))?,
                    title: opt_string(list.get("title")).unwrap_or_default(),
                })
            })
            .collect();
        options.current_lists = string_list(value.get("currentLists"));
    }
    if features.contains(TrackingFeatures::DATE_START) {
        options.start_date = decode_date(value.get("startDate"));
    }
    if features.contains(TrackingFeatures::DATE_END) {
        options.end_date = decode_date(value.get("endDate"));
    }

    Ok(options)
}
