use super::dates::{decode_date, encode_date};
use super::{
    decode_batch, expect_mapping, opt_f32, opt_string, required_string, DecodeError, FromGuest,
    ToGuest,
};
use crate::extensions::value::GuestValue;
use crate::models::{CatalogEpisode, CatalogSubtitle, CatalogVideo};

impl FromGuest for CatalogEpisode {
    fn from_guest(value: &GuestValue) -> Result<Self, DecodeError> {
        expect_mapping(value, "episode")?;

        Ok(CatalogEpisode {
            title: required_string(value.get("title"), "episode", "title")?,
            url: required_string(value.get("url"), "episode", "url")?,
            banner: opt_string(value.get("banner")),
            description: opt_string(value.get("description")),
            release_date: decode_date(value.get("releaseDate")),
            number: opt_f32(value.get("number")),
        })
    }
}

impl ToGuest for CatalogEpisode {
    fn to_guest(&self) -> GuestValue {
        GuestValue::mapping()
            .with("title", self.title.as_str())
            .with("url", self.url.as_str())
            .with("banner", self.banner.as_ref())
            .with("description", self.description.as_ref())
            .with("releaseDate", self.release_date.as_ref().map(encode_date))
            .with("number", self.number)
    }
}

impl FromGuest for CatalogSubtitle {
    fn from_guest(value: &GuestValue) -> Result<Self, DecodeError> {
        expect_mapping(value, "subtitle")?;

        Ok(CatalogSubtitle {
            title: opt_string(value.get("title")),
            url: required_string(value.get("url"), "subtitle", "url")?,
        })
    }
}

impl FromGuest for CatalogVideo {
    fn from_guest(value: &GuestValue) -> Result<Self, DecodeError> {
        expect_mapping(value, "video")?;

        Ok(CatalogVideo {
            title: opt_string(value.get("title")),
            url: required_string(value.get("url"), "video", "url")?,
            quality: opt_string(value.get("quality")),
            subtitles: decode_batch(value.get("subtitles")),
        })
    }
}

impl ToGuest for CatalogVideo {
    fn to_guest(&self) -> GuestValue {
        let subtitles: Vec<GuestValue> = self
            .subtitles
            .iter()
            .map(|sub| {
                GuestValue::mapping()
                    .with("title", sub.title.as_ref())
                    .with("url", sub.url.as_str())
            })
            .collect();

        GuestValue::mapping()
            .with("title", self.title.as_ref())
            .with("url", self.url.as_str())
            .with("quality", self.quality.as_ref())
            .with("subtitles", subtitles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_episode_requires_title_and_url() {
        let missing_url = GuestValue::from(json!({"title": "Pilot"}));
        assert_eq!(
            CatalogEpisode::from_guest(&missing_url),
            Err(DecodeError::MissingField {
                record: "episode",
                field: "url"
            })
        );

        let nested_title = GuestValue::from(json!({"title": ["x"], "url": "u"}));
        assert!(matches!(
            CatalogEpisode::from_guest(&nested_title),
            Err(DecodeError::UnexpectedKind { field: "title", .. })
        ));
    }

    #[test]
    fn test_episode_number_is_fractional() {
        let value = GuestValue::from(json!({
            "title": "Recap",
            "url": "https://example.com/6.5",
            "number": "6.5",
            "releaseDate": 1_700_000_000_000_i64
        }));
        let episode = CatalogEpisode::from_guest(&value).unwrap();
        assert_eq!(episode.number, Some(6.5));
        assert_eq!(
            episode.release_date.unwrap().timestamp_millis(),
            1_700_000_000_000
        );
        assert_eq!(episode.to_guest().get("number"), &GuestValue::Number(6.5));
    }

    #[test]
    fn test_video_subtitles_never_null() {
        let bare = GuestValue::from(json!({"url": "https://cdn/1.m3u8"}));
        assert!(CatalogVideo::from_guest(&bare).unwrap().subtitles.is_empty());

        let with_subs = GuestValue::from(json!({
            "url": "https://cdn/1.m3u8",
            "quality": 1080,
            "subtitles": [{"title": "English", "url": "en.vtt"}, {"title": "broken"}, null]
        }));
        let video = CatalogVideo::from_guest(&with_subs).unwrap();
        assert_eq!(video.quality.as_deref(), Some("1080"));
        assert_eq!(video.subtitles.len(), 1);
        assert_eq!(video.subtitles[0].url, "en.vtt");
    }
}
