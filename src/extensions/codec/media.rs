use std::collections::BTreeMap;

use super::dates::{decode_date, encode_date};
use super::{
    expect_mapping, opt_bool, opt_f32, opt_string, opt_u32, sequence_items, string_list,
    DecodeError, FromGuest, ToGuest,
};
use crate::extensions::value::GuestValue;
use crate::models::{CatalogMedia, CatalogTag, ImageVersions, MediaStatus, MediaType};

impl FromGuest for CatalogMedia {
    fn from_guest(value: &GuestValue) -> Result<Self, DecodeError> {
        expect_mapping(value, "media")?;

        let mut titles: Vec<String> = opt_string(value.get("title")).into_iter().collect();
        for title in string_list(value.get("titles")) {
            if !titles.contains(&title) {
                titles.push(title);
            }
        }

        let ids = value
            .get("ids")
            .as_mapping()
            .map(|ids| {
                ids.iter()
                    .filter_map(|(key, id)| opt_string(id).map(|id| (key.clone(), id)))
                    .collect::<BTreeMap<_, _>>()
            })
            .unwrap_or_default();

        let media = CatalogMedia {
            source: String::new(),
            id: opt_string(value.get("id")),
            ids,
            titles,
            poster: decode_poster(value.get("poster")),
            banner: opt_string(value.get("banner")),
            description: opt_string(value.get("description")),
            country: opt_string(value.get("country")),
            age_rating: opt_string(value.get("ageRating")),
            extra: opt_string(value.get("extra")),
            url: opt_string(value.get("url")),
            status: value
                .get("status")
                .as_str()
                .map(MediaStatus::from_name)
                .unwrap_or_default(),
            media_type: value
                .get("type")
                .as_str()
                .map(MediaType::from_name)
                .unwrap_or_default(),
            tags: sequence_items(value.get("tags")).filter_map(decode_tag).collect(),
            genres: string_list(value.get("genres")),
            average_score: opt_f32(value.get("averageScore")),
            duration: opt_u32(value.get("duration")),
            episodes_count: opt_u32(value.get("episodesCount")),
            latest_episode: opt_u32(value.get("latestEpisode")),
            release_date: decode_date(value.get("releaseDate"))
                .or_else(|| decode_date(value.get("endDate"))),
        };

        if !media.is_identifiable() {
            return Err(DecodeError::MissingField {
                record: "media",
                field: "id",
            });
        }

        Ok(media)
    }
}

impl ToGuest for CatalogMedia {
    fn to_guest(&self) -> GuestValue {
        let ids = self.ids.to_guest();
        let status = (self.status != MediaStatus::Unknown).then(|| self.status.as_str());
        let media_type = (self.media_type != MediaType::Unknown).then(|| self.media_type.as_str());

        GuestValue::mapping()
            .with("id", self.id.as_ref())
            .with("ids", ids)
            .with("title", self.title())
            .with("titles", self.titles.clone())
            .with("poster", self.poster.as_ref().map(encode_poster))
            .with("banner", self.banner.as_ref())
            .with("description", self.description.as_ref())
            .with("country", self.country.as_ref())
            .with("ageRating", self.age_rating.as_ref())
            .with("extra", self.extra.as_ref())
            .with("url", self.url.as_ref())
            .with("status", status)
            .with("type", media_type)
            .with("tags", self.tags.iter().map(encode_tag).collect::<Vec<_>>())
            .with("genres", self.genres.clone())
            .with("averageScore", self.average_score)
            .with("duration", self.duration)
            .with("episodesCount", self.episodes_count)
            .with("latestEpisode", self.latest_episode)
            .with("releaseDate", self.release_date.as_ref().map(encode_date))
    }
}

/// A poster is either a plain url or `{extraLarge, large, medium}`.
fn decode_poster(value: &GuestValue) -> Option<ImageVersions> {
    match value {
        GuestValue::Mapping(_) => {
            let poster = ImageVersions {
                extra_large: opt_string(value.get("extraLarge")),
                large: opt_string(value.get("large")),
                medium: opt_string(value.get("medium")),
            };
            (!poster.is_empty()).then_some(poster)
        }
        other => opt_string(other).map(ImageVersions::uniform),
    }
}

fn encode_poster(poster: &ImageVersions) -> GuestValue {
    GuestValue::mapping()
        .with("extraLarge", poster.extra_large.as_ref())
        .with("large", poster.large.as_ref())
        .with("medium", poster.medium.as_ref())
}

fn decode_tag(value: &GuestValue) -> Option<CatalogTag> {
    match value {
        GuestValue::Mapping(_) => Some(CatalogTag {
            name: opt_string(value.get("name"))?,
            description: opt_string(value.get("description")),
            is_spoiler: opt_bool(value.get("isSpoiler")).unwrap_or(false),
        }),
        other => opt_string(other).map(CatalogTag::new),
    }
}

fn encode_tag(tag: &CatalogTag) -> GuestValue {
    GuestValue::mapping()
        .with("name", tag.name.as_str())
        .with("description", tag.description.as_ref())
        .with("isSpoiler", tag.is_spoiler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> Result<CatalogMedia, DecodeError> {
        CatalogMedia::from_guest(&GuestValue::from(value))
    }

    #[test]
    fn test_full_media_record() {
        let media = decode(json!({
            "id": 154587,
            "ids": {"anilist": 154587, "mal": "52991", "kitsu": null},
            "title": "Frieren",
            "titles": ["Frieren", "Sousou no Frieren"],
            "poster": {"extraLarge": "xl.jpg", "medium": "m.jpg"},
            "status": "Completed",
            "type": "TV",
            "tags": [{"name": "Magic", "isSpoiler": false}, "Elves", {"description": "nameless"}],
            "genres": ["Adventure", null, "Drama"],
            "averageScore": 9.1,
            "episodesCount": "28",
            "releaseDate": "2023-09-29"
        }))
        .unwrap();

        assert_eq!(media.id.as_deref(), Some("154587"));
        assert_eq!(media.ids.len(), 2);
        assert_eq!(media.ids["anilist"], "154587");
        assert_eq!(media.titles, vec!["Frieren", "Sousou no Frieren"]);
        assert_eq!(media.poster.as_ref().unwrap().best(), Some("xl.jpg"));
        assert_eq!(media.status, MediaStatus::Completed);
        assert_eq!(media.media_type, MediaType::Tv);
        assert_eq!(
            media.tags.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            vec!["Magic", "Elves"]
        );
        assert_eq!(media.genres, vec!["Adventure", "Drama"]);
        assert_eq!(media.episodes_count, Some(28));
        assert!(media.release_date.is_some());
    }

    #[test]
    fn test_string_poster_fills_every_version() {
        let media = decode(json!({"title": "Poster", "poster": "p.jpg"})).unwrap();
        let poster = media.poster.unwrap();
        assert_eq!(poster.large.as_deref(), Some("p.jpg"));
        assert_eq!(poster.medium.as_deref(), Some("p.jpg"));
    }

    #[test]
    fn test_unknown_enums_and_end_date_fallback() {
        let media = decode(json!({
            "title": "Odd",
            "status": "on a break",
            "type": "podcast",
            "endDate": 0
        }))
        .unwrap();
        assert_eq!(media.status, MediaStatus::Unknown);
        assert_eq!(media.media_type, MediaType::Unknown);
        assert_eq!(media.release_date.unwrap().timestamp_millis(), 0);
    }

    #[test]
    fn test_media_needs_id_or_title() {
        assert_eq!(
            decode(json!({"banner": "b.jpg"})),
            Err(DecodeError::MissingField {
                record: "media",
                field: "id"
            })
        );
        assert!(decode(json!("just a string")).is_err());
        assert!(decode(json!({"ids": {"mal": 1}})).is_ok());
    }

    #[test]
    fn test_encoding_is_readable_by_decoder() {
        let mut media = CatalogMedia::new("7", "Mushishi");
        media.status = MediaStatus::Ongoing;
        media.genres = vec!["Mystery".to_string()];
        media.poster = Some(ImageVersions::uniform("p.jpg"));

        let encoded = media.to_guest();
        assert_eq!(encoded.get("status").as_str(), Some("ongoing"));
        assert!(encoded.get("type").is_null());
        assert_eq!(encoded.get("poster").get("large").as_str(), Some("p.jpg"));

        assert_eq!(CatalogMedia::from_guest(&encoded).unwrap(), media);
    }
}
