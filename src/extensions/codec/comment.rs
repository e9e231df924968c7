use super::dates::{decode_date, encode_date};
use super::{
    decode_batch, expect_mapping, opt_bool, opt_i64, opt_string, opt_u32, DecodeError, FromGuest,
    ToGuest,
};
use crate::extensions::value::GuestValue;
use crate::models::{CatalogComment, ReadCommentsRequest};

impl FromGuest for CatalogComment {
    fn from_guest(value: &GuestValue) -> Result<Self, DecodeError> {
        expect_mapping(value, "comment")?;

        Ok(CatalogComment {
            id: opt_string(value.get("id")),
            author_name: opt_string(value.get("authorName")),
            author_avatar: opt_string(value.get("authorAvatar")),
            text: opt_string(value.get("text")),
            date: decode_date(value.get("date")),
            likes: opt_i64(value.get("likes")),
            dislikes: opt_i64(value.get("dislikes")),
            votes: opt_i64(value.get("votes")),
            voted: opt_i64(value.get("voted")),
            comments_count: opt_u32(value.get("comments")),
            items: decode_batch(value.get("items")),
            has_next_page: opt_bool(value.get("hasNextPage")).unwrap_or(false),
            can_comment: opt_bool(value.get("canComment")).unwrap_or(false),
            is_editable: opt_bool(value.get("isEditable")).unwrap_or(false),
            is_deletable: opt_bool(value.get("isDeletable")).unwrap_or(false),
        })
    }
}

impl ToGuest for CatalogComment {
    fn to_guest(&self) -> GuestValue {
        GuestValue::mapping()
            .with("id", self.id.as_ref())
            .with("authorName", self.author_name.as_ref())
            .with("authorAvatar", self.author_avatar.as_ref())
            .with("text", self.text.as_ref())
            .with("date", self.date.as_ref().map(encode_date))
            .with("likes", self.likes)
            .with("dislikes", self.dislikes)
            .with("votes", self.votes)
            .with("voted", self.voted)
            .with("comments", self.comments_count)
            .with("items", self.items.to_guest())
            .with("hasNextPage", self.has_next_page)
            .with("canComment", self.can_comment)
            .with("isEditable", self.is_editable)
            .with("isDeletable", self.is_deletable)
    }
}

impl ToGuest for ReadCommentsRequest {
    fn to_guest(&self) -> GuestValue {
        GuestValue::mapping()
            .with("page", self.page)
            .with("sortMode", self.sort_mode.as_ref())
            .with("episode", self.episode.to_guest())
            .with("media", self.media.to_guest())
            .with("parentComment", self.parent_comment.to_guest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CatalogMedia;
    use serde_json::json;

    #[test]
    fn test_comment_tree() {
        let value = GuestValue::from(json!({
            "canComment": true,
            "hasNextPage": true,
            "items": [
                {"id": 1, "authorName": "fern", "text": "Great episode", "likes": 12,
                 "items": [{"id": 2, "text": "Agreed"}]},
                null,
                "not a comment"
            ]
        }));
        let root = CatalogComment::from_guest(&value).unwrap();
        assert!(root.can_comment);
        assert!(root.has_next_page);
        assert_eq!(root.items.len(), 1);
        assert_eq!(root.items[0].likes, Some(12));
        assert_eq!(root.items[0].items[0].text.as_deref(), Some("Agreed"));
    }

    #[test]
    fn test_read_request_shape() {
        let mut request = ReadCommentsRequest::for_media(CatalogMedia::new("1", "Frieren"));
        request.sort_mode = Some("newest".to_string());
        let encoded = request.to_guest();
        assert_eq!(encoded.get("page"), &GuestValue::Number(0.0));
        assert_eq!(encoded.get("sortMode").as_str(), Some("newest"));
        assert_eq!(encoded.get("media").get("title").as_str(), Some("Frieren"));
        assert!(encoded.get("episode").is_null());
        assert!(encoded.get("parentComment").is_null());
    }
}
