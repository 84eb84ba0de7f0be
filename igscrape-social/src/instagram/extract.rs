//! Field extraction and normalization of raw media records.
//!
//! Posts keep common, location and image attributes, plus video attributes for
//! videos. Carousels (`sidecar`) additionally carry one image mapping and one video
//! mapping taken from their children, the last child of each kind winning. Stories
//! keep only the URL set matching their type. Unknown types are logged and whatever
//! was already extracted is kept, so a single odd record never fails a batch.
use crate::instagram::types::{MediaData, RawMedia};
use serde_json::Value;

pub const COMMON_FIELDS: &[&str] = &[
    "id",
    "type",
    "shortCode",
    "link",
    "likesCount",
    "commentsCount",
    "caption",
    "altText",
];

pub const LOCATION_FIELDS: &[&str] = &["locationId", "locationName", "locationSlug"];

pub const IMAGE_FIELDS: &[&str] = &[
    "imageLowResolutionUrl",
    "imageThumbnailUrl",
    "imageStandardResolutionUrl",
    "imageHighResolutionUrl",
];

pub const VIDEO_FIELDS: &[&str] = &[
    "videoLowResolutionUrl",
    "videoStandardResolutionUrl",
    "videoLowBandwidthUrl",
    "videoDuration",
    "videoViews",
];

/// Story videos carry URLs only; duration and view stats are dropped.
pub const STORY_VIDEO_FIELDS: &[&str] = &[
    "videoLowResolutionUrl",
    "videoStandardResolutionUrl",
    "videoLowBandwidthUrl",
];

pub const SIDECAR_IMAGES_KEY: &str = "sidecar_images";
pub const SIDECAR_VIDEOS_KEY: &str = "sidecar_videos";

/// Copy the requested fields that are present, non-null and not the empty string.
///
/// Other falsy values (`0`, `false`, empty arrays) are kept.
///
/// ```
/// use igscrape_social::instagram::{extract_fields, RawMedia};
/// use serde_json::json;
///
/// let media = RawMedia::from_value(json!({"a": "", "b": "x", "c": null, "d": "y"}));
/// let data = extract_fields(&media, &["a", "b", "c"]);
/// assert_eq!(serde_json::Value::Object(data), json!({"b": "x"}));
/// ```
pub fn extract_fields(media: &RawMedia, fields: &[&str]) -> MediaData {
    let mut data = MediaData::new();
    for &field in fields {
        match media.get(field) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) if s.is_empty() => {}
            Some(value) => {
                data.insert(field.to_string(), value.clone());
            }
        }
    }
    data
}

fn post_base_fields() -> Vec<&'static str> {
    [COMMON_FIELDS, LOCATION_FIELDS, IMAGE_FIELDS].concat()
}

/// Normalize a feed post into the persisted attribute mapping.
pub fn normalize_post(media: &RawMedia) -> MediaData {
    let mut data = extract_fields(media, &post_base_fields());
    let kind = data
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default();

    match kind.as_str() {
        "image" => {}
        "video" => {
            for (key, value) in extract_fields(media, VIDEO_FIELDS) {
                data.entry(key).or_insert(value);
            }
        }
        "sidecar" => {
            for child in media.sidecar_medias() {
                match child.kind() {
                    Some("image") => {
                        data.insert(
                            SIDECAR_IMAGES_KEY.to_string(),
                            Value::Object(extract_fields(&child, IMAGE_FIELDS)),
                        );
                    }
                    Some("video") => {
                        data.insert(
                            SIDECAR_VIDEOS_KEY.to_string(),
                            Value::Object(extract_fields(&child, VIDEO_FIELDS)),
                        );
                    }
                    other => {
                        tracing::warn!(
                            media_id = ?media.id(),
                            sidecar_type = other.unwrap_or("<missing>"),
                            "normalize.unmapped_sidecar_media_type"
                        );
                    }
                }
            }
            // Carousels also report the unmapped-type warning below; kept as-is.
            warn_unmapped(media, &kind);
        }
        _ => warn_unmapped(media, &kind),
    }

    data
}

/// Normalize a story item: video URLs for videos, image URLs for everything else.
pub fn normalize_story(media: &RawMedia) -> MediaData {
    if media.kind() == Some("video") {
        extract_fields(media, STORY_VIDEO_FIELDS)
    } else {
        extract_fields(media, IMAGE_FIELDS)
    }
}

fn warn_unmapped(media: &RawMedia, kind: &str) {
    tracing::warn!(
        media_id = ?media.id(),
        media_type = if kind.is_empty() { "<missing>" } else { kind },
        "normalize.unmapped_media_type"
    );
}
