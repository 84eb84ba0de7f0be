//! Translation of Instagram API item JSON into [`RawMedia`] records.
//!
//! The private feed and reels endpoints describe media with `media_type` codes,
//! `image_versions2` candidates and `video_versions`; the rest of the pipeline works
//! with the flat camelCase attribute names produced here.
use crate::instagram::types::{RawMedia, StoryCollection};
use serde_json::{Value, json};

const MEDIA_TYPE_IMAGE: i64 = 1;
const MEDIA_TYPE_VIDEO: i64 = 2;
const MEDIA_TYPE_CAROUSEL: i64 = 8;

// video_versions[].type codes
const VIDEO_VERSION_STANDARD: i64 = 101;
const VIDEO_VERSION_LOW: i64 = 102;
const VIDEO_VERSION_LOW_BANDWIDTH: i64 = 103;

const LOW_RESOLUTION_WIDTH: i64 = 320;
const STANDARD_RESOLUTION_WIDTH: i64 = 640;

pub fn media_type_name(code: i64) -> Option<&'static str> {
    match code {
        MEDIA_TYPE_IMAGE => Some("image"),
        MEDIA_TYPE_VIDEO => Some("video"),
        MEDIA_TYPE_CAROUSEL => Some("sidecar"),
        _ => None,
    }
}

fn put(media: &mut RawMedia, key: &str, value: Option<Value>) {
    if let Some(v) = value.filter(|v| !v.is_null()) {
        media.insert(key, v);
    }
}

fn text(v: Option<&Value>) -> Option<Value> {
    match v? {
        Value::String(s) => Some(Value::String(s.clone())),
        Value::Number(n) => Some(Value::String(n.to_string())),
        _ => None,
    }
}

#[derive(Debug)]
struct Candidate<'a> {
    width: i64,
    url: &'a str,
    kind: Option<i64>,
}

fn candidates<'a>(list: Option<&'a Value>) -> Vec<Candidate<'a>> {
    let mut out: Vec<Candidate<'a>> = list
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|c| {
                    Some(Candidate {
                        width: c.get("width").and_then(Value::as_i64).unwrap_or(0),
                        url: c.get("url").and_then(Value::as_str)?,
                        kind: c.get("type").and_then(Value::as_i64),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    out.sort_by_key(|c| c.width);
    out
}

fn map_images(item: &Value, media: &mut RawMedia) {
    let list = candidates(item.pointer("/image_versions2/candidates"));
    let (Some(smallest), Some(largest)) = (list.first(), list.last()) else {
        return;
    };
    let at_least = |w: i64| list.iter().find(|c| c.width >= w).unwrap_or(largest);

    put(media, "imageThumbnailUrl", Some(json!(smallest.url)));
    put(
        media,
        "imageLowResolutionUrl",
        Some(json!(at_least(LOW_RESOLUTION_WIDTH).url)),
    );
    put(
        media,
        "imageStandardResolutionUrl",
        Some(json!(at_least(STANDARD_RESOLUTION_WIDTH).url)),
    );
    put(media, "imageHighResolutionUrl", Some(json!(largest.url)));
}

fn map_videos(item: &Value, media: &mut RawMedia) {
    let list = candidates(item.get("video_versions"));
    let by_kind = |k: i64| list.iter().find(|c| c.kind == Some(k)).map(|c| json!(c.url));

    put(
        media,
        "videoStandardResolutionUrl",
        by_kind(VIDEO_VERSION_STANDARD).or_else(|| list.last().map(|c| json!(c.url))),
    );
    put(
        media,
        "videoLowResolutionUrl",
        by_kind(VIDEO_VERSION_LOW).or_else(|| list.first().map(|c| json!(c.url))),
    );
    put(
        media,
        "videoLowBandwidthUrl",
        by_kind(VIDEO_VERSION_LOW_BANDWIDTH),
    );
    put(media, "videoDuration", item.get("video_duration").cloned());
    put(
        media,
        "videoViews",
        item.get("view_count")
            .or_else(|| item.get("play_count"))
            .cloned(),
    );
}

/// Convert one feed or story item.
pub fn raw_media_from_item(item: &Value) -> RawMedia {
    let mut media = RawMedia::default();

    put(&mut media, "id", text(item.get("id").or_else(|| item.get("pk"))));

    let kind = item
        .get("media_type")
        .and_then(Value::as_i64)
        .map(|code| {
            media_type_name(code)
                .map(str::to_string)
                .unwrap_or_else(|| format!("media_type_{code}"))
        });
    put(&mut media, "type", kind.map(Value::String));

    if let Some(code) = item.get("code").and_then(Value::as_str) {
        put(&mut media, "shortCode", Some(json!(code)));
        put(
            &mut media,
            "link",
            Some(json!(format!("https://www.instagram.com/p/{code}/"))),
        );
    }
    put(&mut media, "likesCount", item.get("like_count").cloned());
    put(&mut media, "commentsCount", item.get("comment_count").cloned());
    put(&mut media, "caption", item.pointer("/caption/text").cloned());
    put(&mut media, "altText", item.get("accessibility_caption").cloned());
    put(&mut media, "createdTime", item.get("taken_at").cloned());
    put(
        &mut media,
        "modified",
        item.get("edited_at")
            .or_else(|| item.get("taken_at"))
            .cloned(),
    );

    if let Some(location) = item.get("location") {
        put(&mut media, "locationId", text(location.get("pk")));
        put(&mut media, "locationName", location.get("name").cloned());
        put(&mut media, "locationSlug", location.get("slug").cloned());
    }

    map_images(item, &mut media);
    map_videos(item, &mut media);

    if let Some(children) = item.get("carousel_media").and_then(Value::as_array) {
        let children: Vec<Value> = children
            .iter()
            .map(|child| Value::Object(raw_media_from_item(child).as_map().clone()))
            .collect();
        media.insert("sidecarMedias", Value::Array(children));
    }

    media
}

/// Items of a feed response (`{"items": [...]}`), capped at `limit`.
pub fn medias_from_feed_response(body: &Value, limit: usize) -> Vec<RawMedia> {
    body.get("items")
        .and_then(Value::as_array)
        .map(|items| items.iter().take(limit).map(raw_media_from_item).collect())
        .unwrap_or_default()
}

/// Reels of a `reels_media` response, in either the list or the keyed-object shape.
pub fn story_collections_from_response(body: &Value) -> Vec<StoryCollection> {
    let reels: Vec<&Value> = if let Some(list) = body.get("reels_media").and_then(Value::as_array)
    {
        list.iter().collect()
    } else if let Some(map) = body.get("reels").and_then(Value::as_object) {
        map.values().collect()
    } else {
        Vec::new()
    };

    reels
        .into_iter()
        .map(|reel| StoryCollection {
            owner_id: text(reel.pointer("/user/pk").or_else(|| reel.get("id")))
                .and_then(|v| v.as_str().map(str::to_string)),
            items: reel
                .get("items")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(raw_media_from_item).collect())
                .unwrap_or_default(),
        })
        .collect()
}

/// Numeric account id from a profile lookup response.
pub fn account_id_from_profile(body: &Value) -> Option<u64> {
    ["/graphql/user/id", "/data/user/id", "/user/pk", "/user/id"]
        .iter()
        .filter_map(|ptr| body.pointer(ptr))
        .find_map(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
}
