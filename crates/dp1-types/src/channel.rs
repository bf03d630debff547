use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TypeError, TypeResult};
use crate::resource::{Resource, ResourceKind};
use crate::slug::generate_slug;
use crate::temporal::iso_from_millis;

/// A signed, curated collection of playlists referenced by URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub playlists: Vec<String>,
    pub created: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Body of a channel create request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChannelInput {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub playlists: Vec<String>,
}

/// Body of a channel update request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChannelUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlists: Option<Vec<String>>,
}

fn validate_playlists(urls: &[String]) -> TypeResult<()> {
    if urls.is_empty() {
        return Err(TypeError::Validation("channel must reference at least one playlist".into()));
    }
    for (i, url) in urls.iter().enumerate() {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(TypeError::Validation(format!(
                "playlists[{i}] is not an http(s) URL"
            )));
        }
    }
    Ok(())
}

impl ChannelInput {
    pub fn validate(&self) -> TypeResult<()> {
        if self.title.trim().is_empty() {
            return Err(TypeError::Validation("title is empty".into()));
        }
        validate_playlists(&self.playlists)
    }
}

impl ChannelUpdate {
    pub fn validate(&self) -> TypeResult<()> {
        if let Some(t) = &self.title {
            if t.trim().is_empty() {
                return Err(TypeError::Validation("title is empty".into()));
            }
        }
        if let Some(urls) = &self.playlists {
            validate_playlists(urls)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.curator.is_none()
            && self.summary.is_none()
            && self.playlists.is_none()
    }
}

impl Channel {
    pub fn from_input(input: ChannelInput, now_ms: i64) -> Self {
        let slug = generate_slug(&input.title, "channel");
        Self {
            id: Uuid::new_v4(),
            slug,
            title: input.title,
            curator: input.curator,
            summary: input.summary,
            playlists: input.playlists,
            created: iso_from_millis(now_ms),
            signature: None,
        }
    }

    pub fn apply_update(&self, update: ChannelUpdate) -> Self {
        let mut next = self.clone();
        next.signature = None;
        if let Some(t) = update.title {
            next.title = t;
        }
        if let Some(c) = update.curator {
            next.curator = Some(c);
        }
        if let Some(s) = update.summary {
            next.summary = Some(s);
        }
        if let Some(p) = update.playlists {
            next.playlists = p;
        }
        next
    }

    /// Ids of playlists this channel references on a feed server, i.e.
    /// playlist URLs whose last path segment is a UUID.
    pub fn referenced_playlist_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .playlists
            .iter()
            .filter_map(|url| playlist_id_from_url(url))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Extract a playlist UUID from a URL such as
/// `https://feed.example/api/v1/playlists/<uuid>`.
pub fn playlist_id_from_url(url: &str) -> Option<Uuid> {
    let path = url.split(['?', '#']).next()?;
    let last = path.trim_end_matches('/').rsplit('/').next()?;
    Uuid::parse_str(last).ok()
}

impl Resource for Channel {
    const KIND: ResourceKind = ResourceKind::Channel;

    fn id(&self) -> Uuid {
        self.id
    }
    fn slug(&self) -> &str {
        &self.slug
    }
    fn created(&self) -> &str {
        &self.created
    }
    fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }
    fn set_signature(&mut self, signature: Option<String>) {
        self.signature = signature;
    }
}
