use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TypeError, TypeResult};
use crate::resource::{Resource, ResourceKind};
use crate::slug::generate_slug;
use crate::temporal::{iso_from_millis, ItemClock};

// ---------------------------------------------------------------------------
// Shared item metadata
// ---------------------------------------------------------------------------

/// Access model for an artwork.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum License {
    Open,
    Token,
    Subscription,
}

/// How a player should present an item.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DisplayPrefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaling: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoplay: Option<bool>,
    #[serde(rename = "loop", default, skip_serializing_if = "Option::is_none")]
    pub looping: Option<bool>,
}

/// Where an artwork comes from (on-chain contract, off-chain URI, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<serde_json::Value>>,
}

/// Playlist-wide defaults applied by players to items that omit a field.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlaylistDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayPrefs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

// ---------------------------------------------------------------------------
// PlaylistItem
// ---------------------------------------------------------------------------

/// A single artwork entry of a playlist.
///
/// Every item has its own server-generated UUID, so it can be looked up
/// without knowing the playlist it belongs to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItem {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub source: String,
    pub duration: u64,
    pub license: License,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayPrefs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repro: Option<serde_json::Value>,
    pub created: String,
}

/// Client-supplied item fields. Server fields are rejected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlaylistItemInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub source: String,
    pub duration: u64,
    pub license: License,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayPrefs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repro: Option<serde_json::Value>,
}

impl PlaylistItemInput {
    fn validate(&self, index: usize) -> TypeResult<()> {
        if self.source.trim().is_empty() {
            return Err(TypeError::Validation(format!("items[{index}].source is empty")));
        }
        Ok(())
    }

    fn into_item(self, created: String) -> PlaylistItem {
        PlaylistItem {
            id: Uuid::new_v4(),
            title: self.title,
            source: self.source,
            duration: self.duration,
            license: self.license,
            reference: self.reference,
            display: self.display,
            provenance: self.provenance,
            repro: self.repro,
            created,
        }
    }
}

fn build_items(inputs: Vec<PlaylistItemInput>, now_ms: i64) -> Vec<PlaylistItem> {
    let mut clock = ItemClock::starting_at(now_ms);
    inputs
        .into_iter()
        .map(|input| input.into_item(clock.tick()))
        .collect()
}

fn validate_items(items: &[PlaylistItemInput]) -> TypeResult<()> {
    if items.is_empty() {
        return Err(TypeError::Validation("playlist must contain at least one item".into()));
    }
    for (i, item) in items.iter().enumerate() {
        item.validate(i)?;
    }
    Ok(())
}

fn validate_title(title: &str) -> TypeResult<()> {
    if title.trim().is_empty() {
        return Err(TypeError::Validation("title is empty".into()));
    }
    Ok(())
}

fn validate_dp_version(version: &str) -> TypeResult<()> {
    let parts: Vec<&str> = version.split('.').collect();
    let well_formed = parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
    if !well_formed {
        return Err(TypeError::Validation(format!(
            "dpVersion must be MAJOR.MINOR.PATCH, got {version:?}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Playlist
// ---------------------------------------------------------------------------

/// A signed, ordered sequence of artworks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub dp_version: String,
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub created: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<PlaylistDefaults>,
    pub items: Vec<PlaylistItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Body of a playlist create request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlaylistInput {
    pub dp_version: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<PlaylistDefaults>,
    pub items: Vec<PlaylistItemInput>,
}

impl PlaylistInput {
    pub fn validate(&self) -> TypeResult<()> {
        validate_dp_version(&self.dp_version)?;
        validate_title(&self.title)?;
        validate_items(&self.items)
    }
}

/// Body of a playlist update request. Absent fields keep their stored value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlaylistUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<PlaylistDefaults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<PlaylistItemInput>>,
}

impl PlaylistUpdate {
    pub fn validate(&self) -> TypeResult<()> {
        if let Some(v) = &self.dp_version {
            validate_dp_version(v)?;
        }
        if let Some(t) = &self.title {
            validate_title(t)?;
        }
        if let Some(items) = &self.items {
            validate_items(items)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.dp_version.is_none()
            && self.title.is_none()
            && self.defaults.is_none()
            && self.items.is_none()
    }
}

impl Playlist {
    /// Build a new, unsigned playlist from a validated create body.
    pub fn from_input(input: PlaylistInput, now_ms: i64) -> Self {
        let slug = generate_slug(&input.title, "playlist");
        Self {
            dp_version: input.dp_version,
            id: Uuid::new_v4(),
            slug,
            title: input.title,
            created: iso_from_millis(now_ms),
            defaults: input.defaults,
            items: build_items(input.items, now_ms),
            signature: None,
        }
    }

    /// Merge an update over this playlist and return the unsigned result.
    ///
    /// `id`, `slug` and `created` are carried over untouched. Replaced items
    /// get fresh ids and timestamps.
    pub fn apply_update(&self, update: PlaylistUpdate, now_ms: i64) -> Self {
        let mut next = self.clone();
        next.signature = None;
        if let Some(v) = update.dp_version {
            next.dp_version = v;
        }
        if let Some(t) = update.title {
            next.title = t;
        }
        if let Some(d) = update.defaults {
            next.defaults = Some(d);
        }
        if let Some(items) = update.items {
            next.items = build_items(items, now_ms);
        }
        next
    }

    pub fn item_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.items.iter().map(|i| i.id)
    }
}

impl Resource for Playlist {
    const KIND: ResourceKind = ResourceKind::Playlist;

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slug::is_valid_slug;
    use crate::temporal::parse_millis;

    fn item_input(source: &str) -> PlaylistItemInput {
        PlaylistItemInput {
            title: None,
            source: source.into(),
            duration: 10,
            license: License::Open,
            reference: None,
            display: None,
            provenance: None,
            repro: None,
        }
    }

    fn input() -> PlaylistInput {
        PlaylistInput {
            dp_version: "1.0.0".into(),
            title: "T".into(),
            defaults: None,
            items: vec![item_input("https://x/y"), item_input("https://x/z")],
        }
    }

    #[test]
    fn from_input_assigns_server_fields() {
        let p = Playlist::from_input(input(), 1_704_067_200_000);
        assert_eq!(p.created, "2024-01-01T00:00:00.000Z");
        assert!(is_valid_slug(&p.slug));
        assert!(p.signature.is_none());
        assert_eq!(p.items.len(), 2);
        assert_ne!(p.items[0].id, p.items[1].id);
    }

    #[test]
    fn item_timestamps_increase() {
        let p = Playlist::from_input(input(), 1_704_067_200_000);
        let a = parse_millis(&p.items[0].created).unwrap();
        let b = parse_millis(&p.items[1].created).unwrap();
        assert!(b > a);
    }

    #[test]
    fn validation_rules() {
        assert!(input().validate().is_ok());

        let mut bad = input();
        bad.items.clear();
        assert!(bad.validate().is_err());

        let mut bad = input();
        bad.dp_version = "1.0".into();
        assert!(bad.validate().is_err());

        let mut bad = input();
        bad.title = "   ".into();
        assert!(bad.validate().is_err());

        let mut bad = input();
        bad.items[1].source = String::new();
        let err = bad.validate().unwrap_err();
        assert!(err.to_string().contains("items[1]"));
    }

    #[test]
    fn protected_fields_are_rejected_on_create() {
        let body = serde_json::json!({
            "dpVersion": "1.0.0",
            "id": "00000000-0000-0000-0000-000000000000",
            "title": "T",
            "items": [{"source": "https://x/y", "duration": 10, "license": "open"}]
        });
        assert!(serde_json::from_value::<PlaylistInput>(body).is_err());
    }

    #[test]
    fn protected_fields_are_rejected_on_update() {
        for field in crate::resource::PROTECTED_FIELDS {
            let mut body = serde_json::Map::new();
            body.insert(field.to_string(), serde_json::json!("x"));
            let body = serde_json::Value::Object(body);
            assert!(
                serde_json::from_value::<PlaylistUpdate>(body).is_err(),
                "{field} should be rejected"
            );
        }
    }

    #[test]
    fn update_preserves_identity_fields() {
        let mut original = Playlist::from_input(input(), 1_704_067_200_000);
        original.signature = Some("ed25519:0xdead".into());
        let update = PlaylistUpdate {
            title: Some("New".into()),
            items: Some(vec![item_input("https://x/new")]),
            ..Default::default()
        };
        let updated = original.apply_update(update, 1_704_067_300_000);
        assert_eq!(updated.id, original.id);
        assert_eq!(updated.slug, original.slug);
        assert_eq!(updated.created, original.created);
        assert_eq!(updated.title, "New");
        assert!(updated.signature.is_none());
        assert_eq!(updated.items.len(), 1);
        assert!(!original.item_ids().any(|id| id == updated.items[0].id));
    }

    #[test]
    fn update_without_items_keeps_items() {
        let original = Playlist::from_input(input(), 1_704_067_200_000);
        let updated = original.apply_update(
            PlaylistUpdate { title: Some("Other".into()), ..Default::default() },
            1_704_067_300_000,
        );
        assert_eq!(updated.items, original.items);
    }

    #[test]
    fn wire_names_are_camel_case() {
        let p = Playlist::from_input(input(), 0);
        let v = serde_json::to_value(&p).unwrap();
        assert!(v.get("dpVersion").is_some());
        assert!(v.get("signature").is_none());
        assert_eq!(v["items"][0]["license"], "open");
    }
}
