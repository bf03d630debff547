use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

/// The two top-level resource kinds exposed by the feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Playlist,
    Channel,
}

impl ResourceKind {
    /// Tag used in storage keys and operation names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Playlist => "playlist",
            Self::Channel => "channel",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behaviour shared by signed, top-level resources.
///
/// `id`, `slug` and `created` are assigned once by the server and never
/// change. `signature` covers every other field.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: ResourceKind;

    fn id(&self) -> Uuid;
    fn slug(&self) -> &str;
    fn created(&self) -> &str;
    fn signature(&self) -> Option<&str>;
    fn set_signature(&mut self, signature: Option<String>);
}

/// Field names a client may never supply in a create or update body.
pub const PROTECTED_FIELDS: [&str; 4] = ["id", "slug", "created", "signature"];
