use dp1_types::{iso_from_millis, now_millis, Channel, Playlist};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{QueueError, QueueResult};

/// Discriminator of a write operation, as carried on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    CreatePlaylist,
    UpdatePlaylist,
    CreateChannel,
    UpdateChannel,
    Fact,
}

impl OperationKind {
    pub const ALL: [Self; 5] = [
        Self::CreatePlaylist,
        Self::UpdatePlaylist,
        Self::CreateChannel,
        Self::UpdateChannel,
        Self::Fact,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatePlaylist => "create_playlist",
            Self::UpdatePlaylist => "update_playlist",
            Self::CreateChannel => "create_channel",
            Self::UpdateChannel => "update_channel",
            Self::Fact => "fact",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of an inbound fact. Only endorsements ("stars") exist today.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactKind {
    Star,
}

/// Whether a fact is being asserted or withdrawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactStatus {
    Active,
    Revoked,
}

/// An endorsement of a playlist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    pub kind: FactKind,
    pub status: FactStatus,
    pub playlist_id: Uuid,
    /// Creation time of the endorsed playlist, when the sender knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistData {
    playlist_id: Uuid,
    playlist: Playlist,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelData {
    channel_id: Uuid,
    channel: Channel,
}

/// A pending storage mutation. Adding a variant forces every `match` over
/// this type, including the processor's dispatch, to handle it.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOperation {
    CreatePlaylist(Playlist),
    UpdatePlaylist(Playlist),
    CreateChannel(Channel),
    UpdateChannel(Channel),
    Fact(Fact),
}

impl WriteOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::CreatePlaylist(_) => OperationKind::CreatePlaylist,
            Self::UpdatePlaylist(_) => OperationKind::UpdatePlaylist,
            Self::CreateChannel(_) => OperationKind::CreateChannel,
            Self::UpdateChannel(_) => OperationKind::UpdateChannel,
            Self::Fact(_) => OperationKind::Fact,
        }
    }

    /// Id of the resource the operation writes.
    pub fn resource_id(&self) -> Uuid {
        match self {
            Self::CreatePlaylist(p) | Self::UpdatePlaylist(p) => p.id,
            Self::CreateChannel(c) | Self::UpdateChannel(c) => c.id,
            Self::Fact(f) => f.playlist_id,
        }
    }

    fn to_data(&self) -> QueueResult<Value> {
        let data = match self {
            Self::CreatePlaylist(p) | Self::UpdatePlaylist(p) => serde_json::to_value(PlaylistData {
                playlist_id: p.id,
                playlist: p.clone(),
            }),
            Self::CreateChannel(c) | Self::UpdateChannel(c) => serde_json::to_value(ChannelData {
                channel_id: c.id,
                channel: c.clone(),
            }),
            Self::Fact(f) => serde_json::to_value(f),
        };
        data.map_err(|e| QueueError::InvalidPayload {
            operation: self.kind().to_string(),
            reason: e.to_string(),
        })
    }

    fn from_data(kind: OperationKind, data: Value) -> QueueResult<Self> {
        fn payload<T: DeserializeOwned>(kind: OperationKind, data: Value) -> QueueResult<T> {
            serde_json::from_value(data).map_err(|e| QueueError::InvalidPayload {
                operation: kind.to_string(),
                reason: e.to_string(),
            })
        }
        fn mismatch(kind: OperationKind) -> QueueError {
            QueueError::InvalidPayload {
                operation: kind.to_string(),
                reason: "resource id does not match payload".into(),
            }
        }

        Ok(match kind {
            OperationKind::CreatePlaylist | OperationKind::UpdatePlaylist => {
                let d: PlaylistData = payload(kind, data)?;
                if d.playlist_id != d.playlist.id {
                    return Err(mismatch(kind));
                }
                if kind == OperationKind::CreatePlaylist {
                    Self::CreatePlaylist(d.playlist)
                } else {
                    Self::UpdatePlaylist(d.playlist)
                }
            }
            OperationKind::CreateChannel | OperationKind::UpdateChannel => {
                let d: ChannelData = payload(kind, data)?;
                if d.channel_id != d.channel.id {
                    return Err(mismatch(kind));
                }
                if kind == OperationKind::CreateChannel {
                    Self::CreateChannel(d.channel)
                } else {
                    Self::UpdateChannel(d.channel)
                }
            }
            OperationKind::Fact => Self::Fact(payload(kind, data)?),
        })
    }
}

/// Wire envelope of a queued write.
///
/// The envelope always parses; `operation` is validated only when the
/// message is decoded for processing, so an unknown discriminator becomes a
/// per-message failure instead of a transport-level parse error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WriteMessage {
    pub id: String,
    pub timestamp: String,
    pub operation: String,
    pub data: Value,
}

impl WriteMessage {
    /// Wrap an operation in a new envelope stamped with the current time.
    pub fn new(operation: &WriteOperation) -> QueueResult<Self> {
        let now = now_millis();
        Ok(Self {
            id: message_id(operation.kind(), operation.resource_id(), now),
            timestamp: iso_from_millis(now),
            operation: operation.kind().to_string(),
            data: operation.to_data()?,
        })
    }

    /// Decode the typed operation carried by this envelope.
    pub fn decode(&self) -> QueueResult<WriteOperation> {
        let kind = OperationKind::parse(&self.operation)
            .ok_or_else(|| QueueError::UnknownOperation(self.operation.clone()))?;
        WriteOperation::from_data(kind, self.data.clone())
    }
}

/// Build a message id of the form
/// `{operation}-{resourceId}-{epochMillis}-{randomSuffix}`.
///
/// The random suffix keeps ids unique when the same resource is written
/// several times within one millisecond.
pub fn message_id(kind: OperationKind, resource_id: Uuid, epoch_ms: i64) -> String {
    let suffix: u64 = rand::thread_rng().gen();
    format!("{kind}-{resource_id}-{epoch_ms}-{suffix:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dp1_types::{ChannelInput, License, PlaylistInput, PlaylistItemInput};
    use std::collections::HashSet;

    fn playlist() -> Playlist {
        Playlist::from_input(
            PlaylistInput {
                dp_version: "1.0.0".into(),
                title: "T".into(),
                defaults: None,
                items: vec![PlaylistItemInput {
                    title: None,
                    source: "https://x/y".into(),
                    duration: 10,
                    license: License::Open,
                    reference: None,
                    display: None,
                    provenance: None,
                    repro: None,
                }],
            },
            0,
        )
    }

    fn channel() -> Channel {
        Channel::from_input(
            ChannelInput {
                title: "C".into(),
                curator: None,
                summary: None,
                playlists: vec!["https://x/playlists/1".into()],
            },
            0,
        )
    }

    #[test]
    fn envelope_carries_discriminator_and_payload() {
        let p = playlist();
        let msg = WriteMessage::new(&WriteOperation::CreatePlaylist(p.clone())).unwrap();
        assert_eq!(msg.operation, "create_playlist");
        assert_eq!(msg.data["playlistId"], p.id.to_string());
        assert!(msg.id.starts_with(&format!("create_playlist-{}-", p.id)));
        assert_eq!(msg.decode().unwrap(), WriteOperation::CreatePlaylist(p));
    }

    #[test]
    fn every_kind_decodes_back() {
        let ops = vec![
            WriteOperation::CreatePlaylist(playlist()),
            WriteOperation::UpdatePlaylist(playlist()),
            WriteOperation::CreateChannel(channel()),
            WriteOperation::UpdateChannel(channel()),
            WriteOperation::Fact(Fact {
                kind: FactKind::Star,
                status: FactStatus::Revoked,
                playlist_id: Uuid::new_v4(),
                created: None,
            }),
        ];
        for op in ops {
            let msg = WriteMessage::new(&op).unwrap();
            let wire = serde_json::to_string(&msg).unwrap();
            let parsed: WriteMessage = serde_json::from_str(&wire).unwrap();
            assert_eq!(parsed.decode().unwrap(), op);
        }
    }

    #[test]
    fn unknown_operation_is_a_decode_error() {
        let msg = WriteMessage {
            id: "x".into(),
            timestamp: "2024-01-01T00:00:00.000Z".into(),
            operation: "delete_everything".into(),
            data: serde_json::json!({}),
        };
        assert!(matches!(msg.decode(), Err(QueueError::UnknownOperation(op)) if op == "delete_everything"));
    }

    #[test]
    fn mismatched_resource_id_is_rejected() {
        let p = playlist();
        let mut msg = WriteMessage::new(&WriteOperation::UpdatePlaylist(p)).unwrap();
        msg.data["playlistId"] = serde_json::json!(Uuid::new_v4().to_string());
        assert!(matches!(msg.decode(), Err(QueueError::InvalidPayload { .. })));
    }

    #[test]
    fn message_ids_are_unique_for_rapid_repeats() {
        let id = Uuid::new_v4();
        let ids: HashSet<String> = (0..1000)
            .map(|_| message_id(OperationKind::UpdatePlaylist, id, 1_704_067_200_000))
            .collect();
        assert_eq!(ids.len(), 1000);
        let suffix = ids.iter().next().unwrap().rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 16);
    }

    #[test]
    fn operation_kind_parsing() {
        for kind in OperationKind::ALL {
            assert_eq!(OperationKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(OperationKind::parse("CREATE_PLAYLIST"), None);
    }
}
