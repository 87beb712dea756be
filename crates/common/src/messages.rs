// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Wire messages exchanged with the tabletop server.
//!
//! Every frame is a JSON object `{ "type": ..., "data": ..., "priority": ..., "correlation_key": ... }`.
//! Outbound and inbound traffic are each a closed enum, decoded exactly once at the channel
//! boundary; server replies whose shape is "one of several optional-field combinations" are
//! normalized into enums here so that nothing downstream has to inspect optional fields.

use crate::errors::SyncError;
use crate::hash::ContentHash;
use crate::model::{SpriteDescriptor, SpriteId, SpriteOperation, SpriteUpdate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageType {
    AssetUploadRequest,
    AssetUploadResponse,
    AssetUploadConfirm,
    AssetUploadConfirmed,
    AssetDownloadRequest,
    AssetDownloadResponse,
    SpriteCreate,
    SpriteCreateResponse,
    SpriteCreated,
    SpriteUpdate,
    SpriteRemove,
    Ping,
    Pong,
    Error,
}

impl MessageType {
    /// The reply type that answers a correlated request of this type.
    pub fn reply_type(self) -> Option<MessageType> {
        match self {
            MessageType::AssetUploadRequest => Some(MessageType::AssetUploadResponse),
            MessageType::AssetUploadConfirm => Some(MessageType::AssetUploadConfirmed),
            MessageType::AssetDownloadRequest => Some(MessageType::AssetDownloadResponse),
            MessageType::SpriteCreate => Some(MessageType::SpriteCreateResponse),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// A message plus its delivery metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope<M> {
    #[serde(flatten)]
    pub message: M,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_key: Option<String>,
}

pub type ClientEnvelope = Envelope<ClientMessage>;
pub type ServerEnvelope = Envelope<ServerMessage>;

impl<M> Envelope<M> {
    pub fn new(message: M) -> Self {
        Self {
            message,
            priority: Priority::Normal,
            correlation_key: None,
        }
    }

    pub fn correlated(message: M, key: impl Into<String>) -> Self {
        Self {
            message,
            priority: Priority::Normal,
            correlation_key: Some(key.into()),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

impl<M: Serialize> Envelope<M> {
    pub fn to_frame(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(|e| SyncError::Encode(e.to_string()))
    }
}

impl<M: DeserializeOwned> Envelope<M> {
    pub fn from_frame(frame: &str) -> Result<Self, SyncError> {
        serde_json::from_str(frame).map_err(|e| SyncError::Decode(e.to_string()))
    }
}

/// Everything this client sends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    AssetUploadRequest {
        filename: String,
        file_size: u64,
        content_type: String,
        content_hash: ContentHash,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_context: Option<String>,
    },
    AssetUploadConfirm {
        asset_id: String,
        content_hash: ContentHash,
        file_size: u64,
        content_type: String,
    },
    AssetDownloadRequest {
        asset_id: String,
    },
    SpriteCreate {
        sprite: SpriteDescriptor,
    },
    SpriteUpdate {
        sprite_id: SpriteId,
        operation: SpriteOperation,
        changed_fields: SpriteUpdate,
    },
    SpriteRemove {
        sprite_id: SpriteId,
    },
    Ping {
        nonce: u64,
    },
}

impl ClientMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            ClientMessage::AssetUploadRequest { .. } => MessageType::AssetUploadRequest,
            ClientMessage::AssetUploadConfirm { .. } => MessageType::AssetUploadConfirm,
            ClientMessage::AssetDownloadRequest { .. } => MessageType::AssetDownloadRequest,
            ClientMessage::SpriteCreate { .. } => MessageType::SpriteCreate,
            ClientMessage::SpriteUpdate { .. } => MessageType::SpriteUpdate,
            ClientMessage::SpriteRemove { .. } => MessageType::SpriteRemove,
            ClientMessage::Ping { .. } => MessageType::Ping,
        }
    }
}

/// Everything the server sends, either as a reply (carrying the request's correlation key) or as
/// a broadcast originating from another client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    AssetUploadResponse(UploadReply),
    AssetUploadConfirmed(ConfirmReply),
    AssetDownloadResponse(DownloadReply),
    SpriteCreateResponse(CreateReply),
    SpriteCreated {
        sprite: SpriteDescriptor,
    },
    SpriteUpdate {
        sprite_id: SpriteId,
        operation: SpriteOperation,
        changed_fields: SpriteUpdate,
    },
    SpriteRemove {
        sprite_id: SpriteId,
    },
    Pong {
        nonce: u64,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            ServerMessage::AssetUploadResponse(_) => MessageType::AssetUploadResponse,
            ServerMessage::AssetUploadConfirmed(_) => MessageType::AssetUploadConfirmed,
            ServerMessage::AssetDownloadResponse(_) => MessageType::AssetDownloadResponse,
            ServerMessage::SpriteCreateResponse(_) => MessageType::SpriteCreateResponse,
            ServerMessage::SpriteCreated { .. } => MessageType::SpriteCreated,
            ServerMessage::SpriteUpdate { .. } => MessageType::SpriteUpdate,
            ServerMessage::SpriteRemove { .. } => MessageType::SpriteRemove,
            ServerMessage::Pong { .. } => MessageType::Pong,
            ServerMessage::Error { .. } => MessageType::Error,
        }
    }
}

/// The server's answer to an upload request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawUploadReply", into = "RawUploadReply")]
pub enum UploadReply {
    /// The server already holds these bytes; no transfer needed.
    Exists { asset_id: String },
    /// Transfer the bytes to `upload_target`, then confirm.
    UploadRequired {
        asset_id: String,
        upload_target: String,
    },
    Rejected { error: String },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct RawUploadReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exists: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    asset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    upload_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl TryFrom<RawUploadReply> for UploadReply {
    type Error = String;

    fn try_from(raw: RawUploadReply) -> Result<Self, Self::Error> {
        if let Some(error) = raw.error {
            return Ok(UploadReply::Rejected { error });
        }
        match (raw.exists, raw.asset_id, raw.upload_target) {
            (Some(true), Some(asset_id), _) => Ok(UploadReply::Exists { asset_id }),
            (Some(false), Some(asset_id), Some(upload_target)) => Ok(UploadReply::UploadRequired {
                asset_id,
                upload_target,
            }),
            (Some(false), _, None) => Err("upload reply is missing its upload_target".to_string()),
            (_, None, _) => Err("upload reply is missing its asset_id".to_string()),
            (None, _, _) => Err("upload reply has neither `exists` nor `error`".to_string()),
        }
    }
}

impl From<UploadReply> for RawUploadReply {
    fn from(reply: UploadReply) -> Self {
        match reply {
            UploadReply::Exists { asset_id } => RawUploadReply {
                exists: Some(true),
                asset_id: Some(asset_id),
                ..Default::default()
            },
            UploadReply::UploadRequired {
                asset_id,
                upload_target,
            } => RawUploadReply {
                exists: Some(false),
                asset_id: Some(asset_id),
                upload_target: Some(upload_target),
                ..Default::default()
            },
            UploadReply::Rejected { error } => RawUploadReply {
                error: Some(error),
                ..Default::default()
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The server's answer to a download request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDownloadReply", into = "RawDownloadReply")]
pub enum DownloadReply {
    Ready { download_url: String },
    NotFound { error: String },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct RawDownloadReply {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl TryFrom<RawDownloadReply> for DownloadReply {
    type Error = String;

    fn try_from(raw: RawDownloadReply) -> Result<Self, Self::Error> {
        match (raw.success, raw.download_url) {
            (true, Some(download_url)) => Ok(DownloadReply::Ready { download_url }),
            (true, None) => Err("successful download reply without a download_url".to_string()),
            (false, _) => Ok(DownloadReply::NotFound {
                error: raw.error.unwrap_or_else(|| "asset not found".to_string()),
            }),
        }
    }
}

impl From<DownloadReply> for RawDownloadReply {
    fn from(reply: DownloadReply) -> Self {
        match reply {
            DownloadReply::Ready { download_url } => RawDownloadReply {
                success: true,
                download_url: Some(download_url),
                error: None,
            },
            DownloadReply::NotFound { error } => RawDownloadReply {
                success: false,
                download_url: None,
                error: Some(error),
            },
        }
    }
}

/// The server's answer to a sprite creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCreateReply", into = "RawCreateReply")]
pub enum CreateReply {
    /// Created under `sprite_id`. The server may echo the full authoritative descriptor; when it
    /// does not, the provisional descriptor is authoritative apart from its id.
    Created {
        sprite_id: SpriteId,
        sprite: Option<SpriteDescriptor>,
    },
    Rejected { error: String },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct RawCreateReply {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sprite_id: Option<SpriteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sprite: Option<SpriteDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl TryFrom<RawCreateReply> for CreateReply {
    type Error = String;

    fn try_from(raw: RawCreateReply) -> Result<Self, Self::Error> {
        if !raw.success {
            return Ok(CreateReply::Rejected {
                error: raw.error.unwrap_or_else(|| "sprite creation rejected".to_string()),
            });
        }
        let sprite_id = raw
            .sprite_id
            .or_else(|| raw.sprite.as_ref().map(|s| s.id.clone()))
            .ok_or_else(|| "successful create reply without a sprite_id".to_string())?;
        Ok(CreateReply::Created {
            sprite_id,
            sprite: raw.sprite,
        })
    }
}

impl From<CreateReply> for RawCreateReply {
    fn from(reply: CreateReply) -> Self {
        match reply {
            CreateReply::Created { sprite_id, sprite } => RawCreateReply {
                success: true,
                sprite_id: Some(sprite_id),
                sprite,
                error: None,
            },
            CreateReply::Rejected { error } => RawCreateReply {
                success: false,
                error: Some(error),
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn test_client_frame_shape() {
        let env = Envelope::correlated(
            ClientMessage::AssetDownloadRequest {
                asset_id: "a-1".to_string(),
            },
            "k",
        );
        let value: serde_json::Value = serde_json::from_str(&env.to_frame().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "asset_download_request",
                "data": { "asset_id": "a-1" },
                "priority": "normal",
                "correlation_key": "k",
            })
        );
    }

    #[test_case(MessageType::AssetUploadRequest, Some(MessageType::AssetUploadResponse); "upload request")]
    #[test_case(MessageType::AssetUploadConfirm, Some(MessageType::AssetUploadConfirmed); "upload confirm")]
    #[test_case(MessageType::AssetDownloadRequest, Some(MessageType::AssetDownloadResponse); "download request")]
    #[test_case(MessageType::SpriteCreate, Some(MessageType::SpriteCreateResponse); "sprite create")]
    #[test_case(MessageType::SpriteUpdate, None; "updates are not answered")]
    #[test_case(MessageType::Ping, None; "pings are answered out of band")]
    fn test_reply_types(request: MessageType, reply: Option<MessageType>) {
        assert_eq!(request.reply_type(), reply);
    }

    #[test]
    fn test_upload_reply_exists() {
        let frame = r#"{"type":"asset_upload_response","data":{"exists":true,"asset_id":"a-9"},"correlation_key":"00000000000000ff"}"#;
        let env = ServerEnvelope::from_frame(frame).unwrap();
        assert_eq!(env.correlation_key.as_deref(), Some("00000000000000ff"));
        assert_eq!(env.priority, Priority::Normal);
        assert_eq!(
            env.message,
            ServerMessage::AssetUploadResponse(UploadReply::Exists {
                asset_id: "a-9".to_string()
            })
        );
    }

    #[test]
    fn test_upload_reply_needs_transfer() {
        let frame = r#"{"type":"asset_upload_response","data":{"exists":false,"asset_id":"a-9","upload_target":"https://storage/put/1"}}"#;
        let env = ServerEnvelope::from_frame(frame).unwrap();
        assert_eq!(
            env.message,
            ServerMessage::AssetUploadResponse(UploadReply::UploadRequired {
                asset_id: "a-9".to_string(),
                upload_target: "https://storage/put/1".to_string(),
            })
        );
    }

    #[test_case(r#"{"exists":false,"asset_id":"a"}"# ; "missing target")]
    #[test_case(r#"{"exists":true}"# ; "missing asset id")]
    #[test_case(r#"{}"# ; "empty")]
    fn test_malformed_upload_reply_is_a_decode_error(data: &str) {
        let frame = format!(r#"{{"type":"asset_upload_response","data":{data}}}"#);
        assert!(matches!(
            ServerEnvelope::from_frame(&frame),
            Err(SyncError::Decode(_))
        ));
    }

    #[test]
    fn test_create_reply_without_descriptor() {
        let frame = r#"{"type":"sprite_create_response","data":{"success":true,"sprite_id":"srv-7"},"correlation_key":"t1"}"#;
        let env = ServerEnvelope::from_frame(frame).unwrap();
        assert_eq!(
            env.message,
            ServerMessage::SpriteCreateResponse(CreateReply::Created {
                sprite_id: "srv-7".into(),
                sprite: None
            })
        );
    }

    #[test]
    fn test_create_reply_failure() {
        let frame = r#"{"type":"sprite_create_response","data":{"success":false,"error":"no room"}}"#;
        let env = ServerEnvelope::from_frame(frame).unwrap();
        assert_eq!(
            env.message,
            ServerMessage::SpriteCreateResponse(CreateReply::Rejected {
                error: "no room".to_string()
            })
        );
    }

    #[test]
    fn test_download_not_found() {
        let frame = r#"{"type":"asset_download_response","data":{"success":false}}"#;
        let env = ServerEnvelope::from_frame(frame).unwrap();
        assert!(matches!(
            env.message,
            ServerMessage::AssetDownloadResponse(DownloadReply::NotFound { .. })
        ));
    }

    #[test]
    fn test_unknown_type_is_a_decode_error() {
        let frame = r#"{"type":"fog_reveal","data":{}}"#;
        assert!(ServerEnvelope::from_frame(frame).is_err());
    }

    #[test]
    fn test_message_type_names() {
        assert_eq!(MessageType::AssetUploadConfirm.to_string(), "asset_upload_confirm");
        assert_eq!(
            "sprite_remove".parse::<MessageType>().unwrap(),
            MessageType::SpriteRemove
        );
    }
}
