//! Relay message catalogue.
//!
//! Every frame is a JSON object whose `message` field names the operation.
//! Field names use camelCase to match the relay.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ProtocolError;
use super::readiness::Channel;
use super::record::{SyncCategory, SyncRecord};
use super::seed::SyncSeed;
use crate::models::DeviceId;

/// Relay API version announced during the handshake.
pub const API_VERSION: &str = "0";

/// Client settings sent to the relay with `got-init-data`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub api_version: String,
    pub server_url: String,
    pub debug: bool,
}

/// A remote record paired with the local view of the same object.
pub type RecordPair = (Value, Option<SyncRecord>);

/// Outbound requests.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "message",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum RelayRequest {
    GotInitData {
        seed: Option<SyncSeed>,
        device_id: Option<DeviceId>,
        device_name: Option<String>,
        config: ClientConfig,
    },
    FetchSyncRecords {
        categories: Vec<SyncCategory>,
        start_at: i64,
        max_records: u32,
    },
    FetchSyncDevices,
    SendSyncRecords {
        category: SyncCategory,
        records: Vec<SyncRecord>,
    },
    ResolveSyncRecords {
        category: SyncCategory,
        records_and_existing_objects: Vec<RecordPair>,
    },
    DeleteSyncUser,
    DeleteSyncCategory {
        category: SyncCategory,
    },
    DeleteSyncSiteSettings,
}

impl RelayRequest {
    pub fn name(&self) -> &'static str {
        match self {
            RelayRequest::GotInitData { .. } => "got-init-data",
            RelayRequest::FetchSyncRecords { .. } => "fetch-sync-records",
            RelayRequest::FetchSyncDevices => "fetch-sync-devices",
            RelayRequest::SendSyncRecords { .. } => "send-sync-records",
            RelayRequest::ResolveSyncRecords { .. } => "resolve-sync-records",
            RelayRequest::DeleteSyncUser => "delete-sync-user",
            RelayRequest::DeleteSyncCategory { .. } => "delete-sync-category",
            RelayRequest::DeleteSyncSiteSettings => "delete-sync-site-settings",
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Inbound events, keyed by message name.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    GetInitData,
    SaveInitData {
        seed: Option<Vec<u8>>,
        device_id: Option<Vec<u8>>,
    },
    GetExistingObjects {
        category: SyncCategory,
        records: Vec<Value>,
        last_record_timestamp: Option<i64>,
        is_truncated: bool,
    },
    ResolvedSyncRecords {
        category: SyncCategory,
        records: Vec<Value>,
    },
    ChannelReady(Channel),
    SyncSetupError {
        error: String,
    },
    SyncDebug {
        text: String,
    },
    /// A message this client does not know. Logged and ignored.
    Unknown {
        name: String,
    },
}

#[derive(Deserialize)]
struct Envelope {
    message: String,
    #[serde(flatten)]
    body: Value,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct InitDataBody {
    seed: Option<Vec<u8>>,
    device_id: Option<Vec<u8>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExistingObjectsBody {
    category: SyncCategory,
    #[serde(default)]
    records: Vec<Value>,
    #[serde(default)]
    last_record_timestamp: Option<f64>,
    #[serde(default)]
    is_truncated: Option<bool>,
}

#[derive(Deserialize)]
struct ResolvedBody {
    category: SyncCategory,
    #[serde(default)]
    records: Vec<Value>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct TextBody {
    error: Option<String>,
    text: Option<String>,
}

impl RelayEvent {
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let Envelope { message, body } = serde_json::from_str(frame)?;

        let event = match message.as_str() {
            "get-init-data" => RelayEvent::GetInitData,
            "save-init-data" => {
                let body: InitDataBody = serde_json::from_value(body)?;
                RelayEvent::SaveInitData {
                    seed: body.seed,
                    device_id: body.device_id,
                }
            }
            "get-existing-objects" => {
                let body: ExistingObjectsBody = serde_json::from_value(body)?;
                RelayEvent::GetExistingObjects {
                    category: body.category,
                    records: body.records,
                    last_record_timestamp: body.last_record_timestamp.map(|ts| ts as i64),
                    is_truncated: body.is_truncated.unwrap_or(false),
                }
            }
            "resolved-sync-records" => {
                let body: ResolvedBody = serde_json::from_value(body)?;
                RelayEvent::ResolvedSyncRecords {
                    category: body.category,
                    records: body.records,
                }
            }
            "sync-setup-error" => {
                let body: TextBody = serde_json::from_value(body)?;
                RelayEvent::SyncSetupError {
                    error: body.error.unwrap_or_default(),
                }
            }
            "sync-debug" => {
                let body: TextBody = serde_json::from_value(body)?;
                RelayEvent::SyncDebug {
                    text: body.text.unwrap_or_default(),
                }
            }
            name => match Channel::from_message_name(name) {
                Some(channel) => RelayEvent::ChannelReady(channel),
                None => RelayEvent::Unknown {
                    name: name.to_string(),
                },
            },
        };

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObjectId;
    use crate::sync::record::{DevicePayload, RecordPayload, SyncAction};
    use serde_json::json;

    #[test]
    fn test_fetch_request_encoding() {
        let request = RelayRequest::FetchSyncRecords {
            categories: vec![SyncCategory::Bookmarks],
            start_at: 1000,
            max_records: 300,
        };

        let value: Value = serde_json::from_str(&request.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "message": "fetch-sync-records",
                "categories": ["BOOKMARKS"],
                "startAt": 1000,
                "maxRecords": 300
            })
        );
        assert_eq!(request.name(), "fetch-sync-records");
    }

    #[test]
    fn test_unit_requests_carry_only_the_name() {
        let value = serde_json::to_value(RelayRequest::FetchSyncDevices).unwrap();
        assert_eq!(value, json!({ "message": "fetch-sync-devices" }));

        let value = serde_json::to_value(RelayRequest::DeleteSyncUser).unwrap();
        assert_eq!(value, json!({ "message": "delete-sync-user" }));
    }

    #[test]
    fn test_resolve_request_pairs() {
        let local = SyncRecord {
            object_id: ObjectId::from_bytes(vec![1]).unwrap(),
            device_id: None,
            action: SyncAction::Create,
            payload: RecordPayload::Device(DevicePayload {
                name: Some("me".to_string()),
            }),
            timestamp: None,
        };
        let request = RelayRequest::ResolveSyncRecords {
            category: SyncCategory::Devices,
            records_and_existing_objects: vec![
                (json!({ "objectId": [1] }), Some(local)),
                (json!({ "objectId": [2] }), None),
            ],
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["message"], "resolve-sync-records");
        assert_eq!(value["category"], "PREFERENCES");
        let pairs = value["recordsAndExistingObjects"].as_array().unwrap();
        assert_eq!(pairs[0][1]["objectData"], "device");
        assert_eq!(pairs[1], json!([{ "objectId": [2] }, null]));
    }

    #[test]
    fn test_got_init_data_encoding() {
        let request = RelayRequest::GotInitData {
            seed: None,
            device_id: Some(DeviceId::from_bytes(vec![7]).unwrap()),
            device_name: Some("phone-1".to_string()),
            config: ClientConfig {
                api_version: API_VERSION.to_string(),
                server_url: "wss://relay.example.com".to_string(),
                debug: false,
            },
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["seed"], Value::Null);
        assert_eq!(value["deviceId"], json!([7]));
        assert_eq!(value["deviceName"], "phone-1");
        assert_eq!(value["config"]["apiVersion"], "0");
    }

    #[test]
    fn test_decode_existing_objects() {
        let frame = r#"{"message":"get-existing-objects","category":"BOOKMARKS",
            "records":[{"objectId":[1],"action":0}],"lastRecordTimestamp":1010,"isTruncated":true}"#;

        let event = RelayEvent::decode(frame).unwrap();
        assert_eq!(
            event,
            RelayEvent::GetExistingObjects {
                category: SyncCategory::Bookmarks,
                records: vec![json!({ "objectId": [1], "action": 0 })],
                last_record_timestamp: Some(1010),
                is_truncated: true,
            }
        );
    }

    #[test]
    fn test_decode_save_init_data() {
        let frame = r#"{"message":"save-init-data","seed":[1,2,3],"deviceId":[7]}"#;
        assert_eq!(
            RelayEvent::decode(frame).unwrap(),
            RelayEvent::SaveInitData {
                seed: Some(vec![1, 2, 3]),
                device_id: Some(vec![7]),
            }
        );
    }

    #[test]
    fn test_decode_readiness_and_unknown() {
        assert_eq!(
            RelayEvent::decode(r#"{"message":"delete-sync-category"}"#).unwrap(),
            RelayEvent::ChannelReady(Channel::DeleteCategory)
        );
        assert_eq!(
            RelayEvent::decode(r#"{"message":"brand-new-thing","x":1}"#).unwrap(),
            RelayEvent::Unknown {
                name: "brand-new-thing".to_string()
            }
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(RelayEvent::decode("not json").is_err());
        assert!(RelayEvent::decode(r#"{"no":"message"}"#).is_err());
        assert!(RelayEvent::decode(r#"{"message":"resolved-sync-records","category":"NOPE"}"#).is_err());
    }
}
