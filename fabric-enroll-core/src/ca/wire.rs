//! JSON bodies of the Fabric CA REST API

use serde::{Deserialize, Deserializer, Serialize};

use super::Attribute;

pub const API_PREFIX: &str = "/api/v1";

/// Response envelope shared by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub result: Option<T>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub errors: Vec<ServerMessage>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub messages: Vec<ServerMessage>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ServerMessage>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ServerMessage>>::deserialize(deserializer)?.unwrap_or_default())
}

impl<T> Envelope<T> {
    pub fn ok(result: T) -> Self {
        Self {
            success: true,
            result: Some(result),
            errors: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub fn failure(code: i64, message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            errors: vec![ServerMessage {
                code,
                message: message.into(),
            }],
            messages: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(default)]
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterBody {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub affiliation: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_enrollments: Option<i32>,
    #[serde(default)]
    pub attrs: Vec<Attribute>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub caname: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResult {
    pub secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnrollBody {
    pub certificate_request: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub caname: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnrollResult {
    /// Base64 of the issued certificate PEM
    #[serde(rename = "Cert")]
    pub cert: String,
    #[serde(rename = "ServerInfo", default)]
    pub server_info: Option<ServerInfo>,
}

/// Body of `cainfo`, also embedded in enroll responses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(rename = "CAName", default)]
    pub ca_name: String,
    /// Base64 of the CA chain PEM
    #[serde(rename = "CAChain", default)]
    pub ca_chain: String,
    #[serde(rename = "Version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}
