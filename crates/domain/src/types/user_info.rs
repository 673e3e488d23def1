//! OIDC userinfo claims

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Claims returned by the userinfo endpoint.
///
/// Claims without a dedicated field are kept in `custom`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(rename = "https://authgear.com/claims/user/is_verified", default)]
    pub is_verified: bool,
    #[serde(rename = "https://authgear.com/claims/user/is_anonymous", default)]
    pub is_anonymous: bool,
    #[serde(rename = "https://authgear.com/claims/user/can_reauthenticate", default)]
    pub can_reauthenticate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoneinfo: Option<String>,
    #[serde(flatten)]
    pub custom: HashMap<String, serde_json::Value>,
}
