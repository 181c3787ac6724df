//! Action names and request composition

use crate::error::{Result, SealpostError};
use crate::identity::DeviceId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Fields owned by the transport; action params cannot override them
pub const RESERVED_FIELDS: [&str; 6] = [
    "action",
    "idToken",
    "deviceID",
    "deviceToken",
    "isVpn",
    "isSslProxy",
];

/// Known actions multiplexed through the single endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    GetDailyBonusStatus,
    ClaimDailyBonus,
    GetSpinWheelStatus,
    SpinWheel,
    GetTasks,
    CompleteTask,
    GetWithdrawalMethods,
    RequestWithdrawal,
    GetWithdrawalHistory,
    CancelWithdrawal,
    GetUserProfile,
    UpdateProfile,
    UpdateEmail,
    GetTransactionHistory,
    GetOfferwall,
    CompleteOffer,
    GetEarnTasks,
    GetPaymentCards,
    AddPaymentCard,
    DeletePaymentCard,
    SetDefaultCard,
    GetAchievements,
    GetLeaderboard,
    GetScratchCardStatus,
    ScratchCard,
    GetReferralStats,
    SendSupportMessage,
    GetSupportMessages,
}

impl Action {
    pub const ALL: [Action; 28] = [
        Action::GetDailyBonusStatus,
        Action::ClaimDailyBonus,
        Action::GetSpinWheelStatus,
        Action::SpinWheel,
        Action::GetTasks,
        Action::CompleteTask,
        Action::GetWithdrawalMethods,
        Action::RequestWithdrawal,
        Action::GetWithdrawalHistory,
        Action::CancelWithdrawal,
        Action::GetUserProfile,
        Action::UpdateProfile,
        Action::UpdateEmail,
        Action::GetTransactionHistory,
        Action::GetOfferwall,
        Action::CompleteOffer,
        Action::GetEarnTasks,
        Action::GetPaymentCards,
        Action::AddPaymentCard,
        Action::DeletePaymentCard,
        Action::SetDefaultCard,
        Action::GetAchievements,
        Action::GetLeaderboard,
        Action::GetScratchCardStatus,
        Action::ScratchCard,
        Action::GetReferralStats,
        Action::SendSupportMessage,
        Action::GetSupportMessages,
    ];

    /// Wire name of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::GetDailyBonusStatus => "getDailyBonusStatus",
            Action::ClaimDailyBonus => "claimDailyBonus",
            Action::GetSpinWheelStatus => "getSpinWheelStatus",
            Action::SpinWheel => "spinWheel",
            Action::GetTasks => "getTasks",
            Action::CompleteTask => "completeTask",
            Action::GetWithdrawalMethods => "getWithdrawalMethods",
            Action::RequestWithdrawal => "requestWithdrawal",
            Action::GetWithdrawalHistory => "getWithdrawalHistory",
            Action::CancelWithdrawal => "cancelWithdrawal",
            Action::GetUserProfile => "getUserProfile",
            Action::UpdateProfile => "updateProfile",
            Action::UpdateEmail => "updateEmail",
            Action::GetTransactionHistory => "getTransactionHistory",
            Action::GetOfferwall => "getOfferwall",
            Action::CompleteOffer => "completeOffer",
            Action::GetEarnTasks => "getEarnTasks",
            Action::GetPaymentCards => "getPaymentCards",
            Action::AddPaymentCard => "addPaymentCard",
            Action::DeletePaymentCard => "deletePaymentCard",
            Action::SetDefaultCard => "setDefaultCard",
            Action::GetAchievements => "getAchievements",
            Action::GetLeaderboard => "getLeaderboard",
            Action::GetScratchCardStatus => "getScratchCardStatus",
            Action::ScratchCard => "scratchCard",
            Action::GetReferralStats => "getReferralStats",
            Action::SendSupportMessage => "sendSupportMessage",
            Action::GetSupportMessages => "getSupportMessages",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown action: {s}"))
    }
}

/// Identity and session fields attached to every request
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionIdentity {
    pub id_token: String,
    #[serde(rename = "deviceID")]
    pub device_id: DeviceId,
    pub device_token: String,
    pub is_vpn: bool,
    pub is_ssl_proxy: bool,
}

impl ActionIdentity {
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            id_token: String::new(),
            device_id,
            device_token: String::new(),
            is_vpn: false,
            is_ssl_proxy: false,
        }
    }

    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        self.id_token = id_token.into();
        self
    }

    pub fn with_device_token(mut self, device_token: impl Into<String>) -> Self {
        self.device_token = device_token.into();
        self
    }

    /// Network signals reported by the client
    pub fn with_network_flags(mut self, is_vpn: bool, is_ssl_proxy: bool) -> Self {
        self.is_vpn = is_vpn;
        self.is_ssl_proxy = is_ssl_proxy;
        self
    }
}

impl fmt::Debug for ActionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionIdentity")
            .field("id_token", &"<redacted>")
            .field("device_id", &self.device_id)
            .field("device_token", &"<redacted>")
            .field("is_vpn", &self.is_vpn)
            .field("is_ssl_proxy", &self.is_ssl_proxy)
            .finish()
    }
}

/// Build the plaintext JSON request body
pub fn compose_request(
    action: &str,
    params: Map<String, Value>,
    identity: &ActionIdentity,
) -> Result<Vec<u8>> {
    let mut request = match serde_json::to_value(identity) {
        Ok(Value::Object(map)) => map,
        _ => return Err(SealpostError::Encryption),
    };
    request.insert("action".into(), Value::String(action.to_string()));

    for (key, value) in params {
        if RESERVED_FIELDS.contains(&key.as_str()) {
            tracing::warn!(field = %key, action, "ignoring action param shadowing a reserved field");
            continue;
        }
        request.insert(key, value);
    }

    serde_json::to_vec(&Value::Object(request)).map_err(|_| SealpostError::Encryption)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity() -> ActionIdentity {
        ActionIdentity::new(DeviceId::parse(&"ab".repeat(32)).unwrap())
            .with_id_token("id-token")
            .with_device_token("fcm-token")
            .with_network_flags(true, false)
    }

    #[test]
    fn test_action_names_match_serde() {
        for action in Action::ALL {
            let serialized = serde_json::to_value(action).unwrap();
            assert_eq!(serialized, Value::String(action.as_str().to_string()));
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert!("dropTables".parse::<Action>().is_err());
    }

    #[test]
    fn test_compose_request_fields() {
        let params = json!({"taskId": "t-42", "proof": "screenshot"});
        let body = compose_request("completeTask", params.as_object().unwrap().clone(), &identity()).unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(
            value,
            json!({
                "action": "completeTask",
                "idToken": "id-token",
                "deviceID": "ab".repeat(32),
                "deviceToken": "fcm-token",
                "isVpn": true,
                "isSslProxy": false,
                "taskId": "t-42",
                "proof": "screenshot",
            })
        );
    }

    #[test]
    fn test_params_cannot_override_identity() {
        let params = json!({"deviceID": "spoofed", "action": "other", "amount": 5});
        let body = compose_request("requestWithdrawal", params.as_object().unwrap().clone(), &identity()).unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["deviceID"], "ab".repeat(32));
        assert_eq!(value["action"], "requestWithdrawal");
        assert_eq!(value["amount"], 5);
    }

    #[test]
    fn test_identity_debug_redacts_tokens() {
        let printed = format!("{:?}", identity());
        assert!(!printed.contains("id-token"));
        assert!(!printed.contains("fcm-token"));
    }
}
