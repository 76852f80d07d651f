//! Response shapes of the upstream endpoints.
//!
//! Every field the hosts may omit is optional here, so bodies are decoded
//! once at the client boundary and the workflow only sees typed values.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};

/// The `{success, message, data}` wrapper every endpoint uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn rejected(message: &str) -> Self {
        Self {
            success: false,
            message: Some(message.to_string()),
            data: None,
        }
    }

    /// Upstream message, or `fallback` when absent or blank.
    pub fn message_or(&self, fallback: &str) -> String {
        match self.message.as_deref() {
            Some(m) if !m.trim().is_empty() => m.to_string(),
            _ => fallback.to_string(),
        }
    }
}

/// `data` of the lottery spin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LotteryData {
    #[serde(default)]
    pub cdk: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub quota: Option<Number>,
    #[serde(default)]
    pub times: Option<i64>,
    #[serde(default)]
    pub label: Option<String>,
}

impl LotteryData {
    /// Redemption code, if the spin produced a non-empty one.
    pub fn code(&self) -> Option<&str> {
        self.cdk.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }

    pub fn quota_or_zero(&self) -> Number {
        self.quota.clone().unwrap_or_else(|| Number::from(0))
    }
}

/// `data` of the redemption call: the granted quota.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedeemedQuota(pub Option<Number>);

impl<'de> Deserialize<'de> for RedeemedQuota {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        lenient_number(d).map(RedeemedQuota)
    }
}

/// `data` of the user-info endpoint. Either counter may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfoData {
    #[serde(default)]
    pub continuous_days: Option<u32>,
    #[serde(default)]
    pub total_signs: Option<u64>,
}

/// Accept numbers and numeric strings; anything else decodes to `None`.
fn lenient_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Number>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(match value {
        Some(Value::Number(n)) => Some(n),
        Some(Value::String(s)) => s.trim().parse::<Number>().ok(),
        _ => None,
    })
}
