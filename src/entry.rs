use crate::otp::{self, OtpError};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One service as stored in a 2FAS backup.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OtpEntry {
    #[serde(default)]
    pub name: String,
    pub secret: String,
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default, rename = "serviceTypeID")]
    pub service_type_id: Option<String>,
    #[serde(default)]
    pub otp: OtpParams,
    #[serde(default)]
    pub order: Option<Order>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OtpParams {
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String, // "TOTP" | "HOTP" | "STEAM"
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default = "default_digits")]
    pub digits: u8,
    #[serde(default = "default_period")]
    pub period: u64,
    #[serde(default = "default_algorithm")]
    pub algorithm: String, // "SHA1"
    #[serde(default)]
    pub counter: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub position: i64,
}

fn default_token_type() -> String {
    "TOTP".to_string()
}

fn default_digits() -> u8 {
    6
}

fn default_period() -> u64 {
    otp::DEFAULT_PERIOD
}

fn default_algorithm() -> String {
    "SHA1".to_string()
}

impl Default for OtpParams {
    fn default() -> Self {
        Self {
            link: None,
            label: None,
            account: None,
            issuer: None,
            token_type: default_token_type(),
            source: None,
            digits: default_digits(),
            period: default_period(),
            algorithm: default_algorithm(),
            counter: None,
        }
    }
}

impl OtpEntry {
    pub fn new(name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret: secret.into(),
            updated_at: None,
            service_type_id: None,
            otp: OtpParams::default(),
            order: None,
        }
    }

    /// Name shown to the user, falling back to the OTP label.
    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            return &self.name;
        }
        self.otp.label.as_deref().unwrap_or("(unnamed)")
    }

    pub fn generate(&self) -> Result<String, OtpError> {
        self.generate_at(OffsetDateTime::now_utc())
    }

    pub fn generate_at(&self, at: OffsetDateTime) -> Result<String, OtpError> {
        otp::generate_code(&self.secret, &self.otp, at)
    }

    /// HOTP codes follow the stored counter, not the clock.
    pub fn is_counter_based(&self) -> bool {
        self.otp.token_type.eq_ignore_ascii_case("HOTP")
    }

    /// Rotation period in seconds, never zero.
    pub fn period(&self) -> u64 {
        self.otp.period.max(1)
    }
}
