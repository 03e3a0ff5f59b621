use {
    chrono::{DateTime, SecondsFormat, Utc},
    serde::{Deserialize, Serialize},
    std::fmt::{Debug, Formatter, Result as FmtResult},
};

/// `Code` of every successfully resolved credential document.
pub const CODE_SUCCESS: &str = "Success";

/// `Type` of every credential document; IMDS only ever hands out HMAC credentials.
pub const CREDENTIAL_TYPE_AWS_HMAC: &str = "AWS-HMAC";

const REDACTED: &str = "** redacted **";

/// Formats a timestamp the way the instance metadata service does: RFC 3339, whole seconds, UTC.
pub(crate) fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// A temporary credential in the shape of the EC2 instance metadata service credential document.
///
/// The JSON field names are fixed: SDKs parse `AccessKeyId`, `SecretAccessKey`, `Token`, and `Expiration` by name.
/// Records are built for a single response and never stored.
#[derive(Clone, Deserialize, Eq, PartialEq, Serialize)]
pub struct CredentialRecord {
    #[serde(rename = "Code")]
    pub code: String,

    #[serde(rename = "LastUpdated")]
    pub last_updated: String,

    #[serde(rename = "Type")]
    pub r#type: String,

    #[serde(rename = "AccessKeyId")]
    pub access_key_id: String,

    #[serde(rename = "SecretAccessKey")]
    pub secret_access_key: String,

    #[serde(rename = "Token")]
    pub token: String,

    #[serde(rename = "Expiration")]
    pub expiration: String,
}

impl CredentialRecord {
    /// Create a successful record from the raw key material.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        token: impl Into<String>,
        last_updated: DateTime<Utc>,
        expiration: DateTime<Utc>,
    ) -> Self {
        Self {
            code: CODE_SUCCESS.to_string(),
            last_updated: format_timestamp(last_updated),
            r#type: CREDENTIAL_TYPE_AWS_HMAC.to_string(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            token: token.into(),
            expiration: format_timestamp(expiration),
        }
    }
}

impl Debug for CredentialRecord {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.debug_struct("CredentialRecord")
            .field("code", &self.code)
            .field("last_updated", &self.last_updated)
            .field("type", &self.r#type)
            .field("access_key_id", &REDACTED)
            .field("secret_access_key", &REDACTED)
            .field("token", &REDACTED)
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Document returned in place of a [CredentialRecord] when resolution failures are answered rather than fatal.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ErrorRecord {
    #[serde(rename = "Code")]
    pub code: String,

    #[serde(rename = "Message")]
    pub message: String,

    #[serde(rename = "LastUpdated")]
    pub last_updated: String,
}

impl ErrorRecord {
    pub fn new(code: impl Into<String>, message: impl Into<String>, last_updated: DateTime<Utc>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            last_updated: format_timestamp(last_updated),
        }
    }
}
