//! ID token claims issued by sectoral identity providers.

use serde::{Deserialize, Serialize};

use crate::jose::CompactJws;

/// Claims of a verified ID token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer identifier.
    pub iss: String,

    /// Subject identifier.
    pub sub: String,

    /// Audience (string or array on the wire).
    #[serde(deserialize_with = "deserialize_audience", default)]
    pub aud: Vec<String>,

    /// Issued at time (Unix timestamp).
    pub iat: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Not before (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Nonce from the authorization request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Authentication context class reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acr: Option<String>,

    /// Authentication methods references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amr: Option<Vec<String>>,

    // Telematik claims
    /// E-mail address.
    #[serde(
        rename = "urn:telematik:claims:email",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub email: Option<String>,

    /// Given name.
    #[serde(
        rename = "urn:telematik:claims:given_name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub given_name: Option<String>,

    /// Profession OID.
    #[serde(
        rename = "urn:telematik:claims:profession",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub profession: Option<String>,

    /// Insured person identifier (KVNR).
    #[serde(
        rename = "urn:telematik:claims:id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub telematik_id: Option<String>,

    /// Health insurance organization.
    #[serde(
        rename = "urn:telematik:claims:organization",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub organization: Option<String>,
}

/// A decrypted, verified ID token.
#[derive(Debug, Clone)]
pub struct IdTokenResult {
    /// The signed inner token.
    pub jws: CompactJws,
    /// Its decoded claims.
    pub claims: IdTokenClaims,
}

fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => Ok(vec![s]),
        OneOrMany::Many(v) => Ok(v),
    }
}
