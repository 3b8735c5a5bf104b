//! JSON Web Keys and P-256 key material.
//!
//! Federation documents carry their keys as JWK sets. Only elliptic curve keys
//! on P-256 are usable for verification and key agreement; other keys are
//! kept verbatim so a key set survives a parse/serialize cycle unchanged.

use std::collections::BTreeMap;
use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::EncodingKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::JwsError;

/// Curve name of P-256 keys.
pub const CURVE_P256: &str = "P-256";

/// Length of a P-256 coordinate in bytes.
const COORDINATE_LEN: usize = 32;

// ============================================================================
// JWK Types
// ============================================================================

/// JSON Web Key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type ("EC" for the keys this crate can use).
    pub kty: String,

    /// Key ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Key use ("sig" or "enc").
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,

    /// Algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// EC curve name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    /// Members not modelled above (`x5c`, `n`, `e`, private `d`, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl JsonWebKey {
    /// Builds a P-256 JWK from a public key.
    #[must_use]
    pub fn from_p256(
        public_key: &PublicKey,
        kid: impl Into<String>,
        use_: &str,
        alg: &str,
    ) -> Self {
        let point = public_key.to_encoded_point(false);
        Self {
            kty: "EC".to_string(),
            kid: Some(kid.into()),
            use_: Some(use_.to_string()),
            alg: Some(alg.to_string()),
            crv: Some(CURVE_P256.to_string()),
            x: point.x().map(|x| URL_SAFE_NO_PAD.encode(x)),
            y: point.y().map(|y| URL_SAFE_NO_PAD.encode(y)),
            extra: BTreeMap::new(),
        }
    }

    /// Returns `true` for EC keys on P-256.
    #[must_use]
    pub fn is_p256(&self) -> bool {
        self.kty == "EC" && self.crv.as_deref() == Some(CURVE_P256)
    }

    /// Returns the key ID, if any.
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    /// Returns the SEC1 uncompressed point (`0x04 || x || y`) of a P-256 key.
    ///
    /// Returns `None` for other key types or malformed coordinates.
    #[must_use]
    pub fn p256_point(&self) -> Option<Vec<u8>> {
        if !self.is_p256() {
            return None;
        }
        let x = decode_coordinate(self.x.as_deref()?)?;
        let y = decode_coordinate(self.y.as_deref()?)?;

        let mut point = Vec::with_capacity(1 + 2 * COORDINATE_LEN);
        point.push(0x04);
        point.extend_from_slice(&x);
        point.extend_from_slice(&y);
        Some(point)
    }

    /// Converts the key into a P-256 public key.
    #[must_use]
    pub fn to_p256_public_key(&self) -> Option<PublicKey> {
        let point = self.p256_point()?;
        PublicKey::from_sec1_bytes(&point).ok()
    }

    /// Returns the private scalar `d` of a private P-256 JWK.
    #[must_use]
    pub fn to_p256_secret_key(&self) -> Option<SecretKey> {
        if !self.is_p256() {
            return None;
        }
        let d = self.extra.get("d")?.as_str()?;
        let bytes = URL_SAFE_NO_PAD.decode(d).ok()?;
        SecretKey::from_slice(&bytes).ok()
    }
}

fn decode_coordinate(value: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value)
        .ok()
        .filter(|bytes| bytes.len() == COORDINATE_LEN)
}

/// JSON Web Key Set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    /// The keys in this set.
    #[serde(default)]
    pub keys: Vec<JsonWebKey>,
}

impl JwkSet {
    /// Creates a key set from keys.
    #[must_use]
    pub fn new(keys: Vec<JsonWebKey>) -> Self {
        Self { keys }
    }

    /// Adds a key to the set.
    pub fn add_key(&mut self, key: JsonWebKey) {
        self.keys.push(key);
    }

    /// Returns `true` if the set holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Finds a key by ID.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&JsonWebKey> {
        self.keys.iter().find(|k| k.kid() == Some(kid))
    }

    /// Compares two key sets ignoring key order.
    #[must_use]
    pub fn same_keys(&self, other: &JwkSet) -> bool {
        self.len() == other.len() && self.keys.iter().all(|k| other.keys.contains(k))
    }

    /// Appends the keys of `other` that are not already present.
    pub fn merge(&mut self, other: JwkSet) {
        for key in other.keys {
            if !self.keys.contains(&key) {
                self.keys.push(key);
            }
        }
    }
}

// ============================================================================
// Signing Key Pair
// ============================================================================

/// An ES256 signing key pair.
///
/// Used to sign the relying party's own entity statement.
pub struct SigningKeyPair {
    kid: String,
    secret_key: SecretKey,
    encoding_key: EncodingKey,

    /// When the key was created or loaded.
    pub created_at: OffsetDateTime,
}

impl SigningKeyPair {
    /// Generates a new P-256 key pair with a random key ID.
    ///
    /// # Errors
    /// Returns an error if the key cannot be exported for signing.
    pub fn generate() -> Result<Self, JwsError> {
        let secret_key = SecretKey::random(&mut OsRng);
        Self::from_secret_key(uuid::Uuid::new_v4().to_string(), secret_key)
    }

    /// Loads a key pair from a PKCS#8 PEM private key.
    ///
    /// # Errors
    /// Returns an error if the PEM data is not a P-256 private key.
    pub fn from_pkcs8_pem(kid: impl Into<String>, private_pem: &str) -> Result<Self, JwsError> {
        let secret_key = SecretKey::from_pkcs8_pem(private_pem)
            .map_err(|e| JwsError::invalid_key(e.to_string()))?;
        Self::from_secret_key(kid, secret_key)
    }

    /// Wraps an existing secret key.
    ///
    /// # Errors
    /// Returns an error if the key cannot be exported for signing.
    pub fn from_secret_key(kid: impl Into<String>, secret_key: SecretKey) -> Result<Self, JwsError> {
        // jsonwebtoken only accepts EC keys as PKCS#8 PEM
        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwsError::invalid_key(e.to_string()))?;
        let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
            .map_err(|e| JwsError::invalid_key(e.to_string()))?;

        Ok(Self {
            kid: kid.into(),
            secret_key,
            encoding_key,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Returns the key ID.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Returns the public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.secret_key.public_key()
    }

    /// Exports the public key as a JWK.
    #[must_use]
    pub fn to_jwk(&self) -> JsonWebKey {
        JsonWebKey::from_p256(&self.public_key(), &self.kid, "sig", "ES256")
    }

    /// Exports the public key as a single-key JWK set.
    #[must_use]
    pub fn to_jwk_set(&self) -> JwkSet {
        JwkSet::new(vec![self.to_jwk()])
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("kid", &self.kid)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Encryption Key Pair
// ============================================================================

/// A P-256 key pair for ECDH-ES key agreement.
///
/// Identity providers encrypt the ID token to the public half, which the
/// relying party publishes in its entity statement.
#[derive(Clone)]
pub struct EncryptionKeyPair {
    kid: String,
    secret_key: SecretKey,
}

impl EncryptionKeyPair {
    /// Generates a new key pair with a random key ID.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_secret_key(uuid::Uuid::new_v4().to_string(), SecretKey::random(&mut OsRng))
    }

    /// Wraps an existing secret key.
    #[must_use]
    pub fn from_secret_key(kid: impl Into<String>, secret_key: SecretKey) -> Self {
        Self {
            kid: kid.into(),
            secret_key,
        }
    }

    /// Loads a key pair from a PKCS#8 PEM private key.
    ///
    /// # Errors
    /// Returns an error if the PEM data is not a P-256 private key.
    pub fn from_pkcs8_pem(kid: impl Into<String>, private_pem: &str) -> Result<Self, JwsError> {
        let secret_key = SecretKey::from_pkcs8_pem(private_pem)
            .map_err(|e| JwsError::invalid_key(e.to_string()))?;
        Ok(Self::from_secret_key(kid, secret_key))
    }

    /// Returns the key ID.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Returns the secret key.
    #[must_use]
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// Exports the public key as a JWK (`use=enc`, `alg=ECDH-ES`).
    #[must_use]
    pub fn to_jwk(&self) -> JsonWebKey {
        JsonWebKey::from_p256(&self.secret_key.public_key(), &self.kid, "enc", "ECDH-ES")
    }

    /// Exports the key pair as a private JWK including `d`.
    #[must_use]
    pub fn to_private_jwk(&self) -> JsonWebKey {
        let mut jwk = self.to_jwk();
        jwk.extra.insert(
            "d".to_string(),
            serde_json::Value::String(URL_SAFE_NO_PAD.encode(self.secret_key.to_bytes())),
        );
        jwk
    }
}

impl fmt::Debug for EncryptionKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKeyPair")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_key_jwk_export() {
        let key = SigningKeyPair::generate().unwrap();
        let jwk = key.to_jwk();

        assert_eq!(jwk.kty, "EC");
        assert_eq!(jwk.kid(), Some(key.kid()));
        assert_eq!(jwk.use_.as_deref(), Some("sig"));
        assert_eq!(jwk.alg.as_deref(), Some("ES256"));
        assert_eq!(jwk.crv.as_deref(), Some("P-256"));
        assert_eq!(jwk.to_p256_public_key(), Some(key.public_key()));
    }

    #[test]
    fn test_signing_key_from_pem() {
        let secret = SecretKey::random(&mut OsRng);
        let pem = secret.to_pkcs8_pem(LineEnding::LF).unwrap();

        let key = SigningKeyPair::from_pkcs8_pem("rp-sig", &pem).unwrap();
        assert_eq!(key.kid(), "rp-sig");
        assert_eq!(key.public_key(), secret.public_key());

        assert!(SigningKeyPair::from_pkcs8_pem("rp-sig", "not a pem").is_err());
    }

    #[test]
    fn test_encryption_key_private_jwk_roundtrip() {
        let key = EncryptionKeyPair::generate();
        let jwk = key.to_private_jwk();

        assert_eq!(jwk.use_.as_deref(), Some("enc"));
        assert_eq!(jwk.alg.as_deref(), Some("ECDH-ES"));

        let json = serde_json::to_string(&jwk).unwrap();
        assert!(json.contains("\"d\""));
        let parsed: JsonWebKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.to_p256_secret_key().unwrap(), *key.secret_key());

        // public export never carries the private scalar
        assert!(key.to_jwk().to_p256_secret_key().is_none());
    }

    #[test]
    fn test_jwk_unknown_members_preserved() {
        let json = r#"{"kty":"RSA","kid":"r1","n":"AQAB","e":"AQAB","x5c":["MIIB"]}"#;
        let jwk: JsonWebKey = serde_json::from_str(json).unwrap();

        assert!(!jwk.is_p256());
        assert!(jwk.p256_point().is_none());
        assert_eq!(jwk.extra.len(), 3);

        let back: serde_json::Value = serde_json::to_value(&jwk).unwrap();
        assert_eq!(back["x5c"][0], "MIIB");
    }

    #[test]
    fn test_malformed_coordinates_rejected() {
        let mut jwk = SigningKeyPair::generate().unwrap().to_jwk();
        jwk.x = Some(URL_SAFE_NO_PAD.encode([1u8; 31]));
        assert!(jwk.p256_point().is_none());
        assert!(jwk.to_p256_public_key().is_none());
    }

    #[test]
    fn test_jwk_set_comparison_ignores_order() {
        let a = SigningKeyPair::generate().unwrap().to_jwk();
        let b = SigningKeyPair::generate().unwrap().to_jwk();

        let left = JwkSet::new(vec![a.clone(), b.clone()]);
        let right = JwkSet::new(vec![b.clone(), a.clone()]);
        assert!(left.same_keys(&right));
        assert!(!left.same_keys(&JwkSet::new(vec![a.clone()])));

        let mut merged = JwkSet::new(vec![a.clone()]);
        merged.merge(right);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.find(b.kid().unwrap()), Some(&b));
    }

    #[test]
    fn test_jwk_set_missing_keys_defaults_empty() {
        let set: JwkSet = serde_json::from_str("{}").unwrap();
        assert!(set.is_empty());
    }
}
