//! Compact JWS parsing, ES256 signing and verification.
//!
//! Every federation document and the inner ID token are compact JWS
//! (`header.payload.signature`, base64url segments). Only ES256 is accepted.
//!
//! Parsing and verification are separate steps: a [`CompactJws`] can be
//! inspected (header, payload) before any key is known, and [`verify`] answers
//! whether one of a set of trusted keys produced the signature.

use std::fmt;
use std::str::FromStr;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, Header};
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};

use super::jwk::{JwkSet, SigningKeyPair};
use super::JwsError;

/// The only accepted signature algorithm.
pub const ES256: &str = "ES256";

/// Protected header of a compact JWS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsHeader {
    /// Signature algorithm.
    pub alg: String,

    /// Key ID of the signing key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Media type of the complete JWS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

/// A parsed compact JWS.
///
/// The payload and signature are decoded lazily; only the header is decoded
/// on parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactJws {
    raw: String,
    header: JwsHeader,
    /// Byte offset of the first `.`
    header_end: usize,
    /// Byte offset of the second `.`
    payload_end: usize,
}

impl CompactJws {
    /// Parses a compact JWS.
    ///
    /// # Errors
    ///
    /// Returns `JwsError::Malformed` unless the input has exactly three
    /// segments and a JSON header with an `alg` member.
    pub fn parse(raw: &str) -> Result<Self, JwsError> {
        let raw = raw.trim();
        let mut dots = raw.match_indices('.').map(|(i, _)| i);
        let (Some(header_end), Some(payload_end), None) = (dots.next(), dots.next(), dots.next())
        else {
            return Err(JwsError::malformed("expected three segments"));
        };

        let header_bytes = URL_SAFE_NO_PAD
            .decode(&raw[..header_end])
            .map_err(|e| JwsError::malformed(format!("header is not base64url: {e}")))?;
        let header: JwsHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| JwsError::malformed(format!("invalid header: {e}")))?;

        Ok(Self {
            raw: raw.to_string(),
            header,
            header_end,
            payload_end,
        })
    }

    /// Signs `claims` with ES256.
    ///
    /// The header carries `typ` and the key's `kid`.
    ///
    /// # Errors
    ///
    /// Returns `JwsError::Signing` if encoding fails.
    pub fn sign<T: Serialize>(
        claims: &T,
        typ: &str,
        key: &SigningKeyPair,
    ) -> Result<Self, JwsError> {
        let mut header = Header::new(Algorithm::ES256);
        header.typ = Some(typ.to_string());
        header.kid = Some(key.kid().to_string());

        let token = jsonwebtoken::encode(&header, claims, key.encoding_key())
            .map_err(|e| JwsError::Signing(e.to_string()))?;

        Self::parse(&token)
    }

    /// Returns the decoded header.
    #[must_use]
    pub fn header(&self) -> &JwsHeader {
        &self.header
    }

    /// Returns the serialized form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns `header.payload`, the input the signature is computed over.
    #[must_use]
    pub fn signing_input(&self) -> &str {
        &self.raw[..self.payload_end]
    }

    /// Returns the base64url payload segment.
    #[must_use]
    pub fn payload_segment(&self) -> &str {
        &self.raw[self.header_end + 1..self.payload_end]
    }

    /// Returns the base64url signature segment.
    #[must_use]
    pub fn signature_segment(&self) -> &str {
        &self.raw[self.payload_end + 1..]
    }

    /// Decodes the payload.
    ///
    /// # Errors
    ///
    /// Returns `JwsError::Malformed` if the payload is not base64url.
    pub fn payload(&self) -> Result<Vec<u8>, JwsError> {
        URL_SAFE_NO_PAD
            .decode(self.payload_segment())
            .map_err(|e| JwsError::malformed(format!("payload is not base64url: {e}")))
    }

    /// Decodes the payload as JSON.
    ///
    /// # Errors
    ///
    /// Returns `JwsError::InvalidPayload` if the payload is not valid JSON for `T`.
    pub fn claims<T: serde::de::DeserializeOwned>(&self) -> Result<T, JwsError> {
        let payload = self.payload()?;
        serde_json::from_slice(&payload).map_err(JwsError::InvalidPayload)
    }

    /// Consumes the JWS and returns the serialized form.
    #[must_use]
    pub fn into_string(self) -> String {
        self.raw
    }
}

impl fmt::Display for CompactJws {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for CompactJws {
    type Err = JwsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Checks whether one of `trusted_keys` produced the signature of `jws`.
///
/// Keys are selected by the header's `kid`; without a `kid` every P-256 key
/// in the set is tried. An empty key set, an undecodable signature or no
/// matching key yields `Ok(false)`.
///
/// # Errors
///
/// Returns `JwsError::UnsupportedAlgorithm` if the header algorithm is not ES256.
pub fn verify(trusted_keys: &JwkSet, jws: &CompactJws) -> Result<bool, JwsError> {
    if trusted_keys.is_empty() {
        tracing::debug!("No trusted keys, rejecting signature");
        return Ok(false);
    }

    if jws.header().alg != ES256 {
        return Err(JwsError::UnsupportedAlgorithm(jws.header().alg.clone()));
    }

    let Some(signature) = URL_SAFE_NO_PAD
        .decode(jws.signature_segment())
        .ok()
        .and_then(|bytes| Signature::from_slice(&bytes).ok())
    else {
        tracing::debug!("Signature segment is not a P-256 signature");
        return Ok(false);
    };

    let kid = jws.header().kid.as_deref();
    let verified = trusted_keys
        .keys
        .iter()
        .filter(|key| kid.is_none() || key.kid() == kid)
        .filter_map(|key| key.p256_point())
        .filter_map(|point| VerifyingKey::from_sec1_bytes(&point).ok())
        .any(|key| key.verify(jws.signing_input().as_bytes(), &signature).is_ok());

    if !verified {
        tracing::debug!("No trusted key verifies signature (kid: {:?})", kid);
    }

    Ok(verified)
}

/// Like [`verify`], treating an absent JWS as unverified.
///
/// # Errors
///
/// Returns `JwsError::UnsupportedAlgorithm` if the header algorithm is not ES256.
pub fn verify_optional(trusted_keys: &JwkSet, jws: Option<&CompactJws>) -> Result<bool, JwsError> {
    match jws {
        Some(jws) => verify(trusted_keys, jws),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn signed(key: &SigningKeyPair) -> CompactJws {
        CompactJws::sign(
            &json!({"iss": "https://fedmaster.example.com", "exp": 2_000_000_000}),
            "entity-statement+jwt",
            key,
        )
        .unwrap()
    }

    fn with_signature(jws: &CompactJws, signature: &str) -> CompactJws {
        CompactJws::parse(&format!("{}.{}", jws.signing_input(), signature)).unwrap()
    }

    #[test]
    fn test_sign_sets_header() {
        let key = SigningKeyPair::generate().unwrap();
        let jws = signed(&key);

        assert_eq!(jws.header().alg, "ES256");
        assert_eq!(jws.header().typ.as_deref(), Some("entity-statement+jwt"));
        assert_eq!(jws.header().kid.as_deref(), Some(key.kid()));

        let claims: serde_json::Value = jws.claims().unwrap();
        assert_eq!(claims["iss"], "https://fedmaster.example.com");
    }

    #[test]
    fn test_verify_with_own_key() {
        let key = SigningKeyPair::generate().unwrap();
        let jws = signed(&key);
        assert!(verify(&key.to_jwk_set(), &jws).unwrap());
    }

    #[test]
    fn test_verify_with_unrelated_key() {
        let key = SigningKeyPair::generate().unwrap();
        let other = SigningKeyPair::generate().unwrap();
        let jws = signed(&key);

        assert!(!verify(&other.to_jwk_set(), &jws).unwrap());

        // same kid, different key material
        let mut impostor = other.to_jwk();
        impostor.kid = Some(key.kid().to_string());
        assert!(!verify(&JwkSet::new(vec![impostor]), &jws).unwrap());
    }

    #[test]
    fn test_verify_without_kid_tries_all_keys() {
        use p256::ecdsa::SigningKey;
        use p256::ecdsa::signature::Signer;

        let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
        let key = SigningKeyPair::from_secret_key("signer", secret.clone()).unwrap();
        let other = SigningKeyPair::generate().unwrap();

        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"ES256","typ":"entity-statement+jwt"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"https://idp-tk.example.com"}"#);
        let input = format!("{header}.{payload}");
        let signature: Signature = SigningKey::from(&secret).sign(input.as_bytes());
        let jws =
            CompactJws::parse(&format!("{input}.{}", URL_SAFE_NO_PAD.encode(signature.to_bytes())))
                .unwrap();
        assert!(jws.header().kid.is_none());

        let keys = JwkSet::new(vec![other.to_jwk(), key.to_jwk()]);
        assert!(verify(&keys, &jws).unwrap());
        assert!(!verify(&other.to_jwk_set(), &jws).unwrap());
    }

    #[test]
    fn test_verify_empty_key_set() {
        let key = SigningKeyPair::generate().unwrap();
        assert!(!verify(&JwkSet::default(), &signed(&key)).unwrap());
        assert!(!verify_optional(&key.to_jwk_set(), None).unwrap());
    }

    #[test]
    fn test_tampered_signature_is_rejected() {
        let key = SigningKeyPair::generate().unwrap();
        let jws = signed(&key);

        let mut bytes = URL_SAFE_NO_PAD.decode(jws.signature_segment()).unwrap();
        bytes[10] ^= 0x01;
        let tampered = with_signature(&jws, &URL_SAFE_NO_PAD.encode(bytes));

        assert!(!verify(&key.to_jwk_set(), &tampered).unwrap());
    }

    #[test]
    fn test_garbage_signature_is_rejected() {
        let key = SigningKeyPair::generate().unwrap();
        let jws = signed(&key);

        for garbage in ["", "garbage", "!!!not-base64!!!", "AAAA"] {
            let forged = with_signature(&jws, garbage);
            assert!(!verify(&key.to_jwk_set(), &forged).unwrap(), "{garbage}");
        }
    }

    #[test]
    fn test_unsupported_algorithm() {
        let key = SigningKeyPair::generate().unwrap();
        let jws = signed(&key);
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","kid":"k"}"#);
        let rs256 = CompactJws::parse(&format!(
            "{}.{}.{}",
            header,
            jws.payload_segment(),
            jws.signature_segment()
        ))
        .unwrap();

        let err = verify(&key.to_jwk_set(), &rs256).unwrap_err();
        assert!(matches!(err, JwsError::UnsupportedAlgorithm(ref alg) if alg == "RS256"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(CompactJws::parse("only.two").is_err());
        assert!(CompactJws::parse("a.b.c.d").is_err());
        assert!(CompactJws::parse("!!.b.c").is_err());

        // header without alg
        let header = URL_SAFE_NO_PAD.encode(br#"{"typ":"JWT"}"#);
        assert!(CompactJws::parse(&format!("{header}.e30.sig")).is_err());
    }

    #[test]
    fn test_segments() {
        let key = SigningKeyPair::generate().unwrap();
        let jws = signed(&key);
        let parts: Vec<&str> = jws.as_str().split('.').collect();

        assert_eq!(jws.payload_segment(), parts[1]);
        assert_eq!(jws.signature_segment(), parts[2]);
        assert_eq!(jws.signing_input(), format!("{}.{}", parts[0], parts[1]));
        assert_eq!(jws.to_string().parse::<CompactJws>().unwrap(), jws);
    }
}
