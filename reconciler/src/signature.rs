//! Webhook signature verification
//!
//! Each provider signs its deliveries differently; a [`SignatureScheme`]
//! names the recipe and [`verify`] checks a raw body against the header
//! value. All comparisons are constant-time: HMAC schemes go through
//! `Mac::verify_slice`, digest schemes through `subtle::ConstantTimeEq`.

use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// How a provider signs its webhook deliveries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureScheme {
    /// HMAC-SHA256 of the raw body, hex-encoded
    HmacSha256Hex,

    /// HMAC-SHA256 of the raw body, base64-encoded
    HmacSha256Base64,

    /// HMAC-SHA512 of the raw body, hex-encoded
    HmacSha512Hex,

    /// SHA-512 over body concatenated with the shared secret, hex-encoded.
    /// Legacy scheme still used by some aggregators.
    BodySecretSha512Hex,
}

/// Verify a webhook body against its signature header
pub fn verify(
    scheme: SignatureScheme,
    provider: &str,
    secret: &str,
    body: &[u8],
    header_value: &str,
) -> Result<()> {
    let ok = match scheme {
        SignatureScheme::HmacSha256Hex => {
            let sig = decode_hex(provider, header_value)?;
            verify_hmac_sha256(secret, body, &sig)
        }
        SignatureScheme::HmacSha256Base64 => {
            let sig = BASE64
                .decode(header_value)
                .map_err(|_| Error::InvalidSignature(provider.to_string()))?;
            verify_hmac_sha256(secret, body, &sig)
        }
        SignatureScheme::HmacSha512Hex => {
            let sig = decode_hex(provider, header_value)?;
            let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
                .map_err(|e| Error::Other(format!("HMAC init failed: {}", e)))?;
            mac.update(body);
            mac.verify_slice(&sig).is_ok()
        }
        SignatureScheme::BodySecretSha512Hex => {
            let sig = decode_hex(provider, header_value)?;
            let mut hasher = Sha512::new();
            hasher.update(body);
            hasher.update(secret.as_bytes());
            let digest = hasher.finalize();
            digest.as_slice().ct_eq(&sig).into()
        }
    };

    if ok {
        Ok(())
    } else {
        Err(Error::InvalidSignature(provider.to_string()))
    }
}

fn verify_hmac_sha256(secret: &str, body: &[u8], sig: &[u8]) -> bool {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(sig).is_ok()
}

fn decode_hex(provider: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value).map_err(|_| Error::InvalidSignature(provider.to_string()))
}

/// Sign a body under a scheme (test fixtures, outbound callbacks)
pub fn sign(scheme: SignatureScheme, secret: &str, body: &[u8]) -> Result<String> {
    Ok(match scheme {
        SignatureScheme::HmacSha256Hex => hex::encode(hmac_sha256(secret, body)?),
        SignatureScheme::HmacSha256Base64 => BASE64.encode(hmac_sha256(secret, body)?),
        SignatureScheme::HmacSha512Hex => {
            let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
                .map_err(|e| Error::Other(format!("HMAC init failed: {}", e)))?;
            mac.update(body);
            hex::encode(mac.finalize().into_bytes())
        }
        SignatureScheme::BodySecretSha512Hex => {
            let mut hasher = Sha512::new();
            hasher.update(body);
            hasher.update(secret.as_bytes());
            hex::encode(hasher.finalize())
        }
    })
}

fn hmac_sha256(secret: &str, body: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Other(format!("HMAC init failed: {}", e)))?;
    mac.update(body);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const BODY: &[u8] = br#"{"event":"charge.success","data":{"reference":"ref-1"}}"#;

    #[test]
    fn test_roundtrip_all_schemes() {
        for scheme in [
            SignatureScheme::HmacSha256Hex,
            SignatureScheme::HmacSha256Base64,
            SignatureScheme::HmacSha512Hex,
            SignatureScheme::BodySecretSha512Hex,
        ] {
            let sig = sign(scheme, SECRET, BODY).unwrap();
            verify(scheme, "paygate", SECRET, BODY, &sig).unwrap();
        }
    }

    #[test]
    fn test_tampered_body_rejected() {
        let sig = sign(SignatureScheme::HmacSha512Hex, SECRET, BODY).unwrap();
        let result = verify(
            SignatureScheme::HmacSha512Hex,
            "paygate",
            SECRET,
            br#"{"event":"charge.success","data":{"reference":"ref-2"}}"#,
            &sig,
        );
        assert!(matches!(result, Err(Error::InvalidSignature(_))));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let sig = sign(SignatureScheme::HmacSha256Hex, SECRET, BODY).unwrap();
        let result = verify(SignatureScheme::HmacSha256Hex, "paygate", "other", BODY, &sig);
        assert!(matches!(result, Err(Error::InvalidSignature(_))));
    }

    #[test]
    fn test_garbage_header_rejected() {
        let result = verify(
            SignatureScheme::HmacSha256Hex,
            "paygate",
            SECRET,
            BODY,
            "not-hex!!",
        );
        assert!(matches!(result, Err(Error::InvalidSignature(_))));
    }
}
