//! RSA signing keypair, loaded once at start-up.

use std::path::Path;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

/// Errors raised while loading key material. All of them are fatal at start-up.
#[derive(Debug, Error)]
pub enum KeyError {
    /// A key file could not be read.
    #[error("failed to read key file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A key file is not a valid RSA PEM.
    #[error("invalid {which} key: {source}")]
    Pem {
        which: &'static str,
        #[source]
        source: jsonwebtoken::errors::Error,
    },

    /// The public key does not verify signatures made by the private key.
    #[error("private and public keys do not form a pair")]
    Mismatch,
}

#[derive(Serialize, Deserialize)]
struct Probe {
    exp: i64,
}

/// Holds the RS256 keypair used for every access and refresh token.
#[derive(Clone)]
pub struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeys")
            .field("encoding", &"[hidden]")
            .field("decoding", &"[hidden]")
            .finish()
    }
}

fn read_key(path: &Path) -> Result<Zeroizing<Vec<u8>>, KeyError> {
    std::fs::read(path)
        .map(Zeroizing::new)
        .map_err(|source| KeyError::Read {
            path: path.display().to_string(),
            source,
        })
}

impl SigningKeys {
    /// Reads both PEM files and checks that they belong together.
    pub fn load(private_key_path: &Path, public_key_path: &Path) -> Result<Self, KeyError> {
        let private_pem = read_key(private_key_path)?;
        let public_pem = read_key(public_key_path)?;
        Self::from_pem(&private_pem, &public_pem)
    }

    /// Builds the keypair from PEM bytes.
    pub fn from_pem(private_pem: &[u8], public_pem: &[u8]) -> Result<Self, KeyError> {
        let encoding = EncodingKey::from_rsa_pem(private_pem).map_err(|source| KeyError::Pem {
            which: "private",
            source,
        })?;
        let decoding = DecodingKey::from_rsa_pem(public_pem).map_err(|source| KeyError::Pem {
            which: "public",
            source,
        })?;

        let keys = Self { encoding, decoding };
        keys.probe()?;
        Ok(keys)
    }

    fn probe(&self) -> Result<(), KeyError> {
        let probe = Probe {
            exp: chrono::Utc::now().timestamp() + 60,
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &probe, &self.encoding)
            .map_err(|source| KeyError::Pem {
                which: "private",
                source,
            })?;
        jsonwebtoken::decode::<Probe>(&token, &self.decoding, &Validation::new(Algorithm::RS256))
            .map(|_| ())
            .map_err(|_| KeyError::Mismatch)
    }

    pub(crate) fn encoding(&self) -> &EncodingKey {
        &self.encoding
    }

    pub(crate) fn decoding(&self) -> &DecodingKey {
        &self.decoding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE: &[u8] = include_bytes!("../../tests/fixtures/jwt_private.pem");
    const PUBLIC: &[u8] = include_bytes!("../../tests/fixtures/jwt_public.pem");
    const OTHER_PRIVATE: &[u8] = include_bytes!("../../tests/fixtures/other_private.pem");

    #[test]
    fn loads_matching_pair() {
        assert!(SigningKeys::from_pem(PRIVATE, PUBLIC).is_ok());
    }

    #[test]
    fn rejects_mismatched_pair() {
        let err = SigningKeys::from_pem(OTHER_PRIVATE, PUBLIC).unwrap_err();
        assert!(matches!(err, KeyError::Mismatch));
    }

    #[test]
    fn rejects_garbage_pem() {
        let err = SigningKeys::from_pem(b"not a key", PUBLIC).unwrap_err();
        assert!(matches!(err, KeyError::Pem { which: "private", .. }));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = SigningKeys::load(
            Path::new("/nonexistent/jwt_private.pem"),
            Path::new("/nonexistent/jwt_public.pem"),
        )
        .unwrap_err();
        assert!(matches!(err, KeyError::Read { .. }));
    }

    #[test]
    fn debug_hides_key_material() {
        let keys = SigningKeys::from_pem(PRIVATE, PUBLIC).unwrap();
        assert!(format!("{:?}", keys).contains("[hidden]"));
    }
}
