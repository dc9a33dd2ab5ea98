//! TLS credential loading
//!
//! The relay only reads the PEM blobs; handing them to the QUIC stack is the
//! transport adapter's job. Anything missing or unreadable is fatal.
//!
//! The leaf certificate is parsed once at load time to fingerprint its
//! public key. Browsers reach a self-signed WebTransport server only when
//! told to trust that fingerprint, so it is logged at startup.

use std::path::{Path, PathBuf};

use base64::Engine;
use sha2::{Digest, Sha256};
use x509_parser::pem::parse_x509_pem;

use crate::error::{Error, Result};

const PEM_MARKER: &[u8] = b"-----BEGIN";
const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// Certificate chain and private key, PEM encoded
#[derive(Clone)]
pub struct Credentials {
    cert_pem: Vec<u8>,
    key_pem: Vec<u8>,
    cert_path: PathBuf,
    key_path: PathBuf,
    spki_sha256: [u8; 32],
}

impl Credentials {
    /// Read both files, failing with [`Error::MissingCredential`]
    ///
    /// The certificate file must start its chain with a parseable X.509
    /// certificate.
    pub fn load(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self> {
        let cert_path = cert_path.as_ref().to_path_buf();
        let key_path = key_path.as_ref().to_path_buf();

        let cert_pem = read_pem(&cert_path)?;
        let key_pem = read_pem(&key_path)?;
        let spki_sha256 = spki_fingerprint(&cert_pem).map_err(|reason| Error::MissingCredential {
            path: cert_path.clone(),
            reason,
        })?;

        let credentials = Self {
            cert_pem,
            key_pem,
            cert_path,
            key_path,
            spki_sha256,
        };
        tracing::debug!(
            cert = %credentials.cert_path.display(),
            key = %credentials.key_path.display(),
            spki_hash = %credentials.spki_hash_hex(),
            "Loaded credentials"
        );
        Ok(credentials)
    }

    pub fn cert_pem(&self) -> &[u8] {
        &self.cert_pem
    }

    pub fn key_pem(&self) -> &[u8] {
        &self.key_pem
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// SHA-256 of the leaf certificate's DER SubjectPublicKeyInfo
    pub fn spki_sha256(&self) -> &[u8; 32] {
        &self.spki_sha256
    }

    pub fn spki_hash_hex(&self) -> String {
        hex::encode(self.spki_sha256)
    }

    /// Base64 form, as `--ignore-certificate-errors-spki-list` takes it
    pub fn spki_hash_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.spki_sha256)
    }
}

// Keeps the private key out of logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("cert_path", &self.cert_path)
            .field("key_path", &self.key_path)
            .field("spki_hash", &self.spki_hash_hex())
            .finish_non_exhaustive()
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    let data = std::fs::read(path).map_err(|e| Error::MissingCredential {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if !data.windows(PEM_MARKER.len()).any(|w| w == PEM_MARKER) {
        return Err(Error::MissingCredential {
            path: path.to_path_buf(),
            reason: "not a PEM file".into(),
        });
    }

    Ok(data)
}

/// Hash the public key of the first certificate in `pem`
fn spki_fingerprint(pem: &[u8]) -> std::result::Result<[u8; 32], String> {
    let (_, block) = parse_x509_pem(pem).map_err(|e| format!("invalid PEM: {e}"))?;
    if block.label != CERTIFICATE_LABEL {
        return Err(format!("expected a CERTIFICATE block, found {}", block.label));
    }

    let cert = block
        .parse_x509()
        .map_err(|e| format!("invalid certificate: {e}"))?;
    Ok(Sha256::digest(cert.public_key().raw).into())
}
