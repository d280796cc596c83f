#![forbid(unsafe_code)]

//! Key types and data structures.

/// The underlying key data.
pub enum KeyData {
    Rsa {
        private: Option<rsa::RsaPrivateKey>,
        public: rsa::RsaPublicKey,
    },
}

impl std::fmt::Debug for KeyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rsa { private, .. } => {
                if private.is_some() {
                    write!(f, "RSA private+public key")
                } else {
                    write!(f, "RSA public key")
                }
            }
        }
    }
}

/// A key with its associated certificate chain.
///
/// The chain is ordered leaf-first; entry 0 is the signer certificate.
#[derive(Debug)]
pub struct Key {
    /// Optional name for diagnostics.
    pub name: Option<String>,
    /// The key data.
    pub data: KeyData,
    /// X.509 certificate chain (DER-encoded), leaf first.
    pub x509_chain: Vec<Vec<u8>>,
}

impl Key {
    /// Create a new key.
    pub fn new(data: KeyData) -> Self {
        Self {
            name: None,
            data,
            x509_chain: Vec::new(),
        }
    }

    /// Set the key name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append a DER-encoded certificate to the chain.
    pub fn with_cert(mut self, der: Vec<u8>) -> Self {
        self.x509_chain.push(der);
        self
    }

    /// The signer (leaf) certificate, if any.
    pub fn leaf_cert_der(&self) -> Option<&[u8]> {
        self.x509_chain.first().map(|v| v.as_slice())
    }

    /// Convert to a `SigningKey` for use with the crypto algorithms.
    pub fn to_signing_key(&self) -> sigtuna_crypto::sign::SigningKey {
        match &self.data {
            KeyData::Rsa {
                private: Some(pk), ..
            } => sigtuna_crypto::sign::SigningKey::Rsa(pk.clone()),
            KeyData::Rsa { public, .. } => {
                sigtuna_crypto::sign::SigningKey::RsaPublic(public.clone())
            }
        }
    }

    /// Whether this key can produce signatures.
    pub fn has_private(&self) -> bool {
        matches!(
            &self.data,
            KeyData::Rsa {
                private: Some(_),
                ..
            }
        )
    }
}
