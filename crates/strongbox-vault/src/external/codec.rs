//! Container encoding behind a trait, plus the credentials that open it.

use strongbox_crypto_core::container_format;
use strongbox_crypto_core::{composite_key, Argon2idParams, CryptoError, Passphrase, SecretBuffer};
use zeroize::Zeroizing;

use super::tree::Container;
use super::ExternalStoreError;

/// Password plus optional key file, as KeePass-family containers use.
#[derive(Clone)]
pub struct ContainerCredentials {
    pub(super) passphrase: Passphrase,
    pub(super) key_file: Option<Zeroizing<Vec<u8>>>,
}

impl ContainerCredentials {
    /// Password-only credentials.
    #[must_use]
    pub const fn new(passphrase: Passphrase) -> Self {
        Self {
            passphrase,
            key_file: None,
        }
    }

    /// Add the contents of a key file.
    #[must_use]
    pub fn with_key_file(mut self, contents: Vec<u8>) -> Self {
        self.key_file = Some(Zeroizing::new(contents));
        self
    }

    /// Fold password and key file into the composite key.
    ///
    /// # Errors
    ///
    /// Returns a [`CryptoError`] if secure memory cannot be allocated.
    pub fn composite_key(&self) -> Result<SecretBuffer, CryptoError> {
        composite_key(
            self.passphrase.expose(),
            self.key_file.as_ref().map(|k| k.as_slice()),
        )
    }
}

impl std::fmt::Debug for ContainerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerCredentials")
            .field("key_file", &self.key_file.is_some())
            .finish_non_exhaustive()
    }
}

/// Turns container bytes into a tree and back.
///
/// Implementations must keep every field they do not understand, so that
/// a decode followed by an encode changes nothing but the applied edits.
pub trait ContainerCodec: Send + Sync {
    /// Decode `bytes`.
    ///
    /// # Errors
    ///
    /// [`ExternalStoreError::WrongPassword`] for bad credentials,
    /// [`ExternalStoreError::CorruptContainer`] for anything unreadable.
    fn decode(
        &self,
        bytes: &[u8],
        credentials: &ContainerCredentials,
    ) -> Result<Container, ExternalStoreError>;

    /// Encode `container`.
    ///
    /// # Errors
    ///
    /// [`ExternalStoreError::Encode`] if the container cannot be written.
    fn encode(
        &self,
        container: &Container,
        credentials: &ContainerCredentials,
    ) -> Result<Vec<u8>, ExternalStoreError>;
}

/// JSON tree sealed with Argon2id and AES-256-GCM (see
/// [`container_format`]).
#[derive(Debug, Clone, Default)]
pub struct SealedContainerCodec {
    params: Argon2idParams,
}

impl SealedContainerCodec {
    /// Codec sealing new containers with `params`. Existing containers
    /// are opened with the parameters stored in their header.
    #[must_use]
    pub const fn with_params(params: Argon2idParams) -> Self {
        Self { params }
    }
}

impl ContainerCodec for SealedContainerCodec {
    fn decode(
        &self,
        bytes: &[u8],
        credentials: &ContainerCredentials,
    ) -> Result<Container, ExternalStoreError> {
        let key = credentials.composite_key()?;
        let payload = container_format::open(bytes, key.expose()).map_err(|e| match e {
            CryptoError::WrongPassword => ExternalStoreError::WrongPassword,
            other => ExternalStoreError::CorruptContainer(other.to_string()),
        })?;
        serde_json::from_slice(payload.expose())
            .map_err(|e| ExternalStoreError::CorruptContainer(format!("invalid tree: {e}")))
    }

    fn encode(
        &self,
        container: &Container,
        credentials: &ContainerCredentials,
    ) -> Result<Vec<u8>, ExternalStoreError> {
        let json = Zeroizing::new(
            serde_json::to_vec(container)
                .map_err(|e| ExternalStoreError::Encode(format!("tree serialization failed: {e}")))?,
        );
        let key = credentials.composite_key()?;
        container_format::seal(&json, key.expose(), &self.params)
            .map_err(|e| ExternalStoreError::Encode(e.to_string()))
    }
}
