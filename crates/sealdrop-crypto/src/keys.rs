//! X25519 key pairs and key persistence.
//!
//! The receiver owns a long-lived [`KeyPair`]; its public half is handed to
//! senders out of band. [`FileKeyProvider`] stores each half as hex text in
//! its own file, with the private file restricted to the owner on Unix.

use crate::{CryptoError, X25519_KEY_SIZE};
use rand_core::OsRng;
use std::fs;
use std::io::Write;
use std::path::Path;
use x25519_dalek::StaticSecret;
use zeroize::Zeroize;

/// X25519 public key used to wrap session keys.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(x25519_dalek::PublicKey);

impl PublicKey {
    /// Create from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; X25519_KEY_SIZE]) -> Self {
        Self(x25519_dalek::PublicKey::from(bytes))
    }

    /// Raw key bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; X25519_KEY_SIZE] {
        self.0.to_bytes()
    }

    /// Lowercase hex encoding.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    /// Parse from hex text.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` if the decoded key is not 32 bytes,
    /// or `CryptoError::InvalidKeyFile` if the text is not hex.
    pub fn from_hex(text: &str) -> Result<Self, CryptoError> {
        decode_key_hex(text, "<inline>").map(Self::from_bytes)
    }

    pub(crate) fn as_dalek(&self) -> &x25519_dalek::PublicKey {
        &self.0
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

/// X25519 private key used to unwrap session keys. Zeroized on drop.
#[derive(Clone)]
pub struct PrivateKey(StaticSecret);

impl PrivateKey {
    /// Generate a new random private key.
    #[must_use]
    pub fn generate() -> Self {
        Self(StaticSecret::random_from_rng(OsRng))
    }

    /// Create from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; X25519_KEY_SIZE]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Raw key bytes.
    ///
    /// # Security
    ///
    /// Exposes the raw key material; zeroize the copy when done.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; X25519_KEY_SIZE] {
        self.0.to_bytes()
    }

    /// Derive the matching public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey(x25519_dalek::PublicKey::from(&self.0))
    }

    pub(crate) fn as_dalek(&self) -> &StaticSecret {
        &self.0
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

/// Asymmetric key pair. Immutable once created.
#[derive(Clone, Debug)]
pub struct KeyPair {
    /// The private half; stays with the receiver.
    pub private: PrivateKey,
    /// The public half; distributed to senders.
    pub public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_private(PrivateKey::generate())
    }

    /// Build the pair around an existing private key.
    #[must_use]
    pub fn from_private(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { private, public }
    }
}

/// Source of key material for both endpoints.
///
/// The sender only needs [`KeyProvider::load_public_key`]; the receiver only
/// needs [`KeyProvider::load_private_key`].
pub trait KeyProvider {
    /// Load the receiver's public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be found or decoded.
    fn load_public_key(&self) -> Result<PublicKey, CryptoError>;

    /// Load the local private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be found or decoded.
    fn load_private_key(&self) -> Result<PrivateKey, CryptoError>;

    /// Generate a new key pair and make it available to later loads.
    ///
    /// # Errors
    ///
    /// Returns an error if the new pair cannot be stored.
    fn generate_key_pair(&self) -> Result<KeyPair, CryptoError>;
}

/// [`KeyProvider`] backed by two hex-encoded key files.
#[derive(Debug, Clone)]
pub struct FileKeyProvider {
    public_path: std::path::PathBuf,
    private_path: std::path::PathBuf,
}

impl FileKeyProvider {
    /// Create a provider for the given public and private key files.
    pub fn new(public_path: impl AsRef<Path>, private_path: impl AsRef<Path>) -> Self {
        Self {
            public_path: public_path.as_ref().to_path_buf(),
            private_path: private_path.as_ref().to_path_buf(),
        }
    }

    /// Path of the public key file.
    #[must_use]
    pub fn public_path(&self) -> &Path {
        &self.public_path
    }

    /// Path of the private key file.
    #[must_use]
    pub fn private_path(&self) -> &Path {
        &self.private_path
    }
}

fn decode_key_hex(text: &str, origin: &str) -> Result<[u8; X25519_KEY_SIZE], CryptoError> {
    let mut raw = hex::decode(text.trim()).map_err(|e| CryptoError::InvalidKeyFile {
        path: origin.to_string(),
        reason: e.to_string(),
    })?;
    if raw.len() != X25519_KEY_SIZE {
        let actual = raw.len();
        raw.zeroize();
        return Err(CryptoError::InvalidKeyLength {
            expected: X25519_KEY_SIZE,
            actual,
        });
    }
    let mut bytes = [0u8; X25519_KEY_SIZE];
    bytes.copy_from_slice(&raw);
    raw.zeroize();
    Ok(bytes)
}

fn read_key_file(path: &Path) -> Result<[u8; X25519_KEY_SIZE], CryptoError> {
    let mut text = fs::read_to_string(path)?;
    let decoded = decode_key_hex(&text, &path.display().to_string());
    text.zeroize();
    decoded
}

/// Write `contents` to `path`, readable by the owner only on Unix.
///
/// A new file is created with mode 0o600; an existing one is restricted
/// before it is truncated, so the contents are never exposed.
fn write_owner_only(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    file.set_len(0)?;
    file.write_all(contents)?;
    file.sync_all()
}

impl KeyProvider for FileKeyProvider {
    fn load_public_key(&self) -> Result<PublicKey, CryptoError> {
        read_key_file(&self.public_path).map(PublicKey::from_bytes)
    }

    fn load_private_key(&self) -> Result<PrivateKey, CryptoError> {
        let mut bytes = read_key_file(&self.private_path)?;
        let key = PrivateKey::from_bytes(bytes);
        bytes.zeroize();
        Ok(key)
    }

    fn generate_key_pair(&self) -> Result<KeyPair, CryptoError> {
        let pair = KeyPair::generate();

        for path in [&self.public_path, &self.private_path] {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
        }

        let mut private_hex = hex::encode(pair.private.to_bytes());
        let written = write_owner_only(&self.private_path, private_hex.as_bytes());
        private_hex.zeroize();
        written?;

        fs::write(&self.public_path, pair.public.to_hex())?;

        tracing::info!(
            "Generated key pair: public={} private={}",
            self.public_path.display(),
            self.private_path.display()
        );

        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_public_key_matches_private() {
        let pair = KeyPair::generate();
        assert_eq!(pair.private.public_key(), pair.public);
    }

    #[test]
    fn test_distinct_pairs() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(a.public, b.public);
    }

    #[test]
    fn test_public_key_hex_roundtrip() {
        let pair = KeyPair::generate();
        let hex = pair.public.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(PublicKey::from_hex(&hex).unwrap(), pair.public);
    }

    #[test]
    fn test_public_key_from_hex_rejects_short() {
        assert!(matches!(
            PublicKey::from_hex("abcd"),
            Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 2
            })
        ));
        assert!(matches!(
            PublicKey::from_hex("not hex at all"),
            Err(CryptoError::InvalidKeyFile { .. })
        ));
    }

    #[test]
    fn test_private_key_debug_is_redacted() {
        let key = PrivateKey::generate();
        assert_eq!(format!("{key:?}"), "PrivateKey(..)");
    }

    #[test]
    fn test_file_provider_generate_then_load() {
        let dir = TempDir::new().unwrap();
        let provider = FileKeyProvider::new(
            dir.path().join("public.key"),
            dir.path().join("private.key"),
        );

        let pair = provider.generate_key_pair().unwrap();
        let public = provider.load_public_key().unwrap();
        let private = provider.load_private_key().unwrap();

        assert_eq!(public, pair.public);
        assert_eq!(private.to_bytes(), pair.private.to_bytes());
    }

    #[test]
    fn test_file_provider_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let provider = FileKeyProvider::new(
            dir.path().join("keys/public.key"),
            dir.path().join("keys/private.key"),
        );
        provider.generate_key_pair().unwrap();
        assert!(provider.public_path().exists());
        assert!(provider.private_path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_private_key_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let provider = FileKeyProvider::new(
            dir.path().join("public.key"),
            dir.path().join("private.key"),
        );
        provider.generate_key_pair().unwrap();

        let mode = fs::metadata(provider.private_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_regenerated_private_key_is_restricted() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let private_path = dir.path().join("private.key");
        fs::write(&private_path, "a much longer stale key file left by an older run").unwrap();
        fs::set_permissions(&private_path, fs::Permissions::from_mode(0o644)).unwrap();

        let provider = FileKeyProvider::new(dir.path().join("public.key"), &private_path);
        let pair = provider.generate_key_pair().unwrap();

        let mode = fs::metadata(&private_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(
            provider.load_private_key().unwrap().to_bytes(),
            pair.private.to_bytes()
        );
    }

    #[test]
    fn test_file_provider_tolerates_trailing_newline() {
        let dir = TempDir::new().unwrap();
        let pair = KeyPair::generate();
        let public_path = dir.path().join("public.key");
        fs::write(&public_path, format!("{}\n", pair.public.to_hex())).unwrap();

        let provider = FileKeyProvider::new(&public_path, dir.path().join("private.key"));
        assert_eq!(provider.load_public_key().unwrap(), pair.public);
    }

    #[test]
    fn test_file_provider_missing_file() {
        let dir = TempDir::new().unwrap();
        let provider = FileKeyProvider::new(
            dir.path().join("missing.pub"),
            dir.path().join("missing.key"),
        );
        assert!(matches!(provider.load_public_key(), Err(CryptoError::Io(_))));
        assert!(matches!(
            provider.load_private_key(),
            Err(CryptoError::Io(_))
        ));
    }

    #[test]
    fn test_file_provider_garbled_file() {
        let dir = TempDir::new().unwrap();
        let private_path = dir.path().join("private.key");
        fs::write(&private_path, "zz-not-a-key").unwrap();

        let provider = FileKeyProvider::new(dir.path().join("public.key"), &private_path);
        assert!(matches!(
            provider.load_private_key(),
            Err(CryptoError::InvalidKeyFile { .. })
        ));
    }
}
