//! The group secret and its on-disk storage.
//!
//! The seed lives in a single base64 text file inside the data directory,
//! readable only by the owner on unix. Its presence is what makes this
//! installation a member of a sync group.

use std::fs;
use std::io;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of a sync seed in bytes.
pub const SEED_LEN: usize = 32;

const SEED_FILE: &str = "sync_seed";

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Sync seed must be 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("Sync seed is not valid base64: {0}")]
    InvalidEncoding(String),

    #[error("Seed storage error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Fixed-length group secret.
#[derive(Clone, PartialEq, Eq)]
pub struct SyncSeed([u8; SEED_LEN]);

impl SyncSeed {
    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self, SeedError> {
        let bytes = STANDARD
            .decode(s.trim())
            .map_err(|e| SeedError::InvalidEncoding(e.to_string()))?;
        Self::try_from(bytes.as_slice())
    }

    /// Public handle of the group: `bs58check(sha256(seed)[0..16])`.
    ///
    /// Routes the relay connection without revealing the seed.
    pub fn fingerprint(&self) -> String {
        let hash = Sha256::digest(self.0);
        bs58::encode(&hash[..16]).with_check().into_string()
    }
}

impl TryFrom<&[u8]> for SyncSeed {
    type Error = SeedError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let seed: [u8; SEED_LEN] = bytes
            .try_into()
            .map_err(|_| SeedError::InvalidLength(bytes.len()))?;
        Ok(Self(seed))
    }
}

impl std::fmt::Debug for SyncSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SyncSeed(<redacted>)")
    }
}

// On the wire the seed is a plain array of byte values.
impl Serialize for SyncSeed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_slice().serialize(serializer)
    }
}

/// File-backed seed storage.
#[derive(Clone, Debug)]
pub struct SeedStorage {
    data_dir: PathBuf,
}

impl SeedStorage {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(SEED_FILE)
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Returns `Ok(None)` if no seed has been stored.
    pub fn load(&self) -> Result<Option<SyncSeed>, SeedError> {
        let path = self.path();
        match fs::read_to_string(&path) {
            Ok(content) => SyncSeed::from_base64(&content).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SeedError::Io { path, source }),
        }
    }

    pub fn save(&self, seed: &SyncSeed) -> Result<(), SeedError> {
        fs::create_dir_all(&self.data_dir).map_err(|source| SeedError::Io {
            path: self.data_dir.clone(),
            source,
        })?;

        let path = self.path();
        write_private(&path, seed.to_base64().as_bytes())
            .map_err(|source| SeedError::Io { path, source })
    }

    /// Removes the seed. Succeeds if there was none.
    pub fn clear(&self) -> Result<(), SeedError> {
        let path = self.path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SeedError::Io { path, source }),
        }
    }
}

#[cfg(unix)]
fn write_private(path: &std::path::Path, contents: &[u8]) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &std::path::Path, contents: &[u8]) -> io::Result<()> {
    fs::write(path, contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_seed() -> SyncSeed {
        let bytes: Vec<u8> = (0..32).collect();
        SyncSeed::try_from(bytes.as_slice()).unwrap()
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(matches!(
            SyncSeed::try_from(&[1u8, 2, 3][..]),
            Err(SeedError::InvalidLength(3))
        ));
    }

    #[test]
    fn test_debug_is_redacted() {
        let debug = format!("{:?}", sample_seed());
        assert_eq!(debug, "SyncSeed(<redacted>)");
    }

    #[test]
    fn test_fingerprint_is_stable_and_distinct() {
        let seed = sample_seed();
        assert_eq!(seed.fingerprint(), sample_seed().fingerprint());

        let other = SyncSeed::try_from(&[9u8; SEED_LEN][..]).unwrap();
        assert_ne!(seed.fingerprint(), other.fingerprint());
        assert!(bs58::decode(seed.fingerprint()).with_check(None).into_vec().is_ok());
    }

    #[test]
    fn test_serializes_as_byte_array() {
        let json = serde_json::to_value(sample_seed()).unwrap();
        assert_eq!(json.as_array().unwrap().len(), SEED_LEN);
        assert_eq!(json[31], 31);
    }

    #[test]
    fn test_storage_save_load_clear() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SeedStorage::new(temp_dir.path().join("data"));

        assert!(storage.load().unwrap().is_none());
        storage.save(&sample_seed()).unwrap();
        assert!(storage.exists());
        assert_eq!(storage.load().unwrap(), Some(sample_seed()));

        storage.clear().unwrap();
        assert!(storage.load().unwrap().is_none());
        // Clearing twice is fine
        storage.clear().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_seed_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let storage = SeedStorage::new(temp_dir.path().to_path_buf());
        storage.save(&sample_seed()).unwrap();

        let mode = fs::metadata(storage.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SeedStorage::new(temp_dir.path().to_path_buf());
        fs::write(storage.path(), "not base64 !!").unwrap();

        assert!(matches!(storage.load(), Err(SeedError::InvalidEncoding(_))));
    }
}
