//! One JSON file per endpoint under a state directory

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::{PersistenceError, StateBackend};

const RECORD_EXT: &str = "json";
const TEMP_EXT: &str = "tmp";

/// Longest encoded key used verbatim as a file stem. Leaves room for the
/// temp-file dot prefix and extension within a 255-byte file name.
const MAX_STEM_LEN: usize = 200;

/// Bytes of the encoded key kept in front of the hash in a shortened stem
const HASHED_PREFIX_LEN: usize = 100;

/// File-per-key backend.
///
/// Writes go to a temporary sibling file that is synced and then renamed over
/// the record, so a crash leaves either the old or the new record in place.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Create the backend, creating the state directory if needed
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, PersistenceError> {
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", file_stem(key), RECORD_EXT))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!(".{}.{}", file_stem(key), TEMP_EXT))
    }
}

impl StateBackend for FileBackend {
    fn write(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError> {
        let temp = self.temp_path(key);

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&temp, self.key_path(key))?;
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        match std::fs::read(self.key_path(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        match std::fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn read_all(&self) -> Result<Vec<(String, Vec<u8>)>, PersistenceError> {
        let mut records = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();

            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            match std::fs::read(&path) {
                Ok(data) => records.push((path.display().to_string(), data)),
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Failed to read state file")
                }
            }
        }

        Ok(records)
    }

    fn sync(&self) -> Result<(), PersistenceError> {
        // Persist the directory entries created by renames
        File::open(&self.dir)?.sync_all()?;
        Ok(())
    }
}

/// File stem for a key.
///
/// Short keys are escaped in full so the files stay readable. Longer ones keep
/// an escaped prefix followed by `~` and the SHA-256 of the key; `~` never
/// appears in an escaped key, so the two forms cannot collide.
fn file_stem(key: &str) -> String {
    let encoded = encode_key(key);
    if encoded.len() <= MAX_STEM_LEN {
        return encoded;
    }

    // Escaped keys are ASCII, so any byte offset is a char boundary
    format!(
        "{}~{}",
        &encoded[..HASHED_PREFIX_LEN],
        hex::encode(Sha256::digest(key.as_bytes()))
    )
}

/// ASCII alphanumerics, `-` and `.` pass through, every other byte becomes `_XX`
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("_{:02X}", byte));
        }
    }
    encoded
}
