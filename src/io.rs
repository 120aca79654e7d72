//! JSON snapshot helpers shared by the ledger, mirror and registry stores.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors raised while persisting or restoring a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistError {
    /// Underlying filesystem failure.
    #[error("snapshot I/O error: {0}")]
    Io(String),
    /// The snapshot could not be encoded or decoded.
    #[error("snapshot decode error: {0}")]
    Decode(String),
    /// The snapshot decoded but violates a store invariant.
    #[error("snapshot rejected: {0}")]
    Corrupt(String),
}

/// Writes `value` as pretty JSON to `path` through a temporary sibling file.
///
/// Readers never observe a half-written snapshot: the payload lands in
/// `<path>.tmp` first and is then renamed over the destination.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| PersistError::Io(err.to_string()))?;
        }
    }
    let encoded =
        serde_json::to_vec_pretty(value).map_err(|err| PersistError::Decode(err.to_string()))?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);
    fs::write(tmp, encoded).map_err(|err| PersistError::Io(err.to_string()))?;
    fs::rename(tmp, path).map_err(|err| PersistError::Io(err.to_string()))
}

/// Reads a JSON snapshot; a missing file yields `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path).map_err(|err| PersistError::Io(err.to_string()))?;
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|err| PersistError::Decode(err.to_string()))
}

#[cfg(test)]
pub(crate) fn scratch_path(label: &str) -> std::path::PathBuf {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("sealed_ballot_{label}_{nanos}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u64,
    }

    #[test]
    fn missing_file_reads_as_none() {
        let path = scratch_path("missing");
        let got: Option<Sample> = read_json(&path).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn write_then_read_preserves_value() {
        let path = scratch_path("roundtrip");
        let value = Sample {
            name: "alpha".into(),
            count: 7,
        };
        write_json_atomic(&path, &value).unwrap();
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        assert!(!Path::new(&tmp).exists());
        let got: Sample = read_json(&path).unwrap().unwrap();
        assert_eq!(got, value);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let path = scratch_path("garbage");
        fs::write(&path, b"{not json").unwrap();
        let err = read_json::<Sample>(&path).unwrap_err();
        assert!(matches!(err, PersistError::Decode(_)));
        fs::remove_file(&path).unwrap();
    }
}
