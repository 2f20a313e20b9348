//! Persistence of the patch table.
//!
//! The table is stored as four values in the `storage` namespace of a [SettingsStore]:
//!
//! | Key           | Type | Content                                          |
//! |---------------|------|--------------------------------------------------|
//! | `ACTIVE_LEDS` | u16  | number of driven LEDs                            |
//! | `NUM_UNIS`    | u16  | number of used slots                             |
//! | `DMXPATCH`    | blob | `MAX_UNIVERSES` u16, low byte first              |
//! | `OFFSETS`     | blob | `MAX_UNIVERSES + 1` u16, low byte first          |
//!
//! Writes are staged and only become visible after [SettingsStore::commit], so a reader never sees half of a save.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    definitions::MAX_UNIVERSES,
    patch_table::{OFFSETS_LEN, PatchTable},
};

/// Namespace all keys of the node live in
pub const NAMESPACE: &str = "storage";
/// Key of the active LED count
pub const KEY_ACTIVE_LEDS: &str = "ACTIVE_LEDS";
/// Key of the universe count
pub const KEY_NUM_UNIS: &str = "NUM_UNIS";
/// Key of the universe patch blob
pub const KEY_DMXPATCH: &str = "DMXPATCH";
/// Key of the offsets blob
pub const KEY_OFFSETS: &str = "OFFSETS";

/// A key value store with staged writes, e.g. a flash partition or a file.
pub trait SettingsStore {
    /// Reads a committed u16, `None` if the key doesn't exist.
    fn get_u16(&self, namespace: &str, key: &str) -> Result<Option<u16>, StoreError>;

    /// Reads a committed blob, `None` if the key doesn't exist.
    fn get_blob(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stages a u16.
    fn set_u16(&mut self, namespace: &str, key: &str, value: u16) -> Result<(), StoreError>;

    /// Stages a blob.
    fn set_blob(&mut self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Makes all staged values visible at once.
    fn commit(&mut self) -> Result<(), StoreError>;
}

/// A single stored value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredValue {
    /// Unsigned 16 bit integer
    U16(u16),
    /// Raw bytes
    Blob(Vec<u8>),
}

impl StoredValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::U16(_) => "u16",
            Self::Blob(_) => "blob",
        }
    }
}

type Namespaces = BTreeMap<String, BTreeMap<String, StoredValue>>;

/// Errors of a [SettingsStore]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing file couldn't be read or written.
    #[error("Failed to access settings file {}: {source}", .path.display())]
    Io {
        /// The file that was accessed
        path: PathBuf,
        /// What went wrong
        #[source]
        source: io::Error,
    },

    /// The settings couldn't be encoded.
    #[error("Failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),

    /// A key holds a value of another type than requested.
    #[error("Value of {key} is a {found}, expected a {expected}")]
    TypeMismatch {
        /// The key that was read
        key: String,
        /// The requested type
        expected: &'static str,
        /// The stored type
        found: &'static str,
    },
}

/// A [SettingsStore] that lives in memory only
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    committed: Namespaces,
    pending: Namespaces,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if values were set since the last commit.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn get(&self, namespace: &str, key: &str) -> Option<&StoredValue> {
        self.committed.get(namespace)?.get(key)
    }

    fn stage(&mut self, namespace: &str, key: &str, value: StoredValue) {
        self.pending
            .entry(namespace.to_owned())
            .or_default()
            .insert(key.to_owned(), value);
    }

    /// The committed values with all pending values applied.
    fn merged(&self) -> Namespaces {
        let mut merged = self.committed.clone();
        for (namespace, values) in &self.pending {
            merged
                .entry(namespace.clone())
                .or_default()
                .extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }
}

impl SettingsStore for MemoryStore {
    fn get_u16(&self, namespace: &str, key: &str) -> Result<Option<u16>, StoreError> {
        match self.get(namespace, key) {
            None => Ok(None),
            Some(StoredValue::U16(value)) => Ok(Some(*value)),
            Some(other) => Err(StoreError::TypeMismatch {
                key: key.to_owned(),
                expected: "u16",
                found: other.kind(),
            }),
        }
    }

    fn get_blob(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self.get(namespace, key) {
            None => Ok(None),
            Some(StoredValue::Blob(value)) => Ok(Some(value.clone())),
            Some(other) => Err(StoreError::TypeMismatch {
                key: key.to_owned(),
                expected: "blob",
                found: other.kind(),
            }),
        }
    }

    fn set_u16(&mut self, namespace: &str, key: &str, value: u16) -> Result<(), StoreError> {
        self.stage(namespace, key, StoredValue::U16(value));
        Ok(())
    }

    fn set_blob(&mut self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.stage(namespace, key, StoredValue::Blob(value.to_vec()));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.committed = self.merged();
        self.pending.clear();
        Ok(())
    }
}

/// A [SettingsStore] backed by a JSON file
///
/// A commit writes the whole document to a temporary file next to the target and renames it over the target.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    values: MemoryStore,
}

impl FileStore {
    /// Opens the store at `path`.
    ///
    /// A missing file is an empty store. A file that isn't valid JSON is logged and treated as empty as well, the next
    /// commit replaces it.
    ///
    /// # Errors
    /// [StoreError::Io] if the file exists but can't be read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let committed = match fs::read(&path) {
            Ok(content) => serde_json::from_slice(&content).unwrap_or_else(|e| {
                warn!("Ignoring unreadable settings file {}: {e}", path.display());
                Namespaces::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Settings file {} does not exist yet", path.display());
                Namespaces::new()
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        Ok(Self {
            path,
            values: MemoryStore {
                committed,
                pending: Namespaces::new(),
            },
        })
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        PathBuf::from(temp)
    }
}

impl SettingsStore for FileStore {
    fn get_u16(&self, namespace: &str, key: &str) -> Result<Option<u16>, StoreError> {
        self.values.get_u16(namespace, key)
    }

    fn get_blob(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.values.get_blob(namespace, key)
    }

    fn set_u16(&mut self, namespace: &str, key: &str, value: u16) -> Result<(), StoreError> {
        self.values.set_u16(namespace, key, value)
    }

    fn set_blob(&mut self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.values.set_blob(namespace, key, value)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.values.has_pending() {
            return Ok(());
        }

        let document = serde_json::to_vec_pretty(&self.values.merged())?;
        let temp = self.temp_path();
        fs::write(&temp, document).map_err(|source| StoreError::Io {
            path: temp.clone(),
            source,
        })?;
        fs::rename(&temp, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        self.values.commit()
    }
}

/// Loads and saves a [PatchTable] from and to a [SettingsStore].
#[derive(Debug)]
pub struct Settings<S> {
    store: S,
}

impl<S: SettingsStore> Settings<S> {
    /// Wraps a store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The wrapped store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reads the table back from the store.
    ///
    /// Returns `None` unless both counts are stored and the assembled table is valid. A missing or malformed blob falls
    /// back to the default patch or offsets, which then have to agree with the stored counts.
    pub fn load(&self) -> Option<PatchTable> {
        let active_led_count = self.read_u16(KEY_ACTIVE_LEDS)?;
        let universe_count = self.read_u16(KEY_NUM_UNIS)?;

        let defaults = PatchTable::default();
        let patch = self
            .read_blob::<MAX_UNIVERSES>(KEY_DMXPATCH)
            .unwrap_or_else(|| defaults.raw_universe_patch());
        let offsets = self
            .read_blob::<OFFSETS_LEN>(KEY_OFFSETS)
            .unwrap_or_else(|| defaults.raw_offsets());

        match PatchTable::from_parts(universe_count, active_led_count, patch, offsets) {
            Ok(table) => Some(table),
            Err(e) => {
                warn!("Ignoring stored settings: {e}");
                None
            }
        }
    }

    /// Writes all four values and commits them as one batch.
    pub fn save(&mut self, table: &PatchTable) -> Result<(), StoreError> {
        self.store.set_u16(NAMESPACE, KEY_ACTIVE_LEDS, table.active_led_count())?;
        self.store.set_u16(NAMESPACE, KEY_NUM_UNIS, table.universe_count() as u16)?;
        self.store.set_blob(NAMESPACE, KEY_DMXPATCH, &encode_u16s(&table.raw_universe_patch()))?;
        self.store.set_blob(NAMESPACE, KEY_OFFSETS, &encode_u16s(&table.raw_offsets()))?;
        self.store.commit()?;

        debug!("Saved settings: {} LEDs in {} universes", table.active_led_count(), table.universe_count());
        Ok(())
    }

    /// Loads the stored table or, if there is none, saves and returns the defaults.
    pub fn load_or_default(&mut self) -> PatchTable {
        if let Some(table) = self.load() {
            info!(
                "Loaded settings: {} LEDs in {} universes",
                table.active_led_count(),
                table.universe_count()
            );
            return table;
        }

        info!("No settings found, using defaults");
        let table = PatchTable::default();
        if let Err(e) = self.save(&table) {
            warn!("Failed to save default settings: {e}");
        }
        table
    }

    fn read_u16(&self, key: &str) -> Option<u16> {
        self.store.get_u16(NAMESPACE, key).unwrap_or_else(|e| {
            warn!("Failed to read {key}: {e}");
            None
        })
    }

    fn read_blob<const N: usize>(&self, key: &str) -> Option<[u16; N]> {
        let blob = self.store.get_blob(NAMESPACE, key).unwrap_or_else(|e| {
            warn!("Failed to read {key}: {e}");
            None
        })?;

        let decoded = decode_u16s(&blob);
        if decoded.is_none() {
            warn!("Ignoring {key}: expected {} bytes, found {}", N * 2, blob.len());
        }
        decoded
    }
}

fn encode_u16s(values: &[u16]) -> Vec<u8> {
    let mut blob = vec![0; values.len() * 2];
    LittleEndian::write_u16_into(values, &mut blob);
    blob
}

fn decode_u16s<const N: usize>(blob: &[u8]) -> Option<[u16; N]> {
    if blob.len() != N * 2 {
        return None;
    }

    let mut values = [0; N];
    LittleEndian::read_u16_into(blob, &mut values);
    Some(values)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{command::Command, port_address::PortAddress};

    fn changed_table() -> PatchTable {
        let mut table = PatchTable::default();
        for line in ["NUM_UNIS 4", "ACTIVE_LEDS 240", "PATCH 100 200 300 32767", "OFFSETS 0 30 90 91"] {
            Command::parse(line).apply(&mut table);
        }
        table
    }

    #[test]
    fn test_blob_encoding_is_little_endian() {
        assert_eq!(encode_u16s(&[0x0102, 600]), vec![0x02, 0x01, 0x58, 0x02]);
        assert_eq!(decode_u16s::<2>(&[0x02, 0x01, 0x58, 0x02]), Some([0x0102, 600]));
        assert_eq!(decode_u16s::<2>(&[0x02, 0x01, 0x58]), None);
    }

    #[test]
    fn test_save_then_load() {
        let table = changed_table();
        assert_eq!(table.universe_count(), 4);
        assert_eq!(table.universe_patch()[3], PortAddress::MAX);

        let mut settings = Settings::new(MemoryStore::new());
        settings.save(&table).unwrap();
        assert_eq!(settings.load(), Some(table));
    }

    #[test]
    fn test_save_writes_full_record() {
        let mut settings = Settings::new(MemoryStore::new());
        settings.save(&PatchTable::default()).unwrap();

        let store = settings.store();
        assert_eq!(store.get_u16(NAMESPACE, KEY_ACTIVE_LEDS).unwrap(), Some(100));
        assert_eq!(store.get_u16(NAMESPACE, KEY_NUM_UNIS).unwrap(), Some(10));
        assert_eq!(store.get_blob(NAMESPACE, KEY_DMXPATCH).unwrap().unwrap().len(), MAX_UNIVERSES * 2);
        assert_eq!(store.get_blob(NAMESPACE, KEY_OFFSETS).unwrap().unwrap().len(), OFFSETS_LEN * 2);
        assert!(!store.has_pending());
    }

    #[test]
    fn test_load_needs_both_counts() {
        let mut store = MemoryStore::new();
        assert_eq!(Settings::new(store.clone()).load(), None);

        store.set_u16(NAMESPACE, KEY_ACTIVE_LEDS, 100).unwrap();
        store.commit().unwrap();
        assert_eq!(Settings::new(store.clone()).load(), None);

        store.set_u16(NAMESPACE, KEY_NUM_UNIS, 10).unwrap();
        store.commit().unwrap();
        assert_eq!(Settings::new(store).load(), Some(PatchTable::default()));
    }

    #[test]
    fn test_load_ignores_uncommitted_values() {
        let mut store = MemoryStore::new();
        store.set_u16(NAMESPACE, KEY_ACTIVE_LEDS, 100).unwrap();
        store.set_u16(NAMESPACE, KEY_NUM_UNIS, 10).unwrap();
        assert!(store.has_pending());
        assert_eq!(Settings::new(store).load(), None);
    }

    #[test]
    fn test_load_malformed_blob_uses_default() {
        let mut store = MemoryStore::new();
        store.set_u16(NAMESPACE, KEY_ACTIVE_LEDS, 100).unwrap();
        store.set_u16(NAMESPACE, KEY_NUM_UNIS, 10).unwrap();
        store.set_blob(NAMESPACE, KEY_DMXPATCH, &[1, 2, 3]).unwrap();
        store.commit().unwrap();

        assert_eq!(Settings::new(store).load(), Some(PatchTable::default()));
    }

    #[test]
    fn test_load_rejects_inconsistent_values() {
        let mut store = MemoryStore::new();
        // default offsets end at 100
        store.set_u16(NAMESPACE, KEY_ACTIVE_LEDS, 150).unwrap();
        store.set_u16(NAMESPACE, KEY_NUM_UNIS, 10).unwrap();
        store.commit().unwrap();
        assert_eq!(Settings::new(store.clone()).load(), None);

        store.set_u16(NAMESPACE, KEY_ACTIVE_LEDS, 100).unwrap();
        store.set_u16(NAMESPACE, KEY_NUM_UNIS, 0).unwrap();
        store.commit().unwrap();
        assert_eq!(Settings::new(store).load(), None);
    }

    #[test]
    fn test_load_type_mismatch_is_missing() {
        let mut store = MemoryStore::new();
        store.set_blob(NAMESPACE, KEY_ACTIVE_LEDS, &[100, 0]).unwrap();
        store.set_u16(NAMESPACE, KEY_NUM_UNIS, 10).unwrap();
        store.commit().unwrap();

        assert!(matches!(
            store.get_u16(NAMESPACE, KEY_ACTIVE_LEDS),
            Err(StoreError::TypeMismatch { found: "blob", .. })
        ));
        assert_eq!(Settings::new(store).load(), None);
    }

    #[test]
    fn test_load_or_default_saves_defaults() {
        let mut settings = Settings::new(MemoryStore::new());
        assert_eq!(settings.load_or_default(), PatchTable::default());
        assert_eq!(settings.load(), Some(PatchTable::default()));
    }

    #[test]
    fn test_load_or_default_keeps_stored() {
        let mut settings = Settings::new(MemoryStore::new());
        settings.save(&changed_table()).unwrap();
        assert_eq!(settings.load_or_default(), changed_table());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = Settings::new(FileStore::open(&path).unwrap());
        assert_eq!(settings.load(), None);
        settings.save(&changed_table()).unwrap();

        assert!(path.exists());
        assert!(!settings.store().temp_path().exists());

        let reopened = Settings::new(FileStore::open(&path).unwrap());
        assert_eq!(reopened.load(), Some(changed_table()));
    }

    #[test]
    fn test_file_store_commit_without_changes_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut store = FileStore::open(&path).unwrap();
        store.commit().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_file_store_document_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut store = FileStore::open(&path).unwrap();
        store.set_u16(NAMESPACE, KEY_NUM_UNIS, 3).unwrap();
        store.commit().unwrap();

        let document: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(document["storage"]["NUM_UNIS"]["u16"], 3);
    }

    #[test]
    fn test_file_store_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, b"{ not json").unwrap();

        let mut settings = Settings::new(FileStore::open(&path).unwrap());
        assert_eq!(settings.load(), None);
        assert_eq!(settings.load_or_default(), PatchTable::default());

        let reopened = Settings::new(FileStore::open(&path).unwrap());
        assert_eq!(reopened.load(), Some(PatchTable::default()));
    }
}
