//! Durable mapping of discovered resources to their configuration bindings
//!
//! The mapping file is pretty-printed JSON, one record per cloud identifier,
//! in discovery order. Every update is written to a sibling `.tmp` file and
//! renamed over the mapping file, so a reader only ever sees a complete
//! document: either the one before the update or the one after it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::item::{ItemStatus, ResourceItem};
use crate::infrastructure::error::{ImportError, ImportResult};
use crate::traits::FileSystem;

/// Default file name of the mapping file inside the output directory
pub const MAPPING_FILE_NAME: &str = "cloudport_mapping.json";

const MAPPING_FORMAT_VERSION: u32 = 1;

/// Persisted binding of one cloud resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub cloud_id: String,
    #[serde(default)]
    pub display_name: String,
    pub target_name: String,
    #[serde(default)]
    pub target_address: String,
    #[serde(default)]
    pub target_type: String,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub revision: u64,
}

impl MappingRecord {
    pub fn from_item(item: &ResourceItem) -> Self {
        Self {
            cloud_id: item.cloud_id.clone(),
            display_name: item.display_name.clone(),
            target_name: item.target_name.clone(),
            target_address: item.target_address.clone(),
            target_type: item.target_type.clone(),
            status: item.status,
            error: item
                .import_error
                .clone()
                .or_else(|| item.validation_error.clone()),
            revision: item.revision,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MappingDocument {
    version: u32,
    updated_at: DateTime<Utc>,
    resources: Vec<MappingRecord>,
}

/// Single-writer store for the mapping file
pub struct MappingStore {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    records: Vec<MappingRecord>,
    index: HashMap<String, usize>,
}

impl MappingStore {
    /// Load the mapping file at `path`
    ///
    /// A missing file yields an empty store. Malformed content fails with
    /// `CorruptMapping` and the file is left as is.
    pub fn load(fs: Arc<dyn FileSystem>, path: &Path) -> ImportResult<Self> {
        let mut store = Self {
            fs,
            path: path.to_path_buf(),
            records: Vec::new(),
            index: HashMap::new(),
        };

        if !store.fs.is_file(path) {
            tracing::debug!(path = %path.display(), "no mapping file, starting empty");
            return Ok(store);
        }

        let content = store.fs.read_to_string(path).map_err(|e| ImportError::CorruptMapping {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let document: MappingDocument =
            serde_json::from_str(&content).map_err(|e| ImportError::CorruptMapping {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        if document.version != MAPPING_FORMAT_VERSION {
            return Err(ImportError::CorruptMapping {
                path: path.display().to_string(),
                message: format!("unsupported format version {}", document.version),
            });
        }

        for record in document.resources {
            if store.index.contains_key(&record.cloud_id) {
                return Err(ImportError::CorruptMapping {
                    path: path.display().to_string(),
                    message: format!("duplicate entry for {}", record.cloud_id),
                });
            }
            store.index.insert(record.cloud_id.clone(), store.records.len());
            store.records.push(record);
        }

        tracing::info!(
            path = %path.display(),
            records = store.records.len(),
            "loaded mapping file"
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records in file order
    pub fn records(&self) -> &[MappingRecord] {
        &self.records
    }

    pub fn get(&self, cloud_id: &str) -> Option<&MappingRecord> {
        self.index.get(cloud_id).map(|&i| &self.records[i])
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Persist the current state of one item
    ///
    /// The item's revision must be exactly one past the stored revision; an
    /// item seen for the first time is accepted at any revision. Nothing is
    /// changed, in memory or on disk, when the write fails.
    pub fn record_transition(&mut self, item: &ResourceItem) -> ImportResult<()> {
        let record = MappingRecord::from_item(item);

        let mut records = self.records.clone();
        let position = match self.index.get(&item.cloud_id) {
            Some(&i) => {
                let expected = records[i].revision + 1;
                if item.revision != expected {
                    return Err(ImportError::StaleTransition {
                        cloud_id: item.cloud_id.clone(),
                        expected,
                        actual: item.revision,
                    });
                }
                records[i] = record;
                i
            }
            None => {
                records.push(record);
                records.len() - 1
            }
        };

        self.persist(&records)?;

        self.index.insert(item.cloud_id.clone(), position);
        self.records = records;

        tracing::debug!(
            cloud_id = %item.cloud_id,
            status = %item.status,
            revision = item.revision,
            "recorded transition"
        );
        Ok(())
    }

    /// Write the complete final mapping
    ///
    /// Session items come first in session order; records loaded from an
    /// earlier run for resources not seen in this session are kept after them.
    pub fn finalize(&mut self, items: &[ResourceItem]) -> ImportResult<()> {
        let seen: HashSet<&str> = items.iter().map(|i| i.cloud_id.as_str()).collect();

        let mut records: Vec<MappingRecord> = items.iter().map(MappingRecord::from_item).collect();
        records.extend(
            self.records
                .iter()
                .filter(|r| !seen.contains(r.cloud_id.as_str()))
                .cloned(),
        );

        self.persist(&records)?;

        self.index = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.cloud_id.clone(), i))
            .collect();
        self.records = records;

        tracing::info!(
            path = %self.path.display(),
            records = self.records.len(),
            "finalized mapping file"
        );
        Ok(())
    }

    fn persist(&self, records: &[MappingRecord]) -> ImportResult<()> {
        let document = MappingDocument {
            version: MAPPING_FORMAT_VERSION,
            updated_at: Utc::now(),
            resources: records.to_vec(),
        };
        let content = serde_json::to_string_pretty(&document)?;

        let tmp = self.tmp_path();
        self.fs
            .write(&tmp, &content)
            .map_err(|e| ImportError::Io(std::io::Error::other(e.to_string())))?;
        self.fs
            .rename(&tmp, &self.path)
            .map_err(|e| ImportError::Io(std::io::Error::other(e.to_string())))?;

        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::discovery::ResourceDescriptor;
    use crate::traits::{MockFileSystem, RealFileSystem};

    fn item(id: &str, index: usize) -> ResourceItem {
        let desc = ResourceDescriptor::new(id);
        let mut item = ResourceItem::from_descriptor(&desc, index, "res-");
        item.set_target_type("azurerm_resource_group");
        item
    }

    fn advance(item: &mut ResourceItem, status: ItemStatus) {
        item.set_status(status).unwrap();
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let fs = Arc::new(MockFileSystem::new());
        let store = MappingStore::load(fs, Path::new("/out/cloudport_mapping.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_file_fails_and_is_untouched() {
        let fs = Arc::new(MockFileSystem::new());
        let path = PathBuf::from("/out/cloudport_mapping.json");
        fs.write(&path, "{ not json").unwrap();

        let result = MappingStore::load(fs.clone(), &path);
        assert!(matches!(result, Err(ImportError::CorruptMapping { .. })));
        assert_eq!(fs.get_file_contents(&path).as_deref(), Some("{ not json"));
    }

    #[test]
    fn test_unsupported_version_is_corrupt() {
        let fs = Arc::new(MockFileSystem::new());
        let path = PathBuf::from("/out/m.json");
        fs.write(
            &path,
            r#"{"version": 7, "updated_at": "2024-01-01T00:00:00Z", "resources": []}"#,
        )
        .unwrap();

        assert!(matches!(
            MappingStore::load(fs, &path),
            Err(ImportError::CorruptMapping { .. })
        ));
    }

    #[test]
    fn test_duplicate_cloud_id_is_corrupt() {
        let fs = Arc::new(MockFileSystem::new());
        let path = PathBuf::from("/out/m.json");
        let record = r#"{"cloud_id": "/a", "target_name": "res-0", "status": "pending"}"#;
        fs.write(
            &path,
            &format!(
                r#"{{"version": 1, "updated_at": "2024-01-01T00:00:00Z", "resources": [{}, {}]}}"#,
                record, record
            ),
        )
        .unwrap();

        assert!(matches!(
            MappingStore::load(fs, &path),
            Err(ImportError::CorruptMapping { .. })
        ));
    }

    #[test]
    fn test_record_transition_round_trips() {
        let fs = Arc::new(MockFileSystem::new());
        let path = PathBuf::from("/out/m.json");
        let mut store = MappingStore::load(fs.clone(), &path).unwrap();

        let mut a = item("/a", 0);
        advance(&mut a, ItemStatus::Validated);
        store.record_transition(&a).unwrap();
        advance(&mut a, ItemStatus::Importing);
        store.record_transition(&a).unwrap();
        advance(&mut a, ItemStatus::Imported);
        store.record_transition(&a).unwrap();

        let reloaded = MappingStore::load(fs.clone(), &path).unwrap();
        let record = reloaded.get("/a").unwrap();
        assert_eq!(record.status, ItemStatus::Imported);
        assert_eq!(record.target_address, "azurerm_resource_group.res-0");
        assert_eq!(record.revision, 3);
        assert!(!fs.has_file(Path::new("/out/m.json.tmp")));
    }

    #[test]
    fn test_out_of_sequence_revision_is_rejected() {
        let fs = Arc::new(MockFileSystem::new());
        let mut store = MappingStore::load(fs, Path::new("/out/m.json")).unwrap();

        let mut a = item("/a", 0);
        advance(&mut a, ItemStatus::Validated);
        store.record_transition(&a).unwrap();

        // Two transitions applied without recording the first one
        advance(&mut a, ItemStatus::Importing);
        advance(&mut a, ItemStatus::Imported);
        let err = store.record_transition(&a).unwrap_err();
        assert!(matches!(
            err,
            ImportError::StaleTransition {
                expected: 2,
                actual: 3,
                ..
            }
        ));
        assert_eq!(store.get("/a").unwrap().status, ItemStatus::Validated);
    }

    #[test]
    fn test_failed_write_keeps_previous_commit() {
        let fs = Arc::new(MockFileSystem::new());
        let path = PathBuf::from("/out/m.json");
        let mut store = MappingStore::load(fs.clone(), &path).unwrap();

        let mut a = item("/a", 0);
        advance(&mut a, ItemStatus::Validated);
        store.record_transition(&a).unwrap();

        fs.fail_writes_to(Path::new("/out/m.json.tmp"));
        advance(&mut a, ItemStatus::Importing);
        assert!(store.record_transition(&a).is_err());

        // In-memory and on-disk state both still reflect the last commit
        assert_eq!(store.get("/a").unwrap().status, ItemStatus::Validated);
        let reloaded = MappingStore::load(fs, &path).unwrap();
        assert_eq!(reloaded.get("/a").unwrap().status, ItemStatus::Validated);
    }

    #[test]
    fn test_finalize_orders_session_items_first_and_keeps_unseen() {
        let fs = Arc::new(MockFileSystem::new());
        let path = PathBuf::from("/out/m.json");
        let mut store = MappingStore::load(fs.clone(), &path).unwrap();

        let mut old = item("/old", 9);
        advance(&mut old, ItemStatus::Skipped);
        store.record_transition(&old).unwrap();

        let b = item("/b", 1);
        let a = item("/a", 0);
        store.finalize(&[a, b]).unwrap();

        let reloaded = MappingStore::load(fs, &path).unwrap();
        let ids: Vec<&str> = reloaded
            .records()
            .iter()
            .map(|r| r.cloud_id.as_str())
            .collect();
        assert_eq!(ids, vec!["/a", "/b", "/old"]);
    }

    #[test]
    fn test_every_prefix_of_a_run_is_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MAPPING_FILE_NAME);
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let mut store = MappingStore::load(fs.clone(), &path).unwrap();

        let mut items: Vec<ResourceItem> =
            (0..3).map(|i| item(&format!("/r{}", i), i)).collect();
        let steps = [
            ItemStatus::Validated,
            ItemStatus::Importing,
            ItemStatus::Imported,
        ];

        let mut committed = 0;
        for step in steps {
            for it in items.iter_mut() {
                advance(it, step);
                store.record_transition(it).unwrap();
                committed += 1;

                // Simulate a crash right after this write
                let reloaded = MappingStore::load(fs.clone(), &path).unwrap();
                let total: u64 = reloaded.records().iter().map(|r| r.revision).sum();
                assert_eq!(total, committed);
                for r in reloaded.records() {
                    if r.status == ItemStatus::Imported {
                        assert!(!r.target_address.is_empty());
                        assert!(!r.target_type.is_empty());
                    }
                }
            }
        }
    }

    #[test]
    fn test_leftover_tmp_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MAPPING_FILE_NAME);
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

        let mut store = MappingStore::load(fs.clone(), &path).unwrap();
        let mut a = item("/a", 0);
        advance(&mut a, ItemStatus::Validated);
        store.record_transition(&a).unwrap();

        // A torn write of the next update never reaches the mapping file
        fs.write(&dir.path().join("cloudport_mapping.json.tmp"), "{\"version\": 1, \"reso")
            .unwrap();

        let reloaded = MappingStore::load(fs, &path).unwrap();
        assert_eq!(reloaded.get("/a").unwrap().status, ItemStatus::Validated);
    }
}
