use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use serde_json::Value;
use tracing::{debug, trace};

use crate::store::{
    ContentStore, Metadata, NormalizedRecord, RecordId, StoreError, StoredRecord,
};
use crate::upgrade::OptionStore;

const RECORDS_DIR: &str = "records";
const OPTIONS_FILE: &str = "options.yaml";

/// Stores each record as `<root>/records/<id>.json`, and options in
/// `<root>/options.yaml`.
///
/// The `records` directory is created by [`ContentStore::prepare`], which the
/// upgrade hook runs on first start.
#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
    // next id to hand out; also serializes every write
    next_id: Mutex<u64>,
    options: Mutex<()>,
}

impl DirectoryStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let next_id = highest_record_id(&root.join(RECORDS_DIR))? + 1;
        debug!(
            "opened store at {}, next record id is {}",
            root.display(),
            next_id
        );

        Ok(Self {
            root,
            next_id: Mutex::new(next_id),
            options: Mutex::new(()),
        })
    }

    /// Reads back a stored record.
    pub fn load(&self, id: RecordId) -> Result<StoredRecord, StoreError> {
        let path = self.record_path(id);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StoreError::NotFound(id)),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    fn record_path(&self, id: RecordId) -> PathBuf {
        self.root.join(RECORDS_DIR).join(format!("{}.json", id))
    }

    fn write(&self, stored: &StoredRecord) -> Result<(), StoreError> {
        let path = self.record_path(stored.id);
        trace!("writing record {} to {}", stored.id, path.display());

        replace_file(&path, |writer| Ok(serde_json::to_writer_pretty(writer, stored)?))
    }

    fn lock_ids(&self) -> Result<MutexGuard<'_, u64>, StoreError> {
        self.next_id.lock().map_err(|_| StoreError::Poisoned)
    }

    fn read_options(&self) -> Result<BTreeMap<String, i64>, StoreError> {
        let path = self.root.join(OPTIONS_FILE);
        if !path.is_file() {
            return Ok(BTreeMap::new());
        }

        let reader = BufReader::new(File::open(path)?);
        Ok(serde_yaml::from_reader(reader)?)
    }

    fn update_options<F>(&self, update: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut BTreeMap<String, i64>),
    {
        let _guard = self.options.lock().map_err(|_| StoreError::Poisoned)?;

        let mut options = self.read_options()?;
        update(&mut options);

        replace_file(&self.root.join(OPTIONS_FILE), |writer| {
            Ok(serde_yaml::to_writer(writer, &options)?)
        })
    }
}

/// Writes `path` through a sibling temporary file, so readers never see a
/// half-written file.
fn replace_file<F>(path: &Path, write: F) -> Result<(), StoreError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), StoreError>,
{
    let tmp = path.with_extension("tmp");
    let result = File::create(&tmp)
        .map_err(StoreError::from)
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            write(&mut writer)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            Ok(())
        })
        .and_then(|()| Ok(fs::rename(&tmp, path)?));

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn highest_record_id(records: &Path) -> Result<u64, StoreError> {
    if !records.is_dir() {
        return Ok(0);
    }

    let mut highest = 0;
    for entry in fs::read_dir(records)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }

        if let Some(id) = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<u64>().ok())
        {
            highest = highest.max(id);
        }
    }

    Ok(highest)
}

impl ContentStore for DirectoryStore {
    fn create(&self, record: NormalizedRecord) -> Result<RecordId, StoreError> {
        let mut next_id = self.lock_ids()?;
        let id = RecordId(*next_id);

        self.write(&StoredRecord {
            id,
            record,
            metadata: Vec::new(),
        })?;

        *next_id += 1;
        Ok(id)
    }

    fn attach_metadata(&self, id: RecordId, key: &str, value: Value) -> Result<(), StoreError> {
        let _guard = self.lock_ids()?;

        let mut stored = self.load(id)?;
        stored.metadata.push(Metadata {
            key: key.to_owned(),
            value,
        });
        self.write(&stored)
    }

    fn metadata(&self, id: RecordId, key: &str) -> Result<Option<Value>, StoreError> {
        match self.load(id) {
            Ok(stored) => Ok(stored.metadata(key).cloned()),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn prepare(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.root.join(RECORDS_DIR))?;
        Ok(())
    }
}

impl OptionStore for DirectoryStore {
    fn get_option(&self, name: &str) -> Result<Option<i64>, StoreError> {
        let _guard = self.options.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.read_options()?.get(name).copied())
    }

    fn set_option(&self, name: &str, value: i64) -> Result<(), StoreError> {
        self.update_options(|options| {
            options.insert(name.to_owned(), value);
        })
    }

    fn delete_option(&self, name: &str) -> Result<(), StoreError> {
        self.update_options(|options| {
            options.remove(name);
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::datetime;

    use crate::store::{RecordStatus, COMMIT_DATA_KEY, COMMIT_URL_KEY};

    use super::*;

    fn record(title: &str) -> NormalizedRecord {
        NormalizedRecord {
            title: title.to_owned(),
            body: "body".to_owned(),
            status: RecordStatus::Published,
            published_at: datetime!(2013-09-03 16:45:21 UTC),
        }
    }

    #[test]
    fn create_requires_prepared_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();

        assert!(matches!(store.create(record("one")), Err(StoreError::Io(_))));

        store.prepare().unwrap();
        assert_eq!(store.create(record("one")).unwrap(), RecordId(1));
    }

    #[test]
    fn records_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = DirectoryStore::open(dir.path()).unwrap();
            store.prepare().unwrap();
            let id = store.create(record("one")).unwrap();
            store
                .attach_metadata(id, COMMIT_URL_KEY, json!("https://host/commit/abc"))
                .unwrap();
            store
                .attach_metadata(id, COMMIT_DATA_KEY, json!({ "id": "abc" }))
                .unwrap();
        }

        let store = DirectoryStore::open(dir.path()).unwrap();
        let stored = store.load(RecordId(1)).unwrap();
        assert_eq!(stored.record, record("one"));
        assert_eq!(
            stored.metadata(COMMIT_DATA_KEY),
            Some(&json!({ "id": "abc" }))
        );
        assert_eq!(
            store.metadata(RecordId(1), COMMIT_URL_KEY).unwrap(),
            Some(json!("https://host/commit/abc"))
        );

        // numbering carries on from what is already on disk
        assert_eq!(store.create(record("two")).unwrap(), RecordId(2));
    }

    #[test]
    fn rewrites_leave_no_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        store.prepare().unwrap();
        store.set_option("version", 1).unwrap();

        let id = store.create(record("one")).unwrap();
        store
            .attach_metadata(id, COMMIT_URL_KEY, json!("https://host/commit/abc"))
            .unwrap();

        let mut records: Vec<_> = fs::read_dir(dir.path().join(RECORDS_DIR))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        records.sort();
        assert_eq!(records, vec!["1.json"]);
        assert!(!dir.path().join("options.tmp").exists());
        assert_eq!(
            store.load(id).unwrap().metadata(COMMIT_URL_KEY),
            Some(&json!("https://host/commit/abc"))
        );
    }

    #[test]
    fn unknown_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        store.prepare().unwrap();

        assert!(matches!(
            store.load(RecordId(3)),
            Err(StoreError::NotFound(RecordId(3)))
        ));
        assert!(store.metadata(RecordId(3), COMMIT_URL_KEY).unwrap().is_none());
    }

    #[test]
    fn options_round_trip_through_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();

        assert_eq!(store.get_option("version").unwrap(), None);
        store.set_option("version", 1).unwrap();
        store.set_option("lock", 1_700_000_000).unwrap();
        store.delete_option("lock").unwrap();

        let reopened = DirectoryStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get_option("version").unwrap(), Some(1));
        assert_eq!(reopened.get_option("lock").unwrap(), None);
    }
}
