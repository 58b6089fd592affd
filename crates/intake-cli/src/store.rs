use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::debug;

use intake_spec::{FinalRecord, Guest, MemoryStore, RecordStore, StoreError};

/// JSON file holding `{"guests": [...], "records": [...]}`.
///
/// Every write rewrites the whole document to a sibling temp file and
/// renames it over the original.
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl FileStore {
    /// Opens `path`; a missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let inner = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => MemoryStore::new(),
            Ok(text) => serde_json::from_str(&text)
                .map_err(|err| unavailable(&path, &err.to_string()))?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => MemoryStore::new(),
            Err(err) => return Err(unavailable(&path, &err.to_string())),
        };
        Ok(Self { path, inner })
    }

    pub fn records(&self) -> &[FinalRecord] {
        self.inner.records()
    }

    fn save(&self) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(&self.inner)
            .map_err(|err| unavailable(&self.path, &err.to_string()))?;
        let tmp = temp_path(&self.path);
        fs::write(&tmp, text).map_err(|err| unavailable(&tmp, &err.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|err| unavailable(&self.path, &err.to_string()))?;
        debug!(path = %self.path.display(), "store saved");
        Ok(())
    }
}

impl RecordStore for FileStore {
    fn insert_guest(&mut self, guest: Guest) -> Result<(), StoreError> {
        self.inner.insert_guest(guest)?;
        self.save()
    }

    fn update_guest(&mut self, guest: &Guest) -> Result<(), StoreError> {
        self.inner.update_guest(guest)?;
        self.save()
    }

    fn guests(&self) -> Result<Vec<Guest>, StoreError> {
        self.inner.guests()
    }

    fn create_record(&mut self, record: &FinalRecord) -> Result<(), StoreError> {
        self.inner.create_record(record)?;
        self.save()
    }

    fn mark_completed(&mut self, guest_id: &str, completed_on: NaiveDate) -> Result<(), StoreError> {
        self.inner.mark_completed(guest_id, completed_on)?;
        self.save()
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn unavailable(path: &Path, reason: &str) -> StoreError {
    StoreError::Unavailable(format!("{}: {}", path.display(), reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn guest(id: &str) -> Guest {
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).expect("date");
        Guest {
            id: id.into(),
            access_code: "A123456".into(),
            phone_number: "090".into(),
            birth_date: day,
            wife_first_blood_date: day,
            husband_first_blood_date: day,
            created_on: day,
            is_completed: false,
            completed_on: None,
            line: None,
        }
    }

    #[test]
    fn missing_file_opens_empty_and_writes_survive_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("store.json");

        let mut store = FileStore::open(&path).expect("open");
        assert!(store.guests().expect("guests").is_empty());
        store.insert_guest(guest("g1")).expect("insert");
        assert!(!temp_path(&path).exists());

        let reopened = FileStore::open(&path).expect("reopen");
        assert_eq!(reopened.guests().expect("guests").len(), 1);
        assert_eq!(
            reopened.find_by_access_code("A123456").expect("lookup")[0].id,
            "g1"
        );
    }

    #[test]
    fn corrupt_file_is_unavailable() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("store.json");
        fs::write(&path, "{ nope").expect("write");
        assert!(matches!(
            FileStore::open(&path),
            Err(StoreError::Unavailable(_))
        ));
    }
}
