use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::derive::FinalRecord;
use crate::guest::Guest;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("guest '{0}' not found")]
    NotFound(String),
    #[error("guest '{0}' already exists")]
    Duplicate(String),
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

/// Guest and record persistence used by the intake flow.
///
/// Query helpers default to scanning [`RecordStore::guests`].
pub trait RecordStore {
    fn insert_guest(&mut self, guest: Guest) -> Result<(), StoreError>;

    fn update_guest(&mut self, guest: &Guest) -> Result<(), StoreError>;

    fn guests(&self) -> Result<Vec<Guest>, StoreError>;

    fn create_record(&mut self, record: &FinalRecord) -> Result<(), StoreError>;

    fn mark_completed(&mut self, guest_id: &str, completed_on: NaiveDate) -> Result<(), StoreError>;

    fn guest(&self, id: &str) -> Result<Option<Guest>, StoreError> {
        Ok(self.guests()?.into_iter().find(|guest| guest.id == id))
    }

    fn find_by_access_code(&self, code: &str) -> Result<Vec<Guest>, StoreError> {
        Ok(self
            .guests()?
            .into_iter()
            .filter(|guest| guest.access_code == code)
            .collect())
    }

    fn find_by_line_user(&self, user_id: &str) -> Result<Option<Guest>, StoreError> {
        Ok(self.guests()?.into_iter().find(|guest| {
            guest
                .line
                .as_ref()
                .is_some_and(|line| line.user_id() == user_id)
        }))
    }
}

/// In-memory store; also the on-disk document shape for file-backed stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    #[serde(default)]
    pub guests: Vec<Guest>,
    #[serde(default)]
    pub records: Vec<FinalRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[FinalRecord] {
        &self.records
    }

    fn guest_mut(&mut self, id: &str) -> Result<&mut Guest, StoreError> {
        self.guests
            .iter_mut()
            .find(|guest| guest.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

impl RecordStore for MemoryStore {
    fn insert_guest(&mut self, guest: Guest) -> Result<(), StoreError> {
        if self.guests.iter().any(|existing| existing.id == guest.id) {
            return Err(StoreError::Duplicate(guest.id));
        }
        self.guests.push(guest);
        Ok(())
    }

    fn update_guest(&mut self, guest: &Guest) -> Result<(), StoreError> {
        *self.guest_mut(&guest.id)? = guest.clone();
        Ok(())
    }

    fn guests(&self) -> Result<Vec<Guest>, StoreError> {
        Ok(self.guests.clone())
    }

    fn create_record(&mut self, record: &FinalRecord) -> Result<(), StoreError> {
        self.records.push(record.clone());
        Ok(())
    }

    fn mark_completed(&mut self, guest_id: &str, completed_on: NaiveDate) -> Result<(), StoreError> {
        let guest = self.guest_mut(guest_id)?;
        guest.is_completed = true;
        guest.completed_on = Some(completed_on);
        Ok(())
    }
}
