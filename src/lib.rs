pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod report;
pub mod storage;

use std::fmt;

use tracing::debug;

pub use crate::config::{DeploymentProfile, StoreConfig};
pub use crate::error::{InvalidField, RecordError, Result};
pub use crate::model::{Gender, MedicalHistory, PatientRecord, Timestamp};

/// In-memory patient table. Records keep insertion order; ids are unique
/// among all records the store holds, discharged ones included.
pub struct RecordStore {
    records: Vec<PatientRecord>,
    capacity: usize,
    max_capacity: usize,
}

impl fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStore")
        .field("len", &self.records.len())
        .field("capacity", &self.capacity)
        .field("max_capacity", &self.max_capacity)
        .finish()
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        let config = StoreConfig::default();
        Self {
            records: Vec::with_capacity(config.initial_capacity),
            capacity: config.initial_capacity,
            max_capacity: config.max_capacity,
        }
    }
}

impl RecordStore {
    pub fn with_config(config: StoreConfig) -> Result<Self> {
        let mut records = Vec::new();
        records.try_reserve_exact(config.initial_capacity)?;
        Ok(Self {
            records,
            capacity: config.initial_capacity,
            max_capacity: config.max_capacity,
        })
    }

    /// Default profile cap with `capacity_hint` slots reserved up front.
    pub fn with_capacity(capacity_hint: usize) -> Result<Self> {
        let max = StoreConfig::default().max_capacity;
        Self::with_config(StoreConfig::with_max(max, capacity_hint))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Slots reserved so far; grows by doubling up to `max_capacity`.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    pub fn active_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_active()).count()
    }

    pub fn add(
        &mut self,
        id: i32,
        name: &str,
        age: i32,
        gender: Gender,
        history: &str,
    ) -> Result<&PatientRecord> {
        if self.records.len() >= self.max_capacity {
            return Err(RecordError::CapacityExceeded { max: self.max_capacity });
        }
        if self.records.iter().any(|r| r.id == id) {
            return Err(RecordError::DuplicateId(id));
        }

        let id = model::validate_id(id)?;
        let age = model::validate_age(age)?;
        model::validate_name(name)?;

        let record = PatientRecord {
            id,
            name: name.to_owned(),
            age,
            gender,
            medical_history: MedicalHistory::new(history),
            admission_timestamp: model::now(),
            discharge_timestamp: None,
            is_discharged: false,
        };

        self.reserve_slot()?;
        self.records.push(record);
        debug!(id, len = self.records.len(), "patient admitted");

        let idx = self.records.len() - 1;
        Ok(&self.records[idx])
    }

    pub fn find(&self, id: i32, include_discharged: bool) -> Option<&PatientRecord> {
        self.records
        .iter()
        .find(|r| r.id == id && (include_discharged || r.is_active()))
    }

    pub fn list(&self, include_discharged: bool) -> impl Iterator<Item = &PatientRecord> + '_ {
        self.records
        .iter()
        .filter(move |r| include_discharged || r.is_active())
    }

    /// Appends to an active patient's history. Discharged records are
    /// read-only and report `NotFound`.
    pub fn update_history(&mut self, id: i32, addition: &str) -> Result<()> {
        if addition.trim().is_empty() {
            return Err(InvalidField::EmptyHistoryEntry.into());
        }

        let record = self
        .records
        .iter_mut()
        .find(|r| r.id == id && r.is_active())
        .ok_or(RecordError::NotFound(id))?;

        record.medical_history.append(addition)?;
        debug!(id, history_len = record.medical_history.len(), "history updated");
        Ok(())
    }

    pub fn discharge(&mut self, id: i32) -> Result<()> {
        let record = self
        .records
        .iter_mut()
        .find(|r| r.id == id)
        .ok_or(RecordError::NotFound(id))?;

        if record.is_discharged {
            return Err(RecordError::AlreadyDischarged(id));
        }

        // Clock skew must not put the discharge before the admission.
        let at = model::now().max(record.admission_timestamp);
        record.is_discharged = true;
        record.discharge_timestamp = Some(at);
        debug!(id, at, "patient discharged");
        Ok(())
    }

    /// Physically removes one record, active or not. Later records shift
    /// left and the id becomes free again.
    pub fn remove(&mut self, id: i32) -> Result<PatientRecord> {
        let pos = self
        .records
        .iter()
        .position(|r| r.id == id)
        .ok_or(RecordError::NotFound(id))?;

        let removed = self.records.remove(pos);
        debug!(id, len = self.records.len(), "patient removed");
        Ok(removed)
    }

    pub fn remove_discharged(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(PatientRecord::is_active);
        let removed = before - self.records.len();
        debug!(removed, len = self.records.len(), "discharged records purged");
        removed
    }

    pub fn destroy(self) {
        debug!(len = self.records.len(), "store released");
    }

    /// Commits one fully decoded record during a load.
    pub(crate) fn push_loaded(&mut self, record: PatientRecord) -> Result<()> {
        if self.records.len() >= self.max_capacity {
            return Err(RecordError::CapacityExceeded { max: self.max_capacity });
        }
        if self.records.iter().any(|r| r.id == record.id) {
            return Err(RecordError::DuplicateId(record.id));
        }
        self.reserve_slot()?;
        self.records.push(record);
        Ok(())
    }

    fn reserve_slot(&mut self) -> Result<()> {
        if self.records.len() < self.capacity {
            return Ok(());
        }
        let target = self.capacity.saturating_mul(2).clamp(1, self.max_capacity);
        self.records.try_reserve_exact(target - self.records.len())?;
        debug!(from = self.capacity, to = target, "store grown");
        self.capacity = target;
        Ok(())
    }
}
