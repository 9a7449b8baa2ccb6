//! In-memory alert storage.
//!
//! Stands in for the host system's persistence layer: writers are
//! serialized behind a single lock, `changed` is stamped on every
//! mutation, and a generation counter tracks "the alert list changed" for
//! the listing endpoint's cache tag. The generation is read and written
//! under the same lock as the records so a listing never pairs a fresh
//! body with a stale tag.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::alerts::{Alert, ValidationError, VisibleWindow};

/// Fields an editor supplies when creating or replacing an alert.
#[derive(Debug, Clone)]
pub struct AlertInput {
    pub title: String,
    pub message: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl AlertInput {
    fn validated(&self) -> Result<VisibleWindow, ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        VisibleWindow::new(self.from, self.to)
    }
}

#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    alerts: HashMap<Uuid, Alert>,
    generation: u64,
}

impl Store {
    pub fn new() -> Store {
        Store::default()
    }

    /// Every stored alert in a stable order (creation time, then id).
    pub fn list(&self) -> Vec<Alert> {
        self.list_with_generation().1
    }

    /// The listing together with the generation it was read at.
    pub fn list_with_generation(&self) -> (u64, Vec<Alert>) {
        let inner = self.read();
        let mut alerts: Vec<Alert> = inner.alerts.values().cloned().collect();
        alerts.sort_by_key(|a| (a.created, a.id));
        (inner.generation, alerts)
    }

    pub fn get(&self, id: Uuid) -> Option<Alert> {
        self.read().alerts.get(&id).cloned()
    }

    /// Bumped on every successful create/update/delete.
    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    pub fn create(&self, input: AlertInput) -> Result<Alert, StoreError> {
        let window = input.validated()?;
        let now = Utc::now();
        let alert = Alert {
            id: Uuid::new_v4(),
            title: input.title,
            message: input.message,
            window,
            created: now,
            changed: now,
        };
        let mut inner = self.write();
        inner.alerts.insert(alert.id, alert.clone());
        inner.generation += 1;
        tracing::info!("created alert {} ({:?})", alert.id, alert.title);
        Ok(alert)
    }

    pub fn update(&self, id: Uuid, input: AlertInput) -> Result<Alert, StoreError> {
        let window = input.validated()?;
        let mut inner = self.write();
        let alert = inner.alerts.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        alert.title = input.title;
        alert.message = input.message;
        alert.window = window;
        alert.changed = Utc::now();
        let alert = alert.clone();
        inner.generation += 1;
        tracing::info!("updated alert {id}");
        Ok(alert)
    }

    pub fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.alerts.remove(&id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        inner.generation += 1;
        tracing::info!("deleted alert {id}");
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug)]
pub enum StoreError {
    NotFound(Uuid),
    Invalid(ValidationError),
}

impl From<ValidationError> for StoreError {
    fn from(err: ValidationError) -> StoreError {
        StoreError::Invalid(err)
    }
}

impl std::error::Error for StoreError {}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "no alert with id {id}"),
            StoreError::Invalid(err) => err.fmt(f),
        }
    }
}
