//! In-process invoice store.
//!
//! Applies the same filter, ordering and bucketing rules as the SQL in [`crate::query`] so the
//! service can be exercised without a database.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, Utc};
use uuid::Uuid;

use crate::{
    error::Error,
    invoice::Invoice,
    query::ListFilter,
    stats::{self, DayBucket, StatsWindow},
    store::InvoiceStore,
    validation::{InvoiceChanges, InvoiceDraft},
};

#[derive(Clone, Default)]
pub struct MemoryInvoiceStore {
    invoices: Arc<RwLock<HashMap<Uuid, Invoice>>>,
}

impl MemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<Uuid, Invoice>>, Error> {
        self.invoices
            .read()
            .map_err(|e| Error::from(format!("failed to acquire read lock: {e}")))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<Uuid, Invoice>>, Error> {
        self.invoices
            .write()
            .map_err(|e| Error::from(format!("failed to acquire write lock: {e}")))
    }
}

/// Current time at the microsecond precision Postgres keeps, never earlier than or equal to
/// `after`.
fn timestamp_after(after: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    let now = now.duration_trunc(Duration::microseconds(1)).unwrap_or(now);
    match after {
        Some(prev) if now <= prev => prev + Duration::microseconds(1),
        _ => now,
    }
}

#[async_trait]
impl InvoiceStore for MemoryInvoiceStore {
    async fn insert(&self, draft: &InvoiceDraft) -> Result<Invoice, Error> {
        let invoice = Invoice::from_draft(Uuid::new_v4(), draft, timestamp_after(None));
        self.write()?.insert(invoice.id(), invoice.clone());
        Ok(invoice)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Invoice>, Error> {
        Ok(self.read()?.get(&id).cloned())
    }

    async fn update(&self, id: Uuid, changes: &InvoiceChanges) -> Result<Option<Invoice>, Error> {
        if changes.is_empty() {
            return self.fetch(id).await;
        }
        let mut invoices = self.write()?;
        Ok(invoices.get_mut(&id).map(|invoice| {
            invoice.apply_changes(changes, timestamp_after(Some(invoice.updated_at())));
            invoice.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Invoice>, Error> {
        Ok(self.write()?.remove(&id))
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<Invoice>, Error> {
        let mut matching: Vec<Invoice> = self
            .read()?
            .values()
            .filter(|invoice| filter.matches(invoice))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.date().cmp(&a.date()).then_with(|| b.id().cmp(&a.id())));
        Ok(matching
            .into_iter()
            .skip(filter.page.offset.max(0) as usize)
            .take(filter.page.limit.max(0) as usize)
            .collect())
    }

    async fn daily_totals(&self, window: &StatsWindow) -> Result<Vec<DayBucket>, Error> {
        let invoices = self.read()?;
        Ok(stats::bucket_by_day(
            window,
            invoices.values().map(|i| (i.date(), i.total())),
        ))
    }
}
