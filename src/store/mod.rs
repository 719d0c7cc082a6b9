//! Persistence for invoices.
//!
//! [`InvoiceStore`] is the seam between the service and durable storage. The Postgres backend
//! is what runs in production; the in-memory backend implements the same filtering, ordering and
//! bucketing rules and is used for tests and demos.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::Error,
    invoice::Invoice,
    query::ListFilter,
    stats::{DayBucket, StatsWindow},
    validation::{InvoiceChanges, InvoiceDraft},
};

pub use memory::MemoryInvoiceStore;
pub use postgres::PgInvoiceStore;

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Persist a new invoice, assigning its id and timestamps.
    async fn insert(&self, draft: &InvoiceDraft) -> Result<Invoice, Error>;

    async fn fetch(&self, id: Uuid) -> Result<Option<Invoice>, Error>;

    /// Apply `changes` and refresh `updated_at`. `None` when no invoice has this id. An empty
    /// change set behaves like [`InvoiceStore::fetch`].
    async fn update(&self, id: Uuid, changes: &InvoiceChanges) -> Result<Option<Invoice>, Error>;

    /// Hard delete, returning the removed invoice or `None` if it was already gone.
    async fn delete(&self, id: Uuid) -> Result<Option<Invoice>, Error>;

    /// Matching invoices, newest first, paged.
    async fn list(&self, filter: &ListFilter) -> Result<Vec<Invoice>, Error>;

    /// Sparse per-day count and revenue inside `window`, ascending by day.
    async fn daily_totals(&self, window: &StatsWindow) -> Result<Vec<DayBucket>, Error>;
}
