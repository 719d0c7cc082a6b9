//! Invoice records backed by Postgres, with listing, daily revenue stats and printable exports.
//!
//! The crate stores invoices (header fields, line items, a free-form `meta` map), lets callers
//! search and page through them, buckets revenue per calendar day, and renders a single invoice
//! to HTML through a minijinja template or to PDF through a headless Chrome(ium) driven over
//! WebDriver.
//!
//! Everything is reached through [`InvoiceService`], which sits on top of an
//! [`store::InvoiceStore`] and a [`Rasterizer`].
//!
//! # Example
//!
//! ```rust
//! use std::{sync::Arc, time::Duration};
//!
//! use async_trait::async_trait;
//! use invoice_desk::{
//!     DocumentRenderer, Error, InvoiceService, MemoryInvoiceStore, NewInvoice, Rasterizer,
//! };
//!
//! struct NoPdf;
//!
//! #[async_trait]
//! impl Rasterizer for NoPdf {
//!     async fn rasterize(&self, _html: &str, _budget: Duration) -> Result<Vec<u8>, Error> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! # tokio_test_block(async {
//! let service = InvoiceService::new(
//!     Arc::new(MemoryInvoiceStore::new()),
//!     DocumentRenderer::new(None, chrono_tz::Tz::UTC).unwrap(),
//!     Arc::new(NoPdf),
//!     chrono_tz::Tz::UTC,
//!     Duration::from_secs(10),
//! );
//! let created = service
//!     .create(NewInvoice {
//!         invoice_number: Some("INV-1".into()),
//!         customer_name: Some("Acme".into()),
//!         ..Default::default()
//!     })
//!     .await
//!     .unwrap();
//! let html = service.export_html(&created.id().to_string()).await.unwrap();
//! assert!(html.contains("INV-1"));
//! # });
//! # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

pub mod config;
pub mod error;
pub mod invoice;
pub mod query;
pub mod rasterizer;
pub mod service;
pub mod stats;
pub mod store;
pub mod telemetry;
pub mod template_env;
pub mod validation;

pub use config::Settings;
pub use error::{AddContext, Error, ErrorKind};
pub use invoice::{
    DateInput, Invoice, InvoiceBuilder, InvoiceBuilderError, InvoicePatch, InvoiceStatus,
    LineItem, LineItemBuilder, LineItemBuilderError, NewInvoice,
};
pub use query::{ListQuery, Pagination};
pub use rasterizer::{ChromeRasterizer, Rasterizer, start_chromedriver};
pub use service::{InvoiceService, PdfDocument};
pub use stats::{DayBucket, Period};
pub use store::{InvoiceStore, MemoryInvoiceStore, PgInvoiceStore};
pub use template_env::DocumentRenderer;
pub use validation::{FieldError, ValidationErrors};
