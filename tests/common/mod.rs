//! Common helpers for the integration suites.
#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use chrono_tz::Tz;
use invoice_desk::{
    DocumentRenderer, Error, ErrorKind, InvoicePatch, InvoiceService, InvoiceStore, NewInvoice,
    Rasterizer,
};

/// Returns a fake PDF without touching a browser.
pub struct StubRasterizer;

#[async_trait]
impl Rasterizer for StubRasterizer {
    async fn rasterize(&self, html: &str, _budget: Duration) -> Result<Vec<u8>, Error> {
        Ok(format!("%PDF-stub {}", html.len()).into_bytes())
    }
}

/// Never finishes printing. Gives up when the budget runs out and counts how often it released
/// its session.
#[derive(Default)]
pub struct StalledRasterizer {
    pub released: AtomicUsize,
}

impl StalledRasterizer {
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Rasterizer for StalledRasterizer {
    async fn rasterize(&self, _html: &str, budget: Duration) -> Result<Vec<u8>, Error> {
        let stall = tokio::time::sleep(Duration::from_secs(30));
        let printed = tokio::time::timeout(budget, stall).await;
        self.released.fetch_add(1, Ordering::SeqCst);
        match printed {
            Ok(()) => Ok(Vec::new()),
            Err(_) => Err(ErrorKind::RenderTimeout(budget).into()),
        }
    }
}

pub fn service_over(
    store: Arc<dyn InvoiceStore>,
    rasterizer: Arc<dyn Rasterizer>,
    render_timeout: Duration,
) -> InvoiceService {
    InvoiceService::new(
        store,
        DocumentRenderer::new(None, Tz::UTC).unwrap(),
        rasterizer,
        Tz::UTC,
        render_timeout,
    )
}

pub fn new_invoice(value: serde_json::Value) -> NewInvoice {
    serde_json::from_value(value).unwrap()
}

pub fn patch(value: serde_json::Value) -> InvoicePatch {
    serde_json::from_value(value).unwrap()
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Connection string for the Postgres suite, if one is configured.
pub fn database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
}

/// Return early from a test when no database is configured.
#[macro_export]
macro_rules! skip_if_no_database {
    () => {
        match common::database_url() {
            Some(url) => url,
            None => {
                eprintln!("Skipping Postgres test (set TEST_DATABASE_URL or DATABASE_URL)");
                return;
            }
        }
    };
}
