//! The invoice operations exposed to the boundary layer.
//!
//! Each call is stateless and touches at most one stored invoice, except `list` and `stats`
//! which are read-only. A missing invoice always comes back as [`ErrorKind::NotFound`], so
//! callers can tell "no such invoice" apart from a failing store or renderer.
//!
//! [`ErrorKind::NotFound`]: crate::error::ErrorKind::NotFound

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use chrono_tz::Tz;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    config::Settings,
    error::{AddContext, Error},
    invoice::{Invoice, InvoicePatch, NewInvoice},
    query::ListQuery,
    rasterizer::Rasterizer,
    stats::{self, DayBucket, Period, StatsWindow},
    store::InvoiceStore,
    template_env::DocumentRenderer,
    validation,
};

/// A rendered PDF ready to be sent as an attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub struct InvoiceService {
    store: Arc<dyn InvoiceStore>,
    renderer: DocumentRenderer,
    rasterizer: Arc<dyn Rasterizer>,
    timezone: Tz,
    render_timeout: Duration,
}

impl InvoiceService {
    pub fn new(
        store: Arc<dyn InvoiceStore>,
        renderer: DocumentRenderer,
        rasterizer: Arc<dyn Rasterizer>,
        timezone: Tz,
        render_timeout: Duration,
    ) -> Self {
        Self {
            store,
            renderer,
            rasterizer,
            timezone,
            render_timeout,
        }
    }

    /// Wire a service from loaded [`Settings`].
    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn InvoiceStore>,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Result<Self, Error> {
        let renderer = DocumentRenderer::new(settings.template_dir.as_deref(), settings.timezone)?;
        Ok(Self::new(
            store,
            renderer,
            rasterizer,
            settings.timezone,
            settings.render_timeout(),
        ))
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    #[instrument(skip(self, input))]
    pub async fn create(&self, input: NewInvoice) -> Result<Invoice, Error> {
        let draft = validation::validate_new(input, Utc::now(), self.timezone)
            .map_err(Error::from)
            .add_context("validating new invoice")?;
        self.store
            .insert(&draft)
            .await
            .add_context("creating invoice")
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<Invoice, Error> {
        let uuid = parse_id(id)?;
        self.store
            .fetch(uuid)
            .await
            .add_context("fetching invoice")?
            .ok_or_else(|| Error::not_found(id))
    }

    /// Replace the supplied top-level fields. With nothing supplied the current invoice is
    /// returned unchanged.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: &str, patch: InvoicePatch) -> Result<Invoice, Error> {
        let uuid = parse_id(id)?;
        let changes = validation::validate_patch(patch, self.timezone)
            .map_err(Error::from)
            .add_context("validating invoice update")?;
        self.store
            .update(uuid, &changes)
            .await
            .add_context("updating invoice")?
            .ok_or_else(|| Error::not_found(id))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<Invoice, Error> {
        let uuid = parse_id(id)?;
        let deleted = self
            .store
            .delete(uuid)
            .await
            .add_context("deleting invoice")?
            .ok_or_else(|| Error::not_found(id))?;
        info!(%uuid, "invoice deleted");
        Ok(deleted)
    }

    #[instrument(skip(self))]
    pub async fn list(&self, query: &ListQuery) -> Result<Vec<Invoice>, Error> {
        let filter = query.resolve(self.timezone);
        self.store
            .list(&filter)
            .await
            .add_context("listing invoices")
    }

    /// Sparse day buckets for the window ending today; days without invoices are absent.
    #[instrument(skip(self))]
    pub async fn stats(&self, period: Period) -> Result<Vec<DayBucket>, Error> {
        let window = StatsWindow::current(period, self.timezone);
        self.store
            .daily_totals(&window)
            .await
            .add_context("computing stats")
    }

    /// Like [`InvoiceService::stats`] but with one bucket for every day of the window.
    #[instrument(skip(self))]
    pub async fn stats_series(&self, period: Period) -> Result<Vec<DayBucket>, Error> {
        let window = StatsWindow::current(period, self.timezone);
        let sparse = self
            .store
            .daily_totals(&window)
            .await
            .add_context("computing stats")?;
        Ok(stats::fill_gaps(&window, sparse))
    }

    #[instrument(skip(self))]
    pub async fn export_html(&self, id: &str) -> Result<String, Error> {
        let invoice = self.get(id).await.add_context("exporting html")?;
        self.renderer
            .render(&invoice)
            .add_context("exporting html")
    }

    /// Render to HTML, then rasterize within the configured time budget. The rasterizer enforces
    /// the budget itself so it can release its browser session; exceeding it is reported as
    /// [`crate::ErrorKind::RenderTimeout`] and nothing is retried.
    #[instrument(skip(self))]
    pub async fn export_pdf(&self, id: &str) -> Result<PdfDocument, Error> {
        let invoice = self.get(id).await.add_context("exporting pdf")?;
        let html = self
            .renderer
            .render(&invoice)
            .add_context("exporting pdf")?;
        let bytes = self
            .rasterizer
            .rasterize(&html, self.render_timeout)
            .await
            .add_context("exporting pdf")?;
        Ok(PdfDocument {
            filename: pdf_filename(&invoice),
            bytes,
        })
    }
}

pub fn pdf_filename(invoice: &Invoice) -> String {
    format!("invoice-{}.pdf", invoice.id())
}

/// Ids that are not UUIDs cannot name a stored invoice.
fn parse_id(id: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(id.trim()).map_err(|_| Error::not_found(id))
}
