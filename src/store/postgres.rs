//! PostgreSQL storage backend using sqlx.
//!
//! Statements come from [`crate::query`]; this module only binds their parameters and maps rows.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{
    Postgres,
    postgres::{PgArguments, PgPool, PgPoolOptions},
    query::QueryAs,
    types::Json,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    error::{AddContext, Error},
    invoice::Invoice,
    query::{self, ListFilter, QueryPlan, SqlParam},
    stats::{DayBucket, StatsWindow},
    store::InvoiceStore,
    validation::{InvoiceChanges, InvoiceDraft},
};

/// Invoice storage backed by a shared connection pool.
#[derive(Clone, Debug)]
pub struct PgInvoiceStore {
    pool: PgPool,
}

impl PgInvoiceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open the process-wide pool.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, Error> {
        info!(max_connections, "connecting to PostgreSQL");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(Error::from)
            .add_context("connecting to database")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT now()")
            .execute(&self.pool)
            .await
            .map_err(Error::from)
            .add_context("checking database health")?;
        Ok(())
    }

    /// Apply the bundled schema. Used by deployment tooling, not by the service itself.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), Error> {
        info!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(Error::from)
            .add_context("running migrations")?;
        Ok(())
    }

    async fn fetch_optional(&self, plan: QueryPlan) -> Result<Option<Invoice>, Error> {
        debug!(sql = %plan.sql, params = plan.params.len(), "executing");
        let query = bind_params(sqlx::query_as::<_, Invoice>(&plan.sql), &plan.params);
        Ok(query.fetch_optional(&self.pool).await?)
    }
}

fn bind_params<'q, O>(
    mut query: QueryAs<'q, Postgres, O, PgArguments>,
    params: &[SqlParam],
) -> QueryAs<'q, Postgres, O, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Uuid(v) => query.bind(*v),
            SqlParam::Text(v) => query.bind(v.clone()),
            SqlParam::OptionalText(v) => query.bind(v.clone()),
            SqlParam::Instant(v) => query.bind(*v),
            SqlParam::Decimal(v) => query.bind(v.clone()),
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Items(v) => query.bind(Json(v.clone())),
            SqlParam::Meta(v) => query.bind(Json(v.clone())),
        };
    }
    query
}

#[async_trait]
impl InvoiceStore for PgInvoiceStore {
    #[instrument(skip(self, draft), fields(invoice_number = %draft.invoice_number))]
    async fn insert(&self, draft: &InvoiceDraft) -> Result<Invoice, Error> {
        let plan = query::insert(draft);
        let invoice = bind_params(sqlx::query_as::<_, Invoice>(&plan.sql), &plan.params)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::from)
            .add_context("inserting invoice")?;
        info!(id = %invoice.id(), "invoice created");
        Ok(invoice)
    }

    #[instrument(skip(self))]
    async fn fetch(&self, id: Uuid) -> Result<Option<Invoice>, Error> {
        self.fetch_optional(query::fetch(id))
            .await
            .add_context("fetching invoice")
    }

    #[instrument(skip(self, changes))]
    async fn update(&self, id: Uuid, changes: &InvoiceChanges) -> Result<Option<Invoice>, Error> {
        match query::update(id, changes) {
            Some(plan) => self
                .fetch_optional(plan)
                .await
                .add_context("updating invoice"),
            None => self.fetch(id).await,
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> Result<Option<Invoice>, Error> {
        self.fetch_optional(query::delete(id))
            .await
            .add_context("deleting invoice")
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: &ListFilter) -> Result<Vec<Invoice>, Error> {
        let plan = query::list(filter);
        debug!(sql = %plan.sql, params = plan.params.len(), "executing");
        Ok(
            bind_params(sqlx::query_as::<_, Invoice>(&plan.sql), &plan.params)
                .fetch_all(&self.pool)
                .await
                .map_err(Error::from)
                .add_context("listing invoices")?,
        )
    }

    #[instrument(skip(self))]
    async fn daily_totals(&self, window: &StatsWindow) -> Result<Vec<DayBucket>, Error> {
        let plan = query::daily_totals(window);
        debug!(sql = %plan.sql, "executing");
        Ok(
            bind_params(sqlx::query_as::<_, DayBucket>(&plan.sql), &plan.params)
                .fetch_all(&self.pool)
                .await
                .map_err(Error::from)
                .add_context("aggregating daily totals")?,
        )
    }
}
