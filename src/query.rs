//! Query plans for the invoice table.
//!
//! Every statement the Postgres store issues is built here as a [`QueryPlan`]: SQL text with
//! positional placeholders plus the values to bind to them, in order. Caller-supplied values never
//! end up in the SQL text itself.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
    invoice::{Invoice, LineItem},
    stats::{StatsWindow, next_day, start_of_day},
    validation::{InvoiceChanges, InvoiceDraft},
};

pub const DEFAULT_LIMIT: i64 = 50;

const TABLE: &str = "invoices";
const COLUMNS: &str = "id, invoice_number, template_type, customer_name, customer_address, \
                       date, items, total, meta, created_at, updated_at";

/// A value bound to a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Uuid(Uuid),
    Text(String),
    OptionalText(Option<String>),
    Instant(DateTime<Utc>),
    Decimal(BigDecimal),
    Int(i64),
    Items(Vec<LineItem>),
    Meta(Map<String, Value>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryPlan {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl QueryPlan {
    /// Register `param` and return its placeholder.
    fn bind(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    /// Parse raw limit/offset values. Missing, non-numeric or negative values fall back to the
    /// defaults (50 and 0); a zero limit also falls back to 50.
    pub fn parse(limit: Option<&str>, offset: Option<&str>) -> Self {
        let limit = limit
            .and_then(|l| l.trim().parse::<i64>().ok())
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_LIMIT);
        let offset = offset
            .and_then(|o| o.trim().parse::<i64>().ok())
            .filter(|o| *o >= 0)
            .unwrap_or(0);
        Self { limit, offset }
    }
}

/// A listing request as received from the boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub search: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Pagination,
}

impl ListQuery {
    /// Turn calendar-day bounds into instants in `tz`. Both ends are inclusive: `to` covers the
    /// whole of that day.
    pub fn resolve(&self, tz: Tz) -> ListFilter {
        ListFilter {
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            from: self.from.map(|d| start_of_day(d, tz)),
            until: self.to.map(|d| start_of_day(next_day(d), tz)),
            page: self.page,
        }
    }
}

/// A listing request with its bounds resolved to instants: `from <= date < until`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    pub search: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub page: Pagination,
}

impl ListFilter {
    /// In-process equivalent of the `WHERE` clause built by [`list`].
    pub fn matches(&self, invoice: &Invoice) -> bool {
        let search_ok = self.search.as_deref().is_none_or(|term| {
            let term = term.to_lowercase();
            [invoice.invoice_number(), invoice.customer_name()]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&term))
        });
        search_ok
            && self.from.is_none_or(|from| invoice.date() >= from)
            && self.until.is_none_or(|until| invoice.date() < until)
    }
}

/// `%term%` with LIKE metacharacters escaped so the term matches literally.
pub fn search_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

pub fn insert(draft: &InvoiceDraft) -> QueryPlan {
    let mut plan = QueryPlan::default();
    let values = [
        plan.bind(SqlParam::Text(draft.invoice_number.clone())),
        plan.bind(SqlParam::OptionalText(draft.template_type.clone())),
        plan.bind(SqlParam::Text(draft.customer_name.clone())),
        plan.bind(SqlParam::OptionalText(draft.customer_address.clone())),
        plan.bind(SqlParam::Instant(draft.date)),
        plan.bind(SqlParam::Items(draft.items.clone())),
        plan.bind(SqlParam::Decimal(draft.total.clone())),
        plan.bind(SqlParam::Meta(draft.meta.clone())),
    ];
    plan.sql = format!(
        "INSERT INTO {TABLE} (invoice_number, template_type, customer_name, customer_address, \
         date, items, total, meta) VALUES ({}) RETURNING {COLUMNS}",
        values.join(", ")
    );
    plan
}

pub fn fetch(id: Uuid) -> QueryPlan {
    let mut plan = QueryPlan::default();
    let p = plan.bind(SqlParam::Uuid(id));
    plan.sql = format!("SELECT {COLUMNS} FROM {TABLE} WHERE id = {p}");
    plan
}

/// Assign only the supplied columns, always refreshing `updated_at`. Returns `None` when there
/// is nothing to change; callers fetch the current row instead of issuing a no-op write.
pub fn update(id: Uuid, changes: &InvoiceChanges) -> Option<QueryPlan> {
    if changes.is_empty() {
        return None;
    }

    let mut plan = QueryPlan::default();
    let mut assignments = Vec::new();
    if let Some(v) = &changes.invoice_number {
        assignments.push(format!("invoice_number = {}", plan.bind(SqlParam::Text(v.clone()))));
    }
    if let Some(v) = &changes.template_type {
        assignments.push(format!("template_type = {}", plan.bind(SqlParam::Text(v.clone()))));
    }
    if let Some(v) = &changes.customer_name {
        assignments.push(format!("customer_name = {}", plan.bind(SqlParam::Text(v.clone()))));
    }
    if let Some(v) = &changes.customer_address {
        assignments.push(format!(
            "customer_address = {}",
            plan.bind(SqlParam::Text(v.clone()))
        ));
    }
    if let Some(v) = changes.date {
        assignments.push(format!("date = {}", plan.bind(SqlParam::Instant(v))));
    }
    if let Some(v) = &changes.items {
        assignments.push(format!("items = {}", plan.bind(SqlParam::Items(v.clone()))));
    }
    if let Some(v) = &changes.total {
        assignments.push(format!("total = {}", plan.bind(SqlParam::Decimal(v.clone()))));
    }
    if let Some(v) = &changes.meta {
        assignments.push(format!("meta = {}", plan.bind(SqlParam::Meta(v.clone()))));
    }
    assignments.push(String::from("updated_at = now()"));

    let id = plan.bind(SqlParam::Uuid(id));
    plan.sql = format!(
        "UPDATE {TABLE} SET {} WHERE id = {id} RETURNING {COLUMNS}",
        assignments.join(", ")
    );
    Some(plan)
}

pub fn delete(id: Uuid) -> QueryPlan {
    let mut plan = QueryPlan::default();
    let p = plan.bind(SqlParam::Uuid(id));
    plan.sql = format!("DELETE FROM {TABLE} WHERE id = {p} RETURNING {COLUMNS}");
    plan
}

/// Filtered, newest-first page of invoices. `id` breaks ties between equal dates so pages are
/// stable.
pub fn list(filter: &ListFilter) -> QueryPlan {
    let mut plan = QueryPlan::default();
    let mut conditions = Vec::new();
    if let Some(term) = &filter.search {
        let p = plan.bind(SqlParam::Text(search_pattern(term)));
        conditions.push(format!("(invoice_number ILIKE {p} OR customer_name ILIKE {p})"));
    }
    if let Some(from) = filter.from {
        conditions.push(format!("date >= {}", plan.bind(SqlParam::Instant(from))));
    }
    if let Some(until) = filter.until {
        conditions.push(format!("date < {}", plan.bind(SqlParam::Instant(until))));
    }
    let where_sql = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    let limit = plan.bind(SqlParam::Int(filter.page.limit));
    let offset = plan.bind(SqlParam::Int(filter.page.offset));
    plan.sql = format!(
        "SELECT {COLUMNS} FROM {TABLE}{where_sql} ORDER BY date DESC, id DESC \
         LIMIT {limit} OFFSET {offset}"
    );
    plan
}

/// Count and revenue per local calendar day inside `window`, ascending. Days without invoices
/// yield no row.
pub fn daily_totals(window: &StatsWindow) -> QueryPlan {
    let (start, end) = window.bounds();
    let mut plan = QueryPlan::default();
    let tz = plan.bind(SqlParam::Text(window.timezone.name().to_string()));
    let start = plan.bind(SqlParam::Instant(start));
    let end = plan.bind(SqlParam::Instant(end));
    plan.sql = format!(
        "SELECT (date AT TIME ZONE {tz})::date AS day, count(*) AS count, \
         COALESCE(sum(total), 0) AS total FROM {TABLE} \
         WHERE date >= {start} AND date < {end} GROUP BY 1 ORDER BY 1"
    );
    plan
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{InvoiceBuilder, stats::Period};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn pagination_defaults() {
        assert_eq!(Pagination::parse(None, None), Pagination::default());
        assert_eq!(
            Pagination::parse(Some("abc"), Some("-3")),
            Pagination {
                limit: 50,
                offset: 0
            }
        );
        assert_eq!(
            Pagination::parse(Some("0"), Some("10")),
            Pagination {
                limit: 50,
                offset: 10
            }
        );
        assert_eq!(
            Pagination::parse(Some(" 20 "), Some("5")),
            Pagination {
                limit: 20,
                offset: 5
            }
        );
    }

    #[test]
    fn unfiltered_list_only_binds_pagination() {
        let plan = list(&ListFilter::default());
        assert_eq!(
            plan.sql,
            format!(
                "SELECT {COLUMNS} FROM invoices ORDER BY date DESC, id DESC LIMIT $1 OFFSET $2"
            )
        );
        assert_eq!(plan.params, vec![SqlParam::Int(50), SqlParam::Int(0)]);
    }

    #[test]
    fn list_combines_search_and_range() {
        let filter = ListQuery {
            search: Some(" INV-42 ".to_string()),
            from: Some(day(2024, 1, 10)),
            to: Some(day(2024, 1, 20)),
            page: Pagination {
                limit: 10,
                offset: 20,
            },
        }
        .resolve(Tz::UTC);
        let plan = list(&filter);
        assert_eq!(
            plan.sql,
            format!(
                "SELECT {COLUMNS} FROM invoices WHERE (invoice_number ILIKE $1 OR customer_name \
                 ILIKE $1) AND date >= $2 AND date < $3 ORDER BY date DESC, id DESC LIMIT $4 \
                 OFFSET $5"
            )
        );
        assert_eq!(
            plan.params,
            vec![
                SqlParam::Text("%INV-42%".to_string()),
                SqlParam::Instant(Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap()),
                SqlParam::Instant(Utc.with_ymd_and_hms(2024, 1, 21, 0, 0, 0).unwrap()),
                SqlParam::Int(10),
                SqlParam::Int(20),
            ]
        );
    }

    #[test]
    fn hostile_search_stays_in_parameters() {
        let filter = ListQuery {
            search: Some("'; DROP TABLE invoices; -- 100%_".to_string()),
            ..Default::default()
        }
        .resolve(Tz::UTC);
        let plan = list(&filter);
        assert!(!plan.sql.contains("DROP"));
        assert_eq!(
            plan.params[0],
            SqlParam::Text("%'; DROP TABLE invoices; -- 100\\%\\_%".to_string())
        );
    }

    #[test]
    fn blank_search_is_no_filter() {
        let filter = ListQuery {
            search: Some("   ".to_string()),
            ..Default::default()
        }
        .resolve(Tz::UTC);
        assert_eq!(filter.search, None);
    }

    #[test]
    fn update_assigns_only_present_fields() {
        let id = Uuid::new_v4();
        let changes = InvoiceChanges {
            customer_name: Some("New".to_string()),
            total: Some(BigDecimal::from(7)),
            ..Default::default()
        };
        let plan = update(id, &changes).unwrap();
        assert_eq!(
            plan.sql,
            format!(
                "UPDATE invoices SET customer_name = $1, total = $2, updated_at = now() \
                 WHERE id = $3 RETURNING {COLUMNS}"
            )
        );
        assert_eq!(
            plan.params,
            vec![
                SqlParam::Text("New".to_string()),
                SqlParam::Decimal(BigDecimal::from(7)),
                SqlParam::Uuid(id),
            ]
        );
    }

    #[test]
    fn empty_update_short_circuits() {
        assert_eq!(update(Uuid::new_v4(), &InvoiceChanges::default()), None);
    }

    #[test]
    fn insert_binds_every_column() {
        let draft = InvoiceDraft {
            invoice_number: "INV-1".to_string(),
            template_type: Some("retail".to_string()),
            customer_name: "Acme".to_string(),
            customer_address: None,
            date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            items: vec![],
            total: BigDecimal::from(0),
            meta: Map::new(),
        };
        let plan = insert(&draft);
        assert!(plan.sql.starts_with(
            "INSERT INTO invoices (invoice_number, template_type, customer_name, \
             customer_address, date, items, total, meta) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ));
        assert_eq!(plan.params.len(), 8);
        assert_eq!(plan.params[3], SqlParam::OptionalText(None));
    }

    #[test]
    fn stats_plan_binds_timezone_and_window() {
        let window = StatsWindow::ending_on(Period::Week, day(2024, 3, 10), Tz::UTC);
        let plan = daily_totals(&window);
        assert!(plan.sql.contains("(date AT TIME ZONE $1)::date AS day"));
        assert!(plan.sql.contains("WHERE date >= $2 AND date < $3"));
        assert_eq!(
            plan.params,
            vec![
                SqlParam::Text("UTC".to_string()),
                SqlParam::Instant(Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()),
                SqlParam::Instant(Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap()),
            ]
        );
    }

    #[test]
    fn filter_matches_like_the_sql() {
        let inv = InvoiceBuilder::default()
            .invoice_number("INV-42xyz")
            .customer_name("Acme")
            .date(Utc.with_ymd_and_hms(2024, 1, 20, 23, 59, 0).unwrap())
            .build()
            .unwrap();
        let filter = |search: &str| {
            ListQuery {
                search: Some(search.to_string()),
                from: Some(day(2024, 1, 10)),
                to: Some(day(2024, 1, 20)),
                ..Default::default()
            }
            .resolve(Tz::UTC)
        };
        assert!(filter("inv-42").matches(&inv));
        assert!(filter("acm").matches(&inv));
        assert!(!filter("INV-43").matches(&inv));
    }
}
