//! Postgres store integration tests
//!
//! Runs the lifecycle, listing and stats cases against a live database so the real SQL, row
//! mapping and JSONB handling are exercised. Set `TEST_DATABASE_URL` (or `DATABASE_URL`) to a
//! scratch database; without it every test here is skipped.
//!
//! Rows are tagged with a random prefix per test and removed afterwards, so the suite can share
//! a database with other data.

mod common;

use std::{str::FromStr, sync::Arc, time::Duration};

use bigdecimal::BigDecimal;
use chrono::{Days, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use common::{StubRasterizer, day, new_invoice, patch, service_over};
use invoice_desk::{
    InvoiceService, InvoiceStore, ListQuery, PgInvoiceStore, Period, stats::StatsWindow,
};
use serde_json::json;
use uuid::Uuid;

struct TestDb {
    store: PgInvoiceStore,
    tag: String,
}

impl TestDb {
    async fn connect(url: &str) -> Self {
        let store = PgInvoiceStore::connect(url, 2)
            .await
            .expect("Failed to connect to test database");
        store.health_check().await.expect("Database is not healthy");
        store
            .run_migrations()
            .await
            .expect("Failed to run migrations");
        Self {
            store,
            tag: Uuid::new_v4().simple().to_string()[..10].to_string(),
        }
    }

    fn service(&self) -> InvoiceService {
        service_over(
            Arc::new(self.store.clone()),
            Arc::new(StubRasterizer),
            Duration::from_secs(10),
        )
    }

    fn number(&self, suffix: &str) -> String {
        format!("{}-{suffix}", self.tag)
    }

    async fn cleanup(&self) {
        sqlx::query("DELETE FROM invoices WHERE invoice_number LIKE $1")
            .bind(format!("{}-%", self.tag))
            .execute(self.store.pool())
            .await
            .expect("Failed to clean up test invoices");
    }
}

#[tokio::test]
async fn test_pg_create_fetch_round_trip() {
    let url = skip_if_no_database!();
    let db = TestDb::connect(&url).await;
    let service = db.service();

    let created = service
        .create(new_invoice(json!({
            "invoice_number": db.number("1"),
            "customer_name": "Acme",
            "customer_address": "1 Main St",
            "date": "2024-01-10",
            "items": [
                {
                    "name": "Widget", "qty": 2, "price": 1000, "amount": 2000,
                    "unit": "kg", "sku": "X1"
                },
                {"name": "Gadget", "qty": "1", "price": "500.50", "amount": "500.50"}
            ],
            "total": "2500.50",
            "meta": {"status": "paid", "note": "thanks"}
        })))
        .await
        .unwrap();
    assert_eq!(created.date(), Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap());

    let fetched = service.get(&created.id().to_string()).await.unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.items()[1].price(), &BigDecimal::from_str("500.50").unwrap());
    assert_eq!(fetched.items()[0].extra()["unit"], "kg");
    assert_eq!(fetched.total(), &BigDecimal::from_str("2500.50").unwrap());
    assert_eq!(fetched.meta()["note"], "thanks");

    db.cleanup().await;
}

#[tokio::test]
async fn test_pg_update_and_delete_return_rows() {
    let url = skip_if_no_database!();
    let db = TestDb::connect(&url).await;
    let service = db.service();

    let created = service
        .create(new_invoice(json!({
            "invoice_number": db.number("2"),
            "customer_name": "Acme",
            "items": [{"name": "Widget", "qty": 1, "price": 10, "amount": 10}],
            "total": 10
        })))
        .await
        .unwrap();
    let id = created.id().to_string();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let updated = service
        .update(&id, patch(json!({"customer_name": "Globex"})))
        .await
        .unwrap();
    assert_eq!(updated.customer_name(), Some("Globex"));
    assert_eq!(updated.invoice_number(), created.invoice_number());
    assert_eq!(updated.date(), created.date());
    assert_eq!(updated.items(), created.items());
    assert_eq!(updated.created_at(), created.created_at());
    assert!(updated.updated_at() > created.updated_at());

    let unchanged = service.update(&id, patch(json!({}))).await.unwrap();
    assert_eq!(unchanged, updated);

    let deleted = service.delete(&id).await.unwrap();
    assert_eq!(deleted.id(), created.id());
    assert!(service.get(&id).await.unwrap_err().is_not_found());
    assert!(service.delete(&id).await.unwrap_err().is_not_found());

    db.cleanup().await;
}

#[tokio::test]
async fn test_pg_list_filters_dates_and_matches_search_literally() {
    let url = skip_if_no_database!();
    let db = TestDb::connect(&url).await;
    let service = db.service();

    for (suffix, date) in [
        ("A", json!("2024-01-05")),
        ("B", json!("2024-01-10")),
        ("C", json!("2024-01-15")),
        ("D", json!("2024-01-20T23:30:00Z")),
        ("E", json!("2024-01-25")),
        ("100%", json!("2024-02-01")),
        ("1000", json!("2024-02-02")),
    ] {
        service
            .create(new_invoice(json!({
                "invoice_number": db.number(suffix),
                "customer_name": "Acme",
                "date": date
            })))
            .await
            .unwrap();
    }

    let ranged = service
        .list(&ListQuery {
            search: Some(db.tag.clone()),
            from: Some(day(2024, 1, 10)),
            to: Some(day(2024, 1, 20)),
            ..Default::default()
        })
        .await
        .unwrap();
    let numbers: Vec<_> = ranged.iter().filter_map(|i| i.invoice_number()).collect();
    assert_eq!(numbers, [db.number("D"), db.number("C"), db.number("B")]);

    let literal = service
        .list(&ListQuery {
            search: Some(db.number("100%").to_uppercase()),
            ..Default::default()
        })
        .await
        .unwrap();
    let numbers: Vec<_> = literal.iter().filter_map(|i| i.invoice_number()).collect();
    assert_eq!(numbers, [db.number("100%")]);

    db.cleanup().await;
}

#[tokio::test]
async fn test_pg_daily_totals_cut_days_in_timezone() {
    let url = skip_if_no_database!();
    let db = TestDb::connect(&url).await;
    let service = db.service();

    // a random far-past day keeps this window clear of any other data
    let offset = u64::from(Uuid::new_v4().as_bytes()[0]) * 40;
    let last = NaiveDate::from_ymd_opt(1990, 1, 1)
        .unwrap()
        .checked_add_days(Days::new(offset))
        .unwrap();
    let before = last.checked_sub_days(Days::new(1)).unwrap();
    let outside = last.checked_sub_days(Days::new(30)).unwrap();
    let at = |d: NaiveDate, h: u32| {
        Utc.from_utc_datetime(&d.and_hms_opt(h, 0, 0).unwrap())
            .to_rfc3339()
    };

    for (suffix, date, total) in [
        // 19:00 local on `before`
        ("1", at(before, 12), 300),
        // 03:00 local on `last`
        ("2", at(before, 20), 500),
        ("3", at(last, 5), 700),
        ("4", at(outside, 12), 9000),
    ] {
        service
            .create(new_invoice(json!({
                "invoice_number": db.number(suffix),
                "customer_name": "Acme",
                "date": date,
                "total": total
            })))
            .await
            .unwrap();
    }

    let tz: Tz = "Asia/Ho_Chi_Minh".parse().unwrap();
    let window = StatsWindow::ending_on(Period::Week, last, tz);
    let buckets = db.store.daily_totals(&window).await.unwrap();

    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0].day, before);
    assert_eq!(buckets[0].count, 1);
    assert_eq!(buckets[0].total, BigDecimal::from(300));
    assert_eq!(buckets[1].day, last);
    assert_eq!(buckets[1].count, 2);
    assert_eq!(buckets[1].total, BigDecimal::from(1200));

    db.cleanup().await;
}
