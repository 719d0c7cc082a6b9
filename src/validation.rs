//! Normalization and validation of incoming invoice payloads.
//!
//! Create payloads get their defaults applied here (date, items, total, meta) and update payloads
//! are reduced to the set of fields actually supplied. Both pass through a validation stage that
//! collects every field error instead of stopping at the first one. Amounts and totals are
//! trusted as supplied: a mismatch with `qty * price` is logged, not rejected.

use std::fmt::Display;

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    invoice::{DateInput, InvoicePatch, LineItem, NewInvoice},
    stats::start_of_day,
};

/// A single rejected field, addressed by its path in the payload (`items[2].qty`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl From<Vec<FieldError>> for ValidationErrors {
    fn from(value: Vec<FieldError>) -> Self {
        Self(value)
    }
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{joined}")
    }
}

/// A create payload with defaults applied, ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceDraft {
    pub invoice_number: String,
    pub template_type: Option<String>,
    pub customer_name: String,
    pub customer_address: Option<String>,
    pub date: DateTime<Utc>,
    pub items: Vec<LineItem>,
    pub total: BigDecimal,
    pub meta: Map<String, Value>,
}

/// The subset of columns an update will assign. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceChanges {
    pub invoice_number: Option<String>,
    pub template_type: Option<String>,
    pub customer_name: Option<String>,
    pub customer_address: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub items: Option<Vec<LineItem>>,
    pub total: Option<BigDecimal>,
    pub meta: Option<Map<String, Value>>,
}

impl InvoiceChanges {
    pub fn is_empty(&self) -> bool {
        self == &InvoiceChanges::default()
    }
}

/// Resolve a payload date to an instant. Bare days land on local midnight in `tz`.
pub fn resolve_date(input: DateInput, tz: Tz) -> DateTime<Utc> {
    match input {
        DateInput::Instant(instant) => instant.with_timezone(&Utc),
        DateInput::Day(day) => start_of_day(day, tz),
    }
}

/// Apply creation defaults and validate.
///
/// * a missing `date` becomes `now`
/// * missing `items` become an empty list
/// * a missing `total` becomes `0` and missing `meta` an empty map
///
/// # Errors
/// Every rule violation found, in payload order.
pub fn validate_new(
    input: NewInvoice,
    now: DateTime<Utc>,
    tz: Tz,
) -> Result<InvoiceDraft, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let invoice_number = required_text(&mut errors, "invoice_number", input.invoice_number);
    let customer_name = required_text(&mut errors, "customer_name", input.customer_name);
    let items = input.items.unwrap_or_default();
    check_items(&mut errors, &items);
    let total = input.total.unwrap_or_else(BigDecimal::zero);
    check_total(&mut errors, &total);
    let meta = input.meta.unwrap_or_default();
    check_meta(&mut errors, &meta);

    warn_on_mismatch(&items, Some(&total));

    errors.into_result(InvoiceDraft {
        invoice_number,
        template_type: input.template_type,
        customer_name,
        customer_address: input.customer_address,
        date: input.date.map(|d| resolve_date(d, tz)).unwrap_or(now),
        items,
        total,
        meta,
    })
}

/// Reduce a patch to the fields present and validate those fields only.
///
/// # Errors
/// Every rule violation found among the supplied fields.
pub fn validate_patch(input: InvoicePatch, tz: Tz) -> Result<InvoiceChanges, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if let Some(number) = &input.invoice_number {
        check_not_blank(&mut errors, "invoice_number", number);
    }
    if let Some(name) = &input.customer_name {
        check_not_blank(&mut errors, "customer_name", name);
    }
    if let Some(items) = &input.items {
        check_items(&mut errors, items);
        warn_on_mismatch(items, input.total.as_ref());
    }
    if let Some(total) = &input.total {
        check_total(&mut errors, total);
    }
    if let Some(meta) = &input.meta {
        check_meta(&mut errors, meta);
    }

    errors.into_result(InvoiceChanges {
        invoice_number: input.invoice_number,
        template_type: input.template_type,
        customer_name: input.customer_name,
        customer_address: input.customer_address,
        date: input.date.map(|d| resolve_date(d, tz)),
        items: input.items,
        total: input.total,
        meta: input.meta,
    })
}

fn required_text(errors: &mut ValidationErrors, field: &str, value: Option<String>) -> String {
    match value {
        Some(v) => {
            check_not_blank(errors, field, &v);
            v
        }
        None => {
            errors.push(field, "is required");
            String::new()
        }
    }
}

fn check_not_blank(errors: &mut ValidationErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(field, "must not be blank");
    }
}

fn check_items(errors: &mut ValidationErrors, items: &[LineItem]) {
    for (i, item) in items.iter().enumerate() {
        if item.name().trim().is_empty() {
            errors.push(format!("items[{i}].name"), "must not be blank");
        }
        if item.qty() < &BigDecimal::zero() {
            errors.push(format!("items[{i}].qty"), "must not be negative");
        }
        if item.price() < &BigDecimal::zero() {
            errors.push(format!("items[{i}].price"), "must not be negative");
        }
    }
}

fn check_total(errors: &mut ValidationErrors, total: &BigDecimal) {
    if total < &BigDecimal::zero() {
        errors.push("total", "must not be negative");
    }
}

fn check_meta(errors: &mut ValidationErrors, meta: &Map<String, Value>) {
    if let Some(status) = meta.get("status") {
        if !status.is_string() {
            errors.push("meta.status", "must be a string");
        }
    }
}

fn warn_on_mismatch(items: &[LineItem], total: Option<&BigDecimal>) {
    for (i, item) in items.iter().enumerate() {
        if !item.is_consistent() {
            tracing::warn!(
                line = i,
                amount = %item.amount(),
                computed = %item.computed_amount(),
                "line amount differs from qty * price; storing as supplied"
            );
        }
    }
    if let Some(total) = total {
        let computed: BigDecimal = items.iter().map(LineItem::amount).sum();
        if total != &computed {
            tracing::warn!(
                %total,
                %computed,
                "invoice total differs from sum of line amounts; storing as supplied"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{NaiveDate, TimeZone};
    use serde_json::json;

    use super::*;

    fn new_invoice(value: Value) -> NewInvoice {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn create_applies_defaults() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let draft = validate_new(
            new_invoice(json!({"invoice_number": "INV-1", "customer_name": "Acme"})),
            now,
            Tz::UTC,
        )
        .unwrap();
        assert_eq!(draft.date, now);
        assert!(draft.items.is_empty());
        assert_eq!(draft.total, BigDecimal::zero());
        assert!(draft.meta.is_empty());
        assert_eq!(draft.template_type, None);
    }

    #[test]
    fn create_keeps_inconsistent_amounts() {
        let draft = validate_new(
            new_invoice(json!({
                "invoice_number": "INV-1",
                "customer_name": "Acme",
                "items": [{"name": "A", "qty": 2, "price": 1000, "amount": 1999}],
                "total": 5
            })),
            Utc::now(),
            Tz::UTC,
        )
        .unwrap();
        assert_eq!(draft.items[0].amount(), &BigDecimal::from(1999));
        assert_eq!(draft.total, BigDecimal::from(5));
    }

    #[test]
    fn create_reports_every_error() {
        let errors = validate_new(
            new_invoice(json!({
                "customer_name": "  ",
                "items": [
                    {"name": "ok", "qty": 1, "price": 1, "amount": 1},
                    {"name": "", "qty": -1, "price": -2, "amount": 2}
                ],
                "total": "-3",
                "meta": {"status": 4}
            })),
            Utc::now(),
            Tz::UTC,
        )
        .unwrap_err();
        let fields: Vec<_> = errors.errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "invoice_number",
                "customer_name",
                "items[1].name",
                "items[1].qty",
                "items[1].price",
                "total",
                "meta.status"
            ]
        );
    }

    #[test]
    fn bare_day_resolves_to_local_midnight() {
        let tz = Tz::from_str("Asia/Ho_Chi_Minh").unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        assert_eq!(
            resolve_date(DateInput::Day(day), tz),
            Utc.with_ymd_and_hms(2024, 1, 9, 17, 0, 0).unwrap()
        );
    }

    #[test]
    fn patch_only_carries_present_fields() {
        let patch: InvoicePatch =
            serde_json::from_value(json!({"customer_name": "New name"})).unwrap();
        let changes = validate_patch(patch, Tz::UTC).unwrap();
        assert_eq!(changes.customer_name.as_deref(), Some("New name"));
        assert!(changes.items.is_none());
        assert!(changes.total.is_none());
        assert!(changes.date.is_none());
        assert!(!changes.is_empty());
    }

    #[test]
    fn empty_patch_is_empty() {
        let patch: InvoicePatch = serde_json::from_value(json!({"unknown": true})).unwrap();
        assert!(validate_patch(patch, Tz::UTC).unwrap().is_empty());
    }

    #[test]
    fn patch_rejects_blank_required_text() {
        let patch: InvoicePatch = serde_json::from_value(json!({"invoice_number": ""})).unwrap();
        let errors = validate_patch(patch, Tz::UTC).unwrap_err();
        assert_eq!(errors.to_string(), "invoice_number: must not be blank");
    }
}
