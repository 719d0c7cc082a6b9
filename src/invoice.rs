//! Invoice domain types and serialization helpers.
//!
//! This module defines the structures used to represent invoices and their line items, plus the
//! create and update payloads accepted by the service. Money and quantities are [`BigDecimal`]
//! and are written to JSON as strings so that no value passes through a binary float. On the way
//! in, both JSON numbers and numeric strings are accepted. Builders are derived for constructing
//! instances in code, with custom build logic for defaulted fields.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use derive_builder::Builder;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::validation::{InvoiceChanges, InvoiceDraft};

fn serialize_bigdecimal<S>(value: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(serde_json::Number),
    Text(String),
}

impl Numeric {
    fn into_decimal<E: serde::de::Error>(self) -> Result<BigDecimal, E> {
        let raw = match self {
            Numeric::Number(n) => n.to_string(),
            Numeric::Text(s) => s.trim().to_string(),
        };
        BigDecimal::from_str(&raw).map_err(|e| E::custom(format!("invalid number '{raw}': {e}")))
    }
}

fn deserialize_bigdecimal<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    Numeric::deserialize(deserializer)?.into_decimal()
}

fn deserialize_optional_bigdecimal<'de, D>(deserializer: D) -> Result<Option<BigDecimal>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Numeric>::deserialize(deserializer)?
        .map(Numeric::into_decimal)
        .transpose()
}

/// A single row of an invoice: what was sold, how many, at what unit price, and the line amount
/// the caller computed for it.
///
/// `amount` is stored exactly as supplied. Use [`LineItem::computed_amount`] to compare it
/// against `qty * price`. Keys other than the four above are kept in `extra` and written back
/// unchanged.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(skip), pattern = "owned")]
pub struct LineItem {
    #[serde(default)]
    name: String,
    #[serde(
        default,
        serialize_with = "serialize_bigdecimal",
        deserialize_with = "deserialize_bigdecimal"
    )]
    qty: BigDecimal,
    #[serde(
        default,
        serialize_with = "serialize_bigdecimal",
        deserialize_with = "deserialize_bigdecimal"
    )]
    price: BigDecimal,
    #[serde(
        default,
        serialize_with = "serialize_bigdecimal",
        deserialize_with = "deserialize_bigdecimal"
    )]
    amount: BigDecimal,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl LineItemBuilder {
    /// Validate builder fields and produce the [`LineItem`].
    ///
    /// When no `amount` was given it is filled in as `qty * price`; an explicit `amount` is kept
    /// as-is even if it disagrees.
    ///
    /// # Errors
    /// [`LineItemBuilderError::UninitializedField`] if `name`, `qty` or `price` is missing
    ///
    /// # Example
    /// ```rust
    /// use bigdecimal::BigDecimal;
    /// use invoice_desk::LineItemBuilder;
    ///
    /// let item = LineItemBuilder::default()
    ///     .name("Gadget")
    ///     .qty(2)
    ///     .price(BigDecimal::from(9))
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(item.amount(), &BigDecimal::from(18));
    /// ```
    pub fn build(self) -> Result<LineItem, LineItemBuilderError> {
        let name = self
            .name
            .ok_or(LineItemBuilderError::UninitializedField("name"))?;
        let qty = self
            .qty
            .ok_or(LineItemBuilderError::UninitializedField("qty"))?;
        let price = self
            .price
            .ok_or(LineItemBuilderError::UninitializedField("price"))?;
        let amount = self.amount.unwrap_or_else(|| &qty * &price);

        Ok(LineItem {
            name,
            qty,
            price,
            amount,
            extra: self.extra.unwrap_or_default(),
        })
    }
}

impl LineItem {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qty(&self) -> &BigDecimal {
        &self.qty
    }

    pub fn price(&self) -> &BigDecimal {
        &self.price
    }

    /// The caller-supplied line amount.
    pub fn amount(&self) -> &BigDecimal {
        &self.amount
    }

    /// Caller-defined keys such as a unit or SKU.
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// `qty * price`, independent of the stored `amount`.
    pub fn computed_amount(&self) -> BigDecimal {
        &self.qty * &self.price
    }

    pub fn is_consistent(&self) -> bool {
        self.amount == self.computed_amount()
    }
}

/// Presentation tag read out of `meta.status`. This is not a lifecycle the core enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
        }
    }

    pub fn from_meta(meta: &Map<String, Value>) -> Self {
        match meta
            .get("status")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_lowercase())
            .as_deref()
        {
            Some("paid") => InvoiceStatus::Paid,
            Some("overdue") => InvoiceStatus::Overdue,
            _ => InvoiceStatus::Pending,
        }
    }
}

/// Invoice top level model, as persisted.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize, sqlx::FromRow)]
#[builder(setter(into, strip_option), pattern = "owned", build_fn(skip))]
pub struct Invoice {
    id: Uuid,
    invoice_number: Option<String>,
    template_type: Option<String>,
    customer_name: Option<String>,
    customer_address: Option<String>,
    date: DateTime<Utc>,
    #[sqlx(json)]
    items: Vec<LineItem>,
    #[serde(
        serialize_with = "serialize_bigdecimal",
        deserialize_with = "deserialize_bigdecimal"
    )]
    total: BigDecimal,
    #[sqlx(json)]
    meta: Map<String, Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn invoice_number(&self) -> Option<&str> {
        self.invoice_number.as_deref()
    }

    pub fn template_type(&self) -> Option<&str> {
        self.template_type.as_deref()
    }

    pub fn customer_name(&self) -> Option<&str> {
        self.customer_name.as_deref()
    }

    pub fn customer_address(&self) -> Option<&str> {
        self.customer_address.as_deref()
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    /// Return a reference to the invoice's line items, in document order.
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// The caller-supplied grand total.
    pub fn total(&self) -> &BigDecimal {
        &self.total
    }

    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Sum of the stored line amounts.
    pub fn computed_total(&self) -> BigDecimal {
        self.items.iter().map(LineItem::amount).sum()
    }

    /// True when `total` matches the line amounts and every line matches `qty * price`.
    pub fn is_consistent(&self) -> bool {
        self.total == self.computed_total() && self.items.iter().all(LineItem::is_consistent)
    }

    pub fn status(&self) -> InvoiceStatus {
        InvoiceStatus::from_meta(&self.meta)
    }

    pub fn note(&self) -> Option<&str> {
        self.meta.get("note").and_then(Value::as_str)
    }

    pub(crate) fn from_draft(id: Uuid, draft: &InvoiceDraft, now: DateTime<Utc>) -> Self {
        Invoice {
            id,
            invoice_number: Some(draft.invoice_number.clone()),
            template_type: draft.template_type.clone(),
            customer_name: Some(draft.customer_name.clone()),
            customer_address: draft.customer_address.clone(),
            date: draft.date,
            items: draft.items.clone(),
            total: draft.total.clone(),
            meta: draft.meta.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace every field present in `changes`; nested `items` and `meta` are swapped whole.
    pub(crate) fn apply_changes(&mut self, changes: &InvoiceChanges, now: DateTime<Utc>) {
        if let Some(v) = &changes.invoice_number {
            self.invoice_number = Some(v.clone());
        }
        if let Some(v) = &changes.template_type {
            self.template_type = Some(v.clone());
        }
        if let Some(v) = &changes.customer_name {
            self.customer_name = Some(v.clone());
        }
        if let Some(v) = &changes.customer_address {
            self.customer_address = Some(v.clone());
        }
        if let Some(v) = changes.date {
            self.date = v;
        }
        if let Some(v) = &changes.items {
            self.items = v.clone();
        }
        if let Some(v) = &changes.total {
            self.total = v.clone();
        }
        if let Some(v) = &changes.meta {
            self.meta = v.clone();
        }
        self.updated_at = now;
    }
}

impl InvoiceBuilder {
    /// Add a [`LineItem`] to the builder's internal list.
    ///
    /// # Example
    /// ```rust
    /// use invoice_desk::{InvoiceBuilder, LineItemBuilder};
    /// use bigdecimal::BigDecimal;
    /// use std::str::FromStr;
    ///
    /// let line_item = LineItemBuilder::default()
    ///     .name("This is a test")
    ///     .qty(1)
    ///     .price(BigDecimal::from_str("12.99").unwrap())
    ///     .build().unwrap();
    /// let builder = InvoiceBuilder::default().add_item(line_item);
    /// ```
    pub fn add_item(self, item: LineItem) -> Self {
        match self.items {
            Some(mut items) => {
                items.push(item);
                Self {
                    items: Some(items),
                    ..self
                }
            }
            None => Self {
                items: Some(vec![item]),
                ..self
            },
        }
    }

    /// Finalize the builder into an [`Invoice`].
    ///
    /// Missing optional fields are filled with reasonable defaults:
    /// * `id` defaults to a fresh v4 uuid.
    /// * `date`, `created_at` and `updated_at` default to [`Utc::now`].
    /// * `items` defaults to an empty vector and `meta` to an empty map.
    /// * `total` defaults to the sum of the item amounts.
    ///
    /// # Errors
    /// Never fails today; the `Result` mirrors the derived builders.
    pub fn build(self) -> Result<Invoice, InvoiceBuilderError> {
        let now = Utc::now();
        let items = self.items.unwrap_or_default();
        let total = self
            .total
            .unwrap_or_else(|| items.iter().map(LineItem::amount).sum());
        let created_at = self.created_at.unwrap_or(now);

        Ok(Invoice {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            invoice_number: self.invoice_number.unwrap_or(None),
            template_type: self.template_type.unwrap_or(None),
            customer_name: self.customer_name.unwrap_or(None),
            customer_address: self.customer_address.unwrap_or(None),
            date: self.date.unwrap_or(now),
            items,
            total,
            meta: self.meta.unwrap_or_default(),
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
        })
    }
}

/// The `date` field of an incoming payload: either a full instant or a bare calendar day, which
/// is resolved to local midnight in the configured timezone.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DateInput {
    Instant(DateTime<chrono::FixedOffset>),
    Day(NaiveDate),
}

/// Create payload. Every field is optional here; defaults and required-field checks happen in
/// [`crate::validation`]. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewInvoice {
    pub invoice_number: Option<String>,
    pub template_type: Option<String>,
    pub customer_name: Option<String>,
    pub customer_address: Option<String>,
    pub date: Option<DateInput>,
    pub items: Option<Vec<LineItem>>,
    #[serde(default, deserialize_with = "deserialize_optional_bigdecimal")]
    pub total: Option<BigDecimal>,
    pub meta: Option<Map<String, Value>>,
}

/// Update payload with field-level patch semantics: `Some` replaces the stored value, `None`
/// leaves it alone. `items` and `meta` are replaced wholesale, never merged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoicePatch {
    pub invoice_number: Option<String>,
    pub template_type: Option<String>,
    pub customer_name: Option<String>,
    pub customer_address: Option<String>,
    pub date: Option<DateInput>,
    pub items: Option<Vec<LineItem>>,
    #[serde(default, deserialize_with = "deserialize_optional_bigdecimal")]
    pub total: Option<BigDecimal>,
    pub meta: Option<Map<String, Value>>,
}
