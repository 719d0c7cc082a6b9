use std::path::Path;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use minijinja::{Value, context};
use serde::Serialize;

use crate::{
    error::{AddContext, Error},
    invoice::{Invoice, LineItem},
};

pub const TEMPLATE_NAME: &str = "invoice.html";

/// Printed tables never have fewer rows than this, so short invoices keep the same layout.
pub const MIN_TABLE_ROWS: usize = 10;

const DEFAULT_TEMPLATE: &str = include_str!("../templates/invoice.html");

/// One printed row of the item table. Padding rows carry only their number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub index: usize,
    pub name: String,
    pub qty: String,
    pub price: String,
    pub amount: String,
}

/// Rows for the item table: one per item in order, numbered from 1, padded with empty rows up to
/// [`MIN_TABLE_ROWS`]. Longer invoices are never truncated.
pub fn document_rows(items: &[LineItem]) -> Vec<TableRow> {
    let filled = items.iter().enumerate().map(|(i, item)| TableRow {
        index: i + 1,
        name: item.name().to_string(),
        qty: item.qty().to_string(),
        price: item.price().to_string(),
        amount: item.amount().to_string(),
    });
    let padding = (items.len()..MIN_TABLE_ROWS).map(|i| TableRow {
        index: i + 1,
        name: String::new(),
        qty: String::new(),
        price: String::new(),
        amount: String::new(),
    });
    filled.chain(padding).collect()
}

/// Day/month/year in the configured timezone.
pub fn format_display_date(date: DateTime<Utc>, tz: Tz) -> String {
    date.with_timezone(&tz).format("%d/%m/%Y").to_string()
}

/// Build the template environment. With `template_dir` set, `invoice.html` is read from that
/// directory; otherwise the bundled template is used. Either way the name ends in `.html`, which
/// turns on HTML auto-escaping for every interpolated value.
pub fn setup_template_env(
    template_dir: Option<&Path>,
) -> Result<minijinja::Environment<'static>, minijinja::Error> {
    let mut env = minijinja::Environment::new();
    match template_dir {
        Some(dir) => env.set_loader(minijinja::path_loader(dir)),
        None => env.add_template(TEMPLATE_NAME, DEFAULT_TEMPLATE)?,
    }
    // fail at startup rather than on the first export
    env.get_template(TEMPLATE_NAME)?;
    Ok(env)
}

pub fn render_template(
    env: &minijinja::Environment<'static>,
    invoice: &Invoice,
    tz: Tz,
) -> Result<String, minijinja::Error> {
    let template = env.get_template(TEMPLATE_NAME)?;
    template.render(context! {
        invoice_number => invoice.invoice_number().unwrap_or_default(),
        template_type => invoice.template_type().unwrap_or_default(),
        customer_name => invoice.customer_name().unwrap_or_default(),
        customer_address => invoice.customer_address().unwrap_or_default(),
        date => Value::from_safe_string(format_display_date(invoice.date(), tz)),
        total => invoice.total().to_string(),
        status => invoice.status().as_str(),
        note => invoice.note().unwrap_or_default(),
        items_rows => document_rows(invoice.items()),
    })
}

/// Renders invoices to HTML with a template environment built once and reused.
#[derive(Debug)]
pub struct DocumentRenderer {
    env: minijinja::Environment<'static>,
    timezone: Tz,
}

impl DocumentRenderer {
    pub fn new(template_dir: Option<&Path>, timezone: Tz) -> Result<Self, Error> {
        let env = setup_template_env(template_dir)
            .map_err(Error::from)
            .add_context("setting up templating environment")?;
        Ok(Self { env, timezone })
    }

    pub fn render(&self, invoice: &Invoice) -> Result<String, Error> {
        render_template(&self.env, invoice, self.timezone)
            .map_err(Error::from)
            .add_context("rendering html template")
    }
}
