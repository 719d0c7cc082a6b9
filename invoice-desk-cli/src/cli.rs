use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use invoice_desk::{AddContext, ListQuery, Pagination, Period};
use serde::de::DeserializeOwned;

fn read_until_eof() -> io::Result<String> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    Ok(input)
}

/// Read a JSON payload from `path`, or from stdin when no path is given.
pub fn read_payload<T: DeserializeOwned>(path: Option<&Path>) -> Result<T, invoice_desk::Error> {
    let raw = match path {
        Some(path) => fs::read_to_string(path)
            .map_err(invoice_desk::Error::from)
            .add_context(&format!(
                "reading invoice data from file '{}'",
                path.to_string_lossy()
            ))?,
        None => read_until_eof()
            .map_err(invoice_desk::Error::from)
            .add_context("reading invoice data from stdin")?,
    };

    serde_json::from_str(&raw)
        .map_err(|e| invoice_desk::Error::from(format!("{e}")))
        .add_context("parsing invoice JSON")
}

#[derive(Debug, Parser)]
#[command(name = "invoice-desk", about = "Manage invoices and print them")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply the bundled database schema
    Migrate,

    /// Create an invoice from JSON
    Create {
        /// Path to the JSON file with the invoice; stdin when omitted
        #[arg(short, long)]
        data: Option<PathBuf>,
    },

    /// Print one invoice as JSON
    Get { id: String },

    /// Replace the fields present in the JSON patch
    Update {
        id: String,

        /// Path to the JSON file with the patch; stdin when omitted
        #[arg(short, long)]
        data: Option<PathBuf>,
    },

    /// Delete an invoice
    Delete { id: String },

    /// List invoices, newest first
    List {
        /// Case-insensitive match on invoice number or customer name
        #[arg(short, long)]
        search: Option<String>,

        /// First day to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,

        #[arg(long)]
        limit: Option<String>,

        #[arg(long)]
        offset: Option<String>,
    },

    /// Invoice count and revenue per day
    Stats {
        /// `week` for the last 7 days; anything else means the last 30
        #[arg(short, long)]
        period: Option<String>,

        /// Emit a row for every day in the window, including empty ones
        #[arg(long)]
        fill_gaps: bool,
    },

    /// Render one invoice to HTML
    ExportHtml {
        id: String,

        /// File to write; stdout when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Render one invoice to PDF
    ExportPdf {
        id: String,

        /// Directory where the PDF should be saved; stdout when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Start chromedriver on this port for the duration of the export
        #[arg(long, value_name = "PORT")]
        spawn_chromedriver: Option<u16>,
    },
}

pub fn list_query(
    search: Option<String>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    limit: Option<&str>,
    offset: Option<&str>,
) -> ListQuery {
    ListQuery {
        search,
        from,
        to,
        page: Pagination::parse(limit, offset),
    }
}

pub fn period(raw: Option<&str>) -> Period {
    Period::parse_or_default(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_arguments() {
        let cli = Cli::parse_from([
            "invoice-desk",
            "list",
            "--search",
            "INV-42",
            "--from",
            "2024-01-10",
            "--to",
            "2024-01-20",
            "--limit",
            "abc",
        ]);
        let Command::List {
            search,
            from,
            to,
            limit,
            offset,
        } = cli.command
        else {
            panic!("expected list");
        };
        let query = list_query(search, from, to, limit.as_deref(), offset.as_deref());
        assert_eq!(query.search.as_deref(), Some("INV-42"));
        assert_eq!(query.from, NaiveDate::from_ymd_opt(2024, 1, 10));
        assert_eq!(query.page, Pagination::default());
    }

    #[test]
    fn parses_export_pdf_with_chromedriver() {
        let cli = Cli::parse_from([
            "invoice-desk",
            "export-pdf",
            "abc",
            "--spawn-chromedriver",
            "9515",
        ]);
        assert!(matches!(
            cli.command,
            Command::ExportPdf {
                spawn_chromedriver: Some(9515),
                ..
            }
        ));
    }

    #[test]
    fn unknown_period_means_month() {
        assert_eq!(period(Some("year")), Period::Month);
        assert_eq!(period(Some("week")), Period::Week);
    }
}
