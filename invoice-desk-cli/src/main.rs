use std::{
    io::Write,
    path::Path,
    process::{Child, ExitCode},
    sync::Arc,
};

use clap::Parser;
use invoice_desk::{
    AddContext, ChromeRasterizer, InvoicePatch, InvoiceService, NewInvoice, PdfDocument,
    PgInvoiceStore, Settings, start_chromedriver, telemetry,
};
use serde::Serialize;
use tracing::error;

use crate::cli::{Cli, Command, list_query, period, read_payload};

mod cli;

fn kill_chrome(chrome_process: &mut Child) -> Result<(), invoice_desk::Error> {
    chrome_process
        .kill()
        .map_err(invoice_desk::Error::from)
        .add_context("killing chromedriver process from cli")?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), invoice_desk::Error> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| invoice_desk::Error::from(format!("{e}")))
        .add_context("serializing output")?;
    println!("{rendered}");
    Ok(())
}

fn write_stdout(bytes: &[u8]) -> Result<(), invoice_desk::Error> {
    let mut stdout = std::io::stdout();
    stdout
        .write_all(bytes)
        .map_err(invoice_desk::Error::from)
        .add_context("writing to stdout")?;
    stdout
        .flush()
        .map_err(invoice_desk::Error::from)
        .add_context("flushing stdout")
}

fn write_pdf(pdf: &PdfDocument, out: Option<&Path>) -> Result<(), invoice_desk::Error> {
    match out {
        Some(dir) => {
            let path = dir.join(&pdf.filename);
            if std::fs::write(&path, &pdf.bytes).is_err() {
                eprintln!(
                    "Failed to write '{}' to '{}'",
                    pdf.filename,
                    path.to_string_lossy()
                );
                write_stdout(&pdf.bytes)
            } else {
                Ok(())
            }
        }
        None => write_stdout(&pdf.bytes),
    }
}

async fn connect(settings: &Settings) -> Result<PgInvoiceStore, invoice_desk::Error> {
    PgInvoiceStore::connect(&settings.database_url, settings.max_connections)
        .await
        .add_context("opening invoice store from cli")
}

async fn service(
    settings: &Settings,
    webdriver_url: &str,
) -> Result<InvoiceService, invoice_desk::Error> {
    let store = connect(settings).await?;
    InvoiceService::from_settings(
        settings,
        Arc::new(store),
        Arc::new(ChromeRasterizer::new(webdriver_url)),
    )
}

async fn run(cli: Cli, settings: &Settings) -> Result<(), invoice_desk::Error> {
    let webdriver_url = settings.webdriver_url.clone();
    match cli.command {
        Command::Migrate => {
            let store = connect(settings).await?;
            store
                .health_check()
                .await
                .add_context("checking database before migrating")?;
            store.run_migrations().await
        }
        Command::Create { data } => {
            let input: NewInvoice = read_payload(data.as_deref())?;
            print_json(&service(settings, &webdriver_url).await?.create(input).await?)
        }
        Command::Get { id } => {
            print_json(&service(settings, &webdriver_url).await?.get(&id).await?)
        }
        Command::Update { id, data } => {
            let patch: InvoicePatch = read_payload(data.as_deref())?;
            print_json(
                &service(settings, &webdriver_url)
                    .await?
                    .update(&id, patch)
                    .await?,
            )
        }
        Command::Delete { id } => {
            print_json(&service(settings, &webdriver_url).await?.delete(&id).await?)
        }
        Command::List {
            search,
            from,
            to,
            limit,
            offset,
        } => {
            let query = list_query(search, from, to, limit.as_deref(), offset.as_deref());
            print_json(&service(settings, &webdriver_url).await?.list(&query).await?)
        }
        Command::Stats {
            period: raw,
            fill_gaps,
        } => {
            let service = service(settings, &webdriver_url).await?;
            let period = period(raw.as_deref());
            let buckets = if fill_gaps {
                service.stats_series(period).await?
            } else {
                service.stats(period).await?
            };
            print_json(&buckets)
        }
        Command::ExportHtml { id, out } => {
            let html = service(settings, &webdriver_url)
                .await?
                .export_html(&id)
                .await?;
            match out {
                Some(path) => std::fs::write(&path, html)
                    .map_err(invoice_desk::Error::from)
                    .add_context(&format!("writing html to '{}'", path.to_string_lossy())),
                None => write_stdout(html.as_bytes()),
            }
        }
        Command::ExportPdf {
            id,
            out,
            spawn_chromedriver,
        } => {
            let Some(port) = spawn_chromedriver else {
                let pdf = service(settings, &webdriver_url)
                    .await?
                    .export_pdf(&id)
                    .await?;
                return write_pdf(&pdf, out.as_deref());
            };

            let mut chrome_process =
                start_chromedriver(port).add_context("starting chromedriver in cli")?;
            let local_url = format!("http://localhost:{port}");
            let exported = match service(settings, &local_url).await {
                Ok(service) => service.export_pdf(&id).await,
                Err(e) => Err(e),
            };
            kill_chrome(&mut chrome_process)?;
            write_pdf(&exported?, out.as_deref())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(1);
        }
    };
    telemetry::init_tracing(&settings.log_level, settings.log_json);

    match run(cli, &settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_not_found() => {
            eprintln!("no such invoice");
            ExitCode::from(2)
        }
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("{}", e.public_message());
            ExitCode::from(1)
        }
    }
}
