//! HTML to PDF through a WebDriver-controlled headless Chrome(ium).

use std::{
    net::TcpListener,
    process::{Child, Command, Stdio},
    thread,
    time::Duration,
};

use tokio::time::Instant;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose};
use fantoccini::{
    Client, ClientBuilder,
    wd::{PrintConfiguration, PrintConfigurationBuilder, PrintMargins, PrintSize},
};
use serde_json::Map;
use tracing::{debug, instrument, warn};

use crate::error::{AddContext, Error, ErrorKind};

/// Upper bound on closing a browser session once printing is over.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Converts a complete HTML document into PDF bytes. Single shot, no retry.
///
/// Implementations must give up with [`ErrorKind::RenderTimeout`] once `budget` is spent and
/// release whatever they opened before returning.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(&self, html: &str, budget: Duration) -> Result<Vec<u8>, Error>;
}

/// An open browser session that can print one document.
#[async_trait]
trait PrintSession: Send + Sync {
    async fn print_html(&self, html: &str) -> Result<Vec<u8>, Error>;

    async fn close(&self) -> Result<(), Error>;
}

#[async_trait]
impl PrintSession for Client {
    async fn print_html(&self, html: &str) -> Result<Vec<u8>, Error> {
        let encoded = general_purpose::STANDARD.encode(html.as_bytes());
        let data_url = format!("data:text/html;base64,{encoded}");
        self.goto(&data_url)
            .await
            .map_err(Error::from)
            .add_context("navigating to document")?;
        self.print(ChromeRasterizer::print_configuration()?)
            .await
            .map_err(Error::from)
            .add_context("printing pdf")
    }

    async fn close(&self) -> Result<(), Error> {
        self.clone()
            .close()
            .await
            .map_err(Error::from)
            .add_context("closing webdriver session")
    }
}

/// Print on `session` until `deadline`, then close it whether printing succeeded, failed or ran
/// out of time.
async fn print_then_close<S: PrintSession>(
    session: &S,
    html: &str,
    deadline: Instant,
    budget: Duration,
) -> Result<Vec<u8>, Error> {
    let printed = match tokio::time::timeout_at(deadline, session.print_html(html)).await {
        Ok(printed) => printed,
        Err(_) => Err(Error::from(ErrorKind::RenderTimeout(budget))),
    };
    match tokio::time::timeout(CLOSE_TIMEOUT, session.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "failed to close webdriver session"),
        Err(_) => warn!("timed out closing webdriver session"),
    }
    printed
}

/// Starts ChromeDriver as a child process on `port`
///
/// # Returns
/// - [`Child`] if ChromeDriver successfully starts and the port is available
///
/// # Errors
/// - [`crate::Error`] if the chromedriver binary is not in the path, or if the port is not
/// available, or if the chromedriver process fails to start for any other reason
pub fn start_chromedriver(port: u16) -> Result<Child, Error> {
    if is_port_in_use(port) {
        return Err(Error::from(format!("Port {port} is already in use"))
            .add_context("starting chromedriver"));
    }

    let mut child = Command::new("chromedriver")
        .arg(format!("--port={port}"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(Error::from)
        .add_context("starting chromedriver")?;

    for _ in 0..100 {
        if is_port_in_use(port) {
            return Ok(child);
        }

        if child
            .try_wait()
            .map_err(Error::from)
            .add_context("starting chromedriver")?
            .is_some()
        {
            return Err(
                Error::from(String::from("Chromedriver has stopped unexpectedly"))
                    .add_context("starting chromedriver"),
            );
        }

        thread::sleep(Duration::from_millis(10));
    }

    if !is_port_in_use(port) {
        child
            .kill()
            .map_err(Error::from)
            .add_context("killing unresponsive chromedriver")?;
        return Err(
            Error::from(format!("Chromedriver failed to bind to port {port}"))
                .add_context("starting chromedriver"),
        );
    }

    Ok(child)
}

/// Check if a given port is currently in use on localhost
fn is_port_in_use(port: u16) -> bool {
    TcpListener::bind(format!("localhost:{port}")).is_err()
}

/// Prints through a WebDriver endpoint, opening a fresh browser session per document.
#[derive(Debug, Clone)]
pub struct ChromeRasterizer {
    webdriver_url: String,
}

impl ChromeRasterizer {
    pub fn new(webdriver_url: impl Into<String>) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
        }
    }

    async fn connect(&self) -> Result<Client, Error> {
        let mut caps = Map::new();
        caps.insert(
            "goog:chromeOptions".to_string(),
            serde_json::json!({
                "args": ["--headless", "--no-sandbox", "--disable-gpu"]
            }),
        );
        ClientBuilder::native()
            .capabilities(caps)
            .connect(&self.webdriver_url)
            .await
            .map_err(Error::from)
            .add_context("connecting to webdriver")
    }

    /// A4 with background graphics, so status badges and table shading survive printing.
    fn print_configuration() -> Result<PrintConfiguration, Error> {
        PrintConfigurationBuilder::default()
            .size(PrintSize::A4)
            .background(true)
            .margins(PrintMargins {
                top: 0.5,
                left: 0.5,
                right: 0.5,
                bottom: 0.5,
            })
            .build()
            .map_err(Error::from)
            .add_context("configuring printer")
    }
}

#[async_trait]
impl Rasterizer for ChromeRasterizer {
    #[instrument(skip(self, html), fields(html_len = html.len()))]
    async fn rasterize(&self, html: &str, budget: Duration) -> Result<Vec<u8>, Error> {
        let deadline = Instant::now() + budget;
        let client = tokio::time::timeout_at(deadline, self.connect())
            .await
            .map_err(|_| Error::from(ErrorKind::RenderTimeout(budget)))
            .add_context("rasterizing html")?
            .add_context("rasterizing html")?;
        let pdf = print_then_close(&client, html, deadline, budget)
            .await
            .add_context("rasterizing html")?;
        debug!(bytes = pdf.len(), "pdf rendered");
        Ok(pdf)
    }
}
