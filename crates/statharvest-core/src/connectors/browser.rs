//! Headless-browser connector for pages that build their tables with JavaScript.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Connector, ConnectorArgs, Fetched};
use crate::domain::{Endpoint, RawDocument};
use crate::error::HarvestError;
use crate::retry::RetryPolicy;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to let a page settle before its DOM is captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitCondition {
    /// Poll until an element matching `selector` exists.
    Element { selector: String, timeout_ms: u64 },
    /// Let scripts run for a fixed time.
    Sleep { ms: u64 },
    /// Capture the DOM as soon as the page loads.
    None,
}

impl Default for WaitCondition {
    fn default() -> Self {
        Self::Sleep { ms: 2_000 }
    }
}

/// Browser process settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    /// Executable name or path.
    pub binary: String,
    pub extra_args: Vec<String>,
    pub wait: WaitCondition,
    /// Hard limit for a single browser invocation.
    pub page_timeout_ms: u64,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            binary: String::from("chromium"),
            extra_args: Vec::new(),
            wait: WaitCondition::default(),
            page_timeout_ms: 30_000,
        }
    }
}

/// Launches browser sessions.
pub trait BrowserDriver: Send {
    fn launch(&self) -> Result<Box<dyn BrowserSession>, HarvestError>;
}

/// A running browser.
pub trait BrowserSession: Send {
    /// Navigates to `url`, waits per `wait`, and returns the rendered DOM.
    fn render(&mut self, url: &str, wait: &WaitCondition) -> Result<String, HarvestError>;

    fn quit(&mut self) -> Result<(), HarvestError>;
}

/// Driver for Chromium-family browsers using `--headless --dump-dom`.
///
/// Each session owns a private profile directory, so cookies persist between
/// pages of one run and are discarded on quit.
#[derive(Debug, Clone)]
pub struct ChromeProcessDriver {
    options: BrowserOptions,
}

impl ChromeProcessDriver {
    pub fn new(options: BrowserOptions) -> Self {
        Self { options }
    }
}

impl BrowserDriver for ChromeProcessDriver {
    fn launch(&self) -> Result<Box<dyn BrowserSession>, HarvestError> {
        let profile_dir =
            std::env::temp_dir().join(format!("statharvest-browser-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&profile_dir)?;
        info!(binary = %self.options.binary, profile = %profile_dir.display(), "browser session started");
        Ok(Box::new(ChromeProcessSession {
            options: self.options.clone(),
            profile_dir,
            quit: false,
        }))
    }
}

struct ChromeProcessSession {
    options: BrowserOptions,
    profile_dir: PathBuf,
    quit: bool,
}

impl ChromeProcessSession {
    fn dump_dom(&self, url: &str, budget_ms: u64) -> Result<String, HarvestError> {
        let render_error = |message: String| HarvestError::Render {
            url: url.to_string(),
            message,
        };

        let mut child = Command::new(&self.options.binary)
            .args(["--headless", "--disable-gpu", "--no-sandbox", "--dump-dom"])
            .arg(format!("--user-data-dir={}", self.profile_dir.display()))
            .arg(format!("--virtual-time-budget={budget_ms}"))
            .args(&self.options.extra_args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|error| {
                render_error(format!("failed to launch {}: {error}", self.options.binary))
            })?;

        let Some(mut stdout) = child.stdout.take() else {
            kill(&mut child);
            return Err(render_error(String::from("browser stdout unavailable")));
        };
        // Drain stdout concurrently so a large DOM cannot fill the pipe and stall the browser.
        let reader = thread::spawn(move || {
            let mut dom = String::new();
            stdout.read_to_string(&mut dom).map(|_| dom)
        });

        let deadline = Instant::now() + Duration::from_millis(self.options.page_timeout_ms);
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    kill(&mut child);
                    let _ = reader.join();
                    return Err(render_error(format!(
                        "page did not finish within {}ms",
                        self.options.page_timeout_ms
                    )));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(error) => {
                    kill(&mut child);
                    let _ = reader.join();
                    return Err(render_error(format!("browser wait failed: {error}")));
                }
            }
        };

        let dom = reader
            .join()
            .map_err(|_| render_error(String::from("browser output reader panicked")))?
            .map_err(|error| render_error(format!("failed to read DOM: {error}")))?;

        if !status.success() {
            return Err(render_error(format!("browser exited with {status}")));
        }
        Ok(dom)
    }
}

impl BrowserSession for ChromeProcessSession {
    fn render(&mut self, url: &str, wait: &WaitCondition) -> Result<String, HarvestError> {
        if self.quit {
            return Err(HarvestError::Render {
                url: url.to_string(),
                message: String::from("browser session already closed"),
            });
        }
        match wait {
            WaitCondition::None => self.dump_dom(url, 0),
            WaitCondition::Sleep { ms } => self.dump_dom(url, *ms),
            WaitCondition::Element {
                selector,
                timeout_ms,
            } => {
                let selector = parse_selector(selector)?;
                let started = Instant::now();
                let timeout = Duration::from_millis(*timeout_ms);
                let mut budget_ms = 500_u64.min(*timeout_ms.max(&1));
                loop {
                    let dom = self.dump_dom(url, budget_ms)?;
                    if Html::parse_document(&dom).select(&selector).next().is_some() {
                        return Ok(dom);
                    }
                    if started.elapsed() >= timeout {
                        return Err(HarvestError::Render {
                            url: url.to_string(),
                            message: format!("element did not appear within {timeout_ms}ms"),
                        });
                    }
                    budget_ms = budget_ms.saturating_mul(2).min(*timeout_ms);
                    debug!(url, budget_ms, "element not rendered yet; retrying with longer budget");
                }
            }
        }
    }

    fn quit(&mut self) -> Result<(), HarvestError> {
        if self.quit {
            return Ok(());
        }
        self.quit = true;
        std::fs::remove_dir_all(&self.profile_dir)?;
        info!("browser session closed");
        Ok(())
    }
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn parse_selector(css: &str) -> Result<Selector, HarvestError> {
    Selector::parse(css)
        .map_err(|error| HarvestError::Parse(format!("invalid wait selector '{css}': {error:?}")))
}

/// Connector that renders pages in a headless browser.
///
/// The browser is launched on [`open`](Connector::open) (or on first fetch)
/// and quit exactly once, on [`close`](Connector::close) or drop.
pub struct BrowserConnector {
    driver: Box<dyn BrowserDriver>,
    session: Option<Box<dyn BrowserSession>>,
    wait: WaitCondition,
    retry: RetryPolicy,
}

impl BrowserConnector {
    pub fn new(driver: Box<dyn BrowserDriver>, args: &ConnectorArgs) -> Self {
        Self {
            driver,
            session: None,
            wait: args.browser.wait.clone(),
            retry: args.retry.clone(),
        }
    }

    pub fn with_wait(mut self, wait: WaitCondition) -> Self {
        self.wait = wait;
        self
    }
}

impl Connector for BrowserConnector {
    fn name(&self) -> &str {
        "browser"
    }

    fn open(&mut self) -> Result<(), HarvestError> {
        if self.session.is_none() {
            let driver = &self.driver;
            self.session = Some(self.retry.run("launch browser", || driver.launch())?);
        }
        Ok(())
    }

    fn fetch(&mut self, endpoint: &Endpoint) -> Result<Fetched, HarvestError> {
        self.open()?;
        let url = endpoint.url();
        let Self {
            session,
            wait,
            retry,
            ..
        } = self;
        let Some(session) = session.as_mut() else {
            return Err(HarvestError::Render {
                url,
                message: String::from("browser session unavailable"),
            });
        };

        info!(url = %url, "rendering page");
        let dom = retry.run(&format!("render {url}"), || session.render(&url, wait))?;
        Ok(Fetched::Document(RawDocument::new(url, dom)))
    }

    fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(error) = session.quit() {
                warn!(error = %error, "browser did not shut down cleanly");
            }
        }
    }
}

impl Drop for BrowserConnector {
    fn drop(&mut self) {
        self.close();
    }
}
