//! WebDriver binding: a [`ChromeHost`] plus the chromedriver process behind it.

pub mod chrome;

pub use chrome::ChromeHost;

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tracing::{debug, info, warn};

use crate::error::HostError;

#[derive(Debug, Clone)]
pub struct ChromeOptions {
    pub port: u16,
    pub headless: bool,
    /// Optional path to Chrome binary (e.g., Chrome for Testing)
    pub chrome_binary: Option<String>,
    /// Falls back to `chromedriver` on PATH
    pub chromedriver_binary: Option<String>,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            port: 9515,
            headless: false,
            chrome_binary: None,
            chromedriver_binary: None,
        }
    }
}

/// Check if chromedriver is already running on the given port.
async fn check_chromedriver_running(port: u16) -> bool {
    let url = format!("http://localhost:{}/status", port);
    match reqwest::Client::new()
        .get(&url)
        .timeout(Duration::from_millis(500))
        .send()
        .await
    {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}

/// A connected host and, when we started it, the chromedriver child process.
pub struct ChromeSession {
    pub host: Arc<ChromeHost>,
    process: Option<Child>,
}

impl ChromeSession {
    /// Reuse a chromedriver already listening on the port, or spawn one.
    pub async fn start(options: &ChromeOptions) -> Result<Self, HostError> {
        if check_chromedriver_running(options.port).await {
            match ChromeHost::connect(options).await {
                Ok(host) => {
                    info!("Reusing chromedriver on port {}", options.port);
                    return Ok(Self {
                        host: Arc::new(host),
                        process: None,
                    });
                }
                Err(e) => debug!("Existing chromedriver refused a session: {}", e),
            }
        }

        let chromedriver_cmd = options
            .chromedriver_binary
            .as_deref()
            .unwrap_or("chromedriver");

        let mut process = tokio::process::Command::new(chromedriver_cmd)
            .arg(format!("--port={}", options.port))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                HostError::WebDriver(format!(
                    "Failed to start chromedriver: {}. Make sure chromedriver is installed and in your PATH",
                    e
                ))
            })?;

        // Wait for chromedriver to be ready with retry loop
        let max_retries = 10;
        let mut last_error = None;
        for _ in 0..max_retries {
            tokio::time::sleep(Duration::from_millis(200)).await;
            match ChromeHost::connect(options).await {
                Ok(host) => {
                    info!("Started chromedriver on port {}", options.port);
                    return Ok(Self {
                        host: Arc::new(host),
                        process: Some(process),
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }

        let _ = process.kill().await;
        Err(HostError::WebDriver(format!(
            "Failed to connect to ChromeDriver after {} attempts: {}",
            max_retries,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string())
        )))
    }

    /// Close the browser and stop chromedriver if we started it.
    pub async fn shutdown(mut self) {
        match Arc::try_unwrap(self.host) {
            Ok(host) => {
                if let Err(e) = host.quit().await {
                    warn!("Failed to close browser session: {}", e);
                }
            }
            Err(_) => debug!("Browser host still shared; leaving session open"),
        }
        if let Some(mut process) = self.process.take() {
            let _ = process.kill().await;
        }
    }
}
