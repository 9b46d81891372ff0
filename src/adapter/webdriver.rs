use async_trait::async_trait;
use rand::{thread_rng, Rng};
use std::time::Duration;
use thirtyfour::error::WebDriverError;
use thirtyfour::prelude::*;
use tokio::time::sleep;
use tracing::{debug, error};

use crate::adapter::proxy::ProxyEndpoint;
use crate::adapter::{AdapterError, Locator, RenderAdapter};
use crate::cli::config::BrowserSettings;

/// WebDriver-backed render adapter.
///
/// Owns one browser session for the lifetime of one harvest run.
pub struct WebDriverAdapter {
    driver: Option<WebDriver>,
    scroll_chunked: bool,
}

impl WebDriverAdapter {
    /// Connect a fresh browser session, optionally routed through a proxy.
    pub async fn connect(
        settings: &BrowserSettings,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<Self, AdapterError> {
        let mut caps = DesiredCapabilities::chrome();

        if let Some(agent) = &settings.user_agent {
            caps.add_arg(&format!("--user-agent={}", agent))
                .map_err(map_err)?;
        }

        caps.add_arg(&format!(
            "--window-size={},{}",
            settings.window_width, settings.window_height
        ))
        .map_err(map_err)?;

        if settings.headless {
            caps.set_headless().map_err(map_err)?;
        }

        if let Some(proxy) = proxy {
            caps.add_arg(&format!("--proxy-server={}", proxy.server_arg()))
                .map_err(map_err)?;
        }

        caps.add_arg("--disable-blink-features=AutomationControlled")
            .map_err(map_err)?;
        caps.add_arg("--disable-dev-shm-usage")
            .map_err(map_err)?;

        let driver = WebDriver::new(&settings.webdriver_url, caps)
            .await
            .map_err(|e| AdapterError::SurfaceGone(format!("failed to open session: {}", e)))?;

        driver
            .set_page_load_timeout(Duration::from_secs(settings.page_load_timeout_secs))
            .await
            .map_err(map_err)?;

        debug!("Browser session opened against {}", settings.webdriver_url);

        Ok(Self {
            driver: Some(driver),
            scroll_chunked: settings.chunked_scroll,
        })
    }

    fn driver(&self) -> Result<&WebDriver, AdapterError> {
        self.driver
            .as_ref()
            .ok_or_else(|| AdapterError::SurfaceGone("session already closed".to_string()))
    }

    /// Navigate the session to the feed entry point.
    pub async fn goto(&self, url: &str) -> Result<(), AdapterError> {
        debug!("Navigating to: {}", url);
        self.driver()?.goto(url).await.map_err(map_err)
    }

    /// Close the session.
    pub async fn quit(mut self) -> Result<(), AdapterError> {
        if let Some(driver) = self.driver.take() {
            driver.quit().await.map_err(map_err)?;
            debug!("Browser session closed");
        }
        Ok(())
    }
}

#[async_trait]
impl RenderAdapter for WebDriverAdapter {
    type Node = WebElement;

    async fn scroll(&self, pixels: i64) -> Result<(), AdapterError> {
        let driver = self.driver()?;

        if !self.scroll_chunked || pixels < 0 {
            let script = format!("window.scrollBy(0,{});", pixels);
            driver
                .execute(&script, Vec::new())
                .await
                .map_err(map_err)?;
            return Ok(());
        }

        // Scroll in uneven chunks with short pauses so the surface queues
        // its lazy renders the same way it would for a human reader.
        let mut scrolled: i64 = 0;
        while scrolled < pixels {
            let (chunk, pause_ms) = {
                let mut rng = thread_rng();
                (
                    rng.gen_range(200..600).min(pixels - scrolled),
                    rng.gen_range(120..350),
                )
            };
            scrolled += chunk;

            let script = format!("window.scrollBy({{ top: {}, left: 0, behavior: 'auto' }});", chunk);
            driver
                .execute(&script, Vec::new())
                .await
                .map_err(map_err)?;

            sleep(Duration::from_millis(pause_ms)).await;
        }

        debug!("Scrolled {} pixels", pixels);
        Ok(())
    }

    async fn query_one(&self, locator: &Locator) -> Result<Option<WebElement>, AdapterError> {
        match self.driver()?.find(By::XPath(locator.as_str())).await {
            Ok(element) => Ok(Some(element)),
            Err(WebDriverError::NoSuchElement(_)) => Ok(None),
            Err(e) => Err(map_err(e)),
        }
    }

    async fn query_all(&self, locator: &Locator) -> Result<Vec<WebElement>, AdapterError> {
        self.driver()?
            .find_all(By::XPath(locator.as_str()))
            .await
            .map_err(map_err)
    }

    async fn text_of(&self, node: &WebElement) -> Result<String, AdapterError> {
        node.text().await.map_err(map_err)
    }

    async fn attribute_of(
        &self,
        node: &WebElement,
        name: &str,
    ) -> Result<Option<String>, AdapterError> {
        node.attr(name).await.map_err(map_err)
    }

    async fn click(&self, node: &WebElement) -> Result<(), AdapterError> {
        node.click().await.map_err(map_err)
    }
}

impl Drop for WebDriverAdapter {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            // Quit asynchronously; the run that owned this session is over.
            tokio::spawn(async move {
                if let Err(e) = driver.quit().await {
                    error!("Error closing browser session during drop: {}", e);
                }
            });
        }
    }
}

fn map_err(err: WebDriverError) -> AdapterError {
    match err {
        WebDriverError::StaleElementReference(_) => AdapterError::StaleNode,
        WebDriverError::NoSuchWindow(_)
        | WebDriverError::NoSuchAlert(_)
        | WebDriverError::SessionNotCreated(_)
        | WebDriverError::InvalidSessionId(_) => AdapterError::SurfaceGone(err.to_string()),
        other => AdapterError::Command(other.to_string()),
    }
}
