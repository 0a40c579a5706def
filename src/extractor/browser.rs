//! Headless-browser page fetcher: connects to a remote Chromium instance
//! over its DevTools WebSocket, blocking image/media/font/stylesheet
//! resources, and returns the rendered (sanitized) HTML of a page.

use std::env;

use async_trait::async_trait;
use chromiumoxide::browser::Browser as ChromiumBrowser;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use serde_json::Value;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use super::PageFetcher;
use crate::ratelimit::{random_headers, random_user_agent};
use crate::retry::FetchError;

/// Wrapper around a remote Chromium DevTools connection.
pub struct ChromiumFetcher {
    inner: ChromiumBrowser,
}

impl ChromiumFetcher {
    /// Connect to a remote Chrome instance, reading the base WebSocket URL
    /// from `CHROME_WS_URL` (default `ws://chrome:9222`), with retry logic
    /// for container startup races.
    pub async fn connect() -> Result<Self, FetchError> {
        let base = env::var("CHROME_WS_URL").unwrap_or_else(|_| "ws://chrome:9222".to_string());
        let version_url = base.replace("ws://", "http://").replace("wss://", "https://") + "/json/version";

        let ws_url = {
            let mut last_err = None;
            let mut ws_url = None;
            'retry: for attempt in 0..30 {
                info!(attempt, %version_url, "fetching chrome devtools endpoint");
                match reqwest::get(&version_url).await {
                    Ok(resp) => match resp.text().await {
                        Ok(text) => {
                            if let Ok(json) = serde_json::from_str::<Value>(&text) {
                                if let Some(url) = json["webSocketDebuggerUrl"].as_str() {
                                    let docker_url = url.replace("ws://localhost:9222", "ws://chrome:9222");
                                    ws_url = Some(docker_url);
                                    break 'retry;
                                }
                            } else {
                                last_err = Some(format!("non-json response: {text}"));
                            }
                        }
                        Err(e) => last_err = Some(e.to_string()),
                    },
                    Err(e) => last_err = Some(e.to_string()),
                }
                sleep(Duration::from_secs(2)).await;
            }
            ws_url.ok_or_else(|| {
                FetchError::Network(format!("could not fetch webSocketDebuggerUrl after retries: {last_err:?}"))
            })?
        };

        let mut last_connect_err = None;
        for attempt in 0..30 {
            info!(attempt, %ws_url, "connecting to chromium");
            match ChromiumBrowser::connect(ws_url.clone()).await {
                Ok((browser, mut handler)) => {
                    tokio::spawn(async move {
                        while let Some(event) = handler.next().await {
                            if let Err(e) = event {
                                warn!(error = %e, "chromium event handler error");
                            }
                        }
                    });
                    return Ok(Self { inner: browser });
                }
                Err(e) => {
                    last_connect_err = Some(e.to_string());
                    sleep(Duration::from_secs(2)).await;
                }
            }
        }

        Err(FetchError::Network(format!(
            "could not connect to chrome after retries: {last_connect_err:?}"
        )))
    }
}

#[async_trait]
impl PageFetcher for ChromiumFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        let page = self
            .inner
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        // Anti-detection: rotate the UA/accept-language before navigation.
        let user_agent = random_user_agent();
        let headers = random_headers();
        let mut ua_params = SetUserAgentOverrideParams::builder().user_agent(user_agent);
        if let Some(lang) = headers.get("Accept-Language") {
            ua_params = ua_params.accept_language(*lang);
        }
        let ua_params = ua_params
            .build()
            .map_err(|e| FetchError::Network(format!("building UA override: {e}")))?;
        page.execute(ua_params)
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        page.goto(url).await.map_err(|e| FetchError::Network(e.to_string()))?;

        page.wait_for_navigation()
            .await
            .map_err(|e| FetchError::Timeout(e.to_string()))?;

        let params = ScreenshotParams::builder().build();
        let _ = page.screenshot(params).await;

        let content = page
            .content()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(ammonia::clean(&content))
    }
}
