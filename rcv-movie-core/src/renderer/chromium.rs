use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RendererSection;

use super::error::{RendererError, RendererResult};
use super::{RendererLauncher, RendererSession};

#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    config: Arc<RendererSection>,
}

impl ChromiumLauncher {
    pub fn new(config: RendererSection) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub async fn launch_session(&self) -> RendererResult<ChromiumSession> {
        let [width, height] = self.config.initial_viewport;
        let chromium_config = self.build_chromium_config(width, height)?;
        info!(
            executable = %self.config.executable_path,
            width,
            height,
            headless = self.config.headless,
            "Launching Chromium renderer"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| RendererError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "Chromium handler reported error");
                }
            }
        });

        let page = browser
            .new_page(CreateTargetParams::new("about:blank"))
            .await?;

        Ok(ChromiumSession {
            browser,
            page,
            handler_task: Some(handler_task),
            config: Arc::clone(&self.config),
        })
    }

    fn build_chromium_config(&self, width: u32, height: u32) -> RendererResult<ChromiumConfig> {
        let mut builder = ChromiumConfig::builder()
            .chrome_executable(&self.config.executable_path)
            .viewport(ChromiumViewport {
                width,
                height,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: width >= height,
                has_touch: false,
            });

        if !self.config.headless {
            builder = builder.with_head();
        }
        if !self.config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(timeout) = self.config.request_timeout_seconds {
            builder = builder.request_timeout(Duration::from_secs(timeout));
        }

        let mut args = vec![
            format!("--window-size={width},{height}"),
            "--hide-scrollbars".to_string(),
            "--mute-audio".to_string(),
        ];
        if self.config.disable_gpu {
            args.push("--disable-gpu".into());
        }
        args.push("--disable-background-timer-throttling".into());
        args.push("--no-first-run".into());

        builder = builder.args(args);

        builder.build().map_err(RendererError::Configuration)
    }
}

#[async_trait]
impl RendererLauncher for ChromiumLauncher {
    async fn launch(&self) -> RendererResult<Box<dyn RendererSession>> {
        let session = self.launch_session().await?;
        Ok(Box::new(session))
    }
}

#[derive(Debug)]
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: Option<JoinHandle<()>>,
    config: Arc<RendererSection>,
}

#[async_trait]
impl RendererSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> RendererResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(RendererError::Configuration)?;
        self.page
            .goto(params)
            .await
            .map_err(|err| RendererError::Navigation {
                url: url.to_string(),
                reason: err.to_string(),
            })?;
        self.page.wait_for_navigation().await?;
        debug!(%url, "renderer navigated");
        Ok(())
    }

    async fn set_viewport(&mut self, width: u32, height: u32) -> RendererResult<()> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(width))
            .height(i64::from(height))
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(RendererError::Configuration)?;
        self.page.execute(params).await?;
        debug!(width, height, "renderer viewport resized");
        Ok(())
    }

    async fn execute_round_transition(&mut self, round_index: usize) -> RendererResult<()> {
        let script = self.config.transition_script_for(round_index);
        match self.page.evaluate(script.as_str()).await {
            Ok(_) => Ok(()),
            Err(err @ CdpError::JavascriptException(_)) => {
                Err(RendererError::Script(err.to_string()))
            }
            Err(err) => Err(RendererError::Cdp(err)),
        }
    }

    async fn capture_viewport(&mut self) -> RendererResult<Vec<u8>> {
        let params = ScreenshotParams::builder().build();
        Ok(self.page.screenshot(params).await?)
    }

    async fn dump_page_state(&mut self) -> RendererResult<String> {
        Ok(self.page.content().await?)
    }

    async fn shutdown(&mut self) -> RendererResult<()> {
        info!("Shutting down Chromium renderer");
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "Failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "Browser handler join error");
            }
        }
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Some(handle) = &self.handler_task {
            if !handle.is_finished() {
                warn!("ChromiumSession dropped without explicit shutdown");
            }
        }
    }
}
