//! Browser pool management for concurrent Chrome instances
//!
//! Every request gets a fresh page on one of a fixed set of long-lived
//! browsers. A semaphore bounds checkouts to the pool size; instances that
//! crashed or failed are relaunched on their next checkout.

use crate::{create_browser_config, user_data_dir, Config, ScrapeError};
use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Current status of a browser instance in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    /// Ready for a checkout
    Healthy,
    /// Checked out by a request
    Busy,
    /// Reported a browser-level failure; relaunched on next checkout
    Failed,
}

/// One Chrome process and the task pumping its CDP connection
pub struct BrowserInstance {
    pub id: usize,
    pub browser: Arc<Mutex<Browser>>,
    pub handler: JoinHandle<()>,
    pub status: InstanceStatus,
    pub page_count: usize,
    pub failure_count: usize,
}

impl BrowserInstance {
    async fn launch(config: &Config, id: usize) -> Result<Self, ScrapeError> {
        let profile = user_data_dir(id);
        std::fs::create_dir_all(&profile).map_err(|e| {
            ScrapeError::BrowserLaunchFailed(format!("Failed to create profile dir: {}", e))
        })?;

        let browser_config = create_browser_config(config, id)?;
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScrapeError::BrowserLaunchFailed(e.to_string()))?;

        // The handler is a stream that must be polled for the browser to make progress
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("Browser {} handler error: {}", id, e);
                    break;
                }
            }
            debug!("Browser {} handler stream ended", id);
        });

        Ok(Self {
            id,
            browser: Arc::new(Mutex::new(browser)),
            handler,
            status: InstanceStatus::Healthy,
            page_count: 0,
            failure_count: 0,
        })
    }

    pub fn is_usable(&self) -> bool {
        self.status != InstanceStatus::Failed && !self.handler.is_finished()
    }

    async fn close(self) {
        close_browser(&self.browser, self.id).await;
        self.handler.abort();
    }
}

async fn close_browser(browser: &Mutex<Browser>, id: usize) {
    if let Err(e) = browser.lock().await.close().await {
        debug!("Browser {} did not close cleanly: {}", id, e);
    }
}

/// Checked-out browser; goes back to the pool when dropped
pub struct BrowserHandle {
    pub browser: Arc<Mutex<Browser>>,
    pub instance_id: usize,
    failed: AtomicBool,
    pool: BrowserPool,
    permit: Option<OwnedSemaphorePermit>,
}

impl BrowserHandle {
    pub async fn new_page(&self) -> Result<Page, ScrapeError> {
        self.browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(|e| ScrapeError::PageError(format!("Failed to open page: {}", e)))
    }

    /// Flag the browser for a relaunch before its next checkout.
    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::Relaxed);
    }
}

impl Drop for BrowserHandle {
    fn drop(&mut self) {
        let pool = self.pool.clone();
        let instance_id = self.instance_id;
        let failed = self.failed.load(Ordering::Relaxed);
        // the permit is released only after the instance is back in the queue
        let permit = self.permit.take();

        tokio::spawn(async move {
            pool.return_browser(instance_id, failed).await;
            drop(permit);
        });
    }
}

#[derive(Clone)]
pub struct BrowserPool {
    instances: Arc<Mutex<Vec<BrowserInstance>>>,
    available: Arc<Mutex<VecDeque<usize>>>,
    semaphore: Arc<Semaphore>,
    config: Config,
    is_shutting_down: Arc<AtomicBool>,
}

impl BrowserPool {
    pub async fn new(config: Config) -> Result<Self, ScrapeError> {
        let mut instances = Vec::with_capacity(config.browser_pool_size);
        for id in 0..config.browser_pool_size {
            match BrowserInstance::launch(&config, id).await {
                Ok(instance) => {
                    info!("Browser instance {} launched", id);
                    instances.push(instance);
                }
                Err(e) => {
                    error!("Failed to launch browser instance {}: {}", id, e);
                    for instance in instances {
                        instance.close().await;
                    }
                    return Err(e);
                }
            }
        }

        info!("Browser pool initialized with {} instances", instances.len());

        Ok(Self {
            available: Arc::new(Mutex::new((0..instances.len()).collect())),
            instances: Arc::new(Mutex::new(instances)),
            semaphore: Arc::new(Semaphore::new(config.browser_pool_size)),
            config,
            is_shutting_down: Arc::new(AtomicBool::new(false)),
        })
    }

    pub async fn get_browser(&self) -> Result<BrowserHandle, ScrapeError> {
        if self.is_shutting_down.load(Ordering::Relaxed) {
            return Err(ScrapeError::BrowserUnavailable);
        }

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ScrapeError::BrowserUnavailable)?;

        let instance_id = self
            .available
            .lock()
            .await
            .pop_front()
            .ok_or(ScrapeError::BrowserUnavailable)?;

        // a relaunch takes seconds, so the pool lock is only held to inspect
        // and to swap the slot
        let stale_browser = {
            let mut instances = self.instances.lock().await;
            let instance = instances
                .get_mut(instance_id)
                .ok_or(ScrapeError::BrowserUnavailable)?;

            if instance.is_usable() {
                instance.status = InstanceStatus::Busy;
                instance.page_count += 1;
                return Ok(self.handle(instance.browser.clone(), instance_id, permit));
            }
            instance.browser.clone()
        };

        warn!("Browser instance {} unusable, relaunching", instance_id);
        // the replacement reuses the profile dir, so the old process goes first
        close_browser(&stale_browser, instance_id).await;

        let mut fresh = match BrowserInstance::launch(&self.config, instance_id).await {
            Ok(fresh) => fresh,
            Err(e) => {
                error!("Failed to relaunch browser instance {}: {}", instance_id, e);
                self.available.lock().await.push_back(instance_id);
                return Err(e);
            }
        };

        let mut instances = self.instances.lock().await;
        if instance_id >= instances.len() {
            // the pool shut down while the browser was launching
            drop(instances);
            fresh.close().await;
            return Err(ScrapeError::BrowserUnavailable);
        }
        let instance = &mut instances[instance_id];
        fresh.failure_count = instance.failure_count;
        fresh.status = InstanceStatus::Busy;
        fresh.page_count = 1;
        let browser = fresh.browser.clone();
        let stale = std::mem::replace(instance, fresh);
        drop(instances);

        stale.handler.abort();
        info!("Browser instance {} relaunched", instance_id);
        Ok(self.handle(browser, instance_id, permit))
    }

    fn handle(&self, browser: Arc<Mutex<Browser>>, instance_id: usize, permit: OwnedSemaphorePermit) -> BrowserHandle {
        BrowserHandle {
            browser,
            instance_id,
            failed: AtomicBool::new(false),
            pool: self.clone(),
            permit: Some(permit),
        }
    }

    pub async fn return_browser(&self, instance_id: usize, failed: bool) {
        let mut instances = self.instances.lock().await;
        if let Some(instance) = instances.get_mut(instance_id) {
            if failed {
                instance.failure_count += 1;
                instance.status = InstanceStatus::Failed;
            } else {
                instance.status = InstanceStatus::Healthy;
            }
            self.available.lock().await.push_back(instance_id);
        }
    }

    pub async fn get_stats(&self) -> BrowserPoolStats {
        let instances = self.instances.lock().await;
        let available = self.available.lock().await;

        let mut stats = BrowserPoolStats {
            total_instances: instances.len(),
            available_instances: available.len(),
            ..Default::default()
        };
        for instance in instances.iter() {
            stats.total_pages += instance.page_count;
            match instance.status {
                InstanceStatus::Healthy => stats.healthy_instances += 1,
                InstanceStatus::Busy => stats.busy_instances += 1,
                InstanceStatus::Failed => stats.failed_instances += 1,
            }
        }
        stats
    }

    pub async fn shutdown(&self) {
        info!("Shutting down browser pool...");
        self.is_shutting_down.store(true, Ordering::Relaxed);

        // give in-flight requests a moment to hand their browsers back
        for _ in 0..10 {
            let total = self.instances.lock().await.len();
            if self.available.lock().await.len() == total {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let instances: Vec<_> = self.instances.lock().await.drain(..).collect();
        self.available.lock().await.clear();
        for instance in instances {
            let id = instance.id;
            instance.close().await;
            let _ = std::fs::remove_dir_all(user_data_dir(id));
        }

        info!("Browser pool shutdown complete");
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowserPoolStats {
    pub total_instances: usize,
    pub healthy_instances: usize,
    pub busy_instances: usize,
    pub failed_instances: usize,
    pub available_instances: usize,
    pub total_pages: usize,
}
