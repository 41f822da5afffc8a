//! Shared application context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cookiebar_core::{get_categories, CategoryKey, CookieBarConfig, CookieCategory, PluginSettings};
use cookiebar_scanner::{DetectedCookie, OpenCookieDatabase, StoredOcd};
use cookiebar_store::schema::{DETECTED_COOKIES_OPTION, OCD_OPTION};
use cookiebar_store::SqliteStore;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::hooks::HookRegistry;

/// Everything a request handler or lifecycle hook needs. Built once in
/// `main` and passed around as `Arc<AppContext>`.
pub struct AppContext {
    pub config: CookieBarConfig,
    pub store: SqliteStore,
    /// Open Cookie Database used for classification.
    pub ocd: RwLock<OpenCookieDatabase>,
    pub http: reqwest::Client,
    pub hooks: HookRegistry,
    scan_running: AtomicBool,
    /// Serializes read-modify-write of the detected cookie list.
    cookies_lock: Mutex<()>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl AppContext {
    pub fn new(config: CookieBarConfig, store: SqliteStore, hooks: HookRegistry) -> Arc<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(concat!("cookiebar-scanner/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Arc::new(Self {
            config,
            store,
            ocd: RwLock::new(OpenCookieDatabase::bundled()),
            http,
            hooks,
            scan_running: AtomicBool::new(false),
            cookies_lock: Mutex::new(()),
            scheduler: Mutex::new(None),
        })
    }

    /// Current settings, defaults filled in.
    pub fn settings(&self) -> PluginSettings {
        self.store.load_settings()
    }

    /// Category registry for the current settings.
    pub fn categories(&self) -> std::collections::BTreeMap<CategoryKey, CookieCategory> {
        get_categories(&self.settings())
    }

    pub fn detected_cookies(&self) -> Vec<DetectedCookie> {
        match self.store.get_option::<Vec<DetectedCookie>>(DETECTED_COOKIES_OPTION) {
            Ok(cookies) => cookies.unwrap_or_default(),
            Err(e) => {
                warn!("Failed to read detected cookies: {}", e);
                Vec::new()
            }
        }
    }

    pub fn save_detected_cookies(&self, cookies: &[DetectedCookie]) -> cookiebar_core::Result<()> {
        self.store.update_option(DETECTED_COOKIES_OPTION, cookies)
    }

    /// Load the detected cookies, let `f` change them and write them back,
    /// all under one lock. Nothing is written when `f` leaves them unchanged.
    pub fn update_detected_cookies<R>(
        &self,
        f: impl FnOnce(&mut Vec<DetectedCookie>) -> R,
    ) -> cookiebar_core::Result<R> {
        let _guard = self.cookies_lock.lock();
        let mut cookies = self.detected_cookies();
        let before = cookies.clone();
        let out = f(&mut cookies);
        if cookies != before {
            self.save_detected_cookies(&cookies)?;
        }
        Ok(out)
    }

    /// Replace the bundled database with the last downloaded one, if any.
    pub fn load_stored_ocd(&self) {
        match self.store.get_option::<StoredOcd>(OCD_OPTION) {
            Ok(Some(stored)) => match OpenCookieDatabase::from_stored(&stored) {
                Ok(db) => {
                    info!("Loaded Open Cookie Database from {} ({} entries)", stored.url, db.len());
                    *self.ocd.write() = db;
                }
                Err(e) => warn!("Stored Open Cookie Database is unusable: {}", e),
            },
            Ok(None) => info!("Using bundled Open Cookie Database"),
            Err(e) => warn!("Failed to read stored Open Cookie Database: {}", e),
        }
    }

    /// Claim the scan slot. `None` while another scan is running.
    pub fn try_begin_scan(self: &Arc<Self>) -> Option<ScanGuard> {
        self.scan_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ScanGuard { ctx: self.clone() })
    }

    pub fn is_scan_running(&self) -> bool {
        self.scan_running.load(Ordering::Acquire)
    }

    pub fn set_scheduler(&self, handle: JoinHandle<()>) {
        if let Some(old) = self.scheduler.lock().replace(handle) {
            old.abort();
        }
    }

    /// Stop the scheduler task. Returns true if one was running.
    pub fn stop_scheduler(&self) -> bool {
        match self.scheduler.lock().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

/// Releases the scan slot when dropped.
pub struct ScanGuard {
    ctx: Arc<AppContext>,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.ctx.scan_running.store(false, Ordering::Release);
    }
}
