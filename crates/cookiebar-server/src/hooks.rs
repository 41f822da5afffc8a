//! Lifecycle hooks: named callbacks registered against host events.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::state::AppContext;
use cookiebar_core::{Error, Result};

/// Host lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Server start: storage and defaults are prepared.
    Activate,
    /// Server shutdown.
    Deactivate,
    /// The scan schedule came due.
    ScheduledScan,
}

pub type HookFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
pub type HookFn = Arc<dyn Fn(Arc<AppContext>) -> HookFuture + Send + Sync>;

/// Event -> ordered list of named callbacks.
#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<LifecycleEvent, Vec<(&'static str, HookFn)>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `name`. Callbacks run in registration order.
    pub fn register<F, Fut>(&mut self, event: LifecycleEvent, name: &'static str, callback: F)
    where
        F: Fn(Arc<AppContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let hook: HookFn = Arc::new(move |ctx| Box::pin(callback(ctx)));
        self.hooks.entry(event).or_default().push((name, hook));
    }

    /// Names registered for `event`, in run order.
    pub fn names(&self, event: LifecycleEvent) -> Vec<&'static str> {
        self.hooks
            .get(&event)
            .map(|hooks| hooks.iter().map(|(name, _)| *name).collect())
            .unwrap_or_default()
    }

    /// Run every callback for `event`. A failing callback is logged and does
    /// not stop the rest; the names of failed callbacks are returned.
    pub async fn dispatch(&self, event: LifecycleEvent, ctx: &Arc<AppContext>) -> Vec<&'static str> {
        let Some(hooks) = self.hooks.get(&event) else {
            debug!("No hooks registered for {:?}", event);
            return Vec::new();
        };

        let mut failed = Vec::new();
        for (name, hook) in hooks {
            match hook(ctx.clone()).await {
                Ok(()) => debug!("Hook {:?}/{} done", event, name),
                Err(e) => {
                    error!("Hook {:?}/{} failed: {}", event, name, e);
                    failed.push(*name);
                }
            }
        }
        info!("Dispatched {:?}: {} hooks, {} failed", event, hooks.len(), failed.len());
        failed
    }
}

/// The standard hook table.
pub fn default_hooks() -> HookRegistry {
    let mut hooks = HookRegistry::new();

    hooks.register(LifecycleEvent::Activate, "create_consent_table", |ctx| async move {
        if ctx.store.create_database_table() {
            Ok(())
        } else {
            Err(Error::Storage("could not create consent_logs table".into()))
        }
    });
    hooks.register(LifecycleEvent::Activate, "seed_default_settings", |ctx| async move {
        ctx.store.seed_default_settings().map(|_| ())
    });
    hooks.register(LifecycleEvent::Activate, "load_open_cookie_database", |ctx| async move {
        ctx.load_stored_ocd();
        Ok(())
    });
    hooks.register(LifecycleEvent::Activate, "start_scan_scheduler", |ctx| async move {
        crate::scheduler::start_scan_scheduler(ctx);
        Ok(())
    });

    hooks.register(LifecycleEvent::ScheduledScan, "run_cookie_scan", |ctx| async move {
        crate::scan::run_scan(&ctx, None).await.map(|_| ())
    });

    hooks.register(LifecycleEvent::Deactivate, "stop_scan_scheduler", |ctx| async move {
        ctx.stop_scheduler();
        Ok(())
    });

    hooks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_context;
    use cookiebar_core::ScanFrequency;
    use cookiebar_store::schema::SETTINGS_OPTION;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_hook(
        counter: &Arc<AtomicUsize>,
    ) -> impl Fn(Arc<AppContext>) -> std::future::Ready<Result<()>> + Send + Sync + 'static {
        let counter = counter.clone();
        move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_failed_hook_does_not_stop_the_rest() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut hooks = HookRegistry::new();
        hooks.register(LifecycleEvent::Activate, "first", counting_hook(&ran));
        hooks.register(LifecycleEvent::Activate, "broken", |_ctx| async {
            Err::<(), _>(Error::Internal("boom".into()))
        });
        hooks.register(LifecycleEvent::Activate, "last", counting_hook(&ran));

        let (ctx, _dir) = test_context(hooks);
        let failed = ctx.hooks.dispatch(LifecycleEvent::Activate, &ctx).await;
        assert_eq!(failed, ["broken"]);
        assert_eq!(ran.load(Ordering::SeqCst), 2);

        assert!(ctx.hooks.dispatch(LifecycleEvent::Deactivate, &ctx).await.is_empty());
    }

    #[tokio::test]
    async fn test_activate_and_deactivate() {
        let (ctx, _dir) = test_context(default_hooks());
        assert!(!ctx.store.table_exists());
        assert!(ctx.store.get_option::<serde_json::Value>(SETTINGS_OPTION).unwrap().is_none());

        let failed = ctx.hooks.dispatch(LifecycleEvent::Activate, &ctx).await;
        assert!(failed.is_empty(), "{:?}", failed);
        assert!(ctx.store.table_exists());
        assert!(ctx.store.get_option::<serde_json::Value>(SETTINGS_OPTION).unwrap().is_some());
        assert_eq!(ctx.settings(), cookiebar_core::PluginSettings::default());

        // Manual scanning keeps the already running scheduler idle.
        assert!(ctx.store.set_setting("scan_frequency", serde_json::json!("manual")));
        assert_eq!(ctx.settings().scan_frequency, ScanFrequency::Manual);

        ctx.hooks.dispatch(LifecycleEvent::Deactivate, &ctx).await;
        assert!(!ctx.stop_scheduler());
    }

    #[test]
    fn test_default_hook_order() {
        let hooks = default_hooks();
        assert_eq!(
            hooks.names(LifecycleEvent::Activate),
            [
                "create_consent_table",
                "seed_default_settings",
                "load_open_cookie_database",
                "start_scan_scheduler"
            ]
        );
        assert_eq!(hooks.names(LifecycleEvent::ScheduledScan), ["run_cookie_scan"]);
        assert_eq!(hooks.names(LifecycleEvent::Deactivate), ["stop_scan_scheduler"]);
    }
}
