//! Polling driver that feeds backend data into a [`ResolverSession`].

use std::{sync::Arc, time::Duration};

use {
    modelswitch_config::PollingConfig,
    modelswitch_resolver::{
        ResolverSession, ResolverView, SelectionEvent, SelectionStore, SessionEvent,
    },
    modelswitch_service_traits::ProviderBackend,
    tokio::{
        sync::{Mutex, RwLock, watch},
        task::JoinHandle,
        time::{Instant, MissedTickBehavior},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::client::fetch_default_provider_terminal;

/// What one refresh pass did.
#[derive(Debug, Default)]
pub struct RefreshOutcome {
    pub events: Vec<SelectionEvent>,
    /// Whether a fresh model registry was applied.
    pub registry_refreshed: bool,
}

pub struct ResolverDriver<S> {
    backend: RwLock<Arc<dyn ProviderBackend>>,
    session: Mutex<ResolverSession<S>>,
    views: watch::Sender<ResolverView>,
}

impl<S: SelectionStore + 'static> ResolverDriver<S> {
    pub fn new(backend: Arc<dyn ProviderBackend>, session: ResolverSession<S>) -> Self {
        let (views, _) = watch::channel(session.view());
        Self {
            backend: RwLock::new(backend),
            session: Mutex::new(session),
            views,
        }
    }

    /// Receive a new [`ResolverView`] whenever it changes.
    pub fn subscribe(&self) -> watch::Receiver<ResolverView> {
        self.views.subscribe()
    }

    pub async fn view(&self) -> ResolverView {
        self.session.lock().await.view()
    }

    /// Point later fetches at a different backend. The session, including
    /// its latch and the already-resolved server default, is kept.
    pub async fn replace_backend(&self, backend: Arc<dyn ProviderBackend>) {
        *self.backend.write().await = backend;
        info!("resolver backend replaced");
    }

    async fn backend(&self) -> Arc<dyn ProviderBackend> {
        Arc::clone(&*self.backend.read().await)
    }

    /// Fetch the server default once and hand it to the session.
    pub async fn resolve_default(&self) -> Vec<SelectionEvent> {
        let backend = self.backend().await;
        let default = fetch_default_provider_terminal(backend.as_ref()).await;
        self.apply(SessionEvent::DefaultProviderResolved(default))
            .await
    }

    /// Fetch the credential pool and API-key providers, and the model registry
    /// when `include_registry` is set. Failed fetches keep the previous data.
    ///
    /// When both provider lists arrive they are applied as a single tick.
    pub async fn refresh_once(&self, include_registry: bool) -> RefreshOutcome {
        let mut outcome = RefreshOutcome::default();
        let backend = self.backend().await;

        if include_registry {
            match backend.model_registry().await {
                Ok(registry) => {
                    debug!(models = registry.len(), "model registry fetched");
                    outcome
                        .events
                        .extend(self.apply(SessionEvent::RegistryLoaded(registry)).await);
                    outcome.registry_refreshed = true;
                },
                Err(e) => warn!(error = %e, "failed to fetch model registry"),
            }
        }

        let (oauth, api_keys) = tokio::join!(
            backend.provider_pool_overview(),
            backend.api_key_providers()
        );
        let event = match (oauth, api_keys) {
            (Ok(oauth), Ok(api_keys)) => Some(SessionEvent::ProvidersLoaded { oauth, api_keys }),
            (Ok(oauth), Err(e)) => {
                warn!(error = %e, "failed to fetch api-key providers");
                Some(SessionEvent::OAuthOverviewLoaded(oauth))
            },
            (Err(e), Ok(api_keys)) => {
                warn!(error = %e, "failed to fetch provider pool overview");
                Some(SessionEvent::ApiKeyProvidersLoaded(api_keys))
            },
            (Err(oauth_err), Err(api_err)) => {
                warn!(
                    oauth_error = %oauth_err,
                    api_key_error = %api_err,
                    "failed to fetch provider lists"
                );
                None
            },
        };
        if let Some(event) = event {
            outcome.events.extend(self.apply(event).await);
        }

        outcome
    }

    pub async fn select_provider(&self, provider: impl Into<String>) -> Vec<SelectionEvent> {
        self.apply(SessionEvent::ProviderSelected(provider.into()))
            .await
    }

    pub async fn select_model(&self, model: impl Into<String>) -> Vec<SelectionEvent> {
        self.apply(SessionEvent::ModelSelected(model.into())).await
    }

    async fn apply(&self, event: SessionEvent) -> Vec<SelectionEvent> {
        let mut session = self.session.lock().await;
        let events = session.apply(event);
        for event in &events {
            debug!(?event, "selection event");
        }
        let view = session.view();
        self.views.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
        events
    }

    /// Start polling in the background.
    ///
    /// The default provider is fetched alongside the first refresh unless the
    /// session already holds one, so a respawned loop does not fetch it again.
    /// Polling stops when the returned handle is shut down or dropped.
    pub fn spawn(self: Arc<Self>, polling: &PollingConfig) -> DriverHandle {
        let cancel = CancellationToken::new();
        let views = self.subscribe();
        let every = Duration::from_secs(polling.interval_secs.max(1));
        let registry_every = Duration::from_secs(polling.registry_refresh_secs);

        let token = cancel.clone();
        let driver = self;
        let task = tokio::spawn(async move {
            info!(interval_secs = every.as_secs(), "resolver polling started");

            let first = tokio::select! {
                _ = token.cancelled() => {
                    info!("resolver polling stopped before first refresh");
                    return;
                },
                first = async {
                    let needs_default = driver.session.lock().await.server_default().is_none();
                    if needs_default {
                        tokio::join!(driver.resolve_default(), driver.refresh_once(true)).1
                    } else {
                        driver.refresh_once(true).await
                    }
                } => first,
            };
            debug!(events = first.events.len(), "initial refresh finished");

            let mut last_registry = first.registry_refreshed.then(Instant::now);
            let mut interval = tokio::time::interval_at(Instant::now() + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {},
                }
                let include_registry =
                    last_registry.is_none_or(|at| at.elapsed() >= registry_every);
                let outcome = driver.refresh_once(include_registry).await;
                if outcome.registry_refreshed {
                    last_registry = Some(Instant::now());
                }
            }
            info!("resolver polling stopped");
        });

        DriverHandle {
            cancel,
            task: Some(task),
            views,
        }
    }
}

/// Owner of a running poll loop.
pub struct DriverHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    views: watch::Receiver<ResolverView>,
}

impl DriverHandle {
    pub fn subscribe(&self) -> watch::Receiver<ResolverView> {
        self.views.clone()
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop polling and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "resolver polling task ended abnormally");
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use {
        super::*,
        async_trait::async_trait,
        modelswitch_resolver::InMemorySelection,
        modelswitch_service_traits::{
            ApiKeyProvider, DefaultProvider, OAuthProviderOverview, RegistryModel, ServiceResult,
        },
        serde_json::json,
    };

    #[derive(Default)]
    struct FakeBackend {
        overview_calls: AtomicUsize,
        registry_calls: AtomicUsize,
        default_calls: AtomicUsize,
        fail_default: bool,
        default_key: Option<&'static str>,
        fail_overview: AtomicBool,
        fail_api_keys: AtomicBool,
    }

    #[async_trait]
    impl ProviderBackend for FakeBackend {
        async fn provider_pool_overview(&self) -> ServiceResult<Vec<OAuthProviderOverview>> {
            self.overview_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_overview.load(Ordering::SeqCst) {
                return Err("pool offline".into());
            }
            Ok(vec![
                OAuthProviderOverview {
                    provider_type: "kiro".into(),
                    credentials: vec![json!({})],
                },
                OAuthProviderOverview {
                    provider_type: "gemini".into(),
                    credentials: vec![json!({})],
                },
            ])
        }

        async fn api_key_providers(&self) -> ServiceResult<Vec<ApiKeyProvider>> {
            if self.fail_api_keys.load(Ordering::SeqCst) {
                return Err("api-key store locked".into());
            }
            Ok(vec![ApiKeyProvider {
                id: "deepseek".into(),
                name: "DeepSeek".into(),
                enabled: true,
                api_key_count: 1,
            }])
        }

        async fn model_registry(&self) -> ServiceResult<Vec<RegistryModel>> {
            self.registry_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                RegistryModel::new("claude-sonnet-4", "anthropic"),
                RegistryModel::new("gemini-2.5-pro", "gemini"),
                RegistryModel::new("gemini-2.5-flash", "gemini"),
                RegistryModel::new("deepseek-chat", "deepseek"),
            ])
        }

        async fn default_provider(&self) -> ServiceResult<DefaultProvider> {
            self.default_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_default {
                return Err("backend restarting".into());
            }
            Ok(DefaultProvider::Resolved(
                self.default_key.unwrap_or("gemini").into(),
            ))
        }
    }

    fn driver(backend: Arc<FakeBackend>) -> Arc<ResolverDriver<InMemorySelection>> {
        Arc::new(ResolverDriver::new(
            backend,
            ResolverSession::new(InMemorySelection::default()),
        ))
    }

    #[tokio::test]
    async fn refresh_then_default_initializes() {
        let backend = Arc::new(FakeBackend::default());
        let driver = driver(Arc::clone(&backend));

        let outcome = driver.refresh_once(true).await;
        assert!(outcome.registry_refreshed);
        assert!(outcome.events.is_empty());
        assert!(!driver.view().await.initialized);

        driver.resolve_default().await;
        let view = driver.view().await;
        assert!(view.initialized);
        assert_eq!(view.provider_type, "gemini");
        assert_eq!(view.model, "gemini-2.5-pro");
    }

    #[tokio::test]
    async fn default_naming_api_key_provider_survives_default_first() {
        let backend = Arc::new(FakeBackend {
            default_key: Some("deepseek"),
            ..FakeBackend::default()
        });
        let driver = driver(backend);

        driver.resolve_default().await;
        driver.refresh_once(true).await;
        let view = driver.view().await;
        let keys: Vec<&str> = view
            .configured_providers
            .iter()
            .map(|p| p.key.as_str())
            .collect();
        assert_eq!(keys, vec!["kiro", "gemini", "deepseek"]);
        assert_eq!(view.provider_type, "deepseek");
        assert_eq!(view.model, "deepseek-chat");
    }

    #[tokio::test]
    async fn default_naming_api_key_provider_survives_joined_fetch() {
        let backend = Arc::new(FakeBackend {
            default_key: Some("deepseek"),
            ..FakeBackend::default()
        });
        let driver = driver(backend);

        tokio::join!(driver.resolve_default(), driver.refresh_once(true));
        assert_eq!(driver.view().await.provider_type, "deepseek");
    }

    #[tokio::test]
    async fn latch_waits_while_api_key_list_is_failing() {
        let backend = Arc::new(FakeBackend {
            default_key: Some("deepseek"),
            ..FakeBackend::default()
        });
        backend.fail_api_keys.store(true, Ordering::SeqCst);
        let driver = driver(Arc::clone(&backend));

        driver.resolve_default().await;
        driver.refresh_once(true).await;
        let view = driver.view().await;
        assert!(!view.initialized);
        assert_eq!(view.configured_providers.len(), 2);

        backend.fail_api_keys.store(false, Ordering::SeqCst);
        driver.refresh_once(false).await;
        let view = driver.view().await;
        assert!(view.initialized);
        assert_eq!(view.provider_type, "deepseek");
    }

    #[tokio::test]
    async fn failed_default_fetch_still_initializes() {
        let backend = Arc::new(FakeBackend {
            fail_default: true,
            ..FakeBackend::default()
        });
        let driver = driver(backend);

        driver.resolve_default().await;
        driver.refresh_once(true).await;
        let view = driver.view().await;
        assert!(view.initialized);
        assert_eq!(view.provider_type, "kiro");
        assert_eq!(view.model, "claude-sonnet-4");
    }

    #[tokio::test]
    async fn failed_poll_keeps_previous_providers() {
        let backend = Arc::new(FakeBackend::default());
        let driver = driver(Arc::clone(&backend));
        driver.refresh_once(true).await;
        driver.resolve_default().await;

        backend.fail_overview.store(true, Ordering::SeqCst);
        driver.refresh_once(false).await;
        let view = driver.view().await;
        assert_eq!(view.configured_providers.len(), 3);
        assert_eq!(view.selected_provider.map(|p| p.key).as_deref(), Some("gemini"));
    }

    #[tokio::test]
    async fn user_selection_flows_to_subscribers() {
        let backend = Arc::new(FakeBackend::default());
        let driver = driver(backend);
        driver.refresh_once(true).await;
        driver.resolve_default().await;

        let mut views = driver.subscribe();
        views.borrow_and_update();
        driver.select_provider("kiro").await;
        assert!(views.has_changed().unwrap());
        let view = views.borrow_and_update().clone();
        assert_eq!(view.provider_type, "kiro");
        assert_eq!(view.model, "claude-sonnet-4");

        driver.select_model("claude-sonnet-4").await;
        assert!(!views.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn polling_stops_after_shutdown() {
        let backend = Arc::new(FakeBackend::default());
        let driver = driver(Arc::clone(&backend));
        let handle = driver.spawn(&PollingConfig {
            interval_secs: 5,
            registry_refresh_secs: 10,
        });

        let mut views = handle.subscribe();
        views
            .wait_for(|view| view.initialized)
            .await
            .unwrap();
        assert_eq!(backend.default_calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(21)).await;
        let polls = backend.overview_calls.load(Ordering::SeqCst);
        assert!(polls >= 4, "expected at least 4 polls, got {polls}");
        assert!(backend.registry_calls.load(Ordering::SeqCst) >= 2);

        handle.shutdown().await;
        let after_shutdown = backend.overview_calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.overview_calls.load(Ordering::SeqCst), after_shutdown);
        assert_eq!(backend.default_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn respawn_on_new_backend_keeps_selection_and_default() {
        let first = Arc::new(FakeBackend::default());
        let driver = driver(Arc::clone(&first));
        let handle = Arc::clone(&driver).spawn(&PollingConfig::default());
        let mut views = handle.subscribe();
        views.wait_for(|view| view.initialized).await.unwrap();
        handle.shutdown().await;
        driver.select_provider("kiro").await;

        let second = Arc::new(FakeBackend {
            default_key: Some("deepseek"),
            ..FakeBackend::default()
        });
        driver.replace_backend(Arc::clone(&second) as Arc<dyn ProviderBackend>).await;
        let handle = Arc::clone(&driver).spawn(&PollingConfig {
            interval_secs: 1,
            registry_refresh_secs: 300,
        });
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(second.overview_calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(second.default_calls.load(Ordering::SeqCst), 0);
        let first_polls = first.overview_calls.load(Ordering::SeqCst);
        assert_eq!(driver.view().await.provider_type, "kiro");

        handle.shutdown().await;
        assert_eq!(first.overview_calls.load(Ordering::SeqCst), first_polls);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_cancels_polling() {
        let backend = Arc::new(FakeBackend::default());
        let driver = driver(Arc::clone(&backend));
        let handle = driver.spawn(&PollingConfig::default());
        let mut views = handle.subscribe();
        views
            .wait_for(|view| view.initialized)
            .await
            .unwrap();
        assert!(!handle.is_stopped());

        drop(handle);
        // Let the loop observe the cancellation.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let after_drop = backend.overview_calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.overview_calls.load(Ordering::SeqCst), after_drop);
    }
}
