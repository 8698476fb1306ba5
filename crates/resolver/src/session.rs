//! Event-driven resolver session.
//!
//! A session owns the latest copy of every collaborator list plus the
//! reconciler latch and the model auto-selector. Each [`SessionEvent`] is one
//! logical tick: the source data is updated, the configured provider list is
//! rebuilt, then the reconciler and the auto-selector run in that order
//! against the same snapshot.
//!
//! The initial provider choice waits until both the OAuth overview and the
//! API-key providers have arrived at least once, so a server default naming
//! an API-key provider is never judged against an OAuth-only list.

use {
    modelswitch_service_traits::{
        ApiKeyProvider, DefaultProvider, OAuthProviderOverview, RegistryModel,
    },
    serde::Serialize,
    tracing::{debug, info},
};

use crate::{
    model_select::ModelAutoSelector,
    providers::{ConfiguredProvider, build_configured_providers, models_for_provider},
    reconcile::{DefaultProviderReconciler, InitLatch, ReconcileOutcome},
    selection::SelectionStore,
};

/// Input to the session: fresh collaborator data or a user action.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    OAuthOverviewLoaded(Vec<OAuthProviderOverview>),
    ApiKeyProvidersLoaded(Vec<ApiKeyProvider>),
    /// Both source lists from the same poll, applied as one tick.
    ProvidersLoaded {
        oauth: Vec<OAuthProviderOverview>,
        api_keys: Vec<ApiKeyProvider>,
    },
    RegistryLoaded(Vec<RegistryModel>),
    DefaultProviderResolved(DefaultProvider),
    ProviderSelected(String),
    ModelSelected(String),
}

/// A write the session made to the selection store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectionEvent {
    /// The one-shot initial provider choice has been made.
    Initialized { provider: String },
    ProviderChanged { from: String, to: String },
    ModelChanged { from: String, to: String },
}

/// Everything the presentation layer reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverView {
    pub configured_providers: Vec<ConfiguredProvider>,
    pub selected_provider: Option<ConfiguredProvider>,
    pub current_models: Vec<RegistryModel>,
    pub provider_type: String,
    pub model: String,
    pub initialized: bool,
}

pub struct ResolverSession<S> {
    oauth: Vec<OAuthProviderOverview>,
    oauth_loaded: bool,
    api_keys: Vec<ApiKeyProvider>,
    api_keys_loaded: bool,
    registry: Vec<RegistryModel>,
    registry_loaded: bool,
    server_default: Option<DefaultProvider>,
    configured: Vec<ConfiguredProvider>,
    reconciler: DefaultProviderReconciler,
    auto_model: ModelAutoSelector,
    store: S,
}

impl<S: SelectionStore> ResolverSession<S> {
    pub fn new(store: S) -> Self {
        Self {
            oauth: Vec::new(),
            oauth_loaded: false,
            api_keys: Vec::new(),
            api_keys_loaded: false,
            registry: Vec::new(),
            registry_loaded: false,
            server_default: None,
            configured: Vec::new(),
            reconciler: DefaultProviderReconciler::new(),
            auto_model: ModelAutoSelector::new(),
            store,
        }
    }

    /// Feed one event and return the selection writes it caused.
    pub fn apply(&mut self, event: SessionEvent) -> Vec<SelectionEvent> {
        let mut events = Vec::new();

        match event {
            SessionEvent::OAuthOverviewLoaded(oauth) => {
                self.oauth = oauth;
                self.oauth_loaded = true;
                self.rebuild();
            },
            SessionEvent::ApiKeyProvidersLoaded(api_keys) => {
                self.api_keys = api_keys;
                self.api_keys_loaded = true;
                self.rebuild();
            },
            SessionEvent::ProvidersLoaded { oauth, api_keys } => {
                self.oauth = oauth;
                self.api_keys = api_keys;
                self.oauth_loaded = true;
                self.api_keys_loaded = true;
                self.rebuild();
            },
            SessionEvent::RegistryLoaded(registry) => {
                self.registry = registry;
                self.registry_loaded = true;
            },
            SessionEvent::DefaultProviderResolved(default) => {
                if let Some(existing) = &self.server_default {
                    debug!(
                        existing = existing.as_key().unwrap_or("<none>"),
                        ignored = default.as_key().unwrap_or("<none>"),
                        "server default already resolved this session"
                    );
                } else {
                    self.server_default = Some(default);
                }
            },
            SessionEvent::ProviderSelected(provider) => {
                let from = self.store.provider_type();
                if from != provider {
                    info!(from = %from, to = %provider, "provider selected");
                    self.store.set_provider_type(provider.clone());
                    events.push(SelectionEvent::ProviderChanged { from, to: provider });
                }
            },
            SessionEvent::ModelSelected(model) => {
                let from = self.store.model();
                if from != model {
                    info!(from = %from, to = %model, "model selected");
                    self.store.set_model(model.clone());
                    events.push(SelectionEvent::ModelChanged { from, to: model });
                }
            },
        }

        self.reconcile_provider(&mut events);
        self.reconcile_model(&mut events);
        events
    }

    pub fn set_provider_type(&mut self, provider: impl Into<String>) -> Vec<SelectionEvent> {
        self.apply(SessionEvent::ProviderSelected(provider.into()))
    }

    pub fn set_model(&mut self, model: impl Into<String>) -> Vec<SelectionEvent> {
        self.apply(SessionEvent::ModelSelected(model.into()))
    }

    #[must_use]
    pub fn configured_providers(&self) -> &[ConfiguredProvider] {
        &self.configured
    }

    /// The configured provider matching the current selection, if any.
    #[must_use]
    pub fn selected_provider(&self) -> Option<&ConfiguredProvider> {
        let key = self.store.provider_type();
        self.configured.iter().find(|p| p.key == key)
    }

    #[must_use]
    pub fn current_models(&self) -> Vec<RegistryModel> {
        self.selected_provider()
            .map(|p| models_for_provider(&self.registry, p))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.reconciler.latch() == InitLatch::Initialized
    }

    /// Whether both provider source lists have arrived at least once.
    #[must_use]
    pub fn providers_loaded(&self) -> bool {
        self.oauth_loaded && self.api_keys_loaded
    }

    #[must_use]
    pub fn registry_loaded(&self) -> bool {
        self.registry_loaded
    }

    #[must_use]
    pub fn server_default(&self) -> Option<&DefaultProvider> {
        self.server_default.as_ref()
    }

    #[must_use]
    pub fn view(&self) -> ResolverView {
        let selection = self.store.snapshot();
        ResolverView {
            configured_providers: self.configured.clone(),
            selected_provider: self.selected_provider().cloned(),
            current_models: self.current_models(),
            provider_type: selection.provider_type,
            model: selection.model,
            initialized: self.is_initialized(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn rebuild(&mut self) {
        self.configured = build_configured_providers(&self.oauth, &self.api_keys);
    }

    fn reconcile_provider(&mut self, events: &mut Vec<SelectionEvent>) {
        if !self.providers_loaded() {
            return;
        }
        let current = self.store.provider_type();
        match self.reconciler.reconcile(
            &self.configured,
            &current,
            self.server_default.as_ref(),
        ) {
            ReconcileOutcome::Selected(provider) => {
                self.store.set_provider_type(provider.clone());
                events.push(SelectionEvent::ProviderChanged {
                    from: current,
                    to: provider.clone(),
                });
                events.push(SelectionEvent::Initialized { provider });
            },
            ReconcileOutcome::Kept => {
                events.push(SelectionEvent::Initialized { provider: current });
            },
            ReconcileOutcome::Pending | ReconcileOutcome::AlreadyInitialized => {},
        }
    }

    fn reconcile_model(&mut self, events: &mut Vec<SelectionEvent>) {
        let resolved = self.selected_provider().cloned();
        self.auto_model.observe(resolved.as_ref());
        if !self.auto_model.is_armed() {
            return;
        }

        let models = resolved
            .map(|p| models_for_provider(&self.registry, &p))
            .unwrap_or_default();
        let current = self.store.model();
        if let Some(next) = self
            .auto_model
            .apply(&models, &current, self.registry_loaded)
        {
            info!(from = %current, to = %next, "model auto-selected for provider");
            self.store.set_model(next.clone());
            events.push(SelectionEvent::ModelChanged {
                from: current,
                to: next,
            });
        }
    }
}

impl<S: SelectionStore + Default> Default for ResolverSession<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}
