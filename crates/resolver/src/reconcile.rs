//! One-shot choice of the initial provider.
//!
//! The reconciler waits until both the configured provider list is non-empty
//! and the server default has settled, then picks a provider exactly once.
//! After that only explicit user actions change the provider.

use {modelswitch_service_traits::DefaultProvider, tracing::info};

use crate::providers::ConfiguredProvider;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InitLatch {
    #[default]
    Uninitialized,
    Initialized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Inputs not ready yet; nothing decided.
    Pending,
    /// Latched on an earlier call.
    AlreadyInitialized,
    /// Latched now; the current selection stays as it is.
    Kept,
    /// Latched now; the caller must write this provider key.
    Selected(String),
}

#[derive(Debug, Default)]
pub struct DefaultProviderReconciler {
    latch: InitLatch,
}

impl DefaultProviderReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn latch(&self) -> InitLatch {
        self.latch
    }

    /// `server_default` is `None` while its fetch is still in flight.
    pub fn reconcile(
        &mut self,
        providers: &[ConfiguredProvider],
        current_provider_type: &str,
        server_default: Option<&DefaultProvider>,
    ) -> ReconcileOutcome {
        if self.latch == InitLatch::Initialized {
            return ReconcileOutcome::AlreadyInitialized;
        }
        let Some(server_default) = server_default else {
            return ReconcileOutcome::Pending;
        };
        let Some(first) = providers.first() else {
            return ReconcileOutcome::Pending;
        };

        self.latch = InitLatch::Initialized;

        let contains = |key: &str| providers.iter().any(|p| p.key == key);

        let outcome = match server_default.as_key() {
            Some(key) if contains(key) => {
                if key == current_provider_type {
                    ReconcileOutcome::Kept
                } else {
                    ReconcileOutcome::Selected(key.to_string())
                }
            },
            _ if contains(current_provider_type) => ReconcileOutcome::Kept,
            _ => ReconcileOutcome::Selected(first.key.clone()),
        };

        info!(
            server_default = server_default.as_key().unwrap_or("<none>"),
            current = current_provider_type,
            outcome = ?outcome,
            "initial provider reconciled"
        );
        outcome
    }
}
