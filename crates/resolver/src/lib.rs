//! Provider/model selection resolver.
//!
//! Reconciles the OAuth credential pool and API-key providers against the
//! model registry and the server-declared default, and keeps the caller's
//! `(provider, model)` selection consistent as that data changes.

pub mod error;
pub mod model_select;
pub mod providers;
pub mod reconcile;
pub mod selection;
pub mod session;
pub mod tables;

pub use {
    model_select::ModelAutoSelector,
    providers::{ConfiguredProvider, build_configured_providers, models_for_provider},
    reconcile::{DefaultProviderReconciler, InitLatch, ReconcileOutcome},
    selection::{FileSelectionStore, InMemorySelection, Selection, SelectionStore},
    session::{ResolverSession, ResolverView, SelectionEvent, SessionEvent},
    tables::{CredentialTypeConfig, credential_type_config, registry_override},
};
