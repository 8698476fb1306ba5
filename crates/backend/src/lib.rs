//! Backend plumbing for the resolver: the HTTP client for the local backend's
//! JSON API and the polling driver that keeps a session up to date.

pub mod client;
pub mod driver;
pub mod error;

pub use {
    client::{HttpProviderBackend, fetch_default_provider_terminal},
    driver::{DriverHandle, RefreshOutcome, ResolverDriver},
    error::{Error, Result},
};
