use {modelswitch_service_traits::RegistryModel, tracing::debug};

use crate::providers::ConfiguredProvider;

/// Picks a model when the resolved provider changes.
///
/// Edge-triggered: [`observe`](Self::observe) arms the selector only when the
/// resolved provider key differs from the last one seen, and
/// [`apply`](Self::apply) disarms it. Repeated observations of the same
/// provider never re-fire.
#[derive(Debug, Default)]
pub struct ModelAutoSelector {
    last_provider: Option<String>,
    armed: bool,
}

impl ModelAutoSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the currently resolved provider. Returns `true` on a transition.
    pub fn observe(&mut self, resolved: Option<&ConfiguredProvider>) -> bool {
        let key = resolved.map(|p| p.key.as_str());
        if self.last_provider.as_deref() == key {
            return false;
        }
        debug!(
            from = self.last_provider.as_deref().unwrap_or("<none>"),
            to = key.unwrap_or("<none>"),
            "resolved provider changed"
        );
        self.last_provider = key.map(str::to_string);
        self.armed = true;
        true
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Consume a pending provider change.
    ///
    /// Returns the model to write when `models` is non-empty and
    /// `current_model` is not among them. An empty list leaves the current
    /// model alone. While `registry_loaded` is false the edge stays armed so
    /// the pick happens once models arrive.
    pub fn apply(
        &mut self,
        models: &[RegistryModel],
        current_model: &str,
        registry_loaded: bool,
    ) -> Option<String> {
        if !self.armed || !registry_loaded {
            return None;
        }
        self.armed = false;

        let first = models.first()?;
        if models.iter().any(|m| m.id == current_model) {
            return None;
        }
        Some(first.id.clone())
    }
}
