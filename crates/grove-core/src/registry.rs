//! Named providers with exactly one active at a time (or none when empty).

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{RagError, Result};
use crate::provider::RagProvider;

#[derive(Default)]
struct RegistryState {
    providers: BTreeMap<String, Arc<dyn RagProvider>>,
    active: Option<String>,
}

/// Owned by the service and passed to whoever needs it.
///
/// Invariant: `active` is `None` exactly when no provider is registered, and otherwise
/// names a registered provider.
#[derive(Default)]
pub struct ProviderRegistry {
    state: RwLock<RegistryState>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry").finish_non_exhaustive()
    }
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize and add `provider`. The first successful registration becomes active.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::AlreadyRegistered`] if the name is taken, or the provider's
    /// initialization error; in both cases the registry is unchanged.
    pub async fn register(&self, provider: Arc<dyn RagProvider>) -> Result<()> {
        let name = provider.name().to_owned();
        let mut state = self.state.write().await;
        if state.providers.contains_key(&name) {
            return Err(RagError::AlreadyRegistered(name));
        }

        provider.initialize().await.inspect_err(|e| {
            tracing::warn!(provider = %name, error = %e, "provider initialization failed");
        })?;

        state.providers.insert(name.clone(), provider);
        if state.active.is_none() {
            state.active = Some(name.clone());
        }
        tracing::info!(provider = %name, "provider registered");
        Ok(())
    }

    /// Close and remove `name`. If it was active, the first remaining name (sorted)
    /// becomes active.
    ///
    /// A failing `close` is logged and returned, but the provider is removed regardless.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotFound`] for an unknown name, or the provider's close error.
    pub async fn unregister(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let provider = state.providers.remove(name).ok_or_else(|| RagError::NotFound {
            what: "provider",
            name: name.to_owned(),
        })?;

        if state.active.as_deref() == Some(name) {
            state.active = state.providers.keys().next().cloned();
            tracing::info!(
                removed = name,
                active = state.active.as_deref().unwrap_or("<none>"),
                "active provider replaced"
            );
        }
        drop(state);

        provider.close().await.inspect_err(|e| {
            tracing::warn!(provider = name, error = %e, "provider close failed");
        })
    }

    /// # Errors
    ///
    /// Returns [`RagError::NotFound`] if `name` is not registered.
    pub async fn set_active(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.providers.contains_key(name) {
            return Err(RagError::NotFound {
                what: "provider",
                name: name.to_owned(),
            });
        }
        state.active = Some(name.to_owned());
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`RagError::NoActiveProvider`] if the registry is empty.
    pub async fn active(&self) -> Result<Arc<dyn RagProvider>> {
        let state = self.state.read().await;
        state
            .active
            .as_ref()
            .and_then(|name| state.providers.get(name))
            .cloned()
            .ok_or(RagError::NoActiveProvider)
    }

    pub async fn active_name(&self) -> Option<String> {
        self.state.read().await.active.clone()
    }

    /// # Errors
    ///
    /// Returns [`RagError::NotFound`] if `name` is not registered.
    pub async fn get(&self, name: &str) -> Result<Arc<dyn RagProvider>> {
        self.state
            .read()
            .await
            .providers
            .get(name)
            .cloned()
            .ok_or_else(|| RagError::NotFound {
                what: "provider",
                name: name.to_owned(),
            })
    }

    /// Registered names in sorted order.
    pub async fn list(&self) -> Vec<String> {
        self.state.read().await.providers.keys().cloned().collect()
    }

    /// Close every provider and empty the registry. Close errors are logged.
    pub async fn close_all(&self) {
        let providers = {
            let mut state = self.state.write().await;
            state.active = None;
            std::mem::take(&mut state.providers)
        };
        for (name, provider) in providers {
            if let Err(e) = provider.close().await {
                tracing::warn!(provider = %name, error = %e, "provider close failed");
            }
        }
    }
}
