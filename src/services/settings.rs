use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::settings::{resolve, EffectiveSettings, EnvOverrides, PublicConfig, SettingsUpdate, StoredSettings};
use crate::store::{Store, StoreError};
use crate::Result;

type EnvSource = Arc<dyn Fn() -> EnvOverrides + Send + Sync>;

/// Result of an admin settings write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The backing store refused the write; environment variables must be used.
    ReadOnly,
}

#[derive(Clone)]
pub struct SettingsService {
    store: Arc<dyn Store>,
    env: EnvSource,
}

impl SettingsService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_env(store, EnvOverrides::from_env)
    }

    pub fn with_env(store: Arc<dyn Store>, env: impl Fn() -> EnvOverrides + Send + Sync + 'static) -> Self {
        Self { store, env: Arc::new(env) }
    }

    /// Persisted settings, creating the defaults on first use.
    pub async fn stored(&self) -> Result<StoredSettings> {
        if let Some(settings) = self.store.load_settings().await? {
            return Ok(settings);
        }
        let defaults = StoredSettings::default();
        match self.store.save_settings(&defaults).await {
            Ok(()) => info!("created default settings"),
            Err(StoreError::ReadOnly) => warn!("settings store is read-only, using defaults"),
            Err(e) => return Err(e.into()),
        }
        Ok(defaults)
    }

    /// Evaluated fresh on every call so environment changes are never stale.
    pub async fn effective(&self) -> Result<EffectiveSettings> {
        let stored = self.stored().await?;
        Ok(resolve(&stored, &(self.env)()))
    }

    /// Storefront config; a store failure degrades to defaults plus environment.
    pub async fn public_config(&self) -> PublicConfig {
        let stored = match self.stored().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "settings unavailable, serving environment config");
                StoredSettings::default()
            }
        };
        resolve(&stored, &(self.env)()).public_config()
    }

    #[instrument(skip_all)]
    pub async fn update(&self, update: SettingsUpdate) -> Result<SaveOutcome> {
        let mut stored = self.stored().await?;
        update.apply(&mut stored);
        match self.store.save_settings(&stored).await {
            Ok(()) => {
                info!(mode = %stored.mode, "settings saved");
                Ok(SaveOutcome::Saved)
            }
            Err(StoreError::ReadOnly) => {
                warn!("settings store is read-only");
                Ok(SaveOutcome::ReadOnly)
            }
            Err(e) => Err(e.into()),
        }
    }
}
