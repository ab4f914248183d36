//! Payment and admin settings.
//!
//! The persisted singleton is never used directly. Every request resolves
//! the effective settings with [`resolve`], where process environment values
//! win over stored ones.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::ShopError;

pub const SETTINGS_ID: &str = "default";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";
/// Returned in place of any secret that is set.
pub const MASK: &str = "***";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Test,
    #[serde(alias = "prod", alias = "production")]
    Live,
}

impl Mode {
    pub fn as_str(&self) -> &'static str { match self { Self::Test => "test", Self::Live => "live" } }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Mode {
    type Err = ShopError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "test" | "sandbox" => Ok(Self::Test),
            "live" | "prod" | "production" => Ok(Self::Live),
            other => Err(ShopError::Validation(format!("Unknown mode '{other}'"))),
        }
    }
}

/// Persisted settings record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredSettings {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub test_pk: Option<String>,
    #[serde(default)]
    pub test_sk: Option<String>,
    #[serde(default)]
    pub prod_pk: Option<String>,
    #[serde(default)]
    pub prod_sk: Option<String>,
    #[serde(default = "default_password")]
    pub admin_password: String,
    #[serde(default)]
    pub contact_handle: Option<String>,
}

fn default_password() -> String { DEFAULT_ADMIN_PASSWORD.to_string() }

impl Default for StoredSettings {
    fn default() -> Self {
        Self {
            mode: Mode::Test, test_pk: None, test_sk: None, prod_pk: None, prod_sk: None,
            admin_password: default_password(), contact_handle: None,
        }
    }
}

/// Values supplied by the process environment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvOverrides {
    pub mode: Option<Mode>,
    pub test_pk: Option<String>,
    pub test_sk: Option<String>,
    pub prod_pk: Option<String>,
    pub prod_sk: Option<String>,
    pub legacy_secret_key: Option<String>,
    pub admin_password: Option<String>,
    pub contact_handle: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mode = get("APP_MODE").and_then(|raw| match raw.parse::<Mode>() {
            Ok(mode) => Some(mode),
            Err(_) => {
                warn!(value = %raw, "ignoring unrecognised APP_MODE");
                None
            }
        });
        Self {
            mode,
            test_pk: get("STRIPE_TEST_PK"),
            test_sk: get("STRIPE_TEST_SK"),
            prod_pk: get("STRIPE_PROD_PK"),
            prod_sk: get("STRIPE_PROD_SK"),
            legacy_secret_key: get("STRIPE_SECRET_KEY"),
            admin_password: get("ADMIN_PASSWORD"),
            contact_handle: get("CONTACT_HANDLE"),
        }
    }
}

/// Settings after environment overrides are applied.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectiveSettings {
    pub mode: Mode,
    pub test_pk: Option<String>,
    pub test_sk: Option<String>,
    pub prod_pk: Option<String>,
    pub prod_sk: Option<String>,
    pub legacy_secret_key: Option<String>,
    pub admin_password: String,
    pub contact_handle: Option<String>,
}

pub fn resolve(persisted: &StoredSettings, env: &EnvOverrides) -> EffectiveSettings {
    fn pick(env: &Option<String>, stored: &Option<String>) -> Option<String> {
        env.clone().or_else(|| stored.clone().filter(|v| !v.trim().is_empty()))
    }
    EffectiveSettings {
        mode: env.mode.unwrap_or(persisted.mode),
        test_pk: pick(&env.test_pk, &persisted.test_pk),
        test_sk: pick(&env.test_sk, &persisted.test_sk),
        prod_pk: pick(&env.prod_pk, &persisted.prod_pk),
        prod_sk: pick(&env.prod_sk, &persisted.prod_sk),
        legacy_secret_key: env.legacy_secret_key.clone(),
        admin_password: env.admin_password.clone().unwrap_or_else(|| persisted.admin_password.clone()),
        contact_handle: pick(&env.contact_handle, &persisted.contact_handle),
    }
}

/// Keys shipped in sample configs that must never reach the provider.
pub fn is_placeholder(key: &str) -> bool {
    let key = key.trim();
    key.is_empty()
        || key.ends_with("...")
        || key.contains("placeholder")
        || key.contains("xxxx")
        || matches!(key, "sk_test_" | "sk_live_" | "changeme")
}

impl EffectiveSettings {
    pub fn is_test_mode(&self) -> bool { self.mode == Mode::Test }

    pub fn publishable_key(&self) -> Option<&str> {
        match self.mode { Mode::Test => self.test_pk.as_deref(), Mode::Live => self.prod_pk.as_deref() }
    }

    /// Secret key for the active mode, falling back to the legacy single key.
    pub fn secret_key(&self) -> crate::Result<&str> {
        let for_mode = match self.mode { Mode::Test => self.test_sk.as_deref(), Mode::Live => self.prod_sk.as_deref() };
        for_mode
            .filter(|k| !is_placeholder(k))
            .or_else(|| self.legacy_secret_key.as_deref().filter(|k| !is_placeholder(k)))
            .ok_or_else(|| ShopError::Configuration(format!("no payment secret key configured for {} mode", self.mode)))
    }

    pub fn masked(&self) -> MaskedSettings {
        fn mask(v: &Option<String>) -> String { if v.is_some() { MASK.to_string() } else { String::new() } }
        MaskedSettings {
            mode: self.mode,
            test_pk: self.test_pk.clone().unwrap_or_default(),
            test_sk: mask(&self.test_sk),
            prod_pk: self.prod_pk.clone().unwrap_or_default(),
            prod_sk: mask(&self.prod_sk),
            contact_handle: self.contact_handle.clone().unwrap_or_default(),
            has_password: !self.admin_password.is_empty(),
        }
    }

    pub fn public_config(&self) -> PublicConfig {
        PublicConfig {
            publishable_key: self.publishable_key().unwrap_or_default().to_string(),
            is_test_mode: self.is_test_mode(),
            contact_handle: self.contact_handle.clone(),
        }
    }
}

/// Settings as shown to the admin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskedSettings {
    pub mode: Mode,
    pub test_pk: String,
    pub test_sk: String,
    pub prod_pk: String,
    pub prod_sk: String,
    pub contact_handle: String,
    pub has_password: bool,
}

/// What any storefront visitor may see.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicConfig {
    pub publishable_key: String,
    pub is_test_mode: bool,
    pub contact_handle: Option<String>,
}

/// Admin settings write.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub mode: Option<Mode>,
    #[serde(alias = "test_pk")]
    pub test_pk: Option<String>,
    #[serde(alias = "test_sk")]
    pub test_sk: Option<String>,
    #[serde(alias = "prod_pk")]
    pub prod_pk: Option<String>,
    #[serde(alias = "prod_sk")]
    pub prod_sk: Option<String>,
    #[serde(alias = "new_password")]
    pub new_password: Option<String>,
    #[serde(alias = "contact_handle")]
    pub contact_handle: Option<String>,
}

impl SettingsUpdate {
    pub fn apply(self, stored: &mut StoredSettings) {
        fn blank_to_none(v: String) -> Option<String> {
            let v = v.trim().to_string();
            (!v.is_empty()).then_some(v)
        }
        // echoed masks mean "unchanged"
        fn fresh_secret(v: Option<String>) -> Option<String> {
            v.filter(|s| !s.trim().is_empty() && !s.contains(MASK)).map(|s| s.trim().to_string())
        }
        if let Some(mode) = self.mode { stored.mode = mode; }
        if let Some(pk) = self.test_pk { stored.test_pk = blank_to_none(pk); }
        if let Some(pk) = self.prod_pk { stored.prod_pk = blank_to_none(pk); }
        if let Some(sk) = fresh_secret(self.test_sk) { stored.test_sk = Some(sk); }
        if let Some(sk) = fresh_secret(self.prod_sk) { stored.prod_sk = Some(sk); }
        if let Some(pw) = self.new_password.and_then(blank_to_none) { stored.admin_password = pw; }
        if let Some(handle) = self.contact_handle { stored.contact_handle = blank_to_none(handle); }
    }
}
