// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use std::path::Path;
use std::time::Duration;
use serde::{Serialize, Deserialize};
use figment::{Figment, Error, providers::{Format, Json, Yaml, Toml, Env, Serialized}};

use crate::constant::{ENV_PREFIX, DEFAULT_FIELD_MANAGER, DEFAULT_NAMESPACE};

#[derive(Debug, Deserialize, Serialize, Clone)]
#[allow(unused)]
#[derive(Default)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
}

/// Provider-level defaults applied to every lifecycle operation that does
/// not override them explicitly
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[allow(unused)]
pub struct ProviderConfig {
    #[serde(default)]
    pub field_manager: String,
    #[serde(default)]
    pub force_conflicts: bool,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub default_poll_interval: Duration,
    #[serde(default = "default_wait_timeout", with = "humantime_serde")]
    pub default_wait_timeout: Duration,
    #[serde(default)]
    pub default_namespace: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            force_conflicts: false,
            default_poll_interval: default_poll_interval(),
            default_wait_timeout: default_wait_timeout(),
            default_namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_wait_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

pub struct AppConfigBuilder {
    figment: Figment,
}

impl AppConfigBuilder {
    pub fn with_file(&mut self, path: &str) -> &mut Self {
        let extension = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();

        self.figment = match extension {
            "json" => self.figment.clone().merge(Json::file(path)),
            "yaml" | "yml" => self.figment.clone().merge(Yaml::file(path)),
            "toml" => self.figment.clone().merge(Toml::file(path)),
            _ => self.figment.clone(),
        };
        self
    }

    pub fn with_env(&mut self) -> &mut Self {
        self.figment = self.figment.clone().merge(Env::prefixed(&format!("{}__", ENV_PREFIX)).split("__"));
        self
    }

    /// Override a single dotted key (e.g. `provider.field_manager`) when a
    /// value was supplied, typically from a command line flag
    pub fn with_override_option<T: Serialize>(&mut self, key: &str, value: Option<T>) -> &mut Self {
        if let Some(value) = value {
            self.figment = self.figment.clone().merge(Serialized::default(key, value));
        }
        self
    }

    pub fn build(&self) -> Result<AppConfig, Error> {
        self.figment.extract()
    }
}

impl Default for AppConfigBuilder {
    fn default() -> Self {
        AppConfigBuilder {
            figment: Figment::from(Serialized::defaults(AppConfig::default()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_used_without_sources() {
        let config = AppConfigBuilder::default().build().unwrap();
        assert_eq!(config.provider, ProviderConfig::default());
        assert_eq!(config.provider.field_manager, "kres");
        assert!(!config.provider.force_conflicts);
    }

    #[test]
    fn env_overrides_file_and_flags_override_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "kres.yaml",
                "provider:\n  field_manager: from-file\n  default_poll_interval: 250ms\n",
            )?;
            jail.set_env("KRES__PROVIDER__FORCE_CONFLICTS", "true");
            jail.set_env("KRES__PROVIDER__FIELD_MANAGER", "from-env");

            let config = AppConfigBuilder::default()
                .with_file("kres.yaml")
                .with_env()
                .build()?;
            assert_eq!(config.provider.field_manager, "from-env");
            assert!(config.provider.force_conflicts);
            assert_eq!(config.provider.default_poll_interval, Duration::from_millis(250));

            let config = AppConfigBuilder::default()
                .with_file("kres.yaml")
                .with_env()
                .with_override_option("provider.field_manager", Some("from-flag"))
                .with_override_option::<bool>("provider.force_conflicts", None)
                .build()?;
            assert_eq!(config.provider.field_manager, "from-flag");
            assert!(config.provider.force_conflicts);

            Ok(())
        });
    }

    #[test]
    fn unknown_extension_is_ignored() {
        Jail::expect_with(|jail| {
            jail.create_file("kres.ini", "field_manager = nope")?;
            let config = AppConfigBuilder::default().with_file("kres.ini").build()?;
            assert_eq!(config.provider.field_manager, "kres");
            Ok(())
        });
    }
}
