// Copyright (c) The suitewatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine configuration.
//!
//! Built from an embedded default TOML document, optionally overlaid with
//! an operator-provided document. Inactivity window arithmetic is
//! deliberately not configurable: it is part of the notification protocol,
//! not an operator preference.

use crate::{errors::ConfigParseError, store::RunFilter};
use config::{Config, File, FileFormat};
use serde::Deserialize;
use suitewatch_metadata::TestKey;

/// Configuration for the alert evaluation cycle.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AlertConfig {
    /// Total commit attempts before a retryable store failure becomes fatal
    /// for the test being evaluated.
    pub max_commit_attempts: usize,
    /// Which run kinds advance suite status.
    pub run_filter: RunFilter,
    /// Base URL of the dashboard, used to build status-page links.
    pub dashboard_base_url: String,
    /// Recipient domains permitted to receive notifications. Empty means
    /// all domains are allowed.
    pub allowed_recipient_domains: Vec<String>,
}

impl AlertConfig {
    /// The embedded default configuration.
    const DEFAULT_CONFIG: &'static str = r#"
max-commit-attempts = 5
run-filter = "official-only"
dashboard-base-url = "https://suitewatch.example.com"
allowed-recipient-domains = []
"#;

    /// Returns the built-in defaults.
    pub fn default_config() -> Self {
        Self::from_sources(None).expect("default config is valid")
    }

    /// Builds a config from the embedded defaults overlaid with an optional
    /// operator-provided TOML document.
    pub fn from_sources(overlay_toml: Option<&str>) -> Result<Self, ConfigParseError> {
        let mut builder = Config::builder()
            .add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml));
        if let Some(overlay) = overlay_toml {
            builder = builder.add_source(File::from_str(overlay, FileFormat::Toml));
        }
        let config = builder.build().map_err(ConfigParseError::new)?;
        config.try_deserialize().map_err(ConfigParseError::new)
    }

    /// The status-page link for a test, embedded in notification footers.
    pub fn status_link(&self, test: &TestKey) -> String {
        format!(
            "{}/show_table?testName={}",
            self.dashboard_base_url.trim_end_matches('/'),
            test
        )
    }

    /// Returns true if a recipient passes the domain allow-list.
    pub fn recipient_allowed(&self, address: &str) -> bool {
        if self.allowed_recipient_domains.is_empty() {
            return true;
        }
        address.rsplit_once('@').is_some_and(|(_, domain)| {
            self.allowed_recipient_domains
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(domain))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_parse() {
        let config = AlertConfig::default_config();
        assert_eq!(config.max_commit_attempts, 5);
        assert_eq!(config.run_filter, RunFilter::OfficialOnly);
        assert!(config.allowed_recipient_domains.is_empty());
    }

    #[test]
    fn overlay_overrides_defaults() {
        let config = AlertConfig::from_sources(Some(
            r#"
max-commit-attempts = 2
run-filter = "all"
dashboard-base-url = "https://dash.internal/"
"#,
        ))
        .unwrap();
        assert_eq!(config.max_commit_attempts, 2);
        assert_eq!(config.run_filter, RunFilter::All);
        // Trailing slash is normalized when building links.
        assert_eq!(
            config.status_link(&TestKey::new("VtsHalNfcV1_0Target")),
            "https://dash.internal/show_table?testName=VtsHalNfcV1_0Target"
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        AlertConfig::from_sources(Some("max-commit-atempts = 2"))
            .expect_err("misspelled key should fail");
    }

    #[test]
    fn recipient_domain_allow_list() {
        let mut config = AlertConfig::default_config();
        assert!(config.recipient_allowed("anyone@anywhere.org"));

        config.allowed_recipient_domains = vec!["example.com".to_owned()];
        assert!(config.recipient_allowed("team@example.com"));
        assert!(config.recipient_allowed("team@EXAMPLE.com"));
        assert!(!config.recipient_allowed("team@elsewhere.com"));
        assert!(!config.recipient_allowed("no-at-sign"));
    }
}
