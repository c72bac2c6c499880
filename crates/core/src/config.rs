//! `.depgraph.toml` configuration: scan root overrides, extra skip
//! directories, profile list, and keep-rule sources (SPEC_FULL.md ambient
//! configuration section).

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct DepgraphConfig {
    /// Extra directory names to skip, added to `fsutil::default_skip_dirs()`.
    #[serde(default)]
    pub extra_skip_dirs: Vec<String>,
    /// Named profiles available to the classification engine, beyond `default`.
    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,
    /// Keep-rule sources, in the shapes `classify::compile_keep_rules` accepts.
    #[serde(default)]
    pub keep_rules: Vec<toml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    pub name: String,
    #[serde(default)]
    pub flags: std::collections::BTreeMap<String, toml::Value>,
}

impl DepgraphConfig {
    /// Loads `.depgraph.toml` from `root`. Returns the default config if the
    /// file is missing, unreadable, or fails to parse.
    pub fn load(root: &Path) -> Self {
        Self::load_from_path(&root.join(".depgraph.toml"))
    }

    pub fn load_from_path(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(text) => match toml::from_str(&text) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to parse .depgraph.toml, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read .depgraph.toml, using defaults");
                Self::default()
            }
        }
    }

    /// `keep_rules` re-expressed as JSON values for `classify::compile_keep_rules`.
    pub fn keep_rule_values(&self) -> Vec<serde_json::Value> {
        self.keep_rules.iter().filter_map(|v| toml_to_json(v)).collect()
    }

    pub fn profiles(&self) -> Vec<crate::model::Profile> {
        let mut out = vec![crate::model::Profile::default_profile()];
        for p in &self.profiles {
            let flags = p.flags.iter().filter_map(|(k, v)| toml_to_json(v).map(|v| (k.clone(), v))).collect();
            out.push(crate::model::Profile { name: p.name.clone(), flags });
        }
        out
    }
}

fn toml_to_json(v: &toml::Value) -> Option<serde_json::Value> {
    serde_json::to_value(v).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_yields_default_single_profile() {
        let dir = tempfile::tempdir().unwrap();
        let config = DepgraphConfig::load(dir.path());
        assert!(config.extra_skip_dirs.is_empty());
        assert_eq!(config.profiles().len(), 1);
        assert_eq!(config.profiles()[0].name, "default");
    }

    #[test]
    fn parses_extra_skip_dirs_and_profiles() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".depgraph.toml"),
            r#"
extra_skip_dirs = ["vendor", "generated"]

[[profiles]]
name = "test"

[profiles.flags]
ci = true
"#,
        )
        .unwrap();

        let config = DepgraphConfig::load(dir.path());
        assert_eq!(config.extra_skip_dirs, vec!["vendor".to_string(), "generated".to_string()]);
        let profiles = config.profiles();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[1].name, "test");
    }

    #[test]
    fn malformed_config_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".depgraph.toml"), "not valid toml :::").unwrap();
        let config = DepgraphConfig::load(dir.path());
        assert!(config.extra_skip_dirs.is_empty());
    }
}
