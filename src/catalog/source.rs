//! Rule sources
//!
//! A `RuleSource` produces a validated `RuleCatalog`. The engine never
//! authors rules; it only reads them at start-up or on an explicit reload.
//!
//! YAML layout supports two modes:
//! 1. Single file: `intent_rules.yaml` holding `rules:` plus optional settings
//! 2. Directory: every `*.yaml` / `*.yml` file (recursive, sorted by path);
//!    files whose name starts with `_` carry catalog settings only

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::{CatalogSettings, IntentRule, RuleCatalog};

/// Read-only provider of the rule catalog.
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Human label for logs (path, table name, ...).
    fn describe(&self) -> String;

    /// Load and validate the full catalog.
    async fn load(&self) -> Result<RuleCatalog>;
}

/// Contents of one rule file: a bare list, or a document with settings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RuleFile {
    List(Vec<IntentRule>),
    Document {
        #[serde(default)]
        rules: Vec<IntentRule>,
        #[serde(flatten)]
        settings: CatalogSettings,
    },
}

/// Rules from a YAML file or a directory of YAML files.
#[derive(Debug, Clone)]
pub struct YamlRuleSource {
    path: PathBuf,
}

impl YamlRuleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Synchronous load, used by the CLI and tests.
    pub fn load_catalog(&self) -> Result<RuleCatalog> {
        let (rules, settings) = if self.path.is_dir() {
            self.load_directory()?
        } else {
            let file = read_rule_file(&self.path)?;
            split(file)
        };

        let catalog = RuleCatalog::build(rules, settings)
            .with_context(|| format!("Invalid rule catalog at {}", self.path.display()))?;

        info!(
            "Loaded {} intent rules ({} active) from {}",
            catalog.len(),
            catalog.active_rules().count(),
            self.path.display()
        );
        Ok(catalog)
    }

    fn load_directory(&self) -> Result<(Vec<IntentRule>, CatalogSettings)> {
        let mut files = Vec::new();
        find_yaml_files(&self.path, &mut files)?;
        files.sort();

        let mut rules = Vec::new();
        let mut settings = CatalogSettings::default();

        for path in files {
            let is_settings = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with('_'))
                .unwrap_or(false);

            if is_settings {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let partial: CatalogSettings = serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", path.display()))?;
                if partial.fallback_rule.is_some() {
                    settings.fallback_rule = partial.fallback_rule;
                }
                settings.charts.extend(partial.charts);
                continue;
            }

            let (file_rules, file_settings) = split(read_rule_file(&path)?);
            rules.extend(file_rules);
            if file_settings.fallback_rule.is_some() {
                settings.fallback_rule = file_settings.fallback_rule;
            }
            settings.charts.extend(file_settings.charts);
        }

        Ok((rules, settings))
    }
}

#[async_trait]
impl RuleSource for YamlRuleSource {
    fn describe(&self) -> String {
        format!("yaml:{}", self.path.display())
    }

    async fn load(&self) -> Result<RuleCatalog> {
        self.load_catalog()
    }
}

fn read_rule_file(path: &Path) -> Result<RuleFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn split(file: RuleFile) -> (Vec<IntentRule>, CatalogSettings) {
    match file {
        RuleFile::List(rules) => (rules, CatalogSettings::default()),
        RuleFile::Document { rules, settings } => (rules, settings),
    }
}

fn find_yaml_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            find_yaml_files(&path, out)?;
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        ) {
            out.push(path);
        }
    }
    Ok(())
}
