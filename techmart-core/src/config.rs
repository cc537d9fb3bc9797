//! Configuration for the analysis pipeline.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/techmart/config.toml` and/or `.techmart/config.toml`
//! in the workspace directory.

use crate::error::AnalysisError;
use crate::index::IndexSpec;
use crate::normalize::RewriteRules;
use crate::schema::{CUSTOMER_DEMOGRAPHICS, EMPLOYEE_RECORDS, PRODUCT_DETAILS, TABLES};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Columns scanned for missing values, per table.
    #[serde(default)]
    pub detection: Vec<DetectionTarget>,
    /// Rewrite rules applied per table/column.
    #[serde(default)]
    pub cleaning: Vec<CleaningTarget>,
    /// Indexes built once cleaning is done.
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
    #[serde(default)]
    pub analysis: AnalysisSettings,
}

/// Where the store lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite file, relative to the workspace unless absolute.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("techsmart.db")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionTarget {
    pub table: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningTarget {
    pub table: String,
    pub column: String,
    #[serde(default = "RewriteRules::numeric_defaults")]
    pub rules: RewriteRules,
}

/// Knobs for the report queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Products kept per category in the top-sellers ranking.
    #[serde(default = "default_top_n")]
    pub top_n: u32,
    /// Categories covered by the store revenue breakdown (all when empty).
    #[serde(default = "default_revenue_categories")]
    pub revenue_categories: Vec<String>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            revenue_categories: default_revenue_categories(),
        }
    }
}

fn default_top_n() -> u32 {
    3
}

fn default_revenue_categories() -> Vec<String> {
    vec!["Electronics".to_string(), "Accessories".to_string()]
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let detection = vec![
            DetectionTarget {
                table: EMPLOYEE_RECORDS.name.to_string(),
                columns: vec!["sales_performance".to_string()],
            },
            DetectionTarget {
                table: PRODUCT_DETAILS.name.to_string(),
                columns: vec!["stock".to_string()],
            },
            DetectionTarget {
                table: CUSTOMER_DEMOGRAPHICS.name.to_string(),
                columns: vec!["age".to_string(), "loyalty_program".to_string()],
            },
        ];

        // Every text-stored numeric column gets the standard sentinel rules.
        let cleaning = TABLES
            .iter()
            .flat_map(|t| {
                t.numeric_text_columns().map(|c| CleaningTarget {
                    table: t.name.to_string(),
                    column: c.to_string(),
                    rules: RewriteRules::numeric_defaults(),
                })
            })
            .collect();

        Self {
            database: DatabaseConfig::default(),
            detection,
            cleaning,
            indexes: vec![IndexSpec::new(PRODUCT_DETAILS.name, "category")],
            analysis: AnalysisSettings::default(),
        }
    }
}

impl AnalysisConfig {
    /// Resolve the database path against `workspace` when it is relative.
    pub fn database_path(&self, workspace: &Path) -> PathBuf {
        if self.database.path.is_absolute() {
            self.database.path.clone()
        } else {
            workspace.join(&self.database.path)
        }
    }

    /// Static checks that do not need the store.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.analysis.top_n == 0 {
            return Err(AnalysisError::config("analysis.top_n must be at least 1"));
        }
        for target in &self.cleaning {
            target.rules.validate().map_err(|e| {
                AnalysisError::config(format!("cleaning {}.{}: {e}", target.table, target.column))
            })?;
        }
        for target in &self.detection {
            if target.columns.is_empty() {
                return Err(AnalysisError::config(format!(
                    "detection target {} lists no columns",
                    target.table
                )));
            }
        }
        Ok(())
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "techmart", "techmart")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `TECHMART_`)
/// 3. An explicit config file (`--config`), if given
/// 4. Workspace-local config (`.techmart/config.toml`)
/// 5. User config (`~/.config/techmart/config.toml`)
/// 6. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&AnalysisConfig>,
) -> Result<AnalysisConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(AnalysisConfig::default()));

    // User-level config
    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".techmart").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }

    // Environment variables (TECHMART_DATABASE__PATH, TECHMART_ANALYSIS__TOP_N, etc.)
    figment = figment.merge(Env::prefixed("TECHMART_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Check whether a user-level or workspace-level config file exists.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if let Some(dirs) = project_dirs() {
        if dirs.config_dir().join("config.toml").exists() {
            return true;
        }
    }
    if let Some(ws) = workspace {
        if ws.join(".techmart").join("config.toml").exists() {
            return true;
        }
    }
    false
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".techmart").join("config.toml")
}
