//! Configuration loader for the observation ingester.
//!
//! One YAML file with sections `database`, `ingestion`, `logging` and the
//! mapping seeds, given inline (`mappings:`) or as a file (`mappings_file:`,
//! YAML or CSV). Every section is optional.
//!
//! Supports environment variable substitution using ${VAR} syntax.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use ingestion::IngestConfig;
use obs_common::{Mapping, MappingProvenance, Namespace};

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/observations";

// ============================================================================
// Service configuration
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub database: DatabaseConfig,
    pub ingestion: IngestConfig,
    pub logging: LoggingConfig,
    /// Inline mapping seeds.
    pub mappings: Vec<Mapping>,
    /// Seed file, relative to the config file's directory.
    pub mappings_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            max_connections: 5,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ServiceConfig {
    /// All mapping seeds: inline entries first, then the seed file's.
    pub fn seed_mappings(&self) -> Result<Vec<Mapping>> {
        let mut seeds: Vec<Mapping> = self.mappings.iter().cloned().map(seed).collect();
        if let Some(path) = &self.mappings_file {
            seeds.extend(load_mapping_file(path)?);
        }
        Ok(seeds)
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Load and validate a service configuration file.
pub fn load_service_config<P: AsRef<Path>>(path: P) -> Result<ServiceConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_service_config(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    if let Some(file) = &config.mappings_file {
        if file.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.mappings_file = Some(base.join(file));
        }
    }
    Ok(config)
}

/// Parse configuration text after environment expansion.
pub fn parse_service_config(content: &str) -> Result<ServiceConfig> {
    let expanded = expand_env_vars(content)?;
    let config: ServiceConfig = if expanded.trim().is_empty() {
        ServiceConfig::default()
    } else {
        serde_yaml::from_str(&expanded)?
    };
    validate_service_config(&config)?;
    Ok(config)
}

/// One row of a CSV seed file.
#[derive(Debug, Deserialize)]
struct SeedRow {
    raw_name: String,
    standard_code: String,
    namespace: String,
    unit: String,
    #[serde(default)]
    description: Option<String>,
}

/// Load mapping seeds from a YAML list or a CSV file, chosen by extension.
pub fn load_mapping_file<P: AsRef<Path>>(path: P) -> Result<Vec<Mapping>> {
    let path = path.as_ref();
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));

    if !is_csv {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read mapping file: {}", path.display()))?;
        let mappings: Vec<Mapping> = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse mapping file: {}", path.display()))?;
        return Ok(mappings.into_iter().map(seed).collect());
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open mapping file: {}", path.display()))?;

    let mut mappings = Vec::new();
    for (i, row) in reader.deserialize::<SeedRow>().enumerate() {
        let row = row.with_context(|| format!("{}: bad row {}", path.display(), i + 2))?;
        let namespace: Namespace = row
            .namespace
            .parse()
            .with_context(|| format!("{}: row {}", path.display(), i + 2))?;
        let mut mapping = Mapping::new(&row.raw_name, row.standard_code, namespace, row.unit);
        mapping.description = row.description.filter(|d| !d.is_empty());
        mappings.push(mapping);
    }
    Ok(mappings)
}

fn seed(mapping: Mapping) -> Mapping {
    Mapping {
        provenance: MappingProvenance::Seed,
        ..mapping.normalized()
    }
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in configuration content
///
/// Supports:
/// - ${VAR} - required variable
/// - ${VAR:-default} - variable with default value
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'

            let mut var_expr = String::new();
            let mut brace_count = 1;

            while brace_count > 0 {
                match chars.next() {
                    Some('{') => {
                        brace_count += 1;
                        var_expr.push('{');
                    }
                    Some('}') => {
                        brace_count -= 1;
                        if brace_count > 0 {
                            var_expr.push('}');
                        }
                    }
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }

            result.push_str(&resolve_var_expr(&var_expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

/// Resolve variable expression (supports VAR and VAR:-default syntax)
fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match std::env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}

// ============================================================================
// Validation
// ============================================================================

fn validate_service_config(config: &ServiceConfig) -> Result<()> {
    anyhow::ensure!(!config.database.url.trim().is_empty(), "Database url cannot be empty");
    anyhow::ensure!(
        config.database.max_connections > 0,
        "Database max_connections must be greater than 0"
    );
    config
        .ingestion
        .validate()
        .context("Invalid ingestion section")?;

    for mapping in &config.mappings {
        anyhow::ensure!(
            !mapping.raw_name.trim().is_empty() && !mapping.standard_code.trim().is_empty(),
            "Mapping seeds need a raw_name and a standard_code"
        );
    }
    Ok(())
}
