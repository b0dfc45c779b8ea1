//! CLI command implementations
//!
//! Each command loads its inputs, runs once, writes one JSON response to
//! stdout and exits. Diagnostics go to stderr only.

use std::path::Path;

use serde_json::{json, Value};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_request, write_error, write_response};
use crate::catalog::Catalog;
use crate::observability::{log_event_with_fields, Event, Logger, PlannerMetrics};
use crate::plan::{CompiledPlan, ExplainPlan};
use crate::planner::{PlannerConfig, PlannerResult, QueryPlanner};
use crate::query::ResolvedQuery;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command, cli.verbose)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command, verbose: bool) -> CliResult<()> {
    match cmd {
        Command::Plan {
            catalog,
            config,
            pretty,
        } => plan(&catalog, config.as_deref(), pretty, verbose),
        Command::Explain { catalog, config } => explain(&catalog, config.as_deref(), verbose),
        Command::CheckCatalog { catalog } => check_catalog(&catalog),
    }
}

/// Plan one query read from stdin and print the compiled plan
///
/// A rejected query is reported as an error response and a non-zero exit.
pub fn plan(catalog_path: &Path, config_path: Option<&Path>, pretty: bool, verbose: bool) -> CliResult<()> {
    let (catalog, config) = load_inputs(catalog_path, config_path, verbose)?;
    let request = read_request()?;

    match plan_request(&catalog, &config, request)? {
        Ok(compiled) => {
            let fingerprint = compiled.fingerprint()?;
            write_response(
                json!({
                    "plan": serde_json::to_value(&compiled)?,
                    "fingerprint": fingerprint,
                }),
                pretty,
            )
        }
        Err(err) => {
            write_error(err.code().code(), &err.to_string())?;
            Err(CliError::plan_rejected(&err))
        }
    }
}

/// Explain one query read from stdin
///
/// Rejections are part of the explain output, not a command failure.
pub fn explain(catalog_path: &Path, config_path: Option<&Path>, verbose: bool) -> CliResult<()> {
    let (catalog, config) = load_inputs(catalog_path, config_path, verbose)?;
    let request = read_request()?;
    let explained = explain_request(&catalog, &config, request)?;
    write_response(serde_json::to_value(&explained)?, false)
}

/// Load and validate a catalog snapshot, printing a per-table summary
pub fn check_catalog(catalog_path: &Path) -> CliResult<()> {
    let catalog = load_catalog(catalog_path)?;
    write_response(catalog_summary(&catalog), false)
}

fn load_catalog(path: &Path) -> CliResult<Catalog> {
    let catalog = Catalog::load(path)?;
    let shown = path.display().to_string();
    let tables = catalog.tables().len().to_string();
    log_event_with_fields(Event::CatalogLoaded, &[("path", shown.as_str()), ("tables", tables.as_str())]);
    Ok(catalog)
}

fn load_inputs(
    catalog_path: &Path,
    config_path: Option<&Path>,
    verbose: bool,
) -> CliResult<(Catalog, PlannerConfig)> {
    let catalog = load_catalog(catalog_path)?;

    let config = match config_path {
        Some(path) => {
            let config = PlannerConfig::load(path)?;
            let shown = path.display().to_string();
            log_event_with_fields(Event::ConfigLoaded, &[("path", shown.as_str())]);
            config
        }
        None => PlannerConfig::default(),
    };

    // --verbose only ever turns decision logging on
    let config = if verbose {
        config.with_decision_logging(true)
    } else {
        config
    };

    Ok((catalog, config))
}

/// Plans a decoded request. The outer error is a malformed request; the
/// inner one is a planner rejection.
fn plan_request(
    catalog: &Catalog,
    config: &PlannerConfig,
    request: Value,
) -> CliResult<PlannerResult<CompiledPlan>> {
    let query: ResolvedQuery = serde_json::from_value(request)?;
    let metrics = PlannerMetrics::new();
    let result = QueryPlanner::new(catalog, config)
        .with_metrics(&metrics)
        .plan(&query);
    if config.log_decisions {
        let snapshot = metrics.to_json();
        Logger::info("PLANNER_METRICS", &[("metrics", snapshot.as_str())]);
    }
    Ok(result)
}

fn explain_request(catalog: &Catalog, config: &PlannerConfig, request: Value) -> CliResult<ExplainPlan> {
    Ok(match plan_request(catalog, config, request)? {
        Ok(compiled) => ExplainPlan::from_plan(&compiled),
        Err(err) => ExplainPlan::from_error(&err),
    })
}

fn catalog_summary(catalog: &Catalog) -> Value {
    let tables: Vec<Value> = catalog
        .tables()
        .iter()
        .map(|table| {
            json!({
                "name": table.name,
                "columns": table.columns.len(),
                "partition_column": table.partition_column().map(|c| table.columns[c].clone()),
                "indexes": table.indexes.iter().map(|i| i.name.clone()).collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({ "tables": tables })
}

#[cfg(test)]
mod tests {
    use super::super::errors::CliErrorCode;
    use super::*;
    use crate::catalog::{IndexDescriptor, Table};
    use crate::expr::Expr;
    use std::fs;
    use tempfile::TempDir;

    fn sample_catalog() -> Catalog {
        Catalog::new()
            .with_table(
                Table::new("T")
                    .with_columns(&["T_D0", "T_D1", "T_D2"])
                    .with_index(IndexDescriptor::new("T_PK").asc(0, "T_D0").asc(1, "T_D1").primary_key()),
            )
            .with_table(
                Table::new("P")
                    .with_columns(&["P_D0", "P_D1"])
                    .partitioned_on("P_D0")
                    .with_index(IndexDescriptor::new("P_D1_IDX").asc(1, "P_D1")),
            )
    }

    fn write_catalog(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("catalog.json");
        fs::write(&path, serde_json::to_string(&sample_catalog()).unwrap()).unwrap();
        path
    }

    fn t(index: usize) -> Expr {
        Expr::column(0, index, "T", &format!("T_D{}", index))
    }

    fn request(query: &ResolvedQuery) -> Value {
        serde_json::to_value(query).unwrap()
    }

    #[test]
    fn test_load_inputs_defaults_config() {
        let dir = TempDir::new().unwrap();
        let catalog_path = write_catalog(&dir);

        let (catalog, config) = load_inputs(&catalog_path, None, false).unwrap();
        assert_eq!(catalog.tables().len(), 2);
        assert_eq!(config, PlannerConfig::default());
    }

    #[test]
    fn test_verbose_enables_decision_logging() {
        let dir = TempDir::new().unwrap();
        let catalog_path = write_catalog(&dir);
        let config_path = dir.path().join("planner.json");
        fs::write(&config_path, r#"{"enable_merge_receive": false}"#).unwrap();

        let (_, config) = load_inputs(&catalog_path, Some(&config_path), true).unwrap();
        assert!(config.log_decisions);
        assert!(!config.enable_merge_receive);
    }

    #[test]
    fn test_missing_catalog_is_catalog_error() {
        let dir = TempDir::new().unwrap();
        let err = load_inputs(&dir.path().join("absent.json"), None, false).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::CatalogError);
    }

    #[test]
    fn test_bad_config_is_config_error() {
        let dir = TempDir::new().unwrap();
        let catalog_path = write_catalog(&dir);
        let config_path = dir.path().join("planner.json");
        fs::write(&config_path, "{not json").unwrap();

        let err = load_inputs(&catalog_path, Some(&config_path), false).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }

    #[test]
    fn test_plan_request_compiles() {
        let catalog = sample_catalog();
        let config = PlannerConfig::default();
        let query = ResolvedQuery::from_table("T").select(t(0)).order_asc(t(0));

        let compiled = plan_request(&catalog, &config, request(&query)).unwrap().unwrap();
        assert!(compiled.coordinator.is_none());
    }

    #[test]
    fn test_plan_request_reports_rejection() {
        let catalog = sample_catalog();
        let config = PlannerConfig::default();
        let query = ResolvedQuery::from_table("T")
            .select(t(0))
            .distinct()
            .order_asc(t(1));

        let err = plan_request(&catalog, &config, request(&query)).unwrap().unwrap_err();
        assert!(err.to_string().contains("invalid ORDER BY expression"));
    }

    #[test]
    fn test_plan_request_rejects_malformed_json() {
        let catalog = sample_catalog();
        let err = plan_request(&catalog, &PlannerConfig::default(), json!({"tables": 3})).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::IoError);
    }

    #[test]
    fn test_explain_request_renders_rejection() {
        let catalog = sample_catalog();
        let query = ResolvedQuery::from_table("T")
            .select(t(0))
            .distinct()
            .order_asc(t(1));

        let explained = explain_request(&catalog, &PlannerConfig::default(), request(&query)).unwrap();
        assert!(!explained.accepted);
        assert_eq!(explained.rejection_code.as_deref(), Some("PLAN_INVALID_ORDER_BY"));
    }

    #[test]
    fn test_catalog_summary() {
        let summary = catalog_summary(&sample_catalog());
        assert_eq!(summary["tables"][1]["name"], "P");
        assert_eq!(summary["tables"][1]["partition_column"], "P_D0");
        assert!(summary["tables"][0]["partition_column"].is_null());
        assert_eq!(summary["tables"][0]["indexes"][0], "T_PK");
    }
}
