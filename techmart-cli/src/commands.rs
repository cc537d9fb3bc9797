//! CLI subcommand handlers.
//!
//! Handlers return the text to print so the output can be checked in tests.

use crate::Commands;
use crate::ConfigAction;
use crate::OutputFormat;
use crate::RankReport;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use techmart_core::config::{
    AnalysisConfig, CleaningTarget, config_exists, load_config, workspace_config_path,
};
use techmart_core::detect::{detect_invalid_numeric, detect_missing};
use techmart_core::index::{ensure_index, list_indexes, rebuild_index};
use techmart_core::normalize::{RewriteRules, normalize};
use techmart_core::rank::{employee_performance_by_location, top_products_by_category};
use techmart_core::revenue::RevenueBreakdown;
use techmart_core::schema::{table_columns, table_spec};
use techmart_core::share::customer_spending;
use techmart_core::{
    JsonPresenter, Pipeline, PipelineReport, ResultPresenter, RowSet, Session, TablePresenter,
};

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub(crate) struct Context {
    pub(crate) workspace: PathBuf,
    pub(crate) config_file: Option<PathBuf>,
    pub(crate) database: Option<PathBuf>,
    pub(crate) format: OutputFormat,
}

impl Context {
    fn config(&self) -> anyhow::Result<AnalysisConfig> {
        let mut config = load_config(Some(&self.workspace), self.config_file.as_deref(), None)
            .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
        if let Some(db) = &self.database {
            config.database.path = std::path::absolute(db)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn open(&self, config: &AnalysisConfig) -> anyhow::Result<Session> {
        let path = config.database_path(&self.workspace);
        Ok(Session::open(path)?)
    }

    fn render(&self, rows: &RowSet) -> String {
        match self.format {
            OutputFormat::Table => TablePresenter::default().render(rows),
            OutputFormat::Json => JsonPresenter.render(rows),
        }
    }
}

/// Handle a CLI subcommand and print its output.
pub(crate) fn handle_command(command: Commands, ctx: &Context) -> anyhow::Result<()> {
    let output = run_command(command, ctx)?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}

fn run_command(command: Commands, ctx: &Context) -> anyhow::Result<String> {
    match command {
        Commands::Detect { table, columns } => handle_detect(ctx, table, columns),
        Commands::Clean { table, column } => handle_clean(ctx, table, column),
        Commands::Rank { report } => handle_rank(ctx, report),
        Commands::Share => handle_share(ctx),
        Commands::Index { rebuild } => handle_index(ctx, rebuild),
        Commands::Revenue { categories, all } => handle_revenue(ctx, categories, all),
        Commands::Run => handle_run(ctx),
        Commands::Config { action } => handle_config(action, ctx),
    }
}

fn rowset(columns: &[&str], rows: Vec<Vec<Value>>) -> RowSet {
    RowSet {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows,
    }
}

fn section(title: &str, body: &str) -> String {
    format!("== {} ==\n{}", title, body)
}

fn handle_detect(
    ctx: &Context,
    table: Option<String>,
    columns: Vec<String>,
) -> anyhow::Result<String> {
    let config = ctx.config()?;
    let session = ctx.open(&config)?;

    let targets: Vec<(String, Vec<String>)> = match table {
        Some(table) if columns.is_empty() => {
            let all = table_columns(&session, &table)?;
            vec![(table, all)]
        }
        Some(table) => vec![(table, columns)],
        None => config
            .detection
            .iter()
            .map(|t| (t.table.clone(), t.columns.clone()))
            .collect(),
    };

    let mut missing = Vec::new();
    let mut invalid = Vec::new();
    for (table, columns) in &targets {
        let cols: Vec<&str> = columns.iter().map(String::as_str).collect();
        missing.push(detect_missing(&session, table, &cols)?);

        // Non-numeric leftovers only matter where a number is expected.
        let numeric: Vec<&str> = match table_spec(table) {
            Some(spec) => cols
                .iter()
                .copied()
                .filter(|c| spec.column(c).is_some_and(|s| s.dtype.is_numeric()))
                .collect(),
            None => Vec::new(),
        };
        for column in numeric {
            invalid.push(detect_invalid_numeric(&session, table, column)?);
        }
    }
    session.close()?;

    if ctx.format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(
            &json!({ "missing": missing, "invalid": invalid }),
        )?);
    }

    let missing_rows = missing
        .iter()
        .flat_map(|r| {
            r.columns
                .iter()
                .map(move |c| {
                    vec![json!(r.table), json!(c.column), json!(r.total_rows), json!(c.missing)]
                })
        })
        .collect();
    let invalid_rows = invalid
        .iter()
        .map(|r| {
            vec![
                json!(r.table),
                json!(r.column),
                json!(r.invalid_rows),
                json!(r.samples.join(", ")),
            ]
        })
        .collect();
    Ok([
        section(
            "Missing values",
            &ctx.render(&rowset(&["table", "column", "total_rows", "missing"], missing_rows)),
        ),
        section(
            "Non-numeric values",
            &ctx.render(&rowset(&["table", "column", "invalid_rows", "samples"], invalid_rows)),
        ),
    ]
    .join("\n\n"))
}

fn cleaning_targets(
    config: &AnalysisConfig,
    table: Option<&str>,
    column: Option<&str>,
) -> anyhow::Result<Vec<CleaningTarget>> {
    let targets: Vec<CleaningTarget> = config
        .cleaning
        .iter()
        .filter(|t| table.is_none_or(|name| t.table == name))
        .filter(|t| column.is_none_or(|name| t.column == name))
        .cloned()
        .collect();
    if !targets.is_empty() {
        return Ok(targets);
    }
    match (table, column) {
        // An explicit column outside the config gets the standard rules.
        (Some(table), Some(column)) => Ok(vec![CleaningTarget {
            table: table.to_string(),
            column: column.to_string(),
            rules: RewriteRules::numeric_defaults(),
        }]),
        _ => anyhow::bail!("No cleaning entry matches the given table/column"),
    }
}

fn handle_clean(
    ctx: &Context,
    table: Option<String>,
    column: Option<String>,
) -> anyhow::Result<String> {
    let config = ctx.config()?;
    let targets = cleaning_targets(&config, table.as_deref(), column.as_deref())?;
    let mut session = ctx.open(&config)?;

    let mut rows = Vec::with_capacity(targets.len());
    let mut outcomes = Vec::with_capacity(targets.len());
    for target in &targets {
        let outcome = normalize(&mut session, &target.table, &target.column, &target.rules)?;

        // Indexes on a rewritten table go stale until rebuilt.
        if outcome.rows_rewritten > 0 {
            let existing = list_indexes(&session, &target.table)?;
            for spec in config.indexes.iter().filter(|i| i.table == target.table) {
                let name = spec.index_name();
                if existing.contains(&name) {
                    rebuild_index(&session, &name)?;
                }
            }
        }

        rows.push(vec![
            json!(outcome.table),
            json!(outcome.column),
            json!(outcome.rows_rewritten),
        ]);
        outcomes.push(outcome);
    }
    session.close()?;

    match ctx.format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&outcomes)?),
        OutputFormat::Table => Ok(ctx.render(&rowset(&["table", "column", "rows_rewritten"], rows))),
    }
}

fn handle_rank(ctx: &Context, report: RankReport) -> anyhow::Result<String> {
    let config = ctx.config()?;
    let aggregate = match report {
        RankReport::Location => employee_performance_by_location(),
        RankReport::Products { top_n } => {
            top_products_by_category(top_n.unwrap_or(config.analysis.top_n))
        }
    };
    let session = ctx.open(&config)?;
    let result = aggregate.run(&session)?;
    session.close()?;
    Ok(ctx.render(&result.rows))
}

fn handle_share(ctx: &Context) -> anyhow::Result<String> {
    let config = ctx.config()?;
    let session = ctx.open(&config)?;
    let report = customer_spending().run(&session)?;
    session.close()?;
    Ok(ctx.render(&report.rows))
}

fn handle_index(ctx: &Context, rebuild: bool) -> anyhow::Result<String> {
    let config = ctx.config()?;
    let session = ctx.open(&config)?;

    let mut rows = Vec::with_capacity(config.indexes.len());
    for spec in &config.indexes {
        let outcome = ensure_index(&session, spec)?;
        let status = if outcome.created {
            "created"
        } else if rebuild {
            rebuild_index(&session, &outcome.name)?;
            "rebuilt"
        } else {
            "exists"
        };
        rows.push(vec![
            json!(outcome.name),
            json!(outcome.table),
            json!(outcome.column),
            json!(status),
        ]);
    }
    session.close()?;
    Ok(ctx.render(&rowset(&["index", "table", "column", "status"], rows)))
}

fn handle_revenue(ctx: &Context, categories: Vec<String>, all: bool) -> anyhow::Result<String> {
    let config = ctx.config()?;
    let categories = if all {
        Vec::new()
    } else if categories.is_empty() {
        config.analysis.revenue_categories.clone()
    } else {
        categories
    };
    let session = ctx.open(&config)?;
    let report = RevenueBreakdown::new(categories).run(&session)?;
    session.close()?;
    Ok(ctx.render(&report.rows))
}

fn render_pipeline(ctx: &Context, report: &PipelineReport) -> anyhow::Result<String> {
    if ctx.format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(report)?);
    }

    let cleaned = report
        .normalized
        .iter()
        .map(|n| vec![json!(n.table), json!(n.column), json!(n.rows_rewritten)])
        .collect();
    let missing = report
        .missing_before
        .iter()
        .zip(&report.missing_after)
        .flat_map(|(before, after)| {
            before.columns.iter().map(move |c| {
                vec![
                    json!(before.table),
                    json!(c.column),
                    json!(c.missing),
                    json!(after.missing(&c.column)),
                ]
            })
        })
        .collect();

    let sections = [
        format!(
            "Run {} ({} to {})",
            report.run_id,
            report.started_at.to_rfc3339(),
            report.finished_at.to_rfc3339()
        ),
        section(
            "Missing values",
            &ctx.render(&rowset(&["table", "column", "before", "after"], missing)),
        ),
        section(
            "Cleaning",
            &ctx.render(&rowset(&["table", "column", "rows_rewritten"], cleaned)),
        ),
        section(
            "Store locations by average sales",
            &ctx.render(&report.location_ranking.rows),
        ),
        section("Top products per category", &ctx.render(&report.top_products.rows)),
        section("Customer spending", &ctx.render(&report.customer_spending.rows)),
        section("Store revenue", &ctx.render(&report.revenue.rows)),
    ];
    Ok(sections.join("\n\n"))
}

fn handle_run(ctx: &Context) -> anyhow::Result<String> {
    let config = ctx.config()?;
    let mut session = ctx.open(&config)?;
    let report = Pipeline::new(config).run(&mut session)?;
    session.close()?;
    render_pipeline(ctx, &report)
}

fn handle_config(action: ConfigAction, ctx: &Context) -> anyhow::Result<String> {
    match action {
        ConfigAction::Init => init_config(&ctx.workspace),
        ConfigAction::Show => {
            let config = ctx.config()?;
            let body = toml::to_string_pretty(&config)?;
            if ctx.config_file.is_none() && !config_exists(Some(&ctx.workspace)) {
                return Ok(format!(
                    "# No configuration file found; run `techmart config init` to create one.\n{}",
                    body
                ));
            }
            Ok(body)
        }
    }
}

fn init_config(workspace: &Path) -> anyhow::Result<String> {
    let config_path = workspace_config_path(workspace);
    if config_path.exists() {
        return Ok(format!(
            "Configuration file already exists at: {}",
            config_path.display()
        ));
    }
    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    let toml_str = toml::to_string_pretty(&AnalysisConfig::default())?;
    std::fs::write(&config_path, &toml_str)?;
    Ok(format!(
        "Created default configuration at: {}",
        config_path.display()
    ))
}
