//! CLI command definitions for swe-eval.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::config::ConfigLoader;
use crate::configurer::ConfigurerRegistry;
use crate::evaluator::EvaluatorRegistry;
use crate::pipeline::EvaluatorStatus;
use crate::report::RunReport;
use crate::runner::{RunContext, RunOptions, RunPlan, Runner};

/// Declarative benchmark evaluation harness.
#[derive(Parser)]
#[command(name = "swe-eval")]
#[command(about = "Run declarative evaluation pipelines over benchmark instances")]
#[command(version)]
#[command(
    long_about = "swe-eval prepares a sandbox per dataset instance, runs the configured setup steps, then runs each evaluation pipeline and writes a scored report.\n\nExample usage:\n  swe-eval run --config harness.yaml --set run_id=nightly --concurrency 8"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Evaluate every selected instance and write the report.
    Run(RunArgs),

    /// Load and validate a configuration without running anything.
    Validate(ValidateArgs),
}

/// Arguments for `swe-eval run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Harness configuration file.
    #[arg(short, long, env = "SWE_EVAL_CONFIG")]
    pub config: PathBuf,

    /// CLI-scope value as KEY=VALUE (repeatable); overrides options of the same name.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub set: Vec<(String, String)>,

    /// Maximum number of instances evaluated at once.
    #[arg(long, env = "SWE_EVAL_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Only evaluate this instance (repeatable).
    #[arg(long = "instance", value_name = "ID")]
    pub instances: Vec<String>,

    /// Resolve the plan and stop before creating any sandbox.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the report as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `swe-eval validate`.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Harness configuration file.
    #[arg(short, long, env = "SWE_EVAL_CONFIG")]
    pub config: PathBuf,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_command(args).await,
        Commands::Validate(args) => validate_command(args),
    }
}

async fn run_command(args: RunArgs) -> anyhow::Result<()> {
    let config = ConfigLoader::load_file(&args.config)?;
    let cli_scope: BTreeMap<String, String> = args.set.into_iter().collect();
    let ctx = RunContext::new(config).with_cli(cli_scope);
    let runner = Runner::new(
        ctx,
        RunOptions {
            instance_ids: args.instances,
            concurrency: args.concurrency,
        },
    );

    info!(config = %args.config.display(), "Planning run");
    let plan = runner.plan()?;

    if args.dry_run {
        print_plan(&plan);
        return Ok(());
    }

    let results = runner.execute(&plan).await;
    let report = runner.finish(&plan, results)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
        println!("Report: {}", plan.report_path.display());
    }
    Ok(())
}

fn validate_command(args: ValidateArgs) -> anyhow::Result<()> {
    let config = ConfigLoader::load_file(&args.config)?;
    ConfigLoader::validate(
        &config,
        &ConfigurerRegistry::builtin(),
        &EvaluatorRegistry::builtin(),
    )?;
    let evaluators: usize = config.evaluations.iter().map(|e| e.evaluators.len()).sum();
    println!(
        "{} is valid: {} evaluation(s), {} evaluator(s), {} configurer(s)",
        args.config.display(),
        config.evaluations.len(),
        evaluators,
        config.environment.configurers.len()
    );
    Ok(())
}

fn print_plan(plan: &RunPlan) {
    println!("\n=== Run Plan ===");
    println!("Run id:       {}", plan.run_id);
    println!("Instances:    {}", plan.instances.len());
    println!("Evaluations:  {}", plan.evaluation_count());
    println!("Concurrency:  {}", plan.concurrency);
    println!("Report:       {}", plan.report_path.display());
    println!();
    for instance in &plan.instances {
        let configurers: Vec<&str> = instance
            .configurers
            .iter()
            .map(|c| c.configurer.name())
            .collect();
        println!(
            "  {} [{}] image={} configurers=[{}]",
            instance.instance_id,
            instance.sandbox.kind,
            instance.sandbox.image,
            configurers.join(", ")
        );
    }
}

fn print_report(report: &RunReport) {
    let summary = &report.summary;
    println!("\n=== Evaluation Results ===");
    println!("Run id:           {}", report.run_id);
    println!("Total:            {}", summary.total);
    println!("Passed:           {}", summary.passed);
    println!("Completed:        {}", summary.completed);
    println!("Terminated early: {}", summary.terminated_early);
    println!("Mean score:       {:.2}", summary.mean_score);
    println!();

    for r in &report.results {
        let passed = r.pipeline.count(EvaluatorStatus::Passed);
        println!(
            "  {} / {} [{}] score={:.2} passed={}/{}{}",
            r.instance_id,
            r.evaluation,
            r.pipeline.status,
            r.score,
            passed,
            r.pipeline.results.len(),
            if r.passed { "" } else { " FAIL" },
        );
        if let Some(err) = &r.setup_error {
            println!("    setup error: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command_args() {
        let cli = Cli::try_parse_from([
            "swe-eval",
            "run",
            "--config",
            "harness.yaml",
            "--set",
            "tool=gradle",
            "--set",
            "run_id=nightly",
            "--instance",
            "a",
            "--concurrency",
            "8",
            "--dry-run",
        ])
        .expect("should parse");

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("harness.yaml"));
                assert_eq!(
                    args.set,
                    vec![
                        ("tool".to_string(), "gradle".to_string()),
                        ("run_id".to_string(), "nightly".to_string())
                    ]
                );
                assert_eq!(args.instances, vec!["a"]);
                assert_eq!(args.concurrency, Some(8));
                assert!(args.dry_run);
                assert!(!args.json);
            }
            _ => panic!("Expected Run command"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_set_requires_key_value() {
        assert!(Cli::try_parse_from(["swe-eval", "run", "-c", "h.yaml", "--set", "novalue"]).is_err());
        assert_eq!(parse_key_value("a=b=c").unwrap(), ("a".into(), "b=c".into()));
        assert_eq!(parse_key_value("empty=").unwrap(), ("empty".into(), String::new()));
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::try_parse_from(["swe-eval", "validate", "-c", "h.yaml", "--log-level", "debug"])
            .expect("should parse");
        assert!(matches!(cli.command, Commands::Validate(_)));
        assert_eq!(cli.log_level, "debug");
    }
}
