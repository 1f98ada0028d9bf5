//! match-eval CLI
//!
//! Evaluates rule expressions over pattern matches produced by a matcher and
//! reports the resulting findings.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use match_eval::config::Config;
use match_eval::engine::{load_units, Engine};
use match_eval::expression::{Operand, Operator};
use match_eval::finding::Severity;
use match_eval::output::OutputFormat;
use match_eval::rule::{Rule, RuleFile};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "match-eval",
    version,
    about = "Rule expression evaluator",
    long_about = "Filters pattern matches through boolean rule expressions and reports findings."
)]
struct Cli {
    /// Rule file (.yaml, .yml or .json)
    #[arg(short, long)]
    rules: PathBuf,

    /// Pattern match file: a list of {rule_id, path, matches} units
    #[arg(short, long)]
    matches: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: Format,

    /// Allow pattern-where predicates to run
    #[arg(long)]
    allow_exec: bool,

    /// Record and print evaluation traces
    #[arg(long)]
    trace: bool,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Disable specific rules (comma-separated)
    #[arg(long, value_delimiter = ',')]
    disable: Option<Vec<String>>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Show per-rule timing statistics
    #[arg(long)]
    timing: bool,

    /// Exit with 0 even if findings are reported
    #[arg(long)]
    exit_zero: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a rule and its expression tree
    Explain {
        /// Rule ID to explain
        rule_id: String,
    },
    /// Validate the rule file and exit
    Check,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
        }
    }
}

fn severity_str(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Error => "error".red(),
        Severity::Warning => "warning".yellow(),
        Severity::Info => "info".blue(),
    }
}

/// Print detailed rule explanation
fn explain_rule(rule: &Rule) {
    println!("{}", "Rule Details".bold());
    println!();
    println!("  {}: {}", "ID".bold(), rule.id.cyan());
    println!("  {}: {}", "Severity".bold(), severity_str(rule.severity));
    println!("  {}: {}", "Mode".bold(), rule.mode);
    println!("  {}: {}", "Message".bold(), rule.message);

    if !rule.languages.is_empty() {
        println!("  {}: {}", "Languages".bold(), rule.languages.join(", "));
    }

    if let Some(fix) = &rule.fix {
        println!("  {}: {}", "Fix".bold(), fix.green());
    }

    if rule.needs_code_execution() {
        println!(
            "  {}",
            "Needs --allow-exec (uses pattern-where)".yellow()
        );
    }

    if let Some(expression) = &rule.expression {
        println!();
        println!("  {}", "Expression".bold());
        for node in expression.flatten() {
            let indent = "  ".repeat(node.depth + 2);
            let name = match node.operator {
                Operator::Leaf(_) => node.operator.to_string().normal(),
                Operator::Composite(_) => node.operator.to_string().bold(),
            };
            let mut line = format!("{}{}", indent, name);
            if let Some(id) = node.pattern_id {
                line.push_str(&format!(" {}", id.cyan()));
            }
            match node.operand {
                Some(Operand::Text(text)) => line.push_str(&format!(" `{}`", text)),
                Some(Operand::Metavariable(op)) => {
                    line.push_str(&format!(" {}", op.metavariable));
                    if let Some(regex) = &op.regex {
                        line.push_str(&format!(" =~ /{}/", regex));
                    }
                    if let Some(comparison) = &op.comparison {
                        line.push_str(&format!(" `{}`", comparison));
                    }
                }
                None => {}
            }
            println!("{}", line);
        }
    }

    if !rule.metadata.is_empty() {
        println!();
        println!("  {}", "Metadata".bold());
        for (key, value) in &rule.metadata {
            println!("    {}: {}", key, value);
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::load_default().unwrap_or_default(),
    };

    config.merge_cli(
        cli.allow_exec.then_some(true),
        cli.trace.then_some(true),
        cli.jobs,
        cli.disable.clone(),
    );
    Ok(config)
}

fn run(cli: Cli) -> Result<i32> {
    let rule_file = RuleFile::load(&cli.rules)
        .with_context(|| format!("failed to load rules {}", cli.rules.display()))?;

    match &cli.command {
        Some(Commands::Explain { rule_id }) => match rule_file.get(rule_id) {
            Some(rule) => {
                explain_rule(rule);
                return Ok(0);
            }
            None => anyhow::bail!("rule '{}' not found in {}", rule_id, cli.rules.display()),
        },
        Some(Commands::Check) => {
            println!(
                "{} {} rules in {}",
                "ok".green().bold(),
                rule_file.rules.len(),
                cli.rules.display()
            );
            return Ok(0);
        }
        None => {}
    }

    let matches_path = cli
        .matches
        .as_ref()
        .context("--matches is required to evaluate rules")?;
    let units = load_units(matches_path)
        .with_context(|| format!("failed to load matches {}", matches_path.display()))?;

    let config = load_config(&cli)?;
    let show_traces = config.evaluation.collect_traces;
    let engine = Engine::new(config);
    let report = engine.evaluate_all(&rule_file.rules, &units);

    let formatter = OutputFormat::from(cli.format).formatter(!cli.no_color, show_traces);
    print!("{}", formatter.format(&report));

    if cli.timing {
        eprintln!();
        eprint!("{}", report.format_timings());
    }

    if cli.exit_zero && !report.has_failures() {
        Ok(0)
    } else {
        Ok(report.exit_code())
    }
}

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            std::process::exit(match_eval::error::FATAL_EXIT_CODE);
        }
    }
}
