//! warden - permission and shell policy checks from the command line

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use warden::{
    audit::{AuditLog, AuditOutcome, AuditQuery},
    config::{load_permissions, CliRules, LoadOptions, LoadedConfig},
    confirm::TerminalConfirmer,
    evaluator::{evaluate, EvalContext, VerdictAction},
    gate::{ConfirmContext, ShellGate, ShellRequest, ShellVerdict},
    level::ShellSource,
    rule::parse_rule,
};

/// warden - rule-based permission and shell execution policy
#[derive(Parser)]
#[command(name = "warden")]
#[command(version)]
#[command(about = "Rule-based permission and shell execution policy")]
pub struct Cli {
    /// Working directory to evaluate in (defaults to the current directory)
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    /// Extra allow rule, in addition to settings files
    #[arg(long = "allow", global = true)]
    allow: Vec<String>,

    /// Extra deny rule, in addition to settings files
    #[arg(long = "deny", global = true)]
    deny: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a tool call against the permission rules
    Eval {
        /// Tool name (e.g. Bash, Read, WebFetch, mcp__github__create_issue)
        tool: String,

        /// Tool input as JSON (e.g. '{"command": "npm test"}')
        #[arg(long, default_value = "{}")]
        input: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check whether a shell command may run
    Shell {
        /// The command line
        command: String,

        /// Where the command came from
        #[arg(long, default_value = "bash")]
        source: String,

        /// Requested timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Never prompt, even on a terminal
        #[arg(long)]
        no_prompt: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the merged rules and where they came from
    Rules {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse rule strings and show how they are understood
    Parse {
        /// Rules to parse
        #[arg(required = true)]
        rules: Vec<String>,
    },

    /// Run commands (one per line) through the gate and print the audit trail
    Audit {
        /// File of commands; reads stdin when omitted
        #[arg(long)]
        file: Option<PathBuf>,

        /// Source of every command
        #[arg(long, default_value = "bash")]
        source: String,

        /// Show only entries with this outcome
        #[arg(long)]
        outcome: Option<String>,

        /// Show entries since (e.g., "1h", "1d", "1w")
        #[arg(long)]
        since: Option<String>,

        /// Limit number of results
        #[arg(long, default_value = "50")]
        limit: usize,

        /// Print statistics instead of entries
        #[arg(long)]
        stats: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let current = std::env::current_dir().context("Failed to read current directory")?;
    let cwd = match cli.cwd {
        Some(cwd) => current.join(cwd),
        None => current,
    };
    let loaded = load(&cwd, cli.allow, cli.deny);

    match cli.command {
        Commands::Eval { tool, input, json } => cmd_eval(&loaded, &cwd, &tool, &input, json),
        Commands::Shell {
            command,
            source,
            timeout,
            no_prompt,
            json,
        } => cmd_shell(&loaded, &cwd, command, &source, timeout, no_prompt, json).await,
        Commands::Rules { json } => cmd_rules(&loaded, json),
        Commands::Parse { rules } => cmd_parse(&rules),
        Commands::Audit {
            file,
            source,
            outcome,
            since,
            limit,
            stats,
            json,
        } => cmd_audit(&loaded, &cwd, file, &source, outcome, since, limit, stats, json).await,
    }
}

fn load(cwd: &Path, allow: Vec<String>, deny: Vec<String>) -> LoadedConfig {
    let mut options = LoadOptions::for_cwd(cwd);
    if !allow.is_empty() || !deny.is_empty() {
        options = options.with_cli(CliRules { allow, deny });
    }
    let loaded = load_permissions(&options);
    for warning in &loaded.warnings {
        eprintln!("warning: {}", warning);
    }
    loaded
}

fn cmd_eval(loaded: &LoadedConfig, cwd: &Path, tool: &str, input: &str, json_output: bool) -> Result<()> {
    let input: serde_json::Value = serde_json::from_str(input).context("--input is not valid JSON")?;
    let verdict = evaluate(tool, &input, &loaded.permissions, &EvalContext::detect(cwd));

    if json_output {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else {
        println!("{}: {}", verdict.action.as_str().to_uppercase(), tool);
        println!("  Reason: {}", verdict.reason);
        if let Some(rule) = &verdict.matched_rule {
            println!("  Matched rule: {}", rule);
        }
        if let Some(scope) = verdict.source_scope {
            println!("  Scope: {}", scope);
        }
        for hint in &verdict.remediation_hints {
            println!("  Hint: {}", hint);
        }
    }

    match verdict.action {
        VerdictAction::Allow | VerdictAction::Default => std::process::exit(0),
        VerdictAction::Deny => std::process::exit(1),
        VerdictAction::Ask => std::process::exit(2),
    }
}

async fn cmd_shell(
    loaded: &LoadedConfig,
    cwd: &Path,
    command: String,
    source: &str,
    timeout: Option<u64>,
    no_prompt: bool,
    json_output: bool,
) -> Result<()> {
    let source = parse_source(source)?;
    let mut request = ShellRequest::new(command, source, cwd);
    if let Some(secs) = timeout {
        request = request.with_timeout(std::time::Duration::from_secs(secs));
    }

    let gate = ShellGate::from_loaded(loaded);
    let interactive = !no_prompt && atty::is(atty::Stream::Stdin) && atty::is(atty::Stream::Stderr);
    let confirmer = TerminalConfirmer;
    let context = if interactive {
        ConfirmContext::interactive(&confirmer)
    } else {
        ConfirmContext::non_interactive()
    };

    let cancel = context.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let verdict = gate.authorize(&request, context).await;
    print_shell_verdict(&request, &verdict, json_output)?;

    std::process::exit(if verdict.allowed { 0 } else { 1 })
}

fn print_shell_verdict(request: &ShellRequest, verdict: &ShellVerdict, json_output: bool) -> Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(verdict)?);
        return Ok(());
    }

    let outcome = verdict.outcome.map(|o| o.as_str()).unwrap_or("pending");
    println!("{}: {}", outcome.to_uppercase(), warden::redact::redact(&request.command));
    println!("  Source: {} ({})", verdict.source, verdict.trust_level);
    println!("  Reason: {}", verdict.reason);
    if let Some(rule) = &verdict.matched_rule {
        println!("  Matched rule: {}", rule);
    }
    if let Some(risk) = &verdict.risk {
        println!("  Pattern: {}", risk.name);
    }
    for hint in &verdict.remediation_hints {
        println!("  Hint: {}", hint);
    }
    if verdict.allowed {
        println!("  Timeout: {}ms", verdict.timeout_ms);
    }
    Ok(())
}

fn cmd_rules(loaded: &LoadedConfig, json_output: bool) -> Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(loaded)?);
        return Ok(());
    }

    println!("Settings");
    println!("{}", "=".repeat(60));
    if loaded.sources.is_empty() {
        println!("  (no settings files)");
    }
    for source in &loaded.sources {
        println!("  {:<16} {} ({} rules)", source.tier, source.path.display(), source.rules);
    }
    println!();
    println!(
        "Shell interpolation: {}",
        if loaded.shell_interpolation { "enabled" } else { "disabled" }
    );

    for (label, rules) in [
        ("DENY", &loaded.permissions.deny),
        ("ASK", &loaded.permissions.ask),
        ("ALLOW", &loaded.permissions.allow),
    ] {
        println!();
        println!("{:<40} {}", label, "TIER");
        println!("{}", "-".repeat(60));
        for rule in rules {
            let tier = rule.source_scope.map(|t| t.as_str()).unwrap_or("-");
            println!("{:<40} {}", rule.raw, tier);
        }
    }

    Ok(())
}

fn cmd_parse(rules: &[String]) -> Result<()> {
    let mut failed = false;

    println!("{:<30} {:<14} {}", "RULE", "TOOL", "SPECIFIER");
    println!("{}", "-".repeat(60));
    for raw in rules {
        match parse_rule(raw) {
            Ok(rule) => println!(
                "{:<30} {:<14} {}",
                rule.raw,
                rule.tool,
                rule.specifier.as_deref().unwrap_or("(any)")
            ),
            Err(e) => {
                failed = true;
                println!("{:<30} error: {}", raw, e);
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_audit(
    loaded: &LoadedConfig,
    cwd: &Path,
    file: Option<PathBuf>,
    source: &str,
    outcome: Option<String>,
    since: Option<String>,
    limit: usize,
    stats: bool,
    json_output: bool,
) -> Result<()> {
    let source = parse_source(source)?;
    let commands = read_commands(file.as_deref())?;

    let log = Arc::new(AuditLog::new());
    let gate = ShellGate::from_loaded(loaded).with_audit(log.clone());
    for command in commands {
        let request = ShellRequest::new(command, source, cwd);
        gate.authorize(&request, ConfirmContext::non_interactive()).await;
    }

    let since = since.as_deref().map(parse_duration).transpose()?;

    if stats {
        let stats = log.stats(since);
        if json_output {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            println!("Audit Statistics");
            println!("{}", "=".repeat(40));
            println!("Total: {}", stats.total);
            println!("  Allowed: {}", stats.allowed);
            println!("  Denied: {}", stats.denied);
            println!("  Confirmed: {}", stats.confirmed);
            println!("  Blocked: {}", stats.blocked);
            println!("  Bypassed: {}", stats.bypassed);
            println!();
            println!("Block rate: {:.1}%", stats.block_rate());
        }
        return Ok(());
    }

    let mut query = AuditQuery::default().limit(limit);
    if let Some(outcome) = outcome {
        query = query.outcome(parse_outcome(&outcome)?);
    }
    if let Some(since) = since {
        query = query.since(since);
    }
    let entries = log.query(query);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        println!("{:<20} {:<10} {:<10} {}", "TIMESTAMP", "OUTCOME", "TRUST", "COMMAND");
        println!("{}", "-".repeat(80));
        for entry in entries {
            let command = if entry.command.chars().count() > 40 {
                format!("{}...", entry.command.chars().take(40).collect::<String>())
            } else {
                entry.command.clone()
            };
            println!(
                "{:<20} {:<10} {:<10} {}",
                entry.timestamp.format("%Y-%m-%d %H:%M"),
                entry.outcome.as_str(),
                entry.trust_level,
                command
            );
        }
    }

    Ok(())
}

fn read_commands(file: Option<&Path>) -> Result<Vec<String>> {
    let lines: Vec<String> = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))?
            .lines()
            .map(str::to_string)
            .collect(),
        None => std::io::stdin()
            .lock()
            .lines()
            .collect::<std::io::Result<_>>()
            .context("Failed to read commands from stdin")?,
    };
    Ok(lines
        .into_iter()
        .filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        .collect())
}

fn parse_source(s: &str) -> Result<ShellSource> {
    match ShellSource::from_str(s) {
        Some(source) => Ok(source),
        None => bail!(
            "Unknown source: {}. Use bash, bg_bash, shell_interpolation, context_fork or git_helper",
            s
        ),
    }
}

fn parse_outcome(s: &str) -> Result<AuditOutcome> {
    let outcome = match s.to_lowercase().as_str() {
        "allowed" => AuditOutcome::Allowed,
        "denied" => AuditOutcome::Denied,
        "confirmed" => AuditOutcome::Confirmed,
        "blocked" => AuditOutcome::Blocked,
        "bypassed" => AuditOutcome::Bypassed,
        "executed" => AuditOutcome::Executed,
        _ => bail!("Unknown outcome: {}", s),
    };
    Ok(outcome)
}

fn parse_duration(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    let Some((split, _)) = s.char_indices().last() else {
        bail!("Invalid duration: {}", s);
    };

    let (num, unit) = s.split_at(split);
    let num: i64 = num.parse().with_context(|| format!("Invalid duration: {}", s))?;

    let duration = match unit {
        "m" => Duration::minutes(num),
        "h" => Duration::hours(num),
        "d" => Duration::days(num),
        "w" => Duration::weeks(num),
        _ => bail!("Invalid duration unit: {}. Use m, h, d, or w", unit),
    };

    Ok(Utc::now() - duration)
}
