//! Lifeguard Audit CLI
//!
//! Installs the audit table and creates, drops or rebuilds the audit triggers
//! of a PostgreSQL schema. Exits non-zero when any table's trigger DDL failed.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use lifeguard_audit::{
    connect, create_audit_table_statements, parse_table_list, AuditConfig, BatchReport,
    DropReport, MayPostgresExecutor, Outcome, Planned, SchemaCatalog, SqlExecutor,
    TriggerManager,
};
use std::io::{self, BufRead, Write};
use std::process;

#[derive(Parser)]
#[command(name = "lifeguard-audit")]
#[command(about = "Audit trigger management for PostgreSQL")]
#[command(version = "0.1.0")]
struct Cli {
    /// Database connection URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the audit table and its indexes
    Install,

    /// Create audit triggers for every eligible table
    SetupTriggers {
        /// Comma-separated table names (default: all tables in the schema)
        #[arg(long)]
        tables: Option<String>,

        /// Print the generated SQL without executing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Drop audit triggers
    DropTriggers {
        /// Comma-separated table names (default: all tables in the schema)
        #[arg(long)]
        tables: Option<String>,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Drop and recreate audit triggers
    RebuildTriggers {
        /// Comma-separated table names (default: all tables in the schema)
        #[arg(long)]
        tables: Option<String>,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = AuditConfig::load().context("loading configuration")?;

    let database_url = cli
        .database_url
        .or_else(|| std::env::var("LIFEGUARD_AUDIT_DATABASE_URL").ok())
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| config.database.url.clone());

    let executor = connect(&database_url).context("connecting to database")?;
    let catalog = SchemaCatalog::postgres(&executor, &config.audit.schema);
    let manager = TriggerManager::new(
        &executor,
        &catalog,
        config.exclusion_rules(),
        config.trigger_generator(),
        config.audit.schema.clone(),
    );
    let quiet = cli.quiet;

    match cli.command {
        Commands::Install => install(&executor, &config, quiet),
        Commands::SetupTriggers { tables, dry_run } => {
            let filter = tables.as_deref().map(parse_table_list);
            if dry_run {
                return dry_run_setup(&manager, filter.as_deref());
            }
            let report = manager.create_with(filter.as_deref(), |t, o| print_outcome(t, o, quiet))?;
            print_summary(&report, quiet);
            Ok(report.exit_code())
        }
        Commands::DropTriggers { tables, force } => {
            let filter = tables.as_deref().map(parse_table_list);
            if !force && !confirm(&describe("Drop audit triggers", filter.as_deref()))? {
                println!("Aborted");
                return Ok(0);
            }
            let report = manager.drop(filter.as_deref())?;
            print_drop_summary(&report, quiet);
            Ok(report.exit_code())
        }
        Commands::RebuildTriggers { tables, force } => {
            let filter = tables.as_deref().map(parse_table_list);
            if !force && !confirm(&describe("Rebuild audit triggers", filter.as_deref()))? {
                println!("Aborted");
                return Ok(0);
            }
            let report = manager.rebuild_with(filter.as_deref(), |t, o| print_outcome(t, o, quiet))?;
            print_drop_summary(&report.dropped, quiet);
            print_summary(&report.created, quiet);
            Ok(report.exit_code())
        }
    }
}

fn install(executor: &MayPostgresExecutor, config: &AuditConfig, quiet: bool) -> anyhow::Result<i32> {
    let statements = create_audit_table_statements(&config.audit.schema, &config.audit.audit_table);
    for sql in &statements {
        executor
            .execute(sql, &[])
            .with_context(|| format!("executing: {sql}"))?;
    }
    if !quiet {
        println!(
            "✅ Audit table {} ready",
            config.audit_table().to_string().bold()
        );
    }
    Ok(0)
}

fn dry_run_setup(manager: &TriggerManager<'_>, filter: Option<&[String]>) -> anyhow::Result<i32> {
    for (table, planned) in manager.plan(filter)? {
        match planned {
            Planned::Create(set) => {
                println!("-- {}", table.bold());
                println!("{}", set.to_script());
            }
            Planned::Skip(reason) => println!("-- {} skipped: {}", table, reason),
            Planned::Unavailable(reason) => println!("-- {} unavailable: {}", table, reason),
        }
    }
    Ok(0)
}

fn describe(action: &str, filter: Option<&[String]>) -> String {
    match filter {
        Some(tables) => format!("{} on {}?", action, tables.join(", ")),
        None => format!("{} on all tables?", action),
    }
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_outcome(table: &str, outcome: &Outcome, quiet: bool) {
    match outcome {
        Outcome::Created if !quiet => println!("  {} {}", "✓".green(), table),
        Outcome::Skipped(reason) if !quiet => {
            println!("  {} {} ({})", "⊘".yellow(), table, reason)
        }
        Outcome::Failed(reason) => eprintln!(
            "  {} {}",
            "✗".red(),
            reason.clone().into_error(table)
        ),
        _ => {}
    }
}

fn print_summary(report: &BatchReport, quiet: bool) {
    if quiet {
        return;
    }
    println!(
        "\n📈 Summary: {} created, {} skipped, {} failed",
        report.created().to_string().green(),
        report.skipped().to_string().yellow(),
        report.failed().to_string().red()
    );
}

fn print_drop_summary(report: &DropReport, quiet: bool) {
    for (table, reason) in &report.failures {
        eprintln!("  {} {}: {}", "✗".red(), table, reason);
    }
    for (table, reason) in &report.unavailable {
        eprintln!("  {} {}: {}", "⊘".yellow(), table, reason);
    }
    if !quiet {
        println!(
            "🗑  Dropped {} trigger(s) across {} table(s)",
            report.dropped,
            report.tables.len()
        );
    }
}
