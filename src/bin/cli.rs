use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pytrust::config::Config;
use pytrust::error::TrustError;
use pytrust::output::OutputFormat;
use pytrust::policy::GrantStore;
use pytrust::AuditOptions;

#[derive(Parser)]
#[command(
    name = "pytrust",
    about = "Static capability auditor for Python packages",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ReportArgs {
    /// Also print the required record and the evidence behind it
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Output format (console, json, toml)
    #[arg(long, short = 'f', default_value = "console")]
    format: String,

    /// Write output to file instead of stdout
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Config file path
    #[arg(long, short = 'c', env = "PYTRUST_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Infer a package's capabilities and check them against a policy
    Check {
        /// Installed package name, or path to a source tree
        package: String,

        /// Policy file granting capabilities (TOML, or JSON by extension)
        policy: Option<PathBuf>,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Check several packages against one policy
    Audit {
        /// Policy file granting capabilities
        policy: PathBuf,

        /// Packages to check (default: every package in the policy)
        packages: Vec<String>,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Generate a starter .pytrust.toml config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check {
            package,
            policy,
            report,
        } => cmd_check(&package, policy.as_deref(), &report),
        Commands::Audit {
            policy,
            packages,
            report,
        } => cmd_audit(&policy, packages, &report),
        Commands::Init { force } => cmd_init(force),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

/// Logs go to stderr so stdout stays machine readable. `RUST_LOG`
/// overrides the default level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn parse_format(format_str: &str) -> OutputFormat {
    OutputFormat::from_str_lenient(format_str).unwrap_or_else(|| {
        eprintln!("Warning: unknown format '{}', using console", format_str);
        OutputFormat::Console
    })
}

fn emit(rendered: &str, output_path: Option<&Path>) -> Result<(), TrustError> {
    match output_path {
        Some(out) => std::fs::write(out, rendered)?,
        None => print!("{}", rendered),
    }
    Ok(())
}

fn cmd_check(
    package: &str,
    policy_path: Option<&Path>,
    args: &ReportArgs,
) -> Result<i32, TrustError> {
    let format = parse_format(&args.format);
    let options = AuditOptions::from_config_path(args.config.as_deref())?;
    let policy = policy_path.map(GrantStore::load).transpose()?;

    let report = pytrust::audit(package, &options, policy.as_ref())?;
    let rendered = pytrust::render_report(&report, format, args.verbose)?;
    emit(&rendered, args.output.as_deref())?;

    // Exit code: 0 = pass or report only, 1 = capabilities not granted
    Ok(report.exit_code())
}

fn cmd_audit(
    policy_path: &Path,
    packages: Vec<String>,
    args: &ReportArgs,
) -> Result<i32, TrustError> {
    let format = parse_format(&args.format);
    let options = AuditOptions::from_config_path(args.config.as_deref())?;
    let policy = GrantStore::load(policy_path)?;

    let packages = if packages.is_empty() {
        policy.packages().into_iter().map(String::from).collect()
    } else {
        packages
    };
    if packages.is_empty() {
        eprintln!("{} lists no packages.", policy_path.display());
        return Ok(0);
    }

    let batch = pytrust::audit_batch(&packages, &options, Some(&policy));
    let rendered = pytrust::render_batch(&batch, format, args.verbose)?;
    emit(&rendered, args.output.as_deref())?;

    // Exit code: 0 = all pass, 1 = any failed, 2 = any package errored
    Ok(batch.exit_code())
}

fn cmd_init(force: bool) -> Result<i32, TrustError> {
    let path = PathBuf::from(".pytrust.toml");

    if path.exists() && !force {
        eprintln!(".pytrust.toml already exists. Use --force to overwrite.");
        return Ok(1);
    }

    std::fs::write(&path, Config::starter_toml())?;
    println!("Created .pytrust.toml");

    Ok(0)
}
