mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{GlobalOptions, cmd_info, cmd_install, cmd_list, cmd_plan, cmd_uninstall};
use output::{OutputFormat, print_error};

/// keg - Formula execution engine
#[derive(Parser)]
#[command(name = "keg")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Directory containing formula definitions (repeatable, searched in order)
  #[arg(long = "formula-dir", value_name = "DIR", global = true)]
  formula_dirs: Vec<PathBuf>,

  /// Root directory for the cellar, download cache and installed state
  #[arg(long, value_name = "DIR", global = true)]
  root: Option<PathBuf>,

  /// Output format
  #[arg(long, value_enum, default_value = "text", global = true)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Install a formula and its dependencies
  Install {
    /// Name of the formula to install
    formula: String,

    /// Resolve and show the plan without fetching or installing anything
    #[arg(long)]
    dry_run: bool,

    /// Do not run acceptance tests
    #[arg(long, conflicts_with = "test_all")]
    skip_test: bool,

    /// Run the acceptance test of every freshly installed formula
    #[arg(long)]
    test_all: bool,
  },

  /// Show the installation plan for a formula
  Plan {
    /// Name of the formula to plan
    formula: String,
  },

  /// Show details about a formula
  Info {
    /// Name of the formula
    formula: String,
  },

  /// List installed formulas
  List,

  /// Remove an installed formula
  Uninstall {
    /// Name of the formula to remove
    formula: String,

    /// Remove even if installed formulas depend on it
    #[arg(short, long)]
    force: bool,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  init_tracing(cli.verbose);

  let global = GlobalOptions {
    formula_dirs: cli.formula_dirs,
    root: cli.root,
    output: cli.output,
    verbose: cli.verbose,
  };

  let result = match cli.command {
    Commands::Install {
      formula,
      dry_run,
      skip_test,
      test_all,
    } => cmd_install(&global, &formula, dry_run, skip_test, test_all),
    Commands::Plan { formula } => cmd_plan(&global, &formula),
    Commands::Info { formula } => cmd_info(&global, &formula),
    Commands::List => cmd_list(&global),
    Commands::Uninstall { formula, force } => cmd_uninstall(&global, &formula, force),
  };

  match result {
    Ok(code) => code,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}

/// Logs go to stderr so stdout stays parseable with `--output json`.
fn init_tracing(verbose: bool) {
  let default = if verbose { "warn,keg=debug,keg_lib=debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}
