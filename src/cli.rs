// CLI module - command-line argument parsing and handlers
//
// Without a subcommand the demo opens the TUI on the mock mail server.
// - run [--headless] [--rows N] [--latency-ms N]: start with overrides
// - config --show: Display effective configuration
// - config --reset: Regenerate config file with defaults
// - config --path: Show config file path

use clap::{Args, Parser, Subcommand};
use std::io::Write;
use viewport::config::{Config, VERSION};

/// viewport-demo - browse a generated mailbox through the viewport engine
#[derive(Parser)]
#[command(name = "viewport-demo")]
#[command(version = VERSION)]
#[command(about = "Windowed mailbox list over a simulated mail server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the demo (the default)
    Run(RunArgs),

    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Walk every mailbox with a scripted session and log what happens
    #[arg(long)]
    pub headless: bool,

    /// Messages per mailbox (overrides config)
    #[arg(long)]
    pub rows: Option<usize>,

    /// Simulated server latency in milliseconds (overrides config)
    #[arg(long)]
    pub latency_ms: Option<u64>,
}

impl RunArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(rows) = self.rows {
            config.demo.rows = rows;
        }
        if let Some(latency) = self.latency_ms {
            config.demo.latency_ms = latency;
        }
    }
}

/// Handle CLI commands. Returns the run arguments, or `None` if a config
/// command was handled and the process should exit.
pub fn handle_cli() -> Option<RunArgs> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config { show, reset, path }) => {
            if path {
                handle_config_path();
            } else if show {
                handle_config_show();
            } else if reset {
                handle_config_reset();
            } else {
                // No flag provided, show help
                println!("Usage: viewport-demo config [--show|--reset|--path]");
                println!();
                println!("Options:");
                println!("  --show    Display effective configuration");
                println!("  --reset   Reset config file to defaults");
                println!("  --path    Show config file path");
            }
            None
        }
        Some(Commands::Run(args)) => Some(args),
        None => Some(RunArgs::default()),
    }
}

fn handle_config_path() {
    match Config::config_path() {
        Some(path) => println!("{}", path.display()),
        None => {
            eprintln!("Error: Could not determine config path");
            std::process::exit(1);
        }
    }
}

fn handle_config_show() {
    let config = Config::from_env();

    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());

    // Show source info
    println!();
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("# Source: {}", path.display());
        } else {
            println!("# Source: defaults (no config file)");
        }
    }
}

fn handle_config_reset() {
    let Some(path) = Config::config_path() else {
        eprintln!("Error: Could not determine config path");
        std::process::exit(1);
    };

    // Confirm if file exists
    if path.exists() {
        eprint!(
            "Config file exists at {}. Overwrite? [y/N] ",
            path.display()
        );
        let _ = std::io::stderr().flush();

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input).is_err()
            || !input.trim().eq_ignore_ascii_case("y")
        {
            println!("Aborted.");
            return;
        }
    }

    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("Error creating directory: {}", e);
            std::process::exit(1);
        }
    }

    if let Err(e) = std::fs::write(&path, Config::default().to_toml()) {
        eprintln!("Error writing config: {}", e);
        std::process::exit(1);
    }

    println!("Config reset to defaults: {}", path.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_runs_tui() {
        let cli = Cli::try_parse_from(["viewport-demo"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_run_overrides_apply_to_config() {
        let cli = Cli::try_parse_from([
            "viewport-demo",
            "run",
            "--headless",
            "--rows",
            "42",
            "--latency-ms",
            "0",
        ])
        .unwrap();
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run subcommand");
        };
        assert!(args.headless);

        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.demo.rows, 42);
        assert_eq!(config.demo.latency_ms, 0);
    }
}
