use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use kindling::config::Config;
use kindling::crypto_random;
use kindling::host::StandaloneHost;
use kindling::PluginManager;

/// Kindling - discover, load and manage extension modules
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List modules that declare this host's product name, without loading them
    Scan {
        /// Plugin root (defaults to the configured directory)
        dir: Option<PathBuf>,
    },
    /// Load every extension, report the result, then unload
    Load {
        /// Plugin root (defaults to the configured directory)
        dir: Option<PathBuf>,

        /// Print the load report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print COUNT cryptographically strong random bytes as hex
    Random { count: u32 },
}

/// `--debug` wins over `RUST_LOG`; otherwise `RUST_LOG`, falling back to info
fn log_filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so reports on stdout stay machine-readable
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(args.debug))
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    let config = if let Some(config_path) = &args.config {
        Config::load_from_file(config_path)?
    } else {
        Config::load_default()?
    };

    match args.command {
        Command::Scan { dir } => {
            let root = match dir {
                Some(dir) => dir,
                None => config.plugins.resolve_directory()?,
            };
            let manager = PluginManager::from_config(&config.plugins);
            let candidates = manager
                .scan(&root)
                .with_context(|| format!("Failed to scan {}", root.display()))?;

            for (path, metadata) in candidates {
                println!(
                    "{}\t{}\t{}",
                    path.display(),
                    metadata.product_version.as_deref().unwrap_or("-"),
                    metadata.file_description.as_deref().unwrap_or("")
                );
            }
        }
        Command::Load { dir, json } => {
            let root = match dir {
                Some(dir) => dir,
                None => config.plugins.resolve_directory()?,
            };
            let host = StandaloneHost::default().with_plugin_dir(&root);

            let mut manager = PluginManager::from_config(&config.plugins);
            manager.initialize(Arc::new(host));
            let report = manager.load_all(&root)?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialize report")?
                );
            } else {
                for record in &manager {
                    println!(
                        "loaded  {}  ({})",
                        record.entry_name(),
                        record.path().display()
                    );
                }
                for diagnostic in &report.diagnostics {
                    eprintln!("\n{}", diagnostic.message());
                }
            }

            manager.unload_all();
        }
        Command::Random { count } => {
            println!("{}", hex::encode(crypto_random::get_random_bytes(count)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_flag_overrides_environment_filter() {
        assert_eq!(log_filter(true).to_string(), "debug");
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let args = Args::parse_from(["kindling", "--debug", "load", "/opt/plugins", "--json"]);
        assert!(args.debug);
        match args.command {
            Command::Load { dir, json } => {
                assert_eq!(dir, Some(PathBuf::from("/opt/plugins")));
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
