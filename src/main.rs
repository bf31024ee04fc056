use std::fs::OpenOptions;
use std::sync::Mutex;

use crate::api::{TokenClient, TokenSource};
use crate::config::{Config, MonitorConfig, APP_NAME, CONFIG_NAME};
use crate::error::FETCH_FAILED_MESSAGE;
use crate::monitor::{chart_rows, DisplayOrder};

use clap::{arg, value_parser, ArgMatches, Command};
use eyre::{eyre, WrapErr};
use futures::future::join_all;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod error;
mod monitor;
mod report;
mod scheduler;
mod token;
mod tui;

fn wallet_args(cmd: Command) -> Command {
    cmd.arg(arg!(-w --wallet <ADDRESS> "Wallet address to monitor").required(false))
        .arg(arg!(-e --endpoint <URL> "Base URL of the token data endpoint").required(false))
}

fn cli() -> Command {
    Command::new("supply_monitor")
        .about("Monitor token supply and consumption of a wallet")
        .arg_required_else_help(true)
        .subcommand(Command::new("config").about("Print the path to the config file"))
        .subcommand(
            wallet_args(Command::new("watch").about("Open the live dashboard"))
                .arg(
                    arg!(-i --interval <SECS> "Seconds between refreshes")
                        .required(false)
                        .value_parser(value_parser!(u64)),
                )
                .arg(arg!(-t --tab <TAB> "Initial tab: chart or tokens").required(false)),
        )
        .subcommand(
            wallet_args(Command::new("snapshot").about("Fetch once and print a table"))
                .arg(arg!(-a --all "Fetch every configured wallet").required(false)),
        )
}

fn monitor_config(cfg: Config, matches: &ArgMatches) -> eyre::Result<MonitorConfig> {
    let wallet = matches.get_one::<String>("wallet").map(String::as_str);
    let endpoint = matches.get_one::<String>("endpoint").map(String::as_str);
    let interval = matches
        .try_get_one::<u64>("interval")
        .ok()
        .flatten()
        .copied();

    cfg.with_overrides(wallet, interval, endpoint)
        .monitor_config()
        .wrap_err("invalid configuration")
}

fn init_logging(log_file: Option<&str>, default_level: &str) -> eyre::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file {
        // the dashboard owns the terminal, so logs go to a file
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .wrap_err_with(|| format!("cannot open log file {path}"))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

async fn snapshot(config: &MonitorConfig, all: bool) -> eyre::Result<()> {
    let client = TokenClient::new(&config.endpoint).wrap_err("cannot build HTTP client")?;
    let wallets: Vec<&str> = if all {
        config.wallets.iter().map(String::as_str).collect()
    } else {
        config.wallets.iter().take(1).map(String::as_str).collect()
    };

    let results = join_all(wallets.iter().map(|w| client.fetch_tokens(w))).await;

    let mut failures = 0;
    for (wallet, result) in wallets.iter().zip(results) {
        match result {
            Ok(tokens) => {
                let mut order = DisplayOrder::default();
                order.ensure(&tokens);
                let rows = chart_rows(&order, &tokens, &config.excluded_prefix, &config.palette);
                report::print_snapshot(wallet, &rows);
            }
            Err(e) => {
                error!(wallet, error = %e, "snapshot fetch failed");
                report::print_failure(wallet, FETCH_FAILED_MESSAGE);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(eyre!("{failures} of {} wallet(s) failed", wallets.len()));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cfg: Config =
        confy::load(APP_NAME, CONFIG_NAME).wrap_err("cannot load configuration")?;

    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("config", _)) => {
            let path = confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
                .wrap_err("cannot locate configuration file")?;
            println!("Your config file is located here: \n{}", path.display());
        }
        Some(("watch", sub)) => {
            let log_file = cfg.log_file.clone();
            let config = monitor_config(cfg, sub)?;
            init_logging(Some(&log_file), "info")?;

            let tab = sub
                .get_one::<String>("tab")
                .and_then(|t| tui::Tab::from_str(t));
            let client = TokenClient::new(&config.endpoint).wrap_err("cannot build HTTP client")?;
            tui::run_tui(config, tui::fetcher(client), tab)
                .await
                .wrap_err("dashboard failed")?;
        }
        Some(("snapshot", sub)) => {
            let config = monitor_config(cfg, sub)?;
            init_logging(None, "warn")?;
            snapshot(&config, sub.get_flag("all")).await?;
        }
        _ => cli().print_help()?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli() {
        let matches = cli().get_matches_from(vec!["supply_monitor", "watch", "-w", "abc", "-i", "300"]);
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "watch");
        assert_eq!(sub.get_one::<String>("wallet").map(String::as_str), Some("abc"));
        assert_eq!(sub.get_one::<u64>("interval"), Some(&300));
    }

    #[test]
    fn test_cli_overrides_reach_monitor_config() {
        let matches = cli().get_matches_from(vec![
            "supply_monitor",
            "snapshot",
            "--wallet",
            "other",
            "--endpoint",
            "http://localhost:3000/",
            "--all",
        ]);
        let (_, sub) = matches.subcommand().unwrap();
        assert!(sub.get_flag("all"));

        let config = monitor_config(Config::default(), sub).unwrap();
        assert_eq!(config.wallets[0], "other");
        assert_eq!(config.wallets.len(), 2);
        assert_eq!(config.endpoint, "http://localhost:3000");
    }

    #[test]
    fn test_invalid_interval_is_rejected() {
        let matches = cli().get_matches_from(vec!["supply_monitor", "watch", "-i", "0"]);
        let (_, sub) = matches.subcommand().unwrap();
        assert!(monitor_config(Config::default(), sub).is_err());
    }
}
