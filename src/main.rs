use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use keyed_ratelimit::config::{AppConfig, LoggingConfig};
use keyed_ratelimit::{Admission, LimiterTable};

/// Drive a keyed rate limiter from line commands on stdin.
///
/// Commands: `set <key>`, `del <key>`, `check <key>`, `stats`.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tokens per second for each key
    #[arg(long)]
    rate: Option<u32>,

    /// Bucket capacity for each key
    #[arg(long)]
    burst: Option<u32>,

    /// Idle seconds before a key is forgotten
    #[arg(long)]
    expiry_secs: Option<u64>,

    /// Sweeper cadence in milliseconds
    #[arg(long)]
    sweep_interval_ms: Option<u64>,

    /// Log filter directive
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::default(),
        };

        if let Some(rate) = self.rate {
            config.limiter.rate = rate;
        }
        if let Some(burst) = self.burst {
            config.limiter.burst = burst;
        }
        if let Some(expiry_secs) = self.expiry_secs {
            config.limiter.expiry_secs = expiry_secs;
        }
        if let Some(sweep_interval_ms) = self.sweep_interval_ms {
            config.limiter.sweep_interval_ms = sweep_interval_ms;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        config.logging.json |= self.json_logs;

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;
    init_tracing(&config.logging);

    info!("Starting keyed rate limiter");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let table = LimiterTable::from_config(&config.limiter);
    info!(
        rate = table.rate(),
        burst = table.burst(),
        expiry = ?table.expiry(),
        sweep_interval = ?table.sweep_interval(),
        "Limiter table initialized"
    );

    tokio::select! {
        result = serve_stdin(&table) => result?,
        _ = shutdown_signal() => {}
    }

    table.stop();
    info!("Keyed rate limiter stopped");
    Ok(())
}

/// Install the global tracing subscriber.
///
/// Logs go to stderr so stdout carries only command results.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Answer commands from stdin until EOF.
async fn serve_stdin(table: &LimiterTable) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let reply = match execute(table, &line) {
            Some(reply) => reply,
            None => continue,
        };
        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    info!("Reached end of input");
    Ok(())
}

/// Run one command line against the table. Blank lines produce no reply.
fn execute(table: &LimiterTable, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (command, key) = match line.split_once(char::is_whitespace) {
        Some((command, key)) => (command, Some(key.trim())),
        None => (line, None),
    };

    let reply = match (command, key) {
        ("set", Some(key)) => {
            table.set(key);
            "ok".to_string()
        }
        ("del", Some(key)) => {
            table.delete(key);
            "ok".to_string()
        }
        ("check", Some(key)) => match table.check(key) {
            Admission::Allowed => "allowed".to_string(),
            Admission::Denied => "denied".to_string(),
            Admission::Untracked => "untracked".to_string(),
        },
        ("stats", None) => format!("entries={}", table.len()),
        _ => {
            warn!(line, "Unrecognized command");
            format!("error: unrecognized command {:?}", line)
        }
    };

    Some(reply)
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn table() -> LimiterTable {
        LimiterTable::new(1, 1, Duration::from_secs(60), 0, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_execute_commands() {
        let table = table();

        assert_eq!(execute(&table, "check 10.0.0.1").as_deref(), Some("untracked"));
        assert_eq!(execute(&table, "set 10.0.0.1").as_deref(), Some("ok"));
        assert_eq!(execute(&table, "check 10.0.0.1").as_deref(), Some("allowed"));
        assert_eq!(execute(&table, "check 10.0.0.1").as_deref(), Some("denied"));
        assert_eq!(execute(&table, "stats").as_deref(), Some("entries=1"));
        assert_eq!(execute(&table, "del 10.0.0.1").as_deref(), Some("ok"));
        assert_eq!(execute(&table, "stats").as_deref(), Some("entries=0"));
    }

    #[tokio::test]
    async fn test_execute_ignores_blank_and_flags_unknown() {
        let table = table();

        assert_eq!(execute(&table, "   "), None);
        assert!(execute(&table, "set").unwrap().starts_with("error"));
        assert!(execute(&table, "purge all").unwrap().starts_with("error"));
    }

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from(["keyed-ratelimit", "--rate", "5", "--burst", "2", "--json-logs"]);
        let config = args.into_config().unwrap();

        assert_eq!(config.limiter.rate, 5);
        assert_eq!(config.limiter.burst, 2);
        assert_eq!(config.limiter.expiry_secs, 3600);
        assert!(config.logging.json);
    }
}
