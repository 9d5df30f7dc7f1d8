use clap::{Parser, Subcommand};
use speedtrack_core::config::Settings;
use speedtrack_core::report::HISTORY_WINDOW_DAYS;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "speedtrack",
    version,
    about = "Hourly internet speed measurements, stored in SQLite"
)]
pub struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "SPEEDTRACK_DB_PATH")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Measure at every top of the hour until interrupted
    Serve(ServeArgs),
    /// Measure once now and store the result
    Run(RunArgs),
    /// Print stored measurements as a JSON array
    History(HistoryArgs),
    /// Print the latest reading and averages
    Summary,
    Version,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ProbeArgs {
    /// speedtest executable
    #[arg(long, env = "SPEEDTEST_BIN")]
    pub speedtest_bin: Option<PathBuf>,

    #[arg(long)]
    pub accept_license: bool,

    #[arg(long)]
    pub accept_gdpr: bool,

    /// pin the measurement server
    #[arg(long)]
    pub server_id: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub probe: ProbeArgs,

    /// also measure immediately instead of waiting for the next hour
    #[arg(long)]
    pub run_now: bool,

    /// seconds to wait for an in-flight measurement on shutdown
    #[arg(long)]
    pub shutdown_grace_secs: Option<u64>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub probe: ProbeArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct HistoryArgs {
    /// trailing window in days
    #[arg(long, default_value_t = HISTORY_WINDOW_DAYS)]
    pub days: i64,

    /// comma-separated column names (default: all)
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<String>,
}

impl Cli {
    /// Layers command-line flags over `base`.
    pub fn settings(&self, mut base: Settings) -> Settings {
        if let Some(db) = &self.db {
            base.db_path = db.clone();
        }
        match &self.cmd {
            Command::Serve(args) => {
                args.probe.apply(&mut base);
                if let Some(secs) = args.shutdown_grace_secs {
                    base.shutdown_grace_secs = secs;
                }
            }
            Command::Run(args) => args.probe.apply(&mut base),
            Command::History(_) | Command::Summary | Command::Version => {}
        }
        base
    }
}

impl ProbeArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(bin) = &self.speedtest_bin {
            settings.speedtest_bin = bin.clone();
        }
        settings.accept_license |= self.accept_license;
        settings.accept_gdpr |= self.accept_gdpr;
        if let Some(id) = self.server_id.as_deref().map(str::trim) {
            settings.server_id = (!id.is_empty()).then(|| id.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_env_settings() {
        let cli = Cli::parse_from([
            "speedtrack",
            "--db",
            "/tmp/flag.db",
            "serve",
            "--accept-license",
            "--server-id",
            "77",
            "--speedtest-bin",
            "/usr/local/bin/speedtest",
            "--shutdown-grace-secs",
            "1",
        ]);
        let base = Settings {
            server_id: Some("1".into()),
            ..Settings::default()
        };
        let s = cli.settings(base);
        assert_eq!(s.db_path, PathBuf::from("/tmp/flag.db"));
        assert!(s.accept_license);
        assert!(!s.accept_gdpr);
        assert_eq!(s.server_id.as_deref(), Some("77"));
        assert_eq!(s.speedtest_bin, PathBuf::from("/usr/local/bin/speedtest"));
        assert_eq!(s.shutdown_grace_secs, 1);
    }

    #[test]
    fn test_history_columns_split_on_comma() {
        let cli = Cli::parse_from([
            "speedtrack",
            "history",
            "--days",
            "7",
            "--columns",
            "result_id,timestamp",
        ]);
        match cli.cmd {
            Command::History(args) => {
                assert_eq!(args.days, 7);
                assert_eq!(args.columns, vec!["result_id", "timestamp"]);
            }
            _ => panic!("expected history"),
        }
    }
}
