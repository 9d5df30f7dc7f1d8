use super::args::{Cli, Command};
use anyhow::Context;
use speedtrack_core::config::Settings;
use speedtrack_core::storage::Store;

pub mod history;
pub mod run;
pub mod serve;
pub mod summary;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const RUN_FAILED: i32 = 1;
    pub const FATAL: i32 = 2;
}

pub async fn dispatch(cli: Cli, settings: Settings) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Serve(args) => serve::run(args, &settings).await,
        Command::Run(_) => run::run(&settings).await,
        Command::History(args) => history::run(args, &settings),
        Command::Summary => summary::run(&settings),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

/// Opens the database and makes sure the table exists. Failure here is fatal.
pub(crate) fn open_store(settings: &Settings) -> anyhow::Result<Store> {
    let path = &settings.db_path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let store = Store::open(path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    store
        .init_schema()
        .context("failed to initialize database schema")?;
    Ok(store)
}
