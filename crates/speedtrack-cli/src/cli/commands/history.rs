use super::{exit_codes, open_store};
use crate::cli::args::HistoryArgs;
use chrono::Utc;
use speedtrack_core::config::Settings;
use speedtrack_core::model::Column;
use speedtrack_core::report;

pub fn run(args: HistoryArgs, settings: &Settings) -> anyhow::Result<i32> {
    if args.days < 0 {
        anyhow::bail!("--days must not be negative (got {})", args.days);
    }
    let columns = args
        .columns
        .iter()
        .map(|name| name.parse::<Column>().map_err(anyhow::Error::msg))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let store = open_store(settings)?;
    let records = report::history(&store, Utc::now(), args.days, Some(columns.as_slice()))?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(exit_codes::OK)
}
