use super::{exit_codes, open_store};
use chrono::Utc;
use speedtrack_core::config::Settings;
use speedtrack_core::report;

pub fn run(settings: &Settings) -> anyhow::Result<i32> {
    let store = open_store(settings)?;
    match report::summary(&store, Utc::now())? {
        Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
        None => println!("{{}}"),
    }
    Ok(exit_codes::OK)
}
