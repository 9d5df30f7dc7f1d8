use super::{Probe, ProbeOptions, ProbeResult};
use anyhow::{bail, Context};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Runs the speedtest CLI and parses its JSON report.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: PathBuf,
}

impl CommandProbe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for CommandProbe {
    fn default() -> Self {
        Self::new("speedtest")
    }
}

#[async_trait]
impl Probe for CommandProbe {
    async fn measure(&self, options: &ProbeOptions) -> anyhow::Result<ProbeResult> {
        let args = command_args(options);
        tracing::debug!(
            event = "probe_spawn",
            program = %self.program.display(),
            args = ?args
        );

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to spawn probe '{}'", self.program.display()))?;

        if !output.status.success() {
            bail!(
                "probe '{}' exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        parse_report(&output.stdout)
    }

    fn name(&self) -> &'static str {
        "speedtest-cli"
    }
}

pub fn command_args(options: &ProbeOptions) -> Vec<String> {
    let mut args = vec!["--format=json".to_string()];
    if options.accept_license {
        args.push("--accept-license".into());
    }
    if options.accept_gdpr {
        args.push("--accept-gdpr".into());
    }
    if let Some(id) = options.server_id.as_deref().filter(|s| !s.trim().is_empty()) {
        args.push(format!("--server-id={}", id.trim()));
    }
    args
}

/// Picks the last JSON object on stdout that is a result document. Log lines
/// (`"type": "log"`) and non-JSON chatter are skipped.
pub fn parse_report(stdout: &[u8]) -> anyhow::Result<ProbeResult> {
    let text = String::from_utf8_lossy(stdout);
    for line in text.lines().rev() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(v) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };
        if !v.is_object() {
            continue;
        }
        let is_result = v
            .get("type")
            .and_then(|t| t.as_str())
            .map_or(true, |t| t == "result");
        if is_result {
            return serde_json::from_value(v).context("malformed probe result document");
        }
    }
    bail!("probe produced no result document")
}
