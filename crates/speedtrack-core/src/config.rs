use crate::probe::ProbeOptions;
use std::env;
use std::path::PathBuf;

pub const DB_FILE_NAME: &str = "speedtest.db";

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub db_path: PathBuf,
    pub accept_license: bool,
    pub accept_gdpr: bool,
    pub server_id: Option<String>,
    pub speedtest_bin: PathBuf,
    pub log_level: String,
    pub shutdown_grace_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(env::var_os("HOME").map(PathBuf::from)),
            accept_license: false,
            accept_gdpr: false,
            server_id: None,
            speedtest_bin: PathBuf::from("speedtest"),
            log_level: "info".to_string(),
            shutdown_grace_secs: 10,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Applies each variable over the defaults. Values that fail to parse
    /// leave the default in place.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = lookup("SPEEDTRACK_DB_PATH").filter(|v| !v.trim().is_empty()) {
            cfg.db_path = PathBuf::from(v);
        }
        if let Some(b) = lookup("SPEEDTEST_ACCEPT_LICENSE").and_then(|v| parse_bool(&v)) {
            cfg.accept_license = b;
        }
        if let Some(b) = lookup("SPEEDTEST_ACCEPT_GDPR").and_then(|v| parse_bool(&v)) {
            cfg.accept_gdpr = b;
        }
        if let Some(v) = lookup("SPEEDTEST_SERVER_ID") {
            let v = v.trim();
            if !v.is_empty() {
                cfg.server_id = Some(v.to_string());
            }
        }
        if let Some(v) = lookup("SPEEDTEST_BIN").filter(|v| !v.trim().is_empty()) {
            cfg.speedtest_bin = PathBuf::from(v);
        }
        if let Some(v) = lookup("SPEEDTRACK_LOG") {
            cfg.log_level = v;
        }
        if let Some(v) = lookup("SPEEDTRACK_SHUTDOWN_GRACE_SECS") {
            if let Ok(n) = v.trim().parse() {
                cfg.shutdown_grace_secs = n;
            }
        }
        cfg
    }

    pub fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            accept_license: self.accept_license,
            accept_gdpr: self.accept_gdpr,
            server_id: self.server_id.clone(),
        }
    }
}

fn default_db_path(home: Option<PathBuf>) -> PathBuf {
    match home {
        Some(home) if !home.as_os_str().is_empty() => home.join(DB_FILE_NAME),
        _ => PathBuf::from(".").join(DB_FILE_NAME),
    }
}

/// Accepts 1/0, true/false, yes/no, on/off (any case).
pub fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let cfg = Settings::from_lookup(|_| None);
        assert_eq!(cfg, Settings::default());
        assert!(!cfg.accept_license);
        assert_eq!(cfg.server_id, None);
        assert_eq!(cfg.speedtest_bin, PathBuf::from("speedtest"));
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.shutdown_grace_secs, 10);
        assert!(cfg.db_path.ends_with(DB_FILE_NAME));
    }

    #[test]
    fn test_env_overrides() {
        let cfg = Settings::from_lookup(lookup(&[
            ("SPEEDTRACK_DB_PATH", "/tmp/st.db"),
            ("SPEEDTEST_ACCEPT_LICENSE", "true"),
            ("SPEEDTEST_ACCEPT_GDPR", "1"),
            ("SPEEDTEST_SERVER_ID", " 1234 "),
            ("SPEEDTEST_BIN", "/opt/speedtest"),
            ("SPEEDTRACK_LOG", "debug"),
            ("SPEEDTRACK_SHUTDOWN_GRACE_SECS", "3"),
        ]));
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/st.db"));
        assert!(cfg.accept_license && cfg.accept_gdpr);
        assert_eq!(cfg.server_id.as_deref(), Some("1234"));
        assert_eq!(cfg.speedtest_bin, PathBuf::from("/opt/speedtest"));
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.shutdown_grace_secs, 3);

        let opts = cfg.probe_options();
        assert!(opts.accept_license);
        assert_eq!(opts.server_id.as_deref(), Some("1234"));
    }

    #[test]
    fn test_unparseable_values_keep_defaults() {
        let cfg = Settings::from_lookup(lookup(&[
            ("SPEEDTEST_ACCEPT_LICENSE", "maybe"),
            ("SPEEDTEST_SERVER_ID", "   "),
            ("SPEEDTRACK_SHUTDOWN_GRACE_SECS", "soon"),
        ]));
        assert!(!cfg.accept_license);
        assert_eq!(cfg.server_id, None);
        assert_eq!(cfg.shutdown_grace_secs, 10);
    }

    #[test]
    fn test_default_db_path_falls_back_to_cwd() {
        assert_eq!(
            default_db_path(Some(PathBuf::from("/home/me"))),
            PathBuf::from("/home/me/speedtest.db")
        );
        assert_eq!(default_db_path(None), PathBuf::from("./speedtest.db"));
    }
}
