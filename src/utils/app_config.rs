//! Load the server config file (JSON or TOML, by extension) and layer env overrides on top.
//! A missing or malformed file is an error; callers treat it as fatal.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ServerConfig;
use crate::utils::config::PackagePaths;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ConfigFile {
    hostname: Option<String>,
    port: Option<u16>,
    workspace_root: Option<String>,
    #[serde(default)]
    extractor: ExtractorSection,
    request_timeout_secs: Option<u64>,
    archive_channel_chunks: Option<usize>,
    verbose: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExtractorSection {
    program: Option<String>,
    args: Option<Vec<String>>,
}

/// Parse `path` as TOML when it ends in `.toml`, JSON otherwise.
pub(crate) fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let is_toml = path.extension().is_some_and(|e| e.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&s).with_context(|| format!("parse TOML config {}", path.display()))
    } else {
        serde_json::from_str(&s).with_context(|| format!("parse JSON config {}", path.display()))
    }
}

/// Overwrite config field from file when present.
macro_rules! apply_file_opt {
    ($file:expr, $cfg:expr, $file_field:ident => $cfg_field:ident) => {
        if let Some(v) = $file.$file_field.clone() {
            $cfg.$cfg_field = v;
        }
    };
}

/// Apply file values to `cfg` (only fields present in the file).
pub(crate) fn apply_file_to_config(file: &ConfigFile, cfg: &mut ServerConfig) {
    apply_file_opt!(file, cfg, hostname => hostname);
    apply_file_opt!(file, cfg, port => port);
    if let Some(ref root) = file.workspace_root {
        cfg.workspace_root = PathBuf::from(root);
    }
    apply_file_opt!(file.extractor, cfg, program => extractor_program);
    apply_file_opt!(file.extractor, cfg, args => extractor_args);
    if let Some(secs) = file.request_timeout_secs {
        cfg.request_timeout = Some(Duration::from_secs(secs));
    }
    apply_file_opt!(file, cfg, archive_channel_chunks => archive_channel_chunks);
    apply_file_opt!(file, cfg, verbose => verbose);
}

/// Apply `<PKG>_HOSTNAME` / `<PKG>_PORT` from the environment, after loading `.env` from `dir`.
pub(crate) fn apply_env_to_config(dir: &Path, cfg: &mut ServerConfig) -> Result<()> {
    let env_path = dir.join(".env");
    if env_path.is_file() {
        dotenvy::from_path(&env_path).with_context(|| format!("load {}", env_path.display()))?;
    }
    let paths = PackagePaths::get();
    if let Some(host) = env_value(&paths.env_var("hostname")) {
        cfg.hostname = host;
    }
    let port_var = paths.env_var("port");
    if let Some(port) = env_value(&port_var) {
        cfg.port = port
            .parse()
            .with_context(|| format!("{port_var}={port} is not a port number"))?;
    }
    Ok(())
}

fn env_value(name: &str) -> Option<String> {
    let s = std::env::var(name).ok()?;
    let s = s.trim().to_string();
    (!s.is_empty()).then_some(s)
}

/// Final checks before the server starts.
pub(crate) fn validate_config(cfg: &ServerConfig) -> Result<()> {
    if cfg.hostname.trim().is_empty() {
        bail!("config: hostname is required");
    }
    if cfg.extractor_program.trim().is_empty() {
        bail!("config: extractor.program is empty");
    }
    if cfg.archive_channel_chunks == 0 {
        bail!("config: archive_channel_chunks must be at least 1");
    }
    Ok(())
}

/// File → env, then validation. `path` must exist.
pub fn load_server_config(path: &Path) -> Result<ServerConfig> {
    let file = load_config_file(path)?;
    let mut cfg = ServerConfig::new(String::new());
    apply_file_to_config(&file, &mut cfg);
    let dir = path.parent().unwrap_or(Path::new("."));
    apply_env_to_config(dir, &mut cfg)?;
    validate_config(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_file_json_overrides_defaults() {
        let file: ConfigFile = serde_json::from_str(
            r#"{"hostname":"dl.example.org","port":9000,"extractor":{"args":["backup.py","-q"]}}"#,
        )
        .unwrap();
        let mut cfg = ServerConfig::new("");
        apply_file_to_config(&file, &mut cfg);
        assert_eq!(cfg.hostname, "dl.example.org");
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.extractor_program, "python");
        assert_eq!(cfg.extractor_args, vec!["backup.py", "-q"]);
        assert!(cfg.request_timeout.is_none());
    }

    #[test]
    fn test_apply_file_toml() {
        let file: ConfigFile = toml::from_str(
            "hostname = \"h\"\nrequest_timeout_secs = 30\n[extractor]\nprogram = \"sh\"\n",
        )
        .unwrap();
        let mut cfg = ServerConfig::new("");
        apply_file_to_config(&file, &mut cfg);
        assert_eq!(cfg.extractor_program, "sh");
        assert_eq!(cfg.request_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(serde_json::from_str::<ConfigFile>(r#"{"hostnme":"x"}"#).is_err());
    }

    #[test]
    fn test_validate_requires_hostname() {
        assert!(validate_config(&ServerConfig::new("")).is_err());
        assert!(validate_config(&ServerConfig::new("localhost")).is_ok());
    }
}
