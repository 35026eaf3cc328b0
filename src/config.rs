//! CLI flags and application configuration.

use std::path::PathBuf;

use clap::Parser;

use crate::sequence::store::STORE_FILE;

pub const REQUESTS_FILE: &str = "requests.json";

#[derive(Parser, Debug)]
#[command(name = "reqshell", version, about = "Interactive HTTP request shell")]
pub struct Flags {
    /// Config directory (default: ~/.reqshell)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Request catalog file (default: <config dir>/requests.json)
    #[arg(long)]
    pub requests: Option<PathBuf>,

    /// Root prompt text
    #[arg(long, default_value = "reqshell")]
    pub prompt: String,
}

/// Resolved paths and settings for one session.
#[derive(Debug)]
pub struct AppCfg {
    pub config_dir: PathBuf,
    pub sequences_path: PathBuf,
    pub requests_path: PathBuf,
    pub prompt: String,
}

impl AppCfg {
    pub fn from_flags(flags: Flags) -> std::io::Result<Self> {
        let config_dir = flags.config.unwrap_or_else(default_config_dir);
        std::fs::create_dir_all(&config_dir)?;
        let requests_path = flags
            .requests
            .unwrap_or_else(|| config_dir.join(REQUESTS_FILE));
        Ok(Self {
            sequences_path: config_dir.join(STORE_FILE),
            config_dir,
            requests_path,
            prompt: flags.prompt,
        })
    }
}

fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".reqshell"))
        .unwrap_or_else(|| PathBuf::from(".reqshell"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppCfg::from_flags(Flags {
            config: Some(dir.path().to_path_buf()),
            requests: None,
            prompt: "p".to_string(),
        })
        .unwrap();
        assert_eq!(cfg.sequences_path, dir.path().join("sequences.json"));
        assert_eq!(cfg.requests_path, dir.path().join("requests.json"));
    }

    #[test]
    fn test_requests_override() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("custom.json");
        let cfg = AppCfg::from_flags(Flags {
            config: Some(dir.path().to_path_buf()),
            requests: Some(custom.clone()),
            prompt: "p".to_string(),
        })
        .unwrap();
        assert_eq!(cfg.requests_path, custom);
    }
}
