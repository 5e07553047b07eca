use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::pid::kindle_pid;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub run_id: String,
    #[serde(default)]
    pub pids: Vec<String>,
    #[serde(default)]
    pub serials: Vec<String>,
    pub output_suffix: String,
    pub sanitize_exth: bool,
    pub overwrite: bool,
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_hash: String,
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p).with_context(|| format!("reading config {}", p.display()))?
    } else {
        include_bytes!("../config/default.yml").to_vec()
    };

    let mut config: Config = serde_yaml::from_slice(&bytes).context("parsing config")?;
    if config.run_id.trim().is_empty() {
        config.run_id = generate_run_id();
    }

    let config_hash = hash_bytes(&bytes);

    Ok(LoadedConfig { config, config_hash })
}

impl Config {
    /// Candidate PIDs in trial order: explicit PIDs, configured PIDs, then
    /// PIDs derived from serials. Duplicates are dropped.
    pub fn candidate_pids(&self, extra_pids: &[String], extra_serials: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut push = |pid: &str| {
            let pid = pid.trim();
            if !pid.is_empty() && !out.iter().any(|p| p == pid) {
                out.push(pid.to_string());
            }
        };
        for pid in extra_pids.iter().chain(&self.pids) {
            push(pid);
        }
        for serial in extra_serials.iter().chain(&self.serials) {
            match kindle_pid(serial) {
                Ok(pid) => push(&pid),
                Err(err) => warn!("ignoring serial: {err}"),
            }
        }
        out
    }
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex::encode(digest)
}

fn generate_run_id() -> String {
    let now = chrono::Utc::now();
    format!("{}_{}", now.format("%Y%m%dT%H%M%SZ"), rand_suffix())
}

fn rand_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("{:08x}", nanos)
}
