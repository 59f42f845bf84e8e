//! Remote git repository loading.
//!
//! Repositories are cloned into a content-addressed cache directory
//! (`<cache>/<sha256(url)[..12]>`) and updated with fetch + hard reset on
//! subsequent loads, then scanned like a local folder. Requires a `git`
//! binary on PATH.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

use crate::config::RepoConfig;
use crate::extract::Capability;
use crate::models::RawDocument;

use super::file;

pub fn load_repo(config: &RepoConfig, url: &str, docs: Capability) -> Vec<RawDocument> {
    match sync_checkout(config, url) {
        Ok(dir) => file::load_folder(&dir, docs),
        Err(e) => {
            warn!(url, error = %e, "repository checkout failed");
            Vec::new()
        }
    }
}

fn sync_checkout(config: &RepoConfig, url: &str) -> Result<PathBuf> {
    let dest = cache_root(config).join(short_hash(url));

    if dest.join(".git").exists() {
        info!(url, dest = %dest.display(), "updating cached checkout");
        git(&["fetch", "origin", &config.branch], Some(&dest))?;
        git(
            &["reset", "--hard", &format!("origin/{}", config.branch)],
            Some(&dest),
        )?;
    } else {
        std::fs::create_dir_all(dest.parent().unwrap_or(Path::new(".")))?;
        info!(url, dest = %dest.display(), "cloning repository");
        let dest_str = dest.display().to_string();
        let mut args = vec!["clone"];
        if config.shallow {
            args.extend(["--depth", "1"]);
        }
        args.extend(["--branch", &config.branch, url, &dest_str]);
        git(&args, None)?;
    }
    Ok(dest)
}

fn cache_root(config: &RepoConfig) -> PathBuf {
    config
        .cache_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("knowledge-engine").join("repos"))
}

/// First 12 hex chars of sha256, used as a stable cache key for a URL.
pub(crate) fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

fn git(args: &[&str], cwd: Option<&Path>) -> Result<()> {
    let mut command = Command::new("git");
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    let output = command
        .args(args)
        .output()
        .context("failed to run git (is it installed?)")?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.first().unwrap_or(&""),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}
