use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};
use whalecopy_core_types::WhaleInfo;

#[derive(Debug, Deserialize)]
struct WalletsDocument {
    #[serde(default)]
    whales: Vec<WalletEntry>,
}

#[derive(Debug, Deserialize)]
struct WalletEntry {
    #[serde(default)]
    wallet: String,
    #[serde(default)]
    label: String,
    #[serde(default = "default_win_rate")]
    win_rate: f64,
    #[serde(default)]
    source: String,
}

fn default_win_rate() -> f64 {
    0.5
}

/// Tracked-whale map, loaded once at startup and swapped wholesale on an
/// explicit reload. Steady-state access is read-only.
pub struct WhaleRegistry {
    path: PathBuf,
    wallets: RwLock<HashMap<String, WhaleInfo>>,
}

impl WhaleRegistry {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let wallets = read_wallets(&path)?;
        info!(
            path = %path.display(),
            whales = wallets.len(),
            "whale registry loaded"
        );
        Ok(Self {
            path,
            wallets: RwLock::new(wallets),
        })
    }

    pub fn reload(&self) -> Result<usize> {
        let wallets = read_wallets(&self.path)?;
        let count = wallets.len();
        let mut guard = self
            .wallets
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = wallets;
        info!(whales = count, "whale registry reloaded");
        Ok(count)
    }

    pub fn contains(&self, wallet: &str) -> bool {
        self.wallets
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(wallet)
    }

    pub fn get(&self, wallet: &str) -> Option<WhaleInfo> {
        self.wallets
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(wallet)
            .cloned()
    }

    pub fn wallets(&self) -> Vec<String> {
        self.wallets
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.wallets
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// In-memory registry without a backing document. Reload has nothing
    /// to re-read, so only tests and tooling should use this.
    pub fn from_entries(entries: Vec<(String, WhaleInfo)>) -> Self {
        Self {
            path: PathBuf::from("in-memory-wallets.json"),
            wallets: RwLock::new(entries.into_iter().collect()),
        }
    }
}

fn read_wallets(path: &Path) -> Result<HashMap<String, WhaleInfo>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading wallets file: {}", path.display()))?;
    let document: WalletsDocument = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing wallets file: {}", path.display()))?;

    let mut wallets = HashMap::new();
    for entry in document.whales {
        let wallet = entry.wallet.trim().to_string();
        // Base58 pubkeys are 32-44 characters; anything shorter is noise.
        if wallet.len() < 32 {
            warn!(wallet = %wallet, "skipping malformed wallet entry");
            continue;
        }
        wallets.insert(
            wallet,
            WhaleInfo {
                label: if entry.label.trim().is_empty() {
                    "whale".to_string()
                } else {
                    entry.label
                },
                win_rate: entry.win_rate,
                source: entry.source,
            },
        );
    }
    Ok(wallets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const WALLET_A: &str = "WhaleWa11etAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

    fn write_wallets_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp wallets file");
        file.write_all(content.as_bytes()).expect("write wallets");
        file
    }

    #[test]
    fn loads_document_and_defaults_label() {
        let file = write_wallets_file(
            r#"{"whales": [
                {"wallet": "WhaleWa11etAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA", "win_rate": 0.62, "source": "manual"},
                {"wallet": "short", "label": "ignored"}
            ]}"#,
        );
        let registry = WhaleRegistry::load(file.path()).expect("load registry");
        assert_eq!(registry.len(), 1);
        let info = registry.get(WALLET_A).expect("whale info");
        assert_eq!(info.label, "whale");
        assert!((info.win_rate - 0.62).abs() < 1e-12);
        assert_eq!(info.source, "manual");
    }

    #[test]
    fn reload_swaps_the_map() {
        let file = write_wallets_file(r#"{"whales": []}"#);
        let registry = WhaleRegistry::load(file.path()).expect("load registry");
        assert!(registry.is_empty());

        std::fs::write(
            file.path(),
            r#"{"whales": [{"wallet": "WhaleWa11etAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA", "label": "alpha"}]}"#,
        )
        .expect("rewrite wallets");
        let count = registry.reload().expect("reload");
        assert_eq!(count, 1);
        assert!(registry.contains(WALLET_A));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(WhaleRegistry::load("definitely/not/there.json").is_err());
    }
}
