mod blacklist;
mod emitted;
mod persist;
mod registry;

pub use self::blacklist::{
    built_in_mints, Blacklist, BUILT_IN_BLACKLIST_LEN, INFRASTRUCTURE_MINTS, SOL_VARIANT_MINTS,
    STABLECOIN_MINTS, WRAPPED_BTC_MINTS, WRAPPED_ETH_MINTS,
};
pub use self::emitted::{EmittedTokens, HistoryEntry};
pub use self::persist::{atomic_write_json, backup_path, load_json_with_backup, StateLoadError};
pub use self::registry::WhaleRegistry;

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{error, info};
use whalecopy_core_types::BuyIntent;

/// Verdict of the atomic pre-emission reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveVerdict {
    Reserved,
    AlreadyEmitted,
    BuyInProgress,
}

struct ReserveState {
    emitted: EmittedTokens,
    buying_in_progress: HashSet<String>,
}

/// Process-wide shared state: the tracked-whale map, the stablecoin
/// blacklist, the persistent emitted-token set and the transient
/// buying-in-progress set. The emitted set and the in-progress set live
/// behind exactly one mutex; that mutex is the pipeline's single
/// emission-reservation critical section and is never held across I/O.
pub struct SharedState {
    pub registry: WhaleRegistry,
    pub blacklist: Blacklist,
    reserve: Mutex<ReserveState>,
    emitted_path: PathBuf,
    history_path: PathBuf,
}

impl SharedState {
    /// Load persistent state. Parse corruption (primary and backup)
    /// recovers to an empty set with a critical log; I/O-level
    /// unreadability is surfaced to the caller, which aborts startup.
    pub fn load(
        registry: WhaleRegistry,
        blacklist: Blacklist,
        emitted_path: impl Into<PathBuf>,
        history_path: impl Into<PathBuf>,
        emitted_capacity: usize,
    ) -> Result<Self, StateLoadError> {
        let emitted_path = emitted_path.into();
        let history_path = history_path.into();

        let mints = match load_json_with_backup::<Vec<String>>(&emitted_path) {
            Ok(Some(mints)) => mints,
            Ok(None) => Vec::new(),
            Err(StateLoadError::Corrupt(detail)) => {
                // Worst case this allows one duplicate buy, which the
                // executor's own rules can still refuse.
                error!(
                    path = %emitted_path.display(),
                    detail = %detail,
                    "CRITICAL: emitted-token state corrupt beyond backup, starting empty"
                );
                Vec::new()
            }
            Err(unreadable @ StateLoadError::Unreadable(_)) => return Err(unreadable),
        };

        let emitted = EmittedTokens::from_mints(emitted_capacity, mints);
        info!(
            emitted = emitted.len(),
            whales = registry.len(),
            blacklist = blacklist.len(),
            "shared state loaded"
        );

        Ok(Self {
            registry,
            blacklist,
            reserve: Mutex::new(ReserveState {
                emitted,
                buying_in_progress: HashSet::new(),
            }),
            emitted_path,
            history_path,
        })
    }

    /// Atomic check-and-reserve for the final emission step. A caller
    /// that gets `Reserved` owns the mint until it calls
    /// `finish_emission` or `abort_reservation`.
    pub async fn try_reserve_emission(&self, mint: &str) -> ReserveVerdict {
        let mut guard = self.reserve.lock().await;
        if guard.emitted.contains(mint) {
            return ReserveVerdict::AlreadyEmitted;
        }
        if !guard.buying_in_progress.insert(mint.to_string()) {
            return ReserveVerdict::BuyInProgress;
        }
        ReserveVerdict::Reserved
    }

    /// Drop the buying-in-progress reservation without recording an
    /// emission. Used when the executor reported failure: the mint stays
    /// eligible for future signals.
    pub async fn abort_reservation(&self, mint: &str) {
        let mut guard = self.reserve.lock().await;
        guard.buying_in_progress.remove(mint);
    }

    /// Record a successful emission: add the mint to the persistent
    /// emitted set, release the reservation, and flush both documents
    /// atomically. The mutex only covers the in-memory update; file I/O
    /// happens on a snapshot outside the lock.
    pub async fn finish_emission(&self, intent: &BuyIntent) -> Result<()> {
        let snapshot = {
            let mut guard = self.reserve.lock().await;
            guard.emitted.insert(intent.buy.token_mint.clone());
            guard.buying_in_progress.remove(&intent.buy.token_mint);
            guard.emitted.to_vec()
        };
        atomic_write_json(&self.emitted_path, &snapshot)
            .context("failed persisting emitted tokens")?;
        self.append_history(intent)
            .context("failed persisting purchase history")?;
        Ok(())
    }

    fn append_history(&self, intent: &BuyIntent) -> Result<()> {
        let mut entries = match load_json_with_backup::<Vec<HistoryEntry>>(&self.history_path) {
            Ok(Some(entries)) => entries,
            Ok(None) => Vec::new(),
            Err(load_error) => {
                error!(
                    path = %self.history_path.display(),
                    error = %load_error,
                    "CRITICAL: purchase history unreadable, starting a fresh document"
                );
                Vec::new()
            }
        };
        entries.push(HistoryEntry {
            mint: intent.buy.token_mint.clone(),
            timestamp: unix_now_seconds(),
            whale_label: intent.buy.whale_label.clone(),
            amount_sol: intent.buy.amount_sol,
            signature: intent.buy.signature.clone(),
        });
        atomic_write_json(&self.history_path, &entries)
    }

    pub async fn emitted_contains(&self, mint: &str) -> bool {
        self.reserve.lock().await.emitted.contains(mint)
    }

    pub async fn emitted_len(&self) -> usize {
        self.reserve.lock().await.emitted.len()
    }

    /// Flush the emitted set on shutdown.
    pub async fn flush(&self) -> Result<()> {
        let snapshot = self.reserve.lock().await.emitted.to_vec();
        atomic_write_json(&self.emitted_path, &snapshot)
            .context("failed flushing emitted tokens at shutdown")
    }
}

pub fn unix_now_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use whalecopy_core_types::{Platform, PlatformAccounts, WhaleBuy, WhaleInfo};

    fn test_intent(mint: &str) -> BuyIntent {
        BuyIntent {
            buy: WhaleBuy {
                whale_wallet: "WalletA".to_string(),
                token_mint: mint.to_string(),
                amount_sol: 0.5,
                signature: format!("sig-{mint}"),
                block_time: Some(1_700_000_000),
                age_seconds: 10.0,
                platform: Platform::PumpFun,
                whale_label: "alpha".to_string(),
            },
            accounts: PlatformAccounts::default(),
        }
    }

    fn test_state(dir: &std::path::Path) -> SharedState {
        SharedState::load(
            WhaleRegistry::from_entries(vec![(
                "WalletA".to_string(),
                WhaleInfo {
                    label: "alpha".to_string(),
                    win_rate: 0.6,
                    source: String::new(),
                },
            )]),
            Blacklist::default(),
            dir.join("emitted_tokens.json"),
            dir.join("purchased_history.json"),
            500,
        )
        .expect("state")
    }

    #[tokio::test]
    async fn reservation_is_exclusive_until_released() {
        let dir = tempdir().expect("tempdir");
        let state = test_state(dir.path());

        assert_eq!(
            state.try_reserve_emission("MintX").await,
            ReserveVerdict::Reserved
        );
        assert_eq!(
            state.try_reserve_emission("MintX").await,
            ReserveVerdict::BuyInProgress
        );

        state.abort_reservation("MintX").await;
        assert_eq!(
            state.try_reserve_emission("MintX").await,
            ReserveVerdict::Reserved
        );
    }

    #[tokio::test]
    async fn finished_emission_is_permanently_reserved_and_persisted() {
        let dir = tempdir().expect("tempdir");
        let state = test_state(dir.path());

        assert_eq!(
            state.try_reserve_emission("MintX").await,
            ReserveVerdict::Reserved
        );
        state
            .finish_emission(&test_intent("MintX"))
            .await
            .expect("finish");
        assert_eq!(
            state.try_reserve_emission("MintX").await,
            ReserveVerdict::AlreadyEmitted
        );

        // A restart sees the persisted mint and refuses to re-buy it.
        let restarted = test_state(dir.path());
        assert!(restarted.emitted_contains("MintX").await);
        assert_eq!(
            restarted.try_reserve_emission("MintX").await,
            ReserveVerdict::AlreadyEmitted
        );
    }

    #[tokio::test]
    async fn history_appends_one_entry_per_emission() {
        let dir = tempdir().expect("tempdir");
        let state = test_state(dir.path());

        state.try_reserve_emission("MintX").await;
        state
            .finish_emission(&test_intent("MintX"))
            .await
            .expect("finish x");
        state.try_reserve_emission("MintY").await;
        state
            .finish_emission(&test_intent("MintY"))
            .await
            .expect("finish y");

        let history: Vec<HistoryEntry> =
            load_json_with_backup(&dir.path().join("purchased_history.json"))
                .expect("history readable")
                .expect("history present");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].mint, "MintX");
        assert_eq!(history[1].mint, "MintY");
        assert_eq!(history[0].whale_label, "alpha");
    }

    #[tokio::test]
    async fn corrupt_state_files_recover_empty() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("emitted_tokens.json"), b"{ nope")
            .expect("corrupt primary");

        let state = test_state(dir.path());
        assert_eq!(state.emitted_len().await, 0);
        assert_eq!(
            state.try_reserve_emission("MintX").await,
            ReserveVerdict::Reserved
        );
    }
}
