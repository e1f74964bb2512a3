use whalecopy_core_types::{
    BuyIntent, LaunchpadAccounts, ParsedTx, Platform, PlatformAccounts, WhaleBuy, BAGS_PROGRAM,
    LETS_BONK_PROGRAM, PUMP_FUN_PROGRAM, SOL_MINT,
};

use crate::derive::{decode_key, AddressDeriver};

/// Detect the platform tag for a parsed transaction. Program-ID matches
/// win over webhook source hints; launchpads win over AMMs because their
/// signals carry richer structure and usually represent first-buys.
pub fn detect_platform(parsed: &ParsedTx) -> Platform {
    let mut amm_match: Option<Platform> = None;
    let mut launchpad_match: Option<Platform> = None;
    for program_id in &parsed.invoked_program_ids {
        if let Some(platform) = Platform::from_program_id(program_id) {
            if platform.is_launchpad() {
                launchpad_match.get_or_insert(platform);
            } else {
                amm_match.get_or_insert(platform);
            }
        }
    }
    if let Some(platform) = launchpad_match.or(amm_match) {
        return platform;
    }

    parsed
        .platform_hint
        .as_deref()
        .map(platform_from_source_hint)
        .unwrap_or(Platform::Unknown)
}

fn platform_from_source_hint(source: &str) -> Platform {
    let lowered = source.to_ascii_lowercase();
    if lowered.contains("pumpswap") || lowered.contains("pump_amm") {
        Platform::PumpSwap
    } else if lowered.contains("pump") {
        Platform::PumpFun
    } else if lowered.contains("bonk") {
        Platform::LetsBonk
    } else if lowered.contains("bags") {
        Platform::Bags
    } else if lowered.contains("jupiter") {
        Platform::Jupiter
    } else if lowered.contains("raydium") {
        Platform::RaydiumAmm
    } else {
        Platform::Unknown
    }
}

/// Derive the accounts the executor needs for a platform-tagged buy.
/// Accounts observed in the whale's own instruction take precedence over
/// derived ones. AMM and unknown platforms stay empty; the executor
/// falls back to its aggregator route for those.
pub fn resolve_accounts(
    platform: Platform,
    token_mint: &str,
    observed: Option<&LaunchpadAccounts>,
    deriver: &dyn AddressDeriver,
) -> PlatformAccounts {
    match platform {
        Platform::PumpFun => pump_fun_accounts(token_mint, observed, deriver),
        Platform::LetsBonk => launchpad_pool_accounts(token_mint, LETS_BONK_PROGRAM, deriver),
        Platform::Bags => launchpad_pool_accounts(token_mint, BAGS_PROGRAM, deriver),
        Platform::PumpSwap | Platform::RaydiumAmm | Platform::Jupiter | Platform::Unknown => {
            PlatformAccounts::default()
        }
    }
}

fn pump_fun_accounts(
    token_mint: &str,
    observed: Option<&LaunchpadAccounts>,
    deriver: &dyn AddressDeriver,
) -> PlatformAccounts {
    let mut accounts = PlatformAccounts::default();
    let Some(mint_raw) = decode_key(token_mint) else {
        return accounts;
    };

    let bonding_curve =
        deriver.find_program_address(&[b"bonding-curve", &mint_raw], PUMP_FUN_PROGRAM);
    accounts.global_config = deriver.find_program_address(&[b"global"], PUMP_FUN_PROGRAM);

    let observed_assoc = observed
        .map(|accounts| accounts.associated_bonding_curve.clone())
        .filter(|value| !value.is_empty());
    accounts.associated_bonding_curve = observed_assoc.or_else(|| {
        bonding_curve
            .as_deref()
            .and_then(|curve| deriver.associated_token_account(curve, token_mint))
    });
    accounts.bonding_curve = bonding_curve;

    if let Some(observed) = observed {
        if !observed.creator_vault.is_empty() {
            accounts.creator_vault = Some(observed.creator_vault.clone());
        }
        if !observed.fee_recipient.is_empty() {
            accounts.fee_recipient = Some(observed.fee_recipient.clone());
        }
        if !observed.token_program.is_empty() {
            accounts.token_program = Some(observed.token_program.clone());
        }
    }
    accounts
}

/// lets_bonk and bags share the pool/pool_vault seed schedule against
/// the SOL quote mint.
fn launchpad_pool_accounts(
    token_mint: &str,
    program_id: &str,
    deriver: &dyn AddressDeriver,
) -> PlatformAccounts {
    let mut accounts = PlatformAccounts::default();
    let (Some(mint_raw), Some(sol_raw)) = (decode_key(token_mint), decode_key(SOL_MINT)) else {
        return accounts;
    };

    let pool_state = deriver.find_program_address(&[b"pool", &mint_raw, &sol_raw], program_id);
    if let Some(pool) = pool_state.as_deref().and_then(decode_key) {
        accounts.base_vault =
            deriver.find_program_address(&[b"pool_vault", &pool, &mint_raw], program_id);
        accounts.quote_vault =
            deriver.find_program_address(&[b"pool_vault", &pool, &sol_raw], program_id);
    }
    accounts.pool_state = pool_state;
    accounts.global_config = deriver.find_program_address(&[b"global_config"], program_id);
    accounts
}

/// Tag the platform and attach derived accounts: the step between a
/// passed WhaleBuy and the emitted BuyIntent.
pub fn resolve(buy: WhaleBuy, parsed: &ParsedTx, deriver: &dyn AddressDeriver) -> BuyIntent {
    let observed = parsed
        .swap
        .as_ref()
        .and_then(|swap| swap.launchpad_accounts.as_ref());
    let accounts = resolve_accounts(buy.platform, &buy.token_mint, observed, deriver);
    BuyIntent { buy, accounts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::Sha256Deriver;
    use std::collections::BTreeSet;
    use whalecopy_core_types::{SwapDetails, PUMPSWAP_PROGRAM, RAYDIUM_AMM_PROGRAM};

    const MINT: &str = "So11111111111111111111111111111111111111112";

    fn parsed_with_programs(programs: &[&str]) -> ParsedTx {
        ParsedTx {
            signature: "sig".to_string(),
            block_time: None,
            fee_payer: "WalletA".to_string(),
            account_keys: vec!["WalletA".to_string()],
            pre_balances: vec![0],
            post_balances: vec![0],
            token_post_balances: vec![],
            log_messages: vec![],
            succeeded: true,
            invoked_program_ids: programs.iter().map(|id| id.to_string()).collect::<BTreeSet<_>>(),
            swap: None,
            platform_hint: None,
        }
    }

    #[test]
    fn launchpad_wins_over_amm_on_the_same_transaction() {
        let parsed = parsed_with_programs(&[PUMPSWAP_PROGRAM, PUMP_FUN_PROGRAM]);
        assert_eq!(detect_platform(&parsed), Platform::PumpFun);
    }

    #[test]
    fn amm_only_transaction_tags_the_amm() {
        let parsed = parsed_with_programs(&[RAYDIUM_AMM_PROGRAM]);
        assert_eq!(detect_platform(&parsed), Platform::RaydiumAmm);
    }

    #[test]
    fn unmatched_programs_fall_back_to_source_hint_then_unknown() {
        let mut parsed = parsed_with_programs(&[]);
        parsed.platform_hint = Some("PUMP_FUN".to_string());
        assert_eq!(detect_platform(&parsed), Platform::PumpFun);

        parsed.platform_hint = Some("some-new-dex".to_string());
        assert_eq!(detect_platform(&parsed), Platform::Unknown);

        parsed.platform_hint = None;
        assert_eq!(detect_platform(&parsed), Platform::Unknown);
    }

    #[test]
    fn pump_fun_accounts_are_derived_and_deterministic() {
        let deriver = Sha256Deriver;
        let first = resolve_accounts(Platform::PumpFun, MINT, None, &deriver);
        let second = resolve_accounts(Platform::PumpFun, MINT, None, &deriver);
        assert_eq!(first, second);
        assert!(first.bonding_curve.is_some());
        assert!(first.associated_bonding_curve.is_some());
        assert!(first.global_config.is_some());
        assert!(first.pool_state.is_none());
    }

    #[test]
    fn observed_whale_accounts_take_precedence() {
        let deriver = Sha256Deriver;
        let observed = LaunchpadAccounts {
            fee_recipient: "FeeRecipient111".to_string(),
            associated_bonding_curve: "ObservedCurveAta".to_string(),
            token_program: "TokenProgram111".to_string(),
            creator_vault: "CreatorVault111".to_string(),
        };
        let accounts = resolve_accounts(Platform::PumpFun, MINT, Some(&observed), &deriver);
        assert_eq!(
            accounts.associated_bonding_curve.as_deref(),
            Some("ObservedCurveAta")
        );
        assert_eq!(accounts.creator_vault.as_deref(), Some("CreatorVault111"));
        assert_eq!(accounts.fee_recipient.as_deref(), Some("FeeRecipient111"));
    }

    #[test]
    fn amm_platforms_leave_accounts_empty_for_aggregator_fallback() {
        let deriver = Sha256Deriver;
        assert!(resolve_accounts(Platform::PumpSwap, MINT, None, &deriver).is_empty());
        assert!(resolve_accounts(Platform::RaydiumAmm, MINT, None, &deriver).is_empty());
        assert!(resolve_accounts(Platform::Unknown, MINT, None, &deriver).is_empty());
    }

    #[test]
    fn lets_bonk_pool_schedule_fills_pool_and_vaults() {
        let deriver = Sha256Deriver;
        let accounts = resolve_accounts(Platform::LetsBonk, MINT, None, &deriver);
        assert!(accounts.pool_state.is_some());
        assert!(accounts.base_vault.is_some());
        assert!(accounts.quote_vault.is_some());
        assert_ne!(accounts.base_vault, accounts.quote_vault);

        // Same schedule under a different program must not collide.
        let bags = resolve_accounts(Platform::Bags, MINT, None, &deriver);
        assert_ne!(accounts.pool_state, bags.pool_state);
    }

    #[test]
    fn resolve_attaches_observed_accounts_from_the_parsed_swap() {
        let deriver = Sha256Deriver;
        let mut parsed = parsed_with_programs(&[PUMP_FUN_PROGRAM]);
        parsed.swap = Some(SwapDetails {
            token_mint: MINT.to_string(),
            token_amount: 100.0,
            is_buy: true,
            gross_sol_spent: 0.5,
            event_sol_amount: Some(0.5),
            launchpad_accounts: Some(LaunchpadAccounts {
                fee_recipient: String::new(),
                associated_bonding_curve: String::new(),
                token_program: String::new(),
                creator_vault: "CreatorVault111".to_string(),
            }),
        });
        let buy = WhaleBuy {
            whale_wallet: "WalletA".to_string(),
            token_mint: MINT.to_string(),
            amount_sol: 0.5,
            signature: "sig".to_string(),
            block_time: None,
            age_seconds: 0.0,
            platform: Platform::PumpFun,
            whale_label: "alpha".to_string(),
        };
        let intent = resolve(buy, &parsed, &deriver);
        assert_eq!(intent.accounts.creator_vault.as_deref(), Some("CreatorVault111"));
        assert!(intent.accounts.bonding_curve.is_some());
    }
}
