use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use whalecopy_core_types::{
    EnrichedTx, LaunchpadAccounts, ParsedTx, SwapDetails, TokenBalance, LAMPORTS_PER_SOL,
    PUMP_FUN_PROGRAM, SOL_MINT,
};
use whalecopy_state::Blacklist;
use yellowstone_grpc_proto::prelude::{
    CompiledInstruction, Message as SolMessage, SubscribeUpdateTransactionInfo,
    TransactionStatusMeta, UiTokenAmount,
};

pub const PUMP_FUN_BUY_DISCRIMINATOR: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];
pub const PUMP_FUN_SELL_DISCRIMINATOR: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];

// Anchor emit_cpi! envelope: 8-byte event tag, then the event's own
// 8-byte discriminator, then the event payload.
const ANCHOR_EVENT_TAG: [u8; 8] = [0xe4, 0x45, 0xa5, 0x2e, 0x51, 0xcb, 0x9a, 0x1d];
const TRADE_EVENT_DISCRIMINATOR: [u8; 8] = [0xbd, 0xdb, 0x7f, 0xd3, 0x4e, 0xe6, 0x61, 0xee];
const TRADE_EVENT_MIN_LEN: usize = 137;

const PUMP_GLOBAL_ACCOUNT: &str = "4wTV1YmiEkRvAtNtsSGPtUrqRYQMe5SKy2uB4Jjaxnjf";
const PUMP_TOKEN_DECIMALS: f64 = 1_000_000.0;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Structural violation: wrong sizes, missing fields, unparseable
    /// instruction data. Logged at debug and dropped.
    #[error("malformed transaction: {0}")]
    MalformedTx(&'static str),
    /// Valid transaction we will never act on (blacklisted mint, not a
    /// swap shape we track). Dropped silently.
    #[error("uninteresting transaction")]
    Uninteresting,
    /// The transaction's own error field is set. Dropped silently.
    #[error("failed transaction")]
    FailedTx,
}

/// Decode a stream-delivered transaction into the neutral `ParsedTx`
/// without any network call. Pure: identical input yields identical
/// output.
pub fn decode_stream_tx(
    info: &SubscribeUpdateTransactionInfo,
    block_time: Option<i64>,
    blacklist: &Blacklist,
) -> Result<ParsedTx, DecodeError> {
    let meta = info
        .meta
        .as_ref()
        .ok_or(DecodeError::MalformedTx("missing meta"))?;
    let transaction = info
        .transaction
        .as_ref()
        .ok_or(DecodeError::MalformedTx("missing transaction"))?;
    let message = transaction
        .message
        .as_ref()
        .ok_or(DecodeError::MalformedTx("missing message"))?;

    if meta.err.as_ref().is_some_and(|err| !err.err.is_empty()) {
        return Err(DecodeError::FailedTx);
    }

    let signature = if !info.signature.is_empty() {
        bs58::encode(&info.signature).into_string()
    } else {
        transaction
            .signatures
            .first()
            .filter(|sig| !sig.is_empty())
            .map(|sig| bs58::encode(sig).into_string())
            .ok_or(DecodeError::MalformedTx("missing signature"))?
    };

    // Address-lookup-table expansion must happen before any index-based
    // access: loaded writable first, then loaded readonly, after the
    // static keys.
    let account_keys = expand_account_keys(message, meta);
    if account_keys.is_empty() {
        return Err(DecodeError::MalformedTx("missing account keys"));
    }
    if meta.pre_balances.len() != meta.post_balances.len()
        || meta.pre_balances.len() != account_keys.len()
    {
        return Err(DecodeError::MalformedTx("balance length mismatch"));
    }

    let fee_payer = account_keys[0].clone();
    let invoked_program_ids = extract_program_ids(message, meta, &account_keys);
    let gross_sol_spent = gross_spent_sol(&meta.pre_balances, &meta.post_balances);

    let swap = if invoked_program_ids.contains(PUMP_FUN_PROGRAM) {
        match pump_swap_from_instructions(message, meta, &account_keys, blacklist, gross_sol_spent)?
        {
            Some(details) => Some(details),
            None => balance_diff_swap(meta, &fee_payer, blacklist, gross_sol_spent)?,
        }
    } else {
        balance_diff_swap(meta, &fee_payer, blacklist, gross_sol_spent)?
    };

    let token_post_balances = meta
        .post_token_balances
        .iter()
        .filter_map(|balance| {
            parse_proto_ui_amount(balance.ui_token_amount.as_ref()).map(|ui_amount| TokenBalance {
                owner: balance.owner.clone(),
                mint: balance.mint.clone(),
                ui_amount,
            })
        })
        .collect();

    Ok(ParsedTx {
        signature,
        block_time,
        fee_payer,
        account_keys,
        pre_balances: meta.pre_balances.clone(),
        post_balances: meta.post_balances.clone(),
        token_post_balances,
        log_messages: meta.log_messages.clone(),
        succeeded: true,
        invoked_program_ids,
        swap,
        platform_hint: None,
    })
}

fn expand_account_keys(message: &SolMessage, meta: &TransactionStatusMeta) -> Vec<String> {
    let mut keys: Vec<String> = message
        .account_keys
        .iter()
        .map(|raw| bs58::encode(raw).into_string())
        .collect();
    keys.extend(
        meta.loaded_writable_addresses
            .iter()
            .map(|raw| bs58::encode(raw).into_string()),
    );
    keys.extend(
        meta.loaded_readonly_addresses
            .iter()
            .map(|raw| bs58::encode(raw).into_string()),
    );
    keys
}

fn extract_program_ids(
    message: &SolMessage,
    meta: &TransactionStatusMeta,
    account_keys: &[String],
) -> BTreeSet<String> {
    let mut programs = BTreeSet::new();
    for instruction in &message.instructions {
        if let Some(program) = account_keys.get(instruction.program_id_index as usize) {
            programs.insert(program.clone());
        }
    }
    for group in &meta.inner_instructions {
        for instruction in &group.instructions {
            if let Some(program) = account_keys.get(instruction.program_id_index as usize) {
                programs.insert(program.clone());
            }
        }
    }
    for log in &meta.log_messages {
        if let Some(program) = program_id_from_invoke_log(log) {
            programs.insert(program);
        }
    }
    programs
}

fn program_id_from_invoke_log(log: &str) -> Option<String> {
    let mut parts = log.split_whitespace();
    if parts.next()? != "Program" {
        return None;
    }
    let program_id = parts.next()?;
    if !parts.next()?.starts_with("invoke") {
        return None;
    }
    Some(program_id.to_string())
}

fn gross_spent_sol(pre_balances: &[u64], post_balances: &[u64]) -> f64 {
    match (pre_balances.first(), post_balances.first()) {
        (Some(pre), Some(post)) => pre.saturating_sub(*post) as f64 / LAMPORTS_PER_SOL,
        _ => 0.0,
    }
}

/// Instruction-discriminator method: the pump.fun buy/sell layout in
/// outer instruction data, and the Anchor CPI trade event in inner
/// instructions. Most precise; tried before the balance diff.
fn pump_swap_from_instructions(
    message: &SolMessage,
    meta: &TransactionStatusMeta,
    account_keys: &[String],
    blacklist: &Blacklist,
    gross_sol_spent: f64,
) -> Result<Option<SwapDetails>, DecodeError> {
    let launchpad_accounts = launchpad_accounts_from_message(message, account_keys);

    for instruction in &message.instructions {
        if account_keys.get(instruction.program_id_index as usize).map(String::as_str)
            != Some(PUMP_FUN_PROGRAM)
        {
            continue;
        }
        if let Some(parsed) = parse_trade_payload(&instruction.data, 8) {
            return finish_pump_swap(parsed, blacklist, gross_sol_spent, &launchpad_accounts);
        }
    }

    for group in &meta.inner_instructions {
        for instruction in &group.instructions {
            let data = &instruction.data;
            if data.len() >= TRADE_EVENT_MIN_LEN
                && data[..8] == ANCHOR_EVENT_TAG
                && data[8..16] == TRADE_EVENT_DISCRIMINATOR
            {
                if let Some(parsed) = parse_trade_event_body(&data[16..]) {
                    return finish_pump_swap(
                        parsed,
                        blacklist,
                        gross_sol_spent,
                        &launchpad_accounts,
                    );
                }
            }
            if account_keys.get(instruction.program_id_index as usize).map(String::as_str)
                == Some(PUMP_FUN_PROGRAM)
            {
                if let Some(parsed) = parse_trade_payload(data, 8) {
                    return finish_pump_swap(
                        parsed,
                        blacklist,
                        gross_sol_spent,
                        &launchpad_accounts,
                    );
                }
            }
        }
    }

    Ok(None)
}

struct TradePayload {
    mint: String,
    sol_amount: f64,
    token_amount: f64,
    is_buy: bool,
}

fn parse_trade_payload(data: &[u8], discriminator_len: usize) -> Option<TradePayload> {
    if data.len() < discriminator_len + 49 {
        return None;
    }
    let discriminator = &data[..8];
    if *discriminator != PUMP_FUN_BUY_DISCRIMINATOR && *discriminator != PUMP_FUN_SELL_DISCRIMINATOR
    {
        return None;
    }
    parse_trade_event_body(&data[discriminator_len..])
}

/// Trade event body: mint (32), solAmount u64, tokenAmount u64, isBuy u8,
/// then user/timestamp/reserves which we do not need.
fn parse_trade_event_body(body: &[u8]) -> Option<TradePayload> {
    if body.len() < 49 {
        return None;
    }
    let mint = bs58::encode(&body[..32]).into_string();
    let sol_raw = u64::from_le_bytes(body[32..40].try_into().ok()?);
    let token_raw = u64::from_le_bytes(body[40..48].try_into().ok()?);
    let is_buy = body[48] != 0;
    Some(TradePayload {
        mint,
        sol_amount: sol_raw as f64 / LAMPORTS_PER_SOL,
        token_amount: token_raw as f64 / PUMP_TOKEN_DECIMALS,
        is_buy,
    })
}

fn finish_pump_swap(
    payload: TradePayload,
    blacklist: &Blacklist,
    gross_sol_spent: f64,
    launchpad_accounts: &Option<LaunchpadAccounts>,
) -> Result<Option<SwapDetails>, DecodeError> {
    if blacklist.contains(&payload.mint) {
        return Err(DecodeError::Uninteresting);
    }
    Ok(Some(SwapDetails {
        token_mint: payload.mint,
        token_amount: payload.token_amount,
        is_buy: payload.is_buy,
        gross_sol_spent,
        event_sol_amount: Some(payload.sol_amount),
        launchpad_accounts: launchpad_accounts.clone(),
    }))
}

/// The whale's own pump.fun instruction (direct or routed) passes the
/// same sixteen accounts in the same order: global at [0] and the
/// program at [11] identify it; [1] is the fee recipient, [4] the
/// associated bonding curve, [8] the token program, [9] the creator
/// vault.
fn launchpad_accounts_from_message(
    message: &SolMessage,
    account_keys: &[String],
) -> Option<LaunchpadAccounts> {
    for instruction in &message.instructions {
        let accounts = &instruction.accounts;
        if accounts.len() < 16 {
            continue;
        }
        let key_at = |slot: usize| -> Option<&String> {
            accounts
                .get(slot)
                .and_then(|index| account_keys.get(*index as usize))
        };
        if key_at(0).map(String::as_str) != Some(PUMP_GLOBAL_ACCOUNT)
            || key_at(11).map(String::as_str) != Some(PUMP_FUN_PROGRAM)
        {
            continue;
        }
        return Some(LaunchpadAccounts {
            fee_recipient: key_at(1).cloned().unwrap_or_default(),
            associated_bonding_curve: key_at(4).cloned().unwrap_or_default(),
            token_program: key_at(8).cloned().unwrap_or_default(),
            creator_vault: key_at(9).cloned().unwrap_or_default(),
        });
    }
    None
}

/// Universal balance-diff method: works for any DEX without decoding
/// instruction data. The received token is the fee payer's largest
/// non-SOL balance increase; the direction must agree with the fee
/// payer's SOL flow or the transaction is treated as no swap.
fn balance_diff_swap(
    meta: &TransactionStatusMeta,
    fee_payer: &str,
    blacklist: &Blacklist,
    gross_sol_spent: f64,
) -> Result<Option<SwapDetails>, DecodeError> {
    if meta.pre_balances.is_empty() || meta.post_balances.is_empty() {
        return Ok(None);
    }

    // SOL flow for the fee payer, fee added back so a pure fee debit does
    // not read as a spend.
    let sol_change_lamports = meta.post_balances[0] as i128 - meta.pre_balances[0] as i128
        + meta.fee as i128;

    let mut pre_tokens: HashMap<&str, f64> = HashMap::new();
    for balance in &meta.pre_token_balances {
        if balance.owner == fee_payer {
            if let Some(amount) = parse_proto_ui_amount(balance.ui_token_amount.as_ref()) {
                pre_tokens.insert(balance.mint.as_str(), amount);
            }
        }
    }
    let mut post_tokens: HashMap<&str, f64> = HashMap::new();
    for balance in &meta.post_token_balances {
        if balance.owner == fee_payer {
            if let Some(amount) = parse_proto_ui_amount(balance.ui_token_amount.as_ref()) {
                post_tokens.insert(balance.mint.as_str(), amount);
            }
        }
    }

    let mut best_mint: Option<&str> = None;
    let mut best_diff = 0.0f64;
    let mut skipped_blacklisted = false;
    let mints: BTreeSet<&str> = pre_tokens.keys().chain(post_tokens.keys()).copied().collect();
    for mint in mints {
        if mint == SOL_MINT {
            continue;
        }
        if blacklist.contains(mint) {
            skipped_blacklisted = true;
            continue;
        }
        let diff = post_tokens.get(mint).copied().unwrap_or(0.0)
            - pre_tokens.get(mint).copied().unwrap_or(0.0);
        if diff.abs() > best_diff.abs() {
            best_diff = diff;
            best_mint = Some(mint);
        }
    }

    let Some(mint) = best_mint else {
        if skipped_blacklisted {
            return Err(DecodeError::Uninteresting);
        }
        return Ok(None);
    };
    if best_diff == 0.0 {
        return Ok(None);
    }

    let is_buy = best_diff > 0.0;
    // Token up with SOL up (or token down with SOL down) is not a
    // standard swap shape; drop rather than misclassify.
    if is_buy && sol_change_lamports > 0 {
        return Ok(None);
    }
    if !is_buy && sol_change_lamports < 0 {
        return Ok(None);
    }

    Ok(Some(SwapDetails {
        token_mint: mint.to_string(),
        token_amount: best_diff.abs(),
        is_buy,
        gross_sol_spent,
        event_sol_amount: None,
        launchpad_accounts: None,
    }))
}

fn parse_proto_ui_amount(ui_amount: Option<&UiTokenAmount>) -> Option<f64> {
    let ui_amount = ui_amount?;
    if !ui_amount.ui_amount_string.is_empty() {
        return ui_amount.ui_amount_string.parse::<f64>().ok();
    }
    if !ui_amount.amount.is_empty() {
        let raw = ui_amount.amount.parse::<f64>().ok()?;
        return Some(raw / 10f64.powi(ui_amount.decimals as i32));
    }
    if ui_amount.ui_amount.is_finite() {
        return Some(ui_amount.ui_amount);
    }
    None
}

/// Parse a `getTransaction` jsonParsed response into the same neutral
/// shape the stream decoder produces. Used by the fallback fetch path.
pub fn parse_rpc_json(result: &Value, blacklist: &Blacklist) -> Result<ParsedTx, DecodeError> {
    let meta = result
        .get("meta")
        .filter(|value| !value.is_null())
        .ok_or(DecodeError::MalformedTx("missing meta"))?;
    if meta.get("err").is_some_and(|err| !err.is_null()) {
        return Err(DecodeError::FailedTx);
    }

    let signature = result
        .pointer("/transaction/signatures/0")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or(DecodeError::MalformedTx("missing signature"))?;

    let account_keys = json_account_keys(result);
    if account_keys.is_empty() {
        return Err(DecodeError::MalformedTx("missing account keys"));
    }
    let pre_balances = json_u64_array(meta.get("preBalances"));
    let post_balances = json_u64_array(meta.get("postBalances"));
    if pre_balances.len() != post_balances.len() || pre_balances.len() != account_keys.len() {
        return Err(DecodeError::MalformedTx("balance length mismatch"));
    }

    let fee_payer = account_keys[0].clone();
    let log_messages: Vec<String> = meta
        .get("logMessages")
        .and_then(Value::as_array)
        .map(|logs| {
            logs.iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut invoked_program_ids = BTreeSet::new();
    if let Some(instructions) = result
        .pointer("/transaction/message/instructions")
        .and_then(Value::as_array)
    {
        for instruction in instructions {
            if let Some(program) = instruction.get("programId").and_then(Value::as_str) {
                invoked_program_ids.insert(program.to_string());
            }
        }
    }
    if let Some(groups) = meta.get("innerInstructions").and_then(Value::as_array) {
        for group in groups {
            if let Some(instructions) = group.get("instructions").and_then(Value::as_array) {
                for instruction in instructions {
                    if let Some(program) = instruction.get("programId").and_then(Value::as_str) {
                        invoked_program_ids.insert(program.to_string());
                    }
                }
            }
        }
    }
    for log in &log_messages {
        if let Some(program) = program_id_from_invoke_log(log) {
            invoked_program_ids.insert(program);
        }
    }

    let gross_sol_spent = gross_spent_sol(&pre_balances, &post_balances);
    let fee = meta.get("fee").and_then(Value::as_u64).unwrap_or(0);
    let swap = json_balance_diff_swap(meta, &fee_payer, blacklist, gross_sol_spent, fee)?;

    let token_post_balances = meta
        .get("postTokenBalances")
        .and_then(Value::as_array)
        .map(|balances| {
            balances
                .iter()
                .filter_map(|balance| {
                    let owner = balance.get("owner").and_then(Value::as_str)?;
                    let mint = balance.get("mint").and_then(Value::as_str)?;
                    let ui_amount = parse_json_ui_amount(balance.get("uiTokenAmount"))?;
                    Some(TokenBalance {
                        owner: owner.to_string(),
                        mint: mint.to_string(),
                        ui_amount,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ParsedTx {
        signature,
        block_time: result.get("blockTime").and_then(Value::as_i64),
        fee_payer,
        account_keys,
        pre_balances,
        post_balances,
        token_post_balances,
        log_messages,
        succeeded: true,
        invoked_program_ids,
        swap,
        platform_hint: None,
    })
}

fn json_account_keys(result: &Value) -> Vec<String> {
    result
        .pointer("/transaction/message/accountKeys")
        .and_then(Value::as_array)
        .map(|keys| {
            keys.iter()
                .filter_map(|item| {
                    if let Some(pubkey) = item.as_str() {
                        return Some(pubkey.to_string());
                    }
                    item.get("pubkey")
                        .and_then(Value::as_str)
                        .map(ToString::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn json_u64_array(value: Option<&Value>) -> Vec<u64> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_u64).collect())
        .unwrap_or_default()
}

fn parse_json_ui_amount(ui_amount: Option<&Value>) -> Option<f64> {
    let ui_amount = ui_amount?;
    if let Some(amount) = ui_amount.get("uiAmountString").and_then(Value::as_str) {
        return amount.parse::<f64>().ok();
    }
    if let Some(amount) = ui_amount.get("uiAmount").and_then(Value::as_f64) {
        return Some(amount);
    }
    let raw = ui_amount.get("amount").and_then(Value::as_str)?;
    let decimals = ui_amount.get("decimals").and_then(Value::as_u64)?;
    if decimals > 18 {
        return None;
    }
    Some(raw.parse::<f64>().ok()? / 10f64.powi(decimals as i32))
}

fn json_balance_diff_swap(
    meta: &Value,
    fee_payer: &str,
    blacklist: &Blacklist,
    gross_sol_spent: f64,
    fee: u64,
) -> Result<Option<SwapDetails>, DecodeError> {
    let pre_balances = json_u64_array(meta.get("preBalances"));
    let post_balances = json_u64_array(meta.get("postBalances"));
    if pre_balances.is_empty() || post_balances.is_empty() {
        return Ok(None);
    }
    let sol_change_lamports =
        post_balances[0] as i128 - pre_balances[0] as i128 + fee as i128;

    let collect = |key: &str| -> HashMap<String, f64> {
        meta.get(key)
            .and_then(Value::as_array)
            .map(|balances| {
                balances
                    .iter()
                    .filter_map(|balance| {
                        if balance.get("owner").and_then(Value::as_str) != Some(fee_payer) {
                            return None;
                        }
                        let mint = balance.get("mint").and_then(Value::as_str)?;
                        let amount = parse_json_ui_amount(balance.get("uiTokenAmount"))?;
                        Some((mint.to_string(), amount))
                    })
                    .collect()
            })
            .unwrap_or_default()
    };
    let pre_tokens = collect("preTokenBalances");
    let post_tokens = collect("postTokenBalances");

    let mut best_mint: Option<String> = None;
    let mut best_diff = 0.0f64;
    let mut skipped_blacklisted = false;
    let mints: BTreeSet<&String> = pre_tokens.keys().chain(post_tokens.keys()).collect();
    for mint in mints {
        if mint == SOL_MINT {
            continue;
        }
        if blacklist.contains(mint) {
            skipped_blacklisted = true;
            continue;
        }
        let diff = post_tokens.get(mint).copied().unwrap_or(0.0)
            - pre_tokens.get(mint).copied().unwrap_or(0.0);
        if diff.abs() > best_diff.abs() {
            best_diff = diff;
            best_mint = Some(mint.clone());
        }
    }

    let Some(mint) = best_mint else {
        if skipped_blacklisted {
            return Err(DecodeError::Uninteresting);
        }
        return Ok(None);
    };
    if best_diff == 0.0 {
        return Ok(None);
    }
    let is_buy = best_diff > 0.0;
    if is_buy && sol_change_lamports > 0 {
        return Ok(None);
    }
    if !is_buy && sol_change_lamports < 0 {
        return Ok(None);
    }

    Ok(Some(SwapDetails {
        token_mint: mint,
        token_amount: best_diff.abs(),
        is_buy,
        gross_sol_spent,
        event_sol_amount: None,
        launchpad_accounts: None,
    }))
}

/// Normalize a webhook-delivered enriched transaction into the neutral
/// shape. Single-key balance vectors keep the ParsedTx length invariant
/// while reproducing the spent figure through the fee payer's slot.
pub fn normalize_enriched(tx: &EnrichedTx, blacklist: &Blacklist) -> Result<ParsedTx, DecodeError> {
    if tx.signature.trim().is_empty() || tx.fee_payer.trim().is_empty() {
        return Err(DecodeError::MalformedTx("missing signature or fee payer"));
    }
    if !tx.tx_type.eq_ignore_ascii_case("SWAP") {
        return Err(DecodeError::Uninteresting);
    }

    let mut spent_lamports: u64 = 0;
    for transfer in &tx.native_transfers {
        if transfer.from_user_account == tx.fee_payer {
            spent_lamports = spent_lamports.saturating_add(transfer.amount);
        }
    }

    let mut received: Option<(String, f64)> = None;
    let mut skipped_blacklisted = false;
    let mut token_post_balances = Vec::new();
    for transfer in &tx.token_transfers {
        if transfer.mint == SOL_MINT {
            if transfer.from_user_account == tx.fee_payer {
                spent_lamports = spent_lamports
                    .saturating_add((transfer.token_amount * LAMPORTS_PER_SOL) as u64);
            }
            continue;
        }
        if transfer.to_user_account != tx.fee_payer {
            continue;
        }
        if blacklist.contains(&transfer.mint) {
            skipped_blacklisted = true;
            continue;
        }
        received = Some((transfer.mint.clone(), transfer.token_amount));
        token_post_balances.push(TokenBalance {
            owner: tx.fee_payer.clone(),
            mint: transfer.mint.clone(),
            ui_amount: transfer.token_amount,
        });
    }

    if received.is_none() && skipped_blacklisted {
        return Err(DecodeError::Uninteresting);
    }

    let gross_sol_spent = spent_lamports as f64 / LAMPORTS_PER_SOL;
    let swap = received.map(|(token_mint, token_amount)| SwapDetails {
        token_mint,
        token_amount,
        is_buy: true,
        gross_sol_spent,
        event_sol_amount: None,
        launchpad_accounts: None,
    });

    Ok(ParsedTx {
        signature: tx.signature.clone(),
        block_time: tx.timestamp,
        fee_payer: tx.fee_payer.clone(),
        account_keys: vec![tx.fee_payer.clone()],
        pre_balances: vec![spent_lamports],
        post_balances: vec![0],
        token_post_balances,
        log_messages: Vec::new(),
        succeeded: true,
        invoked_program_ids: BTreeSet::new(),
        swap,
        platform_hint: tx.source.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use whalecopy_core_types::{NativeTransfer, TokenTransfer};
    use yellowstone_grpc_proto::prelude::{
        InnerInstruction, InnerInstructions, Transaction, TransactionError,
        TokenBalance as ProtoTokenBalance,
    };

    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn raw_key(tag: u8) -> Vec<u8> {
        let mut key = vec![0u8; 32];
        key[0] = tag;
        key[31] = tag;
        key
    }

    fn b58(tag: u8) -> String {
        bs58::encode(raw_key(tag)).into_string()
    }

    fn ui_amount(value: f64) -> UiTokenAmount {
        UiTokenAmount {
            ui_amount: value,
            decimals: 6,
            amount: String::new(),
            ui_amount_string: format!("{value}"),
        }
    }

    fn token_balance(owner: &str, mint: &str, amount: f64) -> ProtoTokenBalance {
        ProtoTokenBalance {
            mint: mint.to_string(),
            ui_token_amount: Some(ui_amount(amount)),
            owner: owner.to_string(),
            ..ProtoTokenBalance::default()
        }
    }

    struct StreamTxBuilder {
        account_keys: Vec<Vec<u8>>,
        loaded_writable: Vec<Vec<u8>>,
        pre_balances: Vec<u64>,
        post_balances: Vec<u64>,
        fee: u64,
        pre_token_balances: Vec<ProtoTokenBalance>,
        post_token_balances: Vec<ProtoTokenBalance>,
        log_messages: Vec<String>,
        instructions: Vec<CompiledInstruction>,
        inner_instructions: Vec<InnerInstructions>,
        err: Option<TransactionError>,
    }

    impl StreamTxBuilder {
        fn new() -> Self {
            Self {
                account_keys: vec![raw_key(1)],
                loaded_writable: Vec::new(),
                pre_balances: vec![2_000_000_000],
                post_balances: vec![1_495_000_000],
                fee: 5_000,
                pre_token_balances: Vec::new(),
                post_token_balances: Vec::new(),
                log_messages: Vec::new(),
                instructions: Vec::new(),
                inner_instructions: Vec::new(),
                err: None,
            }
        }

        fn build(self) -> SubscribeUpdateTransactionInfo {
            SubscribeUpdateTransactionInfo {
                signature: vec![7u8; 64],
                is_vote: false,
                transaction: Some(Transaction {
                    signatures: vec![vec![7u8; 64]],
                    message: Some(SolMessage {
                        account_keys: self.account_keys,
                        recent_blockhash: vec![0u8; 32],
                        instructions: self.instructions,
                        ..SolMessage::default()
                    }),
                }),
                meta: Some(TransactionStatusMeta {
                    err: self.err,
                    fee: self.fee,
                    pre_balances: self.pre_balances,
                    post_balances: self.post_balances,
                    inner_instructions: self.inner_instructions,
                    log_messages: self.log_messages,
                    pre_token_balances: self.pre_token_balances,
                    post_token_balances: self.post_token_balances,
                    loaded_writable_addresses: self.loaded_writable,
                    ..TransactionStatusMeta::default()
                }),
                index: 0,
            }
        }
    }

    #[test]
    fn balance_diff_buy_is_decoded_with_gross_amount() {
        let fee_payer = b58(1);
        let mint = b58(9);
        let mut builder = StreamTxBuilder::new();
        builder.post_token_balances = vec![token_balance(&fee_payer, &mint, 1_000.0)];
        let parsed =
            decode_stream_tx(&builder.build(), Some(1_700_000_000), &Blacklist::default())
                .expect("decode");

        let swap = parsed.swap.expect("swap detected");
        assert_eq!(swap.token_mint, mint);
        assert!(swap.is_buy);
        assert!((swap.token_amount - 1_000.0).abs() < 1e-9);
        // Gross figure includes the fee: 2.0 - 1.495 = 0.505 SOL.
        assert!((swap.gross_sol_spent - 0.505).abs() < 1e-9);
        assert_eq!(parsed.block_time, Some(1_700_000_000));
        assert_eq!(parsed.fee_payer, fee_payer);
    }

    #[test]
    fn blacklisted_received_mint_short_circuits_as_uninteresting() {
        let fee_payer = b58(1);
        let mut builder = StreamTxBuilder::new();
        builder.post_token_balances = vec![token_balance(&fee_payer, USDC, 500.0)];
        assert_eq!(
            decode_stream_tx(&builder.build(), None, &Blacklist::default()),
            Err(DecodeError::Uninteresting)
        );
    }

    #[test]
    fn failed_transaction_is_dropped_as_failed() {
        let mut builder = StreamTxBuilder::new();
        builder.err = Some(TransactionError {
            err: vec![1, 2, 3],
        });
        assert_eq!(
            decode_stream_tx(&builder.build(), None, &Blacklist::default()),
            Err(DecodeError::FailedTx)
        );
    }

    #[test]
    fn balance_length_mismatch_is_malformed() {
        let mut builder = StreamTxBuilder::new();
        builder.post_balances = vec![1_000, 2_000];
        assert!(matches!(
            decode_stream_tx(&builder.build(), None, &Blacklist::default()),
            Err(DecodeError::MalformedTx(_))
        ));
    }

    #[test]
    fn lookup_table_addresses_extend_account_keys_in_order() {
        let fee_payer = b58(1);
        let loaded = b58(5);
        let mut builder = StreamTxBuilder::new();
        builder.loaded_writable = vec![raw_key(5)];
        builder.pre_balances = vec![2_000_000_000, 10];
        builder.post_balances = vec![1_495_000_000, 10];
        // Program index 1 points into the loaded-address region.
        builder.instructions = vec![CompiledInstruction {
            program_id_index: 1,
            accounts: vec![],
            data: vec![],
        }];
        let parsed =
            decode_stream_tx(&builder.build(), None, &Blacklist::default()).expect("decode");
        assert_eq!(parsed.account_keys, vec![fee_payer, loaded.clone()]);
        assert!(parsed.invoked_program_ids.contains(&loaded));
    }

    #[test]
    fn ambiguous_token_up_sol_up_is_no_swap() {
        let fee_payer = b58(1);
        let mint = b58(9);
        let mut builder = StreamTxBuilder::new();
        // Fee payer gained SOL beyond the fee refund and gained tokens.
        builder.pre_balances = vec![1_000_000_000];
        builder.post_balances = vec![1_600_000_000];
        builder.post_token_balances = vec![token_balance(&fee_payer, &mint, 42.0)];
        let parsed =
            decode_stream_tx(&builder.build(), None, &Blacklist::default()).expect("decode");
        assert!(parsed.swap.is_none());
    }

    #[test]
    fn pump_discriminator_instruction_wins_over_balance_diff() {
        let fee_payer = raw_key(1);
        let pump_program = bs58::decode(PUMP_FUN_PROGRAM).into_vec().expect("pump key");
        let mint_raw = raw_key(9);
        let mint = bs58::encode(&mint_raw).into_string();

        let mut data = Vec::new();
        data.extend_from_slice(&PUMP_FUN_BUY_DISCRIMINATOR);
        data.extend_from_slice(&mint_raw);
        data.extend_from_slice(&600_000_000u64.to_le_bytes()); // 0.6 SOL event amount
        data.extend_from_slice(&2_000_000_000u64.to_le_bytes()); // 2000 tokens at 6 decimals
        data.push(1); // is_buy

        let mut builder = StreamTxBuilder::new();
        builder.account_keys = vec![fee_payer, pump_program];
        builder.pre_balances = vec![2_000_000_000, 0];
        builder.post_balances = vec![1_400_000_000, 0];
        builder.instructions = vec![CompiledInstruction {
            program_id_index: 1,
            accounts: vec![],
            data,
        }];
        builder.log_messages = vec![format!("Program {PUMP_FUN_PROGRAM} invoke [1]")];

        let parsed =
            decode_stream_tx(&builder.build(), None, &Blacklist::default()).expect("decode");
        let swap = parsed.swap.expect("discriminator swap");
        assert_eq!(swap.token_mint, mint);
        assert!(swap.is_buy);
        assert!((swap.token_amount - 2_000.0).abs() < 1e-9);
        assert!((swap.event_sol_amount.expect("event amount") - 0.6).abs() < 1e-9);
        assert!((swap.gross_sol_spent - 0.6).abs() < 1e-9);
    }

    #[test]
    fn anchor_cpi_trade_event_is_decoded_from_inner_instructions() {
        let fee_payer = raw_key(1);
        let pump_program = bs58::decode(PUMP_FUN_PROGRAM).into_vec().expect("pump key");
        let mint_raw = raw_key(9);
        let mint = bs58::encode(&mint_raw).into_string();

        let mut data = Vec::new();
        data.extend_from_slice(&ANCHOR_EVENT_TAG);
        data.extend_from_slice(&TRADE_EVENT_DISCRIMINATOR);
        data.extend_from_slice(&mint_raw);
        data.extend_from_slice(&500_000_000u64.to_le_bytes());
        data.extend_from_slice(&1_500_000_000u64.to_le_bytes());
        data.push(1);
        data.extend_from_slice(&raw_key(2)); // user
        data.extend_from_slice(&1_700_000_000i64.to_le_bytes()); // timestamp
        data.extend_from_slice(&10u64.to_le_bytes()); // reserves
        data.extend_from_slice(&20u64.to_le_bytes());

        let mut builder = StreamTxBuilder::new();
        builder.account_keys = vec![fee_payer, pump_program];
        builder.pre_balances = vec![2_000_000_000, 0];
        builder.post_balances = vec![1_495_000_000, 0];
        builder.log_messages = vec![format!("Program {PUMP_FUN_PROGRAM} invoke [2]")];
        builder.inner_instructions = vec![InnerInstructions {
            index: 0,
            instructions: vec![InnerInstruction {
                program_id_index: 1,
                data,
                ..InnerInstruction::default()
            }],
        }];

        let parsed =
            decode_stream_tx(&builder.build(), None, &Blacklist::default()).expect("decode");
        let swap = parsed.swap.expect("cpi swap");
        assert_eq!(swap.token_mint, mint);
        assert!((swap.token_amount - 1_500.0).abs() < 1e-9);
        assert!((swap.event_sol_amount.expect("event amount") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn decoder_is_deterministic_for_identical_input() {
        let fee_payer = b58(1);
        let mint = b58(9);
        let mut builder = StreamTxBuilder::new();
        builder.post_token_balances = vec![token_balance(&fee_payer, &mint, 123.0)];
        builder.log_messages = vec!["Program log: Instruction: Buy".to_string()];
        let info = builder.build();

        let first = decode_stream_tx(&info, Some(42), &Blacklist::default()).expect("first");
        let second = decode_stream_tx(&info, Some(42), &Blacklist::default()).expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn enriched_swap_normalizes_to_parsed_tx() {
        let tx = EnrichedTx {
            signature: "sig-wh".to_string(),
            timestamp: Some(1_700_000_100),
            tx_type: "SWAP".to_string(),
            fee_payer: "WalletA".to_string(),
            native_transfers: vec![NativeTransfer {
                from_user_account: "WalletA".to_string(),
                to_user_account: "Pool".to_string(),
                amount: 500_000_000,
            }],
            token_transfers: vec![TokenTransfer {
                from_user_account: "Pool".to_string(),
                to_user_account: "WalletA".to_string(),
                mint: "MintX".to_string(),
                token_amount: 1_000.0,
            }],
            source: Some("PUMP_FUN".to_string()),
        };
        let parsed = normalize_enriched(&tx, &Blacklist::default()).expect("normalize");
        assert_eq!(parsed.account_keys.len(), 1);
        assert_eq!(parsed.pre_balances.len(), parsed.post_balances.len());
        assert!((parsed.gross_sol_spent() - 0.5).abs() < 1e-9);
        let swap = parsed.swap.expect("swap");
        assert!(swap.is_buy);
        assert!((swap.gross_sol_spent - 0.5).abs() < 1e-9);
        assert_eq!(parsed.platform_hint.as_deref(), Some("PUMP_FUN"));
    }

    #[test]
    fn enriched_non_swap_type_is_uninteresting() {
        let tx = EnrichedTx {
            signature: "sig".to_string(),
            fee_payer: "WalletA".to_string(),
            tx_type: "TRANSFER".to_string(),
            ..EnrichedTx::default()
        };
        assert_eq!(
            normalize_enriched(&tx, &Blacklist::default()),
            Err(DecodeError::Uninteresting)
        );
    }

    #[test]
    fn enriched_usdc_receipt_is_uninteresting() {
        let tx = EnrichedTx {
            signature: "sig".to_string(),
            timestamp: None,
            tx_type: "SWAP".to_string(),
            fee_payer: "WalletA".to_string(),
            native_transfers: vec![],
            token_transfers: vec![TokenTransfer {
                from_user_account: "Pool".to_string(),
                to_user_account: "WalletA".to_string(),
                mint: USDC.to_string(),
                token_amount: 100.0,
            }],
            source: None,
        };
        assert_eq!(
            normalize_enriched(&tx, &Blacklist::default()),
            Err(DecodeError::Uninteresting)
        );
    }

    #[test]
    fn rpc_json_parse_produces_swap_and_program_ids() {
        let result = serde_json::json!({
            "blockTime": 1_700_000_000i64,
            "slot": 1000,
            "transaction": {
                "signatures": ["sig-json"],
                "message": {
                    "accountKeys": [
                        {"pubkey": "WalletA", "signer": true},
                        {"pubkey": PUMP_FUN_PROGRAM, "signer": false}
                    ],
                    "instructions": [
                        {"programId": PUMP_FUN_PROGRAM}
                    ]
                }
            },
            "meta": {
                "err": null,
                "fee": 5000,
                "preBalances": [2_000_000_000u64, 0],
                "postBalances": [1_495_000_000u64, 0],
                "preTokenBalances": [],
                "postTokenBalances": [
                    {"owner": "WalletA", "mint": "MintX", "uiTokenAmount": {"uiAmountString": "1000", "decimals": 6}}
                ],
                "logMessages": ["Program log: Instruction: Buy"]
            }
        });
        let parsed = parse_rpc_json(&result, &Blacklist::default()).expect("parse json");
        assert_eq!(parsed.signature, "sig-json");
        assert_eq!(parsed.block_time, Some(1_700_000_000));
        assert!(parsed.invoked_program_ids.contains(PUMP_FUN_PROGRAM));
        let swap = parsed.swap.expect("swap");
        assert_eq!(swap.token_mint, "MintX");
        assert!(swap.is_buy);
    }
}
