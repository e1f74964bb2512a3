use sha2::{Digest, Sha256};

pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const ASSOCIATED_TOKEN_PROGRAM_ID: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Deterministic program-derived-address capability. The pipeline treats
/// PDA math as a primitive: the resolver asks for addresses by seed
/// schedule, and any implementation must return the same address for the
/// same inputs on every run.
pub trait AddressDeriver: Send + Sync {
    /// Base58-encoded PDA for `seeds` under `program_id`, or `None` when
    /// an input fails to decode.
    fn find_program_address(&self, seeds: &[&[u8]], program_id: &str) -> Option<String>;

    /// Associated token account of `owner` for `mint`.
    fn associated_token_account(&self, owner: &str, mint: &str) -> Option<String> {
        let owner_raw = decode_key(owner)?;
        let mint_raw = decode_key(mint)?;
        let token_program_raw = decode_key(TOKEN_PROGRAM_ID)?;
        self.find_program_address(
            &[&owner_raw, &token_program_raw, &mint_raw],
            ASSOCIATED_TOKEN_PROGRAM_ID,
        )
    }
}

/// sha2-based derivation over the standard seed-hash schedule, walking
/// bump seeds downward from 255. Self-contained: the known launchpad seed
/// schedules all resolve at the first candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Deriver;

impl AddressDeriver for Sha256Deriver {
    fn find_program_address(&self, seeds: &[&[u8]], program_id: &str) -> Option<String> {
        let program_raw = decode_key(program_id)?;
        for bump in (0u8..=255).rev() {
            if let Some(address) = create_program_address(seeds, bump, &program_raw) {
                return Some(bs58::encode(address).into_string());
            }
        }
        None
    }
}

fn create_program_address(seeds: &[&[u8]], bump: u8, program_id: &[u8; 32]) -> Option<[u8; 32]> {
    let mut hasher = Sha256::new();
    for seed in seeds {
        if seed.len() > 32 {
            return None;
        }
        hasher.update(seed);
    }
    hasher.update([bump]);
    hasher.update(program_id);
    hasher.update(PDA_MARKER);
    let digest = hasher.finalize();
    let mut address = [0u8; 32];
    address.copy_from_slice(&digest);
    Some(address)
}

pub(crate) fn decode_key(value: &str) -> Option<[u8; 32]> {
    let raw = bs58::decode(value).into_vec().ok()?;
    raw.try_into().ok()
}
