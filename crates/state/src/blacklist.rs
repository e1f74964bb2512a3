use std::collections::HashSet;

// Token mints the pipeline must never emit a buy for: stables, SOL
// variants, wrapped majors, and infrastructure/governance tokens. The
// built-in set is hard-coded and cannot be subtracted from; user config
// may only add.

pub const STABLECOIN_MINTS: [&str; 16] = [
    // USDC (Circle)
    "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
    // USDT (Tether)
    "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB",
    // PYUSD (PayPal USD)
    "2b1kV6DkPAnxd5ixfnxCpjxmKwqjjaYmCZfHsFu24GXo",
    // USDH (Hubble)
    "USDH1SM1ojwWUga67PGrgFWUHibbjqMvuMaDkRJTgkX",
    // USDS (Sky)
    "USDSwr9ApdHk5bvJKMjzff41FfuX8bSxdKcR81vTwcA",
    // USD1
    "USD1ttGY1N17NEEHLmELoaybftRBUSErhqYiQzvEmuB",
    // DAI (Wormhole)
    "EjmyN6qEC1Tf1JxiG1ae7UTJhUxSwk1TCWNWqxWV4J6o",
    // USDT (Wormhole)
    "8qJSyQprMC57TWKaYEmetUR3UUiTP2M3hXdcvFhkZdmv",
    // USDC (Wormhole)
    "A9mUU4qviSctJVPJdBGMTd5mKb5aE1bcRoFV6ic1gFiV",
    // UXD
    "7kbnvuGBxxj8AG9qp8Scn56muWGaRaFqxg1FsRp3PaFT",
    // EURC (Circle)
    "HzwqbKZw8HxMN6bF2yFZNrht3c2iXXzpKcFu7uBEDKtr",
    // ISC
    "J9BcrQfX4p9D1bvLzRNCbMDv8f44a9LFdeqNE9Ip3KL",
    // FDUSD
    "Dn4noZ5jgGfkntzcQSUZ8czCreg32FeNj4VFpjjMxoYi",
    // ZUSD
    "AhhdRu5YZdjVkKR3wbnUDaymVQL2ucjMQ63sZ3LFHsch",
    // jUSD (Jupiter Perps)
    "JuprjznTrTSp2UFa3ZBUFgwdAmtZCq4MQCwysN55USD",
    // pyUSD variant
    "F3hW1kkYVXhMz9FRV8t3mEfwmLQygF7PtPSsofPCdmXR",
];

pub const SOL_VARIANT_MINTS: [&str; 25] = [
    // Wrapped SOL
    "So11111111111111111111111111111111111111112",
    // mSOL (Marinade)
    "mSoLzYCxHdYgdzU16g5QSh3i5K3z3KZK7ytfqcJm7So",
    // stSOL (Lido)
    "7dHbWXmci3dT8UFYWYZweBLXgycu7Y3iL6trKn1Y7ARj",
    // jitoSOL
    "J1toso1uCk3RLmjorhTtrVwY9HJ7X8V9yYac6Y7kGCPn",
    // bSOL (BlazeStake)
    "bSo13r4TkiE4KumL71LsHTPpL2euBYLFx6h9HP3piy1",
    // jupSOL
    "jupSoLaHXQiZZTSfEWMTRRgpnyFm8f6sZdosWBjx93v",
    // LST (Marginfi)
    "LSTxxxnJzKDFSLr4dUkPcmCf5VyryEqzPLz5j4bpxFp",
    // INF (Sanctum Infinity)
    "5oVNBeEEQvYi1cX3ir8Dx5n1P7pdxydbGF2X4TxVusJm",
    // compassSOL
    "Comp4ssDzXcLeu2MnLuGNNFC4cmLPMng8qWHPvzAMU1h",
    // bonkSOL
    "BonK1YhkXEGLZzwtcvRTip3gAL9nCeQD7ppZBLXhtTs",
    // dSOL (Drift)
    "Dso1bDeDjCQxTrWHqUUi63oBvV7Mdm6WaobLbQ7gnPQ",
    // hSOL (Helius)
    "he1iusmfkpAdwvxLNGV8Y1iSbj4rUy6yMhEA3fotn9A",
    // vSOL (Valo)
    "vSoLxydx6akxyMD9XEcPvGYNGq6Nn66oqVb3UkGkei7",
    // JSOL (JPool)
    "7Q2afV64in6N6SeZsAAB81TJzwpeLmGEsZ9T91dzbqTo",
    // edgeSOL
    "edge86g9cVz87xcpKpy3J77vbp4wYd9idEV562CCntt",
    // laineSOL
    "LAinEtNLgpmCP9Rvsf5Hn8W6EhNiKLZQv1oXJsXkOlQ",
    // pathSOL
    "pathdXw4He1Xk3eX84pDdDcoFhWd3XkSBJsEJpsSdSo",
    // hubSOL
    "HUBsveNpjo5pWqNkH57QzxjQASdTVXcSK7bVKTSZtcSX",
    // pumpkinSOL
    "pumpkinsEq8xENVZE6QgTS93EN4r9iKvNxNALS1ooyp",
    // picoSOL
    "picobAEvs6w7QEknPce34wAE4gknZA9v5tTonnmHYdX",
    // phaseSOL
    "phaseQLbhsFR4NHBZbcxr5qvLo7MLbv8a8AypEQUFPt",
    // powerSOL
    "PoWERanXGwKk4FzBFB7jxGaKRZq7WPJ1vcWE7SsbbA1",
    // cgntSOL (Cogent)
    "CgnTSoL3DgY9SFHxcLj6CgCgKKoTBr6tp4CPAEWy25DE",
    // strongSOL
    "strng7mqqc1MBJJV6vMzYbEqnwVGvKKGKedeCvtktWA",
    // lanternSOL
    "LnTRntk2kTfWEY6cVB8K9649pgJbt6dJLS1Ns1GZCWg",
];

pub const WRAPPED_BTC_MINTS: [&str; 4] = [
    // WBTC (Wormhole)
    "3NZ9JMVBmGAqocybic2c7LQCJScmgsAZ6vQqTDzcqmJh",
    // wBTC (Sollet, legacy)
    "9n4nbM75f5Ui33ZbPYXn59EwSgE8CGsHtAeTH5YFeJ9E",
    // cbBTC (Coinbase)
    "cbbtcf3aa214zXHbiAZQwf4122FBYbraNdFqgw4iMij",
    // tBTC (Threshold)
    "6DNSN2BJsaPFdBAy8hxQqCQDSYzNfemWW5v3CXLkm4Rj",
];

pub const WRAPPED_ETH_MINTS: [&str; 3] = [
    // WETH (Wormhole)
    "7vfCXTUXx5WJV5JADk17DUJ4ksgau7utNKj4b963voxs",
    // wETH (Sollet, legacy)
    "2FPyTwcZLUg1MDrwsyoP4D6s1tM6hAkTTpEhCqW5FCLR",
    // cbETH (Coinbase)
    "BRjpCHtyQLeSRW8rkz2P1zXW4bAixbkKbfAi9Mrp6beN",
];

pub const INFRASTRUCTURE_MINTS: [&str; 6] = [
    // JUP (Jupiter governance)
    "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN",
    // RAY (Raydium)
    "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R",
    // SRM (Serum, legacy)
    "SRMuApVNdxXokk5GT7XD5cUUgXMBCoAz2LHeuAoKWRt",
    // MNDE (Marinade governance)
    "MNDEFzGvMt87ueuHvVU9VcTqsAP5b3fTGPsHuuPA5ey",
    // ORCA
    "orcaEKTdK7LKz57vaAYr9QeNsVEPfiu6QeMU1kektZE",
    // JTO (Jito governance)
    "jtojtomepa8beP8AuQc6eXt5FriJwfFMwQx2v2f9mCL",
];

/// Every built-in mint across all categories.
pub fn built_in_mints() -> impl Iterator<Item = &'static str> {
    STABLECOIN_MINTS
        .iter()
        .chain(&SOL_VARIANT_MINTS)
        .chain(&WRAPPED_BTC_MINTS)
        .chain(&WRAPPED_ETH_MINTS)
        .chain(&INFRASTRUCTURE_MINTS)
        .copied()
}

pub const BUILT_IN_BLACKLIST_LEN: usize = STABLECOIN_MINTS.len()
    + SOL_VARIANT_MINTS.len()
    + WRAPPED_BTC_MINTS.len()
    + WRAPPED_ETH_MINTS.len()
    + INFRASTRUCTURE_MINTS.len();

#[derive(Debug, Clone)]
pub struct Blacklist {
    mints: HashSet<String>,
}

impl Default for Blacklist {
    fn default() -> Self {
        Self::with_extra(std::iter::empty::<String>())
    }
}

impl Blacklist {
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut mints: HashSet<String> = built_in_mints().map(ToString::to_string).collect();
        mints.extend(
            extra
                .into_iter()
                .map(Into::into)
                .map(|mint: String| mint.trim().to_string())
                .filter(|mint| !mint.is_empty()),
        );
        Self { mints }
    }

    pub fn contains(&self, mint: &str) -> bool {
        self.mints.contains(mint)
    }

    pub fn len(&self) -> usize {
        self.mints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mints.is_empty()
    }
}
