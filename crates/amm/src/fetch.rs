//! Read-State Aggregation
//!
//! Maintains an eventually-consistent view of the chain state the rest of
//! the engine needs: the factory's pair list, per-pair reserves, token
//! metadata, and per-owner balances and allowances. Each family refreshes
//! on its own cadence.
//!
//! Consumers only ever receive clones of cached values and never write
//! back; all cache mutation happens in the aggregator's own refresh
//! methods. A failed individual read keeps the last good value visible
//! until a newer read supersedes it (stale-while-revalidate).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use evm_node_client::ChainClient;
use minidex_core::{Address, Amount, ContractsConfig, RefreshConfig, DEFAULT_DECIMALS};

use crate::state::{PairInfo, PairSnapshot, Reserves, TokenMeta};

/// Aggregated read-state over the factory, pairs, and tokens.
pub struct StateAggregator {
    chain: Arc<dyn ChainClient>,
    contracts: ContractsConfig,
    refresh: RefreshConfig,

    pairs: RwLock<Vec<PairInfo>>,
    reserves: RwLock<HashMap<Address, Reserves>>,
    /// Metadata is immutable on-chain: cached indefinitely after the first
    /// full success.
    metadata: RwLock<HashMap<Address, TokenMeta>>,
    /// (owner, token) -> balance
    balances: RwLock<HashMap<(Address, Address), Amount>>,
    /// (owner, token) -> allowance for the router
    allowances: RwLock<HashMap<(Address, Address), Amount>>,
    /// (owner, token) entries refreshed on the balances cadence
    watched: RwLock<HashSet<(Address, Address)>>,
}

impl StateAggregator {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        contracts: ContractsConfig,
        refresh: RefreshConfig,
    ) -> Self {
        Self {
            chain,
            contracts,
            refresh,
            pairs: RwLock::new(Vec::new()),
            reserves: RwLock::new(HashMap::new()),
            metadata: RwLock::new(HashMap::new()),
            balances: RwLock::new(HashMap::new()),
            allowances: RwLock::new(HashMap::new()),
            watched: RwLock::new(HashSet::new()),
        }
    }

    /// The fixed allowance spender (the router).
    pub fn spender(&self) -> &Address {
        &self.contracts.router
    }

    /// Enumerate pairs from the factory: read the count, then each pair
    /// address by index, then each pair's tokens.
    ///
    /// Partial-failure policy: an entry whose reads fail is dropped from
    /// the result set; the enumeration itself never fails. Returns the
    /// number of pairs now known.
    pub async fn refresh_pairs(&self) -> usize {
        let count = match self.chain.pair_count().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Pair count read failed: {}", e);
                return self.pairs.read().await.len();
            }
        };

        // count is node-supplied; capacity grows with successful reads only
        let mut discovered = Vec::new();
        for index in 0..count {
            let address = match self.chain.pair_address(index).await {
                Ok(address) => address,
                Err(e) => {
                    tracing::warn!(index, "Pair address read failed: {}", e);
                    continue;
                }
            };
            let (token0, token1) = match self.chain.pair_tokens(&address).await {
                Ok(tokens) => tokens,
                Err(e) => {
                    tracing::warn!(pair = %address, "Pair token read failed: {}", e);
                    continue;
                }
            };
            discovered.push(PairInfo {
                address,
                token0,
                token1,
            });
        }

        let known = discovered.len();
        tracing::debug!("Enumerated {} of {} pairs", known, count);
        *self.pairs.write().await = discovered;
        known
    }

    /// Refresh one pair's reserves. On failure the previous snapshot stays
    /// visible and None is returned.
    pub async fn refresh_reserves(&self, pair: &Address) -> Option<Reserves> {
        match self.chain.reserves(pair).await {
            Ok((reserve0, reserve1)) => {
                let reserves = Reserves { reserve0, reserve1 };
                self.reserves.write().await.insert(pair.clone(), reserves);
                Some(reserves)
            }
            Err(e) => {
                tracing::warn!(pair = %pair, "Reserve read failed: {}", e);
                None
            }
        }
    }

    /// Refresh reserves for every known pair.
    pub async fn refresh_all_reserves(&self) {
        let pairs: Vec<Address> = self
            .pairs
            .read()
            .await
            .iter()
            .map(|p| p.address.clone())
            .collect();
        for pair in pairs {
            self.refresh_reserves(&pair).await;
        }
    }

    /// Token metadata, fetched once and cached indefinitely.
    ///
    /// When either read fails the result degrades to defaults (symbol "-",
    /// 18 decimals) and is NOT cached, so the next call retries.
    pub async fn token_meta(&self, token: &Address) -> TokenMeta {
        if let Some(meta) = self.metadata.read().await.get(token) {
            return meta.clone();
        }

        let symbol = self.chain.token_symbol(token).await;
        let decimals = self.chain.token_decimals(token).await;

        match (symbol, decimals) {
            (Ok(symbol), Ok(decimals)) => {
                let meta = TokenMeta {
                    address: token.clone(),
                    symbol,
                    decimals,
                };
                self.metadata
                    .write()
                    .await
                    .insert(token.clone(), meta.clone());
                meta
            }
            (symbol, decimals) => {
                tracing::warn!(token = %token, "Token metadata incomplete, using defaults");
                TokenMeta {
                    address: token.clone(),
                    symbol: symbol.unwrap_or_else(|_| "-".to_string()),
                    decimals: decimals.unwrap_or(DEFAULT_DECIMALS),
                }
            }
        }
    }

    /// Register an (owner, token) entry for balance/allowance polling and
    /// fetch it immediately.
    pub async fn watch(&self, owner: &Address, token: &Address) {
        self.watched
            .write()
            .await
            .insert((owner.clone(), token.clone()));
        self.refresh_balance(owner, token).await;
        self.refresh_allowance(owner, token).await;
    }

    /// Read-through balance refresh.
    pub async fn refresh_balance(&self, owner: &Address, token: &Address) -> Option<Amount> {
        match self.chain.balance_of(token, owner).await {
            Ok(balance) => {
                self.balances
                    .write()
                    .await
                    .insert((owner.clone(), token.clone()), balance);
                Some(balance)
            }
            Err(e) => {
                tracing::warn!(token = %token, "Balance read failed: {}", e);
                None
            }
        }
    }

    /// Read-through allowance refresh for the router spender.
    pub async fn refresh_allowance(&self, owner: &Address, token: &Address) -> Option<Amount> {
        match self
            .chain
            .allowance(token, owner, &self.contracts.router)
            .await
        {
            Ok(allowance) => {
                self.allowances
                    .write()
                    .await
                    .insert((owner.clone(), token.clone()), allowance);
                Some(allowance)
            }
            Err(e) => {
                tracing::warn!(token = %token, "Allowance read failed: {}", e);
                None
            }
        }
    }

    /// Refresh every watched (owner, token) entry.
    pub async fn refresh_accounts(&self) {
        let watched: Vec<(Address, Address)> =
            self.watched.read().await.iter().cloned().collect();
        for (owner, token) in watched {
            self.refresh_balance(&owner, &token).await;
            self.refresh_allowance(&owner, &token).await;
        }
    }

    // -----------------------------------------------------------------
    // Read-only views
    // -----------------------------------------------------------------

    pub async fn pairs(&self) -> Vec<PairInfo> {
        self.pairs.read().await.clone()
    }

    pub async fn reserves_of(&self, pair: &Address) -> Option<Reserves> {
        self.reserves.read().await.get(pair).copied()
    }

    pub async fn pair_snapshot(&self, pair: &Address) -> Option<PairSnapshot> {
        let info = self
            .pairs
            .read()
            .await
            .iter()
            .find(|p| &p.address == pair)
            .cloned()?;
        let reserves = self.reserves_of(pair).await;
        Some(PairSnapshot {
            pair: info,
            reserves,
        })
    }

    pub async fn balance_of(&self, owner: &Address, token: &Address) -> Option<Amount> {
        self.balances
            .read()
            .await
            .get(&(owner.clone(), token.clone()))
            .copied()
    }

    pub async fn allowance_of(&self, owner: &Address, token: &Address) -> Option<Amount> {
        self.allowances
            .read()
            .await
            .get(&(owner.clone(), token.clone()))
            .copied()
    }

    /// Targeted refresh after a completed action: the owner's balances and
    /// allowances for the touched tokens, plus all pool reserves.
    pub async fn refresh_after_action(&self, owner: &Address, tokens: &[Address]) {
        for token in tokens {
            self.refresh_balance(owner, token).await;
            self.refresh_allowance(owner, token).await;
        }
        self.refresh_all_reserves().await;
    }

    /// Drive the polling loop forever, with independent cadences for pair
    /// enumeration, reserves, and watched accounts. Spawn this on the
    /// runtime and abort the task to stop polling.
    pub async fn run(self: Arc<Self>) {
        let mut pairs_tick = tokio::time::interval(Duration::from_secs(self.refresh.pairs_secs));
        let mut reserves_tick =
            tokio::time::interval(Duration::from_secs(self.refresh.reserves_secs));
        let mut accounts_tick =
            tokio::time::interval(Duration::from_secs(self.refresh.balances_secs));

        loop {
            tokio::select! {
                _ = pairs_tick.tick() => {
                    self.refresh_pairs().await;
                }
                _ = reserves_tick.tick() => {
                    self.refresh_all_reserves().await;
                }
                _ = accounts_tick.tick() => {
                    self.refresh_accounts().await;
                }
            }
        }
    }
}
