//! Shared in-memory [`ChainClient`] double for aggregator and orchestrator
//! tests. All knobs are interior-mutable so a test can reshape chain state
//! mid-flight through a shared `Arc`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use evm_node_client::{ChainClient, ReadResult, TxResult};
use minidex_core::{Address, Amount, NodeError, TxError, TxHash};

pub(crate) fn addr(n: u8) -> Address {
    Address::parse(&format!("0x{:040x}", n)).unwrap()
}

type AllowanceKey = (Address, Address, Address); // (token, owner, spender)

pub(crate) struct MockChain {
    /// Per-index factory entries; Err models a failed `allPairs` read.
    pairs: Mutex<Vec<ReadResult<Address>>>,
    /// Reported factory pair count when set, regardless of the entry list.
    pair_count_override: Mutex<Option<u64>>,
    tokens: Mutex<HashMap<Address, (Address, Address)>>,
    reserves: Mutex<HashMap<Address, ReadResult<(Amount, Amount)>>>,
    symbols: Mutex<HashMap<Address, String>>,
    decimals: Mutex<HashMap<Address, u8>>,
    balances: Mutex<HashMap<(Address, Address), Amount>>, // (token, owner)
    allowances: Mutex<HashMap<AllowanceKey, Amount>>,
    /// Allowances applied when a confirmation lands, modelling the on-chain
    /// effect of an approval.
    pending_approvals: Mutex<HashMap<AllowanceKey, Amount>>,

    next_submit_error: Mutex<Option<TxError>>,
    next_confirm_error: Mutex<Option<TxError>>,
    submitted_log: Mutex<Vec<String>>,
    tx_counter: AtomicUsize,

    symbol_calls: AtomicUsize,
    allowance_calls: AtomicUsize,

    confirm_gated: AtomicBool,
    confirm_gate: Semaphore,
    waiters: AtomicUsize,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            pairs: Mutex::new(Vec::new()),
            pair_count_override: Mutex::new(None),
            tokens: Mutex::new(HashMap::new()),
            reserves: Mutex::new(HashMap::new()),
            symbols: Mutex::new(HashMap::new()),
            decimals: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            allowances: Mutex::new(HashMap::new()),
            pending_approvals: Mutex::new(HashMap::new()),
            next_submit_error: Mutex::new(None),
            next_confirm_error: Mutex::new(None),
            submitted_log: Mutex::new(Vec::new()),
            tx_counter: AtomicUsize::new(0),
            symbol_calls: AtomicUsize::new(0),
            allowance_calls: AtomicUsize::new(0),
            confirm_gated: AtomicBool::new(false),
            confirm_gate: Semaphore::new(0),
            waiters: AtomicUsize::new(0),
        }
    }
}

impl MockChain {
    pub fn push_pair(&self, pair: Address, token0: Address, token1: Address) {
        self.pairs.lock().unwrap().push(Ok(pair.clone()));
        self.tokens.lock().unwrap().insert(pair, (token0, token1));
    }

    pub fn push_pair_error(&self, err: NodeError) {
        self.pairs.lock().unwrap().push(Err(err));
    }

    /// A pair whose address resolves but whose token reads fail.
    pub fn push_pair_without_tokens(&self, pair: Address) {
        self.pairs.lock().unwrap().push(Ok(pair));
    }

    /// Report this pair count regardless of how many entries exist.
    pub fn override_pair_count(&self, count: u64) {
        *self.pair_count_override.lock().unwrap() = Some(count);
    }

    pub fn set_reserves(&self, pair: Address, result: ReadResult<(Amount, Amount)>) {
        self.reserves.lock().unwrap().insert(pair, result);
    }

    pub fn set_token_meta(&self, token: Address, symbol: &str, decimals: u8) {
        self.symbols
            .lock()
            .unwrap()
            .insert(token.clone(), symbol.to_string());
        self.decimals.lock().unwrap().insert(token, decimals);
    }

    pub fn set_balance(&self, owner: &Address, token: &Address, amount: Amount) {
        self.balances
            .lock()
            .unwrap()
            .insert((token.clone(), owner.clone()), amount);
    }

    pub fn set_allowance(&self, token: &Address, owner: &Address, spender: &Address, amount: Amount) {
        self.allowances
            .lock()
            .unwrap()
            .insert((token.clone(), owner.clone(), spender.clone()), amount);
    }

    /// Register the allowance a confirmed approval will leave behind.
    pub fn approve_on_confirm(
        &self,
        token: &Address,
        owner: &Address,
        spender: &Address,
        amount: Amount,
    ) {
        self.pending_approvals
            .lock()
            .unwrap()
            .insert((token.clone(), owner.clone(), spender.clone()), amount);
    }

    pub fn fail_next_submit(&self, err: TxError) {
        *self.next_submit_error.lock().unwrap() = Some(err);
    }

    pub fn fail_next_confirmation(&self, err: TxError) {
        *self.next_confirm_error.lock().unwrap() = Some(err);
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted_log.lock().unwrap().clone()
    }

    pub fn symbol_call_count(&self) -> usize {
        self.symbol_calls.load(Ordering::SeqCst)
    }

    pub fn allowance_call_count(&self) -> usize {
        self.allowance_calls.load(Ordering::SeqCst)
    }

    /// Make `await_confirmation` block until [`release_confirmations`].
    pub fn gate_confirmations(&self) {
        self.confirm_gated.store(true, Ordering::SeqCst);
    }

    pub fn confirm_waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }

    pub fn release_confirmations(&self) {
        self.confirm_gate.add_permits(16);
    }

    fn record_submission(&self, entry: String) -> TxResult<TxHash> {
        if let Some(err) = self.next_submit_error.lock().unwrap().take() {
            return Err(err);
        }
        self.submitted_log.lock().unwrap().push(entry);
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TxHash::parse(&format!("0x{:064x}", n)).unwrap())
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn pair_count(&self) -> ReadResult<u64> {
        if let Some(count) = *self.pair_count_override.lock().unwrap() {
            return Ok(count);
        }
        Ok(self.pairs.lock().unwrap().len() as u64)
    }

    async fn pair_address(&self, index: u64) -> ReadResult<Address> {
        self.pairs
            .lock()
            .unwrap()
            .get(index as usize)
            .cloned()
            .unwrap_or_else(|| Err(NodeError::Parse("no pair at index".to_string())))
    }

    async fn pair_tokens(&self, pair: &Address) -> ReadResult<(Address, Address)> {
        self.tokens
            .lock()
            .unwrap()
            .get(pair)
            .cloned()
            .ok_or_else(|| NodeError::Parse("no tokens".to_string()))
    }

    async fn reserves(&self, pair: &Address) -> ReadResult<(Amount, Amount)> {
        self.reserves
            .lock()
            .unwrap()
            .get(pair)
            .cloned()
            .unwrap_or_else(|| Err(NodeError::Parse("no reserves".to_string())))
    }

    async fn token_symbol(&self, token: &Address) -> ReadResult<String> {
        self.symbol_calls.fetch_add(1, Ordering::SeqCst);
        self.symbols
            .lock()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or_else(|| NodeError::Parse("no symbol".to_string()))
    }

    async fn token_decimals(&self, token: &Address) -> ReadResult<u8> {
        self.decimals
            .lock()
            .unwrap()
            .get(token)
            .copied()
            .ok_or_else(|| NodeError::Parse("no decimals".to_string()))
    }

    async fn balance_of(&self, token: &Address, owner: &Address) -> ReadResult<Amount> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&(token.clone(), owner.clone()))
            .copied()
            .unwrap_or(0))
    }

    async fn allowance(
        &self,
        token: &Address,
        owner: &Address,
        spender: &Address,
    ) -> ReadResult<Amount> {
        self.allowance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .allowances
            .lock()
            .unwrap()
            .get(&(token.clone(), owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(0))
    }

    async fn submit_approve(
        &self,
        _owner: &Address,
        token: &Address,
        spender: &Address,
        amount: Amount,
    ) -> TxResult<TxHash> {
        self.record_submission(format!("approve:{}:{}:{}", token, spender, amount))
    }

    async fn submit_swap(
        &self,
        _owner: &Address,
        amount_in: Amount,
        min_out: Amount,
        token_in: &Address,
        token_out: &Address,
        _to: &Address,
    ) -> TxResult<TxHash> {
        self.record_submission(format!(
            "swap:{}:{}:{}:{}",
            token_in, token_out, amount_in, min_out
        ))
    }

    async fn submit_add_liquidity(
        &self,
        _owner: &Address,
        token_a: &Address,
        token_b: &Address,
        amount_a: Amount,
        amount_b: Amount,
        _to: &Address,
    ) -> TxResult<TxHash> {
        self.record_submission(format!(
            "add_liquidity:{}:{}:{}:{}",
            token_a, token_b, amount_a, amount_b
        ))
    }

    async fn submit_remove_liquidity(
        &self,
        _owner: &Address,
        token_a: &Address,
        token_b: &Address,
        liquidity: Amount,
        _to: &Address,
    ) -> TxResult<TxHash> {
        self.record_submission(format!(
            "remove_liquidity:{}:{}:{}",
            token_a, token_b, liquidity
        ))
    }

    async fn await_confirmation(&self, _tx: &TxHash) -> TxResult<()> {
        if self.confirm_gated.load(Ordering::SeqCst) {
            self.waiters.fetch_add(1, Ordering::SeqCst);
            // Never closed, so acquire cannot fail
            if let Ok(permit) = self.confirm_gate.acquire().await {
                permit.forget();
            }
            self.waiters.fetch_sub(1, Ordering::SeqCst);
        }

        if let Some(err) = self.next_confirm_error.lock().unwrap().take() {
            return Err(err);
        }

        // Approval effects become visible once the confirmation lands
        let pending: Vec<(AllowanceKey, Amount)> =
            self.pending_approvals.lock().unwrap().drain().collect();
        let mut allowances = self.allowances.lock().unwrap();
        for (key, amount) in pending {
            allowances.insert(key, amount);
        }
        Ok(())
    }
}
