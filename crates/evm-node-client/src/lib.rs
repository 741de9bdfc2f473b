//! evm-node-client: JSON-RPC access to the chain for minidex
//!
//! Defines the [`ChainClient`] boundary trait (reads against the factory,
//! pair, and token contracts; transaction submission through the router;
//! confirmation waits) and an HTTP implementation speaking Ethereum
//! JSON-RPC with node-managed accounts (`eth_sendTransaction`).

pub mod abi;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;

use minidex_core::{Address, Amount, ContractsConfig, NodeConfig, NodeError, TxConfig, TxError, TxHash};

/// Result type for chain reads
pub type ReadResult<T> = std::result::Result<T, NodeError>;

/// Result type for transaction submission and confirmation
pub type TxResult<T> = std::result::Result<T, TxError>;

/// The external chain boundary.
///
/// Reads are idempotent and side-effect-free; each failed read surfaces as
/// its own `NodeError` so callers can degrade a single field instead of a
/// whole refresh. Submissions go through the signer held by the node and
/// return a transaction handle; `await_confirmation` suspends until the
/// transaction settles, reverts, or the bounded wait elapses.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Number of pairs registered with the factory.
    async fn pair_count(&self) -> ReadResult<u64>;

    /// Pair address at a factory index.
    async fn pair_address(&self, index: u64) -> ReadResult<Address>;

    /// The pair's two constituent tokens, in contract order (token0, token1).
    async fn pair_tokens(&self, pair: &Address) -> ReadResult<(Address, Address)>;

    /// Current reserves, in token0/token1 order.
    async fn reserves(&self, pair: &Address) -> ReadResult<(Amount, Amount)>;

    async fn token_symbol(&self, token: &Address) -> ReadResult<String>;

    async fn token_decimals(&self, token: &Address) -> ReadResult<u8>;

    async fn balance_of(&self, token: &Address, owner: &Address) -> ReadResult<Amount>;

    async fn allowance(
        &self,
        token: &Address,
        owner: &Address,
        spender: &Address,
    ) -> ReadResult<Amount>;

    async fn submit_approve(
        &self,
        owner: &Address,
        token: &Address,
        spender: &Address,
        amount: Amount,
    ) -> TxResult<TxHash>;

    #[allow(clippy::too_many_arguments)]
    async fn submit_swap(
        &self,
        owner: &Address,
        amount_in: Amount,
        min_out: Amount,
        token_in: &Address,
        token_out: &Address,
        to: &Address,
    ) -> TxResult<TxHash>;

    #[allow(clippy::too_many_arguments)]
    async fn submit_add_liquidity(
        &self,
        owner: &Address,
        token_a: &Address,
        token_b: &Address,
        amount_a: Amount,
        amount_b: Amount,
        to: &Address,
    ) -> TxResult<TxHash>;

    async fn submit_remove_liquidity(
        &self,
        owner: &Address,
        token_a: &Address,
        token_b: &Address,
        liquidity: Amount,
        to: &Address,
    ) -> TxResult<TxHash>;

    /// Suspend until the transaction is confirmed. `Ok(())` on success,
    /// `TxError::Reverted` if it was included but failed, or
    /// `TxError::ConfirmationTimeout` if no receipt appeared in time
    /// (indeterminate — the transaction may still land).
    async fn await_confirmation(&self, tx: &TxHash) -> TxResult<()>;
}

/// EIP-1193 error code for a user-rejected request.
const USER_REJECTED_CODE: i64 = 4001;

/// HTTP JSON-RPC implementation of [`ChainClient`].
#[derive(Clone)]
pub struct HttpNodeClient {
    http: reqwest::Client,
    node: NodeConfig,
    contracts: ContractsConfig,
    tx: TxConfig,
}

impl HttpNodeClient {
    pub fn new(
        node: NodeConfig,
        contracts: ContractsConfig,
        tx: TxConfig,
    ) -> Result<Self, NodeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(node.request_timeout_secs))
            .build()
            .map_err(|e| NodeError::Unreachable {
                url: node.url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            node,
            contracts,
            tx,
        })
    }

    pub fn contracts(&self) -> &ContractsConfig {
        &self.contracts
    }

    /// Send one JSON-RPC request and unwrap the `result` field.
    async fn rpc(&self, method: &str, params: Value) -> ReadResult<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.node.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NodeError::Unreachable {
                url: self.node.url.clone(),
                message: e.to_string(),
            })?;

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| NodeError::Parse(e.to_string()))?;

        if let Some(err) = envelope.get("error") {
            return Err(NodeError::Rpc {
                code: err["code"].as_i64().unwrap_or(0),
                message: err["message"].as_str().unwrap_or("unknown error").to_string(),
            });
        }

        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }

    /// `eth_call` against a contract, returning the hex payload.
    async fn eth_call(&self, to: &Address, data: abi::CallData) -> ReadResult<String> {
        let result = self
            .rpc(
                "eth_call",
                json!([{ "to": to.as_str(), "data": data.to_hex() }, "latest"]),
            )
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| NodeError::Parse("eth_call result is not a string".to_string()))
    }

    /// `eth_sendTransaction` with the node-managed signer for `from`.
    async fn send_transaction(
        &self,
        from: &Address,
        to: &Address,
        data: abi::CallData,
    ) -> TxResult<TxHash> {
        let result = self
            .rpc(
                "eth_sendTransaction",
                json!([{
                    "from": from.as_str(),
                    "to": to.as_str(),
                    "data": data.to_hex(),
                }]),
            )
            .await
            .map_err(submission_error)?;

        let hash = result.as_str().ok_or_else(|| TxError::SubmissionFailed {
            message: "node returned no transaction hash".to_string(),
        })?;
        TxHash::parse(hash).map_err(|_| TxError::SubmissionFailed {
            message: format!("node returned malformed transaction hash: {}", hash),
        })
    }
}

/// Map a JSON-RPC submission error to the transaction-path taxonomy.
fn submission_error(err: NodeError) -> TxError {
    match err {
        NodeError::Rpc { code, message } if code == USER_REJECTED_CODE => {
            TxError::SignerRejected { message }
        }
        other => TxError::SubmissionFailed {
            message: other.to_string(),
        },
    }
}

/// Interpret a transaction receipt: `Some(true)` confirmed, `Some(false)`
/// reverted, `None` not yet included.
fn receipt_status(receipt: &Value) -> Option<bool> {
    if receipt.is_null() {
        return None;
    }
    match receipt["status"].as_str() {
        Some("0x1") => Some(true),
        Some("0x0") => Some(false),
        _ => None,
    }
}

#[async_trait]
impl ChainClient for HttpNodeClient {
    async fn pair_count(&self) -> ReadResult<u64> {
        let payload = self
            .eth_call(&self.contracts.factory, abi::CallData::new("allPairsLength()"))
            .await?;
        let words = abi::decode_words(&payload)?;
        abi::decode_u64(&words[0])
    }

    async fn pair_address(&self, index: u64) -> ReadResult<Address> {
        let payload = self
            .eth_call(
                &self.contracts.factory,
                abi::CallData::new("allPairs(uint256)").push_uint(index as Amount),
            )
            .await?;
        let words = abi::decode_words(&payload)?;
        abi::decode_address(&words[0])
    }

    async fn pair_tokens(&self, pair: &Address) -> ReadResult<(Address, Address)> {
        let payload0 = self.eth_call(pair, abi::CallData::new("token0()")).await?;
        let payload1 = self.eth_call(pair, abi::CallData::new("token1()")).await?;
        let token0 = abi::decode_address(&abi::decode_words(&payload0)?[0])?;
        let token1 = abi::decode_address(&abi::decode_words(&payload1)?[0])?;
        Ok((token0, token1))
    }

    async fn reserves(&self, pair: &Address) -> ReadResult<(Amount, Amount)> {
        let payload = self.eth_call(pair, abi::CallData::new("getReserves()")).await?;
        let words = abi::decode_words(&payload)?;
        if words.len() < 2 {
            return Err(NodeError::Parse("getReserves returned fewer than 2 words".to_string()));
        }
        Ok((abi::decode_uint(&words[0])?, abi::decode_uint(&words[1])?))
    }

    async fn token_symbol(&self, token: &Address) -> ReadResult<String> {
        let payload = self.eth_call(token, abi::CallData::new("symbol()")).await?;
        abi::decode_string(&payload)
    }

    async fn token_decimals(&self, token: &Address) -> ReadResult<u8> {
        let payload = self.eth_call(token, abi::CallData::new("decimals()")).await?;
        abi::decode_u8(&abi::decode_words(&payload)?[0])
    }

    async fn balance_of(&self, token: &Address, owner: &Address) -> ReadResult<Amount> {
        let payload = self
            .eth_call(
                token,
                abi::CallData::new("balanceOf(address)").push_address(owner),
            )
            .await?;
        abi::decode_uint(&abi::decode_words(&payload)?[0])
    }

    async fn allowance(
        &self,
        token: &Address,
        owner: &Address,
        spender: &Address,
    ) -> ReadResult<Amount> {
        let payload = self
            .eth_call(
                token,
                abi::CallData::new("allowance(address,address)")
                    .push_address(owner)
                    .push_address(spender),
            )
            .await?;
        abi::decode_uint(&abi::decode_words(&payload)?[0])
    }

    async fn submit_approve(
        &self,
        owner: &Address,
        token: &Address,
        spender: &Address,
        amount: Amount,
    ) -> TxResult<TxHash> {
        let data = abi::CallData::new("approve(address,uint256)")
            .push_address(spender)
            .push_uint(amount);
        let hash = self.send_transaction(owner, token, data).await?;
        tracing::info!(token = %token, amount, tx = %hash, "Approval submitted");
        Ok(hash)
    }

    async fn submit_swap(
        &self,
        owner: &Address,
        amount_in: Amount,
        min_out: Amount,
        token_in: &Address,
        token_out: &Address,
        to: &Address,
    ) -> TxResult<TxHash> {
        let data = abi::CallData::new(
            "swapExactTokensForTokens(uint256,uint256,address,address,address)",
        )
        .push_uint(amount_in)
        .push_uint(min_out)
        .push_address(token_in)
        .push_address(token_out)
        .push_address(to);
        let hash = self
            .send_transaction(owner, &self.contracts.router, data)
            .await?;
        tracing::info!(amount_in, min_out, tx = %hash, "Swap submitted");
        Ok(hash)
    }

    async fn submit_add_liquidity(
        &self,
        owner: &Address,
        token_a: &Address,
        token_b: &Address,
        amount_a: Amount,
        amount_b: Amount,
        to: &Address,
    ) -> TxResult<TxHash> {
        let data = abi::CallData::new("addLiquidity(address,address,uint256,uint256,address)")
            .push_address(token_a)
            .push_address(token_b)
            .push_uint(amount_a)
            .push_uint(amount_b)
            .push_address(to);
        let hash = self
            .send_transaction(owner, &self.contracts.router, data)
            .await?;
        tracing::info!(amount_a, amount_b, tx = %hash, "Add-liquidity submitted");
        Ok(hash)
    }

    async fn submit_remove_liquidity(
        &self,
        owner: &Address,
        token_a: &Address,
        token_b: &Address,
        liquidity: Amount,
        to: &Address,
    ) -> TxResult<TxHash> {
        let data = abi::CallData::new("removeLiquidity(address,address,uint256,address)")
            .push_address(token_a)
            .push_address(token_b)
            .push_uint(liquidity)
            .push_address(to);
        let hash = self
            .send_transaction(owner, &self.contracts.router, data)
            .await?;
        tracing::info!(liquidity, tx = %hash, "Remove-liquidity submitted");
        Ok(hash)
    }

    async fn await_confirmation(&self, tx: &TxHash) -> TxResult<()> {
        let deadline = Instant::now() + Duration::from_secs(self.tx.confirm_timeout_secs);
        let poll = Duration::from_millis(self.tx.confirm_poll_ms);

        loop {
            match self
                .rpc("eth_getTransactionReceipt", json!([tx.as_str()]))
                .await
            {
                Ok(receipt) => match receipt_status(&receipt) {
                    Some(true) => {
                        tracing::info!(tx = %tx, "Transaction confirmed");
                        return Ok(());
                    }
                    Some(false) => {
                        tracing::warn!(tx = %tx, "Transaction reverted");
                        return Err(TxError::Reverted {
                            reason: "transaction reverted on-chain".to_string(),
                        });
                    }
                    None => {}
                },
                Err(e) => {
                    // Transient read failure; keep polling until the deadline.
                    tracing::debug!(tx = %tx, "Receipt poll failed: {}", e);
                }
            }

            if Instant::now() >= deadline {
                return Err(TxError::ConfirmationTimeout {
                    tx: tx.to_string(),
                    waited_secs: self.tx.confirm_timeout_secs,
                });
            }
            tokio::time::sleep(poll).await;
        }
    }
}
