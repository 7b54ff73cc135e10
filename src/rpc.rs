//! Async chain boundary.
//!
//! Everything that talks to a Solana RPC node goes through `ChainReader`
//! (account reads) or `TransactionSender` (submission and status). Both are
//! implemented for the nonblocking `RpcClient`; tests substitute in-memory
//! mocks.

use async_trait::async_trait;
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// Provider throttled the call. Transient; callers back off and retry.
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("account {0} not found")]
    AccountNotFound(Pubkey),

    #[error("rpc call timed out after {0}ms")]
    Timeout(u64),
}

impl ChainError {
    pub fn reason(&self) -> &'static str {
        match self {
            ChainError::RateLimited(_) => "rate-limited",
            ChainError::Rpc(_) => "rpc-error",
            ChainError::AccountNotFound(_) => "account-not-found",
            ChainError::Timeout(_) => "timeout",
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ChainError::RateLimited(_))
    }

    /// Classify a raw error message from the provider.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_rate_limited_message(&message) {
            ChainError::RateLimited(message)
        } else {
            ChainError::Rpc(message)
        }
    }
}

impl From<ClientError> for ChainError {
    fn from(e: ClientError) -> Self {
        ChainError::from_message(e.to_string())
    }
}

pub fn is_rate_limited_message(message: &str) -> bool {
    let msg = message.to_ascii_lowercase();
    msg.contains("429")
        || msg.contains("too many requests")
        || msg.contains("rate limit")
        || msg.contains("rate-limit")
}

/// Read-only account access.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Account data for each key, `None` where the account does not exist.
    async fn get_multiple_accounts(
        &self,
        keys: &[Pubkey],
    ) -> Result<Vec<Option<Vec<u8>>>, ChainError>;

    async fn get_account_data(&self, key: &Pubkey) -> Result<Vec<u8>, ChainError> {
        self.get_multiple_accounts(std::slice::from_ref(key))
            .await?
            .into_iter()
            .next()
            .flatten()
            .ok_or(ChainError::AccountNotFound(*key))
    }
}

/// Confirmation state of a submitted signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureState {
    Pending,
    Confirmed,
    Failed(String),
}

/// Transaction submission and status polling.
#[async_trait]
pub trait TransactionSender: Send + Sync {
    async fn latest_blockhash(&self) -> Result<Hash, ChainError>;

    async fn send_transaction(
        &self,
        transaction: &Transaction,
        skip_preflight: bool,
        max_retries: usize,
    ) -> Result<Signature, ChainError>;

    async fn signature_state(&self, signature: &Signature) -> Result<SignatureState, ChainError>;

    async fn is_blockhash_valid(&self, blockhash: &Hash) -> Result<bool, ChainError>;
}

/// Parse a commitment level name, defaulting to `confirmed`.
pub fn parse_commitment(name: &str) -> CommitmentConfig {
    match name.trim().to_lowercase().as_str() {
        "processed" => CommitmentConfig::processed(),
        "finalized" => CommitmentConfig::finalized(),
        _ => CommitmentConfig::confirmed(),
    }
}

pub fn build_rpc_client(url: &str, timeout: Duration, commitment: &str) -> RpcClient {
    RpcClient::new_with_timeout_and_commitment(url.to_string(), timeout, parse_commitment(commitment))
}

#[async_trait]
impl ChainReader for RpcClient {
    async fn get_multiple_accounts(
        &self,
        keys: &[Pubkey],
    ) -> Result<Vec<Option<Vec<u8>>>, ChainError> {
        let accounts = RpcClient::get_multiple_accounts(self, keys).await?;
        Ok(accounts
            .into_iter()
            .map(|account| account.map(|a| a.data))
            .collect())
    }
}

#[async_trait]
impl TransactionSender for RpcClient {
    async fn latest_blockhash(&self) -> Result<Hash, ChainError> {
        Ok(self.get_latest_blockhash().await?)
    }

    async fn send_transaction(
        &self,
        transaction: &Transaction,
        skip_preflight: bool,
        max_retries: usize,
    ) -> Result<Signature, ChainError> {
        let config = RpcSendTransactionConfig {
            skip_preflight,
            max_retries: Some(max_retries),
            ..RpcSendTransactionConfig::default()
        };
        Ok(self.send_transaction_with_config(transaction, config).await?)
    }

    async fn signature_state(&self, signature: &Signature) -> Result<SignatureState, ChainError> {
        let state = match self.get_signature_status(signature).await? {
            None => SignatureState::Pending,
            Some(Ok(())) => SignatureState::Confirmed,
            Some(Err(e)) => SignatureState::Failed(e.to_string()),
        };
        Ok(state)
    }

    async fn is_blockhash_valid(&self, blockhash: &Hash) -> Result<bool, ChainError> {
        Ok(RpcClient::is_blockhash_valid(self, blockhash, self.commitment()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_classification() {
        assert!(ChainError::from_message("HTTP status client error (429 Too Many Requests)")
            .is_rate_limited());
        assert!(ChainError::from_message("Too many requests for a specific RPC call")
            .is_rate_limited());
        assert!(!ChainError::from_message("AccountNotFound").is_rate_limited());
        assert_eq!(ChainError::from_message("boom").reason(), "rpc-error");
    }

    #[test]
    fn test_commitment_parsing() {
        assert_eq!(parse_commitment("finalized"), CommitmentConfig::finalized());
        assert_eq!(parse_commitment("PROCESSED"), CommitmentConfig::processed());
        assert_eq!(parse_commitment("whatever"), CommitmentConfig::confirmed());
    }
}
