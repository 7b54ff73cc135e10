//! Transaction Broadcaster.
//!
//! Defaults favour fast submission: no preflight, no RPC-side retries. A
//! failed attempt is reported, not repeated.

use serde::Deserialize;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::transaction::Transaction;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ExecutionError;
use crate::rpc::{SignatureState, TransactionSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BroadcastOptions {
    pub skip_preflight: bool,
    pub max_retries: usize,
    /// Return right after submission. Finality is then unknown.
    pub skip_confirm: bool,
    #[serde(with = "duration_ms", rename = "confirm_timeout_ms")]
    pub confirm_timeout: Duration,
    #[serde(with = "duration_ms", rename = "poll_interval_ms")]
    pub poll_interval: Duration,
}

impl Default for BroadcastOptions {
    fn default() -> Self {
        Self {
            skip_preflight: true,
            max_retries: 0,
            skip_confirm: false,
            confirm_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(400),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

pub struct Broadcaster {
    sender: Arc<dyn TransactionSender>,
}

impl Broadcaster {
    pub fn new(sender: Arc<dyn TransactionSender>) -> Self {
        Self { sender }
    }

    /// Sign `transaction` with `signers` against a fresh blockhash, submit it
    /// and, unless `skip_confirm`, wait until it lands, fails, or its
    /// blockhash expires.
    pub async fn broadcast(
        &self,
        mut transaction: Transaction,
        signers: &[&Keypair],
        options: &BroadcastOptions,
    ) -> Result<Signature, ExecutionError> {
        let blockhash = self
            .sender
            .latest_blockhash()
            .await
            .map_err(|e| ExecutionError::Send(e.to_string()))?;

        transaction
            .try_sign(signers, blockhash)
            .map_err(|e| ExecutionError::Signing(e.to_string()))?;

        let signature = self
            .sender
            .send_transaction(&transaction, options.skip_preflight, options.max_retries)
            .await
            .map_err(|e| ExecutionError::Send(e.to_string()))?;
        info!(%signature, skip_preflight = options.skip_preflight, "transaction submitted");

        if options.skip_confirm {
            warn!(%signature, "confirmation skipped, finality unknown");
            return Ok(signature);
        }

        let deadline = Instant::now() + options.confirm_timeout;
        loop {
            match self.sender.signature_state(&signature).await {
                Ok(SignatureState::Confirmed) => {
                    info!(%signature, "transaction confirmed");
                    return Ok(signature);
                }
                Ok(SignatureState::Failed(err)) => {
                    return Err(ExecutionError::TransactionFailed(signature.to_string(), err));
                }
                Ok(SignatureState::Pending) => {
                    match self.sender.is_blockhash_valid(&blockhash).await {
                        Ok(false) => return Err(ExecutionError::BlockhashExpired(signature.to_string())),
                        Ok(true) => {}
                        Err(e) => debug!(%signature, error = %e, "blockhash validity check failed"),
                    }
                }
                Err(e) => warn!(%signature, error = %e, "signature status check failed"),
            }

            if Instant::now() >= deadline {
                return Err(ExecutionError::ConfirmTimeout(signature.to_string()));
            }
            tokio::time::sleep(options.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::ChainError;
    use async_trait::async_trait;
    use solana_sdk::hash::Hash;
    use solana_sdk::signer::Signer;
    use solana_sdk::system_instruction;
    use std::sync::Mutex;

    struct ScriptedSender {
        states: Mutex<Vec<SignatureState>>,
        blockhash_valid: bool,
        sent: Mutex<Vec<(bool, usize)>>,
    }

    impl ScriptedSender {
        fn new(states: Vec<SignatureState>, blockhash_valid: bool) -> Self {
            Self {
                states: Mutex::new(states),
                blockhash_valid,
                sent: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl TransactionSender for ScriptedSender {
        async fn latest_blockhash(&self) -> Result<Hash, ChainError> {
            Ok(Hash::new_unique())
        }

        async fn send_transaction(
            &self,
            transaction: &Transaction,
            skip_preflight: bool,
            max_retries: usize,
        ) -> Result<Signature, ChainError> {
            self.sent.lock().unwrap().push((skip_preflight, max_retries));
            Ok(transaction.signatures[0])
        }

        async fn signature_state(&self, _signature: &Signature) -> Result<SignatureState, ChainError> {
            let mut states = self.states.lock().unwrap();
            Ok(if states.is_empty() {
                SignatureState::Pending
            } else {
                states.remove(0)
            })
        }

        async fn is_blockhash_valid(&self, _blockhash: &Hash) -> Result<bool, ChainError> {
            Ok(self.blockhash_valid)
        }
    }

    fn transfer(payer: &Keypair) -> Transaction {
        let ix = system_instruction::transfer(&payer.pubkey(), &Keypair::new().pubkey(), 1);
        Transaction::new_with_payer(&[ix], Some(&payer.pubkey()))
    }

    fn fast() -> BroadcastOptions {
        BroadcastOptions {
            confirm_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(1),
            ..BroadcastOptions::default()
        }
    }

    #[tokio::test]
    async fn test_confirmed_after_pending() {
        let sender = Arc::new(ScriptedSender::new(
            vec![SignatureState::Pending, SignatureState::Confirmed],
            true,
        ));
        let payer = Keypair::new();
        let sig = Broadcaster::new(sender.clone())
            .broadcast(transfer(&payer), &[&payer], &fast())
            .await
            .unwrap();
        assert_ne!(sig, Signature::default());
        assert_eq!(sender.sent.lock().unwrap()[0], (true, 0));
    }

    #[tokio::test]
    async fn test_on_chain_failure() {
        let sender = Arc::new(ScriptedSender::new(
            vec![SignatureState::Failed("custom program error: 0x1771".into())],
            true,
        ));
        let payer = Keypair::new();
        let err = Broadcaster::new(sender)
            .broadcast(transfer(&payer), &[&payer], &fast())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "transaction-failed");
    }

    #[tokio::test]
    async fn test_expired_blockhash() {
        let sender = Arc::new(ScriptedSender::new(vec![], false));
        let payer = Keypair::new();
        let err = Broadcaster::new(sender)
            .broadcast(transfer(&payer), &[&payer], &fast())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "blockhash-expired");
    }

    #[tokio::test]
    async fn test_confirm_timeout() {
        let sender = Arc::new(ScriptedSender::new(vec![], true));
        let payer = Keypair::new();
        let err = Broadcaster::new(sender)
            .broadcast(transfer(&payer), &[&payer], &fast())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "confirm-timeout");
    }

    #[tokio::test]
    async fn test_skip_confirm_returns_immediately() {
        let sender = Arc::new(ScriptedSender::new(vec![], false));
        let payer = Keypair::new();
        let options = BroadcastOptions {
            skip_confirm: true,
            ..fast()
        };
        assert!(Broadcaster::new(sender)
            .broadcast(transfer(&payer), &[&payer], &options)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_missing_signer_fails_signing() {
        let sender = Arc::new(ScriptedSender::new(vec![], true));
        let payer = Keypair::new();
        let other = Keypair::new();
        let err = Broadcaster::new(sender)
            .broadcast(transfer(&payer), &[&other], &fast())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "signing-failed");
    }
}
