//! Sponsored transaction flow.
//!
//! DESIGN
//! ======
//! One pass through the handshake, each stage gated on the previous:
//! 1. Serialize the transaction kind
//! 2. Sponsor: the relay binds sponsor gas and returns full bytes
//! 3. Sign: the user's key signs those bytes
//! 4. Execute: the relay submits both signatures
//! 5. Finality: poll the fullnode until the digest is final
//!
//! A failure stops the flow at its stage; nothing is retried.

use std::time::Duration;

use protocol::address::SuiAddress;
use protocol::rpc::{FINALITY_POLL, FINALITY_TIMEOUT, RpcError, SuiRpcClient};
use protocol::tx::ProgrammableTransaction;
use protocol::wire::{ExecuteSponsoredRequest, Network, SponsorTransactionRequest};

use crate::relay::{RelayApi, RelayClientError};
use crate::signer::{SignerError, TransactionSigner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Sponsor,
    Sign,
    Execute,
    Finality,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("sponsorship failed: {0}")]
    Sponsor(RelayClientError),
    #[error("signing failed: {0}")]
    Sign(SignerError),
    #[error("execution failed: {0}")]
    Execute(RelayClientError),
    #[error("waiting for finality failed: {0}")]
    Finality(RpcError),
}

impl FlowError {
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Sponsor(_) => Stage::Sponsor,
            Self::Sign(_) => Stage::Sign,
            Self::Execute(_) => Stage::Execute,
            Self::Finality(_) => Stage::Finality,
        }
    }
}

/// Blocks until a digest is final on chain. Enables mocking in tests.
#[async_trait::async_trait]
pub trait FinalityWaiter: Send + Sync {
    async fn wait_for(&self, digest: &str) -> Result<(), RpcError>;
}

pub struct RpcFinality {
    rpc: SuiRpcClient,
    poll: Duration,
    timeout: Duration,
}

impl RpcFinality {
    #[must_use]
    pub fn new(rpc: SuiRpcClient) -> Self {
        Self { rpc, poll: FINALITY_POLL, timeout: FINALITY_TIMEOUT }
    }
}

#[async_trait::async_trait]
impl FinalityWaiter for RpcFinality {
    async fn wait_for(&self, digest: &str) -> Result<(), RpcError> {
        self.rpc.wait_for_transaction(digest, self.poll, self.timeout).await
    }
}

pub struct SponsoredFlow<'a> {
    pub relay: &'a dyn RelayApi,
    pub signer: &'a dyn TransactionSigner,
    pub finality: &'a dyn FinalityWaiter,
    pub network: Network,
    /// Print stage progress on stderr.
    pub progress: bool,
}

impl SponsoredFlow<'_> {
    #[must_use]
    pub fn sender(&self) -> SuiAddress {
        self.signer.address()
    }

    /// Run the handshake and return the final digest.
    ///
    /// # Errors
    ///
    /// The first failing stage, wrapped in its [`FlowError`] variant.
    pub async fn run(&self, tx: &ProgrammableTransaction) -> Result<String, FlowError> {
        let request = SponsorTransactionRequest {
            transaction_kind_bytes: Some(tx.to_kind_base64()),
            sender: Some(self.sender().to_hex()),
            network: Some(self.network.to_string()),
        };

        self.note("requesting sponsorship");
        let sponsored = self.relay.sponsor(&request).await.map_err(FlowError::Sponsor)?;

        self.note(&format!("signing {}", sponsored.digest));
        let signature = self
            .signer
            .sign_transaction(&sponsored.bytes)
            .await
            .map_err(FlowError::Sign)?;

        self.note("executing");
        let executed = self
            .relay
            .execute(&ExecuteSponsoredRequest { digest: Some(sponsored.digest), signature: Some(signature) })
            .await
            .map_err(FlowError::Execute)?;
        let digest = executed.result.digest;

        self.note(&format!("waiting for {digest}"));
        self.finality.wait_for(&digest).await.map_err(FlowError::Finality)?;
        Ok(digest)
    }

    fn note(&self, message: &str) {
        if self.progress {
            eprintln!("{message}");
        }
    }
}

#[cfg(test)]
#[path = "flow_test.rs"]
mod tests;
