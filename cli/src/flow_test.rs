use std::sync::Mutex;

use protocol::tx::ProgrammableTransactionBuilder;
use protocol::wire::{ExecuteSponsoredResponse, ExecutedDigest, SponsorTransactionResponse};

use super::*;

// =========================================================================
// Mocks
// =========================================================================

#[derive(Default)]
struct Calls {
    sponsor: Vec<SponsorTransactionRequest>,
    execute: Vec<ExecuteSponsoredRequest>,
    sign: Vec<String>,
    wait: Vec<String>,
}

struct MockRelay<'a> {
    calls: &'a Mutex<Calls>,
    sponsor_fails: bool,
    execute_fails: bool,
}

#[async_trait::async_trait]
impl RelayApi for MockRelay<'_> {
    async fn sponsor(
        &self,
        request: &SponsorTransactionRequest,
    ) -> Result<SponsorTransactionResponse, RelayClientError> {
        self.calls.lock().unwrap().sponsor.push(request.clone());
        if self.sponsor_fails {
            return Err(RelayClientError::Status { status: 502, message: "Failed to sponsor transaction".into() });
        }
        Ok(SponsorTransactionResponse { digest: "sponsored".into(), bytes: "dHg=".into() })
    }

    async fn execute(&self, request: &ExecuteSponsoredRequest) -> Result<ExecuteSponsoredResponse, RelayClientError> {
        self.calls.lock().unwrap().execute.push(request.clone());
        if self.execute_fails {
            return Err(RelayClientError::Status { status: 502, message: "Failed to execute transaction".into() });
        }
        Ok(ExecuteSponsoredResponse { result: ExecutedDigest { digest: "executed".into() } })
    }
}

struct MockSigner<'a> {
    calls: &'a Mutex<Calls>,
}

#[async_trait::async_trait]
impl TransactionSigner for MockSigner<'_> {
    fn address(&self) -> SuiAddress {
        "0x5e9de7".parse().unwrap()
    }

    async fn sign_transaction(&self, tx_bytes: &str) -> Result<String, SignerError> {
        self.calls.lock().unwrap().sign.push(tx_bytes.to_owned());
        Ok("c2ln".into())
    }
}

struct MockFinality<'a> {
    calls: &'a Mutex<Calls>,
    result: Result<(), RpcError>,
}

#[async_trait::async_trait]
impl FinalityWaiter for MockFinality<'_> {
    async fn wait_for(&self, digest: &str) -> Result<(), RpcError> {
        self.calls.lock().unwrap().wait.push(digest.to_owned());
        self.result.clone()
    }
}

async fn run(sponsor_fails: bool, execute_fails: bool, finality: Result<(), RpcError>) -> (Result<String, FlowError>, Calls) {
    let calls = Mutex::new(Calls::default());
    let relay = MockRelay { calls: &calls, sponsor_fails, execute_fails };
    let signer = MockSigner { calls: &calls };
    let waiter = MockFinality { calls: &calls, result: finality };
    let flow = SponsoredFlow { relay: &relay, signer: &signer, finality: &waiter, network: Network::Testnet, progress: false };
    let tx = ProgrammableTransactionBuilder::new().finish();
    let result = flow.run(&tx).await;
    (result, calls.into_inner().unwrap())
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn happy_path_runs_every_stage_in_order() {
    let (result, calls) = run(false, false, Ok(())).await;
    assert_eq!(result.unwrap(), "executed");

    let sponsor = &calls.sponsor[0];
    let kind = ProgrammableTransactionBuilder::new().finish().to_kind_base64();
    assert_eq!(sponsor.transaction_kind_bytes.as_deref(), Some(kind.as_str()));
    assert_eq!(sponsor.network.as_deref(), Some("testnet"));
    let sender: SuiAddress = "0x5e9de7".parse().unwrap();
    assert_eq!(sponsor.sender, Some(sender.to_hex()));

    assert_eq!(calls.sign, ["dHg="]);
    assert_eq!(calls.execute[0].digest.as_deref(), Some("sponsored"));
    assert_eq!(calls.execute[0].signature.as_deref(), Some("c2ln"));
    assert_eq!(calls.wait, ["executed"]);
}

#[tokio::test]
async fn sponsor_failure_never_signs() {
    let (result, calls) = run(true, false, Ok(())).await;
    assert_eq!(result.unwrap_err().stage(), Stage::Sponsor);
    assert!(calls.sign.is_empty());
    assert!(calls.execute.is_empty());
    assert!(calls.wait.is_empty());
}

#[tokio::test]
async fn execute_failure_never_waits() {
    let (result, calls) = run(false, true, Ok(())).await;
    let err = result.unwrap_err();
    assert_eq!(err.stage(), Stage::Execute);
    assert!(err.to_string().contains("Failed to execute transaction"));
    assert_eq!(calls.sign.len(), 1);
    assert!(calls.wait.is_empty());
}

#[tokio::test]
async fn failed_effects_surface_as_finality_error() {
    let failure = RpcError::TransactionFailed { digest: "executed".into(), error: "MoveAbort".into() };
    let (result, _) = run(false, false, Err(failure.clone())).await;
    assert_eq!(result.unwrap_err(), FlowError::Finality(failure));
}
