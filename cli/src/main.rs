mod flow;
mod relay;
mod signer;

use clap::{Args, Parser, Subcommand};
use protocol::address::{ObjectId, SuiAddress};
use protocol::contract::{AmountError, Contract, NewStream, SharedObject, TipSource, sui_to_mist};
use protocol::rpc::{DEFAULT_RPC_URL, RpcError, SuiRpcClient, select_coins};
use protocol::tx::{ProgrammableTransaction, TxError};
use protocol::validation::{ValidationError, validate_profile, validate_stream};
use protocol::wire::{CreateStreamRequest, MessageBody, Network, ingest_url, playback_url};
use serde::Serialize;
use serde_json::{Value, json};

use crate::flow::{FlowError, RpcFinality, SponsoredFlow};
use crate::relay::{HttpRelay, RelayClientError};
use crate::signer::{Ed25519Signer, SignerError, TransactionSigner};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing secret key; pass --secret-key or set FUSION_SECRET_KEY")]
    MissingSecretKey,
    #[error("missing contract setting `--{0}`")]
    MissingContract(&'static str),
    #[error("missing expected field `{0}`")]
    MissingField(&'static str),
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error(transparent)]
    Relay(#[from] RelayClientError),
    #[error("{stage:?}: {source}")]
    Flow { stage: flow::Stage, source: FlowError },
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Tx(#[from] TxError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl From<FlowError> for CliError {
    fn from(source: FlowError) -> Self {
        Self::Flow { stage: source.stage(), source }
    }
}

#[derive(Parser, Debug)]
#[command(name = "fusion", about = "SuiFusion relay and sponsored-transaction CLI")]
struct Cli {
    #[arg(long, env = "FUSION_RELAY_URL", default_value = "http://127.0.0.1:3000")]
    relay_url: String,

    #[arg(long, env = "SUI_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,

    #[arg(long, env = "FUSION_NETWORK", default_value = "testnet")]
    network: Network,

    /// Ed25519 secret: 64 hex chars, or base64 of 32 bytes (optionally flag-prefixed).
    #[arg(long, env = "FUSION_SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    #[command(flatten)]
    contract: ContractArgs,

    #[command(subcommand)]
    command: Command,
}

/// Shared objects are given as `<object-id>:<initial-shared-version>`.
#[derive(Args, Debug)]
struct ContractArgs {
    #[arg(long, env = "PACKAGE_ID")]
    package: Option<ObjectId>,

    #[arg(long, env = "PROFILE_REGISTRY")]
    profile_registry: Option<SharedObject>,

    #[arg(long, env = "STREAM_REGISTRY")]
    stream_registry: Option<SharedObject>,

    #[arg(long, env = "TIP_POOL")]
    tip_pool: Option<SharedObject>,
}

impl ContractArgs {
    fn resolve(&self) -> Result<Contract, CliError> {
        Ok(Contract {
            package: self.package.ok_or(CliError::MissingContract("package"))?,
            profile_registry: self.profile_registry.ok_or(CliError::MissingContract("profile-registry"))?,
            stream_registry: self.stream_registry.ok_or(CliError::MissingContract("stream-registry"))?,
            tip_pool: self.tip_pool.ok_or(CliError::MissingContract("tip-pool"))?,
        })
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the relay is up.
    Ping,
    /// Print the address derived from the secret key.
    Address,
    /// Resolve the default SuiNS name of an address.
    Name { address: SuiAddress },
    Profile(ProfileCommand),
    Stream(StreamCommand),
    /// Tip a live stream, in SUI.
    Tip {
        stream_id: String,
        amount: f64,
    },
}

#[derive(Args, Debug)]
struct ProfileCommand {
    #[command(subcommand)]
    command: ProfileSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProfileSubcommand {
    Create {
        name: String,
        avatar_url: String,
    },
    /// Defaults to the signer's own address.
    Show { address: Option<SuiAddress> },
}

#[derive(Args, Debug)]
struct StreamCommand {
    #[command(subcommand)]
    command: StreamSubcommand,
}

#[derive(Subcommand, Debug)]
enum StreamSubcommand {
    /// Provision a video stream and record it on chain.
    Start(StreamStartArgs),
    /// End a stream on chain, then terminate it on the video platform.
    End { id: String },
    List {
        #[arg(long, default_value = "all")]
        status: String,
    },
    Info { playback_id: String },
    Live { id: String },
}

#[derive(Args, Debug)]
struct StreamStartArgs {
    #[arg(long)]
    title: String,

    #[arg(long)]
    description: String,

    #[arg(long)]
    category: String,

    #[arg(long)]
    thumbnail_url: Option<String>,

    /// Skip recording; broadcasts are recorded by default.
    #[arg(long)]
    no_record: bool,
}

impl StreamStartArgs {
    fn create_request(&self) -> CreateStreamRequest {
        CreateStreamRequest { name: Some(self.title.clone()), record: Some(!self.no_record) }
    }
}

struct CliContext {
    relay: HttpRelay,
    rpc_url: String,
    network: Network,
    secret_key: Option<String>,
    contract: ContractArgs,
}

impl CliContext {
    fn signer(&self) -> Result<Ed25519Signer, CliError> {
        let secret = self.secret_key.as_deref().ok_or(CliError::MissingSecretKey)?;
        Ok(Ed25519Signer::from_secret(secret)?)
    }

    fn rpc(&self) -> Result<SuiRpcClient, CliError> {
        Ok(SuiRpcClient::new(&self.rpc_url)?)
    }

    async fn run_sponsored(&self, signer: &Ed25519Signer, tx: &ProgrammableTransaction) -> Result<String, CliError> {
        let finality = RpcFinality::new(self.rpc()?);
        let flow = SponsoredFlow {
            relay: &self.relay,
            signer,
            finality: &finality,
            network: self.network,
            progress: true,
        };
        Ok(flow.run(tx).await?)
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let ctx = CliContext {
        relay: HttpRelay::new(&cli.relay_url)?,
        rpc_url: cli.rpc_url,
        network: cli.network,
        secret_key: cli.secret_key,
        contract: cli.contract,
    };

    match cli.command {
        Command::Ping => {
            ctx.relay.health().await?;
            println!("ok");
            Ok(())
        }
        Command::Address => print_json(&json!({ "address": ctx.signer()?.address().to_hex() })),
        Command::Name { address } => {
            let json: Value = ctx.relay.get(&format!("/api/profiles/{}/name", address.to_hex())).await?;
            print_json(&json)
        }
        Command::Profile(profile) => run_profile(&ctx, profile).await,
        Command::Stream(stream) => run_stream(&ctx, stream).await,
        Command::Tip { stream_id, amount } => run_tip(&ctx, &stream_id, amount).await,
    }
}

async fn run_profile(ctx: &CliContext, profile: ProfileCommand) -> Result<(), CliError> {
    match profile.command {
        ProfileSubcommand::Create { name, avatar_url } => {
            let signer = ctx.signer()?;
            validate_profile(&name, &avatar_url, &signer.address().to_hex())?;
            let tx = ctx.contract.resolve()?.create_profile(&name, &avatar_url)?;
            let digest = ctx.run_sponsored(&signer, &tx).await?;
            print_json(&json!({ "digest": digest, "name": name }))
        }
        ProfileSubcommand::Show { address } => {
            let address = match address {
                Some(address) => address,
                None => ctx.signer()?.address(),
            };
            let json: Value = ctx.relay.get(&format!("/api/profiles/{}", address.to_hex())).await?;
            print_json(&json)
        }
    }
}

async fn run_stream(ctx: &CliContext, stream: StreamCommand) -> Result<(), CliError> {
    match stream.command {
        StreamSubcommand::Start(args) => {
            validate_stream(&args.title, &args.description, &args.category)?;
            let signer = ctx.signer()?;
            let contract = ctx.contract.resolve()?;

            eprintln!("creating video stream");
            let created: Value = ctx
                .relay
                .post("/api/create-stream", &args.create_request())
                .await?;
            let new_stream = new_stream_from(&created, &args)?;

            let digest = ctx.run_sponsored(&signer, &contract.create_stream(&new_stream)?).await?;
            print_json(&json!({
                "digest": digest,
                "streamId": new_stream.stream_id,
                "playbackId": new_stream.playback_id,
                "playbackUrl": new_stream.playback_url,
                "ingestUrl": ingest_url(&new_stream.stream_key),
            }))
        }
        StreamSubcommand::End { id } => {
            let signer = ctx.signer()?;
            let tx = ctx.contract.resolve()?.end_stream(&id)?;
            let digest = ctx.run_sponsored(&signer, &tx).await?;
            let ended: MessageBody = ctx.relay.post(&format!("/api/stream/end/{id}"), &json!({})).await?;
            print_json(&json!({ "digest": digest, "message": ended.message }))
        }
        StreamSubcommand::List { status } => {
            let json: Value = ctx.relay.get(&format!("/api/streams?status={status}")).await?;
            print_json(&json)
        }
        StreamSubcommand::Info { playback_id } => {
            let json: Value = ctx.relay.get(&format!("/api/stream/{playback_id}")).await?;
            print_json(&json)
        }
        StreamSubcommand::Live { id } => {
            let json: Value = ctx.relay.get(&format!("/api/stream/live/{id}")).await?;
            print_json(&json)
        }
    }
}

async fn run_tip(ctx: &CliContext, stream_id: &str, amount: f64) -> Result<(), CliError> {
    let mist = sui_to_mist(amount)?;
    let signer = ctx.signer()?;
    let contract = ctx.contract.resolve()?;

    let coins = ctx.rpc()?.get_coins(&signer.address()).await?;
    let picked = select_coins(&coins, mist)?;
    let tx = contract.send_tip(stream_id, mist, &TipSource::Coins(picked))?;
    let digest = ctx.run_sponsored(&signer, &tx).await?;
    print_json(&json!({ "digest": digest, "streamId": stream_id, "amountMist": mist }))
}

/// Map the video platform's create response onto the on-chain record.
fn new_stream_from(created: &Value, args: &StreamStartArgs) -> Result<NewStream, CliError> {
    let field = |name: &'static str| {
        created
            .get(name)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
            .ok_or(CliError::MissingField(name))
    };
    let stream_id = field("id")?;
    let playback_id = field("playbackId")?;
    Ok(NewStream {
        name: args.title.clone(),
        description: args.description.clone(),
        thumbnail_url: args.thumbnail_url.clone(),
        playback_url: playback_url(&playback_id),
        stream_key: field("streamKey")?,
        chat_id: stream_id.clone(),
        categories: vec![args.category.clone()],
        playback_id,
        stream_id,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
