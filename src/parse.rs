use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "plantsoul")]
#[command(about = "Browse and care for plants registered as tokens on the PlantSoul registry")]
#[command(version = "0.1")]
pub(crate) struct Args {
    /// Registry contract address
    #[arg(long, env = "PLANT_REGISTRY_ADDRESS", global = true)]
    pub registry: Option<String>,

    /// Steward badge contract address
    #[arg(long, env = "BADGE_ADDRESS", global = true)]
    pub badge: Option<String>,

    /// Gateway host used to resolve photo content identifiers
    #[arg(long, env = "GATEWAY_URL", global = true)]
    pub gateway: Option<String>,

    /// Wallet SDK client identifier, also selects the default RPC endpoint
    #[arg(long, env = "THIRDWEB_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    /// Explicit JSON-RPC endpoint (overrides the client id endpoint)
    #[arg(long, env = "RPC_URL", global = true)]
    pub rpc_url: Option<String>,

    /// Upload proxy endpoint
    #[arg(long, env = "UPLOAD_URL", global = true)]
    pub upload_url: Option<String>,

    /// Per-token fetch timeout in seconds
    #[arg(long, default_value = "10", global = true)]
    pub timeout_secs: u64,

    /// Maximum number of concurrent token fetches
    #[arg(short, long, default_value = "8", global = true)]
    pub concurrent: usize,

    /// Retry attempts for transaction submission (0 disables retry)
    #[arg(short, long, default_value = "0", global = true)]
    pub retries: u32,

    /// Base delay between submission retries in milliseconds
    #[arg(long, default_value = "500", global = true)]
    pub retry_delay_ms: u64,

    /// Hide progress bars
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// List the plants held by an account
    Mine {
        #[arg(short, long, env = "WALLET_ACCOUNT")]
        account: Option<String>,
        /// Reload whenever the balance changes, polling every N seconds
        #[arg(long)]
        watch: Option<u64>,
        /// Write the list to a CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// List every registered plant
    Community {
        /// Only plants listed for adoption
        #[arg(long)]
        adoptable: bool,
        #[arg(short, long, env = "WALLET_ACCOUNT")]
        account: Option<String>,
        /// Reload whenever the total supply changes, polling every N seconds
        #[arg(long)]
        watch: Option<u64>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Show one plant and its stewardship history
    Plant {
        id: u64,
        #[arg(short, long, env = "WALLET_ACCOUNT")]
        account: Option<String>,
    },
    /// Read a plant through the six-field `plants(id)` getter
    Legacy { id: u64 },
    /// List steward badges held by an account
    Badges {
        #[arg(short, long, env = "WALLET_ACCOUNT")]
        account: Option<String>,
    },
    /// Register a new plant with an initial photo
    Register {
        #[arg(short, long, env = "WALLET_ACCOUNT")]
        account: Option<String>,
        #[arg(short, long)]
        species: String,
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        photo: PathBuf,
    },
    /// Pass a plant to a new steward
    Transfer {
        id: u64,
        #[arg(short, long, env = "WALLET_ACCOUNT")]
        account: Option<String>,
        #[arg(long)]
        to: String,
    },
    /// Submit a care photo for a plant
    Proof {
        id: u64,
        #[arg(short, long, env = "WALLET_ACCOUNT")]
        account: Option<String>,
        #[arg(short, long)]
        photo: PathBuf,
    },
    /// Memorialize a plant. This cannot be undone
    Memorialize {
        id: u64,
        #[arg(short, long, env = "WALLET_ACCOUNT")]
        account: Option<String>,
        #[arg(long)]
        yes: bool,
    },
    /// List a plant for adoption at a location
    AdoptList {
        id: u64,
        #[arg(short, long, env = "WALLET_ACCOUNT")]
        account: Option<String>,
        #[arg(short, long)]
        location: String,
    },
    /// Upload a file through the proxy and print its content identifier
    Upload { file: PathBuf },
    /// Run the upload proxy in front of the pinning service
    ServeUploads {
        #[arg(long, default_value = "0.0.0.0:3000")]
        bind: String,
        #[arg(long, env = "PINATA_JWT", hide_env_values = true)]
        pinata_jwt: Option<String>,
    },
}
