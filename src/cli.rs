use clap::{Parser, Subcommand};

/// Bilcekap: MyInvois TIN validation and e-invoice gateway
#[derive(Parser)]
#[command(name = "bilcekap", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind
        #[arg(short, long, env = "BILCEKAP_PORT")]
        port: Option<u16>,
    },

    /// Request a fresh MyInvois access token and print it
    Token,

    /// Validate a TIN against MyInvois and record the outcome
    Validate {
        tin: String,
        #[arg(long)]
        id_type: String,
        #[arg(long)]
        id_value: String,
    },

    /// Inspect mirrored taxpayer records
    Taxpayer {
        #[command(subcommand)]
        command: TaxpayerCommands,
    },

    /// Apply pending database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum TaxpayerCommands {
    /// List taxpayers
    List {
        #[arg(long, default_value = "0")]
        skip: i64,
        #[arg(long, default_value = "100")]
        limit: i64,
    },
    /// Show one taxpayer by TIN
    Get { tin: String },
}
