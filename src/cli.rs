use clap::{Parser, Subcommand};

use crate::keyring::UserId;

#[derive(Parser, Debug)]
#[command(name = "drop_keyring")]
#[command(about = "Inspect and maintain custodial key records", long_about = None)]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "keyring.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision a key record for a user
    Create {
        #[arg(long)]
        user: UserId,
        /// Key identifier issued by the custodial signer
        #[arg(long)]
        key_id: String,
        #[arg(long)]
        address: String,
    },
    /// Print a user's key record
    Show {
        #[arg(long)]
        user: UserId,
    },
    /// Print how many drops a user has left
    Remaining {
        #[arg(long)]
        user: UserId,
    },
    /// Record one drop against a user's key record
    Drop {
        #[arg(long)]
        user: UserId,
        /// Refuse the drop once the cap is reached
        #[arg(long)]
        enforce_cap: bool,
    },
}
