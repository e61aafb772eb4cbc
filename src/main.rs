use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use drop_keyring::cli::{Cli, Commands};
use drop_keyring::config::KeyringConfig;
use drop_keyring::{KeyRecord, Keyring, Result, User};

fn main() {
    let cli = Cli::parse();
    let loaded = KeyringConfig::load(&cli.config);

    let log_level = loaded.as_ref().map(|c| c.log_level.as_str()).unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Reported only now that the subscriber is installed
    let config = loaded.unwrap_or_else(|e| {
        warn!("{}. Using defaults.", e);
        KeyringConfig::default()
    });

    if let Err(e) = run(cli.command, &config) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands, config: &KeyringConfig) -> Result<()> {
    let keyring = Keyring::open(config)?;

    match command {
        Commands::Create { user, key_id, address } => {
            let record = keyring.create_key_record(&User::new(user), &key_id, &address)?;
            print_record(&record);
        }
        Commands::Show { user } => {
            let record = keyring.get_key_record_for_user(&User::new(user))?;
            print_record(&record);
        }
        Commands::Remaining { user } => {
            let record = keyring.get_key_record_for_user(&User::new(user))?;
            println!("{}", keyring.remaining_drops(&record));
        }
        Commands::Drop { user, enforce_cap } => {
            let record = keyring.get_key_record_for_user(&User::new(user))?;
            let updated = if enforce_cap {
                keyring.record_drop_within_cap(&record)?
            } else {
                keyring.record_drop(&record)?
            };
            print_record(&updated);
        }
    }

    Ok(())
}

fn print_record(record: &KeyRecord) {
    match serde_json::to_string_pretty(record) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Could not render key record: {}", e),
    }
}
