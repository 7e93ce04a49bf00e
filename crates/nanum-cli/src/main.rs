//! Nanum chat core driver.
//!
//! # Usage
//!
//! ```bash
//! # Guest enters listing 42's room, owned by u1
//! nanum --as u2 ensure --room post_42 --title "Costco beef" --owner u1
//!
//! # Owner posts, guest reads
//! nanum --as u1 send --room post_42 --text "Pickup at 6"
//! nanum --as u2 read --room post_42
//!
//! # Owner closes the room and deletes the listing
//! nanum --as u1 leave --room post_42 --owner
//! ```

use std::process::ExitCode;

use clap::Parser;
use nanum_cli::{Cli, run};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();

    let mut stdout = std::io::stdout().lock();
    match run(&cli, &mut stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("error [{}]: {e}", e.code());
            ExitCode::FAILURE
        },
    }
}
