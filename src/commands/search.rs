use anyhow::{bail, Context, Result};
use std::path::Path;

use terminjaeger::config::Config;
use terminjaeger::engine::{Outcome, Terminsuche};
use terminjaeger::profile::Profile;
use terminjaeger::utils::shutdown::ShutdownSignal;

pub async fn search(
    mut config: Config,
    profile_path: &Path,
    poll_delay: Option<u64>,
    shutdown: ShutdownSignal,
) -> Result<()> {
    if let Some(secs) = poll_delay {
        config.search.poll_delay_secs = secs;
    }

    let profile = Profile::from_file(profile_path)
        .with_context(|| format!("Failed to load profile {}", profile_path.display()))?;

    let mut engine = Terminsuche::builder(profile, config)
        .shutdown(shutdown)
        .build()
        .await
        .context("Failed to start the search")?;

    match engine.run().await.context("Search aborted")? {
        Outcome::Booked(reservation) => {
            println!("Appointment booked in {}", reservation.zone);
            for line in reservation.slot_pair.describe() {
                println!("  {line}");
            }
            println!("A confirmation has been sent to the notification receiver.");
        }
        Outcome::Cancelled => println!("Search cancelled."),
        Outcome::CodesExhausted => {
            bail!("No valid access code left for any target zone")
        }
    }

    Ok(())
}
