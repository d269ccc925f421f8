use anyhow::{Context, Result};
use std::path::Path;

use terminjaeger::profile::Profile;
use terminjaeger::utils::mask_code;

pub fn validate(profile_path: &Path) -> Result<()> {
    let profile = Profile::from_file(profile_path)
        .with_context(|| format!("Failed to load profile {}", profile_path.display()))?;
    let window = profile
        .validate()
        .with_context(|| format!("Profile {} is invalid", profile_path.display()))?;

    println!("Profile {} is valid", profile_path.display());
    println!(
        "  Codes: {}",
        profile
            .codes
            .iter()
            .map(|c| mask_code(c))
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Zones: {}", profile.target_zones.join(", "));
    println!(
        "  Contact: {} {}, {}",
        profile.contact.first_name, profile.contact.last_name, profile.contact.notification_receiver
    );
    match window {
        Some(window) => println!("  Time window: {window:?}"),
        None => println!("  Time window: none"),
    }
    Ok(())
}
