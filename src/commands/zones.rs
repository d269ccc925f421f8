use anyhow::{Context, Result};

use terminjaeger::api::ApiClient;
use terminjaeger::catalog::ZoneCatalog;
use terminjaeger::config::Config;
use terminjaeger::utils::normalize_host_url;

pub async fn zones(config: Config, host: Option<String>) -> Result<()> {
    let host = match host {
        Some(raw) => Some(
            normalize_host_url(&raw).with_context(|| format!("Invalid host URL: {raw}"))?,
        ),
        None => None,
    };

    let api = ApiClient::new(&config).context("Failed to create HTTP client")?;
    let catalog = ZoneCatalog::load(&api, &config.api.catalog_url)
        .await
        .context("Failed to load the zone catalog")?;

    let mut shown = 0;
    for (url, zones) in catalog.groups() {
        if host.as_deref().is_some_and(|h| h != url) {
            continue;
        }
        println!("{url}");
        for zone in zones {
            println!("  {:<6} {} ({})", zone.plz, zone.name.trim(), zone.city);
        }
        println!();
        shown += zones.len();
    }

    if shown == 0 {
        println!("No zones found.");
    } else {
        println!("{shown} zone(s) in {} host group(s)", catalog.hosts().count());
    }
    Ok(())
}
