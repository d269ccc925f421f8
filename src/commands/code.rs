use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use terminjaeger::api::ApiClient;
use terminjaeger::browser::ChromeLauncher;
use terminjaeger::catalog::ZoneCatalog;
use terminjaeger::codegen::{CodeRequest, CodeRequester};
use terminjaeger::config::Config;
use terminjaeger::cookies::CookieProvider;
use terminjaeger::utils::shutdown::ShutdownSignal;
use terminjaeger::validation::DATE_FORMAT;

pub async fn code(
    config: Config,
    plz: String,
    email: String,
    phone: String,
    birthday: String,
    shutdown: ShutdownSignal,
) -> Result<()> {
    let birthday = NaiveDate::parse_from_str(birthday.trim(), DATE_FORMAT)
        .with_context(|| format!("Invalid birthday \"{birthday}\", expected dd.mm.yyyy"))?;
    let request = CodeRequest {
        plz,
        email,
        phone,
        birthday,
    };
    request.validate().context("Invalid code request")?;

    let api = Arc::new(ApiClient::new(&config).context("Failed to create HTTP client")?);
    let catalog = ZoneCatalog::load(&api, &config.api.catalog_url)
        .await
        .context("Failed to load the zone catalog")?;
    let zone = catalog
        .by_plz(&request.plz)
        .with_context(|| format!("Zone {} not in the catalog", request.plz))?
        .clone();

    let launcher = Arc::new(ChromeLauncher::new(config.browser.clone()));
    let cookies = Arc::new(CookieProvider::new(launcher, &config));
    let requester = CodeRequester::new(api, cookies, &config);

    let mut pending = requester
        .request(&zone, &request, &shutdown)
        .await
        .context("Code request failed")?;
    println!("An SMS PIN has been sent to {}", request.phone);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("SMS PIN: ");
        std::io::stdout().flush()?;

        let Some(pin) = lines.next_line().await? else {
            bail!("No PIN entered");
        };
        if pin.trim().is_empty() {
            bail!("No PIN entered");
        }

        if requester
            .verify(&mut pending, &pin, &shutdown)
            .await
            .context("PIN verification failed")?
        {
            println!("Code verified. It will be sent to {}", request.email);
            return Ok(());
        }
        println!("Wrong PIN, try again.");
    }
}
