/// Data acquisition: PETSS ensemble archives and CO-OPS observations.

use std::time::Duration;

use crate::model::Result;

pub mod coops;
pub mod petss;

#[cfg(test)]
pub(crate) mod fixtures;

/// Builds the shared blocking HTTP client (30 s request timeout).
pub fn http_client() -> Result<reqwest::blocking::Client> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("stormtide_service/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
