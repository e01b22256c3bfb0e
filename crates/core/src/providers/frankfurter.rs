use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use crate::errors::CoreError;
use super::traits::FxRateProvider;

const BASE_URL: &str = "https://api.frankfurter.dev/v1";

/// Frankfurter API provider for fiat exchange rates.
///
/// - **Free**: no API key, no rate limits, open-source.
/// - **Source**: European Central Bank reference rates.
/// - **Endpoints**: `/latest`, `/{date}`.
///
/// Rates are quoted as units of the requested symbol per one unit of the
/// base currency; the caller inverts them when storing rate-to-reference.
pub struct FrankfurterProvider {
    client: Client,
}

impl FrankfurterProvider {
    pub fn new(timeout_secs: u64) -> Self {
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(timeout_secs));
        #[cfg(target_arch = "wasm32")]
        let _ = timeout_secs;
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
        }
    }
}

#[derive(Deserialize)]
struct RatesResponse {
    rates: HashMap<String, f64>,
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl FxRateProvider for FrankfurterProvider {
    fn name(&self) -> &str {
        "Frankfurter"
    }

    async fn latest_rates(
        &self,
        base: &str,
        codes: &[String],
    ) -> Result<HashMap<String, f64>, CoreError> {
        let base = base.to_uppercase();
        let symbols = codes
            .iter()
            .map(|c| c.to_uppercase())
            .filter(|c| *c != base)
            .collect::<Vec<_>>()
            .join(",");
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{BASE_URL}/latest?base={base}&symbols={symbols}");
        log::debug!("Fetching FX rates for {symbols} against {base}");

        let resp: RatesResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .json()
            .await
            .map_err(|e| CoreError::Api {
                provider: "Frankfurter".into(),
                message: format!("Failed to parse latest rates for base {base}: {e}"),
            })?;

        Ok(resp.rates)
    }

    async fn historical_rate(
        &self,
        code: &str,
        base: &str,
        date: NaiveDate,
    ) -> Result<f64, CoreError> {
        let base = base.to_uppercase();
        let code = code.to_uppercase();
        if base == code {
            return Ok(1.0);
        }

        let date_str = date.format("%Y-%m-%d");
        let url = format!("{BASE_URL}/{date_str}?base={base}&symbols={code}");

        let resp: RatesResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .json()
            .await
            .map_err(|e| CoreError::Api {
                provider: "Frankfurter".into(),
                message: format!("Failed to parse rate for {base}/{code} on {date}: {e}"),
            })?;

        resp.rates
            .get(&code)
            .copied()
            .ok_or(CoreError::UnknownCurrency { code })
    }
}
