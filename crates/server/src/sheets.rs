use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use citabot_core::config::SheetsConfig;
use citabot_store::{CellRef, GridStore, StoreError};

use crate::http::{ensure_success, join_segments, request_error};

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueUpdate<'a> {
    range: String,
    major_dimension: &'static str,
    values: [[&'a str; 1]; 1],
}

/// Grid store backed by the spreadsheet values API, one cell per request.
pub struct SheetsGridStore {
    http: Client,
    base_url: String,
    spreadsheet_id: String,
    access_token: SecretString,
    timeout_secs: u64,
}

impl SheetsGridStore {
    /// `None` unless the section is enabled and fully configured.
    pub fn from_config(config: &SheetsConfig) -> Result<Option<Self>, reqwest::Error> {
        let (true, Some(spreadsheet_id), Some(access_token)) =
            (config.enabled, config.spreadsheet_id.as_ref(), config.access_token.as_ref())
        else {
            return Ok(None);
        };

        let http = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Some(Self {
            http,
            base_url: config.base_url.clone(),
            spreadsheet_id: spreadsheet_id.clone(),
            access_token: access_token.clone(),
            timeout_secs: config.timeout_secs,
        }))
    }

    fn values_url(&self, cell: &CellRef) -> Result<reqwest::Url, StoreError> {
        join_segments(
            &self.base_url,
            &["spreadsheets", self.spreadsheet_id.as_str(), "values", cell.a1().as_str()],
        )
    }
}

#[async_trait]
impl GridStore for SheetsGridStore {
    async fn read_cell(&self, cell: &CellRef) -> Result<Option<String>, StoreError> {
        let response = self
            .http
            .get(self.values_url(cell)?)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(|error| request_error(error, self.timeout_secs))?;
        let range = ensure_success(response)
            .await?
            .json::<ValueRange>()
            .await
            .map_err(|error| StoreError::Decode(error.to_string()))?;

        debug!(cell = %cell, "grid cell read");
        Ok(first_value(range))
    }

    async fn write_cell(&self, cell: &CellRef, value: &str) -> Result<(), StoreError> {
        let body = ValueUpdate { range: cell.a1(), major_dimension: "ROWS", values: [[value]] };
        let response = self
            .http
            .put(self.values_url(cell)?)
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(self.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| request_error(error, self.timeout_secs))?;
        ensure_success(response).await?;

        debug!(cell = %cell, "grid cell written");
        Ok(())
    }
}

/// Empty ranges come back without a `values` key at all.
fn first_value(range: ValueRange) -> Option<String> {
    range
        .values
        .into_iter()
        .next()
        .and_then(|row| row.into_iter().next())
        .filter(|value| !value.trim().is_empty())
}
