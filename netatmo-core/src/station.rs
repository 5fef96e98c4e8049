//! Station data endpoint.
//!
//! `GET /api/getstationsdata?app_type=app_station` returns the full station and
//! module tree in one response.

use reqwest::Method;
use tracing::debug;

use crate::client::NetatmoClient;
use crate::error::{FetchError, truncate_body};
use crate::model::DeviceCollection;

pub const STATIONS_PATH: &str = "api/getstationsdata";
pub const APP_TYPE: &str = "app_station";

impl NetatmoClient {
    /// Fetch every station visible to the user, with their modules.
    ///
    /// Each call returns a new, independent tree.
    pub async fn read(&self) -> Result<DeviceCollection, FetchError> {
        let raw = self.execute(Method::GET, STATIONS_PATH, &[("app_type", APP_TYPE)]).await?;

        let collection: DeviceCollection = serde_json::from_str(&raw.body)
            .map_err(|source| FetchError::Decode { source, body: truncate_body(&raw.body) })?;

        debug!(stations = collection.stations().len(), "station data decoded");
        Ok(collection)
    }
}
