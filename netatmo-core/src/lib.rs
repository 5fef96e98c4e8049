//! Client library for the Netatmo weather station API.
//!
//! This crate defines:
//! - OAuth2 session handling (password, authorization code, refresh token)
//! - An authenticated request executor with transparent token refresh
//! - The station/module device tree and its normalized sensor readings
//! - Configuration persisted between runs (app credentials, refresh token)
//!
//! It is used by `netatmo-cli`, but can also be reused by other binaries or services.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod session;
pub mod station;

pub use auth::{AuthorizationRequest, Authenticator, Endpoints};
pub use client::{NetatmoClient, RawResponse};
pub use config::Config;
pub use error::{AuthError, FetchError, NoDataAvailable, RequestError};
pub use model::{
    DashboardData, Device, DeviceCollection, DeviceInfo, DeviceInfoField, DeviceType, Place,
    Reading, SensorReadings, Snapshot,
};
pub use session::{ClientCredentials, Session};
