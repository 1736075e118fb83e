//! Resource-manager API interaction
//!
//! # Module Structure
//!
//! - [`auth`] - bearer tokens and the ambient default subscription
//! - [`client`] - the [`RestClient`] seam and the JSON-level [`ArmClient`]
//! - [`error`] - typed failures the resolver distinguishes
//! - [`http`] - reqwest transport
//!
//! # Example
//!
//! ```ignore
//! use armtree::arm::{ArmClient, ArmCredentials, ArmHttpClient};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let http = ArmHttpClient::new(
//!         armtree::arm::http::DEFAULT_ENDPOINT,
//!         ArmCredentials::from_env(),
//!         std::time::Duration::from_secs(30),
//!     )?;
//!     let client = ArmClient::new(http);
//!     let groups = client
//!         .list("/subscriptions/{id}/resourceGroups?api-version=2021-04-01")
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod http;

pub use auth::ArmCredentials;
pub use client::{ArmClient, RestClient, RestResponse};
pub use error::ArmError;
pub use http::{format_arm_error, ArmHttpClient};
