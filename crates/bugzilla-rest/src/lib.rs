//! Async client for the Bugzilla REST API.
//!
//! Covers the slice of the API a command-line frontend needs: sessions and
//! credentials, products, bug search/create/update and attachments.
//!
//! # Example
//!
//! ```rust,no_run
//! use bugzilla_rest::{Client, ClientOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::connect(ClientOptions::new("bugzilla.redhat.com")).await?;
//!     for product in client.products(&[], &["name".to_string()]).await? {
//!         println!("{}", product.name);
//!     }
//!     Ok(())
//! }
//! ```

mod client;
pub mod credentials;
mod error;
mod types;

pub use client::{normalize_url, Client, ClientOptions};
pub use credentials::CredentialCache;
pub use error::{BugzillaError, ErrorKind, Result};
pub use types::*;

/// Service used when nothing else is configured.
pub const DEFAULT_URL: &str = "https://bugzilla.redhat.com";
