//! # Database Operations
//!
//! PostgreSQL connection management and identifier handling.
//!
//! ## Key Components
//!
//! - [`connection`] - Pool construction, health check and table listing
//! - [`identifiers`] - Validation and quoting of table and schema names
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use hospital_analytics::config::DatabaseConfig;
//! use hospital_analytics::database::DatabaseConnection;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DatabaseConnection::connect(&DatabaseConfig::default()).await?;
//! if db.health_check().await? {
//!     for table in db.list_tables().await? {
//!         println!("{table}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod identifiers;

pub use connection::DatabaseConnection;
pub use identifiers::{qualified_name, quote_identifier, validate_identifier, MAX_IDENTIFIER_LENGTH};
