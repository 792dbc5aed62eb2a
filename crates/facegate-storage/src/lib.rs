//! Storage layer for the facegate door controller.
//!
//! Two things are persisted:
//!
//! - Enrolled identities, through the [`PersistenceStore`] trait. Each
//!   identity is a name and a reference embedding, kept in enrollment order.
//! - The unlock audit trail, through the [`AuditLog`] trait. One entry is
//!   written per unlock triggered by a confirmed identity.
//!
//! [`SqliteIdentityRepository`] and [`SqliteAuditLog`] implement the traits
//! on a SQLite [`Database`] with embedded migrations.
//! [`MemoryPersistence`] and [`MemoryAuditLog`] implement them in memory,
//! with failure injection for tests.
//!
//! # Example
//!
//! ```no_run
//! use facegate_storage::{Database, DatabaseConfig, EnrollmentRecord, PersistenceStore, SqliteIdentityRepository};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("facegate.db")).await?;
//! let identities = SqliteIdentityRepository::new(db.pool().clone());
//!
//! identities.save(&EnrollmentRecord::new("alice", vec![0.1; 128])).await?;
//! for record in identities.load().await? {
//!     match record {
//!         Ok(record) => println!("{} ({}-d)", record.name, record.dimension()),
//!         Err(corrupt) => eprintln!("skipping {corrupt}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod memory;
pub mod models;
pub mod repositories;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use memory::{MemoryAuditLog, MemoryPersistence};
pub use models::{AuditEntry, CorruptRecord, EnrollmentRecord, LoadedRecord};
pub use repositories::{AuditLog, PersistenceStore, SqliteAuditLog, SqliteIdentityRepository};
