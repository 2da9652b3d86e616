//! # till-db: Storage and Transactions for the Till Ledger
//!
//! Every state change of the ledger (opening and closing shifts, recording
//! and cancelling sales, moving stock) happens here, inside one sqlx
//! transaction per operation.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Till Data Flow                                 │
//! │                                                                         │
//! │  HTTP handler (tenant + cashier from auth)                             │
//! │       │  TenantContext                                                  │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     till-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  TillService  │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │ (service.rs)  │───►│ shift, sale,  │    │  (embedded)  │  │   │
//! │  │   │               │    │ inventory,    │    │              │  │   │
//! │  │   │ one tx per    │    │ reconciliation│    │ 001_initial  │  │   │
//! │  │   │ operation     │    │ product       │    │              │  │   │
//! │  │   └───────┬───────┘    └───────────────┘    └──────────────┘  │   │
//! │  │           │ Database (pool.rs)                                  │   │
//! │  └───────────┼─────────────────────────────────────────────────────┘   │
//! │              ▼                                                          │
//! │         SQLite (WAL)                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`service`] - The ledger operations
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`config`] - `till.toml` and `TILL_*` environment settings
//! - [`error`] - Database and configuration error types
//! - [`repository`] - SQL for shifts, sales, stock and arqueo reads
//!
//! ## Usage
//!
//! ```rust,ignore
//! use till_db::{TillConfig, TillService};
//! use till_core::{OpenShiftRequest, TenantContext};
//!
//! let config = TillConfig::load(None)?;
//! let till = TillService::from_config(&config).await?;
//!
//! let ctx = TenantContext::cashier("tenant-1", "cashier-7");
//! let shift = till.open_shift(&ctx, OpenShiftRequest::default()).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{DatabaseSettings, LedgerSettings, TillConfig};
pub use error::{ConfigError, DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use service::TillService;

pub use repository::product::ProductRepository;
