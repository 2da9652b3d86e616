//! # Repository Module
//!
//! Database access for the till ledger.
//!
//! ## Two Kinds of Repository
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Pool-owning (collaborator data, no ledger invariants)                 │
//! │  └── ProductRepository   db.products().insert(..) / stock_of(..)       │
//! │                                                                         │
//! │  Connection-scoped (ledger data, always inside a TillService tx)       │
//! │  ├── shift           insert_open, mark_closed, find_open, ...          │
//! │  ├── sale            next_sale_number, insert_if_shift_open, ...       │
//! │  ├── inventory       apply_delta (the only stock writer)               │
//! │  └── reconciliation  load_completed, arqueo_for                        │
//! │                                                                         │
//! │  TillService                                                           │
//! │     let mut tx = db.begin().await?;                                    │
//! │     shift::mark_closed(&mut tx, ..).await?;                            │
//! │     reconciliation::arqueo_for(&mut tx, ..).await?;                    │
//! │     tx.commit().await?;                                                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod inventory;
pub mod product;
pub mod reconciliation;
pub mod sale;
pub mod shift;
