//! # Shelf Harvest
//!
//! An incremental book-catalog harvester. Given a target of N items with M
//! reviews each, `shelf acquire` compares the target with what is already
//! stored and only does the remaining work: new items for the deficit, and
//! extra reviews for items that fall short.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │   Snapshot   │──▶│  Harvester   │──▶│  MirroredStore   │
//! │ pages/items/ │   │ (core crate) │   │ local|S3 + SQLite│
//! │   reviews    │   └──────────────┘   └──────────────────┘
//! └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! shelf init                    # create data dir and mirror schema
//! shelf acquire 40 10           # 40 books, 10 reviews each
//! shelf acquire 40 15           # top the same 40 books up to 15 reviews
//! shelf stats
//! shelf verify
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`snapshot`] | Captured listing: page source and extractors |
//! | [`local_store`] | Filesystem store |
//! | [`s3_store`] | Amazon S3 store |
//! | [`sqlite_store`] | SQLite relational mirror |
//! | [`stores`] | Store assembly from config |
//! | [`acquire_cmd`] | `shelf acquire` |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations and `shelf init` |

pub mod acquire_cmd;
pub mod assets;
pub mod config;
pub mod db;
pub mod get;
pub mod layout;
pub mod local_store;
pub mod migrate;
pub mod progress;
pub mod s3_store;
pub mod snapshot;
pub mod sqlite_store;
pub mod stats;
pub mod stores;
pub mod verify;
