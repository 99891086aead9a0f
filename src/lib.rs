//! # Post Eval
//!
//! An evaluation harness for social-media post extraction workflows.
//!
//! Each labeled dataset item (a venue post plus the artists, dates and venues
//! it announces) is sent to an extraction workflow, the structured output is
//! scored against the expected one, and the trace, observation and score are
//! recorded in an experiment-tracking backend.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │  Dataset    │──▶│  Evaluator  │──▶│  Extraction  │
//! │ CSV/Remote  │   │ (per item)  │◀──│  workflow    │
//! └─────────────┘   └──────┬──────┘   └──────────────┘
//!                          │
//!            ┌─────────────┼──────────────┐
//!            ▼             ▼              ▼
//!       ┌─────────┐  ┌───────────┐  ┌──────────┐
//!       │ Scorer  │  │ Tracking  │  │  SQLite  │
//!       │ JSON ED │  │ Langfuse  │  │  events  │
//!       └─────────┘  └───────────┘  └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! peval init --seed                       # create the event database
//! peval run --dataset dataset.csv         # evaluate a CSV dataset
//! peval run --dataset langfuse:posts_db   # evaluate a remote dataset
//! peval extract --caption "Este viernes tenemos a @insaniam" --date 2024-05-05
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and run parameters |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`dataset`] | CSV and remote dataset sources |
//! | [`extraction`] | Extraction workflow client and response resolution |
//! | [`scorer`] | JSON edit-distance similarity |
//! | [`tracking`] | Trace recorders (Langfuse, in-memory, disabled) |
//! | [`evaluate`] | Run orchestration |
//! | [`results`] | Per-item results and run summary |
//! | [`persist`] | Artist/venue/event persistence |
//! | [`connector_meta`] | Social-media post connector stub |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema bootstrap and seed data |
//! | [`logging`] | `tracing` subscriber setup |

pub mod config;
pub mod connector_meta;
pub mod dataset;
pub mod db;
pub mod error;
pub mod evaluate;
pub mod extraction;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod persist;
pub mod results;
pub mod scorer;
pub mod tracking;
