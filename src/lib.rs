//! # travel-core
//!
//! The transactional core of a small distributed travel-booking database:
//! a per-table Resource Manager (RM), a Transaction Manager (TM) driving
//! two-phase commit across enlisted participants, and a Workflow Controller
//! (WC) orchestrating cross-participant business operations such as
//! `reserve`.
//!
//! ## Architecture
//!
//! - **`rm`**: storage primitives (`PageIO`, `KeySpec`, `CommittedPagePool`,
//!   `ShadowRecordPool`, `RowLockManager`, `PrepareJournal`) plus the
//!   `ResourceManager` that ties them together and its HTTP layer.
//! - **`tm`**: global transaction state and the 2PC driver, plus its HTTP
//!   layer.
//! - **`wc`**: the stateless orchestrator of business verbs and its HTTP
//!   layer.
//! - **`error`**: the wire-level error taxonomy shared by all three.
//! - **`config`**: per-component configuration loading.
//! - **`wire`**: shared request/response DTOs and the transaction-id
//!   extractor.

pub mod config;
pub mod error;
pub mod logging;
pub mod rm;
pub mod tm;
pub mod tm_link;
pub mod wc;
pub mod wire;
