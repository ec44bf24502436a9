//! Matchday Deterministic Simulation Harness
//!
//! This crate provides a controlled environment where the simulator runs
//! unchanged against a virtual clock and an in-memory match store.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: Virtual clock advances only when every task is parked on it
//! - **Store**: In-memory fixtures and rosters with injectable failures
//! - **Randomness**: Every fixture stream derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                         │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (Virtual Clock + Timer Queue)             │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                        │                            │
//! │  ┌────▼──────┐   updates  ┌────▼──────────┐                 │
//! │  │ Simulator │───────────►│ InMemoryStore │                 │
//! │  │ + fixture │◄───────────│ (fault inject)│                 │
//! │  │   tasks   │  fixtures  └───────────────┘                 │
//! │  └───────────┘                                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use matchday_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::MatchDay);
//! assert!(result.passed);
//! ```

mod context;
mod runner;
mod store;
pub mod scenarios;

pub use context::SimContext;
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use store::{InMemoryStore, RecordedUpdate, StatusViolation};
