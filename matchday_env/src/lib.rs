//! Matchday Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the matchday
//! simulator to run in both **Production** (tokio, REST store) and
//! **Simulation** (virtual clock, in-memory store) environments.
//!
//! # Core Concept
//!
//! Everything the engine cannot control is intercepted:
//! - Time (`system_time()`, `sleep()`)
//! - Tasks (`spawn()`)
//! - Randomness (`fixture_rng()`)
//! - The system of record (`MatchStore`)
//!
//! # Example
//!
//! ```ignore
//! use matchday_env::{SimulatorContext, MatchStore};
//!
//! async fn scan<Ctx: SimulatorContext, S: MatchStore>(ctx: &Ctx, store: &S) {
//!     loop {
//!         let fixtures = store.list_fixtures().await.unwrap_or_default();
//!         let now = ctx.system_time();
//!         // start fixtures whose kick-off has arrived ...
//!         ctx.sleep(Duration::from_secs(60)).await;
//!     }
//! }
//! ```

mod context;
mod store;
mod types;
mod error;
mod tokio_impl;
mod http_impl;

pub use context::SimulatorContext;
pub use store::MatchStore;
pub use types::{Fixture, FixtureId, FixtureSide, FixtureStatus, FixtureUpdate, Player, TeamId};
pub use error::StoreError;
pub use tokio_impl::TokioContext;
pub use http_impl::{HttpMatchStore, HttpStoreConfig, TOKEN_HEADER};
