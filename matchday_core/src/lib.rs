//! Matchday Core - Fixture simulation engine
//!
//! Turns scheduled fixtures into simulated live matches:
//! 1. **Strength**: roster power ratings summed into a team strength
//! 2. **Simulation**: per-minute goal chances biased by the strength gap, no draws
//! 3. **Orchestration**: discovery, live/fast playback, and ordered store updates

pub mod error;
pub mod orchestrator;
pub mod publisher;
pub mod simulation;
pub mod strength;

// Re-export key types for convenience
pub use error::SimulatorError;
pub use orchestrator::{ActiveFixture, Simulator, SimulatorConfig};
pub use publisher::{update_queue, UpdatePublisher, UpdateReceiver, UpdateSender};
pub use simulation::{
    home_goal_chance, FixtureSimulation, PlaybackMode, Side, SimulationHooks, SimulationPhase,
    TickOutcome, DEFAULT_REGULATION_MINUTES, GOAL_PROBABILITY,
};
pub use strength::{Roster, Strength, TeamStrength};
