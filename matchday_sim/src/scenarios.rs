//! Harness scenarios exercising the simulator end to end.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// MD-001: Equal rosters never end level
    NoDraws,

    /// MD-002: A much stronger home side wins most fixtures
    StrengthBias,

    /// MD-003: Fixtures missed while offline are fast-forwarded
    MissedRecovery,

    /// MD-004: A fixture without players is skipped until it has some
    EmptyRoster,

    /// MD-005: Stale store reads never start a second simulation
    DuplicateGuard,

    /// MD-006: Failing fetches and pushes are survived
    FlakyStore,

    /// MD-007: A full day of staggered fixtures
    MatchDay,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::NoDraws,
            ScenarioId::StrengthBias,
            ScenarioId::MissedRecovery,
            ScenarioId::EmptyRoster,
            ScenarioId::DuplicateGuard,
            ScenarioId::FlakyStore,
            ScenarioId::MatchDay,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::NoDraws => "no_draws",
            ScenarioId::StrengthBias => "strength_bias",
            ScenarioId::MissedRecovery => "missed_recovery",
            ScenarioId::EmptyRoster => "empty_roster",
            ScenarioId::DuplicateGuard => "duplicate_guard",
            ScenarioId::FlakyStore => "flaky_store",
            ScenarioId::MatchDay => "match_day",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::NoDraws => "100 equal-strength fixtures, none may finish level",
            ScenarioId::StrengthBias => "500 runs of 400 vs 100 strength, home wins > 60%",
            ScenarioId::MissedRecovery => "Past fixtures report only their final state at start-up",
            ScenarioId::EmptyRoster => "Empty roster blocks kick-off without any store update",
            ScenarioId::DuplicateGuard => "Lagging store reads, one simulation per fixture",
            ScenarioId::FlakyStore => "Injected fetch and push failures, every fixture still finishes",
            ScenarioId::MatchDay => "20 staggered fixtures over an afternoon, ordered updates",
        }
    }

    /// Default number of fixtures the scenario plays.
    pub fn default_runs(&self) -> usize {
        match self {
            ScenarioId::NoDraws => 100,
            ScenarioId::StrengthBias => 500,
            ScenarioId::MissedRecovery => 6,
            ScenarioId::EmptyRoster => 1,
            ScenarioId::DuplicateGuard => 5,
            ScenarioId::FlakyStore => 4,
            ScenarioId::MatchDay => 20,
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "no_draws" | "nodraws" | "md-001" => Ok(ScenarioId::NoDraws),
            "strength_bias" | "strengthbias" | "md-002" => Ok(ScenarioId::StrengthBias),
            "missed_recovery" | "missedrecovery" | "md-003" => Ok(ScenarioId::MissedRecovery),
            "empty_roster" | "emptyroster" | "md-004" => Ok(ScenarioId::EmptyRoster),
            "duplicate_guard" | "duplicateguard" | "md-005" => Ok(ScenarioId::DuplicateGuard),
            "flaky_store" | "flakystore" | "md-006" => Ok(ScenarioId::FlakyStore),
            "match_day" | "matchday" | "md-007" => Ok(ScenarioId::MatchDay),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
