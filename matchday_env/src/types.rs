//! Wire types shared between the simulator and the match store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a fixture in the match store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixtureId(pub u64);

impl std::fmt::Display for FixtureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a team in the match store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub u64);

impl std::fmt::Display for TeamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "team-{}", self.0)
    }
}

/// Lifecycle status of a fixture.
///
/// Transitions only move forward: `Scheduled -> Live -> Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixtureStatus {
    Scheduled,
    Live,
    Finished,
}

impl FixtureStatus {
    /// Returns true if a fixture in `self` may be reported as `next`.
    ///
    /// Re-delivering the same status is allowed (updates are idempotent),
    /// moving backwards is not. `Scheduled -> Finished` is allowed because
    /// recovered fixtures only ever report their terminal state.
    pub fn can_advance_to(self, next: FixtureStatus) -> bool {
        next >= self
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FixtureStatus::Scheduled => "scheduled",
            FixtureStatus::Live => "live",
            FixtureStatus::Finished => "finished",
        }
    }
}

impl std::fmt::Display for FixtureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureSide {
    /// Team playing on this side
    #[serde(rename = "id")]
    pub team_id: TeamId,

    /// Display name (informational only)
    #[serde(default)]
    pub name: String,

    /// Goals scored so far
    #[serde(default)]
    pub score: u32,
}

impl FixtureSide {
    pub fn new(team_id: TeamId, name: impl Into<String>) -> Self {
        Self {
            team_id,
            name: name.into(),
            score: 0,
        }
    }
}

/// A scheduled match between two teams, as served by the match store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    pub id: FixtureId,

    /// Competition/event this fixture belongs to
    pub event_id: u64,

    /// Kick-off time
    #[serde(rename = "date")]
    pub scheduled_at: DateTime<Utc>,

    pub status: FixtureStatus,

    pub home: FixtureSide,

    pub away: FixtureSide,
}

impl Fixture {
    /// Creates a scheduled fixture with a 0-0 score.
    pub fn scheduled(
        id: FixtureId,
        event_id: u64,
        scheduled_at: DateTime<Utc>,
        home: TeamId,
        away: TeamId,
    ) -> Self {
        Self {
            id,
            event_id,
            scheduled_at,
            status: FixtureStatus::Scheduled,
            home: FixtureSide::new(home, ""),
            away: FixtureSide::new(away, ""),
        }
    }

    /// Returns a copy with the given status and scores substituted.
    pub fn snapshot(&self, status: FixtureStatus, home_score: u32, away_score: u32) -> Self {
        let mut copy = self.clone();
        copy.status = status;
        copy.home.score = home_score;
        copy.away.score = away_score;
        copy
    }

    pub fn is_draw(&self) -> bool {
        self.home.score == self.away.score
    }
}

/// A player on a team roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: u64,

    #[serde(default)]
    pub first_name: String,

    #[serde(default)]
    pub last_name: String,

    /// Rating used to derive team strength (40-60 in the store)
    pub power: u32,

    #[serde(default)]
    pub team_id: Option<TeamId>,
}

impl Player {
    /// Creates an anonymous player with the given power rating.
    pub fn with_power(id: u64, power: u32) -> Self {
        Self {
            id,
            first_name: String::new(),
            last_name: String::new(),
            power,
            team_id: None,
        }
    }
}

/// Absolute fixture state pushed to the store.
///
/// Always carries the full score and status, never a delta, so duplicate or
/// out-of-order delivery converges on the latest state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureUpdate {
    #[serde(skip)]
    pub fixture_id: FixtureId,

    pub status: FixtureStatus,

    pub home_team_score: u32,

    pub away_team_score: u32,
}

impl FixtureUpdate {
    pub fn new(fixture_id: FixtureId, status: FixtureStatus, home_score: u32, away_score: u32) -> Self {
        Self {
            fixture_id,
            status,
            home_team_score: home_score,
            away_team_score: away_score,
        }
    }
}

impl From<&Fixture> for FixtureUpdate {
    fn from(fixture: &Fixture) -> Self {
        Self::new(fixture.id, fixture.status, fixture.home.score, fixture.away.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixture_decodes_store_payload() {
        let json = r#"{
            "id": 7,
            "eventId": 2,
            "date": "2024-05-01T18:30:00.000Z",
            "status": "scheduled",
            "home": { "id": 3, "name": "Lions", "score": 0 },
            "away": { "id": 4, "name": "Tigers", "score": 0 }
        }"#;

        let fixture: Fixture = serde_json::from_str(json).unwrap();

        assert_eq!(fixture.id, FixtureId(7));
        assert_eq!(fixture.event_id, 2);
        assert_eq!(fixture.status, FixtureStatus::Scheduled);
        assert_eq!(fixture.home.team_id, TeamId(3));
        assert_eq!(fixture.away.name, "Tigers");
        assert_eq!(
            fixture.scheduled_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 18, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_update_body_matches_store_contract() {
        let update = FixtureUpdate::new(FixtureId(9), FixtureStatus::Finished, 2, 1);
        let body = serde_json::to_value(&update).unwrap();

        assert_eq!(
            body,
            serde_json::json!({ "status": "finished", "homeTeamScore": 2, "awayTeamScore": 1 })
        );
    }

    #[test]
    fn test_status_only_moves_forward() {
        use FixtureStatus::*;

        assert!(Scheduled.can_advance_to(Live));
        assert!(Scheduled.can_advance_to(Finished));
        assert!(Live.can_advance_to(Live));
        assert!(Live.can_advance_to(Finished));
        assert!(!Finished.can_advance_to(Live));
        assert!(!Live.can_advance_to(Scheduled));
    }

    #[test]
    fn test_snapshot_substitutes_state() {
        let kickoff = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let fixture = Fixture::scheduled(FixtureId(1), 1, kickoff, TeamId(1), TeamId(2));

        let snap = fixture.snapshot(FixtureStatus::Live, 3, 1);

        assert_eq!(snap.status, FixtureStatus::Live);
        assert_eq!(snap.home.score, 3);
        assert_eq!(snap.away.score, 1);
        assert_eq!(fixture.home.score, 0);
        assert!(!snap.is_draw());
    }
}
