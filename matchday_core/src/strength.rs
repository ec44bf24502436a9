//! Team strength derived from a roster.

use matchday_env::Player;

/// Aggregate roster quality used to bias goal scoring.
pub type Strength = u32;

/// Anything that can report a strength value for one side of a fixture.
pub trait TeamStrength {
    fn strength(&self) -> Strength;
}

/// A fixed strength value, mostly useful for injecting known strengths.
impl TeamStrength for Strength {
    fn strength(&self) -> Strength {
        *self
    }
}

/// A team's players as loaded from the match store.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    players: Vec<Player>,
}

impl Roster {
    pub fn new(players: Vec<Player>) -> Self {
        Self { players }
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }
}

impl From<Vec<Player>> for Roster {
    fn from(players: Vec<Player>) -> Self {
        Self::new(players)
    }
}

impl TeamStrength for Roster {
    /// Sum of player power ratings; an empty roster is 0.
    fn strength(&self) -> Strength {
        self.players.iter().map(|p| p.power).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(powers: &[u32]) -> Roster {
        powers
            .iter()
            .enumerate()
            .map(|(i, &p)| Player::with_power(i as u64, p))
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn test_strength_is_sum_of_power() {
        assert_eq!(roster(&[40, 55, 60]).strength(), 155);
    }

    #[test]
    fn test_empty_roster_has_zero_strength() {
        let empty = Roster::default();
        assert!(empty.is_empty());
        assert_eq!(empty.strength(), 0);
    }

    #[test]
    fn test_fixed_strength() {
        assert_eq!(300u32.strength(), 300);
    }
}
