//! Match situations the harness can replay.

use nalgebra::{Point2, Point3, Vector2, Vector3};
use pitchview_env::TeamLabel;

use crate::oracle::{Oracle, BALL_RADIUS};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// PV-001: ground pass through midfield
    Rolling,

    /// PV-002: lofted ball that leaves the ground plane
    Lob,

    /// PV-003: ball carried at a player's feet
    Dribble,

    /// PV-004: long pass handed between the two end cameras
    Crossing,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Rolling,
            ScenarioId::Lob,
            ScenarioId::Dribble,
            ScenarioId::Crossing,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Rolling => "rolling",
            ScenarioId::Lob => "lob",
            ScenarioId::Dribble => "dribble",
            ScenarioId::Crossing => "crossing",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Rolling => "Ground pass across the centre circle, players nearby",
            ScenarioId::Lob => "Lofted ball peaking above 3m, fused height must follow it",
            ScenarioId::Dribble => "Player runs with the ball at their feet",
            ScenarioId::Crossing => "Long ground pass from one half into the other",
        }
    }

    /// Places the ball and players for this scenario.
    pub fn setup(&self, oracle: &mut Oracle) {
        match self {
            ScenarioId::Rolling => {
                oracle.place_ball(Point3::new(40.0, 30.0, BALL_RADIUS), Vector3::new(6.0, 1.5, 0.0));
                oracle.spawn_player(Point2::new(46.0, 40.0), Vector2::new(1.0, -0.5), TeamLabel::Home);
                oracle.spawn_player(Point2::new(58.0, 24.0), Vector2::new(-1.0, 0.5), TeamLabel::Away);
                oracle.spawn_player(Point2::new(52.0, 48.0), Vector2::zeros(), TeamLabel::Referee);
            }
            ScenarioId::Lob => {
                oracle.place_ball(Point3::new(36.0, 34.0, BALL_RADIUS), Vector3::new(9.0, 0.0, 8.0));
                oracle.spawn_player(Point2::new(34.0, 30.0), Vector2::new(2.0, 0.0), TeamLabel::Home);
                oracle.spawn_player(Point2::new(62.0, 40.0), Vector2::new(-2.0, 0.0), TeamLabel::Away);
            }
            ScenarioId::Dribble => {
                let carrier =
                    oracle.spawn_player(Point2::new(38.0, 36.0), Vector2::new(4.0, -0.5), TeamLabel::Home);
                oracle.spawn_player(Point2::new(60.0, 44.0), Vector2::new(-1.5, 0.0), TeamLabel::Away);
                oracle.give_ball(carrier);
            }
            ScenarioId::Crossing => {
                oracle.place_ball(Point3::new(30.0, 28.0, BALL_RADIUS), Vector3::new(14.0, 2.0, 0.0));
                oracle.spawn_player(Point2::new(25.0, 40.0), Vector2::new(3.0, 0.0), TeamLabel::Home);
                oracle.spawn_player(Point2::new(75.0, 20.0), Vector2::new(-2.0, 1.0), TeamLabel::Away);
            }
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
            "rolling" | "pv-001" => Ok(ScenarioId::Rolling),
            "lob" | "pv-002" => Ok(ScenarioId::Lob),
            "dribble" | "pv-003" => Ok(ScenarioId::Dribble),
            "crossing" | "pv-004" => Ok(ScenarioId::Crossing),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>(), Ok(id));
        }
        assert_eq!("PV-002".parse::<ScenarioId>(), Ok(ScenarioId::Lob));
        assert!("penalty".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_dribble_starts_carried() {
        let mut oracle = Oracle::new(1);
        ScenarioId::Dribble.setup(&mut oracle);
        assert!(oracle.ball().carrier.is_some());
    }
}
