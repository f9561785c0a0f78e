//! Vote ledger rules
//!
//! A vote is a signed edge `(voter, target) -> ±1`. There is never a neutral
//! row: voting the same direction twice removes the edge.

use super::TargetKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn value(&self) -> i64 {
        match self {
            VoteDirection::Up => 1,
            VoteDirection::Down => -1,
        }
    }
}

impl TryFrom<i16> for VoteDirection {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(VoteDirection::Up),
            -1 => Ok(VoteDirection::Down),
            other => Err(format!("unknown vote direction: {}", other)),
        }
    }
}

impl From<VoteDirection> for i16 {
    fn from(direction: VoteDirection) -> Self {
        match direction {
            VoteDirection::Up => 1,
            VoteDirection::Down => -1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vote {
    pub voter_id: Uuid,
    pub target_id: Uuid,
    #[sqlx(try_from = "String")]
    pub target_kind: TargetKind,
    #[sqlx(try_from = "i16")]
    pub direction: VoteDirection,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a `castVote` call does to the ledger, decided from the existing row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VoteTransition {
    Insert { direction: VoteDirection },
    Retract { direction: VoteDirection },
    Flip { from: VoteDirection, to: VoteDirection },
}

impl VoteTransition {
    pub fn plan(existing: Option<VoteDirection>, requested: VoteDirection) -> Self {
        match existing {
            None => VoteTransition::Insert {
                direction: requested,
            },
            Some(current) if current == requested => VoteTransition::Retract {
                direction: current,
            },
            Some(current) => VoteTransition::Flip {
                from: current,
                to: requested,
            },
        }
    }

    /// Change in net score caused by this transition
    pub fn score_delta(&self) -> i64 {
        match self {
            VoteTransition::Insert { direction } => direction.value(),
            VoteTransition::Retract { direction } => -direction.value(),
            VoteTransition::Flip { to, .. } => 2 * to.value(),
        }
    }

    /// `(upvotes, downvotes)` counter deltas
    pub fn counter_deltas(&self) -> (i64, i64) {
        fn unit(direction: VoteDirection) -> (i64, i64) {
            match direction {
                VoteDirection::Up => (1, 0),
                VoteDirection::Down => (0, 1),
            }
        }
        match self {
            VoteTransition::Insert { direction } => unit(*direction),
            VoteTransition::Retract { direction } => {
                let (up, down) = unit(*direction);
                (-up, -down)
            }
            VoteTransition::Flip { from, to } => {
                let (up_from, down_from) = unit(*from);
                let (up_to, down_to) = unit(*to);
                (up_to - up_from, down_to - down_from)
            }
        }
    }

    /// Direction stored in the ledger after the transition, if any
    pub fn resulting_direction(&self) -> Option<VoteDirection> {
        match self {
            VoteTransition::Insert { direction } => Some(*direction),
            VoteTransition::Retract { .. } => None,
            VoteTransition::Flip { to, .. } => Some(*to),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VoteTransition::Insert { .. } => "insert",
            VoteTransition::Retract { .. } => "retract",
            VoteTransition::Flip { .. } => "flip",
        }
    }
}

/// Denormalized counters of one item, as reconciled from the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCounters {
    pub target_id: Uuid,
    pub target_kind: TargetKind,
    pub upvotes: i64,
    pub downvotes: i64,
}

impl VoteCounters {
    pub fn net_score(&self) -> i64 {
        self.upvotes - self.downvotes
    }
}

/// Result of a committed vote
#[derive(Debug, Clone, Serialize)]
pub struct VoteOutcome {
    pub transition: VoteTransition,
    pub counters: VoteCounters,
    pub net_score: i64,
    pub current_vote: Option<VoteDirection>,
}

impl VoteOutcome {
    pub fn new(transition: VoteTransition, counters: VoteCounters) -> Self {
        Self {
            transition,
            counters,
            net_score: counters.net_score(),
            current_vote: transition.resulting_direction(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_vote_inserts() {
        let t = VoteTransition::plan(None, VoteDirection::Up);
        assert_eq!(t, VoteTransition::Insert { direction: VoteDirection::Up });
        assert_eq!(t.score_delta(), 1);
        assert_eq!(t.counter_deltas(), (1, 0));
    }

    #[test]
    fn test_same_direction_retracts() {
        let t = VoteTransition::plan(Some(VoteDirection::Down), VoteDirection::Down);
        assert_eq!(t, VoteTransition::Retract { direction: VoteDirection::Down });
        assert_eq!(t.score_delta(), 1);
        assert_eq!(t.counter_deltas(), (0, -1));
        assert_eq!(t.resulting_direction(), None);
    }

    #[test]
    fn test_opposite_direction_flips() {
        let t = VoteTransition::plan(Some(VoteDirection::Up), VoteDirection::Down);
        assert_eq!(t.score_delta(), -2);
        assert_eq!(t.counter_deltas(), (-1, 1));
        assert_eq!(t.resulting_direction(), Some(VoteDirection::Down));
    }

    #[test]
    fn test_up_then_up_is_identity() {
        let first = VoteTransition::plan(None, VoteDirection::Up);
        let second = VoteTransition::plan(first.resulting_direction(), VoteDirection::Up);
        assert_eq!(first.score_delta() + second.score_delta(), 0);
        assert_eq!(second.resulting_direction(), None);
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!(VoteDirection::try_from(1).unwrap(), VoteDirection::Up);
        assert_eq!(VoteDirection::try_from(-1).unwrap(), VoteDirection::Down);
        assert!(VoteDirection::try_from(0).is_err());
        assert!(serde_json::from_str::<VoteDirection>("2").is_err());
        assert_eq!(serde_json::to_string(&VoteDirection::Down).unwrap(), "-1");
    }
}
