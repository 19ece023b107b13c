//! Per-selection runner state

use rust_decimal::Decimal;

use super::ladder::{LevelLadder, PriceLadder};

/// Runner lifecycle status, decoded from the single-byte wire code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerStatus {
    Active,
    Winner,
    Loser,
    Removed,
    Hidden,
}

impl RunnerStatus {
    /// Decode A/W/L/R/H; the set is fixed, anything else is None
    pub fn from_code(code: u8) -> Option<RunnerStatus> {
        match code {
            b'A' => Some(RunnerStatus::Active),
            b'W' => Some(RunnerStatus::Winner),
            b'L' => Some(RunnerStatus::Loser),
            b'R' => Some(RunnerStatus::Removed),
            b'H' => Some(RunnerStatus::Hidden),
            _ => None,
        }
    }
}

/// One selection within a market
#[derive(Debug, Clone)]
pub struct Runner {
    id: i64,
    pub status: RunnerStatus,
    pub adjustment_factor: Decimal,
    pub best_available_to_back: LevelLadder,
    pub best_available_to_lay: LevelLadder,
    pub traded: PriceLadder,
}

impl Runner {
    /// A freshly-referenced runner starts Hidden until a definition arrives
    pub fn new(id: i64) -> Self {
        Self {
            id,
            status: RunnerStatus::Hidden,
            adjustment_factor: Decimal::ZERO,
            best_available_to_back: LevelLadder::new(),
            best_available_to_lay: LevelLadder::new(),
            traded: PriceLadder::new(),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }
}

// Identity is the selection id.
impl PartialEq for Runner {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Runner {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(RunnerStatus::from_code(b'A'), Some(RunnerStatus::Active));
        assert_eq!(RunnerStatus::from_code(b'W'), Some(RunnerStatus::Winner));
        assert_eq!(RunnerStatus::from_code(b'L'), Some(RunnerStatus::Loser));
        assert_eq!(RunnerStatus::from_code(b'R'), Some(RunnerStatus::Removed));
        assert_eq!(RunnerStatus::from_code(b'H'), Some(RunnerStatus::Hidden));
        assert_eq!(RunnerStatus::from_code(b'X'), None);
    }

    #[test]
    fn test_new_runner_is_hidden_and_empty() {
        let runner = Runner::new(47972);
        assert_eq!(runner.status, RunnerStatus::Hidden);
        assert!(runner.best_available_to_back.is_empty());
        assert!(runner.best_available_to_lay.is_empty());
        assert!(runner.traded.is_empty());
    }

    #[test]
    fn test_equality_by_id() {
        let mut a = Runner::new(1);
        a.status = RunnerStatus::Winner;
        let b = Runner::new(1);
        assert_eq!(a, b);
        assert_ne!(Runner::new(1), Runner::new(2));
    }
}
