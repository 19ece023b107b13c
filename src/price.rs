//! Tick-indexed decimal-odds price type
//!
//! The exchange only accepts odds on a fixed ladder of ~350 ticks between
//! 1.01 and 1000, with the increment widening as odds grow. Off-ladder odds
//! are snapped to the nearest tick by implied probability and flagged invalid.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use lazy_static::lazy_static;
use rust_decimal::Decimal;

/// Tick value for a price that sits outside the ladder entirely
pub const TICK_NONE: i32 = -1;

/// Ladder bands as (exclusive low, inclusive high, step), all in hundredths
const BANDS: [(i64, i64, i64); 10] = [
    (100, 200, 1),
    (200, 300, 2),
    (300, 400, 5),
    (400, 600, 10),
    (600, 1_000, 20),
    (1_000, 2_000, 50),
    (2_000, 3_000, 100),
    (3_000, 5_000, 200),
    (5_000, 10_000, 500),
    (10_000, 100_000, 1_000),
];

lazy_static! {
    /// All valid odds in ascending tick order
    static ref LADDER: Vec<Decimal> = {
        let mut ladder = Vec::with_capacity(350);
        for (lo, hi, step) in BANDS {
            let mut v = lo + step;
            while v <= hi {
                ladder.push(Decimal::new(v, 2));
                v += step;
            }
        }
        ladder
    };

    /// Exact odds -> tick lookup
    static ref TICK_BY_ODDS: HashMap<Decimal, i32> = LADDER
        .iter()
        .enumerate()
        .map(|(i, odds)| (odds.normalize(), i as i32))
        .collect();
}

fn max_tick() -> i32 {
    LADDER.len() as i32 - 1
}

/// Nearest ladder tick by minimal implied-probability distance
fn snap_to_tick(odds: Decimal) -> i32 {
    if odds <= LADDER[0] {
        return 0;
    }
    if odds >= LADDER[LADDER.len() - 1] {
        return max_tick();
    }
    let chance = Decimal::ONE / odds;
    // Implied probability is monotonic in odds, so the nearest tick is one of
    // the two neighbours around the insertion point.
    let hi = LADDER.partition_point(|v| *v < odds);
    let lo = hi - 1;
    let d_lo = (Decimal::ONE / LADDER[lo] - chance).abs();
    let d_hi = (Decimal::ONE / LADDER[hi] - chance).abs();
    if d_lo <= d_hi {
        lo as i32
    } else {
        hi as i32
    }
}

/// An exchange price, keyed by canonical tick
#[derive(Debug, Clone, Copy)]
pub struct Price {
    tick: i32,
    odds: Decimal,
    valid: bool,
}

impl Price {
    /// Resolve odds against the ladder
    ///
    /// An exact hit returns the interned tick price. Anything else keeps the
    /// given odds, snaps the tick by implied probability and is marked
    /// invalid. Non-positive odds get the sentinel tick.
    pub fn of(odds: Decimal) -> Price {
        if odds <= Decimal::ZERO {
            return Price {
                tick: TICK_NONE,
                odds,
                valid: false,
            };
        }
        if let Some(&tick) = TICK_BY_ODDS.get(&odds.normalize()) {
            return Price::from_tick(tick);
        }
        Price {
            tick: snap_to_tick(odds),
            odds,
            valid: false,
        }
    }

    /// The interned valid price at a ladder tick (clamped to the ladder)
    pub fn from_tick(tick: i32) -> Price {
        let tick = tick.clamp(0, max_tick());
        Price {
            tick,
            odds: LADDER[tick as usize],
            valid: true,
        }
    }

    pub fn tick(&self) -> i32 {
        self.tick
    }

    pub fn decimal_odds(&self) -> Decimal {
        self.odds
    }

    /// Implied probability, 1/odds (zero for the sentinel)
    pub fn chance(&self) -> Decimal {
        if self.odds > Decimal::ZERO {
            Decimal::ONE / self.odds
        } else {
            Decimal::ZERO
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Move n ticks along the ladder, clamping at 1.01 and 1000
    pub fn add_ticks(&self, n: i32) -> Price {
        if self.tick == TICK_NONE {
            return *self;
        }
        Price::from_tick(self.tick + n)
    }

    /// Signed tick distance to another price; 0 when absent
    pub fn ticks_between(&self, other: Option<Price>) -> i32 {
        other.map(|o| o.tick - self.tick).unwrap_or(0)
    }

    /// Apply a withdrawal reduction factor (percent)
    ///
    /// Factors under 2.5 are ignored by exchange rule. The reduced odds are
    /// rounded to 2dp and snapped back onto the ladder.
    pub fn reduce_by(&self, factor: Decimal) -> Price {
        if factor < Decimal::new(25, 1) || self.tick == TICK_NONE {
            return *self;
        }
        let reduced = (self.odds - self.odds / Decimal::ONE_HUNDRED * factor).round_dp(2);
        if reduced <= Decimal::ZERO {
            return Price::from_tick(0);
        }
        if let Some(&tick) = TICK_BY_ODDS.get(&reduced.normalize()) {
            return Price::from_tick(tick);
        }
        Price::from_tick(snap_to_tick(reduced))
    }

    /// Smallest stake the exchange accepts at these odds
    pub fn minimum_size(&self) -> Decimal {
        if self.odds <= Decimal::ZERO {
            return Decimal::ONE;
        }
        let size = (Decimal::TEN / self.odds * Decimal::ONE_HUNDRED).ceil() / Decimal::ONE_HUNDRED;
        size.min(Decimal::ONE)
    }

    /// Whether a below-minimum stake survives the penny-rounding profit rule
    ///
    /// Sizes above the fixed boundary always pass. Below it, the gain between
    /// true and penny-rounded profit must stay within [-20%, +25%].
    pub fn is_size_achievable(&self, size: Decimal) -> bool {
        if size >= Decimal::new(159, 2) {
            return true;
        }
        let profit = size * (self.odds - Decimal::ONE);
        if profit <= Decimal::ZERO {
            return false;
        }
        let ratio = (profit.round_dp(2) - profit) / profit;
        ratio >= Decimal::new(-20, 2) && ratio <= Decimal::new(25, 2)
    }

    /// Stake required to win the target amount at these odds
    pub fn size_needed_for_profit(&self, target: Decimal) -> Decimal {
        if self.odds <= Decimal::ONE {
            return Decimal::ZERO;
        }
        (target / (self.odds - Decimal::ONE)).round_dp(2)
    }
}

// Equal decimal odds means equal price, tick and validity notwithstanding.
impl PartialEq for Price {
    fn eq(&self, other: &Self) -> bool {
        self.odds == other.odds
    }
}

impl Eq for Price {}

impl Hash for Price {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.odds.hash(state);
    }
}

impl PartialOrd for Price {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Price {
    fn cmp(&self, other: &Self) -> Ordering {
        self.odds.cmp(&other.odds)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.odds)
    }
}

/// A (price, size) pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceSize {
    pub price: Price,
    pub size: Decimal,
}

impl PriceSize {
    pub fn new(price: Price, size: Decimal) -> Self {
        Self { price, size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ladder_has_350_ticks() {
        assert_eq!(LADDER.len(), 350);
        assert_eq!(LADDER[0], dec!(1.01));
        assert_eq!(LADDER[349], dec!(1000));
    }

    #[test]
    fn test_exact_odds_are_valid() {
        let p = Price::of(dec!(2.02));
        assert!(p.is_valid());
        assert_eq!(p.decimal_odds(), dec!(2.02));
        // Scale-insensitive lookup
        assert!(Price::of(dec!(2.0)).is_valid());
        assert!(Price::of(dec!(1000)).is_valid());
    }

    #[test]
    fn test_off_ladder_odds_snap_and_stay_invalid() {
        let p = Price::of(dec!(2.015));
        assert!(!p.is_valid());
        assert_eq!(p.decimal_odds(), dec!(2.015));
        // 2.015 sits between 2.00 and 2.02 on the ladder
        assert!(p.tick() == 99 || p.tick() == 100);
    }

    #[test]
    fn test_snap_is_idempotent() {
        for odds in [dec!(1.005), dec!(2.015), dec!(3.33), dec!(7.5), dec!(512)] {
            let once = Price::of(odds);
            let twice = Price::of(once.decimal_odds());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_snap_by_implied_probability() {
        // 7.5 is off-ladder; 1/7.6 is nearer to 1/7.5 than 1/7.4 is
        assert_eq!(Price::of(dec!(7.5)).add_ticks(0).decimal_odds(), dec!(7.6));
    }

    #[test]
    fn test_add_ticks_clamps() {
        assert_eq!(Price::of(dec!(1.01)).add_ticks(-5).decimal_odds(), dec!(1.01));
        assert_eq!(Price::of(dec!(1000)).add_ticks(5).decimal_odds(), dec!(1000));
        assert_eq!(Price::of(dec!(2.0)).add_ticks(1).decimal_odds(), dec!(2.02));
        assert_eq!(Price::of(dec!(2.0)).add_ticks(-1).decimal_odds(), dec!(1.99));
    }

    #[test]
    fn test_ticks_between_is_antisymmetric() {
        let a = Price::of(dec!(2.0));
        let b = Price::of(dec!(3.0));
        assert_eq!(a.ticks_between(Some(b)), -b.ticks_between(Some(a)));
        assert_eq!(a.ticks_between(Some(b)), 50);
        assert_eq!(a.ticks_between(None), 0);
    }

    #[test]
    fn test_reduce_by() {
        // Below the 2.5 threshold nothing happens
        assert_eq!(Price::of(dec!(10)).reduce_by(dec!(2)), Price::of(dec!(10)));
        // 10 - 10*0.25 = 7.5, snapped to 7.6
        let reduced = Price::of(dec!(10)).reduce_by(dec!(25));
        assert!(reduced.is_valid());
        assert_eq!(reduced.decimal_odds(), dec!(7.6));
        // 4 - 4*0.05 = 3.8, a valid tick already
        assert_eq!(Price::of(dec!(4)).reduce_by(dec!(5)).decimal_odds(), dec!(3.8));
    }

    #[test]
    fn test_minimum_size() {
        assert_eq!(Price::of(dec!(2)).minimum_size(), dec!(1));
        assert_eq!(Price::of(dec!(20)).minimum_size(), dec!(0.50));
        assert_eq!(Price::of(dec!(1000)).minimum_size(), dec!(0.01));
        // ceil(10/3*100)/100 = 3.34, capped at 1
        assert_eq!(Price::of(dec!(3)).minimum_size(), dec!(1));
    }

    #[test]
    fn test_is_size_achievable() {
        let p = Price::of(dec!(1.03));
        // Above the boundary every size passes
        assert!(p.is_size_achievable(dec!(2)));
        assert!(p.is_size_achievable(dec!(1.59)));
        // 0.30 * 0.03 = 0.009 -> rounds to 0.01, gain ~11% within bounds
        assert!(p.is_size_achievable(dec!(0.30)));
        // 0.10 * 0.03 = 0.003 -> rounds to 0.00, total loss of profit
        assert!(!p.is_size_achievable(dec!(0.10)));
        // Exact penny profit has zero rounding gain
        assert!(Price::of(dec!(2)).is_size_achievable(dec!(0.10)));
    }

    #[test]
    fn test_size_needed_for_profit() {
        assert_eq!(Price::of(dec!(6)).size_needed_for_profit(dec!(10)), dec!(2.00));
        assert_eq!(Price::of(dec!(3)).size_needed_for_profit(dec!(1)), dec!(0.50));
        assert_eq!(Price::of(dec!(1)).size_needed_for_profit(dec!(1)), dec!(0));
    }

    #[test]
    fn test_equality_is_by_odds_only() {
        assert_eq!(Price::of(dec!(2.0)), Price::from_tick(99));
        assert_ne!(Price::of(dec!(2.015)), Price::of(dec!(2.02)));
        assert_eq!(Price::of(dec!(0)).tick(), TICK_NONE);
    }
}
