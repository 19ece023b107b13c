//! Matched-order exposure cache

use rust_decimal::Decimal;

use super::ladder::PriceLadder;

/// Matched backs for one market, with derived exposure
///
/// The order stream reports matched backs as full (price, size) images per
/// price; sizes overwrite. Exposure follows directly: a back of `size` at
/// `odds` returns `size * (odds - 1)` if the selection wins and loses `size`
/// otherwise.
#[derive(Debug, Clone, Default)]
pub struct OrderCache {
    matched_backs: PriceLadder,
}

impl OrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the matched size at a price
    pub fn update_matched_back(&mut self, odds: Decimal, size: Decimal) {
        self.matched_backs.set(odds, size);
    }

    pub fn matched_backs(&self) -> &PriceLadder {
        &self.matched_backs
    }

    /// Profit if the backed selection wins
    pub fn if_win(&self) -> Decimal {
        self.matched_backs
            .iter()
            .map(|(odds, size)| size * (odds - Decimal::ONE))
            .sum()
    }

    /// Exposure if the backed selection loses
    pub fn if_lose(&self) -> Decimal {
        -self.matched_backs.iter().map(|(_, size)| size).sum::<Decimal>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_exposure_from_matched_backs() {
        let mut orders = OrderCache::new();
        orders.update_matched_back(dec!(3.0), dec!(10));
        orders.update_matched_back(dec!(2.0), dec!(5));

        assert_eq!(orders.if_win(), dec!(25)); // 10*2 + 5*1
        assert_eq!(orders.if_lose(), dec!(-15));
    }

    #[test]
    fn test_matched_size_overwrites() {
        let mut orders = OrderCache::new();
        orders.update_matched_back(dec!(3.0), dec!(10));
        orders.update_matched_back(dec!(3.0), dec!(12.5));

        assert_eq!(orders.if_win(), dec!(25.0));
        assert_eq!(orders.if_lose(), dec!(-12.5));
    }

    #[test]
    fn test_empty_cache_has_no_exposure() {
        let orders = OrderCache::new();
        assert_eq!(orders.if_win(), dec!(0));
        assert_eq!(orders.if_lose(), dec!(0));
    }
}
