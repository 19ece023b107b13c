//! Price ladders
//!
//! Two sparse maps back every runner: a level-indexed ladder for the best
//! available offers and a full price-keyed ladder for traded volume.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::price::{Price, PriceSize};

/// Best-available ladder, keyed by display level 0..=9
///
/// Levels are only ever overwritten, never removed; the exchange signals an
/// empty level with zero price and size.
#[derive(Debug, Clone, Default)]
pub struct LevelLadder {
    levels: BTreeMap<u8, PriceSize>,
}

impl LevelLadder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite one level
    pub fn update(&mut self, level: u8, price: Price, size: Decimal) {
        self.levels.insert(level, PriceSize::new(price, size));
    }

    pub fn get(&self, level: u8) -> Option<&PriceSize> {
        self.levels.get(&level)
    }

    pub fn contains_level(&self, level: u8) -> bool {
        self.levels.contains_key(&level)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &PriceSize)> {
        self.levels.iter().map(|(l, ps)| (*l, ps))
    }
}

/// Full traded ladder, keyed by odds
///
/// Keys accumulate over the life of a runner; sizes overwrite.
#[derive(Debug, Clone, Default)]
pub struct PriceLadder {
    sizes: BTreeMap<Decimal, Decimal>,
}

impl PriceLadder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the size at a price
    pub fn set(&mut self, odds: Decimal, size: Decimal) {
        self.sizes.insert(odds.normalize(), size);
    }

    pub fn size_at(&self, odds: Decimal) -> Option<Decimal> {
        self.sizes.get(&odds.normalize()).copied()
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn total_size(&self) -> Decimal {
        self.sizes.values().copied().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Decimal, Decimal)> + '_ {
        self.sizes.iter().map(|(p, s)| (*p, *s))
    }
}
