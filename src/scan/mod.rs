//! Incremental line scanner
//!
//! "Read what you need, skip the rest": a byte cursor walks each raw line
//! and applies recognized properties directly onto cache state, keeping
//! allocation low and tolerating additive protocol changes.

mod apply;
mod cursor;

pub use apply::{apply_market_change, apply_order_change, op_of, LineContext, Op};
pub use cursor::Cursor;
