//! Single-pass line application
//!
//! Walks one raw line token by token, consuming recognized properties
//! straight into the market cache and skipping everything else whole. No
//! intermediate object graph is built for data lines.

use rust_decimal::Decimal;

use super::cursor::Cursor;
use crate::cache::{Market, MarketStatus, RunnerStatus};
use crate::error::Result;
use crate::price::Price;

/// Envelope operation of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Connection,
    Status,
    MarketChange,
    OrderChange,
    Unknown,
}

/// Envelope fields the subscription needs from a data line
#[derive(Debug, Clone, Default)]
pub struct LineContext {
    pub request_id: Option<i64>,
    pub clk: Option<String>,
    pub initial_clk: Option<String>,
    pub publish_time: Option<i64>,
    pub heartbeat_ms: Option<u64>,
}

/// Identify the envelope op without touching the rest of the line
pub fn op_of(line: &[u8]) -> Result<Op> {
    let mut c = Cursor::new(line);
    c.expect(b'{')?;
    if c.eat(b'}') {
        return Ok(Op::Unknown);
    }
    loop {
        let key = c.read_key()?;
        if key.as_ref() == "op" {
            let op = c.read_string()?;
            return Ok(match op.as_ref() {
                "connection" => Op::Connection,
                "status" => Op::Status,
                "mcm" => Op::MarketChange,
                "ocm" => Op::OrderChange,
                _ => Op::Unknown,
            });
        }
        c.skip_value()?;
        if !c.eat(b',') {
            c.expect(b'}')?;
            return Ok(Op::Unknown);
        }
    }
}

/// Apply one `mcm` line onto the market
pub fn apply_market_change(line: &[u8], market: &mut Market) -> Result<LineContext> {
    apply_envelope(line, market, Op::MarketChange)
}

/// Apply one `ocm` line onto the market's order cache
pub fn apply_order_change(line: &[u8], market: &mut Market) -> Result<LineContext> {
    apply_envelope(line, market, Op::OrderChange)
}

fn apply_envelope(line: &[u8], market: &mut Market, kind: Op) -> Result<LineContext> {
    let mut c = Cursor::new(line);
    let mut ctx = LineContext::default();
    c.expect(b'{')?;
    if c.eat(b'}') {
        return Ok(ctx);
    }
    loop {
        let key = c.read_key()?;
        match key.as_ref() {
            "id" => ctx.request_id = Some(c.read_i64()?),
            "clk" => ctx.clk = c.read_opt_string()?.map(|s| s.into_owned()),
            "initialClk" => ctx.initial_clk = c.read_opt_string()?.map(|s| s.into_owned()),
            "pt" => ctx.publish_time = Some(c.read_i64()?),
            "heartbeatMs" => {
                let hb = c.read_i64()?;
                // A non-positive interval would disable the idle watchdog
                if hb > 0 {
                    ctx.heartbeat_ms = Some(hb as u64);
                }
            }
            "mc" if kind == Op::MarketChange => market_changes(&mut c, market)?,
            "oc" if kind == Op::OrderChange => order_changes(&mut c, market)?,
            _ => c.skip_value()?,
        }
        if !c.eat(b',') {
            c.expect(b'}')?;
            return Ok(ctx);
        }
    }
}

fn walk_array(c: &mut Cursor<'_>, mut each: impl FnMut(&mut Cursor<'_>) -> Result<()>) -> Result<()> {
    c.expect(b'[')?;
    if c.eat(b']') {
        return Ok(());
    }
    loop {
        each(c)?;
        if !c.eat(b',') {
            c.expect(b']')?;
            return Ok(());
        }
    }
}

/// Skip the remaining key/value pairs of the current object
fn finish_object(c: &mut Cursor<'_>) -> Result<()> {
    loop {
        if c.eat(b',') {
            c.read_key()?;
            c.skip_value()?;
        } else {
            c.expect(b'}')?;
            return Ok(());
        }
    }
}

fn market_changes(c: &mut Cursor<'_>, market: &mut Market) -> Result<()> {
    walk_array(c, |c| market_change(c, market))
}

fn market_change(c: &mut Cursor<'_>, market: &mut Market) -> Result<()> {
    c.expect(b'{')?;
    if c.eat(b'}') {
        return Ok(());
    }
    // Nothing applies until the change's id has textually matched this cache.
    let mut matched = false;
    loop {
        let key = c.read_key()?;
        match key.as_ref() {
            "id" => {
                let id = c.read_string()?;
                if id.as_ref() != market.id() {
                    // Another market's data: abandon this whole branch.
                    return finish_object(c);
                }
                matched = true;
            }
            "tv" if matched => {
                let tv = c.read_decimal()?;
                market.set_traded_volume(tv);
            }
            "marketDefinition" if matched => market_definition(c, market)?,
            "rc" if matched => walk_array(c, |c| runner_change(c, market))?,
            _ => c.skip_value()?,
        }
        if !c.eat(b',') {
            c.expect(b'}')?;
            return Ok(());
        }
    }
}

fn market_definition(c: &mut Cursor<'_>, market: &mut Market) -> Result<()> {
    c.expect(b'{')?;
    if c.eat(b'}') {
        return Ok(());
    }
    loop {
        let key = c.read_key()?;
        match key.as_ref() {
            "marketTime" => {
                if let Some(s) = c.read_opt_string()? {
                    let t = chrono::DateTime::parse_from_rfc3339(s.as_ref())
                        .map_err(|_| c.err("invalid marketTime"))?;
                    market.set_start_time(t.with_timezone(&chrono::Utc));
                }
            }
            "inPlay" => {
                let in_play = c.read_bool()?;
                market.set_in_play(in_play);
            }
            "status" => {
                if let Some(s) = c.read_opt_string()? {
                    if let Some(status) = s.bytes().next().and_then(MarketStatus::from_code) {
                        market.set_status(status);
                    }
                }
            }
            "version" => {
                let version = c.read_i64()?;
                market.set_version(version);
            }
            "runners" => walk_array(c, |c| runner_definition(c, market))?,
            _ => c.skip_value()?,
        }
        if !c.eat(b',') {
            c.expect(b'}')?;
            return Ok(());
        }
    }
}

fn runner_definition(c: &mut Cursor<'_>, market: &mut Market) -> Result<()> {
    c.expect(b'{')?;
    let mut id: Option<i64> = None;
    let mut status: Option<RunnerStatus> = None;
    let mut adjustment_factor: Option<Decimal> = None;
    if !c.eat(b'}') {
        loop {
            let key = c.read_key()?;
            match key.as_ref() {
                "id" => id = Some(c.read_i64()?),
                "status" => {
                    if let Some(s) = c.read_opt_string()? {
                        status = s.bytes().next().and_then(RunnerStatus::from_code);
                    }
                }
                "adjustmentFactor" => adjustment_factor = Some(c.read_decimal()?),
                _ => c.skip_value()?,
            }
            if !c.eat(b',') {
                c.expect(b'}')?;
                break;
            }
        }
    }
    if let (Some(id), Some(status)) = (id, status) {
        if id > 0 {
            market.add_or_update_runner_definition(id, status, adjustment_factor);
        }
    }
    Ok(())
}

fn runner_change(c: &mut Cursor<'_>, market: &mut Market) -> Result<()> {
    c.expect(b'{')?;
    if c.eat(b'}') {
        return Ok(());
    }
    let mut runner_id: Option<i64> = None;
    loop {
        let key = c.read_key()?;
        match (key.as_ref(), runner_id) {
            ("id", _) => {
                let id = c.read_i64()?;
                if id <= 0 {
                    return finish_object(c);
                }
                runner_id = Some(id);
            }
            ("batb", Some(id)) => {
                level_updates(c, |level, price, size| {
                    market.update_best_available_to_back(id, level, price, size)
                })?;
            }
            ("batl", Some(id)) => {
                level_updates(c, |level, price, size| {
                    market.update_best_available_to_lay(id, level, price, size)
                })?;
            }
            ("trd", Some(id)) => {
                price_size_updates(c, |odds, size| market.update_traded(id, odds, size))?;
            }
            _ => c.skip_value()?,
        }
        if !c.eat(b',') {
            c.expect(b'}')?;
            return Ok(());
        }
    }
}

/// `[[level, price, size], ...]`
fn level_updates(
    c: &mut Cursor<'_>,
    mut update: impl FnMut(u8, Price, Decimal),
) -> Result<()> {
    walk_array(c, |c| {
        c.expect(b'[')?;
        let level = c.read_i64()?;
        c.expect(b',')?;
        let odds = c.read_decimal()?;
        c.expect(b',')?;
        let size = c.read_decimal()?;
        c.expect(b']')?;
        // Display ladders only span levels 0..=9; anything else is dropped
        if let Ok(level @ 0..=9) = u8::try_from(level) {
            update(level, Price::of(odds), size);
        }
        Ok(())
    })
}

/// `[[price, size], ...]`
fn price_size_updates(
    c: &mut Cursor<'_>,
    mut update: impl FnMut(Decimal, Decimal),
) -> Result<()> {
    walk_array(c, |c| {
        c.expect(b'[')?;
        let odds = c.read_decimal()?;
        c.expect(b',')?;
        let size = c.read_decimal()?;
        c.expect(b']')?;
        update(odds, size);
        Ok(())
    })
}

fn order_changes(c: &mut Cursor<'_>, market: &mut Market) -> Result<()> {
    walk_array(c, |c| order_change(c, market))
}

fn order_change(c: &mut Cursor<'_>, market: &mut Market) -> Result<()> {
    c.expect(b'{')?;
    if c.eat(b'}') {
        return Ok(());
    }
    let mut matched = false;
    loop {
        let key = c.read_key()?;
        match key.as_ref() {
            "id" => {
                let id = c.read_string()?;
                if id.as_ref() != market.id() {
                    return finish_object(c);
                }
                matched = true;
            }
            "orc" if matched => walk_array(c, |c| order_runner_change(c, market))?,
            _ => c.skip_value()?,
        }
        if !c.eat(b',') {
            c.expect(b'}')?;
            return Ok(());
        }
    }
}

fn order_runner_change(c: &mut Cursor<'_>, market: &mut Market) -> Result<()> {
    c.expect(b'{')?;
    if c.eat(b'}') {
        return Ok(());
    }
    let mut runner_id: Option<i64> = None;
    loop {
        let key = c.read_key()?;
        match key.as_ref() {
            "id" => {
                let id = c.read_i64()?;
                if id <= 0 {
                    return finish_object(c);
                }
                runner_id = Some(id);
            }
            "mb" if runner_id.is_some() => {
                price_size_updates(c, |odds, size| market.update_matched_back(odds, size))?;
            }
            _ => c.skip_value()?,
        }
        if !c.eat(b',') {
            c.expect(b'}')?;
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use rust_decimal_macros::dec;

    fn market_for(id: &str) -> Market {
        Market::new(id.to_string())
    }

    #[test]
    fn test_op_of() {
        assert_eq!(op_of(br#"{"op":"connection","connectionId":"C1"}"#).unwrap(), Op::Connection);
        assert_eq!(op_of(br#"{"op":"status","statusCode":"SUCCESS"}"#).unwrap(), Op::Status);
        assert_eq!(op_of(br#"{"pt":1,"op":"mcm"}"#).unwrap(), Op::MarketChange);
        assert_eq!(op_of(br#"{"op":"ocm"}"#).unwrap(), Op::OrderChange);
        assert_eq!(op_of(br#"{"op":"wat"}"#).unwrap(), Op::Unknown);
        assert_eq!(op_of(br#"{"noop":true}"#).unwrap(), Op::Unknown);
    }

    #[test]
    fn test_full_market_change() {
        let mut market = market_for("1.180631847");
        let line = br#"{"op":"mcm","id":2,"clk":"AAA","pt":1581707853123,"mc":[{"id":"1.180631847","tv":120.5,"marketDefinition":{"marketTime":"2026-03-01T14:00:00.000Z","inPlay":true,"status":"O","version":4,"runners":[{"id":47972,"status":"A","adjustmentFactor":9.8},{"id":47973,"status":"A"}]},"rc":[{"id":47972,"batb":[[0,2.02,150.0],[1,2.0,75.5]],"batl":[[0,2.04,90.0]],"trd":[[2.02,1000.0],[2.04,12.0]]}]}]}"#;

        let ctx = apply_market_change(line, &mut market).unwrap();
        assert_eq!(ctx.request_id, Some(2));
        assert_eq!(ctx.clk.as_deref(), Some("AAA"));
        assert_eq!(ctx.publish_time, Some(1581707853123));

        assert_eq!(market.traded_volume(), dec!(120.5));
        assert_eq!(market.status(), MarketStatus::Open);
        assert!(market.is_in_play());
        assert_eq!(market.version(), 4);
        assert_eq!(market.runner_count(), 2);

        let runner = market.runner(47972).unwrap();
        assert_eq!(runner.status, RunnerStatus::Active);
        assert_eq!(runner.adjustment_factor, dec!(9.8));
        assert_eq!(runner.best_available_to_back.get(0).unwrap().size, dec!(150.0));
        assert_eq!(
            runner.best_available_to_back.get(1).unwrap().price.decimal_odds(),
            dec!(2.0)
        );
        assert_eq!(runner.best_available_to_lay.get(0).unwrap().size, dec!(90.0));
        assert_eq!(runner.traded.size_at(dec!(2.02)), Some(dec!(1000.0)));
    }

    #[test]
    fn test_mismatched_market_id_abandons_branch() {
        let mut market = market_for("1.1");
        let line = br#"{"op":"mcm","pt":5,"mc":[{"id":"1.2","tv":999.0,"marketDefinition":{"status":"S"},"rc":[{"id":7,"trd":[[2.0,50.0]]}]}]}"#;

        apply_market_change(line, &mut market).unwrap();

        assert_eq!(market.traded_volume(), dec!(0));
        assert_eq!(market.status(), MarketStatus::Inactive);
        assert_eq!(market.runner_count(), 0);
    }

    #[test]
    fn test_matching_branch_still_applies_after_mismatch() {
        let mut market = market_for("1.1");
        let line = br#"{"op":"mcm","pt":5,"mc":[{"id":"1.2","tv":999.0},{"id":"1.1","tv":42.0}]}"#;

        apply_market_change(line, &mut market).unwrap();
        assert_eq!(market.traded_volume(), dec!(42.0));
    }

    #[test]
    fn test_runner_removal_via_definition() {
        let mut market = market_for("1.1");
        let add = br#"{"op":"mcm","mc":[{"id":"1.1","marketDefinition":{"runners":[{"id":5,"status":"A"}]},"rc":[{"id":5,"trd":[[3.0,9.0]]}]}]}"#;
        apply_market_change(add, &mut market).unwrap();
        assert_eq!(market.runner(5).unwrap().traded.len(), 1);

        let remove = br#"{"op":"mcm","mc":[{"id":"1.1","marketDefinition":{"runners":[{"id":5,"status":"R"}]}}]}"#;
        apply_market_change(remove, &mut market).unwrap();
        assert!(market.runner(5).is_none());
    }

    #[test]
    fn test_unrecognized_keys_are_skipped_whole() {
        let mut market = market_for("1.1");
        let line = br#"{"op":"mcm","ct":"HEARTBEAT","segments":[{"x":1}],"mc":[{"id":"1.1","img":true,"con":false,"tv":7.0,"extra":{"nested":[1,2,{"y":"z"}]}}]}"#;

        apply_market_change(line, &mut market).unwrap();
        assert_eq!(market.traded_volume(), dec!(7.0));
    }

    #[test]
    fn test_heartbeat_interval_extraction() {
        let mut market = market_for("1.1");
        let line = br#"{"op":"mcm","id":1,"heartbeatMs":5000,"ct":"HEARTBEAT","clk":"BBB"}"#;

        let ctx = apply_market_change(line, &mut market).unwrap();
        assert_eq!(ctx.heartbeat_ms, Some(5000));
        assert_eq!(ctx.clk.as_deref(), Some("BBB"));
    }

    #[test]
    fn test_nonpositive_heartbeat_interval_ignored() {
        let mut market = market_for("1.1");
        let line = br#"{"op":"mcm","heartbeatMs":-5000,"ct":"HEARTBEAT"}"#;
        let ctx = apply_market_change(line, &mut market).unwrap();
        assert_eq!(ctx.heartbeat_ms, None);

        let line = br#"{"op":"mcm","heartbeatMs":0}"#;
        let ctx = apply_market_change(line, &mut market).unwrap();
        assert_eq!(ctx.heartbeat_ms, None);
    }

    #[test]
    fn test_out_of_range_ladder_levels_dropped() {
        let mut market = market_for("1.1");
        let line = br#"{"op":"mcm","mc":[{"id":"1.1","rc":[{"id":7,"batb":[[0,2.0,10.0],[12,3.0,5.0],[-1,4.0,2.0]]}]}]}"#;

        apply_market_change(line, &mut market).unwrap();
        let runner = market.runner(7).unwrap();
        assert_eq!(runner.best_available_to_back.len(), 1);
        assert!(runner.best_available_to_back.contains_level(0));
    }

    #[test]
    fn test_malformed_line_is_a_parse_error() {
        let mut market = market_for("1.1");
        let line = br#"{"op":"mcm","mc":[{"id":"1.1","tv":"#;
        assert!(matches!(
            apply_market_change(line, &mut market),
            Err(StreamError::Parse { .. })
        ));
    }

    #[test]
    fn test_order_change_matched_backs() {
        let mut market = market_for("1.1");
        let line = br#"{"op":"ocm","id":3,"clk":"CCC","pt":9,"oc":[{"id":"1.1","orc":[{"id":7,"mb":[[3.0,10.0],[2.0,5.0]],"uo":[{"ignored":true}]}]}]}"#;

        let ctx = apply_order_change(line, &mut market).unwrap();
        assert_eq!(ctx.request_id, Some(3));
        assert_eq!(market.orders().if_win(), dec!(25.0));
        assert_eq!(market.orders().if_lose(), dec!(-15.0));
    }

    #[test]
    fn test_order_change_other_market_ignored() {
        let mut market = market_for("1.1");
        let line = br#"{"op":"ocm","oc":[{"id":"1.9","orc":[{"id":7,"mb":[[3.0,10.0]]}]}]}"#;

        apply_order_change(line, &mut market).unwrap();
        assert!(market.orders().matched_backs().is_empty());
    }
}
