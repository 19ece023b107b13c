//! Wire messages for the subscription protocol
//!
//! Outbound requests serialize with null fields omitted, per protocol. The
//! inbound control frames (`connection`, `status`) are cold-path and use
//! serde; data frames go through the scanner instead.

use serde::{Deserialize, Serialize};

/// Client-to-server request, tagged by `op`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum RequestMessage {
    #[serde(rename_all = "camelCase")]
    Authentication {
        id: i64,
        session: String,
        app_key: String,
    },
    #[serde(rename_all = "camelCase")]
    MarketSubscription {
        id: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        clk: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        initial_clk: Option<String>,
        market_filter: MarketFilter,
        market_data_filter: MarketDataFilter,
    },
    #[serde(rename_all = "camelCase")]
    OrderSubscription {
        id: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        clk: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        initial_clk: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        order_filter: Option<OrderFilter>,
    },
}

impl RequestMessage {
    pub fn id(&self) -> i64 {
        match self {
            RequestMessage::Authentication { id, .. }
            | RequestMessage::MarketSubscription { id, .. }
            | RequestMessage::OrderSubscription { id, .. } => *id,
        }
    }

    pub fn op_name(&self) -> &'static str {
        match self {
            RequestMessage::Authentication { .. } => "authentication",
            RequestMessage::MarketSubscription { .. } => "marketSubscription",
            RequestMessage::OrderSubscription { .. } => "orderSubscription",
        }
    }

    /// Carry learned resumption tokens into a replayed subscription
    pub(crate) fn set_clocks(&mut self, new_clk: Option<String>, new_initial_clk: Option<String>) {
        match self {
            RequestMessage::MarketSubscription { clk, initial_clk, .. }
            | RequestMessage::OrderSubscription { clk, initial_clk, .. } => {
                *clk = new_clk;
                *initial_clk = new_initial_clk;
            }
            RequestMessage::Authentication { .. } => {}
        }
    }
}

/// Which markets a subscription covers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_codes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub betting_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venues: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_in_play_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bsp_market: Option<bool>,
}

impl MarketFilter {
    /// Filter down to an explicit list of market ids
    pub fn with_market_ids(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            market_ids: Some(ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }
}

/// Named data projections the server can stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataField {
    ExMarketDef,
    ExBestOffers,
    ExBestOffersDisp,
    ExAllOffers,
    ExTraded,
    ExTradedVol,
    ExLtp,
    SpTraded,
    SpProjected,
}

/// Which data a market subscription carries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDataFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ladder_levels: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<DataField>>,
}

/// Server ladder-depth cap
const MAX_LADDER_LEVELS: u8 = 10;
/// Depth the server assumes for best-offers projections when unset
const DEFAULT_BEST_OFFER_LEVELS: u8 = 3;

impl MarketDataFilter {
    pub fn new(fields: Vec<DataField>) -> Self {
        Self {
            ladder_levels: None,
            fields: Some(fields),
        }
    }

    /// Clamp ladder depth and pin the server's implicit best-offers default
    pub fn normalize(&mut self) {
        if let Some(levels) = self.ladder_levels {
            self.ladder_levels = Some(levels.min(MAX_LADDER_LEVELS));
        }
        let wants_best_offers = self.fields.as_ref().is_some_and(|fields| {
            fields
                .iter()
                .any(|f| matches!(f, DataField::ExBestOffers | DataField::ExBestOffersDisp))
        });
        if wants_best_offers && self.ladder_levels.is_none() {
            self.ladder_levels = Some(DEFAULT_BEST_OFFER_LEVELS);
        }
    }
}

/// Which orders an order subscription covers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_overall_position: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_strategy_refs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_matched_by_strategy_ref: Option<bool>,
}

/// Server `connection` frame
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMessage {
    pub connection_id: String,
}

/// Server `status` frame
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub id: Option<i64>,
    pub status_code: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub connection_closed: Option<bool>,
}

impl StatusMessage {
    pub fn is_failure(&self) -> bool {
        self.status_code.as_deref() == Some("FAILURE")
    }
}
