//! Venue wire format: push-frame decoding into domain events, order-entry
//! request encoding and REST payload decoding.

use crate::auth::Credentials;
use crate::config::ChannelSpec;
use crate::core::Event;
use crate::exchanges::DecodeError;
use crate::types::{
    datetime_from_ms, new_client_id, position_set, Account, Action, Candle, CoinBalance,
    FillOrder, FillStatus, InstrumentInfo, InstrumentType, Order, OrderCancel, OrderResponse,
    OrderStatus, OrderType, Position, PositionSide, TargetCcy, TradingMode,
};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Map, Value};

/// Venue text keep-alive request
pub const PING: &str = "ping";
/// Venue text keep-alive reply
pub const PONG: &str = "pong";

const CANDLE_PREFIX: &str = "candle";

// ---------------------------------------------------------------------------
// field deserializers; the venue sends every number as a string
// ---------------------------------------------------------------------------

fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    s.parse::<f64>().map_err(serde::de::Error::custom)
}

/// Empty string means absent
fn de_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(deserializer)?;
    match s.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => s.parse::<f64>().map(Some).map_err(serde::de::Error::custom),
    }
}

fn de_ms<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    parse_ms(&s).map_err(serde::de::Error::custom)
}

fn de_opt_ms<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(deserializer)?;
    match s.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => parse_ms(s).map(Some).map_err(serde::de::Error::custom),
    }
}

fn de_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(deserializer)?;
    Ok(s.filter(|s| !s.is_empty()))
}

fn parse_ms(raw: &str) -> Result<DateTime<Utc>, DecodeError> {
    raw.parse::<i64>()
        .ok()
        .and_then(datetime_from_ms)
        .ok_or_else(|| DecodeError::InvalidValue {
            field: "ts",
            value: raw.to_string(),
        })
}

fn parse_f64(field: &'static str, raw: &str) -> Result<f64, DecodeError> {
    raw.parse::<f64>().map_err(|_| DecodeError::InvalidValue {
        field,
        value: raw.to_string(),
    })
}

// ---------------------------------------------------------------------------
// string <-> enum mappings
// ---------------------------------------------------------------------------

fn inst_type_from_wire(raw: &str) -> Result<InstrumentType, DecodeError> {
    match raw {
        "SPOT" => Ok(InstrumentType::Spot),
        "MARGIN" => Ok(InstrumentType::Margin),
        "SWAP" => Ok(InstrumentType::Swap),
        other => Err(DecodeError::InvalidValue {
            field: "instType",
            value: other.to_string(),
        }),
    }
}

pub fn inst_type_to_wire(inst_type: InstrumentType) -> &'static str {
    match inst_type {
        InstrumentType::Spot => "SPOT",
        InstrumentType::Margin => "MARGIN",
        InstrumentType::Swap => "SWAP",
    }
}

fn pos_side_from_wire(raw: &str) -> Result<Option<PositionSide>, DecodeError> {
    match raw {
        "long" => Ok(Some(PositionSide::Long)),
        "short" => Ok(Some(PositionSide::Short)),
        "net" => Ok(Some(PositionSide::Net)),
        "" => Ok(None),
        other => Err(DecodeError::InvalidValue {
            field: "posSide",
            value: other.to_string(),
        }),
    }
}

fn action_from_wire(raw: &str) -> Result<Action, DecodeError> {
    match raw {
        "buy" => Ok(Action::Buy),
        "sell" => Ok(Action::Sell),
        other => Err(DecodeError::InvalidValue {
            field: "side",
            value: other.to_string(),
        }),
    }
}

fn fill_status_from_wire(raw: &str) -> Result<FillStatus, DecodeError> {
    match raw {
        "live" => Ok(FillStatus::Live),
        "partially_filled" => Ok(FillStatus::PartiallyFilled),
        "filled" => Ok(FillStatus::Filled),
        "canceled" | "mmp_canceled" => Ok(FillStatus::Canceled),
        other => Err(DecodeError::InvalidValue {
            field: "state",
            value: other.to_string(),
        }),
    }
}

fn action_to_wire(action: Action) -> &'static str {
    match action {
        Action::Buy => "buy",
        Action::Sell => "sell",
    }
}

pub fn trading_mode_to_wire(mode: TradingMode) -> &'static str {
    match mode {
        TradingMode::Isolated => "isolated",
        TradingMode::Cross => "cross",
        TradingMode::Cash => "cash",
    }
}

fn order_type_to_wire(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "market",
        OrderType::Limit => "limit",
    }
}

fn target_ccy_to_wire(target_ccy: TargetCcy) -> &'static str {
    match target_ccy {
        TargetCcy::BaseCcy => "base_ccy",
        TargetCcy::QuoteCcy => "quote_ccy",
    }
}

// ---------------------------------------------------------------------------
// wire rows
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PushArg {
    channel: String,
    #[serde(rename = "instId", default)]
    inst_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Push {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    arg: Option<PushArg>,
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceRow {
    ccy: String,
    #[serde(deserialize_with = "de_f64")]
    eq: f64,
    #[serde(deserialize_with = "de_f64")]
    eq_usd: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountRow {
    #[serde(deserialize_with = "de_ms")]
    u_time: DateTime<Utc>,
    #[serde(default)]
    details: Vec<BalanceRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRow {
    inst_id: String,
    inst_type: String,
    pos_side: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    ccy: Option<String>,
    #[serde(deserialize_with = "de_f64")]
    pos: f64,
    #[serde(default, deserialize_with = "de_opt_string")]
    pos_ccy: Option<String>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    notional_usd: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    upl: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderRow {
    cl_ord_id: String,
    inst_id: String,
    inst_type: String,
    #[serde(default)]
    pos_side: String,
    side: String,
    #[serde(deserialize_with = "de_f64")]
    sz: f64,
    #[serde(default, deserialize_with = "de_opt_f64")]
    fill_sz: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    fill_px: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_ms")]
    fill_time: Option<DateTime<Utc>>,
    state: String,
    #[serde(default, deserialize_with = "de_opt_f64")]
    lever: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    fee: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pnl: Option<f64>,
    #[serde(deserialize_with = "de_ms")]
    c_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AckRow {
    #[serde(default, deserialize_with = "de_opt_string")]
    ord_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    cl_ord_id: Option<String>,
    #[serde(default)]
    s_code: Option<String>,
    #[serde(default)]
    s_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Ack {
    #[serde(default)]
    id: String,
    #[serde(default)]
    op: String,
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<AckRow>,
}

#[derive(Debug, Deserialize)]
struct RestEnvelope {
    #[serde(default)]
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentRow {
    inst_type: String,
    inst_id: String,
    #[serde(default, deserialize_with = "de_opt_f64")]
    ct_val: Option<f64>,
    #[serde(deserialize_with = "de_f64")]
    min_sz: f64,
    #[serde(default, deserialize_with = "de_opt_f64")]
    tick_sz: Option<f64>,
}

// ---------------------------------------------------------------------------
// control frames
// ---------------------------------------------------------------------------

/// Handshake reply (`login`, `subscribe`, `error`, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct ControlFrame {
    pub event: String,
    pub code: Option<String>,
    pub msg: Option<String>,
    /// Echoed subscription argument, on subscribe acks
    pub arg: Option<ChannelSpec>,
}

impl ControlFrame {
    pub fn is_error(&self) -> bool {
        self.event == "error"
    }

    /// Login succeeded: a `"0"` code on a non-error event
    pub fn is_login_ok(&self) -> bool {
        !self.is_error() && self.code.as_deref() == Some("0")
    }

    pub fn label(&self) -> String {
        self.arg
            .as_ref()
            .map(ChannelSpec::label)
            .unwrap_or_else(|| "<unknown>".to_string())
    }
}

/// Parse `text` as a control frame; `None` for data pushes and non-JSON text
pub fn parse_control(text: &str) -> Option<ControlFrame> {
    let value: Value = serde_json::from_str(text).ok()?;
    let event = value.get("event")?.as_str()?.to_string();
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let arg = value
        .get("arg")
        .cloned()
        .and_then(|arg| serde_json::from_value::<ChannelSpec>(arg).ok());
    Some(ControlFrame {
        event,
        code: field("code"),
        msg: field("msg"),
        arg,
    })
}

// ---------------------------------------------------------------------------
// push decoding
// ---------------------------------------------------------------------------

/// Turns channel pushes into domain events
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    quote_ccy: String,
}

impl FrameDecoder {
    pub fn new(quote_ccy: impl Into<String>) -> Self {
        Self {
            quote_ccy: quote_ccy.into(),
        }
    }

    /// Decode one frame.
    ///
    /// Keep-alive replies and control frames yield no events. A candle push
    /// batching several rows yields one event per row; an `orders` push yields
    /// one fill per row.
    pub fn decode(&self, text: &str) -> Result<Vec<Event>, DecodeError> {
        if text == PONG {
            return Ok(Vec::new());
        }
        let push: Push = serde_json::from_str(text)?;

        if let Some(event) = push.event.as_deref() {
            if event == "error" {
                warn!(
                    "Venue error event: code {} {}",
                    push.code.as_deref().unwrap_or("?"),
                    push.msg.as_deref().unwrap_or("")
                );
            } else {
                debug!("Control event {}", event);
            }
            return Ok(Vec::new());
        }

        let arg = push.arg.ok_or(DecodeError::MissingField("arg"))?;
        let channel = arg.channel.as_str();

        if let Some(timeframe) = channel.strip_prefix(CANDLE_PREFIX) {
            let inst_id = arg.inst_id.ok_or(DecodeError::MissingField("instId"))?;
            return decode_candle_rows(&inst_id, timeframe, push.data)
                .map(|candles| candles.into_iter().map(Event::Candle).collect());
        }

        match channel {
            "account" => self.decode_account(push.data).map(|a| vec![Event::Account(a)]),
            "positions" => decode_positions(push.data).map(|p| vec![Event::Positions(p)]),
            "orders" => push
                .data
                .into_iter()
                .map(|row| decode_fill(row).map(Event::Fill))
                .collect(),
            other => Err(DecodeError::UnknownChannel(other.to_string())),
        }
    }

    fn decode_account(&self, data: Vec<Value>) -> Result<Account, DecodeError> {
        let row = data.into_iter().next().ok_or(DecodeError::Empty)?;
        let row: AccountRow = serde_json::from_value(row)?;
        let balances = row.details.into_iter().map(|b| CoinBalance {
            ccy: b.ccy,
            equity: b.eq,
            equity_usd: b.eq_usd,
        });
        Ok(Account::from_balances(row.u_time, balances, &self.quote_ccy))
    }
}

/// Candle rows are arrays `[ts, o, h, l, c, vol, ...]`
fn decode_candle_rows(
    inst_id: &str,
    timeframe: &str,
    data: Vec<Value>,
) -> Result<Vec<Candle>, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }
    data.into_iter()
        .map(|row| {
            let fields: Vec<String> = serde_json::from_value(row)?;
            if fields.len() < 6 {
                return Err(DecodeError::MissingField("volume"));
            }
            Ok(Candle {
                inst_id: inst_id.to_string(),
                timeframe: timeframe.to_string(),
                timestamp: parse_ms(&fields[0])?,
                open: parse_f64("open", &fields[1])?,
                high: parse_f64("high", &fields[2])?,
                low: parse_f64("low", &fields[3])?,
                close: parse_f64("close", &fields[4])?,
                volume: parse_f64("volume", &fields[5])?,
            })
        })
        .collect()
}

/// An empty push is a valid, empty position set
fn decode_positions(data: Vec<Value>) -> Result<Vec<Position>, DecodeError> {
    let rows = data
        .into_iter()
        .map(|row| {
            let row: PositionRow = serde_json::from_value(row)?;
            Ok(Position {
                inst_type: inst_type_from_wire(&row.inst_type)?,
                side: pos_side_from_wire(&row.pos_side)?.unwrap_or(PositionSide::Net),
                inst_id: row.inst_id,
                margin_ccy: row.ccy,
                size: row.pos,
                pos_ccy: row.pos_ccy,
                notional_usd: row.notional_usd,
                upl: row.upl,
            })
        })
        .collect::<Result<Vec<_>, DecodeError>>()?;
    Ok(position_set(rows))
}

fn decode_fill(row: Value) -> Result<FillOrder, DecodeError> {
    let row: OrderRow = serde_json::from_value(row)?;
    Ok(FillOrder {
        inst_type: inst_type_from_wire(&row.inst_type)?,
        pos_side: pos_side_from_wire(&row.pos_side)?,
        action: action_from_wire(&row.side)?,
        status: fill_status_from_wire(&row.state)?,
        client_order_id: row.cl_ord_id,
        inst_id: row.inst_id,
        size: row.sz,
        filled_size: row.fill_sz.unwrap_or(0.0),
        fill_price: row.fill_px,
        fill_time: row.fill_time,
        leverage: row.lever,
        fee: row.fee,
        pnl: row.pnl,
        created_at: row.c_time,
    })
}

// ---------------------------------------------------------------------------
// order-entry acks
// ---------------------------------------------------------------------------

/// Request id of an order-entry ack, if `text` is one
pub fn response_id(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    value.get("op")?;
    value.get("id")?.as_str().map(str::to_string)
}

/// Decode a single-order (or cancel) ack
pub fn decode_order_response(text: &str) -> Result<OrderResponse, DecodeError> {
    let ack: Ack = serde_json::from_str(text)?;
    let row = ack.data.into_iter().next();
    let status = if ack.code == "0" {
        OrderStatus::Ok
    } else {
        OrderStatus::Error
    };
    let msg = match (&row, ack.msg.is_empty()) {
        (Some(AckRow { s_msg: Some(s_msg), .. }), true) => s_msg.clone(),
        _ => ack.msg,
    };
    let (order_id, client_order_id) = row
        .map(|r| (r.ord_id, r.cl_ord_id))
        .unwrap_or((None, None));

    Ok(OrderResponse {
        op: ack.op,
        id: ack.id,
        status,
        code: ack.code,
        msg,
        order_id,
        client_order_id,
    })
}

/// Decode a `batch-orders` ack: one response per row, status from the row's `sCode`
pub fn decode_batch_response(text: &str) -> Result<Vec<OrderResponse>, DecodeError> {
    let ack: Ack = serde_json::from_str(text)?;
    if ack.data.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(ack
        .data
        .into_iter()
        .map(|row| {
            let code = row.s_code.unwrap_or_else(|| ack.code.clone());
            OrderResponse {
                op: ack.op.clone(),
                id: ack.id.clone(),
                status: if code == "0" {
                    OrderStatus::Ok
                } else {
                    OrderStatus::Error
                },
                code,
                msg: row.s_msg.unwrap_or_default(),
                order_id: row.ord_id,
                client_order_id: row.cl_ord_id,
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// REST payloads
// ---------------------------------------------------------------------------

/// Decode a history-candles page, returned oldest first
pub fn decode_history_candles(
    inst_id: &str,
    timeframe: &str,
    body: Value,
) -> Result<Vec<Candle>, DecodeError> {
    let envelope: RestEnvelope = serde_json::from_value(body)?;
    if envelope.data.is_empty() {
        return Ok(Vec::new());
    }
    let mut candles = decode_candle_rows(inst_id, timeframe, envelope.data)?;
    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}

/// Decode an instruments response, picking `inst_id` when given
pub fn decode_instrument_info(
    body: Value,
    inst_id: Option<&str>,
) -> Result<InstrumentInfo, DecodeError> {
    let envelope: RestEnvelope = serde_json::from_value(body)?;
    let mut rows = envelope
        .data
        .into_iter()
        .map(serde_json::from_value::<InstrumentRow>);
    let row = match inst_id {
        Some(wanted) => rows
            .find(|row| matches!(row, Ok(r) if r.inst_id == wanted))
            .ok_or(DecodeError::Empty)??,
        None => rows.next().ok_or(DecodeError::Empty)??,
    };
    Ok(InstrumentInfo {
        inst_type: inst_type_from_wire(&row.inst_type)?,
        inst_id: row.inst_id,
        contract_value: row.ct_val,
        min_size: row.min_sz,
        tick_size: row.tick_sz,
    })
}

/// Decode the REST place-order reply; `id` is the client order id that was sent
pub fn decode_rest_order_response(body: Value, id: &str) -> Result<OrderResponse, DecodeError> {
    let envelope: RestEnvelope = serde_json::from_value(body)?;
    let row = envelope.data.into_iter().next().ok_or(DecodeError::Empty)?;
    let row: AckRow = serde_json::from_value(row)?;
    let code = row.s_code.unwrap_or_else(|| "0".to_string());
    Ok(OrderResponse {
        op: "order".to_string(),
        id: id.to_string(),
        status: if code == "0" {
            OrderStatus::Ok
        } else {
            OrderStatus::Error
        },
        code,
        msg: row.s_msg.unwrap_or_default(),
        order_id: row.ord_id,
        client_order_id: row.cl_ord_id.or_else(|| Some(id.to_string())),
    })
}

// ---------------------------------------------------------------------------
// encoding
// ---------------------------------------------------------------------------

pub fn encode_login(credentials: &Credentials, timestamp: &str, sign: &str) -> String {
    json!({
        "op": "login",
        "args": [{
            "apiKey": credentials.api_key.expose(),
            "passphrase": credentials.passphrase.expose(),
            "timestamp": timestamp,
            "sign": sign,
        }]
    })
    .to_string()
}

pub fn encode_subscribe(specs: &[ChannelSpec]) -> Result<String, serde_json::Error> {
    serde_json::to_string(&json!({ "op": "subscribe", "args": specs }))
}

fn format_number(value: f64) -> String {
    value.to_string()
}

/// Order argument object; absent optional fields are omitted
pub fn order_args(order: &Order) -> Map<String, Value> {
    let mut args = Map::new();
    args.insert("side".into(), action_to_wire(order.action).into());
    args.insert("sz".into(), format_number(order.size).into());
    args.insert("instId".into(), order.inst_id.clone().into());
    args.insert("tdMode".into(), trading_mode_to_wire(order.trading_mode).into());
    args.insert("ordType".into(), order_type_to_wire(order.order_type).into());
    args.insert("clOrdId".into(), order.id().into());
    if let Some(price) = order.price {
        args.insert("px".into(), format_number(price).into());
    }
    if let Some(target_ccy) = order.target_ccy {
        args.insert("tgtCcy".into(), target_ccy_to_wire(target_ccy).into());
    }
    if let Some(ccy) = &order.margin_ccy {
        args.insert("ccy".into(), ccy.clone().into());
    }
    args
}

/// Single order request; the request id is the order's client id
pub fn encode_order(order: &Order) -> String {
    json!({
        "id": order.id(),
        "op": "order",
        "args": [order_args(order)],
    })
    .to_string()
}

/// Batch order request with a fresh request id
pub fn encode_batch_orders(orders: &[Order]) -> (String, String) {
    let id = new_client_id();
    let args: Vec<Value> = orders.iter().map(|o| Value::Object(order_args(o))).collect();
    let frame = json!({ "id": id, "op": "batch-orders", "args": args }).to_string();
    (id, frame)
}

/// Cancel request with a fresh request id
pub fn encode_cancel(cancel: &OrderCancel) -> (String, String) {
    let id = new_client_id();
    let frame = json!({
        "id": id,
        "op": "cancel-order",
        "args": [{ "instId": cancel.inst_id, "ordId": cancel.order_id }],
    })
    .to_string();
    (id, frame)
}
