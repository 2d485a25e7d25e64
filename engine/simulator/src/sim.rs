//! The agent driver: a wire-protocol client embedding the stochastic event
//! clock. Feed handling and the 1 ms tick loop share one task; every send
//! goes through the same framed writer.

use std::time::Duration;

use protocol::{
    encode_frame, split_frame, Id, Lifespan, MessageType, PayloadCancelOrder,
    PayloadConfirmOrderInserted, PayloadInsertOrder, PayloadOrderBookSnapshot, PayloadPartialFill,
    PayloadPriceLevelUpdate, PayloadSubscribe, PayloadTradeEvent, Price, Side, Volume,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use zerocopy::{AsBytes, FromBytes};

use crate::dynamics::{MarketDynamics, LAMBDA_CANCEL_BASE, LAMBDA_INSERT_BASE};
use crate::error::{SimulatorError, SimulatorResult};
use crate::ledger::OrderLedger;
use crate::rng::RandomSource;
use crate::shadow_book::ShadowOrderBook;
use crate::state::{SimulationState, TradeView};

/// Fixed event-clock period.
const TICK_PERIOD: Duration = Duration::from_millis(1);
/// Elapsed wall time per tick is clamped to this many seconds.
const MAX_TICK_SECONDS: f64 = 0.25;
/// Hazard mass assigned to the bootstrap orders.
const BOOTSTRAP_HAZARD: f64 = 10.0;

const INITIAL_MID: Price = 1_000;
const INITIAL_SPREAD: Price = 4;
const INITIAL_DEPTH: Price = 5;
const INITIAL_BASE_QTY: Volume = 20;

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub host: String,
    pub port: u16,
    pub seed: u64,
    pub stream: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 16_000, seed: 0, stream: 0 }
    }
}

pub struct MarketSimulator<const N: usize> {
    reader: Option<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    accum: Vec<u8>,
    frame_scratch: Vec<u8>,

    shadow: ShadowOrderBook,
    state: SimulationState<N>,
    dynamics: MarketDynamics,
    ledger: OrderLedger,
    rng: Box<dyn RandomSource>,

    lambda_insert: f64,
    lambda_cancel: f64,
    cumulative_hazard: f64,
    next_request_id: Id,
    expired_scratch: Vec<Id>,
}

impl<const N: usize> MarketSimulator<N> {
    pub async fn connect(
        config: &SimulatorConfig,
        rng: Box<dyn RandomSource>,
        bucket_bounds: [Price; N],
    ) -> SimulatorResult<Self> {
        let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        info!(host = %config.host, port = config.port, seed = config.seed, "agent connected");

        Ok(Self {
            reader: Some(reader),
            writer,
            accum: Vec::with_capacity(128 * 1024),
            frame_scratch: Vec::with_capacity(protocol::MAX_FRAME_SIZE),
            shadow: ShadowOrderBook::new(),
            state: SimulationState::new(bucket_bounds),
            dynamics: MarketDynamics,
            ledger: OrderLedger::new(),
            rng,
            lambda_insert: LAMBDA_INSERT_BASE,
            lambda_cancel: LAMBDA_CANCEL_BASE,
            cumulative_hazard: 0.0,
            next_request_id: 0,
            expired_scratch: Vec::new(),
        })
    }

    /// Subscribe, seed the book, then interleave feed frames with the fixed
    /// 1 ms event clock until the connection drops.
    pub async fn run(mut self) -> SimulatorResult<()> {
        self.subscribe().await?;
        self.populate_initial_book().await?;

        let Some(mut reader) = self.reader.take() else {
            return Err(SimulatorError::Disconnected);
        };
        let mut chunk = vec![0u8; 64 * 1024];
        let mut interval = tokio::time::interval(TICK_PERIOD);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let dt = last_tick.elapsed().as_secs_f64().min(MAX_TICK_SECONDS);
                    last_tick = Instant::now();
                    self.on_tick(dt).await?;
                }
                read = reader.read(&mut chunk) => {
                    match read {
                        Ok(0) => return Err(SimulatorError::Disconnected),
                        Ok(n) => self.on_bytes(&chunk[..n])?,
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }

    async fn subscribe(&mut self) -> SimulatorResult<()> {
        let request_id = self.next_request();
        let payload = PayloadSubscribe { client_request_id: request_id };
        self.send(MessageType::Subscribe, payload.as_bytes()).await
    }

    /// Seed a symmetric ladder around the initial mid so the estimators have
    /// something to look at before trading picks up.
    async fn populate_initial_book(&mut self) -> SimulatorResult<()> {
        let best_bid = INITIAL_MID - INITIAL_SPREAD / 2;
        let best_ask = INITIAL_MID + INITIAL_SPREAD / 2;

        for depth in 0..INITIAL_DEPTH {
            let quantity = INITIAL_BASE_QTY * (INITIAL_DEPTH - depth) as Volume;
            self.send_insert(Side::Buy, best_bid - depth, quantity, Lifespan::GoodForDay, BOOTSTRAP_HAZARD)
                .await?;
            self.send_insert(Side::Sell, best_ask + depth, quantity, Lifespan::GoodForDay, BOOTSTRAP_HAZARD)
                .await?;
        }
        Ok(())
    }

    async fn on_tick(&mut self, dt: f64) -> SimulatorResult<()> {
        if dt <= 0.0 {
            return Ok(());
        }
        self.state.sync_with_book(&self.shadow, dt);

        // Advance the cancellation process and fire crossed thresholds.
        self.cumulative_hazard += self.lambda_cancel * dt;
        let mut expired = std::mem::take(&mut self.expired_scratch);
        expired.clear();
        self.ledger.drain_expired(self.cumulative_hazard, &mut expired);
        for &order_id in &expired {
            self.send_cancel(order_id).await?;
        }
        self.expired_scratch = expired;

        self.lambda_insert = self.dynamics.insert_intensity(&self.state);
        self.lambda_cancel =
            self.dynamics.cancel_intensity(&self.state, self.ledger.open_order_count());

        let inserts = self.rng.poisson(self.lambda_insert * dt);
        for _ in 0..inserts {
            self.generate_insert().await?;
        }
        Ok(())
    }

    async fn generate_insert(&mut self) -> SimulatorResult<()> {
        let decision = self.dynamics.decide_insert(&self.state, self.rng.as_mut());
        trace!(
            side = %decision.side,
            price = decision.price,
            quantity = decision.quantity,
            archetype = ?decision.archetype,
            "insert decision"
        );
        self.send_insert(
            decision.side,
            decision.price,
            decision.quantity,
            decision.lifespan,
            decision.hazard_increment,
        )
        .await
    }

    async fn send_insert(
        &mut self,
        side: Side,
        price: Price,
        quantity: Volume,
        lifespan: Lifespan,
        hazard_increment: f64,
    ) -> SimulatorResult<()> {
        let request_id = self.next_request();
        self.ledger.register_pending(request_id, self.cumulative_hazard + hazard_increment);
        let payload = PayloadInsertOrder {
            client_request_id: request_id,
            side: side.to_wire(),
            price,
            quantity,
            lifespan: lifespan.to_wire(),
        };
        self.send(MessageType::InsertOrder, payload.as_bytes()).await
    }

    async fn send_cancel(&mut self, exchange_order_id: Id) -> SimulatorResult<()> {
        let request_id = self.next_request();
        let payload = PayloadCancelOrder { client_request_id: request_id, exchange_order_id };
        self.send(MessageType::CancelOrder, payload.as_bytes()).await
    }

    fn on_bytes(&mut self, bytes: &[u8]) -> SimulatorResult<()> {
        self.accum.extend_from_slice(bytes);
        let mut offset = 0;
        loop {
            match split_frame(&self.accum[offset..]) {
                Ok(None) => break,
                Ok(Some((message_type, payload, consumed))) => {
                    Self::handle_message(
                        &mut self.shadow,
                        &mut self.state,
                        &mut self.ledger,
                        message_type,
                        payload,
                    );
                    offset += consumed;
                }
                Err(e) => return Err(e.into()),
            }
        }
        if offset > 0 {
            self.accum.drain(..offset);
        }
        Ok(())
    }

    fn handle_message(
        shadow: &mut ShadowOrderBook,
        state: &mut SimulationState<N>,
        ledger: &mut OrderLedger,
        message_type: MessageType,
        payload: &[u8],
    ) {
        match message_type {
            MessageType::OrderBookSnapshot => {
                if let Some(snapshot) = PayloadOrderBookSnapshot::read_from(payload) {
                    shadow.apply_snapshot(&snapshot);
                }
            }
            MessageType::PriceLevelUpdate => {
                let Some(update) = PayloadPriceLevelUpdate::read_from(payload) else {
                    return;
                };
                let Some(side) = Side::from_wire(update.side) else {
                    return;
                };
                shadow.apply_level_update(side, update.price, update.total_volume);
            }
            MessageType::TradeEvent => {
                let Some(trade) = PayloadTradeEvent::read_from(payload) else {
                    return;
                };
                let Some(taker_side) = Side::from_wire(trade.taker_side) else {
                    return;
                };
                state.on_trade(&TradeView {
                    price: trade.price,
                    quantity: trade.quantity,
                    taker_side,
                    timestamp: trade.timestamp,
                });
            }
            MessageType::ConfirmOrderInserted => {
                if let Some(confirm) = PayloadConfirmOrderInserted::read_from(payload) {
                    ledger.confirm_insert(confirm.client_request_id, confirm.exchange_order_id);
                }
            }
            MessageType::PartialFillOrder => {
                if let Some(fill) = PayloadPartialFill::read_from(payload) {
                    ledger.on_fill(fill.exchange_order_id, fill.leaves_quantity);
                }
            }
            MessageType::ErrorMsg => {
                if let Some(err) = protocol::PayloadError::read_from(payload) {
                    let (code, request) = (err.code, err.client_request_id);
                    warn!(code, request, message = err.message_str(), "exchange error");
                }
            }
            other => {
                debug!(message_type = other.to_wire(), "unhandled feed message");
            }
        }
    }

    async fn send(&mut self, message_type: MessageType, payload: &[u8]) -> SimulatorResult<()> {
        self.frame_scratch.clear();
        encode_frame(&mut self.frame_scratch, message_type, payload);
        self.writer.write_all(&self.frame_scratch).await?;
        Ok(())
    }

    #[inline]
    fn next_request(&mut self) -> Id {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }

    /// Monotone non-decreasing by construction; exposed for tests.
    pub fn cumulative_hazard(&self) -> f64 {
        self.cumulative_hazard
    }
}
