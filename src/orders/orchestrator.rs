use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::BotConfig;
use crate::device::anchors::AnchorIndex;
use crate::device::offsets::{
    ACRE_PARAMS_ADDRESS, CHAT_BUFFER_ADDRESS, CHAT_BUFFER_SIZE, FIELD_ITEMS_ADDRESS,
    FIELD_ITEMS_SIZE, FIELD_ITEM_CHUNKS, TERRAIN_ADDRESS, TURNIP_PRICE_ADDRESS,
    VILLAGER_HOUSES, VILLAGER_HOUSE_STRIDE, VILLAGER_RECORD_ADDRESS, VILLAGER_RECORD_SIZE,
};
use crate::device::scripts::{
    airport_enter_script, airport_leave_script, close_gate_script, drop_item_script,
    relaunch_script, run_steps, title_screen_script,
};
use crate::device::state::OverworldState;
use crate::device::tracker::{encode_utf16le, WaypointTracker};
use crate::entities::item::{pad_to_capacity, Item};
use crate::map::diff::diff_chunks;
use crate::map::terrain::MapTerrainLite;
use crate::net::commands::Button;
use crate::net::transport::DeviceLink;
use crate::orders::queue::{Order, OrderQueue, OrderResult};
use crate::orders::request::{RequestQueues, SideRequest};
use crate::persistence::files::StateFiles;
use crate::pocket::injector::PocketInjector;
use crate::telemetry::logging;

const AIRPORT_ENTRY_ATTEMPTS: u32 = 6;
const ORDER_TIMEOUT_BUFFER: Duration = Duration::from_secs(60);

/// Where the worker currently is inside an order. Logged on every fault so
/// a failure can be reconstructed from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderPhase {
    Idle,
    Dequeued,
    Restarting,
    MidSessionClear,
    AwaitingOverworld,
    AtAirport,
    DodoIssued,
    AwaitingArrival,
    VisitorPresent,
    AwaitingDeparture,
}

/// Device-dependent session state. Owned exclusively by the worker; no
/// ambient globals.
#[derive(Debug)]
pub struct SessionState {
    pub dirty: bool,
    pub phase: OrderPhase,
    pub dodo_code: Option<String>,
    pub current_visitor: Option<String>,
    pub last_arriver: String,
    pub last_day: i64,
    pub visitor_count: u64,
    pub visitor_list: Vec<String>,
    pub injected_villager: Option<(u8, Vec<u8>)>,
    pub last_price: Option<u32>,
}

impl SessionState {
    /// Sessions start dirty: the first order after connect always relaunches.
    pub fn new() -> Self {
        Self {
            dirty: true,
            phase: OrderPhase::Idle,
            dodo_code: None,
            current_visitor: None,
            last_arriver: String::new(),
            last_day: logging::current_day(),
            visitor_count: 0,
            visitor_list: Vec::new(),
            injected_villager: None,
            last_price: None,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

enum PickupOutcome {
    Departing,
    TimedOut,
    SessionDead,
}

/// The top-level state machine. Dequeues one order at a time, drives the
/// visit end to end, and runs crash recovery while idle.
pub struct Orchestrator {
    config: BotConfig,
    tracker: WaypointTracker,
    injector: PocketInjector,
    map: MapTerrainLite,
    files: StateFiles,
    pub session: SessionState,
}

impl Orchestrator {
    pub fn new(
        config: BotConfig,
        tracker: WaypointTracker,
        map: MapTerrainLite,
        files: StateFiles,
    ) -> Self {
        let injector = PocketInjector::new(!config.skip_pocket_validation);
        let mut session = SessionState::new();
        session.visitor_count = files.load_visitor_count();
        session.last_price = files.load_turnip_price();
        Self {
            config,
            tracker,
            injector,
            map,
            files,
            session,
        }
    }

    /// The worker loop: exactly one in-flight order or one crash-recovery
    /// cycle at any time, never both.
    pub fn run_loop(
        &mut self,
        link: &mut DeviceLink,
        orders: &OrderQueue,
        requests: &RequestQueues,
        stop: &AtomicBool,
    ) {
        while !stop.load(Ordering::SeqCst) {
            if let Some(order) = orders.pop() {
                orders.set_serving(Some(order.requester_id));
                let result = self.execute_order(link, &order, requests);
                orders.set_serving(None);
                logging::log_order(&format!("order {} finished: {result:?}", order.id));
            } else if self.config.auto_recover {
                if let Err(err) = self.recovery_tick(link, requests) {
                    logging::log_error(&format!("recovery: {err}"));
                    self.session.dirty = true;
                }
                self.poll_sleep();
            } else {
                if let Err(err) = self.background_tick(link, requests) {
                    logging::log_error(&format!("idle maintenance: {err}"));
                }
                self.poll_sleep();
            }
        }
    }

    pub fn execute_order(
        &mut self,
        link: &mut DeviceLink,
        order: &Order,
        requests: &RequestQueues,
    ) -> OrderResult {
        let started = Instant::now();
        let hard_deadline =
            started + Duration::from_secs(self.config.order_budget_secs()) + ORDER_TIMEOUT_BUFFER;
        self.session.phase = OrderPhase::Dequeued;
        let item_count = order.items.iter().filter(|item| !item.is_none()).count();
        logging::log_order(&format!(
            "order {} for '{}' ({} items) dequeued, dirty={}",
            order.id, order.requester_name, item_count, self.session.dirty
        ));

        if !self.tracker.anchors().is_complete() {
            let missing = self.tracker.anchors().missing();
            logging::log_error(&format!("order {}: anchors missing {:?}", order.id, missing));
            order
                .notifier
                .on_cancelled("bot anchors are not configured", true);
            self.session.phase = OrderPhase::Idle;
            return OrderResult::Faulted;
        }

        // A day rollover invalidates the running session.
        let today = logging::current_day();
        if today != self.session.last_day {
            logging::log_order("day rollover detected, forcing restart");
            self.session.dirty = true;
        }
        self.session.last_day = today;

        order
            .notifier
            .on_initializing("preparing your delivery, please stand by");
        self.map.apply_order(&order.items);

        let result = match self.run_order(link, order, requests, hard_deadline) {
            Ok(result) => result,
            Err(err) => {
                logging::log_error(&format!(
                    "order {} faulted in {:?} after {}s: {err}",
                    order.id,
                    self.session.phase,
                    started.elapsed().as_secs()
                ));
                OrderResult::Faulted
            }
        };
        self.finish_order(link, order, result);
        logging::log_order(&format!(
            "order {} -> {result:?} after {}s",
            order.id,
            started.elapsed().as_secs()
        ));
        result
    }

    fn run_order(
        &mut self,
        link: &mut DeviceLink,
        order: &Order,
        requests: &RequestQueues,
        hard_deadline: Instant,
    ) -> Result<OrderResult, String> {
        if self.session.dirty {
            self.restart_session(link)?;
        } else {
            self.mid_session_clear(link)?;
        }
        self.session.phase = OrderPhase::AwaitingOverworld;
        let setup = Duration::from_secs(self.config.setup_budget_secs);
        if !self.await_state(link, OverworldState::Overworld, setup)? {
            return Err("overworld never reached after setup".to_string());
        }

        if let Some(villager) = &order.villager {
            self.inject_villager(link, villager.house_index, &villager.record)?;
        }

        let code = self.issue_dodo(link)?;
        order.notifier.on_ready(
            &format!(
                "your order is ready; you have {}s to arrive and {}s to pick up",
                self.config.arrival_window_secs, self.config.pickup_window_secs
            ),
            &code,
        );

        self.session.phase = OrderPhase::AwaitingArrival;
        let visitor = match self.await_arrival(link, order, hard_deadline)? {
            Some(name) => name,
            None => return Ok(OrderResult::NoArrival),
        };
        logging::log_order(&format!("order {}: visitor '{visitor}' present", order.id));

        self.session.phase = OrderPhase::VisitorPresent;
        match self.pickup_window(link, order, requests, hard_deadline)? {
            PickupOutcome::SessionDead => Ok(OrderResult::Faulted),
            PickupOutcome::TimedOut => Ok(OrderResult::NoLeave),
            PickupOutcome::Departing => {
                self.session.phase = OrderPhase::AwaitingDeparture;
                let wait = self.anchor_wait();
                if !self.await_state(link, OverworldState::Overworld, wait)? {
                    return Err("departure never completed".to_string());
                }
                Ok(OrderResult::Success)
            }
        }
    }

    fn finish_order(&mut self, link: &mut DeviceLink, order: &Order, result: OrderResult) {
        match result {
            OrderResult::Success => {
                order.notifier.on_completed("enjoy, come again");
                match self.close_gate(link) {
                    Ok(alive) => {
                        self.session.dirty = !alive;
                        if !alive {
                            logging::log_error("session not alive after gate close");
                        }
                    }
                    Err(err) => {
                        logging::log_error(&format!("gate close failed: {err}"));
                        self.session.dirty = true;
                    }
                }
            }
            OrderResult::NoArrival => {
                order
                    .notifier
                    .on_cancelled("you never arrived in time", false);
                self.end_session(link);
            }
            OrderResult::NoLeave => {
                order
                    .notifier
                    .on_cancelled("you stayed past the time budget", false);
                self.end_session(link);
            }
            OrderResult::Faulted => {
                order
                    .notifier
                    .on_cancelled("something went wrong with your order", true);
                self.end_session(link);
            }
        }
        self.session.current_visitor = None;
        self.session.phase = OrderPhase::Idle;
    }

    /// Full console relaunch: scripted title-screen traversal, then item
    /// injection before the overworld is reached.
    fn restart_session(&mut self, link: &mut DeviceLink) -> Result<(), String> {
        self.session.phase = OrderPhase::Restarting;
        logging::log_order("restarting console session");
        self.tracker.invalidate_cache();
        self.session.dodo_code = None;
        run_steps(link, &relaunch_script(&self.config.delays))?;
        run_steps(link, &title_screen_script(&self.config.delays))?;
        self.full_map_write(link, true)?;
        Ok(())
    }

    /// Fast path: the overworld is assumed reachable; just reconcile the
    /// item grid against the snapshot.
    fn mid_session_clear(&mut self, link: &mut DeviceLink) -> Result<(), String> {
        self.session.phase = OrderPhase::MidSessionClear;
        self.diff_map_write(link, true)
    }

    /// Airport run: teleport in, walk through the door, reach the counter,
    /// run the dialogue script, read the code, walk back out to the drop
    /// zone. Used by both order execution and idle dodo refresh.
    fn issue_dodo(&mut self, link: &mut DeviceLink) -> Result<String, String> {
        self.session.phase = OrderPhase::AtAirport;
        let wait = self.anchor_wait();
        self.tracker.send_anchor(link, AnchorIndex::AirportEntry)?;
        if !self.dismiss_until(link, AnchorIndex::AirportEntry, wait)? {
            return Err("airport entry anchor unreachable".to_string());
        }
        self.enter_airport(link)?;
        self.tracker.send_anchor(link, AnchorIndex::Counter)?;
        if !self.dismiss_until(link, AnchorIndex::Counter, wait)? {
            return Err("counter anchor unreachable".to_string());
        }
        let code = self.tracker.acquire_dodo_code(
            link,
            self.config.dodo_script,
            &self.config.delays,
        )?;
        self.session.phase = OrderPhase::DodoIssued;
        self.session.dodo_code = Some(code.clone());
        if let Err(err) = self.files.save_dodo_code(&code) {
            logging::log_error(&format!("dodo code persist failed: {err}"));
        }
        logging::log_order(&format!("dodo code {code} issued"));

        self.tracker.send_anchor(link, AnchorIndex::Departure)?;
        run_steps(link, &airport_leave_script(&self.config.delays))?;
        if !self.await_state(link, OverworldState::Overworld, wait)? {
            return Err("never left the airport".to_string());
        }
        self.tracker.send_anchor(link, AnchorIndex::DropZone)?;
        Ok(code)
    }

    /// Walk-forward retry loop through the airport door, bounded by a small
    /// fixed attempt count, polling for a state change after each attempt.
    fn enter_airport(&mut self, link: &mut DeviceLink) -> Result<(), String> {
        let wait = self.anchor_wait();
        for attempt in 1..=AIRPORT_ENTRY_ATTEMPTS {
            run_steps(link, &airport_enter_script(&self.config.delays))?;
            let state = self.tracker.classify(link)?;
            if state != OverworldState::Overworld {
                if !self.await_state(link, OverworldState::Overworld, wait)? {
                    return Err("airport load never settled".to_string());
                }
                return Ok(());
            }
            logging::log_order(&format!(
                "airport entry attempt {attempt}/{AIRPORT_ENTRY_ATTEMPTS} did not transition"
            ));
            self.poll_sleep();
        }
        Err(format!(
            "airport entry failed after {AIRPORT_ENTRY_ATTEMPTS} attempts"
        ))
    }

    fn await_arrival(
        &mut self,
        link: &mut DeviceLink,
        order: &Order,
        hard_deadline: Instant,
    ) -> Result<Option<String>, String> {
        let window = Duration::from_secs(self.config.arrival_window_secs);
        let deadline = (Instant::now() + window).min(hard_deadline);
        loop {
            let name = self.tracker.read_arriver_name(link)?;
            if !name.is_empty() && name != self.session.last_arriver {
                self.session.last_arriver = name.clone();
                if self.config.rejected_visitors.iter().any(|bad| bad == &name) {
                    logging::log_visitor(&format!("rejected visitor '{name}' arriving"));
                    order
                        .notifier
                        .on_notify(&format!("'{name}' is not welcome here"));
                    continue;
                }
                self.record_arrival(&name);
                order.notifier.on_notify(&format!("'{name}' is arriving"));
                // Let the join animation finish before anything else.
                let wait = self.anchor_wait();
                if !self.await_state(link, OverworldState::Overworld, wait)? {
                    return Err("arrival animation never finished".to_string());
                }
                return Ok(Some(name));
            }
            if Instant::now() >= deadline {
                logging::log_order(&format!(
                    "order {}: nobody arrived within {}s",
                    order.id, self.config.arrival_window_secs
                ));
                return Ok(None);
            }
            self.poll_sleep();
        }
    }

    fn pickup_window(
        &mut self,
        link: &mut DeviceLink,
        order: &Order,
        requests: &RequestQueues,
        hard_deadline: Instant,
    ) -> Result<PickupOutcome, String> {
        let window = Duration::from_secs(self.config.pickup_window_secs);
        let warning = Duration::from_secs(self.config.pickup_warning_secs);
        let deadline = Instant::now() + window;
        let mut warned = false;
        loop {
            // Liveness first: a dead session faults immediately no matter
            // how much budget remains.
            if !self.tracker.session_alive(link)? {
                logging::log_error("session died during pickup window");
                return Ok(PickupOutcome::SessionDead);
            }
            if let Err(err) = self.background_tick(link, requests) {
                logging::log_error(&format!("pickup maintenance: {err}"));
            }
            let state = self.tracker.classify(link)?;
            if state == OverworldState::UserArriveLeaving {
                return Ok(PickupOutcome::Departing);
            }
            let now = Instant::now();
            if now >= hard_deadline {
                logging::log_error("order exceeded hard time budget");
                return Ok(PickupOutcome::SessionDead);
            }
            if now >= deadline {
                return Ok(PickupOutcome::TimedOut);
            }
            let remaining = deadline.saturating_duration_since(now);
            if !warned && remaining <= warning {
                warned = true;
                order.notifier.on_notify(&format!(
                    "time is almost up, please leave within {}s",
                    remaining.as_secs()
                ));
                if let Some(visitor) = &self.session.current_visitor {
                    logging::log_order(&format!("warned '{visitor}' about the pickup deadline"));
                }
            }
            self.poll_sleep();
        }
    }

    /// Ends a visit without ending the whole session. Reports whether the
    /// session survived, which becomes the next order's dirty flag.
    fn close_gate(&mut self, link: &mut DeviceLink) -> Result<bool, String> {
        let wait = self.anchor_wait();
        self.tracker.send_anchor(link, AnchorIndex::AirportEntry)?;
        if !self.dismiss_until(link, AnchorIndex::AirportEntry, wait)? {
            return Err("airport entry anchor unreachable for gate close".to_string());
        }
        self.enter_airport(link)?;
        self.tracker.send_anchor(link, AnchorIndex::Counter)?;
        if !self.dismiss_until(link, AnchorIndex::Counter, wait)? {
            return Err("counter anchor unreachable for gate close".to_string());
        }
        run_steps(link, &close_gate_script(&self.config.delays))?;
        run_steps(link, &airport_leave_script(&self.config.delays))?;
        if !self.await_state(link, OverworldState::Overworld, wait)? {
            return Err("never left the airport after gate close".to_string());
        }
        self.tracker.send_anchor(link, AnchorIndex::DropZone)?;
        self.session.dodo_code = None;
        self.tracker.session_alive(link)
    }

    /// Best effort wind-down after a failed order; the real cleanup is the
    /// dirty restart that follows.
    fn end_session(&mut self, link: &mut DeviceLink) {
        self.session.dirty = true;
        self.session.dodo_code = None;
        if let Err(err) = link.click(Button::Home) {
            logging::log_error(&format!("end of session: {err}"));
        }
    }

    /// Idle maintenance while no order runs: keep a valid dodo code, relay
    /// visitor edges, re-inject wandering villagers, detect session death.
    pub fn recovery_tick(
        &mut self,
        link: &mut DeviceLink,
        requests: &RequestQueues,
    ) -> Result<(), String> {
        if !self.tracker.session_alive(link)? {
            logging::log_error("recovery: session died");
            self.session.dirty = true;
            self.session.dodo_code = None;
            let grace = Duration::from_secs(self.config.hard_crash_timeout_secs);
            if self.await_state(link, OverworldState::Overworld, grace)? {
                // Soft path: the game came back on its own, a fresh code is
                // enough.
                self.issue_dodo(link)?;
            } else {
                logging::log_error("recovery: stuck outside overworld, hard crash");
                self.restart_session(link)?;
                let setup = Duration::from_secs(self.config.setup_budget_secs);
                if !self.await_state(link, OverworldState::Overworld, setup)? {
                    return Err("hard crash relaunch never reached overworld".to_string());
                }
                self.issue_dodo(link)?;
            }
            self.session.dirty = false;
            return Ok(());
        }

        if self.session.dodo_code.is_none() {
            self.issue_dodo(link)?;
        }

        let name = self.tracker.read_arriver_name(link)?;
        if !name.is_empty() && name != self.session.last_arriver {
            self.session.last_arriver = name.clone();
            if self.config.rejected_visitors.iter().any(|bad| bad == &name) {
                logging::log_visitor(&format!("rejected visitor '{name}' arriving while idle"));
            } else {
                self.record_arrival(&name);
            }
        }

        let state = self.tracker.classify(link)?;
        if state == OverworldState::UserArriveLeaving && self.session.current_visitor.is_some() {
            let visitor = self.session.current_visitor.take().unwrap_or_default();
            logging::log_visitor(&format!("'{visitor}' leaving"));
            if self.config.refresh_terrain_on_edge {
                self.full_map_write(link, true)?;
            } else {
                self.diff_map_write(link, false)?;
            }
        }

        if self.config.reinject_villagers {
            self.reinject_villager(link)?;
        }

        self.background_tick(link, requests)
    }

    /// Drains at most one side request, fully processing it. Strict
    /// priority is enforced by the queue set.
    pub fn background_tick(
        &mut self,
        link: &mut DeviceLink,
        requests: &RequestQueues,
    ) -> Result<(), String> {
        let request = match requests.next() {
            Some(request) => request,
            None => return Ok(()),
        };
        match request {
            SideRequest::Speak(text) => {
                let encoded = encode_utf16le(&text, CHAT_BUFFER_SIZE);
                link.poke(CHAT_BUFFER_ADDRESS, &encoded)?;
                link.click(Button::R)?;
                logging::log_order(&format!("speak: {text}"));
            }
            SideRequest::TurnipPrice(price) => {
                link.poke(TURNIP_PRICE_ADDRESS, &price.to_le_bytes())?;
                self.session.last_price = Some(price);
                if let Err(err) = self.files.save_turnip_price(price) {
                    logging::log_error(&format!("turnip price persist failed: {err}"));
                }
                logging::log_order(&format!("turnip price set to {price}"));
            }
            SideRequest::DropItems(items) => self.drop_items(link, &items)?,
            SideRequest::Clean => {
                self.diff_map_write(link, false)?;
                logging::log_order("map cleaned back to snapshot");
            }
            SideRequest::CaptureAnchor(index) => {
                self.tracker.update_anchor(link, index)?;
                if let Err(err) = self.files.save_anchors(self.tracker.anchors()) {
                    logging::log_error(&format!("anchor table persist failed: {err}"));
                }
                logging::log_order(&format!("anchor {index:?} captured"));
            }
            SideRequest::VillagerInject { house_index, record } => {
                self.inject_villager(link, house_index, &record)?;
            }
            SideRequest::MapOverride { name, layer } => {
                let (spawn_x, spawn_y) = self.map.spawn();
                match MapTerrainLite::from_layer_bytes(&layer, spawn_x, spawn_y) {
                    Ok(map) => {
                        logging::log_order(&format!(
                            "layer '{name}' loaded, fingerprint {}",
                            map.fingerprint()
                        ));
                        self.map = map;
                        self.full_map_write(link, true)?;
                        if let Err(err) = self.files.save_layer_name(&name) {
                            logging::log_error(&format!("layer name persist failed: {err}"));
                        }
                    }
                    Err(err) => {
                        // Malformed layers are a validation fault, local only.
                        logging::log_error(&format!("layer '{name}' rejected: {err}"));
                    }
                }
            }
        }
        Ok(())
    }

    /// Stages the items in the pockets, drops them at the current position,
    /// then restores the original inventory. Pocket validation failures are
    /// logged and skipped, never escalated.
    fn drop_items(&mut self, link: &mut DeviceLink, items: &[Item]) -> Result<(), String> {
        if !self.config.allow_drops {
            logging::log_order("drop request ignored: drops disabled");
            return Ok(());
        }
        let original = match self.injector.read(link) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                logging::log_error(&format!("drop skipped, pocket read: {err}"));
                return Ok(());
            }
        };
        let staged = pad_to_capacity(items);
        if let Err(err) = self.injector.write(link, &staged) {
            logging::log_error(&format!("drop skipped, pocket write: {err}"));
            return Ok(());
        }
        let count = items.iter().filter(|item| !item.is_none()).count();
        for _ in 0..count {
            run_steps(link, &drop_item_script(&self.config.delays))?;
        }
        if let Err(err) = self.injector.write(link, &original.items) {
            logging::log_error(&format!("pocket restore failed: {err}"));
        }
        Ok(())
    }

    fn inject_villager(
        &mut self,
        link: &mut DeviceLink,
        house_index: u8,
        record: &[u8],
    ) -> Result<(), String> {
        if house_index >= VILLAGER_HOUSES {
            logging::log_error(&format!("villager house {house_index} out of range"));
            return Ok(());
        }
        if record.len() != VILLAGER_RECORD_SIZE {
            logging::log_error(&format!(
                "villager record expected {} bytes, got {}",
                VILLAGER_RECORD_SIZE,
                record.len()
            ));
            return Ok(());
        }
        let address = VILLAGER_RECORD_ADDRESS + house_index as u64 * VILLAGER_HOUSE_STRIDE;
        link.poke(address, record)?;
        self.session.injected_villager = Some((house_index, record.to_vec()));
        logging::log_order(&format!("villager injected into house {house_index}"));
        Ok(())
    }

    /// Rewrites the stored villager record if the device copy drifted.
    fn reinject_villager(&mut self, link: &mut DeviceLink) -> Result<(), String> {
        let (house_index, record) = match &self.session.injected_villager {
            Some((house_index, record)) => (*house_index, record.clone()),
            None => return Ok(()),
        };
        let address = VILLAGER_RECORD_ADDRESS + house_index as u64 * VILLAGER_HOUSE_STRIDE;
        let device = link.peek(address, VILLAGER_RECORD_SIZE)?;
        if device != record {
            logging::log_order(&format!("villager in house {house_index} drifted, re-injecting"));
            link.poke(address, &record)?;
        }
        Ok(())
    }

    /// Transmits the whole item grid, optionally terrain and acres too.
    fn full_map_write(&mut self, link: &mut DeviceLink, include_terrain: bool) -> Result<(), String> {
        link.poke(FIELD_ITEMS_ADDRESS, self.map.items())?;
        if include_terrain {
            link.poke(TERRAIN_ADDRESS, self.map.terrain())?;
            link.poke(ACRE_PARAMS_ADDRESS, self.map.acre_params())?;
        }
        if self.config.freeze_map {
            link.freeze(FIELD_ITEMS_ADDRESS, self.map.items())?;
        }
        logging::log_net("full map write");
        Ok(())
    }

    /// Transmits only the chunks that differ from the device, honoring the
    /// drop-zone chunk policy.
    fn diff_map_write(&mut self, link: &mut DeviceLink, order_pending: bool) -> Result<(), String> {
        if self.config.freeze_map {
            link.unfreeze(FIELD_ITEMS_ADDRESS)?;
        }
        let device = link.peek(FIELD_ITEMS_ADDRESS, FIELD_ITEMS_SIZE)?;
        let forced = if self.config.allow_drops
            && self.config.drop_zone_policy.forces_chunk(order_pending)
        {
            Some(self.map.drop_zone_offset())
        } else {
            None
        };
        let chunks = diff_chunks(self.map.items(), &device, FIELD_ITEM_CHUNKS, forced)?;
        let count = chunks.len();
        for chunk in chunks {
            link.poke(FIELD_ITEMS_ADDRESS + chunk.offset as u64, &chunk.bytes)?;
        }
        if self.config.freeze_map {
            link.freeze(FIELD_ITEMS_ADDRESS, self.map.items())?;
        }
        logging::log_net(&format!("diff map write, {count} chunk(s)"));
        Ok(())
    }

    fn record_arrival(&mut self, name: &str) {
        self.session.current_visitor = Some(name.to_string());
        self.session.visitor_count += 1;
        self.session.visitor_list.push(name.to_string());
        logging::log_visitor(&format!("'{name}' arriving"));
        if let Err(err) = self.files.save_visitor_count(self.session.visitor_count) {
            logging::log_error(&format!("visitor count persist failed: {err}"));
        }
        if let Err(err) = self.files.save_visitor_list(&self.session.visitor_list) {
            logging::log_error(&format!("visitor list persist failed: {err}"));
        }
    }

    /// Dismisses stray dialogue while waiting to land on an anchor.
    fn dismiss_until(
        &mut self,
        link: &mut DeviceLink,
        index: AnchorIndex,
        timeout: Duration,
    ) -> Result<bool, String> {
        self.tracker
            .await_anchor(link, index, timeout, |link| link.click(Button::B))
    }

    fn await_state(
        &mut self,
        link: &mut DeviceLink,
        target: OverworldState,
        timeout: Duration,
    ) -> Result<bool, String> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.tracker.classify(link)? == target {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            self.poll_sleep();
        }
    }

    fn anchor_wait(&self) -> Duration {
        Duration::from_millis(self.config.anchor_wait_ms)
    }

    fn poll_sleep(&self) {
        std::thread::sleep(Duration::from_millis(self.config.poll_interval_ms));
    }
}
