//! Line-oriented admin surface over plain TCP. One command per line, one
//! reply line per command; binary payloads travel base64-encoded so the
//! whole protocol stays printable.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::device::anchors::AnchorIndex;
use crate::device::offsets::{
    ANCHOR_COUNT, LAYER_FILE_SIZE, VILLAGER_HOUSES, VILLAGER_RECORD_SIZE,
};
use crate::entities::item::{parse_attachment, Item};
use crate::orders::notifier::Notifier;
use crate::orders::queue::{EnqueueOutcome, OrderQueue, VillagerRequest};
use crate::orders::request::{RequestQueues, SideRequest};
use crate::telemetry::logging;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Order {
        requester_id: u64,
        requester_name: String,
        items: Vec<Item>,
        villager: Option<VillagerRequest>,
    },
    Skip {
        requester_id: u64,
    },
    Speak(String),
    Price(u32),
    Drop(Vec<Item>),
    Clean,
    Capture(AnchorIndex),
    Villager {
        house_index: u8,
        record: Vec<u8>,
    },
    Layer {
        name: String,
        layer: Vec<u8>,
    },
    Queue,
    Shutdown,
    Unknown(String),
}

pub fn parse_admin_line(line: &str) -> Result<AdminCommand, String> {
    let trimmed = line.trim();
    let mut parts = trimmed.split_whitespace();
    let command = parts
        .next()
        .ok_or_else(|| "admin command missing name".to_string())?;
    let command = command.to_ascii_lowercase();
    let parsed = match command.as_str() {
        "order" => {
            let requester_id = parse_u64(parts.next())?;
            let requester_name = parts
                .next()
                .ok_or_else(|| "order missing requester name".to_string())?
                .to_string();
            let blob = parse_base64(parts.next(), "order")?;
            AdminCommand::Order {
                requester_id,
                requester_name,
                items: parse_attachment(&blob)?,
                villager: None,
            }
        }
        "skip" => AdminCommand::Skip {
            requester_id: parse_u64(parts.next())?,
        },
        "speak" => {
            let text = trimmed[command.len()..].trim().to_string();
            if text.is_empty() {
                return Err("speak needs a message".to_string());
            }
            AdminCommand::Speak(text)
        }
        "price" => {
            let value = parts
                .next()
                .ok_or_else(|| "price missing value".to_string())?;
            AdminCommand::Price(
                value
                    .parse::<u32>()
                    .map_err(|_| format!("price '{value}' is not a number"))?,
            )
        }
        "drop" => {
            let blob = parse_base64(parts.next(), "drop")?;
            AdminCommand::Drop(parse_attachment(&blob)?)
        }
        "clean" => AdminCommand::Clean,
        "capture" => {
            let slot = parse_u64(parts.next())?;
            if slot >= ANCHOR_COUNT as u64 {
                return Err(format!("capture slot {slot} out of range"));
            }
            let index = AnchorIndex::from_index(slot as usize)
                .ok_or_else(|| format!("capture slot {slot} out of range"))?;
            AdminCommand::Capture(index)
        }
        "villager" => {
            let house_index = parse_u64(parts.next())?;
            if house_index >= VILLAGER_HOUSES as u64 {
                return Err(format!("villager house {house_index} out of range"));
            }
            let house_index = house_index as u8;
            let record = parse_base64(parts.next(), "villager")?;
            if record.len() != VILLAGER_RECORD_SIZE {
                return Err(format!(
                    "villager record expected {} bytes, got {}",
                    VILLAGER_RECORD_SIZE,
                    record.len()
                ));
            }
            AdminCommand::Villager { house_index, record }
        }
        "layer" => {
            let name = parts
                .next()
                .ok_or_else(|| "layer missing name".to_string())?
                .to_string();
            let layer = parse_base64(parts.next(), "layer")?;
            if layer.len() != LAYER_FILE_SIZE {
                return Err(format!(
                    "layer expected {} bytes, got {}",
                    LAYER_FILE_SIZE,
                    layer.len()
                ));
            }
            AdminCommand::Layer { name, layer }
        }
        "queue" => AdminCommand::Queue,
        "shutdown" => AdminCommand::Shutdown,
        _ => AdminCommand::Unknown(command),
    };
    Ok(parsed)
}

fn parse_u64(value: Option<&str>) -> Result<u64, String> {
    let value = value.ok_or_else(|| "admin command missing numeric value".to_string())?;
    value
        .parse::<u64>()
        .map_err(|_| format!("admin command expected number, got '{value}'"))
}

fn parse_base64(value: Option<&str>, what: &str) -> Result<Vec<u8>, String> {
    let value = value.ok_or_else(|| format!("{what} missing base64 payload"))?;
    BASE64
        .decode(value)
        .map_err(|err| format!("{what} payload is not base64: {err}"))
}

/// Applies one parsed command against the shared queues and produces the
/// reply line. Order notifications go back over the issuing connection.
pub fn apply_admin_command(
    command: AdminCommand,
    orders: &OrderQueue,
    requests: &RequestQueues,
    stop: &AtomicBool,
    notifier: Box<dyn Notifier>,
) -> String {
    match command {
        AdminCommand::Order {
            requester_id,
            requester_name,
            items,
            villager,
        } => match orders.enqueue(requester_id, &requester_name, &items, villager, notifier) {
            EnqueueOutcome::Queued { position, eta_secs } => {
                format!("queued position {position} eta {eta_secs}s")
            }
            EnqueueOutcome::AlreadyQueued => "error: already queued".to_string(),
            EnqueueOutcome::CurrentlyServing => "error: order in progress".to_string(),
            EnqueueOutcome::Full => "error: queue full".to_string(),
        },
        AdminCommand::Skip { requester_id } => {
            if orders.request_skip(requester_id) {
                "skip requested".to_string()
            } else {
                "error: no queued order for that requester".to_string()
            }
        }
        AdminCommand::Speak(text) => {
            requests.push(SideRequest::Speak(text));
            "speak queued".to_string()
        }
        AdminCommand::Price(price) => {
            requests.push(SideRequest::TurnipPrice(price));
            "price queued".to_string()
        }
        AdminCommand::Drop(items) => {
            let count = items.len();
            requests.push(SideRequest::DropItems(items));
            format!("drop of {count} item(s) queued")
        }
        AdminCommand::Clean => {
            requests.push(SideRequest::Clean);
            "clean queued".to_string()
        }
        AdminCommand::Capture(index) => {
            let reply = format!("capture of {index:?} queued");
            requests.push(SideRequest::CaptureAnchor(index));
            reply
        }
        AdminCommand::Villager { house_index, record } => {
            requests.push(SideRequest::VillagerInject { house_index, record });
            format!("villager for house {house_index} queued")
        }
        AdminCommand::Layer { name, layer } => {
            let reply = format!("layer '{name}' queued");
            requests.push(SideRequest::MapOverride { name, layer });
            reply
        }
        AdminCommand::Queue => format!("{} order(s) pending", orders.len()),
        AdminCommand::Shutdown => {
            stop.store(true, Ordering::SeqCst);
            "shutting down".to_string()
        }
        AdminCommand::Unknown(name) => format!("error: unknown command '{name}'"),
    }
}

/// Relays order life-cycle events back over the admin connection that
/// placed the order. Write failures are swallowed: the visit must not care
/// whether the admin client is still attached.
pub struct StreamNotifier {
    stream: Arc<Mutex<TcpStream>>,
}

impl StreamNotifier {
    pub fn new(stream: Arc<Mutex<TcpStream>>) -> Self {
        Self { stream }
    }

    fn send(&self, line: &str) {
        if let Ok(mut stream) = self.stream.lock() {
            let _ = stream.write_all(line.as_bytes());
            let _ = stream.write_all(b"\n");
        }
    }
}

impl Notifier for StreamNotifier {
    fn on_cancelled(&self, reason: &str, faulted: bool) {
        if faulted {
            self.send(&format!("order faulted: {reason}"));
        } else {
            self.send(&format!("order cancelled: {reason}"));
        }
    }

    fn on_initializing(&self, note: &str) {
        self.send(&format!("order initializing: {note}"));
    }

    fn on_ready(&self, note: &str, dodo_code: &str) {
        self.send(&format!("order ready, code {dodo_code}: {note}"));
    }

    fn on_completed(&self, note: &str) {
        self.send(&format!("order completed: {note}"));
    }

    fn on_notify(&self, note: &str) {
        self.send(note);
    }
}

/// Accept loop for the admin socket. One thread per connection; the
/// connection count is expected to stay tiny.
pub fn serve(
    bind_addr: &str,
    orders: Arc<OrderQueue>,
    requests: Arc<RequestQueues>,
    stop: Arc<AtomicBool>,
) -> Result<(), String> {
    let listener = TcpListener::bind(bind_addr)
        .map_err(|err| format!("admin bind {bind_addr} failed: {err}"))?;
    logging::log_net(&format!("admin socket listening on {bind_addr}"));
    for stream in listener.incoming() {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        match stream {
            Ok(stream) => {
                let orders = Arc::clone(&orders);
                let requests = Arc::clone(&requests);
                let stop = Arc::clone(&stop);
                std::thread::spawn(move || handle_client(stream, orders, requests, stop));
            }
            Err(err) => logging::log_error(&format!("admin accept failed: {err}")),
        }
    }
    Ok(())
}

fn handle_client(
    stream: TcpStream,
    orders: Arc<OrderQueue>,
    requests: Arc<RequestQueues>,
    stop: Arc<AtomicBool>,
) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    logging::log_net(&format!("admin client {peer} connected"));
    let reader = match stream.try_clone() {
        Ok(clone) => BufReader::new(clone),
        Err(err) => {
            logging::log_error(&format!("admin clone for {peer} failed: {err}"));
            return;
        }
    };
    let writer = Arc::new(Mutex::new(stream));
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        let reply = match parse_admin_line(&line) {
            Ok(command) => {
                let notifier = Box::new(StreamNotifier::new(Arc::clone(&writer)));
                apply_admin_command(command, &orders, &requests, &stop, notifier)
            }
            Err(err) => format!("error: {err}"),
        };
        if let Ok(mut stream) = writer.lock() {
            if stream
                .write_all(format!("{reply}\n").as_bytes())
                .is_err()
            {
                break;
            }
        }
        if stop.load(Ordering::SeqCst) {
            break;
        }
    }
    logging::log_net(&format!("admin client {peer} disconnected"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::item::{ITEM_RECORD_SIZE, MAX_ORDER_ITEMS};
    use crate::orders::notifier::NullNotifier;

    #[test]
    fn parse_order_decodes_base64_attachment() {
        let blob = crate::entities::item::encode_items(&[Item::new(0x09C4), Item::new(0x1E2D)]);
        let line = format!("order 7 Kara {}", BASE64.encode(&blob));
        let command = parse_admin_line(&line).expect("parse");
        assert_eq!(
            command,
            AdminCommand::Order {
                requester_id: 7,
                requester_name: "Kara".to_string(),
                items: vec![Item::new(0x09C4), Item::new(0x1E2D)],
                villager: None,
            }
        );
    }

    #[test]
    fn parse_order_rejects_empty_and_oversized() {
        assert!(parse_admin_line("order 7 Kara").is_err());
        let empty = BASE64.encode([0u8; 0]);
        assert!(parse_admin_line(&format!("order 7 Kara {empty}")).is_err());
        let oversized = BASE64.encode(vec![0u8; ITEM_RECORD_SIZE * (MAX_ORDER_ITEMS + 1)]);
        assert!(parse_admin_line(&format!("order 7 Kara {oversized}")).is_err());
    }

    #[test]
    fn parse_speak_keeps_whole_message() {
        let command = parse_admin_line("speak hello there island").expect("parse");
        assert_eq!(
            command,
            AdminCommand::Speak("hello there island".to_string())
        );
    }

    #[test]
    fn parse_drop_decodes_base64_records() {
        let records = vec![0u8; ITEM_RECORD_SIZE * 2];
        let line = format!("drop {}", BASE64.encode(&records));
        let command = parse_admin_line(&line).expect("parse");
        match command {
            AdminCommand::Drop(items) => assert_eq!(items.len(), 2),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parse_drop_rejects_ragged_payload() {
        let records = vec![0u8; ITEM_RECORD_SIZE + 3];
        let line = format!("drop {}", BASE64.encode(&records));
        assert!(parse_admin_line(&line).is_err());
    }

    #[test]
    fn parse_villager_checks_house_and_size() {
        let record = BASE64.encode(vec![0u8; VILLAGER_RECORD_SIZE]);
        assert!(parse_admin_line(&format!("villager 3 {record}")).is_ok());
        assert!(parse_admin_line(&format!("villager 10 {record}")).is_err());
        let short = BASE64.encode(vec![0u8; VILLAGER_RECORD_SIZE - 1]);
        assert!(parse_admin_line(&format!("villager 3 {short}")).is_err());
    }

    #[test]
    fn parse_layer_checks_size() {
        let layer = BASE64.encode(vec![0u8; LAYER_FILE_SIZE]);
        assert!(parse_admin_line(&format!("layer town {layer}")).is_ok());
        let short = BASE64.encode(vec![0u8; 64]);
        assert!(parse_admin_line(&format!("layer town {short}")).is_err());
    }

    #[test]
    fn parse_capture_checks_slot_bounds() {
        assert_eq!(
            parse_admin_line("capture 2").expect("parse"),
            AdminCommand::Capture(AnchorIndex::Counter)
        );
        assert!(parse_admin_line("capture 5").is_err());
        assert!(parse_admin_line("capture x").is_err());
    }

    #[test]
    fn apply_capture_lands_in_queues() {
        let orders = OrderQueue::new(4, 510);
        let requests = RequestQueues::new();
        let stop = AtomicBool::new(false);
        apply_admin_command(
            AdminCommand::Capture(AnchorIndex::DropZone),
            &orders,
            &requests,
            &stop,
            Box::new(NullNotifier),
        );
        assert_eq!(
            requests.next(),
            Some(SideRequest::CaptureAnchor(AnchorIndex::DropZone))
        );
    }

    #[test]
    fn parse_unknown_command_is_reported_not_fatal() {
        assert_eq!(
            parse_admin_line("frobnicate now").expect("parse"),
            AdminCommand::Unknown("frobnicate".to_string())
        );
    }

    #[test]
    fn apply_order_reports_position_and_eta() {
        let orders = OrderQueue::new(4, 510);
        let requests = RequestQueues::new();
        let stop = AtomicBool::new(false);
        let reply = apply_admin_command(
            AdminCommand::Order {
                requester_id: 7,
                requester_name: "Kara".to_string(),
                items: vec![Item::new(0x09C4)],
                villager: None,
            },
            &orders,
            &requests,
            &stop,
            Box::new(NullNotifier),
        );
        assert_eq!(reply, "queued position 1 eta 510s");
        assert_eq!(orders.len(), 1);
    }

    #[test]
    fn apply_side_requests_land_in_queues() {
        let orders = OrderQueue::new(4, 510);
        let requests = RequestQueues::new();
        let stop = AtomicBool::new(false);
        apply_admin_command(
            AdminCommand::Price(620),
            &orders,
            &requests,
            &stop,
            Box::new(NullNotifier),
        );
        apply_admin_command(
            AdminCommand::Clean,
            &orders,
            &requests,
            &stop,
            Box::new(NullNotifier),
        );
        assert_eq!(requests.next(), Some(SideRequest::TurnipPrice(620)));
        assert_eq!(requests.next(), Some(SideRequest::Clean));
    }

    #[test]
    fn apply_shutdown_raises_stop_flag() {
        let orders = OrderQueue::new(4, 510);
        let requests = RequestQueues::new();
        let stop = AtomicBool::new(false);
        let reply = apply_admin_command(
            AdminCommand::Shutdown,
            &orders,
            &requests,
            &stop,
            Box::new(NullNotifier),
        );
        assert_eq!(reply, "shutting down");
        assert!(stop.load(Ordering::SeqCst));
    }
}
