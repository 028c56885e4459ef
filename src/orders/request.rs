use std::collections::VecDeque;
use std::sync::Mutex;

use crate::device::anchors::AnchorIndex;
use crate::entities::item::Item;

/// Non-order work producers can hand the worker. One tagged union, one
/// dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideRequest {
    Speak(String),
    TurnipPrice(u32),
    DropItems(Vec<Item>),
    Clean,
    CaptureAnchor(AnchorIndex),
    VillagerInject { house_index: u8, record: Vec<u8> },
    MapOverride { name: String, layer: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Speak,
    Price,
    Drop,
    Clean,
    Capture,
    Villager,
    Map,
}

/// Idle-maintenance drain order: speak first, then price updates, then item
/// drops, then cleanup and anchor capture, then the slower villager/map
/// work.
const DRAIN_ORDER: [Kind; 7] = [
    Kind::Speak,
    Kind::Price,
    Kind::Drop,
    Kind::Clean,
    Kind::Capture,
    Kind::Villager,
    Kind::Map,
];

#[derive(Default)]
struct Lanes {
    speak: VecDeque<SideRequest>,
    price: VecDeque<SideRequest>,
    drop: VecDeque<SideRequest>,
    clean: VecDeque<SideRequest>,
    capture: VecDeque<SideRequest>,
    villager: VecDeque<SideRequest>,
    map: VecDeque<SideRequest>,
}

impl Lanes {
    fn lane_mut(&mut self, kind: Kind) -> &mut VecDeque<SideRequest> {
        match kind {
            Kind::Speak => &mut self.speak,
            Kind::Price => &mut self.price,
            Kind::Drop => &mut self.drop,
            Kind::Clean => &mut self.clean,
            Kind::Capture => &mut self.capture,
            Kind::Villager => &mut self.villager,
            Kind::Map => &mut self.map,
        }
    }
}

fn kind_of(request: &SideRequest) -> Kind {
    match request {
        SideRequest::Speak(_) => Kind::Speak,
        SideRequest::TurnipPrice(_) => Kind::Price,
        SideRequest::DropItems(_) => Kind::Drop,
        SideRequest::Clean => Kind::Clean,
        SideRequest::CaptureAnchor(_) => Kind::Capture,
        SideRequest::VillagerInject { .. } => Kind::Villager,
        SideRequest::MapOverride { .. } => Kind::Map,
    }
}

/// Thread-safe set of FIFO lanes, drained in strict priority order, one
/// request fully processed before the next is considered.
#[derive(Default)]
pub struct RequestQueues {
    lanes: Mutex<Lanes>,
}

impl RequestQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, request: SideRequest) {
        if let Ok(mut lanes) = self.lanes.lock() {
            let kind = kind_of(&request);
            lanes.lane_mut(kind).push_back(request);
        }
    }

    /// Next request by priority, or None when every lane is empty.
    pub fn next(&self) -> Option<SideRequest> {
        let mut lanes = self.lanes.lock().ok()?;
        for kind in DRAIN_ORDER {
            if let Some(request) = lanes.lane_mut(kind).pop_front() {
                return Some(request);
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.lanes
            .lock()
            .map(|mut lanes| DRAIN_ORDER.iter().all(|kind| lanes.lane_mut(*kind).is_empty()))
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_follows_priority_not_insertion() {
        let queues = RequestQueues::new();
        queues.push(SideRequest::Clean);
        queues.push(SideRequest::DropItems(vec![Item::new(1)]));
        queues.push(SideRequest::TurnipPrice(110));
        queues.push(SideRequest::Speak("hello".to_string()));
        assert_eq!(queues.next(), Some(SideRequest::Speak("hello".to_string())));
        assert_eq!(queues.next(), Some(SideRequest::TurnipPrice(110)));
        assert_eq!(
            queues.next(),
            Some(SideRequest::DropItems(vec![Item::new(1)]))
        );
        assert_eq!(queues.next(), Some(SideRequest::Clean));
        assert_eq!(queues.next(), None);
    }

    #[test]
    fn same_lane_stays_fifo() {
        let queues = RequestQueues::new();
        queues.push(SideRequest::Speak("first".to_string()));
        queues.push(SideRequest::Speak("second".to_string()));
        assert_eq!(queues.next(), Some(SideRequest::Speak("first".to_string())));
        assert_eq!(queues.next(), Some(SideRequest::Speak("second".to_string())));
    }

    #[test]
    fn empty_reports_empty() {
        let queues = RequestQueues::new();
        assert!(queues.is_empty());
        queues.push(SideRequest::Clean);
        assert!(!queues.is_empty());
    }
}
