use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use crate::device::anchors::{Anchor, AnchorIndex, AnchorTable};
use crate::device::offsets::{
    ANCHOR_POSITION_SIZE, ANCHOR_ROTATION_OFFSET, ANCHOR_ROTATION_SIZE, ARRIVER_NAME_ADDRESS,
    ARRIVER_NAME_SIZE, COORDINATE_JUMPS, DODO_ADDRESS, DODO_CODE_LENGTH, SESSION_ACTIVE_ADDRESS,
    STATUS_OFFSET,
};
use crate::device::scripts::{dodo_script, run_steps, DodoScriptKind, ScriptDelays};
use crate::device::state::{classify_state, OverworldState};
use crate::net::transport::DeviceLink;
use crate::telemetry::logging;

const POINTER_CACHE_SIZE: usize = 8;
const TELEPORT_REPEATS: usize = 2;
const TELEPORT_REPEAT_DELAY: Duration = Duration::from_millis(300);

/// Resolves pointer chains, classifies game state, and replays anchors.
/// Owns the anchor table for the session.
pub struct WaypointTracker {
    anchors: AnchorTable,
    pointer_cache: LruCache<Vec<u64>, u64>,
    poll_interval: Duration,
}

impl WaypointTracker {
    pub fn new(anchors: AnchorTable, poll_interval: Duration) -> Self {
        let capacity = NonZeroUsize::new(POINTER_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            anchors,
            pointer_cache: LruCache::new(capacity),
            poll_interval,
        }
    }

    pub fn anchors(&self) -> &AnchorTable {
        &self.anchors
    }

    /// Resolved addresses go stale across a relaunch; the cache must be
    /// dropped whenever the session restarts.
    pub fn invalidate_cache(&mut self) {
        self.pointer_cache.clear();
    }

    /// Sends the pointer chain head, receives the big-endian base address,
    /// and applies the chain's final offset arithmetically.
    pub fn resolve_pointer(&mut self, link: &mut DeviceLink, jumps: &[u64]) -> Result<u64, String> {
        if jumps.is_empty() {
            return Err("pointer chain is empty".to_string());
        }
        let key = jumps.to_vec();
        if let Some(address) = self.pointer_cache.get(&key) {
            return Ok(*address);
        }
        let (last, head) = jumps.split_last().unwrap_or((&0, &[]));
        let base = link.pointer_base(head)?;
        let address = base.wrapping_add(*last);
        self.pointer_cache.put(key, address);
        Ok(address)
    }

    fn coordinate_address(&mut self, link: &mut DeviceLink) -> Result<u64, String> {
        self.resolve_pointer(link, &COORDINATE_JUMPS)
    }

    /// Current coarse game state, recomputed from the status word.
    pub fn classify(&mut self, link: &mut DeviceLink) -> Result<OverworldState, String> {
        let base = self.coordinate_address(link)?;
        let bytes = link.peek_absolute(base + STATUS_OFFSET, 4)?;
        let status = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Ok(classify_state(status))
    }

    /// Reads the avatar's current position and rotation blocks.
    pub fn read_anchor(&mut self, link: &mut DeviceLink) -> Result<Anchor, String> {
        let base = self.coordinate_address(link)?;
        let position_bytes = link.peek_absolute(base, ANCHOR_POSITION_SIZE)?;
        let rotation_bytes =
            link.peek_absolute(base + ANCHOR_ROTATION_OFFSET, ANCHOR_ROTATION_SIZE)?;
        let mut anchor = Anchor::default();
        anchor.position.copy_from_slice(&position_bytes);
        anchor.rotation.copy_from_slice(&rotation_bytes);
        Ok(anchor)
    }

    /// The teleport primitive. Replayed twice in a row to defeat
    /// load-induced desync.
    pub fn send_anchor(&mut self, link: &mut DeviceLink, index: AnchorIndex) -> Result<(), String> {
        let anchor = *self.anchors.get(index);
        if !anchor.is_captured() {
            return Err(format!("anchor {index:?} was never captured"));
        }
        let base = self.coordinate_address(link)?;
        for repeat in 0..TELEPORT_REPEATS {
            link.poke_absolute(base, &anchor.position)?;
            link.poke_absolute(base + ANCHOR_ROTATION_OFFSET, &anchor.rotation)?;
            if repeat + 1 < TELEPORT_REPEATS {
                std::thread::sleep(TELEPORT_REPEAT_DELAY);
            }
        }
        Ok(())
    }

    /// Captures the avatar's current position into an anchor slot.
    pub fn update_anchor(
        &mut self,
        link: &mut DeviceLink,
        index: AnchorIndex,
    ) -> Result<Anchor, String> {
        let anchor = self.read_anchor(link)?;
        self.anchors.set(index, anchor);
        Ok(anchor)
    }

    /// The single bounded-retry primitive: runs `action` (failures logged,
    /// never aborting the loop), then checks whether the avatar sits on the
    /// anchor. Returns false on timeout.
    pub fn await_anchor<F>(
        &mut self,
        link: &mut DeviceLink,
        index: AnchorIndex,
        timeout: Duration,
        mut action: F,
    ) -> Result<bool, String>
    where
        F: FnMut(&mut DeviceLink) -> Result<(), String>,
    {
        let expected = self.anchors.get(index).position;
        let deadline = Instant::now() + timeout;
        loop {
            if let Err(err) = action(link) {
                logging::log_error(&format!("await anchor {index:?} action failed: {err}"));
            }
            match self.read_anchor(link) {
                Ok(current) if current.position == expected => return Ok(true),
                Ok(_) => {}
                Err(err) => {
                    logging::log_error(&format!("await anchor {index:?} read failed: {err}"));
                }
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Runs the configured dialogue traversal and reads back the issued
    /// code. Every script variant ends with the code readable and the
    /// dialogue dismissed.
    pub fn acquire_dodo_code(
        &mut self,
        link: &mut DeviceLink,
        kind: DodoScriptKind,
        delays: &ScriptDelays,
    ) -> Result<String, String> {
        let steps = dodo_script(kind, delays);
        run_steps(link, &steps)?;
        self.read_dodo_code(link)
    }

    pub fn read_dodo_code(&mut self, link: &mut DeviceLink) -> Result<String, String> {
        let bytes = link.peek(DODO_ADDRESS, DODO_CODE_LENGTH)?;
        let code = String::from_utf8_lossy(&bytes).to_string();
        validate_dodo_code(&code)?;
        Ok(code)
    }

    /// Name of the currently arriving visitor, empty when nobody is in the
    /// arrival animation. Stored UTF-16LE, NUL terminated.
    pub fn read_arriver_name(&mut self, link: &mut DeviceLink) -> Result<String, String> {
        let bytes = link.peek(ARRIVER_NAME_ADDRESS, ARRIVER_NAME_SIZE)?;
        Ok(decode_utf16le(&bytes))
    }

    /// Liveness: the session-active word is nonzero while the online
    /// session still exists.
    pub fn session_alive(&mut self, link: &mut DeviceLink) -> Result<bool, String> {
        let bytes = link.peek(SESSION_ACTIVE_ADDRESS, 4)?;
        Ok(bytes.iter().any(|byte| *byte != 0))
    }
}

pub fn validate_dodo_code(code: &str) -> Result<(), String> {
    if code.len() != DODO_CODE_LENGTH {
        return Err(format!(
            "dodo code '{code}' has length {}, expected {}",
            code.len(),
            DODO_CODE_LENGTH
        ));
    }
    if !code
        .chars()
        .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit())
    {
        return Err(format!("dodo code '{code}' contains invalid characters"));
    }
    Ok(())
}

/// Encodes text as UTF-16LE into a fixed-size NUL padded buffer,
/// truncating at the buffer's unit capacity.
pub fn encode_utf16le(text: &str, size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(size);
    for unit in text.encode_utf16() {
        if out.len() + 2 > size {
            break;
        }
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out.resize(size, 0);
    out
}

fn decode_utf16le(bytes: &[u8]) -> String {
    let mut units = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks(2) {
        if pair.len() < 2 {
            break;
        }
        let unit = u16::from_le_bytes([pair[0], pair[1]]);
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::offsets::STATUS_OVERWORLD;
    use crate::net::transport::mock::MockTransport;

    fn tracker_with_anchor(index: AnchorIndex, seed: u8) -> WaypointTracker {
        let mut table = AnchorTable::default();
        let mut anchor = Anchor::default();
        anchor.position[0] = seed;
        anchor.rotation[0] = seed;
        table.set(index, anchor);
        WaypointTracker::new(table, Duration::from_millis(1))
    }

    fn mock_with_base(base: u64) -> (MockTransport, DeviceLink) {
        let mock = MockTransport::new();
        mock.state.lock().expect("mock state").pointer_base = base;
        let link = DeviceLink::new(Box::new(mock.clone()));
        (mock, link)
    }

    #[test]
    fn resolve_pointer_applies_final_offset() {
        let (_mock, mut link) = mock_with_base(0x4000);
        let mut tracker = WaypointTracker::new(AnchorTable::default(), Duration::from_millis(1));
        let address = tracker
            .resolve_pointer(&mut link, &[0x10, 0x20, 0x30])
            .expect("resolve");
        assert_eq!(address, 0x4030);
    }

    #[test]
    fn resolve_pointer_caches_until_invalidated() {
        let (mock, mut link) = mock_with_base(0x4000);
        let mut tracker = WaypointTracker::new(AnchorTable::default(), Duration::from_millis(1));
        tracker.resolve_pointer(&mut link, &[0x10, 0x8]).expect("resolve");
        tracker.resolve_pointer(&mut link, &[0x10, 0x8]).expect("resolve");
        let pointer_sends = mock
            .sent_lines()
            .iter()
            .filter(|line| line.starts_with("pointer"))
            .count();
        assert_eq!(pointer_sends, 1);
        tracker.invalidate_cache();
        tracker.resolve_pointer(&mut link, &[0x10, 0x8]).expect("resolve");
        let pointer_sends = mock
            .sent_lines()
            .iter()
            .filter(|line| line.starts_with("pointer"))
            .count();
        assert_eq!(pointer_sends, 2);
    }

    #[test]
    fn classify_reads_status_word() {
        let (mock, mut link) = mock_with_base(0x4000);
        let chain_tail = COORDINATE_JUMPS[COORDINATE_JUMPS.len() - 1];
        mock.write_memory(
            0x4000 + chain_tail + STATUS_OFFSET,
            &STATUS_OVERWORLD.to_le_bytes(),
        );
        let mut tracker = WaypointTracker::new(AnchorTable::default(), Duration::from_millis(1));
        let state = tracker.classify(&mut link).expect("classify");
        assert_eq!(state, OverworldState::Overworld);
    }

    #[test]
    fn send_anchor_repeats_teleport() {
        let (mock, mut link) = mock_with_base(0x4000);
        let mut tracker = tracker_with_anchor(AnchorIndex::Counter, 9);
        tracker
            .send_anchor(&mut link, AnchorIndex::Counter)
            .expect("teleport");
        let pokes = mock
            .sent_lines()
            .iter()
            .filter(|line| line.starts_with("pokeAbsolute "))
            .count();
        assert_eq!(pokes, 4);
    }

    #[test]
    fn send_anchor_requires_capture() {
        let (_mock, mut link) = mock_with_base(0x4000);
        let mut tracker = WaypointTracker::new(AnchorTable::default(), Duration::from_millis(1));
        assert!(tracker.send_anchor(&mut link, AnchorIndex::Plaza).is_err());
    }

    #[test]
    fn await_anchor_times_out_and_survives_action_failure() {
        let (_mock, mut link) = mock_with_base(0x4000);
        let mut tracker = tracker_with_anchor(AnchorIndex::DropZone, 7);
        let mut attempts = 0;
        let reached = tracker
            .await_anchor(
                &mut link,
                AnchorIndex::DropZone,
                Duration::from_millis(5),
                |_link| {
                    attempts += 1;
                    Err("button press failed".to_string())
                },
            )
            .expect("await");
        assert!(!reached);
        assert!(attempts >= 1);
    }

    #[test]
    fn await_anchor_matches_position() {
        let (mock, mut link) = mock_with_base(0x4000);
        let mut tracker = tracker_with_anchor(AnchorIndex::DropZone, 7);
        let chain_tail = COORDINATE_JUMPS[COORDINATE_JUMPS.len() - 1];
        let expected = tracker.anchors().get(AnchorIndex::DropZone).position;
        mock.write_memory(0x4000 + chain_tail, &expected);
        let reached = tracker
            .await_anchor(
                &mut link,
                AnchorIndex::DropZone,
                Duration::from_millis(50),
                |_link| Ok(()),
            )
            .expect("await");
        assert!(reached);
    }

    #[test]
    fn dodo_code_validation() {
        assert!(validate_dodo_code("AB1CD").is_ok());
        assert!(validate_dodo_code("ab1cd").is_err());
        assert!(validate_dodo_code("AB1C").is_err());
        assert!(validate_dodo_code("AB1C!").is_err());
    }

    #[test]
    fn arriver_name_decodes_utf16() {
        let (mock, mut link) = mock_with_base(0);
        let mut raw = Vec::new();
        for unit in "Kara".encode_utf16() {
            raw.extend_from_slice(&unit.to_le_bytes());
        }
        raw.resize(ARRIVER_NAME_SIZE, 0);
        mock.write_memory(ARRIVER_NAME_ADDRESS, &raw);
        let mut tracker = WaypointTracker::new(AnchorTable::default(), Duration::from_millis(1));
        assert_eq!(tracker.read_arriver_name(&mut link).expect("name"), "Kara");
    }

    #[test]
    fn session_alive_checks_nonzero_word() {
        let (mock, mut link) = mock_with_base(0);
        let mut tracker = WaypointTracker::new(AnchorTable::default(), Duration::from_millis(1));
        assert!(!tracker.session_alive(&mut link).expect("liveness"));
        mock.write_memory(SESSION_ACTIVE_ADDRESS, &[1, 0, 0, 0]);
        assert!(tracker.session_alive(&mut link).expect("liveness"));
    }
}
