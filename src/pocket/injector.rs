//! The two fixed-capacity pockets are read and written as one contiguous
//! blob. The device stores the pocket blocks in reverse of their visible
//! order, so slot 0..19 of the flat array lives in the second block and
//! 20..39 in the first.

use crate::device::offsets::{
    BIND_MAX, BIND_UNBOUND, POCKET_ADDRESS, POCKET_BAG_COUNT_SIZE, POCKET_BIND_SIZE,
    POCKET_BLOB_SIZE, POCKET_BLOCK_SIZE, POCKET_ITEMS_SIZE, POCKET_SLOTS,
};
use crate::entities::item::{decode_items, encode_items, Item, MAX_ORDER_ITEMS};
use crate::net::transport::DeviceLink;

/// Parsed form of the combined pocket blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PocketSnapshot {
    /// Flat 40-slot array in visible order.
    pub items: Vec<Item>,
    /// Bag counts for pocket one and pocket two.
    pub bag_counts: [u32; 2],
    /// Bind lists for pocket one and pocket two.
    pub binds: [[u8; POCKET_SLOTS]; 2],
}

impl PocketSnapshot {
    pub fn parse(blob: &[u8], validate: bool) -> Result<Self, String> {
        if blob.len() != POCKET_BLOB_SIZE {
            return Err(format!(
                "pocket blob expected {} bytes, got {}",
                POCKET_BLOB_SIZE,
                blob.len()
            ));
        }
        let (block_two, block_one) = blob.split_at(POCKET_BLOCK_SIZE);
        let (items_one, count_one, binds_one) = split_block(block_one)?;
        let (items_two, count_two, binds_two) = split_block(block_two)?;
        let mut items = items_one;
        items.extend(items_two);
        let snapshot = Self {
            items,
            bag_counts: [count_one, count_two],
            binds: [binds_one, binds_two],
        };
        if validate {
            snapshot.validate()?;
        }
        Ok(snapshot)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (pocket, count) in self.bag_counts.iter().enumerate() {
            if !matches!(count, 0 | 10 | 20) {
                return Err(format!(
                    "pocket {} bag count {} is not 0, 10 or 20",
                    pocket + 1,
                    count
                ));
            }
        }
        if self.bag_counts[1] != POCKET_SLOTS as u32 {
            return Err(format!(
                "pocket 2 bag count must be {}, got {}",
                POCKET_SLOTS, self.bag_counts[1]
            ));
        }
        for (pocket, binds) in self.binds.iter().enumerate() {
            let mut seen = [false; (BIND_MAX as usize) + 1];
            for bind in binds {
                if *bind == BIND_UNBOUND {
                    continue;
                }
                if *bind > BIND_MAX {
                    return Err(format!(
                        "pocket {} bind value {} out of range",
                        pocket + 1,
                        bind
                    ));
                }
                if seen[*bind as usize] {
                    return Err(format!(
                        "pocket {} bind value {} duplicated",
                        pocket + 1,
                        bind
                    ));
                }
                seen[*bind as usize] = true;
            }
        }
        Ok(())
    }

    /// Re-interleaves the flat array back into the device's block order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(POCKET_BLOB_SIZE);
        out.extend(block_bytes(
            &self.items[POCKET_SLOTS..],
            self.bag_counts[1],
            &self.binds[1],
        ));
        out.extend(block_bytes(
            &self.items[..POCKET_SLOTS],
            self.bag_counts[0],
            &self.binds[0],
        ));
        out
    }

    pub fn with_items(&self, items: &[Item]) -> Result<Self, String> {
        if items.len() != MAX_ORDER_ITEMS {
            return Err(format!(
                "pocket write expects {} items, got {}",
                MAX_ORDER_ITEMS,
                items.len()
            ));
        }
        Ok(Self {
            items: items.to_vec(),
            bag_counts: self.bag_counts,
            binds: self.binds,
        })
    }
}

fn split_block(block: &[u8]) -> Result<(Vec<Item>, u32, [u8; POCKET_SLOTS]), String> {
    let items = decode_items(&block[..POCKET_ITEMS_SIZE])?;
    let count_start = POCKET_ITEMS_SIZE;
    let count = u32::from_le_bytes([
        block[count_start],
        block[count_start + 1],
        block[count_start + 2],
        block[count_start + 3],
    ]);
    let bind_start = count_start + POCKET_BAG_COUNT_SIZE;
    let mut binds = [0u8; POCKET_SLOTS];
    binds.copy_from_slice(&block[bind_start..bind_start + POCKET_BIND_SIZE]);
    Ok((items, count, binds))
}

fn block_bytes(items: &[Item], count: u32, binds: &[u8; POCKET_SLOTS]) -> Vec<u8> {
    let mut out = Vec::with_capacity(POCKET_BLOCK_SIZE);
    out.extend(encode_items(items));
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(binds);
    out
}

/// Reads and rewrites the pockets atomically. Failures here are local: the
/// caller skips the drop step or retries, never escalating on their own.
pub struct PocketInjector {
    validate: bool,
}

impl PocketInjector {
    pub fn new(validate: bool) -> Self {
        Self { validate }
    }

    pub fn read(&self, link: &mut DeviceLink) -> Result<PocketSnapshot, String> {
        let blob = link.peek(POCKET_ADDRESS, POCKET_BLOB_SIZE)?;
        PocketSnapshot::parse(&blob, self.validate)
    }

    /// Writes a flat 40-slot array back, preserving counts and binds. Skips
    /// the transmit entirely when the resulting bytes are unchanged;
    /// returns whether anything was sent.
    pub fn write(&self, link: &mut DeviceLink, items: &[Item]) -> Result<bool, String> {
        let original_blob = link.peek(POCKET_ADDRESS, POCKET_BLOB_SIZE)?;
        let original = PocketSnapshot::parse(&original_blob, self.validate)?;
        let updated = original.with_items(items)?;
        if self.validate {
            updated.validate()?;
        }
        let updated_blob = updated.to_bytes();
        if updated_blob == original_blob {
            return Ok(false);
        }
        link.poke(POCKET_ADDRESS, &updated_blob)?;
        Ok(true)
    }

    /// Fills all 40 slots with duplicates of one item.
    pub fn write_uniform(&self, link: &mut DeviceLink, item: Item) -> Result<bool, String> {
        self.write(link, &vec![item; MAX_ORDER_ITEMS])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::transport::mock::MockTransport;

    fn valid_snapshot() -> PocketSnapshot {
        PocketSnapshot {
            items: vec![Item::NONE; MAX_ORDER_ITEMS],
            bag_counts: [20, 20],
            binds: [[BIND_UNBOUND; POCKET_SLOTS]; 2],
        }
    }

    fn linked_mock(snapshot: &PocketSnapshot) -> (MockTransport, DeviceLink) {
        let mock = MockTransport::new();
        mock.write_memory(POCKET_ADDRESS, &snapshot.to_bytes());
        let link = DeviceLink::new(Box::new(mock.clone()));
        (mock, link)
    }

    #[test]
    fn roundtrip_preserves_flat_order() {
        let mut snapshot = valid_snapshot();
        snapshot.items[0] = Item::new(0x09C4);
        snapshot.items[39] = Item::new(0x1234);
        let parsed = PocketSnapshot::parse(&snapshot.to_bytes(), true).expect("parse");
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn write_then_read_returns_input() {
        let (_mock, mut link) = linked_mock(&valid_snapshot());
        let injector = PocketInjector::new(true);
        let mut items = vec![Item::NONE; MAX_ORDER_ITEMS];
        items[3] = Item::new(0x09C4);
        // MockTransport keeps memory static across pokes, so verify via the
        // pure interleave path the injector uses.
        let original = injector.read(&mut link).expect("read");
        let rewritten = original.with_items(&items).expect("with items");
        let reparsed = PocketSnapshot::parse(&rewritten.to_bytes(), true).expect("reparse");
        assert_eq!(reparsed.items, items);
    }

    #[test]
    fn unchanged_write_transmits_nothing() {
        let snapshot = valid_snapshot();
        let (mock, mut link) = linked_mock(&snapshot);
        let injector = PocketInjector::new(true);
        let sent = injector
            .write(&mut link, &snapshot.items)
            .expect("write");
        assert!(!sent);
        assert!(mock
            .sent_lines()
            .iter()
            .all(|line| !line.starts_with("poke ")));
    }

    #[test]
    fn changed_write_transmits_once() {
        let snapshot = valid_snapshot();
        let (mock, mut link) = linked_mock(&snapshot);
        let injector = PocketInjector::new(true);
        let mut items = snapshot.items.clone();
        items[0] = Item::new(0x09C4);
        let sent = injector.write(&mut link, &items).expect("write");
        assert!(sent);
        let pokes = mock
            .sent_lines()
            .iter()
            .filter(|line| line.starts_with("poke "))
            .count();
        assert_eq!(pokes, 1);
    }

    #[test]
    fn write_uniform_fills_every_slot() {
        let snapshot = valid_snapshot();
        let (mock, mut link) = linked_mock(&snapshot);
        let injector = PocketInjector::new(true);
        let sent = injector
            .write_uniform(&mut link, Item::new(0x09C4))
            .expect("write");
        assert!(sent);
        let poked = mock
            .sent_lines()
            .iter()
            .find(|line| line.starts_with("poke "))
            .cloned()
            .expect("poke line");
        let hex = poked
            .rsplit(' ')
            .next()
            .and_then(|token| token.strip_prefix("0x"))
            .expect("payload");
        let blob = crate::net::commands::decode_hex(hex).expect("decode");
        let written = PocketSnapshot::parse(&blob, true).expect("parse");
        assert!(written
            .items
            .iter()
            .all(|item| item.item_id == 0x09C4));
    }

    #[test]
    fn bag_count_of_five_rejected() {
        let mut snapshot = valid_snapshot();
        snapshot.bag_counts[0] = 5;
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn pocket_two_count_must_be_twenty() {
        let mut snapshot = valid_snapshot();
        snapshot.bag_counts[1] = 19;
        assert!(snapshot.validate().is_err());
        snapshot.bag_counts[1] = 10;
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn duplicate_bind_rejected() {
        let mut snapshot = valid_snapshot();
        snapshot.binds[0][0] = 3;
        snapshot.binds[0][5] = 3;
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn bind_out_of_range_rejected() {
        let mut snapshot = valid_snapshot();
        snapshot.binds[1][0] = BIND_MAX + 1;
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn validation_can_be_disabled() {
        let mut snapshot = valid_snapshot();
        snapshot.bag_counts[0] = 5;
        let parsed = PocketSnapshot::parse(&snapshot.to_bytes(), false);
        assert!(parsed.is_ok());
        assert!(PocketSnapshot::parse(&snapshot.to_bytes(), true).is_err());
    }

    #[test]
    fn wrong_blob_size_rejected() {
        assert!(PocketSnapshot::parse(&vec![0u8; POCKET_BLOB_SIZE - 1], false).is_err());
    }
}
