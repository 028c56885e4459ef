/// One inventory/field item record as stored by the device: four
/// little-endian u16 fields packed into eight bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Item {
    pub item_id: u16,
    pub use_count: u16,
    pub system_param: u16,
    pub free_param: u16,
}

pub const ITEM_RECORD_SIZE: usize = 8;

/// Maximum carryable item count: two pockets of twenty slots.
pub const MAX_ORDER_ITEMS: usize = 40;

/// Item id the device uses for an empty slot/tile.
pub const NONE_ITEM_ID: u16 = 0xFFFE;

impl Item {
    pub const NONE: Item = Item {
        item_id: NONE_ITEM_ID,
        use_count: 0,
        system_param: 0,
        free_param: 0,
    };

    pub fn new(item_id: u16) -> Self {
        Item {
            item_id,
            use_count: 0,
            system_param: 0,
            free_param: 0,
        }
    }

    pub fn is_none(&self) -> bool {
        self.item_id == NONE_ITEM_ID
    }

    pub fn decode(bytes: &[u8]) -> Result<Item, String> {
        if bytes.len() != ITEM_RECORD_SIZE {
            return Err(format!(
                "item record expected {} bytes, got {}",
                ITEM_RECORD_SIZE,
                bytes.len()
            ));
        }
        Ok(Item {
            item_id: u16::from_le_bytes([bytes[0], bytes[1]]),
            use_count: u16::from_le_bytes([bytes[2], bytes[3]]),
            system_param: u16::from_le_bytes([bytes[4], bytes[5]]),
            free_param: u16::from_le_bytes([bytes[6], bytes[7]]),
        })
    }

    pub fn encode(&self) -> [u8; ITEM_RECORD_SIZE] {
        let mut out = [0u8; ITEM_RECORD_SIZE];
        out[0..2].copy_from_slice(&self.item_id.to_le_bytes());
        out[2..4].copy_from_slice(&self.use_count.to_le_bytes());
        out[4..6].copy_from_slice(&self.system_param.to_le_bytes());
        out[6..8].copy_from_slice(&self.free_param.to_le_bytes());
        out
    }
}

pub fn encode_items(items: &[Item]) -> Vec<u8> {
    let mut out = Vec::with_capacity(items.len() * ITEM_RECORD_SIZE);
    for item in items {
        out.extend_from_slice(&item.encode());
    }
    out
}

pub fn decode_items(bytes: &[u8]) -> Result<Vec<Item>, String> {
    if bytes.len() % ITEM_RECORD_SIZE != 0 {
        return Err(format!(
            "item buffer length {} is not a multiple of {}",
            bytes.len(),
            ITEM_RECORD_SIZE
        ));
    }
    bytes.chunks(ITEM_RECORD_SIZE).map(Item::decode).collect()
}

/// Parses an order attachment blob. Accepted by size alone: a nonzero
/// multiple of the record size, at most the carryable maximum.
pub fn parse_attachment(bytes: &[u8]) -> Result<Vec<Item>, String> {
    if bytes.is_empty() {
        return Err("attachment is empty".to_string());
    }
    if bytes.len() % ITEM_RECORD_SIZE != 0 {
        return Err(format!(
            "attachment length {} is not a multiple of {}",
            bytes.len(),
            ITEM_RECORD_SIZE
        ));
    }
    let records = bytes.len() / ITEM_RECORD_SIZE;
    if records > MAX_ORDER_ITEMS {
        return Err(format!(
            "attachment holds {} records, maximum is {}",
            records, MAX_ORDER_ITEMS
        ));
    }
    decode_items(bytes)
}

/// Pads or truncates an item list to exactly the carryable maximum.
pub fn pad_to_capacity(items: &[Item]) -> Vec<Item> {
    let mut out: Vec<Item> = items.iter().copied().take(MAX_ORDER_ITEMS).collect();
    while out.len() < MAX_ORDER_ITEMS {
        out.push(Item::NONE);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_record_roundtrip() {
        let item = Item {
            item_id: 0x09C4,
            use_count: 1,
            system_param: 0x20,
            free_param: 0x1234,
        };
        let decoded = Item::decode(&item.encode()).expect("decode");
        assert_eq!(decoded, item);
    }

    #[test]
    fn attachment_rejected_by_size_alone() {
        assert!(parse_attachment(&[]).is_err());
        assert!(parse_attachment(&[0u8; 7]).is_err());
        assert!(parse_attachment(&[0u8; ITEM_RECORD_SIZE * 41]).is_err());
        let parsed = parse_attachment(&[0u8; ITEM_RECORD_SIZE * 3]).expect("attachment");
        assert_eq!(parsed.len(), 3);
    }

    #[test]
    fn pad_to_capacity_fills_with_none() {
        let padded = pad_to_capacity(&[Item::new(0x09C4)]);
        assert_eq!(padded.len(), MAX_ORDER_ITEMS);
        assert_eq!(padded[0].item_id, 0x09C4);
        assert!(padded[1..].iter().all(Item::is_none));
    }

    #[test]
    fn pad_to_capacity_truncates_overflow() {
        let items = vec![Item::new(1); MAX_ORDER_ITEMS + 5];
        let padded = pad_to_capacity(&items);
        assert_eq!(padded.len(), MAX_ORDER_ITEMS);
    }
}
