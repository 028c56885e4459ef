//! Every memory offset, record size, and status signature used against the
//! device lives here. These values describe a fixed, empirically verified
//! layout; do not change them without re-verifying on hardware.

use crate::entities::item::ITEM_RECORD_SIZE;

// Coordinate/status pointer chain: resolved at runtime, final element is an
// arithmetic offset applied to the returned base.
pub const COORDINATE_JUMPS: [u64; 5] = [0x3A2B3C8, 0x18, 0x178, 0xD0, 0xD8];

/// Status word offset relative to the resolved coordinate base.
pub const STATUS_OFFSET: u64 = 0x20;

// Status word signatures. Two exact sentinels, three masked low-16 loading
// signatures, exact zero for a dead session.
pub const STATUS_OVERWORLD: u32 = 0xC006_6666;
pub const STATUS_ARRIVE_LEAVING: u32 = 0xBE20_0000;
pub const STATUS_LOADING_MASK: u32 = 0xFFFF;
pub const STATUS_LOADING_SIGNATURES: [u32; 3] = [0x6606, 0x1402, 0x1802];

// Anchor records: a position block followed by a rotation block.
pub const ANCHOR_POSITION_SIZE: usize = 0x3C;
pub const ANCHOR_ROTATION_OFFSET: u64 = 0x3C;
pub const ANCHOR_ROTATION_SIZE: usize = 0x4;
pub const ANCHOR_SIZE: usize = ANCHOR_POSITION_SIZE + ANCHOR_ROTATION_SIZE;
pub const ANCHOR_COUNT: usize = 5;

// Visible map buffers.
pub const FIELD_ITEMS_ADDRESS: u64 = 0xABA4_9400;
pub const FIELD_ITEMS_WIDTH: usize = 32;
pub const FIELD_ITEMS_HEIGHT: usize = 32;
pub const FIELD_ITEMS_SIZE: usize = FIELD_ITEMS_WIDTH * FIELD_ITEMS_HEIGHT * ITEM_RECORD_SIZE;
pub const TERRAIN_ADDRESS: u64 = 0xABA5_3400;
pub const TERRAIN_SIZE: usize = 0xE00;
pub const ACRE_PARAMS_ADDRESS: u64 = 0xABA5_4200;
pub const ACRE_PARAMS_SIZE: usize = 0x8C;
pub const LAYER_FILE_SIZE: usize = FIELD_ITEMS_SIZE + TERRAIN_SIZE + ACRE_PARAMS_SIZE;

/// Number of equal chunks the item grid is partitioned into for diff writes.
/// Must divide the grid size evenly.
pub const FIELD_ITEM_CHUNKS: usize = 16;

// Pocket layout: per pocket, 20 item records, a u32 bag count, then a
// 20-entry bind list. The two pocket blocks are contiguous.
pub const POCKET_SLOTS: usize = 20;
pub const POCKET_ITEMS_SIZE: usize = POCKET_SLOTS * ITEM_RECORD_SIZE;
pub const POCKET_BAG_COUNT_SIZE: usize = 4;
pub const POCKET_BIND_SIZE: usize = POCKET_SLOTS;
pub const POCKET_BLOCK_SIZE: usize = POCKET_ITEMS_SIZE + POCKET_BAG_COUNT_SIZE + POCKET_BIND_SIZE;
pub const POCKET_BLOB_SIZE: usize = POCKET_BLOCK_SIZE * 2;
pub const POCKET_ADDRESS: u64 = 0xAEEB_79D0;
pub const BIND_UNBOUND: u8 = 0xFF;
pub const BIND_MAX: u8 = 7;

// Airport / visitor bookkeeping.
pub const DODO_ADDRESS: u64 = 0xA97F_E43A;
pub const DODO_CODE_LENGTH: usize = 5;
pub const ARRIVER_NAME_ADDRESS: u64 = 0xAEE3_5CB8;
pub const ARRIVER_NAME_SIZE: usize = 0x14;
pub const SESSION_ACTIVE_ADDRESS: u64 = 0x91FB_3740;
pub const TURNIP_PRICE_ADDRESS: u64 = 0xABCE_2BD0;
pub const VILLAGER_RECORD_ADDRESS: u64 = 0xAB97_4290;
pub const VILLAGER_RECORD_SIZE: usize = 0x40;
pub const VILLAGER_HOUSE_STRIDE: u64 = 0x120;
pub const VILLAGER_HOUSES: u8 = 10;

/// Staging buffer for scripted chat messages, UTF-16LE, NUL padded.
pub const CHAT_BUFFER_ADDRESS: u64 = 0xAA2F_8D10;
pub const CHAT_BUFFER_SIZE: usize = 0x3C;

/// Address frozen during dialogue to pin the text box open for the scripted
/// dodo fast path.
pub const TEXT_SPEED_ADDRESS: u64 = 0x91D4_C1A4;
pub const TEXT_SPEED_FROZEN: u8 = 0x3;
