use sha1::{Digest, Sha1};

use crate::device::offsets::{
    ACRE_PARAMS_SIZE, FIELD_ITEMS_SIZE, LAYER_FILE_SIZE, TERRAIN_SIZE,
};
use crate::entities::item::{pad_to_capacity, Item, ITEM_RECORD_SIZE, MAX_ORDER_ITEMS};

pub const FIELD_TILES_PER_SIDE: usize = 32;
pub const SPAWN_EDGE_MARGIN: u8 = 1;

/// Tile rectangle blanked and reused for every order's items.
pub const DROP_AREA_WIDTH: usize = 8;
pub const DROP_AREA_HEIGHT: usize = 5;

/// In-memory snapshot of the visible map: item grid, terrain flags, and acre
/// parameters, plus the logical spawn tile. Buffer sizes are contractual;
/// anything else is rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapTerrainLite {
    items: Vec<u8>,
    terrain: Vec<u8>,
    acre_params: Vec<u8>,
    spawn_x: u8,
    spawn_y: u8,
}

impl MapTerrainLite {
    pub fn empty(spawn_x: u8, spawn_y: u8) -> Result<Self, String> {
        let blank_tile = Item::NONE.encode();
        let mut items = Vec::with_capacity(FIELD_ITEMS_SIZE);
        while items.len() < FIELD_ITEMS_SIZE {
            items.extend_from_slice(&blank_tile);
        }
        Self::from_parts(items, vec![0; TERRAIN_SIZE], vec![0; ACRE_PARAMS_SIZE], spawn_x, spawn_y)
    }

    /// Loads a whole layer file: item grid, terrain, then acre parameters,
    /// exactly concatenated.
    pub fn from_layer_bytes(bytes: &[u8], spawn_x: u8, spawn_y: u8) -> Result<Self, String> {
        if bytes.len() != LAYER_FILE_SIZE {
            return Err(format!(
                "layer file expected {} bytes, got {}",
                LAYER_FILE_SIZE,
                bytes.len()
            ));
        }
        let items = bytes[..FIELD_ITEMS_SIZE].to_vec();
        let terrain = bytes[FIELD_ITEMS_SIZE..FIELD_ITEMS_SIZE + TERRAIN_SIZE].to_vec();
        let acre_params = bytes[FIELD_ITEMS_SIZE + TERRAIN_SIZE..].to_vec();
        Self::from_parts(items, terrain, acre_params, spawn_x, spawn_y)
    }

    fn from_parts(
        items: Vec<u8>,
        terrain: Vec<u8>,
        acre_params: Vec<u8>,
        spawn_x: u8,
        spawn_y: u8,
    ) -> Result<Self, String> {
        if items.len() != FIELD_ITEMS_SIZE {
            return Err(format!(
                "item grid expected {} bytes, got {}",
                FIELD_ITEMS_SIZE,
                items.len()
            ));
        }
        if terrain.len() != TERRAIN_SIZE {
            return Err(format!(
                "terrain expected {} bytes, got {}",
                TERRAIN_SIZE,
                terrain.len()
            ));
        }
        if acre_params.len() != ACRE_PARAMS_SIZE {
            return Err(format!(
                "acre parameters expected {} bytes, got {}",
                ACRE_PARAMS_SIZE,
                acre_params.len()
            ));
        }
        if spawn_x < SPAWN_EDGE_MARGIN
            || spawn_y < SPAWN_EDGE_MARGIN
            || spawn_x as usize + DROP_AREA_WIDTH > FIELD_TILES_PER_SIDE
            || spawn_y as usize + DROP_AREA_HEIGHT > FIELD_TILES_PER_SIDE
        {
            return Err(format!("spawn tile ({spawn_x}, {spawn_y}) outside usable grid"));
        }
        Ok(Self {
            items,
            terrain,
            acre_params,
            spawn_x,
            spawn_y,
        })
    }

    pub fn items(&self) -> &[u8] {
        &self.items
    }

    pub fn terrain(&self) -> &[u8] {
        &self.terrain
    }

    pub fn acre_params(&self) -> &[u8] {
        &self.acre_params
    }

    pub fn spawn(&self) -> (u8, u8) {
        (self.spawn_x, self.spawn_y)
    }

    /// Byte offset of the spawn tile within the item grid.
    pub fn drop_zone_offset(&self) -> usize {
        self.tile_offset(self.spawn_x as usize, self.spawn_y as usize)
    }

    fn tile_offset(&self, x: usize, y: usize) -> usize {
        (y * FIELD_TILES_PER_SIDE + x) * ITEM_RECORD_SIZE
    }

    /// Blanks the drop area, then overlays the order's items at its start.
    /// In-memory only; nothing is transmitted here.
    pub fn apply_order(&mut self, order_items: &[Item]) {
        let padded = pad_to_capacity(order_items);
        let blank = Item::NONE.encode();
        let mut placed = 0usize;
        for row in 0..DROP_AREA_HEIGHT {
            for col in 0..DROP_AREA_WIDTH {
                let x = self.spawn_x as usize + col;
                let y = self.spawn_y as usize + row;
                let offset = self.tile_offset(x, y);
                let record = if placed < MAX_ORDER_ITEMS {
                    padded[placed].encode()
                } else {
                    blank
                };
                self.items[offset..offset + ITEM_RECORD_SIZE].copy_from_slice(&record);
                placed += 1;
            }
        }
    }

    /// Stable fingerprint of the whole layer, used to detect layer changes
    /// and identify the loaded layer in logs.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha1::new();
        hasher.update(&self.items);
        hasher.update(&self.terrain);
        hasher.update(&self.acre_params);
        let digest = hasher.finalize();
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}
