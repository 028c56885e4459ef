use crate::device::offsets::{
    ANCHOR_COUNT, ANCHOR_POSITION_SIZE, ANCHOR_ROTATION_SIZE, ANCHOR_SIZE,
};

/// Named teleport targets. The numeric value is the slot in the anchor file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorIndex {
    Plaza,
    AirportEntry,
    Counter,
    Departure,
    DropZone,
}

pub const ANCHOR_INDEXES: [AnchorIndex; ANCHOR_COUNT] = [
    AnchorIndex::Plaza,
    AnchorIndex::AirportEntry,
    AnchorIndex::Counter,
    AnchorIndex::Departure,
    AnchorIndex::DropZone,
];

impl AnchorIndex {
    pub fn index(self) -> usize {
        match self {
            AnchorIndex::Plaza => 0,
            AnchorIndex::AirportEntry => 1,
            AnchorIndex::Counter => 2,
            AnchorIndex::Departure => 3,
            AnchorIndex::DropZone => 4,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        ANCHOR_INDEXES.get(index).copied()
    }
}

/// A captured position block plus rotation block. Teleporting replays both
/// verbatim; an all-zero record means the slot was never captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub position: [u8; ANCHOR_POSITION_SIZE],
    pub rotation: [u8; ANCHOR_ROTATION_SIZE],
}

impl Anchor {
    pub fn is_captured(&self) -> bool {
        self.position.iter().any(|byte| *byte != 0)
            || self.rotation.iter().any(|byte| *byte != 0)
    }

    pub fn encode(&self) -> [u8; ANCHOR_SIZE] {
        let mut out = [0u8; ANCHOR_SIZE];
        out[..ANCHOR_POSITION_SIZE].copy_from_slice(&self.position);
        out[ANCHOR_POSITION_SIZE..].copy_from_slice(&self.rotation);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() != ANCHOR_SIZE {
            return Err(format!(
                "anchor record expected {} bytes, got {}",
                ANCHOR_SIZE,
                bytes.len()
            ));
        }
        let mut position = [0u8; ANCHOR_POSITION_SIZE];
        position.copy_from_slice(&bytes[..ANCHOR_POSITION_SIZE]);
        let mut rotation = [0u8; ANCHOR_ROTATION_SIZE];
        rotation.copy_from_slice(&bytes[ANCHOR_POSITION_SIZE..]);
        Ok(Self { position, rotation })
    }
}

impl Default for Anchor {
    fn default() -> Self {
        Self {
            position: [0; ANCHOR_POSITION_SIZE],
            rotation: [0; ANCHOR_ROTATION_SIZE],
        }
    }
}

/// All five anchor slots, persisted as one fixed-size file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnchorTable {
    anchors: [Anchor; ANCHOR_COUNT],
}

impl AnchorTable {
    pub fn get(&self, index: AnchorIndex) -> &Anchor {
        &self.anchors[index.index()]
    }

    pub fn set(&mut self, index: AnchorIndex, anchor: Anchor) {
        self.anchors[index.index()] = anchor;
    }

    /// Every order path assumes all five anchors are captured.
    pub fn is_complete(&self) -> bool {
        self.anchors.iter().all(Anchor::is_captured)
    }

    pub fn missing(&self) -> Vec<AnchorIndex> {
        ANCHOR_INDEXES
            .iter()
            .copied()
            .filter(|index| !self.anchors[index.index()].is_captured())
            .collect()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ANCHOR_COUNT * ANCHOR_SIZE);
        for anchor in &self.anchors {
            out.extend_from_slice(&anchor.encode());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() != ANCHOR_COUNT * ANCHOR_SIZE {
            return Err(format!(
                "anchor table expected {} bytes, got {}",
                ANCHOR_COUNT * ANCHOR_SIZE,
                bytes.len()
            ));
        }
        let mut table = Self::default();
        for (slot, chunk) in bytes.chunks(ANCHOR_SIZE).enumerate() {
            table.anchors[slot] = Anchor::decode(chunk)?;
        }
        Ok(table)
    }
}
