pub mod anchors;
pub mod offsets;
pub mod scripts;
pub mod state;
pub mod tracker;
