use serde::{Deserialize, Serialize};

/// When the chunk holding the drop zone is forced into a diff even if its
/// bytes match, so concurrently dropped items get reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DropZonePolicy {
    Always,
    #[default]
    WhenIdle,
    Never,
}

impl DropZonePolicy {
    pub fn forces_chunk(self, order_pending: bool) -> bool {
        match self {
            DropZonePolicy::Always => true,
            DropZonePolicy::WhenIdle => !order_pending,
            DropZonePolicy::Never => false,
        }
    }
}

/// One byte range to transmit: offset into the buffer plus the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffChunk {
    pub offset: usize,
    pub bytes: Vec<u8>,
}

/// Partitions both buffers into `chunk_count` equal chunks and returns the
/// chunks whose bytes differ. Offsets are always chunk-aligned and inside
/// the snapshot's range. The drop-zone chunk may be forced by policy.
pub fn diff_chunks(
    snapshot: &[u8],
    device: &[u8],
    chunk_count: usize,
    drop_zone_offset: Option<usize>,
) -> Result<Vec<DiffChunk>, String> {
    if chunk_count == 0 {
        return Err("chunk count must be nonzero".to_string());
    }
    if snapshot.len() != device.len() {
        return Err(format!(
            "diff buffers differ in length: {} vs {}",
            snapshot.len(),
            device.len()
        ));
    }
    if snapshot.len() % chunk_count != 0 {
        return Err(format!(
            "buffer length {} not divisible into {} chunks",
            snapshot.len(),
            chunk_count
        ));
    }
    let chunk_size = snapshot.len() / chunk_count;
    let forced_chunk = drop_zone_offset.map(|offset| offset / chunk_size);
    let mut out = Vec::new();
    for index in 0..chunk_count {
        let offset = index * chunk_size;
        let ours = &snapshot[offset..offset + chunk_size];
        let theirs = &device[offset..offset + chunk_size];
        if ours != theirs || forced_chunk == Some(index) {
            out.push(DiffChunk {
                offset,
                bytes: ours.to_vec(),
            });
        }
    }
    Ok(out)
}
