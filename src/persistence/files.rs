use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::device::anchors::AnchorTable;
use crate::telemetry::logging;

const WRITE_ATTEMPTS: u32 = 3;
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Rewrites a small state file wholesale, retrying transient failures with a
/// short delay before giving up.
pub fn write_retry(path: &Path, bytes: &[u8]) -> Result<(), String> {
    let mut last_error = String::new();
    for attempt in 1..=WRITE_ATTEMPTS {
        match std::fs::write(path, bytes) {
            Ok(()) => return Ok(()),
            Err(err) => {
                last_error = format!(
                    "write {} attempt {}/{} failed: {}",
                    path.display(),
                    attempt,
                    WRITE_ATTEMPTS,
                    err
                );
                logging::log_error(&last_error);
                if attempt < WRITE_ATTEMPTS {
                    std::thread::sleep(WRITE_RETRY_DELAY);
                }
            }
        }
    }
    Err(last_error)
}

/// Small state files owned by the bot, each rewritten wholesale on change.
#[derive(Debug, Clone)]
pub struct StateFiles {
    dir: PathBuf,
}

impl StateFiles {
    pub fn new(data_dir: &Path) -> Result<Self, String> {
        std::fs::create_dir_all(data_dir)
            .map_err(|err| format!("data directory create failed: {}", err))?;
        Ok(Self {
            dir: data_dir.to_path_buf(),
        })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn load_anchors(&self) -> Result<AnchorTable, String> {
        let path = self.path("anchors.bin");
        if !path.exists() {
            return Ok(AnchorTable::default());
        }
        let bytes = std::fs::read(&path)
            .map_err(|err| format!("read {} failed: {}", path.display(), err))?;
        AnchorTable::from_bytes(&bytes)
    }

    pub fn save_anchors(&self, table: &AnchorTable) -> Result<(), String> {
        write_retry(&self.path("anchors.bin"), &table.to_bytes())
    }

    pub fn save_dodo_code(&self, code: &str) -> Result<(), String> {
        write_retry(&self.path("dodo.txt"), code.as_bytes())
    }

    pub fn load_dodo_code(&self) -> Option<String> {
        std::fs::read_to_string(self.path("dodo.txt"))
            .ok()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    }

    pub fn save_visitor_count(&self, count: u64) -> Result<(), String> {
        write_retry(&self.path("visitor_count.txt"), count.to_string().as_bytes())
    }

    pub fn load_visitor_count(&self) -> u64 {
        std::fs::read_to_string(self.path("visitor_count.txt"))
            .ok()
            .and_then(|text| text.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn save_visitor_list(&self, names: &[String]) -> Result<(), String> {
        let mut text = String::new();
        for name in names {
            text.push_str(name);
            text.push('\n');
        }
        write_retry(&self.path("visitors.txt"), text.as_bytes())
    }

    pub fn save_turnip_price(&self, price: u32) -> Result<(), String> {
        write_retry(&self.path("price.txt"), price.to_string().as_bytes())
    }

    pub fn load_turnip_price(&self) -> Option<u32> {
        std::fs::read_to_string(self.path("price.txt"))
            .ok()
            .and_then(|text| text.trim().parse().ok())
    }

    pub fn save_layer_name(&self, name: &str) -> Result<(), String> {
        write_retry(&self.path("layer_name.txt"), name.as_bytes())
    }

    pub fn load_layer_name(&self) -> Option<String> {
        std::fs::read_to_string(self.path("layer_name.txt"))
            .ok()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::anchors::{Anchor, AnchorIndex};

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "airlift-test-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0)
        ));
        std::fs::create_dir_all(&dir).expect("scratch dir");
        dir
    }

    #[test]
    fn anchors_persist_and_reload() {
        let dir = scratch_dir("anchors");
        let files = StateFiles::new(&dir).expect("state files");
        let mut table = AnchorTable::default();
        let mut anchor = Anchor::default();
        anchor.position[0] = 0x42;
        table.set(AnchorIndex::DropZone, anchor);
        files.save_anchors(&table).expect("save");
        let loaded = files.load_anchors().expect("load");
        assert_eq!(loaded, table);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_anchor_file_yields_empty_table() {
        let dir = scratch_dir("no-anchors");
        let files = StateFiles::new(&dir).expect("state files");
        let loaded = files.load_anchors().expect("load");
        assert!(!loaded.is_complete());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn dodo_code_rewritten_wholesale() {
        let dir = scratch_dir("dodo");
        let files = StateFiles::new(&dir).expect("state files");
        files.save_dodo_code("AB1CD").expect("save");
        files.save_dodo_code("ZZ9ZZ").expect("save");
        assert_eq!(files.load_dodo_code().as_deref(), Some("ZZ9ZZ"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn turnip_price_roundtrip() {
        let dir = scratch_dir("price");
        let files = StateFiles::new(&dir).expect("state files");
        assert_eq!(files.load_turnip_price(), None);
        files.save_turnip_price(620).expect("save");
        assert_eq!(files.load_turnip_price(), Some(620));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn layer_name_rewritten_wholesale() {
        let dir = scratch_dir("layer");
        let files = StateFiles::new(&dir).expect("state files");
        assert_eq!(files.load_layer_name(), None);
        files.save_layer_name("town").expect("save");
        files.save_layer_name("museum").expect("save");
        assert_eq!(files.load_layer_name().as_deref(), Some("museum"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn visitor_count_roundtrip() {
        let dir = scratch_dir("count");
        let files = StateFiles::new(&dir).expect("state files");
        assert_eq!(files.load_visitor_count(), 0);
        files.save_visitor_count(17).expect("save");
        assert_eq!(files.load_visitor_count(), 17);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
