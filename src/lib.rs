pub mod admin;
mod config;
pub mod device;
pub mod entities;
pub mod map;
mod net;
pub mod orders;
pub mod persistence;
pub mod pocket;
pub mod telemetry;

pub use config::BotConfig;
pub use net::commands::{Button, Stick};
pub use net::transport::{DeviceLink, TcpTransport, Transport};
pub use orders::orchestrator::Orchestrator;
pub use orders::queue::{EnqueueOutcome, OrderQueue, OrderResult};
pub use orders::request::{RequestQueues, SideRequest};

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use device::tracker::WaypointTracker;
use map::terrain::MapTerrainLite;
use persistence::files::StateFiles;

pub fn run(args: &[String]) -> Result<(), String> {
    let config = BotConfig::from_args(args)?;
    telemetry::logging::init(&config.data_dir)?;
    let files = StateFiles::new(&config.data_dir)?;
    let anchors = files.load_anchors()?;
    if !anchors.is_complete() {
        eprintln!(
            "airlift: anchors missing {:?}, orders will fault until they are captured",
            anchors.missing()
        );
    }

    if let Some(name) = files.load_layer_name() {
        telemetry::logging::log_order(&format!("last loaded layer was '{name}'"));
    }

    let map = match &config.layer_path {
        Some(path) => {
            let bytes = std::fs::read(path)
                .map_err(|err| format!("layer read {} failed: {err}", path.display()))?;
            MapTerrainLite::from_layer_bytes(&bytes, config.spawn_x, config.spawn_y)?
        }
        None => MapTerrainLite::empty(config.spawn_x, config.spawn_y)?,
    };
    telemetry::logging::log_order(&format!("layer fingerprint {}", map.fingerprint()));

    let mut link = DeviceLink::new(Box::new(TcpTransport::connect(&config.device_addr)?));
    let version = link.version()?;
    telemetry::logging::log_net(&format!(
        "connected to {} (sys-botbase {version})",
        config.device_addr
    ));
    println!("airlift: connected to {} (sys-botbase {version})", config.device_addr);
    println!("airlift: layer fingerprint {}", map.fingerprint());
    println!(
        "airlift: queue capacity {}, order budget {}s",
        config.max_queue,
        config.order_budget_secs()
    );

    let orders = Arc::new(OrderQueue::new(config.max_queue, config.order_budget_secs()));
    let requests = Arc::new(RequestQueues::new());
    let stop = Arc::new(AtomicBool::new(false));

    if let Some(bind_addr) = config.admin_bind_addr.clone() {
        println!("airlift: admin socket on {bind_addr}");
        let orders = Arc::clone(&orders);
        let requests = Arc::clone(&requests);
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            if let Err(err) = admin::socket::serve(&bind_addr, orders, requests, stop) {
                telemetry::logging::log_error(&format!("admin socket: {err}"));
                eprintln!("airlift: admin socket: {err}");
            }
        });
    }

    let tracker = WaypointTracker::new(anchors, Duration::from_millis(config.poll_interval_ms));
    let mut orchestrator = Orchestrator::new(config, tracker, map, files);
    orchestrator.run_loop(&mut link, &orders, &requests, &stop);
    Ok(())
}
