//! Façade binary: wires the engine onto a WebSocket transport. Exists only
//! to prove the core runs end to end.

use nfc_engine::config::EngineConfig;
use nfc_engine::driver::pcsc::PcscDriver;
use nfc_engine::driver::simulated::SimulatedDriver;
use nfc_engine::driver::RadioDriver;
use nfc_engine::engine::Engine;
use nfc_engine::event_bridge::EngineBridge;
use nfc_engine::facade;

const CONFIG_PATH: &str = "nfcd.toml";
const BIND_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 3500);

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = EngineConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        log::warn!("failed to load {CONFIG_PATH}, using defaults: {e}");
        EngineConfig::default()
    });

    let driver: Box<dyn RadioDriver> = if std::env::var("NFCD_SIMULATED").is_ok() {
        Box::new(SimulatedDriver::new())
    } else {
        Box::new(PcscDriver::new(config.reader_name_filter.clone()))
    };

    let bridge = EngineBridge::new();
    let command_rx = bridge.command_rx.clone();
    let event_tx = bridge.event_tx.clone();

    std::thread::spawn(move || {
        let mut engine = Engine::new(driver, config);
        engine.run(&command_rx, &event_tx);
    });

    let [a, b, c, d] = BIND_ADDR.0;
    log::info!("nfcd façade listening on ws://{a}.{b}.{c}.{d}:{}", BIND_ADDR.1);
    facade::serve(BIND_ADDR, bridge.command_tx.clone(), bridge.subscribe()).await;
}
