use minnow::magics::warmup_slider_tables;
use minnow::uci::UciEngine;

fn main() {
    // Precomputed table inits
    warmup_slider_tables();
    let mut engine = UciEngine::new();
    engine.run();
}
