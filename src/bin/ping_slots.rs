//! Class B ping slot calculator
//!
//! Prints the next ping slots of a device with their frequencies, and the
//! beacon they follow.
//!
//! Usage: cargo run --bin ping-slots <dev_addr> [periodicity] [band_id] [count]

use std::env;

use chrono::{Duration, Utc};

use lora_mac_engine::band;
use lora_mac_engine::lorawan::DevAddr;
use lora_mac_engine::timing::class_b::{
    beacon_frequency, beacon_time_before, next_ping_slot_at, ping_offset, ping_period,
    ping_slot_frequency,
};
use lora_mac_engine::timing::gps::{from_gps, to_gps};

fn main() -> anyhow::Result<()> {
    let mut args = env::args().skip(1);
    let dev_addr: DevAddr = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: ping-slots <dev_addr> [periodicity] [band_id] [count]"))?
        .parse()?;
    let periodicity: u8 = args.next().map_or(Ok(0), |s| s.parse())?;
    let band_id = args.next().unwrap_or_else(|| "EU_863_870".to_string());
    let count: usize = args.next().map_or(Ok(8), |s| s.parse())?;
    let phy = band::by_id(&band_id).ok_or_else(|| anyhow::anyhow!("Unknown band {}", band_id))?;

    let now = Utc::now();
    let beacon = beacon_time_before(now);
    let period = ping_period(periodicity);

    println!("Class B ping slots");
    println!("  DevAddr:     {}", dev_addr);
    println!("  Band:        {}", phy.id);
    println!("  Periodicity: {} (every {} slots)", periodicity, period);
    println!("  GPS time:    {} s", to_gps(now).num_seconds());
    println!(
        "  Beacon:      {} on {} Hz, ping offset {}",
        from_gps(beacon),
        beacon_frequency(phy, 0, beacon).unwrap_or(0),
        ping_offset(beacon, dev_addr, period)
    );
    println!();

    let mut earliest = now;
    for _ in 0..count {
        let slot = next_ping_slot_at(dev_addr, periodicity, earliest)?;
        let slot_beacon = beacon_time_before(slot);
        let frequency = ping_slot_frequency(phy, 0, dev_addr, slot_beacon).unwrap_or(0);
        println!(
            "  {}  {:>10} Hz  (+{:.3} s)",
            slot.format("%Y-%m-%d %H:%M:%S%.3f"),
            frequency,
            (slot - now).num_milliseconds() as f64 / 1000.0
        );
        earliest = slot + Duration::milliseconds(1);
    }
    Ok(())
}
