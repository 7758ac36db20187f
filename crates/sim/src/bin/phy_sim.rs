//! OFDM PHY link simulation

use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use wran_core::Mcs;
use wran_phy::OfdmTiming;
use wran_sim::scenarios::{self, Link};
use wran_sim::{SimConfig, SimulationPresets};

fn load_configs() -> Result<Vec<SimConfig>> {
    match std::env::var("PHY_SIM_CONFIG") {
        Ok(path) => {
            let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            let config: SimConfig =
                serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?;
            config.phy.validate()?;
            Ok(vec![config])
        }
        Err(_) => Ok(SimulationPresets::all()),
    }
}

fn print_timing(config: &SimConfig) -> Result<()> {
    let timing = OfdmTiming::new(&config.phy)?;
    println!("Bandwidth: {} MHz", config.phy.bandwidth_hz as f64 / 1e6);
    println!("Symbol: {:?} ({} PS)", timing.symbol_duration(), timing.ps_per_symbol());
    println!(
        "Frame: {:?}, {} symbols",
        timing.frame_duration().as_duration(),
        timing.symbols_per_frame()
    );
    println!("Propagation delay: {:?}", config.propagation_delay);
    Ok(())
}

fn mcs_sweep(config: &SimConfig) -> Result<()> {
    let bar = ProgressBar::new(Mcs::ALL.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("  {bar:30.cyan/blue} {pos}/{len} {msg}")
            .context("progress template")?,
    );
    let mut rows = Vec::new();
    for mcs in Mcs::ALL {
        bar.set_message(mcs.to_string());
        rows.push(scenarios::mcs_point(config, mcs)?);
        bar.inc(1);
    }
    bar.finish_and_clear();

    println!("  {:<10} {:>12} {:>7} {:>8} {:>14}", "MCS", "rate (bps)", "blocks", "symbols", "burst time");
    for row in rows {
        let status = if row.delivered { "ok".green() } else { "lost".red() };
        println!(
            "  {:<10} {:>12} {:>7} {:>8} {:>14?} {}",
            row.mcs.to_string(),
            row.data_rate,
            row.blocks,
            row.symbols,
            row.burst_time,
            status
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    println!("{}", "WRAN OFDM PHY Simulation".bright_blue().bold());
    println!("{}", "========================".bright_blue());

    for config in load_configs()? {
        println!("{}", format!("\n>>> Link: {}", config.name).bright_green().bold());
        print_timing(&config)?;

        let report = scenarios::burst_exchange(&config)?;
        println!(
            "Bursts: {}/{} delivered, {} corrupted, {:?} simulated",
            report.delivered, report.sent, report.corrupted, report.elapsed
        );
        println!("Goodput: {:.0} bps", report.goodput_bps);

        println!("{}", "MCS sweep:".bright_yellow());
        mcs_sweep(&config)?;

        let own = config.phy.tx_frequency;
        let scan = scenarios::scan_for_base(&config, &[own + 6_000_000, own])?;
        match scan.locked {
            Some(freq) => println!(
                "Scan: locked on {} MHz after {} attempts ({:?})",
                freq as f64 / 1e6,
                scan.attempts,
                scan.elapsed
            ),
            None => println!("{}", "Scan: no base station found".bright_red()),
        }
        println!("{}", "-".repeat(50));
    }

    // One traced exchange, with events tallied on a separate task.
    let (sink, events) = mpsc::unbounded_channel();
    let collector = tokio::spawn(scenarios::collect_traces(events));
    let config = SimulationPresets::clear_channel();
    let mut link = Link::new(&config)?;
    link.trace_to(sink);
    let burst = std::sync::Arc::new(scenarios::make_burst(config.burst_bytes, 7)?);
    link.exchange(burst, Mcs::try_from(config.mcs)?)?;
    drop(link);

    let counts = tokio::time::timeout(Duration::from_secs(5), collector)
        .await
        .context("trace collector stalled")??;
    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by_key(|(kind, _)| format!("{kind:?}"));
    println!("{}", "Trace events:".bright_yellow());
    for (kind, n) in counts {
        println!("  {:?}: {}", kind, n);
    }

    println!("\n{}", "All simulations complete!".bright_green().bold());
    Ok(())
}
