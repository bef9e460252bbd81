//! NIC throughput sampling: reads cumulative RX/TX byte counters from
//! `/proc/net/dev` across all non-loopback interfaces and derives a windowed
//! bits-per-second rate between successive samples.

use std::time::Duration;

use varys_core::{Result, VarysError};

/// Cumulative RX/TX byte counters summed across every non-loopback interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counters {
    rx_bytes: u64,
    tx_bytes: u64,
}

fn read_counters(path: &str) -> Result<Counters> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| VarysError::Connectivity(format!("reading {path}: {e}")))?;
    let mut totals = Counters::default();
    // The first two lines are headers; each interface line reads "iface: rx... tx...".
    for line in contents.lines().skip(2) {
        let Some((iface, rest)) = line.split_once(':') else { continue };
        if iface.trim() == "lo" {
            continue;
        }
        let fields: Vec<&str> = rest.split_whitespace().collect();
        if fields.len() < 9 {
            continue;
        }
        totals.rx_bytes += fields[0].parse::<u64>().unwrap_or(0);
        totals.tx_bytes += fields[8].parse::<u64>().unwrap_or(0);
    }
    Ok(totals)
}

/// Windowed RX/TX rate in bits-per-second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bandwidth {
    /// Ingress bits-per-second over the last sampling window.
    pub rx_bps: f64,
    /// Egress bits-per-second over the last sampling window.
    pub tx_bps: f64,
}

/// Tracks one sampling window's worth of NIC counters and converts the delta
/// between ticks into bits-per-second. The first sample after construction
/// always yields `0.0`/`0.0`, since there is no prior window to diff against.
/// Counter wraparound or a monitoring-interface removal can make a delta look
/// negative; such deltas are clamped to zero rather than reported.
pub struct NicSampler {
    proc_net_dev: String,
    last: Option<Counters>,
}

impl NicSampler {
    /// Creates a sampler reading the standard `/proc/net/dev` path.
    pub fn new() -> Self {
        Self::with_path("/proc/net/dev")
    }

    /// Creates a sampler reading an arbitrary path, for tests.
    pub fn with_path(proc_net_dev: impl Into<String>) -> Self {
        Self { proc_net_dev: proc_net_dev.into(), last: None }
    }

    /// Reads the current counters and returns the windowed rate since the
    /// previous call, given the elapsed wall-clock time between samples.
    pub fn sample(&mut self, elapsed: Duration) -> Result<Bandwidth> {
        let now = read_counters(&self.proc_net_dev)?;
        let bandwidth = match self.last {
            None => Bandwidth { rx_bps: 0.0, tx_bps: 0.0 },
            Some(prev) => {
                let secs = elapsed.as_secs_f64();
                let rx_delta = now.rx_bytes.saturating_sub(prev.rx_bytes);
                let tx_delta = now.tx_bytes.saturating_sub(prev.tx_bytes);
                if secs <= 0.0 {
                    Bandwidth { rx_bps: 0.0, tx_bps: 0.0 }
                } else {
                    Bandwidth {
                        rx_bps: (rx_delta as f64 * 8.0) / secs,
                        tx_bps: (tx_delta as f64 * 8.0) / secs,
                    }
                }
            }
        };
        self.last = Some(now);
        Ok(bandwidth)
    }
}

impl Default for NicSampler {
    fn default() -> Self {
        Self::new()
    }
}
