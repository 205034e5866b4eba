//! Lookup tables for the sound chip engine.
//!
//! The envelope tables depend on the clock ratio and live in each engine;
//! the combined-waveform tables do not and are built once per process.

use std::sync::OnceLock;

// ── Envelope ──────────────────────────────────────────────────

/// Rate-counter periods per attack/decay/release nibble, in CPU cycles.
/// Slot 0 is replaced by `max(clock ratio, 9)` in [`RateTable::new`].
const ADSR_PERIODS: [f64; 16] = [
    0.0, 32.0, 63.0, 95.0, 149.0, 220.0, 267.0, 313.0, 392.0, 977.0, 1954.0, 3126.0, 3907.0,
    11720.0, 19532.0, 31251.0,
];

/// Exponential prescaler: decay/release steps are taken only every
/// `EXP_TABLE[level]` rate-counter hits, which bends the linear counter
/// into an approximately exponential curve near zero.
pub const EXP_TABLE: [u8; 256] = build_exp_table();

const fn build_exp_table() -> [u8; 256] {
    let mut t = [1u8; 256];
    let mut i = 1;
    while i <= 93 {
        t[i] = if i <= 6 {
            30
        } else if i <= 14 {
            16
        } else if i <= 26 {
            8
        } else if i <= 54 {
            4
        } else {
            2
        };
        i += 1;
    }
    t
}

/// Rate periods and per-hit step sizes for one clock ratio.
///
/// At low sample rates one output sample spans more CPU cycles than the
/// fastest rate period, so rate 0 takes several counter steps at once.
#[derive(Debug, Clone, Copy)]
pub struct RateTable {
    pub periods: [f64; 16],
    pub steps: [i32; 16],
}

impl RateTable {
    pub fn new(clk_ratio: f64) -> Self {
        let mut periods = ADSR_PERIODS;
        periods[0] = clk_ratio.max(9.0);
        let mut steps = [1; 16];
        steps[0] = (periods[0] / 9.0).ceil() as i32;
        Self { periods, steps }
    }
}

// ── Combined waveforms ────────────────────────────────────────

pub const WAVE_TABLE_LEN: usize = 4096;

/// Output of two or three waveforms selected at once.
///
/// Each of the 12 DAC bits is driven by a weighted sum over all input
/// bits, the weight falling off geometrically with bit distance; the bit
/// is set when that level reaches the threshold.
pub struct CombinedWaveforms {
    pub tri_saw: Box<[u16]>,
    pub pulse_saw: Box<[u16]>,
    pub pulse_tri_saw: Box<[u16]>,
}

static COMBINED: OnceLock<CombinedWaveforms> = OnceLock::new();

impl CombinedWaveforms {
    /// Shared tables, built on first use.
    pub fn get() -> &'static CombinedWaveforms {
        COMBINED.get_or_init(|| CombinedWaveforms {
            tri_saw: build_combined(0.8, 2.4, 0.64),
            pulse_saw: build_combined(1.4, 1.9, 0.68),
            pulse_tri_saw: build_combined(0.8, 2.5, 0.64),
        })
    }
}

fn build_combined(bitmul: f64, bitstrength: f64, threshold: f64) -> Box<[u16]> {
    let mut weights = [0.0f64; 12];
    for (d, w) in weights.iter_mut().enumerate() {
        *w = bitmul / bitstrength.powf(d as f64);
    }

    (0..WAVE_TABLE_LEN)
        .map(|i| {
            let mut value = 0u32;
            for j in 0..12usize {
                let mut level = 0.0f64;
                for k in 0..12usize {
                    let bit = ((i >> k) & 1) as f64;
                    level += weights[k.abs_diff(j)] * (bit - 0.5);
                }
                if level >= threshold {
                    value |= 1 << j;
                }
            }
            (value * 12) as u16
        })
        .collect()
}
