//! MOS 6581 / 8580 sound chip engine.
//!
//! Register-level emulation of up to three chips reading their registers
//! straight out of the shared [`Memory`]. Each call to
//! [`SidEngine::emulate`] produces one output sample for one chip: three
//! voices (envelope + oscillator), routed either to the filter or to the
//! direct output, then the chip's volume register.
//!
//! Register layout per voice (7 bytes): freq lo, freq hi, pw lo, pw hi,
//! control, attack/decay, sustain/release. Then $15/$16 cutoff,
//! $17 resonance/filter routing, $18 mode/volume, $1B OSC3, $1C ENV3.

pub mod envelope;
pub mod filter;
pub mod tables;
pub mod waveform;

use std::fmt;

use super::memory::Memory;
use envelope::Envelope;
use filter::{Filter, FilterCoefficients};
use tables::{CombinedWaveforms, RateTable};
use waveform::{Oscillator, SyncSource, VoiceRegs};

// ── Control register bits ─────────────────────────────────────

pub const GATE: u8 = 0x01;
pub const SYNC: u8 = 0x02;
pub const RING: u8 = 0x04;
pub const TEST: u8 = 0x08;
pub const TRI: u8 = 0x10;
pub const SAW: u8 = 0x20;
pub const PULSE: u8 = 0x40;
pub const NOISE: u8 = 0x80;

/// Voice 3 disconnect bit in $18.
const OFF3: u8 = 0x80;

// ── Register offsets ──────────────────────────────────────────

pub const REG_FC_LO: u16 = 0x15;
pub const REG_FC_HI: u16 = 0x16;
pub const REG_RES_FILT: u16 = 0x17;
pub const REG_MODE_VOL: u16 = 0x18;
pub const REG_OSC3: u16 = 0x1B;
pub const REG_ENV3: u16 = 0x1C;

const VOICE_STRIDE: u16 = 7;
const VOICES_PER_CHIP: usize = 3;
pub const MAX_CHIPS: usize = 3;
const MAX_VOICES: usize = VOICES_PER_CHIP * MAX_CHIPS;

/// Filter routing bit in $17 for voices 1-3.
const FILTER_SWITCH: [u8; VOICES_PER_CHIP] = [0x01, 0x02, 0x04];

/// Divides the summed voices so a full-scale mix at volume 15 stays
/// within about +-1.0.
const OUTPUT_SCALEDOWN: f64 = (0x10000 * VOICES_PER_CHIP * 16) as f64;

/// Control registers of the primary chip's voices, checked by
/// [`SidEngine::whittaker_workaround`].
const PRIMARY_CTRL: [u16; VOICES_PER_CHIP] = [0xD404, 0xD40B, 0xD412];

// ── Chip model ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChipModel {
    Mos6581,
    #[default]
    Mos8580,
}

impl ChipModel {
    pub fn part_number(self) -> u16 {
        match self {
            ChipModel::Mos6581 => 6581,
            ChipModel::Mos8580 => 8580,
        }
    }
}

impl fmt::Display for ChipModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MOS{}", self.part_number())
    }
}

// ── Engine ────────────────────────────────────────────────────

pub struct SidEngine {
    clk_ratio: f64,
    rates: RateTable,
    coeffs: FilterCoefficients,
    waves: &'static CombinedWaveforms,
    envelopes: [Envelope; MAX_VOICES],
    oscillators: [Oscillator; MAX_VOICES],
    sync: [SyncSource; MAX_CHIPS],
    filters: [Filter; MAX_CHIPS],
}

impl SidEngine {
    pub fn new(sample_rate: f64, clk_ratio: f64) -> Self {
        Self {
            clk_ratio,
            rates: RateTable::new(clk_ratio),
            coeffs: FilterCoefficients::new(sample_rate),
            waves: CombinedWaveforms::get(),
            envelopes: [Envelope::new(); MAX_VOICES],
            oscillators: [Oscillator::new(); MAX_VOICES],
            sync: [SyncSource::default(); MAX_CHIPS],
            filters: [Filter::default(); MAX_CHIPS],
        }
    }

    /// Clear every chip's register area and idle all envelopes.
    ///
    /// Oscillator phases, noise registers, the floating DAC level and the
    /// filter integrators carry over.
    pub fn init(&mut self, mem: &mut Memory) {
        mem.zero_range(0xD400, 0xD7FF);
        mem.zero_range(0xDE00, 0xDFFF);
        for env in &mut self.envelopes {
            env.reset();
        }
    }

    /// Produce one output sample for chip `num` whose registers start at
    /// `base`. Also refreshes the OSC3/ENV3 readback registers.
    pub fn emulate(&mut self, num: usize, base: u16, model: ChipModel, mem: &mut Memory) -> f64 {
        let filt_sw = mem.read(base.wrapping_add(REG_RES_FILT));
        let mode_vol = mem.read(base.wrapping_add(REG_MODE_VOL));

        let mut filter_in = 0.0;
        let mut output = 0.0;
        let mut last_out = 0.0;

        for voice in 0..VOICES_PER_CHIP {
            let channel = num * VOICES_PER_CHIP + voice;
            let at = base.wrapping_add(voice as u16 * VOICE_STRIDE);
            let reg = |off: u16| mem.read(at.wrapping_add(off));

            let regs = VoiceRegs {
                freq: reg(0) as u16 | ((reg(1) as u16) << 8),
                pw_lo: reg(2),
                pw_hi: reg(3),
                ctrl: reg(4),
            };
            let (ad, sr) = (reg(5), reg(6));

            let env = &mut self.envelopes[channel];
            env.clock(regs.ctrl, ad, sr, self.clk_ratio, &self.rates);

            let out = self.oscillators[channel].clock(
                &regs,
                self.clk_ratio,
                model,
                &mut self.sync[num],
                self.waves,
            );
            last_out = out;

            let signal = (out - 32768.0) * self.envelopes[channel].level();
            if filt_sw & FILTER_SWITCH[voice] != 0 {
                filter_in += signal;
            } else if voice != 2 || mode_vol & OFF3 == 0 {
                output += signal;
            }
        }

        if mem.processor_port() & 3 != 0 {
            mem.write(
                base.wrapping_add(REG_OSC3),
                (super::wrap_i32(last_out) >> 8) as u8,
            );
        }
        // Reads channel index 3 whatever the chip; tunes were tuned
        // against this.
        mem.write(base.wrapping_add(REG_ENV3), self.envelopes[3].counter as u8);

        let (cutoff, resonance) = self.coeffs.tune(
            model,
            mem.read(base.wrapping_add(REG_FC_LO)),
            mem.read(base.wrapping_add(REG_FC_HI)),
            mem.read(base.wrapping_add(REG_RES_FILT)),
        );
        let mode_vol = mem.read(base.wrapping_add(REG_MODE_VOL));
        let output = self.filters[num].clock(filter_in, output, cutoff, resonance, mode_vol);

        output / OUTPUT_SCALEDOWN * (mode_vol & 0x0F) as f64
    }

    /// Some players write control (gate off) before the envelope
    /// registers. When `addr` is a primary-chip control register holding
    /// gate off, drop that voice's gate and phase latches right away.
    pub fn whittaker_workaround(&mut self, addr: u16, mem: &Memory) {
        for (voice, &ctrl) in PRIMARY_CTRL.iter().enumerate() {
            if addr == ctrl && mem.read(ctrl) & GATE == 0 {
                self.envelopes[voice].state &= 0x3E;
            }
        }
    }

    /// Current envelope counter of channel `channel` (0-8).
    pub fn envelope_level(&self, channel: usize) -> u8 {
        self.envelopes[channel].counter as u8
    }

    pub fn envelope(&self, channel: usize) -> &Envelope {
        &self.envelopes[channel]
    }

    pub fn oscillator(&self, channel: usize) -> &Oscillator {
        &self.oscillators[channel]
    }
}

impl fmt::Debug for SidEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SidEngine")
            .field("clk_ratio", &self.clk_ratio)
            .field("envelopes", &self.envelopes)
            .finish_non_exhaustive()
    }
}
