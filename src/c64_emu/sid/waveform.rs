//! Oscillator: 24-bit phase accumulator, waveform selector and noise LFSR.
//!
//! Pulse and sawtooth are band-limited by bending their edges in
//! proportion to pitch instead of oversampling; combined waveforms come
//! from the precomputed tables.

use super::tables::{CombinedWaveforms, WAVE_TABLE_LEN};
use super::{ChipModel, NOISE, PULSE, RING, SAW, SYNC, TEST, TRI};
use crate::c64_emu::wrap_i32;

const PHASE_MASK: f64 = 16_777_215.0;
const PHASE_WRAP: f64 = 16_777_216.0;
const PHASE_MSB: i32 = 0x80_0000;
const NOISE_CLOCK_BIT: i32 = 0x10_0000;
const LFSR_SEED: i32 = 0x7F_FFF8;
const FULL: f64 = 65535.0;

/// Per-chip state passed from voice to voice within one sample:
/// voice n syncs and ring-modulates against voice n-1 (voice 0 against
/// voice 2 of the previous sample).
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncSource {
    pub msb_rise: bool,
    pub msb: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct Oscillator {
    pub phase: f64,
    pub prev_phase: f64,
    pub lfsr: i32,
    /// Last output while a waveform was selected; held by the floating DAC.
    pub prev_out: f64,
    /// Last raw combined-table sample, averaged with the next one.
    pub prev_combined: f64,
}

/// Voice register snapshot.
#[derive(Debug, Clone, Copy)]
pub struct VoiceRegs {
    pub freq: u16,
    pub pw_lo: u8,
    pub pw_hi: u8,
    pub ctrl: u8,
}

impl Oscillator {
    pub fn new() -> Self {
        Self {
            phase: 0.0,
            prev_phase: 0.0,
            lfsr: LFSR_SEED,
            prev_out: 0.0,
            prev_combined: 0.0,
        }
    }

    /// Advance the phase by one sample and return the waveform output
    /// (nominally 0..=$FFFF).
    pub fn clock(
        &mut self,
        regs: &VoiceRegs,
        clk_ratio: f64,
        model: ChipModel,
        sync: &mut SyncSource,
        waves: &CombinedWaveforms,
    ) -> f64 {
        let ctrl = regs.ctrl;
        let wf = ctrl & 0xF0;
        let test = ctrl & TEST;

        let accuadd = regs.freq as f64 * clk_ratio;
        if test != 0 || (ctrl & SYNC != 0 && sync.msb_rise) {
            self.phase = 0.0;
        } else {
            self.phase += accuadd;
            if self.phase > PHASE_MASK {
                self.phase -= PHASE_WRAP;
            }
        }
        let phase = wrap_i32(self.phase);
        let msb = phase & PHASE_MSB;
        sync.msb_rise = msb > (wrap_i32(self.prev_phase) & PHASE_MSB);

        let ring_msb = if ctrl & RING != 0 { sync.msb } else { 0 };

        let mut out = if wf & NOISE != 0 {
            self.noise(wf, test, phase, accuadd)
        } else if wf & PULSE != 0 {
            self.pulse(regs, wf, test, phase, ring_msb, accuadd, model, waves)
        } else if wf & SAW != 0 {
            let saw = phase >> 8;
            if wf & TRI != 0 {
                self.combined(&waves.tri_saw, saw >> 4, true, model)
            } else {
                bandlimited_saw(saw as f64, accuadd)
            }
        } else if wf & TRI != 0 {
            triangle(phase ^ ring_msb) as f64
        } else {
            0.0
        };

        if wf != 0 {
            self.prev_out = out;
        } else {
            out = self.prev_out;
        }
        self.prev_phase = self.phase;
        sync.msb = msb;
        out
    }

    fn noise(&mut self, wf: u8, test: u8, phase: i32, accuadd: f64) -> f64 {
        let prev = wrap_i32(self.prev_phase);
        // Clocked on every sample once bit 20 toggles faster than the
        // sample rate can observe.
        if (phase & NOISE_CLOCK_BIT) != (prev & NOISE_CLOCK_BIT) || accuadd >= 1_048_576.0 {
            self.lfsr = clock_lfsr(self.lfsr, test);
        }
        // Noise mixed with anything else is silenced.
        if wf & 0x70 != 0 {
            0.0
        } else {
            noise_output(self.lfsr) as f64
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn pulse(
        &mut self,
        regs: &VoiceRegs,
        wf: u8,
        test: u8,
        phase: i32,
        ring_msb: i32,
        accuadd: f64,
        model: ChipModel,
        waves: &CombinedWaveforms,
    ) -> f64 {
        let accu = wrap_i32(accuadd);
        let mut pw = (regs.pw_lo as i32 + (regs.pw_hi as i32 & 0x0F) * 256) * 16;
        let mut limit = accu >> 9;
        if pw > 0 && pw < limit {
            pw = limit;
        }
        limit ^= 0xFFFF;
        if pw > limit {
            pw = limit;
        }
        let pos = phase >> 8;

        if wf == PULSE {
            // Edges are stretched into ramps whose slope follows pitch.
            let step = 256.0 / (accu >> 16) as f64;
            if test != 0 {
                FULL
            } else if pos < pw {
                let mut lim = (0xFFFF - pw) as f64 * step;
                if lim > FULL {
                    lim = FULL;
                }
                let out = lim - (pw - pos) as f64 * step;
                if out < 0.0 {
                    0.0
                } else {
                    out
                }
            } else {
                let mut lim = pw as f64 * step;
                if lim > FULL {
                    lim = FULL;
                }
                let mut out = (0xFFFF - pos) as f64 * step - lim;
                if out >= 0.0 {
                    out = FULL;
                }
                (wrap_i32(out) & 0xFFFF) as f64
            }
        } else {
            let high = pos >= pw || test != 0;
            if !high {
                return 0.0;
            }
            if wf & TRI != 0 {
                if wf & SAW != 0 {
                    self.combined(&waves.pulse_tri_saw, pos >> 4, true, model)
                } else {
                    let t = phase ^ ring_msb;
                    let folded = t ^ if t & PHASE_MSB != 0 { 0xFF_FFFF } else { 0 };
                    self.combined(&waves.pulse_saw, folded >> 11, false, model)
                }
            } else if wf & SAW != 0 {
                self.combined(&waves.pulse_saw, pos >> 4, true, model)
            } else {
                FULL
            }
        }
    }

    /// Table lookup averaged with the previous table sample. On the 6581
    /// the `halved` tables repeat their lower half.
    fn combined(&mut self, table: &[u16], index: i32, halved: bool, model: ChipModel) -> f64 {
        let mut index = index as usize & (WAVE_TABLE_LEN - 1);
        if halved && model == ChipModel::Mos6581 {
            index &= 0x7FF;
        }
        let value = table[index] as f64;
        let out = (value + self.prev_combined) / 2.0;
        self.prev_combined = value;
        out
    }
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::new()
    }
}

/// Sawtooth whose falling edge lengthens with pitch, turning into an
/// asymmetric triangle towards the top of the range.
fn bandlimited_saw(saw: f64, accuadd: f64) -> f64 {
    let step = accuadd / 18_874_368.0;
    let out = saw + saw * step;
    if out > FULL {
        FULL - (out - 65536.0) / step
    } else {
        out
    }
}

#[inline]
fn triangle(t: i32) -> i32 {
    (t ^ if t & PHASE_MSB != 0 { 0xFF_FFFF } else { 0 }) >> 7
}

/// One shift of the 23-bit noise register (taps at bits 22 and 17).
/// With the test bit held and no feedback, 8 is shifted in instead of 0.
pub fn clock_lfsr(r: i32, test: u8) -> i32 {
    let feedback = (r & 0x40_0000) ^ ((r & 0x2_0000) << 5);
    let input = if feedback > 0 { 1 } else { test as i32 };
    ((r << 1) + input) & 0x7F_FFFF
}

/// Eight LFSR taps scattered onto the top of the 16-bit output.
pub fn noise_output(r: i32) -> i32 {
    ((r & 0x10_0000) >> 5)
        + ((r & 0x4_0000) >> 4)
        + ((r & 0x4000) >> 1)
        + ((r & 0x800) << 1)
        + ((r & 0x200) << 2)
        + ((r & 0x20) << 5)
        + ((r & 0x04) << 7)
        + ((r & 0x01) << 8)
}
