//! Two-integrator state-variable filter, one per chip.
//!
//! Lowpass and highpass come out phase-inverted relative to the input,
//! bandpass in phase. The 8580 cutoff curve is ideal; the 6581 has a
//! threshold below which it sits at a fixed low cutoff.

use super::ChipModel;

// Mode/volume register ($18) bits.
pub const LOWPASS: u8 = 0x10;
pub const BANDPASS: u8 = 0x20;
pub const HIGHPASS: u8 = 0x40;

/// Cutoff exponent scale per model, fixed for a sample rate.
#[derive(Debug, Clone, Copy)]
pub struct FilterCoefficients {
    ratio_8580: f64,
    ratio_6581: f64,
}

impl FilterCoefficients {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            ratio_8580: (-2.0 * 3.14 * (12500.0 / 256.0)) / sample_rate,
            ratio_6581: (-2.0 * 3.14 * (20000.0 / 256.0)) / sample_rate,
        }
    }

    /// Integrator gain and resonance feedback for the current registers.
    pub fn tune(&self, model: ChipModel, fc_lo: u8, fc_hi: u8, res_filt: u8) -> (f64, f64) {
        let cutoff = (fc_lo & 7) as f64 / 8.0 + fc_hi as f64 + 0.2;
        match model {
            ChipModel::Mos8580 => {
                let cutoff = 1.0 - (cutoff * self.ratio_8580).exp();
                let resonance = 2f64.powf((4.0 - (res_filt >> 4) as f64) / 8.0);
                (cutoff, resonance)
            }
            ChipModel::Mos6581 => {
                let cutoff = if cutoff < 24.0 {
                    0.035
                } else {
                    1.0 - 1.263 * (cutoff * self.ratio_6581).exp()
                };
                let resonance = if res_filt > 0x5F {
                    8.0 / (res_filt >> 4) as f64
                } else {
                    1.41
                };
                (cutoff, resonance)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Filter {
    pub lowpass: f64,
    pub bandpass: f64,
}

impl Filter {
    /// Run one sample of `input` through the filter and fold the enabled
    /// outputs into `output`.
    pub fn clock(&mut self, input: f64, output: f64, cutoff: f64, resonance: f64, mode: u8) -> f64 {
        let mut output = output;

        let highpass = input + self.bandpass * resonance + self.lowpass;
        if mode & HIGHPASS != 0 {
            output -= highpass;
        }
        self.bandpass -= highpass * cutoff;
        if mode & BANDPASS != 0 {
            output -= self.bandpass;
        }
        self.lowpass += self.bandpass * cutoff;
        if mode & LOWPASS != 0 {
            output += self.lowpass;
        }
        output
    }
}
