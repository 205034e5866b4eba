//! ADSR envelope generator, one per voice.
//!
//! A 15-bit rate counter advances by the clock ratio each sample and fires
//! when it passes the period selected by the current phase's nibble. Hits
//! step the 8-bit envelope counter; during decay and release they are
//! further divided by the exponential prescaler.

use super::tables::{RateTable, EXP_TABLE};
use super::GATE;

// ── State bits ────────────────────────────────────────────────

/// Envelope frozen at zero until the next gate-on.
pub const HOLD_ZERO: u8 = 0x10;
pub const DECAY_SUSTAIN: u8 = 0x40;
pub const ATTACK: u8 = 0x80;

const RATE_COUNTER_WRAP: f64 = 32768.0;

#[derive(Debug, Clone, Copy)]
pub struct Envelope {
    /// GATE latch plus the phase bits above.
    pub state: u8,
    pub rate_counter: f64,
    /// Output level, 0-255 between clocks.
    pub counter: i32,
    pub exp_counter: i32,
    pub prev_sr: u8,
}

impl Envelope {
    pub fn new() -> Self {
        Self {
            state: 0,
            rate_counter: 0.0,
            counter: 0,
            exp_counter: 0,
            prev_sr: 0,
        }
    }

    /// Idle envelope: counters cleared, frozen at zero.
    pub fn reset(&mut self) {
        self.state = HOLD_ZERO;
        self.rate_counter = 0.0;
        self.counter = 0;
        self.exp_counter = 0;
        self.prev_sr = 0;
    }

    /// Advance by one output sample.
    pub fn clock(&mut self, ctrl: u8, ad: u8, sr: u8, clk_ratio: f64, rates: &RateTable) {
        let prev_gate = self.state & GATE;
        let mut delayed = false;

        if prev_gate != ctrl & GATE {
            if prev_gate != 0 {
                self.state &= !(GATE | ATTACK | DECAY_SUSTAIN);
            } else {
                self.state = GATE | ATTACK | DECAY_SUSTAIN;
                // A release nibble raised together with gate-on means the
                // SR write landed first: hold the first step off so the
                // rate counter has to wrap (the hardware delay bug).
                if sr & 0x0F > self.prev_sr & 0x0F {
                    delayed = true;
                }
            }
        }
        self.prev_sr = sr;

        self.rate_counter += clk_ratio;
        if self.rate_counter >= RATE_COUNTER_WRAP {
            self.rate_counter -= RATE_COUNTER_WRAP;
        }

        let nibble = if self.state & ATTACK != 0 {
            ad >> 4
        } else if self.state & DECAY_SUSTAIN != 0 {
            ad & 0x0F
        } else {
            sr & 0x0F
        } as usize;
        let period = rates.periods[nibble];
        let step = rates.steps[nibble];

        if self.rate_counter >= period && self.rate_counter < period + clk_ratio && !delayed {
            self.rate_counter -= period;

            let advance = if self.state & ATTACK != 0 {
                true
            } else {
                self.exp_counter += 1;
                self.exp_counter == EXP_TABLE[(self.counter & 0xFF) as usize] as i32
            };

            if advance {
                if self.state & HOLD_ZERO == 0 {
                    if self.state & ATTACK != 0 {
                        self.counter += step;
                        if self.counter >= 0xFF {
                            self.counter = 0xFF;
                            self.state &= !ATTACK;
                        }
                    } else if self.state & DECAY_SUSTAIN == 0
                        || self.counter > (sr >> 4) as i32 + (sr & 0xF0) as i32
                    {
                        self.counter -= step;
                        if self.counter <= 0 && self.counter + step != 0 {
                            self.counter = 0;
                            self.state |= HOLD_ZERO;
                        }
                    }
                }
                self.exp_counter = 0;
            }
        }

        // may wrap, usually 0 -> $FF
        self.counter &= 0xFF;
    }

    /// Amplitude multiplier, 0.0 to just under 1.0.
    #[inline]
    pub fn level(&self) -> f64 {
        self.counter as f64 / 256.0
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}
