// Sample-driven tune scheduler. Owns the 64 KiB memory, the 6510 and the
// SID engine. Each `play()` produces one output sample: it runs as many
// CPU instructions as fit into one sample's worth of clock cycles, then
// lets every active chip synthesise one sample from its registers.
//
// Nothing here allocates or logs once a tune is initialised; the hot path
// is meant to be called straight from an audio callback.

pub mod sid_file;

use log::{debug, info, warn};

use crate::c64_emu::cpu::Cpu;
use crate::c64_emu::memory::{Memory, SidMapper, PROCESSOR_PORT, SID1_BASE};
use crate::c64_emu::sid::{ChipModel, SidEngine, MAX_CHIPS};
use crate::c64_emu::{wrap_i32, PAL_CPU_CLOCK, PAL_FRAME_RATE};
use sid_file::{SidFile, SidHeader};

// ─────────────────────────────────────────────────────────────────────────────
//  Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Output attenuation by number of extra chips, keeps 2SID/3SID mixes
/// from clipping.
const MIX_ATTENUATION: [f64; MAX_CHIPS] = [1.0, 0.6, 0.4];

/// Instruction ceiling for the init routine. Runaway init code is cut off
/// here and playback starts anyway.
const INIT_TICK_LIMIT: u32 = 100_000;

/// CIA 1 timer A latch.
const CIA1_TIMER_LO: u16 = 0xDC04;
const CIA1_TIMER_HI: u16 = 0xDC05;

/// Timer value assumed when a timer-paced tune leaves the CIA untouched.
const DEFAULT_TIMER: [u8; 2] = [0x24, 0x40];

/// KERNAL IRQ exits. Reaching one from RAM means the play routine jumped
/// into the ROM handler instead of returning.
const KERNAL_IRQ_EXITS: [u16; 2] = [0xEA31, 0xEA81];
const KERNAL_START: u16 = 0xE000;

const IRQ_VECTOR: u16 = 0xFFFE;
const KERNAL_IRQ_VECTOR: u16 = 0x0314;

/// Writes in this range that miss every chip window get folded into the
/// primary chip's registers.
const SID_MIRROR_START: u16 = 0xD420;
const SID_MIRROR_END: u16 = 0xD800;
const SID_MIRROR_MASK: u16 = 0xD41F;

const PORT_ALL_ROMS: u8 = 0x37;
const PORT_KERNAL_OUT: u8 = 0x35;

// ─────────────────────────────────────────────────────────────────────────────
//  SidPlayer
// ─────────────────────────────────────────────────────────────────────────────

pub struct SidPlayer {
    sample_rate: f64,
    clk_ratio: f64,

    mem: Memory,
    cpu: Cpu,
    sid: SidEngine,
    mapper: SidMapper,
    models: [ChipModel; MAX_CHIPS],

    header: Option<SidHeader>,
    md5: String,
    load_addr: u16,
    init_addr: u16,
    /// Play address from the header; 0 means "use the IRQ vector".
    header_play_addr: u16,
    play_addr: u16,
    subtune: u8,

    loaded: bool,
    initialized: bool,
    /// The play routine returned for this frame.
    frame_done: bool,
    ended: bool,

    /// Output samples per player call.
    frame_period: f64,
    frame_counter: f64,
    /// CPU cycles run ahead of (positive) or behind the sample clock.
    cpu_time: f64,
    playtime: f64,
    volume: f64,

    song_length: f64,
    end_callback: Option<Box<dyn FnMut() + Send>>,
}

impl SidPlayer {
    pub fn new(sample_rate: f64) -> Self {
        let clk_ratio = PAL_CPU_CLOCK / sample_rate;
        Self {
            sample_rate,
            clk_ratio,
            mem: Memory::new(),
            cpu: Cpu::new(),
            sid: SidEngine::new(sample_rate, clk_ratio),
            mapper: SidMapper::default(),
            models: [ChipModel::Mos8580; MAX_CHIPS],
            header: None,
            md5: String::new(),
            load_addr: 0x1000,
            init_addr: 0x1000,
            header_play_addr: 0x1003,
            play_addr: 0x1003,
            subtune: 0,
            loaded: false,
            initialized: false,
            frame_done: false,
            ended: false,
            frame_period: sample_rate / PAL_FRAME_RATE,
            frame_counter: 1.0,
            cpu_time: 0.0,
            playtime: 0.0,
            volume: 1.0,
            song_length: 0.0,
            end_callback: None,
        }
    }

    // ── Loading ──────────────────────────────────────────────────────────

    /// Place a SID image in memory and run `subtune`'s init routine.
    ///
    /// Never fails: whatever the image holds ends up in memory, bytes past
    /// $FFFF are dropped and missing header bytes count as zero.
    pub fn load(&mut self, image: &[u8], subtune: u8) {
        let file = SidFile::parse(image);
        if let Err(e) = file.header.validate() {
            warn!("SID header: {e}");
        }

        self.subtune = subtune;
        self.load_addr = file.load_address;
        self.mem.clear();
        let copied = self.mem.load(self.load_addr, &file.payload);
        if copied < file.payload.len() {
            warn!(
                "{} payload bytes past $FFFF dropped",
                file.payload.len() - copied
            );
        }

        self.init_addr = file.init_address();
        self.header_play_addr = file.header.play_address;
        self.play_addr = self.header_play_addr;
        self.models = file.header.chip_models();
        self.mapper = SidMapper::new(file.header.extra_sid_addrs());
        self.md5 = file.md5();

        info!(
            "{} \"{}\" by {} ({}): load ${:04X} init ${:04X} play ${:04X}, {} subtune(s)",
            file.header.magic,
            file.header.name,
            file.header.author,
            file.header.released,
            self.load_addr,
            self.init_addr,
            self.header_play_addr,
            file.header.songs
        );
        info!(
            "{} SID(s) at ${:04X}/${:04X}/${:04X}, models {}/{}/{}",
            self.mapper.num_sids(),
            self.mapper.base(0),
            self.mapper.base(1),
            self.mapper.base(2),
            self.models[0],
            self.models[1],
            self.models[2]
        );

        self.header = Some(file.header);
        self.loaded = true;
        self.init(subtune);
    }

    /// Stop running the tune. `play()` keeps producing the (silent) output
    /// of the cleared chip registers.
    pub fn unload(&mut self) {
        self.loaded = false;
        self.sid.init(&mut self.mem);
    }

    /// Restart at `subtune`: run its init routine and pick the cadence.
    pub fn init(&mut self, subtune: u8) {
        if !self.loaded {
            return;
        }
        self.initialized = false;
        self.subtune = subtune;

        self.cpu.init(self.init_addr, subtune);
        self.sid.init(&mut self.mem);
        self.mem.write(PROCESSOR_PORT, PORT_ALL_ROMS);
        self.mem.write(CIA1_TIMER_HI, 0);

        let returned = (0..=INIT_TICK_LIMIT).any(|_| self.cpu.tick(&mut self.mem).is_return());
        if !returned {
            warn!(
                "Init routine at ${:04X} still running after {} instructions (at ${:04X}, opcode ${:02X})",
                self.init_addr,
                INIT_TICK_LIMIT + 1,
                self.cpu.pc(),
                self.cpu.ir()
            );
        }

        if self.timer_mode(subtune) || self.mem.read(CIA1_TIMER_HI) != 0 {
            if self.mem.read(CIA1_TIMER_HI) == 0 {
                self.mem.write(CIA1_TIMER_LO, DEFAULT_TIMER[0]);
                self.mem.write(CIA1_TIMER_HI, DEFAULT_TIMER[1]);
            }
            self.frame_period = self.cia_period();
            debug!(
                "Subtune {subtune}: CIA timer ${:04X}, {:.3} samples per call",
                self.mem.read_word(CIA1_TIMER_LO),
                self.frame_period
            );
        } else {
            self.frame_period = self.sample_rate / PAL_FRAME_RATE;
            debug!(
                "Subtune {subtune}: vsync, {:.3} samples per call",
                self.frame_period
            );
        }

        if self.header_play_addr == 0 {
            let vector = if self.mem.processor_port() & 3 < 2 {
                IRQ_VECTOR
            } else {
                KERNAL_IRQ_VECTOR
            };
            self.play_addr = self.mem.read_word(vector);
            debug!(
                "Play address from ${vector:04X} vector: ${:04X}",
                self.play_addr
            );
        } else {
            self.play_addr = self.header_play_addr;
            // player under the KERNAL ROM
            if self.play_addr >= KERNAL_START && self.mem.processor_port() == PORT_ALL_ROMS {
                self.mem.write(PROCESSOR_PORT, PORT_KERNAL_OUT);
            }
        }

        self.cpu.init(self.play_addr, 0);
        self.frame_counter = 1.0;
        self.frame_done = false;
        self.cpu_time = 0.0;
        self.playtime = 0.0;
        self.ended = false;
        self.initialized = true;
    }

    // ── Playback ─────────────────────────────────────────────────────────

    /// Produce one output sample.
    pub fn play(&mut self) -> f64 {
        if self.loaded && self.initialized {
            self.frame_counter -= 1.0;
            self.playtime += 1.0 / self.sample_rate;
            if self.frame_counter <= 0.0 {
                self.frame_counter = self.frame_period;
                self.frame_done = false;
                self.cpu.set_pc(self.play_addr);
                self.cpu.set_sp(0xFF);
            }
            if !self.frame_done {
                self.run_cpu();
            }
        }

        if self.song_length > 0.0
            && wrap_i32(self.playtime) == wrap_i32(self.song_length)
            && !self.ended
        {
            self.ended = true;
            if let Some(callback) = self.end_callback.as_mut() {
                callback();
            }
        }

        let mut mix = self.sid.emulate(0, SID1_BASE, self.models[0], &mut self.mem);
        for chip in 1..MAX_CHIPS {
            if self.mapper.is_active(chip) {
                mix += self
                    .sid
                    .emulate(chip, self.mapper.base(chip), self.models[chip], &mut self.mem);
            }
        }

        mix * self.volume * MIX_ATTENUATION[self.mapper.extra_count()]
    }

    pub fn play_f32(&mut self) -> f32 {
        self.play() as f32
    }

    /// Fill `out` with consecutive samples.
    pub fn render(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample = self.play_f32();
        }
    }

    /// Run instructions until this sample's cycle budget is spent or the
    /// play routine is done for the frame.
    fn run_cpu(&mut self) {
        while self.cpu_time <= self.clk_ratio {
            let prev_pc = self.cpu.pc();
            if self.cpu.tick(&mut self.mem).is_return() {
                self.frame_done = true;
                break;
            }
            self.cpu_time += self.cpu.cycles() as f64;

            let port = self.mem.processor_port() & 3;
            if port > 1 && prev_pc < KERNAL_START && KERNAL_IRQ_EXITS.contains(&self.cpu.pc()) {
                self.frame_done = true;
                break;
            }

            let addr = self.cpu.addr();
            if (addr == CIA1_TIMER_LO || addr == CIA1_TIMER_HI)
                && port != 0
                && self.timer_mode(self.subtune)
            {
                self.frame_period = self.cia_period();
            }

            self.redirect_stray_sid_write(port);
            self.sid.whittaker_workaround(addr, &self.mem);
        }
        self.cpu_time -= self.clk_ratio;
    }

    /// Some players (Galway, Rubicon) write to mirrors of the SID above
    /// $D41F. Fold those writes back into the primary chip unless they hit
    /// a real extra chip.
    fn redirect_stray_sid_write(&mut self, port: u8) {
        let store = self.cpu.store_addr();
        if (SID_MIRROR_START..SID_MIRROR_END).contains(&store)
            && port != 0
            && !self.mapper.in_extra_window(store)
        {
            let value = self.mem.read(store);
            self.mem.write(store & SID_MIRROR_MASK, value);
        }
    }

    fn cia_period(&self) -> f64 {
        self.mem.read_word(CIA1_TIMER_LO) as f64 / self.clk_ratio
    }

    fn timer_mode(&self, subtune: u8) -> bool {
        self.header
            .as_ref()
            .is_some_and(|h| h.timer_mode(subtune as usize))
    }

    // ── Song length ──────────────────────────────────────────────────────

    /// Call `callback` once, the first sample whose whole-second playtime
    /// equals `seconds`. 0 disables it.
    pub fn set_end_callback(&mut self, callback: Box<dyn FnMut() + Send>, seconds: f64) {
        self.end_callback = Some(callback);
        self.song_length = seconds;
    }

    // ── Telemetry ────────────────────────────────────────────────────────

    /// Seconds played since the last init.
    pub fn playtime(&self) -> f64 {
        self.playtime
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.volume = volume;
    }

    pub fn subtunes(&self) -> u8 {
        self.header.as_ref().map_or(1, |h| h.songs)
    }

    pub fn subtune(&self) -> u8 {
        self.subtune
    }

    pub fn title(&self) -> &str {
        self.header.as_ref().map_or("", |h| h.name.as_str())
    }

    pub fn author(&self) -> &str {
        self.header.as_ref().map_or("", |h| h.author.as_str())
    }

    pub fn info(&self) -> &str {
        self.header.as_ref().map_or("", |h| h.released.as_str())
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn chip_models(&self) -> [ChipModel; MAX_CHIPS] {
        self.models
    }

    pub fn chip_count(&self) -> usize {
        self.mapper.num_sids()
    }

    pub fn header(&self) -> Option<&SidHeader> {
        self.header.as_ref()
    }

    /// HVSC MD5 of the loaded file.
    pub fn md5(&self) -> &str {
        &self.md5
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Output samples between play routine calls.
    pub fn frame_period(&self) -> f64 {
        self.frame_period
    }

    pub fn play_address(&self) -> u16 {
        self.play_addr
    }

    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.mem
    }

    pub fn engine(&self) -> &SidEngine {
        &self.sid
    }
}

impl std::fmt::Debug for SidPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidPlayer")
            .field("sample_rate", &self.sample_rate)
            .field("title", &self.title())
            .field("subtune", &self.subtune)
            .field("loaded", &self.loaded)
            .field("playtime", &self.playtime)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::sid_file::tests::psid_image;
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // $1000: LDA #$0F / STA $D418 / RTS
    // $1006: INC $C020 / RTS
    const VOLUME_INIT_COUNTING_PLAY: [u8; 10] = [
        0xA9, 0x0F, 0x8D, 0x18, 0xD4, 0x60, //
        0xEE, 0x20, 0xC0, 0x60,
    ];

    fn counting_tune() -> Vec<u8> {
        psid_image(0x1000, 0x1000, 0x1006, &VOLUME_INIT_COUNTING_PLAY)
    }

    fn loaded(image: &[u8]) -> SidPlayer {
        let mut p = SidPlayer::new(44100.0);
        p.load(image, 0);
        p
    }

    #[test]
    fn load_runs_init_and_reports_header() {
        let p = loaded(&counting_tune());
        assert!(p.is_loaded());
        assert_eq!(p.memory().read(0xD418), 0x0F);
        assert_eq!(p.memory().read(0x1006), 0xEE);
        assert_eq!(p.memory().processor_port(), 0x37);
        assert_eq!(p.title(), "Title");
        assert_eq!(p.author(), "Author");
        assert_eq!(p.info(), "1987");
        assert_eq!(p.subtunes(), 1);
        assert_eq!(p.chip_count(), 1);
        assert_eq!(p.chip_models(), [ChipModel::Mos6581; 3]);
        assert_eq!(p.play_address(), 0x1006);
        assert_eq!(p.md5().len(), 32);
    }

    #[test]
    fn vsync_cadence_calls_play_once_per_frame() {
        let mut p = loaded(&counting_tune());
        assert_eq!(p.frame_period(), 882.0);

        p.play();
        assert_eq!(p.memory().read(0xC020), 1);
        for _ in 1..882 {
            p.play();
        }
        assert_eq!(p.memory().read(0xC020), 1);
        p.play();
        assert_eq!(p.memory().read(0xC020), 2);
        assert!((p.playtime() - 883.0 / 44100.0).abs() < 1e-9);
    }

    #[test]
    fn timer_cadence_from_speed_bit() {
        let mut img = counting_tune();
        img[0x15] = 0x01;
        let p = loaded(&img);
        assert_eq!(p.memory().read(0xDC04), 0x24);
        assert_eq!(p.memory().read(0xDC05), 0x40);
        let expected = 0x4024 as f64 / (PAL_CPU_CLOCK / 44100.0);
        assert!((p.frame_period() - expected).abs() < 1e-9);
    }

    #[test]
    fn timer_cadence_when_init_sets_cia() {
        // LDA #$4C / STA $DC05 / RTS, play: RTS
        let code = [0xA9, 0x4C, 0x8D, 0x05, 0xDC, 0x60, 0x60];
        let p = loaded(&psid_image(0x1000, 0x1000, 0x1006, &code));
        let expected = 0x4C00 as f64 / (PAL_CPU_CLOCK / 44100.0);
        assert!((p.frame_period() - expected).abs() < 1e-9);
    }

    #[test]
    fn play_rewriting_timer_changes_cadence() {
        // init: RTS; play: LDA #$00 / STA $DC04 / LDA #$20 / STA $DC05 / RTS
        let code = [
            0x60, 0xA9, 0x00, 0x8D, 0x04, 0xDC, 0xA9, 0x20, 0x8D, 0x05, 0xDC, 0x60,
        ];
        let mut img = psid_image(0x1000, 0x1000, 0x1001, &code);
        img[0x15] = 0x01;
        let mut p = loaded(&img);
        for _ in 0..4 {
            p.play();
        }
        let expected = 0x2000 as f64 / (PAL_CPU_CLOCK / 44100.0);
        assert!((p.frame_period() - expected).abs() < 1e-9);
    }

    #[test]
    fn runaway_init_is_cut_off() {
        // init: JMP $1000; play: INC $C020 / RTS
        let code = [0x4C, 0x00, 0x10, 0xEE, 0x20, 0xC0, 0x60];
        let mut p = loaded(&psid_image(0x1000, 0x1000, 0x1003, &code));
        p.play();
        assert_eq!(p.memory().read(0xC020), 1);
    }

    #[test]
    fn zero_play_address_uses_kernal_vector() {
        // init: LDA #$34 / STA $0314 / LDA #$12 / STA $0315 / RTS
        let code = [0xA9, 0x34, 0x8D, 0x14, 0x03, 0xA9, 0x12, 0x8D, 0x15, 0x03, 0x60];
        let p = loaded(&psid_image(0x1000, 0x1000, 0x0000, &code));
        assert_eq!(p.play_address(), 0x1234);
    }

    #[test]
    fn play_under_kernal_banks_rom_out() {
        let mut code = vec![0x60];
        code.resize(0xE000 - 0x1000 + 1, 0x00);
        code[0xE000 - 0x1000] = 0x60;
        let p = loaded(&psid_image(0x1000, 0x1000, 0xE000, &code));
        assert_eq!(p.memory().processor_port(), 0x35);
    }

    #[test]
    fn jump_into_kernal_irq_exit_ends_frame() {
        // init: RTS; play: INC $C020 / JMP $EA31
        let code = [0x60, 0xEE, 0x20, 0xC0, 0x4C, 0x31, 0xEA];
        let mut p = loaded(&psid_image(0x1000, 0x1000, 0x1001, &code));
        // INC $C021 at the exit, must never run
        p.memory_mut().load(0xEA31, &[0xEE, 0x21, 0xC0, 0x60]);
        for _ in 0..10 {
            p.play();
        }
        assert_eq!(p.memory().read(0xC020), 1);
        assert_eq!(p.memory().read(0xC021), 0);
    }

    #[test]
    fn stray_sid_writes_fold_into_primary_chip() {
        // init: RTS; play: LDA #$0A / STA $D438 / RTS
        let code = [0x60, 0xA9, 0x0A, 0x8D, 0x38, 0xD4, 0x60];
        let img = psid_image(0x1000, 0x1000, 0x1001, &code);

        let mut p = loaded(&img);
        p.play();
        assert_eq!(p.memory().read(0xD418), 0x0A);

        let mut stereo = img.clone();
        stereo[0x7A] = 0x42;
        let mut p = loaded(&stereo);
        p.play();
        assert_eq!(p.memory().read(0xD418), 0x00);
        assert_eq!(p.memory().read(0xD438), 0x0A);
    }

    #[test]
    fn extra_chips_attenuate_mix() {
        // init: gated sawtooth on voice 1, full volume; play: RTS
        let code = [
            0xA9, 0x40, 0x8D, 0x01, 0xD4, // LDA #$40 / STA $D401
            0xA9, 0x00, 0x8D, 0x05, 0xD4, // LDA #$00 / STA $D405
            0xA9, 0xF0, 0x8D, 0x06, 0xD4, // LDA #$F0 / STA $D406
            0xA9, 0x21, 0x8D, 0x04, 0xD4, // LDA #$21 / STA $D404
            0xA9, 0x0F, 0x8D, 0x18, 0xD4, // LDA #$0F / STA $D418
            0x60, 0x60,
        ];
        let mono = psid_image(0x1000, 0x1000, 0x101A, &code);
        let mut stereo = mono.clone();
        stereo[0x7A] = 0x42;
        let mut trio = stereo.clone();
        trio[0x7B] = 0x44;

        let mut p1 = loaded(&mono);
        let mut p2 = loaded(&stereo);
        let mut p3 = loaded(&trio);
        assert_eq!(p2.chip_count(), 2);
        assert_eq!(p3.chip_count(), 3);

        let mut peak = 0.0f64;
        for _ in 0..2000 {
            let a = p1.play();
            let b = p2.play();
            let c = p3.play();
            assert!((b - a * 0.6).abs() < 1e-12, "{a} {b}");
            assert!((c - a * 0.4).abs() < 1e-12, "{a} {c}");
            peak = peak.max(a.abs());
        }
        assert!(peak > 0.01);
    }

    #[test]
    fn end_callback_fires_once() {
        let mut p = loaded(&counting_tune());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        p.set_end_callback(
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            1.0,
        );
        for _ in 0..44000 {
            p.play();
        }
        assert!(!p.is_ended());
        for _ in 0..44100 {
            p.play();
        }
        assert!(p.is_ended());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        p.init(0);
        assert!(!p.is_ended());
    }

    #[test]
    fn unload_stops_the_cpu() {
        let mut p = loaded(&counting_tune());
        p.play();
        p.unload();
        assert!(!p.is_loaded());
        assert_eq!(p.memory().read(0xD418), 0);
        let t = p.playtime();
        for _ in 0..2000 {
            assert_eq!(p.play(), 0.0);
        }
        assert_eq!(p.playtime(), t);
        assert_eq!(p.memory().read(0xC020), 1);

        // init without a tune is a no-op
        p.init(0);
        assert!(!p.is_loaded());
    }

    #[test]
    fn volume_scales_output() {
        let code = [
            0xA9, 0x40, 0x8D, 0x01, 0xD4, 0xA9, 0xF0, 0x8D, 0x06, 0xD4, 0xA9, 0x21, 0x8D, 0x04,
            0xD4, 0xA9, 0x0F, 0x8D, 0x18, 0xD4, 0x60, 0x60,
        ];
        let img = psid_image(0x1000, 0x1000, 0x1015, &code);
        let mut a = loaded(&img);
        let mut b = loaded(&img);
        b.set_volume(0.5);
        assert_eq!(b.volume(), 0.5);
        let mut buf = [0.0f32; 500];
        b.render(&mut buf);
        for (i, &s) in buf.iter().enumerate() {
            let full = a.play();
            assert!(((full * 0.5) as f32 - s).abs() < 1e-6, "sample {i}");
        }
    }
}
