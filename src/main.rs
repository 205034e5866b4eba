// phosphor-render: play a SID tune through the emulator and write the
// output to a WAV file.
//
//   phosphor-render <tune.sid> [--subtune N] [--seconds S] [--rate HZ]
//                   [--volume V] [-o out.wav] [--save-config]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use phosphor_core::player::sid_file::SidFile;
use phosphor_core::PlayerConfig;

/// Samples rendered per chunk between end-of-song checks.
const CHUNK: usize = 4096;

/// Highest song number a PSID header can address.
const MAX_SONGS: u16 = 256;

const USAGE: &str = "usage: phosphor-render <tune.sid> [--subtune N] [--seconds S] \
                     [--rate HZ] [--volume V] [-o out.wav] [--save-config]";

// ─────────────────────────────────────────────────────────────────────────────
//  Arguments
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
struct Args {
    input: PathBuf,
    output: PathBuf,
    /// 1-based; None = the tune's start song.
    subtune: Option<u16>,
    seconds: Option<u32>,
    rate: Option<u32>,
    volume: Option<f64>,
    /// Write the effective settings back to the config file.
    save_config: bool,
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("{flag} needs a value"))?;
    value
        .parse()
        .map_err(|_| format!("Invalid value for {flag}: {value}"))
}

fn parse_args(mut it: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut input = None;
    let mut output = None;
    let mut subtune = None;
    let mut seconds = None;
    let mut rate = None;
    let mut volume = None;
    let mut save_config = false;

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--subtune" => subtune = Some(parse_value(&arg, it.next())?),
            "--seconds" => seconds = Some(parse_value(&arg, it.next())?),
            "--rate" => rate = Some(parse_value(&arg, it.next())?),
            "--volume" => volume = Some(parse_value(&arg, it.next())?),
            "--save-config" => save_config = true,
            "-o" | "--output" => output = Some(PathBuf::from(parse_value::<String>(&arg, it.next())?)),
            "-h" | "--help" => return Err(USAGE.to_string()),
            s if s.starts_with('-') => return Err(format!("Unknown option {s}\n{USAGE}")),
            _ if input.is_none() => input = Some(PathBuf::from(arg)),
            _ => return Err(format!("Unexpected argument {arg}\n{USAGE}")),
        }
    }

    let input: PathBuf = input.ok_or_else(|| USAGE.to_string())?;
    if subtune == Some(0) {
        return Err("--subtune counts from 1".into());
    }
    if subtune.is_some_and(|n| n > MAX_SONGS) {
        return Err(format!("--subtune must be at most {MAX_SONGS}"));
    }
    if rate == Some(0) {
        return Err("--rate must be positive".into());
    }
    let output = output.unwrap_or_else(|| input.with_extension("wav"));

    Ok(Args {
        input,
        output,
        subtune,
        seconds,
        rate,
        volume,
        save_config,
    })
}

/// Zero-based song index for the player. Falls back to the header's start
/// song, which is clamped into 1..=256 like the requested number.
fn song_index(requested: Option<u16>, start_song: u16) -> u8 {
    let song = requested.unwrap_or(start_song).clamp(1, MAX_SONGS);
    u8::try_from(song - 1).unwrap_or(u8::MAX)
}

// ─────────────────────────────────────────────────────────────────────────────
//  Rendering
// ─────────────────────────────────────────────────────────────────────────────

fn run(args: Args) -> Result<(), String> {
    let mut config = PlayerConfig::load();
    if let Some(rate) = args.rate {
        config.sample_rate = rate;
    }
    if let Some(volume) = args.volume {
        config.volume = volume;
    }
    if args.save_config {
        config.save()?;
    }

    let sid = SidFile::from_path(&args.input)?;
    if let Err(e) = sid.header.validate() {
        log::warn!("{}: {e}", args.input.display());
    }
    let mut player = config.player();
    player.load(&sid.raw, song_index(args.subtune, sid.header.start_song));
    log::info!(
        "Rendering \"{}\" by {}, song {}/{}",
        player.title(),
        player.author(),
        player.subtune() as u16 + 1,
        player.subtunes()
    );
    if let Some(header) = player.header() {
        log::debug!(
            "{} v{}, released {}, chips {:?}, md5 {}",
            header.magic,
            header.version,
            player.info(),
            player.chip_models(),
            player.md5()
        );
    }

    let ended = Arc::new(AtomicBool::new(false));
    if config.default_song_length_secs > 0 {
        let flag = Arc::clone(&ended);
        player.set_end_callback(
            Box::new(move || flag.store(true, Ordering::Relaxed)),
            config.default_song_length_secs as f64,
        );
    }

    let seconds = args.seconds.unwrap_or(config.render_seconds);
    let total = seconds as usize * config.sample_rate as usize;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: config.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&args.output, spec)
        .map_err(|e| format!("Cannot create {}: {e}", args.output.display()))?;

    let mut buf = vec![0.0f32; CHUNK];
    let mut written = 0;
    while written < total && !ended.load(Ordering::Relaxed) {
        let n = CHUNK.min(total - written);
        player.render(&mut buf[..n]);
        for &s in &buf[..n] {
            writer
                .write_sample(s)
                .map_err(|e| format!("WAV write error: {e}"))?;
        }
        written += n;
    }
    writer
        .finalize()
        .map_err(|e| format!("WAV finalize error: {e}"))?;

    if player.is_ended() {
        log::info!("End of song after {:.1}s", player.playtime());
    }
    log::info!(
        "Wrote {written} samples ({:.1}s) to {}",
        written as f64 / config.sample_rate as f64,
        args.output.display()
    );
    Ok(())
}

fn main() {
    env_logger::init();

    let result = parse_args(std::env::args().skip(1)).and_then(run);
    if let Err(e) = result {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
