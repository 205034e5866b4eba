// Golden-sample comparison. Each tests/songs/<name>.sid with a sibling
// <name>.f32 (little-endian f32, 44.1 kHz, subtune 0) is rendered and
// compared sample by sample. The reference songs are not shipped with the
// crate; drop them in and run `cargo test -- --ignored`.

use std::path::{Path, PathBuf};

use phosphor_core::SidPlayer;

const SAMPLE_RATE: f64 = 44_100.0;
const TOLERANCE: f32 = 1e-6;

fn songs_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("songs")
}

fn read_reference(path: &Path) -> Vec<f32> {
    let bytes = std::fs::read(path).unwrap();
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn compare(name: &str) -> Result<(), String> {
    let dir = songs_dir();
    let sid = std::fs::read(dir.join(format!("{name}.sid"))).map_err(|e| format!("{name}: {e}"))?;
    let expected = read_reference(&dir.join(format!("{name}.f32")));

    let mut player = SidPlayer::new(SAMPLE_RATE);
    player.load(&sid, 0);
    let mut actual = vec![0.0f32; expected.len()];
    player.render(&mut actual);

    for (i, (&want, &got)) in expected.iter().zip(&actual).enumerate() {
        if (want - got).abs() > TOLERANCE {
            return Err(format!("{name}: sample {i} differs: want {want}, got {got}"));
        }
    }
    Ok(())
}

#[test]
#[ignore]
fn reference_songs_match() {
    let entries = std::fs::read_dir(songs_dir()).unwrap();
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|x| x == "sid"))
        .filter(|p| p.with_extension("f32").exists())
        .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .collect();
    names.sort();
    assert!(!names.is_empty(), "no reference songs in {}", songs_dir().display());

    let failures: Vec<String> = names.iter().filter_map(|n| compare(n).err()).collect();
    assert!(failures.is_empty(), "{}", failures.join("\n"));
}

#[test]
#[ignore]
fn adsrtest() {
    compare("adsrtest").unwrap();
}

#[test]
#[ignore]
fn cutoffcurve() {
    compare("cutoffcurve").unwrap();
}

#[test]
#[ignore]
fn delaybug() {
    compare("delaybug").unwrap();
}

#[test]
#[ignore]
fn sndstarttest() {
    compare("sndstarttest").unwrap();
}

/// Minimal PSID v2 image loading `code` at $1000, with `flags` as the low
/// byte of the header's flags word ($77).
fn psid(play: u16, flags: u8, code: &[u8]) -> Vec<u8> {
    let mut image = vec![0u8; 0x7C];
    image[0..4].copy_from_slice(b"PSID");
    image[0x05] = 2;
    image[0x07] = 0x7C;
    image[0x0C..0x0E].copy_from_slice(&play.to_be_bytes());
    image[0x0F] = 1;
    image[0x77] = flags;
    image.extend_from_slice(&[0x00, 0x10]);
    image.extend_from_slice(code);
    image
}

/// Init code storing each (register, value) pair into the first chip,
/// followed by an RTS.
fn sid_writes(regs: &[(u8, u8)]) -> Vec<u8> {
    let mut code: Vec<u8> = regs
        .iter()
        .flat_map(|&(reg, value)| [0xA9, value, 0x8D, reg, 0xD4]) // LDA #v / STA $D4rr
        .collect();
    code.push(0x60);
    code
}

fn render(image: &[u8], len: usize) -> Vec<f32> {
    let mut p = SidPlayer::new(SAMPLE_RATE);
    p.load(image, 0);
    let mut buf = vec![0.0f32; len];
    p.render(&mut buf);
    buf
}

fn assert_samples(name: &str, got: &[f32], want: &[(usize, f32)]) {
    for &(i, w) in want {
        assert!(
            (got[i] - w).abs() <= TOLERANCE,
            "{name}: sample {i} is {}, want {w}",
            got[i]
        );
    }
}

#[test]
fn synthetic_tune_renders_deterministically() {
    // Gated pulse on voice 1; play is the RTS that ends init.
    let code = sid_writes(&[(0x01, 0x20), (0x03, 0x08), (0x06, 0xF0), (0x04, 0x41), (0x18, 0x0F)]);
    let image = psid(0x1019, 0x00, &code);

    let a = render(&image, 4410);
    assert_eq!(a, render(&image, 4410));
    assert!(a.iter().all(|s| s.is_finite() && s.abs() < 2.0));
    assert_samples(
        "pulse",
        &a,
        &[
            (0, -0.00183105469),
            (100, -0.155639648),
            (1000, 0.155634895),
            (2000, 0.155634895),
            (4409, -0.155639648),
        ],
    );
}

#[test]
fn filtered_combined_waveforms_follow_chip_model() {
    // Voice 1 pulse+triangle, voice 2 sawtooth, both routed through a
    // resonant low-pass. Play sweeps the cutoff up with INC $D416.
    let mut code = sid_writes(&[
        (0x01, 0x10),
        (0x03, 0x08),
        (0x05, 0x09),
        (0x06, 0xA0),
        (0x04, 0x51),
        (0x08, 0x20),
        (0x0D, 0xF0),
        (0x0B, 0x21),
        (0x15, 0x07),
        (0x16, 0x40),
        (0x17, 0xF3),
        (0x18, 0x1F),
    ]);
    let play = 0x1000 + code.len() as u16;
    code.extend_from_slice(&[0xEE, 0x16, 0xD4, 0x60]);

    let mos8580 = render(&psid(play, 0x20, &code), 4410);
    let mos6581 = render(&psid(play, 0x10, &code), 4410);

    assert_samples(
        "8580",
        &mos8580,
        &[
            (0, 0.000491448445),
            (100, 0.0801018700),
            (1000, 0.00992859527),
            (2000, 0.0187797695),
            (4409, 0.275549918),
        ],
    );
    assert_samples(
        "6581",
        &mos6581,
        &[
            (0, 0.000563514128),
            (100, 0.0692289621),
            (1000, 0.0111498525),
            (2000, 0.0167282354),
            (4409, 0.231693447),
        ],
    );
    assert_ne!(mos8580, mos6581);
}
