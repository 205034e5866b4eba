//! Phosphor playback core: a 6510 + SID emulation that turns PSID/RSID
//! tunes into audio samples, one `play()` call per sample.
//!
//! ```no_run
//! let data = std::fs::read("Commando.sid").unwrap();
//! let mut player = phosphor_core::SidPlayer::new(44_100.0);
//! player.load(&data, 0);
//! let mut buf = [0.0f32; 1024];
//! player.render(&mut buf);
//! ```

pub mod c64_emu;
pub mod config;
pub mod player;

pub use c64_emu::sid::ChipModel;
pub use config::PlayerConfig;
pub use player::sid_file::{SidFile, SidHeader};
pub use player::SidPlayer;
