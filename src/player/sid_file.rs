// PSID / RSID header reader with payload extraction.
//
// Parsing never fails: header bytes past the end of the file read as zero,
// so a truncated or odd file still yields something playable. `validate`
// reports what looked wrong for callers that want to be strict.

use std::path::Path;

use crate::c64_emu::sid::ChipModel;

/// Smallest file that carries a complete v1 header.
pub const V1_HEADER_LEN: usize = 0x76;

/// Parsed SID file header.
#[derive(Debug, Clone, PartialEq)]
pub struct SidHeader {
    pub magic: String,
    pub version: u16,
    /// Offset of the payload. Only the low byte ($07) is honoured.
    pub data_offset: u16,
    pub load_address: u16,
    pub init_address: u16,
    pub play_address: u16,
    pub songs: u8,
    pub start_song: u16,
    /// Bit n set: subtune n is driven by the CIA timer instead of vsync.
    pub speed: u32,
    pub name: String,
    pub author: String,
    pub released: String,
    /// v2+ flags word ($76-$77).
    pub flags: u16,
    /// Raw extra-chip page bytes ($7A, $7B).
    pub extra_sid_pages: [u8; 2],
    pub is_rsid: bool,
    /// Length of the file the header came from.
    pub file_len: usize,
}

/// A loaded SID file: header, the bytes that go into memory and where.
#[derive(Debug, Clone)]
pub struct SidFile {
    pub header: SidHeader,
    pub load_address: u16,
    pub payload: Vec<u8>,
    /// Full raw file bytes (needed for MD5 computation for Songlength).
    pub raw: Vec<u8>,
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn byte(d: &[u8], o: usize) -> u8 {
    d.get(o).copied().unwrap_or(0)
}

fn read_be_u16(d: &[u8], o: usize) -> u16 {
    ((byte(d, o) as u16) << 8) | byte(d, o + 1) as u16
}

fn read_be_u32(d: &[u8], o: usize) -> u32 {
    ((read_be_u16(d, o) as u32) << 16) | read_be_u16(d, o + 2) as u32
}

fn read_string(d: &[u8], o: usize, len: usize) -> String {
    let s = d.get(o..).unwrap_or(&[]);
    let s = &s[..s.len().min(len)];
    let end = s.iter().position(|&b| b == 0).unwrap_or(s.len());
    s[..end].iter().map(|&b| b as char).collect()
}

/// Decode an extra-SID page byte ($7A or $7B) into a base address, 0 if
/// the page is not a usable I/O location.
fn decode_sid_addr_byte(b: u8) -> u16 {
    if b >= 0x42 && (b < 0x80 || b >= 0xE0) {
        0xD000 + ((b as u16) << 4)
    } else {
        0
    }
}

// ── Header ───────────────────────────────────────────────────────────────

impl SidHeader {
    pub fn parse(data: &[u8]) -> SidHeader {
        let magic: String = data.iter().take(4).map(|&b| b as char).collect();
        SidHeader {
            is_rsid: magic == "RSID",
            magic,
            version: read_be_u16(data, 0x04),
            data_offset: byte(data, 0x07) as u16,
            load_address: read_be_u16(data, 0x08),
            init_address: read_be_u16(data, 0x0A),
            play_address: read_be_u16(data, 0x0C),
            songs: byte(data, 0x0F),
            start_song: read_be_u16(data, 0x10),
            speed: read_be_u32(data, 0x12),
            name: read_string(data, 0x16, 32),
            author: read_string(data, 0x36, 32),
            released: read_string(data, 0x56, 32),
            flags: read_be_u16(data, 0x76),
            extra_sid_pages: [byte(data, 0x7A), byte(data, 0x7B)],
            file_len: data.len(),
        }
    }

    /// Report the first thing that does not look like a well-formed file.
    pub fn validate(&self) -> Result<(), String> {
        if self.magic != "PSID" && self.magic != "RSID" {
            return Err(format!("Not a SID file (magic={:?})", self.magic));
        }
        if self.file_len < V1_HEADER_LEN {
            return Err("File too small for a SID header".into());
        }
        if self.data_offset as usize + 2 > self.file_len {
            return Err("data_offset past end of file".into());
        }
        if self.songs == 0 {
            return Err("Header declares no songs".into());
        }
        Ok(())
    }

    /// Whether subtune `subtune` (0-based) is paced by the CIA timer.
    pub fn timer_mode(&self, subtune: usize) -> bool {
        subtune < 32 && self.speed & (1 << subtune) != 0
    }

    /// Chip model for each of the three chip slots.
    pub fn chip_models(&self) -> [ChipModel; 3] {
        let model = |is_8580: bool| {
            if is_8580 {
                ChipModel::Mos8580
            } else {
                ChipModel::Mos6581
            }
        };
        let [hi, lo] = self.flags.to_be_bytes();
        [
            model(lo & 0x30 >= 0x20),
            model(lo & 0xC0 >= 0x80),
            model(hi & 0x03 >= 0x03),
        ]
    }

    /// C64 addresses of extra SIDs (0 = unused). Index 0 = SID2, 1 = SID3.
    pub fn extra_sid_addrs(&self) -> [u16; 2] {
        self.extra_sid_pages.map(decode_sid_addr_byte)
    }

    /// Number of SID chips the tune uses (1-3).
    pub fn num_sids(&self) -> usize {
        1 + self.extra_sid_addrs().iter().filter(|&&a| a != 0).count()
    }
}

// ── File ─────────────────────────────────────────────────────────────────

impl SidFile {
    /// Split a SID image into header and payload.
    ///
    /// The payload always starts two bytes past the data offset. With a
    /// zero load address in the header those two bytes hold the load
    /// address instead.
    pub fn parse(data: &[u8]) -> SidFile {
        let header = SidHeader::parse(data);
        let ds = header.data_offset as usize;

        let load_address = if header.load_address != 0 {
            header.load_address
        } else {
            byte(data, ds) as u16 | ((byte(data, ds + 1) as u16) << 8)
        };
        let payload = data.get(ds + 2..).unwrap_or(&[]).to_vec();

        SidFile {
            header,
            load_address,
            payload,
            raw: data.to_vec(),
        }
    }

    pub fn from_path(path: &Path) -> Result<SidFile, String> {
        let data = std::fs::read(path).map_err(|e| format!("Cannot read {}: {e}", path.display()))?;
        Ok(Self::parse(&data))
    }

    /// Init routine address; 0 in the header means the load address.
    pub fn init_address(&self) -> u16 {
        if self.header.init_address != 0 {
            self.header.init_address
        } else {
            self.load_address
        }
    }

    /// MD5 of the whole file, as used by the HVSC Songlength database.
    ///
    /// https://hvsc.c64.org/download/C64Music/DOCUMENTS/Songlengths.faq
    pub fn md5(&self) -> String {
        format!("{:x}", md5::compute(&self.raw))
    }
}
