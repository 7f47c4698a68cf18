//! Media kind detection from leading magic bytes.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Bytes needed to recognise every signature below.
pub const SNIFF_LEN: usize = 262;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sniffed {
    pub mime: &'static str,
    pub kind: MediaKind,
}

impl Sniffed {
    const fn new(mime: &'static str, kind: MediaKind) -> Self {
        Self { mime, kind }
    }
}

fn ftyp_brand(data: &[u8]) -> Option<&[u8]> {
    (data.len() >= 12 && &data[4..8] == b"ftyp").then(|| &data[8..12])
}

fn riff_form(data: &[u8]) -> Option<&[u8]> {
    (data.len() >= 12 && &data[0..4] == b"RIFF").then(|| &data[8..12])
}

/// Classify a byte prefix; `None` when it is not image, audio or video.
pub fn sniff_bytes(data: &[u8]) -> Option<Sniffed> {
    use MediaKind::*;

    if data.len() < 4 {
        return None;
    }

    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(Sniffed::new("image/jpeg", Image));
    }
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(Sniffed::new("image/png", Image));
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some(Sniffed::new("image/gif", Image));
    }
    if data.starts_with(b"II*\0") || data.starts_with(b"MM\0*") {
        return Some(Sniffed::new("image/tiff", Image));
    }
    if data.starts_with(&[0x00, 0x00, 0x01, 0x00]) {
        return Some(Sniffed::new("image/x-icon", Image));
    }
    if data.starts_with(b"BM") && data.len() >= 14 {
        return Some(Sniffed::new("image/bmp", Image));
    }

    if let Some(form) = riff_form(data) {
        return match form {
            b"WEBP" => Some(Sniffed::new("image/webp", Image)),
            b"WAVE" => Some(Sniffed::new("audio/x-wav", Audio)),
            b"AVI " => Some(Sniffed::new("video/x-msvideo", Video)),
            _ => None,
        };
    }

    if let Some(brand) = ftyp_brand(data) {
        return match brand {
            b"avif" | b"avis" => Some(Sniffed::new("image/avif", Image)),
            b"heic" | b"heix" | b"mif1" => Some(Sniffed::new("image/heif", Image)),
            b"M4A " | b"M4B " => Some(Sniffed::new("audio/mp4", Audio)),
            b"qt  " => Some(Sniffed::new("video/quicktime", Video)),
            b"3gp4" | b"3gp5" | b"3g2a" => Some(Sniffed::new("video/3gpp", Video)),
            _ => Some(Sniffed::new("video/mp4", Video)),
        };
    }

    if data.starts_with(b"ID3") || matches!(&data[..2], [0xFF, 0xFB | 0xF3 | 0xF2]) {
        return Some(Sniffed::new("audio/mpeg", Audio));
    }
    if data.starts_with(b"fLaC") {
        return Some(Sniffed::new("audio/x-flac", Audio));
    }
    if data.starts_with(b"OggS") {
        return Some(Sniffed::new("audio/ogg", Audio));
    }
    if data.starts_with(b"#!AMR") {
        return Some(Sniffed::new("audio/amr", Audio));
    }
    if data.starts_with(b"FORM") && data.len() >= 12 && &data[8..12] == b"AIFF" {
        return Some(Sniffed::new("audio/x-aiff", Audio));
    }

    if data.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some(Sniffed::new("video/x-matroska", Video));
    }
    if data.starts_with(b"FLV\x01") {
        return Some(Sniffed::new("video/x-flv", Video));
    }
    if data.starts_with(&[0x00, 0x00, 0x01, 0xBA]) || data.starts_with(&[0x00, 0x00, 0x01, 0xB3]) {
        return Some(Sniffed::new("video/mpeg", Video));
    }

    None
}

/// Read the leading bytes of `path` and sniff them.
pub fn sniff_file(path: &Path) -> io::Result<Option<Sniffed>> {
    let mut buf = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut buf)?;
    Ok(sniff_bytes(&buf))
}
