//! PCM16 WAV gain and pan.
//!
//! Players are plain command-line tools with no per-stream volume or balance,
//! so both are baked into the samples before playback. Mono input is widened
//! to stereo when panned; anything that is not 16-bit PCM WAV is rejected and
//! the caller plays it untouched.

use plastic_core::PlaybackError;
use std::ops::Range;

/// Parsed location of the audio inside a RIFF/WAVE buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavLayout {
    pub format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub data: Range<usize>,
}

impl WavLayout {
    pub fn is_pcm16(&self) -> bool {
        self.format == 1 && self.bits_per_sample == 16
    }
}

/// Volume 1.0 and centered pan need no processing.
pub fn is_neutral(volume: f32, pan: f32) -> bool {
    (volume - 1.0).abs() <= f32::EPSILON && pan.abs() <= f32::EPSILON
}

/// Per-channel gains for a linear balance pan in `[-1, 1]`.
pub fn channel_gains(volume: f32, pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    let left = volume * (1.0 - pan).min(1.0);
    let right = volume * (1.0 + pan).min(1.0);
    (left, right)
}

pub fn parse_layout(buf: &[u8]) -> Result<WavLayout, PlaybackError> {
    if buf.len() < 12 || &buf[0..4] != b"RIFF" || &buf[8..12] != b"WAVE" {
        return Err(PlaybackError::Decode("not a RIFF/WAVE buffer".into()));
    }

    let mut fmt: Option<(u16, u16, u32, u16)> = None;
    let mut idx = 12;
    while idx + 8 <= buf.len() {
        let chunk_id = &buf[idx..idx + 4];
        let size = read_u32(buf, idx + 4) as usize;
        let body = idx + 8;
        if chunk_id == b"fmt " {
            if body + 16 > buf.len() {
                return Err(PlaybackError::Decode("truncated fmt chunk".into()));
            }
            fmt = Some((
                read_u16(buf, body),
                read_u16(buf, body + 2),
                read_u32(buf, body + 4),
                read_u16(buf, body + 14),
            ));
        } else if chunk_id == b"data" {
            let (format, channels, sample_rate, bits_per_sample) =
                fmt.ok_or_else(|| PlaybackError::Decode("data chunk before fmt".into()))?;
            // Streamed WAVs carry a placeholder size
            let end = body.saturating_add(size).min(buf.len());
            return Ok(WavLayout {
                format,
                channels,
                sample_rate,
                bits_per_sample,
                data: body..end,
            });
        }
        // Chunks are word aligned
        idx = body.saturating_add(size).saturating_add(size & 1);
    }
    Err(PlaybackError::Decode("no data chunk".into()))
}

/// Return a copy of `wav` with gain and pan applied to its samples.
pub fn apply_gain_pan(wav: &[u8], volume: f32, pan: f32) -> Result<Vec<u8>, PlaybackError> {
    let layout = parse_layout(wav)?;
    if !layout.is_pcm16() {
        return Err(PlaybackError::Decode(format!(
            "unsupported WAV encoding (format {}, {} bits)",
            layout.format, layout.bits_per_sample
        )));
    }
    let samples = &wav[layout.data.clone()];
    let (left, right) = channel_gains(volume, pan);

    match layout.channels {
        1 if pan.abs() > f32::EPSILON => {
            let mut data = Vec::with_capacity(samples.len() * 2);
            for chunk in samples.chunks_exact(2) {
                let s = i16::from_le_bytes([chunk[0], chunk[1]]);
                data.extend_from_slice(&scale(s, left).to_le_bytes());
                data.extend_from_slice(&scale(s, right).to_le_bytes());
            }
            Ok(write_pcm16(2, layout.sample_rate, &data))
        }
        1 => {
            let mut out = wav.to_vec();
            for chunk in out[layout.data.clone()].chunks_exact_mut(2) {
                let s = i16::from_le_bytes([chunk[0], chunk[1]]);
                chunk.copy_from_slice(&scale(s, volume).to_le_bytes());
            }
            Ok(out)
        }
        2 => {
            let mut out = wav.to_vec();
            for frame in out[layout.data.clone()].chunks_exact_mut(4) {
                let l = i16::from_le_bytes([frame[0], frame[1]]);
                let r = i16::from_le_bytes([frame[2], frame[3]]);
                frame[0..2].copy_from_slice(&scale(l, left).to_le_bytes());
                frame[2..4].copy_from_slice(&scale(r, right).to_le_bytes());
            }
            Ok(out)
        }
        n => Err(PlaybackError::Decode(format!("unsupported channel count {}", n))),
    }
}

/// Minimal 44-byte-header PCM16 WAV.
pub fn write_pcm16(channels: u16, sample_rate: u32, data: &[u8]) -> Vec<u8> {
    let block_align = channels * 2;
    let byte_rate = sample_rate * u32::from(block_align);
    let mut out = Vec::with_capacity(44 + data.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    out
}

fn scale(sample: i16, gain: f32) -> i16 {
    (sample as f32 * gain).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}
