//! Texture decoders (component B).
//!
//! Each color format is exposed as a lazy iterator over `(r, g, b, a)`
//! tuples built on top of [`BitReader`]. The bit schedules below look odd
//! in places (a 3+2 split for what should be a 5-bit green channel, a
//! bitwise AND where OR reads more plausible) - they are preserved exactly
//! as observed in the source this was reverse engineered from; see §4.2 and
//! §9 of the design notes before "fixing" any of them.

use crate::bitreader::BitReader;
use crate::{Error, Result};

/// One decoded RGBA8 color.
pub type Rgba = (u8, u8, u8, u8);

/// Texture pixel-data formats found in a model's texture table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureType {
    /// 4-bit color-indexed, 16-entry RGB555A1 palette.
    Ci4,
    /// 8-bit color-indexed, 256-entry RGB555A1 palette.
    Ci8,
    /// Direct RGB555A1 pixels, 2 bytes each.
    Rgba16,
    /// Direct RGBA8888 pixels, 4 bytes each.
    Rgba32,
    /// Direct 8-bit intensity/alpha pixels.
    Ia8,
}

impl TextureType {
    /// Parse the `u16` texture type field from a texture subheader.
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(Self::Ci4),
            2 => Some(Self::Ci8),
            4 => Some(Self::Rgba16),
            8 => Some(Self::Rgba32),
            16 => Some(Self::Ia8),
            _ => None,
        }
    }

    /// Byte length of a texture's pixel data given its dimensions (§3).
    pub fn data_length(self, width: u8, height: u8) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            Self::Ci4 => 32 + (w * h) / 2,
            Self::Ci8 => 512 + w * h,
            Self::Rgba16 => w * h * 2,
            Self::Rgba32 => w * h * 4,
            Self::Ia8 => w * h,
        }
    }
}

/// Iterator adapter shared by every `iter_colors_*` function: runs a
/// closure that pulls one color off a [`BitReader`], `count` times.
struct ColorIter<'a, F> {
    reader: BitReader<'a>,
    remaining: usize,
    next_color: F,
}

impl<F> Iterator for ColorIter<'_, F>
where
    F: FnMut(&mut BitReader<'_>) -> Rgba,
{
    type Item = Rgba;

    fn next(&mut self) -> Option<Rgba> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some((self.next_color)(&mut self.reader))
    }
}

/// RGB555A1: 5|3|2|5|1 layout (direct pixels and palette entries).
///
/// The green channel is reconstituted from a 3-bit and a 2-bit field
/// rather than a canonical 5-bit field; this is intentional (§4.2, §9).
pub fn iter_colors_rgb555a1(data: &[u8], count: usize) -> impl Iterator<Item = Rgba> + '_ {
    ColorIter {
        reader: BitReader::new(data),
        remaining: count,
        next_color: |r: &mut BitReader<'_>| {
            let red = r.read_sub(5).unwrap() * 8;
            let green_hi = r.read_sub(3).unwrap();
            let green_lo = r.read_sub(2).unwrap();
            let blue = r.read_sub(5).unwrap() * 8;
            let alpha = r.read_sub(1).unwrap() * 0xFF;
            let green = ((green_hi << 2) | green_lo) * 8;
            (red, green, blue, alpha)
        },
    }
}

/// RGB5A3: leading bit selects a 3a|4r|4g|4b translucent form (0) or an
/// opaque 5r|2g|3g|5b form (1).
///
/// The opaque branch recombines green with a bitwise AND where OR would be
/// the obvious choice - faithfully reproduced, flagged as a likely bug in
/// §9 rather than silently corrected.
pub fn iter_colors_rgb5a3(data: &[u8], count: usize) -> impl Iterator<Item = Rgba> + '_ {
    ColorIter {
        reader: BitReader::new(data),
        remaining: count,
        next_color: |r: &mut BitReader<'_>| {
            if r.read_sub(1).unwrap() == 0 {
                let alpha = r.read_sub(3).unwrap() * 0x20;
                let red = r.read_sub(4).unwrap() * 0x11;
                let green = r.read_sub(4).unwrap() * 0x11;
                let blue = r.read_sub(4).unwrap() * 0x11;
                (red, green, blue, alpha)
            } else {
                let red = r.read_sub(5).unwrap() * 8;
                let green1 = r.read_sub(2).unwrap();
                let green2 = r.read_sub(3).unwrap();
                let blue = r.read_sub(5).unwrap() * 8;
                let green = ((green1 << 3) & green2) * 8;
                (red, green, blue, 255)
            }
        },
    }
}

/// IA8: one 8-bit intensity/alpha value replicated across all four channels.
pub fn iter_colors_ia8(data: &[u8], count: usize) -> impl Iterator<Item = Rgba> + '_ {
    ColorIter {
        reader: BitReader::new(data),
        remaining: count,
        next_color: |r: &mut BitReader<'_>| {
            let v = r.read_sub(8).unwrap();
            (v, v, v, v)
        },
    }
}

/// Read a 16-entry RGB555A1 palette (used by [`TextureType::Ci4`]).
pub fn read_palette_rgb555a1(data: &[u8]) -> Vec<Rgba> {
    iter_colors_rgb555a1(data, 16).collect()
}

/// Read a 256-entry RGB555A1 palette (used by [`TextureType::Ci8`]).
pub fn read_palette_rgb555a1_256(data: &[u8]) -> Vec<Rgba> {
    iter_colors_rgb555a1(data, 256).collect()
}

/// Decode a texture's raw pixel data to RGBA8, row-major, row 0 first.
///
/// Unsupported/unmodeled formats never reach here: [`TextureType::from_raw`]
/// already filters those out at parse time (§7, *UnknownTextureType*).
pub fn decode(ty: TextureType, data: &[u8], width: u8, height: u8) -> Result<Vec<Rgba>> {
    let pixel_count = width as usize * height as usize;
    match ty {
        TextureType::Ci4 => {
            let palette = read_palette_rgb555a1(data);
            let indices = data.get(32..).ok_or(Error::TruncatedTexture)?;
            let mut reader = BitReader::new(indices);
            let mut out = Vec::with_capacity(pixel_count);
            for _ in 0..pixel_count {
                let idx = reader.read_sub(4)? as usize;
                out.push(palette[idx]);
            }
            Ok(out)
        }
        TextureType::Ci8 => {
            let palette = read_palette_rgb555a1_256(data);
            let indices = data.get(512..).ok_or(Error::TruncatedTexture)?;
            let mut out = Vec::with_capacity(pixel_count);
            for &idx in indices.iter().take(pixel_count) {
                out.push(palette[idx as usize]);
            }
            Ok(out)
        }
        TextureType::Rgba16 => Ok(iter_colors_rgb555a1(data, pixel_count).collect()),
        TextureType::Ia8 => Ok(iter_colors_ia8(data, pixel_count).collect()),
        TextureType::Rgba32 => {
            let mut out = Vec::with_capacity(pixel_count);
            for chunk in data.chunks_exact(4).take(pixel_count) {
                out.push((chunk[0], chunk[1], chunk[2], chunk[3]));
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ci4_round_trip_matches_palette() {
        // 16-entry RGB555A1 palette: color i is (i*2, i*2, i*2, 255-ish),
        // packed 5|3|2|5|1 per entry, 2 bytes each, big-endian bit order.
        let mut palette_bytes = Vec::new();
        let mut palette_colors = Vec::new();
        for i in 0u16..16 {
            // red=i, green_hi=i&0b111, green_lo=i&0b11, blue=i, alpha=1
            let red = i & 0b11111;
            let green_hi = i & 0b111;
            let green_lo = i & 0b11;
            let blue = i & 0b11111;
            let alpha = 1u16;
            let packed = (red << 11) | (green_hi << 8) | (green_lo << 6) | (blue << 1) | alpha;
            palette_bytes.extend_from_slice(&packed.to_be_bytes());

            let r = (red as u8) * 8;
            let g = (((green_hi as u8) << 2) | green_lo as u8) * 8;
            let b = (blue as u8) * 8;
            palette_colors.push((r, g, b, 255u8));
        }

        // 4x4 image; indices count up then repeat the last value.
        let mut index_nibbles = vec![];
        for i in 0u8..16 {
            index_nibbles.push(i.min(15));
        }
        let mut index_bytes = Vec::new();
        for pair in index_nibbles.chunks(2) {
            index_bytes.push((pair[0] << 4) | pair[1]);
        }

        let mut data = palette_bytes;
        data.extend_from_slice(&index_bytes);

        let decoded = decode(TextureType::Ci4, &data, 4, 4).unwrap();
        assert_eq!(decoded[0], palette_colors[0]);
        assert_eq!(decoded[1], palette_colors[1]);
        assert_eq!(decoded[15], palette_colors[15]);
    }

    #[test]
    fn rgb5a3_opaque_branch_preserves_source_and_quirk() {
        // leading bit = 1 (opaque branch); red=0b10101, g1=0b11, g2=0b101, blue=0b01010
        let value: u16 = (1 << 15) | (0b10101 << 10) | (0b11 << 8) | (0b101 << 5) | 0b01010;
        let colors: Vec<Rgba> = iter_colors_rgb5a3(&value.to_be_bytes(), 1).collect();
        let (r, g, b, a) = colors[0];
        let (green1, green2): (u8, u8) = (0b11, 0b101);
        assert_eq!(r, 0b10101 * 8);
        assert_eq!(g, ((green1 << 3) & green2) * 8);
        assert_eq!(b, 0b01010 * 8);
        assert_eq!(a, 255);
    }

    #[test]
    fn ia8_replicates_across_channels() {
        let data = [0x42u8];
        let (r, g, b, a) = iter_colors_ia8(&data, 1).next().unwrap();
        assert_eq!((r, g, b, a), (0x42, 0x42, 0x42, 0x42));
    }
}
