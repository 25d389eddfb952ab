use image::{imageops, imageops::FilterType, RgbaImage};

/// One level of a texture's mip chain, tightly packed RGBA8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MipLevel {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl MipLevel {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Whether `pixels` holds exactly `width * height` RGBA texels.
    pub fn is_packed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.pixels.len() == self.width as usize * self.height as usize * 4
    }

    /// RGBA value at `(x, y)`, or `None` outside the level.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = ((y * self.width + x) * 4) as usize;
        let texel = self.pixels.get(start..start + 4)?;
        Some([texel[0], texel[1], texel[2], texel[3]])
    }
}

/// Number of levels in a full chain down to 1×1.
pub fn level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Builds the levels below `base`, halving each axis until both reach 1.
///
/// Returns the base level followed by every reduced level. A base whose pixel
/// buffer does not match its dimensions yields only the base.
pub fn build_chain(base: MipLevel) -> Vec<MipLevel> {
    let count = level_count(base.width, base.height);
    let Some(mut current) = RgbaImage::from_raw(base.width, base.height, base.pixels.clone())
    else {
        return vec![base];
    };

    let mut levels = Vec::with_capacity(count as usize);
    levels.push(base);
    for _ in 1..count {
        let width = (current.width() / 2).max(1);
        let height = (current.height() / 2).max(1);
        current = imageops::resize(&current, width, height, FilterType::Triangle);
        levels.push(MipLevel::new(width, height, current.as_raw().clone()));
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_count_covers_largest_axis() {
        assert_eq!(level_count(1, 1), 1);
        assert_eq!(level_count(2, 1), 2);
        assert_eq!(level_count(256, 64), 9);
        assert_eq!(level_count(300, 2), 9);
    }

    #[test]
    fn chain_halves_down_to_one_pixel() {
        let base = MipLevel::new(4, 2, vec![128; 4 * 2 * 4]);
        let chain = build_chain(base);
        let sizes: Vec<_> = chain.iter().map(|l| (l.width, l.height)).collect();
        assert_eq!(sizes, vec![(4, 2), (2, 1), (1, 1)]);
        assert_eq!(chain[2].pixel(0, 0), Some([128, 128, 128, 128]));
    }

    #[test]
    fn mismatched_buffer_keeps_base_only() {
        let chain = build_chain(MipLevel::new(4, 4, vec![0; 3]));
        assert_eq!(chain.len(), 1);
    }
}
