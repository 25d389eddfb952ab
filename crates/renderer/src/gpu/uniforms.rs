use super::UniformValue;

/// std140 blocks are sized in multiples of a vec4.
const BLOCK_ALIGN: usize = 16;

/// CPU copy of a program's uniform block.
///
/// Writes land at the byte offsets reflected at link time and the whole
/// block is uploaded before each draw.
#[derive(Debug, Clone)]
pub(crate) struct UniformStaging {
    bytes: Vec<u8>,
}

impl UniformStaging {
    pub fn new(block_size: u32) -> Self {
        let size = (block_size as usize)
            .max(BLOCK_ALIGN)
            .next_multiple_of(BLOCK_ALIGN);
        Self {
            bytes: vec![0; size],
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Encodes `value` at `offset`. Writes past the end of the block are
    /// dropped and reported as `false`.
    pub fn write(&mut self, offset: u32, value: UniformValue) -> bool {
        let mut scratch = [0u8; 8];
        let encoded: &[u8] = match value {
            UniformValue::Float(v) => {
                scratch[..4].copy_from_slice(bytemuck::bytes_of(&v));
                &scratch[..4]
            }
            UniformValue::Int(v) => {
                scratch[..4].copy_from_slice(bytemuck::bytes_of(&v));
                &scratch[..4]
            }
            UniformValue::Vec2(v) => {
                scratch.copy_from_slice(bytemuck::bytes_of(&v));
                &scratch
            }
        };
        let start = offset as usize;
        match self.bytes.get_mut(start..start + encoded.len()) {
            Some(target) => {
                target.copy_from_slice(encoded);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_rounds_up_to_vec4() {
        assert_eq!(UniformStaging::new(0).size(), 16);
        assert_eq!(UniformStaging::new(36).size(), 48);
        assert_eq!(UniformStaging::new(48).size(), 48);
    }

    #[test]
    fn writes_land_at_offsets() {
        let mut staging = UniformStaging::new(36);
        assert!(staging.write(8, UniformValue::Vec2([0.5, 0.25])));
        assert!(staging.write(28, UniformValue::Int(1)));
        let bytes = staging.as_bytes();
        assert_eq!(&bytes[8..12], &0.5f32.to_ne_bytes());
        assert_eq!(&bytes[12..16], &0.25f32.to_ne_bytes());
        assert_eq!(&bytes[28..32], &1i32.to_ne_bytes());
        assert!(!staging.write(44, UniformValue::Vec2([1.0, 1.0])));
    }
}
