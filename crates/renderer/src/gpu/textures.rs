use std::collections::HashMap;

use wgpu::util::{DeviceExt, TextureDataOrder};

use super::mipmaps::MipLevel;
use super::TextureId;

const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub(crate) struct GpuTexture {
    pub view: wgpu::TextureView,
    /// Bumped whenever `view` is replaced so cached bind groups go stale.
    pub generation: u64,
    texture: wgpu::Texture,
}

impl GpuTexture {
    fn replace(&mut self, texture: wgpu::Texture) {
        self.view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.texture = texture;
        self.generation += 1;
    }
}

/// Texture objects by id, plus the one sampler every texture is read with.
pub(crate) struct TextureTable {
    textures: HashMap<TextureId, GpuTexture>,
    pub sampler: wgpu::Sampler,
}

impl TextureTable {
    pub fn new(device: &wgpu::Device) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("body texture sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self {
            textures: HashMap::new(),
            sampler,
        }
    }

    pub fn get(&self, id: TextureId) -> Option<&GpuTexture> {
        self.textures.get(&id)
    }

    /// Registers `id` with transparent black contents.
    pub fn create(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, id: TextureId) {
        let texture = create_with_levels(device, queue, id, &[MipLevel::new(1, 1, vec![0; 4])]);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.textures.insert(
            id,
            GpuTexture {
                view,
                generation: 0,
                texture,
            },
        );
    }

    /// Replaces the contents of `id` with `levels`, base level first.
    ///
    /// Writes in place when the size and level count are unchanged, otherwise
    /// recreates the texture and bumps its generation.
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        id: TextureId,
        levels: &[MipLevel],
    ) -> bool {
        let Some(entry) = self.textures.get_mut(&id) else {
            return false;
        };
        let Some(base) = levels.first() else {
            return true;
        };
        let size = entry.texture.size();
        let fits = size.width == base.width
            && size.height == base.height
            && entry.texture.mip_level_count() as usize == levels.len();
        if fits {
            for (mip_level, level) in levels.iter().enumerate() {
                queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: &entry.texture,
                        mip_level: mip_level as u32,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    &level.pixels,
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(level.width * 4),
                        rows_per_image: Some(level.height),
                    },
                    extent(level),
                );
            }
        } else {
            entry.replace(create_with_levels(device, queue, id, levels));
        }
        true
    }
}

fn extent(level: &MipLevel) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: level.width,
        height: level.height,
        depth_or_array_layers: 1,
    }
}

fn create_with_levels(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    id: TextureId,
    levels: &[MipLevel],
) -> wgpu::Texture {
    let data: Vec<u8> = levels
        .iter()
        .flat_map(|level| level.pixels.iter().copied())
        .collect();
    device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(&format!("texture #{}", id.0)),
            size: extent(&levels[0]),
            mip_level_count: levels.len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &data,
    )
}
