//! Texture acquisition with asynchronous completion.
//!
//! [`TextureLoader::load`] returns a bindable texture immediately: the object
//! is created and seeded with a single opaque white pixel before a named
//! decode thread is started. The thread decodes the image and builds its mip
//! chain; finished chains come back over a channel and are uploaded by
//! [`TextureSet::pump`] between frames, which keeps the render thread the
//! only writer of texture contents.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, warn};

use crate::gpu::mipmaps::{self, MipLevel};
use crate::gpu::{GraphicsBackend, TextureId};
use crate::types::{CelestialBody, TextureManifest, BODY_COUNT};

/// Content every texture shows until its image is ready.
pub const PLACEHOLDER_PIXEL: [u8; 4] = [255, 255, 255, 255];

/// Tightly packed RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    fn check(&self) -> Result<()> {
        let expected = self.width as usize * self.height as usize * 4;
        if self.width == 0 || self.height == 0 || self.pixels.len() != expected {
            bail!(
                "decoded image is {}x{} but carries {} bytes",
                self.width,
                self.height,
                self.pixels.len()
            );
        }
        Ok(())
    }
}

/// Produces decoded pixels for an image identifier. Called off the render
/// thread and allowed to block.
pub trait ImageSource: Send + Sync {
    fn fetch(&self, id: &str) -> Result<DecodedImage>;
}

/// Resolves identifiers as paths below a root directory.
#[derive(Debug, Clone)]
pub struct FileImageSource {
    root: PathBuf,
}

impl FileImageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ImageSource for FileImageSource {
    fn fetch(&self, id: &str) -> Result<DecodedImage> {
        let path = self.root.join(id);
        let image = image::open(&path)
            .with_context(|| format!("failed to open texture at {}", path.display()))?;
        let rgba = image.to_rgba8();
        Ok(DecodedImage {
            width: rgba.width(),
            height: rgba.height(),
            pixels: rgba.into_raw(),
        })
    }
}

/// Where a texture is in its one-shot load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Placeholder written, no decode running.
    Placeholder,
    /// Placeholder visible, decode in flight.
    Loading,
    /// Decoded image uploaded with its mip chain.
    Ready,
    /// Decode failed; the placeholder stays.
    Failed,
}

/// A bindable texture and the state of its load.
#[derive(Debug, Clone)]
pub struct Texture {
    body: CelestialBody,
    id: TextureId,
    source: String,
    status: LoadStatus,
}

impl Texture {
    pub fn body(&self) -> CelestialBody {
        self.body
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn status(&self) -> LoadStatus {
        self.status
    }
}

struct Completion {
    body: CelestialBody,
    /// Mip chain, base level first.
    result: Result<Vec<MipLevel>, String>,
}

/// Starts texture loads and receives their completions.
pub struct TextureLoader {
    images: Arc<dyn ImageSource>,
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
    spawned: usize,
}

impl TextureLoader {
    pub fn new(images: Arc<dyn ImageSource>) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            images,
            sender,
            receiver,
            spawned: 0,
        }
    }

    /// Creates the texture for `body`, seeds the placeholder and starts
    /// decoding `source`. Never blocks on the decode.
    pub fn load<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        body: CelestialBody,
        source: &str,
    ) -> Texture {
        let id = backend.create_texture();
        backend.upload_texture(id, 1, 1, &PLACEHOLDER_PIXEL);
        let mut texture = Texture {
            body,
            id,
            source: source.to_string(),
            status: LoadStatus::Placeholder,
        };

        let images = Arc::clone(&self.images);
        let sender = self.sender.clone();
        let image_id = texture.source.clone();
        let spawned = thread::Builder::new()
            .name(format!("orrery-decode-{}", self.spawned))
            .spawn(move || {
                let result = images
                    .fetch(&image_id)
                    .and_then(|image| image.check().map(|()| image))
                    .map(|image| {
                        let base = MipLevel::new(image.width, image.height, image.pixels);
                        mipmaps::build_chain(base)
                    })
                    .map_err(|err| format!("{err:#}"));
                // The receiver is gone once the renderer is dropped.
                let _ = sender.send(Completion { body, result });
            });
        self.spawned += 1;

        match spawned {
            Ok(_) => texture.status = LoadStatus::Loading,
            Err(error) => {
                warn!(%body, source, %error, "failed to start texture decode; keeping placeholder");
                texture.status = LoadStatus::Failed;
            }
        }
        texture
    }
}

/// The ten body textures in unit order, plus the loader feeding them.
pub struct TextureSet {
    loader: TextureLoader,
    textures: Vec<Texture>,
}

impl TextureSet {
    /// Starts a load for every body in `manifest`.
    pub fn load_all<B: GraphicsBackend>(
        backend: &mut B,
        images: Arc<dyn ImageSource>,
        manifest: &TextureManifest,
    ) -> Self {
        let mut loader = TextureLoader::new(images);
        let textures = manifest
            .iter()
            .map(|(body, source)| loader.load(backend, body, source))
            .collect();
        Self { loader, textures }
    }

    pub fn get(&self, body: CelestialBody) -> &Texture {
        &self.textures[body.unit() as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Texture> {
        self.textures.iter()
    }

    /// Number of textures still waiting on their decode.
    pub fn pending(&self) -> usize {
        self.textures
            .iter()
            .filter(|texture| texture.status == LoadStatus::Loading)
            .count()
    }

    /// Applies every completion received so far. Returns how many were applied.
    pub fn pump<B: GraphicsBackend>(&mut self, backend: &mut B) -> usize {
        let completions: Vec<_> = self.loader.receiver.try_iter().collect();
        let applied = completions.len();
        for completion in completions {
            self.apply(backend, completion);
        }
        applied
    }

    /// Blocks until no load is pending or `timeout` passes. Returns whether
    /// every load settled.
    pub fn wait_for_loads<B: GraphicsBackend>(&mut self, backend: &mut B, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.pending() > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.loader.receiver.recv_timeout(remaining) {
                Ok(completion) => self.apply(backend, completion),
                Err(_) => return false,
            }
        }
        true
    }

    fn apply<B: GraphicsBackend>(&mut self, backend: &mut B, completion: Completion) {
        debug_assert_eq!(self.textures.len(), BODY_COUNT);
        let texture = &mut self.textures[completion.body.unit() as usize];
        if texture.status != LoadStatus::Loading {
            return;
        }
        match completion.result {
            Ok(levels) => {
                backend.upload_mip_chain(texture.id, &levels);
                texture.status = LoadStatus::Ready;
                let (width, height) = levels
                    .first()
                    .map_or((0, 0), |base| (base.width, base.height));
                debug!(
                    body = %texture.body,
                    source = %texture.source,
                    width,
                    height,
                    levels = levels.len(),
                    "texture ready"
                );
            }
            Err(error) => {
                texture.status = LoadStatus::Failed;
                warn!(
                    body = %texture.body,
                    source = %texture.source,
                    %error,
                    "texture decode failed; keeping placeholder"
                );
            }
        }
    }
}
