//! The boundary to the rendering runtime that drives a capture session.
//!
//! A host calls into [`CaptureSession`](crate::CaptureSession) from its render thread at
//! fixed points of every frame and exposes the GPU, keyboard and file operations the
//! session needs through the [`Host`] trait.

use crate::config::SoundSettings;
use std::path::{Path, PathBuf};

/// Opaque handle to an effect technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TechniqueHandle(pub u64);

/// Opaque handle to an effect texture variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Opaque handle to a GPU resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle(pub u64);

/// Pixel format of a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGBA, unsigned normalized.
    Rgba8Unorm,
    /// 8-bit BGRA, unsigned normalized.
    Bgra8Unorm,
    /// Single 32-bit float channel.
    R32Float,
    /// Any other format, by its host specific code.
    Other(u32),
}

impl TextureFormat {
    /// Bytes per pixel, if the format has a fixed size.
    pub fn pixel_size(self) -> Option<usize> {
        match self {
            TextureFormat::Rgba8Unorm | TextureFormat::Bgra8Unorm | TextureFormat::R32Float => {
                Some(4)
            }
            TextureFormat::Other(_) => None,
        }
    }
}

/// Size and format of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format.
    pub format: TextureFormat,
}

/// State a resource is in for the purpose of barriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceUsage {
    /// Bound for sampling by shaders.
    ShaderResource,
    /// Source of a copy.
    CopySource,
    /// Destination of a copy.
    CopyDest,
}

/// A CPU view of a mapped texture. Rows may be padded beyond `width * pixel_size`.
#[derive(Debug)]
pub struct MappedTexture<'a> {
    /// Mapped bytes, `row_pitch * height` long.
    pub data: &'a [u8],
    /// Distance in bytes between the start of two rows.
    pub row_pitch: usize,
}

/// Operations a rendering runtime exposes to a capture session.
///
/// Every method is called on the render thread.
pub trait Host {
    /// Dimensions of the frame [`capture_screenshot`](Host::capture_screenshot) returns.
    fn screenshot_size(&self) -> (u32, u32);

    /// Copies the current back buffer as RGBA8 into `pixels`, which is
    /// `width * height * 4` bytes long. Returns `false` on failure.
    fn capture_screenshot(&mut self, pixels: &mut [u8]) -> bool;

    /// Whether the effect chain is enabled.
    fn effects_enabled(&self) -> bool;

    /// Enables or disables the effect chain.
    fn set_effects_enabled(&mut self, enabled: bool);

    /// Looks up a technique by effect file and name.
    fn find_technique(&self, effect: &str, name: &str) -> Option<TechniqueHandle>;

    /// Whether a technique is enabled.
    fn technique_enabled(&self, technique: TechniqueHandle) -> bool;

    /// Enables or disables a technique.
    fn set_technique_enabled(&mut self, technique: TechniqueHandle, enabled: bool);

    /// Looks up a texture variable by effect file and name.
    fn find_texture(&self, effect: &str, name: &str) -> Option<TextureHandle>;

    /// The resource currently bound to a texture variable.
    fn texture_resource(&self, texture: TextureHandle) -> Option<ResourceHandle>;

    /// Size and format of a resource.
    fn resource_desc(&self, resource: ResourceHandle) -> TextureDesc;

    /// Creates a CPU readable texture that can be the destination of a copy.
    fn create_staging_texture(&mut self, desc: &TextureDesc) -> Option<ResourceHandle>;

    /// Destroys a resource created by [`create_staging_texture`](Host::create_staging_texture).
    fn destroy_resource(&mut self, resource: ResourceHandle);

    /// Records a transition of `resource` on the immediate command list.
    fn barrier(&mut self, resource: ResourceHandle, from: ResourceUsage, to: ResourceUsage);

    /// Records a full texture copy on the immediate command list.
    fn copy_texture(&mut self, source: ResourceHandle, dest: ResourceHandle);

    /// Blocks until the command queue is idle.
    fn wait_idle(&mut self);

    /// Maps a staging texture for reading.
    fn map_texture(&mut self, resource: ResourceHandle) -> Option<MappedTexture<'_>>;

    /// Unmaps a texture mapped by [`map_texture`](Host::map_texture).
    fn unmap_texture(&mut self, resource: ResourceHandle);

    /// Whether `key` is currently held.
    fn is_key_down(&self, key: u32) -> bool;

    /// Whether `key` went down this frame.
    fn is_key_pressed(&self, key: u32) -> bool;

    /// Whether a text input widget has keyboard focus.
    fn is_text_input_active(&self) -> bool {
        false
    }

    /// Directory relative output paths resolve against.
    fn base_path(&self) -> PathBuf;

    /// Path of the preset currently in use.
    fn preset_path(&self) -> Option<PathBuf>;

    /// Path of the host executable.
    fn executable_path(&self) -> Option<PathBuf> {
        std::env::current_exe().ok()
    }

    /// Writes the current preset to `path`. Returns `false` on failure.
    fn export_preset(&mut self, path: &Path) -> bool;

    /// Plays a notification sound.
    fn play_sound(&mut self, _sound: &SoundSettings, _looping: bool) {}

    /// Stops a looping notification sound.
    fn stop_sound(&mut self) {}

    /// Number of hardware threads, the default worker budget.
    fn hardware_concurrency(&self) -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Host facts a frame job carries so it can name its files off the render thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    /// Directory relative output paths resolve against.
    pub base_path: PathBuf,
    /// Path of the host executable.
    pub executable_path: Option<PathBuf>,
    /// Path of the preset in use when the set was activated.
    pub preset_path: Option<PathBuf>,
}

impl Environment {
    /// Reads the environment from the host.
    pub fn from_host<H: Host + ?Sized>(host: &H) -> Self {
        Self {
            base_path: host.base_path(),
            executable_path: host.executable_path(),
            preset_path: host.preset_path(),
        }
    }

    /// File stem of the executable, the `<APP>` macro.
    pub fn app_name(&self) -> String {
        stem(self.executable_path.as_deref())
    }

    /// File stem of the preset, the `<PRESET>` macro.
    pub fn preset_name(&self) -> String {
        stem(self.preset_path.as_deref())
    }
}

fn stem(path: Option<&Path>) -> String {
    path.and_then(Path::file_stem)
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
