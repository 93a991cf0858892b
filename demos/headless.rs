use multishot::{
    config::{CaptureConfig, CaptureSet, Hotkey, ImageFormat, KindOutput},
    host::{
        Host, MappedTexture, ResourceHandle, ResourceUsage, TechniqueHandle, TextureDesc,
        TextureFormat, TextureHandle,
    },
    Sessions, StatisticsStore,
};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};
use tracing_subscriber::EnvFilter;

const WIDTH: u32 = 256;
const HEIGHT: u32 = 256;
const VK_SNAPSHOT: u32 = 0x2C;

const DEPTH: TechniqueHandle = TechniqueHandle(1);
const DEPTH_TEXTURE: TextureHandle = TextureHandle(2);
const DEPTH_RESOURCE: ResourceHandle = ResourceHandle(3);
const STAGING: ResourceHandle = ResourceHandle(4);

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Create the captures directory
    let base = PathBuf::from("captures/headless");
    fs::create_dir_all(&base).unwrap();

    // Burst of 8 frames, every 4th frame, after effects plus overlay plus depth
    let mut set = CaptureSet::new("burst");
    set.hotkey = Hotkey::new(VK_SNAPSHOT);
    set.repeat_count = 8;
    set.repeat_interval = 4;
    set.worker_threads = 2;
    set.outputs.after = KindOutput::new("<APP>/<DATE:%Y%m%d_%H%M%S>_<INDEX:D2>_after");
    set.outputs.overlay = KindOutput::new("<APP>/<DATE:%Y%m%d_%H%M%S>_<INDEX:D2>_overlay");
    set.outputs.depth = KindOutput::new("<APP>/<DATE:%Y%m%d_%H%M%S>_<INDEX:D2>_depth");
    set.outputs.preset = KindOutput::new("<APP>/<PRESET>_<MYSETTAKE>");
    set.encoder.image_format = ImageFormat::FastPngRgb;

    let mut config = CaptureConfig::default();
    config.sets.push(set);

    let statistics = Arc::new(StatisticsStore::open(base.join("statistics.json")).unwrap());
    let mut host = SimulatedHost::new(base);
    let mut sessions = Sessions::new();
    sessions.attach(0, &mut host, config, statistics);

    for frame in 0..60 {
        host.frame = frame;

        // Press the hotkey once the scene settled
        host.pressed = frame == 10;

        let session = sessions.get_mut(&0).unwrap();
        session.on_begin_effects(&mut host);
        session.on_finish_effects(&mut host);
        session.on_overlay(&mut host);
        session.on_present(&mut host);

        if session.should_show_status() {
            let status = session.status();
            tracing::info!(
                "{:?}: {}/{} frames, {} queued, {} writing",
                status.active_set,
                status.repeat_index,
                status.repeat_count,
                status.queued,
                status.active_workers
            );
        }

        thread::sleep(Duration::from_millis(16));
    }

    // Detaching blocks until every queued frame was written
    drop(sessions.detach(&0));
}

/// A renderer drawing a moving square over a gradient.
struct SimulatedHost {
    base: PathBuf,
    frame: u32,
    pressed: bool,
    depth_enabled: bool,
    mapped: Vec<u8>,
}

impl SimulatedHost {
    fn new(base: PathBuf) -> Self {
        Self {
            base,
            frame: 0,
            pressed: false,
            depth_enabled: false,
            mapped: Vec::new(),
        }
    }

    fn square_contains(&self, x: u32, y: u32) -> bool {
        let left = (self.frame * 3) % (WIDTH - 64);
        (left..left + 64).contains(&x) && (96..160).contains(&y)
    }
}

impl Host for SimulatedHost {
    fn screenshot_size(&self) -> (u32, u32) {
        (WIDTH, HEIGHT)
    }

    fn capture_screenshot(&mut self, pixels: &mut [u8]) -> bool {
        for (i, pixel) in pixels.chunks_exact_mut(4).enumerate() {
            let (x, y) = (i as u32 % WIDTH, i as u32 / WIDTH);
            let color = if self.square_contains(x, y) {
                [0, 0, 255, 255]
            } else {
                [x as u8, y as u8, 64, 255]
            };
            pixel.copy_from_slice(&color);
        }
        true
    }

    fn effects_enabled(&self) -> bool {
        true
    }

    fn set_effects_enabled(&mut self, _enabled: bool) {}

    fn find_technique(&self, _effect: &str, _name: &str) -> Option<TechniqueHandle> {
        Some(DEPTH)
    }

    fn technique_enabled(&self, _technique: TechniqueHandle) -> bool {
        self.depth_enabled
    }

    fn set_technique_enabled(&mut self, _technique: TechniqueHandle, enabled: bool) {
        self.depth_enabled = enabled;
    }

    fn find_texture(&self, _effect: &str, _name: &str) -> Option<TextureHandle> {
        Some(DEPTH_TEXTURE)
    }

    fn texture_resource(&self, _texture: TextureHandle) -> Option<ResourceHandle> {
        Some(DEPTH_RESOURCE)
    }

    fn resource_desc(&self, _resource: ResourceHandle) -> TextureDesc {
        TextureDesc {
            width: WIDTH,
            height: HEIGHT,
            format: TextureFormat::R32Float,
        }
    }

    fn create_staging_texture(&mut self, _desc: &TextureDesc) -> Option<ResourceHandle> {
        Some(STAGING)
    }

    fn destroy_resource(&mut self, _resource: ResourceHandle) {}

    fn barrier(&mut self, _resource: ResourceHandle, _from: ResourceUsage, _to: ResourceUsage) {}

    fn copy_texture(&mut self, _source: ResourceHandle, _dest: ResourceHandle) {
        self.mapped = (0..WIDTH * HEIGHT)
            .flat_map(|i| {
                let (x, y) = (i % WIDTH, i / WIDTH);
                let depth = if self.square_contains(x, y) {
                    0.1
                } else {
                    y as f32 / HEIGHT as f32
                };
                f32::to_ne_bytes(depth)
            })
            .collect();
    }

    fn wait_idle(&mut self) {}

    fn map_texture(&mut self, _resource: ResourceHandle) -> Option<MappedTexture<'_>> {
        Some(MappedTexture {
            data: &self.mapped,
            row_pitch: WIDTH as usize * 4,
        })
    }

    fn unmap_texture(&mut self, _resource: ResourceHandle) {}

    fn is_key_down(&self, key: u32) -> bool {
        self.is_key_pressed(key)
    }

    fn is_key_pressed(&self, key: u32) -> bool {
        self.pressed && key == VK_SNAPSHOT
    }

    fn base_path(&self) -> PathBuf {
        self.base.clone()
    }

    fn preset_path(&self) -> Option<PathBuf> {
        Some(PathBuf::from("Headless.ini"))
    }

    fn executable_path(&self) -> Option<PathBuf> {
        Some(PathBuf::from("headless"))
    }

    fn export_preset(&mut self, path: &Path) -> bool {
        fs::write(path, "[headless]\nTechniques=MultishotDepthCapture\n").is_ok()
    }
}
