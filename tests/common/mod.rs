#![allow(dead_code)]

use multishot::{
    config::SoundSettings,
    encoder::frames::{DiskSpace, VolumeSpace},
    host::{
        Host, MappedTexture, ResourceHandle, ResourceUsage, TechniqueHandle, TextureDesc,
        TextureFormat, TextureHandle,
    },
    CaptureSession,
};
use std::{
    collections::HashSet,
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

pub const VK_SHIFT: u32 = 0x10;
pub const VK_CONTROL: u32 = 0x11;
pub const VK_SNAPSHOT: u32 = 0x2C;
pub const VK_A: u32 = 0x41;
pub const VK_F11: u32 = 0x7A;

const DEPTH_TECHNIQUE: TechniqueHandle = TechniqueHandle(7);
const DEPTH_TEXTURE: TextureHandle = TextureHandle(8);
const DEPTH_RESOURCE: ResourceHandle = ResourceHandle(9);
const STAGING: ResourceHandle = ResourceHandle(10);

/// A scripted renderer.
pub struct FakeHost {
    pub size: (u32, u32),
    pub base: PathBuf,
    pub preset: Option<PathBuf>,
    pub effects: bool,
    pub pressed: HashSet<u32>,
    pub down: HashSet<u32>,
    pub text_input: bool,
    pub concurrency: usize,
    pub fail_screenshot: bool,

    /// Depth values, `None` if the depth effect is not loaded.
    pub depth: Option<Vec<f32>>,
    pub depth_format: TextureFormat,
    pub depth_row_padding: usize,
    pub depth_enabled: bool,
    mapped: Vec<u8>,

    pub screenshots: usize,
    pub exported: Vec<PathBuf>,
    pub sounds: Vec<bool>,
    pub stopped_sounds: usize,
    pub live_staging: usize,
}

impl FakeHost {
    pub fn new(base: &Path) -> Self {
        Self {
            size: (4, 2),
            base: base.to_owned(),
            preset: Some(base.join("Sharp.ini")),
            effects: true,
            pressed: HashSet::new(),
            down: HashSet::new(),
            text_input: false,
            concurrency: 4,
            fail_screenshot: false,
            depth: None,
            depth_format: TextureFormat::R32Float,
            depth_row_padding: 0,
            depth_enabled: false,
            mapped: Vec::new(),
            screenshots: 0,
            exported: Vec::new(),
            sounds: Vec::new(),
            stopped_sounds: 0,
            live_staging: 0,
        }
    }

    pub fn with_depth(mut self) -> Self {
        let (width, height) = self.size;
        self.depth = Some(
            (0..width * height)
                .map(|i| i as f32 / (width * height) as f32)
                .collect(),
        );
        self
    }

    /// Runs every hook of one frame, with `keys` pressed during it.
    pub fn frame(&mut self, session: &mut CaptureSession, keys: &[u32]) {
        self.pressed = keys.iter().copied().collect();
        if self.effects {
            session.on_begin_effects(self);
            session.on_finish_effects(self);
        }
        session.on_overlay(self);
        session.on_present(self);
        self.pressed.clear();
    }

    pub fn frames(&mut self, session: &mut CaptureSession, count: usize) {
        for _ in 0..count {
            self.frame(session, &[]);
        }
    }
}

impl Host for FakeHost {
    fn screenshot_size(&self) -> (u32, u32) {
        self.size
    }

    fn capture_screenshot(&mut self, pixels: &mut [u8]) -> bool {
        if self.fail_screenshot {
            return false;
        }
        self.screenshots += 1;
        for (i, byte) in pixels.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        true
    }

    fn effects_enabled(&self) -> bool {
        self.effects
    }

    fn set_effects_enabled(&mut self, enabled: bool) {
        self.effects = enabled;
    }

    fn find_technique(&self, _effect: &str, _name: &str) -> Option<TechniqueHandle> {
        self.depth.as_ref().map(|_| DEPTH_TECHNIQUE)
    }

    fn technique_enabled(&self, _technique: TechniqueHandle) -> bool {
        self.depth_enabled
    }

    fn set_technique_enabled(&mut self, _technique: TechniqueHandle, enabled: bool) {
        self.depth_enabled = enabled;
    }

    fn find_texture(&self, _effect: &str, _name: &str) -> Option<TextureHandle> {
        self.depth.as_ref().map(|_| DEPTH_TEXTURE)
    }

    fn texture_resource(&self, _texture: TextureHandle) -> Option<ResourceHandle> {
        Some(DEPTH_RESOURCE)
    }

    fn resource_desc(&self, _resource: ResourceHandle) -> TextureDesc {
        TextureDesc {
            width: self.size.0,
            height: self.size.1,
            format: self.depth_format,
        }
    }

    fn create_staging_texture(&mut self, _desc: &TextureDesc) -> Option<ResourceHandle> {
        self.live_staging += 1;
        Some(STAGING)
    }

    fn destroy_resource(&mut self, _resource: ResourceHandle) {
        self.live_staging -= 1;
    }

    fn barrier(&mut self, _resource: ResourceHandle, _from: ResourceUsage, _to: ResourceUsage) {}

    fn copy_texture(&mut self, _source: ResourceHandle, _dest: ResourceHandle) {
        let width = self.size.0 as usize;
        let padding = self.depth_row_padding;
        self.mapped = self
            .depth
            .iter()
            .flatten()
            .collect::<Vec<_>>()
            .chunks(width)
            .flat_map(|row| {
                row.iter()
                    .flat_map(|value| value.to_ne_bytes())
                    .chain(std::iter::repeat(0xAB).take(padding))
                    .collect::<Vec<_>>()
            })
            .collect();
    }

    fn wait_idle(&mut self) {}

    fn map_texture(&mut self, _resource: ResourceHandle) -> Option<MappedTexture<'_>> {
        Some(MappedTexture {
            data: &self.mapped,
            row_pitch: self.size.0 as usize * 4 + self.depth_row_padding,
        })
    }

    fn unmap_texture(&mut self, _resource: ResourceHandle) {}

    fn is_key_down(&self, key: u32) -> bool {
        self.down.contains(&key) || self.pressed.contains(&key)
    }

    fn is_key_pressed(&self, key: u32) -> bool {
        self.pressed.contains(&key)
    }

    fn is_text_input_active(&self) -> bool {
        self.text_input
    }

    fn base_path(&self) -> PathBuf {
        self.base.clone()
    }

    fn preset_path(&self) -> Option<PathBuf> {
        self.preset.clone()
    }

    fn executable_path(&self) -> Option<PathBuf> {
        Some(PathBuf::from("/opt/game/Game.exe"))
    }

    fn export_preset(&mut self, path: &Path) -> bool {
        self.exported.push(path.to_owned());
        std::fs::write(path, "[preset]\n").is_ok()
    }

    fn play_sound(&mut self, _sound: &SoundSettings, looping: bool) {
        self.sounds.push(looping);
    }

    fn stop_sound(&mut self) {
        self.stopped_sounds += 1;
    }

    fn hardware_concurrency(&self) -> usize {
        self.concurrency
    }
}

/// A volume with fixed free and total sizes.
pub struct FixedSpace(pub VolumeSpace);

impl DiskSpace for FixedSpace {
    fn query(&self, _path: &Path) -> io::Result<VolumeSpace> {
        Ok(self.0)
    }
}

/// Keeps presenting idle frames until every queued job of `session` was written.
pub fn wait_for_writers(host: &mut FakeHost, session: &mut CaptureSession) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let status = session.status();
        if status.queued == 0 && status.active_workers == 0 {
            return;
        }
        assert!(Instant::now() < deadline, "writers did not finish: {status:?}");
        thread::sleep(Duration::from_millis(5));
        session.on_present(host);
    }
}

/// Sorted file names below `dir`, recursively, relative to it.
pub fn files(dir: &Path) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_owned()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(
                    path.strip_prefix(dir)
                        .unwrap()
                        .to_string_lossy()
                        .replace('\\', "/"),
                );
            }
        }
    }
    out.sort();
    out
}
