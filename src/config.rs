//! Capture sets and the document they are persisted in.

use crate::{error::PersistError, CaptureKind};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

const VK_SHIFT: u32 = 0x10;
const VK_CONTROL: u32 = 0x11;
const VK_MENU: u32 = 0x12;

/// The whole user configuration: every capture set plus the global switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Capture sets, in the order their hotkeys are checked.
    pub sets: Vec<CaptureSet>,
    /// When the on-screen status should be drawn.
    pub show_osd: ShowOsd,
    /// Whether activating a set may force the host's effects on.
    pub turn_on_effects: TurnOnEffects,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sets: Vec::new(),
            show_osd: ShowOsd::WhileActive,
            turn_on_effects: TurnOnEffects::Ignore,
        }
    }
}

impl CaptureConfig {
    /// Loads the configuration from `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let mut config: Self = read_json(path.as_ref())?.unwrap_or_default();
        for set in &mut config.sets {
            set.sanitize();
        }
        Ok(config)
    }

    /// Saves the configuration to `path`, replacing the previous file atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        write_json(path.as_ref(), self)
    }

    /// Returns the set with the given name.
    pub fn find(&self, name: &str) -> Option<&CaptureSet> {
        self.sets.iter().find(|set| set.name == name)
    }

    /// Returns the set with the given name for editing.
    pub fn find_mut(&mut self, name: &str) -> Option<&mut CaptureSet> {
        self.sets.iter_mut().find(|set| set.name == name)
    }

    /// Appends a new set with default settings and a name not used by any other set.
    pub fn add_set(&mut self) -> &mut CaptureSet {
        let name = (self.sets.len() + 1..)
            .map(|n| format!("myset{}", n))
            .find(|name| self.find(name).is_none())
            .unwrap_or_default();
        self.sets.push(CaptureSet::new(name));
        let last = self.sets.len() - 1;
        &mut self.sets[last]
    }
}

/// Visibility of the on-screen status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShowOsd {
    /// Never shown.
    Hidden,
    /// Always shown.
    Always,
    /// Shown only while a set is capturing.
    WhileActive,
}

/// Policy for turning the host's effect chain on when a set is activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOnEffects {
    /// Leave the effects state alone.
    Ignore,
    /// Keep effects on while the set is active and restore the previous state afterwards.
    WhileActive,
    /// Turn effects on once when the set is activated.
    WhenActivate,
}

/// A named capture profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSet {
    /// Unique name, also the scope of the per-set statistics.
    pub name: String,
    /// The chord that toggles this set.
    pub hotkey: Hotkey,
    /// Number of capture frames per activation, `0` for unbounded.
    pub repeat_count: u32,
    /// Frames between two capture frames, at least `1`.
    pub repeat_interval: u32,
    /// Maximum number of concurrent writers, `0` for the host's hardware concurrency.
    pub worker_threads: usize,
    /// Output rules per kind.
    pub outputs: KindOutputs,
    /// Encoder parameters shared by every image kind.
    pub encoder: EncoderSettings,
    /// Notification sound.
    pub sound: SoundSettings,
}

impl Default for CaptureSet {
    fn default() -> Self {
        Self::new("myset")
    }
}

impl CaptureSet {
    /// Creates a set with default settings and no enabled kind.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hotkey: Hotkey::default(),
            repeat_count: 1,
            repeat_interval: 60,
            worker_threads: 0,
            outputs: KindOutputs::default(),
            encoder: EncoderSettings::default(),
            sound: SoundSettings::default(),
        }
    }

    /// Clamps fields whose invariants a hand edited file may break.
    pub fn sanitize(&mut self) {
        self.repeat_interval = self.repeat_interval.max(1);
    }

    /// Returns `true` if `kind` has a path and is not muted.
    pub fn is_enabled(&self, kind: CaptureKind) -> bool {
        let output = self.outputs.get(kind);
        !output.path.trim().is_empty() && !output.muted
    }

    /// Returns `true` if any of the given kinds is enabled.
    pub fn any_enabled(&self, kinds: &[CaptureKind]) -> bool {
        kinds.iter().any(|&kind| self.is_enabled(kind))
    }

    /// Estimated memory one capture frame of this set occupies while queued.
    pub fn estimated_frame_bytes(&self, width: u32, height: u32) -> u64 {
        let images = CaptureKind::ALL
            .iter()
            .filter(|kind| kind.is_image() && self.is_enabled(**kind))
            .count() as u64;
        images * 4 * width as u64 * height as u64
    }
}

/// A key plus the modifiers that must be held with it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct Hotkey {
    /// Virtual key code, `0` when unbound.
    pub key: u32,
    /// Control must be down.
    pub ctrl: bool,
    /// Shift must be down.
    pub shift: bool,
    /// Alt must be down.
    pub alt: bool,
}

impl Hotkey {
    /// Creates an unmodified hotkey.
    pub fn new(key: u32) -> Self {
        Self {
            key,
            ..Self::default()
        }
    }

    /// Requires Control.
    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    /// Requires Shift.
    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    /// Requires Alt.
    pub fn with_alt(mut self) -> Self {
        self.alt = true;
        self
    }

    /// Returns `true` if the key was pressed this frame with exactly the configured modifiers.
    pub fn is_pressed(
        &self,
        is_key_pressed: impl Fn(u32) -> bool,
        is_key_down: impl Fn(u32) -> bool,
    ) -> bool {
        self.key != 0
            && is_key_pressed(self.key)
            && is_key_down(VK_CONTROL) == self.ctrl
            && is_key_down(VK_SHIFT) == self.shift
            && is_key_down(VK_MENU) == self.alt
    }
}

impl From<[u32; 4]> for Hotkey {
    fn from([key, ctrl, shift, alt]: [u32; 4]) -> Self {
        Self {
            key,
            ctrl: ctrl != 0,
            shift: shift != 0,
            alt: alt != 0,
        }
    }
}

impl From<Hotkey> for [u32; 4] {
    fn from(hotkey: Hotkey) -> Self {
        [
            hotkey.key,
            hotkey.ctrl as u32,
            hotkey.shift as u32,
            hotkey.alt as u32,
        ]
    }
}

/// Where and whether one kind is written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindOutput {
    /// Path template, relative paths resolve against the host's base directory.
    pub path: String,
    /// Free space floor: `>= 100` is in megabytes, `< 100` is a percentage, `0` disables it.
    pub free_space_limit: u64,
    /// Keeps the path but skips the kind.
    pub muted: bool,
}

impl KindOutput {
    /// Creates an enabled output with no free space floor.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Output rules for every kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct KindOutputs {
    pub original: KindOutput,
    pub before: KindOutput,
    pub after: KindOutput,
    pub overlay: KindOutput,
    pub depth: KindOutput,
    pub preset: KindOutput,
}

impl KindOutputs {
    /// Returns the rules for `kind`.
    pub fn get(&self, kind: CaptureKind) -> &KindOutput {
        match kind {
            CaptureKind::Original => &self.original,
            CaptureKind::Before => &self.before,
            CaptureKind::After => &self.after,
            CaptureKind::Overlay => &self.overlay,
            CaptureKind::Depth => &self.depth,
            CaptureKind::Preset => &self.preset,
        }
    }

    /// Returns the rules for `kind` for editing.
    pub fn get_mut(&mut self, kind: CaptureKind) -> &mut KindOutput {
        match kind {
            CaptureKind::Original => &mut self.original,
            CaptureKind::Before => &mut self.before,
            CaptureKind::After => &mut self.after,
            CaptureKind::Overlay => &mut self.overlay,
            CaptureKind::Depth => &mut self.depth,
            CaptureKind::Preset => &mut self.preset,
        }
    }
}

/// File format of the color kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    /// Tunable PNG encoder, RGB.
    #[default]
    PngRgb,
    /// Tunable PNG encoder, RGBA.
    PngRgba,
    /// Fixed configuration fast PNG encoder, RGB.
    FastPngRgb,
    /// Fixed configuration fast PNG encoder, RGBA.
    FastPngRgba,
    /// TIFF, RGB.
    TiffRgb,
    /// TIFF, RGBA.
    TiffRgba,
}

impl ImageFormat {
    /// Number of channels written for color kinds.
    pub fn channels(self) -> usize {
        match self {
            ImageFormat::PngRgb | ImageFormat::FastPngRgb | ImageFormat::TiffRgb => 3,
            ImageFormat::PngRgba | ImageFormat::FastPngRgba | ImageFormat::TiffRgba => 4,
        }
    }
}

/// zlib strategy for the tunable PNG encoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum CompressionStrategy {
    Default,
    Filtered,
    HuffmanOnly,
    #[default]
    Rle,
    Fixed,
}

/// Set of PNG row filters the tunable encoder may choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PngFilters(pub u8);

impl PngFilters {
    /// No filtering.
    pub const NONE: Self = Self(0x08);
    /// Difference to the left pixel.
    pub const SUB: Self = Self(0x10);
    /// Difference to the pixel above.
    pub const UP: Self = Self(0x20);
    /// Difference to the average of left and above.
    pub const AVG: Self = Self(0x40);
    /// Paeth predictor.
    pub const PAETH: Self = Self(0x80);
    /// Every filter, chosen adaptively per row.
    pub const ALL: Self = Self(0xF8);

    /// Returns `true` if every filter in `other` is part of `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Number of filters in the set.
    pub fn len(self) -> u32 {
        (self.0 & Self::ALL.0).count_ones()
    }

    /// Returns `true` if no filter is selected.
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

impl Default for PngFilters {
    fn default() -> Self {
        Self::ALL
    }
}

impl std::ops::BitOr for PngFilters {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Compression of 8-bit TIFF output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum TiffCompression {
    Uncompressed,
    #[default]
    Lzw,
}

/// Encoder parameters of a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// Format of the color kinds. Depth is always a float TIFF.
    pub image_format: ImageFormat,
    /// zlib level, `0..=9`.
    pub compression_level: u8,
    /// zlib strategy.
    pub compression_strategy: CompressionStrategy,
    /// Row filters the tunable PNG encoder may use.
    pub png_filters: PngFilters,
    /// Capacity of the buffered file writer.
    pub file_write_buffer_size: usize,
    /// Compression of 8-bit TIFF output.
    pub tiff_compression: TiffCompression,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            image_format: ImageFormat::default(),
            compression_level: 9,
            compression_strategy: CompressionStrategy::default(),
            png_filters: PngFilters::default(),
            file_write_buffer_size: 1024 * 768,
            tiff_compression: TiffCompression::default(),
        }
    }
}

/// When the notification sound is played.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    /// Once, when the set is activated.
    #[default]
    FirstTimeOnly,
    /// On every capture frame.
    EveryCapture,
    /// Looping for as long as the set is active.
    WhileActive,
}

/// Notification sound of a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundSettings {
    /// Sound file, `None` to stay silent unless `force` is set.
    pub path: Option<PathBuf>,
    /// When to play it.
    pub playback_mode: PlaybackMode,
    /// Play the default sound if `path` is missing.
    pub force: bool,
    /// Route through the system notification channel.
    pub as_system_notification: bool,
}

impl Default for SoundSettings {
    fn default() -> Self {
        Self {
            path: None,
            playback_mode: PlaybackMode::default(),
            force: false,
            as_system_notification: true,
        }
    }
}

impl SoundSettings {
    /// Returns `true` if there is anything to play.
    pub fn is_audible(&self) -> bool {
        self.force || self.path.as_ref().is_some_and(|path| !path.as_os_str().is_empty())
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistError::Io {
                path: path.to_owned(),
                source,
            })
        }
    };

    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| PersistError::Json {
            path: path.to_owned(),
            source,
        })
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let io_err = |source| PersistError::Io {
        path: path.to_owned(),
        source,
    };

    let text = serde_json::to_string_pretty(value).map_err(|source| PersistError::Json {
        path: path.to_owned(),
        source,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    fs::write(&staging, text).map_err(io_err)?;
    fs::rename(&staging, path).map_err(io_err)
}
