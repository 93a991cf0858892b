//! The per render context capture state machine.

use crate::{
    config::{CaptureConfig, CaptureSet, PlaybackMode, ShowOsd, TurnOnEffects},
    encoder::frames::{resolve_output_path, DiskSpace, SystemDiskSpace},
    error::CaptureError,
    host::{Environment, Host, TechniqueHandle},
    job::{CapturedImage, FrameJob},
    pool::WorkerPool,
    readback::{self, DEPTH_EFFECT, DEPTH_TECHNIQUE},
    statistics::StatisticsStore,
    template::TemplateContext,
    CaptureKind,
};
use std::{fs, sync::Arc, time::Duration};

const EFFECT_KINDS: [CaptureKind; 3] = [CaptureKind::Before, CaptureKind::After, CaptureKind::Depth];

/// A condition the on-screen status should point out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWarning {
    /// The set captures effect dependent kinds but effects are off and nothing keeps them on.
    EffectsDisabled,
    /// Depth could not be captured in the current or last activation.
    DepthUnavailable,
}

/// Snapshot of a session for the on-screen status.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    /// Name of the active set.
    pub active_set: Option<String>,
    /// Capture frames taken in this activation.
    pub repeat_index: u32,
    /// Capture frames per activation of the active set, `0` for unbounded.
    pub repeat_count: u32,
    /// Frame jobs waiting for a worker.
    pub queued: usize,
    /// Memory held by the waiting jobs.
    pub queued_bytes: u64,
    /// Jobs being written right now.
    pub active_workers: usize,
    /// Maximum number of concurrent writers.
    pub worker_budget: usize,
    /// Failures since the last activation.
    pub error_count: u64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// How long the most recent job took to write.
    pub last_encode_duration: Option<Duration>,
    /// Conditions worth pointing out.
    pub warnings: Vec<StatusWarning>,
}

#[derive(Debug)]
struct Activation {
    set_name: String,
    begin_frame: u64,
    repeat_index: u32,
    environment: Environment,
    forced_effects: bool,
}

/// Capture state of one rendering context.
///
/// The host drives a session from its render thread by calling, in every frame,
/// [`on_begin_effects`](Self::on_begin_effects) and [`on_finish_effects`](Self::on_finish_effects)
/// around its effect chain (only when effects run), [`on_overlay`](Self::on_overlay) after
/// its UI was composited and [`on_present`](Self::on_present) last.
pub struct CaptureSession {
    config: CaptureConfig,
    statistics: Arc<StatisticsStore>,
    pool: WorkerPool,
    active: Option<Activation>,
    current_frame: u64,
    worker_budget: usize,
    in_flight: Option<FrameJob>,
    depth_technique: Option<TechniqueHandle>,
    depth_unavailable: bool,
    effects_enabled: bool,
}

impl CaptureSession {
    /// Creates a session writing through the operating system's volumes.
    pub fn new(config: CaptureConfig, statistics: Arc<StatisticsStore>) -> Self {
        Self::with_disk_space(config, statistics, Arc::new(SystemDiskSpace))
    }

    /// Creates a session whose free space floors are checked through `disk_space`.
    pub fn with_disk_space(
        config: CaptureConfig,
        statistics: Arc<StatisticsStore>,
        disk_space: Arc<dyn DiskSpace>,
    ) -> Self {
        Self {
            config,
            statistics,
            pool: WorkerPool::new(disk_space),
            active: None,
            current_frame: 0,
            worker_budget: 1,
            in_flight: None,
            depth_technique: None,
            depth_unavailable: false,
            effects_enabled: true,
        }
    }

    /// Creates a session for a context the host just attached and parks the depth technique.
    pub fn attach<H: Host + ?Sized>(
        host: &mut H,
        config: CaptureConfig,
        statistics: Arc<StatisticsStore>,
    ) -> Self {
        let mut session = Self::new(config, statistics);
        session.effects_enabled = host.effects_enabled();
        session.depth_technique = host.find_technique(DEPTH_EFFECT, DEPTH_TECHNIQUE);
        session.update_depth_technique(host);
        session
    }

    /// The configuration the session captures with.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// The configuration for editing. Queued jobs keep the settings they were captured with.
    pub fn config_mut(&mut self) -> &mut CaptureConfig {
        &mut self.config
    }

    /// The statistics the session counts into.
    pub fn statistics(&self) -> &StatisticsStore {
        &self.statistics
    }

    /// Number of `on_present` calls so far.
    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    /// Returns `true` while a set is capturing.
    pub fn is_active(&self) -> bool {
        self.active_set().is_some()
    }

    /// Name of the capturing set.
    pub fn active_set_name(&self) -> Option<&str> {
        self.active_set().map(|set| set.name.as_str())
    }

    /// Returns `true` if the status should be drawn this frame.
    pub fn should_show_status(&self) -> bool {
        match self.config.show_osd {
            ShowOsd::Hidden => false,
            ShowOsd::Always => true,
            ShowOsd::WhileActive => self.is_active(),
        }
    }

    /// The current state for display.
    pub fn status(&self) -> SessionStatus {
        let set = self.active_set();
        let state = self.pool.state();

        let mut warnings = Vec::new();
        if set.is_some_and(|set| set.any_enabled(&EFFECT_KINDS))
            && !self.effects_enabled
            && self.config.turn_on_effects != TurnOnEffects::WhileActive
        {
            warnings.push(StatusWarning::EffectsDisabled);
        }
        // Kept after deactivation until the next activation.
        if self.depth_unavailable {
            warnings.push(StatusWarning::DepthUnavailable);
        }

        SessionStatus {
            active_set: set.map(|set| set.name.clone()),
            repeat_index: self.active.as_ref().map_or(0, |a| a.repeat_index),
            repeat_count: set.map_or(0, |set| set.repeat_count),
            queued: self.pool.pending(),
            queued_bytes: self.pool.pending_bytes(),
            active_workers: state.active(),
            worker_budget: self.worker_budget,
            error_count: state.error_count(),
            last_error: state.last_error(),
            last_encode_duration: state.last_encode_duration(),
            warnings,
        }
    }

    /// Activates the set called `name`, replacing any other active set.
    ///
    /// Returns `false` if there is no such set.
    pub fn activate<H: Host + ?Sized>(&mut self, host: &mut H, name: &str) -> bool {
        let Some(set) = self.config.find_mut(name) else {
            return false;
        };
        set.sanitize();
        let set = set.clone();

        if self.active.is_some() {
            self.deactivate(host);
        }

        let state = self.pool.state();
        state.reset_errors();
        self.depth_unavailable = false;
        if let Err(err) = self.statistics.record_take(&set.name) {
            state.record_error(format!("failed to save statistics: {}", err));
        }

        self.worker_budget = match set.worker_threads {
            0 => host.hardware_concurrency().max(1),
            n => n,
        };

        let mut forced_effects = false;
        if self.config.turn_on_effects != TurnOnEffects::Ignore
            && set.any_enabled(&EFFECT_KINDS)
            && !host.effects_enabled()
        {
            tracing::info!("Turning effects on for \"{}\"", set.name);
            host.set_effects_enabled(true);
            forced_effects = self.config.turn_on_effects == TurnOnEffects::WhileActive;
        }
        self.effects_enabled = host.effects_enabled();

        if set.is_enabled(CaptureKind::Depth) {
            self.depth_technique = host.find_technique(DEPTH_EFFECT, DEPTH_TECHNIQUE);
            if self.depth_technique.is_none() {
                tracing::warn!("{}", CaptureError::TechniqueMissing(DEPTH_TECHNIQUE));
                self.depth_unavailable = true;
            }
        }

        if set.sound.is_audible() {
            match set.sound.playback_mode {
                PlaybackMode::FirstTimeOnly => host.play_sound(&set.sound, false),
                PlaybackMode::WhileActive => host.play_sound(&set.sound, true),
                PlaybackMode::EveryCapture => {}
            }
        }

        tracing::info!(
            "Activated \"{}\" ({} frames every {} frames, {} writers)",
            set.name,
            set.repeat_count,
            set.repeat_interval,
            self.worker_budget
        );
        self.active = Some(Activation {
            set_name: set.name,
            begin_frame: self.current_frame + 1,
            repeat_index: 0,
            environment: Environment::from_host(host),
            forced_effects,
        });
        self.update_depth_technique(host);
        true
    }

    /// Stops capturing. Jobs already captured are still written.
    pub fn deactivate<H: Host + ?Sized>(&mut self, host: &mut H) {
        let Some(activation) = self.active.take() else {
            return;
        };

        let set = self.config.find(&activation.set_name);
        if activation.forced_effects && host.effects_enabled() {
            tracing::info!("Restoring disabled effects");
            host.set_effects_enabled(false);
        }
        if set.is_some_and(|set| {
            set.sound.is_audible() && set.sound.playback_mode == PlaybackMode::WhileActive
        }) {
            host.stop_sound();
        }

        self.in_flight = None;
        self.update_depth_technique(host);
        tracing::info!(
            "Deactivated \"{}\" after {} frames",
            activation.set_name,
            activation.repeat_index
        );
    }

    /// Captures [`CaptureKind::Before`]. Called right before the effect chain runs.
    pub fn on_begin_effects<H: Host + ?Sized>(&mut self, host: &mut H) {
        if !host.effects_enabled() {
            return;
        }
        if self.wants(CaptureKind::Before) {
            self.capture(host, CaptureKind::Before, readback::read_color);
        }
    }

    /// Captures [`CaptureKind::After`] and [`CaptureKind::Depth`]. Called right after the
    /// effect chain finished.
    pub fn on_finish_effects<H: Host + ?Sized>(&mut self, host: &mut H) {
        if self.wants(CaptureKind::After) {
            self.capture(host, CaptureKind::After, readback::read_color);
        }
        if !self.depth_unavailable && self.wants(CaptureKind::Depth) {
            self.capture(host, CaptureKind::Depth, readback::read_depth);
        }
    }

    /// Captures [`CaptureKind::Overlay`]. Called after the host's UI was composited.
    pub fn on_overlay<H: Host + ?Sized>(&mut self, host: &mut H) {
        if self.wants(CaptureKind::Overlay) {
            self.capture(host, CaptureKind::Overlay, readback::read_color);
        }
    }

    /// Captures [`CaptureKind::Original`], closes the frame and processes hotkeys.
    /// Called once per frame after everything else.
    pub fn on_present<H: Host + ?Sized>(&mut self, host: &mut H) {
        if self.wants(CaptureKind::Original) {
            self.capture(host, CaptureKind::Original, readback::read_color);
        }

        if self.is_capture_frame() {
            self.finish_capture_frame(host);
        }
        self.pool.drain(self.worker_budget);

        if let Some(set) = self.active_set() {
            let exhausted = self.active.as_ref().is_some_and(|activation| {
                set.repeat_count != 0 && activation.repeat_index >= set.repeat_count
            });
            if exhausted {
                self.deactivate(host);
            }
        } else if self.active.is_some() {
            tracing::warn!("The active set was removed");
            self.deactivate(host);
        }

        if !host.is_text_input_active() {
            self.process_hotkeys(host);
        }

        if self.config.turn_on_effects == TurnOnEffects::WhileActive
            && self
                .active_set()
                .is_some_and(|set| set.any_enabled(&EFFECT_KINDS))
            && !host.effects_enabled()
        {
            host.set_effects_enabled(true);
            if let Some(activation) = self.active.as_mut() {
                activation.forced_effects = true;
            }
        }

        self.effects_enabled = host.effects_enabled();
        self.current_frame += 1;
        self.update_depth_technique(host);
    }

    /// Returns `true` if the current frame is captured.
    pub fn is_capture_frame(&self) -> bool {
        let (Some(activation), Some(set)) = (&self.active, self.active_set()) else {
            return false;
        };
        is_capture_frame_at(activation, set, self.current_frame)
    }

    fn active_set(&self) -> Option<&CaptureSet> {
        let activation = self.active.as_ref()?;
        self.config.find(&activation.set_name)
    }

    fn wants(&self, kind: CaptureKind) -> bool {
        self.is_capture_frame() && self.active_set().is_some_and(|set| set.is_enabled(kind))
    }

    fn capture<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        kind: CaptureKind,
        read: fn(&mut H) -> Result<CapturedImage, CaptureError>,
    ) {
        match read(host) {
            Ok(image) => {
                if let Some(job) = self.in_flight_job(host) {
                    job.images.insert(kind, image);
                }
            }
            Err(err) => {
                // Depth failures do not resolve themselves within an activation.
                if kind == CaptureKind::Depth {
                    self.depth_unavailable = true;
                }
                self.pool
                    .state()
                    .record_error(format!("failed to capture '{}' image: {}", kind, err));
            }
        }
    }

    fn in_flight_job<H: Host + ?Sized>(&mut self, host: &H) -> Option<&mut FrameJob> {
        if self.in_flight.is_none() {
            let activation = self.active.as_ref()?;
            let set = self.config.find(&activation.set_name)?;
            self.in_flight = Some(FrameJob::new(
                set.clone(),
                self.statistics.snapshot(),
                activation.environment.clone(),
                activation.repeat_index,
                host.screenshot_size(),
            ));
        }
        self.in_flight.as_mut()
    }

    fn finish_capture_frame<H: Host + ?Sized>(&mut self, host: &mut H) {
        let Some(set) = self.active_set().cloned() else {
            return;
        };
        let Some(activation) = self.active.as_ref() else {
            return;
        };

        if activation.repeat_index == 0 && set.is_enabled(CaptureKind::Preset) {
            let environment = activation.environment.clone();
            self.export_preset(host, &set, &environment);
        }

        if let Some(job) = self.in_flight.take().filter(|job| !job.is_empty()) {
            self.pool.push(job);
        }

        if set.sound.is_audible() && set.sound.playback_mode == PlaybackMode::EveryCapture {
            host.play_sound(&set.sound, false);
        }

        if let Some(activation) = self.active.as_mut() {
            activation.repeat_index += 1;
        }
        if let Err(err) = self.statistics.record_frame(&set.name) {
            self.pool
                .state()
                .record_error(format!("failed to save statistics: {}", err));
        }
    }

    fn export_preset<H: Host + ?Sized>(
        &self,
        host: &mut H,
        set: &CaptureSet,
        environment: &Environment,
    ) {
        let statistics = self.statistics.snapshot();
        let app = environment.app_name();
        let preset = environment.preset_name();
        let ctx = TemplateContext {
            app: &app,
            preset: &preset,
            set_name: &set.name,
            repeat_index: 0,
            frame_time: std::time::SystemTime::now(),
            statistics: &statistics,
        };

        let output = &set.outputs.preset;
        let state = self.pool.state();
        let path = match resolve_output_path(&output.path, &ctx, &environment.base_path, "ini") {
            Ok(path) => path,
            Err(path) => {
                state.record_error(format!(
                    "skipped saving preset because the path has no file name: \"{}\"",
                    path.display()
                ));
                return;
            }
        };

        if let Some(dir) = path.parent() {
            if let Err(err) = fs::create_dir_all(dir) {
                state.record_error(format!(
                    "failed to create preset directory \"{}\": {}",
                    dir.display(),
                    err
                ));
                return;
            }
        }

        if host.export_preset(&path) {
            tracing::debug!("Saved preset to \"{}\"", path.display());
        } else {
            state.record_error(format!("failed to save preset \"{}\"", path.display()));
        }
    }

    fn process_hotkeys<H: Host + ?Sized>(&mut self, host: &mut H) {
        let pressed = self
            .config
            .sets
            .iter()
            .find(|set| {
                set.hotkey
                    .is_pressed(|key| host.is_key_pressed(key), |key| host.is_key_down(key))
            })
            .map(|set| set.name.clone());

        let Some(name) = pressed else {
            return;
        };
        if self.active_set_name() == Some(name.as_str()) {
            self.deactivate(host);
        } else {
            self.activate(host, &name);
        }
    }

    /// Enables the depth technique exactly for frames that capture depth.
    fn update_depth_technique<H: Host + ?Sized>(&self, host: &mut H) {
        let Some(technique) = self.depth_technique else {
            return;
        };

        let wanted = match (&self.active, self.active_set()) {
            (Some(activation), Some(set)) => {
                !self.depth_unavailable
                    && set.is_enabled(CaptureKind::Depth)
                    && is_capture_frame_at(activation, set, self.current_frame)
            }
            _ => false,
        };
        if host.technique_enabled(technique) != wanted {
            host.set_technique_enabled(technique, wanted);
        }
    }
}

fn is_capture_frame_at(activation: &Activation, set: &CaptureSet, frame: u64) -> bool {
    (set.repeat_count == 0 || activation.repeat_index < set.repeat_count)
        && frame >= activation.begin_frame
        && (frame - activation.begin_frame) % u64::from(set.repeat_interval.max(1)) == 0
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(job) = self.in_flight.take().filter(|job| !job.is_empty()) {
            self.pool.push(job);
        }
    }
}
