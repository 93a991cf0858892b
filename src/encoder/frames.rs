//! Writes the images of a frame job to individual files.

use super::for_kind;
use crate::{
    error::SaveError,
    job::{CapturedImage, FrameJob},
    template::{self, TemplateContext},
    CaptureKind,
};
use std::{
    fs::{self, File},
    io,
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

/// Free and total bytes of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeSpace {
    /// Bytes available to the process.
    pub free: u64,
    /// Size of the volume.
    pub total: u64,
}

/// Source of volume sizes for the free space floor.
pub trait DiskSpace: Send + Sync {
    /// Returns the space of the volume holding `path`.
    fn query(&self, path: &Path) -> io::Result<VolumeSpace>;
}

impl<T: DiskSpace + ?Sized> DiskSpace for Arc<T> {
    fn query(&self, path: &Path) -> io::Result<VolumeSpace> {
        (**self).query(path)
    }
}

/// Queries the operating system for volume sizes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDiskSpace;

#[cfg(feature = "disk-space")]
impl DiskSpace for SystemDiskSpace {
    fn query(&self, path: &Path) -> io::Result<VolumeSpace> {
        let path = fs::canonicalize(path)?;
        let disks = sysinfo::Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| VolumeSpace {
                free: disk.available_space(),
                total: disk.total_space(),
            })
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no volume holds the path"))
    }
}

#[cfg(not(feature = "disk-space"))]
impl DiskSpace for SystemDiskSpace {
    fn query(&self, _path: &Path) -> io::Result<VolumeSpace> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "built without the disk-space feature",
        ))
    }
}

/// Returns `true` if `space` satisfies `limit`.
///
/// A limit of `100` or more is a floor in megabytes, anything below is a percentage of
/// the volume. `0` admits everything.
pub fn admits(space: VolumeSpace, limit: u64) -> bool {
    if limit == 0 {
        return true;
    }
    if limit >= 100 {
        u128::from(space.free) >= u128::from(limit) * 1024 * 1024
    } else {
        u128::from(space.free) * 100 >= u128::from(limit) * u128::from(space.total)
    }
}

/// Expands `template` and resolves it into a file path with the given extension.
///
/// Relative results are joined to `base`. If the expansion names no file the resolved
/// path is returned as the error.
pub fn resolve_output_path(
    template: &str,
    ctx: &TemplateContext<'_>,
    base: &Path,
    extension: &str,
) -> Result<PathBuf, PathBuf> {
    let expanded = template::expand(template, ctx);
    let trimmed = expanded.trim();
    let mut path = normalize(&base.join(trimmed));

    if trimmed.is_empty()
        || trimmed.ends_with(['/', '\\'])
        || Path::new(trimmed).file_name().is_none()
    {
        return Err(path);
    }

    path.set_extension(extension);
    Ok(path)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Writes every image of a job, one file per kind.
pub struct FramesEncoder<D = SystemDiskSpace> {
    disk_space: D,
}

impl Default for FramesEncoder<SystemDiskSpace> {
    fn default() -> Self {
        Self::new(SystemDiskSpace)
    }
}

impl<D: DiskSpace> FramesEncoder<D> {
    /// Creates an encoder checking free space through `disk_space`.
    pub fn new(disk_space: D) -> Self {
        Self { disk_space }
    }

    /// Writes every image in `job`, returning the outcome per kind in kind order.
    pub fn encode_job(&self, mut job: FrameJob) -> Vec<(CaptureKind, Result<PathBuf, SaveError>)> {
        let images = std::mem::take(&mut job.images);
        let app = job.environment.app_name();
        let preset = job.environment.preset_name();
        let ctx = TemplateContext::for_job(&job, &app, &preset);

        images
            .into_iter()
            .map(|(kind, image)| (kind, self.encode_image(&job, &ctx, kind, image)))
            .collect()
    }

    fn encode_image(
        &self,
        job: &FrameJob,
        ctx: &TemplateContext<'_>,
        kind: CaptureKind,
        image: CapturedImage,
    ) -> Result<PathBuf, SaveError> {
        let settings = &job.set.encoder;
        let encoder = for_kind(kind, settings, job.frame_time);
        let output = job.set.outputs.get(kind);

        let path = resolve_output_path(
            &output.path,
            ctx,
            &job.environment.base_path,
            encoder.extension(),
        )
        .map_err(|path| SaveError::MissingFileName { kind, path })?;

        let dir = path.parent().unwrap_or(Path::new(""));
        fs::create_dir_all(dir).map_err(|source| SaveError::CreateDir {
            kind,
            path: dir.to_owned(),
            source,
        })?;

        if output.free_space_limit != 0 {
            match self.disk_space.query(dir) {
                Ok(space) if !admits(space, output.free_space_limit) => {
                    return Err(SaveError::Admission {
                        kind,
                        path: dir.to_owned(),
                        free: space.free,
                        total: space.total,
                        limit: output.free_space_limit,
                    });
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(
                        "Skipping free space check for \"{}\": {}",
                        dir.display(),
                        err
                    );
                }
            }
        }

        let image = if kind != CaptureKind::Depth && settings.image_format.channels() == 3 {
            CapturedImage {
                pixels: image.pixels.into_rgb8(),
                ..image
            }
        } else {
            image
        };

        let mut file = File::create(&path).map_err(|source| SaveError::Open {
            kind,
            path: path.clone(),
            source,
        })?;

        if let Err(source) = encoder.encode(&image, &mut file) {
            drop(file);
            remove_partial(&path);
            return Err(SaveError::Write { kind, path, source });
        }

        if let Err(source) = set_capture_time(&file, job.frame_time) {
            drop(file);
            remove_partial(&path);
            return Err(SaveError::Timestamp { kind, path, source });
        }

        Ok(path)
    }
}

fn set_capture_time(file: &File, frame_time: SystemTime) -> io::Result<()> {
    file.set_modified(frame_time)
}

fn remove_partial(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        tracing::warn!("Failed to remove partial file \"{}\": {}", path.display(), err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::Statistics;

    const MB: u64 = 1024 * 1024;

    fn ctx(statistics: &Statistics) -> TemplateContext<'_> {
        TemplateContext {
            app: "Game",
            preset: "",
            set_name: "myset",
            repeat_index: 2,
            frame_time: SystemTime::UNIX_EPOCH,
            statistics,
        }
    }

    #[test]
    fn megabyte_and_percent_floors() {
        let space = VolumeSpace {
            free: 400 * MB,
            total: 1000 * MB,
        };
        assert!(!admits(space, 500));
        assert!(admits(space, 400));
        assert!(!admits(space, 50));
        assert!(admits(space, 40));
        assert!(admits(VolumeSpace { free: 0, total: 1 }, 0));
    }

    #[test]
    fn paths_resolve_against_the_base() {
        let statistics = Statistics::default();
        let ctx = ctx(&statistics);
        let base = Path::new("/shots");

        assert_eq!(
            resolve_output_path("<APP>/./frame_<INDEX:D3>.jpg", &ctx, base, "png"),
            Ok(PathBuf::from("/shots/Game/frame_002.png"))
        );
        assert_eq!(
            resolve_output_path("../out/a", &ctx, base, "tiff"),
            Ok(PathBuf::from("/out/a.tiff"))
        );
        assert_eq!(
            resolve_output_path("/abs/b", &ctx, base, "ini"),
            Ok(PathBuf::from("/abs/b.ini"))
        );
    }

    #[test]
    fn paths_without_file_name_are_rejected() {
        let statistics = Statistics::default();
        let ctx = ctx(&statistics);
        let base = Path::new("/shots");

        for template in ["", "   ", "dir/", "dir\\", "<NOPE>", "a/.."] {
            assert!(
                resolve_output_path(template, &ctx, base, "png").is_err(),
                "{template:?}"
            );
        }
    }
}
