use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

use image::imageops::FilterType;
use image::DynamicImage;
use thiserror::Error;

pub const FRAME_WIDTH: u32 = 240;
pub const FRAME_HEIGHT: u32 = 340;
pub const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";

const FRAME_COMMAND: &str = "ffmpeg";
const DEFAULT_FALLBACK_TEMP_DIR: &str = "/tmp/cardloft";
const FRAME_PREFIX: &str = "frame-";

/// A single still taken from the capture device, already scaled to the
/// recognition canvas.
pub type FrameBuffer = DynamicImage;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device unavailable: {device}: {message}")]
    Unavailable { device: String, message: String },
    #[error("capture device already released")]
    Released,
    #[error("command failed: {command}")]
    CommandFailed { command: String, message: String },
    #[error("command io error: {command}")]
    CommandIo {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read captured frame: {message}")]
    ImageReadFailed { message: String },
}

/// Hands out capture devices on demand.
pub trait FrameSource {
    fn open(&self) -> Result<Box<dyn CaptureDevice>, CaptureError>;
}

/// An acquired video input. `release` stops the stream; further captures fail
/// with [`CaptureError::Released`].
pub trait CaptureDevice {
    fn capture_frame(&mut self) -> Result<FrameBuffer, CaptureError>;
    fn release(&mut self);
}

/// Releases the wrapped device when dropped.
pub struct CaptureGuard {
    device: Box<dyn CaptureDevice>,
}

impl CaptureGuard {
    pub fn new(device: Box<dyn CaptureDevice>) -> Self {
        Self { device }
    }

    pub fn capture_frame(&mut self) -> Result<FrameBuffer, CaptureError> {
        self.device.capture_frame()
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.device.release();
        tracing::debug!("capture device released");
    }
}

impl std::fmt::Debug for CaptureGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CaptureGuard")
    }
}

/// Grabs frames from a V4L2 camera by running `ffmpeg` once per frame.
#[derive(Debug, Clone)]
pub struct CameraFrameSource {
    device: PathBuf,
}

impl CameraFrameSource {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl Default for CameraFrameSource {
    fn default() -> Self {
        Self::new(DEFAULT_CAMERA_DEVICE)
    }
}

impl FrameSource for CameraFrameSource {
    fn open(&self) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        let device = self.device.display().to_string();
        if !self.device.exists() {
            return Err(CaptureError::Unavailable {
                device,
                message: "no such device".to_string(),
            });
        }
        if let Err(err) = Command::new(FRAME_COMMAND)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            return Err(CaptureError::Unavailable {
                device,
                message: format!("{FRAME_COMMAND} is not runnable: {err}"),
            });
        }

        std::fs::create_dir_all(runtime_temp_dir()).map_err(|err| CaptureError::Unavailable {
            device: device.clone(),
            message: format!("cannot create frame directory: {err}"),
        })?;

        tracing::info!(%device, "capture device opened");
        Ok(Box::new(CameraDevice {
            device: self.device.clone(),
            released: false,
        }))
    }
}

#[derive(Debug)]
struct CameraDevice {
    device: PathBuf,
    released: bool,
}

impl CaptureDevice for CameraDevice {
    fn capture_frame(&mut self) -> Result<FrameBuffer, CaptureError> {
        if self.released {
            return Err(CaptureError::Released);
        }

        let frame_path = build_frame_path()?;
        let device = self.device.display().to_string();
        let args = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "v4l2",
            "-i",
            device.as_str(),
            "-frames:v",
            "1",
            "-y",
        ];
        if let Err(err) = run_command_status(FRAME_COMMAND, &args, &frame_path) {
            cleanup_frame_file(&frame_path, "frame command failure");
            return Err(err);
        }

        let frame = image::open(&frame_path).map_err(|err| CaptureError::ImageReadFailed {
            message: err.to_string(),
        });
        cleanup_frame_file(&frame_path, "frame decoded");
        Ok(fit_frame(&frame?))
    }

    fn release(&mut self) {
        self.released = true;
    }
}

/// Scales and center-crops a frame to the recognition canvas.
pub fn fit_frame(image: &DynamicImage) -> FrameBuffer {
    image.resize_to_fill(FRAME_WIDTH, FRAME_HEIGHT, FilterType::Triangle)
}

fn build_frame_path() -> Result<PathBuf, CaptureError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| CaptureError::ImageReadFailed {
            message: format!("system time before unix epoch: {err}"),
        })?;
    let mut path = runtime_temp_dir();
    path.push(format!("{FRAME_PREFIX}{}.png", now.as_nanos()));
    Ok(path)
}

fn runtime_temp_dir() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR")
        .map(|dir| PathBuf::from(dir).join("cardloft"))
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_FALLBACK_TEMP_DIR))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameCleanupOutcome {
    Removed,
    NotFound,
    Failed,
}

fn cleanup_frame_file(path: &Path, stage: &str) -> FrameCleanupOutcome {
    cleanup_frame_file_with(path, stage, |path| std::fs::remove_file(path))
}

fn cleanup_frame_file_with<F>(path: &Path, stage: &str, remove_file: F) -> FrameCleanupOutcome
where
    F: FnOnce(&Path) -> std::io::Result<()>,
{
    match remove_file(path) {
        Ok(()) => FrameCleanupOutcome::Removed,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(
                stage = stage,
                path = %path.display(),
                "frame file was already missing during cleanup"
            );
            FrameCleanupOutcome::NotFound
        }
        Err(err) => {
            tracing::warn!(
                stage = stage,
                path = %path.display(),
                ?err,
                "failed to cleanup frame file"
            );
            FrameCleanupOutcome::Failed
        }
    }
}

fn run_command_status(command: &str, args: &[&str], output: &Path) -> Result<(), CaptureError> {
    let result = Command::new(command)
        .args(args)
        .arg(output)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|err| CaptureError::CommandIo {
            command: command.to_string(),
            source: err,
        })?;

    if result.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&result.stderr);
        Err(CaptureError::CommandFailed {
            command: command.to_string(),
            message: format!("exit status: {}; stderr: {}", result.status, stderr.trim()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingDevice {
        releases: Rc<Cell<usize>>,
    }

    impl CaptureDevice for CountingDevice {
        fn capture_frame(&mut self) -> Result<FrameBuffer, CaptureError> {
            Ok(DynamicImage::new_rgb8(FRAME_WIDTH, FRAME_HEIGHT))
        }

        fn release(&mut self) {
            self.releases.set(self.releases.get() + 1);
        }
    }

    #[test]
    fn missing_device_reports_unavailable() {
        let source = CameraFrameSource::new("/dev/cardloft-test-missing-camera");
        let err = source.open().err().expect("missing device should fail");
        assert!(matches!(err, CaptureError::Unavailable { .. }));
    }

    #[test]
    fn guard_releases_device_on_drop() {
        let releases = Rc::new(Cell::new(0));
        let mut guard = CaptureGuard::new(Box::new(CountingDevice {
            releases: Rc::clone(&releases),
        }));
        guard.capture_frame().expect("fake frame");
        assert_eq!(releases.get(), 0);

        drop(guard);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn released_camera_refuses_frames() {
        let mut device = CameraDevice {
            device: PathBuf::from(DEFAULT_CAMERA_DEVICE),
            released: false,
        };
        device.release();
        assert!(matches!(
            device.capture_frame(),
            Err(CaptureError::Released)
        ));
    }

    #[test]
    fn fit_frame_produces_canvas_size() {
        let wide = DynamicImage::new_rgb8(1280, 720);
        let fitted = fit_frame(&wide);
        assert_eq!(fitted.width(), FRAME_WIDTH);
        assert_eq!(fitted.height(), FRAME_HEIGHT);
    }

    #[test]
    fn frame_paths_use_frame_prefix() {
        let path = build_frame_path().unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(FRAME_PREFIX));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn cleanup_reports_not_found_for_missing_file() {
        let outcome = cleanup_frame_file_with(Path::new("/tmp/missing-frame.png"), "test", |_| {
            Err(std::io::Error::from(std::io::ErrorKind::NotFound))
        });
        assert_eq!(outcome, FrameCleanupOutcome::NotFound);
    }

    #[test]
    fn cleanup_reports_failure_for_other_errors() {
        let outcome = cleanup_frame_file_with(Path::new("/tmp/locked-frame.png"), "test", |_| {
            Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied))
        });
        assert_eq!(outcome, FrameCleanupOutcome::Failed);
    }
}
