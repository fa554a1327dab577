//! Interactive display of finished figures.

use std::{
    path::{Path, PathBuf},
    process::{Child, Command},
    sync::atomic::{AtomicUsize, Ordering},
    thread::{self, JoinHandle},
};

use image::RgbImage;

use super::{RenderError, save_png};

/// Shows a finished figure to the user.
pub trait Presenter {
    /// Display `image`. `saved_to` is the file the figure was written to, if
    /// any.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] when the figure cannot be displayed.
    fn present(&self, image: &RgbImage, saved_to: Option<&Path>) -> Result<(), RenderError>;
}

/// Presenter for non-interactive runs; it only logs the figure.
#[derive(Debug, Clone, Copy, Default)]
pub struct Headless;

impl Presenter for Headless {
    fn present(&self, image: &RgbImage, saved_to: Option<&Path>) -> Result<(), RenderError> {
        let (width, height) = image.dimensions();
        match saved_to {
            Some(path) => log::info!("figure {width}x{height} available at {}", path.display()),
            None => log::info!("figure {width}x{height} rendered without a save path"),
        }
        Ok(())
    }
}

/// Opens the figure with the platform's default image viewer.
///
/// Figures without a save path are first written to the system temporary
/// directory under a name unique to the process and figure. The viewer runs
/// in the background; a watcher thread reaps it and logs a failed exit.
#[derive(Debug, Clone, Default)]
pub struct SystemViewer {
    scratch_dir: Option<PathBuf>,
}

impl SystemViewer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write unsaved figures under `dir` instead of the temporary directory.
    #[must_use]
    pub fn with_scratch_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: Some(dir.into()),
        }
    }

    fn scratch_path(&self) -> PathBuf {
        static NEXT_FIGURE: AtomicUsize = AtomicUsize::new(0);
        let figure = NEXT_FIGURE.fetch_add(1, Ordering::Relaxed);
        let dir = self
            .scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        dir.join(format!("attnviz-{}-{figure}.png", std::process::id()))
    }
}

impl Presenter for SystemViewer {
    fn present(&self, image: &RgbImage, saved_to: Option<&Path>) -> Result<(), RenderError> {
        let path = match saved_to {
            Some(path) => path.to_path_buf(),
            None => {
                let path = self.scratch_path();
                save_png(image, &path)?;
                path
            }
        };
        let mut command = opener_command(&path);
        let program = command.get_program().to_string_lossy().into_owned();
        log::debug!("opening {} with {program}", path.display());
        let child = command
            .spawn()
            .map_err(|source| RenderError::Present {
                program: program.clone(),
                source,
            })?;
        reap(child, program);
        Ok(())
    }
}

/// Wait for `child` on a background thread so it never lingers as a zombie.
fn reap(mut child: Child, program: String) -> JoinHandle<()> {
    thread::spawn(move || match child.wait() {
        Ok(status) if status.success() => log::debug!("{program} exited"),
        Ok(status) => log::warn!("{program} exited with {status}"),
        Err(err) => log::warn!("failed to wait for {program}: {err}"),
    })
}

fn opener_command(path: &Path) -> Command {
    if cfg!(target_os = "windows") {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", ""]).arg(path);
        command
    } else {
        let program = if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        };
        let mut command = Command::new(program);
        command.arg(path);
        command
    }
}
