//! Desktop integration and user prompts
//!
//! Both traits report whether they must be called from the affinity thread. The runner
//! dispatches calls accordingly.

use image::DynamicImage;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Clipboard, pinning, printing and shell integration
pub trait Desktop: Send + Sync {
    /// Calls must run on the affinity thread
    fn requires_affinity(&self) -> bool {
        false
    }

    fn copy_image(&self, image: &DynamicImage) -> Result<()>;

    fn copy_file(&self, path: &Path) -> Result<()>;

    fn copy_text(&self, text: &str) -> Result<()>;

    /// Show the image in an always-on-top window; the window owns its copy
    fn pin_to_screen(&self, image: DynamicImage) -> Result<()>;

    fn print(&self, image: &DynamicImage) -> Result<()>;

    /// Reveal the file in the system file manager
    fn show_in_folder(&self, path: &Path) -> Result<()>;
}

/// Blocking questions to the user
pub trait Dialogs: Send + Sync {
    /// Calls must run on the affinity thread
    fn requires_affinity(&self) -> bool {
        false
    }

    /// Ask where to save; `None` means cancelled
    fn choose_save_path(&self, suggested: &Path) -> Option<PathBuf>;

    /// Ask before uploading `size` bytes, which exceeds `threshold`
    fn confirm_large_upload(&self, size: u64, threshold: u64) -> bool;
}
