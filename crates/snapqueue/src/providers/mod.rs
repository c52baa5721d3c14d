//! Provider abstractions for the collaborators a task pipeline calls into
//!
//! `local` holds the filesystem-backed and no-op implementations used by the CLI.

pub mod actions;
pub mod desktop;
pub mod history;
pub mod imaging;
pub mod local;
pub mod storage;
pub mod uploader;

pub use actions::{FileActions, OcrProvider};
pub use desktop::{Desktop, Dialogs};
pub use history::HistorySink;
pub use imaging::{EncodedImage, ImageEncoder, ImageProcessor, ProcessOutcome};
pub use storage::FileStore;
pub use uploader::{UploadContext, Uploader, UploaderRegistry, UploaderService};
