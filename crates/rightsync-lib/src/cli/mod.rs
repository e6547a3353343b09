mod args;
mod download;
mod params;
mod resolved_command;
mod verify;

pub use args::{Args, Command, parse_args};
pub use download::run_download;
pub use params::{DownloadParams, VerifyParams};
pub use resolved_command::{ResolvedCommand, resolve_command};
pub use verify::{AttachmentStatus, VerifyReport, check_attachments, run_verify};
