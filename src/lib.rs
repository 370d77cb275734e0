//! # b64pack
//!
//! Pack files and directories into a single Base64 text blob, and back.
//!
//! The text is the standard Base64 encoding of a Deflate-compressed ZIP
//! archive, so any tool that understands Base64 and ZIP can unpack it.
//!
//! ## Streaming
//!
//! Payloads may be larger than memory. Every stage works chunk by chunk:
//!
//! ```text
//! files --[zipper]--> scratch.zip --[encoder]--> out.txt
//! in.txt --[decoder]--> scratch.zip --[verify]--> caller
//! ```
//!
//! The encoder holds back at most 2 bytes between chunks and the decoder at
//! most 3 characters, so the output never depends on the chunk size.
//!
//! ## Runs
//!
//! A [`Task`] runs one encode or decode on a worker thread. The caller gets
//! [`TaskEvent`]s (stage, progress, outcome) over a channel and can cancel
//! at any time; cancellation is observed between chunks and removes every
//! scratch and partial output file.
//!
//! ```no_run
//! use b64pack::{PipelineConfig, Task, TaskEvent, Worklist};
//!
//! # fn main() -> b64pack::Result<()> {
//! let list = Worklist::from_dir("photos")?;
//! let handle = Task::encode(list, "photos.txt", PipelineConfig::default()).start()?;
//! for event in handle.events() {
//!     if let TaskEvent::Progress(p) = event {
//!         eprintln!("{}: {}/{}", p.stage, p.current, p.total);
//!     }
//! }
//! println!("{:?}", handle.wait());
//! # Ok(())
//! # }
//! ```
//!
//! ## Decoder leniency
//!
//! Characters outside the Base64 alphabet are ignored, so wrapped lines and
//! trailing whitespace decode cleanly. A trailing remainder that cannot be
//! decoded is logged and dropped unless
//! [`PipelineConfig::strict_tail`] is set. Whatever comes out must still be
//! a valid ZIP archive or the run fails.

pub mod archive;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod progress;
pub mod scratch;
pub mod task;
pub mod text;
pub mod zipper;

pub use archive::{Skipped, WorkItem, Worklist};
pub use config::PipelineConfig;
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{Error, FailureKind, Result};
pub use extract::{extract_archive, list_entries, save_archive, EntryInfo};
pub use progress::{CancelToken, NoProgress, ProgressEvent, ProgressLog, ProgressSink, Stage};
pub use task::{Failure, Job, Outcome, Task, TaskEvent, TaskHandle, TaskState};
pub use text::{decode_text, encode_text};
