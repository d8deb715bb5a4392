//! # Codestream Core
//!
//! This crate watches a source tree and streams line diffs of changed files
//! to live subscribers.
//!
//! ## Features
//!
//! - **Ignore Rules**: `.gitignore`-style rules plus a fixed always-ignore set
//! - **Debounced Detection**: Rapid successive writes coalesce into one record
//! - **Line Diffs**: Every record carries the diff against the last snapshot
//! - **Bounded Queue**: At most one pending record per file, oldest dropped first
//! - **Broadcast**: Initial snapshot per subscriber, then live updates to all
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Change Pipeline                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  FsWatcher ──► RawEvent ──► ChangeDetector ──► PendingQueue     │
//! │  (notify)     (channel)        │      │             │           │
//! │                                ▼      ▼             ▼           │
//! │                       IgnoreFilter  SnapshotStore  Broadcaster  │
//! │                                       + diff        │           │
//! │                                                     ▼           │
//! │                                               subscribers       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod broadcaster;
pub mod config;
pub mod detector;
pub mod diff;
pub mod error;
pub mod event;
pub mod filter;
pub mod pipeline;
pub mod queue;
pub mod record;
pub mod scanner;
pub mod snapshot;
pub mod watcher;

pub use broadcaster::{Broadcaster, Message, MessageSender, SubscriberId};
pub use config::{StreamConfig, discover_project_root};
pub use detector::{ChangeDetector, Detection};
pub use diff::{DiffLine, LineTag};
pub use error::{Result, StreamError};
pub use event::{RawEvent, RawEventKind};
pub use filter::{IgnoreFilter, RuleSet};
pub use pipeline::{Pipeline, PipelineHandle};
pub use queue::PendingQueue;
pub use record::{Action, ChangeRecord};
pub use snapshot::SnapshotStore;
pub use watcher::FsWatcher;
