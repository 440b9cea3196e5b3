//! Actor system for the conversion service.
//!
//! This crate provides the Ractor-based actors that admit, run and report
//! conversion jobs, plus the periodic retention sweep.
//!
//! # Architecture
//!
//! - `Supervisor` - Top-level actor that spawns and links the others
//! - `QueueActor` - FIFO admission, slot accounting and dispatch
//! - `ChannelActor` - Per-session progress delivery
//! - `SweeperActor` - Deletes aged output on a fixed period
//!
//! # Usage
//!
//! ```ignore
//! use actors::start_conversion_system;
//! use ripline_core::{JobRequest, RiplineConfig, SessionId};
//!
//! let (ripline, _handle) = start_conversion_system(RiplineConfig::from_env()?).await?;
//!
//! let session = SessionId::new("browser-tab-1");
//! let mut events = ripline.subscribe(&session).await?;
//! ripline.submit(JobRequest::new(url, session, "Road Trip")).await?;
//! while let Some(event) = events.recv().await {
//!     if event.is_terminal() { break; }
//! }
//! ```

mod channel;
mod messages;
mod pipeline;
mod queue_actor;
mod reporter;
mod supervisor;
mod sweeper_actor;
mod system;

pub use channel::{ChannelActor, ProgressChannel};
pub use messages::{
    ChannelMessage, JobOutcome, QueueMessage, SupervisorMessage, SweeperMessage, SystemError,
    SystemRefs,
};
pub use pipeline::{ConversionPipeline, JobPipeline, PipelineFuture};
pub use queue_actor::{QueueActor, QueueArgs};
pub use reporter::ProgressReporter;
pub use supervisor::{Supervisor, SupervisorArgs};
pub use sweeper_actor::{SweeperActor, SweeperArgs};
pub use system::{Ripline, start_conversion_system, start_system};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
