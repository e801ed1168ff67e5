//! Age-adapted educational comic generation.
//!
//! This crate provides:
//! - Source normalization for free-text topics and video transcripts
//! - Audience profiles for toddlers, kids and teens
//! - Script planning through a generative text model
//! - Panel rendering with a rolling context window for visual continuity
//! - A cancellable pipeline that streams progress events
//!
//! # Quick Start
//!
//! ```ignore
//! use comic_core::{AudienceBand, GenerationRequest, Pipeline, PipelineConfig, ServiceConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let services = ServiceConfig::from_env()?.build_services();
//!     let pipeline = Arc::new(Pipeline::new(services, PipelineConfig::default()));
//!
//!     let request = GenerationRequest::topic("Photosynthesis", AudienceBand::Kid, 1)?;
//!     let job = comic_core::job::spawn(pipeline, request);
//!
//!     let comic = job.wait().await?;
//!     println!("{}: {} panels", comic.title, comic.len());
//!     Ok(())
//! }
//! ```

pub mod audience;
pub mod cancel;
pub mod comic;
pub mod config;
pub mod context;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod progress;
pub mod render;
pub mod request;
pub mod script;
pub mod services;
pub mod source;
pub mod testing;

// Primary public API
pub use audience::{AudienceBand, AudienceProfile};
pub use cancel::CancellationToken;
pub use comic::{ComicResult, ConceptMaterial, ImageAsset, PanelDescriptor, RenderedPanel};
pub use config::{ConfigError, PipelineConfig, RenderFailurePolicy, ServiceConfig};
pub use context::{ContextPayload, ContextWindow};
pub use error::{ComicError, ErrorClass, PipelineError, ServiceError, ServiceErrorKind};
pub use job::{GenerationJob, JobError};
pub use pipeline::{Pipeline, PipelineState};
pub use progress::{NullSink, ProgressEvent, ProgressSink, Stage};
pub use request::{GenerationRequest, SourceKind};
pub use services::Services;
