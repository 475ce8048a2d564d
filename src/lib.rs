//! Shrink PDF files.
//!
//! [`CompressionOrchestrator`] tries a fixed chain of strategies (deep
//! re-render, structural re-save, lower-quality re-render) against a
//! [`DocumentEngine`](engine::DocumentEngine) and keeps the first result
//! that passes its size and page-count checks. When none does, the original
//! bytes are returned unchanged.
//!
//! ```no_run
//! use pdf_shrink::{engine, CompressionOrchestrator};
//!
//! let input = std::fs::read("scan.pdf").unwrap();
//! let orchestrator = CompressionOrchestrator::new(engine::default_engine());
//! let result = orchestrator.compress_or_passthrough(input);
//! println!("{}: {:.2}% smaller", result.strategy(), result.stats().percent_reduction);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod intake;
pub mod orchestrator;
pub mod types;
pub mod wasm;

#[cfg(all(feature = "server", not(target_arch = "wasm32")))]
pub mod server;

pub use config::{CompressionConfig, RenderParams, ServerConfig};
pub use error::{CompressError, EngineError, IntakeError};
pub use intake::{compressed_file_name, validate_upload};
pub use orchestrator::{
    determine_optimal_scale, CompressionOrchestrator, ProgressEvent, ProgressObserver, Strategy,
    StrategyStep,
};
pub use types::{
    CompressionAttempt, CompressionResult, CompressionStats, Document, PassThroughReason,
    StrategyKind,
};
