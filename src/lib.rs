// src/lib.rs
pub mod cli;
pub mod discovery;
pub mod error;
pub mod identifier;
pub mod input_format;
pub mod logging;
pub mod pattern_extraction;
pub mod pipeline;
pub mod publisher;
pub mod report;
pub mod resources;
pub mod validator;

pub use error::*;
pub use pipeline::Pipeline;

pub use discovery::InputDiscoverer;
pub use input_format::{CsvFormat, FormatStrategy, InputFormat, JsonFormat, TextFormat};
pub use pipeline::config::{FormatConfig, PipelineConfig};
pub use pipeline::context::{RawUnit, Record, RecordContext, SourcedRecord};
pub use pipeline::governor::Governor;
pub use pipeline::processors::{RecordProcessor, TransformChain};
pub use pipeline::script::ScriptTemplate;
pub use pipeline::stream::Coordinator;
pub use report::{Reporter, RunStats};
