// src/pipeline.rs
pub mod config;
pub mod context;
pub mod governor;
pub mod processors;
pub mod script;
pub mod stream;

use crossbeam_channel::bounded;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info};

use crate::discovery::InputDiscoverer;
use crate::error::{RecordError, StartupError};
use crate::input_format::{FormatStrategy, InputFormat};
use crate::publisher::Publisher;
use crate::report::{Reporter, RunStats};
use crate::resources::Resources;
use crate::validator::SchemaValidator;

use config::PipelineConfig;
use context::{Record, RecordContext, SourcedRecord};
use governor::Governor;
use processors::{RecordProcessor, TransformChain};
use stream::Coordinator;

/// The assembled document pipeline: discovery, parsing, the transform
/// chain, validation and publishing, run under a bounded worker pool.
pub struct Pipeline {
    config: PipelineConfig,
    format: Arc<InputFormat>,
    chain: TransformChain,
    validator: Option<SchemaValidator>,
    publisher: Publisher,
    governor: Governor,
    reporter: Arc<Reporter>,
}

impl Pipeline {
    /// Load every resource and set up the sinks. Any failure here is fatal.
    pub fn from_config(config: PipelineConfig, reporter: Arc<Reporter>) -> Result<Self, StartupError> {
        let format = Arc::new(config.format.build()?);
        let mut resources = Resources::load(&config)?;
        let chain = TransformChain::from_config(&config, &mut resources);
        let publisher = Publisher::new(&config)?;
        let governor = Governor::new(config.concurrency);

        debug!(
            format = format.name(),
            steps = ?chain.step_names(),
            concurrency = governor.concurrency(),
            "pipeline ready"
        );
        if !publisher.has_sinks() {
            info!("no --output or --address given; records are processed but not published");
        }

        Ok(Pipeline {
            config,
            format,
            chain,
            validator: resources.schema.take(),
            publisher,
            governor,
            reporter,
        })
    }

    /// Append a step after the configured chain
    pub fn add_processor(&mut self, processor: Box<dyn RecordProcessor>) {
        self.chain.add_processor(processor);
    }

    pub fn governor(&self) -> &Governor {
        &self.governor
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    /// Transform, validate and publish one record. Returns the document id.
    pub fn process_record(&self, source: &str, record: Record) -> Result<String, RecordError> {
        let ctx = RecordContext::new(source);
        let record = self.chain.apply(record, &ctx)?;

        if let Some(validator) = &self.validator {
            validator.validate(&record)?;
        }

        Ok(self.publisher.publish(&record, source, &self.reporter)?)
    }

    fn handle(&self, item: SourcedRecord) {
        let SourcedRecord { source, record } = item;
        let outcome = catch_unwind(AssertUnwindSafe(|| self.process_record(&source, record)))
            .unwrap_or_else(|payload| Err(RecordError::Panicked(panic_message(payload.as_ref()))));
        match outcome {
            Ok(id) => self.reporter.record_published(&id),
            Err(err) => self.reporter.record_dropped(&source, &err),
        }
    }

    /// Run over `inputs` until everything is discovered, parsed and processed
    pub fn run(&self, inputs: Vec<String>) -> RunStats {
        let capacity = self.governor.concurrency();
        let (unit_tx, unit_rx) = bounded(capacity);
        let (record_tx, record_rx) = bounded(capacity);

        let discoverer = InputDiscoverer::from_config(&self.config, self.format.clone(), self.reporter.clone());
        let coordinator = Coordinator::new(self.format.clone(), self.reporter.clone());

        thread::scope(|scope| {
            scope.spawn(move || discoverer.run(inputs, unit_tx));
            scope.spawn(move || coordinator.run(unit_rx, record_tx));
            self.governor.run(record_rx, |item| self.handle(item));
        });

        self.reporter.summarize()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
