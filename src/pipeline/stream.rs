// src/pipeline/stream.rs
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;

use crate::input_format::{FormatStrategy, InputFormat};
use crate::pipeline::context::{RawUnit, SourcedRecord};
use crate::report::Reporter;

/// Parses raw units into records for the worker pool
pub struct Coordinator {
    format: Arc<InputFormat>,
    reporter: Arc<Reporter>,
}

impl Coordinator {
    pub fn new(format: Arc<InputFormat>, reporter: Arc<Reporter>) -> Self {
        Coordinator { format, reporter }
    }

    /// Parse every unit until `units` is closed. A unit that fails to parse
    /// contributes no records. Dropping `records` on return closes it.
    pub fn run(&self, units: Receiver<RawUnit>, records: Sender<SourcedRecord>) {
        for unit in units.iter() {
            let parsed = match self.format.parse(&unit) {
                Ok(parsed) => parsed,
                Err(err) => {
                    self.reporter.parse_failed(&unit.name, &err);
                    continue;
                }
            };

            self.reporter.records_parsed(&unit.name, parsed.len());
            for record in parsed {
                if records.send(SourcedRecord::new(unit.name.clone(), record)).is_err() {
                    return;
                }
            }
        }
    }
}
