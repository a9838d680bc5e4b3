// src/discovery.rs - Resolve arguments into raw units
use crossbeam_channel::Sender;
use is_terminal::IsTerminal;
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{DiscoveryError, StartupError};
use crate::input_format::{FormatStrategy, InputFormat};
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::context::RawUnit;
use crate::report::Reporter;

/// Positional arguments, or piped stdin as one argument.
///
/// Fails when there is neither.
pub fn collect_inputs(args: Vec<String>, program: &str) -> Result<Vec<String>, StartupError> {
    if !args.is_empty() {
        return Ok(args);
    }

    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Err(StartupError::NoInput(program.to_string()));
    }

    let mut piped = String::new();
    stdin
        .lock()
        .read_to_string(&mut piped)
        .map_err(|e| StartupError::config("stdin", format!("could not read piped input: {}", e)))?;

    let piped = piped.trim_end_matches(['\n', '\r']).to_string();
    if piped.is_empty() {
        return Err(StartupError::NoInput(program.to_string()));
    }
    Ok(vec![piped])
}

/// Turns arguments into raw units: inline content, files, or directory entries
pub struct InputDiscoverer {
    format: Arc<InputFormat>,
    default_name: String,
    recursive: bool,
    skip_paths: HashSet<PathBuf>,
    reporter: Arc<Reporter>,
}

impl InputDiscoverer {
    pub fn new(format: Arc<InputFormat>, default_name: impl Into<String>, reporter: Arc<Reporter>) -> Self {
        InputDiscoverer {
            format,
            default_name: default_name.into(),
            recursive: false,
            skip_paths: HashSet::new(),
            reporter,
        }
    }

    pub fn from_config(config: &PipelineConfig, format: Arc<InputFormat>, reporter: Arc<Reporter>) -> Self {
        let mut discoverer = InputDiscoverer::new(format, config.default_name.clone(), reporter)
            .recursive(config.recursive);
        for value in config.configuration_values() {
            discoverer.skip_path(Path::new(value));
        }
        discoverer
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Never emit this file as input. Ignored when the path does not exist.
    pub fn skip_path(&mut self, path: &Path) {
        if let Ok(resolved) = path.canonicalize() {
            self.skip_paths.insert(resolved);
        }
    }

    /// Discover every argument in order, sending units as they are read.
    /// Returns early if the receiving side hangs up.
    pub fn run(&self, arguments: Vec<String>, sender: Sender<RawUnit>) {
        for argument in arguments {
            if !self.discover_argument(&argument, &sender) {
                debug!("unit receiver closed, stopping discovery");
                break;
            }
        }
        // sender dropped here, closing the channel
    }

    fn discover_argument(&self, argument: &str, sender: &Sender<RawUnit>) -> bool {
        if self.format.is_raw_inline(argument) {
            return self.emit(RawUnit::new(self.default_name.clone(), argument), sender);
        }

        let path = Path::new(argument);
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(source) => {
                self.reporter.discovery_failed(&DiscoveryError::Stat {
                    path: argument.to_string(),
                    source,
                });
                return true;
            }
        };

        if metadata.is_dir() {
            self.discover_directory(path, sender)
        } else {
            if self.is_configuration_file(path) {
                self.reporter.unit_skipped(argument, "configuration file");
                return true;
            }
            self.read_file(path, sender)
        }
    }

    fn discover_directory(&self, dir: &Path, sender: &Sender<RawUnit>) -> bool {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(true)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    if e.loop_ancestor().is_some() {
                        warn!("symlink loop detected");
                    }
                    self.reporter.discovery_failed(&DiscoveryError::Walk(e));
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                if !self.recursive {
                    debug!(path = %entry.path().display(), "not descending into subdirectory");
                }
                continue;
            }

            let path = entry.path();
            let display = path.display().to_string();
            if self.is_configuration_file(path) {
                self.reporter.unit_skipped(&display, "configuration file");
                continue;
            }
            if !self.format.is_supported_file(&display) {
                self.reporter.unit_skipped(&display, "unsupported extension");
                continue;
            }
            if !self.read_file(path, sender) {
                return false;
            }
        }
        true
    }

    fn is_configuration_file(&self, path: &Path) -> bool {
        if self.skip_paths.is_empty() {
            return false;
        }
        match path.canonicalize() {
            Ok(resolved) => self.skip_paths.contains(&resolved),
            Err(_) => false,
        }
    }

    fn read_file(&self, path: &Path, sender: &Sender<RawUnit>) -> bool {
        let name = path.display().to_string();
        match std::fs::read(path) {
            Ok(data) => self.emit(RawUnit::new(name, data), sender),
            Err(source) => {
                self.reporter
                    .discovery_failed(&DiscoveryError::Read { path: name, source });
                true
            }
        }
    }

    fn emit(&self, unit: RawUnit, sender: &Sender<RawUnit>) -> bool {
        self.reporter.unit_discovered(&unit.name, unit.data.len());
        sender.send(unit).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input_format::JsonFormat;
    use crossbeam_channel::unbounded;
    use std::fs;

    fn discoverer() -> InputDiscoverer {
        InputDiscoverer::new(
            Arc::new(InputFormat::Json(JsonFormat::new())),
            "inline",
            Arc::new(Reporter::new()),
        )
    }

    fn discover(discoverer: &InputDiscoverer, args: Vec<String>) -> Vec<RawUnit> {
        let (tx, rx) = unbounded();
        discoverer.run(args, tx);
        rx.iter().collect()
    }

    #[test]
    fn test_inline_argument_uses_default_name() {
        let units = discover(&discoverer(), vec![r#"{"a": 1}"#.to_string()]);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "inline");
        assert_eq!(units[0].data, br#"{"a": 1}"#.to_vec());
    }

    #[test]
    fn test_directory_filters_extensions_and_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), "{}").unwrap();
        fs::write(dir.path().join("b.txt"), "nope").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.json"), "{}").unwrap();

        let args = vec![dir.path().to_str().unwrap().to_string()];
        let flat = discover(&discoverer(), args.clone());
        assert_eq!(flat.len(), 1);
        assert!(flat[0].name.ends_with("a.json"));

        let deep = discover(&discoverer().recursive(true), args);
        assert_eq!(deep.len(), 2);
    }

    #[test]
    fn test_configuration_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.json"), "{}").unwrap();
        let merge = dir.path().join("merge.json");
        fs::write(&merge, r#"{"x": 1}"#).unwrap();

        let mut discoverer = discoverer();
        discoverer.skip_path(&merge);
        let units = discover(&discoverer, vec![dir.path().to_str().unwrap().to_string()]);
        assert_eq!(units.len(), 1);
        assert!(units[0].name.ends_with("data.json"));

        let direct = discover(&discoverer, vec![merge.to_str().unwrap().to_string()]);
        assert!(direct.is_empty());
    }

    #[test]
    fn test_missing_path_is_skipped() {
        let reporter = Arc::new(Reporter::new());
        let discoverer = InputDiscoverer::new(
            Arc::new(InputFormat::Json(JsonFormat::new())),
            "inline",
            reporter.clone(),
        );
        let units = discover(&discoverer, vec!["/does/not/exist.json".to_string(), "{\"a\":1}".to_string()]);
        assert_eq!(units.len(), 1);
        assert_eq!(reporter.stats().units_skipped, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_does_not_hang() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), "{}").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();

        let units = discover(
            &discoverer().recursive(true),
            vec![dir.path().to_str().unwrap().to_string()],
        );
        assert_eq!(units.len(), 1);
    }
}
