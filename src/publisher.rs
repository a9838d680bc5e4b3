// src/publisher.rs - File and HTTP sinks
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PublishError, StartupError};
use crate::identifier::{id_text, record_id};
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::context::Record;
use crate::report::Reporter;

struct HttpSink {
    client: Client,
    address: String,
    method: Method,
}

/// Writes finished records to the configured sinks
pub struct Publisher {
    output_dir: Option<PathBuf>,
    http: Option<HttpSink>,
    id_key: String,
}

impl Publisher {
    /// Sets up the sinks; the output directory is created here, once
    pub fn new(config: &PipelineConfig) -> Result<Self, StartupError> {
        let output_dir = match &config.output {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|source| StartupError::OutputDir {
                    path: dir.clone(),
                    source,
                })?;
                debug!(dir = %dir.display(), "output directory ready");
                Some(dir.clone())
            }
            None => None,
        };

        let http = match &config.address {
            Some(address) => {
                let method = parse_verb(&config.http_verb)?;
                let client = Client::builder()
                    .build()
                    .map_err(|e| StartupError::config("address", format!("HTTP client setup failed: {}", e)))?;
                Some(HttpSink {
                    client,
                    address: address.clone(),
                    method,
                })
            }
            None => None,
        };

        Ok(Publisher {
            output_dir,
            http,
            id_key: config.uuid_key.clone(),
        })
    }

    pub fn has_sinks(&self) -> bool {
        self.output_dir.is_some() || self.http.is_some()
    }

    /// Existing id field, or one derived from the record content
    pub fn document_id(&self, record: &Record) -> String {
        match record.get(&self.id_key) {
            Some(value) if !value.is_null() => id_text(value),
            _ => record_id(record),
        }
    }

    /// Serialize and hand the record to every sink. Sink failures are
    /// reported and do not prevent the other sink from being tried.
    pub fn publish(&self, record: &Record, source: &str, reporter: &Reporter) -> Result<String, PublishError> {
        let id = self.document_id(record);
        let body = serde_json::to_string_pretty(record)?;

        if let Some(dir) = &self.output_dir {
            if let Err(err) = write_file(dir, &id, &body) {
                reporter.sink_failed(source, &err);
            }
        }

        if let Some(http) = &self.http {
            match http.send(&body) {
                Ok(status) => reporter.http_status(&id, status),
                Err(err) => reporter.sink_failed(source, &err),
            }
        }

        Ok(id)
    }
}

impl HttpSink {
    fn send(&self, body: &str) -> Result<u16, PublishError> {
        let response = self
            .client
            .request(self.method.clone(), &self.address)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .map_err(|source| PublishError::Http {
                verb: self.method.to_string(),
                address: self.address.clone(),
                source,
            })?;
        Ok(response.status().as_u16())
    }
}

fn parse_verb(verb: &str) -> Result<Method, StartupError> {
    Method::from_bytes(verb.trim().to_uppercase().as_bytes())
        .map_err(|_| StartupError::config("http-verb", format!("'{}' is not an HTTP method", verb)))
}

/// An id usable as a single file name inside the output directory
fn is_safe_file_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains('/')
        && !id.contains('\\')
        && !id.contains('\0')
}

fn write_file(dir: &Path, id: &str, body: &str) -> Result<(), PublishError> {
    if !is_safe_file_id(id) {
        return Err(PublishError::InvalidId(id.to_string()));
    }
    let path = dir.join(format!("{}.json", id));
    std::fs::write(&path, body).map_err(|source| PublishError::File { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::FormatConfig;
    use serde_json::{json, Value};

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    #[test]
    fn test_writes_id_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::new(FormatConfig::Json);
        config.output = Some(dir.path().join("out"));

        let publisher = Publisher::new(&config).unwrap();
        let reporter = Reporter::new();
        let id = publisher
            .publish(&record(json!({"id": "doc-1", "a": 1})), "inline", &reporter)
            .unwrap();

        assert_eq!(id, "doc-1");
        let written = std::fs::read_to_string(dir.path().join("out").join("doc-1.json")).unwrap();
        let parsed: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, json!({"id": "doc-1", "a": 1}));
        assert!(written.contains('\n'), "output is pretty printed");
    }

    #[test]
    fn test_derives_id_when_missing() {
        let config = PipelineConfig::new(FormatConfig::Json);
        let publisher = Publisher::new(&config).unwrap();
        let data = record(json!({"a": 1}));
        assert_eq!(publisher.document_id(&data), record_id(&data));
        assert!(!publisher.has_sinks());
    }

    #[test]
    fn test_numeric_id_is_used_as_text() {
        let config = PipelineConfig::new(FormatConfig::Json);
        let publisher = Publisher::new(&config).unwrap();
        assert_eq!(publisher.document_id(&record(json!({"id": 7}))), "7");
    }

    #[test]
    fn test_unsafe_id_is_a_sink_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::new(FormatConfig::Json);
        config.output = Some(dir.path().to_path_buf());

        let publisher = Publisher::new(&config).unwrap();
        let reporter = Reporter::new();
        publisher
            .publish(&record(json!({"id": "../escape"})), "inline", &reporter)
            .unwrap();

        assert_eq!(reporter.stats().sink_failures, 1);
        assert!(!dir.path().parent().unwrap().join("escape.json").exists());
    }

    #[test]
    fn test_http_verb_validation() {
        assert_eq!(parse_verb("put").unwrap(), Method::PUT);
        assert!(parse_verb("NOT A VERB").is_err());
    }

    /// Accepts one request, answers 201 and hands back the request line,
    /// the headers and the body
    fn serve_once(listener: std::net::TcpListener) -> (String, Vec<String>, String) {
        use std::io::{BufRead, BufReader, Read, Write};

        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();

        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end().to_string();
            if line.is_empty() {
                break;
            }
            headers.push(line);
        }

        let length = headers
            .iter()
            .find_map(|h| {
                let (name, value) = h.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().unwrap())
            })
            .unwrap_or(0);
        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).unwrap();

        let mut stream = stream;
        stream
            .write_all(b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .unwrap();

        (request_line.trim_end().to_string(), headers, String::from_utf8(body).unwrap())
    }

    #[test]
    fn test_http_sink_sends_configured_verb_and_json() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || serve_once(listener));

        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::new(FormatConfig::Json);
        config.output = Some(dir.path().to_path_buf());
        config.address = Some(format!("http://127.0.0.1:{}/docs", port));
        config.http_verb = "PUT".to_string();

        let publisher = Publisher::new(&config).unwrap();
        let reporter = Reporter::new();
        let data = record(json!({"id": "doc-7", "title": "seven"}));
        let id = publisher.publish(&data, "inline", &reporter).unwrap();

        let (request_line, headers, body) = server.join().unwrap();
        assert_eq!(request_line, "PUT /docs HTTP/1.1");
        assert!(
            headers
                .iter()
                .any(|h| h.to_ascii_lowercase() == "content-type: application/json"),
            "headers were {:?}",
            headers
        );
        assert_eq!(body, serde_json::to_string_pretty(&data).unwrap());

        assert_eq!(id, "doc-7");
        assert_eq!(reporter.stats().sink_failures, 0);
        let written = std::fs::read_to_string(dir.path().join("doc-7.json")).unwrap();
        assert_eq!(written, body);
    }

    #[test]
    fn test_unreachable_address_does_not_fail_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::new(FormatConfig::Json);
        config.output = Some(dir.path().to_path_buf());
        config.address = Some("http://127.0.0.1:9/never".to_string());

        let publisher = Publisher::new(&config).unwrap();
        let reporter = Reporter::new();
        let id = publisher
            .publish(&record(json!({"id": "x1"})), "inline", &reporter)
            .unwrap();

        assert_eq!(id, "x1");
        assert!(dir.path().join("x1.json").exists());
        assert_eq!(reporter.stats().sink_failures, 1);
    }
}
