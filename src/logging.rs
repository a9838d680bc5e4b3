// src/logging.rs - Subscriber setup and error mail
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{warn, Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::StartupError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Error,
    Off,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "docflow=debug",
            LogLevel::Info => "docflow=info",
            LogLevel::Error => "docflow=error",
            LogLevel::Off => "off",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    pub level: LogLevel,
    pub file: Option<PathBuf>,
    pub quiet: bool,
    /// Recipient of the error report sent at shutdown
    pub mail: Option<String>,
}

impl LogSettings {
    pub fn effective_level(&self) -> LogLevel {
        if self.quiet {
            LogLevel::Off
        } else {
            self.level
        }
    }
}

type ErrorBuffer = Arc<Mutex<Vec<String>>>;

/// Collects ERROR events for the shutdown mail
struct MailLayer {
    buffer: ErrorBuffer,
}

impl<S: Subscriber> Layer<S> for MailLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::ERROR {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let line = format!(
            "{} {} {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            event.metadata().target(),
            visitor.finish()
        );
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.push(line);
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Returned by `init_logging`; `flush` must run once at shutdown
pub struct LogGuard {
    mail: Option<(String, ErrorBuffer)>,
}

impl LogGuard {
    fn new(mail: Option<(String, ErrorBuffer)>) -> Self {
        LogGuard { mail }
    }

    /// Number of ERROR events captured for mail
    pub fn pending_errors(&self) -> usize {
        match &self.mail {
            Some((_, buffer)) => buffer.lock().map(|b| b.len()).unwrap_or(0),
            None => 0,
        }
    }

    /// Send the collected errors, if any, through the local `sendmail`
    pub fn flush(&self) {
        let Some((recipient, buffer)) = &self.mail else {
            return;
        };
        let lines = match buffer.lock() {
            Ok(mut buffer) => std::mem::take(&mut *buffer),
            Err(_) => return,
        };
        if lines.is_empty() {
            return;
        }
        if let Err(e) = send_mail(recipient, &lines) {
            warn!(recipient = recipient.as_str(), "could not send error report: {}", e);
        }
    }
}

fn sender_address() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "docflow".to_string());
    let host = std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    format!("{}@{}", user, host)
}

fn compose_mail(recipient: &str, lines: &[String]) -> String {
    let mut message = String::new();
    let _ = writeln!(message, "To: {}", recipient);
    let _ = writeln!(message, "From: {}", sender_address());
    let _ = writeln!(message, "Subject: docflow error report");
    let _ = writeln!(message, "Date: {}", chrono::Local::now().to_rfc2822());
    let _ = writeln!(message, "Content-Type: text/plain; charset=utf-8");
    message.push('\n');
    for line in lines {
        message.push_str(line);
        message.push('\n');
    }
    message
}

fn send_mail(recipient: &str, lines: &[String]) -> std::io::Result<()> {
    let mut child = Command::new("sendmail")
        .arg("-t")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(compose_mail(recipient, lines).as_bytes())?;
    }
    let status = child.wait()?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("sendmail exited with {}", status),
        ))
    }
}

/// Install the global subscriber
pub fn init_logging(settings: &LogSettings) -> Result<LogGuard, StartupError> {
    let env_filter = EnvFilter::try_new(settings.effective_level().directive())
        .map_err(|e| StartupError::Logging(format!("invalid log filter: {}", e)))?;

    let mail = settings
        .mail
        .as_ref()
        .map(|recipient| (recipient.clone(), ErrorBuffer::default()));
    let mail_layer = mail.as_ref().map(|(_, buffer)| MailLayer {
        buffer: buffer.clone(),
    });

    match &settings.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| StartupError::Logging(format!("cannot open log file {}: {}", path.display(), e)))?;
            let fmt_layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false)
                .with_thread_names(true);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .with(mail_layer)
                .try_init()
                .map_err(|e| StartupError::Logging(e.to_string()))?;
        }
        None => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact();
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .with(mail_layer)
                .try_init()
                .map_err(|e| StartupError::Logging(e.to_string()))?;
        }
    }

    Ok(LogGuard::new(mail))
}
