// src/cli.rs - Command line surface
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::{LogLevel, LogSettings};
use crate::pipeline::config::{split_list, split_optional_list, FormatConfig, PipelineConfig};

#[derive(Parser, Debug)]
#[command(name = "docflow")]
#[command(about = "Turn files, directories and piped data into JSON documents and publish them")]
#[command(version)]
#[command(subcommand_required = true, arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// HTTP endpoint receiving each document
    #[arg(long, global = true, value_name = "URL")]
    pub address: Option<String>,

    /// Maximum number of records processed at once
    #[arg(short = 'c', long, global = true, default_value_t = 2,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub concurrency: u32,

    /// Comma separated keys removed from every record
    #[arg(long, global = true, value_name = "KEYS")]
    pub exclude: Option<String>,

    /// Name used for inline and piped input
    #[arg(long, global = true, default_value = "inline")]
    pub filename: String,

    /// Comma separated keys kept in every record
    #[arg(long, global = true, value_name = "KEYS")]
    pub include: Option<String>,

    /// Starlark script file (or inline code) defining `functions`
    #[arg(long, global = true, alias = "js", value_name = "SCRIPT")]
    pub script: Option<String>,

    /// HTTP method for the address sink
    #[arg(long, global = true, default_value = "POST")]
    pub http_verb: String,

    /// JSON object (file or inline) renaming keys old -> new
    #[arg(long, global = true, value_name = "JSON")]
    pub key_map: Option<String>,

    /// JSON object (file or inline) merged into every record
    #[arg(long, global = true, value_name = "JSON")]
    pub merge: Option<String>,

    /// Filename pattern document (file or inline)
    #[arg(long, global = true, value_name = "JSON")]
    pub name_pattern: Option<String>,

    /// Directory receiving one <id>.json per record
    #[arg(short = 'o', long, global = true, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Key holding the record inside the wrapper
    #[arg(long, global = true, default_value = "data")]
    pub payload_key: String,

    /// Add a content derived id to every record
    #[arg(long, global = true)]
    pub uuid: bool,

    /// Comma separated keys the id is derived from
    #[arg(long, global = true, value_name = "KEYS")]
    pub uuid_keys: Option<String>,

    /// Field holding the id
    #[arg(long, global = true, default_value = "id")]
    pub uuid_key: String,

    /// JSON object (file or inline) the record is wrapped in
    #[arg(long, global = true, value_name = "JSON")]
    pub wrapper: Option<String>,

    /// Descend into subdirectories
    #[arg(short = 'r', long, global = true)]
    pub recursive: bool,

    /// JSON schema: file, file:// or http(s):// URL, or inline
    #[arg(long, global = true, value_name = "SCHEMA")]
    pub schema: Option<String>,

    /// Disable logging
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Append log output to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Mail collected errors to this address at exit
    #[arg(long, global = true, value_name = "ADDRESS")]
    pub log_mail: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Delimited text, one record per row
    Csv(CsvArgs),
    /// One JSON object per input
    Json(InputArgs),
    /// Free text, one record per input
    #[command(alias = "txt")]
    Text(TextArgs),
}

#[derive(Args, Debug)]
pub struct InputArgs {
    /// Files, directories or inline data
    #[arg(value_name = "INPUT")]
    pub inputs: Vec<String>,
}

#[derive(Args, Debug)]
pub struct CsvArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Field delimiter (`\t` for tab)
    #[arg(long, default_value = ",")]
    pub delimiter: String,

    /// Comment character, empty to disable
    #[arg(long, default_value = "#")]
    pub comment: String,

    /// Header file or inline comma separated header
    #[arg(long)]
    pub header: Option<String>,

    /// Leading non-blank lines to skip
    #[arg(long, default_value_t = 0)]
    pub skip: usize,
}

#[derive(Args, Debug)]
pub struct TextArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Key holding the text
    #[arg(long, default_value = "text")]
    pub key: String,

    /// Regex (or file containing one) selecting the text to keep
    #[arg(long)]
    pub pattern: Option<String>,
}

impl Cli {
    pub fn into_settings(self) -> (PipelineConfig, LogSettings) {
        let (format, inputs) = match self.command {
            Command::Csv(args) => (
                FormatConfig::Csv {
                    delimiter: args.delimiter,
                    comment: args.comment,
                    header: args.header,
                    skip: args.skip,
                },
                args.input.inputs,
            ),
            Command::Json(args) => (FormatConfig::Json, args.inputs),
            Command::Text(args) => (
                FormatConfig::Text {
                    key: args.key,
                    pattern: args.pattern,
                },
                args.input.inputs,
            ),
        };

        let mut config = PipelineConfig::new(format);
        config.inputs = inputs;
        config.concurrency = self.concurrency as usize;
        config.recursive = self.recursive;
        config.default_name = self.filename;
        config.include = split_optional_list(self.include.as_deref());
        config.exclude = self.exclude.as_deref().map(split_list).unwrap_or_default();
        config.key_map = self.key_map;
        config.merge = self.merge;
        config.wrapper = self.wrapper;
        config.payload_key = self.payload_key;
        config.name_pattern = self.name_pattern;
        config.uuid = self.uuid;
        config.uuid_keys = split_optional_list(self.uuid_keys.as_deref());
        config.uuid_key = self.uuid_key;
        config.script = self.script;
        config.schema = self.schema;
        config.output = self.output;
        config.address = self.address;
        config.http_verb = self.http_verb;

        let log = LogSettings {
            level: self.log_level,
            file: self.log_file,
            quiet: self.quiet,
            mail: self.log_mail,
        };

        (config, log)
    }
}
