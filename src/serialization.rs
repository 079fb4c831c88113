//! Rendering of run results.
//!
//! Nodes (or extracted values, when extraction was requested) are written as
//! plain text, a JSON array or NDJSON.

use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::node::Node;

/// Error type for serialization operations
#[derive(Debug)]
pub enum SerializationError {
    JsonError(serde_json::Error),
    IoError(std::io::Error),
}

impl From<serde_json::Error> for SerializationError {
    fn from(err: serde_json::Error) -> Self {
        SerializationError::JsonError(err)
    }
}

impl From<std::io::Error> for SerializationError {
    fn from(err: std::io::Error) -> Self {
        SerializationError::IoError(err)
    }
}

impl std::fmt::Display for SerializationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerializationError::JsonError(e) => write!(f, "JSON error: {}", e),
            SerializationError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for SerializationError {}

/// Output format for rendered results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One `id<TAB>type<TAB>label` line per node
    #[default]
    Text,
    /// A single JSON array
    Json,
    /// One JSON document per line
    Ndjson,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "ndjson" => Ok(OutputFormat::Ndjson),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

/// NDJSON (Newline Delimited JSON) writer
///
/// Writes values as NDJSON, one JSON document per line.
pub struct NdjsonWriter<W: Write> {
    writer: W,
}

impl<W: Write> NdjsonWriter<W> {
    /// Create a new NDJSON writer
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a single value as an NDJSON line
    pub fn write<T: Serialize>(&mut self, value: &T) -> Result<(), SerializationError> {
        let json = serde_json::to_string(value)?;
        writeln!(self.writer, "{}", json)?;
        Ok(())
    }

    /// Write multiple values
    pub fn write_all<T: Serialize>(
        &mut self,
        values: &[T],
    ) -> Result<(), SerializationError> {
        for value in values {
            self.write(value)?;
        }
        Ok(())
    }

    /// Flush the underlying writer
    pub fn flush(&mut self) -> Result<(), SerializationError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// JSON array writer
///
/// Writes values as a JSON array.
pub struct JsonArrayWriter<W: Write> {
    writer: W,
    first: bool,
}

impl<W: Write> JsonArrayWriter<W> {
    /// Create a new JSON array writer and write the opening bracket
    pub fn new(mut writer: W) -> Result<Self, SerializationError> {
        write!(writer, "[")?;
        Ok(Self {
            writer,
            first: true,
        })
    }

    /// Write a single value to the JSON array
    pub fn write<T: Serialize>(&mut self, value: &T) -> Result<(), SerializationError> {
        if !self.first {
            write!(self.writer, ",")?;
        }
        self.first = false;

        let json = serde_json::to_string(value)?;
        write!(self.writer, "{}", json)?;
        Ok(())
    }

    /// Finish writing the array and close the bracket
    pub fn finish(mut self) -> Result<(), SerializationError> {
        writeln!(self.writer, "]")?;
        self.writer.flush()?;
        Ok(())
    }
}

fn render<W, T, F>(
    writer: W,
    format: OutputFormat,
    items: &[T],
    text: F,
) -> Result<(), SerializationError>
where
    W: Write,
    T: Serialize,
    F: Fn(&T) -> String,
{
    match format {
        OutputFormat::Text => {
            let mut writer = writer;
            for item in items {
                writeln!(writer, "{}", text(item))?;
            }
            writer.flush()?;
        }
        OutputFormat::Json => {
            let mut array = JsonArrayWriter::new(writer)?;
            for item in items {
                array.write(item)?;
            }
            array.finish()?;
        }
        OutputFormat::Ndjson => {
            let mut ndjson = NdjsonWriter::new(writer);
            ndjson.write_all(items)?;
            ndjson.flush()?;
        }
    }
    Ok(())
}

/// Write nodes in the given format.
pub fn render_nodes<W: Write>(
    writer: W,
    format: OutputFormat,
    nodes: &[Node],
) -> Result<(), SerializationError> {
    render(writer, format, nodes, |node| {
        format!("{}\t{}\t{}", node.id(), node.node_type(), node.label())
    })
}

/// Write extracted values in the given format.
pub fn render_values<W: Write>(
    writer: W,
    format: OutputFormat,
    values: &[String],
) -> Result<(), SerializationError> {
    render(writer, format, values, |value| value.clone())
}
