//! `sealedctl` commands.
//!
//! `decode` and `encode` work on newline-delimited JSON: one document per
//! line, one result per line on stdout. A line that fails is reported on
//! stderr as `line N: <error>` and processing continues with the next one;
//! the command fails at the end if any line did.

mod format;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::cli::Command;
use crate::json::{DecodeError, EncodeError};
use crate::schema::{HierarchyFile, SchemaError, Variant};
use crate::sealed::SealedAdapter;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("failed to open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("{failed} of {total} documents failed")]
    Failed { failed: usize, total: usize },
}

/// Why a single line failed.
#[derive(Debug, thiserror::Error)]
enum LineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("invalid variant: {0}")]
    Variant(#[from] serde_json::Error),
}

/// Counts of non-blank lines seen and lines that failed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub processed: usize,
    pub failed: usize,
}

impl Summary {
    fn into_result(self) -> Result<(), CommandError> {
        if self.failed > 0 {
            return Err(CommandError::Failed {
                failed: self.failed,
                total: self.processed,
            });
        }
        Ok(())
    }
}

/// Run a parsed command against stdin/stdout/stderr.
pub fn run(command: Command) -> Result<(), CommandError> {
    match command {
        Command::Check { hierarchy } => {
            let table = HierarchyFile::load(&hierarchy)?.table()?;
            format::print_table(&table, &mut io::stdout().lock())?;
            Ok(())
        }
        Command::Decode {
            hierarchy,
            input,
            strict,
        } => {
            let mut adapter = HierarchyFile::load(&hierarchy)?.build()?;
            if strict {
                adapter = adapter.strict();
            }
            let input = open_input(input.as_deref())?;
            decode(&adapter, input, &mut io::stdout().lock(), &mut io::stderr().lock())?
                .into_result()
        }
        Command::Encode { hierarchy, input } => {
            let adapter = HierarchyFile::load(&hierarchy)?.build()?;
            let input = open_input(input.as_deref())?;
            encode(&adapter, input, &mut io::stdout().lock(), &mut io::stderr().lock())?
                .into_result()
        }
    }
}

/// Decode each line into a [`Variant`] and print it as JSON (`null` for
/// documents the hierarchy maps to nothing).
pub fn decode(
    adapter: &SealedAdapter<Variant>,
    input: impl BufRead,
    out: &mut impl Write,
    errors: &mut impl Write,
) -> Result<Summary, CommandError> {
    process_lines(input, out, errors, |line| {
        Ok(match adapter.from_json(line)? {
            Some(variant) => serde_json::to_string(&variant)?,
            None => "null".to_string(),
        })
    })
}

/// Parse each line as a [`Variant`] and print its discriminated encoding.
pub fn encode(
    adapter: &SealedAdapter<Variant>,
    input: impl BufRead,
    out: &mut impl Write,
    errors: &mut impl Write,
) -> Result<Summary, CommandError> {
    process_lines(input, out, errors, |line| {
        let variant: Variant = serde_json::from_str(line)?;
        Ok(adapter.to_json(&variant)?)
    })
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead>, CommandError> {
    match path {
        Some(path) => {
            let file = File::open(path).map_err(|source| CommandError::Open {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(io::stdin().lock())),
    }
}

fn process_lines(
    input: impl BufRead,
    out: &mut impl Write,
    errors: &mut impl Write,
    mut convert: impl FnMut(&str) -> Result<String, LineError>,
) -> Result<Summary, CommandError> {
    let mut summary = Summary::default();
    for (index, line) in input.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.processed += 1;
        match convert(line) {
            Ok(output) => writeln!(out, "{output}")?,
            Err(e) => {
                summary.failed += 1;
                tracing::debug!(line = index + 1, error = %e, "document failed");
                writeln!(errors, "line {}: {e}", index + 1)?;
            }
        }
    }
    out.flush()?;
    tracing::debug!(processed = summary.processed, failed = summary.failed, "input finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    const HIERARCHY: &str = r#"{
        "subtypes": [
            {"name": "Success", "label": "success", "alternate_labels": ["successful"]},
            {"name": "Error", "label": "error"},
            {"name": "Unknown", "label": "unknown", "singleton": true}
        ]
    }"#;

    fn adapter() -> SealedAdapter<Variant> {
        HierarchyFile::parse(HIERARCHY).unwrap().build().unwrap()
    }

    fn run_decode(adapter: &SealedAdapter<Variant>, input: &str) -> (Summary, String, String) {
        let mut out = Vec::new();
        let mut errors = Vec::new();
        let summary = decode(adapter, input.as_bytes(), &mut out, &mut errors).unwrap();
        (
            summary,
            String::from_utf8(out).unwrap(),
            String::from_utf8(errors).unwrap(),
        )
    }

    #[test]
    fn decode_prints_one_variant_per_line() {
        let input = concat!(
            r#"{"type":"successful","value":"Okay!"}"#,
            "\n\n",
            r#"{"type":"unknown"}"#,
            "\n",
            "null\n",
        );
        let (summary, out, errors) = run_decode(&adapter(), input);
        assert_eq!(
            summary,
            Summary {
                processed: 3,
                failed: 0
            }
        );
        assert_eq!(
            out,
            concat!(
                r#"{"subtype":"Success","fields":{"value":"Okay!"}}"#,
                "\n",
                r#"{"subtype":"Unknown"}"#,
                "\n",
                "null\n",
            )
        );
        assert_eq!(errors, "");
    }

    #[test]
    fn decode_reports_bad_lines_and_continues() {
        let input = concat!(
            r#"{"type":"taco"}"#,
            "\n",
            "{not json\n",
            r#"{"type":"error","error_logs":{"order":66}}"#,
            "\n",
        );
        let (summary, out, errors) = run_decode(&adapter(), input);
        assert_eq!(
            summary,
            Summary {
                processed: 3,
                failed: 2
            }
        );
        assert_eq!(
            out,
            "{\"subtype\":\"Error\",\"fields\":{\"error_logs\":{\"order\":66}}}\n"
        );
        let errors: Vec<&str> = errors.lines().collect();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("line 1: expected one of [success, successful, error, unknown]"));
        assert!(errors[1].starts_with("line 2: "));

        assert!(matches!(
            summary.into_result().unwrap_err(),
            CommandError::Failed { failed: 2, total: 3 }
        ));
    }

    #[test]
    fn strict_decode_rejects_extra_singleton_fields() {
        let (summary, _, errors) =
            run_decode(&adapter().strict(), r#"{"type":"unknown","extra":true}"#);
        assert_eq!(summary.failed, 1);
        assert!(errors.contains("'extra'"));
    }

    #[test]
    fn encode_writes_discriminated_documents() {
        let input = concat!(
            r#"{"subtype":"Success","fields":{"value":"Okay!"}}"#,
            "\n",
            r#"{"subtype":"Unknown"}"#,
            "\n",
            r#"{"subtype":"Taco"}"#,
            "\n",
            "[]\n",
        );
        let mut out = Vec::new();
        let mut errors = Vec::new();
        let summary = encode(&adapter(), input.as_bytes(), &mut out, &mut errors).unwrap();
        assert_eq!(summary.failed, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            concat!(
                r#"{"type":"success","value":"Okay!"}"#,
                "\n",
                r#"{"type":"unknown"}"#,
                "\n",
            )
        );
        let errors = String::from_utf8(errors).unwrap();
        assert!(errors.contains("line 3: expected one of [Success, Error, Unknown] but found subtype 'Taco'"));
        assert!(errors.contains("line 4: invalid variant"));
    }

    #[test]
    fn open_input_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.ndjson");
        let err = open_input(Some(missing.as_path())).err().unwrap();
        assert!(matches!(err, CommandError::Open { .. }));
    }

    #[test]
    fn reads_input_files() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"type":"success","value":"from disk"}}"#).unwrap();
        let input = open_input(Some(file.path())).unwrap();
        let mut out = Vec::new();
        let summary = decode(&adapter(), input, &mut out, &mut io::sink()).unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"subtype\":\"Success\",\"fields\":{\"value\":\"from disk\"}}\n"
        );
    }
}
