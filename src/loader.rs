//! Document loading by file extension.
//!
//! The loader resolves a file path to plain text the extraction engine can
//! work with. Dispatch is extension based: `.txt` and `.md` are read as-is,
//! `.pdf` goes through `pdf-extract`, and `.csv` rows are flattened into one
//! line per record. Any other extension is reported as an unsupported format,
//! which is the only failure the conversion stage treats as skippable.

use std::path::Path;

use thiserror::Error;

/// Errors raised while resolving a file path to plain text.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The extension does not map to a supported reader.
    #[error("unsupported file extension '{extension}' for {path}")]
    UnsupportedFormat {
        /// Path of the rejected file.
        path: String,
        /// Lowercased extension, empty when the file has none.
        extension: String,
    },
    /// Reading the file from disk failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path of the unreadable file.
        path: String,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
    /// Text extraction from a PDF failed.
    #[error("failed to extract text from {path}: {source}")]
    Pdf {
        /// Path of the offending PDF.
        path: String,
        /// Underlying extraction error.
        #[source]
        source: pdf_extract::OutputError,
    },
    /// Parsing a CSV file failed.
    #[error("failed to parse {path}: {source}")]
    Csv {
        /// Path of the offending CSV file.
        path: String,
        /// Underlying parser error.
        #[source]
        source: csv::Error,
    },
}

/// Load a document as plain text, dispatching on the file extension.
pub fn load_document(path: &Path) -> Result<String, LoaderError> {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    tracing::debug!(path = %path.display(), extension = %extension, "Loading document");

    match extension.as_str() {
        "txt" | "md" => read_text(path),
        "pdf" => read_pdf(path),
        "csv" => read_csv(path),
        _ => Err(LoaderError::UnsupportedFormat {
            path: display_path(path),
            extension,
        }),
    }
}

fn read_text(path: &Path) -> Result<String, LoaderError> {
    std::fs::read_to_string(path).map_err(|source| LoaderError::Io {
        path: display_path(path),
        source,
    })
}

fn read_pdf(path: &Path) -> Result<String, LoaderError> {
    pdf_extract::extract_text(path).map_err(|source| LoaderError::Pdf {
        path: display_path(path),
        source,
    })
}

/// Flatten CSV rows into `field: value` lines so retrieval sees one record
/// per text block. Headers become the field labels; files without headers
/// fall back to positional labels.
fn read_csv(path: &Path) -> Result<String, LoaderError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|source| LoaderError::Csv {
            path: display_path(path),
            source,
        })?;

    let headers: Vec<String> = match reader.headers() {
        Ok(headers) => headers.iter().map(str::to_string).collect(),
        Err(source) => {
            return Err(LoaderError::Csv {
                path: display_path(path),
                source,
            });
        }
    };

    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| LoaderError::Csv {
            path: display_path(path),
            source,
        })?;
        let line = record
            .iter()
            .enumerate()
            .map(|(column, value)| match headers.get(column) {
                Some(header) if !header.is_empty() => format!("{header}: {value}"),
                _ => format!("column_{column}: {value}"),
            })
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(line);
    }

    Ok(lines.join("\n"))
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}
