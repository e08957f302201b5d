use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Type tag supplied by the caller when a document is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Doc,
    Txt,
    Xls,
    Xlsx,
    Ppt,
    Pptx,
}

/// Renderer family a format tag dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatFamily {
    Pdf,
    WordProcessor,
    Spreadsheet,
    Presentation,
    PlainText,
}

#[derive(Debug, Error)]
#[error("unsupported document format {0:?}")]
pub struct UnsupportedFormat(pub String);

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 8] = [
        DocumentFormat::Pdf,
        DocumentFormat::Docx,
        DocumentFormat::Doc,
        DocumentFormat::Txt,
        DocumentFormat::Xls,
        DocumentFormat::Xlsx,
        DocumentFormat::Ppt,
        DocumentFormat::Pptx,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Doc => "doc",
            DocumentFormat::Txt => "txt",
            DocumentFormat::Xls => "xls",
            DocumentFormat::Xlsx => "xlsx",
            DocumentFormat::Ppt => "ppt",
            DocumentFormat::Pptx => "pptx",
        }
    }

    pub fn family(self) -> FormatFamily {
        match self {
            DocumentFormat::Pdf => FormatFamily::Pdf,
            DocumentFormat::Docx | DocumentFormat::Doc => FormatFamily::WordProcessor,
            DocumentFormat::Txt => FormatFamily::PlainText,
            DocumentFormat::Xls | DocumentFormat::Xlsx => FormatFamily::Spreadsheet,
            DocumentFormat::Ppt | DocumentFormat::Pptx => FormatFamily::Presentation,
        }
    }

    /// Infers the tag from a file extension, if it has one we know.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

impl FromStr for DocumentFormat {
    type Err = UnsupportedFormat;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().trim_start_matches('.').to_ascii_lowercase();
        DocumentFormat::ALL
            .into_iter()
            .find(|format| format.tag() == normalized)
            .ok_or_else(|| UnsupportedFormat(raw.to_string()))
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
