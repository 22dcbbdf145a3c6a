use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    Hocr,
    Docx,
    #[default]
    Xlsx,
    Text,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 5] = [
        ExportFormat::Pdf,
        ExportFormat::Hocr,
        ExportFormat::Docx,
        ExportFormat::Xlsx,
        ExportFormat::Text,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Hocr => "hocr",
            ExportFormat::Docx => "docx",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Text => "txt",
        }
    }

    /// PDF output renders every page, which reports three times as many steps.
    pub fn progress_total(self, pages: usize) -> usize {
        match self {
            ExportFormat::Pdf => pages * 3 + 1,
            _ => pages + 1,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(ExportFormat::Pdf),
            "hocr" => Ok(ExportFormat::Hocr),
            "docx" => Ok(ExportFormat::Docx),
            "xlsx" => Ok(ExportFormat::Xlsx),
            "txt" | "text" => Ok(ExportFormat::Text),
            _ => Err(SessionError::InvalidArgument {
                what: "export format",
                value: s.to_string(),
            }),
        }
    }
}

/// Inclusive, 1-based page range as shown in the download panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub min: usize,
    pub max: usize,
    page_count: usize,
}

impl PageRange {
    pub fn all(page_count: usize) -> Self {
        Self {
            min: 1,
            max: page_count,
            page_count,
        }
    }

    /// Normalizes raw min/max inputs; anything unusable falls back to the full range.
    pub fn from_inputs(min_raw: &str, max_raw: &str, page_count: usize) -> Self {
        let parse = |raw: &str| raw.trim().parse::<usize>().ok();
        let valid = |value: usize| value >= 1 && value <= page_count;

        let max = parse(max_raw).filter(|&v| valid(v)).unwrap_or(page_count);
        let mut min = parse(min_raw).filter(|&v| valid(v)).unwrap_or(1);
        if min > max {
            min = max;
        }
        Self {
            min,
            max,
            page_count,
        }
    }

    pub fn is_all(&self) -> bool {
        self.min <= 1 && self.max >= self.page_count
    }

    pub fn len(&self) -> usize {
        if self.max < self.min {
            0
        } else {
            self.max - self.min + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero-based first and last page indices.
    pub fn indices(&self) -> (usize, usize) {
        (self.min.saturating_sub(1), self.max.saturating_sub(1))
    }

    pub fn label(&self) -> String {
        if self.is_all() {
            " Pages: All".to_string()
        } else {
            format!(" Pages: {}\u{2013}{}", self.min, self.max)
        }
    }
}

/// Replaces a trailing extension of one to four word characters.
pub fn replace_extension(file_name: &str, extension: &str) -> String {
    let stem = match file_name.rfind('.') {
        Some(dot) => {
            let ext = &file_name[dot + 1..];
            let word_like = ext
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
            if (1..=4).contains(&ext.len()) && word_like {
                &file_name[..dot]
            } else {
                file_name
            }
        }
        None => file_name,
    };
    format!("{}.{}", stem, extension)
}

/// What the engine is asked to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub format: ExportFormat,
    pub file_name: String,
    pub first_page: usize,
    pub last_page: usize,
}

/// Raw download panel inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub format: ExportFormat,
    pub file_name: String,
    pub min_page: String,
    pub max_page: String,
}

impl DownloadRequest {
    pub fn all_pages(format: ExportFormat, file_name: impl Into<String>) -> Self {
        Self {
            format,
            file_name: file_name.into(),
            min_page: String::new(),
            max_page: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_inputs_fall_back_to_full_range() {
        let range = PageRange::from_inputs("", "abc", 12);
        assert_eq!((range.min, range.max), (1, 12));
        assert!(range.is_all());
        assert_eq!(range.label(), " Pages: All");

        let range = PageRange::from_inputs("0", "13", 12);
        assert_eq!((range.min, range.max), (1, 12));
    }

    #[test]
    fn min_above_max_collapses_to_max() {
        let range = PageRange::from_inputs("9", "4", 12);
        assert_eq!((range.min, range.max), (4, 4));
        assert_eq!(range.len(), 1);
        assert_eq!(range.label(), " Pages: 4\u{2013}4");
        assert_eq!(range.indices(), (3, 3));
    }

    #[test]
    fn partial_range_has_dash_label() {
        let range = PageRange::from_inputs("2", " 5 ", 12);
        assert!(!range.is_all());
        assert_eq!(range.label(), " Pages: 2\u{2013}5");
        assert_eq!(range.len(), 4);
    }

    #[test]
    fn progress_totals_depend_on_format() {
        assert_eq!(ExportFormat::Pdf.progress_total(4), 13);
        assert_eq!(ExportFormat::Xlsx.progress_total(4), 5);
        assert_eq!(ExportFormat::Hocr.progress_total(0), 1);
    }

    #[test]
    fn extension_replacement_matches_short_extensions_only() {
        assert_eq!(replace_extension("scan.pdf", "xlsx"), "scan.xlsx");
        assert_eq!(replace_extension("scan.jpeg", "hocr"), "scan.hocr");
        assert_eq!(replace_extension("scan", "txt"), "scan.txt");
        assert_eq!(replace_extension("v1.archive", "pdf"), "v1.archive.pdf");
    }

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!("HOCR".parse::<ExportFormat>().unwrap(), ExportFormat::Hocr);
        assert_eq!("text".parse::<ExportFormat>().unwrap(), ExportFormat::Text);
        assert!("bmp".parse::<ExportFormat>().is_err());
    }
}
