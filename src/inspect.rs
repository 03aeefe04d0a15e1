use lopdf::{Document as LoDocument, Object};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InspectErrorCode {
    ParseFailed,
    IoError,
}

impl InspectErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectErrorCode::ParseFailed => "DOCUMENT_PARSE_FAILED",
            InspectErrorCode::IoError => "DOCUMENT_IO_ERROR",
        }
    }
}

#[derive(Debug)]
pub struct InspectError {
    pub code: InspectErrorCode,
    pub message: String,
}

impl std::fmt::Display for InspectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for InspectError {}

/// A structural summary of a finalized session document. Page sizes are
/// reported per page because a session may mix them.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentReport {
    pub pdf_version: String,
    pub page_count: usize,
    /// (width, height) in points, one entry per page, page order.
    pub media_boxes: Vec<(f32, f32)>,
    pub encrypted: bool,
    pub byte_size: usize,
}

/// Parses the byte buffer a finished session hands out. Only structural
/// facts are extracted; content streams are not interpreted.
pub fn inspect_document_bytes(bytes: &[u8]) -> Result<DocumentReport, InspectError> {
    let pdf = LoDocument::load_mem(bytes).map_err(|err| InspectError {
        code: InspectErrorCode::ParseFailed,
        message: err.to_string(),
    })?;

    let mut media_boxes = Vec::new();
    for (_number, page_id) in pdf.get_pages() {
        media_boxes.push(page_media_box(&pdf, page_id));
    }

    Ok(DocumentReport {
        pdf_version: pdf.version.clone(),
        page_count: media_boxes.len(),
        media_boxes,
        encrypted: pdf.is_encrypted(),
        byte_size: bytes.len(),
    })
}

pub fn inspect_document_path(path: &Path) -> Result<DocumentReport, InspectError> {
    let data = std::fs::read(path).map_err(|err| InspectError {
        code: InspectErrorCode::IoError,
        message: err.to_string(),
    })?;
    inspect_document_bytes(&data)
}

fn page_media_box(pdf: &LoDocument, page_id: lopdf::ObjectId) -> (f32, f32) {
    let corners = pdf
        .get_object(page_id)
        .ok()
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|dict| dict.get(b"MediaBox").ok())
        .and_then(|obj| obj.as_array().ok())
        .map(|values| values.iter().filter_map(number).collect::<Vec<f32>>())
        .unwrap_or_default();
    if corners.len() == 4 {
        (corners[2] - corners[0], corners[3] - corners[1])
    } else {
        (0.0, 0.0)
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PrintSession, Size};

    #[test]
    fn inspect_reads_version_and_page_sizes() {
        let mut session = PrintSession::new();
        session.begin_page(Size::letter()).expect("begin");
        session.finish_page();
        session.begin_page(Size::a4()).expect("begin");
        session.finish_page();
        session.finish_session();

        let bytes = session.document_data().expect("data");
        let report = inspect_document_bytes(bytes).expect("inspect");
        assert_eq!(report.page_count, 2);
        assert!(!report.encrypted);
        assert_eq!(report.byte_size, bytes.len());
        assert!(!report.pdf_version.is_empty());

        let (w, h) = report.media_boxes[0];
        assert!((w - 612.0).abs() < 0.01 && (h - 792.0).abs() < 0.01);
        let (w, h) = report.media_boxes[1];
        assert!((w - 595.28).abs() < 0.01 && (h - 841.89).abs() < 0.01);
    }

    #[test]
    fn inspect_rejects_malformed_data() {
        let err = inspect_document_bytes(b"not a document").expect_err("invalid");
        assert_eq!(err.code, InspectErrorCode::ParseFailed);
    }

    #[test]
    fn inspect_path_reports_io_error_for_missing_file() {
        let missing = std::env::temp_dir().join(format!(
            "platen_inspect_missing_{}_{}.pdf",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        let err = inspect_document_path(&missing).expect_err("missing");
        assert_eq!(err.code, InspectErrorCode::IoError);
    }

    #[test]
    fn inspect_path_matches_bytes_report() {
        let mut session = PrintSession::new();
        session
            .insert_blank_page(Size::from_inches(4.0, 6.0))
            .expect("blank page");
        session.finish_session();
        let bytes = session.document_data().expect("data").to_vec();

        let temp_dir = std::env::temp_dir().join(format!(
            "platen_inspect_path_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&temp_dir).expect("mkdir");
        let path = temp_dir.join("session.pdf");
        std::fs::write(&path, &bytes).expect("write");

        let from_path = inspect_document_path(&path).expect("inspect path");
        let from_bytes = inspect_document_bytes(&bytes).expect("inspect bytes");
        assert_eq!(from_path, from_bytes);
    }
}
