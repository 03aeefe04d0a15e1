#[derive(Debug, Clone, Default)]
pub struct PageMetrics {
    pub page_number: usize,
    pub command_count: usize,
    pub content_bytes: usize,
    pub preview_width_px: u32,
    pub preview_height_px: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SessionMetrics {
    pub pages: Vec<PageMetrics>,
    /// Size of the finalized document. Zero until the session finishes.
    pub document_bytes: usize,
}
