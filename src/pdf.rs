use crate::canvas::Command;
use crate::error::PrintError;
use crate::types::{Color, Pt, Size};
use std::collections::HashMap;
use std::sync::Arc;

const PDF_CATALOG_ID: usize = 1;
const PDF_PAGES_ID: usize = 2;
const PDF_RESOURCES_ID: usize = 3;

/// A decoded raster payload for `draw_image`: straight-alpha samples
/// split into the RGB plane the sink embeds and the optional alpha plane
/// it attaches as a soft mask.
#[derive(Debug)]
pub struct ImageData {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

impl ImageData {
    /// Decodes PNG or JPEG bytes. The alpha plane is kept only when the
    /// payload actually uses it.
    pub fn decode(bytes: &[u8]) -> Result<Self, PrintError> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|err| PrintError::Image(format!("decode failed: {err}")))?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        let mut rgb = Vec::with_capacity((width as usize) * (height as usize) * 3);
        let mut alpha = Vec::with_capacity((width as usize) * (height as usize));
        let mut has_alpha = false;
        for pixel in rgba.pixels() {
            let [r, g, b, a] = pixel.0;
            rgb.push(r);
            rgb.push(g);
            rgb.push(b);
            alpha.push(a);
            if a != 255 {
                has_alpha = true;
            }
        }
        Ok(Self {
            width,
            height,
            rgb,
            alpha: has_alpha.then_some(alpha),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub(crate) fn rgb(&self) -> &[u8] {
        &self.rgb
    }

    pub(crate) fn alpha(&self) -> Option<&[u8]> {
        self.alpha.as_deref()
    }
}

struct OpenPage {
    size: Size,
    content: String,
}

/// Streaming writer for the finalized document. The byte buffer is
/// append-only: header at construction, image objects as they are first
/// used, one content stream + page object as each page closes, then
/// resources, page tree, catalog, xref and trailer at `finish`. After
/// `finish` nothing can be written.
pub(crate) struct PdfSink {
    buf: Vec<u8>,
    // Indexed by object id; 0 is the free object.
    offsets: Vec<usize>,
    next_id: usize,
    page_ids: Vec<usize>,
    current: Option<OpenPage>,
    closed: bool,

    // Named /ExtGState entries. The multiply blend state is written at
    // construction; fill/stroke opacity states are interned on demand.
    gs_resources: Vec<(String, usize)>,
    gs_name_map: HashMap<(u16, u16), String>,
    next_gs_index: usize,

    image_resources: Vec<(String, usize)>,
    // Keyed by the image allocation's address; the Arc is retained so the
    // address cannot be reused while the map is alive.
    image_name_map: HashMap<usize, (String, Arc<ImageData>)>,
    next_image_index: usize,
}

impl PdfSink {
    pub fn new() -> Self {
        let mut sink = Self {
            buf: Vec::new(),
            offsets: vec![0; PDF_RESOURCES_ID + 1],
            next_id: PDF_RESOURCES_ID + 1,
            page_ids: Vec::new(),
            current: None,
            closed: false,
            gs_resources: Vec::new(),
            gs_name_map: HashMap::new(),
            next_gs_index: 1,
            image_resources: Vec::new(),
            image_name_map: HashMap::new(),
            next_image_index: 1,
        };
        sink.buf.extend_from_slice(b"%PDF-1.7\n");
        sink.buf.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        // Multiply compositing is a fixed policy of the session: every
        // page's content starts by selecting this state.
        let blend_id = sink.alloc_ids(1);
        sink.write_object(blend_id, "<< /Type /ExtGState /BM /Multiply >>");
        sink.gs_resources.push(("GSm".to_string(), blend_id));
        sink
    }

    /// Opens the page framing region for a page of the given size.
    pub fn begin_page(&mut self, size: Size) {
        debug_assert!(self.current.is_none(), "sink page already open");
        debug_assert!(!self.closed, "sink already closed");
        let mut content = String::new();
        content.push_str("/GSm gs\n");
        self.current = Some(OpenPage { size, content });
    }

    /// Closes the page framing region: the content stream and the page
    /// object (with its own MediaBox; page sizes may vary) are written
    /// out. Returns the content stream size for metrics.
    pub fn end_page(&mut self) -> usize {
        let page = self.current.take().expect("sink page not open");
        let content_bytes = page.content.len();
        let start = self.alloc_ids(2);
        let content_id = start;
        let page_id = start + 1;
        self.write_object(content_id, &stream_object(&page.content));
        let page_obj = format!(
            "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources {} 0 R /Contents {} 0 R >>",
            PDF_PAGES_ID,
            fmt_pt(page.size.width),
            fmt_pt(page.size.height),
            PDF_RESOURCES_ID,
            content_id
        );
        self.write_object(page_id, &page_obj);
        self.page_ids.push(page_id);
        content_bytes
    }

    /// Appends one command's operators to the open page.
    pub fn append(&mut self, cmd: &Command) {
        match cmd {
            Command::SaveState => self.push_ops("q\n"),
            Command::RestoreState => self.push_ops("Q\n"),
            Command::Translate(x, y) => {
                let ops = format!("1 0 0 1 {} {} cm\n", fmt_pt(*x), fmt_pt(*y));
                self.push_ops(&ops);
            }
            Command::Scale(x, y) => {
                let ops = format!("{} 0 0 {} 0 0 cm\n", fmt(*x), fmt(*y));
                self.push_ops(&ops);
            }
            Command::Rotate(angle) => {
                let sin = libm::sinf(*angle);
                let cos = libm::cosf(*angle);
                let ops = format!(
                    "{} {} {} {} 0 0 cm\n",
                    fmt(cos),
                    fmt(sin),
                    fmt(-sin),
                    fmt(cos)
                );
                self.push_ops(&ops);
            }
            Command::ConcatMatrix { a, b, c, d, e, f } => {
                let ops = format!(
                    "{} {} {} {} {} {} cm\n",
                    fmt(*a),
                    fmt(*b),
                    fmt(*c),
                    fmt(*d),
                    fmt_pt(*e),
                    fmt_pt(*f)
                );
                self.push_ops(&ops);
            }
            Command::SetFillColor(color) => {
                let ops = color_ops(*color, "rg");
                self.push_ops(&ops);
            }
            Command::SetStrokeColor(color) => {
                let ops = color_ops(*color, "RG");
                self.push_ops(&ops);
            }
            Command::SetLineWidth(width) => {
                let ops = format!("{} w\n", fmt_pt(*width));
                self.push_ops(&ops);
            }
            Command::SetLineCap(cap) => {
                let ops = format!("{} J\n", cap);
                self.push_ops(&ops);
            }
            Command::SetLineJoin(join) => {
                let ops = format!("{} j\n", join);
                self.push_ops(&ops);
            }
            Command::SetMiterLimit(limit) => {
                let ops = format!("{} M\n", fmt_pt(*limit));
                self.push_ops(&ops);
            }
            Command::SetDash { pattern, phase } => {
                let pat = if pattern.is_empty() {
                    "[]".to_string()
                } else {
                    let items = pattern
                        .iter()
                        .map(|v| fmt_pt(*v))
                        .collect::<Vec<_>>()
                        .join(" ");
                    format!("[{}]", items)
                };
                let ops = format!("{} {} d\n", pat, fmt_pt(*phase));
                self.push_ops(&ops);
            }
            Command::SetOpacity { fill, stroke } => {
                // Quantized to 0..1000 so equal opacities share one state.
                let k = ((*fill * 1000.0).round() as i32).clamp(0, 1000) as u16;
                let ks = ((*stroke * 1000.0).round() as i32).clamp(0, 1000) as u16;
                let name = self.ensure_extgstate((k, ks));
                let ops = format!("/{} gs\n", name);
                self.push_ops(&ops);
            }
            Command::ClipRect {
                x,
                y,
                width,
                height,
            } => {
                let ops = format!(
                    "{} {} {} {} re W n\n",
                    fmt_pt(*x),
                    fmt_pt(*y),
                    fmt_pt(*width),
                    fmt_pt(*height)
                );
                self.push_ops(&ops);
            }
            Command::MoveTo { x, y } => {
                let ops = format!("{} {} m\n", fmt_pt(*x), fmt_pt(*y));
                self.push_ops(&ops);
            }
            Command::LineTo { x, y } => {
                let ops = format!("{} {} l\n", fmt_pt(*x), fmt_pt(*y));
                self.push_ops(&ops);
            }
            Command::CurveTo {
                x1,
                y1,
                x2,
                y2,
                x,
                y,
            } => {
                let ops = format!(
                    "{} {} {} {} {} {} c\n",
                    fmt_pt(*x1),
                    fmt_pt(*y1),
                    fmt_pt(*x2),
                    fmt_pt(*y2),
                    fmt_pt(*x),
                    fmt_pt(*y)
                );
                self.push_ops(&ops);
            }
            Command::ClosePath => self.push_ops("h\n"),
            Command::Fill => self.push_ops("f\n"),
            Command::FillEvenOdd => self.push_ops("f*\n"),
            Command::Stroke => self.push_ops("S\n"),
            Command::FillStroke => self.push_ops("B\n"),
            Command::DrawRect {
                x,
                y,
                width,
                height,
            } => {
                let ops = format!(
                    "{} {} {} {} re f\n",
                    fmt_pt(*x),
                    fmt_pt(*y),
                    fmt_pt(*width),
                    fmt_pt(*height)
                );
                self.push_ops(&ops);
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                image,
            } => {
                let name = self.ensure_image(image);
                let ops = format!(
                    "q\n{} 0 0 {} {} {} cm\n/{} Do\nQ\n",
                    fmt_pt(*width),
                    fmt_pt(*height),
                    fmt_pt(*x),
                    fmt_pt(*y),
                    name
                );
                self.push_ops(&ops);
            }
        }
    }

    /// Closes the sink permanently: shared resources, page tree, catalog,
    /// xref and trailer. No /Info object is written; the session's
    /// document metadata set is empty.
    pub fn finish(&mut self) {
        debug_assert!(self.current.is_none(), "sink finished with a page open");
        debug_assert!(!self.closed, "sink already closed");

        let mut resources = vec![format!(
            "/ExtGState {}",
            resource_dict(&self.gs_resources)
        )];
        if !self.image_resources.is_empty() {
            resources.push(format!("/XObject {}", resource_dict(&self.image_resources)));
        }
        self.write_object(PDF_RESOURCES_ID, &format!("<< {} >>", resources.join(" ")));

        let kids = self
            .page_ids
            .iter()
            .map(|id| format!("{} 0 R", id))
            .collect::<Vec<_>>()
            .join(" ");
        self.write_object(
            PDF_PAGES_ID,
            &format!(
                "<< /Type /Pages /Count {} /Kids [{}] >>",
                self.page_ids.len(),
                kids
            ),
        );
        self.write_object(
            PDF_CATALOG_ID,
            &format!("<< /Type /Catalog /Pages {} 0 R >>", PDF_PAGES_ID),
        );

        let total_objects = self.next_id.saturating_sub(1);
        let xref_start = self.buf.len();
        self.buf
            .extend_from_slice(format!("xref\n0 {}\n", total_objects + 1).as_bytes());
        self.buf.extend_from_slice(b"0000000000 65535 f \n");
        for id in 1..=total_objects {
            let obj_offset = self.offsets.get(id).copied().unwrap_or(0);
            self.buf
                .extend_from_slice(format!("{:010} 00000 n \n", obj_offset).as_bytes());
        }
        let trailer = format!(
            "trailer\n<< /Size {} /Root {} 0 R >>\nstartxref\n{}\n%%EOF",
            total_objects + 1,
            PDF_CATALOG_ID,
            xref_start
        );
        self.buf.extend_from_slice(trailer.as_bytes());
        self.closed = true;
    }

    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    fn push_ops(&mut self, ops: &str) {
        let page = self.current.as_mut().expect("sink page not open");
        page.content.push_str(ops);
    }

    fn ensure_extgstate(&mut self, key: (u16, u16)) -> String {
        if let Some(name) = self.gs_name_map.get(&key) {
            return name.clone();
        }
        let name = format!("GS{}", self.next_gs_index);
        self.next_gs_index += 1;
        let obj_id = self.alloc_ids(1);
        let body = format!(
            "<< /Type /ExtGState /ca {} /CA {} >>",
            fmt(key.0 as f32 / 1000.0),
            fmt(key.1 as f32 / 1000.0)
        );
        self.write_object(obj_id, &body);
        self.gs_resources.push((name.clone(), obj_id));
        self.gs_name_map.insert(key, name.clone());
        name
    }

    /// Embeds the image the first time it is seen; later draws of the
    /// same allocation reuse the XObject.
    fn ensure_image(&mut self, image: &Arc<ImageData>) -> String {
        let key = Arc::as_ptr(image) as usize;
        if let Some((name, _)) = self.image_name_map.get(&key) {
            return name.clone();
        }
        let smask_id = image.alpha().map(|alpha| {
            let id = self.alloc_ids(1);
            let dict = format!(
                "/Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceGray /BitsPerComponent 8",
                image.width(),
                image.height()
            );
            self.write_binary_stream(id, &dict, alpha);
            id
        });
        let id = self.alloc_ids(1);
        let mut dict = format!(
            "/Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceRGB /BitsPerComponent 8",
            image.width(),
            image.height()
        );
        if let Some(smask_id) = smask_id {
            dict.push_str(&format!(" /SMask {} 0 R", smask_id));
        }
        self.write_binary_stream(id, &dict, image.rgb());
        let name = format!("Im{}", self.next_image_index);
        self.next_image_index += 1;
        self.image_resources.push((name.clone(), id));
        self.image_name_map.insert(key, (name.clone(), image.clone()));
        name
    }

    fn ensure_offsets_len(&mut self, required_len: usize) {
        if self.offsets.len() < required_len {
            self.offsets.resize(required_len, 0);
        }
    }

    fn alloc_ids(&mut self, count: usize) -> usize {
        let start = self.next_id;
        self.next_id = self.next_id.saturating_add(count);
        self.ensure_offsets_len(self.next_id);
        start
    }

    fn write_object(&mut self, obj_id: usize, body: &str) {
        self.offsets[obj_id] = self.buf.len();
        self.buf
            .extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", obj_id, body).as_bytes());
    }

    fn write_binary_stream(&mut self, obj_id: usize, dict_entries: &str, data: &[u8]) {
        self.offsets[obj_id] = self.buf.len();
        self.buf.extend_from_slice(
            format!(
                "{} 0 obj\n<< {} /Length {} >>\nstream\n",
                obj_id,
                dict_entries,
                data.len()
            )
            .as_bytes(),
        );
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
    }
}

fn stream_object(content: &str) -> String {
    let length = content.len();
    format!("<< /Length {} >>\nstream\n{}\nendstream", length, content)
}

fn resource_dict(entries: &[(String, usize)]) -> String {
    let body = entries
        .iter()
        .map(|(name, id)| format!("/{} {} 0 R", name, id))
        .collect::<Vec<_>>()
        .join(" ");
    format!("<< {} >>", body)
}

fn color_ops(color: Color, op: &str) -> String {
    format!(
        "{} {} {} {}\n",
        fmt(clamp_unit(color.r)),
        fmt(clamp_unit(color.g)),
        fmt(clamp_unit(color.b)),
        op
    )
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn format_milli(milli: i64) -> String {
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.unsigned_abs();
    let int_part = abs / 1000;
    let frac = abs % 1000;
    if frac == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut out = format!("{}{}.{:03}", sign, int_part, frac);
        while out.ends_with('0') {
            out.pop();
        }
        out
    }
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let mut out = format!("{:.4}", value);
    while out.ends_with('0') {
        out.pop();
    }
    if out.ends_with('.') {
        out.pop();
    }
    if out == "-0" { "0".to_string() } else { out }
}
