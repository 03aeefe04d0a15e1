use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// JSON-lines event log for a single session. The session owns it
/// exclusively, so no synchronization is involved; events are buffered
/// and flushed when the session finishes.
pub(crate) struct SessionLog {
    writer: BufWriter<File>,
    counters: HashMap<String, u64>,
}

impl SessionLog {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            counters: HashMap::new(),
        })
    }

    pub fn log_json(&mut self, json: &str) {
        let _ = writeln!(self.writer, "{json}");
    }

    pub fn increment(&mut self, key: &str, amount: u64) {
        let entry = self.counters.entry(key.to_string()).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Drains the counters into one summary line.
    pub fn emit_summary(&mut self, context: &str) {
        let mut counters: Vec<(String, u64)> = self.counters.drain().collect();
        counters.sort_by(|a, b| a.0.cmp(&b.0));
        let counts_json = if counters.is_empty() {
            "{}".to_string()
        } else {
            let mut out = String::from("{");
            for (idx, (key, value)) in counters.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                out.push_str(&format!("\"{}\":{}", json_escape(key), value));
            }
            out.push('}');
            out
        };
        let json = format!(
            "{{\"type\":\"session.summary\",\"context\":\"{}\",\"counts\":{}}}",
            json_escape(context),
            counts_json
        );
        let _ = writeln!(self.writer, "{json}");
    }

    pub fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

pub(crate) fn json_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}
