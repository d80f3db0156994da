//! ZPL II command builder
//!
//! Provides a fluent API for composing label formats and the dynamic
//! fragments spliced into stored templates.

/// ZPL II command builder
///
/// Accumulates commands as text. Field-level commands chain on a single
/// line until [`field_data`](ZplBuilder::field_data) terminates the field.
pub struct ZplBuilder {
    buf: String,
}

impl ZplBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self {
            buf: String::with_capacity(512),
        }
    }

    // === Format Control ===

    /// Begin a label format (`^XA`)
    pub fn start_format(&mut self) -> &mut Self {
        self.buf.push_str("^XA\n");
        self
    }

    /// End a label format (`^XZ`)
    pub fn end_format(&mut self) -> &mut Self {
        self.buf.push_str("^XZ\n");
        self
    }

    // === Field Commands ===

    /// Position the next field (`^FO`), in dots from the label origin
    pub fn field_origin(&mut self, x: u32, y: u32) -> &mut Self {
        self.buf.push_str(&format!("^FO{},{}", x, y));
        self
    }

    /// Barcode field defaults (`^BY`): module width in dots, wide-bar
    /// ratio, bar height in dots
    pub fn bar_defaults(&mut self, module: f32, ratio: f32, height: u32) -> &mut Self {
        self.buf.push_str(&format!("^BY{},{},{}", module, ratio, height));
        self
    }

    /// Code 128 barcode (`^BC`), normal orientation
    ///
    /// `interpretation` prints the human-readable line under the bars.
    pub fn code128(&mut self, height: u32, interpretation: bool) -> &mut Self {
        let line = if interpretation { 'Y' } else { 'N' };
        self.buf.push_str(&format!("^BCN,{},{},N,N", height, line));
        self
    }

    /// Scalable font (`^A0`), normal orientation, height and width in dots
    pub fn font(&mut self, height: u32, width: u32) -> &mut Self {
        self.buf.push_str(&format!("^A0N,{},{}", height, width));
        self
    }

    /// Field block (`^FB`) for wrapped or justified text
    pub fn field_block(&mut self, width: u32, lines: u32, spacing: i32, justify: char) -> &mut Self {
        self.buf
            .push_str(&format!("^FB{},{},{},{}", width, lines, spacing, justify));
        self
    }

    /// Field data (`^FD`...`^FS`), terminates the current field line
    pub fn field_data(&mut self, data: &str) -> &mut Self {
        self.buf.push_str(&format!("^FD{}^FS\n", data));
        self
    }

    /// Write raw ZPL directly
    pub fn raw(&mut self, zpl: &str) -> &mut Self {
        self.buf.push_str(zpl);
        self
    }

    // === Build ===

    /// Build the final ZPL string
    pub fn build(self) -> String {
        self.buf
    }
}

impl Default for ZplBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Splice a fragment into a stored label format, immediately before the
/// final `^XZ`.
///
/// Templates are opaque except for the closing marker; when one carries
/// several formats the fragment lands in the last. A template with no
/// `^XZ` at all gets the fragment appended in its own `^XA`/`^XZ` block so
/// the output still ends with a complete format.
pub fn inject_before_end(template: &str, fragment: &str) -> String {
    let mut out = String::with_capacity(template.len() + fragment.len() + 16);
    match template.rfind("^XZ") {
        Some(pos) => {
            let (head, tail) = template.split_at(pos);
            out.push_str(head);
            if !head.is_empty() && !head.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(fragment);
            if !fragment.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(tail);
        }
        None => {
            out.push_str(template);
            if !template.is_empty() && !template.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("^XA\n");
            out.push_str(fragment);
            if !fragment.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("^XZ\n");
        }
    }
    out
}
