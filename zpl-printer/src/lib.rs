//! # zpl-printer
//!
//! ZPL II label printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - ZPL II command building
//! - Dynamic-field injection into stored label templates
//! - Spooler printing (CUPS `lp` queues, payload piped over stdin)
//! - Network printing (raw TCP, port 9100)
//! - Character-device printing (`/dev/usb/lp0` style nodes)
//!
//! Business logic (WHAT to print) should stay in application code:
//! - Template resolution and label content → label-worker
//!
//! ## Example
//!
//! ```ignore
//! use zpl_printer::{inject_before_end, Printer, SpoolerPrinter, ZplBuilder};
//!
//! // Compose the per-label dynamic fields
//! let mut zpl = ZplBuilder::new();
//! zpl.field_origin(60, 60)
//!     .bar_defaults(0.5, 2.0, 150)
//!     .code128(100, true)
//!     .field_data("02-PLA-RED-0000000042");
//!
//! // Splice them into a stored template and hand to the spooler
//! let payload = inject_before_end(&template, &zpl.build());
//! let printer = SpoolerPrinter::new("ZebraZD420");
//! printer.print(payload.as_bytes()).await?;
//! ```

mod error;
mod printer;
mod zpl;

// Re-exports
pub use error::{PrintError, PrintResult};
pub use printer::{DevicePrinter, NetworkPrinter, Printer, SpoolerPrinter};
pub use zpl::{ZplBuilder, inject_before_end};
