//! # factura
//!
//! Mexican electronic invoicing (CFDI 4.0) core: folio allocation, issuer
//! fiscal data resolution, invoice assembly, XML/PDF rendering, ZIP
//! packaging and certification (stamping) by a PAC.
//!
//! All monetary values use [`rust_decimal::Decimal`], never floating point.
//! Amounts are derived from a tax-inclusive ticket total at 16% IVA.
//!
//! ## Quick Start
//!
//! ```rust
//! use factura::assemble::Assembler;
//! use factura::core::*;
//! use rust_decimal_macros::dec;
//!
//! let fiscal = FiscalData::new("AAA010101AAA", "Empresa Ejemplo", "601", "01000");
//! let request = InvoiceRequest::new(
//!     "T-1",
//!     dec!(116.00),
//!     Receiver::new("XAXX010101000", "Público en General", "01000"),
//! );
//!
//! let invoice = Assembler::default()
//!     .assemble(&request, &fiscal, Folio::new("A", 1))
//!     .unwrap();
//!
//! assert_eq!(invoice.folio.to_string(), "A1");
//! assert_eq!(invoice.totals.subtotal, dec!(100.00));
//! assert_eq!(invoice.totals.tax, dec!(16.00));
//!
//! let xml = factura::xml::to_cfdi_xml(&invoice).unwrap();
//! assert!(xml.contains(r#"SubTotal="100.00""#));
//! ```
//!
//! The full pipeline, with folio allocation, stamping and history, lives in
//! [`service::InvoiceGenerator`].
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` (default) | Types, validation, folio numbering, stores, allocator, resolver, assembler |
//! | `xml` (default) | CFDI 4.0 rendering and stamped-XML parsing |
//! | `pdf` (default) | Fixed-layout PDF with PNG/JPEG logo |
//! | `archive` (default) | ZIP packaging |
//! | `service` (default) | Stamping coordinator, history recorder, `InvoiceGenerator` |
//! | `pac` | HTTP stamping authority client |
//! | `all` | Everything |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "core")]
pub mod store;

#[cfg(feature = "core")]
pub mod folio;

#[cfg(feature = "core")]
pub mod fiscal;

#[cfg(feature = "core")]
pub mod assemble;

#[cfg(feature = "xml")]
pub mod xml;

#[cfg(feature = "pdf")]
pub mod pdf;

#[cfg(feature = "archive")]
pub mod archive;

#[cfg(feature = "service")]
pub mod stamping;

#[cfg(feature = "service")]
pub mod history;

#[cfg(feature = "service")]
pub mod service;

#[cfg(feature = "pac")]
pub mod pac;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
