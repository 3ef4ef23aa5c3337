//! CFDI 4.0 XML rendering and stamped-document parsing.
//!
//! Only the fields this crate produces are modeled; the full SAT schema
//! (per-concept taxes, addenda, complements other than the TFD) is not.
//!
//! # Example
//!
//! ```no_run
//! use factura::core::*;
//! use factura::xml;
//!
//! let invoice: Invoice = todo!(); // assembled via factura::assemble::Assembler
//! let cfdi = xml::to_cfdi_xml(&invoice).unwrap();
//! let stamped = xml::parse_stamped(&cfdi).unwrap();
//! ```

mod cfdi;
mod stamp;
pub(crate) mod writer;

pub use cfdi::to_cfdi_xml;
pub use stamp::{StampedCfdi, parse_stamped};

/// CFDI version marker written to `Version`.
pub const CFDI_VERSION: &str = "4.0";

/// TimbreFiscalDigital version written by the authority.
pub const TFD_VERSION: &str = "1.1";

/// IVA code in the SAT tax catalog.
pub const IVA_TAX_CODE: &str = "002";

/// IVA rate as written into `TasaOCuota`.
pub const IVA_RATE_QUOTA: &str = "0.160000";

/// Namespace URIs and schema locations.
pub mod ns {
    pub const CFDI: &str = "http://www.sat.gob.mx/cfd/4";
    pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
    pub const TFD: &str = "http://www.sat.gob.mx/TimbreFiscalDigital";
    pub const CFDI_SCHEMA_LOCATION: &str =
        "http://www.sat.gob.mx/cfd/4 http://www.sat.gob.mx/sitio_internet/cfd/4/cfdv40.xsd";
    pub const TFD_SCHEMA_LOCATION: &str = "http://www.sat.gob.mx/TimbreFiscalDigital http://www.sat.gob.mx/sitio_internet/cfd/TimbreFiscalDigital/TimbreFiscalDigitalv11.xsd";
}

/// Date-time format used by `Fecha` and `FechaTimbrado`.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
