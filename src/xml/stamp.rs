use chrono::NaiveDateTime;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;

use super::DATETIME_FORMAT;
use crate::core::{DigitalStamp, FacturaError};

/// Identifying data extracted from a stamped CFDI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampedCfdi {
    /// `Serie` of the comprobante, if present.
    pub series: Option<String>,
    /// `Folio` of the comprobante, if present.
    pub folio: Option<String>,
    pub stamp: DigitalStamp,
}

/// Parse a stamped CFDI returned by the certification authority and
/// extract its `tfd:TimbreFiscalDigital` block.
///
/// Fails with `StampFailed` when the XML is malformed, the block is
/// missing, or any required stamp attribute is absent.
pub fn parse_stamped(xml: &str) -> Result<StampedCfdi, FacturaError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut series = None;
    let mut folio = None;
    let mut tfd: Option<HashMap<String, String>> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                match e.local_name().as_ref() {
                    b"Comprobante" => {
                        let attrs = attributes(e)?;
                        series = attrs.get("Serie").cloned();
                        folio = attrs.get("Folio").cloned();
                    }
                    b"TimbreFiscalDigital" => tfd = Some(attributes(e)?),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FacturaError::StampFailed(format!(
                    "stamped XML parse error at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
    }

    let tfd = tfd.ok_or_else(|| {
        FacturaError::StampFailed("stamped XML has no TimbreFiscalDigital".into())
    })?;
    let required = |key: &str| {
        tfd.get(key)
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .ok_or_else(|| {
                FacturaError::StampFailed(format!("TimbreFiscalDigital is missing {key}"))
            })
    };

    let stamped_at_raw = required("FechaTimbrado")?;
    let stamped_at = NaiveDateTime::parse_from_str(&stamped_at_raw, DATETIME_FORMAT).map_err(|e| {
        FacturaError::StampFailed(format!("invalid FechaTimbrado '{stamped_at_raw}': {e}"))
    })?;

    let stamp = DigitalStamp {
        uuid: required("UUID")?,
        stamped_at,
        sat_certificate: required("NoCertificadoSAT")?,
        cfd_seal: required("SelloCFD")?,
        sat_seal: required("SelloSAT")?,
        pac_rfc: required("RfcProvCertif")?,
        version: tfd
            .get("Version")
            .cloned()
            .unwrap_or_else(|| super::TFD_VERSION.to_string()),
    };

    Ok(StampedCfdi {
        series,
        folio,
        stamp,
    })
}

fn attributes(e: &BytesStart<'_>) -> Result<HashMap<String, String>, FacturaError> {
    let mut map = HashMap::new();
    for attr in e.attributes() {
        let attr = attr
            .map_err(|err| FacturaError::StampFailed(format!("malformed attribute: {err}")))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| FacturaError::StampFailed(format!("malformed attribute value: {err}")))?;
        map.insert(key, value.into_owned());
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAMPED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<cfdi:Comprobante xmlns:cfdi="http://www.sat.gob.mx/cfd/4" Version="4.0" Serie="A" Folio="7" Sello="abc">
  <cfdi:Emisor Rfc="AAA010101AAA" Nombre="Empresa Ejemplo" RegimenFiscal="601"/>
  <cfdi:Complemento>
    <tfd:TimbreFiscalDigital xmlns:tfd="http://www.sat.gob.mx/TimbreFiscalDigital" Version="1.1"
      UUID="5FB2822E-396D-4725-8521-CDC4BDD20CCF" FechaTimbrado="2024-05-02T10:31:12"
      RfcProvCertif="SPR190613I52" SelloCFD="c2VsbG9DRkQ=" NoCertificadoSAT="30001000000500003456"
      SelloSAT="c2VsbG9TQVQ="/>
  </cfdi:Complemento>
</cfdi:Comprobante>"#;

    #[test]
    fn extracts_stamp() {
        let parsed = parse_stamped(STAMPED).unwrap();
        assert_eq!(parsed.series.as_deref(), Some("A"));
        assert_eq!(parsed.folio.as_deref(), Some("7"));
        assert_eq!(parsed.stamp.uuid, "5FB2822E-396D-4725-8521-CDC4BDD20CCF");
        assert_eq!(parsed.stamp.sat_certificate, "30001000000500003456");
        assert_eq!(parsed.stamp.pac_rfc, "SPR190613I52");
        assert_eq!(
            parsed.stamp.stamped_at.format(DATETIME_FORMAT).to_string(),
            "2024-05-02T10:31:12"
        );
    }

    #[test]
    fn missing_block_fails() {
        let xml = r#"<cfdi:Comprobante xmlns:cfdi="http://www.sat.gob.mx/cfd/4" Folio="1"/>"#;
        let err = parse_stamped(xml).unwrap_err();
        assert!(err.to_string().contains("no TimbreFiscalDigital"));
    }

    #[test]
    fn missing_seal_fails() {
        let xml = STAMPED.replace(r#"SelloSAT="c2VsbG9TQVQ=""#, "");
        let err = parse_stamped(&xml).unwrap_err();
        assert!(err.to_string().contains("SelloSAT"));
    }

    #[test]
    fn bad_timestamp_fails() {
        let xml = STAMPED.replace("2024-05-02T10:31:12", "ayer");
        assert!(matches!(parse_stamped(&xml), Err(FacturaError::StampFailed(_))));
    }

    #[test]
    fn garbage_fails() {
        assert!(parse_stamped("<not closed").is_err());
        assert!(parse_stamped("").is_err());
    }
}
