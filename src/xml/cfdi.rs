use super::writer::{XmlResult, XmlWriter};
use super::{CFDI_VERSION, DATETIME_FORMAT, IVA_RATE_QUOTA, IVA_TAX_CODE, ns};
use crate::core::*;

/// Render an assembled invoice as CFDI 4.0 XML.
///
/// Attribute order is fixed and amounts are fixed two-decimal strings, so
/// the same invoice always renders to the same bytes. A `cfdi:Complemento`
/// with the TimbreFiscalDigital is included once the invoice is stamped.
pub fn to_cfdi_xml(invoice: &Invoice) -> XmlResult {
    let mut w = XmlWriter::new()?;

    let fecha = invoice.issued_at.format(DATETIME_FORMAT).to_string();
    let folio = invoice.folio.digits();
    let subtotal = format_amount(invoice.totals.subtotal);
    let total = format_amount(invoice.totals.total);
    let tax = format_amount(invoice.totals.tax);

    let mut root: Vec<(&str, &str)> = vec![
        ("xmlns:cfdi", ns::CFDI),
        ("xmlns:xsi", ns::XSI),
        ("xsi:schemaLocation", ns::CFDI_SCHEMA_LOCATION),
        ("Version", CFDI_VERSION),
    ];
    if !invoice.folio.series.is_empty() {
        root.push(("Serie", &invoice.folio.series));
    }
    root.push(("Folio", &folio));
    root.push(("Fecha", &fecha));
    root.push(("FormaPago", &invoice.payment_form));
    if let Some(cert) = &invoice.issuer_certificate {
        root.push(("NoCertificado", cert));
    }
    root.extend([
        ("SubTotal", subtotal.as_str()),
        ("Moneda", invoice.currency.as_str()),
        ("Total", total.as_str()),
        ("TipoDeComprobante", "I"),
        ("Exportacion", invoice.export_code.as_str()),
        ("MetodoPago", invoice.payment_method.as_str()),
        ("LugarExpedicion", invoice.issuer.postal_code.as_str()),
    ]);
    w.start_element_with_attrs("cfdi:Comprobante", &root)?;

    w.empty_element(
        "cfdi:Emisor",
        &[
            ("Rfc", &invoice.issuer.rfc),
            ("Nombre", &invoice.issuer.legal_name),
            ("RegimenFiscal", &invoice.issuer.tax_regime),
        ],
    )?;
    w.empty_element(
        "cfdi:Receptor",
        &[
            ("Rfc", &invoice.receiver.rfc),
            ("Nombre", &invoice.receiver.legal_name),
            ("DomicilioFiscalReceptor", &invoice.receiver.postal_code),
            ("RegimenFiscalReceptor", &invoice.receiver.tax_regime),
            ("UsoCFDI", &invoice.receiver.cfdi_use),
        ],
    )?;

    w.start_element("cfdi:Conceptos")?;
    for concept in &invoice.concepts {
        write_concept(&mut w, concept)?;
    }
    w.end_element("cfdi:Conceptos")?;

    w.start_element_with_attrs("cfdi:Impuestos", &[("TotalImpuestosTrasladados", &tax)])?;
    w.start_element("cfdi:Traslados")?;
    w.empty_element(
        "cfdi:Traslado",
        &[
            ("Base", &subtotal),
            ("Impuesto", IVA_TAX_CODE),
            ("TipoFactor", "Tasa"),
            ("TasaOCuota", IVA_RATE_QUOTA),
            ("Importe", &tax),
        ],
    )?;
    w.end_element("cfdi:Traslados")?;
    w.end_element("cfdi:Impuestos")?;

    if let Some(stamp) = &invoice.stamp {
        write_stamp(&mut w, stamp)?;
    }

    w.end_element("cfdi:Comprobante")?;
    w.into_string()
}

fn write_concept(w: &mut XmlWriter, concept: &Concept) -> Result<(), FacturaError> {
    let quantity = format_amount(concept.quantity);
    let unit_value = format_amount(concept.unit_value);
    let amount = format_amount(concept.amount);
    let discount = concept.discount.map(format_amount);

    let mut attrs: Vec<(&str, &str)> = vec![
        ("ClaveProdServ", &concept.product_code),
        ("Cantidad", &quantity),
        ("ClaveUnidad", &concept.unit_code),
        ("Descripcion", &concept.description),
        ("ValorUnitario", &unit_value),
        ("Importe", &amount),
    ];
    if let Some(d) = &discount {
        attrs.push(("Descuento", d));
    }
    attrs.push(("ObjetoImp", &concept.tax_object));
    w.empty_element("cfdi:Concepto", &attrs)?;
    Ok(())
}

fn write_stamp(w: &mut XmlWriter, stamp: &DigitalStamp) -> Result<(), FacturaError> {
    let stamped_at = stamp.stamped_at.format(DATETIME_FORMAT).to_string();
    w.start_element("cfdi:Complemento")?;
    w.empty_element(
        "tfd:TimbreFiscalDigital",
        &[
            ("xmlns:tfd", ns::TFD),
            ("xsi:schemaLocation", ns::TFD_SCHEMA_LOCATION),
            ("Version", &stamp.version),
            ("UUID", &stamp.uuid),
            ("FechaTimbrado", &stamped_at),
            ("RfcProvCertif", &stamp.pac_rfc),
            ("SelloCFD", &stamp.cfd_seal),
            ("NoCertificadoSAT", &stamp.sat_certificate),
            ("SelloSAT", &stamp.sat_seal),
        ],
    )?;
    w.end_element("cfdi:Complemento")?;
    Ok(())
}
