#![no_main]

use chrono::NaiveDate;
use libfuzzer_sys::fuzz_target;

use factura::assemble::Assembler;
use factura::core::*;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let request = InvoiceRequest::new(
        "FUZZ",
        rust_decimal::Decimal::new(116, 0),
        Receiver::new("XAXX010101000", text, "01000"),
    );
    let fiscal = FiscalData::new("AAA010101AAA", text, "601", "01000");
    let Ok(mut invoice) = Assembler::default().assemble(&request, &fiscal, Folio::new("A", 1))
    else {
        return;
    };

    // Rendering must not panic on arbitrary names.
    let _ = factura::pdf::render_pdf(&invoice, None);

    let at = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid date");
    invoice.stamp = Some(DigitalStamp {
        uuid: text.to_string(),
        stamped_at: at,
        sat_certificate: "30001000000500003456".into(),
        cfd_seal: text.to_string(),
        sat_seal: "c2VsbG8=".into(),
        pac_rfc: "SPR190613I52".into(),
        version: "1.1".into(),
    });
    invoice.status = StampStatus::Stamped;
    if let Ok(xml) = factura::xml::to_cfdi_xml(&invoice) {
        let _ = factura::xml::parse_stamped(&xml);
    }
});
