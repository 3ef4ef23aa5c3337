//! Printable invoice rendering.
//!
//! The layout is fixed-coordinate on A4: header with optional logo, issuer
//! and receiver blocks, a concept table that continues onto further pages
//! after [`ROWS_PER_PAGE`] rows, then totals and the stamp block on the last
//! page. Only the standard Helvetica fonts are used, so text is limited to
//! WinAnsi (Latin-1) characters.

mod image;
mod layout;

pub use image::{LogoImage, decode_logo};

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};

use crate::core::*;
use layout::*;

/// Concept rows that fit on one page above the totals block.
pub const ROWS_PER_PAGE: usize = 18;

const ROW_TOP: f32 = 598.0;
const ROW_STEP: f32 = 13.0;
const LINE: f32 = 11.0;
const SEAL_WIDTH: usize = 130;

/// Render an invoice as a PDF document.
///
/// `logo` is raw PNG or JPEG bytes; anything else fails with
/// [`FacturaError::Render`].
pub fn render_pdf(invoice: &Invoice, logo: Option<&[u8]>) -> Result<Vec<u8>, FacturaError> {
    let logo = logo.map(decode_logo).transpose()?;

    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let logo_size = logo.as_ref().map(|l| (l.width, l.height));
    let resources_id = add_resources(&mut doc, logo.map(|l| l.stream));

    let chunks: Vec<&[Concept]> = if invoice.concepts.is_empty() {
        vec![&[]]
    } else {
        invoice.concepts.chunks(ROWS_PER_PAGE).collect()
    };
    let page_count = chunks.len();

    let mut kids = Vec::with_capacity(page_count);
    for (index, rows) in chunks.into_iter().enumerate() {
        let mut canvas = Canvas::new();
        header(&mut canvas, invoice, logo_size, index + 1, page_count);
        if index == 0 {
            parties(&mut canvas, invoice);
        }
        concept_table(&mut canvas, rows);
        if index + 1 == page_count {
            totals(&mut canvas, &invoice.totals);
            stamp_block(&mut canvas, invoice);
        }

        let content_id = doc.add_object(Stream::new(dictionary! {}, canvas.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            "Contents" => Object::Reference(content_id),
            "Resources" => Object::Reference(resources_id),
        });
        kids.push(Object::Reference(page_id));
    }

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => page_count as i64,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(format!("Factura {}", invoice.folio)),
        "Producer" => Object::string_literal(concat!("factura ", env!("CARGO_PKG_VERSION"))),
    });
    doc.trailer.set("Info", Object::Reference(info_id));

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| FacturaError::Render(format!("failed to save PDF: {e}")))?;
    Ok(output)
}

fn font(base: &str) -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    }
}

fn add_resources(doc: &mut Document, logo: Option<Stream>) -> ObjectId {
    let regular = doc.add_object(font("Helvetica"));
    let bold = doc.add_object(font("Helvetica-Bold"));
    let mut resources = dictionary! {
        "Font" => dictionary! {
            REGULAR => Object::Reference(regular),
            BOLD => Object::Reference(bold),
        },
    };
    if let Some(stream) = logo {
        let image_id = doc.add_object(stream);
        resources.set(
            "XObject",
            dictionary! { LOGO => Object::Reference(image_id) },
        );
    }
    doc.add_object(resources)
}

fn header(
    canvas: &mut Canvas,
    invoice: &Invoice,
    logo_size: Option<(u32, u32)>,
    page: usize,
    pages: usize,
) {
    if let Some((width, height)) = logo_size {
        // Fit into a 120x60 box, keeping the aspect ratio.
        let (w, h) = (width as f32, height as f32);
        let scale = (120.0 / w).min(60.0 / h);
        let (dw, dh) = (w * scale, h * scale);
        canvas.image(MARGIN, 752.0 + (60.0 - dh) / 2.0, dw, dh);
    }

    canvas.text(360.0, 800.0, BOLD, 16.0, "FACTURA");
    canvas.text(360.0, 784.0, REGULAR, 9.0, &format!("Folio: {}", invoice.folio));
    canvas.text(
        360.0,
        772.0,
        REGULAR,
        9.0,
        &format!("Fecha: {}", invoice.issued_at.format("%Y-%m-%d %H:%M:%S")),
    );
    canvas.text(360.0, 760.0, REGULAR, 9.0, &format!("Página {page} de {pages}"));
    canvas.line(MARGIN, 740.0, PAGE_WIDTH - MARGIN, 740.0);
}

fn parties(canvas: &mut Canvas, invoice: &Invoice) {
    let issuer = &invoice.issuer;
    let mut lines = vec![
        truncate(&issuer.legal_name, 45),
        format!("RFC: {}", issuer.rfc),
        format!("Régimen fiscal: {}", issuer.tax_regime),
        format!("C.P.: {}", issuer.postal_code),
    ];
    if let Some(address) = &issuer.address {
        lines.push(truncate(address, 45));
    }
    block(canvas, MARGIN, "Emisor", &lines);

    let receiver = &invoice.receiver;
    let lines = [
        truncate(&receiver.legal_name, 45),
        format!("RFC: {}", receiver.rfc),
        format!("Uso CFDI: {}", receiver.cfdi_use),
        format!("Régimen fiscal: {}", receiver.tax_regime),
        format!("C.P.: {}", receiver.postal_code),
    ];
    block(canvas, 310.0, "Receptor", &lines);

    let payment = format!(
        "Moneda: {}    Forma de pago: {}    Método de pago: {}    Ticket: {}",
        invoice.currency,
        invoice.payment_form,
        invoice.payment_method,
        truncate(&invoice.ticket_reference, 30),
    );
    canvas.text(MARGIN, 640.0, REGULAR, 8.0, &payment);
}

fn block(canvas: &mut Canvas, x: f32, title: &str, lines: &[String]) {
    let mut y = 722.0;
    canvas.text(x, y, BOLD, 9.0, title);
    for line in lines {
        y -= LINE;
        canvas.text(x, y, REGULAR, 8.0, line);
    }
}

fn concept_table(canvas: &mut Canvas, rows: &[Concept]) {
    canvas.text(40.0, 616.0, BOLD, 8.0, "Cant.");
    canvas.text(80.0, 616.0, BOLD, 8.0, "Clave");
    canvas.text(135.0, 616.0, BOLD, 8.0, "Unidad");
    canvas.text(175.0, 616.0, BOLD, 8.0, "Descripción");
    canvas.text_right(480.0, 616.0, BOLD, 8.0, "V. unitario");
    canvas.text_right(PAGE_WIDTH - MARGIN, 616.0, BOLD, 8.0, "Importe");
    canvas.line(MARGIN, 610.0, PAGE_WIDTH - MARGIN, 610.0);

    let mut y = ROW_TOP;
    for concept in rows {
        canvas.text(40.0, y, REGULAR, 8.0, &concept.quantity.normalize().to_string());
        canvas.text(80.0, y, REGULAR, 8.0, &concept.product_code);
        canvas.text(135.0, y, REGULAR, 8.0, &concept.unit_code);
        canvas.text(175.0, y, REGULAR, 8.0, &truncate(&concept.description, 52));
        canvas.text_right(480.0, y, REGULAR, 8.0, &money(concept.unit_value));
        canvas.text_right(PAGE_WIDTH - MARGIN, y, REGULAR, 8.0, &money(concept.amount));
        y -= ROW_STEP;
    }
}

fn totals(canvas: &mut Canvas, totals: &Totals) {
    let right = PAGE_WIDTH - MARGIN;
    canvas.line(380.0, 362.0, right, 362.0);
    let rows = [
        ("Subtotal", totals.subtotal, REGULAR),
        ("IVA 16%", totals.tax, REGULAR),
        ("Total", totals.total, BOLD),
    ];
    let mut y = 350.0;
    for (label, amount, font) in rows {
        canvas.text(380.0, y, font, 9.0, label);
        canvas.text_right(right, y, font, 9.0, &money(amount));
        y -= 14.0;
    }
}

fn stamp_block(canvas: &mut Canvas, invoice: &Invoice) {
    let Some(stamp) = &invoice.stamp else {
        canvas.text(MARGIN, 290.0, BOLD, 9.0, "Documento sin timbrar");
        canvas.text(
            MARGIN,
            290.0 - LINE,
            REGULAR,
            8.0,
            &format!("Estado: {}", invoice.status.label()),
        );
        if let Some(log) = &invoice.error_log {
            let mut y = 290.0 - 2.0 * LINE;
            for line in wrap(&format!("Motivo: {log}"), 110, 4) {
                canvas.text(MARGIN, y, REGULAR, 7.0, &line);
                y -= 9.0;
            }
        }
        return;
    };

    let mut y = 290.0;
    canvas.text(MARGIN, y, BOLD, 9.0, "Timbre fiscal digital");
    let mut facts = vec![
        format!("Folio fiscal (UUID): {}", stamp.uuid),
        format!(
            "Fecha de certificación: {}",
            stamp.stamped_at.format("%Y-%m-%d %H:%M:%S")
        ),
        format!("No. de certificado SAT: {}", stamp.sat_certificate),
    ];
    if let Some(cert) = &invoice.issuer_certificate {
        facts.push(format!("No. de certificado del emisor: {cert}"));
    }
    facts.push(format!("RFC del proveedor de certificación: {}", stamp.pac_rfc));
    for fact in &facts {
        y -= LINE;
        canvas.text(MARGIN, y, REGULAR, 8.0, fact);
    }

    let seals = [
        ("Sello digital del CFDI", stamp.cfd_seal.clone(), 3),
        ("Sello del SAT", stamp.sat_seal.clone(), 3),
        (
            "Cadena original del complemento de certificación",
            stamp.certification_chain(),
            3,
        ),
    ];
    for (title, value, max_lines) in seals {
        y -= 14.0;
        canvas.text(MARGIN, y, BOLD, 7.0, title);
        for line in wrap(&value, SEAL_WIDTH, max_lines) {
            y -= 8.0;
            canvas.text(MARGIN, y, REGULAR, 6.0, &line);
        }
    }

    canvas.text(
        MARGIN,
        30.0,
        REGULAR,
        7.0,
        "Este documento es una representación impresa de un CFDI",
    );
}
