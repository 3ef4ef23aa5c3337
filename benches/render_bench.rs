use chrono::NaiveDate;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rust_decimal_macros::dec;

use factura::assemble::Assembler;
use factura::core::*;
use factura::{archive, pdf, xml};

fn build_invoice(concepts: usize) -> Invoice {
    let fiscal = FiscalData::new("AAA010101AAA", "Benchmark SA de CV", "601", "01000");
    let mut request = InvoiceRequest::new(
        "BENCH-001",
        dec!(11600),
        Receiver::new("XAXX010101000", "Público en General", "01000"),
    )
    .issued_at(
        NaiveDate::from_ymd_opt(2024, 6, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap(),
    );
    for i in 1..=concepts {
        request = request.add_concept(Concept::new(
            format!("Artículo {i}"),
            dec!(2),
            dec!(9.99),
        ));
    }
    Assembler::default()
        .assemble(&request, &fiscal, Folio::new("A", 1))
        .unwrap()
}

fn bench_assemble(c: &mut Criterion) {
    let fiscal = FiscalData::new("AAA010101AAA", "Benchmark SA de CV", "601", "01000");
    let request = InvoiceRequest::new(
        "BENCH-001",
        dec!(116),
        Receiver::new("XAXX010101000", "Público en General", "01000"),
    );
    let assembler = Assembler::default();
    c.bench_function("assemble_ticket", |b| {
        b.iter(|| {
            black_box(assembler.assemble(
                black_box(&request),
                black_box(&fiscal),
                Folio::new("A", 1),
            ))
        });
    });
}

fn bench_xml(c: &mut Criterion) {
    let invoice = build_invoice(10);
    c.bench_function("cfdi_xml_10_concepts", |b| {
        b.iter(|| black_box(xml::to_cfdi_xml(black_box(&invoice))));
    });
}

fn bench_pdf(c: &mut Criterion) {
    let invoice = build_invoice(10);
    c.bench_function("pdf_10_concepts", |b| {
        b.iter(|| black_box(pdf::render_pdf(black_box(&invoice), None)));
    });

    let long = build_invoice(100);
    c.bench_function("pdf_100_concepts", |b| {
        b.iter(|| black_box(pdf::render_pdf(black_box(&long), None)));
    });
}

fn bench_package(c: &mut Criterion) {
    let invoice = build_invoice(10);
    let cfdi = xml::to_cfdi_xml(&invoice).unwrap();
    let document = pdf::render_pdf(&invoice, None).unwrap();
    let meta = archive::invoice_metadata(&invoice, false);
    c.bench_function("package_zip", |b| {
        b.iter(|| {
            black_box(archive::package(
                "A1",
                black_box(cfdi.as_bytes()),
                black_box(&document),
                Some(&meta),
            ))
        });
    });
}

fn bench_folio_parse(c: &mut Criterion) {
    c.bench_function("parse_folio", |b| {
        b.iter(|| black_box(parse_folio(black_box("MOSTRADOR000123"))));
    });
}

criterion_group!(
    benches,
    bench_assemble,
    bench_xml,
    bench_pdf,
    bench_package,
    bench_folio_parse,
);
criterion_main!(benches);
