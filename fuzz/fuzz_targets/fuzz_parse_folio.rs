#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok((series, number)) = factura::parse_folio(s) {
            let formatted = factura::format_folio(&series, number, 0);
            let again = factura::parse_folio(&formatted).expect("formatted folio must parse");
            assert_eq!(again, (series, number));
        }
    }
});
