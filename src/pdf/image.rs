//! Logo decoding into PDF image XObjects.
//!
//! JPEG data is embedded as-is (`DCTDecode`). PNG IDAT data is already a
//! zlib stream with per-row filters, which `FlateDecode` with PNG predictors
//! understands, so no pixel decoding is needed. PNGs with an alpha channel
//! or interlacing would need real decoding and are rejected.

use lopdf::{Dictionary, Object, Stream, StringFormat, dictionary};

use crate::core::FacturaError;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// A decoded logo ready to be added to a document.
pub struct LogoImage {
    pub width: u32,
    pub height: u32,
    pub stream: Stream,
}

/// Detect the image format and build an image XObject.
pub fn decode_logo(bytes: &[u8]) -> Result<LogoImage, FacturaError> {
    if bytes.starts_with(&PNG_SIGNATURE) {
        png(bytes)
    } else if bytes.starts_with(&[0xFF, 0xD8]) {
        jpeg(bytes)
    } else {
        Err(unsupported("logo is neither PNG nor JPEG"))
    }
}

fn unsupported(msg: impl std::fmt::Display) -> FacturaError {
    FacturaError::Render(format!("unsupported image format: {msg}"))
}

fn be_u16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

fn image_dict(width: u32, height: u32, bits: u8, color_space: Object, filter: &str) -> Dictionary {
    dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => i64::from(width),
        "Height" => i64::from(height),
        "BitsPerComponent" => i64::from(bits),
        "ColorSpace" => color_space,
        "Filter" => filter,
    }
}

fn jpeg(bytes: &[u8]) -> Result<LogoImage, FacturaError> {
    let mut i = 2;
    while i + 4 <= bytes.len() {
        if bytes[i] != 0xFF {
            return Err(unsupported("corrupt JPEG marker stream"));
        }
        let marker = bytes[i + 1];
        // Fill bytes and standalone markers carry no length.
        if marker == 0xFF {
            i += 1;
            continue;
        }
        if marker == 0x01 || (0xD0..=0xD8).contains(&marker) {
            i += 2;
            continue;
        }
        let len = usize::from(be_u16(&bytes[i + 2..]));
        if len < 2 || i + 2 + len > bytes.len() {
            return Err(unsupported("truncated JPEG segment"));
        }
        let is_sof = (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            if len < 8 {
                return Err(unsupported("truncated JPEG frame header"));
            }
            let seg = &bytes[i + 4..];
            let bits = seg[0];
            let height = u32::from(be_u16(&seg[1..]));
            let width = u32::from(be_u16(&seg[3..]));
            let color_space = match seg[5] {
                1 => "DeviceGray",
                3 => "DeviceRGB",
                4 => "DeviceCMYK",
                n => return Err(unsupported(format!("JPEG with {n} components"))),
            };
            if width == 0 || height == 0 {
                return Err(unsupported("JPEG with zero dimensions"));
            }
            let dict = image_dict(width, height, bits, color_space.into(), "DCTDecode");
            return Ok(LogoImage {
                width,
                height,
                stream: Stream::new(dict, bytes.to_vec()).with_compression(false),
            });
        }
        i += 2 + len;
    }
    Err(unsupported("JPEG without frame header"))
}

fn png(bytes: &[u8]) -> Result<LogoImage, FacturaError> {
    let mut header = None;
    let mut palette: Option<&[u8]> = None;
    let mut idat = Vec::new();

    let mut i = PNG_SIGNATURE.len();
    while i + 8 <= bytes.len() {
        let len = be_u32(&bytes[i..]) as usize;
        let kind = &bytes[i + 4..i + 8];
        let start = i + 8;
        let end = start
            .checked_add(len)
            .filter(|&e| e + 4 <= bytes.len())
            .ok_or_else(|| unsupported("truncated PNG chunk"))?;
        let data = &bytes[start..end];
        match kind {
            b"IHDR" if len >= 13 => header = Some(data),
            b"PLTE" => palette = Some(data),
            b"IDAT" => idat.extend_from_slice(data),
            b"IEND" => break,
            _ => {}
        }
        i = end + 4;
    }

    let ihdr = header.ok_or_else(|| unsupported("PNG without IHDR"))?;
    let width = be_u32(ihdr);
    let height = be_u32(&ihdr[4..]);
    let bits = ihdr[8];
    let color_type = ihdr[9];
    let interlace = ihdr[12];

    if width == 0 || height == 0 {
        return Err(unsupported("PNG with zero dimensions"));
    }
    if interlace != 0 {
        return Err(unsupported("interlaced PNG"));
    }
    if idat.is_empty() {
        return Err(unsupported("PNG without image data"));
    }

    let (colors, color_space) = match color_type {
        0 if matches!(bits, 1 | 2 | 4 | 8) => (1i64, Object::from("DeviceGray")),
        2 if bits == 8 => (3, Object::from("DeviceRGB")),
        3 if matches!(bits, 1 | 2 | 4 | 8) => {
            let plte = palette.ok_or_else(|| unsupported("indexed PNG without palette"))?;
            if plte.is_empty() || plte.len() % 3 != 0 {
                return Err(unsupported("malformed PNG palette"));
            }
            let indexed = Object::Array(vec![
                "Indexed".into(),
                "DeviceRGB".into(),
                Object::Integer((plte.len() / 3 - 1) as i64),
                Object::String(plte.to_vec(), StringFormat::Hexadecimal),
            ]);
            (1, indexed)
        }
        4 | 6 => return Err(unsupported("PNG with alpha channel")),
        _ => {
            return Err(unsupported(format!(
                "PNG color type {color_type} at {bits} bits"
            )));
        }
    };

    let mut dict = image_dict(width, height, bits, color_space, "FlateDecode");
    dict.set(
        "DecodeParms",
        dictionary! {
            "Predictor" => 15,
            "Colors" => colors,
            "BitsPerComponent" => i64::from(bits),
            "Columns" => i64::from(width),
        },
    );
    Ok(LogoImage {
        width,
        height,
        stream: Stream::new(dict, idat).with_compression(false),
    })
}
