use base64::{engine::general_purpose::STANDARD, Engine as _};
use qrcode::render::svg;
use qrcode::QrCode;

#[derive(thiserror::Error, Debug)]
pub enum QrGenerationError {
    #[error("QR code generation failed: {0}")]
    QrCodeError(#[from] qrcode::types::QrError),

    #[error("PNG encoding failed: {0}")]
    ImageError(#[from] image::ImageError),
}

/// Renders `data` as an SVG QR code
pub fn generate_qr_svg(data: &str) -> Result<String, QrGenerationError> {
    let code = QrCode::new(data.as_bytes())?;

    let svg = code.render::<svg::Color>().min_dimensions(200, 200).build();

    Ok(svg)
}

/// Renders `data` as a grayscale PNG QR code
pub fn generate_qr_png(data: &str) -> Result<Vec<u8>, QrGenerationError> {
    use image::{ImageBuffer, Luma};

    let code = QrCode::new(data.as_bytes())?;

    let module_size = 8u32;
    let quiet_zone = 4u32; // modules of white border
    let width = code.width() as u32;
    let img_size = (width + 2 * quiet_zone) * module_size;

    let mut img = ImageBuffer::<Luma<u8>, Vec<u8>>::from_pixel(img_size, img_size, Luma([255u8]));

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let module_x = (x / module_size).checked_sub(quiet_zone);
        let module_y = (y / module_size).checked_sub(quiet_zone);
        if let (Some(mx), Some(my)) = (module_x, module_y) {
            if mx < width && my < width {
                if let qrcode::types::Color::Dark = code[(mx as usize, my as usize)] {
                    *pixel = Luma([0u8]);
                }
            }
        }
    }

    let mut png_data = Vec::new();
    image::DynamicImage::ImageLuma8(img).write_to(
        &mut std::io::Cursor::new(&mut png_data),
        image::ImageFormat::Png,
    )?;

    Ok(png_data)
}

/// PNG QR code as a `data:` URI for inline `<img>` tags
pub fn generate_qr_data_uri(data: &str) -> Result<String, QrGenerationError> {
    let png = generate_qr_png(data)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qr_svg_generation() {
        let svg = generate_qr_svg("https://fowlmart.example/certificates/verify/FWL-1").unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("</svg>"));
    }

    #[test]
    fn test_qr_png_has_signature_bytes() {
        let png = generate_qr_png("FWL-20250101-ABCDEF12").unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_data_uri_prefix() {
        let uri = generate_qr_data_uri("hello").unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
    }
}
