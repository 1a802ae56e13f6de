use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImage, Rgb, RgbImage};

#[derive(Debug, Clone)]
pub struct Composite {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub heights: Vec<u32>,
}

impl Composite {
    pub const MIME: &'static str = "image/jpeg";
}

/// Stacks `images` top to bottom at x = 0 without scaling.
///
/// The canvas is as wide as the widest input; area to the right of narrower
/// inputs stays white. The result is JPEG encoded at `quality`.
pub fn composite(images: &[&[u8]], quality: u8) -> Result<Composite> {
    if images.is_empty() {
        return Err(anyhow!("no images to composite"));
    }
    let decoded = images
        .iter()
        .enumerate()
        .map(|(idx, bytes)| {
            image::load_from_memory(bytes)
                .with_context(|| format!("failed to decode image #{} for composite", idx + 1))
        })
        .collect::<Result<Vec<_>>>()?;

    let width = decoded.iter().map(|image| image.width()).max().unwrap_or(0);
    let heights: Vec<u32> = decoded.iter().map(|image| image.height()).collect();
    let height = heights
        .iter()
        .try_fold(0u32, |acc, h| acc.checked_add(*h))
        .ok_or_else(|| anyhow!("composite height overflow"))?;
    if width == 0 || height == 0 {
        return Err(anyhow!("composite would be empty ({}x{})", width, height));
    }

    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    let mut offset = 0u32;
    for image in decoded {
        let layer = image.to_rgb8();
        canvas
            .copy_from(&layer, 0, offset)
            .with_context(|| "failed to place image on composite canvas")?;
        offset += layer.height();
    }

    let bytes = encode_jpeg(&DynamicImage::ImageRgb8(canvas), quality)?;
    Ok(Composite {
        bytes,
        width,
        height,
        heights,
    })
}

pub(crate) fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .encode_image(&rgb)
        .with_context(|| "failed to encode jpeg")?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::png_bytes;

    #[test]
    fn stacks_images_top_to_bottom() {
        let top = png_bytes(40, 10, [255, 0, 0]);
        let bottom = png_bytes(20, 30, [0, 0, 255]);
        let out = composite(&[&top, &bottom], 90).expect("composite");
        assert_eq!((out.width, out.height), (40, 40));
        assert_eq!(out.heights, vec![10, 30]);

        let decoded = image::load_from_memory(&out.bytes).expect("decode").to_rgb8();
        assert_eq!(decoded.dimensions(), (40, 40));
        let red = decoded.get_pixel(5, 5);
        assert!(red[0] > 200 && red[2] < 60);
        let blue = decoded.get_pixel(5, 30);
        assert!(blue[2] > 200 && blue[0] < 60);
        let blank = decoded.get_pixel(35, 30);
        assert!(blank.0.iter().all(|channel| *channel > 200));
    }

    #[test]
    fn undecodable_input_fails() {
        let good = png_bytes(4, 4, [0, 0, 0]);
        let err = composite(&[&good, b"not an image"], 90).unwrap_err();
        assert!(format!("{:#}", err).contains("#2"));
    }

    #[test]
    fn empty_input_fails() {
        assert!(composite(&[], 90).is_err());
    }
}
