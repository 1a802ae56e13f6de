use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};
use tiny_skia::{FillRule, IntSize, Paint, PathBuilder, Pixmap, Transform};

use super::compose::encode_jpeg;
use super::geom::Polygon;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    CardNumber,
    Cvc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactionRegion {
    pub kind: RegionKind,
    pub polygon: Polygon,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSpace {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct RedactionStyle {
    pub cvc_width_factor: f32,
    pub cvc_height_factor: f32,
    pub quality: u8,
}

impl Default for RedactionStyle {
    fn default() -> Self {
        Self {
            cvc_width_factor: 4.0,
            cvc_height_factor: 2.0,
            quality: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitPlan {
    pub api_front_height: f32,
    pub front: Vec<RedactionRegion>,
    pub back: Vec<RedactionRegion>,
}

#[derive(Debug, Clone)]
pub struct RedactedImage {
    pub original: Vec<u8>,
    pub redacted: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RedactedPair {
    pub front: RedactedImage,
    pub back: RedactedImage,
}

/// Assigns each region to the front or back image of a composite.
///
/// The boundary sits at the same fraction of the page height as the front
/// image takes of the stacked pixel height. A region belongs to the side its
/// mean vertex y falls on; back regions are shifted up by the boundary.
pub fn assign_regions(
    regions: &[RedactionRegion],
    page: PageSpace,
    front_height: u32,
    back_height: u32,
) -> SplitPlan {
    let total = (front_height as f32 + back_height as f32).max(1.0);
    let front_ratio = front_height as f32 / total;
    let api_front_height = page.height * front_ratio;

    let mut front = Vec::new();
    let mut back = Vec::new();
    for region in regions.iter().filter(|region| !region.polygon.is_empty()) {
        if region.polygon.mean_y() < api_front_height {
            front.push(region.clone());
        } else {
            back.push(RedactionRegion {
                kind: region.kind,
                polygon: region.polygon.translate_y(-api_front_height),
            });
        }
    }
    SplitPlan {
        api_front_height,
        front,
        back,
    }
}

pub fn split_redactions(
    front: &[u8],
    back: &[u8],
    page: PageSpace,
    regions: &[RedactionRegion],
    style: &RedactionStyle,
) -> Result<RedactedPair> {
    check_page(page)?;
    let front_image =
        image::load_from_memory(front).with_context(|| "failed to decode front image")?;
    let back_image =
        image::load_from_memory(back).with_context(|| "failed to decode back image")?;

    let plan = assign_regions(regions, page, front_image.height(), back_image.height());
    let back_api_height = page.height - plan.api_front_height;

    let front_redacted = mask_regions(front_image, &plan.front, page.width, plan.api_front_height, style)
        .with_context(|| "failed to redact front image")?;
    let back_redacted = mask_regions(back_image, &plan.back, page.width, back_api_height, style)
        .with_context(|| "failed to redact back image")?;

    Ok(RedactedPair {
        front: RedactedImage {
            original: front.to_vec(),
            redacted: front_redacted,
        },
        back: RedactedImage {
            original: back.to_vec(),
            redacted: back_redacted,
        },
    })
}

pub fn redact_single(
    bytes: &[u8],
    page: PageSpace,
    regions: &[RedactionRegion],
    style: &RedactionStyle,
) -> Result<RedactedImage> {
    check_page(page)?;
    let image = image::load_from_memory(bytes).with_context(|| "failed to decode image")?;
    let redacted = mask_regions(image, regions, page.width, page.height, style)?;
    Ok(RedactedImage {
        original: bytes.to_vec(),
        redacted,
    })
}

fn check_page(page: PageSpace) -> Result<()> {
    if !(page.width > 0.0 && page.height > 0.0) {
        return Err(anyhow!(
            "invalid page size {}x{} reported for redaction",
            page.width,
            page.height
        ));
    }
    Ok(())
}

fn mask_regions(
    image: DynamicImage,
    regions: &[RedactionRegion],
    api_width: f32,
    api_height: f32,
    style: &RedactionStyle,
) -> Result<Vec<u8>> {
    let (width, height) = (image.width(), image.height());
    let scale_x = width as f32 / api_width.max(f32::EPSILON);
    let scale_y = height as f32 / api_height.max(f32::EPSILON);

    // Drop alpha first so the buffer is valid premultiplied RGBA.
    let opaque = DynamicImage::ImageRgb8(image.to_rgb8()).to_rgba8();
    drop(image);
    let size = IntSize::from_wh(width, height)
        .ok_or_else(|| anyhow!("image has zero size ({}x{})", width, height))?;
    let mut pixmap = Pixmap::from_vec(opaque.into_raw(), size)
        .ok_or_else(|| anyhow!("failed to build pixmap for redaction"))?;

    let mut paint = Paint::default();
    paint.set_color_rgba8(0, 0, 0, 255);
    paint.anti_alias = false;

    for region in regions {
        let polygon = match region.kind {
            RegionKind::Cvc => region
                .polygon
                .expand_from_min(style.cvc_width_factor, style.cvc_height_factor),
            RegionKind::CardNumber => region.polygon.clone(),
        };
        let polygon = polygon.scale(scale_x, scale_y);
        let Some(path) = polygon_path(&polygon) else {
            continue;
        };
        pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }

    let masked = RgbaImage::from_raw(width, height, pixmap.take())
        .ok_or_else(|| anyhow!("failed to rebuild image after redaction"))?;
    encode_jpeg(&DynamicImage::ImageRgba8(masked), style.quality)
}

fn polygon_path(polygon: &Polygon) -> Option<tiny_skia::Path> {
    let mut points = polygon.points.iter();
    let first = points.next()?;
    let mut builder = PathBuilder::new();
    builder.move_to(first.x, first.y);
    for point in points {
        builder.line_to(point.x, point.y);
    }
    builder.close();
    builder.finish()
}
