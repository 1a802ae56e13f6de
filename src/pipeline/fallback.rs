use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::scenario::CardPlan;
use crate::compositor::{composite, Composite};
use crate::folders::ImageFile;
use crate::gateway::OcrGateway;
use crate::validator::digits_only;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy<'a> {
    Composite {
        front: &'a ImageFile,
        back: &'a ImageFile,
    },
    Single(&'a ImageFile),
}

impl Strategy<'_> {
    fn label(&self) -> String {
        match self {
            Strategy::Composite { front, back } => composite_name(front, back),
            Strategy::Single(file) => file.name.clone(),
        }
    }
}

/// Paired cards try the composite, then the front alone, then the back alone.
pub fn strategies_for<'a>(plan: &CardPlan<'a>) -> Vec<Strategy<'a>> {
    match plan {
        CardPlan::PairedCard { front, back } => vec![
            Strategy::Composite {
                front: *front,
                back: *back,
            },
            Strategy::Single(*front),
            Strategy::Single(*back),
        ],
        CardPlan::UnpairedCard { file, .. } => vec![Strategy::Single(*file)],
        CardPlan::MissingReference { .. } => Vec::new(),
    }
}

pub(crate) fn composite_name(front: &ImageFile, back: &ImageFile) -> String {
    format!("{}+{}", front.name, back.name)
}

pub(crate) fn composite_image(
    front: &ImageFile,
    back: &ImageFile,
    quality: u8,
) -> Result<ImageFile> {
    let Composite { bytes, .. } = composite(&[&front.bytes, &back.bytes], quality)
        .with_context(|| format!("failed to composite {} and {}", front.name, back.name))?;
    Ok(ImageFile {
        name: composite_name(front, back),
        mime: Composite::MIME.to_string(),
        bytes,
    })
}

/// Extraction failures move on to the next strategy. A composite that cannot
/// be built is an error for the whole customer.
pub async fn run_chain<G: OcrGateway>(
    gateway: &G,
    strategies: &[Strategy<'_>],
    quality: u8,
) -> Result<Option<String>> {
    for strategy in strategies {
        let attempt = match strategy {
            Strategy::Composite { front, back } => {
                let image = composite_image(front, back, quality)?;
                let result = gateway.extract_card(&image).await;
                drop(image);
                result
            }
            Strategy::Single(file) => gateway.extract_card(file).await,
        };
        match attempt {
            Ok(extraction) => {
                let digits = digits_only(&extraction.card_number);
                if !digits.is_empty() {
                    debug!("card read from {}", strategy.label());
                    return Ok(Some(digits));
                }
                debug!("{} returned no digits; trying next", strategy.label());
            }
            Err(err) => {
                warn!("extraction failed for {}: {:#}", strategy.label(), err);
            }
        }
    }
    Ok(None)
}
