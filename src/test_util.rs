use anyhow::anyhow;
use image::{ImageFormat, Rgb, RgbImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;

use crate::folders::ImageFile;
use crate::gateway::{
    CardExtraction, CardPair, Categorization, CategoryGroup, GatewayFuture, Grouping,
    OcrGateway, RegionExtraction,
};

pub(crate) fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb(color));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("encode png");
    bytes.into_inner()
}

/// Scripted gateway. Unknown images fail extraction; grouping returns no
/// pairs unless configured.
#[derive(Default)]
pub(crate) struct FakeGateway {
    cards: HashMap<String, String>,
    pairs: Vec<CardPair>,
    grouping_fails: bool,
    categorize_fails: bool,
    regions: HashMap<String, RegionExtraction>,
    calls: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn card(mut self, image: &str, number: &str) -> Self {
        self.cards.insert(image.to_string(), number.to_string());
        self
    }

    pub(crate) fn pairs(mut self, pairs: Vec<CardPair>) -> Self {
        self.pairs = pairs;
        self
    }

    pub(crate) fn grouping_fails(mut self) -> Self {
        self.grouping_fails = true;
        self
    }

    pub(crate) fn categorize_fails(mut self) -> Self {
        self.categorize_fails = true;
        self
    }

    pub(crate) fn regions(mut self, image: &str, extraction: RegionExtraction) -> Self {
        self.regions.insert(image.to_string(), extraction);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

impl OcrGateway for FakeGateway {
    fn extract_card<'a>(&'a self, image: &'a ImageFile) -> GatewayFuture<'a, CardExtraction> {
        Box::pin(async move {
            self.record(format!("extract {}", image.name));
            self.cards
                .get(&image.name)
                .map(|number| CardExtraction {
                    card_number: number.clone(),
                })
                .ok_or_else(|| anyhow!("no card number in {}", image.name))
        })
    }

    fn categorize<'a>(&'a self, images: &'a [ImageFile]) -> GatewayFuture<'a, Categorization> {
        Box::pin(async move {
            self.record(format!("categorize {}", images.len()));
            if self.categorize_fails {
                return Err(anyhow!("categorize unavailable"));
            }
            Ok(Categorization {
                categories: vec![CategoryGroup {
                    kind: "creditCard".to_string(),
                    files: images
                        .iter()
                        .map(|image| CardPair::single(image.name.clone()))
                        .collect(),
                }],
            })
        })
    }

    fn group_cards<'a>(
        &'a self,
        images: &'a [ImageFile],
        _categorization: &'a Categorization,
    ) -> GatewayFuture<'a, Grouping> {
        Box::pin(async move {
            self.record(format!("group {}", images.len()));
            if self.grouping_fails {
                return Err(anyhow!("grouping unavailable"));
            }
            Ok(Grouping {
                credit_card_groups: vec![CategoryGroup {
                    kind: "creditCard".to_string(),
                    files: self.pairs.clone(),
                }],
            })
        })
    }

    fn extract_card_with_regions<'a>(
        &'a self,
        image: &'a ImageFile,
    ) -> GatewayFuture<'a, RegionExtraction> {
        Box::pin(async move {
            self.record(format!("regions {}", image.name));
            self.regions
                .get(&image.name)
                .cloned()
                .ok_or_else(|| anyhow!("no regions for {}", image.name))
        })
    }
}
