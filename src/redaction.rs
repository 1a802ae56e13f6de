use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::compositor::{redact_single, split_redactions, RedactionStyle};
use crate::folders::{FolderEntry, ImageFile};
use crate::gateway::OcrGateway;
use crate::matcher;
use crate::paths::customer_dir_name;
use crate::pipeline::fallback::composite_image;
use crate::pipeline::scenario::{classify_folder, plan_cards, CardPlan, Scenario};
use crate::pipeline::{group_customers, resolve_pairs};
use crate::records::CustomerRecord;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Default, Serialize)]
pub struct RedactionManifest {
    pub customers: Vec<CustomerRedaction>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerRedaction {
    pub customer: String,
    pub folder: String,
    pub cards: Vec<RedactedCard>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RedactedCard {
    pub index: usize,
    pub sources: Vec<String>,
    /// Paths relative to the output directory.
    pub files: Vec<String>,
}

impl RedactionManifest {
    pub fn file_count(&self) -> usize {
        self.customers
            .iter()
            .flat_map(|customer| customer.cards.iter())
            .map(|card| card.files.len())
            .sum()
    }
}

struct OutputImage {
    label: &'static str,
    extension: String,
    bytes: Vec<u8>,
}

/// Extraction or decode failures skip the card and are listed in the
/// manifest. Filesystem errors end the run.
pub async fn redact_all<G: OcrGateway>(
    gateway: &G,
    records: &[CustomerRecord],
    folders: &[FolderEntry],
    out_dir: &Path,
    style: &RedactionStyle,
) -> Result<RedactionManifest> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output dir: {}", out_dir.display()))?;

    let mut manifest = RedactionManifest::default();
    for group in group_customers(records) {
        let folder = matcher::find_folder(&group.name, folders);
        let plans = match classify_folder(folder) {
            Scenario::NoFolder => {
                info!("no folder for '{}'; skipping redaction", group.name);
                manifest.skipped.push(group.name);
                continue;
            }
            Scenario::SingleImage(image) => vec![CardPlan::UnpairedCard {
                file: image,
                missing: None,
            }],
            Scenario::MultiImage(folder) => {
                let (pairs, _) = resolve_pairs(gateway, folder).await;
                plan_cards(folder, &pairs)
            }
        };
        let Some(folder) = folder else {
            continue;
        };

        let dir_name = customer_dir_name(&group.name);
        let customer_dir = out_dir.join(&dir_name);
        let mut entry = CustomerRedaction {
            customer: group.name.clone(),
            folder: folder.folder_name.clone(),
            cards: Vec::new(),
            errors: Vec::new(),
        };

        let mut index = 0;
        for plan in &plans {
            let sources = match plan {
                CardPlan::PairedCard { front, back } => vec![front.name.clone(), back.name.clone()],
                CardPlan::UnpairedCard { file, .. } => vec![file.name.clone()],
                CardPlan::MissingReference { .. } => continue,
            };
            index += 1;
            let outputs = match redact_card(gateway, plan, style).await {
                Ok(outputs) => outputs,
                Err(err) => {
                    warn!("redaction failed for {:?}: {:#}", sources, err);
                    entry
                        .errors
                        .push(format!("{}: {:#}", sources.join("+"), err));
                    continue;
                }
            };
            fs::create_dir_all(&customer_dir).with_context(|| {
                format!("failed to create output dir: {}", customer_dir.display())
            })?;
            let mut files = Vec::with_capacity(outputs.len());
            for output in outputs {
                let file_name = format!("card_{}_{}.{}", index, output.label, output.extension);
                let path = customer_dir.join(&file_name);
                fs::write(&path, &output.bytes)
                    .with_context(|| format!("failed to write image: {}", path.display()))?;
                files.push(format!("{}/{}", dir_name, file_name));
            }
            entry.cards.push(RedactedCard {
                index,
                sources,
                files,
            });
        }
        info!(
            "redacted {} card(s) for '{}'",
            entry.cards.len(),
            entry.customer
        );
        manifest.customers.push(entry);
    }

    let manifest_path = out_dir.join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(&manifest)
        .with_context(|| "failed to serialize redaction manifest")?;
    fs::write(&manifest_path, json)
        .with_context(|| format!("failed to write manifest: {}", manifest_path.display()))?;
    Ok(manifest)
}

async fn redact_card<G: OcrGateway>(
    gateway: &G,
    plan: &CardPlan<'_>,
    style: &RedactionStyle,
) -> Result<Vec<OutputImage>> {
    match plan {
        CardPlan::PairedCard { front, back } => {
            let composite = composite_image(front, back, style.quality)?;
            let extraction = gateway
                .extract_card_with_regions(&composite)
                .await
                .with_context(|| format!("region extraction failed for {}", composite.name))?;
            drop(composite);
            let page = extraction
                .page_space()
                .ok_or_else(|| anyhow!("no page size reported"))?;
            let pair = split_redactions(&front.bytes, &back.bytes, page, &extraction.regions(), style)?;
            Ok(vec![
                original(front, "front_original", pair.front.original),
                redacted("front_redacted", pair.front.redacted),
                original(back, "back_original", pair.back.original),
                redacted("back_redacted", pair.back.redacted),
            ])
        }
        CardPlan::UnpairedCard { file, .. } => {
            let extraction = gateway
                .extract_card_with_regions(file)
                .await
                .with_context(|| format!("region extraction failed for {}", file.name))?;
            let page = extraction
                .page_space()
                .ok_or_else(|| anyhow!("no page size reported"))?;
            let single = redact_single(&file.bytes, page, &extraction.regions(), style)?;
            Ok(vec![
                original(file, "single_original", single.original),
                redacted("single_redacted", single.redacted),
            ])
        }
        CardPlan::MissingReference { .. } => Ok(Vec::new()),
    }
}

fn original(source: &ImageFile, label: &'static str, bytes: Vec<u8>) -> OutputImage {
    let extension = match source.mime.as_str() {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "image/webp" => "webp",
        "image/tiff" => "tif",
        _ => "jpg",
    };
    OutputImage {
        label,
        extension: extension.to_string(),
        bytes,
    }
}

fn redacted(label: &'static str, bytes: Vec<u8>) -> OutputImage {
    OutputImage {
        label,
        extension: "jpg".to_string(),
        bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::Polygon;
    use crate::gateway::{CardPair, PageInfo, RegionExtraction};
    use crate::test_util::{png_bytes, FakeGateway};
    use tempfile::tempdir;

    fn white(name: &str) -> ImageFile {
        ImageFile::new(name, png_bytes(40, 20, [255, 255, 255]))
    }

    fn extraction(width: f32, height: f32, numbers: &[&[f32]], cvcs: &[&[f32]]) -> RegionExtraction {
        RegionExtraction {
            document_type: "creditCard".to_string(),
            pages: vec![PageInfo {
                page: 1,
                width,
                height,
                unit: "pixel".to_string(),
            }],
            card_number_regions: numbers.iter().map(|flat| Polygon::from_flat(flat)).collect(),
            cvc_regions: cvcs.iter().map(|flat| Polygon::from_flat(flat)).collect(),
        }
    }

    fn luma(path: &Path, x: u32, y: u32) -> u8 {
        let bytes = fs::read(path).expect("read output");
        image::load_from_memory(&bytes)
            .expect("decode output")
            .to_luma8()
            .get_pixel(x, y)[0]
    }

    #[tokio::test]
    async fn pair_is_split_into_four_images() {
        let dir = tempdir().expect("tempdir");
        let folders = vec![FolderEntry::new(
            "Jane_Roe_deadbeef",
            vec![white("front.png"), white("back.png")],
        )];
        let gateway = FakeGateway::new()
            .pairs(vec![CardPair::new("front.png", "back.png")])
            .regions(
                "front.png+back.png",
                extraction(
                    40.0,
                    40.0,
                    &[&[4.0, 4.0, 36.0, 4.0, 36.0, 16.0, 4.0, 16.0]],
                    &[&[4.0, 24.0, 6.0, 24.0, 6.0, 26.0, 4.0, 26.0]],
                ),
            );
        let records = vec![CustomerRecord::new(0, "Jane Roe", "front.png", "", "")];

        let manifest = redact_all(
            &gateway,
            &records,
            &folders,
            dir.path(),
            &RedactionStyle::default(),
        )
        .await
        .expect("redact");

        assert_eq!(manifest.file_count(), 4);
        let card = &manifest.customers[0].cards[0];
        assert_eq!(
            card.files,
            vec![
                "Jane_Roe/card_1_front_original.png",
                "Jane_Roe/card_1_front_redacted.jpg",
                "Jane_Roe/card_1_back_original.png",
                "Jane_Roe/card_1_back_redacted.jpg",
            ]
        );
        let out = dir.path().join("Jane_Roe");
        assert!(luma(&out.join("card_1_front_redacted.jpg"), 20, 10) < 64);
        assert!(luma(&out.join("card_1_front_original.png"), 20, 10) > 200);
        // cvc box grows from 2x2 to 8x4 around its top-left corner
        assert!(luma(&out.join("card_1_back_redacted.jpg"), 10, 6) < 64);
        assert!(luma(&out.join("card_1_back_redacted.jpg"), 24, 12) > 200);
        assert!(dir.path().join(MANIFEST_FILE).is_file());
    }

    #[tokio::test]
    async fn single_image_and_missing_folder() {
        let dir = tempdir().expect("tempdir");
        let folders = vec![FolderEntry::new("John_Doe", vec![white("card.png")])];
        let gateway = FakeGateway::new().regions(
            "card.png",
            extraction(4.0, 2.0, &[&[1.0, 0.5, 3.0, 0.5, 3.0, 1.5, 1.0, 1.5]], &[]),
        );
        let records = vec![
            CustomerRecord::new(0, "Nobody", "x.png", "", ""),
            CustomerRecord::new(1, "John Doe", "card.png", "", ""),
        ];

        let manifest = redact_all(
            &gateway,
            &records,
            &folders,
            dir.path(),
            &RedactionStyle::default(),
        )
        .await
        .expect("redact");

        assert_eq!(manifest.skipped, vec!["Nobody"]);
        assert_eq!(
            manifest.customers[0].cards[0].files,
            vec![
                "John_Doe/card_1_single_original.png",
                "John_Doe/card_1_single_redacted.jpg",
            ]
        );
        // page units scale 10x onto the 40x20 image
        let redacted = dir.path().join("John_Doe").join("card_1_single_redacted.jpg");
        assert!(luma(&redacted, 20, 10) < 64);
    }

    #[tokio::test]
    async fn failed_extraction_is_recorded_and_skipped() {
        let dir = tempdir().expect("tempdir");
        let folders = vec![FolderEntry::new(
            "Jane_Roe",
            vec![white("a.png"), white("b.png")],
        )];
        let gateway = FakeGateway::new()
            .grouping_fails()
            .regions("b.png", extraction(40.0, 20.0, &[], &[]));
        let records = vec![CustomerRecord::new(0, "Jane Roe", "a.png", "", "")];

        let manifest = redact_all(
            &gateway,
            &records,
            &folders,
            dir.path(),
            &RedactionStyle::default(),
        )
        .await
        .expect("redact");

        let customer = &manifest.customers[0];
        assert_eq!(customer.errors.len(), 1);
        assert!(customer.errors[0].starts_with("a.png"));
        assert_eq!(customer.cards.len(), 1);
        assert_eq!(customer.cards[0].index, 2);
        assert_eq!(customer.cards[0].sources, vec!["b.png"]);
    }
}
