use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

use crate::compositor::{PageSpace, Polygon, RedactionRegion, RegionKind};
use crate::folders::ImageFile;

mod http;
mod retry;

pub use http::HttpGateway;

pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

pub trait OcrGateway: Send + Sync {
    fn extract_card<'a>(&'a self, image: &'a ImageFile) -> GatewayFuture<'a, CardExtraction>;

    fn categorize<'a>(&'a self, images: &'a [ImageFile]) -> GatewayFuture<'a, Categorization>;

    fn group_cards<'a>(
        &'a self,
        images: &'a [ImageFile],
        categorization: &'a Categorization,
    ) -> GatewayFuture<'a, Grouping>;

    fn extract_card_with_regions<'a>(
        &'a self,
        image: &'a ImageFile,
    ) -> GatewayFuture<'a, RegionExtraction>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardExtraction {
    pub card_number: String,
}

/// Front/back filenames of one physical card. Either side may be empty, not both.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CardPair {
    #[serde(default, deserialize_with = "nullable_string")]
    pub front: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub back: String,
}

impl CardPair {
    pub fn new(front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            front: front.into(),
            back: back.into(),
        }
    }

    pub fn single(name: impl Into<String>) -> Self {
        Self::new(name, String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.front.trim().is_empty() && self.back.trim().is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        [self.front.as_str(), self.back.as_str()]
            .into_iter()
            .filter(|name| !name.trim().is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoryGroup {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub files: Vec<CardPair>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Categorization {
    #[serde(default)]
    pub categories: Vec<CategoryGroup>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Grouping {
    #[serde(rename = "creditCardGroups", default)]
    pub credit_card_groups: Vec<CategoryGroup>,
}

impl Grouping {
    pub fn pairs(&self) -> Vec<CardPair> {
        self.credit_card_groups
            .iter()
            .flat_map(|group| group.files.iter())
            .filter(|pair| !pair.is_empty())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    #[serde(default)]
    pub page: u32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegionExtraction {
    pub document_type: String,
    pub pages: Vec<PageInfo>,
    pub card_number_regions: Vec<Polygon>,
    pub cvc_regions: Vec<Polygon>,
}

impl RegionExtraction {
    /// Coordinate space of the first reported page.
    pub fn page_space(&self) -> Option<PageSpace> {
        let page = self
            .pages
            .iter()
            .min_by_key(|page| page.page)?;
        Some(PageSpace {
            width: page.width,
            height: page.height,
        })
    }

    pub fn regions(&self) -> Vec<RedactionRegion> {
        let numbers = self.card_number_regions.iter().map(|polygon| RedactionRegion {
            kind: RegionKind::CardNumber,
            polygon: polygon.clone(),
        });
        let cvcs = self.cvc_regions.iter().map(|polygon| RedactionRegion {
            kind: RegionKind::Cvc,
            polygon: polygon.clone(),
        });
        numbers.chain(cvcs).collect()
    }
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_json_snapshot;

    #[test]
    fn grouping_flattens_groups_in_order() {
        let grouping: Grouping = serde_json::from_str(
            r#"{
                "creditCardGroups": [
                    {"type": "visa", "files": [
                        {"front": "a_front.jpg", "back": "a_back.jpg"},
                        {"front": "", "back": ""}
                    ]},
                    {"type": "amex", "files": [{"front": "b.jpg", "back": null}]}
                ]
            }"#,
        )
        .expect("grouping");
        assert_json_snapshot!(grouping.pairs(), @r#"
        [
          {
            "front": "a_front.jpg",
            "back": "a_back.jpg"
          },
          {
            "front": "b.jpg",
            "back": ""
          }
        ]
        "#);
    }

    #[test]
    fn pair_names_skip_blank_sides() {
        assert_eq!(CardPair::new("f.jpg", "b.jpg").names(), vec!["f.jpg", "b.jpg"]);
        assert_eq!(CardPair::new("", "b.jpg").names(), vec!["b.jpg"]);
        assert!(CardPair::new(" ", "").is_empty());
    }

    #[test]
    fn regions_are_tagged_by_kind() {
        let extraction = RegionExtraction {
            document_type: "creditCard".to_string(),
            pages: vec![
                PageInfo {
                    page: 2,
                    width: 1.0,
                    height: 1.0,
                    unit: "pixel".to_string(),
                },
                PageInfo {
                    page: 1,
                    width: 8.5,
                    height: 11.0,
                    unit: "inch".to_string(),
                },
            ],
            card_number_regions: vec![Polygon::from_flat(&[0.0, 0.0, 1.0, 0.0, 1.0, 1.0])],
            cvc_regions: vec![Polygon::from_flat(&[2.0, 2.0, 3.0, 2.0, 3.0, 3.0])],
        };
        let regions = extraction.regions();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].kind, RegionKind::CardNumber);
        assert_eq!(regions[1].kind, RegionKind::Cvc);
        assert_eq!(
            extraction.page_space(),
            Some(PageSpace {
                width: 8.5,
                height: 11.0
            })
        );
    }
}
