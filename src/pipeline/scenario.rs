use serde::Serialize;
use std::collections::HashSet;

use crate::folders::{FolderEntry, ImageFile};
use crate::gateway::CardPair;

#[derive(Debug, Clone, Copy)]
pub enum Scenario<'a> {
    NoFolder,
    SingleImage(&'a ImageFile),
    MultiImage(&'a FolderEntry),
}

impl Scenario<'_> {
    pub fn kind(&self) -> ScenarioKind {
        match self {
            Scenario::NoFolder => ScenarioKind::NoFolder,
            Scenario::SingleImage(_) => ScenarioKind::SingleImage,
            Scenario::MultiImage(_) => ScenarioKind::MultiImage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    NoFolder,
    SingleImage,
    MultiImage,
}

impl ScenarioKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioKind::NoFolder => "no folder",
            ScenarioKind::SingleImage => "single image",
            ScenarioKind::MultiImage => "multiple images",
        }
    }
}

pub fn classify_folder(folder: Option<&FolderEntry>) -> Scenario<'_> {
    match folder {
        None => Scenario::NoFolder,
        Some(folder) => match folder.images.as_slice() {
            [] => Scenario::NoFolder,
            [only] => Scenario::SingleImage(only),
            _ => Scenario::MultiImage(folder),
        },
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CardPlan<'a> {
    PairedCard {
        front: &'a ImageFile,
        back: &'a ImageFile,
    },
    /// One file on its own. `missing` names a partner the grouping reported
    /// but the folder does not contain.
    UnpairedCard {
        file: &'a ImageFile,
        missing: Option<String>,
    },
    MissingReference { names: Vec<String> },
}

pub fn degenerate_pairs(folder: &FolderEntry) -> Vec<CardPair> {
    folder
        .images
        .iter()
        .map(|image| CardPair::single(image.name.clone()))
        .collect()
}

/// Resolves reported pairs against the folder and appends every file no
/// pair referenced as its own card, so no image is dropped.
pub fn plan_cards<'a>(folder: &'a FolderEntry, pairs: &[CardPair]) -> Vec<CardPlan<'a>> {
    let mut plans = Vec::new();
    let mut referenced: HashSet<&str> = HashSet::new();

    for pair in pairs {
        let front = resolve(folder, &pair.front);
        let back = resolve(folder, &pair.back);
        for image in [front.found(), back.found()].into_iter().flatten() {
            referenced.insert(image.name.as_str());
        }
        let plan = match (front, back) {
            (Side::Found(front), Side::Found(back)) => CardPlan::PairedCard { front, back },
            (Side::Found(file), other) | (other, Side::Found(file)) => CardPlan::UnpairedCard {
                file,
                missing: other.missing_name(),
            },
            (front, back) => CardPlan::MissingReference {
                names: [front.missing_name(), back.missing_name()]
                    .into_iter()
                    .flatten()
                    .collect(),
            },
        };
        if matches!(&plan, CardPlan::MissingReference { names } if names.is_empty()) {
            continue;
        }
        plans.push(plan);
    }

    for image in &folder.images {
        if !referenced.contains(image.name.as_str()) {
            plans.push(CardPlan::UnpairedCard {
                file: image,
                missing: None,
            });
        }
    }
    plans
}

#[derive(Debug, Clone, Copy)]
enum Side<'a, 'n> {
    Blank,
    Found(&'a ImageFile),
    Missing(&'n str),
}

impl<'a> Side<'a, '_> {
    fn found(&self) -> Option<&'a ImageFile> {
        match self {
            Side::Found(image) => Some(*image),
            _ => None,
        }
    }

    fn missing_name(&self) -> Option<String> {
        match self {
            Side::Missing(name) => Some(name.to_string()),
            _ => None,
        }
    }
}

fn resolve<'a, 'n>(folder: &'a FolderEntry, name: &'n str) -> Side<'a, 'n> {
    let name = name.trim();
    if name.is_empty() {
        return Side::Blank;
    }
    match folder.find_image(name) {
        Some(image) => Side::Found(image),
        None => Side::Missing(name),
    }
}
