use crate::folders::FolderEntry;
use crate::names::normalize_strict;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub index: usize,
    pub kind: MatchKind,
}

/// Every plausible folder for `customer`: exact matches in folder order,
/// then containment matches in folder order.
pub fn rank_candidates(customer: &str, folders: &[FolderEntry]) -> Vec<Candidate> {
    let wanted = normalize_strict(customer);
    if wanted.is_empty() {
        return Vec::new();
    }
    let keys: Vec<String> = folders
        .iter()
        .map(|folder| normalize_strict(&folder.customer_name))
        .collect();

    let exact = keys
        .iter()
        .enumerate()
        .filter(|(_, key)| **key == wanted)
        .map(|(index, _)| Candidate {
            index,
            kind: MatchKind::Exact,
        });
    let contains = keys
        .iter()
        .enumerate()
        .filter(|(_, key)| {
            !key.is_empty()
                && **key != wanted
                && (key.contains(wanted.as_str()) || wanted.contains(key.as_str()))
        })
        .map(|(index, _)| Candidate {
            index,
            kind: MatchKind::Contains,
        });
    exact.chain(contains).collect()
}

pub fn find_folder<'a>(customer: &str, folders: &'a [FolderEntry]) -> Option<&'a FolderEntry> {
    let best = rank_candidates(customer, folders).into_iter().next()?;
    let folder = &folders[best.index];
    if folder.images.is_empty() {
        return None;
    }
    Some(folder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folders::ImageFile;

    fn folder(name: &str, images: usize) -> FolderEntry {
        FolderEntry::new(
            name,
            (0..images)
                .map(|idx| ImageFile::new(format!("img{}.jpg", idx), vec![0]))
                .collect(),
        )
    }

    #[test]
    fn matches_regardless_of_case_and_separators() {
        let folders = vec![folder("john_doe_0a1b2c3d4e", 1)];
        for customer in ["JOHN DOE", "john-doe", "John_Doe", " john   doe ", "Doe, John"] {
            let found = find_folder(customer, &folders);
            if customer == "Doe, John" {
                assert!(found.is_none());
            } else {
                assert_eq!(found.unwrap().folder_name, "john_doe_0a1b2c3d4e");
            }
        }
    }

    #[test]
    fn exact_match_beats_earlier_partial_match() {
        let folders = vec![folder("ANN_LEE_JR_deadbeef", 1), folder("Ann_Lee_cafebabe", 1)];
        let ranked = rank_candidates("Ann Lee", &folders);
        assert_eq!(
            ranked,
            vec![
                Candidate {
                    index: 1,
                    kind: MatchKind::Exact
                },
                Candidate {
                    index: 0,
                    kind: MatchKind::Contains
                },
            ]
        );
        assert_eq!(find_folder("Ann Lee", &folders).unwrap().customer_name, "Ann Lee");
    }

    #[test]
    fn first_partial_match_wins_and_ambiguity_is_visible() {
        let folders = vec![folder("Acme_Holdings", 2), folder("Acme_Holdings_Europe", 1)];
        let ranked = rank_candidates("Acme", &folders);
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|c| c.kind == MatchKind::Contains));
        assert_eq!(find_folder("Acme", &folders).unwrap().folder_name, "Acme_Holdings");
    }

    #[test]
    fn empty_folder_or_no_match_is_not_found() {
        let folders = vec![folder("Jane_Roe_12345678", 0), folder("Other", 1)];
        assert!(find_folder("Jane Roe", &folders).is_none());
        assert!(find_folder("Nobody", &folders).is_none());
        assert!(find_folder("", &folders).is_none());
    }
}
