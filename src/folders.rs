use anyhow::{anyhow, Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::names;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime = detect_image_mime(&bytes, &name);
        Self { name, mime, bytes }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub folder_name: String,
    pub customer_name: String,
    pub images: Vec<ImageFile>,
}

impl FolderEntry {
    pub fn new(folder_name: impl Into<String>, mut images: Vec<ImageFile>) -> Self {
        let folder_name = folder_name.into();
        images.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            customer_name: names::customer_from_folder(&folder_name),
            folder_name,
            images,
        }
    }

    /// Looks an image up by exact name, then by normalized name, then by
    /// normalized name without extension.
    pub fn find_image(&self, name: &str) -> Option<&ImageFile> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        if let Some(image) = self.images.iter().find(|image| image.name == name) {
            return Some(image);
        }
        let key = names::filename_key(name);
        if let Some(image) = self
            .images
            .iter()
            .find(|image| names::filename_key(&image.name) == key)
        {
            return Some(image);
        }
        let stem = names::filename_stem_key(name);
        self.images
            .iter()
            .find(|image| names::filename_stem_key(&image.name) == stem)
    }
}

#[derive(Debug, Clone)]
pub struct ImageFilter {
    set: GlobSet,
}

impl ImageFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = GlobBuilder::new(pattern.trim())
                .case_insensitive(true)
                .literal_separator(true)
                .build()
                .with_context(|| format!("invalid image pattern '{}'", pattern))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .with_context(|| "failed to build image patterns")?;
        Ok(Self { set })
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.set.is_match(name)
    }
}

/// Reads `root/<customer folder>/<image>`; deeper levels are ignored.
///
/// A file counts as an image when its name matches `filter` or its content
/// sniffs as an image. Folders come back sorted by folder name.
pub fn scan(root: &Path, filter: &ImageFilter) -> Result<Vec<FolderEntry>> {
    if !root.is_dir() {
        return Err(anyhow!("image root is not a directory: {}", root.display()));
    }
    let mut folders = Vec::new();
    let entries = fs::read_dir(root)
        .with_context(|| format!("failed to list image root: {}", root.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", root.display()))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(folder_name) = path.file_name().and_then(|value| value.to_str()) else {
            continue;
        };
        let images = read_folder_images(&path, filter)?;
        debug!("folder '{}': {} image(s)", folder_name, images.len());
        folders.push(FolderEntry::new(folder_name, images));
    }
    folders.sort_by(|a, b| a.folder_name.cmp(&b.folder_name));
    Ok(folders)
}

fn read_folder_images(dir: &Path, filter: &ImageFilter) -> Result<Vec<ImageFile>> {
    let mut images = Vec::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to list folder: {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|value| value.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let by_name = filter.matches_name(name);
        let bytes =
            fs::read(&path).with_context(|| format!("failed to read image: {}", path.display()))?;
        if !by_name && !infer::is_image(&bytes) {
            continue;
        }
        images.push(ImageFile::new(name, bytes));
    }
    Ok(images)
}

fn detect_image_mime(bytes: &[u8], name: &str) -> String {
    if let Some(kind) = infer::get(bytes)
        && kind.matcher_type() == infer::MatcherType::Image
    {
        return kind.mime_type().to_string();
    }
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::png_bytes;
    use tempfile::tempdir;

    fn default_filter() -> ImageFilter {
        ImageFilter::new(&["*.jpg".to_string(), "*.png".to_string()]).expect("filter")
    }

    #[test]
    fn scan_reads_two_levels_sorted() {
        let dir = tempdir().expect("tempdir");
        let root = dir.path();
        let alice = root.join("ALICE_SMITH_0123abcd");
        let bob = root.join("Bob_Jones");
        fs::create_dir_all(alice.join("nested")).unwrap();
        fs::create_dir_all(&bob).unwrap();
        fs::write(alice.join("b_back.PNG"), png_bytes(2, 2, [0, 0, 0])).unwrap();
        fs::write(alice.join("a_front.jpg"), b"jpeg-ish").unwrap();
        fs::write(alice.join("notes.txt"), b"hello").unwrap();
        fs::write(alice.join("nested").join("deep.png"), png_bytes(2, 2, [0, 0, 0])).unwrap();
        // no image extension, but the bytes are a PNG
        fs::write(bob.join("scan"), png_bytes(2, 2, [0, 0, 0])).unwrap();
        fs::write(root.join("stray.png"), png_bytes(2, 2, [0, 0, 0])).unwrap();

        let folders = scan(root, &default_filter()).expect("scan");
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].folder_name, "ALICE_SMITH_0123abcd");
        assert_eq!(folders[0].customer_name, "ALICE SMITH");
        let names: Vec<_> = folders[0].images.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a_front.jpg", "b_back.PNG"]);
        assert_eq!(folders[0].images[1].mime, "image/png");
        assert_eq!(folders[0].images[0].mime, "image/jpeg");
        assert_eq!(folders[1].customer_name, "Bob Jones");
        assert_eq!(folders[1].images.len(), 1);
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempdir().expect("tempdir");
        assert!(scan(&dir.path().join("absent"), &default_filter()).is_err());
    }

    #[test]
    fn find_image_falls_back_to_normalized_name() {
        let folder = FolderEntry::new(
            "x",
            vec![
                ImageFile::new("Card_Front.jpg", vec![1]),
                ImageFile::new("card back.jpg", vec![2]),
            ],
        );
        assert_eq!(folder.find_image("Card_Front.jpg").unwrap().bytes, vec![1]);
        assert_eq!(folder.find_image("card-back.JPG").unwrap().bytes, vec![2]);
        assert_eq!(folder.find_image("CARD FRONT").unwrap().bytes, vec![1]);
        assert!(folder.find_image("other.jpg").is_none());
        assert!(folder.find_image("").is_none());
    }

    #[test]
    fn find_image_prefers_matching_extension() {
        let folder = FolderEntry::new(
            "x",
            vec![
                ImageFile::new("scan.png", vec![1]),
                ImageFile::new("scan.jpg", vec![2]),
            ],
        );
        assert_eq!(folder.find_image("SCAN.JPG").unwrap().bytes, vec![2]);
        assert_eq!(folder.find_image("Scan").unwrap().bytes, vec![1]);
    }
}
