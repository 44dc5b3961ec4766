//! On-disk layout of an RFW test split.

use std::path::PathBuf;

/// Resolves index files and image paths under a dataset root such as
/// `rfw/test`.
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: PathBuf,
}

impl DatasetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<root>/txts/<race>/<race>_people.txt`
    pub fn people_file(&self, race: &str) -> PathBuf {
        self.txt_dir(race).join(format!("{race}_people.txt"))
    }

    /// `<root>/txts/<race>/<race>_pairs.txt`
    pub fn pairs_file(&self, race: &str) -> PathBuf {
        self.txt_dir(race).join(format!("{race}_pairs.txt"))
    }

    /// `<root>/data/<race>/<folder>/<folder>_000<index>.jpg`
    ///
    /// The `000` is a literal prefix, not zero padding: index 12 resolves to
    /// `<folder>_00012.jpg`. This matches the file names the dataset
    /// benchmarks were run against.
    pub fn image_path(&self, race: &str, folder: &str, index: u32) -> PathBuf {
        self.root
            .join("data")
            .join(race)
            .join(folder)
            .join(format!("{folder}_000{index}.jpg"))
    }

    fn txt_dir(&self, race: &str) -> PathBuf {
        self.root.join("txts").join(race)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_path() {
        let layout = DatasetLayout::new("rfw/test");
        assert_eq!(
            layout.image_path("African", "m.0b0pdf", 2),
            PathBuf::from("rfw/test/data/African/m.0b0pdf/m.0b0pdf_0002.jpg")
        );
    }

    #[test]
    fn test_image_path_prefix_is_literal() {
        let layout = DatasetLayout::new("rfw/test");
        let path = layout.image_path("Asian", "m.0abc", 12);
        assert!(path.ends_with("m.0abc/m.0abc_00012.jpg"), "{}", path.display());
    }

    #[test]
    fn test_index_files() {
        let layout = DatasetLayout::new("rfw/test");
        assert_eq!(
            layout.people_file("Indian"),
            PathBuf::from("rfw/test/txts/Indian/Indian_people.txt")
        );
        assert_eq!(
            layout.pairs_file("Indian"),
            PathBuf::from("rfw/test/txts/Indian/Indian_pairs.txt")
        );
    }
}
