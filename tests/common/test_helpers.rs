use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// `<id>` must hold an integer
pub const ID_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="id" type="xs:integer"/>
</xs:schema>"#;

pub const VALID_ID_XML: &str = "<id>42</id>";
pub const INVALID_ID_XML: &str = "<id>abc</id>";
pub const MALFORMED_XML: &str = "<id>42</i>";

/// Scratch layout: `<tmp>/schema/id.xsd` and an empty `<tmp>/xml` root
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("schema")).unwrap();
        std::fs::create_dir_all(dir.path().join("xml")).unwrap();
        std::fs::write(dir.path().join("schema").join("id.xsd"), ID_XSD).unwrap();
        Self { dir }
    }

    pub fn schema(&self) -> PathBuf {
        self.dir.path().join("schema").join("id.xsd")
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("xml")
    }

    pub fn valid_dir(&self) -> PathBuf {
        self.root().join("valid")
    }

    /// Write `content` at `relative` under the root, creating parents
    pub fn add(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root().join(relative);
        create_test_file(&path, content);
        path
    }
}

pub fn create_test_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Names of the files directly inside `dir`, sorted
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
