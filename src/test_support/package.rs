//! `.nupkg` archive writer for tests.

use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// An in-memory package laid out the way NuGet packs it.
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    id: String,
    version: String,
    entries: Vec<(String, Vec<u8>)>,
}

impl PackageBuilder {
    pub fn new(id: &str, version: &str) -> Self {
        PackageBuilder {
            id: id.to_string(),
            version: version.to_string(),
            entries: Vec::new(),
        }
    }

    /// Add an archive entry, e.g. `lib/net48/Foo.dll`.
    pub fn file(mut self, entry: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.entries.push((entry.to_string(), bytes.into()));
        self
    }

    /// Archive bytes.
    pub fn build(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = ZipWriter::new(std::io::Cursor::new(&mut buf));
            let options = SimpleFileOptions::default();
            for (name, bytes) in &self.entries {
                writer.start_file(name.as_str(), options).unwrap();
                writer.write_all(bytes).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    /// File name in a flat feed (`id.version.nupkg`).
    pub fn file_name(&self) -> String {
        format!("{}.{}.nupkg", self.id, self.version)
    }

    /// Write into `dir` using the flat layout.
    pub fn write_to(&self, dir: &Path) -> PathBuf {
        let path = dir.join(self.file_name());
        std::fs::write(&path, self.build()).unwrap();
        path
    }

    /// Write into `root` using the hierarchical layout
    /// (`id/version/id.version.nupkg`, lowercase).
    pub fn write_hierarchical(&self, root: &Path) -> PathBuf {
        let dir = root
            .join(self.id.to_ascii_lowercase())
            .join(self.version.to_ascii_lowercase());
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(self.file_name().to_ascii_lowercase());
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}
