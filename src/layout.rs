//! Location of the input, processed and report files under a project root.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const BASE_FILE: &str = "base.xlsx";
pub const ADMITIDOS_FILE: &str = "admitidos.xlsx";
pub const CONSOLIDATED_FILE: &str = "base_consolidada.xlsx";
pub const STUDENT_MAP_FILE: &str = "student_program_map.csv";
pub const REPORT_INDEX_FILE: &str = "index.json";

/// The `data/` tree of a reporting project.
///
/// ```text
/// <root>/data/raw/{base,admitidos}.xlsx
/// <root>/data/procesada/{base_consolidada.xlsx,student_program_map.csv}
/// <root>/data/reportes/programa/<program>/...
/// ```
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub reports_dir: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let data_dir = root.join("data");
        Self {
            raw_dir: data_dir.join("raw"),
            processed_dir: data_dir.join("procesada"),
            reports_dir: data_dir.join("reportes").join("programa"),
            data_dir,
            root,
        }
    }

    pub fn base_file(&self) -> PathBuf {
        self.raw_dir.join(BASE_FILE)
    }

    pub fn admitidos_file(&self) -> PathBuf {
        self.raw_dir.join(ADMITIDOS_FILE)
    }

    pub fn consolidated_file(&self) -> PathBuf {
        self.processed_dir.join(CONSOLIDATED_FILE)
    }

    pub fn student_map_file(&self) -> PathBuf {
        self.processed_dir.join(STUDENT_MAP_FILE)
    }

    pub fn report_index_file(&self) -> PathBuf {
        self.reports_dir.join(REPORT_INDEX_FILE)
    }

    /// Creates the processed and report directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.processed_dir, &self.reports_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_under_root() {
        let layout = DataLayout::new("/srv/aol");
        assert_eq!(
            layout.base_file(),
            PathBuf::from("/srv/aol/data/raw/base.xlsx")
        );
        assert_eq!(
            layout.consolidated_file(),
            PathBuf::from("/srv/aol/data/procesada/base_consolidada.xlsx")
        );
        assert_eq!(
            layout.reports_dir,
            PathBuf::from("/srv/aol/data/reportes/programa")
        );
    }

    #[test]
    fn test_ensure_dirs_creates_tree() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        layout.ensure_dirs().unwrap();
        assert!(layout.processed_dir.is_dir());
        assert!(layout.reports_dir.is_dir());
    }
}
