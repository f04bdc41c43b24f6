//! On-disk page cache.
//!
//! One file per tile, `<dir>/<tag>_<x>_<z>.page`, holding a bincode header
//! followed by the generated [`PageContents`]. Files are tied to the layout
//! they were written with: a different resolution or page size is a hard
//! [`Error::StaleCache`] and the file must be deleted by hand. A different
//! version only means the tile is regenerated and rewritten.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sylvan_core::{CellCoord, Error, Result};

use crate::loader::PageContents;
use crate::page::PageInfo;

const MAGIC: [u8; 4] = *b"SYPG";

#[derive(Debug, Serialize, Deserialize)]
struct ArchiveHeader {
    magic: [u8; 4],
    tag: String,
    version: u32,
    resolution: u32,
    page_size: f32,
}

/// Result of looking a tile up in the archive.
#[derive(Debug)]
pub enum ArchiveLookup {
    Missing,
    /// Written under another configuration version.
    Outdated { stored: u32 },
    Hit(PageContents),
}

/// Directory of persisted pages for one layer.
#[derive(Debug, Clone)]
pub struct PageArchive {
    dir: PathBuf,
    tag: &'static str,
    resolution: u32,
    page_size: f32,
}

impl PageArchive {
    /// Open (creating if needed) an archive directory.
    pub fn new(
        dir: impl Into<PathBuf>,
        tag: &'static str,
        resolution: u32,
        page_size: f32,
    ) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            tag,
            resolution,
            page_size,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `cell`.
    pub fn path(&self, cell: CellCoord) -> PathBuf {
        self.dir
            .join(format!("{}_{}_{}.page", self.tag, cell.x, cell.z))
    }

    /// Write a page, replacing any previous file atomically.
    pub fn save(&self, info: &PageInfo, contents: &PageContents) -> Result<()> {
        let path = self.path(info.cell);
        let tmp = path.with_extension("page.tmp");
        let header = ArchiveHeader {
            magic: MAGIC,
            tag: self.tag.to_string(),
            version: info.version,
            resolution: self.resolution,
            page_size: self.page_size,
        };

        let mut writer = BufWriter::new(File::create(&tmp)?);
        bincode::serialize_into(&mut writer, &header)
            .and_then(|()| bincode::serialize_into(&mut writer, contents))
            .map_err(|e| Error::Serialization(e.to_string()))?;
        writer.flush()?;
        drop(writer);
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Read the page stored for `info.cell`.
    pub fn load(&self, info: &PageInfo) -> Result<ArchiveLookup> {
        let path = self.path(info.cell);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ArchiveLookup::Missing),
            Err(e) => return Err(e.into()),
        };
        let mut reader = BufReader::new(file);

        let header: ArchiveHeader = bincode::deserialize_from(&mut reader).map_err(|e| {
            Error::StaleCache {
                path: path.clone(),
                reason: format!("unreadable header: {e}"),
            }
        })?;
        self.check_layout(&path, &header)?;

        if header.version != info.version {
            return Ok(ArchiveLookup::Outdated {
                stored: header.version,
            });
        }

        let contents: PageContents = bincode::deserialize_from(&mut reader)
            .map_err(|e| Error::Serialization(format!("{}: {e}", path.display())))?;
        Ok(ArchiveLookup::Hit(contents))
    }

    fn check_layout(&self, path: &Path, header: &ArchiveHeader) -> Result<()> {
        let stale = |reason: String| Error::StaleCache {
            path: path.to_path_buf(),
            reason,
        };
        if header.magic != MAGIC {
            return Err(stale("not a page file".to_string()));
        }
        if header.tag != self.tag {
            return Err(stale(format!(
                "stored type {} but expected {}",
                header.tag, self.tag
            )));
        }
        if header.resolution != self.resolution {
            return Err(stale(format!(
                "stored resolution {} but configured {}",
                header.resolution, self.resolution
            )));
        }
        if (header.page_size - self.page_size).abs() > f32::EPSILON {
            return Err(stale(format!(
                "stored page size {} but configured {}",
                header.page_size, self.page_size
            )));
        }
        Ok(())
    }

    /// Return the stored page if current, otherwise generate and store it.
    ///
    /// Failing to write the new file only logs a warning.
    pub fn load_or_generate<F>(&self, info: &PageInfo, generate: F) -> Result<PageContents>
    where
        F: FnOnce() -> Result<PageContents>,
    {
        match self.load(info)? {
            ArchiveLookup::Hit(contents) => return Ok(contents),
            ArchiveLookup::Outdated { stored } => tracing::debug!(
                "{}: page {} stored under version {stored}, regenerating for {}",
                self.tag,
                info.cell,
                info.version
            ),
            ArchiveLookup::Missing => {}
        }

        let contents = generate()?;
        if let Err(e) = self.save(info, &contents) {
            tracing::warn!("{}: failed to persist page {}: {e}", self.tag, info.cell);
        }
        Ok(contents)
    }

    /// Delete the file for `cell`. Returns `false` if there was none.
    pub fn remove(&self, cell: CellCoord) -> Result<bool> {
        match fs::remove_file(self.path(cell)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::BlockGeometry;
    use glam::Vec3;
    use sylvan_core::MeshBuilder;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "sylvan-archive-{}-{name}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn info(version: u32) -> PageInfo {
        PageInfo {
            tag: "Grass",
            cell: CellCoord::new(-3, 4),
            center: CellCoord::new(-3, 4).center(64.0),
            page_size: 64.0,
            resolution: 4,
            version,
        }
    }

    fn contents() -> PageContents {
        let mut builder = MeshBuilder::new();
        builder.quad([Vec3::ZERO, Vec3::X, Vec3::ONE, Vec3::Z], Vec3::Y, [[0.0; 2]; 4]);
        PageContents::from_blocks(vec![BlockGeometry {
            index: 2,
            levels: vec![Some(builder.build())],
        }])
    }

    #[test]
    fn save_then_load_hits() {
        let archive = PageArchive::new(temp_dir("hit"), "Grass", 4, 64.0).unwrap();
        archive.save(&info(3), &contents()).unwrap();

        assert!(archive.path(CellCoord::new(-3, 4)).ends_with("Grass_-3_4.page"));
        match archive.load(&info(3)).unwrap() {
            ArchiveLookup::Hit(loaded) => assert_eq!(loaded, contents()),
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[test]
    fn missing_and_outdated() {
        let archive = PageArchive::new(temp_dir("outdated"), "Grass", 4, 64.0).unwrap();
        assert!(matches!(archive.load(&info(0)).unwrap(), ArchiveLookup::Missing));

        archive.save(&info(1), &contents()).unwrap();
        assert!(matches!(
            archive.load(&info(2)).unwrap(),
            ArchiveLookup::Outdated { stored: 1 }
        ));
    }

    #[test]
    fn layout_mismatch_is_a_hard_error() {
        let dir = temp_dir("stale");
        PageArchive::new(&dir, "Grass", 4, 64.0)
            .unwrap()
            .save(&info(0), &contents())
            .unwrap();

        let reconfigured = PageArchive::new(&dir, "Grass", 8, 64.0).unwrap();
        let err = reconfigured.load(&info(0)).unwrap_err();
        assert!(err.is_operator_error());
        assert!(err.to_string().contains("resolution"));

        let resized = PageArchive::new(&dir, "Grass", 4, 128.0).unwrap();
        assert!(matches!(resized.load(&info(0)), Err(Error::StaleCache { .. })));
    }

    #[test]
    fn load_or_generate_writes_through() {
        let archive = PageArchive::new(temp_dir("through"), "Grass", 4, 64.0).unwrap();
        let mut calls = 0;
        let first = archive
            .load_or_generate(&info(5), || {
                calls += 1;
                Ok(contents())
            })
            .unwrap();
        let second = archive
            .load_or_generate(&info(5), || {
                calls += 1;
                Ok(PageContents::empty())
            })
            .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(first, second);
        assert!(archive.remove(CellCoord::new(-3, 4)).unwrap());
        assert!(!archive.remove(CellCoord::new(-3, 4)).unwrap());
    }
}
