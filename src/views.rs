// views.rs — Decide the input mode and enumerate view files.
//
// A single file is a pre-composited quilt. A directory holds one file per
// view, and the ONLY thing that decides which view lands in which quilt cell
// is the lexicographic order of the file paths. Name views so that this order
// is the intended one (zero-padded indices: 00.png, 01.png, ..., 44.png);
// `10.png` sorts before `2.png`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::image::probe_dimensions;

/// What the input path turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    /// The path is one image file holding the whole quilt.
    SingleQuilt(PathBuf),
    /// The path is a directory of view images, sorted.
    Directory(ViewSet),
}

impl InputMode {
    /// Inspect `path` on the filesystem.
    ///
    /// # Errors
    /// `Resource` if the path does not exist or the directory cannot be
    /// listed.
    pub fn detect(path: &Path) -> Result<Self, PipelineError> {
        let meta = fs::metadata(path).map_err(|e| PipelineError::resource(path, e))?;
        if meta.is_dir() {
            Ok(InputMode::Directory(ViewSet::scan(path)?))
        } else {
            Ok(InputMode::SingleQuilt(path.to_path_buf()))
        }
    }
}

/// The ordered view files of a multi-view directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSet {
    dir: PathBuf,
    files: Vec<PathBuf>,
}

impl ViewSet {
    /// List `dir`, keep the regular files and sort them by path.
    ///
    /// Entries whose metadata cannot be read are skipped, as are
    /// sub-directories. Nothing is decoded here.
    pub fn scan(dir: &Path) -> Result<Self, PipelineError> {
        let entries = fs::read_dir(dir).map_err(|e| PipelineError::resource(dir, e))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let file_type = entry.file_type().ok()?;
                // Follow symlinks so a linked view file still counts.
                let is_file = if file_type.is_symlink() {
                    fs::metadata(entry.path()).ok()?.is_file()
                } else {
                    file_type.is_file()
                };
                is_file.then(|| entry.path())
            })
            .collect();
        files.sort();

        log::debug!("found {} view files in {}", files.len(), dir.display());
        Ok(ViewSet { dir: dir.to_path_buf(), files })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// View files in assignment order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Resolution of the first view, read from its header only. It sizes
    /// the quilt for every view that follows.
    ///
    /// # Errors
    /// `Resource` if the directory is empty or the first file's header
    /// cannot be decoded.
    pub fn probe_resolution(&self) -> Result<(u32, u32), PipelineError> {
        let first = self
            .files
            .first()
            .ok_or_else(|| PipelineError::resource(&self.dir, "directory contains no view files"))?;
        probe_dimensions(first)
    }
}
