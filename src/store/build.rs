//! Project build driver: walk the tree, normalize file contents, feed the
//! chunk builder, and atomically publish the data file.

use crate::store::builder::{BuildStats, Builder};
use crate::store::data_file_path;
use crate::utils::config::BuildConfig;
use crate::utils::encoding::{convert_to_utf8, normalize_eol};
use crate::utils::progress::BuildProgress;
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// A file discovered by the project walk.
pub struct ProjectFile {
    pub abs_path: PathBuf,
    pub rel_path: String,
    pub size: u64,
    pub mtime: u64,
}

/// Walk the project tree and collect candidate files in a deterministic
/// (path-sorted) order.
pub fn collect_project_files(project: &Path, config: &BuildConfig) -> Result<Vec<ProjectFile>> {
    let excludes = config.exclude_matcher()?;

    let walker = WalkBuilder::new(project)
        .hidden(!config.include_hidden)
        .follow_links(config.follow_links)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .build();

    let mut files = Vec::new();

    for entry in walker.filter_map(|entry| entry.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Ok(rel) = path.strip_prefix(project) else {
            continue;
        };
        let rel_path = rel.to_string_lossy().replace('\\', "/");

        if excludes.is_match(&rel_path) {
            continue;
        }

        let Ok(metadata) = entry.metadata() else {
            continue;
        };

        if metadata.len() > config.max_file_size {
            continue;
        }

        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        files.push(ProjectFile {
            abs_path: path.to_path_buf(),
            rel_path,
            size: metadata.len(),
            mtime,
        });
    }

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

    Ok(files)
}

/// Read one file, normalize it and hand it to the builder.
fn ingest_file<W: std::io::Write>(builder: &mut Builder<W>, file: &ProjectFile) -> Result<()> {
    let raw = fs::read(&file.abs_path)?;

    let mut contents = convert_to_utf8(raw);
    normalize_eol(&mut contents);

    builder.append_file_part(&file.rel_path, 0, &contents, file.mtime, file.size)
}

/// Build `<project>.qgd` from the project tree.
///
/// The store is written to `<project>.qgd_` and renamed into place on
/// clean shutdown, so a crashed build leaves only the temp artifact.
pub fn build_project(project: &Path) -> Result<BuildStats> {
    let config = BuildConfig::load(project)?;

    println!("Building {}:", project.display());

    let files = collect_project_files(project, &config)?;

    let target_path = data_file_path(project);
    let temp_path = {
        let mut os = target_path.clone().into_os_string();
        os.push("_");
        PathBuf::from(os)
    };

    let out = BufWriter::new(
        File::create(&temp_path)
            .with_context(|| format!("Error opening data file {} for writing", temp_path.display()))?,
    );

    let mut builder = Builder::new(out)?;
    let mut progress = BuildProgress::new(files.len());

    for file in &files {
        if let Err(err) = ingest_file(&mut builder, file) {
            eprintln!("Error reading file {}: {}", file.abs_path.display(), err);
            continue;
        }

        let stats = builder.stats();
        progress.update(stats.files, stats.bytes_in, stats.bytes_out);
    }

    builder.flush()?;
    let stats = builder.stats();
    progress.update(stats.files, stats.bytes_in, stats.bytes_out);
    progress.finish();

    builder
        .finish()?
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("Error saving data file {}", temp_path.display()))?;

    fs::rename(&temp_path, &target_path)
        .with_context(|| format!("Error saving data file {}", target_path.display()))?;

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "b\n").unwrap();
        fs::write(dir.path().join("a.txt"), "a\n").unwrap();
        fs::write(dir.path().join("skip.log"), "nope\n").unwrap();

        let config = BuildConfig {
            excludes: vec!["*.log".to_string()],
            ..BuildConfig::default()
        };

        let files = collect_project_files(dir.path(), &config).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.txt"]);
    }

    #[test]
    fn test_build_writes_and_renames() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("proj");
        fs::create_dir(&project).unwrap();
        fs::write(project.join("hello.txt"), "hello\nworld\n").unwrap();

        let stats = build_project(&project).unwrap();
        assert_eq!(stats.files, 1);
        assert_eq!(stats.chunks, 1);

        let data_path = data_file_path(&project);
        assert!(data_path.exists());
        assert!(!data_path.with_extension("qgd_").exists());
    }

    #[test]
    fn test_empty_project_yields_magic_only() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("empty");
        fs::create_dir(&project).unwrap();

        let stats = build_project(&project).unwrap();
        assert_eq!(stats.chunks, 0);

        let bytes = fs::read(data_file_path(&project)).unwrap();
        assert_eq!(bytes.len(), 4);
    }
}
