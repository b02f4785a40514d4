use crate::error::Result;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::FileOptions;
use zip::CompressionMethod;

pub const ARCHIVE_EXTENSION: &str = "cbz";
const COMIC_INFO_FILE: &str = "ComicInfo.xml";

/// Chapter details written as `ComicInfo.xml` next to the pages.
#[derive(Debug, Clone)]
pub struct ComicMetadata {
    pub series: String,
    pub number: u32,
    pub title: Option<String>,
    pub page_count: usize,
}

/// Packs `chapter_dir` into `<dest_dir>/<dir name>.cbz`.
///
/// Returns `None` when the source is missing or the archive could not be
/// written. Only what is already on disk is packed.
pub fn archive(chapter_dir: &Path, dest_dir: &Path) -> Option<PathBuf> {
    archive_with_metadata(chapter_dir, dest_dir, None)
}

pub fn archive_with_metadata(
    chapter_dir: &Path,
    dest_dir: &Path,
    metadata: Option<&ComicMetadata>,
) -> Option<PathBuf> {
    debug!("archive({:?}, {:?})", chapter_dir, dest_dir);

    if !chapter_dir.is_dir() {
        warn!("Cannot archive {:?}: not a directory", chapter_dir);
        return None;
    }

    let Some(name) = chapter_dir.file_name().and_then(|n| n.to_str()) else {
        warn!("Cannot archive {:?}: no usable directory name", chapter_dir);
        return None;
    };

    let zip_path = dest_dir.join(format!("{}.{}", name, ARCHIVE_EXTENSION));
    match write_archive(chapter_dir, name, &zip_path, metadata) {
        Ok(count) => {
            info!("cbz: {:?} ({} files)", zip_path, count);
            Some(zip_path)
        }
        Err(e) => {
            warn!("Failed to create {:?}: {}", zip_path, e);
            if zip_path.exists() {
                if let Err(remove_err) = fs::remove_file(&zip_path) {
                    warn!("Could not remove incomplete {:?}: {}", zip_path, remove_err);
                }
            }
            None
        }
    }
}

fn write_archive(
    chapter_dir: &Path,
    root: &str,
    zip_path: &Path,
    metadata: Option<&ComicMetadata>,
) -> Result<usize> {
    let mut files: Vec<PathBuf> = fs::read_dir(chapter_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.extension().map_or(true, |ext| ext != "part"))
        .collect();
    files.sort();

    if let Some(parent) = zip_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = File::create(zip_path)?;
    let mut zip = zip::ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut count = 0;
    for path in &files {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!("Skipping file with non UTF-8 name: {:?}", path);
            continue;
        };
        if metadata.is_some() && file_name == COMIC_INFO_FILE {
            continue;
        }

        debug!("add file {:?} to {:?}", file_name, zip_path);
        zip.start_file(format!("{}/{}", root, file_name), options)?;
        let mut source = File::open(path)?;
        io::copy(&mut source, &mut zip)?;
        count += 1;
    }

    if let Some(metadata) = metadata {
        zip.start_file(format!("{}/{}", root, COMIC_INFO_FILE), options)?;
        zip.write_all(build_comic_info(metadata).as_bytes())?;
        count += 1;
    }

    let mut writer = zip.finish()?;
    writer.flush()?;
    Ok(count)
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

pub fn build_comic_info(metadata: &ComicMetadata) -> String {
    let mut title = format!("{} {}", metadata.series, metadata.number);
    if let Some(chapter_title) = metadata.title.as_deref().filter(|t| !t.is_empty()) {
        title.push_str(" - ");
        title.push_str(chapter_title);
    }

    let lines = [
        r#"<?xml version="1.0" encoding="UTF-8"?>"#.to_string(),
        r#"<ComicInfo xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema">"#.to_string(),
        format!("  <Title>{}</Title>", xml_escape(&title)),
        format!("  <Series>{}</Series>", xml_escape(&metadata.series)),
        format!("  <Number>{}</Number>", metadata.number),
        format!("  <PageCount>{}</PageCount>", metadata.page_count),
        "  <LanguageISO>ja</LanguageISO>".to_string(),
        "  <Manga>YesAndRightToLeft</Manga>".to_string(),
        "</ComicInfo>".to_string(),
    ];
    lines.join("\n")
}
