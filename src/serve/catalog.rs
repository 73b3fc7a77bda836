//! Archive discovery, lazy route registration, and the generated index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::serve::error::ServeError;

/// Route prefix for asset content and thumbnails.
pub const ASSET_ROUTE_PREFIX: &str = "/usdz";
/// Appended to an asset's content route to form its thumbnail route.
pub const THUMBNAIL_SUFFIX: &str = "-thumb.png";
/// Content type served for archive bytes.
pub const ARCHIVE_CONTENT_TYPE: &str = "model/usd";
/// Content type served for thumbnail bytes.
pub const THUMBNAIL_CONTENT_TYPE: &str = "image/png";

/// File paths captured when an asset's routes were registered. Stable for
/// the server's lifetime; handlers read the files at request time.
#[derive(Debug, Clone)]
pub struct RegisteredAsset {
    pub archive_path: PathBuf,
    /// Registered even when the thumbnail does not exist yet; existence is
    /// checked per request, not at registration.
    pub thumbnail_path: PathBuf,
}

/// Names whose serving routes are already registered on this server
/// instance. Mutated only inside the scan lock.
#[derive(Debug, Default)]
pub struct RouteCache {
    assets: HashMap<String, RegisteredAsset>,
}

impl RouteCache {
    /// Register routes for `name` unless they already exist. Returns whether
    /// a registration happened.
    pub fn register(&mut self, name: &str, asset: RegisteredAsset) -> bool {
        if self.assets.contains_key(name) {
            return false;
        }
        tracing::debug!(name, archive = %asset.archive_path.display(), "registered asset routes");
        self.assets.insert(name.to_string(), asset);
        true
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredAsset> {
        self.assets.get(name)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// One row of the generated index; recomputed per request, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub size: String,
    pub archive_route: String,
    /// Present only when the thumbnail file existed at scan time.
    pub thumbnail_route: Option<String>,
}

/// List archives in `dir` newest-first, registering routes for any asset not
/// yet in `cache`. The caller holds the lock covering `cache` for the whole
/// scan so concurrent index requests cannot race the registration step.
pub fn scan_catalog(dir: &Path, cache: &mut RouteCache) -> Result<Vec<CatalogEntry>, ServeError> {
    let mut files: Vec<(PathBuf, SystemTime, u64)> = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|source| ServeError::Scan {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ServeError::Scan {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let is_archive = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("usdz"));
        if !is_archive {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((path, modified, metadata.len()));
    }
    // Newest first; sort_by_key is stable so ties keep listing order.
    files.sort_by_key(|(_, modified, _)| std::cmp::Reverse(*modified));

    let mut catalog = Vec::with_capacity(files.len());
    for (path, _, size) in files {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(stem) = path.file_stem().and_then(|n| n.to_str()) else {
            continue;
        };
        let name = file_name.replace(' ', "_");
        let archive_route = format!("{ASSET_ROUTE_PREFIX}/{name}");
        let thumbnail_route = format!("{archive_route}{THUMBNAIL_SUFFIX}");
        let thumbnail_path = dir.join(format!("{stem}.png"));

        cache.register(
            &name,
            RegisteredAsset {
                archive_path: path.clone(),
                thumbnail_path: thumbnail_path.clone(),
            },
        );

        catalog.push(CatalogEntry {
            name,
            size: format_size(size),
            archive_route,
            thumbnail_route: thumbnail_path.exists().then_some(thumbnail_route),
        });
    }
    Ok(catalog)
}

/// Render the HTML index for the current catalog.
pub fn render_index(entries: &[CatalogEntry]) -> String {
    let mut items = String::new();
    for entry in entries {
        let heading = format!("    <h2>{} ({})</h2>\n", entry.name, entry.size);
        items.push_str(&heading);
        match &entry.thumbnail_route {
            Some(thumb) => items.push_str(&format!(
                "    <div><a href=\"{}\" rel=\"ar\"><img src=\"{}\" class=\"thumbnail\"></a></div>\n",
                entry.archive_route, thumb
            )),
            None => items.push_str(&format!(
                "    <div><a href=\"{}\" rel=\"ar\">{}</a></div>\n",
                entry.archive_route, entry.name
            )),
        }
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>usdstand</title>
    <style>
        body {{ text-align: center; background: #f8f8f8; font-family: sans-serif; color: #464646; }}
        div.border {{ border: 1px solid #d8d8d8; max-width: 1000px; width: 90vw; margin: 1em auto; }}
        img.thumbnail {{ border-radius: 30px; width: 250px; }}
    </style>
</head>
<body>
    <h1>USDZ Files</h1>
{items}</body>
</html>
"#
    )
}

/// Human-readable size with 1024 steps, trailing zeros trimmed.
pub fn format_size(bytes: u64) -> String {
    const SUFFIXES: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut index = 0;
    while size >= 1024.0 && index < SUFFIXES.len() - 1 {
        size /= 1024.0;
        index += 1;
    }
    let value = format!("{size:.2}");
    let value = value.trim_end_matches('0').trim_end_matches('.');
    format!("{value}{}", SUFFIXES[index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn size_formatting_uses_binary_steps() {
        assert_eq!(format_size(0), "0B");
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(1024), "1KB");
        assert_eq!(format_size(1536), "1.5KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3GB");
    }

    #[test]
    fn scan_lists_newest_first_with_thumbnail_links() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("chair.usdz"), b"aaaa").unwrap();
        fs::write(dir.path().join("table.usdz"), b"bbbbbbbb").unwrap();
        fs::write(dir.path().join("table.png"), b"png").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        // Make table.usdz unambiguously the newest.
        let newer = SystemTime::now() + std::time::Duration::from_secs(60);
        let file = fs::File::open(dir.path().join("table.usdz")).unwrap();
        file.set_modified(newer).unwrap();

        let mut cache = RouteCache::default();
        let entries = scan_catalog(dir.path(), &mut cache).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "table.usdz");
        assert_eq!(
            entries[0].thumbnail_route.as_deref(),
            Some("/usdz/table.usdz-thumb.png")
        );
        assert_eq!(entries[1].name, "chair.usdz");
        assert_eq!(entries[1].thumbnail_route, None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn rescan_does_not_register_twice() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("lamp.usdz"), b"zz").unwrap();

        let mut cache = RouteCache::default();
        scan_catalog(dir.path(), &mut cache).unwrap();
        assert_eq!(cache.len(), 1);

        // Second pass observes the same file: idempotent registration.
        let entries = scan_catalog(dir.path(), &mut cache).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(entries.len(), 1);

        let registered = cache.get("lamp.usdz").unwrap();
        assert!(registered.archive_path.ends_with("lamp.usdz"));
    }

    #[test]
    fn spaces_in_names_are_normalized() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("arm chair.usdz"), b"zz").unwrap();

        let mut cache = RouteCache::default();
        let entries = scan_catalog(dir.path(), &mut cache).unwrap();
        assert_eq!(entries[0].name, "arm_chair.usdz");
        assert_eq!(entries[0].archive_route, "/usdz/arm_chair.usdz");
        // The captured file path keeps the original spacing.
        assert!(cache.get("arm_chair.usdz").unwrap().archive_path.ends_with("arm chair.usdz"));
    }

    #[test]
    fn missing_directory_fails_the_scan() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("gone");
        let mut cache = RouteCache::default();
        assert!(matches!(
            scan_catalog(&missing, &mut cache),
            Err(ServeError::Scan { .. })
        ));
    }

    #[test]
    fn index_lists_entries_with_and_without_thumbnails() {
        let entries = vec![
            CatalogEntry {
                name: "table.usdz".to_string(),
                size: "1.5KB".to_string(),
                archive_route: "/usdz/table.usdz".to_string(),
                thumbnail_route: Some("/usdz/table.usdz-thumb.png".to_string()),
            },
            CatalogEntry {
                name: "chair.usdz".to_string(),
                size: "4B".to_string(),
                archive_route: "/usdz/chair.usdz".to_string(),
                thumbnail_route: None,
            },
        ];
        let html = render_index(&entries);
        assert!(html.contains("<h2>table.usdz (1.5KB)</h2>"));
        assert!(html.contains("img src=\"/usdz/table.usdz-thumb.png\""));
        assert!(html.contains("<h2>chair.usdz (4B)</h2>"));
        // The thumbnail-less entry links by name only.
        assert!(html.contains(">chair.usdz</a>"));
        let table_at = html.find("table.usdz").unwrap();
        let chair_at = html.find("chair.usdz").unwrap();
        assert!(table_at < chair_at, "entries must keep newest-first order");
    }
}
