//! Shared fixtures for Brokkr's cross-crate lifecycle tests.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use brokkr_core::{GameInstance, ModInfo, ModKind, ModPackage};
use brokkr_install::DownloadCache;

/// A minimal valid metadata record for `name` at `version`.
pub fn package(name: &str, version: &str) -> ModPackage {
    ModPackage {
        schema: 1,
        info: ModInfo {
            name: name.to_string(),
            version: version.parse().unwrap(),
            title: format!("The {name} mod"),
            author: "fixture".to_string(),
            contact: None,
            homepage: None,
            description: Some(format!("Fixture module {name}")),
            dependencies: Vec::new(),
        },
        authors: vec!["fixture".to_string()],
        categories: Vec::new(),
        tags: Vec::new(),
        recommends: Vec::new(),
        suggests_extra: Vec::new(),
        conflicts: Vec::new(),
        provides: Vec::new(),
        download_urls: vec![format!("https://mods.example/{name}_{version}.zip")],
        download_size: 0,
        kind: ModKind::Mod,
        released_at: None,
        aggregator_data: Default::default(),
    }
}

pub fn with_dependency(mut package: ModPackage, stanza: &str) -> ModPackage {
    package.info.dependencies.push(stanza.parse().unwrap());
    package
}

pub fn with_conflict(mut package: ModPackage, stanza: &str) -> ModPackage {
    package.conflicts.push(stanza.parse().unwrap());
    package
}

pub fn with_provides(mut package: ModPackage, name: &str) -> ModPackage {
    package.provides.push(name.to_string());
    package
}

pub fn with_suggests(mut package: ModPackage, stanza: &str) -> ModPackage {
    package.suggests_extra.push(stanza.parse().unwrap());
    package
}

pub fn metapackage(mut package: ModPackage) -> ModPackage {
    package.kind = ModKind::Meta;
    package
}

/// Write a gzip-compressed tar feed with one `.brokkr` record per package.
pub fn build_feed(dir: &Path, packages: &[ModPackage]) -> PathBuf {
    let path = dir.join("repository.tar.gz");
    let file = File::create(&path).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for package in packages {
        let record = serde_json::to_string_pretty(package).unwrap();
        let name = format!("{}.brokkr", package.standard_file_name());
        let mut header = tar::Header::new_gnu();
        header.set_size(record.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, record.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap().flush().unwrap();
    path
}

/// Put a fake artifact for `package` straight into the cache.
pub fn seed_cache(cache: &DownloadCache, package: &ModPackage) {
    std::fs::write(
        cache.path_for(package),
        format!("archive of {}", package.standard_file_name()),
    )
    .unwrap();
}

/// A ready-to-use temp instance with its cache.
pub fn temp_instance() -> (tempfile::TempDir, GameInstance, DownloadCache) {
    let tmp = tempfile::TempDir::new().unwrap();
    let instance = GameInstance::new(tmp.path());
    instance.init().unwrap();
    let cache = DownloadCache::new(instance.downloads_dir()).unwrap();
    (tmp, instance, cache)
}
