use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::db::DB_FILE;

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/recordbook.sqlite3";
pub const BUNDLE_FORMAT: &str = "recordbook-workspace-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub db_sha256: String,
    pub db_bytes: usize,
}

/// Exports the workspace database as a zip bundle with a manifest carrying
/// the database checksum, so a restore tool can verify the payload before
/// touching anything.
pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE);
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }
    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("failed to read database {}", db_path.to_string_lossy()))?;
    let db_sha256 = format!("{:x}", Sha256::digest(&db_bytes));

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "dbSha256": db_sha256,
        "dbBytes": db_bytes.len(),
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    zip.write_all(&db_bytes)
        .context("failed to write database entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        db_sha256,
        db_bytes: db_bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};
    use zip::ZipArchive;

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    #[test]
    fn export_writes_manifest_and_database() {
        let workspace = temp_dir("backup-export");
        crate::db::open_db(&workspace).expect("create db");
        let out = workspace.join("bundle.zip");

        let summary = export_workspace_bundle(&workspace, &out).expect("export");
        assert_eq!(summary.bundle_format, BUNDLE_FORMAT);
        assert!(summary.db_bytes > 0);

        let mut archive = ZipArchive::new(File::open(&out).expect("open")).expect("zip");
        let mut manifest_text = String::new();
        archive
            .by_name(MANIFEST_ENTRY)
            .expect("manifest entry")
            .read_to_string(&mut manifest_text)
            .expect("read manifest");
        let manifest: serde_json::Value = serde_json::from_str(&manifest_text).expect("json");
        assert_eq!(manifest["format"], BUNDLE_FORMAT);
        assert_eq!(manifest["dbSha256"], summary.db_sha256.as_str());
        assert!(archive.by_name(DB_ENTRY).is_ok());
    }

    #[test]
    fn export_without_database_fails() {
        let workspace = temp_dir("backup-nodb");
        let out = workspace.join("bundle.zip");
        assert!(export_workspace_bundle(&workspace, &out).is_err());
    }
}
