//! TW-014: BLAKE3 digests of synthesized artifacts.
//!
//! Printed by `twinform synth` so two runs can be compared at a glance:
//! identical trees and configuration give identical digests.

use super::app::Artifacts;
use std::fs::File;
use std::path::{Path, PathBuf};

const PREFIX: &str = "blake3:";

fn render(hash: blake3::Hash) -> String {
    format!("{}{}", PREFIX, hash.to_hex())
}

/// Digest of one artifact file, streamed from disk.
pub fn file_digest(path: &Path) -> Result<String, String> {
    let file = File::open(path).map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
    let mut hasher = blake3::Hasher::new();
    hasher
        .update_reader(file)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    Ok(render(hasher.finalize()))
}

/// Digest of rendered artifact text, equal to `file_digest` of a file
/// holding it.
pub fn text_digest(text: &str) -> String {
    render(blake3::hash(text.as_bytes()))
}

/// Per-file digests of one run, manifest first, then templates in stack
/// declaration order.
pub fn artifact_digests(artifacts: &Artifacts) -> Result<Vec<(PathBuf, String)>, String> {
    std::iter::once(&artifacts.manifest)
        .chain(artifacts.templates.iter())
        .map(|p| file_digest(p).map(|h| (p.clone(), h)))
        .collect()
}

/// One digest over all files of a run. File names take part, so renaming a
/// stack changes it.
pub fn run_digest(digests: &[(PathBuf, String)]) -> String {
    let listing: String = digests
        .iter()
        .map(|(path, hash)| {
            let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            format!("{}\0{}\n", name, hash)
        })
        .collect();
    text_digest(&listing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tw014_file_digest_matches_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docker-compose.yml");
        std::fs::write(&path, "name: twinform\n").unwrap();
        let h = file_digest(&path).unwrap();
        assert_eq!(h, text_digest("name: twinform\n"));
        assert_eq!(h.len(), PREFIX.len() + 64);
    }

    #[test]
    fn test_tw014_file_digest_missing() {
        assert!(file_digest(Path::new("/nonexistent/docker-compose.yml")).is_err());
    }

    #[test]
    fn test_tw014_run_digest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("docker-compose.yml");
        let template = dir.path().join("MainStack.template.json");
        std::fs::write(&manifest, "services: {}\n").unwrap();
        std::fs::write(&template, "{}").unwrap();
        let artifacts = Artifacts {
            manifest,
            templates: vec![template],
            service_order: Vec::new(),
        };
        let digests = artifact_digests(&artifacts).unwrap();
        assert_eq!(digests.len(), 2);
        assert_eq!(run_digest(&digests), run_digest(&digests));
        assert_eq!(
            run_digest(&digests),
            text_digest(&format!(
                "docker-compose.yml\0{}\nMainStack.template.json\0{}\n",
                digests[0].1, digests[1].1
            ))
        );

        let mut renamed = digests.clone();
        renamed[1].0 = dir.path().join("Other.template.json");
        assert_ne!(run_digest(&digests), run_digest(&renamed));
    }
}
