//! Builds the reference gallery from a directory of labelled face photos.
//!
//! Each `<identity>.{png,jpg,jpeg}` file contributes one entry. Problem files
//! are skipped and logged; a build never fails as a whole.

use crate::encoder::FaceEncoder;
use crate::types::{Gallery, GalleryEntry};
use std::path::Path;

/// Accepted reference image extensions, compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub fn is_gallery_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|a| ext.eq_ignore_ascii_case(a)))
}

/// Identity label for a reference image: its file name without extension.
pub fn identity_for(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
}

#[derive(Debug, Default)]
struct BuildStats {
    loaded: usize,
    no_face: usize,
    failed: usize,
}

/// Scan `dir` and extract one embedding per reference image.
///
/// Entries follow directory listing order. A missing or unreadable directory
/// yields an empty gallery, which matches nothing.
pub fn build_gallery<E: FaceEncoder + ?Sized>(dir: &Path, encoder: &mut E) -> Gallery {
    let mut gallery = Gallery::empty().with_source_dir(dir);

    let listing = match std::fs::read_dir(dir) {
        Ok(listing) => listing,
        Err(err) => {
            tracing::error!(
                dir = %dir.display(),
                error = %err,
                "cannot read gallery directory; every query will be answered with no match"
            );
            return gallery;
        }
    };

    let mut stats = BuildStats::default();
    for item in listing {
        let path = match item {
            Ok(item) => item.path(),
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "skipping unreadable directory entry");
                stats.failed += 1;
                continue;
            }
        };
        if !path.is_file() || !is_gallery_image(&path) {
            continue;
        }
        let Some(identity) = identity_for(&path) else {
            continue;
        };

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable image");
                stats.failed += 1;
                continue;
            }
        };

        let embedding = match encoder.encode(&bytes) {
            Ok(Some(embedding)) if embedding.dimension() > 0 => embedding,
            Ok(Some(_)) => {
                tracing::warn!(path = %path.display(), "skipping image with an empty embedding");
                stats.failed += 1;
                continue;
            }
            Ok(None) => {
                tracing::warn!(path = %path.display(), "no face found in reference image");
                stats.no_face += 1;
                continue;
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to encode reference image");
                stats.failed += 1;
                continue;
            }
        };

        match gallery.push(GalleryEntry {
            identity: identity.clone(),
            embedding,
        }) {
            Ok(()) => {
                tracing::debug!(identity = %identity, path = %path.display(), "loaded reference face");
                stats.loaded += 1;
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping reference image");
                stats.failed += 1;
            }
        }
    }

    tracing::info!(
        dir = %dir.display(),
        loaded = stats.loaded,
        no_face = stats.no_face,
        failed = stats.failed,
        "gallery built"
    );
    gallery
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::EncodeError;
    use crate::types::Embedding;
    use std::path::PathBuf;

    /// Reads file contents as comma-separated floats; "noface" has no face,
    /// "corrupt" fails to decode.
    struct TextEncoder {
        calls: usize,
    }

    impl FaceEncoder for TextEncoder {
        fn encode(&mut self, image: &[u8]) -> Result<Option<Embedding>, EncodeError> {
            self.calls += 1;
            let text = std::str::from_utf8(image).map_err(|e| EncodeError::Other(e.to_string()))?;
            match text.trim() {
                "noface" => Ok(None),
                "corrupt" => Err(EncodeError::Other("corrupt image".into())),
                values => Ok(Some(Embedding::new(
                    values
                        .split(',')
                        .map(|v| v.trim().parse::<f32>().map_err(|e| EncodeError::Other(e.to_string())))
                        .collect::<Result<_, _>>()?,
                ))),
            }
        }
    }

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    fn identities(gallery: &Gallery) -> Vec<String> {
        let mut ids: Vec<String> = gallery.entries().iter().map(|e| e.identity.clone()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_builds_entries_from_file_stems() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "harry.jpg", "0.0, 1.0");
        write(dir.path(), "hermione.PNG", "1.0, 0.0");
        write(dir.path(), "ron.JpEg", "0.5, 0.5");

        let mut encoder = TextEncoder { calls: 0 };
        let gallery = build_gallery(dir.path(), &mut encoder);

        assert_eq!(identities(&gallery), vec!["harry", "hermione", "ron"]);
        assert_eq!(gallery.dimension(), Some(2));
        assert_eq!(gallery.source_dir(), Some(dir.path()));
    }

    #[test]
    fn test_ignores_unsupported_extensions() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "harry.jpg", "0.0, 1.0");
        write(dir.path(), "notes.txt", "1.0, 0.0");
        write(dir.path(), "README", "1.0, 0.0");
        std::fs::create_dir(dir.path().join("folder.png")).unwrap();

        let mut encoder = TextEncoder { calls: 0 };
        let gallery = build_gallery(dir.path(), &mut encoder);

        assert_eq!(identities(&gallery), vec!["harry"]);
        assert_eq!(encoder.calls, 1);
    }

    #[test]
    fn test_skips_faceless_and_broken_images() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "harry.jpg", "0.0, 1.0");
        write(dir.path(), "landscape.jpg", "noface");
        write(dir.path(), "broken.png", "corrupt");

        let mut encoder = TextEncoder { calls: 0 };
        let gallery = build_gallery(dir.path(), &mut encoder);

        assert_eq!(identities(&gallery), vec!["harry"]);
        assert_eq!(encoder.calls, 3);
    }

    #[test]
    fn test_missing_directory_yields_empty_gallery() {
        let dir = tempfile::tempdir().unwrap();
        let missing: PathBuf = dir.path().join("does-not-exist");

        let mut encoder = TextEncoder { calls: 0 };
        let gallery = build_gallery(&missing, &mut encoder);

        assert!(gallery.is_empty());
        assert_eq!(encoder.calls, 0);
    }

    #[test]
    fn test_single_mismatched_dimension_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "harry.jpg", "0.0, 1.0");

        let mut encoder = TextEncoder { calls: 0 };
        let first = build_gallery(dir.path(), &mut encoder);
        assert_eq!(first.len(), 1);

        // Whichever entry is listed first fixes the dimension; the other is dropped.
        write(dir.path(), "ron.jpg", "0.0, 1.0, 2.0");
        let second = build_gallery(dir.path(), &mut encoder);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn test_identity_and_extension_helpers() {
        assert!(is_gallery_image(Path::new("/x/a.JPG")));
        assert!(!is_gallery_image(Path::new("/x/a.gif")));
        assert!(!is_gallery_image(Path::new("/x/jpg")));
        assert_eq!(identity_for(Path::new("/x/Harry Potter.jpeg")).as_deref(), Some("Harry Potter"));
        assert_eq!(identity_for(Path::new("/x/archive.tar.png")).as_deref(), Some("archive.tar"));
    }
}
