//! Content-addressed inline images.
//!
//! An image reference such as `logo.png` is turned into a content id of the
//! form `<hex sha3-512 of the reference><ext>` (or `<hash>-<width><ext>` for a
//! sized variant). The id is used both as the attachment's Content-ID and in
//! the `cid:` URL of the generated `<img>` tag, so repeated references to the
//! same image always resolve to the same attachment.

use std::path::Path;
use std::sync::Arc;

use handlebars::html_escape;
use sha3::{Digest, Sha3_512};

use super::types::InlineAttachment;
use crate::storage::{validate_name, FileStorage, StorageError};

/// Where image bytes come from.
pub trait ImageSource: Send + Sync {
    fn load(&self, reference: &str) -> Result<Vec<u8>, StorageError>;
}

impl ImageSource for FileStorage {
    fn load(&self, reference: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(reference)?;
        std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(reference.to_string())
            } else {
                StorageError::Io {
                    path: path.display().to_string(),
                    source: e,
                }
            }
        })
    }
}

/// Requested display size of a sized image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSize {
    pub width: String,
    pub height: String,
}

/// Outcome of resolving one image reference.
#[derive(Debug, Clone)]
pub enum Resolved {
    Inline {
        markup: String,
        attachment: InlineAttachment,
    },
    Missing {
        placeholder: String,
    },
}

impl Resolved {
    pub fn markup(&self) -> &str {
        match self {
            Resolved::Inline { markup, .. } => markup,
            Resolved::Missing { placeholder } => placeholder,
        }
    }
}

/// Hex-encoded SHA3-512 digest.
pub fn hash_reference(reference: &str) -> String {
    let mut hasher = Sha3_512::new();
    hasher.update(reference.as_bytes());
    hex::encode(hasher.finalize())
}

/// File extension of `reference` including the leading dot, or "".
fn extension(reference: &str) -> &str {
    Path::new(reference)
        .extension()
        .and_then(|e| e.to_str())
        .and_then(|e| reference.get(reference.len() - e.len() - 1..))
        .unwrap_or("")
}

/// Content id for an image reference, optionally for a given width.
pub fn content_id(reference: &str, width: Option<&str>) -> String {
    let hash = hash_reference(reference);
    let ext = extension(reference);
    match width {
        Some(width) => format!("{}-{}{}", hash, width, ext),
        None => format!("{}{}", hash, ext),
    }
}

/// MIME type taken from the extension, e.g. `image/png`.
pub fn content_type(reference: &str) -> String {
    format!("image/{}", extension(reference).trim_start_matches('.'))
}

/// Resolves image references against an [`ImageSource`].
#[derive(Clone)]
pub struct ImageResolver {
    source: Arc<dyn ImageSource>,
}

impl ImageResolver {
    pub fn new(source: Arc<dyn ImageSource>) -> Self {
        Self { source }
    }

    /// Load the image and build its markup and attachment. A missing or
    /// unreadable image produces a placeholder instead of an error.
    pub fn resolve(&self, reference: &str, size: Option<&ImageSize>) -> Resolved {
        if validate_name(reference).is_err() {
            tracing::warn!(image = %reference, "Rejected image reference");
            return Resolved::Missing {
                placeholder: format!("Image not found: {}", html_escape(reference)),
            };
        }

        let data = match self.source.load(reference) {
            Ok(data) => data,
            Err(StorageError::NotFound(_)) => {
                tracing::warn!(image = %reference, "Image not found");
                return Resolved::Missing {
                    placeholder: format!("Image not found: {}", html_escape(reference)),
                };
            }
            Err(e) => {
                tracing::warn!(image = %reference, error = %e, "Failed to read image");
                return Resolved::Missing {
                    placeholder: format!("Failed to read image: {}", html_escape(reference)),
                };
            }
        };

        let id = content_id(reference, size.map(|s| s.width.as_str()));
        let markup = match size {
            Some(size) => format!(
                r#"<img src="cid:{id}" alt="{id}" width="{}" height="{}">"#,
                html_escape(&size.width),
                html_escape(&size.height),
            ),
            None => format!(r#"<img src="cid:{id}" alt="{id}">"#),
        };

        Resolved::Inline {
            markup,
            attachment: InlineAttachment {
                content_id: id.clone(),
                filename: id,
                content_type: content_type(reference),
                data,
            },
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryImages;
    use super::*;

    fn resolver() -> ImageResolver {
        ImageResolver::new(Arc::new(
            MemoryImages::default()
                .with("logo.png", b"PNG")
                .with("banner.jpg", b"JPG"),
        ))
    }

    #[test]
    fn test_hash_is_sha3_512_hex() {
        // SHA3-512("")
        assert_eq!(
            hash_reference(""),
            "a69f73cca23a9ac5c8b567dc185a756e97c982164fe25859e0d1dcc1475c80a6\
             15b2123af1f5f94c11e3e9402c3ac558f500199d95b6d3e301758586281dcd26"
        );
        assert_eq!(hash_reference("logo.png").len(), 128);
    }

    #[test]
    fn test_content_id_format() {
        let hash = hash_reference("logo.png");
        assert_eq!(content_id("logo.png", None), format!("{hash}.png"));
        assert_eq!(content_id("logo.png", Some("120")), format!("{hash}-120.png"));
        assert_eq!(content_id("noext", None), hash_reference("noext"));
    }

    #[test]
    fn test_content_type_from_extension() {
        assert_eq!(content_type("logo.png"), "image/png");
        assert_eq!(content_type("photo.jpeg"), "image/jpeg");
        assert_eq!(content_type("noext"), "image/");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let resolver = resolver();
        for size in [
            None,
            Some(ImageSize {
                width: "120".into(),
                height: "40".into(),
            }),
        ] {
            let a = resolver.resolve("logo.png", size.as_ref());
            let b = resolver.resolve("logo.png", size.as_ref());
            assert_eq!(a.markup(), b.markup());

            match (a, b) {
                (
                    Resolved::Inline { attachment: a, .. },
                    Resolved::Inline { attachment: b, .. },
                ) => assert_eq!(a, b),
                _ => panic!("expected inline images"),
            }
        }
    }

    #[test]
    fn test_sizes_get_distinct_ids() {
        let resolver = resolver();
        let small = ImageSize {
            width: "100".into(),
            height: "50".into(),
        };
        let large = ImageSize {
            width: "200".into(),
            height: "100".into(),
        };

        let ids: Vec<String> = [None, Some(&small), Some(&large)]
            .into_iter()
            .map(|size| match resolver.resolve("logo.png", size) {
                Resolved::Inline { attachment, .. } => attachment.content_id,
                Resolved::Missing { .. } => panic!("expected inline image"),
            })
            .collect();

        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
        assert_ne!(ids[0], ids[2]);
    }

    #[test]
    fn test_markup() {
        let resolver = resolver();
        let id = content_id("banner.jpg", None);
        assert_eq!(
            resolver.resolve("banner.jpg", None).markup(),
            format!(r#"<img src="cid:{id}" alt="{id}">"#)
        );

        let size = ImageSize {
            width: "120".into(),
            height: "40".into(),
        };
        let id = content_id("banner.jpg", Some("120"));
        assert_eq!(
            resolver.resolve("banner.jpg", Some(&size)).markup(),
            format!(r#"<img src="cid:{id}" alt="{id}" width="120" height="40">"#)
        );
    }

    #[test]
    fn test_missing_image_is_placeholder() {
        let resolver = resolver();
        match resolver.resolve("nope.png", None) {
            Resolved::Missing { placeholder } => {
                assert_eq!(placeholder, "Image not found: nope.png")
            }
            Resolved::Inline { .. } => panic!("expected placeholder"),
        }
    }

    #[test]
    fn test_traversal_reference_is_placeholder() {
        let resolver = resolver();
        assert!(matches!(
            resolver.resolve("../secret.png", None),
            Resolved::Missing { .. }
        ));
    }
}
