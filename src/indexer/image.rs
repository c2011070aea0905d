use crate::types::GovernanceError;

/// Largest accepted image, in bytes.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Accepted image formats, recognised by their magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else {
            None
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
        }
    }
}

/// Check size and format of an uploaded image.
pub fn validate_image(bytes: &[u8]) -> Result<ImageFormat, GovernanceError> {
    if bytes.is_empty() {
        return Err(GovernanceError::InvalidRequest("image is empty".to_string()));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(GovernanceError::InvalidRequest(format!(
            "image is {} bytes, the maximum is {} bytes (10 MB)",
            bytes.len(),
            MAX_IMAGE_BYTES
        )));
    }
    ImageFormat::detect(bytes).ok_or_else(|| {
        GovernanceError::InvalidRequest(
            "unsupported image format, expected JPEG, PNG, GIF or WebP".to_string(),
        )
    })
}

/// New image id: `img_` followed by 12 hex characters.
pub fn new_image_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("img_{}", &id[..12])
}

/// Text indexed for an image: everything known about it, one section each.
pub fn integrated_content(
    title: &str,
    description: &str,
    ocr_text: &str,
    additional_context: Option<&str>,
) -> String {
    let sections = [
        ("Image title", title),
        ("Image content", description),
        ("Extracted text", ocr_text),
        ("Additional context", additional_context.unwrap_or_default()),
    ];

    sections
        .into_iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(label, value)| {
            if label == "Extracted text" {
                format!("{}:\n{}", label, value.trim())
            } else {
                format!("{}: {}", label, value.trim())
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn test_detect_formats() {
        assert_eq!(ImageFormat::detect(PNG), Some(ImageFormat::Png));
        assert_eq!(
            ImageFormat::detect(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(ImageFormat::detect(b"GIF89a..."), Some(ImageFormat::Gif));
        assert_eq!(
            ImageFormat::detect(b"RIFF\0\0\0\0WEBPVP8 "),
            Some(ImageFormat::Webp)
        );
        assert_eq!(ImageFormat::detect(b"%PDF-1.7"), None);
    }

    #[test]
    fn test_validate_rejects_large_and_unknown() {
        assert!(validate_image(PNG).is_ok());
        assert!(matches!(
            validate_image(b""),
            Err(GovernanceError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_image(b"plain text"),
            Err(GovernanceError::InvalidRequest(_))
        ));

        let mut big = PNG.to_vec();
        big.resize(MAX_IMAGE_BYTES + 1, 0);
        assert!(matches!(
            validate_image(&big),
            Err(GovernanceError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_image_id_shape() {
        let id = new_image_id();
        assert_eq!(id.len(), 16);
        assert!(id.starts_with("img_"));
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_image_id());
    }

    #[test]
    fn test_integrated_content_skips_empty_sections() {
        let content = integrated_content("Receipt", "A shop receipt", "", Some("March groceries"));
        assert_eq!(
            content,
            "Image title: Receipt\n\nImage content: A shop receipt\n\nAdditional context: March groceries"
        );

        let content = integrated_content("Sign", "", "OPEN\n9-5", None);
        assert_eq!(content, "Image title: Sign\n\nExtracted text:\nOPEN\n9-5");
    }
}
