//! MIME type lookup by filename extension.

/// Extensions treated as images for inline classification.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Lowercased extension of `filename`, if it has one. A bare `.png` counts
/// as having the extension `png`.
pub fn extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// `true` if the filename ends in one of [`IMAGE_EXTENSIONS`].
pub fn has_image_extension(filename: &str) -> bool {
    extension(filename).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Guess a MIME type from the filename extension.
pub fn guess(filename: &str) -> Option<&'static str> {
    let ext = extension(filename)?;
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        "ico" => "image/vnd.microsoft.icon",
        "pdf" => "application/pdf",
        "doc" | "dot" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "odt" => "application/vnd.oasis.opendocument.text",
        "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        "rtf" => "application/rtf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "7z" => "application/x-7z-compressed",
        "rar" => "application/vnd.rar",
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "htm" | "html" => "text/html",
        "ics" => "text/calendar",
        "vcf" => "text/vcard",
        "eml" => "message/rfc822",
        "msg" => "application/vnd.ms-outlook",
        "mp3" => "audio/mpeg",
        "wav" => "audio/x-wav",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        _ => return None,
    };
    Some(mime)
}

/// Validate a container-supplied type such as `Image/JPEG; x=y` and return
/// its lowercased `type/subtype`. Generic `application/octet-stream` is
/// treated as no hint.
pub fn from_hint(hint: &str) -> Option<String> {
    let essence = hint.split(';').next()?.trim();
    let (kind, subtype) = essence.split_once('/')?;
    let is_token = |part: &str| {
        !part.is_empty()
            && part
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b"!#$&-^_.+".contains(&b))
    };
    if !is_token(kind) || !is_token(subtype) {
        return None;
    }
    let essence = essence.to_ascii_lowercase();
    (essence != "application/octet-stream").then_some(essence)
}

/// MIME type for an inline image: an image hint from the container, else
/// the guessed type if it is an image, else `image/png`.
pub fn inline_image_type(filename: &str, hint: Option<&str>) -> String {
    hint.and_then(from_hint)
        .filter(|m| m.starts_with("image/"))
        .or_else(|| guess(filename).filter(|m| m.starts_with("image/")).map(str::to_string))
        .unwrap_or_else(|| "image/png".to_string())
}

/// MIME type for a regular attachment: the container hint, else the
/// guessed type, else `application/octet-stream`.
pub fn attachment_type(filename: &str, hint: Option<&str>) -> String {
    hint.and_then(from_hint)
        .or_else(|| guess(filename).map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension() {
        assert_eq!(extension("Photo.JPG").as_deref(), Some("jpg"));
        assert_eq!(extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension("README"), None);
        assert_eq!(extension("trailing."), None);
        assert_eq!(extension(".png").as_deref(), Some("png"));
    }

    #[test]
    fn test_has_image_extension() {
        assert!(has_image_extension("image001.PNG"));
        assert!(has_image_extension("x.webp"));
        assert!(!has_image_extension("x.svg"));
        assert!(!has_image_extension("png"));
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(inline_image_type("diagram.pdf", None), "image/png");
        assert_eq!(inline_image_type("a.gif", None), "image/gif");
        assert_eq!(attachment_type("data.unknownext", None), "application/octet-stream");
        assert_eq!(attachment_type("report.pdf", None), "application/pdf");
    }

    #[test]
    fn test_from_hint() {
        assert_eq!(from_hint("Image/JPEG; name=x").as_deref(), Some("image/jpeg"));
        assert_eq!(from_hint("application/octet-stream"), None);
        assert_eq!(from_hint("jpeg"), None);
        assert_eq!(from_hint("text/plain\nX-Injected: yes"), None);
        assert_eq!(from_hint("/pdf"), None);
    }

    #[test]
    fn test_hint_takes_precedence() {
        assert_eq!(inline_image_type("photo.png", Some("image/jpeg")), "image/jpeg");
        assert_eq!(inline_image_type("photo.gif", Some("application/pdf")), "image/gif");
        assert_eq!(attachment_type("blob", Some("application/pdf")), "application/pdf");
        assert_eq!(attachment_type("report.pdf", Some("application/octet-stream")), "application/pdf");
    }
}
