use s3_utils::content_etag;

/// A publishable file, identified by its path relative to the content root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentObject {
    /// Object key: relative path with `/` separators, no leading slash
    pub path: String,
    pub body: Vec<u8>,
    /// MD5 hex, comparable with the ETag of a single-part upload
    pub content_hash: String,
    pub content_type: String,
}

impl ContentObject {
    pub fn new(path: impl Into<String>, body: Vec<u8>) -> Self {
        let path = path.into();
        let content_type = content_type_for(&path);
        Self {
            content_hash: content_etag(&body),
            content_type,
            path,
            body,
        }
    }
}

/// Content type from the file extension; unknown extensions are served as octet streams
pub fn content_type_for(path: &str) -> String {
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let mime = match extension.as_str() {
        "html" | "htm" => mime::TEXT_HTML_UTF_8,
        "css" => mime::TEXT_CSS_UTF_8,
        "js" | "mjs" => mime::APPLICATION_JAVASCRIPT_UTF_8,
        "json" | "map" => mime::APPLICATION_JSON,
        "txt" => mime::TEXT_PLAIN_UTF_8,
        "xml" => mime::TEXT_XML,
        "svg" => mime::IMAGE_SVG,
        "png" => mime::IMAGE_PNG,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "gif" => mime::IMAGE_GIF,
        "bmp" => mime::IMAGE_BMP,
        "pdf" => mime::APPLICATION_PDF,
        "woff" => mime::FONT_WOFF,
        "woff2" => mime::FONT_WOFF2,
        "webp" => return "image/webp".to_string(),
        "ico" => return "image/x-icon".to_string(),
        "webmanifest" => return "application/manifest+json".to_string(),
        _ => mime::APPLICATION_OCTET_STREAM,
    };

    mime.to_string()
}
