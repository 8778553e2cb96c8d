use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{debug, warn};
use std::fs;
use std::path::Path;

/// Background of the login page
pub const LOGIN_BACKGROUND: &str = "backdrop.jpg";
/// Background of the domain pages
pub const PAGE_BACKGROUND: &str = "matte.jpg";

/// Crimson outline buttons shared by every page
pub const BUTTON_CSS: &str = r#"
button, .button {
    border: 2px solid #DC143C;
    background: white;
    color: #DC143C;
    border-radius: 6px;
    padding: 0.4rem 1rem;
    cursor: pointer;
}
button:hover, .button:hover {
    background-color: #DC143C;
    color: white;
    border: 2px solid #DC143C;
}
"#;

/// MIME type of an image judged by its file extension
///
/// Unknown extensions are treated as JPEG.
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

/// CSS that paints `path` as a fixed full-page background
///
/// The image is embedded as a base64 data URI. Returns `None` when the file
/// is missing or unreadable so pages simply render without a background.
pub fn background_css(path: &Path) -> Option<String> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            if path.exists() {
                warn!("background {} unreadable: {}", path.display(), e);
            } else {
                debug!("no background image at {}", path.display());
            }
            return None;
        }
    };

    let encoded = STANDARD.encode(bytes);
    Some(format!(
        r#"
body {{
    background-image: url("data:{mime};base64,{encoded}");
    background-size: cover;
    background-position: center center;
    background-repeat: no-repeat;
    background-attachment: fixed;
}}
main {{
    background: rgba(255, 255, 255, 0.9);
    padding: 2rem;
    border-radius: 10px;
}}
"#,
        mime = mime_for(path),
        encoded = encoded,
    ))
}

/// Background CSS of both page kinds, read once at startup
#[derive(Debug, Clone, Default)]
pub struct Theme {
    pub login_css: Option<String>,
    pub page_css: Option<String>,
}

impl Theme {
    pub fn load(image_dir: &Path) -> Self {
        Theme {
            login_css: background_css(&image_dir.join(LOGIN_BACKGROUND)),
            page_css: background_css(&image_dir.join(PAGE_BACKGROUND)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn mime_by_extension() {
        assert_eq!(mime_for(&PathBuf::from("imgs/a.png")), "image/png");
        assert_eq!(mime_for(&PathBuf::from("imgs/a.JPG")), "image/jpeg");
        assert_eq!(mime_for(&PathBuf::from("imgs/a.jpeg")), "image/jpeg");
        assert_eq!(mime_for(&PathBuf::from("imgs/a.gif")), "image/gif");
        assert_eq!(mime_for(&PathBuf::from("imgs/a.webp")), "image/jpeg");
        assert_eq!(mime_for(&PathBuf::from("imgs/noext")), "image/jpeg");
    }

    #[test]
    fn background_is_embedded_as_data_uri() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matte.png");
        fs::write(&path, b"abc").unwrap();

        let css = background_css(&path).unwrap();
        assert!(css.contains("url(\"data:image/png;base64,YWJj\")"));
        assert!(css.contains("background-attachment: fixed"));
    }

    #[test]
    fn missing_images_mean_no_background() {
        let dir = tempfile::tempdir().unwrap();
        assert!(background_css(&dir.path().join("nothing.jpg")).is_none());

        let theme = Theme::load(dir.path());
        assert!(theme.login_css.is_none());
        assert!(theme.page_css.is_none());
    }

    #[test]
    fn theme_picks_the_two_backgrounds() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(LOGIN_BACKGROUND), b"login").unwrap();

        let theme = Theme::load(dir.path());
        assert!(theme.login_css.unwrap().contains("image/jpeg"));
        assert!(theme.page_css.is_none());
    }
}
