//! Wallpaper presentation resolution.
//!
//! Turns a [`DisplaySource`] into the background parameters used to draw the
//! desktop. Videos produce an empty style: they are rendered by the playback
//! surface, not as a background image.

use common::{DisplaySource, PresentationStyle};

/// Directory segment marking an image as a repeating tile
const TILES_SEGMENT: &str = "/wallpapers/tiles/";

const TILE_SIZE: &str = "64px 64px";

const BACKGROUND_TRANSITION: &str = "background-image 0.3s ease-in-out";

/// Extensions that mark a remote `https://` source as a video
const REMOTE_VIDEO_EXTENSIONS: [&str; 3] = [".mp4", ".webm", ".ogg"];

/// Compute the background presentation for `source`.
///
/// Never fails: anything that is neither empty nor a video is treated as an
/// image.
pub fn resolve_presentation(source: &DisplaySource) -> PresentationStyle {
    let path = source.as_str();

    if path.is_empty() || is_video_source(path) {
        return PresentationStyle::default();
    }

    let tiled = path.contains(TILES_SEGMENT);
    let (size, repeat) = if tiled {
        (TILE_SIZE, "repeat")
    } else {
        ("cover", "no-repeat")
    };

    PresentationStyle {
        background_image: Some(format!("url({})", path)),
        background_size: Some(size.to_string()),
        background_repeat: Some(repeat.to_string()),
        background_position: Some("center".to_string()),
        transition: Some(BACKGROUND_TRANSITION.to_string()),
    }
}

/// Check whether a source string points at a video
pub fn is_video_source(path: &str) -> bool {
    path.ends_with(".mp4")
        || path.contains("video/")
        || (path.starts_with("https://") && has_remote_video_extension(path))
}

/// Matches `.mp4`, `.webm` or `.ogg` followed by end of string or a query
fn has_remote_video_extension(url: &str) -> bool {
    REMOTE_VIDEO_EXTENSIONS.iter().any(|ext| {
        url.match_indices(ext).any(|(idx, _)| {
            let rest = &url[idx + ext.len()..];
            rest.is_empty() || rest.starts_with('?')
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(s: &str) -> PresentationStyle {
        resolve_presentation(&DisplaySource::new(s))
    }

    #[test]
    fn test_empty_source_has_empty_style() {
        assert!(resolve("").is_empty());
    }

    #[test]
    fn test_tiled_image() {
        let style = resolve("/wallpapers/tiles/brick.png");
        assert_eq!(
            style.background_image.as_deref(),
            Some("url(/wallpapers/tiles/brick.png)")
        );
        assert_eq!(style.background_size.as_deref(), Some("64px 64px"));
        assert_eq!(style.background_repeat.as_deref(), Some("repeat"));
        assert_eq!(style.background_position.as_deref(), Some("center"));
        assert_eq!(
            style.transition.as_deref(),
            Some("background-image 0.3s ease-in-out")
        );
    }

    #[test]
    fn test_photo_is_cover() {
        let style = resolve("/wallpapers/photos/aqua.jpg");
        assert_eq!(style.background_size.as_deref(), Some("cover"));
        assert_eq!(style.background_repeat.as_deref(), Some("no-repeat"));
        assert_eq!(style.background_position.as_deref(), Some("center"));
    }

    #[test]
    fn test_image_style_contains_source() {
        for source in [
            "/wallpapers/photos/aqua.jpg",
            "https://x.com/a.png",
            "data:image/png;base64,iVBORw0KGgo=",
            "not even a path",
        ] {
            let style = resolve(source);
            let image = style.background_image.unwrap();
            assert!(image.contains(source), "{} missing from {}", source, image);
        }
    }

    #[test]
    fn test_video_indicators_have_empty_style() {
        for source in [
            "clip.mp4",
            "https://x.com/a.mp4",
            "https://cdn.example/a.webm?x=1",
            "https://cdn.example/a.ogg",
            "/wallpapers/video/loop.mov",
            "data:video/mp4;base64,AAAA",
        ] {
            assert!(resolve(source).is_empty(), "{} should be a video", source);
        }
    }

    #[test]
    fn test_remote_extension_needs_end_or_query() {
        assert!(!is_video_source("https://cdn.example/a.webm.png"));
        assert!(!is_video_source("https://cdn.example/a.ogg#frag"));
        // Only https URLs use the extension list
        assert!(!is_video_source("/local/clip.webm"));
        assert!(!is_video_source("http://cdn.example/a.webm"));
    }

    #[test]
    fn test_later_extension_match_counts() {
        assert!(is_video_source("https://cdn.example/a.mp4x/b.mp4?t=3"));
    }
}
