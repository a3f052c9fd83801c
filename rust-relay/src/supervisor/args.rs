//! Command-line construction for the two child processes.

use std::path::Path;
use std::time::Duration;

use super::session::Layout;
use crate::config::PublishConfig;

/// Format selector handed to the downloader.
const SOURCE_FORMAT: &str = "best[height<=1080]";

/// `--download-sections` value resuming at `offset` floored to whole seconds,
/// or `None` when the offset is too small for a seek to be worth it.
pub fn seek_directive(offset: Duration, min_seek: Duration) -> Option<String> {
    (offset > min_seek).then(|| format!("*{}-inf", offset.as_secs()))
}

/// Build downloader arguments.
pub fn build_source_args(
    url: &str,
    offset: Duration,
    min_seek: Duration,
    proxy: Option<&str>,
) -> Vec<String> {
    let mut args = vec![
        "-o".to_string(),
        "-".to_string(),
        "-f".to_string(),
        SOURCE_FORMAT.to_string(),
        "--no-part".to_string(),
    ];

    if let Some(section) = seek_directive(offset, min_seek) {
        args.extend(["--download-sections".to_string(), section]);
    }

    if let Some(proxy) = proxy {
        args.extend(["--proxy".to_string(), proxy.to_string()]);
    }

    // URL last, after all options
    args.push(url.to_string());
    args
}

/// Composition graph: black canvas, scaled source at the layout position,
/// overlay image on top at the origin.
pub fn build_filter_graph(layout: &Layout, publish: &PublishConfig) -> String {
    format!(
        "color=s={cw}x{ch}:c=black[bg];\
         [0:v]scale={w}:{h}[vid];\
         [bg][vid]overlay={x}:{y}[layer1];\
         [layer1][1:v]overlay=0:0",
        cw = publish.canvas_width,
        ch = publish.canvas_height,
        w = layout.w,
        h = layout.h,
        x = layout.x,
        y = layout.y,
    )
}

/// Build ffmpeg arguments: stream from stdin, looped overlay image, encode and
/// publish as FLV.
pub fn build_transform_args(
    overlay_path: &Path,
    layout: &Layout,
    publish: &PublishConfig,
) -> Vec<String> {
    let mut args = Vec::new();

    // Input 0: media from the pipe, paced at native rate
    args.extend([
        "-hide_banner".to_string(),
        "-re".to_string(),
        "-i".to_string(),
        "pipe:0".to_string(),
    ]);

    // Input 1: overlay image
    args.extend([
        "-loop".to_string(),
        "1".to_string(),
        "-i".to_string(),
        overlay_path.to_string_lossy().replace('\\', "/"),
    ]);

    args.extend([
        "-filter_complex".to_string(),
        build_filter_graph(layout, publish),
    ]);

    args.extend([
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        publish.video_preset.clone(),
        "-b:v".to_string(),
        publish.video_bitrate.clone(),
        "-maxrate".to_string(),
        publish.max_rate.clone(),
        "-bufsize".to_string(),
        publish.buf_size.clone(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-g".to_string(),
        publish.gop.to_string(),
    ]);

    args.extend([
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        publish.audio_bitrate.clone(),
        "-ar".to_string(),
        publish.audio_rate.to_string(),
    ]);

    // Stop when the piped video ends; the looped image never does.
    args.push("-shortest".to_string());

    args.extend(["-f".to_string(), "flv".to_string(), publish.destination()]);

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::session::DEFAULT_LAYOUT;

    const MIN_SEEK: Duration = Duration::from_secs(5);

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_no_seek_at_small_offsets() {
        assert_eq!(seek_directive(Duration::ZERO, MIN_SEEK), None);
        assert_eq!(seek_directive(Duration::from_secs(5), MIN_SEEK), None);
        assert_eq!(
            seek_directive(Duration::from_millis(10_400), MIN_SEEK).as_deref(),
            Some("*10-inf")
        );
    }

    #[test]
    fn test_source_args_without_seek() {
        let args = build_source_args("https://example.com/v", Duration::from_secs(3), MIN_SEEK, None);

        assert_eq!(value_after(&args, "-o"), Some("-"));
        assert_eq!(value_after(&args, "-f"), Some("best[height<=1080]"));
        assert!(!args.iter().any(|a| a == "--download-sections"));
        assert!(!args.iter().any(|a| a == "--proxy"));
        assert_eq!(args.last().map(String::as_str), Some("https://example.com/v"));
    }

    #[test]
    fn test_source_args_with_seek_and_proxy() {
        let args = build_source_args(
            "https://example.com/v",
            Duration::from_secs(42),
            MIN_SEEK,
            Some("http://proxy:3128"),
        );

        assert_eq!(value_after(&args, "--download-sections"), Some("*42-inf"));
        assert_eq!(value_after(&args, "--proxy"), Some("http://proxy:3128"));
        assert_eq!(args.last().map(String::as_str), Some("https://example.com/v"));
    }

    #[test]
    fn test_filter_graph_embeds_layout() {
        let layout = Layout {
            x: 12,
            y: 500,
            w: 640,
            h: 360,
        };
        let graph = build_filter_graph(&layout, &PublishConfig::default());

        assert_eq!(
            graph,
            "color=s=1080x1920:c=black[bg];[0:v]scale=640:360[vid];\
             [bg][vid]overlay=12:500[layer1];[layer1][1:v]overlay=0:0"
        );
        assert!(!graph.contains(char::is_whitespace));
    }

    #[test]
    fn test_transform_args() {
        let publish = PublishConfig {
            stream_key: "key-123".to_string(),
            ..PublishConfig::default()
        };
        let args = build_transform_args(Path::new("uploads/logo.png"), &DEFAULT_LAYOUT, &publish);

        assert_eq!(value_after(&args, "-i"), Some("pipe:0"));
        assert_eq!(value_after(&args, "-loop"), Some("1"));
        assert!(args.iter().any(|a| a == "uploads/logo.png"));
        assert!(args.iter().any(|a| a == "-shortest"));
        assert_eq!(value_after(&args, "-f"), Some("flv"));
        assert_eq!(
            args.last().map(String::as_str),
            Some("rtmp://a.rtmp.youtube.com/live2/key-123")
        );
    }
}
