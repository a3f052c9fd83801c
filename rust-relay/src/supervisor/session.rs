//! Desired pipeline configuration and the logical session clock.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{Error, Result};

/// Layout used when an operator starts or switches a stream without one.
pub const DEFAULT_LAYOUT: Layout = Layout {
    x: 0,
    y: 500,
    w: 1080,
    h: 607,
};

/// Placement of the source video on the output canvas, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Layout {
    pub fn validate(&self) -> Result<()> {
        if self.w == 0 || self.h == 0 {
            return Err(Error::validation(format!(
                "layout width and height must be positive, got {}x{}",
                self.w, self.h
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "X={}, Y={}, W={}, H={}", self.x, self.y, self.w, self.h)
    }
}

/// Start of the logical playback position.
///
/// The monotonic instant drives resume offsets; the wall-clock timestamp is
/// only reported.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    started: Instant,
    started_at: DateTime<Utc>,
}

impl SessionClock {
    pub fn starting_at(now: Instant) -> Self {
        Self {
            started: now,
            started_at: Utc::now(),
        }
    }

    /// Playback position at `now`.
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// The configuration the supervisor is trying to keep running.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    source_url: Option<String>,
    layout: Option<Layout>,
    overlay_path: PathBuf,
    clock: Option<SessionClock>,
}

impl SessionConfig {
    pub fn new(overlay_path: impl Into<PathBuf>) -> Self {
        Self {
            source_url: None,
            layout: None,
            overlay_path: overlay_path.into(),
            clock: None,
        }
    }

    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    pub fn layout(&self) -> Option<Layout> {
        self.layout
    }

    pub fn overlay_path(&self) -> &Path {
        &self.overlay_path
    }

    /// Begin a new logical session: new source, new clock.
    pub fn begin(&mut self, source_url: String, layout: Layout, now: Instant) {
        self.source_url = Some(source_url);
        self.layout = Some(layout);
        self.clock = Some(SessionClock::starting_at(now));
    }

    /// Apply a hot-swap. The clock is left alone.
    pub fn merge_overlay(&mut self, layout: Option<Layout>, overlay_path: Option<PathBuf>) {
        if let Some(layout) = layout {
            self.layout = Some(layout);
        }
        if let Some(path) = overlay_path {
            self.overlay_path = path;
        }
    }

    pub fn set_overlay_path(&mut self, path: PathBuf) {
        self.overlay_path = path;
    }

    /// Elapsed playback position, zero when no session is running.
    pub fn resume_offset(&self, now: Instant) -> Duration {
        self.clock
            .map(|clock| clock.elapsed(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Source and layout to respawn with.
    pub fn resume_target(&self) -> Result<(String, Layout)> {
        let url = self
            .source_url
            .clone()
            .ok_or_else(|| Error::missing_config("no source url"))?;
        let layout = self
            .layout
            .ok_or_else(|| Error::missing_config("no layout"))?;
        Ok((url, layout))
    }

    /// Forget the session. The overlay asset is operator-provided and survives.
    pub fn clear(&mut self) {
        self.source_url = None;
        self.layout = None;
        self.clock = None;
    }

    pub fn is_empty(&self) -> bool {
        self.source_url.is_none() && self.layout.is_none() && self.clock.is_none()
    }

    pub fn snapshot(&self, now: Instant) -> SessionSnapshot {
        SessionSnapshot {
            url: self.source_url.clone(),
            layout: self.layout,
            overlay_path: self.overlay_path.clone(),
            session_started_at: self.clock.map(|c| c.started_at()),
            position_secs: self.clock.map(|c| c.elapsed(now).as_secs()),
        }
    }
}

/// Read-only view of [`SessionConfig`] for status queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub url: Option<String>,
    pub layout: Option<Layout>,
    pub overlay_path: PathBuf,
    pub session_started_at: Option<DateTime<Utc>>,
    pub position_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_session(now: Instant) -> SessionConfig {
        let mut session = SessionConfig::new("overlay.png");
        session.begin("https://example.com/watch?v=a".into(), DEFAULT_LAYOUT, now);
        session
    }

    #[test]
    fn test_resume_offset_tracks_clock() {
        let t0 = Instant::now();
        let session = started_session(t0);

        assert_eq!(
            session.resume_offset(t0 + Duration::from_secs(10)),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_resume_offset_never_negative() {
        let t0 = Instant::now();
        let session = started_session(t0 + Duration::from_secs(5));

        assert_eq!(session.resume_offset(t0), Duration::ZERO);
    }

    #[test]
    fn test_merge_overlay_keeps_clock() {
        let t0 = Instant::now();
        let mut session = started_session(t0);
        let layout = Layout {
            x: 10,
            y: 20,
            w: 640,
            h: 360,
        };

        session.merge_overlay(Some(layout), Some(PathBuf::from("new.png")));

        assert_eq!(session.layout(), Some(layout));
        assert_eq!(session.overlay_path(), Path::new("new.png"));
        assert_eq!(
            session.resume_offset(t0 + Duration::from_secs(3)),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_begin_resets_clock() {
        let t0 = Instant::now();
        let mut session = started_session(t0);
        let t1 = t0 + Duration::from_secs(10);

        session.begin("https://example.com/b".into(), DEFAULT_LAYOUT, t1);

        assert_eq!(session.resume_offset(t1), Duration::ZERO);
        assert_eq!(session.source_url(), Some("https://example.com/b"));
    }

    #[test]
    fn test_clear_keeps_overlay_asset() {
        let mut session = started_session(Instant::now());
        session.set_overlay_path(PathBuf::from("uploads/1.png"));

        session.clear();

        assert!(session.is_empty());
        assert_eq!(session.overlay_path(), Path::new("uploads/1.png"));
        assert!(matches!(
            session.resume_target(),
            Err(Error::MissingConfig(_))
        ));
    }

    #[test]
    fn test_layout_validation() {
        assert!(DEFAULT_LAYOUT.validate().is_ok());
        let flat = Layout { h: 0, ..DEFAULT_LAYOUT };
        assert!(matches!(flat.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let t0 = Instant::now();
        let session = started_session(t0);
        let json = serde_json::to_value(session.snapshot(t0 + Duration::from_secs(4))).unwrap();

        assert_eq!(json["url"], "https://example.com/watch?v=a");
        assert_eq!(json["layout"]["w"], 1080);
        assert_eq!(json["overlayPath"], "overlay.png");
        assert_eq!(json["positionSecs"], 4);
        assert!(json["sessionStartedAt"].is_string());
    }
}
