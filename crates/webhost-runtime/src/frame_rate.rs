use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

/// Counts displayed frames and produces one frame-rate sample per elapsed
/// one-second window.
#[derive(Debug, Default)]
pub struct FrameCounter {
    window_start: Option<Instant>,
    frames: u32,
    fps: u32,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame displayed at `now`. Returns the new sample when this
    /// frame closes a window.
    pub fn frame(&mut self, now: Instant) -> Option<u32> {
        let Some(start) = self.window_start else {
            // The first frame only opens the window.
            self.window_start = Some(now);
            return None;
        };

        self.frames = self.frames.saturating_add(1);
        let elapsed = now.saturating_duration_since(start);
        if elapsed < WINDOW {
            return None;
        }

        let fps = u64::from(self.frames) * 1000 / elapsed.as_millis().max(1) as u64;
        self.fps = u32::try_from(fps).unwrap_or(u32::MAX);
        self.window_start = Some(now);
        self.frames = 0;
        Some(self.fps)
    }

    /// Most recent sample, 0 until a full window has elapsed.
    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
