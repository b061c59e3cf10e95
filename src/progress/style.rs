//! Bar styles for the progress display.
//!
//! A download draws two kinds of bars: the total bar, which counts bytes of
//! the whole resource, and one segment bar per allocation entry, labelled
//! with the entry id. Segments with a throttle show a `*` after their rate.
//!
//! # Examples
//!
//! ```rust
//! use splitlink::progress::{BarStyle, StyleOptions};
//!
//! // The total bar stays on screen, segment bars clear when done.
//! let options = StyleOptions::default();
//! assert!(options.is_enabled());
//!
//! let quiet_segments = StyleOptions::default().with_segment(BarStyle::hidden());
//! assert!(quiet_segments.is_enabled());
//! assert!(!StyleOptions::hidden().is_enabled());
//! assert!(!quiet_segments.segment().is_visible());
//! ```

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::warn;

/// Look of a single kind of bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarStyle {
    template: String,
    chars: String,
    visible: bool,
    clear_on_finish: bool,
}

impl BarStyle {
    /// `   total █████████▌ 1.2 MiB/4.0 MiB (30%) 812 KiB/s eta 00:00:03`
    pub const TOTAL_TEMPLATE: &'static str = "{prefix:>10.bold} {bar:40.blue} {bytes}/{total_bytes} ({percent}%) {bytes_per_sec} eta {eta_precise:.blue}";
    /// `wlan0{1} ━━━━━━╾──── 96 KiB/512 KiB 64 KiB/s * eta 6s`
    pub const SEGMENT_TEMPLATE: &'static str = "{prefix:>10.bold} {bar:40.green/black} {bytes:>11.green}/{total_bytes:<11.green} {bytes_per_sec:>13.red} {msg} eta {eta:.blue}";
    /// Eighth blocks, filled to empty.
    pub const BLOCK_CHARS: &'static str = "█▉▊▋▌▍▎▏  ";
    /// Thin line with a rounded head.
    pub const LINE_CHARS: &'static str = "━╾╴─";

    /// Bar for the whole download. Kept on screen when finished.
    pub fn total() -> Self {
        Self {
            template: Self::TOTAL_TEMPLATE.into(),
            chars: Self::BLOCK_CHARS.into(),
            visible: true,
            clear_on_finish: false,
        }
    }

    /// Bar for one segment. Cleared when finished.
    pub fn segment() -> Self {
        Self {
            template: Self::SEGMENT_TEMPLATE.into(),
            chars: Self::LINE_CHARS.into(),
            visible: true,
            clear_on_finish: true,
        }
    }

    /// A bar that is never drawn.
    pub fn hidden() -> Self {
        Self {
            visible: false,
            ..Self::segment()
        }
    }

    /// Replaces the `indicatif` template. `{prefix}` holds the label and
    /// `{msg}` the throttle marker.
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Replaces the progress characters, filled first and empty last.
    pub fn chars(mut self, chars: impl Into<String>) -> Self {
        self.chars = chars.into();
        self
    }

    pub fn clear_on_finish(mut self, clear: bool) -> Self {
        self.clear_on_finish = clear;
        self
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn clears_on_finish(&self) -> bool {
        self.clear_on_finish
    }

    /// Builds the `indicatif` style. A template that does not parse is
    /// logged and replaced by the plain default bar.
    pub fn progress_style(&self) -> ProgressStyle {
        let style = match ProgressStyle::default_bar().template(&self.template) {
            Ok(style) => style,
            Err(e) => {
                warn!("Ignoring invalid progress template {:?}: {}", self.template, e);
                ProgressStyle::default_bar()
            }
        };
        if self.chars.chars().count() < 2 {
            return style;
        }
        style.progress_chars(&self.chars)
    }

    /// Creates a `len`-byte bar labelled `label`.
    pub fn bar(&self, len: u64, label: impl Into<String>) -> ProgressBar {
        if !self.visible {
            return ProgressBar::with_draw_target(Some(len), ProgressDrawTarget::hidden());
        }
        let bar = ProgressBar::new(len).with_style(self.progress_style());
        bar.set_prefix(label.into());
        bar
    }

    pub(crate) fn finish(&self, bar: &ProgressBar) {
        if self.clear_on_finish {
            bar.finish_and_clear();
        } else {
            bar.finish();
        }
    }
}

/// Styles of the total bar and of the segment bars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleOptions {
    pub(crate) total: BarStyle,
    pub(crate) segment: BarStyle,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self {
            total: BarStyle::total(),
            segment: BarStyle::segment(),
        }
    }
}

impl StyleOptions {
    /// Draws nothing at all.
    pub fn hidden() -> Self {
        Self {
            total: BarStyle::hidden(),
            segment: BarStyle::hidden(),
        }
    }

    pub fn with_total(mut self, total: BarStyle) -> Self {
        self.total = total;
        self
    }

    pub fn with_segment(mut self, segment: BarStyle) -> Self {
        self.segment = segment;
        self
    }

    /// `false` when no bar would be drawn.
    pub fn is_enabled(&self) -> bool {
        self.total.visible || self.segment.visible
    }

    pub fn total(&self) -> &BarStyle {
        &self.total
    }

    pub fn segment(&self) -> &BarStyle {
        &self.segment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broken_template_still_makes_a_bar() {
        let style = BarStyle::total().template("{bar:not-a-width");
        let bar = style.bar(10, "total");
        assert_eq!(bar.length(), Some(10));
    }

    #[test]
    fn test_hidden_bar_keeps_its_length() {
        let bar = BarStyle::hidden().bar(42, "eth0");
        assert!(bar.is_hidden());
        assert_eq!(bar.length(), Some(42));
    }

    #[test]
    fn test_finish_respects_clear_flag() {
        for style in [BarStyle::hidden(), BarStyle::hidden().clear_on_finish(false)] {
            let bar = style.bar(5, "lo");
            style.finish(&bar);
            assert!(bar.is_finished());
        }
    }
}
