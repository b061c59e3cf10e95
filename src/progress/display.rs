//! Terminal rendering of download progress.
//!
//! [`ProgressDisplay`] owns an `indicatif` [`MultiProgress`] with one total bar
//! for the whole resource and one bar per segment. It is fed
//! [`ProgressSnapshot`]s by the orchestrator's tick loop and never touches
//! the trackers itself.

use crate::progress::{ProgressSnapshot, StyleOptions};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget};

/// Progress display manager that coordinates the segment bars.
pub struct ProgressDisplay {
    multi: MultiProgress,
    main: ProgressBar,
    children: Vec<ProgressBar>,
    style_options: StyleOptions,
}

impl ProgressDisplay {
    /// Creates the bars for a `total`-byte download split as in `snapshot`.
    pub fn new(style_options: StyleOptions, total: u64, snapshot: &ProgressSnapshot) -> Self {
        let multi = match style_options.is_enabled() {
            true => MultiProgress::new(),
            false => MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        };

        let main = multi.add(style_options.total().bar(total, "total"));
        let children = snapshot
            .segments
            .iter()
            .map(|segment| {
                let bar = multi.add(style_options.segment().bar(segment.length, &segment.id));
                if segment.throttled {
                    bar.set_message("*");
                }
                bar
            })
            .collect();

        main.tick();
        Self {
            multi,
            main,
            children,
            style_options,
        }
    }

    /// Moves every bar to the positions in `snapshot`.
    pub fn update(&self, snapshot: &ProgressSnapshot) {
        self.main.set_position(snapshot.transferred());
        for (bar, segment) in self.children.iter().zip(&snapshot.segments) {
            bar.set_position(segment.transferred);
            if segment.finished && !bar.is_finished() {
                self.style_options.segment().finish(bar);
            }
        }
    }

    /// Prints a line above the bars.
    pub fn println(&self, line: impl AsRef<str>) {
        if let Err(e) = self.multi.println(line) {
            tracing::debug!("Could not print above progress bars: {}", e);
        }
    }

    /// Finishes every bar, clearing or keeping them based on configuration.
    pub fn finish(self) {
        for bar in &self.children {
            if !bar.is_finished() {
                self.style_options.segment().finish(bar);
            }
        }
        self.style_options.total().finish(&self.main);
    }

    /// Leaves the bars where they are, e.g. after a failure.
    pub fn abandon(self) {
        for bar in self.children.iter().chain(std::iter::once(&self.main)) {
            bar.abandon();
        }
    }
}
