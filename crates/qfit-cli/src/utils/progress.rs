use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use qfit::engine::progress::{Progress, ProgressCallback};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 80;

#[derive(Default)]
struct BarState {
    phase: String,
    failed: usize,
}

/// Renders workflow progress on stderr: a spinner per phase, a bar over regions.
#[derive(Clone)]
pub struct CliProgressHandler {
    pb: Arc<Mutex<(ProgressBar, BarState)>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let pb = ProgressBar::new(0)
            .with_style(Self::spinner_style())
            .with_message("Initializing...");
        pb.set_draw_target(target);
        pb.finish_and_clear();

        Self {
            pb: Arc::new(Mutex::new((pb, BarState::default()))),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let shared = self.pb.clone();

        Box::new(move |progress: Progress| {
            let Ok(mut guard) = shared.lock() else {
                warn!("Progress bar mutex was poisoned. Cannot update progress.");
                return;
            };
            let (pb, state) = &mut *guard;

            match progress {
                Progress::PhaseStart { name } => {
                    pb.reset();
                    pb.set_length(0);
                    pb.set_style(Self::spinner_style());
                    pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                    pb.set_message(name);
                    state.phase = name.to_string();
                    state.failed = 0;
                }
                Progress::RegionsPlanned { total } => {
                    pb.disable_steady_tick();
                    pb.set_style(Self::bar_style());
                    pb.set_length(total);
                    pb.set_position(0);
                }
                Progress::RegionFinished { solved, .. } => {
                    if !solved {
                        state.failed += 1;
                        pb.set_message(format!("{} ({} failed)", state.phase, state.failed));
                    }
                    pb.inc(1);
                }
                Progress::PhaseFinish => {
                    pb.disable_steady_tick();
                    pb.finish_with_message(format!("✓ {}", state.phase));
                }
                Progress::Message(msg) => {
                    if !pb.is_finished() {
                        pb.println(format!("  {}", msg));
                    } else {
                        pb.set_message(msg);
                    }
                }
            }
        })
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg:<28} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .with_key(
                "eta",
                |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                    let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
                },
            )
            .progress_chars("##-")
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn hidden() -> CliProgressHandler {
        CliProgressHandler::with_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn handler_initializes_in_a_clean_state() {
        let handler = hidden();
        let guard = handler.pb.lock().unwrap();
        assert_eq!(guard.0.length(), Some(0));
        assert!(guard.0.is_finished());
    }

    #[test]
    fn region_events_drive_the_bar() {
        let handler = hidden();
        let callback = handler.get_callback();

        callback(Progress::PhaseStart {
            name: "Refining Regions",
        });
        callback(Progress::RegionsPlanned { total: 3 });
        {
            let guard = handler.pb.lock().unwrap();
            assert_eq!(guard.0.length(), Some(3));
            assert_eq!(guard.0.position(), 0);
        }

        callback(Progress::RegionFinished {
            index: 1,
            solved: true,
        });
        callback(Progress::RegionFinished {
            index: 0,
            solved: false,
        });
        {
            let guard = handler.pb.lock().unwrap();
            assert_eq!(guard.0.position(), 2);
            assert_eq!(guard.0.message(), "Refining Regions (1 failed)");
        }

        callback(Progress::PhaseFinish);
        let guard = handler.pb.lock().unwrap();
        assert!(guard.0.is_finished());
        assert_eq!(guard.0.message(), "✓ Refining Regions");
    }

    #[test]
    fn callback_is_thread_safe() {
        let handler = hidden();
        let callback = handler.get_callback();

        thread::spawn(move || {
            callback(Progress::PhaseStart {
                name: "Merging Regions",
            });
            callback(Progress::PhaseFinish);
        })
        .join()
        .unwrap();

        let guard = handler.pb.lock().unwrap();
        assert!(guard.0.is_finished());
        assert_eq!(guard.0.message(), "✓ Merging Regions");
    }
}
