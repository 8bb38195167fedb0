/// Events emitted while a refinement runs.
#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    /// Partitioning produced `total` regions; one `RegionFinished` follows for each.
    RegionsPlanned { total: u64 },
    RegionFinished { index: usize, solved: bool },

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

/// Forwards progress events to an optional callback; a reporter without one is silent.
///
/// The callback is shared by the region workers, hence `Send + Sync`.
#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn reporter_forwards_events_to_callback() {
        let seen = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::RegionFinished { index, .. } = event {
                seen.lock().unwrap().push(index);
            }
        }));
        reporter.report(Progress::RegionsPlanned { total: 2 });
        reporter.report(Progress::RegionFinished { index: 1, solved: true });
        reporter.report(Progress::RegionFinished { index: 0, solved: false });
        drop(reporter);
        assert_eq!(seen.into_inner().unwrap(), vec![1, 0]);
    }

    #[test]
    fn silent_reporter_ignores_events() {
        ProgressReporter::new().report(Progress::Message("nothing".into()));
    }
}
