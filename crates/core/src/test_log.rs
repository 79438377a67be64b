use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Records `(level, message)` for every event emitted on the current thread
/// while the guard from [`EventLog::install`] is alive.
#[derive(Clone, Default)]
pub(crate) struct EventLog(Arc<Mutex<Vec<(Level, String)>>>);

impl EventLog {
    pub(crate) fn install(&self) -> DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    pub(crate) fn count(&self, level: Level) -> usize {
        self.events()
            .iter()
            .filter(|(recorded, _)| *recorded == level)
            .count()
    }

    pub(crate) fn count_matching(&self, level: Level, needle: &str) -> usize {
        self.events()
            .iter()
            .filter(|(recorded, message)| *recorded == level && message.contains(needle))
            .count()
    }

    fn events(&self) -> Vec<(Level, String)> {
        self.0.lock().expect("event log").clone()
    }
}

impl<S: Subscriber> Layer<S> for EventLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.0
            .lock()
            .expect("event log")
            .push((*event.metadata().level(), visitor.0));
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}
