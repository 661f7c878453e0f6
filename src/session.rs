use crate::fetcher::{LeadFetcher, Sleeper, Transport};
use crate::status::{MessageLog, Status, StatusSink};
use crate::types::{FetchOutcome, Record};
use crate::writer::{ExportStatus, RecordWriter};

const CREDITS_EXHAUSTED: &str =
    "API credits exhausted. Please try again tomorrow or upgrade your plan.";

/// Caller-owned state of one interactive front end: the message log and the
/// leads of the latest run.
#[derive(Debug, Default)]
pub struct LeadSession {
    messages: MessageLog,
    leads: Vec<Record>,
}

/// Records into the session log and passes every message on to an observer.
struct Forward<'a> {
    log: &'a MessageLog,
    observer: &'a dyn StatusSink,
}

impl StatusSink for Forward<'_> {
    fn notify(&self, status: Status) {
        self.observer.notify(status.clone());
        self.log.notify(status);
    }
}

impl LeadSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<Status> {
        self.messages.snapshot()
    }

    pub fn leads(&self) -> &[Record] {
        &self.leads
    }

    /// Fetches leads for `query`, appends them to the writer's file and keeps
    /// them for display. Messages from the previous run are discarded.
    ///
    /// Returns the export status, or `None` when the fetch failed and nothing
    /// was exported. An empty result skips the writer entirely.
    pub async fn run<T: Transport, S: Sleeper>(
        &mut self,
        fetcher: &LeadFetcher<T, S>,
        writer: &RecordWriter,
        query: &str,
        limit: usize,
        observer: &dyn StatusSink,
    ) -> Option<ExportStatus> {
        self.messages.clear();
        self.leads.clear();

        let sink = Forward {
            log: &self.messages,
            observer,
        };

        let export = match fetcher.fetch(query, limit, &sink).await {
            FetchOutcome::Failure(e) => {
                let reason = e.to_string().to_lowercase();
                if reason.contains("quota") || reason.contains("credit") {
                    sink.notify(Status::error(CREDITS_EXHAUSTED));
                }
                None
            }
            // The fetcher already warned that nothing was found.
            FetchOutcome::Empty => Some(ExportStatus::NothingToExport),
            outcome => {
                let records = outcome.into_records();
                let export = writer.append_records(&records);
                sink.notify(export.as_status());
                self.leads = records;
                Some(export)
            }
        };

        sink.notify(Status::info("Scraping completed!"));
        export
    }
}
