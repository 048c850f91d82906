//! `EventLogWriter<W>` — bridges the engine's `EventSink` to an `OutputWriter`.

use flow_core::{Event, Tick};
use flow_engine::{EventSink, TickOutcome};

use crate::writer::OutputWriter;
use crate::{EventRow, OutputError, TickSummaryRow};

/// An [`EventSink`] that writes the event log and tick summaries to any
/// [`OutputWriter`] backend.
///
/// Errors from the writer are stored internally because `EventSink` methods
/// have no return value.  After the run, check for errors with
/// [`take_error`][Self::take_error].
pub struct EventLogWriter<W: OutputWriter> {
    writer: W,
    last_error: Option<OutputError>,
}

impl<W: OutputWriter> EventLogWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            last_error: None,
        }
    }

    /// Take the stored write error (if any) after the run.
    ///
    /// Returns `None` if all writes succeeded.
    pub fn take_error(&mut self) -> Option<OutputError> {
        self.last_error.take()
    }

    /// Flush the backend.  Call once after the final tick.
    pub fn finish(&mut self) -> crate::OutputResult<()> {
        self.writer.finish()
    }

    /// Unwrap the inner writer (e.g. to inspect files after the run).
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn store_err(&mut self, result: crate::OutputResult<()>) {
        if let Err(e) = result {
            // Keep only the first error.
            if self.last_error.is_none() {
                self.last_error = Some(e);
            }
        }
    }
}

impl<W: OutputWriter> EventSink for EventLogWriter<W> {
    fn on_events(&mut self, tick: Tick, events: &[Event]) {
        let rows: Vec<EventRow> = events
            .iter()
            .map(|e| EventRow {
                tick: tick.0,
                kind: e.kind.name(),
                segment: e.kind.segment().0,
                vehicle: e.kind.vehicle().0,
            })
            .collect();
        if !rows.is_empty() {
            let result = self.writer.write_events(&rows);
            self.store_err(result);
        }
    }

    fn on_tick_end(&mut self, outcome: &TickOutcome) {
        let row = TickSummaryRow {
            tick: outcome.tick.0,
            events: outcome.events as u64,
            arrived: outcome.arrived.len() as u64,
            stuck: outcome.stuck.len() as u64,
            active_segments: outcome.active_segments as u64,
        };
        let result = self.writer.write_tick_summary(&row);
        self.store_err(result);
    }
}
