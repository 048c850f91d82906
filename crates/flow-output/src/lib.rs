//! `flow-output` — engine output writers for the flowsim traffic engine.
//!
//! The CSV backend creates `events.csv` (the full event log, in canonical
//! order) and `tick_summaries.csv` (one row per tick).  All backends
//! implement [`OutputWriter`] and are driven by [`EventLogWriter`], which
//! implements `flow_engine::EventSink`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use flow_output::{CsvWriter, EventLogWriter};
//!
//! let writer = CsvWriter::new(Path::new("./output"))?;
//! let mut sink = EventLogWriter::new(writer);
//! engine.run_ticks(3600, &mut sink)?;
//! sink.finish()?;
//! if let Some(e) = sink.take_error() { eprintln!("output error: {e}"); }
//! ```

pub mod csv;
pub mod error;
pub mod row;
pub mod sink;
pub mod writer;

#[cfg(test)]
mod tests;

pub use self::csv::CsvWriter;
pub use error::{OutputError, OutputResult};
pub use row::{EventRow, TickSummaryRow};
pub use sink::EventLogWriter;
pub use writer::OutputWriter;
