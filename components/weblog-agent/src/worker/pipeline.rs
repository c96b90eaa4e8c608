// Local crates
use crate::aggregator::aggregator::Aggregator;
use crate::categorizer::categorizer::{Categorizer, Category};
use crate::filter::filter::Filter;
use crate::metrics::metrics::{
    LINES_TOTAL, PROCESS_LINE_DURATION_SECONDS, TAIL_REOPENS_TOTAL, observe_duration,
};
use crate::parser::parser::LogParser;
use crate::tailer::models::TailEvent;

// External crates
use std::time::Instant;
use tracing::{debug, trace};

/// What happened to a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Accepted,
    Filtered,
    Unmatched,
}

impl LineOutcome {
    pub fn label(self) -> &'static str {
        match self {
            LineOutcome::Accepted => "accepted",
            LineOutcome::Filtered => "filtered",
            LineOutcome::Unmatched => "unmatched",
        }
    }
}

/// The immutable stages of the line pipeline: parse, filter, classify.
/// Everything mutable lives in the [`Aggregator`] passed in.
#[derive(Debug, Clone)]
pub struct Pipeline {
    parser: LogParser,
    filter: Filter,
    url: Categorizer,
    user: Categorizer,
}

impl Pipeline {
    pub fn new(parser: LogParser, filter: Filter, url: Categorizer, user: Categorizer) -> Self {
        Self {
            parser,
            filter,
            url,
            user,
        }
    }

    pub fn parser(&self) -> &LogParser {
        &self.parser
    }

    pub fn apply(&self, event: TailEvent, aggregator: &mut Aggregator) {
        match event {
            TailEvent::Line(line) => {
                self.process_line(&line, aggregator);
            }
            TailEvent::Reopened => {
                aggregator.record_tail_reopen();
                TAIL_REOPENS_TOTAL.inc();
            }
            TailEvent::Error(error) => {
                debug!(%error, "Tail error recorded");
                aggregator.record_tail_error();
            }
        }
    }

    /// Parse, filter, classify and record one line. A line either touches
    /// exactly one diagnostic counter or is recorded in full.
    pub fn process_line(&self, line: &str, aggregator: &mut Aggregator) -> LineOutcome {
        let start = Instant::now();

        let outcome = match self.parser.parse(line) {
            None => {
                debug!(line, "Line does not match the log pattern");
                aggregator.record_unmatched();
                LineOutcome::Unmatched
            }
            Some(fields) if !self.filter.evaluate(&fields) => {
                aggregator.record_filtered();
                LineOutcome::Filtered
            }
            Some(fields) => {
                let url = self.url.classify(&fields).map(Category::name);
                let user = self.user.classify(&fields).map(Category::name);
                aggregator.record(&fields, url, user);
                LineOutcome::Accepted
            }
        };

        LINES_TOTAL.with_label_values(&[outcome.label()]).inc();
        observe_duration(&PROCESS_LINE_DURATION_SECONDS, start);
        trace!(outcome = outcome.label(), "Line processed");

        outcome
    }
}
