//! Chronological draw-order tracking across batch kinds.
//!
//! Work is grouped per [`BatchKind`] for upload efficiency, but the
//! drawing API promises painter's order: what was issued first renders
//! first. The tracker records, in issuance order, which contiguous index
//! range of which batch was active; the flush replays one draw call per
//! span, each restricted to `[start, end)` of its batch.
//!
//! Spans of a given kind always partition `[0, count)` of that batch
//! without gaps or overlaps — a span opens at the batch's current count
//! whenever the active kind changes, and closes at the count the batch
//! reached when the next switch (or the flush) happens.

use crate::batch::BatchKind;

/// A closed half-open index range into one batch, in issuance order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawSpan {
    pub kind: BatchKind,
    pub start: usize,
    pub end: usize,
}

impl DrawSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

struct OpenSpan {
    kind: BatchKind,
    start: usize,
    end: Option<usize>,
}

/// Records which batch was active for each contiguous run of draws.
#[derive(Default)]
pub struct DrawOrderTracker {
    spans: Vec<OpenSpan>,
    active: Option<BatchKind>,
}

impl DrawOrderTracker {
    pub fn new() -> Self {
        Self {
            spans: Vec::new(),
            active: None,
        }
    }

    /// Currently active batch kind, if any draws are pending.
    pub fn active(&self) -> Option<BatchKind> {
        self.active
    }

    /// Switch the active kind: close the previous open span at
    /// `prev_count` (the previously active batch's current count) and
    /// open a new span for `kind` starting at `start`.
    pub fn switch_to(&mut self, kind: BatchKind, prev_count: usize, start: usize) {
        debug_assert_ne!(self.active, Some(kind), "switch_to same kind");
        if let Some(open) = self.spans.last_mut() {
            if open.end.is_none() {
                open.end = Some(prev_count);
            }
        }
        self.spans.push(OpenSpan {
            kind,
            start,
            end: None,
        });
        self.active = Some(kind);
    }

    /// Close the last open span at `active_count` and yield every
    /// non-empty span in issuance order, clearing the tracker.
    pub fn drain(&mut self, active_count: usize) -> Vec<DrawSpan> {
        if let Some(open) = self.spans.last_mut() {
            if open.end.is_none() {
                open.end = Some(active_count);
            }
        }
        self.active = None;
        self.spans
            .drain(..)
            .map(|s| DrawSpan {
                kind: s.kind,
                start: s.start,
                // Only the last span can still be open, and it was just
                // closed above.
                end: s.end.unwrap_or(s.start),
            })
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

// ===================================================================
// Tests
// ===================================================================
