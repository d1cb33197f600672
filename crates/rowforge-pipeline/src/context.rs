//! Per-run mutable state shared across handler calls

use std::collections::HashMap;

/// Mutable state with a run-scoped lifecycle
///
/// Handlers are stateless over records; anything that must survive from
/// one record to the next within a run (slug collision counters, the
/// spec-parse memo) lives here and is wiped by `reset` at run start.
#[derive(Debug, Default)]
pub struct RunContext {
    /// Base slug → times seen this run
    slug_counts: HashMap<String, u32>,
    /// Raw spec string → parsed key/value pairs
    spec_memo: HashMap<String, Vec<(String, String)>>,
    /// Slug claimed for the record currently in flight
    record_slug: Option<String>,
    /// Image publish counts for the record currently in flight
    media_counts: (usize, usize),
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all per-run state. Call at the start of every run.
    pub fn reset(&mut self) {
        self.slug_counts.clear();
        self.spec_memo.clear();
        self.record_slug = None;
        self.media_counts = (0, 0);
    }

    /// Record the slug chosen for the record currently being converted.
    /// Downstream handlers that build per-record artifact names read it
    /// back instead of claiming a second slug.
    pub fn set_record_slug(&mut self, slug: &str) {
        self.record_slug = Some(slug.to_string());
    }

    pub fn record_slug(&self) -> Option<&str> {
        self.record_slug.as_deref()
    }

    /// Drop per-record state before the next record starts.
    pub fn finish_record(&mut self) {
        self.record_slug = None;
        self.media_counts = (0, 0);
    }

    /// Image publish outcome for the current record
    pub fn note_media_outcome(&mut self, published: usize, failed: usize) {
        self.media_counts = (published, failed);
    }

    pub fn media_counts(&self) -> (usize, usize) {
        self.media_counts
    }

    /// Claim a slug for this run. The first caller gets the base slug;
    /// later callers get `base-2`, `base-3`, and so on.
    pub fn claim_slug(&mut self, base: &str) -> String {
        let count = self.slug_counts.entry(base.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base.to_string()
        } else {
            format!("{}-{}", base, count)
        }
    }

    /// Parsed specs for a raw string, computing through `parse` at most
    /// once per distinct input.
    pub fn specs_for(
        &mut self,
        raw: &str,
        parse: impl FnOnce(&str) -> Vec<(String, String)>,
    ) -> Vec<(String, String)> {
        if let Some(cached) = self.spec_memo.get(raw) {
            return cached.clone();
        }
        let parsed = parse(raw);
        self.spec_memo.insert(raw.to_string(), parsed.clone());
        parsed
    }
}
