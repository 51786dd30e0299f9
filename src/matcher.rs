use crate::entries::{EntryHandle, EntryTable, PresentationSink};
use crate::model::Entry;
use nucleo_matcher::pattern::{CaseMatching, Normalization, Pattern};
use nucleo_matcher::{Matcher, Utf32Str};

/// Ranks table rows against a search query.
pub struct FuzzyMatcher {
    matcher: Matcher,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FuzzyMatcher {
    pub fn new() -> Self {
        Self {
            matcher: Matcher::new(nucleo_matcher::Config::DEFAULT),
        }
    }

    fn score(&mut self, pattern: &Pattern, entry: &Entry, buf: &mut Vec<char>) -> Option<i64> {
        let name = pattern.score(Utf32Str::new(&entry.record.name, buf), &mut self.matcher);
        let exec = pattern.score(Utf32Str::new(&entry.record.exec, buf), &mut self.matcher);
        let best = name.max(exec)?;
        // frequently launched entries float up
        Some(best as i64 + entry.stats.clicks as i64 * 100)
    }

    /// Matching rows, best first. Ties go by name.
    pub fn rank<'t, S: PresentationSink>(
        &mut self,
        query: &str,
        table: &'t EntryTable<S>,
    ) -> Vec<(EntryHandle, &'t Entry)> {
        let pattern = Pattern::parse(query, CaseMatching::Smart, Normalization::Smart);
        let mut buf = Vec::new();

        let mut scored: Vec<(i64, EntryHandle, &Entry)> = table
            .iter()
            .filter_map(|(handle, entry)| {
                self.score(&pattern, entry, &mut buf)
                    .map(|score| (score, handle, entry))
            })
            .collect();
        scored.sort_by(|(sa, _, a), (sb, _, b)| {
            sb.cmp(sa).then_with(|| a.record.name.cmp(&b.record.name))
        });
        log::debug!("FuzzyMatcher: query='{}', matches={}", query, scored.len());
        scored.into_iter().map(|(_, handle, entry)| (handle, entry)).collect()
    }
}
