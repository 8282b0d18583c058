use std::collections::{BTreeSet, HashMap};

use crate::cue::{Cue, CueId, Document};
use crate::error::Result;
use crate::timecode::{self, Millis};

/// Forward jumps that pass more cues than this are answered by a seek
/// instead of stepping through every cue in between.
const STEP_LIMIT: usize = 64;

/// Read-only lookup structure over a [`Document`].
///
/// Cues keep their document order, which is by start time. Two auxiliary
/// arrays make lookups cheap: a running maximum of end times (so a binary
/// search can skip every cue that ended before the query) and the cue
/// positions ordered by end time (for the sequential [`Scan`]).
#[derive(Debug)]
pub struct CueIndex {
    document: Document,
    max_end: Vec<Millis>,
    by_end: Vec<usize>,
    positions: HashMap<CueId, usize>,
}

impl CueIndex {
    pub fn build(document: Document) -> Self {
        let cues = document.cues();

        let mut max_end = Vec::with_capacity(cues.len());
        let mut running = 0;
        for cue in cues {
            running = running.max(cue.end);
            max_end.push(running);
        }

        let mut by_end: Vec<usize> = (0..cues.len()).collect();
        by_end.sort_by_key(|&pos| cues[pos].end);

        let positions = cues
            .iter()
            .enumerate()
            .map(|(pos, cue)| (cue.id.clone(), pos))
            .collect();

        log::debug!("Indexed {} cues spanning {}ms", cues.len(), running);
        Self {
            document,
            max_end,
            by_end,
            positions,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn cues(&self) -> &[Cue] {
        self.document.cues()
    }

    pub fn len(&self) -> usize {
        self.document.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.is_empty()
    }

    pub fn cue(&self, pos: usize) -> Option<&Cue> {
        self.cues().get(pos)
    }

    pub fn position(&self, id: &CueId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn get(&self, id: &CueId) -> Option<&Cue> {
        self.position(id).and_then(|pos| self.cue(pos))
    }

    /// End of the last cue to disappear.
    pub fn duration(&self) -> Millis {
        self.max_end.last().copied().unwrap_or(0)
    }

    /// Ids of every cue with `start <= t < end`, in document order.
    pub fn active_at(&self, t: i64) -> Result<Vec<CueId>> {
        let t = timecode::checked(t)?;
        Ok(self
            .active_positions(t)
            .map(|pos| self.cues()[pos].id.clone())
            .collect())
    }

    pub(crate) fn active_positions(&self, t: Millis) -> impl Iterator<Item = usize> + '_ {
        let cues = self.cues();
        let hi = cues.partition_point(|c| c.start <= t);
        let lo = self.max_end[..hi].partition_point(|&end| end <= t);
        (lo..hi).filter(move |&pos| cues[pos].end > t)
    }

    /// Number of cues that have started by `t`.
    fn started_by(&self, t: Millis) -> usize {
        self.cues().partition_point(|c| c.start <= t)
    }

    /// Number of cues that have ended by `t`.
    fn ended_by(&self, t: Millis) -> usize {
        let cues = self.cues();
        self.by_end.partition_point(|&pos| cues[pos].end <= t)
    }
}

/// Sequential query state over a [`CueIndex`].
///
/// Keeps a window between the next cue to start and the next cue to end, so
/// that stepping forward only touches cues whose state changes. Stepping
/// backward, or far forward, re-seeks.
#[derive(Debug, Clone, Default)]
pub struct Scan {
    position: Option<Millis>,
    next_start: usize,
    next_end: usize,
    active: BTreeSet<usize>,
}

impl Scan {
    pub fn new() -> Self {
        Self::default()
    }

    /// The time of the last query, if any.
    pub fn position(&self) -> Option<Millis> {
        self.position
    }

    /// Positions of the cues active at [`Scan::position`].
    pub fn active(&self) -> &BTreeSet<usize> {
        &self.active
    }

    pub fn advance(&mut self, index: &CueIndex, t: Millis) -> &BTreeSet<usize> {
        let backward = self.position.map_or(false, |prev| t < prev);
        // A window past the end of `index` was built over some other index.
        let stale = self.next_start > index.len() || self.next_end > index.len();
        let passed = index.started_by(t).saturating_sub(self.next_start);
        if backward || stale || passed > STEP_LIMIT {
            return self.seek(index, t);
        }

        let cues = index.cues();
        while self.next_start < cues.len() && cues[self.next_start].start <= t {
            self.active.insert(self.next_start);
            self.next_start += 1;
        }
        while self.next_end < index.by_end.len() && cues[index.by_end[self.next_end]].end <= t {
            self.active.remove(&index.by_end[self.next_end]);
            self.next_end += 1;
        }
        self.position = Some(t);
        &self.active
    }

    pub fn seek(&mut self, index: &CueIndex, t: Millis) -> &BTreeSet<usize> {
        self.next_start = index.started_by(t);
        self.next_end = index.ended_by(t);
        self.active = index.active_positions(t).collect();
        self.position = Some(t);
        &self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cue::Format;
    use crate::error::SubcueError;

    use proptest::prelude::*;

    fn index(cues: &[(&str, Millis, Millis)]) -> CueIndex {
        let cues = cues
            .iter()
            .map(|&(id, start, end)| Cue::new(id, start, end, id))
            .collect();
        CueIndex::build(Document::from_cues(Format::Srt, cues).unwrap())
    }

    fn ids(ids: Vec<CueId>) -> Vec<String> {
        ids.into_iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn finds_overlapping_cues() {
        let index = index(&[("a", 1000, 3000), ("b", 2500, 4000), ("c", 0, 10_000)]);
        assert_eq!(ids(index.active_at(500).unwrap()), ["c"]);
        assert_eq!(ids(index.active_at(2700).unwrap()), ["c", "a", "b"]);
        assert_eq!(ids(index.active_at(3000).unwrap()), ["c", "b"]);
        assert!(index.active_at(10_000).unwrap().is_empty());
        assert_eq!(index.duration(), 10_000);
    }

    #[test]
    fn rejects_negative_times() {
        let index = index(&[("a", 0, 10)]);
        assert!(matches!(
            index.active_at(-1),
            Err(SubcueError::InvalidTimecode(_))
        ));
    }

    #[test]
    fn empty_index_has_nothing_active() {
        let index = CueIndex::build(Document::from_cues(Format::Srt, Vec::new()).unwrap());
        assert!(index.is_empty());
        assert!(index.active_at(0).unwrap().is_empty());
        assert!(Scan::new().advance(&index, 100).is_empty());
        assert_eq!(index.duration(), 0);
    }

    #[test]
    fn looks_up_by_id() {
        let index = index(&[("b", 2500, 4000), ("a", 1000, 3000)]);
        assert_eq!(index.position(&CueId::from("a")), Some(0));
        assert_eq!(index.get(&CueId::from("b")).map(|c| c.start), Some(2500));
        assert!(index.get(&CueId::from("z")).is_none());
    }

    #[test]
    fn scan_follows_playback_and_seeks() {
        let index = index(&[("a", 1000, 3000), ("b", 2500, 4000)]);
        let mut scan = Scan::new();
        let at = |scan: &mut Scan, t| scan.advance(&index, t).iter().copied().collect::<Vec<_>>();
        assert_eq!(at(&mut scan, 0), Vec::<usize>::new());
        assert_eq!(at(&mut scan, 1500), [0]);
        assert_eq!(at(&mut scan, 2700), [0, 1]);
        assert_eq!(at(&mut scan, 3500), [1]);
        assert_eq!(at(&mut scan, 1200), [0]);
        assert_eq!(at(&mut scan, 5000), Vec::<usize>::new());
        assert_eq!(scan.position(), Some(5000));
    }

    #[test]
    fn long_forward_jump_matches_seek() {
        let cues: Vec<_> = (0..500u64)
            .map(|i| Cue::new(i.to_string(), i * 100, i * 100 + 250, ""))
            .collect();
        let index = CueIndex::build(Document::from_cues(Format::Srt, cues).unwrap());
        let mut scan = Scan::new();
        scan.advance(&index, 50);
        let jumped = scan.advance(&index, 40_020).clone();
        let expected: BTreeSet<usize> = index.active_positions(40_020).collect();
        assert_eq!(jumped, expected);
        assert_eq!(jumped.len(), 3);
        let stepped = scan.advance(&index, 40_120).clone();
        let expected: BTreeSet<usize> = index.active_positions(40_120).collect();
        assert_eq!(stepped, expected);
    }

    #[test]
    fn scan_moved_to_smaller_index_reseeks() {
        let cues: Vec<_> = (0..500u64)
            .map(|i| Cue::new(i.to_string(), i * 100, i * 100 + 250, ""))
            .collect();
        let large = CueIndex::build(Document::from_cues(Format::Srt, cues).unwrap());
        let small = index(&[("x", 45_000, 46_000)]);

        let mut scan = Scan::new();
        assert_eq!(scan.advance(&large, 40_020).len(), 3);
        let active: Vec<_> = scan.advance(&small, 45_500).iter().copied().collect();
        assert_eq!(active, [0]);
        assert!(scan.advance(&small, 46_000).is_empty());
    }

    fn brute_force(cues: &[Cue], t: Millis) -> Vec<CueId> {
        cues.iter()
            .filter(|c| c.start <= t && t < c.end)
            .map(|c| c.id.clone())
            .collect()
    }

    fn arb_cues() -> impl Strategy<Value = Vec<Cue>> {
        prop::collection::vec((0u64..5000, 1u64..1500), 0..60).prop_map(|spans| {
            spans
                .into_iter()
                .enumerate()
                .map(|(i, (start, len))| Cue::new(format!("c{}", i), start, start + len, ""))
                .collect()
        })
    }

    proptest! {
        /// Property: lookups agree with a linear scan over all cues
        #[test]
        fn prop_active_at_matches_brute_force(
            cues in arb_cues(),
            times in prop::collection::vec(0u64..7000, 1..40)
        ) {
            let index = CueIndex::build(Document::from_cues(Format::Srt, cues).unwrap());
            for t in times {
                let expected = brute_force(index.cues(), t);
                prop_assert_eq!(index.active_at(t as i64).unwrap(), expected);
            }
        }

        /// Property: sequential scans and random access agree at every step
        #[test]
        fn prop_scan_matches_seek(
            cues in arb_cues(),
            times in prop::collection::vec(0u64..7000, 1..80),
            sorted in any::<bool>()
        ) {
            let mut times = times;
            if sorted {
                times.sort_unstable();
            }
            let index = CueIndex::build(Document::from_cues(Format::Srt, cues).unwrap());
            let mut scan = Scan::new();
            for t in times {
                let scanned = scan.advance(&index, t).clone();
                let sought: BTreeSet<usize> = index.active_positions(t).collect();
                prop_assert_eq!(scanned, sought);
            }
        }
    }
}
