use std::collections::BTreeSet;
use std::sync::Arc;

use crate::cue::{Cue, CueId};
use crate::error::{Result, SubcueError};
use crate::index::{CueIndex, Scan};
use crate::timecode;

/// What the presentation layer must do to move from one active set to the
/// next. Cues to show are ordered by start time, then id; cues to hide are
/// in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffEvents {
    pub to_show: Vec<Cue>,
    pub to_hide: Vec<CueId>,
}

impl DiffEvents {
    pub fn is_empty(&self) -> bool {
        self.to_show.is_empty() && self.to_hide.is_empty()
    }

    /// Hides first, then shows whatever the presenter does not already hold.
    pub fn apply<P: Presenter + ?Sized>(&self, presenter: &mut P) {
        for id in &self.to_hide {
            if presenter.exists(id) {
                presenter.hide(id);
            }
        }
        for cue in &self.to_show {
            if !presenter.exists(&cue.id) {
                presenter.show(cue);
            }
        }
    }
}

/// Whatever draws the subtitles.
pub trait Presenter {
    fn show(&mut self, cue: &Cue);
    fn hide(&mut self, id: &CueId);
    fn exists(&self, id: &CueId) -> bool;
}

/// Size of the element subtitles are drawn into, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Tracks which cues are on screen and turns timecodes into
/// [`DiffEvents`].
///
/// Calls must be serialised by the caller. The index itself is shared and
/// may be queried from other threads at the same time.
#[derive(Debug, Default)]
pub struct DiffEngine {
    index: Option<Arc<CueIndex>>,
    scan: Scan,
    active: BTreeSet<usize>,
    viewport: Option<Viewport>,
}

impl DiffEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(index: impl Into<Arc<CueIndex>>) -> Self {
        let mut engine = Self::new();
        engine.load(index);
        engine
    }

    /// Replaces the current document. The returned events hide everything
    /// that was on screen for the old one.
    pub fn load(&mut self, index: impl Into<Arc<CueIndex>>) -> DiffEvents {
        let events = self.reset();
        self.index = Some(index.into());
        events
    }

    pub fn index(&self) -> Option<&Arc<CueIndex>> {
        self.index.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.index.is_some()
    }

    pub fn update(&mut self, t: i64) -> Result<DiffEvents> {
        let t = timecode::checked(t)?;
        let index = Arc::clone(self.index.as_ref().ok_or(SubcueError::NotReady)?);
        let cues = index.cues();

        let current = self.scan.advance(&index, t).clone();
        let to_hide = self
            .active
            .difference(&current)
            .map(|&pos| cues[pos].id.clone())
            .collect();
        let mut to_show: Vec<Cue> = current
            .difference(&self.active)
            .map(|&pos| cues[pos].clone())
            .collect();
        to_show.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        self.active = current;

        let events = DiffEvents { to_show, to_hide };
        log::trace!(
            "At {}ms: show {:?}, hide {:?}",
            t,
            events.to_show.iter().map(|c| &c.id).collect::<Vec<_>>(),
            events.to_hide
        );
        Ok(events)
    }

    /// Clears the active set, returning a hide event for every cue in it.
    pub fn reset(&mut self) -> DiffEvents {
        let to_hide = match &self.index {
            Some(index) => self
                .active
                .iter()
                .map(|&pos| index.cues()[pos].id.clone())
                .collect(),
            None => Vec::new(),
        };
        self.active.clear();
        self.scan = Scan::new();
        DiffEvents {
            to_show: Vec::new(),
            to_hide,
        }
    }

    /// The cues currently shown, in document order.
    pub fn active(&self) -> Vec<&Cue> {
        match &self.index {
            Some(index) => self.active.iter().map(|&pos| &index.cues()[pos]).collect(),
            None => Vec::new(),
        }
    }

    pub fn is_active(&self, id: &CueId) -> bool {
        self.index
            .as_ref()
            .and_then(|index| index.position(id))
            .map_or(false, |pos| self.active.contains(&pos))
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = Some(Viewport { width, height });
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }
}
