use std::sync::Arc;

use heapless::Vec as HeaplessVec;

use super::{BufferState, StartAnchor};
use crate::{settings::PaginationConfig, text::ParagraphChunks};

#[derive(Clone, Debug)]
pub(super) struct BookSession {
    pub book_id: Arc<str>,
    pub total_paragraphs: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum Slot {
    Previous,
    Current,
    Next,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::Current, Slot::Next, Slot::Previous];
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum Shift {
    Moved,
    /// First or last paragraph of the book.
    Boundary,
    /// No book open, or a full load is pending.
    Unavailable,
}

/// Chunk the cursor lands on once a shifted-in paragraph is resident.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum Landing {
    First,
    Last,
}

/// Paragraph and anchor a full window load is centered on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) struct LoadTarget {
    pub paragraph_index: usize,
    pub anchor: StartAnchor,
}

/// Result of a full load, built off-lock by the worker.
#[derive(Debug)]
pub(super) struct LoadedWindow {
    pub previous: Option<ParagraphChunks>,
    pub current: Option<ParagraphChunks>,
    pub next: Option<ParagraphChunks>,
    pub paragraph_index: usize,
    pub chunk_index: usize,
}

/// Previous/current/next paragraphs plus the reading cursor.
///
/// Only ever touched under the manager's lock. Every method leaves the window
/// consistent, so a reader never observes a half-applied shift or refill.
#[derive(Debug)]
pub(super) struct BufferWindow {
    pub state: BufferState,
    pub book: Option<BookSession>,
    pub pagination: PaginationConfig,
    /// Bumped by every full load request; stale worker results are dropped.
    pub generation: u64,
    pub pending: Option<LoadTarget>,
    pub previous: Option<ParagraphChunks>,
    pub current: Option<ParagraphChunks>,
    pub next: Option<ParagraphChunks>,
    pub paragraph_index: usize,
    pub chunk_index: usize,
    /// Set while `current` is still being fetched after a shift.
    pub landing: Option<Landing>,
}

impl BufferWindow {
    pub fn new(pagination: PaginationConfig) -> Self {
        Self {
            state: BufferState::Uninitialized,
            book: None,
            pagination,
            generation: 0,
            pending: None,
            previous: None,
            current: None,
            next: None,
            paragraph_index: 0,
            chunk_index: 0,
            landing: None,
        }
    }

    pub fn clear_slots(&mut self) {
        self.previous = None;
        self.current = None;
        self.next = None;
    }

    pub fn open_book(&mut self, book: BookSession, paragraph_index: usize) {
        self.clear_slots();
        self.book = Some(book);
        self.paragraph_index = paragraph_index;
        self.chunk_index = 0;
        self.landing = None;
    }

    /// Enters `Loading` for `target` and returns the generation of the load.
    pub fn begin_load(&mut self, target: LoadTarget) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.state = BufferState::Loading;
        self.pending = Some(target);
        self.generation
    }

    pub fn install_load(&mut self, loaded: LoadedWindow) {
        self.previous = loaded.previous;
        self.current = loaded.current;
        self.next = loaded.next;
        self.paragraph_index = loaded.paragraph_index;
        self.chunk_index = loaded.chunk_index;
        self.landing = None;
        self.pending = None;
        self.state = BufferState::Ready;
    }

    pub fn fail_load(&mut self, message: String) {
        self.pending = None;
        self.state = BufferState::Error(message);
    }

    pub fn is_navigable(&self) -> bool {
        matches!(self.state, BufferState::Ready | BufferState::Error(_)) && self.current.is_some()
    }

    pub fn accepts_refill(&self) -> bool {
        matches!(self.state, BufferState::Ready | BufferState::Error(_)) && self.book.is_some()
    }

    /// A book is open with paragraphs but the cursor's paragraph is not resident.
    pub fn awaits_current(&self) -> bool {
        self.accepts_refill() && self.current.is_none() && self.total_paragraphs() > 0
    }

    pub fn total_paragraphs(&self) -> usize {
        self.book.as_ref().map_or(0, |book| book.total_paragraphs)
    }

    pub fn slot(&self, slot: Slot) -> Option<&ParagraphChunks> {
        match slot {
            Slot::Previous => self.previous.as_ref(),
            Slot::Current => self.current.as_ref(),
            Slot::Next => self.next.as_ref(),
        }
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut Option<ParagraphChunks> {
        match slot {
            Slot::Previous => &mut self.previous,
            Slot::Current => &mut self.current,
            Slot::Next => &mut self.next,
        }
    }

    /// Paragraph index `slot` should hold for the current cursor.
    pub fn desired_index(&self, slot: Slot) -> Option<usize> {
        let total = self.total_paragraphs();
        let index = match slot {
            Slot::Previous => self.paragraph_index.checked_sub(1)?,
            Slot::Current => self.paragraph_index,
            Slot::Next => self.paragraph_index.checked_add(1)?,
        };
        (index < total).then_some(index)
    }

    /// Empty slots that have a paragraph to hold, current first.
    pub fn missing_slots(&self) -> HeaplessVec<(Slot, usize), 3> {
        let mut missing = HeaplessVec::new();
        for slot in Slot::ALL {
            if self.slot(slot).is_none()
                && let Some(index) = self.desired_index(slot)
            {
                let _ = missing.push((slot, index));
            }
        }
        missing
    }

    /// Places a prefetched paragraph into the empty slot that wants it.
    ///
    /// Returns the slot used, or `None` when the result is stale: a newer
    /// full load started, or the cursor moved so no slot wants `chunks`.
    pub fn install_refill(&mut self, generation: u64, chunks: ParagraphChunks) -> Option<Slot> {
        if generation != self.generation || !self.accepts_refill() {
            return None;
        }

        let target = Slot::ALL.into_iter().find(|&slot| {
            self.desired_index(slot) == Some(chunks.paragraph_index()) && self.slot(slot).is_none()
        })?;
        *self.slot_mut(target) = Some(chunks);
        if target == Slot::Current {
            self.settle_landing();
        }
        Some(target)
    }

    pub fn advance_chunk(&mut self) -> bool {
        if !self.is_navigable() {
            return false;
        }
        let count = self.current.as_ref().map_or(0, ParagraphChunks::count);
        if self.chunk_index + 1 < count {
            self.chunk_index += 1;
            true
        } else {
            false
        }
    }

    pub fn retreat_chunk(&mut self) -> bool {
        if !self.is_navigable() || self.chunk_index == 0 {
            return false;
        }
        self.chunk_index -= 1;
        true
    }

    /// Rotates the window one paragraph forward.
    ///
    /// Only the book edge refuses the shift. When the next paragraph is not
    /// resident yet `current` is left empty and `landing` applies once the
    /// refill installs it.
    pub fn shift_forward(&mut self, landing: Landing) -> Shift {
        if !self.accepts_refill() {
            return Shift::Unavailable;
        }
        if self.paragraph_index + 1 >= self.total_paragraphs() {
            return Shift::Boundary;
        }

        self.previous = self.current.take();
        self.current = self.next.take();
        self.paragraph_index += 1;
        self.land(landing);
        Shift::Moved
    }

    pub fn shift_backward(&mut self, landing: Landing) -> Shift {
        if !self.accepts_refill() {
            return Shift::Unavailable;
        }
        if self.paragraph_index == 0 {
            return Shift::Boundary;
        }

        self.next = self.current.take();
        self.current = self.previous.take();
        self.paragraph_index -= 1;
        self.land(landing);
        Shift::Moved
    }

    fn land(&mut self, landing: Landing) {
        self.chunk_index = 0;
        self.landing = Some(landing);
        self.settle_landing();
    }

    fn settle_landing(&mut self) {
        let Some(current) = self.current.as_ref() else {
            return;
        };
        if let Some(landing) = self.landing.take() {
            self.chunk_index = match landing {
                Landing::First => 0,
                Landing::Last => current.last_index(),
            };
        }
    }

    pub fn current_char_offset(&self) -> usize {
        self.current
            .as_ref()
            .and_then(|chunks| chunks.chunk_start(self.chunk_index))
            .unwrap_or(0)
    }

    pub fn is_at_end_of_book(&self) -> bool {
        let total = self.total_paragraphs();
        if self.book.is_some() && total == 0 {
            return true;
        }
        let Some(current) = self.current.as_ref() else {
            return false;
        };
        self.paragraph_index + 1 >= total && self.chunk_index >= current.last_index()
    }

    pub fn is_at_beginning_of_book(&self) -> bool {
        self.current.is_some() && self.paragraph_index == 0 && self.chunk_index == 0
    }

    pub fn status_line(&self) -> String {
        let describe = |slot: Slot| {
            self.slot(slot)
                .map(|chunks| format!("{}({})", chunks.paragraph_index(), chunks.count()))
                .unwrap_or_else(|| "-".to_string())
        };
        format!(
            "state={:?} generation={} prev={} current={} next={} paragraph={}/{} chunk={}",
            self.state,
            self.generation,
            describe(Slot::Previous),
            describe(Slot::Current),
            describe(Slot::Next),
            self.paragraph_index,
            self.total_paragraphs(),
            self.chunk_index
        )
    }
}
