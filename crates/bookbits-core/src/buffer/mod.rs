//! Three-paragraph sliding window with background prefetch.
//!
//! [`BufferManager`] keeps the previous, current and next paragraph of one
//! book chunked and resident, and moves a cursor over their chunks. Store
//! reads run on a dedicated worker thread. Queries and moves inside resident
//! paragraphs never block; a chunk move issued while a full load is pending,
//! or one that crosses into a paragraph still being fetched, waits for the
//! worker so it returns the chunk it lands on. Every call observes a
//! consistent window.

mod window;
mod worker;

#[cfg(test)]
mod tests;

use std::{
    io,
    sync::{
        Arc,
        atomic::Ordering,
        mpsc::{self, Sender},
    },
    thread::{self, JoinHandle},
};

use log::{debug, info, warn};
use parking_lot::Mutex;

use self::{
    window::{BookSession, BufferWindow, Landing, LoadTarget, Shift},
    worker::{LoadRequest, Shared, Task, Worker},
};
use crate::{
    settings::{BufferConfig, PaginationConfig, ReadingPosition},
    store::{ParagraphStore, StoreError},
    text::ChunkEndType,
    text_policy::{preview_compact, progress_label},
};

/// Returned by [`BufferManager::current_chunk`] while nothing is resident.
pub const CONTENT_UNAVAILABLE: &str = "Content not available";

#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("paragraph store failed: {0}")]
    Store(#[from] StoreError),

    #[error("buffer manager is shut down")]
    ShutDown,

    #[error("no book has been opened")]
    NotInitialized,

    #[error("paragraph {index} is outside the book ({total} paragraphs)")]
    ParagraphOutOfRange { index: usize, total: usize },

    #[error("failed to start buffer worker: {0}")]
    WorkerSpawn(#[source] io::Error),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BufferState {
    Uninitialized,
    /// A full window load is queued or running. Chunk moves wait for it and
    /// paragraph moves retarget it.
    Loading,
    Ready,
    /// The last full load failed. The previous window, if any, stays usable.
    Error(String),
    ShutDown,
}

/// Where the cursor lands inside the paragraph a load is centered on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StartAnchor {
    /// Chunk index, clamped to the last chunk.
    Chunk(usize),
    /// Byte offset into the paragraph; resolved to the chunk containing it,
    /// or chunk 0 when it lies past the paragraph.
    CharOffset(usize),
}

impl Default for StartAnchor {
    fn default() -> Self {
        Self::Chunk(0)
    }
}

/// Completion callbacks for full window loads.
///
/// Invoked on the worker thread with no buffer lock held, so implementations
/// may call back into the manager.
pub trait BufferListener: Send + Sync {
    fn on_buffer_loaded(&self);
    fn on_buffer_error(&self, error: &BufferError);
}

/// Consistent view of the cursor, taken under one lock.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadingSnapshot {
    pub paragraph_index: usize,
    pub total_paragraphs: usize,
    pub chunk_index: usize,
    pub chunk_count: usize,
    pub char_offset: usize,
    pub text: String,
    pub end_type: Option<ChunkEndType>,
    pub at_beginning: bool,
    pub at_end: bool,
}

impl ReadingSnapshot {
    pub fn position(&self) -> ReadingPosition {
        ReadingPosition::new(self.paragraph_index, self.char_offset)
    }
}

#[derive(Clone, Copy, Debug)]
enum Direction {
    Forward,
    Backward,
}

pub struct BufferManager {
    shared: Arc<Shared>,
    tasks: Mutex<Option<Sender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BufferManager {
    /// Starts the worker thread that serves `store`.
    pub fn new<S>(store: S, config: BufferConfig) -> Result<Self, BufferError>
    where
        S: ParagraphStore + 'static,
    {
        let shared = Arc::new(Shared::new(config.pagination));
        let (tasks, receiver) = mpsc::channel();
        let worker = Worker::new(Arc::clone(&shared), store);
        let handle = thread::Builder::new()
            .name(config.worker_name.clone())
            .spawn(move || worker.run(receiver))
            .map_err(BufferError::WorkerSpawn)?;

        info!(
            "buffer: worker started name={} max_chunk_length={} full_paragraph={}",
            config.worker_name,
            config.pagination.effective_chunk_length(),
            config.pagination.full_paragraph_mode
        );
        Ok(Self {
            shared,
            tasks: Mutex::new(Some(tasks)),
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn with_listener<S>(
        store: S,
        config: BufferConfig,
        listener: Arc<dyn BufferListener>,
    ) -> Result<Self, BufferError>
    where
        S: ParagraphStore + 'static,
    {
        let manager = Self::new(store, config)?;
        manager.set_listener(Some(listener));
        Ok(manager)
    }

    pub fn set_listener(&self, listener: Option<Arc<dyn BufferListener>>) {
        *self.shared.listener.lock() = listener;
    }

    /// Opens `book_id` and schedules a full load around `start_paragraph`.
    ///
    /// A start past the end is clamped to the last paragraph. Completion is
    /// reported through the listener.
    pub fn initialize(
        &self,
        book_id: &str,
        total_paragraphs: usize,
        start_paragraph: usize,
        anchor: StartAnchor,
    ) -> Result<(), BufferError> {
        let start = start_paragraph.min(total_paragraphs.saturating_sub(1));
        if start != start_paragraph {
            warn!(
                "buffer: clamp start paragraph {} to {} (total={})",
                start_paragraph, start, total_paragraphs
            );
        }

        let request = {
            let mut window = self.shared.window.lock();
            if window.state == BufferState::ShutDown {
                return Err(BufferError::ShutDown);
            }
            let book_id: Arc<str> = Arc::from(book_id);
            window.open_book(
                BookSession {
                    book_id: Arc::clone(&book_id),
                    total_paragraphs,
                },
                start,
            );
            let target = LoadTarget {
                paragraph_index: start,
                anchor,
            };
            let generation = window.begin_load(target);
            LoadRequest {
                generation,
                book_id,
                total_paragraphs,
                paragraph_index: start,
                anchor,
                pagination: window.pagination,
            }
        };

        info!(
            "buffer: initialize book_id={} total={} start={} anchor={:?}",
            request.book_id, total_paragraphs, start, anchor
        );
        self.submit(Task::Load(request))
    }

    /// Replaces the window around `paragraph_index`, superseding any load in
    /// flight.
    pub fn jump_to_position(
        &self,
        paragraph_index: usize,
        anchor: StartAnchor,
    ) -> Result<(), BufferError> {
        let request = {
            let mut window = self.shared.window.lock();
            if window.state == BufferState::ShutDown {
                return Err(BufferError::ShutDown);
            }
            let total = window.total_paragraphs();
            let book_id = match window.book.as_ref() {
                Some(book) => Arc::clone(&book.book_id),
                None => return Err(BufferError::NotInitialized),
            };
            if paragraph_index >= total {
                return Err(BufferError::ParagraphOutOfRange {
                    index: paragraph_index,
                    total,
                });
            }
            self.begin_load_locked(
                &mut window,
                book_id,
                LoadTarget {
                    paragraph_index,
                    anchor,
                },
            )
        };

        debug!(
            "buffer: jump paragraph={} anchor={:?} generation={}",
            paragraph_index, anchor, request.generation
        );
        self.submit(Task::Load(request))
    }

    /// Re-chunks the window with `pagination`, keeping the reading position
    /// by character offset.
    ///
    /// Returns `true` when a reload was queued, in which case the listener
    /// hears back once it lands. With no book open, or an empty book, the
    /// pagination is only stored and `false` is returned.
    pub fn apply_config(&self, pagination: PaginationConfig) -> Result<bool, BufferError> {
        let request = {
            let mut window = self.shared.window.lock();
            if window.state == BufferState::ShutDown {
                return Err(BufferError::ShutDown);
            }
            window.pagination = pagination;
            let Some(book_id) = window.book.as_ref().map(|book| Arc::clone(&book.book_id)) else {
                debug!("buffer: store pagination without open book");
                return Ok(false);
            };
            if window.total_paragraphs() == 0 {
                debug!("buffer: store pagination for empty book");
                return Ok(false);
            }

            let target = window.pending.unwrap_or(LoadTarget {
                paragraph_index: window.paragraph_index,
                anchor: StartAnchor::CharOffset(window.current_char_offset()),
            });
            self.begin_load_locked(&mut window, book_id, target)
        };

        info!(
            "buffer: apply pagination max_chunk_length={} full_paragraph={} paragraph={}",
            pagination.effective_chunk_length(),
            pagination.full_paragraph_mode,
            request.paragraph_index
        );
        self.submit(Task::Load(request))?;
        Ok(true)
    }

    fn begin_load_locked(
        &self,
        window: &mut BufferWindow,
        book_id: Arc<str>,
        target: LoadTarget,
    ) -> LoadRequest {
        let generation = window.begin_load(target);
        LoadRequest {
            generation,
            book_id,
            total_paragraphs: window.total_paragraphs(),
            paragraph_index: target.paragraph_index,
            anchor: target.anchor,
            pagination: window.pagination,
        }
    }

    /// Advances one chunk, crossing into the next paragraph at its end.
    ///
    /// Returns `false` at the end of the book, or when the store keeps
    /// failing to deliver the paragraph under the cursor. A move issued while
    /// a full load is pending applies on top of that load.
    pub fn move_to_next_chunk(&self) -> bool {
        self.step_chunk(Direction::Forward)
    }

    /// Steps back one chunk; crossing a paragraph lands on its last chunk.
    pub fn move_to_previous_chunk(&self) -> bool {
        self.step_chunk(Direction::Backward)
    }

    /// Shifts the window one paragraph forward and starts at its first chunk.
    ///
    /// Never waits: when the paragraph is not resident yet, `current_chunk`
    /// reports [`CONTENT_UNAVAILABLE`] until the queued refill lands. During
    /// a full load the load itself is moved to the following paragraph.
    pub fn move_to_next_paragraph(&self) -> bool {
        self.step_paragraph(Direction::Forward)
    }

    /// Shifts the window one paragraph back and starts at its first chunk.
    pub fn move_to_previous_paragraph(&self) -> bool {
        self.step_paragraph(Direction::Backward)
    }

    fn step_chunk(&self, direction: Direction) -> bool {
        if self.shared.window.lock().state == BufferState::Loading {
            self.catch_up();
        }

        let (outcome, generation) = {
            let mut window = self.shared.window.lock();
            if window.awaits_current() {
                let generation = window.generation;
                drop(window);
                return self.reveal_current(generation);
            }

            let stepped = match direction {
                Direction::Forward => window.advance_chunk(),
                Direction::Backward => window.retreat_chunk(),
            };
            if stepped {
                return true;
            }
            let outcome = match direction {
                Direction::Forward => window.shift_forward(Landing::First),
                Direction::Backward => window.shift_backward(Landing::Last),
            };
            (outcome, window.generation)
        };

        if !self.after_shift(outcome, generation, direction) {
            return false;
        }
        if self.shared.window.lock().awaits_current() {
            self.catch_up();
        }
        true
    }

    /// Retries the paragraph under the cursor and waits for it.
    fn reveal_current(&self, generation: u64) -> bool {
        self.request_refill(generation);
        self.catch_up();

        let window = self.shared.window.lock();
        if window.current.is_some() {
            return true;
        }
        warn!(
            "buffer: paragraph {} still unavailable",
            window.paragraph_index
        );
        false
    }

    fn step_paragraph(&self, direction: Direction) -> bool {
        let mut window = self.shared.window.lock();
        if window.state != BufferState::Loading {
            let outcome = match direction {
                Direction::Forward => window.shift_forward(Landing::First),
                Direction::Backward => window.shift_backward(Landing::First),
            };
            let generation = window.generation;
            drop(window);
            return self.after_shift(outcome, generation, direction);
        }

        // Move the pending load instead of the stale window.
        let (Some(target), Some(book_id)) = (
            window.pending,
            window.book.as_ref().map(|book| Arc::clone(&book.book_id)),
        ) else {
            return false;
        };
        let paragraph_index = match direction {
            Direction::Forward => target.paragraph_index + 1,
            Direction::Backward => match target.paragraph_index.checked_sub(1) {
                Some(index) => index,
                None => return false,
            },
        };
        if paragraph_index >= window.total_paragraphs() {
            return false;
        }
        let request = self.begin_load_locked(
            &mut window,
            book_id,
            LoadTarget {
                paragraph_index,
                anchor: StartAnchor::default(),
            },
        );
        drop(window);

        debug!(
            "buffer: retarget load {:?} paragraph={} generation={}",
            direction, paragraph_index, request.generation
        );
        self.submit(Task::Load(request)).is_ok()
    }

    fn after_shift(&self, outcome: Shift, generation: u64, direction: Direction) -> bool {
        match outcome {
            Shift::Moved => {
                debug!("buffer: shift {:?} generation={}", direction, generation);
                self.request_refill(generation);
                true
            }
            Shift::Boundary | Shift::Unavailable => false,
        }
    }

    /// Lets queued loads and refills land before the caller reads the window.
    fn catch_up(&self) {
        if let Err(err) = self.wait_idle() {
            debug!("buffer: catch up skipped: {}", err);
        }
    }

    fn request_refill(&self, generation: u64) {
        if let Err(err) = self.submit(Task::Refill { generation }) {
            debug!("buffer: refill not scheduled: {}", err);
        }
    }

    fn submit(&self, task: Task) -> Result<(), BufferError> {
        let tasks = self.tasks.lock();
        let Some(tasks) = tasks.as_ref() else {
            return Err(BufferError::ShutDown);
        };
        tasks.send(task).map_err(|_| BufferError::ShutDown)
    }

    /// Text of the current chunk, trimmed.
    ///
    /// [`CONTENT_UNAVAILABLE`] when no paragraph is resident; an empty string
    /// for a paragraph with no chunks.
    pub fn current_chunk(&self) -> String {
        let window = self.shared.window.lock();
        match window.current.as_ref() {
            Some(chunks) => chunks.chunk(window.chunk_index).unwrap_or("").to_string(),
            None => CONTENT_UNAVAILABLE.to_string(),
        }
    }

    /// Byte offset of the current chunk inside its paragraph, untrimmed.
    pub fn current_char_offset(&self) -> usize {
        self.shared.window.lock().current_char_offset()
    }

    pub fn current_paragraph_index(&self) -> usize {
        self.shared.window.lock().paragraph_index
    }

    pub fn current_chunk_index(&self) -> usize {
        self.shared.window.lock().chunk_index
    }

    pub fn current_paragraph_chunk_count(&self) -> usize {
        self.shared
            .window
            .lock()
            .current
            .as_ref()
            .map_or(0, |chunks| chunks.count())
    }

    pub fn current_paragraph_text(&self) -> Option<String> {
        self.shared
            .window
            .lock()
            .current
            .as_ref()
            .map(|chunks| chunks.text().to_string())
    }

    pub fn current_end_type(&self) -> Option<ChunkEndType> {
        let window = self.shared.window.lock();
        window
            .current
            .as_ref()
            .and_then(|chunks| chunks.end_type(window.chunk_index))
    }

    /// Chunk of the current paragraph containing byte `offset`.
    pub fn find_chunk_for_char_offset(&self, offset: usize) -> Option<usize> {
        self.shared
            .window
            .lock()
            .current
            .as_ref()
            .and_then(|chunks| chunks.find_chunk_for_offset(offset))
    }

    pub fn total_paragraphs(&self) -> usize {
        self.shared.window.lock().total_paragraphs()
    }

    /// Position to persist for resuming, `None` until something is loaded.
    pub fn reading_position(&self) -> Option<ReadingPosition> {
        let window = self.shared.window.lock();
        window
            .current
            .as_ref()
            .map(|_| ReadingPosition::new(window.paragraph_index, window.current_char_offset()))
    }

    pub fn snapshot(&self) -> Option<ReadingSnapshot> {
        let window = self.shared.window.lock();
        let chunks = window.current.as_ref()?;
        Some(ReadingSnapshot {
            paragraph_index: window.paragraph_index,
            total_paragraphs: window.total_paragraphs(),
            chunk_index: window.chunk_index,
            chunk_count: chunks.count(),
            char_offset: window.current_char_offset(),
            text: chunks.chunk(window.chunk_index).unwrap_or("").to_string(),
            end_type: chunks.end_type(window.chunk_index),
            at_beginning: window.is_at_beginning_of_book(),
            at_end: window.is_at_end_of_book(),
        })
    }

    pub fn is_at_end_of_book(&self) -> bool {
        self.shared.window.lock().is_at_end_of_book()
    }

    pub fn is_at_beginning_of_book(&self) -> bool {
        self.shared.window.lock().is_at_beginning_of_book()
    }

    pub fn state(&self) -> BufferState {
        self.shared.window.lock().state.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == BufferState::Ready
    }

    /// One-line description of the resident slots, for diagnostics.
    pub fn window_status(&self) -> String {
        let window = self.shared.window.lock();
        let progress = progress_label(
            window.paragraph_index,
            window.total_paragraphs(),
            window.chunk_index,
            window.current.as_ref().map_or(0, |chunks| chunks.count()),
        );
        let preview = window
            .current
            .as_ref()
            .and_then(|chunks| chunks.chunk(window.chunk_index))
            .map(preview_compact)
            .unwrap_or_default();
        format!("{} [{}] \"{}\"", window.status_line(), progress, preview)
    }

    /// Blocks until every task submitted so far has been processed.
    ///
    /// Returns immediately when called from the worker thread itself.
    pub fn wait_idle(&self) -> Result<(), BufferError> {
        if self.is_worker_thread() {
            return Ok(());
        }
        let (ack, done) = mpsc::channel();
        self.submit(Task::Barrier(ack))?;
        done.recv().map_err(|_| BufferError::ShutDown)
    }

    fn is_worker_thread(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|handle| handle.thread().id() == thread::current().id())
    }

    /// Stops the worker and discards queued work. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut window = self.shared.window.lock();
            if window.state == BufferState::ShutDown {
                return;
            }
            window.state = BufferState::ShutDown;
            window.pending = None;
            window.clear_slots();
        }
        self.shared.shut_down.store(true, Ordering::Release);
        self.tasks.lock().take();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                debug!("buffer: shutdown from worker thread, not joining");
            } else if handle.join().is_err() {
                warn!("buffer: worker thread panicked");
            }
        }
        info!("buffer: shut down");
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
