use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::{Receiver, Sender},
};

use log::{debug, info, trace, warn};
use parking_lot::Mutex;

use super::{
    BufferError, BufferListener, StartAnchor,
    window::{BufferWindow, LoadedWindow},
};
use crate::{
    settings::PaginationConfig,
    store::{ParagraphStore, StoreError},
    text::ParagraphChunks,
    text_policy::preview_compact,
};

/// State shared between the manager handle and its worker thread.
pub(super) struct Shared {
    pub window: Mutex<BufferWindow>,
    pub listener: Mutex<Option<Arc<dyn BufferListener>>>,
    pub shut_down: AtomicBool,
}

impl Shared {
    pub fn new(pagination: PaginationConfig) -> Self {
        Self {
            window: Mutex::new(BufferWindow::new(pagination)),
            listener: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn listener(&self) -> Option<Arc<dyn BufferListener>> {
        self.listener.lock().clone()
    }
}

#[derive(Clone, Debug)]
pub(super) struct LoadRequest {
    pub generation: u64,
    pub book_id: Arc<str>,
    pub total_paragraphs: usize,
    pub paragraph_index: usize,
    pub anchor: StartAnchor,
    pub pagination: PaginationConfig,
}

pub(super) enum Task {
    /// Replace the whole window around a paragraph.
    Load(LoadRequest),
    /// Fetch whichever neighbor slots are empty.
    Refill { generation: u64 },
    /// Acknowledged once every earlier task has run.
    Barrier(Sender<()>),
}

pub(super) struct Worker<S> {
    shared: Arc<Shared>,
    store: S,
}

impl<S: ParagraphStore> Worker<S> {
    pub fn new(shared: Arc<Shared>, store: S) -> Self {
        Self { shared, store }
    }

    /// Runs tasks in submission order until the channel closes.
    pub fn run(self, tasks: Receiver<Task>) {
        for task in tasks.iter() {
            if self.shared.is_shut_down() {
                if let Task::Barrier(ack) = task {
                    let _ = ack.send(());
                } else {
                    trace!("buffer-worker: discard task after shutdown");
                }
                continue;
            }

            match task {
                Task::Load(request) => self.load(request),
                Task::Refill { generation } => self.refill(generation),
                Task::Barrier(ack) => {
                    let _ = ack.send(());
                }
            }
        }
        debug!("buffer-worker: task channel closed, exiting");
    }

    fn load(&self, request: LoadRequest) {
        if self.shared.window.lock().generation != request.generation {
            debug!(
                "buffer-worker: skip superseded load generation={} paragraph={}",
                request.generation, request.paragraph_index
            );
            return;
        }

        match self.read_window(&request) {
            Ok(loaded) => {
                let preview = loaded
                    .current
                    .as_ref()
                    .and_then(|chunks| chunks.chunk(loaded.chunk_index))
                    .map(preview_compact)
                    .unwrap_or_default();
                let installed = {
                    let mut window = self.shared.window.lock();
                    if window.generation == request.generation {
                        window.install_load(loaded);
                        true
                    } else {
                        false
                    }
                };
                if !installed {
                    debug!(
                        "buffer-worker: drop stale load generation={}",
                        request.generation
                    );
                    return;
                }

                info!(
                    "buffer: loaded book_id={} paragraph={}/{} preview=\"{}\"",
                    request.book_id, request.paragraph_index, request.total_paragraphs, preview
                );
                if let Some(listener) = self.shared.listener() {
                    listener.on_buffer_loaded();
                }
            }
            Err(err) => {
                let current = {
                    let mut window = self.shared.window.lock();
                    let current = window.generation == request.generation;
                    if current {
                        window.fail_load(err.to_string());
                    }
                    current
                };
                if !current {
                    return;
                }

                warn!(
                    "buffer: load failed book_id={} paragraph={} err={}",
                    request.book_id, request.paragraph_index, err
                );
                if let Some(listener) = self.shared.listener() {
                    listener.on_buffer_error(&BufferError::Store(err));
                }
            }
        }
    }

    fn read_window(&self, request: &LoadRequest) -> Result<LoadedWindow, StoreError> {
        let total = request.total_paragraphs;
        let index = request.paragraph_index;
        if total == 0 {
            return Ok(LoadedWindow {
                previous: None,
                current: None,
                next: None,
                paragraph_index: 0,
                chunk_index: 0,
            });
        }

        let first = index.saturating_sub(1);
        let last = (index + 1).min(total - 1);
        let texts = self
            .store
            .paragraph_range(&request.book_id, first, last + 1 - first)?;
        if texts.len() < last + 1 - first {
            return Err(StoreError::not_found(
                &request.book_id,
                first + texts.len(),
                first + texts.len(),
            ));
        }

        let mut previous = None;
        let mut current = None;
        let mut next = None;
        for (paragraph_index, text) in (first..).zip(texts) {
            let chunks = ParagraphChunks::with_config(paragraph_index, text, &request.pagination);
            match paragraph_index.cmp(&index) {
                std::cmp::Ordering::Less => previous = Some(chunks),
                std::cmp::Ordering::Equal => current = Some(chunks),
                std::cmp::Ordering::Greater => next = Some(chunks),
            }
        }

        let chunk_index = current
            .as_ref()
            .map_or(0, |chunks| resolve_anchor(chunks, request.anchor));
        Ok(LoadedWindow {
            previous,
            current,
            next,
            paragraph_index: index,
            chunk_index,
        })
    }

    fn refill(&self, generation: u64) {
        let (book_id, pagination, missing) = {
            let window = self.shared.window.lock();
            if window.generation != generation || !window.accepts_refill() {
                return;
            }
            let Some(book) = window.book.as_ref() else {
                return;
            };
            (
                Arc::clone(&book.book_id),
                window.pagination,
                window.missing_slots(),
            )
        };

        for (slot, index) in missing {
            match self.store.paragraph(&book_id, index) {
                Ok(text) => {
                    let chunks = ParagraphChunks::with_config(index, text, &pagination);
                    let placed = self.shared.window.lock().install_refill(generation, chunks);
                    match placed {
                        Some(slot) => {
                            debug!("buffer-worker: prefetched paragraph={} slot={:?}", index, slot)
                        }
                        None => debug!(
                            "buffer-worker: discard prefetch paragraph={} wanted_as={:?}",
                            index, slot
                        ),
                    }
                }
                Err(err) => {
                    warn!(
                        "buffer: prefetch failed book_id={} paragraph={} err={}",
                        book_id, index, err
                    );
                }
            }
        }
    }
}

/// Chunk the cursor starts on once a paragraph is loaded.
fn resolve_anchor(chunks: &ParagraphChunks, anchor: StartAnchor) -> usize {
    match anchor {
        StartAnchor::Chunk(index) => index.min(chunks.last_index()),
        StartAnchor::CharOffset(offset) => {
            chunks.find_chunk_for_offset(offset).unwrap_or_else(|| {
                debug!(
                    "buffer-worker: offset {} outside paragraph {} (len={}), starting at chunk 0",
                    offset,
                    chunks.paragraph_index(),
                    chunks.text().len()
                );
                0
            })
        }
    }
}
