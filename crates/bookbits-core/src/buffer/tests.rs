use std::{
    collections::HashMap,
    sync::{Arc, mpsc},
    thread,
    time::Duration,
};

use parking_lot::Mutex;

use super::*;
use crate::{
    settings::DEFAULT_CHUNK_LENGTH,
    store::MemoryParagraphStore,
    text::ParagraphChunks,
};

const BOOK_ID: &str = "quijote";
const BOOK: [&str; 4] = [
    "En un lugar de la Mancha, de cuyo nombre no quiero acordarme, no ha mucho tiempo que vivía un hidalgo.",
    "Primero. Segundo! Tercero?",
    "Una sola frase.",
    "Fin del libro. Adiós.",
];
const MAX_LENGTH: usize = 40;

#[derive(Default)]
struct RecordingListener {
    loaded: Mutex<usize>,
    errors: Mutex<Vec<String>>,
}

impl RecordingListener {
    fn loaded(&self) -> usize {
        *self.loaded.lock()
    }

    fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

impl BufferListener for RecordingListener {
    fn on_buffer_loaded(&self) {
        *self.loaded.lock() += 1;
    }

    fn on_buffer_error(&self, error: &BufferError) {
        self.errors.lock().push(error.to_string());
    }
}

/// Fails the first few single-paragraph reads of some indices; ranges work.
struct FlakyStore {
    inner: MemoryParagraphStore,
    /// Paragraph index to failures left.
    failing: Mutex<HashMap<usize, usize>>,
}

impl FlakyStore {
    fn new(inner: MemoryParagraphStore, failing: impl IntoIterator<Item = (usize, usize)>) -> Self {
        Self {
            inner,
            failing: Mutex::new(failing.into_iter().collect()),
        }
    }
}

impl ParagraphStore for FlakyStore {
    fn paragraph(&self, book_id: &str, index: usize) -> Result<String, StoreError> {
        if let Some(left) = self.failing.lock().get_mut(&index)
            && *left > 0
        {
            *left -= 1;
            return Err(StoreError::Io(std::io::Error::other("disk unplugged")));
        }
        self.inner.paragraph(book_id, index)
    }

    fn paragraph_range(
        &self,
        book_id: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<String>, StoreError> {
        self.inner.paragraph_range(book_id, start, count)
    }

    fn paragraph_count(&self, book_id: &str) -> Result<usize, StoreError> {
        self.inner.paragraph_count(book_id)
    }
}

/// Sleeps on every single-paragraph read, so prefetches lag behind the reader.
struct SlowStore {
    inner: MemoryParagraphStore,
    delay: Duration,
}

impl ParagraphStore for SlowStore {
    fn paragraph(&self, book_id: &str, index: usize) -> Result<String, StoreError> {
        thread::sleep(self.delay);
        self.inner.paragraph(book_id, index)
    }

    fn paragraph_range(
        &self,
        book_id: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<String>, StoreError> {
        self.inner.paragraph_range(book_id, start, count)
    }

    fn paragraph_count(&self, book_id: &str) -> Result<usize, StoreError> {
        self.inner.paragraph_count(book_id)
    }
}

/// Holds the first range read until the test releases it.
struct GatedStore {
    inner: MemoryParagraphStore,
    gate: Mutex<Option<mpsc::Receiver<()>>>,
}

impl ParagraphStore for GatedStore {
    fn paragraph(&self, book_id: &str, index: usize) -> Result<String, StoreError> {
        self.inner.paragraph(book_id, index)
    }

    fn paragraph_range(
        &self,
        book_id: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<String>, StoreError> {
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        self.inner.paragraph_range(book_id, start, count)
    }

    fn paragraph_count(&self, book_id: &str) -> Result<usize, StoreError> {
        self.inner.paragraph_count(book_id)
    }
}

fn book_store() -> MemoryParagraphStore {
    let store = MemoryParagraphStore::new();
    store.insert_book(BOOK_ID, BOOK).unwrap();
    store
}

fn config() -> BufferConfig {
    BufferConfig::default().with_pagination(PaginationConfig::new(MAX_LENGTH))
}

fn gated_store() -> (GatedStore, mpsc::Sender<()>) {
    let (release, gate) = mpsc::channel();
    let store = GatedStore {
        inner: book_store(),
        gate: Mutex::new(Some(gate)),
    };
    (store, release)
}

fn manager_with<S: ParagraphStore + 'static>(store: S) -> (BufferManager, Arc<RecordingListener>) {
    let listener = Arc::new(RecordingListener::default());
    let manager = BufferManager::with_listener(store, config(), listener.clone()).unwrap();
    (manager, listener)
}

fn opened_at(start: usize, anchor: StartAnchor) -> (BufferManager, Arc<RecordingListener>) {
    let (manager, listener) = manager_with(book_store());
    manager
        .initialize(BOOK_ID, BOOK.len(), start, anchor)
        .unwrap();
    manager.wait_idle().unwrap();
    (manager, listener)
}

fn expected_chunks() -> Vec<String> {
    BOOK.iter()
        .enumerate()
        .flat_map(|(index, text)| {
            ParagraphChunks::new(index, *text, MAX_LENGTH)
                .chunks()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

#[test]
fn initialize_loads_window_and_notifies() {
    let (manager, listener) = opened_at(0, StartAnchor::default());

    assert_eq!(manager.state(), BufferState::Ready);
    assert!(manager.is_ready());
    assert_eq!(listener.loaded(), 1);
    assert!(listener.errors().is_empty());
    assert_eq!(manager.current_paragraph_index(), 0);
    assert_eq!(manager.current_chunk(), expected_chunks()[0]);
    assert!(manager.is_at_beginning_of_book());
    assert!(!manager.is_at_end_of_book());
    assert_eq!(manager.total_paragraphs(), BOOK.len());
    assert!(manager.window_status().contains("prev=- current=0"));
}

#[test]
fn forward_reading_visits_every_chunk_once() {
    let (manager, _) = manager_with(SlowStore {
        inner: book_store(),
        delay: Duration::from_millis(50),
    });
    manager
        .initialize(BOOK_ID, BOOK.len(), 0, StartAnchor::default())
        .unwrap();
    manager.wait_idle().unwrap();

    // One call per chunk, no waiting in between: only the last one refuses.
    let expected = expected_chunks();
    let mut seen = vec![manager.current_chunk()];
    let mut refusals = Vec::new();
    for call in 1..=expected.len() {
        if manager.move_to_next_chunk() {
            seen.push(manager.current_chunk());
        } else {
            refusals.push((
                call,
                manager.current_paragraph_index(),
                manager.is_at_end_of_book(),
            ));
        }
    }

    assert_eq!(refusals, vec![(expected.len(), BOOK.len() - 1, true)]);
    assert_eq!(seen, expected);
    assert!(manager.is_at_end_of_book());
    assert_eq!(manager.current_end_type(), Some(ChunkEndType::ParagraphEnd));
    assert!(!manager.move_to_next_chunk());
    assert_eq!(manager.current_chunk(), "Adiós.");
}

#[test]
fn backward_reading_lands_on_last_chunk_of_previous_paragraph() {
    let (manager, _) = opened_at(2, StartAnchor::default());
    assert_eq!(manager.current_chunk(), "Una sola frase.");

    assert!(manager.move_to_previous_chunk());
    assert_eq!(manager.current_paragraph_index(), 1);
    assert_eq!(manager.current_chunk_index(), 2);
    assert_eq!(manager.current_chunk(), "Tercero?");

    let mut steps = 0;
    while manager.move_to_previous_chunk() {
        assert_ne!(manager.current_chunk(), CONTENT_UNAVAILABLE);
        steps += 1;
    }
    assert!(steps > 2);
    assert!(manager.is_at_beginning_of_book());
    assert!(!manager.move_to_previous_chunk());
}

#[test]
fn char_offset_anchor_resumes_inside_paragraph() {
    let (manager, _) = opened_at(1, StartAnchor::CharOffset(9));
    assert_eq!(manager.current_chunk_index(), 1);
    assert_eq!(manager.current_chunk(), "Segundo!");
    assert_eq!(manager.current_char_offset(), 8);
    assert_eq!(
        manager.reading_position(),
        Some(ReadingPosition::new(1, 8))
    );
}

#[test]
fn offset_past_paragraph_falls_back_to_first_chunk() {
    let (manager, _) = opened_at(1, StartAnchor::CharOffset(500));
    assert_eq!(manager.current_chunk_index(), 0);
    assert_eq!(manager.current_chunk(), "Primero.");
}

#[test]
fn chunk_anchor_is_clamped_to_last_chunk() {
    let (manager, _) = opened_at(1, StartAnchor::Chunk(40));
    assert_eq!(manager.current_chunk(), "Tercero?");
}

#[test]
fn start_past_end_is_clamped_to_last_paragraph() {
    let (manager, _) = opened_at(99, StartAnchor::default());
    assert_eq!(manager.current_paragraph_index(), 3);
    assert_eq!(manager.current_chunk(), "Fin del libro.");
}

#[test]
fn jump_replaces_window() {
    let (manager, listener) = opened_at(0, StartAnchor::default());

    manager.jump_to_position(3, StartAnchor::Chunk(1)).unwrap();
    manager.wait_idle().unwrap();
    assert_eq!(listener.loaded(), 2);
    assert_eq!(manager.current_paragraph_index(), 3);
    assert_eq!(manager.current_chunk(), "Adiós.");

    assert!(manager.move_to_previous_chunk());
    assert!(manager.move_to_previous_chunk());
    assert_eq!(manager.current_chunk(), "Una sola frase.");
}

#[test]
fn jump_validates_target() {
    let (fresh, _) = manager_with(book_store());
    assert!(matches!(
        fresh.jump_to_position(0, StartAnchor::default()),
        Err(BufferError::NotInitialized)
    ));

    let (manager, _) = opened_at(0, StartAnchor::default());
    assert!(matches!(
        manager.jump_to_position(4, StartAnchor::default()),
        Err(BufferError::ParagraphOutOfRange { index: 4, total: 4 })
    ));
    assert_eq!(manager.state(), BufferState::Ready);
}

#[test]
fn rapid_jumps_settle_on_the_last_one() {
    let (manager, _) = opened_at(0, StartAnchor::default());
    for index in [3, 1, 2, 0, 2] {
        manager.jump_to_position(index, StartAnchor::default()).unwrap();
    }
    manager.wait_idle().unwrap();
    assert_eq!(manager.current_paragraph_index(), 2);
    assert_eq!(manager.state(), BufferState::Ready);
}

#[test]
fn paragraph_move_during_load_retargets_it() {
    let (store, release) = gated_store();
    let (manager, listener) = manager_with(store);

    manager
        .initialize(BOOK_ID, BOOK.len(), 1, StartAnchor::default())
        .unwrap();
    assert_eq!(manager.state(), BufferState::Loading);
    assert!(manager.move_to_next_paragraph());
    assert_eq!(manager.state(), BufferState::Loading);
    assert_eq!(manager.current_chunk(), CONTENT_UNAVAILABLE);
    assert_eq!(manager.reading_position(), None);
    assert!(manager.snapshot().is_none());

    release.send(()).unwrap();
    manager.wait_idle().unwrap();
    assert_eq!(listener.loaded(), 1);
    assert_eq!(manager.current_paragraph_index(), 2);
    assert_eq!(manager.current_chunk(), "Una sola frase.");
}

#[test]
fn chunk_move_during_load_applies_after_it() {
    let (store, release) = gated_store();
    let (manager, _) = manager_with(store);

    manager
        .initialize(BOOK_ID, BOOK.len(), 1, StartAnchor::default())
        .unwrap();
    assert_eq!(manager.state(), BufferState::Loading);
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        release.send(()).unwrap();
    });

    assert!(manager.move_to_next_chunk());
    assert_eq!(manager.current_paragraph_index(), 1);
    assert_eq!(manager.current_chunk(), "Segundo!");
    releaser.join().unwrap();
}

#[test]
fn failed_initial_load_reports_error() {
    // The store holds fewer paragraphs than the book claims.
    let (manager, listener) = manager_with(book_store());
    manager
        .initialize(BOOK_ID, 10, 8, StartAnchor::default())
        .unwrap();
    manager.wait_idle().unwrap();

    assert!(matches!(manager.state(), BufferState::Error(_)));
    assert_eq!(listener.loaded(), 0);
    assert_eq!(listener.errors().len(), 1);
    assert_eq!(manager.current_chunk(), CONTENT_UNAVAILABLE);
    assert!(!manager.move_to_next_chunk());
}

#[test]
fn failed_jump_keeps_last_good_window() {
    let store = Arc::new(book_store());
    let (manager, listener) = manager_with(Arc::clone(&store));
    manager
        .initialize(BOOK_ID, BOOK.len(), 1, StartAnchor::Chunk(1))
        .unwrap();
    manager.wait_idle().unwrap();

    store.remove_book(BOOK_ID);
    manager.jump_to_position(3, StartAnchor::default()).unwrap();
    manager.wait_idle().unwrap();

    assert!(matches!(manager.state(), BufferState::Error(_)));
    assert_eq!(listener.errors().len(), 1);
    assert_eq!(manager.current_paragraph_index(), 1);
    assert_eq!(manager.current_chunk(), "Segundo!");
    assert!(manager.move_to_next_chunk());
    assert_eq!(manager.current_chunk(), "Tercero?");
}

#[test]
fn prefetch_failure_is_not_fatal() {
    // Paragraph 2 fails twice: once as next, once as current after the shift.
    let (manager, listener) = manager_with(FlakyStore::new(book_store(), [(2, 2)]));
    manager
        .initialize(BOOK_ID, BOOK.len(), 0, StartAnchor::default())
        .unwrap();
    manager.wait_idle().unwrap();

    assert!(manager.move_to_next_paragraph());
    manager.wait_idle().unwrap();
    assert!(manager.move_to_next_paragraph());
    manager.wait_idle().unwrap();

    assert_eq!(manager.state(), BufferState::Ready);
    assert_eq!(manager.current_paragraph_index(), 2);
    assert_eq!(manager.current_chunk(), CONTENT_UNAVAILABLE);
    assert!(manager.snapshot().is_none());
    assert!(!manager.is_at_end_of_book());
    assert!(listener.errors().is_empty());

    // The next move retries the read and shows the paragraph it was on.
    assert!(manager.move_to_next_chunk());
    assert_eq!(manager.current_paragraph_index(), 2);
    assert_eq!(manager.current_chunk(), "Una sola frase.");
    assert!(manager.move_to_next_chunk());
    assert_eq!(manager.current_chunk(), "Fin del libro.");
}

#[test]
fn persistent_failure_keeps_cursor_in_place() {
    let (manager, _) = manager_with(FlakyStore::new(book_store(), [(2, usize::MAX)]));
    manager
        .initialize(BOOK_ID, BOOK.len(), 0, StartAnchor::default())
        .unwrap();
    manager.wait_idle().unwrap();

    assert!(manager.move_to_next_paragraph());
    assert!(manager.move_to_next_paragraph());
    manager.wait_idle().unwrap();
    assert_eq!(manager.current_paragraph_index(), 2);

    assert!(!manager.move_to_next_chunk());
    assert_eq!(manager.current_paragraph_index(), 2);
    assert_eq!(manager.current_chunk(), CONTENT_UNAVAILABLE);
    assert!(!manager.is_at_end_of_book());

    assert!(manager.move_to_previous_paragraph());
    assert_eq!(manager.current_chunk(), "Primero.");
}

#[test]
fn apply_config_keeps_reading_position() {
    let (manager, listener) = opened_at(0, StartAnchor::default());
    assert!(manager.move_to_next_chunk());
    assert!(manager.move_to_next_chunk());
    let saved = manager.current_char_offset();
    assert!(saved > 0);

    assert!(
        manager
            .apply_config(PaginationConfig::new(DEFAULT_CHUNK_LENGTH))
            .unwrap()
    );
    manager.wait_idle().unwrap();
    assert_eq!(listener.loaded(), 2);
    assert_eq!(manager.current_paragraph_index(), 0);

    let text = manager.current_paragraph_text().unwrap();
    let wide = ParagraphChunks::new(0, text, DEFAULT_CHUNK_LENGTH);
    let chunk = manager.current_chunk_index();
    assert_eq!(manager.current_paragraph_chunk_count(), wide.count());
    assert!(wide.chunk_start(chunk).unwrap() <= saved);
    assert!(saved < wide.chunk_end(chunk).unwrap());
    assert_eq!(manager.find_chunk_for_char_offset(saved), Some(chunk));
}

#[test]
fn full_paragraph_mode_shows_whole_paragraph() {
    let (manager, _) = opened_at(1, StartAnchor::Chunk(2));
    assert!(
        manager
            .apply_config(PaginationConfig::default().with_full_paragraph_mode(true))
            .unwrap()
    );
    manager.wait_idle().unwrap();

    assert_eq!(manager.current_paragraph_chunk_count(), 1);
    assert_eq!(manager.current_chunk(), BOOK[1]);
    assert!(manager.move_to_next_chunk());
    assert_eq!(manager.current_chunk(), BOOK[2]);
}

#[test]
fn empty_book_is_ready_and_at_end() {
    let store = MemoryParagraphStore::new();
    store.insert_book("vacío", Vec::<String>::new()).unwrap();
    let (manager, listener) = manager_with(store);

    manager
        .initialize("vacío", 0, 0, StartAnchor::default())
        .unwrap();
    manager.wait_idle().unwrap();

    assert_eq!(manager.state(), BufferState::Ready);
    assert_eq!(listener.loaded(), 1);
    assert!(manager.is_at_end_of_book());
    assert_eq!(manager.current_chunk(), CONTENT_UNAVAILABLE);
    assert!(!manager.move_to_next_chunk());
    assert!(!manager.move_to_next_paragraph());
    assert!(!manager.move_to_previous_paragraph());

    // Nothing to re-chunk, so no load is queued and no callback follows.
    assert!(!manager.apply_config(PaginationConfig::new(60)).unwrap());
    manager.wait_idle().unwrap();
    assert_eq!(listener.loaded(), 1);
    assert_eq!(manager.state(), BufferState::Ready);
}

#[test]
fn apply_config_without_book_only_stores_pagination() {
    let (manager, listener) = manager_with(book_store());
    assert!(!manager.apply_config(PaginationConfig::new(60)).unwrap());
    manager.wait_idle().unwrap();
    assert_eq!(listener.loaded(), 0);
    assert_eq!(manager.state(), BufferState::Uninitialized);

    manager
        .initialize(BOOK_ID, BOOK.len(), 0, StartAnchor::default())
        .unwrap();
    manager.wait_idle().unwrap();
    // The stored pagination is used by the first load.
    let wide = ParagraphChunks::new(0, BOOK[0], 60);
    assert_eq!(Some(manager.current_chunk().as_str()), wide.chunk(0));
}

#[test]
fn snapshot_is_consistent() {
    let (manager, _) = opened_at(1, StartAnchor::Chunk(2));
    let snapshot = manager.snapshot().unwrap();
    assert_eq!(snapshot.paragraph_index, 1);
    assert_eq!(snapshot.total_paragraphs, 4);
    assert_eq!(snapshot.chunk_index, 2);
    assert_eq!(snapshot.chunk_count, 3);
    assert_eq!(snapshot.text, "Tercero?");
    assert_eq!(snapshot.char_offset, 17);
    assert_eq!(snapshot.end_type, Some(ChunkEndType::ParagraphEnd));
    assert!(!snapshot.at_beginning);
    assert!(!snapshot.at_end);
    assert_eq!(snapshot.position(), ReadingPosition::new(1, 17));
}

#[test]
fn shutdown_rejects_further_work() {
    let (manager, _) = opened_at(0, StartAnchor::default());
    manager.shutdown();
    manager.shutdown();

    assert_eq!(manager.state(), BufferState::ShutDown);
    assert!(!manager.move_to_next_chunk());
    assert_eq!(manager.current_chunk(), CONTENT_UNAVAILABLE);
    assert!(matches!(
        manager.initialize(BOOK_ID, BOOK.len(), 0, StartAnchor::default()),
        Err(BufferError::ShutDown)
    ));
    assert!(matches!(
        manager.jump_to_position(1, StartAnchor::default()),
        Err(BufferError::ShutDown)
    ));
    assert!(matches!(manager.wait_idle(), Err(BufferError::ShutDown)));
}

#[test]
fn concurrent_navigation_keeps_window_consistent() {
    let (manager, _) = opened_at(1, StartAnchor::default());
    let manager = Arc::new(manager);

    let readers: Vec<_> = (0..4)
        .map(|worker| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for step in 0..200 {
                    if (step + worker) % 3 == 0 {
                        manager.move_to_previous_chunk();
                    } else {
                        manager.move_to_next_chunk();
                    }
                    if let Some(snapshot) = manager.snapshot() {
                        assert!(snapshot.chunk_index < snapshot.chunk_count.max(1));
                        assert!(snapshot.paragraph_index < snapshot.total_paragraphs);
                    }
                }
            })
        })
        .collect();
    for reader in readers {
        reader.join().unwrap();
    }

    manager.wait_idle().unwrap();
    let snapshot = manager.snapshot().unwrap();
    let expected = ParagraphChunks::new(
        snapshot.paragraph_index,
        BOOK[snapshot.paragraph_index],
        MAX_LENGTH,
    );
    assert_eq!(
        expected.chunk(snapshot.chunk_index),
        Some(snapshot.text.as_str())
    );
}

#[test]
fn paragraph_moves_start_at_first_chunk() {
    let (manager, _) = opened_at(1, StartAnchor::Chunk(2));

    assert!(manager.move_to_previous_paragraph());
    assert_eq!(manager.current_paragraph_index(), 0);
    assert_eq!(manager.current_chunk_index(), 0);
    assert!(manager.is_at_beginning_of_book());
    assert!(!manager.move_to_previous_paragraph());

    assert!(manager.move_to_next_paragraph());
    assert_eq!(manager.current_chunk(), "Primero.");
    manager.wait_idle().unwrap();
    assert!(manager.move_to_next_paragraph());
    assert_eq!(manager.current_chunk(), "Una sola frase.");
}

#[test]
fn moves_after_jump_apply_on_top_of_it() {
    let (manager, listener) = opened_at(0, StartAnchor::default());

    manager.jump_to_position(2, StartAnchor::default()).unwrap();
    assert!(manager.move_to_next_paragraph());
    manager.wait_idle().unwrap();
    assert_eq!(manager.current_paragraph_index(), 3);
    assert_eq!(manager.current_chunk(), "Fin del libro.");
    assert_eq!(manager.state(), BufferState::Ready);

    manager.jump_to_position(1, StartAnchor::Chunk(1)).unwrap();
    assert!(manager.move_to_next_chunk());
    assert_eq!(manager.current_paragraph_index(), 1);
    assert_eq!(manager.current_chunk(), "Tercero?");

    manager.jump_to_position(3, StartAnchor::default()).unwrap();
    assert!(!manager.move_to_next_paragraph());
    manager.wait_idle().unwrap();
    assert_eq!(manager.current_paragraph_index(), 3);
    assert_eq!(listener.loaded(), 4);
}
