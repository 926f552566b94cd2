use std::{
    collections::HashMap,
    fs::{self, File},
    io::{self, BufRead, BufReader, BufWriter, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use bookbits_core::{
    store::{ParagraphStore, StoreError, validate_paragraphs},
    text::segment,
};
use log::{debug, info};
use parking_lot::RwLock;

pub const BOOKS_DIR: &str = "books";
pub const CONTENT_FILE: &str = "content.txt";
const TEMP_SUFFIX: &str = ".tmp";

/// Byte offset of the start of every line in a content file.
#[derive(Debug)]
struct LineIndex {
    starts: Vec<u64>,
}

impl LineIndex {
    fn build(file: File) -> io::Result<Self> {
        let mut reader = BufReader::new(file);
        let mut starts = Vec::new();
        let mut position = 0u64;
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                break;
            }
            starts.push(position);
            position += read as u64;
        }
        Ok(Self { starts })
    }

    fn len(&self) -> usize {
        self.starts.len()
    }
}

/// Paragraph store over plain-text cache files, one paragraph per line.
///
/// The first read of a book scans its file once to record where every line
/// starts; later reads seek straight to the requested line.
#[derive(Debug)]
pub struct FileParagraphStore {
    books_dir: PathBuf,
    /// Keyed by directory name, so ids sharing a directory share an index.
    indexes: RwLock<HashMap<String, Arc<LineIndex>>>,
}

impl FileParagraphStore {
    /// Opens (creating if needed) the cache rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let books_dir = root.as_ref().join(BOOKS_DIR);
        fs::create_dir_all(&books_dir)?;
        debug!("store-fs: open dir={}", books_dir.display());
        Ok(Self {
            books_dir,
            indexes: RwLock::new(HashMap::new()),
        })
    }

    pub fn books_dir(&self) -> &Path {
        &self.books_dir
    }

    /// Directory name under `books/` for `book_id`.
    fn dir_name(book_id: &str) -> String {
        let safe_id = book_id.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        match safe_id.as_str() {
            "" | "." | ".." => format!("_{safe_id}"),
            _ => safe_id,
        }
    }

    fn book_dir(&self, book_id: &str) -> PathBuf {
        self.books_dir.join(Self::dir_name(book_id))
    }

    pub fn content_path(&self, book_id: &str) -> PathBuf {
        self.book_dir(book_id).join(CONTENT_FILE)
    }

    pub fn is_cached(&self, book_id: &str) -> bool {
        self.content_path(book_id).is_file()
    }

    /// Writes `paragraphs` as the content of `book_id`, replacing any previous
    /// copy. The file is written aside and renamed into place.
    pub fn write_book<S: AsRef<str>>(
        &self,
        book_id: &str,
        paragraphs: &[S],
    ) -> Result<usize, StoreError> {
        validate_paragraphs(paragraphs)?;

        let dir = self.book_dir(book_id);
        fs::create_dir_all(&dir)?;
        let target = dir.join(CONTENT_FILE);
        let staging = dir.join(format!("{CONTENT_FILE}{TEMP_SUFFIX}"));

        {
            let mut writer = BufWriter::new(File::create(&staging)?);
            for paragraph in paragraphs {
                writer.write_all(paragraph.as_ref().as_bytes())?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&staging, &target)?;
        self.indexes.write().remove(&Self::dir_name(book_id));

        info!(
            "store-fs: wrote book_id={} paragraphs={} path={}",
            book_id,
            paragraphs.len(),
            target.display()
        );
        Ok(paragraphs.len())
    }

    /// Segments raw prose into paragraphs and caches them.
    pub fn import_text(&self, book_id: &str, raw: &str) -> Result<usize, StoreError> {
        let paragraphs = segment(raw);
        self.write_book(book_id, &paragraphs)
    }

    /// Removes the cached book. Returns whether anything was deleted.
    pub fn delete_book(&self, book_id: &str) -> Result<bool, StoreError> {
        self.indexes.write().remove(&Self::dir_name(book_id));
        let dir = self.book_dir(book_id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!("store-fs: deleted book_id={}", book_id);
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn open_content(&self, book_id: &str) -> Result<File, StoreError> {
        File::open(self.content_path(book_id)).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => StoreError::unknown_book(book_id),
            _ => StoreError::Io(err),
        })
    }

    fn index(&self, book_id: &str) -> Result<Arc<LineIndex>, StoreError> {
        let key = Self::dir_name(book_id);
        if let Some(index) = self.indexes.read().get(&key) {
            return Ok(Arc::clone(index));
        }

        let index = Arc::new(LineIndex::build(self.open_content(book_id)?)?);
        debug!(
            "store-fs: indexed book_id={} lines={}",
            book_id,
            index.len()
        );
        self.indexes.write().insert(key, Arc::clone(&index));
        Ok(index)
    }

    fn reader_at(
        &self,
        book_id: &str,
        index: &LineIndex,
        line: usize,
    ) -> Result<BufReader<File>, StoreError> {
        let mut file = self.open_content(book_id)?;
        file.seek(SeekFrom::Start(index.starts[line]))?;
        Ok(BufReader::new(file))
    }
}

fn read_paragraph(reader: &mut impl BufRead) -> Result<String, StoreError> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);
    Ok(line)
}

impl ParagraphStore for FileParagraphStore {
    fn paragraph(&self, book_id: &str, index: usize) -> Result<String, StoreError> {
        let lines = self.index(book_id)?;
        if index >= lines.len() {
            return Err(StoreError::not_found(book_id, index, lines.len()));
        }
        let mut reader = self.reader_at(book_id, &lines, index)?;
        read_paragraph(&mut reader)
    }

    fn paragraph_range(
        &self,
        book_id: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<String>, StoreError> {
        let lines = self.index(book_id)?;
        if start > lines.len() {
            return Err(StoreError::StartBeyondEnd {
                book_id: book_id.to_string(),
                start,
                available: lines.len(),
            });
        }

        let end = start.saturating_add(count).min(lines.len());
        if start == end {
            return Ok(Vec::new());
        }
        let mut reader = self.reader_at(book_id, &lines, start)?;
        (start..end).map(|_| read_paragraph(&mut reader)).collect()
    }

    fn paragraph_count(&self, book_id: &str) -> Result<usize, StoreError> {
        Ok(self.index(book_id)?.len())
    }
}

/// Filesystem-safe book id derived from a file name: lowercase alphanumerics
/// joined by single dashes.
pub fn book_id_for_path(path: impl AsRef<Path>) -> String {
    let stem = path
        .as_ref()
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut id = String::with_capacity(stem.len());
    for ch in stem.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            id.push(ch);
        } else if !id.is_empty() && !id.ends_with('-') {
            id.push('-');
        }
    }
    let trimmed = id.trim_end_matches('-').len();
    id.truncate(trimmed);

    if id.is_empty() { "book".to_string() } else { id }
}
