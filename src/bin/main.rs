use std::{
    io,
    path::PathBuf,
    sync::{Arc, mpsc},
};

use anyhow::{Context, Result};
use bookbits_core::{
    buffer::{BufferManager, StartAnchor},
    settings::{BufferConfig, DEFAULT_CHUNK_LENGTH, PaginationConfig},
};
use bookbits_fs::FileParagraphStore;
use clap::Parser;
use log::info;

use console::Console;
use loading::LoadingListener;

#[path = "main/book_db.rs"]
mod book_db;
#[path = "main/console.rs"]
mod console;
#[path = "main/loading.rs"]
mod loading;

/// Read a plain-text book a few lines at a time.
#[derive(Debug, Parser)]
#[command(name = "bookbits", version, about, long_about = None)]
struct Args {
    /// Plain-text book to open
    file: PathBuf,

    /// Directory holding the paragraph cache
    #[arg(long, env = "BOOKBITS_CACHE_DIR", default_value = ".bookbits")]
    cache_dir: PathBuf,

    /// Maximum characters per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_LENGTH)]
    max_length: usize,

    /// Show whole paragraphs instead of chunks
    #[arg(long)]
    full_paragraph: bool,

    /// Paragraph to start at (zero-based, as printed on exit)
    #[arg(long, default_value_t = 0)]
    paragraph: usize,

    /// Byte offset inside the start paragraph, as printed on exit
    #[arg(long)]
    offset: Option<usize>,

    /// Cache id for the book (defaults to one derived from the file name)
    #[arg(long)]
    book_id: Option<String>,

    /// Re-import the file even if it is already cached
    #[arg(long)]
    reimport: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let store = Arc::new(
        FileParagraphStore::open(&args.cache_dir)
            .with_context(|| format!("failed to open cache {}", args.cache_dir.display()))?,
    );
    let book = book_db::open_book(&store, &args.file, args.book_id.as_deref(), args.reimport)?;

    let pagination =
        PaginationConfig::new(args.max_length).with_full_paragraph_mode(args.full_paragraph);
    let (events, loads) = mpsc::channel();
    let manager = BufferManager::with_listener(
        Arc::clone(&store),
        BufferConfig::default().with_pagination(pagination),
        Arc::new(LoadingListener::new(events)),
    )?;

    let anchor = args
        .offset
        .map_or(StartAnchor::default(), StartAnchor::CharOffset);
    manager.initialize(&book.book_id, book.total_paragraphs, args.paragraph, anchor)?;
    loading::await_load(&loads).context("failed to load the opening window")?;
    info!(
        "bookbits: reading book_id={} paragraphs={} max_length={}",
        book.book_id,
        book.total_paragraphs,
        pagination.effective_chunk_length()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    Console::new(&manager, &loads, pagination).run(stdin.lock(), &mut stdout)?;

    if let Some(position) = manager.reading_position() {
        println!(
            "resume with: --paragraph {} --offset {}",
            position.paragraph_index, position.char_offset
        );
    }
    manager.shutdown();
    Ok(())
}
