use std::{
    io::{BufRead, Write},
    sync::mpsc::Receiver,
};

use anyhow::{Context, Result};
use bookbits_core::{
    buffer::{BufferError, BufferManager, CONTENT_UNAVAILABLE, StartAnchor},
    settings::PaginationConfig,
    text_policy::{percent_read, progress_label},
};
use log::debug;

use super::loading::{LoadingEvent, await_load};

const HELP: &str = "\
commands:
  n, <enter>  next chunk
  p           previous chunk
  N / P       next / previous paragraph
  j <n>       jump to paragraph n
  m <len>     set max chunk length
  f           toggle full-paragraph mode
  s           window status
  h           this help
  q           quit";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum Command {
    Next,
    Previous,
    NextParagraph,
    PreviousParagraph,
    /// Zero-based paragraph index.
    Jump(usize),
    MaxLength(usize),
    ToggleFullParagraph,
    Status,
    Help,
    Quit,
}

impl Command {
    /// Parses one input line. Paragraph numbers are one-based on input.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (word, arg) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(word, arg)| (word, arg.trim()));

        match (word, arg) {
            ("" | "n", "") => Some(Self::Next),
            ("p", "") => Some(Self::Previous),
            ("N", "") => Some(Self::NextParagraph),
            ("P", "") => Some(Self::PreviousParagraph),
            ("f", "") => Some(Self::ToggleFullParagraph),
            ("s", "") => Some(Self::Status),
            ("h" | "?", "") => Some(Self::Help),
            ("q", "") => Some(Self::Quit),
            ("j", arg) => arg
                .parse::<usize>()
                .ok()
                .and_then(|number| number.checked_sub(1))
                .map(Self::Jump),
            ("m", arg) => arg.parse().ok().map(Self::MaxLength),
            _ => None,
        }
    }
}

/// Interactive chunk-by-chunk reader over a [`BufferManager`].
pub(super) struct Console<'a> {
    manager: &'a BufferManager,
    loads: &'a Receiver<LoadingEvent>,
    pagination: PaginationConfig,
}

impl<'a> Console<'a> {
    pub fn new(
        manager: &'a BufferManager,
        loads: &'a Receiver<LoadingEvent>,
        pagination: PaginationConfig,
    ) -> Self {
        Self {
            manager,
            loads,
            pagination,
        }
    }

    pub fn run(&mut self, input: impl BufRead, out: &mut impl Write) -> Result<()> {
        self.render(out)?;
        for line in input.lines() {
            let line = line.context("failed to read command")?;
            let Some(command) = Command::parse(&line) else {
                writeln!(out, "unknown command {:?}, h for help", line.trim())?;
                continue;
            };
            debug!("console: command {:?}", command);

            match command {
                Command::Quit => break,
                Command::Help => writeln!(out, "{HELP}")?,
                Command::Status => writeln!(out, "{}", self.manager.window_status())?,
                Command::Next => self.step(out, BufferManager::move_to_next_chunk, "end of book")?,
                Command::Previous => self.step(
                    out,
                    BufferManager::move_to_previous_chunk,
                    "beginning of book",
                )?,
                Command::NextParagraph => {
                    self.step(out, BufferManager::move_to_next_paragraph, "last paragraph")?
                }
                Command::PreviousParagraph => self.step(
                    out,
                    BufferManager::move_to_previous_paragraph,
                    "first paragraph",
                )?,
                Command::Jump(paragraph_index) => {
                    let request = self
                        .manager
                        .jump_to_position(paragraph_index, StartAnchor::default())
                        .map(|()| true);
                    self.reload(out, request)?;
                }
                Command::MaxLength(max_length) => {
                    self.pagination = self.pagination.with_max_chunk_length(max_length);
                    let request = self.manager.apply_config(self.pagination);
                    self.reload(out, request)?;
                }
                Command::ToggleFullParagraph => {
                    self.pagination = self
                        .pagination
                        .with_full_paragraph_mode(!self.pagination.full_paragraph_mode);
                    let request = self.manager.apply_config(self.pagination);
                    self.reload(out, request)?;
                }
            }
        }
        Ok(())
    }

    /// Applies a navigation move and draws the chunk it lands on.
    fn step(
        &self,
        out: &mut impl Write,
        navigate: fn(&BufferManager) -> bool,
        edge: &str,
    ) -> Result<()> {
        if navigate(self.manager) {
            // Paragraph moves return before the new paragraph is fetched.
            self.manager.wait_idle()?;
            return self.render(out);
        }

        if self.manager.snapshot().is_some() {
            writeln!(out, "-- {edge} --")?;
            Ok(())
        } else {
            self.render(out)
        }
    }

    /// Waits for the load `request` queued, if any, then redraws.
    fn reload(&self, out: &mut impl Write, request: Result<bool, BufferError>) -> Result<()> {
        match request {
            Err(err) => writeln!(out, "! {err}")?,
            Ok(false) => self.render(out)?,
            Ok(true) => match await_load(self.loads) {
                Ok(()) => self.render(out)?,
                Err(err) => writeln!(out, "! load failed: {err:#}")?,
            },
        }
        Ok(())
    }

    fn render(&self, out: &mut impl Write) -> Result<()> {
        let Some(snapshot) = self.manager.snapshot() else {
            writeln!(out, "{CONTENT_UNAVAILABLE}")?;
            return Ok(());
        };

        let progress = progress_label(
            snapshot.paragraph_index,
            snapshot.total_paragraphs,
            snapshot.chunk_index,
            snapshot.chunk_count,
        );
        let percent = percent_read(snapshot.paragraph_index, snapshot.total_paragraphs);
        writeln!(out, "[{progress} | {percent}%]")?;
        writeln!(out, "{}", snapshot.text)?;
        if snapshot.at_end {
            writeln!(out, "-- end of book --")?;
        }
        out.flush()?;
        Ok(())
    }
}
