//! Parallel parsing of one file by several workers.
//!
//! Worker `i` seeks to `i * size / n`, guesses a token boundary
//! and scans for the next `(cell`. Each worker then parses cells
//! until it reaches the first cell of its successor. A worker that
//! runs past that token without hitting it exactly shows that the
//! successor's guess was wrong: the successor is dropped and the
//! worker continues to the next successor.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use rayon::prelude::*;
use crate::*;
use crate::parser::Collected;

/// Counters describing one parallel parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParallelStats {
    /// Workers initially started.
    pub threads: usize,
    /// Workers that found no cell during startup.
    pub dropped: usize,
    /// Re-parses caused by wrong boundary guesses.
    pub retries: usize,
    /// Workers whose results were merged.
    pub merged: usize,
}

struct Worker {
    parser: EdifParser<RingTokenizer<File>>,
    start: u64,
    first_cell: Option<Token>,
    stop: Option<Token>,
    /// the token where parsing ran past `stop`.
    actual_stop: Option<Token>,
    mismatch: bool,
    error: Option<EdifParseError>,
}

impl Worker {
    fn new(path: &Path, start: u64, config: &ParserConfig,
           pool: Arc<StringPool>) -> Result<Worker> {
        let tok = RingTokenizer::new(File::open(path)?, pool, config.max_token_length)
            .with_intern_threshold(config.intern_threshold);
        Ok(Worker {
            parser: EdifParser::new(tok),
            start,
            first_cell: None,
            stop: None,
            actual_stop: None,
            mismatch: false,
            error: None,
        })
    }

    /// Locates the first cell this worker is responsible for.
    fn find_first_cell(&mut self) -> Result<()> {
        if self.start == 0 {
            self.parser.parse_head()?;
            if self.parser.parse_to_next_cell()? {
                self.first_cell = Some(self.parser.next(false)?);
            }
            return Ok(())
        }
        let tok = self.parser.tokenizer_mut();
        tok.skip(self.start)?;
        let guess = tok.skip_to_token_boundary()?;
        if guess.uncertain {
            clilog::debug!(EDIF_PAR_MISMATCH,
                           "uncertain token boundary guess at {} for range starting at {}",
                           guess.offset, self.start);
        }
        let mut prev_paren = false;
        while let Some(t) = self.parser.next_opt(true)? {
            if prev_paren && t.is("cell") {
                self.first_cell = Some(self.parser.next(false)?);
                self.parser.set_in_library(true);
                return Ok(())
            }
            prev_paren = &*t.text == "(";
        }
        Ok(())
    }

    /// Parses cells up to the stop token. With `rerun`, resumes
    /// from where a previous mismatch stopped.
    fn do_parse(&mut self, rerun: bool) -> Result<()> {
        let mut next = match rerun {
            true => self.actual_stop.take(),
            false => self.first_cell.clone()
        };
        self.mismatch = false;
        loop {
            let cur = match next {
                Some(t) => t,
                None => {
                    self.mismatch = self.stop.is_some();
                    return Ok(())
                }
            };
            if let Some(stop) = &self.stop {
                if cur == *stop {
                    return Ok(())
                }
                if cur.offset >= stop.offset {
                    self.mismatch = true;
                    self.actual_stop = Some(cur);
                    return Ok(())
                }
            }
            self.parser.parse_cell(cur)?;
            if !self.parser.parse_to_next_cell()? {
                // reached the end of the file
                self.mismatch = self.stop.is_some();
                return Ok(())
            }
            next = Some(self.parser.next(false)?);
        }
    }
}

pub(crate) fn parse_file_parallel(path: &Path, config: &ParserConfig) -> Result<EdifFile> {
    parse_file_parallel_stats(path, config).map(|(f, _)| f)
}

pub(crate) fn parse_file_parallel_stats(
    path: &Path, config: &ParserConfig
) -> Result<(EdifFile, ParallelStats)> {
    let size = std::fs::metadata(path)?.len();
    let n = config.thread_count(size);
    let mut stats = ParallelStats { threads: n, ..Default::default() };
    clilog::info!(EDIF_PARSE, "parsing {} ({} bytes) with {} workers",
                  path.display(), size, n);

    let thread_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n)
        .build()
        .map_err(|e| EdifParseError::InvalidConfig(e.to_string()))?;
    let pool = Arc::new(StringPool::new());
    let mut workers = (0..n as u64)
        .map(|i| Worker::new(path, i * size / n as u64, config, pool.clone()))
        .collect::<Result<Vec<_>>>()?;

    let t = clilog::stimer!("find first cells");
    thread_pool.install(|| workers.par_iter_mut().for_each(|w| {
        if let Err(e) = w.find_first_cell() {
            w.error = Some(e);
        }
    }));
    clilog::finish!(t);
    if let Some(e) = workers[0].error.take() {
        clilog::error!(EDIF_PARSE, "{}", e);
        return Err(e)
    }
    workers = workers.into_iter().enumerate().filter(|(i, w)| {
        if *i == 0 {
            return true
        }
        match (&w.error, &w.first_cell) {
            (Some(e), _) => {
                clilog::debug!(EDIF_PAR_MISMATCH,
                               "dropping worker starting at {}: {}", w.start, e);
                false
            }
            (None, None) => {
                clilog::debug!(EDIF_PAR_MISMATCH,
                               "dropping worker starting at {}: no cell found", w.start);
                false
            }
            (None, Some(_)) => true
        }
    }).map(|(_, w)| w).collect();
    stats.dropped = n - workers.len();

    for i in 0..workers.len() - 1 {
        workers[i].stop = workers[i + 1].first_cell.clone();
    }

    let t = clilog::stimer!("parse cells");
    thread_pool.install(|| workers.par_iter_mut().for_each(|w| {
        if let Err(e) = w.do_parse(false) {
            w.error = Some(e);
        }
    }));
    clilog::finish!(t);

    let t = clilog::stimer!("fix boundaries");
    let mut i = 0;
    while i < workers.len() {
        if let Some(e) = workers[i].error.take() {
            clilog::error!(EDIF_PARSE, "{}", e);
            return Err(e)
        }
        // the last worker has no stop, so it never mismatches.
        while workers[i].mismatch && i + 1 < workers.len() {
            let dropped = workers.remove(i + 1);
            clilog::warn!(EDIF_PAR_MISMATCH,
                          "worker starting at {} misdetected a cell at {:?}, reparsing",
                          dropped.start, dropped.first_cell.as_ref().map(|t| t.offset));
            workers[i].stop = workers.get(i + 1).and_then(|w| w.first_cell.clone());
            stats.retries += 1;
            if let Err(e) = workers[i].do_parse(true) {
                clilog::error!(EDIF_PARSE, "{}", e);
                return Err(e)
            }
        }
        i += 1;
    }
    clilog::finish!(t);
    stats.merged = workers.len();

    let t = clilog::stimer!("merge parse results");
    let ret = Collected::merge(workers.into_iter().map(|w| w.parser.out));
    clilog::finish!(t);
    if let Err(e) = &ret {
        clilog::error!(EDIF_PARSE, "{}", e);
    }
    ret.map(|f| (f, stats))
}

impl EdifFile {
    /// Like [EdifFile::parse_file_parallel], also returning
    /// counters about worker startup and boundary repairs.
    pub fn parse_file_parallel_with_stats(
        path: impl AsRef<Path>, config: &ParserConfig
    ) -> Result<(EdifFile, ParallelStats)> {
        config.validate()?;
        parse_file_parallel_stats(path.as_ref(), config)
    }
}
