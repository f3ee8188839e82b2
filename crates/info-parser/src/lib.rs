//! Streaming, zero-copy key/value extractor for the vehicle-dynamics
//! sidecar metadata format.
//!
//! [`InfoParser::parse`] walks a byte buffer line by line, classifying each
//! line with a single [`vdyn_simd::scan::find_any_of`] scan for the first
//! of `#`, `=`, `:`, and appends entries to a [`KvTable`] whose keys and
//! values are copied into a caller-supplied [`vdyn_arena::DualArena`].
//! Because leading whitespace never contains any of those three bytes,
//! "first occurrence of a needle in the raw line" already *is* "first
//! non-whitespace byte is `#`" and "blank line has no separator at all" —
//! no separate blank/comment pre-check is needed before classifying a line
//! outside an open multi-line entry.

use vdyn_arena::DualArena;
use vdyn_simd::scan::{find_any_of, skip_leading_ws, trim, Separator};

/// A single parsed entry: both `key` and `value` are slices into the
/// [`DualArena`] the table was parsed into, so they outlive the input text
/// buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

/// An ordered, append-only table of [`Entry`] values. Insertion order is
/// iteration order; duplicate keys are tolerated (only the first
/// insertion is reachable via [`KvTable::get`]).
pub struct KvTable<'a> {
    entries: Vec<Entry<'a>>,
}

impl<'a> KvTable<'a> {
    fn with_capacity(n: usize) -> Self {
        Self {
            entries: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, key: &'a str, value: &'a str) {
        self.entries.push(Entry { key, value });
    }

    /// First entry whose key matches `key`, by case-sensitive byte
    /// comparison. Linear scan: sidecars run to O(10^5) entries, and the
    /// workload is bulk extraction over a schema derived once, not
    /// repeated point lookups — a hash index would be a legal alternative
    /// but is not required.
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.entries.iter().find(|e| e.key == key).map(|e| e.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insertion-order iteration over every parsed entry.
    pub fn iter(&self) -> impl Iterator<Item = &Entry<'a>> {
        self.entries.iter()
    }
}

/// Stateless entry point: [`InfoParser::parse`] takes the arena and input
/// text and returns a populated table. There is no other state to hold —
/// the scratch buffer used to accumulate a multi-line value lives only for
/// the duration of one `parse` call.
pub struct InfoParser;

/// Roughly how many entries a well-formed sidecar has per input byte,
/// used to pre-size the `KvTable`'s backing `Vec` (spec: reserve
/// `ceil(F/150)` entry slots).
const BYTES_PER_ENTRY_ESTIMATE: usize = 150;

/// How many bytes of a discarded line to include in the warning preview.
const MALFORMED_LINE_PREVIEW: usize = 40;

impl InfoParser {
    /// Parse `text` into a [`KvTable`] backed by `arena`. Pre-reserves both
    /// the table's `Vec` and the arena's two chunks based on `text.len()`
    /// (entries run roughly one per 150 bytes; keys and values split
    /// roughly 1:5 of the input size), so the common case is
    /// allocation-free past this call's own growth.
    pub fn parse<'a>(arena: &'a DualArena, text: &[u8]) -> KvTable<'a> {
        let file_size = text.len();
        arena.reserve_for_file_size(file_size);
        let entry_estimate = file_size / BYTES_PER_ENTRY_ESTIMATE + 1;
        let mut table = KvTable::with_capacity(entry_estimate);

        tracing::debug!(file_size, "parsing info file");

        let mut pending: Option<PendingEntry> = None;
        let mut line_number: u64 = 0;

        for line in split_lines(text) {
            line_number += 1;
            let line = strip_cr(line);

            if let Some(state) = pending.as_mut() {
                if is_continuation(line) {
                    state.append(trim(line));
                    continue;
                }
                let first_non_ws = skip_leading_ws(line);
                if first_non_ws == line.len() {
                    // blank line inside an open multi-line entry: does not terminate
                    continue;
                }
                if line[first_non_ws] == b'#' {
                    // comment line inside an open multi-line entry: does not terminate
                    continue;
                }
                let finished = pending.take().unwrap();
                commit(arena, &mut table, finished);
                // fall through: classify this terminating line fresh
            }

            match find_any_of(line) {
                Some((_, Separator::Hash)) => {
                    // comment, discard
                }
                Some((pos, Separator::Equals)) => {
                    let key = trim(&line[..pos]);
                    let value = trim(&line[pos + 1..]);
                    if let (Ok(key), Ok(value)) =
                        (std::str::from_utf8(key), std::str::from_utf8(value))
                    {
                        let key = arena.keys.alloc_str(key);
                        let value = arena.values.alloc_str(value);
                        table.push(key, value);
                    } else {
                        tracing::warn!(line_number, "non-UTF-8 single-line entry, skipped");
                    }
                }
                Some((pos, Separator::Colon)) => {
                    let key = trim(&line[..pos]);
                    let seed = trim(&line[pos + 1..]);
                    match std::str::from_utf8(key) {
                        Ok(key) => {
                            let mut state = PendingEntry::new(key.to_owned());
                            if !seed.is_empty() {
                                if let Ok(seed) = std::str::from_utf8(seed) {
                                    state.append(seed.as_bytes());
                                }
                            }
                            pending = Some(state);
                        }
                        Err(_) => {
                            tracing::warn!(line_number, "non-UTF-8 multi-line key, skipped");
                        }
                    }
                }
                None => {
                    if !trim(line).is_empty() {
                        tracing::warn!(
                            line_number,
                            preview = %preview(line),
                            "malformed line with no recognized separator, skipped"
                        );
                    }
                }
            }
        }

        if let Some(finished) = pending.take() {
            commit(arena, &mut table, finished);
        }

        tracing::debug!(
            entries = table.len(),
            key_bytes_used = arena.keys.used(),
            value_bytes_used = arena.values.used(),
            "finished parsing info file"
        );

        table
    }
}

struct PendingEntry {
    key: String,
    value: Vec<u8>,
}

impl PendingEntry {
    fn new(key: String) -> Self {
        Self {
            key,
            value: Vec::new(),
        }
    }

    fn append(&mut self, content: &[u8]) {
        if content.is_empty() {
            return;
        }
        if !self.value.is_empty() {
            self.value.push(b'\n');
        }
        self.value.extend_from_slice(content);
    }
}

fn commit<'a>(arena: &'a DualArena, table: &mut KvTable<'a>, entry: PendingEntry) {
    match std::str::from_utf8(&entry.value) {
        Ok(value) => {
            let key = arena.keys.alloc_str(&entry.key);
            let value = arena.values.alloc_str(value);
            table.push(key, value);
        }
        Err(_) => {
            tracing::warn!(key = %entry.key, "non-UTF-8 multi-line value, entry skipped");
        }
    }
}

fn preview(line: &[u8]) -> String {
    let n = line.len().min(MALFORMED_LINE_PREVIEW);
    String::from_utf8_lossy(&line[..n]).into_owned()
}

fn strip_cr(line: &[u8]) -> &[u8] {
    if line.last() == Some(&b'\r') {
        &line[..line.len() - 1]
    } else {
        line
    }
}

fn is_continuation(line: &[u8]) -> bool {
    match line.first() {
        Some(b'\t') => true,
        Some(b' ') => line.len() > 1 && line[1] != 0,
        _ => false,
    }
}

/// Split `text` into `\n`-terminated lines (final line need not end in
/// `\n`), without allocating — each yielded slice borrows from `text`.
fn split_lines(text: &[u8]) -> impl Iterator<Item = &[u8]> {
    LineSplit { rest: text }
}

struct LineSplit<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for LineSplit<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.rest.is_empty() {
            return None;
        }
        match vdyn_simd::scan::find_byte(self.rest, b'\n') {
            Some(pos) => {
                let line = &self.rest[..pos];
                self.rest = &self.rest[pos + 1..];
                Some(line)
            }
            None => {
                let line = self.rest;
                self.rest = &[];
                Some(line)
            }
        }
    }
}
