//! Directory listing parsers
//!
//! A listing response is unstructured text, one record per line. Each
//! `ListingFormat` turns a single record into a `ListingEntry`; a record that
//! does not fit the expected layout is kept as a plain file named after the
//! whole line, so one odd line never costs the rest of the listing.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Directory,
    File,
}

impl EntryKind {
    pub fn is_dir(self) -> bool {
        matches!(self, EntryKind::Directory)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Bytes; 0 for directories or when the server did not say.
    pub size: u64,
}

impl ListingEntry {
    /// Fallback record for a line that could not be parsed.
    pub fn unparsed(line: &str) -> Self {
        Self {
            name: line.to_string(),
            kind: EntryKind::File,
            size: 0,
        }
    }
}

/// Wire format of the listing the server is asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ListingFormat {
    /// `LIST` output in `ls -l` layout.
    #[default]
    Unix,
    /// `MLSD` machine-readable facts.
    Mlsd,
}

impl ListingFormat {
    /// Strict parse: `None` when the line does not have the expected shape.
    pub fn try_parse(self, line: &str) -> Option<ListingEntry> {
        match self {
            ListingFormat::Unix => parse_unix(line),
            ListingFormat::Mlsd => parse_mlsd(line),
        }
    }

    /// Never fails: malformed lines become `ListingEntry::unparsed`.
    pub fn parse(self, line: &str) -> ListingEntry {
        self.try_parse(line)
            .unwrap_or_else(|| ListingEntry::unparsed(line))
    }
}

/// Split a raw listing body into its non-empty records (`\n` or `\r\n`).
pub fn records(raw: &str) -> impl Iterator<Item = &str> {
    raw.split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .filter(|l| !l.is_empty())
}

const TYPE_CHARS: &str = "-dlbcps";
const PERM_CHARS: &str = "rwxsStTl-+@.";

/// Number of whitespace-separated fields before the name:
/// perms, links, owner, group, size, month, day, time-or-year.
const UNIX_FIXED_FIELDS: usize = 8;

fn parse_unix(line: &str) -> Option<ListingEntry> {
    let mut rest = line;
    let mut fields = [""; UNIX_FIXED_FIELDS];
    for slot in fields.iter_mut() {
        let (field, tail) = next_field(rest)?;
        *slot = field;
        rest = tail;
    }
    // Exactly one run of whitespace separates the last fixed field from the name;
    // anything past it belongs to the name, including further spaces.
    let name = rest.trim_start_matches([' ', '\t']);
    if name.is_empty() || name.len() == rest.len() {
        return None;
    }

    let perms = fields[0];
    let mut chars = perms.chars();
    let kind_char = chars.next()?;
    if !TYPE_CHARS.contains(kind_char) || !chars.all(|c| PERM_CHARS.contains(c)) {
        return None;
    }
    if !is_digits(fields[1]) || !is_digits(fields[4]) {
        return None;
    }
    let size = fields[4].parse::<u64>().ok()?;

    Some(ListingEntry {
        name: name.to_string(),
        kind: if kind_char == 'd' {
            EntryKind::Directory
        } else {
            EntryKind::File
        },
        size,
    })
}

/// Take one whitespace-delimited field off the front of `s`.
fn next_field(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start_matches([' ', '\t']);
    if s.is_empty() {
        return None;
    }
    let end = s.find([' ', '\t']).unwrap_or(s.len());
    Some((&s[..end], &s[end..]))
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// `type=file;size=1024;modify=20240101000000; name`
fn parse_mlsd(line: &str) -> Option<ListingEntry> {
    let (facts, name) = line.split_once(' ')?;
    if name.is_empty() || !facts.contains('=') {
        return None;
    }
    let mut kind = None;
    let mut size = 0u64;
    for fact in facts.split(';').filter(|f| !f.is_empty()) {
        let (key, value) = fact.split_once('=')?;
        match key.to_ascii_lowercase().as_str() {
            "type" => {
                kind = Some(match value.to_ascii_lowercase().as_str() {
                    "dir" | "cdir" | "pdir" => EntryKind::Directory,
                    _ => EntryKind::File,
                })
            }
            "size" => size = value.parse().ok()?,
            _ => {}
        }
    }
    let kind = kind?;
    Some(ListingEntry {
        name: name.to_string(),
        kind,
        size: if kind.is_dir() { 0 } else { size },
    })
}

/// `.` and `..` as reported by MLSD (`type=cdir` / `type=pdir`) or some LIST servers.
pub fn is_self_or_parent(entry: &ListingEntry) -> bool {
    entry.kind.is_dir() && (entry.name == "." || entry.name == "..")
}
