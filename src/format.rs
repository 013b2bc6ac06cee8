//! Human-readable sizes and listing tables

use crossterm::style::{Color, Stylize};
use unicode_width::UnicodeWidthStr;

use crate::listing::ListingEntry;
use crate::local::LocalEntry;

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
const TYPE_WIDTH: usize = 6;
const NAME_WIDTH: usize = 40;
const SIZE_WIDTH: usize = 15;

/// `0 B`, `512 B`, `1.5 KB`, ... with base 1024, capped at TB.
pub fn human_size(size: u64) -> String {
    if size == 0 {
        return "0 B".to_string();
    }
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", size, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// One table row, independent of where the entry came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row<'a> {
    pub name: &'a str,
    pub is_dir: bool,
    pub size: u64,
}

impl<'a> From<&'a ListingEntry> for Row<'a> {
    fn from(e: &'a ListingEntry) -> Self {
        Row {
            name: &e.name,
            is_dir: e.kind.is_dir(),
            size: e.size,
        }
    }
}

impl<'a> From<&'a LocalEntry> for Row<'a> {
    fn from(e: &'a LocalEntry) -> Self {
        Row {
            name: &e.name,
            is_dir: e.is_dir,
            size: e.size,
        }
    }
}

/// Pad to a display width (CJK and other wide glyphs count double).
fn pad_right(s: &str, width: usize) -> String {
    let w = UnicodeWidthStr::width(s);
    format!("{}{}", s, " ".repeat(width.saturating_sub(w)))
}

/// Render a titled table; `color` adds ANSI styling.
pub fn render_listing<'a, I>(title: &str, rows: I, color: bool) -> String
where
    I: IntoIterator<Item = Row<'a>>,
{
    let rule = "-".repeat(TYPE_WIDTH + NAME_WIDTH + SIZE_WIDTH);
    let mut out = String::new();
    out.push_str(&format!("\n--- {} ---\n", title));
    out.push_str(&format!(
        "{}{}{:>width$}\n",
        pad_right("Type", TYPE_WIDTH),
        pad_right("Name", NAME_WIDTH),
        "Size",
        width = SIZE_WIDTH
    ));
    out.push_str(&rule);
    out.push('\n');

    for row in rows {
        let kind = if row.is_dir { "DIR" } else { "FILE" };
        let left = format!("{}{}", pad_right(kind, TYPE_WIDTH), pad_right(row.name, NAME_WIDTH));
        let size = if row.is_dir {
            "-".to_string()
        } else {
            human_size(row.size)
        };
        let size = format!("{:>width$}", size, width = SIZE_WIDTH);
        if color && row.is_dir {
            out.push_str(&format!("{}{}", left.as_str().with(Color::Blue).bold(), size));
        } else if color {
            out.push_str(&format!("{}{}", left, size.as_str().with(Color::Cyan)));
        } else {
            out.push_str(&left);
            out.push_str(&size);
        }
        out.push('\n');
    }
    out.push_str(&rule);
    out.push('\n');
    out
}
