//! Positional data model: text runs with bounding boxes, and the per-page
//! record that groups them.
//!
//! A [`TextLocation`] is one text run: its byte offset in the page's plain
//! text and its axis-aligned bounding box in PDF user-space points. A
//! [`DocPageLocations`] is the ordered sequence of runs for one page.
//! Runs are kept sorted ascending by `start`, and that order is the key
//! the rectangle-resolution binary search relies on.

use serde::{Deserialize, Serialize};

/// Minimum extent below which a non-whitespace bounding box is considered
/// degenerate.
pub const BBOX_EPSILON: f32 = 1e-3;

/// A text run's start offset in the page text and its bounding box.
///
/// `end` is not persisted: frames on disk carry only `start`. A value of 0
/// means "unset"; it is populated when a location is materialised as the
/// rectangle envelope of a query hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TextLocation {
    /// Byte offset of the run in the page's plain text.
    pub start: u32,
    /// Exclusive end offset, 0 = unset.
    #[serde(default)]
    pub end: u32,
    /// Lower-left x in PDF points.
    pub llx: f32,
    /// Lower-left y in PDF points.
    pub lly: f32,
    /// Upper-right x in PDF points.
    pub urx: f32,
    /// Upper-right y in PDF points.
    pub ury: f32,
}

impl TextLocation {
    /// True if the box has no usable extent in either axis.
    pub fn is_degenerate(&self) -> bool {
        self.urx <= self.llx + BBOX_EPSILON || self.ury <= self.lly + BBOX_EPSILON
    }

    /// True if every field is zero (the "no rectangle" sentinel).
    pub fn is_zero(&self) -> bool {
        *self == TextLocation::default()
    }
}

/// The positional record for one page of one document.
///
/// `doc` is the 0-based catalog index of the document; `page` is the
/// 1-based PDF page number. `locations` is sorted ascending by `start`
/// and no two runs share a `start`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocPageLocations {
    pub doc: u64,
    pub page: u32,
    pub locations: Vec<TextLocation>,
}

impl DocPageLocations {
    pub fn new(doc: u64, page: u32) -> Self {
        DocPageLocations {
            doc,
            page,
            locations: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

/// Index of the first run with `start >= offset`, or `None` if every run
/// starts before `offset`.
///
/// When `offset` equals a run's `start` exactly, that run is selected,
/// not its predecessor.
pub fn position_index(positions: &[TextLocation], offset: u32) -> Option<usize> {
    let i = positions.partition_point(|p| p.start < offset);
    if i < positions.len() {
        Some(i)
    } else {
        None
    }
}

/// The smallest axis-aligned rectangle enclosing the runs that cover the
/// match range `[start, end)`.
///
/// Returns the zero rectangle when either bound falls past the last run.
pub fn position_envelope(positions: &[TextLocation], start: u32, end: u32) -> TextLocation {
    let (i0, i1) = match (
        position_index(positions, end),
        position_index(positions, start),
    ) {
        (Some(i0), Some(i1)) => (i0, i1),
        _ => {
            log::error!(
                "position_envelope: no run for start={start} end={end} len={}",
                positions.len()
            );
            return TextLocation::default();
        }
    };
    let (p0, p1) = (positions[i0], positions[i1]);
    TextLocation {
        start,
        end,
        llx: p0.llx.min(p1.llx),
        lly: p0.lly.min(p1.lly),
        urx: p0.urx.max(p1.urx),
        ury: p0.ury.max(p1.ury),
    }
}

/// Offsets of the line boundaries of `text`: a leading 0 followed by the
/// position of every `'\n'`, with a synthetic terminating newline when the
/// text does not end in one.
pub fn line_endings(text: &str) -> Vec<u32> {
    let mut owned;
    let text = if text.is_empty() || !text.ends_with('\n') {
        owned = String::with_capacity(text.len() + 1);
        owned.push_str(text);
        owned.push('\n');
        &owned
    } else {
        text
    };
    let mut endings = vec![0u32];
    for (pos, b) in text.bytes().enumerate() {
        if b == b'\n' {
            endings.push(pos as u32);
        }
    }
    endings
}

/// 1-based line number and line text containing byte `offset`.
///
/// The line number is the smallest `i` with `endings[i] > offset`; the line
/// text is the slice between the surrounding boundaries with the leading
/// newline stripped.
pub fn line_number(text: &str, offset: u32) -> Option<(usize, String)> {
    let endings = line_endings(text);
    let i = endings.partition_point(|&e| e <= offset);
    if i >= endings.len() {
        log::error!(
            "line_number: offset={offset} beyond text of {} bytes",
            text.len()
        );
        return None;
    }
    let (ofs0, ofs1) = (endings[i - 1] as usize, endings[i] as usize);
    let line = &text[ofs0..ofs1.min(text.len())];
    let line = line.strip_prefix('\n').unwrap_or(line);
    Some((i, line.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(start: u32, llx: f32, lly: f32, urx: f32, ury: f32) -> TextLocation {
        TextLocation {
            start,
            end: 0,
            llx,
            lly,
            urx,
            ury,
        }
    }

    #[test]
    fn test_position_index_exact_start_selects_run() {
        let positions = vec![run(0, 0.0, 0.0, 5.0, 10.0), run(6, 10.0, 0.0, 20.0, 10.0)];
        assert_eq!(position_index(&positions, 6), Some(1));
        assert_eq!(position_index(&positions, 5), Some(1));
        assert_eq!(position_index(&positions, 0), Some(0));
        assert_eq!(position_index(&positions, 7), None);
    }

    #[test]
    fn test_envelope_contains_covered_runs() {
        let positions = vec![
            run(0, 0.0, 100.0, 5.0, 110.0),
            run(6, 10.0, 100.0, 50.0, 120.0),
            run(12, 60.0, 90.0, 80.0, 105.0),
        ];
        let env = position_envelope(&positions, 6, 11);
        assert_eq!(env.start, 6);
        assert_eq!(env.end, 11);
        // Runs with start in [6, 11) all fit inside the envelope.
        for p in positions.iter().filter(|p| p.start >= 6 && p.start < 11) {
            assert!(env.llx <= p.llx && env.lly <= p.lly);
            assert!(env.urx >= p.urx && env.ury >= p.ury);
        }
    }

    #[test]
    fn test_envelope_out_of_range_is_zero() {
        let positions = vec![run(0, 1.0, 1.0, 2.0, 2.0)];
        let env = position_envelope(&positions, 5, 9);
        assert!(env.is_zero());
    }

    #[test]
    fn test_line_endings_synthetic_newline() {
        assert_eq!(line_endings("Hello world\nGoodbye"), vec![0, 11, 19]);
        assert_eq!(line_endings("Hello\n"), vec![0, 5]);
        assert_eq!(line_endings(""), vec![0, 0]);
    }

    #[test]
    fn test_line_number_law() {
        let text = "Hello world\nGoodbye";
        for o in 0..text.len() as u32 {
            let (i, line) = line_number(text, o).unwrap();
            let endings = line_endings(text);
            // The line never carries the boundary newline, and does carry
            // the byte at `o`.
            assert!(!line.ends_with('\n'));
            assert!(endings[i] > o);
            let c = text.as_bytes()[o as usize];
            if c != b'\n' {
                assert!(line.as_bytes().contains(&c), "offset {o} line {line:?}");
            }
        }
        assert_eq!(line_number(text, 6), Some((1, "Hello world".to_string())));
        assert_eq!(line_number(text, 12), Some((2, "Goodbye".to_string())));
    }

    #[test]
    fn test_degenerate_boxes() {
        assert!(run(0, 5.0, 5.0, 5.0, 9.0).is_degenerate());
        assert!(!run(0, 5.0, 5.0, 6.0, 9.0).is_degenerate());
    }
}
