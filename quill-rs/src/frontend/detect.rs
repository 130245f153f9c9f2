//! Dialect guessing.
//!
//! A file extension, when it is one we know, decides outright.  Otherwise
//! the source is scored: every dialect has a list of telltale words counted
//! in one Aho-Corasick pass, plus a few line-shape regexes worth more than a
//! single word.  The highest score wins; ties and empty input go to the
//! canonical dialect.

use std::path::Path;
use std::sync::OnceLock;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use regex::Regex;
use tracing::debug;

use super::Dialect;

/// `(marker, dialect, weight)`.  Word markers only count on word boundaries.
const MARKERS: &[(&str, Dialect, u32)] = &[
    // canonical
    ("proc", Dialect::Canonical, 3),
    ("echo", Dialect::Canonical, 2),
    ("elif", Dialect::Canonical, 1),
    ("discard", Dialect::Canonical, 2),
    ("..<", Dialect::Canonical, 2),
    ("nil", Dialect::Canonical, 2),
    ("var", Dialect::Canonical, 1),
    ("case", Dialect::Canonical, 1),
    ("of", Dialect::Canonical, 1),
    ("defer", Dialect::Canonical, 2),
    // python
    ("def", Dialect::Python, 3),
    ("elif", Dialect::Python, 1),
    ("True", Dialect::Python, 2),
    ("False", Dialect::Python, 2),
    ("None", Dialect::Python, 2),
    ("pass", Dialect::Python, 2),
    ("lambda", Dialect::Python, 2),
    ("print", Dialect::Python, 1),
    ("self", Dialect::Python, 1),
    ("nonlocal", Dialect::Python, 2),
    // javascript
    ("function", Dialect::JavaScript, 3),
    ("=>", Dialect::JavaScript, 2),
    ("===", Dialect::JavaScript, 3),
    ("!==", Dialect::JavaScript, 3),
    ("&&", Dialect::JavaScript, 2),
    ("||", Dialect::JavaScript, 2),
    ("const", Dialect::JavaScript, 1),
    ("let", Dialect::JavaScript, 1),
    ("null", Dialect::JavaScript, 2),
    ("undefined", Dialect::JavaScript, 2),
    ("console", Dialect::JavaScript, 3),
    ("true", Dialect::JavaScript, 1),
    ("false", Dialect::JavaScript, 1),
];

/// Line shapes: `(pattern, dialect, weight)`.
const SHAPES: &[(&str, Dialect, u32)] = &[
    (r"(?m)^\s*proc\s+\w+\*?\s*\(.*\)\s*(:\s*[\w\[\], ]+)?\s*=\s*$", Dialect::Canonical, 5),
    (r"(?m)^\s*def\s+\w+\s*\(.*\)\s*(->\s*.+)?:\s*$", Dialect::Python, 5),
    (r"(?m)\)\s*\{\s*$", Dialect::JavaScript, 4),
    (r"(?m)^\s*\}", Dialect::JavaScript, 2),
    (r"(?m);\s*$", Dialect::JavaScript, 1),
];

struct Matchers {
    words: AhoCorasick,
    shapes: Vec<(Regex, Dialect, u32)>,
}

fn matchers() -> &'static Matchers {
    static MATCHERS: OnceLock<Matchers> = OnceLock::new();
    MATCHERS.get_or_init(|| Matchers {
        words: AhoCorasickBuilder::new()
            .match_kind(MatchKind::LeftmostLongest)
            .build(MARKERS.iter().map(|(m, _, _)| *m)),
        shapes: SHAPES
            .iter()
            .filter_map(|(p, d, w)| Regex::new(p).ok().map(|re| (re, *d, *w)))
            .collect(),
    })
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Per-dialect scores, in [`Dialect::ALL`] order.
pub fn scores(source: &str) -> [u32; 3] {
    let m = matchers();
    let bytes = source.as_bytes();
    let mut scores = [0u32; 3];
    let slot = |d: Dialect| Dialect::ALL.iter().position(|x| *x == d).unwrap_or(0);

    for hit in m.words.find_iter(source) {
        let text = &source[hit.start()..hit.end()];
        if text.bytes().all(is_word_byte) {
            let before = hit.start().checked_sub(1).map(|i| bytes[i]);
            let after = bytes.get(hit.end()).copied();
            if before.is_some_and(is_word_byte) || after.is_some_and(is_word_byte) {
                continue;
            }
        }
        // A marker may belong to several dialects (`elif`).
        for (marker, dialect, weight) in MARKERS {
            if *marker == text {
                scores[slot(*dialect)] += weight;
            }
        }
    }
    for (re, dialect, weight) in &m.shapes {
        scores[slot(*dialect)] += weight * re.find_iter(source).count() as u32;
    }
    scores
}

/// Pick the dialect for `source`, consulting `path`'s extension first.
pub fn detect(source: &str, path: Option<&Path>) -> Dialect {
    if let Some(d) = path.and_then(Dialect::from_extension) {
        return d;
    }
    let scores = scores(source);
    let mut best = Dialect::Canonical;
    let mut best_score = scores[0];
    for (d, s) in Dialect::ALL.iter().zip(scores).skip(1) {
        if s > best_score {
            best = *d;
            best_score = s;
        }
    }
    debug!(?scores, dialect = %best, "detected dialect");
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_wins_over_content() {
        let src = "def f():\n    return None\n";
        assert_eq!(detect(src, Some(Path::new("x.js"))), Dialect::JavaScript);
        assert_eq!(detect(src, Some(Path::new("x.txt"))), Dialect::Python);
    }

    #[test]
    fn recognises_each_dialect() {
        assert_eq!(
            detect("proc greet(name: string) =\n  echo(\"hi \", name)\n", None),
            Dialect::Canonical
        );
        assert_eq!(
            detect("def greet(name):\n    print(\"hi\", name)\n", None),
            Dialect::Python
        );
        assert_eq!(
            detect("function greet(name) {\n  console.log(\"hi\" + name);\n}\n", None),
            Dialect::JavaScript
        );
    }

    #[test]
    fn ties_and_empty_input_are_canonical() {
        assert_eq!(detect("", None), Dialect::Canonical);
        assert_eq!(detect("x = 1 + 2", None), Dialect::Canonical);
    }

    #[test]
    fn markers_need_word_boundaries() {
        assert_eq!(scores("define_thing = 1")[1], 0);
        assert_eq!(scores("letter = 1")[2], 0);
        assert!(scores("let x = 1")[2] > 0);
    }
}
