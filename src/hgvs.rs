//! Pairwise sequence diffing with HGVS-style variant rendering.
//!
//! The diff is a byte-level Myers O(ND) algorithm with divide-and-conquer
//! middle-snake splitting and common prefix/suffix trimming. An optional
//! wall-clock deadline bounds the work: when it expires, the region still
//! being refined degrades to one delete plus one insert and the partial
//! result is returned with `timed_out = true` (never an error).

use std::fmt;
use std::time::{Duration, Instant};

/// One position-anchored edit on the reference sequence. `position` is
/// 1-based; `reference` and `alternate` are uppercase and either may be empty
/// (pure insertion / deletion).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub position: usize,
    pub reference: String,
    pub alternate: String,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.position;
        match (self.reference.len(), self.alternate.len()) {
            (1, 0) => write!(f, "{}del", p),
            (r, 0) => write!(f, "{}_{}del", p, p + r - 1),
            (1, 1) => write!(f, "{}{}>{}", p, self.reference, self.alternate),
            (0, _) => write!(f, "{}_{}ins{}", p - 1, p, self.alternate),
            (1, _) => write!(f, "{}delins{}", p, self.alternate),
            (r, _) => write!(f, "{}_{}delins{}", p, p + r - 1, self.alternate),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal,
    Delete,
    Insert,
}

#[derive(Debug, Clone)]
struct Span {
    op: Op,
    text: Vec<u8>,
}

impl Span {
    fn new(op: Op, text: &[u8]) -> Self {
        Self {
            op,
            text: text.to_vec(),
        }
    }
}

struct DiffState {
    deadline: Option<Instant>,
    timed_out: bool,
}

impl DiffState {
    fn expired(&mut self) -> bool {
        if self.timed_out {
            return true;
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.timed_out = true;
            }
        }
        self.timed_out
    }
}

/// Diff `a` against `b` and return the ordered, non-overlapping variants plus
/// a flag reporting whether the optional timeout expired mid-diff.
pub fn diff(a: &str, b: &str, timeout: Option<Duration>) -> (Vec<Variant>, bool) {
    let mut state = DiffState {
        deadline: timeout.map(|t| Instant::now() + t),
        timed_out: false,
    };
    let spans = merge(diff_bytes(a.as_bytes(), b.as_bytes(), &mut state));

    let mut variants = Vec::new();
    let mut pos = 1usize;
    let mut i = 0;
    while i < spans.len() {
        let span = &spans[i];
        match span.op {
            Op::Equal => pos += span.text.len(),
            Op::Delete => {
                let alternate = match spans.get(i + 1) {
                    Some(next) if next.op == Op::Insert => {
                        i += 1;
                        text(&next.text)
                    }
                    _ => String::new(),
                };
                variants.push(Variant {
                    position: pos,
                    reference: text(&span.text),
                    alternate,
                });
                pos += span.text.len();
            }
            Op::Insert => match spans.get(i + 1) {
                Some(next) if next.op == Op::Delete => {
                    variants.push(Variant {
                        position: pos,
                        reference: text(&next.text),
                        alternate: text(&span.text),
                    });
                    pos += next.text.len();
                    i += 1;
                }
                _ => variants.push(Variant {
                    position: pos,
                    reference: String::new(),
                    alternate: text(&span.text),
                }),
            },
        }
        i += 1;
    }
    (variants, state.timed_out)
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn common_suffix(a: &[u8], b: &[u8]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

fn diff_bytes(a: &[u8], b: &[u8], state: &mut DiffState) -> Vec<Span> {
    if a == b {
        return if a.is_empty() {
            Vec::new()
        } else {
            vec![Span::new(Op::Equal, a)]
        };
    }
    let prefix = common_prefix(a, b);
    let prefix_bytes = &a[..prefix];
    let (a, b) = (&a[prefix..], &b[prefix..]);
    let suffix = common_suffix(a, b);
    let suffix_bytes = &a[a.len() - suffix..];
    let (a_mid, b_mid) = (&a[..a.len() - suffix], &b[..b.len() - suffix]);

    let mut spans = Vec::new();
    if prefix > 0 {
        spans.push(Span::new(Op::Equal, prefix_bytes));
    }
    spans.extend(compute(a_mid, b_mid, state));
    if suffix > 0 {
        spans.push(Span::new(Op::Equal, suffix_bytes));
    }
    spans
}

fn compute(a: &[u8], b: &[u8], state: &mut DiffState) -> Vec<Span> {
    if a.is_empty() && b.is_empty() {
        return Vec::new();
    }
    if a.is_empty() {
        return vec![Span::new(Op::Insert, b)];
    }
    if b.is_empty() {
        return vec![Span::new(Op::Delete, a)];
    }
    if state.expired() {
        return vec![Span::new(Op::Delete, a), Span::new(Op::Insert, b)];
    }
    bisect(a, b, state)
}

/// Find the middle snake of the edit path and recurse on both halves
/// (diff-match-patch `DiffBisect`).
fn bisect(a: &[u8], b: &[u8], state: &mut DiffState) -> Vec<Span> {
    let n = a.len() as i64;
    let m = b.len() as i64;
    let max_d = (n + m + 1) / 2;
    let v_offset = max_d;
    let v_len = (2 * max_d + 2) as usize;
    let mut v1 = vec![-1i64; v_len];
    let mut v2 = vec![-1i64; v_len];
    v1[(v_offset + 1) as usize] = 0;
    v2[(v_offset + 1) as usize] = 0;
    let delta = n - m;
    // if the total edit count is odd, overlaps can only be detected on the
    // forward front
    let front = delta % 2 != 0;
    let (mut k1start, mut k1end, mut k2start, mut k2end) = (0i64, 0i64, 0i64, 0i64);

    for d in 0..max_d {
        if state.expired() {
            break;
        }
        let mut k1 = -d + k1start;
        while k1 <= d - k1end {
            let k1_offset = (v_offset + k1) as usize;
            let mut x1 = if k1 == -d || (k1 != d && v1[k1_offset - 1] < v1[k1_offset + 1]) {
                v1[k1_offset + 1]
            } else {
                v1[k1_offset - 1] + 1
            };
            let mut y1 = x1 - k1;
            while x1 < n && y1 < m && a[x1 as usize] == b[y1 as usize] {
                x1 += 1;
                y1 += 1;
            }
            v1[k1_offset] = x1;
            if x1 > n {
                k1end += 2;
            } else if y1 > m {
                k1start += 2;
            } else if front {
                let k2_offset = v_offset + delta - k1;
                if k2_offset >= 0 && (k2_offset as usize) < v_len && v2[k2_offset as usize] != -1 {
                    let x2 = n - v2[k2_offset as usize];
                    if x1 >= x2 {
                        return bisect_split(a, b, x1 as usize, y1 as usize, state);
                    }
                }
            }
            k1 += 2;
        }
        let mut k2 = -d + k2start;
        while k2 <= d - k2end {
            let k2_offset = (v_offset + k2) as usize;
            let mut x2 = if k2 == -d || (k2 != d && v2[k2_offset - 1] < v2[k2_offset + 1]) {
                v2[k2_offset + 1]
            } else {
                v2[k2_offset - 1] + 1
            };
            let mut y2 = x2 - k2;
            while x2 < n && y2 < m && a[(n - x2 - 1) as usize] == b[(m - y2 - 1) as usize] {
                x2 += 1;
                y2 += 1;
            }
            v2[k2_offset] = x2;
            if x2 > n {
                k2end += 2;
            } else if y2 > m {
                k2start += 2;
            } else if !front {
                let k1_offset = v_offset + delta - k2;
                if k1_offset >= 0 && (k1_offset as usize) < v_len && v1[k1_offset as usize] != -1 {
                    let x1 = v1[k1_offset as usize];
                    let y1 = v_offset + x1 - k1_offset;
                    let x2 = n - x2;
                    if x1 >= x2 {
                        return bisect_split(a, b, x1 as usize, y1 as usize, state);
                    }
                }
            }
            k2 += 2;
        }
    }
    // no overlapping snake (or the deadline expired): the strings have
    // nothing in common at this level
    vec![Span::new(Op::Delete, a), Span::new(Op::Insert, b)]
}

fn bisect_split(a: &[u8], b: &[u8], x: usize, y: usize, state: &mut DiffState) -> Vec<Span> {
    let mut spans = diff_bytes(&a[..x], &b[..y], state);
    spans.extend(diff_bytes(&a[x..], &b[y..], state));
    spans
}

/// Merge adjacent same-kind spans and drop empty ones.
fn merge(spans: Vec<Span>) -> Vec<Span> {
    let mut out: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        if span.text.is_empty() {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.op == span.op => last.text.extend_from_slice(&span.text),
            _ => out.push(span),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rendered(a: &str, b: &str) -> Vec<String> {
        let (variants, timed_out) = diff(a, b, None);
        assert!(!timed_out);
        variants.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_diff_rendering() {
        for (a, b, expect) in [
            ("aaaaaaaaaa", "aaaaCaaaaa", vec!["5a>C"]),
            ("aaaacGcaaa", "aaaaccaaa", vec!["6del"]),
            ("aaaacGGcaaa", "aaaaccaaa", vec!["6_7del"]),
            ("aaaac", "aaaa", vec!["5del"]),
            ("aaaa", "aaCaa", vec!["2_3insC"]),
            ("aaGGGtt", "aaCCCtt", vec!["3_5delinsCCC"]),
            ("aa", "aaCCC", vec!["2_3insCCC"]),
            (
                "aaGGttAAtttt",
                "aaCCttttttC",
                vec!["3_4delinsCC", "7_8del", "12_13insC"],
            ),
        ] {
            assert_eq!(rendered(a, b), expect, "diff({a:?}, {b:?})");
        }
    }

    #[test]
    fn test_identical_and_empty() {
        assert!(rendered("acgt", "acgt").is_empty());
        assert!(rendered("", "").is_empty());
        assert_eq!(rendered("", "ACG"), vec!["0_1insACG"]);
        assert_eq!(rendered("ACG", ""), vec!["1_3del"]);
    }

    #[test]
    fn test_single_base_delins() {
        let (variants, _) = diff("aaGa", "aaTTa", None);
        assert_eq!(
            variants,
            vec![Variant {
                position: 3,
                reference: "G".into(),
                alternate: "TT".into(),
            }]
        );
        assert_eq!(variants[0].to_string(), "3delinsTT");
    }

    #[test]
    fn test_timeout_returns_partial_flag() {
        // a deadline in the past forces the coarse delete+insert answer
        let a = "ACGT".repeat(2000);
        let b = format!("TTTT{}", "GCTA".repeat(2000));
        let (variants, timed_out) = diff(&a, &b, Some(Duration::ZERO));
        assert!(timed_out);
        assert!(!variants.is_empty());
        // the coarse answer still round-trips
        assert_eq!(apply(&a, &variants), b);
    }

    /// Apply variants to `a` in reverse position order.
    fn apply(a: &str, variants: &[Variant]) -> String {
        let mut out = a.as_bytes().to_vec();
        for v in variants.iter().rev() {
            let start = v.position - 1;
            out.splice(start..start + v.reference.len(), v.alternate.bytes());
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_round_trip_examples() {
        for (a, b) in [
            ("aaaaaaaaaa", "aaaaCaaaaa"),
            ("aaGGttAAtttt", "aaCCttttttC"),
            ("acgtacgt", "tgcatgca"),
            ("aaaa", "aaCaa"),
        ] {
            let (variants, _) = diff(a, b, None);
            assert_eq!(apply(a, &variants), b, "diff({a:?}, {b:?})");
            for v in &variants {
                assert_eq!(&a[v.position - 1..v.position - 1 + v.reference.len()], v.reference);
            }
        }
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            a in proptest::collection::vec(0u8..4, 0..120),
            b in proptest::collection::vec(0u8..4, 0..120),
        ) {
            let acgt = ['A', 'C', 'G', 'T'];
            let a: String = a.iter().map(|&x| acgt[x as usize]).collect();
            let b: String = b.iter().map(|&x| acgt[x as usize]).collect();
            let (variants, timed_out) = diff(&a, &b, None);
            prop_assert!(!timed_out);
            prop_assert_eq!(apply(&a, &variants), b);
            // variants are ordered and non-overlapping on the reference
            for pair in variants.windows(2) {
                prop_assert!(
                    pair[0].position + pair[0].reference.len() <= pair[1].position
                );
            }
        }
    }
}
