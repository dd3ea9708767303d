//! Fuzzer output scanning

use once_cell::sync::Lazy;
use regex::Regex;

static BRANCH_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"branch:\s*(\d+)").expect("static pattern"));

/// Largest `branch: <n>` value printed by the fuzzer, if any
///
/// The fuzzer reports coverage progressively, so the last report is not
/// always the largest once output from several workers interleaves.
#[must_use]
pub fn branches_reached(output: &str) -> Option<u64> {
    output
        .lines()
        .filter_map(|line| BRANCH_LINE.captures(line)?.get(1)?.as_str().parse().ok())
        .max()
}
