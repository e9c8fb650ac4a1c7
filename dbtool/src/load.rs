//! Input loaders for the sort driver.

use std::io::BufRead;

use anyhow::Result;
use rand::Rng;

/// Parses `sep`-separated decimal records from `text`. Tokens that fail to
/// parse are skipped; the load as a whole proceeds.
pub fn parse_values(text: &str, sep: char) -> Vec<u32> {
    text.split(|c: char| c == sep || c == '\n' || c == '\r')
        .filter_map(|token| token.trim().parse::<u32>().ok())
        .collect()
}

/// Reads space-separated decimal records from `input` until a line ending
/// in `;`. Invalid tokens are skipped.
pub fn read_keyboard(input: impl BufRead) -> Result<Vec<u32>> {
    let mut values = Vec::new();
    for line in input.lines() {
        let line = line?;
        let trimmed = line.trim();
        let (body, done) = match trimmed.strip_suffix(';') {
            Some(rest) => (rest, true),
            None => (trimmed, false),
        };
        values.extend(body.split_whitespace().filter_map(|t| t.parse::<u32>().ok()));
        if done {
            break;
        }
    }
    Ok(values)
}

/// `n` random records over the small value range the generator has always
/// used; plenty of duplicates, which is what a merge sort wants exercised.
pub fn random_values(n: u64) -> Vec<u32> {
    let mut rng = rand::thread_rng();
    (0..n).map(|_| rng.gen_range(1..=9)).collect()
}
