//! Shard URL pattern checking and brace expansion.
//!
//! Training data lives in many shard files whose names differ only by an
//! index, so documents name them with shell-style brace patterns such as
//! `gs://bucket/train.{1..128}-of-128.jsonl.gz`.

use crate::{ConfigError, Result};

/// Upper bound on the number of URLs a single pattern may expand to
const MAX_EXPANSION: usize = 1_000_000;

/// URL schemes the external trainer knows how to read from
const SUPPORTED_SCHEMES: &[&str] = &["gs", "s3", "http", "https", "file", "hf"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Alternatives(Vec<String>),
    /// Inclusive integer range, items zero-padded to `width`
    Range { start: i64, end: i64, width: usize },
}

impl Segment {
    fn len(&self) -> usize {
        match self {
            Segment::Literal(_) => 1,
            Segment::Alternatives(items) => items.len(),
            Segment::Range { start, end, .. } => range_len(*start, *end),
        }
    }

    fn items(&self) -> Vec<String> {
        match self {
            Segment::Literal(text) => vec![text.clone()],
            Segment::Alternatives(items) => items.clone(),
            Segment::Range { start, end, width } => {
                let width = *width;
                if start <= end {
                    (*start..=*end).map(|i| format!("{:0width$}", i)).collect()
                } else {
                    (*end..=*start).rev().map(|i| format!("{:0width$}", i)).collect()
                }
            }
        }
    }
}

fn range_len(start: i64, end: i64) -> usize {
    usize::try_from(start.abs_diff(end).saturating_add(1)).unwrap_or(usize::MAX)
}

fn malformed(pattern: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::ShardPattern {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}

/// Check that a shard pattern is well formed without expanding it.
pub fn validate_pattern(pattern: &str) -> Result<()> {
    parse_segments(pattern)?;
    Ok(())
}

/// Expand a shard pattern into concrete URLs.
///
/// Groups expand as a cartesian product with the leftmost group outermost,
/// so `{a,b}-{1..2}` yields `a-1, a-2, b-1, b-2`. A group with neither `,`
/// nor `..`, such as `{b}`, is kept as literal text like the shell does.
pub fn expand_pattern(pattern: &str) -> Result<Vec<String>> {
    let (segments, total) = parse_segments(pattern)?;

    let mut urls = vec![String::new()];
    for segment in &segments {
        urls = match segment {
            Segment::Literal(text) => {
                for url in urls.iter_mut() {
                    url.push_str(text);
                }
                urls
            }
            group => {
                let items = group.items();
                let mut next = Vec::with_capacity(urls.len() * items.len());
                for prefix in &urls {
                    for item in &items {
                        next.push(format!("{}{}", prefix, item));
                    }
                }
                next
            }
        };
    }

    debug_assert_eq!(urls.len(), total);
    Ok(urls)
}

/// Whether a URL points at remote storage rather than the local filesystem
pub fn is_remote(url: &str) -> bool {
    match url.split_once("://") {
        Some((scheme, _)) => !scheme.eq_ignore_ascii_case("file"),
        None => false,
    }
}

fn check_scheme(pattern: &str) -> Result<()> {
    if let Some((scheme, rest)) = pattern.split_once("://") {
        let known = SUPPORTED_SCHEMES
            .iter()
            .any(|s| s.eq_ignore_ascii_case(scheme));
        if !known {
            return Err(malformed(pattern, format!("unsupported scheme '{}'", scheme)));
        }
        if rest.is_empty() {
            return Err(malformed(pattern, "missing location after scheme"));
        }
    }
    Ok(())
}

/// Split a pattern into segments and return them with the expansion size.
///
/// The size is checked against `MAX_EXPANSION` group by group, before any
/// range items are materialized.
fn parse_segments(pattern: &str) -> Result<(Vec<Segment>, usize)> {
    if pattern.is_empty() {
        return Err(malformed(pattern, "empty pattern"));
    }
    if pattern.chars().any(char::is_whitespace) {
        return Err(malformed(pattern, "contains whitespace"));
    }
    check_scheme(pattern)?;

    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut total: usize = 1;
    let mut rest = pattern;

    while let Some(pos) = rest.find(['{', '}']) {
        if rest[pos..].starts_with('}') {
            return Err(malformed(pattern, "unmatched '}'"));
        }
        literal.push_str(&rest[..pos]);

        let after_open = &rest[pos + 1..];
        let close = after_open
            .find('}')
            .ok_or_else(|| malformed(pattern, "unmatched '{'"))?;
        let body = &after_open[..close];
        rest = &after_open[close + 1..];

        if body.contains('{') {
            return Err(malformed(pattern, "nested brace groups are not supported"));
        }
        if body.is_empty() {
            return Err(malformed(pattern, "empty brace group"));
        }
        if !body.contains(',') && !body.contains("..") {
            literal.push('{');
            literal.push_str(body);
            literal.push('}');
            continue;
        }

        let group = parse_group(pattern, body)?;
        total = total
            .checked_mul(group.len())
            .filter(|&n| n <= MAX_EXPANSION)
            .ok_or_else(|| {
                malformed(pattern, format!("expands to more than {} urls", MAX_EXPANSION))
            })?;

        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(group);
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok((segments, total))
}

fn parse_group(pattern: &str, body: &str) -> Result<Segment> {
    if let Some((start, end)) = body.split_once("..") {
        return parse_range(pattern, start, end);
    }

    let items: Vec<String> = body.split(',').map(str::to_string).collect();
    if items.iter().any(String::is_empty) {
        return Err(malformed(pattern, format!("empty alternative in '{{{}}}'", body)));
    }
    Ok(Segment::Alternatives(items))
}

fn parse_range(pattern: &str, start: &str, end: &str) -> Result<Segment> {
    let parse = |bound: &str| {
        bound
            .parse::<i64>()
            .map_err(|_| malformed(pattern, format!("range bound '{}' is not an integer", bound)))
    };
    let lo = parse(start)?;
    let hi = parse(end)?;

    let count = range_len(lo, hi);
    if count > MAX_EXPANSION {
        return Err(malformed(pattern, format!("range expands to {} items", count)));
    }

    // A leading zero on either bound pads every item to the wider bound
    let padded = |bound: &str| {
        let digits = bound.trim_start_matches('-');
        digits.len() > 1 && digits.starts_with('0')
    };
    let width = if padded(start) || padded(end) {
        start.len().max(end.len())
    } else {
        0
    };

    Ok(Segment::Range {
        start: lo,
        end: hi,
        width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_range() {
        let urls = expand_pattern("gs://bucket/train.{1..3}-of-3.jsonl.gz").unwrap();
        assert_eq!(
            urls,
            vec![
                "gs://bucket/train.1-of-3.jsonl.gz",
                "gs://bucket/train.2-of-3.jsonl.gz",
                "gs://bucket/train.3-of-3.jsonl.gz",
            ]
        );
    }

    #[test]
    fn test_zero_padded_range() {
        let urls = expand_pattern("shard-{08..11}").unwrap();
        assert_eq!(urls, vec!["shard-08", "shard-09", "shard-10", "shard-11"]);

        let urls = expand_pattern("shard-{001..128}").unwrap();
        assert_eq!(urls.len(), 128);
        assert_eq!(urls[0], "shard-001");
        assert_eq!(urls[127], "shard-128");
    }

    #[test]
    fn test_descending_range() {
        let urls = expand_pattern("s{3..1}").unwrap();
        assert_eq!(urls, vec!["s3", "s2", "s1"]);
    }

    #[test]
    fn test_alternatives_and_product_order() {
        let urls = expand_pattern("s3://b/{train,val}-{1..2}.json").unwrap();
        assert_eq!(
            urls,
            vec![
                "s3://b/train-1.json",
                "s3://b/train-2.json",
                "s3://b/val-1.json",
                "s3://b/val-2.json",
            ]
        );
    }

    #[test]
    fn test_plain_pattern_is_single_url() {
        let urls = expand_pattern("data/train.jsonl").unwrap();
        assert_eq!(urls, vec!["data/train.jsonl"]);
    }

    #[test]
    fn test_malformed_patterns() {
        for bad in [
            "",
            "gs://bucket/a{1..3",
            "gs://bucket/a}1",
            "gs://bucket/{}",
            "gs://bucket/{a,{b,c}}",
            "gs://bucket/{a..z}",
            "gs://bucket/{a,,b}",
            "ftp://host/file",
            "gs://",
            "gs://bucket/with space",
        ] {
            assert!(
                matches!(validate_pattern(bad), Err(ConfigError::ShardPattern { .. })),
                "pattern {:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_expansion_limit() {
        let err = expand_pattern("x{1..1000}{1..1000}{1..2}").unwrap_err();
        assert!(matches!(err, ConfigError::ShardPattern { .. }));
    }

    #[test]
    fn test_many_large_ranges_rejected_before_expansion() {
        let pattern = format!("gs://bucket/{}", "x{1..1000000}".repeat(50));
        let err = validate_pattern(&pattern).unwrap_err();
        assert!(matches!(err, ConfigError::ShardPattern { .. }));
        assert!(expand_pattern(&pattern).is_err());
    }

    #[test]
    fn test_single_item_group_is_literal() {
        assert_eq!(expand_pattern("a{b}c").unwrap(), vec!["a{b}c"]);
        assert_eq!(
            expand_pattern("gs://b/{x}-{1..2}").unwrap(),
            vec!["gs://b/{x}-1", "gs://b/{x}-2"]
        );
        assert!(validate_pattern("a{b}}").is_err());
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("gs://bucket/x"));
        assert!(is_remote("https://host/x"));
        assert!(!is_remote("file:///tmp/x"));
        assert!(!is_remote("cache/"));
    }
}
