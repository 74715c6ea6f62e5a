// tisdk-common/src/version.rs
//! Loose dotted-version comparison used for SDK release labels and CI build versions.
//!
//! Labels like `7.5.1.GA` or `8.0` are not valid semver, so they are compared on their
//! first three numeric components, with missing components treated as zero.

use std::cmp::Ordering;

/// Pads or truncates a dotted version to between `min` and `max` components after
/// dropping any `-suffix`.
pub fn format(ver: &str, min: usize, max: usize) -> String {
    let ver = ver.split('-').next().unwrap_or("");
    let ver = if ver.is_empty() { "0" } else { ver };
    let mut parts: Vec<&str> = ver.split('.').collect();
    while parts.len() < min {
        parts.push("0");
    }
    parts.truncate(max);
    parts.join(".")
}

fn component(part: &str) -> u64 {
    let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

fn components(ver: &str) -> [u64; 3] {
    let formatted = format(ver, 3, 3);
    let mut out = [0u64; 3];
    for (slot, part) in out.iter_mut().zip(formatted.split('.')) {
        *slot = component(part);
    }
    out
}

/// Ascending comparison.
pub fn compare(a: &str, b: &str) -> Ordering {
    components(a).cmp(&components(b))
}

/// Descending comparison, for "newest first" sorts.
pub fn rcompare(a: &str, b: &str) -> Ordering {
    compare(b, a)
}

/// Strips the general-availability qualifier from a release label (`7.5.1.GA` → `7.5.1`).
pub fn normalize_release_label(label: &str) -> String {
    match label.find(".GA") {
        Some(idx) => label[..idx].to_string(),
        None => label.to_string(),
    }
}
