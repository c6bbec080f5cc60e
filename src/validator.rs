// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Line validation applied before a record enters an upload batch

/// Lowest printable ASCII code point (space).
const PRINTABLE_MIN: u32 = 32;
/// Highest printable ASCII code point (tilde).
const PRINTABLE_MAX: u32 = 126;

/// True if any character falls outside the printable ASCII band.
pub fn is_corrupted(line: &str) -> bool {
    line.chars()
        .any(|c| !(PRINTABLE_MIN..=PRINTABLE_MAX).contains(&(c as u32)))
}

/// True for empty or whitespace-only content.
pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Trim a raw line and return it only if it may enter a batch.
///
/// Rejected lines are store corruption, not delivery failures: callers skip
/// them without retrying.
pub fn accept(raw: &str) -> Option<&str> {
    let line = raw.trim();
    if is_blank(line) || is_corrupted(line) {
        None
    } else {
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bell_character_is_corrupted() {
        assert!(is_corrupted("2024-01-01T00:00:00;GPS\u{7};fail"));
        assert!(!is_corrupted("2024-01-01T00:00:00;No position response"));
    }

    #[test]
    fn test_non_ascii_is_corrupted() {
        assert!(is_corrupted("temp 21°C"));
        assert!(is_corrupted("\u{FFFD}garbage"));
        assert!(is_corrupted("tab\tinside"));
    }

    #[test]
    fn test_blank_lines() {
        assert!(is_blank(""));
        assert!(is_blank("   "));
        assert!(is_blank("\t\r\n"));
        assert!(!is_blank(" x "));
    }

    #[test]
    fn test_accept_trims_line_endings() {
        assert_eq!(accept("a;b;c\r\n"), Some("a;b;c"));
        assert_eq!(accept("  \n"), None);
        assert_eq!(accept("a\u{0}b\n"), None);
    }
}
