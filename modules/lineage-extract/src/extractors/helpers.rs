//! Small parsing helpers shared across extractors.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Plausible record years: 1500–2099.
pub static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(1[5-9]\d{2}|20\d{2})\b").unwrap());

/// Year pair like "15 Aug 1871 – 25 Oct 1899" or "1879 - 1968".
pub static DATE_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2}\s+\w+\s+)?(\d{4})\s*[–-]\s*(\d{1,2}\s+\w+\s+)?(\d{4})").unwrap()
});

/// Whitespace-collapsed text content of an element.
pub fn text_of(element: ElementRef) -> String {
    let joined: String = element.text().collect::<Vec<_>>().join(" ");
    collapse_ws(&joined)
}

/// Text content as trimmed, non-empty lines (one per text node).
pub fn lines_of(element: ElementRef) -> Vec<String> {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

pub fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn first_year(text: &str) -> Option<i32> {
    YEAR_RE.find(text).and_then(|m| m.as_str().parse().ok())
}

pub fn all_years(text: &str) -> Vec<i32> {
    YEAR_RE.find_iter(text).filter_map(|m| m.as_str().parse().ok()).collect()
}

/// Selector parse for compile-time-known CSS; selectors are constants, so
/// a parse failure is a programmer error.
pub fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

/// Elements whose `class` attribute matches a pattern, optionally limited
/// to certain tags. Stand-in for soup.find_all(class_=re.compile(...)).
pub fn select_by_class_pattern<'a>(
    document: &'a Html,
    tags: &[&str],
    class_pattern: &Regex,
) -> Vec<ElementRef<'a>> {
    let any = sel("*");
    document
        .select(&any)
        .filter(|el| {
            let tag = el.value().name();
            (tags.is_empty() || tags.contains(&tag))
                && el.value().attr("class").map(|c| class_pattern.is_match(c)).unwrap_or(false)
        })
        .collect()
}

/// Minimal percent-decoding for query-string fragments.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = &input[i + 1..i + 3];
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                out.push(b'%');
                i += 1;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_extraction() {
        assert_eq!(first_year("born about 1874 in Kent"), Some(1874));
        assert_eq!(first_year("no year here"), None);
        assert_eq!(all_years("1871 – 1899"), vec![1871, 1899]);
        // Century-only numbers outside the window do not match.
        assert_eq!(first_year("page 1234"), None);
    }

    #[test]
    fn date_range_parsing() {
        let caps = DATE_RANGE_RE.captures("15 Aug 1871 – 25 Oct 1899").unwrap();
        assert_eq!(&caps[2], "1871");
        assert_eq!(&caps[4], "1899");
        assert!(caps.get(1).is_some());

        let caps = DATE_RANGE_RE.captures("1879 - 1968").unwrap();
        assert_eq!(&caps[2], "1879");
        assert!(caps.get(1).is_none());
    }

    #[test]
    fn percent_decoding() {
        assert_eq!(percent_decode("St.%20Pancras"), "St. Pancras");
        assert_eq!(percent_decode("a+b"), "a b");
        assert_eq!(percent_decode("plain"), "plain");
    }
}
