//! Find A Grave memorial search results.
//!
//! Each hit is a `div.memorial-item` with a `/memorial/{id}` link, the name
//! in an `<i>` inside the heading, a `b.birthDeathDates` span, and the
//! cemetery/location as loose text lines.

use std::sync::LazyLock;

use lineage_common::{CandidateRecord, Payload, Query};
use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::json;

use super::helpers::{first_year, lines_of, sel, text_of, DATE_RANGE_RE};
use super::MAX_RECORDS;
use crate::registry::RecordExtractor;
use crate::score;

static MEMORIAL_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/memorial/(\d+)").unwrap());

const SOURCE_KEY: &str = "findagrave";

const CEMETERY_WORDS: &[&str] = &["Cemetery", "Churchyard", "Memorial", "Gardens", "Burial"];

pub struct FindAGraveExtractor;

impl RecordExtractor for FindAGraveExtractor {
    fn extract(&self, payload: &Payload, query: &Query) -> Vec<CandidateRecord> {
        let Some(html) = payload.as_html() else {
            return Vec::new();
        };
        let document = Html::parse_document(html);

        let mut records = Vec::new();
        for item in document.select(&sel("div.memorial-item")).take(MAX_RECORDS) {
            if let Some(record) = extract_memorial(item, query) {
                records.push(record);
            }
        }
        records
    }

    fn has_results_indicator(&self, payload: &Payload) -> bool {
        let Some(html) = payload.as_html() else {
            return false;
        };
        MEMORIAL_ID_RE.is_match(html) || html.contains("memorial-item")
    }
}

fn extract_memorial(item: ElementRef, query: &Query) -> Option<CandidateRecord> {
    let link = item.select(&sel(r#"a[href*="/memorial/"]"#)).next()?;
    let href = link.value().attr("href")?;
    let url = if href.starts_with("http") {
        href.to_string()
    } else {
        format!("https://www.findagrave.com{href}")
    };
    let memorial_id = MEMORIAL_ID_RE.captures(&url).map(|c| c[1].to_string());

    // Name lives in the <i> inside the heading when present.
    let name = item
        .select(&sel("h2.name-grave i, h2.name-grave, h3 i, h3"))
        .next()
        .map(text_of)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| text_of(link));
    if name.is_empty() {
        return None;
    }

    let item_text = text_of(item);

    let mut birth_year = None;
    let mut death_year = None;
    let mut birth_date = None;
    let mut death_date = None;

    let dates_text = item
        .select(&sel("b.birthDeathDates"))
        .next()
        .map(text_of)
        .unwrap_or_else(|| item_text.clone());
    if let Some(caps) = DATE_RANGE_RE.captures(&dates_text) {
        birth_year = caps[2].parse().ok();
        death_year = caps[4].parse().ok();
        if let Some(day_month) = caps.get(1) {
            birth_date = Some(format!("{} {}", day_month.as_str().trim(), &caps[2]));
        }
        if let Some(day_month) = caps.get(3) {
            death_date = Some(format!("{} {}", day_month.as_str().trim(), &caps[4]));
        }
    } else {
        birth_year = first_year(&item_text);
    }

    // Cemetery line, then the following lines as the location.
    let lines = lines_of(item);
    let mut cemetery = None;
    let mut location = None;
    if let Some(idx) = lines
        .iter()
        .position(|line| CEMETERY_WORDS.iter().any(|word| line.contains(word)))
    {
        cemetery = Some(lines[idx].clone());
        let place: Vec<String> = lines[idx + 1..]
            .iter()
            .take_while(|line| !line.starts_with("Plot"))
            .take(3)
            .cloned()
            .collect();
        if !place.is_empty() {
            location = Some(place.join(", "));
        }
    }

    let photo_url = item
        .select(&sel("img[src]"))
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(String::from);

    let mut record = CandidateRecord::new(SOURCE_KEY, name);
    record.birth_year = birth_year;
    record.birth_date = birth_date;
    record.death_year = death_year;
    record.death_date = death_date;
    record.birth_place = location.clone();
    record.url = Some(url);
    record.raw_data.insert("memorial_id".into(), json!(memorial_id));
    record.raw_data.insert("cemetery".into(), json!(cemetery));
    record.raw_data.insert("photo_url".into(), json!(photo_url));
    record.match_score = score::score(&record, query);
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> Query {
        Query {
            surname: "Johnson".into(),
            given_name: "Mary".into(),
            birth_year: Some(1870),
            birth_year_end: None,
            location: None,
            country: None,
            region: None,
            is_estimated_year: false,
        }
    }

    const SAMPLE: &str = r#"
    <html><body>
      <div class="memorial-item">
        <a href="/memorial/12345678/mary-johnson">
          <h2 class="name-grave"><i>Mary Elizabeth Johnson</i></h2>
        </a>
        <b class="birthDeathDates">15 Aug 1871 &#8211; 25 Oct 1899</b>
        <p>Oakwood Cemetery</p>
        <p>Syracuse</p>
        <p>New York, USA</p>
      </div>
      <div class="memorial-item">
        <a href="/memorial/555/j-johnson"><h3><i>J. Johnson</i></h3></a>
        <b class="birthDeathDates">1879 &#8211; 1968</b>
      </div>
    </body></html>"#;

    #[test]
    fn extracts_memorials() {
        let records = FindAGraveExtractor.extract(&Payload::Html(SAMPLE.into()), &query());
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.name, "Mary Elizabeth Johnson");
        assert_eq!(first.birth_year, Some(1871));
        assert_eq!(first.death_year, Some(1899));
        assert_eq!(first.birth_date.as_deref(), Some("15 Aug 1871"));
        assert!(first.url.as_deref().unwrap().contains("/memorial/12345678"));
        assert!(first.match_score > 50);

        assert_eq!(records[1].birth_year, Some(1879));
        assert!(records[1].birth_date.is_none());
    }

    #[test]
    fn empty_page_yields_nothing() {
        let records =
            FindAGraveExtractor.extract(&Payload::Html("<html></html>".into()), &query());
        assert!(records.is_empty());
        assert!(!FindAGraveExtractor.has_results_indicator(&Payload::Html("<html></html>".into())));
    }

    #[test]
    fn indicator_sees_memorial_links() {
        let payload = Payload::Html("<a href=\"/memorial/99\">x</a>".into());
        assert!(FindAGraveExtractor.has_results_indicator(&payload));
    }
}
