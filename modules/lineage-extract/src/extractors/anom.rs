//! ANOM (Archives Nationales d'Outre-Mer).
//!
//! Two name-searchable databases share one extractor:
//! - Bagne (penal colony dossiers): `tr.type-notice-…` rows with the name
//!   in `span.unittitle`, labelled `div.items` fields, and an ark link.
//! - Military matricules: `tr.pair`/`tr.impair` rows with an `onclick`
//!   viewer URL and birth info in the row's `title` attribute.

use std::sync::LazyLock;

use lineage_common::{CandidateRecord, Payload, Query};
use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::json;

use super::helpers::{sel, text_of};
use super::MAX_RECORDS;
use crate::registry::RecordExtractor;
use crate::score;

const SOURCE_KEY: &str = "anom";
const BASE_URL: &str = "https://recherche-anom.culture.gouv.fr";
const MILITARY_URL: &str = "http://anom.archivesnationales.culture.gouv.fr/regmatmil";

static ARK_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"ark:/61561/(\d+)").unwrap());
static OSD_CLEF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"osd\.php\?clef=([^'"]+)"#).unwrap());
static BIRTH_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Date de naissance\s*:\s*(\d{4})-(\d{2})-(\d{2})").unwrap());
static BIRTH_DEPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"territoire de naissance\s*:\s*(.+)").unwrap());
static CONDEMNED_YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{4})").unwrap());
static DEATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Décédée?\s+le\s+(\d{1,2}\s+\w+\s+(\d{4}))").unwrap());
static INDICATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d+\s+réponses?|\d+\s+résultats?|ark:/61561/|type-notice|inventaires?").unwrap()
});

pub struct AnomExtractor;

impl RecordExtractor for AnomExtractor {
    fn extract(&self, payload: &Payload, query: &Query) -> Vec<CandidateRecord> {
        let Some(html) = payload.as_html() else {
            return Vec::new();
        };
        let document = Html::parse_document(html);

        // Bagne first: bagne pages may mention the military site in chrome.
        let mut records = extract_bagne(&document, query);
        if records.is_empty() {
            records = extract_military(&document, query);
        }
        records
    }

    fn has_results_indicator(&self, payload: &Payload) -> bool {
        payload.as_html().map(|html| INDICATOR_RE.is_match(html)).unwrap_or(false)
    }
}

fn extract_bagne(document: &Html, query: &Query) -> Vec<CandidateRecord> {
    let mut records = Vec::new();
    for row in document.select(&sel(r#"tr[class*="type-notice"]"#)).take(MAX_RECORDS) {
        if let Some(record) = extract_bagne_row(row, query) {
            records.push(record);
        }
    }
    records
}

fn extract_bagne_row(row: ElementRef, query: &Query) -> Option<CandidateRecord> {
    let name = row.select(&sel("span.unittitle")).next().map(text_of).filter(|n| !n.is_empty())?;

    // Several ark links per row; only the numeric dossier id is wanted.
    let mut ark_id = None;
    let mut url = None;
    for link in row.select(&sel(r#"a[href*="/ark:/"]"#)) {
        let Some(href) = link.value().attr("href") else { continue };
        if let Some(caps) = ARK_ID_RE.captures(href) {
            ark_id = Some(caps[1].to_string());
            url = Some(format!("{BASE_URL}/ark:/61561/{}", &caps[1]));
            break;
        }
    }

    // Labelled dossier fields: "Cote du dossier :", "Condamné en :", …
    let mut fields: Vec<(String, String)> = Vec::new();
    for item in row.select(&sel("div.items")) {
        let Some(label) = item.select(&sel("strong.arc_libelle_strong")).next() else {
            continue;
        };
        let key = text_of(label)
            .replace('\u{a0}', " ")
            .trim_end_matches([' ', ':'])
            .to_string();

        let value = match item.select(&sel("p.arc_firstp")).next() {
            Some(p) => text_of(p),
            None => {
                let full = text_of(item);
                let stripped = full
                    .strip_prefix(&format!("{key} :"))
                    .or_else(|| full.strip_prefix(&format!("{key}:")))
                    .unwrap_or(&full);
                stripped.trim().to_string()
            }
        };
        fields.push((key, value));
    }
    let field = |key: &str| fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());

    let condemnation_year = field("Condamné en")
        .and_then(|v| CONDEMNED_YEAR_RE.captures(v))
        .and_then(|c| c[1].parse::<i32>().ok());

    let observations = field("Observations complémentaires").unwrap_or("");
    let mut death_year = None;
    let mut death_date = None;
    if let Some(caps) = DEATH_RE.captures(observations) {
        death_date = Some(caps[1].to_string());
        death_year = caps[2].parse().ok();
    }

    let image_url = row
        .select(&sel("img[src]"))
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(String::from);

    let mut record = CandidateRecord::new(SOURCE_KEY, name);
    record.death_year = death_year;
    record.death_date = death_date;
    record.url = url;
    let raw = &mut record.raw_data;
    raw.insert("database".into(), json!("bagne"));
    raw.insert("ark_id".into(), json!(ark_id));
    raw.insert("condemnation_year".into(), json!(condemnation_year));
    raw.insert(
        "territory".into(),
        json!(field("Territoire de détention").map(|t| t.trim_end_matches('.').to_string())),
    );
    raw.insert("cote".into(), json!(field("Cote du dossier")));
    raw.insert("matricule".into(), json!(field("Numéro de matricule")));
    raw.insert("sex".into(), json!(field("Sexe")));
    raw.insert("jurisdiction".into(), json!(field("Juridiction de condamnation")));
    raw.insert("observations".into(), json!(observations));
    raw.insert("image_url".into(), json!(image_url));
    record.match_score = score::score(&record, query);
    Some(record)
}

fn extract_military(document: &Html, query: &Query) -> Vec<CandidateRecord> {
    let mut records = Vec::new();
    for row in document.select(&sel("tr.pair[onclick], tr.impair[onclick]")) {
        if records.len() >= MAX_RECORDS {
            break;
        }
        if let Some(record) = extract_military_row(row, query) {
            records.push(record);
        }
    }
    records
}

fn extract_military_row(row: ElementRef, query: &Query) -> Option<CandidateRecord> {
    let onclick = row.value().attr("onclick").unwrap_or("");
    let detail_url = OSD_CLEF_RE
        .captures(onclick)
        .map(|caps| format!("{MILITARY_URL}/osd.php?clef={}", &caps[1]));

    // The row tooltip carries "Date de naissance : 1860-02-20" and
    // "Département / territoire de naissance : Alger".
    let title = row.value().attr("title").unwrap_or("");
    let mut birth_year = None;
    let mut birth_date = None;
    if let Some(caps) = BIRTH_DATE_RE.captures(title) {
        birth_year = caps[1].parse().ok();
        birth_date = Some(format!("{}-{}-{}", &caps[1], &caps[2], &caps[3]));
    }
    let birth_dept = BIRTH_DEPT_RE
        .captures(title)
        .map(|caps| caps[1].trim().to_string());

    let cells: Vec<String> = row.select(&sel("td")).map(text_of).collect();
    if cells.len() < 6 {
        return None;
    }
    // Cells: number, access icon, nom, prénoms, classe, matricule, territoire, bureau.
    let surname = cells.get(2).filter(|s| !s.is_empty())?;
    let given_names = cells.get(3).cloned().unwrap_or_default();

    let name = if given_names.is_empty() {
        surname.clone()
    } else {
        format!("{surname}, {given_names}")
    };

    let mut record = CandidateRecord::new(SOURCE_KEY, name);
    record.birth_year = birth_year;
    record.birth_date = birth_date;
    record.birth_place = birth_dept.clone();
    record.url = detail_url;
    let raw = &mut record.raw_data;
    raw.insert("database".into(), json!("military_matricules"));
    raw.insert("surname".into(), json!(surname));
    raw.insert("given_names".into(), json!(given_names));
    raw.insert("birth_department".into(), json!(birth_dept));
    raw.insert(
        "recruitment_class".into(),
        json!(cells.get(4).and_then(|c| c.parse::<i32>().ok())),
    );
    raw.insert("matricule".into(), json!(cells.get(5)));
    raw.insert("territory".into(), json!(cells.get(6)));
    raw.insert("recruitment_bureau".into(), json!(cells.get(7)));
    record.match_score = score::score(&record, query);
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> Query {
        Query {
            surname: "Martin".into(),
            given_name: "Jean".into(),
            birth_year: Some(1850),
            birth_year_end: None,
            location: None,
            country: None,
            region: None,
            is_estimated_year: false,
        }
    }

    const BAGNE_SAMPLE: &str = r#"
    <table><tr class="arc_impair type-notice-basebagne">
      <td>
        <span class="unittitle">MARTIN, Jean</span>
        <a href="/ark:/61561/up424dqjldl">dossier</a>
        <a href="/ark:/61561/998877">dossier</a>
        <div class="items">
          <strong class="arc_libelle_strong">Condamné en&nbsp;:</strong>
          <p class="arc_firstp">1872 par le Conseil de guerre</p>
        </div>
        <div class="items">
          <strong class="arc_libelle_strong">Territoire de détention&nbsp;:</strong>
          <p class="arc_firstp">Nouvelle-Calédonie.</p>
        </div>
        <div class="items">
          <strong class="arc_libelle_strong">Observations complémentaires&nbsp;:</strong>
          <p class="arc_firstp">Décédé le 3 mai 1889 à Nouméa</p>
        </div>
      </td>
    </tr></table>"#;

    #[test]
    fn extracts_bagne_dossier() {
        let records = AnomExtractor.extract(&Payload::Html(BAGNE_SAMPLE.into()), &query());
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.name, "MARTIN, Jean");
        assert_eq!(r.death_year, Some(1889));
        assert_eq!(r.death_date.as_deref(), Some("3 mai 1889"));
        assert_eq!(r.raw_data["condemnation_year"], 1872);
        assert_eq!(r.raw_data["territory"], "Nouvelle-Calédonie");
        assert_eq!(r.url.as_deref(), Some("https://recherche-anom.culture.gouv.fr/ark:/61561/998877"));
    }

    const MILITARY_SAMPLE: &str = r#"
    <table>
      <tr class="pair" onclick="window.open('osd.php?clef=ABC123')"
          title="Date de naissance : 1850-02-20&#10;Département / territoire de naissance : Alger">
        <td>1</td><td></td><td>MARTIN</td><td>Jean Baptiste</td>
        <td>1870</td><td>4521</td><td>Algérie</td><td>Alger</td>
      </tr>
    </table>"#;

    #[test]
    fn extracts_military_matricule() {
        let records = AnomExtractor.extract(&Payload::Html(MILITARY_SAMPLE.into()), &query());
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.name, "MARTIN, Jean Baptiste");
        assert_eq!(r.birth_year, Some(1850));
        assert_eq!(r.birth_place.as_deref(), Some("Alger"));
        assert_eq!(r.raw_data["matricule"], "4521");
        assert!(r.url.as_deref().unwrap().contains("osd.php?clef=ABC123"));
    }

    #[test]
    fn indicator_sees_ark_and_counts() {
        assert!(AnomExtractor.has_results_indicator(&Payload::Html("12 réponses".into())));
        assert!(AnomExtractor.has_results_indicator(&Payload::Html("ark:/61561/5".into())));
        assert!(!AnomExtractor.has_results_indicator(&Payload::Html("<p>rien</p>".into())));
    }
}
