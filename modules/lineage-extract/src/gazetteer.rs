//! Static gazetteer of French administrative entities, used to turn a free
//! text birthplace into the location parameters some sources expect.
//!
//! Matching works through tiers, first hit wins:
//! 1. historical region alias (pre-2016 region names map to current ones)
//! 2. exact name, case-insensitive
//! 3. normalized equality (accents, leading articles, hyphens stripped)
//! 4. normalized prefix
//! 5. normalized substring

use std::sync::LazyLock;

use lineage_common::Query;
use serde::Deserialize;
use unicode_normalization::UnicodeNormalization;

/// Pre-2016 region names still common in old records.
const REGION_ALIASES: &[(&str, &str)] = &[
    ("alsace", "Grand Est"),
    ("lorraine", "Grand Est"),
    ("champagne-ardenne", "Grand Est"),
    ("champagne", "Grand Est"),
    ("picardie", "Hauts-de-France"),
    ("picardy", "Hauts-de-France"),
    ("nord-pas-de-calais", "Hauts-de-France"),
    ("aquitaine", "Nouvelle-Aquitaine"),
    ("limousin", "Nouvelle-Aquitaine"),
    ("poitou-charentes", "Nouvelle-Aquitaine"),
    ("languedoc-roussillon", "Occitanie"),
    ("midi-pyrénées", "Occitanie"),
    ("midi-pyrenees", "Occitanie"),
    ("auvergne", "Auvergne-Rhône-Alpes"),
    ("rhône-alpes", "Auvergne-Rhône-Alpes"),
    ("rhone-alpes", "Auvergne-Rhône-Alpes"),
    ("bourgogne", "Bourgogne-Franche-Comté"),
    ("burgundy", "Bourgogne-Franche-Comté"),
    ("franche-comté", "Bourgogne-Franche-Comté"),
    ("franche-comte", "Bourgogne-Franche-Comté"),
    ("basse-normandie", "Normandie"),
    ("haute-normandie", "Normandie"),
    ("centre", "Centre-Val de Loire"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    Region,
    Department,
    City,
}

/// One gazetteer row, GeoNames-shaped.
#[derive(Debug, Clone, Deserialize)]
pub struct GazetteerEntry {
    pub gid: i64,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// Feature code: ADM1 = region, ADM2 = department, PPLC/PPLA = city.
    pub fc: String,
    #[serde(rename = "type")]
    pub kind: LocationKind,
    /// Region id, where applicable.
    pub ri: Option<i64>,
    /// Department id, where applicable.
    pub di: Option<i64>,
    pub region: String,
    pub department: String,
    pub population: i64,
}

pub struct Gazetteer {
    locations: Vec<GazetteerEntry>,
}

static GAZETTEER: LazyLock<Gazetteer> = LazyLock::new(|| {
    let data = include_str!("../data/french_locations.json");
    let locations: Vec<GazetteerEntry> =
        serde_json::from_str(data).expect("embedded gazetteer data is valid JSON");
    Gazetteer { locations }
});

impl Gazetteer {
    pub fn shared() -> &'static Gazetteer {
        &GAZETTEER
    }

    /// Resolve a location name. `kind` narrows the search to one entity type.
    pub fn find(&self, query: &str, kind: Option<LocationKind>) -> Option<&GazetteerEntry> {
        let query_lower = query.trim().to_lowercase();
        if query_lower.is_empty() {
            return None;
        }
        let query_norm = normalize(query);

        if let Some((_, current)) = REGION_ALIASES.iter().find(|(alias, _)| *alias == query_lower) {
            if let Some(entry) = self.locations.iter().find(|loc| loc.name == *current) {
                return Some(entry);
            }
        }

        let candidates = || {
            self.locations
                .iter()
                .filter(move |loc| kind.map(|k| loc.kind == k).unwrap_or(true))
        };

        if let Some(entry) = candidates().find(|loc| loc.name.to_lowercase() == query_lower) {
            return Some(entry);
        }
        if let Some(entry) = candidates().find(|loc| normalize(&loc.name) == query_norm) {
            return Some(entry);
        }
        if let Some(entry) = candidates().find(|loc| normalize(&loc.name).starts_with(&query_norm)) {
            return Some(entry);
        }
        candidates().find(|loc| normalize(&loc.name).contains(&query_norm))
    }

    pub fn find_city(&self, name: &str) -> Option<&GazetteerEntry> {
        self.find(name, Some(LocationKind::City))
    }

    pub fn find_department(&self, name: &str) -> Option<&GazetteerEntry> {
        self.find(name, Some(LocationKind::Department))
    }

    pub fn find_region(&self, name: &str) -> Option<&GazetteerEntry> {
        self.find(name, Some(LocationKind::Region))
    }

    /// Compose a Filae search URL, adding location parameters when the
    /// query's location resolves. Cities get a 20 km radius (`pf=2`);
    /// regions and departments search their whole extent (`pf=0`).
    pub fn build_filae_url(&self, query: &Query) -> String {
        let mut params = vec![format!("ln={}", query.surname)];
        if !query.given_name.is_empty() {
            params.push(format!("fn={}", query.given_name));
        }
        if let Some(year) = query.birth_year {
            params.push(format!("sy={year}"));
        }
        if let Some(end) = query.birth_year_end() {
            params.push(format!("ey={end}"));
        }

        if let Some(loc) = query.location.as_deref().and_then(|l| self.find(l, None)) {
            params.push(format!("gid={}", loc.gid));
            params.push(format!("lat={}", loc.lat));
            params.push(format!("lon={}", loc.lon));
            params.push(format!("fc={}", loc.fc));
            if let Some(ri) = loc.ri {
                params.push(format!("ri={ri}"));
            }
            if let Some(di) = loc.di {
                params.push(format!("di={di}"));
            }
            params.push(match loc.kind {
                LocationKind::City => "pf=2".to_string(),
                _ => "pf=0".to_string(),
            });
        }

        format!("https://www.filae.com/search?{}", params.join("&"))
    }
}

/// Accent-fold (NFD, drop combining marks), lowercase, strip leading
/// articles, flatten hyphens.
fn normalize(text: &str) -> String {
    let folded: String = text.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let mut normalized = folded.to_lowercase().trim().to_string();
    for article in ["le ", "la ", "les ", "l'", "de ", "du ", "des ", "d'"] {
        if let Some(rest) = normalized.strip_prefix(article) {
            normalized = rest.to_string();
            break;
        }
    }
    normalized.replace('-', " ").replace("  ", " ")
}

fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036f}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_with_location(location: Option<&str>) -> Query {
        Query {
            surname: "Dubois".into(),
            given_name: "Marie".into(),
            birth_year: Some(1880),
            birth_year_end: Some(1890),
            location: location.map(String::from),
            country: None,
            region: None,
            is_estimated_year: false,
        }
    }

    #[test]
    fn exact_match_wins() {
        let g = Gazetteer::shared();
        let paris = g.find("Paris", None).unwrap();
        assert_eq!(paris.kind, LocationKind::City);
    }

    #[test]
    fn historical_alias_resolves_to_current_region() {
        let g = Gazetteer::shared();
        let region = g.find("Alsace", None).unwrap();
        assert_eq!(region.name, "Grand Est");
        let region = g.find("Burgundy", None).unwrap();
        assert_eq!(region.name, "Bourgogne-Franche-Comté");
    }

    #[test]
    fn normalization_handles_accents_and_articles() {
        let g = Gazetteer::shared();
        assert_eq!(g.find("orleans", None).unwrap().name, "Orléans");
        assert_eq!(g.find("Le Havre", None).unwrap().name, "Le Havre");
        assert_eq!(g.find("havre", None).unwrap().name, "Le Havre");
    }

    #[test]
    fn type_filter_narrows() {
        let g = Gazetteer::shared();
        // "Nord" is both a department and a prefix of cities/regions.
        let dept = g.find_department("Nord").unwrap();
        assert_eq!(dept.kind, LocationKind::Department);
    }

    #[test]
    fn filae_url_city_gets_radius() {
        let g = Gazetteer::shared();
        let url = g.build_filae_url(&query_with_location(Some("Paris")));
        assert!(url.starts_with("https://www.filae.com/search?ln=Dubois&fn=Marie&sy=1880&ey=1890"));
        assert!(url.contains("gid="));
        assert!(url.contains("pf=2"));
    }

    #[test]
    fn filae_url_region_gets_no_radius() {
        let g = Gazetteer::shared();
        let url = g.build_filae_url(&query_with_location(Some("Normandie")));
        assert!(url.contains("pf=0"));
    }

    #[test]
    fn filae_url_without_location_has_no_geo_params() {
        let g = Gazetteer::shared();
        let url = g.build_filae_url(&query_with_location(None));
        assert!(!url.contains("gid="));
        assert!(!url.contains("pf="));
    }

    #[test]
    fn unknown_location_is_none() {
        assert!(Gazetteer::shared().find("Atlantis", None).is_none());
    }
}
