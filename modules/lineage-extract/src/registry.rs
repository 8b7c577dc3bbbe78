//! Source registry: one descriptor per remote source, each carrying its
//! access model, URL template, and extractor implementation.

use lineage_common::{CandidateRecord, Payload, Query};
use tracing::warn;

use crate::extractors;

/// How a source is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessModel {
    /// GET a formatted URL, scrape the rendered page.
    UrlTemplate,
    /// As UrlTemplate, with an alternate template when a location resolves.
    UrlTemplateWithLocation,
    /// Direct HTTP API returning JSON.
    JsonApi,
    /// Requires filling and submitting a search form in the browser.
    FormSubmit,
    /// URL is composed through the gazetteer.
    LocationResolver,
}

/// Fixture query parameters for offline extractor checks.
#[derive(Debug, Clone, Copy)]
pub struct TestParams {
    pub surname: &'static str,
    pub given_name: &'static str,
    pub birth_year: i32,
}

impl TestParams {
    pub fn to_query(&self) -> Query {
        Query {
            surname: self.surname.to_string(),
            given_name: self.given_name.to_string(),
            birth_year: Some(self.birth_year),
            birth_year_end: None,
            location: None,
            country: None,
            region: None,
            is_estimated_year: false,
        }
    }
}

/// Extractor contract. Implementations are pure: bytes + query in,
/// records out. Absence of results is `vec![]`, never an error, and
/// missing optional fields stay `None`.
pub trait RecordExtractor: Send + Sync {
    /// Parse candidate records out of raw content. At most ~20 records
    /// (first page); every record has a usable name and a score set via
    /// the shared scorer.
    fn extract(&self, payload: &Payload, query: &Query) -> Vec<CandidateRecord>;

    /// Whether the raw content looks like it contains results, per the
    /// source's own indicator allow-list. Drives the fallback sentinel.
    fn has_results_indicator(&self, payload: &Payload) -> bool;
}

pub struct Source {
    pub key: &'static str,
    pub display_name: &'static str,
    pub access_model: AccessModel,
    pub url_template: Option<&'static str>,
    pub url_template_with_location: Option<&'static str>,
    pub wait_for_selector: Option<&'static str>,
    /// When true, `url_template_with_location` must be present.
    pub location_filter_effective: bool,
    pub disabled: bool,
    pub test_fixture: &'static str,
    pub test_params: TestParams,
    pub extractor: Box<dyn RecordExtractor>,
}

/// Fill a URL template from the query. Recognized markers:
/// `{surname}`, `{given_name}`, `{birth_year}`, `{birth_year_end}`,
/// `{location}`.
pub fn fill_template(template: &str, query: &Query) -> String {
    let birth_year = query.birth_year.map(|y| y.to_string()).unwrap_or_default();
    let birth_year_end = query.birth_year_end().map(|y| y.to_string()).unwrap_or_default();
    template
        .replace("{surname}", &query.surname)
        .replace("{given_name}", &query.given_name)
        .replace("{birth_year}", &birth_year)
        .replace("{birth_year_end}", &birth_year_end)
        .replace("{location}", query.location.as_deref().unwrap_or(""))
}

/// Run an extractor with graceful degradation: a page that plainly holds
/// results but yields zero records stages a PARSE_FAILED sentinel, and a
/// panicking parser stages PARSE_ERROR, so regressions are visible in
/// review instead of silently reading as "no match".
pub fn extract_with_fallback(
    source: &Source,
    payload: &Payload,
    query: &Query,
    url: Option<&str>,
) -> Vec<CandidateRecord> {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        source.extractor.extract(payload, query)
    }));

    match result {
        Ok(records) => {
            if records.is_empty() && source.extractor.has_results_indicator(payload) {
                warn!(source = source.key, "Parser returned 0 records but page has results");
                return vec![sentinel_record(source.key, "PARSE_FAILED", url)];
            }
            records
        }
        Err(_) => {
            warn!(source = source.key, "Parser panicked");
            vec![sentinel_record(source.key, "PARSE_ERROR", url)]
        }
    }
}

fn sentinel_record(source_key: &str, name: &str, url: Option<&str>) -> CandidateRecord {
    let mut record = CandidateRecord::new(source_key, name.to_string());
    record.url = url.map(String::from);
    // Medium confidence: a human has to look at it.
    record.match_score = 50;
    record
        .raw_data
        .insert("extraction_error".to_string(), serde_json::Value::String(name.to_string()));
    record
}

/// The full source table. Matricula is registered but disabled: its search
/// surface is a location-based parish register browser, not name-searchable.
pub fn registry() -> Vec<Source> {
    vec![
        Source {
            key: "findagrave",
            display_name: "Find A Grave",
            access_model: AccessModel::UrlTemplate,
            url_template: Some("https://www.findagrave.com/memorial/search?firstname={given_name}&lastname={surname}&birthyear={birth_year}&birthyearfilter=5"),
            url_template_with_location: None,
            wait_for_selector: None,
            location_filter_effective: false,
            disabled: false,
            test_fixture: "tests/fixtures/findagrave_johnson_mary.html",
            test_params: TestParams { surname: "Johnson", given_name: "Mary", birth_year: 1870 },
            extractor: Box::new(extractors::findagrave::FindAGraveExtractor),
        },
        Source {
            key: "geneanet",
            display_name: "Geneanet",
            access_model: AccessModel::UrlTemplateWithLocation,
            url_template: Some("https://en.geneanet.org/fonds/individus/?nom={surname}&prenom={given_name}&type_periode=birth_between&from={birth_year}&to={birth_year_end}&go=1&size=20"),
            url_template_with_location: Some("https://en.geneanet.org/fonds/individus/?nom={surname}&prenom={given_name}&type_periode=birth_between&from={birth_year}&to={birth_year_end}&lieu={location}&go=1&size=20"),
            wait_for_selector: None,
            location_filter_effective: true,
            disabled: false,
            test_fixture: "tests/fixtures/geneanet_dubois_marie.html",
            test_params: TestParams { surname: "Dubois", given_name: "Marie", birth_year: 1880 },
            extractor: Box::new(extractors::geneanet::GeneanetExtractor),
        },
        Source {
            key: "antenati",
            display_name: "Antenati",
            access_model: AccessModel::UrlTemplate,
            url_template: Some("https://antenati.cultura.gov.it/search-nominative/?cognome={surname}&nome={given_name}"),
            url_template_with_location: None,
            wait_for_selector: None,
            location_filter_effective: false,
            disabled: false,
            test_fixture: "tests/fixtures/antenati_milanese_nominative.html",
            test_params: TestParams { surname: "Milanese", given_name: "Giovanni", birth_year: 1885 },
            extractor: Box::new(extractors::antenati::AntenatiExtractor),
        },
        Source {
            key: "familysearch",
            display_name: "FamilySearch",
            access_model: AccessModel::UrlTemplate,
            url_template: Some("https://www.familysearch.org/en/search/record/results?q.givenName={given_name}&q.surname={surname}&q.birthLikeDate={birth_year}"),
            url_template_with_location: None,
            wait_for_selector: Some("tr[data-testid*=\"/ark:/\"]"),
            location_filter_effective: false,
            disabled: false,
            test_fixture: "tests/fixtures/familysearch_anderson_margaret.html",
            test_params: TestParams { surname: "Anderson", given_name: "Margaret", birth_year: 1880 },
            extractor: Box::new(extractors::familysearch::FamilySearchExtractor),
        },
        Source {
            key: "wikitree",
            display_name: "WikiTree",
            access_model: AccessModel::JsonApi,
            url_template: None,
            url_template_with_location: None,
            wait_for_selector: None,
            location_filter_effective: false,
            disabled: false,
            test_fixture: "tests/fixtures/wikitree_smith_john_api.json",
            test_params: TestParams { surname: "Smith", given_name: "John", birth_year: 1880 },
            extractor: Box::new(extractors::wikitree::WikiTreeExtractor),
        },
        Source {
            key: "ancestry",
            display_name: "Ancestry",
            access_model: AccessModel::UrlTemplate,
            url_template: Some("https://www.ancestry.com/search/?name={given_name}_{surname}&birth={birth_year}-{birth_year_end}"),
            url_template_with_location: None,
            wait_for_selector: None,
            location_filter_effective: false,
            disabled: false,
            test_fixture: "tests/fixtures/ancestry_smith_john.html",
            test_params: TestParams { surname: "Smith", given_name: "John", birth_year: 1880 },
            extractor: Box::new(extractors::ancestry::AncestryExtractor),
        },
        Source {
            key: "myheritage",
            display_name: "MyHeritage",
            access_model: AccessModel::UrlTemplate,
            url_template: Some("https://www.myheritage.com/research?action=query&formId=master&formMode=1&qname=Name+fn.{given_name}+fnmo.2+fnmsvos.1+fnmsmi.1+ln.{surname}+lnmo.4+lnmsdm.1+lnmsmf3.1&qevents-event1=Event+et.birth+ey.{birth_year}+epmo.similar&useTranslation=1"),
            url_template_with_location: None,
            wait_for_selector: Some(".search_results_list"),
            location_filter_effective: false,
            disabled: false,
            test_fixture: "tests/fixtures/myheritage_smith_john.html",
            test_params: TestParams { surname: "Smith", given_name: "John", birth_year: 1880 },
            extractor: Box::new(extractors::myheritage::MyHeritageExtractor),
        },
        Source {
            key: "filae",
            display_name: "Filae",
            access_model: AccessModel::LocationResolver,
            // URL is composed by the gazetteer, not from a template.
            url_template: None,
            url_template_with_location: None,
            wait_for_selector: None,
            location_filter_effective: false,
            disabled: false,
            test_fixture: "tests/fixtures/filae_sample.html",
            test_params: TestParams { surname: "Dubois", given_name: "Marie", birth_year: 1875 },
            extractor: Box::new(extractors::filae::FilaeExtractor),
        },
        Source {
            key: "geni",
            display_name: "Geni",
            access_model: AccessModel::UrlTemplate,
            url_template: Some("https://www.geni.com/search?search_type=people&names={given_name}+{surname}"),
            url_template_with_location: None,
            wait_for_selector: None,
            location_filter_effective: false,
            disabled: false,
            test_fixture: "tests/fixtures/geni_sample.html",
            test_params: TestParams { surname: "Smith", given_name: "John", birth_year: 1880 },
            extractor: Box::new(extractors::geni::GeniExtractor),
        },
        Source {
            key: "freebmd",
            display_name: "FreeBMD",
            access_model: AccessModel::FormSubmit,
            url_template: None,
            url_template_with_location: None,
            wait_for_selector: None,
            location_filter_effective: false,
            disabled: false,
            test_fixture: "tests/fixtures/freebmd_smith_john.html",
            test_params: TestParams { surname: "Smith", given_name: "John", birth_year: 1880 },
            extractor: Box::new(extractors::freebmd::FreeBmdExtractor),
        },
        Source {
            key: "matchid",
            display_name: "MatchID",
            access_model: AccessModel::JsonApi,
            url_template: None,
            url_template_with_location: None,
            wait_for_selector: None,
            location_filter_effective: false,
            disabled: false,
            test_fixture: "tests/fixtures/matchid_sample.json",
            test_params: TestParams { surname: "Dupont", given_name: "Marie", birth_year: 1920 },
            extractor: Box::new(extractors::matchid::MatchIdExtractor),
        },
        Source {
            key: "billiongraves",
            display_name: "BillionGraves",
            access_model: AccessModel::UrlTemplate,
            url_template: Some("https://billiongraves.com/site/search/results?given_names={given_name}&family_names={surname}&year={birth_year}&year_range=5"),
            url_template_with_location: None,
            wait_for_selector: None,
            location_filter_effective: false,
            disabled: false,
            test_fixture: "tests/fixtures/billiongraves_sample.html",
            test_params: TestParams { surname: "Smith", given_name: "John", birth_year: 1880 },
            extractor: Box::new(extractors::billiongraves::BillionGravesExtractor),
        },
        Source {
            key: "digitalarkivet",
            display_name: "Digitalarkivet",
            access_model: AccessModel::UrlTemplate,
            url_template: Some("https://www.digitalarkivet.no/en/search/persons?fornavn={given_name}&etternavn={surname}&fodtfra={birth_year}&fodttil={birth_year_end}"),
            url_template_with_location: None,
            wait_for_selector: None,
            location_filter_effective: false,
            disabled: false,
            test_fixture: "tests/fixtures/digitalarkivet_sample.html",
            test_params: TestParams { surname: "Hansen", given_name: "Ole", birth_year: 1850 },
            extractor: Box::new(extractors::digitalarkivet::DigitalarkivetExtractor),
        },
        Source {
            key: "irishgenealogy",
            display_name: "IrishGenealogy.ie",
            access_model: AccessModel::UrlTemplate,
            url_template: Some("https://www.irishgenealogy.ie/en/civil-records/search-civil-records?surname={surname}&firstname={given_name}&yearfrom={birth_year}&yearto={birth_year_end}"),
            url_template_with_location: None,
            wait_for_selector: None,
            location_filter_effective: false,
            disabled: false,
            test_fixture: "tests/fixtures/irishgenealogy_sample.html",
            test_params: TestParams { surname: "O'Brien", given_name: "Patrick", birth_year: 1870 },
            extractor: Box::new(extractors::irishgenealogy::IrishGenealogyExtractor),
        },
        Source {
            key: "matricula",
            display_name: "Matricula",
            access_model: AccessModel::UrlTemplate,
            url_template: None,
            url_template_with_location: None,
            wait_for_selector: None,
            location_filter_effective: false,
            // Location-based parish register browser, not name-searchable.
            disabled: true,
            test_fixture: "tests/fixtures/matricula_sample.html",
            test_params: TestParams { surname: "Mueller", given_name: "Johann", birth_year: 1850 },
            extractor: Box::new(extractors::matricula::MatriculaExtractor),
        },
        Source {
            key: "scotlandspeople",
            display_name: "ScotlandsPeople",
            access_model: AccessModel::UrlTemplate,
            url_template: Some("https://www.scotlandspeople.gov.uk/record-results?surname={surname}&forename={given_name}&from_year={birth_year}&to_year={birth_year_end}"),
            url_template_with_location: None,
            wait_for_selector: None,
            location_filter_effective: false,
            disabled: false,
            test_fixture: "tests/fixtures/scotlandspeople_sample.html",
            test_params: TestParams { surname: "MacDonald", given_name: "James", birth_year: 1860 },
            extractor: Box::new(extractors::scotlandspeople::ScotlandsPeopleExtractor),
        },
        Source {
            key: "anom",
            display_name: "ANOM",
            access_model: AccessModel::UrlTemplate,
            url_template: Some("https://recherche-anom.culture.gouv.fr/archive/resultats/basebagne/n:174?RECH_nom={surname}&RECH_prenom={given_name}&type=basebagne"),
            url_template_with_location: None,
            wait_for_selector: None,
            location_filter_effective: false,
            disabled: false,
            test_fixture: "tests/fixtures/anom_sample.html",
            test_params: TestParams { surname: "Martin", given_name: "Jean", birth_year: 1850 },
            extractor: Box::new(extractors::anom::AnomExtractor),
        },
    ]
}

/// Keys of sources the orchestrator may search, in registry order.
pub fn active_keys(sources: &[Source]) -> Vec<String> {
    sources.iter().filter(|s| !s.disabled).map(|s| s.key.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_keys_are_unique() {
        let sources = registry();
        let mut keys: Vec<_> = sources.iter().map(|s| s.key).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), sources.len());
    }

    #[test]
    fn location_effective_sources_carry_location_template() {
        for source in registry() {
            if source.location_filter_effective {
                assert!(
                    source.url_template_with_location.is_some(),
                    "{} is location-effective but has no location template",
                    source.key
                );
            }
        }
    }

    #[test]
    fn template_free_access_models_carry_no_template() {
        // These access models build their requests elsewhere (gazetteer,
        // API params, form plan); a template here would be dead weight
        // that drifts from the real URL builder.
        for source in registry() {
            if matches!(
                source.access_model,
                AccessModel::LocationResolver | AccessModel::JsonApi | AccessModel::FormSubmit
            ) {
                assert!(
                    source.url_template.is_none(),
                    "{} does not use url_template but carries one",
                    source.key
                );
            }
        }
    }

    #[test]
    fn matricula_is_disabled() {
        let sources = registry();
        let matricula = sources.iter().find(|s| s.key == "matricula").unwrap();
        assert!(matricula.disabled);
        assert!(!active_keys(&sources).contains(&"matricula".to_string()));
    }

    #[test]
    fn template_filling() {
        let query = Query {
            surname: "Smith".into(),
            given_name: "John".into(),
            birth_year: Some(1880),
            birth_year_end: None,
            location: None,
            country: None,
            region: None,
            is_estimated_year: false,
        };
        let url = fill_template("https://x.test/?ln={surname}&fn={given_name}&from={birth_year}&to={birth_year_end}", &query);
        assert_eq!(url, "https://x.test/?ln=Smith&fn=John&from=1880&to=1890");
    }

    #[test]
    fn fallback_sentinel_on_indicator_mismatch() {
        let sources = registry();
        let geneanet = sources.iter().find(|s| s.key == "geneanet").unwrap();
        // Claims results but contains nothing parseable.
        let payload = Payload::Html("<html><body>152 résultats</body></html>".to_string());
        let query = geneanet.test_params.to_query();
        let records = extract_with_fallback(geneanet, &payload, &query, Some("https://x.test/q"));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "PARSE_FAILED");
        assert_eq!(records[0].match_score, 50);
        assert_eq!(records[0].url.as_deref(), Some("https://x.test/q"));
    }

    #[test]
    fn no_sentinel_on_genuinely_empty_page() {
        let sources = registry();
        let geneanet = sources.iter().find(|s| s.key == "geneanet").unwrap();
        let payload = Payload::Html("<html><body>Aucun résultat</body></html>".to_string());
        let query = geneanet.test_params.to_query();
        let records = extract_with_fallback(geneanet, &payload, &query, None);
        assert!(records.is_empty());
    }
}
