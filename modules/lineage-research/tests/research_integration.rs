//! End-to-end orchestrator scenarios against real extractors and a real
//! (SQLite) store, with the browser and roster mocked out.

use std::sync::Arc;
use std::time::Duration;

use lineage_research::researcher::{Researcher, ResearchOptions};
use lineage_research::testing::{sample_person, MockFetcher, MockRoster};
use lineage_research::{FetchError, RateLimiter};
use lineage_store::{Database, ErrorLog, SearchLog, StagingStore};
use serde_json::json;

const FINDAGRAVE_HTML: &str = r#"
<html><body>
  <div class="memorial-item">
    <a href="/memorial/12345/john-smith"><h3><i>John Smith</i></h3></a>
    <b class="birthDeathDates">1880 &#8211; 1950</b>
  </div>
</body></html>"#;

const GENEANET_HTML: &str = r#"
<html><body>
  <a class="ligne-resultat" href="https://gw.geneanet.org/smith?n=smith&p=john">
    <div class="info-resultat">
      <div class="content-individu"><p class="text-large">SMITH John</p></div>
      <div class="content-periode">
        <p><span class="text-light">Birth</span> <span class="text-large">1880</span></p>
        <p><span class="text-light">Death</span> <span class="text-large">1952</span></p>
      </div>
    </div>
  </a>
</body></html>"#;

// Claims results but nothing the parser recognizes.
const GENEANET_BROKEN_HTML: &str = "<html><body><p>152 r\u{e9}sultats</p></body></html>";

fn wikitree_json() -> serde_json::Value {
    json!([{
        "total": 1,
        "matches": [{
            "Id": 1,
            "Name": "Smith-1",
            "FirstName": "John",
            "LastNameAtBirth": "Smith",
            "BirthDate": "1880-01-01",
            "BirthLocation": "Kent, England"
        }]
    }])
}

struct Harness {
    _dir: tempfile::TempDir,
    db: Arc<Database>,
    search_log: Arc<SearchLog>,
    staging: Arc<StagingStore>,
    fetcher: Arc<MockFetcher>,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(
            Database::open_sqlite(dir.path().join("research.db").to_str().unwrap())
                .await
                .unwrap(),
        );
        let search_log = Arc::new(SearchLog::new(Arc::clone(&db)).await.unwrap());
        let staging = Arc::new(StagingStore::new(Arc::clone(&db)).await.unwrap());
        let fetcher = Arc::new(MockFetcher::new());
        Self { _dir: dir, db, search_log, staging, fetcher }
    }

    /// A fresh researcher over the same durable stores (a new "run").
    fn researcher(&self) -> Researcher {
        let (_tx, rx) = tokio::sync::watch::channel(false);
        let error_log = Arc::new(ErrorLog::open(self._dir.path().join("error_log.json")));
        Researcher::new(
            lineage_extract::registry(),
            Arc::clone(&self.fetcher) as Arc<dyn lineage_research::ContentFetcher>,
            Arc::new(RateLimiter::with_params(Duration::from_millis(1), 5, 2.0)),
            Arc::clone(&self.search_log),
            Arc::clone(&self.staging),
            error_log,
            rx,
        )
    }

    async fn had_error(&self, person_id: &str, source_key: &str) -> Option<bool> {
        self.db
            .fetch_one(
                "SELECT had_error FROM search_log WHERE person_id = ? AND source_key = ?",
                &[
                    lineage_store::SqlValue::Text(person_id.into()),
                    lineage_store::SqlValue::Text(source_key.into()),
                ],
            )
            .await
            .unwrap()
            .and_then(|row| row["had_error"].as_bool())
    }
}

fn opts(sources: &[&str]) -> ResearchOptions {
    ResearchOptions {
        sources: Some(sources.iter().map(|s| s.to_string()).collect()),
        ..ResearchOptions::default()
    }
}

#[tokio::test]
async fn cold_run_happy_path_stages_and_marks() {
    let h = Harness::new().await;
    h.fetcher.respond_html("findagrave", FINDAGRAVE_HTML);
    h.fetcher.respond_html("geneanet", GENEANET_HTML);
    h.fetcher.respond_json("wikitree", wikitree_json());

    let mut roster = MockRoster::new(vec![sample_person("p1", "John", "Smith", Some(1880))]);
    let stats = h
        .researcher()
        .run(&mut roster, &opts(&["findagrave", "geneanet", "wikitree"]))
        .await
        .unwrap();

    assert_eq!(stats.people_processed, 1);
    assert_eq!(stats.people_searched, 1);
    assert_eq!(stats.sources_searched, 3);
    assert!(stats.findings_staged >= 3);
    assert_eq!(stats.errors, 0);

    for source in ["findagrave", "geneanet", "wikitree"] {
        assert!(h.search_log.is_processed("p1", source).await.unwrap(), "{source} not marked");
        assert_eq!(h.had_error("p1", source).await, Some(false));
    }

    let pending = h.staging.get_pending().await.unwrap();
    assert!(pending.len() >= 3);
    assert!(pending.iter().all(|f| f.person_id == "p1"));
    assert!(pending.iter().all(|f| f.match_score >= 80.0));
}

#[tokio::test]
async fn second_run_performs_zero_fetches() {
    let h = Harness::new().await;
    h.fetcher.respond_html("findagrave", FINDAGRAVE_HTML);
    h.fetcher.respond_json("wikitree", wikitree_json());

    let sources = opts(&["findagrave", "wikitree"]);
    let mut roster = MockRoster::new(vec![sample_person("p1", "John", "Smith", Some(1880))]);
    h.researcher().run(&mut roster, &sources).await.unwrap();
    let fetches_after_first = h.fetcher.total_calls();
    assert_eq!(fetches_after_first, 2);

    let mut roster = MockRoster::new(vec![sample_person("p1", "John", "Smith", Some(1880))]);
    let stats = h.researcher().run(&mut roster, &sources).await.unwrap();

    // Dedup is durable: the second run never touches the network.
    assert_eq!(h.fetcher.total_calls(), fetches_after_first);
    assert_eq!(stats.sources_searched, 0);
}

#[tokio::test]
async fn bot_check_is_not_marked_and_retries_next_run() {
    let h = Harness::new().await;
    h.fetcher.respond_html("findagrave", FINDAGRAVE_HTML);
    h.fetcher.fail("ancestry", FetchError::BotCheck { source_name: "Ancestry".into() });

    let sources = opts(&["findagrave", "ancestry"]);
    let mut roster = MockRoster::new(vec![sample_person("p1", "John", "Smith", Some(1880))]);
    let stats = h.researcher().run(&mut roster, &sources).await.unwrap();

    assert_eq!(stats.bot_check_sources, vec!["ancestry".to_string()]);
    assert!(h.search_log.is_processed("p1", "findagrave").await.unwrap());
    assert!(!h.search_log.is_processed("p1", "ancestry").await.unwrap());
    // Bot checks are distinct from daily limits: no session skip.
    assert!(stats.daily_limit_sources.is_empty());

    // Verification not completed: the next run tries ancestry again.
    let mut roster = MockRoster::new(vec![sample_person("p1", "John", "Smith", Some(1880))]);
    h.researcher().run(&mut roster, &sources).await.unwrap();
    assert_eq!(h.fetcher.calls_for("ancestry"), 2);
    // findagrave was processed on the first run and never refetched.
    assert_eq!(h.fetcher.calls_for("findagrave"), 1);
}

#[tokio::test]
async fn daily_limit_skips_rest_of_session_but_not_next_run() {
    let h = Harness::new().await;
    h.fetcher.respond_html("findagrave", FINDAGRAVE_HTML);
    h.fetcher.fail("myheritage", FetchError::DailyLimit { source_name: "MyHeritage".into() });

    let sources = opts(&["findagrave", "myheritage"]);
    let people = || {
        MockRoster::new(vec![
            sample_person("p1", "John", "Smith", Some(1880)),
            sample_person("p2", "Mary", "Smith", Some(1882)),
            sample_person("p3", "Anne", "Smith", Some(1885)),
        ])
    };

    let mut roster = people();
    let stats = h.researcher().run(&mut roster, &sources).await.unwrap();

    // Hit once on p1, then skipped for p2 and p3.
    assert_eq!(h.fetcher.calls_for("myheritage"), 1);
    assert_eq!(h.fetcher.calls_for("findagrave"), 3);
    assert_eq!(stats.daily_limit_sources, vec!["myheritage".to_string()]);
    for person in ["p1", "p2", "p3"] {
        assert!(!h.search_log.is_processed(person, "myheritage").await.unwrap());
        assert!(h.search_log.is_processed(person, "findagrave").await.unwrap());
    }

    // A new run (next day) retries the source for everyone.
    let mut roster = people();
    h.researcher().run(&mut roster, &sources).await.unwrap();
    assert_eq!(h.fetcher.calls_for("myheritage"), 2);
}

#[tokio::test]
async fn parse_regression_stages_sentinel() {
    let h = Harness::new().await;
    h.fetcher.respond_html("geneanet", GENEANET_BROKEN_HTML);

    let mut roster = MockRoster::new(vec![sample_person("p1", "John", "Smith", Some(1880))]);
    h.researcher().run(&mut roster, &opts(&["geneanet"])).await.unwrap();

    let pending = h.staging.get_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    let sentinel = &pending[0];
    assert_eq!(sentinel.extracted_record["name"], "PARSE_FAILED");
    assert_eq!(sentinel.match_score, 50.0);
    assert_eq!(sentinel.source_key, "geneanet");

    // Marked processed so the broken parser is not hammered, with the
    // error recorded.
    assert!(h.search_log.is_processed("p1", "geneanet").await.unwrap());
    assert_eq!(h.had_error("p1", "geneanet").await, Some(true));
}

#[tokio::test]
async fn transport_error_marks_processed_with_error() {
    let h = Harness::new().await;
    h.fetcher.fail("findagrave", FetchError::Other("navigation timeout of 30000ms".into()));

    let mut roster = MockRoster::new(vec![sample_person("p1", "John", "Smith", Some(1880))]);
    let stats = h.researcher().run(&mut roster, &opts(&["findagrave"])).await.unwrap();

    assert_eq!(stats.errors, 1);
    assert!(h.search_log.is_processed("p1", "findagrave").await.unwrap());
    assert_eq!(h.had_error("p1", "findagrave").await, Some(true));
}

#[tokio::test]
async fn ancient_and_surname_less_people_are_never_fetched() {
    let h = Harness::new().await;
    h.fetcher.respond_html("findagrave", FINDAGRAVE_HTML);

    let mut roster = MockRoster::new(vec![
        sample_person("p1", "Eleanor", "Plantagenet", Some(1122)),
        sample_person("p2", "Given", "", Some(1880)),
    ]);
    let stats = h.researcher().run(&mut roster, &opts(&["findagrave"])).await.unwrap();

    assert_eq!(stats.people_processed, 2);
    assert_eq!(stats.people_searched, 0);
    assert_eq!(h.fetcher.total_calls(), 0);
    assert!(!h.search_log.is_processed("p1", "findagrave").await.unwrap());
}

#[tokio::test]
async fn parallel_and_sequential_stage_the_same_findings() {
    let sources = ["findagrave", "geneanet", "wikitree"];

    let mut staged = Vec::new();
    for parallel in [true, false] {
        let h = Harness::new().await;
        h.fetcher.respond_html("findagrave", FINDAGRAVE_HTML);
        h.fetcher.respond_html("geneanet", GENEANET_HTML);
        h.fetcher.respond_json("wikitree", wikitree_json());

        let run_opts = ResearchOptions { parallel, ..opts(&sources) };
        let mut roster = MockRoster::new(vec![sample_person("p1", "John", "Smith", Some(1880))]);
        h.researcher().run(&mut roster, &run_opts).await.unwrap();

        let mut findings: Vec<(String, String)> = h
            .staging
            .get_pending()
            .await
            .unwrap()
            .into_iter()
            .map(|f| (f.source_key, f.extracted_record["name"].as_str().unwrap().to_string()))
            .collect();
        findings.sort();
        staged.push(findings);
    }

    // Same multiset either way; only completion order may differ.
    assert_eq!(staged[0], staged[1]);
    assert!(!staged[0].is_empty());
}

#[tokio::test]
async fn limit_caps_people_processed() {
    let h = Harness::new().await;
    h.fetcher.respond_html("findagrave", FINDAGRAVE_HTML);

    let mut roster = MockRoster::new(vec![
        sample_person("p1", "John", "Smith", Some(1880)),
        sample_person("p2", "Mary", "Smith", Some(1881)),
        sample_person("p3", "Anne", "Smith", Some(1882)),
    ]);
    let run_opts = ResearchOptions { limit: Some(2), ..opts(&["findagrave"]) };
    let stats = h.researcher().run(&mut roster, &run_opts).await.unwrap();

    assert_eq!(stats.people_processed, 2);
    assert!(!h.search_log.is_processed("p3", "findagrave").await.unwrap());
}
