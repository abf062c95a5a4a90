//! Record normalizer for citation batches
//!
//! Flattens each citation record into the four staged relations. All inserts
//! for a batch run under one store-level transaction committed as a whole;
//! inside it, every record gets its own savepoint so that a malformed record
//! rolls back cleanly and never leaves partial rows behind. One bad record
//! is logged and skipped; it never aborts the batch.

use crate::app::models::{ArticleRow, AuthorAffiliationRow, MeshHeadingRow, PublicationTypeRow};
use crate::app::services::citation_parser::extractors::{
    affiliations, as_list, assemble_date, clean_title, identifier_pair, major_topic, pluck,
    require, require_text, resolve_year_month, text_of,
};
use crate::app::services::staging::{
    StagingStore, insert_article, insert_author_affiliation, insert_mesh_heading,
    insert_publication_type,
};
use crate::{Error, Result};
use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, warn};

/// Placeholder author used when a record has no author list at all
static PLACEHOLDER_AUTHOR: Value = Value::Null;

/// Counters for one batch's normalization pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeStats {
    /// Records encountered in the batch
    pub records_seen: usize,
    /// Records staged completely
    pub records_normalized: usize,
    /// Records skipped after a record-level failure
    pub records_skipped: usize,
    /// Rows landed per relation
    pub article_rows: usize,
    pub mesh_rows: usize,
    pub publication_type_rows: usize,
    pub author_rows: usize,
    /// Inserts ignored under a uniqueness constraint
    pub duplicates_ignored: usize,
}

impl NormalizeStats {
    /// Fraction of records staged completely, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.records_seen == 0 {
            return 100.0;
        }
        (self.records_normalized as f64 / self.records_seen as f64) * 100.0
    }
}

/// Normalize every record of a batch into the staging store.
///
/// The whole batch commits at once; per-record failures roll back their own
/// savepoint, are logged, and leave the rest of the batch untouched.
pub fn normalize_batch(store: &mut StagingStore, records: &[&Value]) -> Result<NormalizeStats> {
    let mut stats = NormalizeStats::default();
    let mut tx = store.transaction()?;

    for record in records {
        stats.records_seen += 1;

        let savepoint = tx
            .savepoint()
            .map_err(|e| Error::staging("failed to begin record savepoint", e))?;

        match normalize_record(&savepoint, record, &mut stats) {
            Ok(()) => {
                savepoint
                    .commit()
                    .map_err(|e| Error::staging("failed to release record savepoint", e))?;
                stats.records_normalized += 1;
            }
            Err(e) => {
                // Dropping the savepoint rolls this record's rows back
                warn!("Skipping citation record: {}", e);
                stats.records_skipped += 1;
            }
        }
    }

    tx.commit()
        .map_err(|e| Error::staging("failed to commit batch transaction", e))?;

    debug!(
        "Normalized {}/{} records ({} skipped, {} duplicate inserts ignored)",
        stats.records_normalized, stats.records_seen, stats.records_skipped, stats.duplicates_ignored
    );

    Ok(stats)
}

/// Flatten one citation record into the four relations
fn normalize_record(conn: &Connection, record: &Value, stats: &mut NormalizeStats) -> Result<()> {
    let citation = require(record, &["MedlineCitation"])?;

    let pmid = require_text(pluck(Some(citation), "PMID"), "PMID")?
        .parse::<i64>()
        .map_err(|e| Error::record(format!("PMID is not an integer: {e}")))?;

    let article = require(citation, &["Article"])?;

    stage_mesh_headings(conn, citation, pmid, stats)?;
    stage_article(conn, citation, article, pmid, stats)?;
    stage_publication_types(conn, article, pmid, stats)?;
    stage_authors(conn, article, pmid, stats)?;

    Ok(())
}

/// Upsert the record's subject headings; an absent heading list stages nothing
fn stage_mesh_headings(
    conn: &Connection,
    citation: &Value,
    pmid: i64,
    stats: &mut NormalizeStats,
) -> Result<()> {
    let Some(heading_list) = pluck(Some(citation), "MeshHeadingList") else {
        return Ok(());
    };

    for heading in as_list(pluck(Some(heading_list), "MeshHeading")) {
        let descriptor = require(heading, &["DescriptorName"])?;
        let major = require_text(pluck(Some(descriptor), "@MajorTopicYN"), "@MajorTopicYN")?;

        let row = MeshHeadingRow {
            pmid,
            descriptor_code: text_of(pluck(Some(descriptor), "@UI")),
            major_topic: major_topic(&major),
        };

        if insert_mesh_heading(conn, &row)? {
            stats.mesh_rows += 1;
        } else {
            stats.duplicates_ignored += 1;
        }
    }

    Ok(())
}

/// Insert exactly one article row; a duplicate pmid is ignored, not updated
fn stage_article(
    conn: &Connection,
    citation: &Value,
    article: &Value,
    pmid: i64,
    stats: &mut NormalizeStats,
) -> Result<()> {
    let journal = require(article, &["Journal"])?;
    let journal_issue = require(journal, &["JournalIssue"])?;
    let journal_info = require(citation, &["MedlineJournalInfo"])?;

    let (issn, issn_type) = identifier_pair(pluck(Some(journal), "ISSN"));
    let (pub_year, pub_month) = resolve_year_month(pluck(Some(journal_issue), "PubDate"));

    let row = ArticleRow {
        pmid,
        article_title: clean_title(pluck(Some(article), "ArticleTitle")),
        date_created: assemble_date(pluck(Some(citation), "DateCompleted"))?,
        date_revised: assemble_date(pluck(Some(citation), "DateRevised"))?,
        issn,
        issn_type,
        cited_medium: text_of(pluck(Some(journal_issue), "@CitedMedium")),
        volume: text_of(pluck(Some(journal_issue), "Volume")),
        issue: text_of(pluck(Some(journal_issue), "Issue")),
        pub_year,
        pub_month,
        journal_title: clean_title(pluck(Some(journal), "Title")),
        journal_abbreviation: text_of(pluck(Some(journal), "ISOAbbreviation")),
        journal_nlm_id: text_of(pluck(Some(journal_info), "NlmUniqueID")),
    };

    if insert_article(conn, &row)? {
        stats.article_rows += 1;
    } else {
        stats.duplicates_ignored += 1;
    }

    Ok(())
}

/// Insert the record's publication types with a per-record ordinal counter
fn stage_publication_types(
    conn: &Connection,
    article: &Value,
    pmid: i64,
    stats: &mut NormalizeStats,
) -> Result<()> {
    let type_list = require(article, &["PublicationTypeList"])?;

    let mut ordinal = 1i64;
    for publication_type in as_list(pluck(Some(type_list), "PublicationType")) {
        let row = PublicationTypeRow {
            pmid,
            type_name: text_of(Some(publication_type)),
            type_code: text_of(pluck(Some(publication_type), "@UI")),
            ordinal,
        };

        // The local counter makes duplicates impossible in practice; a
        // conflicting insert is still tolerated without advancing the ordinal
        if insert_publication_type(conn, &row)? {
            stats.publication_type_rows += 1;
            ordinal += 1;
        } else {
            stats.duplicates_ignored += 1;
        }
    }

    Ok(())
}

/// Insert one row per author/affiliation pair, with the ordinal-0
/// placeholder for authors that carry no affiliation
fn stage_authors(
    conn: &Connection,
    article: &Value,
    pmid: i64,
    stats: &mut NormalizeStats,
) -> Result<()> {
    // A record without an author list still contributes one all-null author
    let authors = match pluck(Some(article), "AuthorList") {
        Some(author_list) => as_list(pluck(Some(author_list), "Author")),
        None => vec![&PLACEHOLDER_AUTHOR],
    };

    let mut author_ordinal = 1i64;
    for author in authors {
        let initials = text_of(pluck(Some(author), "Initials"));
        let fore_name = text_of(pluck(Some(author), "ForeName"));
        let last_name = text_of(pluck(Some(author), "LastName"));

        match affiliations(pluck(Some(author), "AffiliationInfo")) {
            Some(author_affiliations) => {
                let mut affiliation_ordinal = 1i64;
                for info in author_affiliations {
                    let row = AuthorAffiliationRow {
                        pmid,
                        author_ordinal,
                        initials: initials.clone(),
                        fore_name: fore_name.clone(),
                        last_name: last_name.clone(),
                        affiliation_ordinal,
                        affiliation: text_of(pluck(Some(info), "Affiliation")),
                    };

                    if insert_author_affiliation(conn, &row)? {
                        stats.author_rows += 1;
                        affiliation_ordinal += 1;
                    } else {
                        stats.duplicates_ignored += 1;
                    }
                }
            }
            None => {
                let row = AuthorAffiliationRow {
                    pmid,
                    author_ordinal,
                    initials,
                    fore_name,
                    last_name,
                    affiliation_ordinal: 0,
                    affiliation: None,
                };

                if insert_author_affiliation(conn, &row)? {
                    stats.author_rows += 1;
                } else {
                    stats.duplicates_ignored += 1;
                }
            }
        }

        author_ordinal += 1;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::services::citation_parser::reader::{citation_records, parse_document};
    use crate::config::StagingMode;
    use std::path::Path;

    fn open_store() -> StagingStore {
        let mut store =
            StagingStore::open(StagingMode::Memory, "normalizer_test", Path::new("unused")).unwrap();
        store.define_schema().unwrap();
        store
    }

    fn normalize_xml(store: &mut StagingStore, xml: &str) -> NormalizeStats {
        let document = parse_document(xml, "test.xml").unwrap();
        let records = citation_records(&document, "test.xml").unwrap();
        normalize_batch(store, &records).unwrap()
    }

    fn count(store: &StagingStore, table: &str) -> i64 {
        store
            .connection()
            .unwrap()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    /// A complete, well-formed citation record
    fn full_record(pmid: u32) -> String {
        format!(
            r#"<PubmedArticle>
              <MedlineCitation>
                <PMID Version="1">{pmid}</PMID>
                <DateCompleted><Year>2019</Year><Month>11</Month><Day>03</Day></DateCompleted>
                <DateRevised><Year>2020</Year><Month>01</Month><Day>15</Day></DateRevised>
                <MedlineJournalInfo><NlmUniqueID>0410462</NlmUniqueID></MedlineJournalInfo>
                <Article>
                  <Journal>
                    <ISSN IssnType="Print">0028-0836</ISSN>
                    <JournalIssue CitedMedium="Print">
                      <Volume>574</Volume>
                      <Issue>7779</Issue>
                      <PubDate><Year>2019</Year><Month>Oct</Month></PubDate>
                    </JournalIssue>
                    <Title>Nature</Title>
                    <ISOAbbreviation>Nature</ISOAbbreviation>
                  </Journal>
                  <ArticleTitle>[A bracketed title]</ArticleTitle>
                  <AuthorList>
                    <Author>
                      <LastName>Smith</LastName>
                      <ForeName>Jane</ForeName>
                      <Initials>J</Initials>
                      <AffiliationInfo><Affiliation>MIT</Affiliation></AffiliationInfo>
                      <AffiliationInfo><Affiliation>Broad Institute</Affiliation></AffiliationInfo>
                    </Author>
                    <Author>
                      <LastName>Jones</LastName>
                      <ForeName>Sam</ForeName>
                      <Initials>S</Initials>
                    </Author>
                  </AuthorList>
                  <PublicationTypeList>
                    <PublicationType UI="D016428">Journal Article</PublicationType>
                    <PublicationType UI="D013485">Research Support, Non-U.S. Gov't</PublicationType>
                  </PublicationTypeList>
                </Article>
                <MeshHeadingList>
                  <MeshHeading>
                    <DescriptorName UI="D001234" MajorTopicYN="Y">Alpha</DescriptorName>
                  </MeshHeading>
                  <MeshHeading>
                    <DescriptorName UI="D005678" MajorTopicYN="N">Beta</DescriptorName>
                  </MeshHeading>
                </MeshHeadingList>
              </MedlineCitation>
            </PubmedArticle>"#
        )
    }

    fn wrap(records: &str) -> String {
        format!("<PubmedArticleSet>{records}</PubmedArticleSet>")
    }

    #[test]
    fn test_full_record_stages_all_relations() {
        let mut store = open_store();
        let stats = normalize_xml(&mut store, &wrap(&full_record(31452104)));

        assert_eq!(stats.records_normalized, 1);
        assert_eq!(stats.records_skipped, 0);
        assert_eq!(count(&store, "articles"), 1);
        assert_eq!(count(&store, "mesh_headings"), 2);
        assert_eq!(count(&store, "publication_types"), 2);
        // Two affiliation rows for Smith plus the placeholder row for Jones
        assert_eq!(count(&store, "author_affiliations"), 3);

        let conn = store.connection().unwrap();
        let (title, created, year, month): (String, String, String, String) = conn
            .query_row(
                "SELECT article_title, date_created, pub_year, pub_month FROM articles WHERE pmid = 31452104",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();
        assert_eq!(title, "A bracketed title");
        assert_eq!(created, "03/11/2019");
        assert_eq!(year, "2019");
        assert_eq!(month, "Oct");
    }

    #[test]
    fn test_missing_mesh_list_stages_no_headings() {
        let xml = wrap(
            r#"<PubmedArticle>
              <MedlineCitation>
                <PMID>100</PMID>
                <MedlineJournalInfo><NlmUniqueID>0410462</NlmUniqueID></MedlineJournalInfo>
                <Article>
                  <Journal><JournalIssue><Volume>1</Volume></JournalIssue><Title>J</Title></Journal>
                  <ArticleTitle>No mesh here</ArticleTitle>
                  <PublicationTypeList>
                    <PublicationType UI="D016428">Journal Article</PublicationType>
                  </PublicationTypeList>
                </Article>
              </MedlineCitation>
            </PubmedArticle>"#,
        );

        let mut store = open_store();
        let stats = normalize_xml(&mut store, &xml);

        assert_eq!(stats.records_normalized, 1);
        assert_eq!(count(&store, "mesh_headings"), 0);
        assert_eq!(count(&store, "articles"), 1);
    }

    #[test]
    fn test_publication_type_ordinals_follow_source_order() {
        let xml = wrap(
            r#"<PubmedArticle>
              <MedlineCitation>
                <PMID>200</PMID>
                <MedlineJournalInfo><NlmUniqueID>0410462</NlmUniqueID></MedlineJournalInfo>
                <Article>
                  <Journal><JournalIssue><Volume>1</Volume></JournalIssue><Title>J</Title></Journal>
                  <ArticleTitle>Ordered types</ArticleTitle>
                  <PublicationTypeList>
                    <PublicationType UI="A">First</PublicationType>
                    <PublicationType UI="B">Second</PublicationType>
                    <PublicationType UI="C">Third</PublicationType>
                  </PublicationTypeList>
                </Article>
              </MedlineCitation>
            </PubmedArticle>"#,
        );

        let mut store = open_store();
        normalize_xml(&mut store, &xml);

        let conn = store.connection().unwrap();
        let mut stmt = conn
            .prepare("SELECT ordinal, type_name FROM publication_types WHERE pmid = 200 ORDER BY ordinal")
            .unwrap();
        let rows: Vec<(i64, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(
            rows,
            vec![
                (1, "First".to_string()),
                (2, "Second".to_string()),
                (3, "Third".to_string()),
            ]
        );
    }

    #[test]
    fn test_absent_author_list_yields_single_placeholder_row() {
        let xml = wrap(
            r#"<PubmedArticle>
              <MedlineCitation>
                <PMID>300</PMID>
                <MedlineJournalInfo><NlmUniqueID>0410462</NlmUniqueID></MedlineJournalInfo>
                <Article>
                  <Journal><JournalIssue><Volume>1</Volume></JournalIssue><Title>J</Title></Journal>
                  <ArticleTitle>Anonymous</ArticleTitle>
                  <PublicationTypeList>
                    <PublicationType UI="D016428">Journal Article</PublicationType>
                  </PublicationTypeList>
                </Article>
              </MedlineCitation>
            </PubmedArticle>"#,
        );

        let mut store = open_store();
        normalize_xml(&mut store, &xml);

        let conn = store.connection().unwrap();
        let (author_ordinal, affiliation_ordinal, last_name, affiliation): (
            i64,
            i64,
            Option<String>,
            Option<String>,
        ) = conn
            .query_row(
                "SELECT author_ordinal, affiliation_ordinal, last_name, affiliation
                 FROM author_affiliations WHERE pmid = 300",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();

        assert_eq!(author_ordinal, 1);
        assert_eq!(affiliation_ordinal, 0);
        assert_eq!(last_name, None);
        assert_eq!(affiliation, None);
        assert_eq!(count(&store, "author_affiliations"), 1);
    }

    #[test]
    fn test_author_affiliation_ordinals() {
        let mut store = open_store();
        normalize_xml(&mut store, &wrap(&full_record(400)));

        let conn = store.connection().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT author_ordinal, affiliation_ordinal, affiliation
                 FROM author_affiliations WHERE pmid = 400
                 ORDER BY author_ordinal, affiliation_ordinal",
            )
            .unwrap();
        let rows: Vec<(i64, i64, Option<String>)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(
            rows,
            vec![
                (1, 1, Some("MIT".to_string())),
                (1, 2, Some("Broad Institute".to_string())),
                (2, 0, None),
            ]
        );
    }

    #[test]
    fn test_malformed_record_is_skipped_not_fatal() {
        // Second record has no PMID; first and third are fine
        let xml = wrap(&format!(
            "{}<PubmedArticle><MedlineCitation><Article/></MedlineCitation></PubmedArticle>{}",
            full_record(500),
            full_record(501),
        ));

        let mut store = open_store();
        let stats = normalize_xml(&mut store, &xml);

        assert_eq!(stats.records_seen, 3);
        assert_eq!(stats.records_normalized, 2);
        assert_eq!(stats.records_skipped, 1);
        assert_eq!(count(&store, "articles"), 2);
    }

    #[test]
    fn test_failed_record_leaves_no_partial_rows() {
        // Valid PMID and mesh headings, but the Article element is missing
        // its Journal, so the record fails after the headings were issued
        let xml = wrap(
            r#"<PubmedArticle>
              <MedlineCitation>
                <PMID>600</PMID>
                <Article><ArticleTitle>Broken</ArticleTitle></Article>
                <MeshHeadingList>
                  <MeshHeading>
                    <DescriptorName UI="D001234" MajorTopicYN="Y">Alpha</DescriptorName>
                  </MeshHeading>
                </MeshHeadingList>
              </MedlineCitation>
            </PubmedArticle>"#,
        );

        let mut store = open_store();
        let stats = normalize_xml(&mut store, &xml);

        assert_eq!(stats.records_skipped, 1);
        assert_eq!(count(&store, "mesh_headings"), 0);
        assert_eq!(count(&store, "articles"), 0);
    }

    #[test]
    fn test_renormalizing_is_idempotent() {
        let xml = wrap(&full_record(700));
        let mut store = open_store();

        normalize_xml(&mut store, &xml);
        let articles = count(&store, "articles");
        let mesh = count(&store, "mesh_headings");
        let types = count(&store, "publication_types");
        let authors = count(&store, "author_affiliations");

        let stats = normalize_xml(&mut store, &xml);

        assert_eq!(count(&store, "articles"), articles);
        assert_eq!(count(&store, "mesh_headings"), mesh);
        assert_eq!(count(&store, "publication_types"), types);
        assert_eq!(count(&store, "author_affiliations"), authors);
        assert!(stats.duplicates_ignored > 0);
    }

    #[test]
    fn test_medline_date_resolution() {
        let xml = wrap(
            r#"<PubmedArticle>
              <MedlineCitation>
                <PMID>800</PMID>
                <MedlineJournalInfo><NlmUniqueID>0410462</NlmUniqueID></MedlineJournalInfo>
                <Article>
                  <Journal>
                    <JournalIssue><PubDate><MedlineDate>2020 Jan</MedlineDate></PubDate></JournalIssue>
                    <Title>J</Title>
                  </Journal>
                  <ArticleTitle>Free-text date</ArticleTitle>
                  <PublicationTypeList>
                    <PublicationType UI="D016428">Journal Article</PublicationType>
                  </PublicationTypeList>
                </Article>
              </MedlineCitation>
            </PubmedArticle>"#,
        );

        let mut store = open_store();
        normalize_xml(&mut store, &xml);

        let conn = store.connection().unwrap();
        let (year, month): (Option<String>, Option<String>) = conn
            .query_row("SELECT pub_year, pub_month FROM articles WHERE pmid = 800", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(year.as_deref(), Some("2020"));
        assert_eq!(month.as_deref(), Some("Jan"));
    }

    #[test]
    fn test_stats_success_rate() {
        let stats = NormalizeStats {
            records_seen: 4,
            records_normalized: 3,
            records_skipped: 1,
            ..NormalizeStats::default()
        };
        assert_eq!(stats.success_rate(), 75.0);
        assert_eq!(NormalizeStats::default().success_rate(), 100.0);
    }
}
