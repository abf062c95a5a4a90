//! Read queries that shape the exported result sets
//!
//! Both queries tag every row with the batch's source name and a sequential
//! 1-based row number, so downstream consumers can always trace a row back
//! to the batch that produced it.

use crate::Result;
use crate::app::models::{CitationExportRow, MeshExportRow};
use rusqlite::Connection;

/// Columns of the full citation set, in export order
const CITATION_QUERY: &str = "
    SELECT pmid, article_title, date_created, affiliation, affiliation_ordinal,
           author_ordinal, initials, fore_name, last_name, date_revised, issn,
           issn_type, cited_medium, volume, issue, pub_year, pub_month,
           journal_title, journal_abbreviation, journal_nlm_id,
           type_name, type_code, ordinal
    FROM articles
    LEFT JOIN author_affiliations USING (pmid)
    LEFT JOIN publication_types USING (pmid)
";

/// Materialize the mesh result set: one row per staged subject heading
pub fn mesh_result_set(conn: &Connection, source: &str) -> Result<Vec<MeshExportRow>> {
    let mut statement =
        conn.prepare("SELECT pmid, descriptor_code, major_topic FROM mesh_headings")?;

    let mapped = statement.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, bool>(2)?,
        ))
    })?;

    let mut rows = Vec::new();
    for item in mapped {
        let (pmid, descriptor_code, major_topic) = item?;
        rows.push(MeshExportRow {
            row_id: rows.len() as i64 + 1,
            source: source.to_string(),
            pmid,
            descriptor_code,
            major_topic,
        });
    }

    Ok(rows)
}

/// Materialize the full citation set: articles left-joined with their
/// author/affiliation and publication-type rows
pub fn citation_result_set(conn: &Connection, source: &str) -> Result<Vec<CitationExportRow>> {
    let mut statement = conn.prepare(CITATION_QUERY)?;

    let mapped = statement.query_map([], |row| {
        Ok(CitationExportRow {
            row_id: 0,
            source: source.to_string(),
            pmid: row.get(0)?,
            article_title: row.get(1)?,
            date_created: row.get(2)?,
            affiliation: row.get(3)?,
            affiliation_ordinal: row.get(4)?,
            author_ordinal: row.get(5)?,
            initials: row.get(6)?,
            fore_name: row.get(7)?,
            last_name: row.get(8)?,
            date_revised: row.get(9)?,
            issn: row.get(10)?,
            issn_type: row.get(11)?,
            cited_medium: row.get(12)?,
            volume: row.get(13)?,
            issue: row.get(14)?,
            pub_year: row.get(15)?,
            pub_month: row.get(16)?,
            journal_title: row.get(17)?,
            journal_abbreviation: row.get(18)?,
            journal_nlm_id: row.get(19)?,
            publication_type: row.get(20)?,
            publication_type_code: row.get(21)?,
            publication_type_ordinal: row.get(22)?,
        })
    })?;

    let mut rows = Vec::new();
    for item in mapped {
        let mut row = item?;
        row.row_id = rows.len() as i64 + 1;
        rows.push(row);
    }

    Ok(rows)
}
