//! Tests for the export/upload sink


use crate::app::models::{ArticleRow, AuthorAffiliationRow, MeshHeadingRow, PublicationTypeRow};
use crate::app::services::staging::{
    StagingStore, insert_article, insert_author_affiliation, insert_mesh_heading,
    insert_publication_type,
};
use crate::config::StagingMode;
use std::path::Path;

/// Open a schema-defined in-memory store
pub fn open_store() -> StagingStore {
    let mut store =
        StagingStore::open(StagingMode::Memory, "export_test", Path::new("unused")).unwrap();
    store.define_schema().unwrap();
    store
}

/// Stage one article with optional authors, types, and headings
pub fn stage_article_fixture(
    store: &StagingStore,
    pmid: i64,
    authors: usize,
    publication_types: usize,
    headings: usize,
) {
    let conn = store.connection().unwrap();

    insert_article(
        conn,
        &ArticleRow {
            pmid,
            article_title: Some(format!("Article {pmid}")),
            ..ArticleRow::default()
        },
    )
    .unwrap();

    for author_ordinal in 1..=authors as i64 {
        insert_author_affiliation(
            conn,
            &AuthorAffiliationRow {
                pmid,
                author_ordinal,
                initials: Some("A".to_string()),
                fore_name: Some(format!("Fore{author_ordinal}")),
                last_name: Some(format!("Last{author_ordinal}")),
                affiliation_ordinal: 0,
                affiliation: None,
            },
        )
        .unwrap();
    }

    for ordinal in 1..=publication_types as i64 {
        insert_publication_type(
            conn,
            &PublicationTypeRow {
                pmid,
                type_name: Some(format!("Type {ordinal}")),
                type_code: Some(format!("T{ordinal}")),
                ordinal,
            },
        )
        .unwrap();
    }

    for heading in 1..=headings as i64 {
        insert_mesh_heading(
            conn,
            &MeshHeadingRow {
                pmid,
                descriptor_code: Some(format!("D{pmid}_{heading}")),
                major_topic: heading == 1,
            },
        )
        .unwrap();
    }
}
