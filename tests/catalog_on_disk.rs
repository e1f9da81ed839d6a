mod common;

use pretty_assertions::assert_eq;
use tag_catalog::database::repo::TagAssignment;
use tag_catalog::model::TagCategory;
use tag_catalog::similarity::SimilarityPolicy;
use tag_catalog::{CatalogConfig, SearchPath};

use common::{item, paths, TestCatalog};

#[test]
fn search_survives_a_reopen() {
    let test = TestCatalog::new();
    test.insert(vec![
        item("/lib/a.png", &["tag1", "tag2"]),
        item("/lib/b.png", &["tag2", "tag3"]),
        item("/lib/c.png", &["tag4"]),
    ]);
    assert_eq!(paths(&test.catalog, "tag2"), vec!["/lib/a.png", "/lib/b.png"]);

    let test = test.reopen();
    assert_eq!(paths(&test.catalog, "tag2 -tag1"), vec!["/lib/b.png"]);
    assert_eq!(test.catalog.search("tag3").path, SearchPath::ExactTag);
    assert_eq!(paths(&test.catalog, "lib"), vec!["/lib/a.png", "/lib/b.png", "/lib/c.png"]);
}

#[test]
fn recategorizing_a_tag_moves_it_between_scopes() -> anyhow::Result<()> {
    let test = TestCatalog::new();
    test.insert(vec![item("/x/one.png", &["miku", "smile"])]);
    assert!(test.catalog.search("character:miku").is_empty());

    let changed = test
        .catalog
        .writer()
        .set_tag_category("miku", TagCategory::Character, None)?;
    assert!(changed);

    assert_eq!(paths(&test.catalog, "character:miku"), vec!["/x/one.png"]);
    assert!(test.catalog.search("general:miku").is_empty());
    // Free text still finds it through the per-category columns.
    assert_eq!(paths(&test.catalog, r#""miku""#), vec!["/x/one.png"]);
    Ok(())
}

#[test]
fn removing_a_tag_updates_search_and_related() -> anyhow::Result<()> {
    let test = TestCatalog::with_config(CatalogConfig {
        similarity: SimilarityPolicy::Jaccard,
        ..CatalogConfig::default()
    });
    test.insert(vec![
        item("/r/ref.png", &["a", "b"]),
        item("/r/other.png", &["a", "b"]),
    ]);
    let reference = test.catalog.search("a").hits[0].id;
    assert_eq!(test.catalog.related(reference, 5).len(), 1);

    assert!(test.catalog.writer().remove_tag("/r/other.png", "a")?);
    assert_eq!(paths(&test.catalog, "a"), vec!["/r/ref.png"]);

    let related = test.catalog.related(reference, 5);
    assert_eq!(related.len(), 1);
    assert!((related[0].score - 0.5).abs() < 1e-12);
    Ok(())
}

#[test]
fn stats_and_weights_reflect_categories() -> anyhow::Result<()> {
    let test = TestCatalog::new();
    let mut record = item("/s/a.png", &["sky", "rating:general"]);
    record
        .tags
        .push(TagAssignment::new("someone", TagCategory::Artist));
    test.insert(vec![record, item("/s/b.png", &["sky"])]);

    let stats = test.catalog.stats()?;
    assert_eq!(stats.total_items, 2);
    assert_eq!(stats.total_tags, 3);
    assert_eq!(stats.tags_by_category.get(&TagCategory::Rating), Some(&1));
    assert_eq!(stats.top_tags[0], ("sky".to_string(), 2));

    assert!(test.catalog.weight_for("someone") > test.catalog.weight_for("sky"));
    assert!(test.catalog.weight_for("rating:general") < test.catalog.weight_for("sky"));
    Ok(())
}

#[test]
fn orphan_tags_disappear_from_the_directory() -> anyhow::Result<()> {
    let test = TestCatalog::new();
    test.insert(vec![item("/o/a.png", &["keep", "drop"])]);
    let writer = test.catalog.writer();
    writer.remove_tag("/o/a.png", "drop")?;

    assert!(test.catalog.get_tag_id("drop").is_some());
    assert_eq!(writer.delete_orphan_tags()?, 1);
    assert_eq!(test.catalog.get_tag_id("drop"), None);
    assert_eq!(test.catalog.search("drop").path, SearchPath::Hybrid);
    Ok(())
}
