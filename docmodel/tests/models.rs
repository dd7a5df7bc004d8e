use docmodel::{memory::InMemoryStore, prelude::*};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Article {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    title: String,
    views: i64,
    #[serde(default, rename = "IsDeleted")]
    deleted: bool,
}

impl Article {
    fn new(title: &str, views: i64) -> Self {
        Article { id: None, title: title.to_string(), views, deleted: false }
    }
}

fn registry() -> SchemaRegistry {
    SchemaRegistry::new([
        Schema::builder("Author", "authors").field("name", FieldKind::String).build(),
        Schema::builder("Article", "articles")
            .field("title", FieldKind::String)
            .field("views", FieldKind::Integer)
            .relation("author", "Author")
            .build(),
    ])
    .unwrap()
}

#[tokio::test]
async fn typed_entities_round_trip() {
    let store = ModelStore::new(InMemoryStore::new(), registry());
    let articles = store.model("Article").unwrap();

    let created = articles.create(&Article::new("Hello", 0)).await.unwrap();
    let mut article: Article = from_document(created[0].clone()).unwrap();
    assert!(article.id.is_some());

    article.views = 10;
    assert_eq!(articles.update_entity(&article).await.unwrap(), 1);

    let id = article.id.unwrap();
    let fetched: Article = from_document(articles.id(id).await.unwrap().unwrap()).unwrap();
    assert_eq!(fetched, article);

    articles.remove_entity(&fetched).await.unwrap();
    let removed: Article = from_document(
        articles
            .one(Filter::eq("_id", id))
            .await
            .unwrap()
            .unwrap(),
    )
    .unwrap();
    assert!(removed.deleted);
    assert!(articles.list(Params::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn json_params_drive_listing() {
    let options: StoreOptions = serde_json::from_value(json!({ "default_page_size": 2 })).unwrap();
    let store = ModelStore::new(InMemoryStore::new(), registry()).with_options(options);
    let articles = store.model("Article").unwrap();

    articles
        .create(&vec![
            Article::new("a", 5),
            Article::new("b", 50),
            Article::new("c", 500),
        ])
        .await
        .unwrap();

    let popular = articles
        .list(json!({ "cond": { "views": { "$gte": 10 } }, "sort": ["-views"] }))
        .await
        .unwrap();
    let titles: Vec<String> = popular
        .list_as::<Article>()
        .unwrap()
        .into_iter()
        .map(|article| article.title)
        .collect();
    assert_eq!(titles, vec!["c", "b"]);
    assert_eq!(popular.size, Some(2));

    let everything = articles.list(json!({ "range": "ALL" })).await.unwrap();
    assert_eq!(everything.list.len(), 3);
    assert_eq!(everything.page, None);
}

#[tokio::test]
async fn joined_reads_inline_referenced_documents() {
    let store = ModelStore::new(InMemoryStore::new(), registry());
    let articles = store.model("Article").unwrap();

    let created = articles
        .create(&doc! { "title": "Joined", "views": 1i64, "author": { "name": "Ann" } })
        .await
        .unwrap();
    let author_id = created[0].get_object_id("author").unwrap();

    let found = articles
        .id(created[0].get_object_id("_id").unwrap().to_hex())
        .await
        .unwrap()
        .unwrap();
    let author = found.get_document("author").unwrap();
    assert_eq!(author.get_object_id("_id").unwrap(), author_id);
    assert_eq!(author.get_str("name").unwrap(), "Ann");

    let authors = store.model("Author").unwrap();
    assert_eq!(authors.list(json!({})).await.unwrap().total_records, 1);

    store.shutdown().await.unwrap();
}
