#![allow(unused_crate_dependencies)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use normalized_cache::{
    pagination::{
        CursorPaginator, Fetch, FetchError, FetchRequest, GraphqlResponse, OffsetPaginator, PageInfo, PaginationError,
    },
    Artifact, Cache, ReadRequest, RecordId, Variables, WriteRequest,
};
use serde_json::{json, Value};

#[derive(Default)]
struct MockServer {
    responses: Mutex<VecDeque<Result<GraphqlResponse, FetchError>>>,
    requests: Mutex<Vec<Value>>,
}

impl MockServer {
    fn respond(self, data: Value) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(serde_json::from_value(json!({ "data": data })).unwrap()));
        self
    }

    fn fail(self, error: FetchError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Fetch for MockServer {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<GraphqlResponse, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push(Value::Object(request.variables.clone()));

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::any("no more pages")))
    }
}

fn feed_artifact(direction: &str) -> Arc<Artifact> {
    let page_argument = |name: &str| json!({"kind": "variable", "name": name});

    Arc::new(
        serde_json::from_value(json!({
            "name": "Feed",
            "kind": "query",
            "rootType": "Query",
            "refetch": {"path": ["feed"], "method": "cursor", "pageSize": 2, "direction": direction},
            "selection": {
                "fields": {
                    "feed": {
                        "type": "PostConnection",
                        "fieldName": "feed",
                        "paginated": true,
                        "arguments": {
                            "first": page_argument("first"),
                            "after": page_argument("after"),
                            "last": page_argument("last"),
                            "before": page_argument("before")
                        },
                        "selection": {
                            "fields": {
                                "edges": {
                                    "type": "PostEdge",
                                    "fieldName": "edges",
                                    "update": ["append", "prepend"],
                                    "selection": {
                                        "fields": {
                                            "cursor": {"type": "String", "fieldName": "cursor"},
                                            "node": {
                                                "type": "Post",
                                                "fieldName": "node",
                                                "selection": {"fields": {"id": {"type": "ID", "fieldName": "id"}}}
                                            }
                                        }
                                    }
                                },
                                "pageInfo": {
                                    "type": "PageInfo",
                                    "fieldName": "pageInfo",
                                    "update": ["append", "prepend"],
                                    "selection": {
                                        "fields": {
                                            "startCursor": {"type": "String", "fieldName": "startCursor"},
                                            "endCursor": {"type": "String", "fieldName": "endCursor"},
                                            "hasNextPage": {"type": "Boolean", "fieldName": "hasNextPage"},
                                            "hasPreviousPage": {"type": "Boolean", "fieldName": "hasPreviousPage"}
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }))
        .unwrap(),
    )
}

fn feed_page(ids: &[u32], has_next: bool, has_previous: bool) -> Value {
    let edges = ids
        .iter()
        .map(|id| json!({"cursor": format!("c{id}"), "node": {"id": id.to_string()}}))
        .collect::<Vec<_>>();

    json!({
        "feed": {
            "edges": edges,
            "pageInfo": {
                "startCursor": ids.first().map(|id| format!("c{id}")),
                "endCursor": ids.last().map(|id| format!("c{id}")),
                "hasNextPage": has_next,
                "hasPreviousPage": has_previous
            }
        }
    })
}

fn seed(cache: &mut Cache, artifact: &Artifact, data: Value) {
    let root = RecordId::root();
    cache
        .write(WriteRequest::new(&artifact.selection, &data, &root, &Variables::new()))
        .unwrap();
}

fn node_ids(cache: &Cache, artifact: &Artifact) -> Vec<String> {
    let root = RecordId::root();
    let output = cache
        .read(ReadRequest::new(&artifact.selection, &root, &Variables::new()))
        .unwrap();

    output.data.unwrap()["feed"]["edges"]
        .as_array()
        .unwrap()
        .iter()
        .map(|edge| edge["node"]["id"].as_str().unwrap().to_owned())
        .collect()
}

#[tokio::test]
async fn cursor_pages_in_both_directions() {
    let mut cache = Cache::default();
    let artifact = feed_artifact("both");
    seed(&mut cache, &artifact, feed_page(&[1, 2], true, true));

    let server = MockServer::default()
        .respond(feed_page(&[3, 4], false, true))
        .respond(feed_page(&[0], true, false));
    let paginator = CursorPaginator::new(artifact.clone(), &Variables::new()).unwrap();

    let output = paginator.load_next_page(&mut cache, &server, None).await.unwrap();
    assert!(!output.touched.is_empty());
    assert_eq!(node_ids(&cache, &artifact), ["1", "2", "3", "4"]);
    assert_eq!(
        paginator.page_info(&cache).unwrap(),
        PageInfo {
            start_cursor: Some("c1".into()),
            end_cursor: Some("c4".into()),
            has_next_page: false,
            has_previous_page: true,
        }
    );

    // nothing left forward, the server is not asked
    let output = paginator.load_next_page(&mut cache, &server, None).await.unwrap();
    assert!(output.touched.is_empty());

    paginator.load_previous_page(&mut cache, &server, Some(5)).await.unwrap();
    assert_eq!(node_ids(&cache, &artifact), ["0", "1", "2", "3", "4"]);
    assert_eq!(
        paginator.page_info(&cache).unwrap(),
        PageInfo {
            start_cursor: Some("c0".into()),
            end_cursor: Some("c4".into()),
            has_next_page: false,
            has_previous_page: false,
        }
    );

    insta::assert_json_snapshot!(server.requests(), @r###"
    [
      {
        "first": 2,
        "after": "c2"
      },
      {
        "last": 5,
        "before": "c1"
      }
    ]
    "###);
}

#[tokio::test]
async fn failed_fetches_leave_the_cache_alone() {
    let mut cache = Cache::default();
    let artifact = feed_artifact("forward");
    seed(&mut cache, &artifact, feed_page(&[1, 2], true, false));
    let before = cache.serialize();

    let server = MockServer::default().fail(FetchError::any("connection reset"));
    let paginator = CursorPaginator::new(artifact.clone(), &Variables::new()).unwrap();

    let error = paginator.load_next_page(&mut cache, &server, None).await.unwrap_err();
    assert_eq!(error.to_string(), "connection reset");
    assert_eq!(cache.serialize(), before);

    let server = MockServer::default();
    server.responses.lock().unwrap().push_back(Ok(serde_json::from_value(json!({
        "data": null,
        "errors": [{"message": "feed is unavailable"}]
    }))
    .unwrap()));

    let error = paginator.load_next_page(&mut cache, &server, None).await.unwrap_err();
    assert!(matches!(&error, PaginationError::Graphql(messages) if messages == &["feed is unavailable"]));
    assert_eq!(cache.serialize(), before);

    let error = paginator.load_previous_page(&mut cache, &server, None).await.unwrap_err();
    assert!(matches!(error, PaginationError::Direction { direction: "backward", .. }));
}

#[tokio::test]
async fn offset_pages_advance_client_side() {
    let mut cache = Cache::default();
    let artifact: Arc<Artifact> = Arc::new(
        serde_json::from_value(json!({
            "name": "Posts",
            "kind": "query",
            "rootType": "Query",
            "refetch": {"path": ["posts"], "method": "offset", "pageSize": 2},
            "input": {"limit": {"type": "Int", "nullable": true, "defaultValue": 2}},
            "selection": {
                "fields": {
                    "posts": {
                        "type": "Post",
                        "fieldName": "posts",
                        "paginated": true,
                        "update": "append",
                        "arguments": {
                            "offset": {"kind": "variable", "name": "offset"},
                            "limit": {"kind": "variable", "name": "limit"}
                        },
                        "selection": {"fields": {"id": {"type": "ID", "fieldName": "id"}}}
                    }
                }
            }
        }))
        .unwrap(),
    );

    let root = RecordId::root();
    cache
        .write(WriteRequest::new(
            &artifact.selection,
            &json!({"posts": [{"id": "1"}, {"id": "2"}]}),
            &root,
            &Variables::new(),
        ))
        .unwrap();

    let server = MockServer::default()
        .respond(json!({"posts": [{"id": "3"}, {"id": "4"}]}))
        .respond(json!({"posts": [{"id": "5"}]}));
    let mut paginator = OffsetPaginator::new(artifact.clone(), &Variables::new()).unwrap();
    assert_eq!(paginator.offset(), 0);

    paginator.load_next_page(&mut cache, &server, None).await.unwrap();
    paginator.load_next_page(&mut cache, &server, Some(10)).await.unwrap();
    assert_eq!(paginator.offset(), 4);

    let output = cache
        .read(ReadRequest::new(&artifact.selection, &root, &Variables::new()))
        .unwrap();
    assert_eq!(
        output.data,
        Some(json!({"posts": [{"id": "1"}, {"id": "2"}, {"id": "3"}, {"id": "4"}, {"id": "5"}]}))
    );

    // a failed page does not move the offset
    paginator.load_next_page(&mut cache, &server, None).await.unwrap_err();
    assert_eq!(paginator.offset(), 4);

    assert_eq!(
        server.requests(),
        vec![
            json!({"limit": 2, "offset": 2}),
            json!({"limit": 10, "offset": 4}),
            json!({"limit": 2, "offset": 14}),
        ]
    );

    let error = CursorPaginator::new(artifact, &Variables::new()).unwrap_err();
    assert_eq!(error.to_string(), "document Posts does not declare cursor pagination");
}
