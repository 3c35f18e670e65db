use axum::http::{Method, StatusCode};
use serde_json::json;

use crate::testing::TestContext;

fn db(res_id: &str, rest: &str) -> String {
    format!("/mws/{}/db/{}", res_id, rest)
}

#[tokio::test]
async fn create_returns_same_workspace_for_same_session() {
    let ctx = TestContext::new();
    let mut client = ctx.client();

    let first = client.request(Method::POST, "/mws/", None).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["is_new"], json!(true));

    let second = client.request(Method::POST, "/mws/", None).await;
    assert_eq!(second.body["is_new"], json!(false));
    assert_eq!(first.body["res_id"], second.body["res_id"]);

    // A new browser gets a new workspace
    let third = ctx.client().create_workspace().await;
    assert_ne!(json!(third), first.body["res_id"]);
}

#[tokio::test]
async fn end_to_end_workspace_lifecycle() {
    let ctx = TestContext::new();
    let mut client = ctx.client();
    let res_id = client.create_workspace().await;

    let inserted = client
        .post(&db(&res_id, "widgets/insert"), json!({"document": {"x": 1}}))
        .await;
    assert_eq!(inserted.status, StatusCode::NO_CONTENT);

    let found = client.get(&db(&res_id, "widgets/find"), json!({"query": {}})).await;
    assert_eq!(found.status, StatusCode::OK);
    let docs = found.body["result"].as_array().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["x"], json!(1));
    assert!(docs[0]["_id"].is_string());

    let names = client.get(&db(&res_id, "getCollectionNames"), json!({})).await;
    assert_eq!(names.body, json!({"result": ["widgets"]}));

    let dropped = client.delete(&db(&res_id, "widgets/drop"), None).await;
    assert_eq!(dropped.status, StatusCode::NO_CONTENT);

    let names = client.get(&db(&res_id, "getCollectionNames"), json!({})).await;
    assert_eq!(names.body, json!({"result": []}));
}

#[tokio::test]
async fn workspaces_are_isolated() {
    let ctx = TestContext::new();
    let mut alice = ctx.client();
    let mut bob = ctx.client();
    let alice_id = alice.create_workspace().await;
    let bob_id = bob.create_workspace().await;

    alice.post(&db(&alice_id, "widgets/insert"), json!({"document": {"owner": "alice"}})).await;
    bob.post(&db(&bob_id, "widgets/insert"), json!({"document": [{"owner": "bob"}, {"owner": "bob"}]})).await;

    let count = alice.get(&db(&alice_id, "widgets/count"), json!({})).await;
    assert_eq!(count.body, json!({"count": 1}));
    let count = bob.get(&db(&bob_id, "widgets/count"), json!({})).await;
    assert_eq!(count.body, json!({"count": 2}));

    // Bob cannot reach into Alice's workspace
    let denied = bob.get(&db(&alice_id, "widgets/find"), json!({})).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert_eq!(denied.reason(), "Session error. User does not have access to res_id");

    // Dropping everything in one workspace leaves the other alone
    assert_eq!(alice.delete(&format!("/mws/{}/db", alice_id), None).await.status, StatusCode::NO_CONTENT);
    let count = bob.get(&db(&bob_id, "widgets/count"), json!({})).await;
    assert_eq!(count.body, json!({"count": 2}));
    let names = alice.get(&db(&alice_id, "getCollectionNames"), json!({})).await;
    assert_eq!(names.body, json!({"result": []}));
}

#[tokio::test]
async fn session_and_access_errors() {
    let ctx = TestContext::new();
    let mut client = ctx.client();
    let res_id = client.create_workspace().await;

    client.forget_cookie();
    let response = client.get(&db(&res_id, "widgets/find"), json!({})).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.body,
        json!({"error": 401, "reason": "There is no session_id cookie", "detail": ""})
    );

    let mut other = ctx.client();
    other.create_workspace().await;
    let response = other.get(&db("not-a-uuid", "widgets/find"), json!({})).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = other.request(Method::POST, &format!("/mws/{}/keep-alive", res_id), None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn argument_errors() {
    let ctx = TestContext::new();
    let mut client = ctx.client();
    let res_id = client.create_workspace().await;

    let response = client.post(&db(&res_id, "widgets/insert"), json!({"doc": {}})).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.reason(), "'document' argument not found in the insert request.");

    for body in [json!({"query": {}}), json!([]), json!(null)] {
        let response = client.put(&db(&res_id, "widgets/update"), body).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.reason(), "update requires spec and document arguments");
    }

    let response = client.delete(&db(&res_id, "widgets/remove"), Some(json!(null))).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let response = client
        .get(&db(&res_id, "widgets/find"), json!({"skip": u64::MAX, "limit": u64::MAX}))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["result"], json!([]));

    let response = client
        .get(&db(&res_id, "widgets/aggregate"), json!([{"$frobnicate": {}}]))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.reason(), "Unrecognized pipeline stage name: '$frobnicate'");

    let response = client
        .get(&db(&res_id, "widgets/find"), json!({"query": {"a": {"$where": 1}}}))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = client.get(&db(&res_id, "bad$name/find"), json!({})).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_remove_and_count_options() {
    let ctx = TestContext::new();
    let mut client = ctx.client();
    let res_id = client.create_workspace().await;
    let docs = json!({"document": [{"k": 1, "v": 0}, {"k": 1, "v": 0}, {"k": 2, "v": 0}]});
    client.post(&db(&res_id, "items/insert"), docs).await;

    let response = client
        .put(&db(&res_id, "items/update"), json!({"query": {"k": 1}, "update": {"$inc": {"v": 1}}, "multi": true}))
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    let count = client.get(&db(&res_id, "items/count"), json!({"query": {"v": 1}})).await;
    assert_eq!(count.body["count"], json!(2));

    // Upsert into a collection that does not exist yet creates it
    client
        .put(&db(&res_id, "fresh/update"), json!({"query": {"k": 9}, "update": {"$set": {"v": 1}}, "upsert": true}))
        .await;
    let names = client.get(&db(&res_id, "getCollectionNames"), json!({})).await;
    assert_eq!(names.body, json!({"result": ["fresh", "items"]}));

    let count = client.get(&db(&res_id, "items/count"), json!({"skip": 1, "limit": 1})).await;
    assert_eq!(count.body["count"], json!(1));

    client
        .delete(&db(&res_id, "items/remove"), Some(json!({"constraint": {"k": 1}, "just_one": true})))
        .await;
    let count = client.get(&db(&res_id, "items/count"), json!({})).await;
    assert_eq!(count.body["count"], json!(2));

    client.delete(&db(&res_id, "items/remove"), None).await;
    let count = client.get(&db(&res_id, "items/count"), json!({})).await;
    assert_eq!(count.body["count"], json!(0));
}

#[tokio::test]
async fn find_projection_and_aggregate() {
    let ctx = TestContext::new();
    let mut client = ctx.client();
    let res_id = client.create_workspace().await;
    let docs = json!({"document": [{"g": "a", "n": 1}, {"g": "a", "n": 2}, {"g": "b", "n": 5}]});
    client.post(&db(&res_id, "nums/insert"), docs).await;

    let found = client
        .get(&db(&res_id, "nums/find"), json!({"query": {"g": "a"}, "projection": {"_id": 0, "n": 1}, "limit": 1}))
        .await;
    assert_eq!(found.body, json!({"result": [{"n": 1}]}));

    let pipeline = json!({"pipeline": [
        {"$group": {"_id": "$g", "total": {"$sum": "$n"}}},
        {"$sort": {"_id": 1}}
    ]});
    let aggregated = client.get(&db(&res_id, "nums/aggregate"), pipeline).await;
    assert_eq!(aggregated.status, StatusCode::OK);
    assert_eq!(
        aggregated.body,
        json!({"result": [{"_id": "a", "total": 3}, {"_id": "b", "total": 5}]})
    );
}

#[tokio::test]
async fn rate_limit_applies_to_limited_operations_only() {
    let mut config = TestContext::test_config();
    config.api.rate_limit_quota = 2;
    let ctx = TestContext::with_config(config);
    let mut client = ctx.client();
    let res_id = client.create_workspace().await;

    assert_eq!(client.get(&db(&res_id, "c/count"), json!({})).await.status, StatusCode::OK);
    assert_eq!(client.get(&db(&res_id, "c/count"), json!({})).await.status, StatusCode::OK);
    let limited = client.get(&db(&res_id, "c/find"), json!({})).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.body, json!({"error": 429, "reason": "Rate limit exceeded", "detail": ""}));

    // Not rate limited
    assert_eq!(client.get(&db(&res_id, "getCollectionNames"), json!({})).await.status, StatusCode::OK);
    assert_eq!(client.get(&db(&res_id, "c/aggregate"), json!([])).await.status, StatusCode::OK);
    let keep_alive = client.request(Method::POST, &format!("/mws/{}/keep-alive", res_id), None).await;
    assert_eq!(keep_alive.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn health_reports_store_backend() {
    let ctx = TestContext::new();
    let response = ctx.client().request(Method::GET, "/health", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["store"], json!("memory"));
}
