mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

use common::{create_workspace, get_json, TestServer};

#[tokio::test]
async fn session_cookie_keeps_the_same_workspace() -> Result<()> {
    let server = TestServer::start(&[]).await?;
    let client = server.browser()?;

    let first: Value = client.post(server.url("/mws/")).send().await?.json().await?;
    let second: Value = client.post(server.url("/mws/")).send().await?.json().await?;
    assert_eq!(first["is_new"], json!(true));
    assert_eq!(second["is_new"], json!(false));
    assert_eq!(first["res_id"], second["res_id"]);

    Ok(())
}

#[tokio::test]
async fn insert_find_drop_round() -> Result<()> {
    let server = TestServer::start(&[]).await?;
    let client = server.browser()?;
    let res_id = create_workspace(&server, &client).await?;
    let base = server.url(&format!("/mws/{}/db", res_id));

    let res = client
        .post(format!("{}/widgets/insert", base))
        .json(&json!({"document": {"x": 1}}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = get_json(&client, &format!("{}/widgets/find", base), &json!({"query": {"x": 1}})).await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["result"].as_array().map(Vec::len), Some(1), "unexpected find body: {}", body);

    let res = client.post(server.url(&format!("/mws/{}/keep-alive", res_id))).send().await?;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client.delete(format!("{}/widgets/drop", base)).send().await?;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let body: Value = client.get(format!("{}/getCollectionNames", base)).send().await?.json().await?;
    assert_eq!(body, json!({"result": []}));

    Ok(())
}

#[tokio::test]
async fn requests_without_cookie_are_rejected() -> Result<()> {
    let server = TestServer::start(&[]).await?;
    let owner = server.browser()?;
    let res_id = create_workspace(&server, &owner).await?;

    let anonymous = reqwest::Client::new();
    let res = anonymous
        .get(server.url(&format!("/mws/{}/db/widgets/count", res_id)))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await?;
    assert_eq!(body, json!({"error": 401, "reason": "There is no session_id cookie", "detail": ""}));

    let stranger = server.browser()?;
    create_workspace(&server, &stranger).await?;
    let res = stranger
        .get(server.url(&format!("/mws/{}/db/widgets/count", res_id)))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn tampered_cookie_is_not_a_session() -> Result<()> {
    let server = TestServer::start(&[]).await?;
    let owner = server.browser()?;
    let res_id = create_workspace(&server, &owner).await?;

    let res = reqwest::Client::new()
        .get(server.url(&format!("/mws/{}/db/widgets/count", res_id)))
        .header(reqwest::header::COOKIE, "mws_session=forged-session-id")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}
