mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{get_request, json_request, read_json, TestApp, PASSWORD};
use serde_json::json;
use tower::ServiceExt;

use retail_crm::models::auth::Role;

async fn login(app: &TestApp, username: &str) -> String {
    let response = app
        .router()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            None,
            json!({ "username": username, "password": PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["profile"]["username"], username);
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new();
    let response = app.router().oneshot(get_request("/api/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["store"], "memory");
}

#[tokio::test]
async fn wrong_password_and_unknown_user_look_the_same() {
    let app = TestApp::new();
    app.account("ana", Role::Salesperson, None).await;

    let wrong = app
        .router()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            None,
            json!({ "username": "ana", "password": "errada" }),
        ))
        .await
        .unwrap();
    let unknown = app
        .router()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            None,
            json!({ "username": "ninguem", "password": "errada" }),
        ))
        .await
        .unwrap();

    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(wrong).await, read_json(unknown).await);
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let app = TestApp::new();
    let response = app.router().oneshot(get_request("/api/users/me", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .router()
        .oneshot(get_request("/api/interactions", Some("nao-e-um-jwt")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_then_logout_invalidates_the_token() {
    let app = TestApp::new();
    let shop = app.shop("Loja Centro").await;
    app.account("ana", Role::Salesperson, Some(shop.id)).await;
    let token = login(&app, "ana").await;

    let response = app.router().oneshot(get_request("/api/users/me", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let me = read_json(response).await;
    assert_eq!(me["role"], "SALESPERSON");
    assert_eq!(me["storeId"], shop.id.to_string());

    let response = app
        .router()
        .oneshot(json_request("POST", "/api/auth/logout", Some(&token), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.router().oneshot(get_request("/api/users/me", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn salesperson_is_forbidden_from_user_management() {
    let app = TestApp::new();
    app.account("ana", Role::Salesperson, None).await;
    let token = login(&app, "ana").await;

    let response = app.router().oneshot(get_request("/api/users", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(read_json(response).await["error"], "You don't have permission to do that.");

    let request = Request::builder()
        .method("GET")
        .uri("/api/users")
        .header("authorization", format!("Bearer {token}"))
        .header("accept-language", "pt-BR,pt;q=0.9")
        .body(Body::empty())
        .unwrap();
    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(
        read_json(response).await["error"],
        "Você não tem permissão para realizar esta ação."
    );
}

#[tokio::test]
async fn create_and_list_interactions_over_http() {
    let app = TestApp::new();
    app.account("ana", Role::Salesperson, None).await;
    let token = login(&app, "ana").await;

    let response = app
        .router()
        .oneshot(json_request(
            "POST",
            "/api/interactions",
            Some(&token),
            json!({
                "clientName": "Acme",
                "description": "Orçamento de vitrine",
                "status": "Lost",
                "reason": "Lack of product",
                "monetaryValue": 1500.0,
                "products": [{ "customDescription": "Vitrine 2m" }]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = read_json(response).await;
    assert_eq!(created["status"], "Lost");
    assert_eq!(created["reason"], "Lack of product");
    assert!(created["monetaryValue"].is_null());

    let response = app
        .router()
        .oneshot(get_request("/api/interactions?status=Lost", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let list = read_json(response).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["creatorUsername"], "ana");
    assert_eq!(list[0]["products"][0]["description"], "Vitrine 2m");

    let response = app
        .router()
        .oneshot(get_request("/api/interactions/stats", Some(&token)))
        .await
        .unwrap();
    let stats = read_json(response).await;
    assert_eq!(stats["totalInteractions"], 1);
    assert_eq!(stats["lostDeals"], 1);
}

#[tokio::test]
async fn blank_client_name_is_a_bad_request() {
    let app = TestApp::new();
    app.account("ana", Role::Salesperson, None).await;
    let token = login(&app, "ana").await;

    let response = app
        .router()
        .oneshot(json_request(
            "POST",
            "/api/interactions",
            Some(&token),
            json!({ "clientName": "  ", "description": "x", "status": "Quoted" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_user_over_http_is_a_conflict() {
    let app = TestApp::new();
    app.account("root", Role::Admin, None).await;
    app.account("jdoe", Role::Salesperson, None).await;
    let token = login(&app, "root").await;

    let response = app
        .router()
        .oneshot(json_request(
            "POST",
            "/api/users",
            Some(&token),
            json!({
                "username": "jdoe",
                "fullName": "John Doe",
                "email": "john@crm.com",
                "password": "123456"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(read_json(response).await["error"], "That value is already taken.");
}

#[tokio::test]
async fn role_update_and_options_over_http() {
    let app = TestApp::new();
    app.account("diretor", Role::Board, None).await;
    let seller = app.account("ana", Role::Salesperson, None).await;
    let token = login(&app, "diretor").await;

    let response = app
        .router()
        .oneshot(get_request(&format!("/api/users/{}/role-options", seller.id), Some(&token)))
        .await
        .unwrap();
    assert_eq!(read_json(response).await, json!(["MANAGER"]));

    let response = app
        .router()
        .oneshot(json_request(
            "PATCH",
            &format!("/api/users/{}/role", seller.id),
            Some(&token),
            json!({ "role": "ADMIN" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .router()
        .oneshot(json_request(
            "PATCH",
            &format!("/api/users/{}/role", seller.id),
            Some(&token),
            json!({ "role": "MANAGER" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["role"], "MANAGER");

    // Cargo fora do enum nem chega ao serviço
    let response = app
        .router()
        .oneshot(json_request(
            "PATCH",
            &format!("/api/users/{}/role", seller.id),
            Some(&token),
            json!({ "role": "OWNER" }),
        ))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn upload_rejects_non_spreadsheets() {
    let app = TestApp::new();
    app.account("root", Role::Admin, None).await;
    let token = login(&app, "root").await;

    let boundary = "crm-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"catalogo.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n\
         Product Code,Description\r\nA1,Cesto\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/products/upload")
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap();

    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_accepts_a_workbook() {
    let app = TestApp::new();
    app.account("root", Role::Admin, None).await;
    let token = login(&app, "root").await;

    let boundary = "crm-boundary";
    let mut body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"catalogo.xlsx\"\r\n\
         Content-Type: application/vnd.openxmlformats-officedocument.spreadsheetml.sheet\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(include_bytes!("fixtures/catalogo.xlsx"));
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri("/api/products/upload")
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap();
    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .router()
        .oneshot(get_request("/api/products?search=vaso", Some(&token)))
        .await
        .unwrap();
    let products = read_json(response).await;
    assert_eq!(products.as_array().unwrap().len(), 1);
    assert_eq!(products[0]["productCode"], "77");
}
