//! HTTP client behavior against a mock control plane.

use slb_reconcile::error::{ApiError, SlbError};
use slb_reconcile::slb::{
    ClusterLookup, FieldUpdate, ListQuery, NetworkOracle, Paginator, SlbApi, SlbClient,
    UpdateLoadBalancerRequest,
};
use slb_reconcile::sweep::PrefixNetworkOracle;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path, query_param},
};

fn client(server: &MockServer) -> SlbClient {
    SlbClient::new(&server.uri(), "cn-test", "secret").unwrap()
}

fn record(id: &str, name: &str) -> serde_json::Value {
    serde_json::json!({
        "loadBalancerId": id,
        "loadBalancerName": name,
        "addressType": "intranet",
        "vswitchId": "vsw-1",
        "deleteProtection": "on",
        "tags": { "env": "test" },
    })
}

#[tokio::test]
async fn test_describe_decodes_record_and_sends_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/regions/cn-test/load-balancers/lb-1"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(record("lb-1", "tf-testAccSlb")))
        .expect(1)
        .mount(&server)
        .await;

    let lb = client(&server).describe("lb-1").await.unwrap();

    assert_eq!(lb.id, "lb-1");
    assert_eq!(lb.name, "tf-testAccSlb");
    assert!(lb.is_delete_protected());
    assert_eq!(lb.tags["env"], "test");
}

#[tokio::test]
async fn test_status_codes_map_onto_error_taxonomy() {
    let server = MockServer::start().await;

    let cases = [
        ("lb-missing", ResponseTemplate::new(404)),
        ("lb-denied", ResponseTemplate::new(403)),
        ("lb-invalid", ResponseTemplate::new(409).set_body_string("conflict")),
        ("lb-broken", ResponseTemplate::new(503)),
        (
            "lb-throttled",
            ResponseTemplate::new(429).insert_header("Retry-After", "7"),
        ),
    ];
    for (id, response) in cases {
        Mock::given(method("GET"))
            .and(path(format!("/regions/cn-test/load-balancers/{id}")))
            .respond_with(response)
            .mount(&server)
            .await;
    }

    let client = client(&server);

    let err = client.describe("lb-missing").await.unwrap_err();
    assert!(err.is_not_found());

    let err = client.describe("lb-denied").await.unwrap_err();
    assert!(matches!(err, SlbError::Api(ApiError::PermissionDenied { .. })));
    assert!(!err.is_retryable());

    let err = client.describe("lb-invalid").await.unwrap_err();
    assert!(matches!(err, SlbError::Api(ApiError::Validation { .. })));

    let err = client.describe("lb-broken").await.unwrap_err();
    assert!(matches!(err, SlbError::Api(ApiError::Transient { .. })));
    assert!(err.is_retryable());

    let err = client.describe("lb-throttled").await.unwrap_err();
    assert_eq!(err.retry_delay_secs(), Some(7));
}

#[tokio::test]
async fn test_create_posts_request_and_returns_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/regions/cn-test/load-balancers"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "loadBalancerId": "lb-9" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let declared: slb_reconcile::planner::DeclaredState =
        serde_yaml::from_str("name: tf-testAccSlb\n").unwrap();
    let id = client(&server)
        .create(&declared.to_create_request("token-1"))
        .await
        .unwrap();

    assert_eq!(id, "lb-9");
}

#[tokio::test]
async fn test_update_sends_only_changed_fields() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/regions/cn-test/load-balancers/lb-1"))
        .and(body_json(serde_json::json!({ "deleteProtection": "off", "tags": {} })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let request = UpdateLoadBalancerRequest {
        delete_protection: Some(FieldUpdate::Reset),
        tags: Some(FieldUpdate::Reset),
        ..Default::default()
    };
    client(&server).update("lb-1", &request).await.unwrap();
}

#[tokio::test]
async fn test_paginator_walks_pages_until_short_page() {
    let server = MockServer::start().await;

    for (page, ids) in [("1", vec!["lb-1", "lb-2"]), ("2", vec!["lb-3"])] {
        let items: Vec<serde_json::Value> = ids.iter().map(|id| record(id, id)).collect();
        Mock::given(method("GET"))
            .and(path("/regions/cn-test/load-balancers"))
            .and(query_param("pageSize", "2"))
            .and(query_param("pageNumber", page))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "loadBalancers": items })),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = client(&server);
    let mut paginator = Paginator::new(&client, "cn-test", 2);
    let records = paginator.collect_all().await.unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(paginator.calls(), 2);
}

#[tokio::test]
async fn test_list_of_other_region_uses_its_path() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/regions/cn-other/load-balancers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let query = ListQuery {
        region: String::from("cn-other"),
        page_size: 10,
        page_number: 1,
    };
    let records = client(&server).list(&query).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_cluster_lookup_requires_exact_name() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/regions/cn-test/clusters"))
        .and(query_param("name", "tf-testAccCluster"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "clusters": [ { "name": "tf-testAccCluster-2" } ]
        })))
        .mount(&server)
        .await;

    let exists = client(&server)
        .cluster_exists("tf-testAccCluster")
        .await
        .unwrap();
    assert!(!exists);
}

#[tokio::test]
async fn test_network_oracle_matches_prefixed_vswitch() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/regions/cn-test/vpcs/vpc-1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/regions/cn-test/vswitches/vsw-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "name": "tf-testAccVsw" })),
        )
        .mount(&server)
        .await;

    let oracle = PrefixNetworkOracle::new(client(&server), vec![String::from("tf-testAcc")]);

    assert!(oracle.needs_sweep(Some("vpc-1"), Some("vsw-1")).await.unwrap());
    assert!(!oracle.needs_sweep(Some("vpc-1"), None).await.unwrap());
}
