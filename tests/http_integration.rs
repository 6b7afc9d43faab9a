//! Integration tests for the OpenStack client and the streaming sink using wiremock
//!
//! These tests run the real HTTP code against mocked Keystone, Nova, Glance,
//! Swift and collector endpoints.

use osacct::openstack::{AuthOptions, EndpointOptions, OpenStackProvider};
use osacct::record::{AccountingRecord, IpRecord};
use osacct::resource::{CloudProvider, Project, ProjectSession};
use osacct::sink::{HttpStreamSink, RecordSink, SinkError};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn credentials() -> AuthOptions {
    AuthOptions {
        username: Some("accounting".into()),
        password: Some("secret".into()),
        domain_id: Some("default".into()),
        project_name: Some("admin".into()),
        ..Default::default()
    }
}

fn token_body(uri: &str) -> Value {
    json!({
        "token": {
            "expires_at": "2099-01-01T00:00:00.000000Z",
            "catalog": [
                {"type": "identity", "endpoints": [{"interface": "public", "region": "RegionOne", "url": format!("{uri}/v3")}]},
                {"type": "compute", "endpoints": [{"interface": "public", "region": "RegionOne", "url": format!("{uri}/compute/v2.1")}]},
                {"type": "image", "endpoints": [{"interface": "public", "region": "RegionOne", "url": format!("{uri}/image")}]},
                {"type": "object-store", "endpoints": [{"interface": "public", "region": "RegionOne", "url": format!("{uri}/swift/v1/AUTH_p-1")}]}
            ]
        }
    })
}

async fn mount_admin_auth(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("X-Subject-Token", "tok-admin")
                .set_body_json(token_body(&server.uri())),
        )
        .mount(server)
        .await;
}

async fn mount_scoped_auth(server: &MockServer, project_id: &str, token: &str) {
    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .and(body_partial_json(json!({"auth": {"scope": {"project": {"id": project_id}}}})))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("X-Subject-Token", token)
                .set_body_json(token_body(&server.uri())),
        )
        .with_priority(1)
        .mount(server)
        .await;
}

async fn connect(server: &MockServer) -> OpenStackProvider {
    OpenStackProvider::connect(&format!("{}/v3", server.uri()), credentials(), EndpointOptions::default())
        .await
        .expect("authentication should succeed")
}

fn project(id: &str) -> Project {
    Project {
        id: id.into(),
        name: format!("{id}-name"),
        domain_id: "default".into(),
        tags: vec!["prod".into()],
    }
}

/// Keystone authentication and identity listings
mod identity_tests {
    use super::*;

    #[tokio::test]
    async fn test_projects_follow_keystone_next_links() {
        let server = MockServer::start().await;
        mount_admin_auth(&server).await;

        Mock::given(method("GET"))
            .and(path("/v3/auth/projects"))
            .and(query_param("page", "2"))
            .and(header("X-Auth-Token", "tok-admin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "projects": [{"id": "p-2", "name": "beta", "domain_id": "default", "tags": []}],
                "links": {"next": null}
            })))
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v3/auth/projects"))
            .and(header("X-Auth-Token", "tok-admin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "projects": [{"id": "p-1", "name": "alpha", "domain_id": "default", "tags": ["prod"]}],
                "links": {"next": format!("{}/v3/auth/projects?page=2", server.uri())}
            })))
            .mount(&server)
            .await;

        let provider = connect(&server).await;
        let projects = provider.list_projects().await.unwrap();

        let ids: Vec<&str> = projects.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p-1", "p-2"]);
        assert_eq!(projects[0].tags, vec!["prod"]);
    }

    #[tokio::test]
    async fn test_users_restricted_to_auth_domain() {
        let server = MockServer::start().await;
        mount_admin_auth(&server).await;

        Mock::given(method("GET"))
            .and(path("/v3/users"))
            .and(query_param("domain_id", "default"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [{"id": "u-1", "name": "alice"}, {"id": "u-2", "name": "bob"}],
                "links": {"next": null}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let users = connect(&server).await.list_users().await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[1].name, "bob");
    }

    #[tokio::test]
    async fn test_401_on_authentication_fails_connect() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": {"code": 401}})))
            .mount(&server)
            .await;

        let result =
            OpenStackProvider::connect(&format!("{}/v3", server.uri()), credentials(), EndpointOptions::default()).await;
        let err = result.err().expect("401 must fail authentication");
        assert!(format!("{err:#}").contains("401"));
    }

    #[tokio::test]
    async fn test_missing_subject_token_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(ResponseTemplate::new(201).set_body_json(token_body(&server.uri())))
            .mount(&server)
            .await;

        let result =
            OpenStackProvider::connect(&format!("{}/v3", server.uri()), credentials(), EndpointOptions::default()).await;
        assert!(result.is_err());
    }
}

/// Project-scoped listings through the service catalog
mod scoped_session_tests {
    use super::*;

    #[tokio::test]
    async fn test_scoped_session_uses_project_token_and_nova_links() {
        let server = MockServer::start().await;
        mount_admin_auth(&server).await;
        mount_scoped_auth(&server, "p-1", "tok-p1").await;

        Mock::given(method("GET"))
            .and(path("/compute/v2.1/servers/detail"))
            .and(query_param("marker", "vm-1"))
            .and(header("X-Auth-Token", "tok-p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "servers": [{"id": "vm-2", "created": "2026-02-01T00:00:00Z", "flavor": {"id": "f-1"}}]
            })))
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/compute/v2.1/servers/detail"))
            .and(header("X-Auth-Token", "tok-p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "servers": [{"id": "vm-1", "created": "2026-01-01T00:00:00Z", "flavor": {"id": "f-1"}}],
                "servers_links": [{"rel": "next", "href": format!("{}/compute/v2.1/servers/detail?marker=vm-1", server.uri())}]
            })))
            .mount(&server)
            .await;

        let provider = connect(&server).await;
        let session = provider.scoped_session(&project("p-1")).await.unwrap();
        let servers = session.list_servers().await.unwrap();

        let ids: Vec<&str> = servers.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["vm-1", "vm-2"]);
        assert_eq!(servers[0].flavor_id(), Some("f-1"));
    }

    #[tokio::test]
    async fn test_glance_relative_next_and_owner_query() {
        let server = MockServer::start().await;
        mount_admin_auth(&server).await;
        mount_scoped_auth(&server, "p-1", "tok-p1").await;

        Mock::given(method("GET"))
            .and(path("/image/v2/images"))
            .and(query_param("marker", "img-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "images": [{"id": "img-2", "owner": "p-1", "size": 2048, "created_at": "2026-01-02T00:00:00Z"}]
            })))
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/image/v2/images"))
            .and(query_param("owner", "p-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "images": [{"id": "img-1", "owner": "p-1", "size": 1024, "created_at": "2026-01-01T00:00:00Z"}],
                "next": "/v2/images?owner=p-1&marker=img-1"
            })))
            .mount(&server)
            .await;

        let provider = connect(&server).await;
        let session = provider.scoped_session(&project("p-1")).await.unwrap();
        let images = session.list_images("p-1").await.unwrap();

        assert_eq!(images.len(), 2);
        assert_eq!(images[1].size, Some(2048));
    }

    #[tokio::test]
    async fn test_empty_swift_account() {
        let server = MockServer::start().await;
        mount_admin_auth(&server).await;
        mount_scoped_auth(&server, "p-1", "tok-p1").await;

        Mock::given(method("GET"))
            .and(path("/swift/v1/AUTH_p-1"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let provider = connect(&server).await;
        let session = provider.scoped_session(&project("p-1")).await.unwrap();
        assert!(session.list_containers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_swift_containers_single_page() {
        let server = MockServer::start().await;
        mount_admin_auth(&server).await;
        mount_scoped_auth(&server, "p-1", "tok-p1").await;

        Mock::given(method("GET"))
            .and(path("/swift/v1/AUTH_p-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "backups", "count": 12, "bytes": 4096},
                {"name": "logs", "count": 1, "bytes": 10}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let provider = connect(&server).await;
        let session = provider.scoped_session(&project("p-1")).await.unwrap();
        let containers = session.list_containers().await.unwrap();

        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].bytes, 4096);
    }

    #[tokio::test]
    async fn test_malformed_server_is_skipped() {
        let server = MockServer::start().await;
        mount_admin_auth(&server).await;
        mount_scoped_auth(&server, "p-1", "tok-p1").await;

        Mock::given(method("GET"))
            .and(path("/compute/v2.1/servers/detail"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "servers": [
                    {"id": "vm-1", "created": "2026-01-01T00:00:00Z"},
                    {"id": "vm-2", "created": "yesterday"},
                    {"id": "vm-3", "created": "2026-01-03T00:00:00Z"}
                ]
            })))
            .mount(&server)
            .await;

        let provider = connect(&server).await;
        let session = provider.scoped_session(&project("p-1")).await.unwrap();
        let servers = session.list_servers().await.unwrap();

        let ids: Vec<&str> = servers.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["vm-1", "vm-3"]);
    }

    #[tokio::test]
    async fn test_swift_paging_continues_past_malformed_container() {
        let server = MockServer::start().await;
        mount_admin_auth(&server).await;
        mount_scoped_auth(&server, "p-1", "tok-p1").await;

        let first_page: Vec<Value> = (0..1000)
            .map(|n| {
                if n == 500 {
                    json!({"name": format!("c-{n:04}"), "count": "many"})
                } else {
                    json!({"name": format!("c-{n:04}"), "count": 1, "bytes": 10})
                }
            })
            .collect();

        Mock::given(method("GET"))
            .and(path("/swift/v1/AUTH_p-1"))
            .and(query_param("marker", "c-0999"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "tail", "count": 2, "bytes": 20}
            ])))
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/swift/v1/AUTH_p-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(first_page)))
            .mount(&server)
            .await;

        let provider = connect(&server).await;
        let session = provider.scoped_session(&project("p-1")).await.unwrap();
        let containers = session.list_containers().await.unwrap();

        assert_eq!(containers.len(), 1000);
        assert_eq!(containers.last().map(|c| c.name.as_str()), Some("tail"));
        assert!(containers.iter().all(|c| c.name != "c-0500"));
    }

    #[tokio::test]
    async fn test_missing_catalog_service_is_an_error() {
        let server = MockServer::start().await;
        mount_admin_auth(&server).await;
        mount_scoped_auth(&server, "p-1", "tok-p1").await;

        let provider = connect(&server).await;
        let session = provider.scoped_session(&project("p-1")).await.unwrap();
        let err = session.list_volumes("p-1").await.err().expect("no volume service published");
        assert!(err.to_string().contains("endpoint"));
    }

    #[tokio::test]
    async fn test_extra_specs() {
        let server = MockServer::start().await;
        mount_admin_auth(&server).await;
        mount_scoped_auth(&server, "p-1", "tok-p1").await;

        Mock::given(method("GET"))
            .and(path("/compute/v2.1/flavors/gpu.a40/os-extra_specs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "extra_specs": {"Accelerator:Number": "2", "hw:cpu_cores": "10"}
            })))
            .mount(&server)
            .await;

        let provider = connect(&server).await;
        let session = provider.scoped_session(&project("p-1")).await.unwrap();
        let specs = session.flavor_extra_specs("gpu.a40").await.unwrap();

        assert_eq!(specs.get("Accelerator:Number").map(String::as_str), Some("2"));
    }
}

/// NDJSON streaming to the collector
mod sink_tests {
    use super::*;

    fn ip_record(count: u32) -> AccountingRecord {
        AccountingRecord::Ip(IpRecord {
            measurement_time: chrono::Utc::now(),
            site_name: "CESNET".into(),
            cloud_compute_service: None,
            cloud_type: "OpenStack".into(),
            local_user: "p-1".into(),
            local_group: "default".into(),
            global_user_name: "alpha".into(),
            fqan: "/default/Role=NULL/Capability=NULL".into(),
            ip_type: "IPv4".into(),
            ip_count: count,
        })
    }

    #[tokio::test]
    async fn test_stream_sends_identifier_then_records() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/ips"))
            .and(header("content-type", "application/x-ndjson"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accepted": 2})))
            .expect(1)
            .mount(&server)
            .await;

        let sink = HttpStreamSink::new(reqwest::Client::new(), &server.uri(), "ips").unwrap();
        sink.open().await.unwrap();
        sink.send_identifier("osacct-brno").await.unwrap();
        sink.send(&ip_record(3)).await.unwrap();
        sink.send(&ip_record(5)).await.unwrap();
        sink.finish().await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);

        let body = String::from_utf8(requests[0].body.clone()).unwrap();
        let frames: Vec<Value> = body.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], json!({"identifier": "osacct-brno"}));
        assert_eq!(frames[1]["record"]["ip_count"], 3);
        assert_eq!(frames[2]["record"]["ip_count"], 5);
    }

    #[tokio::test]
    async fn test_rejected_stream_fails_finish() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/vms"))
            .respond_with(ResponseTemplate::new(500).set_body_string("collector down"))
            .mount(&server)
            .await;

        let sink = HttpStreamSink::new(reqwest::Client::new(), &server.uri(), "vms").unwrap();
        sink.open().await.unwrap();
        sink.send_identifier("osacct-brno").await.unwrap();

        match sink.finish().await {
            Err(SinkError::Rejected { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "collector down");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_finish_without_open() {
        let sink = HttpStreamSink::new(reqwest::Client::new(), "http://127.0.0.1:9", "gpus").unwrap();
        assert!(matches!(sink.finish().await, Err(SinkError::NotOpen)));
    }
}
