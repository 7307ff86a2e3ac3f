//! Command runner integration tests
//!
//! Tests for request assembly, response interpretation, option merging and
//! observer notification.

mod common;

use common::{counter, endpoint, ok, recorder, runner, status, CountingFactory, MockTransport};
use datapi_client::{
    AwsEmbeddingHeaders, CommandOptions, DataApiEndpoint, HttpClientOptions, RunnerBuilder,
};
use datapi_core::{Command, DataApiVector, Error, Serializer, VectorEncoding};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::test]
async fn test_insert_one_end_to_end() {
    let transport = MockTransport::with_script(vec![Ok(ok(r#"{"status":{"insertedIds":["1"]}}"#))]);
    let (seen, observer) = recorder();
    let runner = runner(
        &transport,
        CommandOptions::with_default_http()
            .with_token("tok")
            .with_observer("recorder", observer),
    );

    let command = Command::new("insertOne").with("document", json!({"_id": "1", "name": "a"}));
    let response = runner.run(&command, None).await.unwrap();

    let ids: Option<Vec<String>> = response.status_key_as("insertedIds").unwrap();
    assert_eq!(ids, Some(vec!["1".to_string()]));
    assert!(!response.has_errors());

    let request = transport.last_request();
    assert_eq!(
        request.url,
        "http://localhost:8181/api/json/v1/default_keyspace/movies"
    );
    assert_eq!(
        transport.last_body(),
        json!({"insertOne": {"document": {"_id": "1", "name": "a"}}})
    );
    assert_eq!(request.header("Content-Type"), Some("application/json"));
    assert_eq!(request.header("Accept"), Some("application/json"));
    assert_eq!(request.header("Authorization"), Some("Bearer tok"));
    assert_eq!(request.header("Token"), Some("tok"));
    assert!(request.header("User-Agent").unwrap().starts_with("datapi/"));
    assert_eq!(request.header("X-Requested-With"), request.header("User-Agent"));
    let request_id = request.header("X-Request-ID").unwrap();
    assert!(uuid::Uuid::parse_str(request_id).is_ok());

    runner.drain().await;
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let info = &seen[0];
    assert!(info.is_success());
    assert_eq!(info.command_name(), "insertOne");
    assert_eq!(info.command()["insertOne"]["document"]["_id"], json!("1"));
    assert_eq!(info.request_url(), Some(request.url.as_str()));
    assert_eq!(info.request_header("token"), Some("tok"));
    assert_eq!(info.http_response().map(|r| r.status), Some(200));
    assert_eq!(info.attempts(), 1);
}

#[tokio::test]
async fn test_request_ids_are_unique() {
    let transport = MockTransport::new();
    let runner = runner(&transport, CommandOptions::with_default_http());
    let command = Command::new("countDocuments");

    runner.run(&command, None).await.unwrap();
    runner.run(&command, None).await.unwrap();

    let requests = transport.requests();
    assert_ne!(
        requests[0].header("X-Request-ID"),
        requests[1].header("X-Request-ID")
    );
}

#[tokio::test]
async fn test_errors_win_over_data() {
    let transport = MockTransport::with_script(vec![Ok(ok(
        r#"{"data":{"document":{"_id":"1"}},"errors":[{"errorCode":"DOCUMENT_ALREADY_EXISTS","message":"exists"}]}"#,
    ))]);
    let (seen, observer) = recorder();
    let runner = runner(
        &transport,
        CommandOptions::with_default_http().with_observer("recorder", observer),
    );

    let err = runner
        .run(&Command::new("findOneAndUpdate"), None)
        .await
        .unwrap_err();

    match &err {
        Error::DataApi(info) => {
            let response = info.response().expect("response recorded");
            assert_eq!(response.document(), Some(&json!({"_id": "1"})));
            assert_eq!(info.command_name(), "findOneAndUpdate");
            assert!(info.request_url().is_some());
        }
        other => panic!("Expected DataApi error, got {:?}", other),
    }
    assert_eq!(err.api_errors().len(), 1);
    assert_eq!(
        err.api_errors()[0].error_code.as_deref(),
        Some("DOCUMENT_ALREADY_EXISTS")
    );

    runner.drain().await;
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(matches!(seen[0].error(), Some(Error::DataApi(_))));
}

#[tokio::test]
async fn test_error_descriptors_on_client_error_status() {
    let transport = MockTransport::with_script(vec![Ok(status(
        400,
        r#"{"errors":[{"errorCode":"INVALID_REQUEST","message":"bad"}]}"#,
    ))]);
    let runner = runner(&transport, CommandOptions::with_default_http());

    let err = runner.run(&Command::new("find"), None).await.unwrap_err();
    assert!(matches!(err, Error::DataApi(_)));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_non_success_without_errors_is_http_error() {
    let transport = MockTransport::with_script(vec![Ok(status(401, "unauthorized"))]);
    let runner = runner(&transport, CommandOptions::with_default_http());

    let err = runner.run(&Command::new("find"), None).await.unwrap_err();
    match err {
        Error::Http { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(body, "unauthorized");
        }
        other => panic!("Expected Http error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_errors_list_is_success() {
    let transport = MockTransport::with_script(vec![Ok(ok(r#"{"status":{"count":3},"errors":[]}"#))]);
    let runner = runner(&transport, CommandOptions::with_default_http());

    let response = runner.run(&Command::new("countDocuments"), None).await.unwrap();
    assert_eq!(response.status_key("count"), Some(&json!(3)));
}

#[tokio::test]
async fn test_warnings_do_not_fail() {
    let transport = MockTransport::with_script(vec![Ok(ok(
        r#"{"status":{"warnings":[{"errorCode":"ZERO_FILTER_OPERATIONS","message":"no filter"}]},"data":{"documents":[]}}"#,
    ))]);
    let runner = runner(&transport, CommandOptions::with_default_http());

    let response = runner.run(&Command::new("find"), None).await.unwrap();
    assert_eq!(response.warnings().len(), 1);
    assert_eq!(response.documents().map(<[_]>::len), Some(0));
}

#[tokio::test]
async fn test_headers_merge_with_override_precedence() {
    let transport = MockTransport::new();
    let runner = runner(
        &transport,
        CommandOptions::with_default_http().with_database_header("X", "1"),
    );
    let command = Command::new("find");

    let extra = CommandOptions::new().with_database_header("Y", "2");
    runner.run(&command, Some(&extra)).await.unwrap();
    let request = transport.last_request();
    assert_eq!(request.header("X"), Some("1"));
    assert_eq!(request.header("Y"), Some("2"));

    let replace = CommandOptions::new().with_database_header("X", "3");
    runner.run(&command, Some(&replace)).await.unwrap();
    let request = transport.last_request();
    let values: Vec<&str> = request
        .headers
        .iter()
        .filter(|(name, _)| name == "X")
        .map(|(_, value)| value.as_str())
        .collect();
    assert_eq!(values, vec!["3"]);
}

#[tokio::test]
async fn test_admin_headers_and_feature_flags_are_sent() {
    let transport = MockTransport::new();
    let runner = runner(
        &transport,
        CommandOptions::with_default_http()
            .with_admin_header("X-Admin", "yes")
            .enable_feature_flag_tables(),
    );

    runner.run(&Command::new("listTables"), None).await.unwrap();
    let request = transport.last_request();
    assert_eq!(request.header("X-Admin"), Some("yes"));
    assert_eq!(request.header("Feature-Flag-tables"), Some("true"));
}

#[tokio::test]
async fn test_token_override_wins() {
    let transport = MockTransport::new();
    let runner = runner(&transport, CommandOptions::with_default_http().with_token("base"));
    let command = Command::new("find");

    runner
        .run(&command, Some(&CommandOptions::new().with_token("call")))
        .await
        .unwrap();
    assert_eq!(transport.last_request().header("Authorization"), Some("Bearer call"));

    runner.run(&command, None).await.unwrap();
    assert_eq!(transport.last_request().header("Token"), Some("base"));
}

#[tokio::test]
async fn test_without_token_no_auth_headers() {
    let transport = MockTransport::new();
    let runner = runner(&transport, CommandOptions::with_default_http());

    runner.run(&Command::new("find"), None).await.unwrap();
    let request = transport.last_request();
    assert_eq!(request.header("Authorization"), None);
    assert_eq!(request.header("Token"), None);
}

#[tokio::test]
async fn test_embedding_headers_from_both_layers() {
    let transport = MockTransport::new();
    let runner = runner(
        &transport,
        CommandOptions::with_default_http().with_embedding_api_key("base-key"),
    );

    let overrides = CommandOptions::new().with_embedding_auth(Arc::new(AwsEmbeddingHeaders::new("AKIA", "secret")));
    runner.run(&Command::new("insertMany"), Some(&overrides)).await.unwrap();

    let request = transport.last_request();
    assert_eq!(request.header("x-embedding-api-key"), Some("base-key"));
    assert_eq!(request.header("x-embedding-access-id"), Some("AKIA"));
    assert_eq!(request.header("x-embedding-secret-id"), Some("secret"));
}

#[tokio::test]
async fn test_observer_union_fires_each_name_once() {
    let transport = MockTransport::new();
    let (a, observer_a) = counter();
    let (base_b, observer_b) = counter();
    let (override_b, observer_b2) = counter();
    let (c, observer_c) = counter();

    let runner = runner(
        &transport,
        CommandOptions::with_default_http()
            .with_observer("A", observer_a)
            .with_observer("B", observer_b),
    );
    let overrides = CommandOptions::new()
        .with_observer("B", observer_b2)
        .with_observer("C", observer_c);

    runner.run(&Command::new("find"), Some(&overrides)).await.unwrap();
    runner.drain().await;

    assert_eq!(a.load(Ordering::SeqCst), 1);
    assert_eq!(base_b.load(Ordering::SeqCst), 1);
    assert_eq!(override_b.load(Ordering::SeqCst), 0);
    assert_eq!(c.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_transport_is_configuration_error() {
    let factory = CountingFactory::new(MockTransport::new());
    let (count, observer) = counter();
    let runner = RunnerBuilder::new(endpoint())
        .with_options(CommandOptions::new().with_observer("count", observer))
        .with_transport_factory(factory.clone())
        .build();

    let err = runner.run(&Command::new("find"), None).await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    runner.drain().await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(factory.created(), 0);
}

#[tokio::test]
async fn test_override_alone_can_supply_transport() {
    let factory = CountingFactory::new(MockTransport::new());
    let runner = RunnerBuilder::new(endpoint())
        .with_transport_factory(factory.clone())
        .build();

    let overrides = CommandOptions::with_default_http();
    runner.run(&Command::new("find"), Some(&overrides)).await.unwrap();
    assert_eq!(factory.created(), 1);

    let err = runner.run(&Command::new("find"), None).await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[tokio::test]
async fn test_distinct_override_gets_one_off_transport() {
    let factory = CountingFactory::new(MockTransport::new());
    let runner = RunnerBuilder::new(endpoint())
        .with_options(CommandOptions::with_default_http())
        .with_transport_factory(factory.clone())
        .build();
    let command = Command::new("find");

    runner.run(&command, None).await.unwrap();
    runner.run(&command, None).await.unwrap();
    assert_eq!(factory.created(), 1);

    let same = CommandOptions::new().with_http_client_options(HttpClientOptions::default());
    runner.run(&command, Some(&same)).await.unwrap();
    assert_eq!(factory.created(), 1);

    let different = CommandOptions::new()
        .with_http_client_options(HttpClientOptions::default().with_max_attempts(5));
    runner.run(&command, Some(&different)).await.unwrap();
    assert_eq!(factory.created(), 2);
    assert_eq!(factory.seen()[1].max_attempts, 5);

    // The shared client is untouched by the one-off
    runner.run(&command, None).await.unwrap();
    assert_eq!(factory.created(), 2);
}

#[tokio::test]
async fn test_invalid_url_still_notifies() {
    let transport = MockTransport::new();
    let (seen, observer) = recorder();
    let runner = RunnerBuilder::new(DataApiEndpoint::new("not a url"))
        .with_options(CommandOptions::with_default_http().with_observer("recorder", observer))
        .with_transport(transport.clone())
        .build();

    let err = runner.run(&Command::new("find"), None).await.unwrap_err();
    assert!(matches!(err, Error::InvalidUrl { .. }));
    assert!(transport.requests().is_empty());

    runner.drain().await;
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].request_url().is_none());
    assert!(matches!(seen[0].error(), Some(Error::InvalidUrl { .. })));
}

#[derive(Debug, Deserialize, PartialEq)]
struct Movie {
    title: String,
    year: i32,
}

#[tokio::test]
async fn test_run_as_document() {
    let transport = MockTransport::with_script(vec![Ok(ok(
        r#"{"data":{"document":{"_id":"1","Title":"Alien","year":1979,"rating":null}}}"#,
    ))]);
    let runner = runner(&transport, CommandOptions::with_default_http());

    let movie: Movie = runner
        .run_as(&Command::new("findOne").with("filter", json!({"_id": "1"})), None)
        .await
        .unwrap();
    assert_eq!(
        movie,
        Movie {
            title: "Alien".into(),
            year: 1979
        }
    );
}

#[tokio::test]
async fn test_run_as_documents() {
    let transport = MockTransport::with_script(vec![Ok(ok(
        r#"{"data":{"documents":[{"title":"Alien","year":1979},{"title":"Heat","year":null}],"nextPageState":null}}"#,
    ))]);
    let runner = runner(&transport, CommandOptions::with_default_http());

    let movies: Vec<Movie> = runner.run_as(&Command::new("find"), None).await.unwrap();
    assert_eq!(movies.len(), 2);
    assert_eq!(movies[1].year, 0);
}

#[tokio::test]
async fn test_run_as_status() {
    #[derive(Deserialize)]
    struct Count {
        count: u64,
    }

    let transport = MockTransport::with_script(vec![Ok(ok(r#"{"status":{"count":42}}"#))]);
    let runner = runner(&transport, CommandOptions::with_default_http());

    let count: Count = runner.run_as(&Command::new("countDocuments"), None).await.unwrap();
    assert_eq!(count.count, 42);
}

#[tokio::test]
async fn test_run_as_data_without_documents_is_state_error() {
    let transport = MockTransport::with_script(vec![Ok(ok(r#"{"data":{"nextPageState":"abc"}}"#))]);
    let runner = runner(&transport, CommandOptions::with_default_http());

    let err = runner
        .run_as::<Movie, _>(&Command::new("find"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::State(_)));
}

#[derive(Serialize)]
struct InsertVector {
    document: VectorDocument,
}

#[derive(Serialize)]
struct VectorDocument {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "$vector")]
    vector: DataApiVector,
}

#[tokio::test]
async fn test_serializer_override_applies_to_typed_payload() {
    let transport = MockTransport::new();
    let runner = runner(&transport, CommandOptions::with_default_http());
    let command = Command::with_payload(
        "insertOne",
        InsertVector {
            document: VectorDocument {
                id: "1".into(),
                vector: DataApiVector::from(vec![1.0f32]),
            },
        },
    );

    runner.run(&command, None).await.unwrap();
    assert_eq!(
        transport.last_body()["insertOne"]["document"]["$vector"],
        json!({"$binary": "P4AAAA=="})
    );

    let arrays = CommandOptions::new()
        .with_serializer(Serializer::default().with_vector_encoding(VectorEncoding::Array));
    runner.run(&command, Some(&arrays)).await.unwrap();
    assert_eq!(
        transport.last_body()["insertOne"]["document"]["$vector"],
        json!([1.0])
    );
}

#[tokio::test]
async fn test_null_fields_are_omitted_from_body() {
    let transport = MockTransport::new();
    let runner = runner(&transport, CommandOptions::with_default_http());

    let command = Command::new("updateOne")
        .with("filter", json!({"_id": "1"}))
        .with("sort", serde_json::Value::Null);
    runner.run(&command, None).await.unwrap();

    assert_eq!(
        transport.last_body(),
        json!({"updateOne": {"filter": {"_id": "1"}}})
    );
}
