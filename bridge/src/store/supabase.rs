use std::time::Duration;

use async_trait::async_trait;
use heater_common::EntityKind;
use reqwest::{header, Client, Response};
use serde_json::Value;

use super::{RecordStore, Row, StoreError};

/// Tables hosted behind a Supabase (PostgREST) endpoint.
pub struct SupabaseStore {
    client: Client,
    rest_url: String,
    key: String,
}

impl SupabaseStore {
    pub fn new(url: &str, key: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", url.trim_end_matches('/')),
            key: key.to_string(),
        })
    }

    fn table_url(&self, kind: EntityKind) -> String {
        format!("{}/{}", self.rest_url, kind.table())
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.key)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.key))
    }
}

/// Turns a non-success PostgREST reply into a [`StoreError::Rejected`].
async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| format!("store returned {status}: {body}"));
    Err(StoreError::Rejected(message))
}

#[async_trait]
impl RecordStore for SupabaseStore {
    async fn insert(&self, kind: EntityKind, row: Row) -> Result<(), StoreError> {
        let request = self
            .client
            .post(self.table_url(kind))
            .header("Prefer", "return=minimal")
            .json(&[row]);
        let response = self.authorized(request).send().await?;
        check(response).await?;
        Ok(())
    }

    async fn latest(&self, kind: EntityKind, owner: &str) -> Result<Option<Value>, StoreError> {
        let request = self.client.get(self.table_url(kind)).query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{owner}")),
            ("order", "created_at.desc".to_string()),
            ("limit", "1".to_string()),
        ]);
        let response = check(self.authorized(request).send().await?).await?;
        let rows: Vec<Value> = response.json().await?;
        Ok(rows.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use heater_common::TemperatureReading;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::store::insert_record;

    fn store_for(server: &MockServer) -> SupabaseStore {
        SupabaseStore::new(&server.uri(), "anon-key", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn insert_posts_single_row_array() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/sensor_data"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer anon-key"))
            .and(body_json(json!([{"suhu": 32.5, "user_id": "u1"}])))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        insert_record(&store_for(&server), &TemperatureReading { value: 32.5 }, Some("u1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejected_insert_carries_store_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/sensor_data"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "23502",
                "message": "null value in column \"suhu\" violates not-null constraint"
            })))
            .mount(&server)
            .await;

        let err = insert_record(&store_for(&server), &TemperatureReading { value: 1.0 }, None)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "null value in column \"suhu\" violates not-null constraint"
        );
    }

    #[tokio::test]
    async fn latest_queries_newest_row_for_owner() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/heater_status"))
            .and(query_param("user_id", "eq.u1"))
            .and(query_param("order", "created_at.desc"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 9, "status": "auto", "user_id": "u1", "created_at": "2026-10-19T08:00:00Z"}
            ])))
            .mount(&server)
            .await;

        let row = store_for(&server)
            .latest(EntityKind::HeaterStatus, "u1")
            .await
            .unwrap();
        assert_eq!(row.unwrap()["status"], "auto");
    }

    #[tokio::test]
    async fn latest_without_rows_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/riwayat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let row = store_for(&server)
            .latest(EntityKind::Riwayat, "nobody")
            .await
            .unwrap();
        assert_eq!(row, None);
    }

    #[tokio::test]
    async fn non_json_error_body_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/riwayat"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let err = store_for(&server)
            .latest(EntityKind::Riwayat, "u1")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "store returned 503 Service Unavailable: upstream down"
        );
    }
}
