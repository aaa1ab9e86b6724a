use async_trait::async_trait;
use formwork_application::{LookupApi, OptionsLookupRequest};
use formwork_core::{AppError, AppResult};
use formwork_domain::OptionItem;
use reqwest::Method;
use url::Url;

use crate::backend_client::BackendClient;

/// Dropdown-options lookup over HTTP.
#[derive(Debug, Clone)]
pub struct HttpLookupApi {
    client: BackendClient,
}

impl HttpLookupApi {
    /// Creates a lookup adapter.
    #[must_use]
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    fn lookup_url(&self, request: &OptionsLookupRequest) -> AppResult<Url> {
        let mut url = self
            .client
            .endpoint(&["dropdown-options", request.collection_name.as_str()])?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("labelField", request.label_field.as_str())
                .append_pair("valueField", request.value_field.as_str());
            if let Some(field) = &request.label_field2 {
                pairs.append_pair("labelField2", field);
            }
            if let Some(field) = &request.label_field3 {
                pairs.append_pair("labelField3", field);
            }
            if let Some(template) = &request.custom_label {
                pairs.append_pair("customLabel", template);
            }
            if !request.filter_query.is_empty() {
                let filter = serde_json::to_string(&request.filter_query).map_err(|error| {
                    AppError::Internal(format!("failed to encode filterQuery: {error}"))
                })?;
                pairs.append_pair("filterQuery", filter.as_str());
            }
            if let Some(field) = &request.sort_field {
                pairs.append_pair("sortField", field);
            }
            if let Some(order) = request.sort_order {
                pairs.append_pair("sortOrder", order.as_str());
            }
            if let Some(limit) = request.limit {
                pairs.append_pair("limit", limit.to_string().as_str());
            }
            if let Some(query) = &request.query {
                pairs.append_pair("query", query);
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl LookupApi for HttpLookupApi {
    async fn fetch_options(&self, request: OptionsLookupRequest) -> AppResult<Vec<OptionItem>> {
        let url = self.lookup_url(&request)?;
        let action = format!("options lookup for '{}'", request.collection_name);
        let response = self
            .client
            .send(self.client.request(Method::GET, url), action.as_str())
            .await?;

        BackendClient::read_json(response, action.as_str()).await
    }
}

#[cfg(test)]
mod tests {
    use formwork_application::OptionsLookupRequest;
    use formwork_core::TenantDomain;
    use formwork_domain::SortOrder;
    use serde_json::{Map, json};
    use url::Url;

    use super::HttpLookupApi;
    use crate::backend_client::BackendClient;

    fn api() -> HttpLookupApi {
        HttpLookupApi::new(
            BackendClient::new(
                reqwest::Client::new(),
                Url::parse("http://backend.local/api/").unwrap_or_else(|_| unreachable!()),
                TenantDomain::new("school.example").unwrap_or_else(|_| unreachable!()),
            )
            .unwrap_or_else(|_| unreachable!()),
        )
    }

    fn request() -> OptionsLookupRequest {
        let mut filter_query = Map::new();
        filter_query.insert("province".to_owned(), json!("Tehran"));

        OptionsLookupRequest {
            collection_name: "cities".to_owned(),
            label_field: "name".to_owned(),
            label_field2: None,
            label_field3: None,
            value_field: "_id".to_owned(),
            custom_label: Some("{name} ({code})".to_owned()),
            filter_query,
            sort_field: Some("name".to_owned()),
            sort_order: Some(SortOrder::Desc),
            limit: Some(20),
            query: None,
        }
    }

    #[test]
    fn lookup_url_carries_every_present_parameter() {
        let url = api()
            .lookup_url(&request())
            .unwrap_or_else(|_| unreachable!());
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert_eq!(url.path(), "/api/dropdown-options/cities");
        assert!(pairs.contains(&("labelField".to_owned(), "name".to_owned())));
        assert!(pairs.contains(&("customLabel".to_owned(), "{name} ({code})".to_owned())));
        assert!(pairs.contains(&(
            "filterQuery".to_owned(),
            r#"{"province":"Tehran"}"#.to_owned()
        )));
        assert!(pairs.contains(&("sortOrder".to_owned(), "desc".to_owned())));
        assert!(pairs.contains(&("limit".to_owned(), "20".to_owned())));
        assert!(!pairs.iter().any(|(key, _)| key == "query" || key == "labelField2"));
    }

    #[test]
    fn empty_filters_are_left_out() {
        let mut request = request();
        request.filter_query.clear();
        request.query = Some("تهر".to_owned());

        let url = api().lookup_url(&request).unwrap_or_else(|_| unreachable!());
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(!pairs.iter().any(|(key, _)| key == "filterQuery"));
        assert!(pairs.contains(&("query".to_owned(), "تهر".to_owned())));
    }
}
