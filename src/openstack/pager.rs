//! Pagination
//!
//! Walks every page of an OpenStack list call. Services paginate in three
//! different ways, see [`NextPage`].

use super::client::OpenStackClient;
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Hard stop against a service that keeps returning the same next link
const MAX_PAGES: usize = 10_000;

/// How a service advertises the next page
#[derive(Debug, Clone, Copy)]
pub enum NextPage {
    /// `<key>_links: [{"rel": "next", "href": ...}]` (nova, cinder, manila)
    /// or `links: {"next": ...}` (keystone)
    Links,
    /// `next: "/v2/images?marker=..."`, relative to the endpoint root (glance)
    Relative,
    /// Single page
    None,
}

/// Fetch all items under `items_key` across every page
pub async fn fetch_all<T: DeserializeOwned>(
    client: &OpenStackClient,
    url: &str,
    items_key: &str,
    next: NextPage,
    base_url: &str,
) -> Result<Vec<T>> {
    let mut all_items = Vec::new();
    let mut page_url = Some(url.to_string());
    let mut pages = 0;

    while let Some(current) = page_url.take() {
        let response = client.get(&current).await?;
        all_items.extend(extract_items::<T>(&response, items_key)?);

        pages += 1;
        if pages >= MAX_PAGES {
            tracing::warn!(url, "pagination limit reached");
            break;
        }

        page_url = next_page_url(&response, items_key, next, base_url);
        if page_url.as_deref() == Some(current.as_str()) {
            break;
        }
    }

    Ok(all_items)
}

/// Deserialize the array under `items_key`; a missing key means no items.
/// Entries that fail to parse are logged and skipped.
pub fn extract_items<T: DeserializeOwned>(response: &Value, items_key: &str) -> Result<Vec<T>> {
    match response.get(items_key) {
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(|item| match serde_json::from_value(item.clone()) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    let id = item.get("id").or_else(|| item.get("name")).and_then(|v| v.as_str());
                    tracing::error!(kind = items_key, id, error = %e, "error parsing entry, skipping");
                    None
                }
            })
            .collect()),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(_) => Err(anyhow::anyhow!("{} is not an array", items_key)),
    }
}

/// Resolve the URL of the next page, if any
pub fn next_page_url(response: &Value, items_key: &str, next: NextPage, base_url: &str) -> Option<String> {
    match next {
        NextPage::Links => {
            let links_key = format!("{}_links", items_key);
            if let Some(links) = response.get(&links_key).and_then(|v| v.as_array()) {
                return links
                    .iter()
                    .find(|link| link.get("rel").and_then(|v| v.as_str()) == Some("next"))
                    .and_then(|link| link.get("href"))
                    .and_then(|v| v.as_str())
                    .map(String::from);
            }
            response
                .get("links")
                .and_then(|links| links.get("next"))
                .and_then(|v| v.as_str())
                .map(String::from)
        }
        NextPage::Relative => response
            .get("next")
            .and_then(|v| v.as_str())
            .map(|path| format!("{}{}", base_url.trim_end_matches('/'), path)),
        NextPage::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nova_style_next_link() {
        let response = json!({
            "servers": [],
            "servers_links": [{"rel": "next", "href": "https://nova/v2.1/servers/detail?marker=abc"}]
        });
        assert_eq!(
            next_page_url(&response, "servers", NextPage::Links, "").as_deref(),
            Some("https://nova/v2.1/servers/detail?marker=abc")
        );
    }

    #[test]
    fn test_keystone_style_null_next() {
        let response = json!({"users": [], "links": {"next": null, "self": "x"}});
        assert!(next_page_url(&response, "users", NextPage::Links, "").is_none());
    }

    #[test]
    fn test_glance_relative_next() {
        let response = json!({"images": [], "next": "/v2/images?marker=i9"});
        assert_eq!(
            next_page_url(&response, "images", NextPage::Relative, "https://glance:9292/").as_deref(),
            Some("https://glance:9292/v2/images?marker=i9")
        );
    }

    #[test]
    fn test_malformed_entry_is_skipped() {
        #[derive(Debug, serde::Deserialize)]
        struct Entry {
            id: String,
            size: u64,
        }

        let response = json!({"volumes": [
            {"id": "v-1", "size": 5},
            {"id": "v-2", "size": "huge"},
            {"id": "v-3", "size": 7}
        ]});
        let items: Vec<Entry> = extract_items(&response, "volumes").unwrap();
        let ids: Vec<&str> = items.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["v-1", "v-3"]);
        assert_eq!(items[1].size, 7);
    }

    #[test]
    fn test_non_array_is_an_error() {
        assert!(extract_items::<Value>(&json!({"volumes": {}}), "volumes").is_err());
    }

    #[test]
    fn test_extract_items_missing_key_is_empty() {
        let items: Vec<Value> = extract_items(&json!({}), "volumes").unwrap();
        assert!(items.is_empty());
    }
}
