use std::time::Duration;

use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::{Config, HTTP_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::types::{ItemDetails, ListingRecord, SellerInfo, SoldListing};

/// Search parameters for the Finding API. All filters optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    pub keywords: String,
    pub max_price: Option<f64>,
    pub min_price: Option<f64>,
    /// Display name ("New", "Used", "Refurbished", "For parts or not working")
    /// or a raw eBay condition id.
    pub condition: Option<String>,
    pub category_id: Option<String>,
    pub sort_by: Option<String>,
    pub limit: Option<usize>,
}

/// Client for the eBay Finding and Shopping APIs. Failures map to
/// `UpstreamUnavailable` so callers can distinguish "upstream broke" from
/// "no data exists".
pub struct ListingClient {
    http: reqwest::Client,
    finding_url: String,
    shopping_url: String,
    app_id: String,
}

impl ListingClient {
    pub fn new(cfg: &Config, app_id: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            finding_url: cfg.finding_api_url.clone(),
            shopping_url: cfg.shopping_api_url.clone(),
            app_id,
        })
    }

    /// Active-listing search via `findItemsAdvanced`.
    pub async fn search(&self, q: &SearchQuery) -> Result<Vec<ListingRecord>> {
        let limit = q.limit.unwrap_or(20).clamp(1, 100);
        let mut params = self.finding_params("findItemsAdvanced");
        params.push(("keywords".into(), q.keywords.clone()));
        params.push((
            "sortOrder".into(),
            q.sort_by.clone().unwrap_or_else(|| "BestMatch".to_string()),
        ));
        params.push(("paginationInput.entriesPerPage".into(), limit.to_string()));
        params.push(("paginationInput.pageNumber".into(), "1".into()));
        if let Some(id) = &q.category_id {
            params.push(("categoryId".into(), id.clone()));
        }

        let mut filter_idx = 0usize;
        if let Some(max) = q.max_price {
            push_item_filter(
                &mut params,
                &mut filter_idx,
                "MaxPrice",
                &max.to_string(),
                Some(("Currency", "USD")),
            );
        }
        if let Some(min) = q.min_price {
            push_item_filter(
                &mut params,
                &mut filter_idx,
                "MinPrice",
                &min.to_string(),
                Some(("Currency", "USD")),
            );
        }
        if let Some(cond) = &q.condition {
            push_item_filter(
                &mut params,
                &mut filter_idx,
                "Condition",
                condition_filter_id(cond),
                None,
            );
        }

        let resp = self.finding_call(&params).await?;
        let payload = finding_payload(&resp, "findItemsAdvancedResponse")?;
        let items: Vec<ListingRecord> = search_result_items(payload)
            .iter()
            .filter_map(parse_search_item)
            .collect();
        debug!("findItemsAdvanced: {} listings for \"{}\"", items.len(), q.keywords);
        Ok(items)
    }

    /// Single-item detail lookup via the Shopping API `GetSingleItem`.
    pub async fn item_details(&self, item_id: &str) -> Result<ItemDetails> {
        let params: Vec<(String, String)> = vec![
            ("callname".into(), "GetSingleItem".into()),
            ("responseencoding".into(), "JSON".into()),
            ("appid".into(), self.app_id.clone()),
            ("siteid".into(), "0".into()),
            ("version".into(), "967".into()),
            ("ItemID".into(), item_id.to_string()),
            (
                "IncludeSelector".into(),
                "Details,ItemSpecifics,ShippingCosts".into(),
            ),
        ];

        let resp: Value = self
            .http
            .get(&self.shopping_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("eBay request failed: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("eBay response unreadable: {e}")))?;

        if resp.get("Ack").and_then(|a| a.as_str()) != Some("Success") {
            return Err(AppError::UpstreamUnavailable(shopping_error_message(&resp)));
        }
        let item = resp
            .get("Item")
            .ok_or_else(|| AppError::UpstreamUnavailable("GetSingleItem returned no Item".to_string()))?;
        Ok(parse_item_details(item_id, item))
    }

    /// Completed/sold listings for market-value analysis via
    /// `findCompletedItems` with `SoldItemsOnly`. Errors are surfaced, never
    /// collapsed into an empty list.
    pub async fn sold_listings(
        &self,
        keywords: &str,
        lookback_days: u32,
        limit: usize,
    ) -> Result<Vec<SoldListing>> {
        let mut params = self.finding_params("findCompletedItems");
        params.push(("keywords".into(), keywords.to_string()));
        params.push(("sortOrder".into(), "EndTimeSoonest".into()));
        params.push((
            "paginationInput.entriesPerPage".into(),
            limit.clamp(1, 100).to_string(),
        ));
        params.push(("paginationInput.pageNumber".into(), "1".into()));

        let mut filter_idx = 0usize;
        push_item_filter(&mut params, &mut filter_idx, "SoldItemsOnly", "true", None);
        let end_from = (Utc::now() - ChronoDuration::days(i64::from(lookback_days)))
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        push_item_filter(&mut params, &mut filter_idx, "EndTimeFrom", &end_from, None);

        let resp = self.finding_call(&params).await?;
        let payload = finding_payload(&resp, "findCompletedItemsResponse")?;
        let items: Vec<SoldListing> = search_result_items(payload)
            .iter()
            .filter_map(parse_sold_item)
            .collect();
        debug!("findCompletedItems: {} sold listings for \"{keywords}\"", items.len());
        Ok(items)
    }

    fn finding_params(&self, operation: &str) -> Vec<(String, String)> {
        vec![
            ("OPERATION-NAME".into(), operation.to_string()),
            ("SERVICE-VERSION".into(), "1.13.0".into()),
            ("SECURITY-APPNAME".into(), self.app_id.clone()),
            ("RESPONSE-DATA-FORMAT".into(), "JSON".into()),
            ("REST-PAYLOAD".into(), "true".into()),
        ]
    }

    async fn finding_call(&self, params: &[(String, String)]) -> Result<Value> {
        self.http
            .get(&self.finding_url)
            .query(params)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("eBay request failed: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("eBay response unreadable: {e}")))
    }
}

fn push_item_filter(
    params: &mut Vec<(String, String)>,
    idx: &mut usize,
    name: &str,
    value: &str,
    param: Option<(&str, &str)>,
) {
    params.push((format!("itemFilter({idx}).name"), name.to_string()));
    params.push((format!("itemFilter({idx}).value"), value.to_string()));
    if let Some((pname, pvalue)) = param {
        params.push((format!("itemFilter({idx}).paramName"), pname.to_string()));
        params.push((format!("itemFilter({idx}).paramValue"), pvalue.to_string()));
    }
    *idx += 1;
}

/// Map a condition display name to its eBay condition id; raw ids pass
/// through unchanged.
fn condition_filter_id(condition: &str) -> &str {
    match condition {
        "New" => "1000",
        "Refurbished" => "2000",
        "Used" => "3000",
        "For parts or not working" => "7000",
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Finding API response parsing. The JSON rendition wraps nearly every field
// in a single-element array.
// ---------------------------------------------------------------------------

fn first<'a>(v: &'a Value, key: &str) -> Option<&'a Value> {
    v.get(key)?.as_array()?.first()
}

fn first_str<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    first(v, key)?.as_str()
}

fn num(v: &Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

/// `{"money":[{"@currencyId":"USD","__value__":"12.34"}]}` → 12.34
fn money(v: &Value, key: &str) -> Option<f64> {
    first(v, key)?.get("__value__").and_then(num)
}

fn finding_payload<'a>(resp: &'a Value, envelope: &str) -> Result<&'a Value> {
    let payload = resp
        .get(envelope)
        .and_then(|v| v.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| {
            AppError::UpstreamUnavailable(format!("malformed {envelope} payload"))
        })?;

    match first_str(payload, "ack") {
        Some("Success") | Some("Warning") => Ok(payload),
        _ => Err(AppError::UpstreamUnavailable(finding_error_message(payload))),
    }
}

fn finding_error_message(payload: &Value) -> String {
    first(payload, "errorMessage")
        .and_then(|e| first(e, "error"))
        .and_then(|e| first_str(e, "message"))
        .unwrap_or("eBay Finding API returned a failure ack")
        .to_string()
}

fn shopping_error_message(resp: &Value) -> String {
    resp.get("Errors")
        .and_then(|e| e.as_array())
        .and_then(|a| a.first())
        .and_then(|e| {
            e.get("LongMessage")
                .or_else(|| e.get("ShortMessage"))
                .and_then(|m| m.as_str())
        })
        .unwrap_or("eBay Shopping API returned a failure ack")
        .to_string()
}

fn search_result_items(payload: &Value) -> Vec<Value> {
    first(payload, "searchResult")
        .and_then(|sr| sr.get("item"))
        .and_then(|i| i.as_array())
        .cloned()
        .unwrap_or_default()
}

/// Parse one `findItemsAdvanced` item. Returns None only when the record is
/// structurally unusable (no item id).
fn parse_search_item(v: &Value) -> Option<ListingRecord> {
    let item_id = first_str(v, "itemId")?.to_string();
    let selling = first(v, "sellingStatus");
    let shipping = first(v, "shippingInfo");
    let listing = first(v, "listingInfo");

    Some(ListingRecord {
        item_id,
        title: first_str(v, "title").unwrap_or("").to_string(),
        url: first_str(v, "viewItemURL").unwrap_or("").to_string(),
        price: selling.and_then(|s| money(s, "currentPrice")).unwrap_or(0.0),
        currency: selling
            .and_then(|s| first(s, "currentPrice"))
            .and_then(|p| p.get("@currencyId"))
            .and_then(|c| c.as_str())
            .unwrap_or("USD")
            .to_string(),
        condition: first(v, "condition")
            .and_then(|c| first_str(c, "conditionDisplayName"))
            .unwrap_or("Unknown")
            .to_string(),
        location: first_str(v, "location").unwrap_or("").to_string(),
        shipping_cost: shipping
            .and_then(|s| money(s, "shippingServiceCost"))
            .unwrap_or(0.0),
        shipping_type: shipping
            .and_then(|s| first_str(s, "shippingType"))
            .unwrap_or("")
            .to_string(),
        image_url: first_str(v, "galleryURL").map(|s| s.to_string()),
        listing_type: listing
            .and_then(|l| first_str(l, "listingType"))
            .unwrap_or("")
            .to_string(),
        time_left: selling
            .and_then(|s| first_str(s, "timeLeft"))
            .unwrap_or("")
            .to_string(),
        end_time: listing.and_then(|l| first_str(l, "endTime")).map(|s| s.to_string()),
        watch_count: listing
            .and_then(|l| first(l, "watchCount"))
            .and_then(num)
            .map(|n| n as u64),
    })
}

/// Parse one `findCompletedItems` item. Records without a sold price are
/// skipped.
fn parse_sold_item(v: &Value) -> Option<SoldListing> {
    let selling = first(v, "sellingStatus")?;
    let price = money(selling, "currentPrice")?;

    Some(SoldListing {
        item_id: first_str(v, "itemId").unwrap_or("").to_string(),
        title: first_str(v, "title").unwrap_or("").to_string(),
        price,
        condition: first(v, "condition")
            .and_then(|c| first_str(c, "conditionDisplayName"))
            .unwrap_or("Unknown")
            .to_string(),
        sold_date: first(v, "listingInfo")
            .and_then(|l| first_str(l, "endTime"))
            .map(|s| s.to_string()),
    })
}

/// Parse a Shopping API `GetSingleItem` Item object. Unlike the Finding API
/// this rendition uses plain (unwrapped) JSON fields.
fn parse_item_details(item_id: &str, item: &Value) -> ItemDetails {
    let str_of = |key: &str| {
        item.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };
    let seller = item.get("Seller");

    ItemDetails {
        item_id: item_id.to_string(),
        title: str_of("Title"),
        description: str_of("Description"),
        condition: item
            .get("ConditionDisplayName")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown")
            .to_string(),
        condition_id: item.get("ConditionID").map(|v| match v.as_str() {
            Some(s) => s.to_string(),
            None => v.to_string(),
        }),
        price: item
            .get("CurrentPrice")
            .and_then(|p| p.get("Value"))
            .and_then(num)
            .unwrap_or(0.0),
        currency: item
            .get("CurrentPrice")
            .and_then(|p| p.get("CurrencyID"))
            .and_then(|c| c.as_str())
            .unwrap_or("USD")
            .to_string(),
        converted_price: item
            .get("ConvertedCurrentPrice")
            .and_then(|p| p.get("Value"))
            .and_then(num),
        location: str_of("Location"),
        country: str_of("Country"),
        shipping_cost: item
            .get("ShippingCostSummary")
            .and_then(|s| s.get("ShippingServiceCost"))
            .and_then(|c| c.get("Value"))
            .and_then(num)
            .unwrap_or(0.0),
        shipping_type: item
            .get("ShippingCostSummary")
            .and_then(|s| s.get("ShippingType"))
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string(),
        handling_time: item.get("HandlingTime").and_then(|h| h.as_i64()),
        seller: SellerInfo {
            username: seller
                .and_then(|s| s.get("UserID"))
                .and_then(|u| u.as_str())
                .unwrap_or("")
                .to_string(),
            feedback_score: seller
                .and_then(|s| s.get("FeedbackScore"))
                .and_then(|f| f.as_i64())
                .unwrap_or(0),
            positive_feedback_percent: seller
                .and_then(|s| s.get("PositiveFeedbackPercent"))
                .and_then(num)
                .unwrap_or(0.0),
            top_rated: seller
                .and_then(|s| s.get("TopRatedSeller"))
                .and_then(|t| t.as_bool())
                .unwrap_or(false),
        },
        listing_type: str_of("ListingType"),
        start_time: item.get("StartTime").and_then(|v| v.as_str()).map(|s| s.to_string()),
        end_time: item.get("EndTime").and_then(|v| v.as_str()).map(|s| s.to_string()),
        time_left: str_of("TimeLeft"),
        view_count: item.get("HitCount").and_then(|h| h.as_u64()),
        view_url: str_of("ViewItemURLForNaturalSearch"),
        image_url: item.get("GalleryURL").and_then(|v| v.as_str()).map(|s| s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_full_search_item() {
        let v = json!({
            "itemId": ["1234567890"],
            "title": ["Dell PowerEdge R730"],
            "viewItemURL": ["https://www.ebay.com/itm/1234567890"],
            "galleryURL": ["https://i.ebayimg.com/thumb.jpg"],
            "location": ["Austin,TX,USA"],
            "condition": [{"conditionId": ["2000"], "conditionDisplayName": ["Refurbished"]}],
            "sellingStatus": [{
                "currentPrice": [{"@currencyId": "USD", "__value__": "649.99"}],
                "timeLeft": ["P3DT2H11M4S"]
            }],
            "shippingInfo": [{
                "shippingServiceCost": [{"@currencyId": "USD", "__value__": "25.0"}],
                "shippingType": ["Flat"]
            }],
            "listingInfo": [{
                "listingType": ["FixedPrice"],
                "endTime": ["2026-08-20T17:00:00.000Z"],
                "watchCount": ["12"]
            }]
        });

        let rec = parse_search_item(&v).expect("usable item");
        assert_eq!(rec.item_id, "1234567890");
        assert_eq!(rec.title, "Dell PowerEdge R730");
        assert!((rec.price - 649.99).abs() < 1e-9);
        assert_eq!(rec.currency, "USD");
        assert_eq!(rec.condition, "Refurbished");
        assert!((rec.shipping_cost - 25.0).abs() < 1e-9);
        assert_eq!(rec.shipping_type, "Flat");
        assert_eq!(rec.listing_type, "FixedPrice");
        assert_eq!(rec.time_left, "P3DT2H11M4S");
        assert_eq!(rec.watch_count, Some(12));
    }

    #[test]
    fn sparse_search_item_gets_defaults() {
        let v = json!({"itemId": ["42"]});
        let rec = parse_search_item(&v).unwrap();
        assert_eq!(rec.item_id, "42");
        assert_eq!(rec.title, "");
        assert_eq!(rec.price, 0.0);
        assert_eq!(rec.currency, "USD");
        assert_eq!(rec.condition, "Unknown");
        assert_eq!(rec.shipping_cost, 0.0);
        assert!(rec.end_time.is_none());
        assert!(rec.watch_count.is_none());
    }

    #[test]
    fn search_item_without_id_is_skipped() {
        assert!(parse_search_item(&json!({"title": ["no id"]})).is_none());
    }

    #[test]
    fn sold_item_requires_a_price() {
        let no_price = json!({"itemId": ["1"], "title": ["x"], "sellingStatus": [{}]});
        assert!(parse_sold_item(&no_price).is_none());

        let priced = json!({
            "itemId": ["1"],
            "title": ["x"],
            "condition": [{"conditionDisplayName": ["Used"]}],
            "sellingStatus": [{"currentPrice": [{"@currencyId": "USD", "__value__": "99.5"}]}],
            "listingInfo": [{"endTime": ["2026-07-01T00:00:00.000Z"]}]
        });
        let sold = parse_sold_item(&priced).unwrap();
        assert!((sold.price - 99.5).abs() < 1e-9);
        assert_eq!(sold.condition, "Used");
        assert_eq!(sold.sold_date.as_deref(), Some("2026-07-01T00:00:00.000Z"));
    }

    #[test]
    fn payload_extraction_and_items() {
        let resp = json!({
            "findItemsAdvancedResponse": [{
                "ack": ["Success"],
                "searchResult": [{
                    "@count": "2",
                    "item": [{"itemId": ["1"]}, {"itemId": ["2"]}]
                }]
            }]
        });
        let payload = finding_payload(&resp, "findItemsAdvancedResponse").unwrap();
        assert_eq!(search_result_items(payload).len(), 2);
    }

    #[test]
    fn empty_search_result_yields_no_items() {
        let resp = json!({
            "findCompletedItemsResponse": [{"ack": ["Success"], "searchResult": [{"@count": "0"}]}]
        });
        let payload = finding_payload(&resp, "findCompletedItemsResponse").unwrap();
        assert!(search_result_items(payload).is_empty());
    }

    #[test]
    fn failure_ack_surfaces_vendor_message() {
        let resp = json!({
            "findItemsAdvancedResponse": [{
                "ack": ["Failure"],
                "errorMessage": [{"error": [{"message": ["Invalid category ID."]}]}]
            }]
        });
        let err = finding_payload(&resp, "findItemsAdvancedResponse").unwrap_err();
        match err {
            AppError::UpstreamUnavailable(msg) => assert_eq!(msg, "Invalid category ID."),
            other => panic!("expected UpstreamUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn missing_envelope_is_upstream_error() {
        let err = finding_payload(&json!({}), "findItemsAdvancedResponse").unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable(_)));
    }

    #[test]
    fn condition_names_map_to_ebay_ids() {
        assert_eq!(condition_filter_id("New"), "1000");
        assert_eq!(condition_filter_id("Refurbished"), "2000");
        assert_eq!(condition_filter_id("Used"), "3000");
        assert_eq!(condition_filter_id("For parts or not working"), "7000");
        assert_eq!(condition_filter_id("1500"), "1500");
    }

    #[test]
    fn parses_shopping_item_details() {
        let item = json!({
            "Title": "ThinkPad X1 Carbon",
            "Description": "Gen 9, 16GB RAM",
            "ConditionDisplayName": "Used",
            "ConditionID": 3000,
            "CurrentPrice": {"Value": 520.0, "CurrencyID": "USD"},
            "ConvertedCurrentPrice": {"Value": 520.0, "CurrencyID": "USD"},
            "Location": "Chicago, IL",
            "Country": "US",
            "ShippingCostSummary": {
                "ShippingServiceCost": {"Value": 0.0, "CurrencyID": "USD"},
                "ShippingType": "Free"
            },
            "Seller": {
                "UserID": "laptop_liquidators",
                "FeedbackScore": 15230,
                "PositiveFeedbackPercent": 99.6,
                "TopRatedSeller": true
            },
            "ListingType": "FixedPriceItem",
            "TimeLeft": "P12DT6H",
            "HitCount": 341,
            "ViewItemURLForNaturalSearch": "https://www.ebay.com/itm/987"
        });

        let details = parse_item_details("987", &item);
        assert_eq!(details.item_id, "987");
        assert_eq!(details.title, "ThinkPad X1 Carbon");
        assert!((details.price - 520.0).abs() < 1e-9);
        assert_eq!(details.condition_id.as_deref(), Some("3000"));
        assert_eq!(details.shipping_cost, 0.0);
        assert_eq!(details.seller.username, "laptop_liquidators");
        assert!(details.seller.top_rated);
        assert_eq!(details.view_count, Some(341));
    }
}
