//! Collection responses

use serde_json::{Map, Value as Json};

use crate::api::constants::annotations::{
    FETCHXML_PAGING_COOKIE, MORE_RECORDS, ODATA_COUNT, ODATA_NEXT_LINK, TOTAL_RECORD_COUNT,
    TOTAL_RECORD_COUNT_LIMIT_EXCEEDED,
};
use crate::error::{Error, Result};

/// Records returned by a list request, with paging state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListResult {
    /// Wire objects as returned by the service
    pub records: Vec<Map<String, Json>>,
    /// `@odata.count`
    pub count: Option<u64>,
    /// Continuation link for the next page
    pub next_link: Option<String>,
    /// `$skiptoken` value carried by `next_link`
    pub skip_token: Option<String>,
    pub total_record_count: Option<i64>,
    pub total_record_count_limit_exceeded: bool,
    pub more_records: bool,
    /// FetchXML paging cookie, for FetchXML queries
    pub paging_cookie: Option<String>,
}

impl ListResult {
    /// Read one page of a collection response
    pub fn from_page(body: Json) -> Result<Self> {
        let Json::Object(mut body) = body else {
            return Err(Error::parse("Collection response is not a JSON object"));
        };

        let records = match body.remove("value") {
            Some(Json::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Json::Object(map) => Ok(map),
                    other => Err(Error::parse(format!(
                        "Collection item is not an object: {}",
                        other
                    ))),
                })
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(Error::parse(format!(
                    "Collection 'value' is not an array: {}",
                    other
                )));
            }
            None => return Err(Error::parse("Collection response has no 'value' array")),
        };

        let next_link = body
            .get(ODATA_NEXT_LINK)
            .and_then(Json::as_str)
            .map(str::to_string);
        let skip_token = next_link.as_deref().and_then(skip_token_of);
        let more_records = body
            .get(MORE_RECORDS)
            .and_then(Json::as_bool)
            .unwrap_or(next_link.is_some());

        Ok(Self {
            records,
            count: body.get(ODATA_COUNT).and_then(Json::as_u64),
            next_link,
            skip_token,
            total_record_count: body.get(TOTAL_RECORD_COUNT).and_then(Json::as_i64),
            total_record_count_limit_exceeded: body
                .get(TOTAL_RECORD_COUNT_LIMIT_EXCEEDED)
                .and_then(Json::as_bool)
                .unwrap_or(false),
            more_records,
            paging_cookie: body
                .get(FETCHXML_PAGING_COOKIE)
                .and_then(Json::as_str)
                .map(str::to_string),
        })
    }

    /// Append the records of a following page and take over its paging state
    pub fn absorb(&mut self, page: ListResult) {
        self.records.extend(page.records);
        self.next_link = page.next_link;
        self.skip_token = page.skip_token;
        self.more_records = page.more_records;
        self.paging_cookie = page.paging_cookie;
    }

    /// Forget any continuation state
    pub fn drop_cursor(&mut self) {
        self.next_link = None;
        self.skip_token = None;
        self.more_records = false;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Decoded `$skiptoken` parameter of a next link
fn skip_token_of(next_link: &str) -> Option<String> {
    let (_, query) = next_link.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        if name != "$skiptoken" && name != "%24skiptoken" {
            return None;
        }
        urlencoding::decode(value).ok().map(|v| v.into_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_with_cursor() {
        let page = ListResult::from_page(json!({
            "@odata.count": 2,
            "@Microsoft.Dynamics.CRM.totalrecordcount": 5000,
            "@Microsoft.Dynamics.CRM.totalrecordcountlimitexceeded": true,
            "value": [{"name": "A"}, {"name": "B"}],
            "@odata.nextLink": "https://x/api/data/v9.2/accounts?$select=name&$skiptoken=%3Ccookie%20pagenumber=%222%22%20/%3E"
        }))
        .unwrap();

        assert_eq!(page.len(), 2);
        assert_eq!(page.count, Some(2));
        assert_eq!(page.total_record_count, Some(5000));
        assert!(page.total_record_count_limit_exceeded);
        assert!(page.more_records);
        assert_eq!(
            page.skip_token.as_deref(),
            Some("<cookie pagenumber=\"2\" />")
        );
    }

    #[test]
    fn test_last_page() {
        let page = ListResult::from_page(json!({"value": []})).unwrap();
        assert!(page.is_empty());
        assert!(!page.more_records);
        assert!(page.next_link.is_none());
    }

    #[test]
    fn test_fetchxml_paging_annotations() {
        let page = ListResult::from_page(json!({
            "value": [{"name": "A"}],
            "@Microsoft.Dynamics.CRM.fetchxmlpagingcookie": "<cookie page=\"1\"/>",
            "@Microsoft.Dynamics.CRM.morerecords": true
        }))
        .unwrap();
        assert!(page.more_records);
        assert!(page.next_link.is_none());
        assert_eq!(page.paging_cookie.as_deref(), Some("<cookie page=\"1\"/>"));
    }

    #[test]
    fn test_absorb_and_drop_cursor() {
        let mut first = ListResult::from_page(json!({
            "value": [{"n": 1}],
            "@odata.nextLink": "https://x/next?$skiptoken=a"
        }))
        .unwrap();
        let second = ListResult::from_page(json!({"value": [{"n": 2}]})).unwrap();

        first.absorb(second);
        first.drop_cursor();
        assert_eq!(first.len(), 2);
        assert!(first.next_link.is_none());
        assert!(!first.more_records);
    }

    #[test]
    fn test_malformed_collection() {
        assert!(ListResult::from_page(json!([1, 2])).is_err());
        assert!(ListResult::from_page(json!({"value": 1})).is_err());
        assert!(ListResult::from_page(json!({"value": [1]})).is_err());
    }
}
