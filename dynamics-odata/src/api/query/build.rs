//! Query string and header construction

use super::options::QueryOptions;
use crate::api::constants::headers::{INCLUDE_ANNOTATIONS, PREFER};
use crate::error::Result;

/// Encode a query option value; OData punctuation stays readable
fn encode(value: &str) -> String {
    urlencoding::encode(value)
        .replace("%2C", ",")
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%27", "'")
}

/// Query string (without `?`) and request headers for `options`
///
/// The `Prefer` header always asks for all annotations and adds
/// `odata.maxpagesize` when paging explicitly.
pub fn build_query(options: &QueryOptions) -> Result<(String, Vec<(String, String)>)> {
    options.validate()?;

    let mut params: Vec<(&str, String)> = Vec::new();

    if let Some(fetch_xml) = &options.fetch_xml {
        params.push(("fetchXml", fetch_xml.clone()));
    }
    if !options.select.is_empty() {
        params.push(("$select", options.select.join(",")));
    }
    if !options.order_by.is_empty() {
        let order = options
            .order_by
            .iter()
            .map(|o| o.to_odata())
            .collect::<Vec<_>>()
            .join(",");
        params.push(("$orderby", order));
    }
    if let Some(filter) = options.filter.as_deref().filter(|f| !f.is_empty()) {
        params.push(("$filter", filter.to_string()));
    }
    if let Some(expand) = options.expand.as_deref().filter(|e| !e.is_empty()) {
        params.push(("$expand", expand.to_string()));
    }
    if options.include_count {
        params.push(("$count", "true".to_string()));
    }
    if let Some(skip) = options.skip {
        params.push(("$skip", skip.to_string()));
    }
    if let Some(top) = options.top.filter(|t| *t > 0) {
        params.push(("$top", top.to_string()));
    }
    if let Some(token) = &options.skip_token {
        params.push(("$skiptoken", token.clone()));
    }

    let query = params
        .iter()
        .map(|(name, value)| format!("{}={}", name, encode(value)))
        .collect::<Vec<_>>()
        .join("&");

    let mut prefer = vec![INCLUDE_ANNOTATIONS.to_string()];
    if let Some(size) = options.max_page_size.filter(|s| *s > 0) {
        prefer.push(format!("odata.maxpagesize={}", size));
    }

    Ok((query, vec![(PREFER.to_string(), prefer.join(","))]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::query::{Filter, OrderBy};
    use crate::error::Error;

    #[test]
    fn test_empty_options() {
        let (query, headers) = build_query(&QueryOptions::new()).unwrap();
        assert_eq!(query, "");
        assert_eq!(
            headers,
            vec![(
                "Prefer".to_string(),
                "odata.include-annotations=\"*\"".to_string()
            )]
        );
    }

    #[test]
    fn test_all_parameters() {
        let options = QueryOptions::new()
            .select(["name", "accountnumber"])
            .order_by(OrderBy::asc("name"))
            .order_by(OrderBy::desc("createdon"))
            .filter_by(Filter::eq("name", "O'Brien & Co"))
            .expand("primarycontactid($select=fullname)")
            .count()
            .skip(20)
            .top(10);

        let (query, _) = build_query(&options).unwrap();
        assert_eq!(
            query,
            "$select=name,accountnumber\
             &$orderby=name%20asc,createdon%20desc\
             &$filter=name%20eq%20'O''Brien%20%26%20Co'\
             &$expand=primarycontactid(%24select%3Dfullname)\
             &$count=true&$skip=20&$top=10"
        );
    }

    #[test]
    fn test_paging_header() {
        let options = QueryOptions::new().max_page_size(50).skip_token("abc");
        let (query, headers) = build_query(&options).unwrap();
        assert_eq!(query, "$skiptoken=abc");
        assert_eq!(
            headers[0].1,
            "odata.include-annotations=\"*\",odata.maxpagesize=50"
        );
    }

    #[test]
    fn test_fetch_xml_is_encoded() {
        let options = QueryOptions::new().fetch_xml("<fetch><entity name=\"account\"/></fetch>");
        let (query, _) = build_query(&options).unwrap();
        assert!(query.starts_with("fetchXml=%3Cfetch%3E%3Centity%20name%3D%22account%22"));
    }

    #[test]
    fn test_top_with_cursor_rejected() {
        let options = QueryOptions::new().top(5).skip_token("abc");
        assert!(matches!(
            build_query(&options),
            Err(Error::InvalidArgument { .. })
        ));
    }
}
