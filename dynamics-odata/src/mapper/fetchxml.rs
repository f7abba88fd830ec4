//! FetchXML inspection
//!
//! FetchXML is never executed locally; it is only read to find the root
//! entity and the attributes a query selects, including link-entity aliases.

use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Response column (alias, `link.attribute` or attribute name) → lookup target entity
pub type AliasTypeMap = HashMap<String, String>;

/// An `<attribute>` element and the entity that declares it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttribute {
    /// Logical name of the enclosing `<entity>` or `<link-entity>`
    pub entity: String,
    pub name: String,
    pub alias: Option<String>,
    /// Alias of the enclosing `<link-entity>`, else its entity name; `None` at the root
    pub link_alias: Option<String>,
}

impl FetchAttribute {
    /// Column name the service uses for this attribute in the response
    pub fn response_key(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.link_alias {
            Some(link) => format!("{}.{}", link, self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug)]
struct Scope {
    tag: &'static str,
    entity: String,
    alias: Option<String>,
}

fn xml_error(err: impl std::fmt::Display) -> Error {
    Error::parse(format!("Invalid FetchXML: {}", err))
}

fn attribute_value(element: &BytesStart, key: &str) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(xml_error)?;
        if attr.key.as_ref() == key.as_bytes() {
            let raw = std::str::from_utf8(&attr.value).map_err(xml_error)?;
            return Ok(Some(unescape(raw).map_err(xml_error)?.into_owned()));
        }
    }
    Ok(None)
}

/// Walk a FetchXML document, calling `visit` for every start/empty element
/// together with the scope stack of enclosing entities
fn walk(
    fetch_xml: &str,
    mut visit: impl FnMut(&BytesStart, &[Scope]) -> Result<()>,
) -> Result<()> {
    let mut reader = Reader::from_str(fetch_xml);
    reader.config_mut().trim_text(true);

    let mut scopes: Vec<Scope> = Vec::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(element) => {
                visit(&element, &scopes)?;
                let tag = match element.local_name().as_ref() {
                    b"entity" => Some("entity"),
                    b"link-entity" => Some("link-entity"),
                    _ => None,
                };
                if let Some(tag) = tag {
                    scopes.push(Scope {
                        tag,
                        entity: attribute_value(&element, "name")?.unwrap_or_default(),
                        alias: attribute_value(&element, "alias")?,
                    });
                }
            }
            Event::Empty(element) => visit(&element, &scopes)?,
            Event::End(element) => {
                let name = element.local_name();
                if scopes
                    .last()
                    .is_some_and(|scope| scope.tag.as_bytes() == name.as_ref())
                {
                    scopes.pop();
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(())
}

/// Logical name of the root `<entity>`
pub fn root_entity_name(fetch_xml: &str) -> Result<String> {
    let mut root: Option<String> = None;
    walk(fetch_xml, |element, scopes| {
        if root.is_none() && scopes.is_empty() && element.local_name().as_ref() == b"entity" {
            root = attribute_value(element, "name")?;
        }
        Ok(())
    })?;
    root.filter(|name| !name.is_empty())
        .ok_or_else(|| Error::parse("FetchXML has no root <entity name=\"...\"> element"))
}

/// Every `<attribute>` the query selects, with its declaring entity
pub fn selected_attributes(fetch_xml: &str) -> Result<Vec<FetchAttribute>> {
    let mut attributes = Vec::new();
    walk(fetch_xml, |element, scopes| {
        if element.local_name().as_ref() != b"attribute" {
            return Ok(());
        }
        let Some(scope) = scopes.last() else {
            return Ok(());
        };
        let Some(name) = attribute_value(element, "name")? else {
            return Ok(());
        };
        attributes.push(FetchAttribute {
            entity: scope.entity.clone(),
            name,
            alias: attribute_value(element, "alias")?,
            link_alias: match scope.tag {
                "link-entity" => scope.alias.clone().or_else(|| Some(scope.entity.clone())),
                _ => None,
            },
        });
        Ok(())
    })?;
    Ok(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FETCH: &str = r#"
        <fetch top="50">
          <entity name="contact">
            <attribute name="fullname" />
            <attribute name="parentcustomerid" alias="customer" />
            <link-entity name="account" from="accountid" to="parentcustomerid" alias="acc">
              <attribute name="primarycontactid" />
              <attribute name="name" />
            </link-entity>
            <attribute name="ownerid" />
            <filter><condition attribute="statecode" operator="eq" value="0" /></filter>
          </entity>
        </fetch>"#;

    #[test]
    fn test_root_entity_name() {
        assert_eq!(root_entity_name(FETCH).unwrap(), "contact");
    }

    #[test]
    fn test_root_entity_missing() {
        assert!(matches!(
            root_entity_name("<fetch></fetch>"),
            Err(Error::ParseError { .. })
        ));
    }

    #[test]
    fn test_selected_attributes_track_scope() {
        let attributes = selected_attributes(FETCH).unwrap();
        let keys: Vec<(String, String)> = attributes
            .iter()
            .map(|a| (a.entity.clone(), a.response_key()))
            .collect();

        assert_eq!(
            keys,
            vec![
                ("contact".to_string(), "fullname".to_string()),
                ("contact".to_string(), "customer".to_string()),
                ("account".to_string(), "acc.primarycontactid".to_string()),
                ("account".to_string(), "acc.name".to_string()),
                ("contact".to_string(), "ownerid".to_string()),
            ]
        );
    }

    #[test]
    fn test_unaliased_link_attributes_do_not_shadow_root() {
        let fetch = r#"
            <fetch>
              <entity name="contact">
                <attribute name="ownerid" />
                <link-entity name="account" from="accountid" to="parentcustomerid">
                  <attribute name="ownerid" />
                </link-entity>
              </entity>
            </fetch>"#;
        let keys: Vec<String> = selected_attributes(fetch)
            .unwrap()
            .iter()
            .map(FetchAttribute::response_key)
            .collect();
        assert_eq!(keys, vec!["ownerid", "account.ownerid"]);
    }

    #[test]
    fn test_malformed_fetchxml() {
        assert!(selected_attributes("<fetch><entity name=\"a\"></fetch>").is_err());
    }
}
