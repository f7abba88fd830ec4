//! Wire-level names used by the Dynamics 365 Web API

/// Instance annotations carried in JSON payloads
pub mod annotations {
    pub const ODATA_BIND: &str = "@odata.bind";
    pub const ODATA_TYPE: &str = "@odata.type";
    pub const ODATA_ID: &str = "@odata.id";
    pub const ODATA_COUNT: &str = "@odata.count";
    pub const ODATA_NEXT_LINK: &str = "@odata.nextLink";
    pub const LOOKUP_LOGICAL_NAME: &str = "@Microsoft.Dynamics.CRM.lookuplogicalname";
    pub const FORMATTED_VALUE: &str = "@OData.Community.Display.V1.FormattedValue";
    pub const TOTAL_RECORD_COUNT: &str = "@Microsoft.Dynamics.CRM.totalrecordcount";
    pub const TOTAL_RECORD_COUNT_LIMIT_EXCEEDED: &str =
        "@Microsoft.Dynamics.CRM.totalrecordcountlimitexceeded";
    pub const MORE_RECORDS: &str = "@Microsoft.Dynamics.CRM.morerecords";
    pub const FETCHXML_PAGING_COOKIE: &str = "@Microsoft.Dynamics.CRM.fetchxmlpagingcookie";
}

/// HTTP header names and fixed values
pub mod headers {
    pub const AUTHORIZATION: &str = "Authorization";
    pub const ACCEPT: &str = "Accept";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const ODATA_VERSION: &str = "OData-Version";
    pub const ODATA_MAX_VERSION: &str = "OData-MaxVersion";
    pub const PREFER: &str = "Prefer";
    pub const IF_MATCH: &str = "If-Match";
    pub const ODATA_ENTITY_ID: &str = "OData-EntityId";
    pub const LOCATION: &str = "Location";
    pub const WWW_AUTHENTICATE: &str = "WWW-Authenticate";
    /// Lets a PATCH that nulls a lookup's foreign key remove the relationship
    pub const AUTO_DISASSOCIATE: &str = "MSCRM.AutoDisassociate";

    pub const JSON: &str = "application/json";
    pub const ODATA_V4: &str = "4.0";
    pub const INCLUDE_ANNOTATIONS: &str = "odata.include-annotations=\"*\"";
}

/// Namespace prefix for bound functions and actions
pub const CRM_NAMESPACE: &str = "Microsoft.Dynamics.CRM";
