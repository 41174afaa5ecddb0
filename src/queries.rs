//! Built-in query sets and table defaults.
//!
//! A query map assigns each output field a natural-language question answered
//! from the file contents. Hosts normally supply their own map; when they do
//! not, the invoice set below is used so the stage works out of the box.

use std::collections::BTreeMap;

/// Field-name to natural-language query mapping applied to each file.
pub type QueryMap = BTreeMap<String, String>;

/// Default destination table declared by the stage contract.
pub const DEFAULT_TABLE_NAME: &str = "unstructured_to_structured_resource";

/// Queries extracting the fields of a typical invoice.
///
/// Each question instructs the model to reply with the bare value, or `None`
/// when the document does not contain it, so answers land in the record
/// without further cleanup.
pub fn invoice_queries() -> QueryMap {
    [
        (
            "recipient_company_name",
            "Who is the recipient of the invoice? Just return the name. If you don't know, then return None",
        ),
        (
            "invoice_amount",
            "What is the total amount of the invoice? Just return the amount as decimal number, no currency or text. If you don't know, then return None",
        ),
        (
            "invoice_date",
            "What is the date of the invoice? Just return the date. If you don't know, then return None",
        ),
        (
            "invoice_number",
            "What is the invoice number? Just return the number. If you don't know, then return None",
        ),
        (
            "service_description",
            "What is the description of the service that this invoice is for? Just return the description. If you don't know, then return None",
        ),
        (
            "phone_number",
            "What is the company's phone number? Just return the phone number. If you don't know, then return None",
        ),
    ]
    .into_iter()
    .map(|(field, query)| (field.to_string(), query.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_queries_cover_expected_fields() {
        let queries = invoice_queries();
        assert_eq!(queries.len(), 6);
        for field in [
            "recipient_company_name",
            "invoice_amount",
            "invoice_date",
            "invoice_number",
            "service_description",
            "phone_number",
        ] {
            assert!(queries.contains_key(field), "missing field {field}");
        }
    }

    #[test]
    fn invoice_queries_request_bare_values() {
        for query in invoice_queries().values() {
            assert!(query.ends_with("return None"), "unexpected query: {query}");
        }
    }
}
