//! Invoice submission request and the document envelope sent to MyInvois.

use serde::{Deserialize, Serialize};

use super::taxpayer::Taxpayer;

const DEFAULT_COUNTRY_CODE: &str = "MY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    pub postcode: String,
    pub state: String,
    pub country_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub total_amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxDetail {
    pub tax_type: String,
    pub tax_rate: f64,
    pub tax_amount: f64,
}

/// Inbound body of `POST /invois/documents/submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSubmitRequest {
    #[serde(rename = "seller_tin")]
    pub seller_tin: String,
    #[serde(rename = "buyer_name")]
    pub buyer_name: String,
    #[serde(rename = "buyer_address")]
    pub buyer_address: Address,
    pub document_number: String,
    pub issue_date: String,
    pub item_list: Vec<Item>,
    pub total_amount: f64,
    pub currency: String,
    pub tax_details: Vec<TaxDetail>,
    pub payment_terms: String,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl InvoiceSubmitRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.seller_tin.trim().is_empty() {
            return Err("seller_tin must not be empty".into());
        }
        if self.document_number.trim().is_empty() {
            return Err("documentNumber must not be empty".into());
        }
        if self.item_list.is_empty() {
            return Err("itemList must contain at least one item".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Party {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tin: Option<String>,
    pub name: String,
    pub address: Address,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDocument {
    pub seller: Party,
    pub buyer: Party,
    pub document_number: String,
    pub issue_date: String,
    pub item_list: Vec<Item>,
    pub total_amount: f64,
    pub currency: String,
    pub tax_details: Vec<TaxDetail>,
    pub payment_terms: String,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPayload {
    pub document_type: &'static str,
    pub invoice: InvoiceDocument,
}

/// Seller party from the stored taxpayer row.
///
/// Name prefers `business_name` over `full_name`; missing address parts are
/// sent as empty strings and the country code falls back to `MY`.
pub fn seller_party(seller: &Taxpayer) -> Party {
    let non_empty = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(String::from);

    Party {
        tin: Some(seller.tin.clone()),
        name: non_empty(&seller.business_name)
            .or_else(|| non_empty(&seller.full_name))
            .unwrap_or_default(),
        address: Address {
            street: seller.address_street.clone().unwrap_or_default(),
            city: seller.address_city.clone().unwrap_or_default(),
            postcode: seller.address_postcode.clone().unwrap_or_default(),
            state: seller.address_state.clone().unwrap_or_default(),
            country_code: non_empty(&seller.address_country_code)
                .unwrap_or_else(|| DEFAULT_COUNTRY_CODE.to_string()),
        },
    }
}

/// Assemble the envelope for submission. `buyer_tin` is omitted when unknown.
pub fn build_document(
    req: &InvoiceSubmitRequest,
    seller: &Taxpayer,
    buyer_tin: Option<String>,
) -> DocumentPayload {
    DocumentPayload {
        document_type: "INVOICE",
        invoice: InvoiceDocument {
            seller: seller_party(seller),
            buyer: Party {
                tin: buyer_tin,
                name: req.buyer_name.clone(),
                address: req.buyer_address.clone(),
            },
            document_number: req.document_number.clone(),
            issue_date: req.issue_date.clone(),
            item_list: req.item_list.clone(),
            total_amount: req.total_amount,
            currency: req.currency.clone(),
            tax_details: req.tax_details.clone(),
            payment_terms: req.payment_terms.clone(),
            remarks: req.remarks.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn seller() -> Taxpayer {
        Taxpayer {
            id: 1,
            tin: "C20880050010".into(),
            id_type: "BRN".into(),
            id_value: "201901000005".into(),
            is_valid: true,
            business_name: None,
            full_name: Some("Kedai Runcit Ali".into()),
            address_street: Some("12 Jalan Ampang".into()),
            address_city: Some("Kuala Lumpur".into()),
            address_postcode: None,
            address_state: Some("WP Kuala Lumpur".into()),
            address_country_code: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn request() -> InvoiceSubmitRequest {
        serde_json::from_value(json!({
            "seller_tin": "C20880050010",
            "buyer_name": "Syarikat Maju",
            "buyer_address": {
                "street": "1 Jalan Tun Razak",
                "city": "Kuala Lumpur",
                "postcode": "50400",
                "state": "WP Kuala Lumpur",
                "countryCode": "MY"
            },
            "documentNumber": "INV-0001",
            "issueDate": "2024-08-01",
            "itemList": [{
                "description": "Consulting",
                "quantity": 2.0,
                "unitPrice": 50.0,
                "totalAmount": 100.0,
                "currency": "MYR"
            }],
            "totalAmount": 106.0,
            "currency": "MYR",
            "taxDetails": [{"taxType": "SST", "taxRate": 6.0, "taxAmount": 6.0}],
            "paymentTerms": "NET30"
        }))
        .unwrap()
    }

    #[test]
    fn test_seller_defaults() {
        let party = seller_party(&seller());
        assert_eq!(party.name, "Kedai Runcit Ali");
        assert_eq!(party.address.postcode, "");
        assert_eq!(party.address.country_code, "MY");
    }

    #[test]
    fn test_business_name_preferred() {
        let mut s = seller();
        s.business_name = Some("Ali Trading Sdn Bhd".into());
        assert_eq!(seller_party(&s).name, "Ali Trading Sdn Bhd");

        s.business_name = Some(String::new());
        assert_eq!(seller_party(&s).name, "Kedai Runcit Ali");
    }

    #[test]
    fn test_document_without_buyer_tin() {
        let doc = serde_json::to_value(build_document(&request(), &seller(), None)).unwrap();
        assert_eq!(doc["documentType"], "INVOICE");
        assert_eq!(doc["invoice"]["seller"]["tin"], "C20880050010");
        assert!(doc["invoice"]["buyer"].get("tin").is_none());
        assert_eq!(doc["invoice"]["buyer"]["address"]["countryCode"], "MY");
        assert_eq!(doc["invoice"]["itemList"][0]["unitPrice"], 50.0);
        assert_eq!(doc["invoice"]["taxDetails"][0]["taxType"], "SST");
        assert!(doc["invoice"]["remarks"].is_null());
    }

    #[test]
    fn test_document_with_buyer_tin() {
        let doc = serde_json::to_value(build_document(
            &request(),
            &seller(),
            Some("IG21136626090".into()),
        ))
        .unwrap();
        assert_eq!(doc["invoice"]["buyer"]["tin"], "IG21136626090");
    }

    #[test]
    fn test_request_validation() {
        let mut req = request();
        assert!(req.validate().is_ok());
        req.item_list.clear();
        assert!(req.validate().is_err());
    }
}
