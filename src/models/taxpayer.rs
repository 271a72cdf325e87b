use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mirrored taxpayer record. `tin` is unique across the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Taxpayer {
    pub id: i64,
    pub tin: String,
    pub id_type: String,
    pub id_value: String,
    pub is_valid: bool,
    pub business_name: Option<String>,
    pub full_name: Option<String>,
    pub address_street: Option<String>,
    pub address_city: Option<String>,
    pub address_postcode: Option<String>,
    pub address_state: Option<String>,
    pub address_country_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTaxpayer {
    pub tin: String,
    pub id_type: String,
    pub id_value: String,
    #[serde(default = "default_true")]
    pub is_valid: bool,
    pub business_name: Option<String>,
    pub full_name: Option<String>,
    pub address_street: Option<String>,
    pub address_city: Option<String>,
    pub address_postcode: Option<String>,
    pub address_state: Option<String>,
    pub address_country_code: Option<String>,
}

fn default_true() -> bool {
    true
}

impl NewTaxpayer {
    /// Field length checks matching the column widths.
    pub fn validate(&self) -> Result<(), String> {
        check_identity(&self.tin, &self.id_type, &self.id_value)?;
        check_opt_len("business_name", &self.business_name, 255)?;
        check_opt_len("full_name", &self.full_name, 255)?;
        check_opt_len("address_street", &self.address_street, 255)?;
        check_opt_len("address_city", &self.address_city, 100)?;
        check_opt_len("address_postcode", &self.address_postcode, 20)?;
        check_opt_len("address_state", &self.address_state, 100)?;
        check_opt_len("address_country_code", &self.address_country_code, 3)?;
        Ok(())
    }
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxpayerUpdate {
    pub is_valid: Option<bool>,
    pub id_type: Option<String>,
    pub id_value: Option<String>,
    pub business_name: Option<String>,
    pub full_name: Option<String>,
    pub address_street: Option<String>,
    pub address_city: Option<String>,
    pub address_postcode: Option<String>,
    pub address_state: Option<String>,
    pub address_country_code: Option<String>,
}

impl TaxpayerUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(v) = &self.id_type {
            check_len("id_type", v, 1, 50)?;
        }
        if let Some(v) = &self.id_value {
            check_len("id_value", v, 1, 100)?;
        }
        check_opt_len("business_name", &self.business_name, 255)?;
        check_opt_len("full_name", &self.full_name, 255)?;
        check_opt_len("address_street", &self.address_street, 255)?;
        check_opt_len("address_city", &self.address_city, 100)?;
        check_opt_len("address_postcode", &self.address_postcode, 20)?;
        check_opt_len("address_state", &self.address_state, 100)?;
        check_opt_len("address_country_code", &self.address_country_code, 3)?;
        Ok(())
    }
}

/// Width checks for the identity columns written by every validation upsert.
pub fn check_identity(tin: &str, id_type: &str, id_value: &str) -> Result<(), String> {
    check_len("tin", tin, 1, 50)?;
    check_len("id_type", id_type, 1, 50)?;
    check_len("id_value", id_value, 1, 100)?;
    Ok(())
}

fn check_opt_len(field: &str, value: &Option<String>, max: usize) -> Result<(), String> {
    match value {
        Some(v) if v.chars().count() > max => {
            Err(format!("{field} must be at most {max} characters"))
        }
        _ => Ok(()),
    }
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), String> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(format!("{field} must be between {min} and {max} characters"));
    }
    Ok(())
}

/// Outcome of a validation, as written by the upsert.
#[derive(Debug, Clone)]
pub struct ValidationRecord {
    pub tin: String,
    pub id_type: String,
    pub id_value: String,
    pub is_valid: bool,
}

// ── TIN check outcome ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotValidReason {
    /// Upstream has no such taxpayer (404).
    NotFound,
    /// Malformed TIN or id parameters, caught locally or by upstream (400).
    InvalidFormat,
    /// Upstream answered but reported the TIN as not valid.
    Rejected,
    /// Upstream answered 200 with a body we could not read.
    UnexpectedResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TinCheck {
    Valid { message: String },
    NotValid { reason: NotValidReason, message: String },
}

impl TinCheck {
    pub fn valid(message: impl Into<String>) -> Self {
        TinCheck::Valid { message: message.into() }
    }

    pub fn not_valid(reason: NotValidReason, message: impl Into<String>) -> Self {
        TinCheck::NotValid { reason, message: message.into() }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, TinCheck::Valid { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            TinCheck::Valid { message } | TinCheck::NotValid { message, .. } => message,
        }
    }
}

// ── Local format checks ──────────────────────────────────────

/// Identification types accepted before a request goes upstream.
pub const ID_TYPES: [&str; 6] = ["NRIC", "PASSPORT", "BRN", "ARMY", "DRIVER_LICENSE", "NATIONAL_ID"];

/// 3..=50 characters, alphanumeric once `-` and `_` separators are removed.
pub fn is_valid_tin_format(tin: &str) -> bool {
    let len = tin.chars().count();
    if !(3..=50).contains(&len) {
        return false;
    }
    let mut stripped = tin.chars().filter(|c| *c != '-' && *c != '_').peekable();
    stripped.peek().is_some() && stripped.all(char::is_alphanumeric)
}

pub fn is_valid_id(id_type: &str, id_value: &str) -> bool {
    if id_type.is_empty() || id_value.is_empty() {
        return false;
    }
    if !ID_TYPES.iter().any(|t| t.eq_ignore_ascii_case(id_type)) {
        return false;
    }
    (2..=100).contains(&id_value.chars().count())
}

/// Run the local checks; `Some` means the request should not go upstream.
pub fn precheck(tin: &str, id_type: &str, id_value: &str) -> Option<TinCheck> {
    if !is_valid_tin_format(tin) {
        return Some(TinCheck::not_valid(NotValidReason::InvalidFormat, "Invalid TIN format"));
    }
    if !is_valid_id(id_type, id_value) {
        return Some(TinCheck::not_valid(
            NotValidReason::InvalidFormat,
            "Invalid ID type or value",
        ));
    }
    None
}

/// JSON body returned by the taxpayer validation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxpayerValidationResponse {
    pub tin: String,
    pub id_type: String,
    pub id_value: String,
    pub is_valid: bool,
    pub validation_message: String,
    pub validated_at: DateTime<Utc>,
}

/// Plain-text summary returned by the MyInvois validation endpoint.
pub fn validation_summary(tin: &str, id_type: &str, id_value: &str, check: &TinCheck) -> String {
    let status = if check.is_valid() {
        "Active".to_string()
    } else {
        format!("INVALID ({})", check.message())
    };
    format!("TIN Number: {tin}\nID Type: {id_type}\nID Value: {id_value}\nStatus: {status}")
}
