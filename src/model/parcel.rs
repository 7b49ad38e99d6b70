//! Parcel records
//!
//! A parcel is one registered piece of land. Its `status` is the only link to
//! the transfer workflow: the parcel never points at a transfer, the engine
//! looks the open transfer up by parcel id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{RegistryError, Result};

/// Lifecycle status of a parcel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParcelStatus {
    #[default]
    Active,
    UnderTransfer,
    Disputed,
    Inactive,
}

impl ParcelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::UnderTransfer => "under_transfer",
            Self::Disputed => "disputed",
            Self::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an official has confirmed the registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Pending,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        }
    }
}

/// Land use classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParcelClassification {
    #[default]
    Agricultural,
    Residential,
    Commercial,
    Industrial,
}

impl ParcelClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agricultural => "agricultural",
            Self::Residential => "residential",
            Self::Commercial => "commercial",
            Self::Industrial => "industrial",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoLocation {
    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(RegistryError::Validation(format!(
                "Latitude must be between -90 and 90, got: {}",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(RegistryError::Validation(format!(
                "Longitude must be between -180 and 180, got: {}",
                self.longitude
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
}

impl Address {
    pub fn validate(&self) -> Result<()> {
        if self.city.trim().is_empty() {
            return Err(RegistryError::Validation("Address city is required".into()));
        }
        if self.state.trim().is_empty() {
            return Err(RegistryError::Validation("Address state is required".into()));
        }
        validate_postal_code(&self.postal_code)
    }
}

/// Postal codes are exactly six ASCII digits
pub fn validate_postal_code(code: &str) -> Result<()> {
    if code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(RegistryError::Validation(format!(
            "Postal code must be 6 digits, got: {:?}",
            code
        )))
    }
}

fn validate_area(area: f64) -> Result<()> {
    if area.is_finite() && area > 0.0 {
        Ok(())
    } else {
        Err(RegistryError::Validation(format!(
            "Area must be greater than 0, got: {}",
            area
        )))
    }
}

fn validate_market_value(value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(RegistryError::Validation(format!(
            "Market value must be 0 or greater, got: {}",
            value
        )))
    }
}

/// Reference to a supporting document. The hash is opaque to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
    pub document_type: String,
    pub content_hash: String,
    pub storage_locator: String,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Input for attaching a document to a parcel
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachDocumentInput {
    pub document_type: String,
    pub content_hash: String,
    pub storage_locator: String,
}

impl AttachDocumentInput {
    pub fn validate(&self) -> Result<()> {
        if self.document_type.trim().is_empty() {
            return Err(RegistryError::Validation("Document type is required".into()));
        }
        if self.content_hash.is_empty() || self.content_hash.chars().any(char::is_whitespace) {
            return Err(RegistryError::Validation(
                "Content hash must be a non-empty token without whitespace".into(),
            ));
        }
        if self.storage_locator.trim().is_empty() {
            return Err(RegistryError::Validation("Storage locator is required".into()));
        }
        Ok(())
    }
}

/// One closed interval of past ownership
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipInterval {
    pub owner: String,
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
    /// Transfer that ended this interval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<String>,
}

/// A registered land parcel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Parcel {
    pub parcel_id: String,
    pub owner: String,
    pub owner_since: DateTime<Utc>,
    pub location: GeoLocation,
    pub address: Address,
    pub area: f64,
    pub classification: ParcelClassification,
    pub market_value: f64,
    pub status: ParcelStatus,
    pub verification: VerificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub documents: Vec<DocumentRef>,
    #[serde(default)]
    pub previous_owners: Vec<OwnershipInterval>,
    pub created_by: String,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Incremented on every persisted change
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub deleted: bool,
}

impl Parcel {
    pub fn is_owned_by(&self, identity: &str) -> bool {
        self.owner == identity
    }

    /// Copy of this parcel with the version bumped and `updated_at` set
    pub fn next_revision(&self, now: DateTime<Utc>) -> Parcel {
        let mut next = self.clone();
        next.version = self.version + 1;
        next.updated_at = now;
        next
    }

    /// Close the current owner's interval and hand the parcel to `new_owner`
    pub fn record_ownership_change(
        &mut self,
        new_owner: &str,
        at: DateTime<Utc>,
        transfer_id: Option<String>,
    ) {
        self.previous_owners.push(OwnershipInterval {
            owner: std::mem::take(&mut self.owner),
            from_date: self.owner_since,
            to_date: at,
            transfer_id,
        });
        self.owner = new_owner.to_string();
        self.owner_since = at;
    }
}

/// Input for registering a parcel
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateParcelInput {
    pub parcel_id: String,
    pub owner: String,
    pub location: GeoLocation,
    pub address: Address,
    pub area: f64,
    pub classification: ParcelClassification,
    #[serde(default)]
    pub market_value: f64,
}

impl CreateParcelInput {
    pub fn validate(&self) -> Result<()> {
        let id = self.parcel_id.trim();
        if id.is_empty() {
            return Err(RegistryError::Validation("Parcel id is required".into()));
        }
        if id.len() != self.parcel_id.len() {
            return Err(RegistryError::Validation(
                "Parcel id must not have surrounding whitespace".into(),
            ));
        }
        if self.owner.trim().is_empty() {
            return Err(RegistryError::Validation("Owner is required".into()));
        }
        self.location.validate()?;
        self.address.validate()?;
        validate_area(self.area)?;
        validate_market_value(self.market_value)
    }

    /// Build the initial record: active, verification pending
    pub fn into_parcel(self, created_by: &str, now: DateTime<Utc>) -> Parcel {
        Parcel {
            parcel_id: self.parcel_id,
            owner: self.owner,
            owner_since: now,
            location: self.location,
            address: self.address,
            area: self.area,
            classification: self.classification,
            market_value: self.market_value,
            status: ParcelStatus::Active,
            verification: VerificationStatus::Pending,
            verified_by: None,
            verified_at: None,
            documents: Vec::new(),
            previous_owners: Vec::new(),
            created_by: created_by.to_string(),
            registered_at: now,
            updated_at: now,
            version: 0,
            deleted: false,
        }
    }
}

/// Partial update of descriptive parcel attributes.
///
/// Owner and status are deliberately absent: they only change through the
/// transfer workflow.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateParcelInput {
    pub location: Option<GeoLocation>,
    pub address: Option<Address>,
    pub area: Option<f64>,
    pub classification: Option<ParcelClassification>,
    pub market_value: Option<f64>,
}

impl UpdateParcelInput {
    pub fn is_empty(&self) -> bool {
        self.location.is_none()
            && self.address.is_none()
            && self.area.is_none()
            && self.classification.is_none()
            && self.market_value.is_none()
    }

    /// Validate only the fields being changed
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(RegistryError::Validation("No fields to update".into()));
        }
        if let Some(location) = &self.location {
            location.validate()?;
        }
        if let Some(address) = &self.address {
            address.validate()?;
        }
        if let Some(area) = self.area {
            validate_area(area)?;
        }
        if let Some(value) = self.market_value {
            validate_market_value(value)?;
        }
        Ok(())
    }

    pub fn apply_to(self, parcel: &mut Parcel) {
        if let Some(location) = self.location {
            parcel.location = location;
        }
        if let Some(address) = self.address {
            parcel.address = address;
        }
        if let Some(area) = self.area {
            parcel.area = area;
        }
        if let Some(classification) = self.classification {
            parcel.classification = classification;
        }
        if let Some(value) = self.market_value {
            parcel.market_value = value;
        }
    }
}

/// Public search filters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParcelQuery {
    /// Case-insensitive substring over parcel id and address fields
    pub q: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub classification: Option<ParcelClassification>,
    pub min_area: Option<f64>,
    pub max_area: Option<f64>,
    pub limit: Option<usize>,
}

impl ParcelQuery {
    /// Clamp the requested limit to the configured cap
    pub fn effective_limit(&self, cap: usize) -> usize {
        self.limit.map(|l| l.clamp(1, cap)).unwrap_or(cap)
    }

    /// Whether a parcel passes the filters, including the fixed public
    /// restriction to verified, active, non-deleted parcels.
    pub fn matches(&self, parcel: &Parcel) -> bool {
        if parcel.deleted
            || parcel.verification != VerificationStatus::Verified
            || parcel.status != ParcelStatus::Active
        {
            return false;
        }

        if let Some(q) = self.q.as_deref().filter(|q| !q.is_empty()) {
            let fields = [
                parcel.parcel_id.as_str(),
                parcel.address.street.as_str(),
                parcel.address.city.as_str(),
                parcel.address.state.as_str(),
                parcel.address.postal_code.as_str(),
            ];
            if !fields.iter().any(|f| contains_ignore_case(f, q)) {
                return false;
            }
        }
        if let Some(city) = self.city.as_deref() {
            if !contains_ignore_case(&parcel.address.city, city) {
                return false;
            }
        }
        if let Some(state) = self.state.as_deref() {
            if !contains_ignore_case(&parcel.address.state, state) {
                return false;
            }
        }
        if let Some(postal_code) = self.postal_code.as_deref() {
            if !parcel.address.postal_code.contains(postal_code) {
                return false;
            }
        }
        if let Some(classification) = self.classification {
            if parcel.classification != classification {
                return false;
            }
        }
        if let Some(min) = self.min_area {
            if parcel.area < min {
                return false;
            }
        }
        if let Some(max) = self.max_area {
            if parcel.area > max {
                return false;
            }
        }
        true
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
