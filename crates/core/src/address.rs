//! Shipping addresses.
//!
//! Addresses live in the backend's `shipping_addresses` table. Raw form input
//! is turned into a [`NewShippingAddress`] by [`NewShippingAddress::parse`],
//! which is the only way to build one, so anything sent to the backend has
//! already passed validation.
//!
//! At most one address per user is expected to be the default. Nothing here
//! enforces that; the backend owns it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::AddressId;

/// Countries the storefront ships to.
pub const COUNTRIES: [&str; 2] = ["United States", "Canada"];

/// Country preselected on a blank form.
pub const DEFAULT_COUNTRY: &str = "United States";

/// US states.
pub const US_STATES: [&str; 50] = [
    "Alabama",
    "Alaska",
    "Arizona",
    "Arkansas",
    "California",
    "Colorado",
    "Connecticut",
    "Delaware",
    "Florida",
    "Georgia",
    "Hawaii",
    "Idaho",
    "Illinois",
    "Indiana",
    "Iowa",
    "Kansas",
    "Kentucky",
    "Louisiana",
    "Maine",
    "Maryland",
    "Massachusetts",
    "Michigan",
    "Minnesota",
    "Mississippi",
    "Missouri",
    "Montana",
    "Nebraska",
    "Nevada",
    "New Hampshire",
    "New Jersey",
    "New Mexico",
    "New York",
    "North Carolina",
    "North Dakota",
    "Ohio",
    "Oklahoma",
    "Oregon",
    "Pennsylvania",
    "Rhode Island",
    "South Carolina",
    "South Dakota",
    "Tennessee",
    "Texas",
    "Utah",
    "Vermont",
    "Virginia",
    "Washington",
    "West Virginia",
    "Wisconsin",
    "Wyoming",
];

/// Canadian provinces and territories.
pub const CANADIAN_PROVINCES: [&str; 13] = [
    "Alberta",
    "British Columbia",
    "Manitoba",
    "New Brunswick",
    "Newfoundland and Labrador",
    "Northwest Territories",
    "Nova Scotia",
    "Nunavut",
    "Ontario",
    "Prince Edward Island",
    "Quebec",
    "Saskatchewan",
    "Yukon",
];

/// Provinces or states selectable for a country.
#[must_use]
pub fn provinces_for(country: &str) -> &'static [&'static str] {
    if country == "Canada" {
        &CANADIAN_PROVINCES
    } else {
        &US_STATES
    }
}

/// A stored shipping address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub id: AddressId,
    pub full_name: String,
    pub phone: String,
    pub address_line_1: String,
    #[serde(default)]
    pub address_line_2: Option<String>,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
}

impl ShippingAddress {
    /// `city, province, postal_code` line.
    #[must_use]
    pub fn locality_line(&self) -> String {
        format!("{}, {}, {}", self.city, self.province, self.postal_code)
    }
}

/// Order addresses with defaults first, keeping the existing order otherwise.
pub fn sort_default_first(addresses: &mut [ShippingAddress]) {
    addresses.sort_by_key(|address| !address.is_default);
}

/// The address checkout preselects.
#[must_use]
pub fn default_address(addresses: &[ShippingAddress]) -> Option<&ShippingAddress> {
    addresses.iter().find(|address| address.is_default)
}

/// Raw address form input.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressForm {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address_line_1: String,
    #[serde(default)]
    pub address_line_2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
    /// HTML checkboxes submit "on" when ticked and nothing otherwise.
    #[serde(default)]
    pub is_default: Option<String>,
}

impl From<&ShippingAddress> for AddressForm {
    fn from(address: &ShippingAddress) -> Self {
        Self {
            full_name: address.full_name.clone(),
            phone: address.phone.clone(),
            address_line_1: address.address_line_1.clone(),
            address_line_2: address.address_line_2.clone().unwrap_or_default(),
            city: address.city.clone(),
            province: address.province.clone(),
            postal_code: address.postal_code.clone(),
            country: address.country.clone(),
            is_default: address.is_default.then(|| "on".to_string()),
        }
    }
}

/// Which form field failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressField {
    FullName,
    Phone,
    AddressLine1,
    City,
    Province,
    PostalCode,
    Country,
}

impl AddressField {
    /// Form field name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::FullName => "full_name",
            Self::Phone => "phone",
            Self::AddressLine1 => "address_line_1",
            Self::City => "city",
            Self::Province => "province",
            Self::PostalCode => "postal_code",
            Self::Country => "country",
        }
    }
}

/// Address validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// A required field is blank.
    #[error("{}: 不能为空", .0.name())]
    Required(AddressField),
    /// Country outside the shipping area.
    #[error("不支持的国家: {0}")]
    UnsupportedCountry(String),
    /// Province does not belong to the chosen country.
    #[error("{province} 不属于 {country}")]
    ProvinceMismatch { province: String, country: String },
}

impl AddressError {
    /// The field the error should be shown next to.
    #[must_use]
    pub const fn field(&self) -> AddressField {
        match self {
            Self::Required(field) => *field,
            Self::UnsupportedCountry(_) => AddressField::Country,
            Self::ProvinceMismatch { .. } => AddressField::Province,
        }
    }
}

/// A validated address ready to be written to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewShippingAddress {
    full_name: String,
    phone: String,
    address_line_1: String,
    address_line_2: Option<String>,
    city: String,
    province: String,
    postal_code: String,
    country: String,
    is_default: bool,
}

impl NewShippingAddress {
    /// Validate raw form input.
    ///
    /// Fields are trimmed. Every field except the second address line is
    /// required; the country must be one we ship to and the province must
    /// belong to it.
    ///
    /// # Errors
    ///
    /// Returns the first [`AddressError`] found, in form order.
    pub fn parse(form: &AddressForm) -> Result<Self, AddressError> {
        let required = |value: &str, field| {
            let value = value.trim();
            if value.is_empty() {
                Err(AddressError::Required(field))
            } else {
                Ok(value.to_string())
            }
        };

        let full_name = required(&form.full_name, AddressField::FullName)?;
        let phone = required(&form.phone, AddressField::Phone)?;
        let address_line_1 = required(&form.address_line_1, AddressField::AddressLine1)?;
        let address_line_2 = Some(form.address_line_2.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let city = required(&form.city, AddressField::City)?;
        let province = required(&form.province, AddressField::Province)?;
        let postal_code = required(&form.postal_code, AddressField::PostalCode)?;
        let country = required(&form.country, AddressField::Country)?;

        if !COUNTRIES.contains(&country.as_str()) {
            return Err(AddressError::UnsupportedCountry(country));
        }
        if !provinces_for(&country).contains(&province.as_str()) {
            return Err(AddressError::ProvinceMismatch { province, country });
        }

        Ok(Self {
            full_name,
            phone,
            address_line_1,
            address_line_2,
            city,
            province,
            postal_code,
            country,
            is_default: form.is_default.is_some(),
        })
    }

    #[must_use]
    pub const fn is_default(&self) -> bool {
        self.is_default
    }

    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn valid_form() -> AddressForm {
        AddressForm {
            full_name: " 王小明 ".to_string(),
            phone: "+1 (555) 123-4567".to_string(),
            address_line_1: "100 King St W".to_string(),
            address_line_2: "  ".to_string(),
            city: "Toronto".to_string(),
            province: "Ontario".to_string(),
            postal_code: "M5X 1A9".to_string(),
            country: "Canada".to_string(),
            is_default: Some("on".to_string()),
        }
    }

    fn address(is_default: bool, name: &str) -> ShippingAddress {
        ShippingAddress {
            id: AddressId::new_v4(),
            full_name: name.to_string(),
            phone: "1".to_string(),
            address_line_1: "x".to_string(),
            address_line_2: None,
            city: "Toronto".to_string(),
            province: "Ontario".to_string(),
            postal_code: "M5X".to_string(),
            country: "Canada".to_string(),
            is_default,
        }
    }

    #[test]
    fn test_parse_trims_and_drops_blank_line_2() {
        let parsed = NewShippingAddress::parse(&valid_form()).unwrap();
        assert_eq!(parsed.full_name(), "王小明");
        assert!(parsed.is_default());
        let json = serde_json::to_value(&parsed).unwrap();
        assert!(json["address_line_2"].is_null());
    }

    #[test]
    fn test_parse_requires_fields_in_order() {
        let mut form = valid_form();
        form.phone = String::new();
        form.city = String::new();
        assert_eq!(
            NewShippingAddress::parse(&form),
            Err(AddressError::Required(AddressField::Phone))
        );
    }

    #[test]
    fn test_parse_rejects_province_from_other_country() {
        let mut form = valid_form();
        form.province = "Texas".to_string();
        let err = NewShippingAddress::parse(&form).unwrap_err();
        assert_eq!(err.field(), AddressField::Province);
    }

    #[test]
    fn test_parse_rejects_unsupported_country() {
        let mut form = valid_form();
        form.country = "Mexico".to_string();
        assert!(matches!(
            NewShippingAddress::parse(&form),
            Err(AddressError::UnsupportedCountry(_))
        ));
    }

    #[test]
    fn test_unchecked_default_box() {
        let mut form = valid_form();
        form.is_default = None;
        assert!(!NewShippingAddress::parse(&form).unwrap().is_default());
    }

    #[test]
    fn test_sort_default_first_is_stable() {
        let mut list = vec![
            address(false, "a"),
            address(true, "b"),
            address(false, "c"),
        ];
        sort_default_first(&mut list);
        let names: Vec<&str> = list.iter().map(|a| a.full_name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(default_address(&list).unwrap().full_name, "b");
    }

    #[test]
    fn test_form_from_address_roundtrips_through_parse() {
        let stored = address(true, "李雷");
        let form = AddressForm::from(&stored);
        let parsed = NewShippingAddress::parse(&form).unwrap();
        assert!(parsed.is_default());
        assert_eq!(parsed.full_name(), "李雷");
    }

    #[test]
    fn test_provinces_for_country() {
        assert_eq!(provinces_for("Canada").len(), 13);
        assert_eq!(provinces_for("United States").len(), 50);
    }
}
