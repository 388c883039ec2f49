//! Shipping address management.
//!
//! Plain HTML forms with redirect-after-post. The province select is swapped
//! by HTMX when the country changes. A `next` query parameter sends the
//! customer back where they came from (checkout links here when no address
//! exists yet).

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use guoyan_core::AddressId;
use guoyan_core::address::{
    AddressForm, COUNTRIES, DEFAULT_COUNTRY, NewShippingAddress, ShippingAddress, provinces_for,
    sort_default_first,
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::NavContext;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::filters;
use crate::htmx::safe_next;
use crate::middleware::RequireAuth;
use crate::state::AppState;

// =============================================================================
// View Models
// =============================================================================

/// An `<option>` in a select box.
pub struct SelectOption {
    pub value: &'static str,
    pub selected: bool,
}

fn options(values: &'static [&'static str], selected: &str) -> Vec<SelectOption> {
    values
        .iter()
        .map(|&value| SelectOption {
            value,
            selected: value == selected,
        })
        .collect()
}

/// An address card on the list page.
pub struct AddressCard {
    pub id: String,
    pub full_name: String,
    pub phone: String,
    pub address_line_1: String,
    pub address_line_2: Option<String>,
    pub locality: String,
    pub country: String,
    pub is_default: bool,
}

impl From<&ShippingAddress> for AddressCard {
    fn from(address: &ShippingAddress) -> Self {
        Self {
            id: address.id.to_string(),
            full_name: address.full_name.clone(),
            phone: address.phone.clone(),
            address_line_1: address.address_line_1.clone(),
            address_line_2: address.address_line_2.clone(),
            locality: address.locality_line(),
            country: address.country.clone(),
            is_default: address.is_default,
        }
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Address list page template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/addresses.html")]
pub struct AddressesTemplate {
    pub nav: NavContext,
    pub addresses: Vec<AddressCard>,
}

/// New/edit address form page template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/address_form.html")]
pub struct AddressFormTemplate {
    pub nav: NavContext,
    pub title: &'static str,
    pub action: String,
    pub form: AddressForm,
    pub default_checked: bool,
    pub countries: Vec<SelectOption>,
    pub provinces: Vec<SelectOption>,
    pub error: Option<String>,
    pub error_field: &'static str,
}

impl AddressFormTemplate {
    fn build(
        nav: NavContext,
        title: &'static str,
        action: String,
        mut form: AddressForm,
        error: Option<(String, &'static str)>,
    ) -> Self {
        if form.country.trim().is_empty() {
            form.country = DEFAULT_COUNTRY.to_string();
        }
        let (error, error_field) = match error {
            Some((message, field)) => (Some(message), field),
            None => (None, ""),
        };
        Self {
            nav,
            title,
            default_checked: form.is_default.is_some(),
            countries: options(&COUNTRIES, form.country.trim()),
            provinces: options(provinces_for(form.country.trim()), form.province.trim()),
            action,
            form,
            error,
            error_field,
        }
    }
}

/// Province `<option>` list fragment (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/province_options.html")]
pub struct ProvinceOptionsTemplate {
    pub provinces: Vec<SelectOption>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Optional return path after saving.
#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    #[serde(default)]
    pub next: Option<String>,
}

impl NextQuery {
    fn destination(&self) -> String {
        match self.next.as_deref() {
            Some(next) => safe_next(Some(next)),
            None => "/addresses".to_string(),
        }
    }

    fn suffix(&self) -> String {
        self.next
            .as_deref()
            .map(|next| format!("?next={}", urlencoding::encode(&safe_next(Some(next)))))
            .unwrap_or_default()
    }
}

fn parse_address_id(raw: &str) -> Result<AddressId> {
    raw.parse()
        .map_err(|_| AppError::NotFound(format!("address {raw}")))
}

/// List the customer's addresses, default first.
#[instrument(skip(state, session, customer))]
pub async fn index(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(customer): RequireAuth,
) -> Result<AddressesTemplate> {
    let mut addresses = state
        .backend()
        .list_addresses(&customer.access_token, customer.id)
        .await?;
    sort_default_first(&mut addresses);

    Ok(AddressesTemplate {
        nav: NavContext::load(&session, Some(&customer)).await,
        addresses: addresses.iter().map(AddressCard::from).collect(),
    })
}

/// Blank address form.
#[instrument(skip(session, customer))]
pub async fn new(
    session: Session,
    RequireAuth(customer): RequireAuth,
    Query(query): Query<NextQuery>,
) -> AddressFormTemplate {
    AddressFormTemplate::build(
        NavContext::load(&session, Some(&customer)).await,
        "新增收货地址",
        format!("/addresses{}", query.suffix()),
        AddressForm::default(),
        None,
    )
}

/// Address form filled with a stored address.
#[instrument(skip(state, session, customer))]
pub async fn edit(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(customer): RequireAuth,
    Path(id): Path<String>,
    Query(query): Query<NextQuery>,
) -> Result<AddressFormTemplate> {
    let id = parse_address_id(&id)?;
    let address = state
        .backend()
        .get_address(&customer.access_token, customer.id, id)
        .await?;

    Ok(AddressFormTemplate::build(
        NavContext::load(&session, Some(&customer)).await,
        "编辑收货地址",
        format!("/addresses/{id}{}", query.suffix()),
        AddressForm::from(&address),
        None,
    ))
}

/// Country to list provinces for.
#[derive(Debug, Deserialize)]
pub struct ProvincesQuery {
    #[serde(default)]
    pub country: String,
}

/// Province options for the chosen country (HTMX).
pub async fn provinces(Query(query): Query<ProvincesQuery>) -> ProvinceOptionsTemplate {
    ProvinceOptionsTemplate {
        provinces: options(provinces_for(query.country.trim()), ""),
    }
}

/// Create an address.
#[instrument(skip(state, session, customer, form))]
pub async fn create(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(customer): RequireAuth,
    Query(query): Query<NextQuery>,
    Form(form): Form<AddressForm>,
) -> Result<Response> {
    let address = match NewShippingAddress::parse(&form) {
        Ok(address) => address,
        Err(e) => {
            return Ok(AddressFormTemplate::build(
                NavContext::load(&session, Some(&customer)).await,
                "新增收货地址",
                format!("/addresses{}", query.suffix()),
                form,
                Some((e.to_string(), e.field().name())),
            )
            .into_response());
        }
    };

    let created = state
        .backend()
        .create_address(&customer.access_token, customer.id, &address)
        .await?;
    add_breadcrumb("address", "Address created", None);
    tracing::info!(address_id = %created.id, "Address created");

    Ok(Redirect::to(&query.destination()).into_response())
}

/// Overwrite an address.
#[instrument(skip(state, session, customer, form))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(customer): RequireAuth,
    Path(id): Path<String>,
    Query(query): Query<NextQuery>,
    Form(form): Form<AddressForm>,
) -> Result<Response> {
    let id = parse_address_id(&id)?;
    let address = match NewShippingAddress::parse(&form) {
        Ok(address) => address,
        Err(e) => {
            return Ok(AddressFormTemplate::build(
                NavContext::load(&session, Some(&customer)).await,
                "编辑收货地址",
                format!("/addresses/{id}{}", query.suffix()),
                form,
                Some((e.to_string(), e.field().name())),
            )
            .into_response());
        }
    };

    state
        .backend()
        .update_address(&customer.access_token, id, &address)
        .await?;
    tracing::info!(address_id = %id, "Address updated");

    Ok(Redirect::to(&query.destination()).into_response())
}

/// Make an address the default.
#[instrument(skip(state, customer))]
pub async fn set_default(
    State(state): State<AppState>,
    RequireAuth(customer): RequireAuth,
    Path(id): Path<String>,
) -> Result<Redirect> {
    let id = parse_address_id(&id)?;
    state
        .backend()
        .set_default_address(&customer.access_token, id)
        .await?;
    Ok(Redirect::to("/addresses"))
}

/// Delete an address.
#[instrument(skip(state, customer))]
pub async fn delete(
    State(state): State<AppState>,
    RequireAuth(customer): RequireAuth,
    Path(id): Path<String>,
) -> Result<Redirect> {
    let id = parse_address_id(&id)?;
    state
        .backend()
        .delete_address(&customer.access_token, id)
        .await?;
    add_breadcrumb("address", "Address deleted", None);
    Ok(Redirect::to("/addresses"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_form_defaults_to_united_states() {
        let template = AddressFormTemplate::build(
            NavContext::default(),
            "新增收货地址",
            "/addresses".to_string(),
            AddressForm::default(),
            None,
        );
        assert_eq!(template.form.country, DEFAULT_COUNTRY);
        assert_eq!(template.provinces.len(), 50);
        assert!(template.countries.iter().any(|c| c.selected));
    }

    #[test]
    fn test_next_is_kept_on_the_form_action() {
        let query = NextQuery {
            next: Some("/checkout".to_string()),
        };
        assert_eq!(query.suffix(), "?next=%2Fcheckout");
        assert_eq!(query.destination(), "/checkout");
        assert_eq!(NextQuery::default().destination(), "/addresses");
    }

    #[test]
    fn test_offsite_next_is_ignored() {
        let query = NextQuery {
            next: Some("https://evil.example".to_string()),
        };
        assert_eq!(query.destination(), "/");
    }
}
