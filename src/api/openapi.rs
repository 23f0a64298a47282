use crate::api::handlers::{admin, bricks, health, place, time};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

/// The `OpenAPI` document for every route the server can mount.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated document.
    let (_router, openapi) = public_router().merge(admin_router()).split_for_parts();
    openapi
}

/// Public routes, served and documented from the same `#[utoipa::path]` annotations.
///
/// Routes added outside (like `OPTIONS /health`) are not documented.
pub(crate) fn public_router() -> OpenApiRouter {
    let mut openapi = cargo_openapi();
    openapi.tags = Some(vec![
        tag("bricks", "Shared brick counter gated by one-time codes"),
        tag("health", "Service health"),
        tag("admin", "Operator endpoints, bearer token required"),
    ]);

    OpenApiRouter::with_openapi(openapi)
        .routes(routes!(bricks::root))
        .routes(routes!(bricks::bricks))
        .routes(routes!(time::time))
        .routes(routes!(place::place, place::place_post))
        .routes(routes!(health::health))
}

/// Operator routes; mounted behind the bearer token check.
pub(crate) fn admin_router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(admin::blocks))
        .routes(routes!(admin::failures))
        .routes(routes!(admin::clear_block))
        .routes(routes!(admin::clear_failures))
        .routes(routes!(admin::set_counter))
}

fn tag(name: &str, description: &str) -> Tag {
    let mut tag = Tag::new(name);
    tag.description = Some(description.to_string());
    tag
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = optional_str(env!("CARGO_PKG_LICENSE")).map(License::new);

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let primary = env!("CARGO_PKG_AUTHORS").split(';').next().map(str::trim)?;
    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    fn non_empty(s: &str) -> Option<&str> {
        let s = s.trim();
        (!s.is_empty()).then_some(s)
    }

    match author.find('<') {
        Some(start) => (
            non_empty(&author[..start]),
            non_empty(author[start + 1..].trim_end_matches('>')),
        ),
        None => (non_empty(author), None),
    }
}
